// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Event records and the field vocabularies of each log source.
//!
//! Field lists grow over time (later revisions of the emulator exports add
//! `honeypot`/`type`), so schemas carry a version and live in a registry that
//! callers can extend instead of being hardcoded per source.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HoneydashError;

/// Category of monitored service whose events share a field vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// SSH/Telnet session emulator.
    Cowrie,
    /// Multi-protocol service emulator.
    Dionaea,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Cowrie, SourceKind::Dionaea];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cowrie => "cowrie",
            Self::Dionaea => "dionaea",
        }
    }

    pub fn subtypes(self) -> &'static [Subtype] {
        match self {
            Self::Cowrie => &[Subtype::Session],
            Self::Dionaea => &[Subtype::Http, Subtype::Ftp, Subtype::Mysql],
        }
    }

    /// Subtype assumed when a query or record does not name one.
    pub fn default_subtype(self) -> Subtype {
        self.subtypes()[0]
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = HoneydashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cowrie" => Ok(Self::Cowrie),
            "dionaea" => Ok(Self::Dionaea),
            other => Err(HoneydashError::Validation(format!(
                "unknown log source '{other}' (expected cowrie or dionaea)"
            ))),
        }
    }
}

/// Event category within a source kind, each with its own field schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    Session,
    Http,
    Ftp,
    Mysql,
}

impl Subtype {
    pub fn source_kind(self) -> SourceKind {
        match self {
            Self::Session => SourceKind::Cowrie,
            Self::Http | Self::Ftp | Self::Mysql => SourceKind::Dionaea,
        }
    }

    /// Value of the `type` query parameter and record field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Http => "http",
            Self::Ftp => "ftp",
            Self::Mysql => "mysql",
        }
    }

    /// Maps a protocol label as written by the emulator (`httpd`, `ftp`, ...).
    fn from_protocol(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().trim_end_matches('d') {
            "http" | "https" => Some(Self::Http),
            "ftp" => Some(Self::Ftp),
            "mysql" => Some(Self::Mysql),
            "session" => Some(Self::Session),
            _ => None,
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subtype {
    type Err = HoneydashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_protocol(s).ok_or_else(|| {
            HoneydashError::Validation(format!(
                "unknown log subtype '{s}' (expected session, http, ftp or mysql)"
            ))
        })
    }
}

/// One event as returned by the control API: an ordered map of named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord(Map<String, Value>);

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Field names in record order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Source kind and subtype this record belongs to.
    ///
    /// Explicit `honeypot`/`type` fields win; otherwise the record is
    /// recognised by its `eventid` prefix (`cowrie.`) or by the protocol
    /// label dionaea writes in `connection_protocol`.
    pub fn attribution(&self) -> Option<(SourceKind, Subtype)> {
        let text = |field: &str| self.get(field).and_then(Value::as_str);

        if let Some(kind) = text("honeypot").and_then(|h| h.parse::<SourceKind>().ok()) {
            let subtype = text("type")
                .and_then(Subtype::from_protocol)
                .filter(|s| s.source_kind() == kind)
                .unwrap_or_else(|| kind.default_subtype());
            return Some((kind, subtype));
        }
        if text("eventid").is_some_and(|id| id.starts_with("cowrie.")) {
            return Some((SourceKind::Cowrie, Subtype::Session));
        }
        ["connection_protocol", "protocol", "type"]
            .into_iter()
            .filter_map(text)
            .filter_map(Subtype::from_protocol)
            .find(|s| s.source_kind() == SourceKind::Dionaea)
            .map(|s| (SourceKind::Dionaea, s))
    }
}

impl From<Map<String, Value>> for LogRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for LogRecord {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Ordered field vocabulary of one (source kind, subtype) pair at a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSchema {
    pub subtype: Subtype,
    pub version: u32,
    pub fields: Vec<String>,
    /// Appended to selector ids so several schemas can share one page.
    pub id_suffix: String,
}

impl LogSchema {
    pub fn new<I, S>(subtype: Subtype, version: u32, fields: I, id_suffix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subtype,
            version,
            fields: fields.into_iter().map(Into::into).collect(),
            id_suffix: id_suffix.to_string(),
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.subtype.source_kind()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Control id for a field's selector, e.g. `field-src_ip-http`.
    pub fn selector_id(&self, field: &str) -> String {
        format!("field-{field}{}", self.id_suffix)
    }

    /// Derives the next version by appending fields not already present.
    pub fn extended<I, S>(&self, version: u32, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.version = version;
        for field in extra.into_iter().map(Into::into) {
            if !next.contains(&field) {
                next.fields.push(field);
            }
        }
        next
    }
}

const COWRIE_SESSION_V1: [&str; 8] = [
    "eventid",
    "timestamp",
    "src_ip",
    "src_port",
    "username",
    "password",
    "duration",
    "message",
];
const DIONAEA_HTTP_V1: [&str; 8] = [
    "timestamp",
    "src_ip",
    "src_port",
    "dst_port",
    "connection_protocol",
    "method",
    "url",
    "user_agent",
];
const DIONAEA_FTP_V1: [&str; 8] = [
    "timestamp",
    "src_ip",
    "src_port",
    "dst_port",
    "connection_protocol",
    "username",
    "password",
    "command",
];
const DIONAEA_MYSQL_V1: [&str; 8] = [
    "timestamp",
    "src_ip",
    "src_port",
    "dst_port",
    "connection_protocol",
    "username",
    "database",
    "query",
];

/// Known schemas, keyed by subtype, every version retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    schemas: BTreeMap<Subtype, BTreeMap<u32, LogSchema>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Version 1 of every subtype plus version 2, which adds the `honeypot`
    /// and `type` attribution fields (and `session` for cowrie).
    pub fn builtin() -> Self {
        let v1 = [
            LogSchema::new(Subtype::Session, 1, COWRIE_SESSION_V1, ""),
            LogSchema::new(Subtype::Http, 1, DIONAEA_HTTP_V1, "-http"),
            LogSchema::new(Subtype::Ftp, 1, DIONAEA_FTP_V1, "-ftp"),
            LogSchema::new(Subtype::Mysql, 1, DIONAEA_MYSQL_V1, "-mysql"),
        ];
        let mut registry = Self::empty();
        for schema in v1 {
            let v2 = match schema.subtype {
                Subtype::Session => schema.extended(2, ["session", "honeypot", "type"]),
                _ => schema.extended(2, ["honeypot", "type"]),
            };
            registry.insert(schema);
            registry.insert(v2);
        }
        registry
    }

    fn insert(&mut self, schema: LogSchema) {
        self.schemas
            .entry(schema.subtype)
            .or_default()
            .insert(schema.version, schema);
    }

    /// Adds a schema version.
    ///
    /// Re-registering an existing version with a different field list is
    /// rejected; a schema with no fields is rejected.
    pub fn register(&mut self, schema: LogSchema) -> Result<(), HoneydashError> {
        if schema.fields.is_empty() {
            return Err(HoneydashError::Validation(format!(
                "schema {} v{} has no fields",
                schema.subtype, schema.version
            )));
        }
        if let Some(existing) = self.get(schema.subtype, schema.version) {
            if existing != &schema {
                return Err(HoneydashError::Validation(format!(
                    "schema {} v{} is already registered with different fields",
                    schema.subtype, schema.version
                )));
            }
            return Ok(());
        }
        self.insert(schema);
        Ok(())
    }

    pub fn get(&self, subtype: Subtype, version: u32) -> Option<&LogSchema> {
        self.schemas.get(&subtype)?.get(&version)
    }

    /// Highest registered version for the pair; `None` when the subtype does
    /// not belong to `kind`.
    pub fn latest(&self, kind: SourceKind, subtype: Subtype) -> Option<&LogSchema> {
        if subtype.source_kind() != kind {
            return None;
        }
        self.schemas.get(&subtype)?.values().next_back()
    }

    /// Latest schema of every subtype of a source kind.
    pub fn for_kind(&self, kind: SourceKind) -> Vec<&LogSchema> {
        kind.subtypes()
            .iter()
            .filter_map(|subtype| self.latest(kind, *subtype))
            .collect()
    }
}
