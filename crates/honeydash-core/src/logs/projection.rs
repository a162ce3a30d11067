// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Borrow;
use std::collections::HashSet;

use crate::logs::schema::{LogRecord, LogSchema};

/// Ordered, duplicate-free list of field names to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSpec {
    fields: Vec<String>,
}

impl ProjectionSpec {
    /// Later repeats of a field are dropped; first occurrence fixes its position.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let fields = fields
            .into_iter()
            .map(Into::into)
            .filter(|field: &String| seen.insert(field.clone()))
            .collect();
        Self { fields }
    }

    /// Every field of the schema, in schema order.
    pub fn from_schema(schema: &LogSchema) -> Self {
        Self::new(schema.fields.iter().cloned())
    }

    /// Parses a comma-separated list such as `src_ip,username`.
    pub fn parse_list(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty()),
        )
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Copies the fields named in `spec`, in `spec` order, skipping absent ones.
pub fn project_record(record: &LogRecord, spec: &ProjectionSpec) -> LogRecord {
    spec.fields
        .iter()
        .filter_map(|field| {
            record
                .get(field)
                .map(|value| (field.clone(), value.clone()))
        })
        .collect()
}

/// Projects every record; output has one record per input record.
pub fn project<I, R>(records: I, spec: &ProjectionSpec) -> Vec<LogRecord>
where
    I: IntoIterator<Item = R>,
    R: Borrow<LogRecord>,
{
    records
        .into_iter()
        .map(|record| project_record(record.borrow(), spec))
        .collect()
}

/// Which fields of a schema are currently checked.
///
/// Kept by the caller across queries; new selections start with every field
/// checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    schema: LogSchema,
    checked: HashSet<String>,
}

impl FieldSelection {
    pub fn new(schema: LogSchema) -> Self {
        let checked = schema.fields.iter().cloned().collect();
        Self { schema, checked }
    }

    pub fn schema(&self) -> &LogSchema {
        &self.schema
    }

    pub fn is_checked(&self, field: &str) -> bool {
        self.checked.contains(field)
    }

    /// Flips one field and returns its new state, or `None` if the schema has
    /// no such field.
    pub fn toggle(&mut self, field: &str) -> Option<bool> {
        if !self.schema.contains(field) {
            return None;
        }
        if self.checked.remove(field) {
            Some(false)
        } else {
            self.checked.insert(field.to_string());
            Some(true)
        }
    }

    /// Checks exactly the given fields; names outside the schema are ignored.
    pub fn set_checked<'a>(&mut self, fields: impl IntoIterator<Item = &'a str>) {
        self.checked = fields
            .into_iter()
            .filter(|field| self.schema.contains(field))
            .map(str::to_string)
            .collect();
    }

    pub fn select_all(&mut self) {
        self.checked = self.schema.fields.iter().cloned().collect();
    }

    pub fn deselect_all(&mut self) {
        self.checked.clear();
    }

    /// Moves to a newer schema version, keeping the state of shared fields.
    /// Fields new to the schema start checked.
    pub fn upgrade(&mut self, schema: LogSchema) {
        let checked = schema
            .fields
            .iter()
            .filter(|field| !self.schema.contains(field) || self.checked.contains(*field))
            .cloned()
            .collect();
        self.schema = schema;
        self.checked = checked;
    }

    /// Checked fields in schema order.
    pub fn spec(&self) -> ProjectionSpec {
        ProjectionSpec::new(
            self.schema
                .fields
                .iter()
                .filter(|field| self.checked.contains(*field))
                .cloned(),
        )
    }
}
