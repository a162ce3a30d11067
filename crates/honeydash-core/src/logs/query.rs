// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Log retrieval against `GET /{source}/logs`.
//!
//! Queries are validated locally before anything is sent. A successful query
//! yields a [`LogSnapshot`]: a one-shot, finite sequence of records that is
//! consumed by iteration and cannot be replayed.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::DEFAULT_LOG_LIMIT;
use crate::error::{remote_outcome, ErrorKind, RemoteOutcome};
use crate::http::{ApiRequest, Transport, TransportError};
use crate::logs::schema::{LogRecord, SourceKind, Subtype};

/// Failure of a log query or artifact listing.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Not allowed: {0}")]
    Precondition(String),

    #[error("Log store reported an error: {message}")]
    Remote { message: String },

    #[error("Malformed response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Remote { .. } => ErrorKind::RemoteFailure,
            Self::Malformed { .. } => ErrorKind::Protocol,
        }
    }

    pub(crate) fn malformed(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }
}

/// Normalizes a lower-bound timestamp for the `timestamp` query parameter.
///
/// RFC 3339 values pass through unchanged. Naive `YYYY-MM-DDTHH:MM` and
/// `YYYY-MM-DDTHH:MM:SS` values (as produced by datetime pickers) are read
/// as UTC and rendered with seconds and a `Z` suffix.
pub fn normalize_timestamp(raw: &str) -> Result<String, QueryError> {
    let raw = raw.trim();
    if DateTime::parse_from_rfc3339(raw).is_ok() {
        return Ok(raw.to_string());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .ok_or_else(|| {
            QueryError::Validation(format!(
                "'{raw}' is not an RFC 3339 timestamp or YYYY-MM-DDTHH:MM[:SS]"
            ))
        })
}

/// Filters for one log retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    source_kind: SourceKind,
    subtype: Option<Subtype>,
    limit: NonZeroU32,
    event_id_filter: Option<String>,
    since_timestamp: Option<String>,
}

impl LogQuery {
    pub fn new(source_kind: SourceKind) -> Self {
        Self {
            source_kind,
            subtype: None,
            limit: NonZeroU32::new(DEFAULT_LOG_LIMIT).unwrap_or(NonZeroU32::MIN),
            event_id_filter: None,
            since_timestamp: None,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn subtype(&self) -> Option<Subtype> {
        self.subtype
    }

    pub fn limit(&self) -> NonZeroU32 {
        self.limit
    }

    pub fn event_id_filter(&self) -> Option<&str> {
        self.event_id_filter.as_deref()
    }

    pub fn since_timestamp(&self) -> Option<&str> {
        self.since_timestamp.as_deref()
    }

    pub fn with_subtype(mut self, subtype: Subtype) -> Result<Self, QueryError> {
        if subtype.source_kind() != self.source_kind {
            return Err(QueryError::Validation(format!(
                "{subtype} events do not belong to {}",
                self.source_kind
            )));
        }
        self.subtype = Some(subtype);
        Ok(self)
    }

    pub fn with_limit(mut self, limit: u32) -> Result<Self, QueryError> {
        self.limit = NonZeroU32::new(limit)
            .ok_or_else(|| QueryError::Validation("limit must be greater than zero".to_string()))?;
        Ok(self)
    }

    /// Blank filters are treated as absent.
    #[must_use]
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        let event_id = event_id.trim();
        self.event_id_filter = (!event_id.is_empty()).then(|| event_id.to_string());
        self
    }

    pub fn since(mut self, timestamp: &str) -> Result<Self, QueryError> {
        self.since_timestamp = Some(normalize_timestamp(timestamp)?);
        Ok(self)
    }

    pub fn endpoint(&self) -> String {
        format!("/{}/logs", self.source_kind)
    }

    fn to_request(&self) -> ApiRequest {
        ApiRequest::get(self.endpoint())
            .query("limit", self.limit)
            .query_opt("event_id", self.event_id_filter())
            .query_opt("timestamp", self.since_timestamp())
            .query_opt("type", self.subtype.map(Subtype::as_str))
    }
}

/// Records returned by one query, in the order the store returned them.
///
/// Iterating consumes the snapshot.
#[derive(Debug)]
pub struct LogSnapshot {
    query: LogQuery,
    records: std::vec::IntoIter<LogRecord>,
}

impl LogSnapshot {
    pub fn query(&self) -> &LogQuery {
        &self.query
    }

    /// Records not yet consumed.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() == 0
    }

    pub fn into_records(self) -> Vec<LogRecord> {
        self.records.collect()
    }
}

impl Iterator for LogSnapshot {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for LogSnapshot {}

/// Executes log queries. Holds no per-query state, so one engine can serve
/// concurrent queries for different sources.
#[derive(Clone)]
pub struct LogQueryEngine {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for LogQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogQueryEngine").finish_non_exhaustive()
    }
}

impl LogQueryEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn query(&self, query: &LogQuery) -> Result<LogSnapshot, QueryError> {
        let endpoint = query.endpoint();
        let body = self.transport.call(query.to_request()).await?;
        let mut records = parse_logs(&endpoint, body)?;

        let limit = query.limit.get() as usize;
        if records.len() > limit {
            warn!(
                source = %query.source_kind,
                returned = records.len(),
                limit,
                "log store returned more records than requested, truncating"
            );
            records.truncate(limit);
        }
        debug!(
            source = %query.source_kind,
            subtype = ?query.subtype,
            records = records.len(),
            "log query completed"
        );

        Ok(LogSnapshot {
            query: query.clone(),
            records: records.into_iter(),
        })
    }
}

fn parse_logs(endpoint: &str, body: Value) -> Result<Vec<LogRecord>, QueryError> {
    match remote_outcome(&body) {
        Some(RemoteOutcome::Success) => {}
        Some(RemoteOutcome::Failure(reason)) => {
            error!(endpoint, "log query failed: {reason}");
            return Err(QueryError::Remote { message: reason });
        }
        None => return Err(QueryError::malformed(endpoint, "missing boolean `success` field")),
    }

    let Value::Object(mut object) = body else {
        return Err(QueryError::malformed(endpoint, "response is not an object"));
    };
    let Some(Value::Array(logs)) = object.remove("logs") else {
        return Err(QueryError::malformed(endpoint, "missing `logs` array"));
    };
    logs.into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::Object(map) => Ok(LogRecord::from(map)),
            other => Err(QueryError::malformed(
                endpoint,
                format!("log entry {index} is not an object: {other}"),
            )),
        })
        .collect()
}
