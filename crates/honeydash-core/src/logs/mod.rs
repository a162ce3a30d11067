// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Honeypot event retrieval and field projection.

pub mod projection;
pub mod query;
pub mod schema;

pub use projection::{project, project_record, FieldSelection, ProjectionSpec};
pub use query::{normalize_timestamp, LogQuery, LogQueryEngine, LogSnapshot, QueryError};
pub use schema::{LogRecord, LogSchema, SchemaRegistry, SourceKind, Subtype};
