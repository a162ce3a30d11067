// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Sends a projected result set to the SIEM target as one batch.
//!
//! Forwarding is fire-once: nothing is queued or retried, and both readiness
//! checks run before the transport is touched.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::{remote_outcome, ErrorKind, RemoteOutcome};
use crate::http::{ApiRequest, Transport, TransportError};
use crate::logs::LogRecord;
use crate::siem::ForwardingTargetStatus;

/// Why a batch was refused without contacting the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardRejection {
    /// The target is not installed or has no collector token.
    NotReady,
    /// The batch holds no records.
    EmptyBatch,
}

impl ForwardRejection {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::EmptyBatch => "EMPTY_BATCH",
        }
    }
}

impl fmt::Display for ForwardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(
                f,
                "{}: forwarding target is not installed or has no collector token",
                self.code()
            ),
            Self::EmptyBatch => write!(f, "{}: no records to forward", self.code()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Batch rejected: {0}")]
    Rejected(ForwardRejection),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Forwarding target reported an error: {message}")]
    Remote { message: String },

    #[error("Unexpected response from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },
}

impl ForwardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(ForwardRejection::EmptyBatch) => ErrorKind::Validation,
            Self::Rejected(ForwardRejection::NotReady) => ErrorKind::Precondition,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Remote { .. } => ErrorKind::RemoteFailure,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// Reason code for local rejections.
    pub fn rejection(&self) -> Option<ForwardRejection> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Ordered records to deliver in a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardingBatch {
    records: Vec<LogRecord>,
}

impl ForwardingBatch {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn payload(&self) -> Value {
        json!({ "logs": self.records })
    }
}

impl FromIterator<LogRecord> for ForwardingBatch {
    fn from_iter<T: IntoIterator<Item = LogRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Acknowledgement of a delivered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardAck {
    pub records: usize,
    pub message: Option<String>,
}

/// Checks both forwarding preconditions, batch first.
pub fn check_ready(
    target: &ForwardingTargetStatus,
    batch: &ForwardingBatch,
) -> Result<(), ForwardRejection> {
    if batch.is_empty() {
        return Err(ForwardRejection::EmptyBatch);
    }
    if !target.ready_to_forward() {
        return Err(ForwardRejection::NotReady);
    }
    Ok(())
}

/// Whether the forward action should be offered. An unknown target status
/// counts as not ready.
pub fn forward_enabled(target: Option<&ForwardingTargetStatus>, batch: &ForwardingBatch) -> bool {
    target.is_some_and(|target| check_ready(target, batch).is_ok())
}

/// Delivers batches to `POST /{target}/send`.
pub struct Forwarder {
    target_name: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("target_name", &self.target_name)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    pub fn new(target_name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            target_name: target_name.into(),
            transport,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Sends the batch once. `target` is the most recently observed target
    /// status; the caller owns refreshing it and any retry.
    pub async fn forward(
        &self,
        target: &ForwardingTargetStatus,
        batch: &ForwardingBatch,
    ) -> Result<ForwardAck, ForwardError> {
        if let Err(reason) = check_ready(target, batch) {
            debug!(target_name = %self.target_name, code = reason.code(), "batch rejected locally");
            return Err(ForwardError::Rejected(reason));
        }

        let endpoint = format!("/{}/send", self.target_name);
        let body = self
            .transport
            .call(ApiRequest::post(&endpoint).json(batch.payload()))
            .await?;

        match remote_outcome(&body) {
            Some(RemoteOutcome::Success) => {
                info!(
                    target_name = %self.target_name,
                    records = batch.len(),
                    "batch forwarded"
                );
                Ok(ForwardAck {
                    records: batch.len(),
                    message: body.get("message").and_then(Value::as_str).map(str::to_string),
                })
            }
            Some(RemoteOutcome::Failure(message)) => {
                error!(target_name = %self.target_name, "forwarding failed: {message}");
                Err(ForwardError::Remote { message })
            }
            None => Err(ForwardError::Protocol {
                endpoint,
                detail: "missing boolean `success` field".to_string(),
            }),
        }
    }
}
