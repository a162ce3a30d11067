// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

use crate::http::TransportError;
use serde_json::Value;

/// Coarse classification shared by every error type in the crate.
///
/// Callers use it to decide how to present a failure without matching on
/// each module's error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad local input; never reached the transport.
    Validation,
    /// Network or decoding failure.
    Transport,
    /// Operation invalid in the last observed state; never reached the transport.
    Precondition,
    /// Well-formed response carrying `success: false`.
    RemoteFailure,
    /// Response missing its expected top-level shape.
    Protocol,
}

/// Errors that can occur when driving services through the control API
#[derive(Debug, thiserror::Error)]
pub enum HoneydashError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Operation not allowed: {0}")]
    Precondition(String),

    #[error("Remote operation failed: {message}")]
    RemoteFailure { message: String },

    #[error("Unexpected response from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },
}

impl HoneydashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::RemoteFailure { .. } => ErrorKind::RemoteFailure,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    pub(crate) fn protocol(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result of an operation as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteOutcome {
    Success,
    Failure(String),
}

/// Reads the `success` flag of an operation response.
///
/// Returns `None` when the payload is not an object carrying a boolean
/// `success`, which callers report as a protocol violation.
pub(crate) fn remote_outcome(body: &Value) -> Option<RemoteOutcome> {
    match body.get("success")?.as_bool()? {
        true => Some(RemoteOutcome::Success),
        false => Some(RemoteOutcome::Failure(remote_reason(body))),
    }
}

/// Extracts the server-provided reason from a failure payload.
pub(crate) fn remote_reason(body: &Value) -> String {
    let message = body.get("message").and_then(Value::as_str);
    let error = body.get("error").and_then(Value::as_str);
    match (message, error) {
        (Some(message), Some(error)) if !error.is_empty() && error != message => {
            format!("{message} ({error})")
        }
        (Some(message), _) => message.to_string(),
        (None, Some(error)) => error.to_string(),
        (None, None) => "remote reported failure without a reason".to_string(),
    }
}
