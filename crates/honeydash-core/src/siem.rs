// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Control of the SIEM forwarding target (a Splunk instance with an HTTP
//! Event Collector token dedicated to the dashboard).
//!
//! The target is not installed from here; it can only be started, stopped
//! and provisioned with the collector token the forwarding pipeline needs.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{remote_outcome, remote_reason, HoneydashError, RemoteOutcome};
use crate::http::{ApiRequest, Transport};

/// Last observed status of the forwarding target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwardingTargetStatus {
    pub installed: bool,
    pub running: bool,
    /// Whether a collector token is available for forwarding.
    pub credential_present: bool,
}

impl ForwardingTargetStatus {
    /// Parses `GET /{target}/status`: `{installed, running, token}`.
    ///
    /// The token value itself is not kept; only its presence matters here.
    pub fn from_response(endpoint: &str, body: &Value) -> Result<Self, HoneydashError> {
        let Some(object) = body.as_object() else {
            return Err(HoneydashError::protocol(endpoint, "status is not a JSON object"));
        };
        let flag = |key: &str| object.get(key).and_then(Value::as_bool);
        let (Some(installed), Some(running)) = (flag("installed"), flag("running")) else {
            if object.contains_key("error") {
                return Err(HoneydashError::RemoteFailure {
                    message: remote_reason(body),
                });
            }
            return Err(HoneydashError::protocol(
                endpoint,
                "missing boolean `installed`/`running` fields",
            ));
        };
        let credential_present = object
            .get("token")
            .and_then(Value::as_str)
            .is_some_and(|token| !token.trim().is_empty());

        let status = Self {
            installed,
            running,
            credential_present,
        };
        if !status.is_consistent() {
            return Err(HoneydashError::protocol(
                endpoint,
                format!(
                    "inconsistent status installed={} running={} credential_present={}",
                    status.installed, status.running, status.credential_present
                ),
            ));
        }
        Ok(status)
    }

    /// `credential_present ⇒ installed` and `running ⇒ installed`.
    pub fn is_consistent(&self) -> bool {
        (!self.credential_present || self.installed) && (!self.running || self.installed)
    }

    /// Whether a batch may be forwarded to this target.
    pub fn ready_to_forward(&self) -> bool {
        self.installed && self.credential_present
    }
}

/// Operations currently valid for the forwarding target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetAffordances {
    pub start: bool,
    pub stop: bool,
    pub search_token: bool,
    pub create_token: bool,
    pub forward: bool,
}

impl TargetAffordances {
    pub fn from_status(status: &ForwardingTargetStatus) -> Self {
        Self {
            start: status.installed && !status.running,
            stop: status.running,
            search_token: status.running,
            create_token: status.running && !status.credential_present,
            forward: status.ready_to_forward(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetOperation {
    Start,
    Stop,
    SearchToken,
    CreateToken,
}

impl fmt::Display for TargetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::SearchToken => "search",
            Self::CreateToken => "create",
        })
    }
}

/// Result of a completed target operation and the status read that followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub operation: TargetOperation,
    pub message: Option<String>,
    /// Status read after the operation; `None` when that read failed.
    pub status: Option<ForwardingTargetStatus>,
    /// Why the follow-up status read failed. The operation itself was applied.
    pub refresh_error: Option<String>,
}

/// Drives the forwarding target. Every operation is followed by a status read.
pub struct ForwardingTargetController {
    name: String,
    transport: Arc<dyn Transport>,
    status: Option<ForwardingTargetStatus>,
    affordances: TargetAffordances,
}

impl fmt::Debug for ForwardingTargetController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingTargetController")
            .field("target", &self.name)
            .field("status", &self.status)
            .field("affordances", &self.affordances)
            .finish()
    }
}

impl ForwardingTargetController {
    /// `name` is the endpoint prefix of the target, e.g. `splunk`.
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            status: None,
            affordances: TargetAffordances::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Option<&ForwardingTargetStatus> {
        self.status.as_ref()
    }

    pub fn affordances(&self) -> TargetAffordances {
        self.affordances
    }

    pub async fn refresh(&mut self) -> Result<ForwardingTargetStatus, HoneydashError> {
        let result = fetch_target_status(self.transport.as_ref(), &self.name).await;
        match &result {
            Ok(status) => {
                self.affordances = TargetAffordances::from_status(status);
                self.status = Some(status.clone());
            }
            Err(e) => {
                warn!(target_name = %self.name, "status read failed: {e}");
                self.status = None;
                self.affordances = TargetAffordances::default();
            }
        }
        result
    }

    async fn observed(&mut self) -> Result<ForwardingTargetStatus, HoneydashError> {
        match &self.status {
            Some(status) => Ok(status.clone()),
            None => self.refresh().await,
        }
    }

    pub async fn start(&mut self) -> Result<TargetReport, HoneydashError> {
        let status = self.observed().await?;
        if !status.installed {
            return Err(self.precondition("is not installed"));
        }
        if status.running {
            return Err(self.precondition("is already running"));
        }
        self.perform(TargetOperation::Start).await
    }

    pub async fn stop(&mut self) -> Result<TargetReport, HoneydashError> {
        if !self.observed().await?.running {
            return Err(self.precondition("is not running"));
        }
        self.perform(TargetOperation::Stop).await
    }

    /// Asks the target to locate the dashboard's collector token.
    ///
    /// A search that finds nothing is reported as a remote failure; the
    /// refreshed status then shows the credential as absent.
    pub async fn search_token(&mut self) -> Result<TargetReport, HoneydashError> {
        if !self.observed().await?.running {
            return Err(self.precondition("must be running to search for its token"));
        }
        self.perform(TargetOperation::SearchToken).await
    }

    /// Creates the collector token unless one already exists.
    pub async fn ensure_token(&mut self) -> Result<TargetReport, HoneydashError> {
        let status = self.observed().await?;
        if !status.running {
            return Err(self.precondition("must be running to create its token"));
        }
        if status.credential_present {
            let status = self.refresh().await?;
            if status.credential_present {
                return Ok(TargetReport {
                    operation: TargetOperation::CreateToken,
                    message: Some("collector token already exists".to_string()),
                    status: Some(status),
                    refresh_error: None,
                });
            }
        }
        self.perform(TargetOperation::CreateToken).await
    }

    async fn perform(&mut self, operation: TargetOperation) -> Result<TargetReport, HoneydashError> {
        let endpoint = format!("/{}/{}", self.name, operation);
        let request = match operation {
            TargetOperation::SearchToken => ApiRequest::get(&endpoint),
            _ => ApiRequest::post(&endpoint),
        };

        debug!(target_name = %self.name, %operation, "sending operation");
        let response = self.transport.call(request).await;
        let refreshed = self.refresh().await;
        let body = response?;

        let message = body.get("message").and_then(Value::as_str).map(str::to_string);
        let succeeded = match (operation, remote_outcome(&body)) {
            (_, Some(RemoteOutcome::Failure(reason))) => {
                error!(target_name = %self.name, %operation, "remote failure: {reason}");
                return Err(HoneydashError::RemoteFailure { message: reason });
            }
            (_, Some(RemoteOutcome::Success)) => true,
            // Token creation answers `{token, message}` without a success flag.
            (TargetOperation::CreateToken, None) => body
                .get("token")
                .and_then(Value::as_str)
                .is_some_and(|token| !token.is_empty()),
            (_, None) => {
                return Err(HoneydashError::protocol(
                    &endpoint,
                    "missing boolean `success` field",
                ))
            }
        };
        if !succeeded {
            return Err(HoneydashError::RemoteFailure {
                message: message.unwrap_or_else(|| "token was not created".to_string()),
            });
        }

        let (status, refresh_error) = match refreshed {
            Ok(status) => {
                info!(
                    target_name = %self.name,
                    %operation,
                    running = status.running,
                    credential_present = status.credential_present,
                    "operation completed"
                );
                (Some(status), None)
            }
            Err(e) => {
                warn!(
                    target_name = %self.name,
                    %operation,
                    "operation completed but status re-read failed: {e}"
                );
                (None, Some(e.to_string()))
            }
        };
        Ok(TargetReport {
            operation,
            message,
            status,
            refresh_error,
        })
    }

    fn precondition(&self, reason: &str) -> HoneydashError {
        HoneydashError::Precondition(format!("forwarding target {} {reason}", self.name))
    }
}

/// Reads and parses `GET /{target}/status`.
pub async fn fetch_target_status(
    transport: &dyn Transport,
    name: &str,
) -> Result<ForwardingTargetStatus, HoneydashError> {
    let endpoint = format!("/{name}/status");
    let body = transport.call(ApiRequest::get(&endpoint)).await?;
    ForwardingTargetStatus::from_response(&endpoint, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::FakeControlApi;
    use reqwest::Method;
    use serde_json::json;

    #[test]
    fn test_status_parsing() {
        let status = ForwardingTargetStatus::from_response(
            "/splunk/status",
            &json!({"installed": true, "running": true, "token": "7d3c-11ee"}),
        )
        .unwrap();
        assert!(status.credential_present);
        assert!(status.ready_to_forward());

        let status = ForwardingTargetStatus::from_response(
            "/splunk/status",
            &json!({"installed": true, "running": true, "token": null}),
        )
        .unwrap();
        assert!(!status.credential_present);
        assert!(!status.ready_to_forward());
    }

    #[test]
    fn test_status_parsing_rejects_credential_without_install() {
        let err = ForwardingTargetStatus::from_response(
            "/splunk/status",
            &json!({"installed": false, "running": false, "token": "abc"}),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_affordances() {
        let stopped = ForwardingTargetStatus {
            installed: true,
            ..Default::default()
        };
        let a = TargetAffordances::from_status(&stopped);
        assert!(a.start && !a.stop && !a.search_token && !a.forward);

        let uncredentialed = ForwardingTargetStatus {
            installed: true,
            running: true,
            credential_present: false,
        };
        let a = TargetAffordances::from_status(&uncredentialed);
        assert!(!a.start && a.stop && a.search_token && a.create_token && !a.forward);

        let ready = ForwardingTargetStatus {
            credential_present: true,
            ..uncredentialed
        };
        let a = TargetAffordances::from_status(&ready);
        assert!(!a.create_token && a.forward);
    }

    #[tokio::test]
    async fn test_start_then_create_token() {
        let api = Arc::new(FakeControlApi::new().with_target(true, false, None));
        let mut splunk = ForwardingTargetController::new("splunk", api.clone());

        let report = splunk.start().await.unwrap();
        assert!(report.status.as_ref().unwrap().running);
        assert!(!report.status.as_ref().unwrap().credential_present);

        let err = splunk.search_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert!(!splunk.affordances().forward);

        let report = splunk.ensure_token().await.unwrap();
        assert!(report.status.as_ref().unwrap().credential_present);
        assert!(splunk.affordances().forward);
        assert_eq!(api.calls_to("/splunk/create").len(), 1);
        assert_eq!(api.calls_to("/splunk/search")[0].method, Method::GET);
    }

    #[tokio::test]
    async fn test_ensure_token_skips_creation_when_present() {
        let api = Arc::new(FakeControlApi::new().with_target(true, true, Some("tok")));
        let mut splunk = ForwardingTargetController::new("splunk", api.clone());
        splunk.refresh().await.unwrap();

        let report = splunk.ensure_token().await.unwrap();
        assert_eq!(report.operation, TargetOperation::CreateToken);
        assert!(api.calls_to("/splunk/create").is_empty());
    }

    #[tokio::test]
    async fn test_start_requires_installation() {
        let api = Arc::new(FakeControlApi::new());
        let mut splunk = ForwardingTargetController::new("splunk", api.clone());
        let err = splunk.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(api.calls_to("/splunk/start").is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_followed_by_status_read() {
        let api = Arc::new(FakeControlApi::new().with_target(true, true, Some("tok")));
        let mut splunk = ForwardingTargetController::new("splunk", api.clone());
        let report = splunk.stop().await.unwrap();
        assert!(!report.status.as_ref().unwrap().running);
        assert_eq!(api.calls_to("/splunk/status").len(), 2);
    }

    #[tokio::test]
    async fn test_applied_operation_survives_failed_status_read() {
        let api = Arc::new(FakeControlApi::new().with_target(true, true, None));
        let mut splunk = ForwardingTargetController::new("splunk", api.clone());
        splunk.refresh().await.unwrap();
        api.fail_path("/splunk/status");

        let report = splunk.ensure_token().await.unwrap();
        assert_eq!(api.calls_to("/splunk/create").len(), 1);
        assert!(report.status.is_none());
        assert!(report.refresh_error.is_some());
        assert!(splunk.status().is_none());
    }
}
