// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle control for honeypot emulators.
//!
//! One [`LifecycleController`] drives one service through
//! `NotInstalled → Installed → Configured → Running`. The differences between
//! emulators (whether a configuration step exists, whether a port redirect can
//! be set up) live in a [`ServiceDescriptor`] rather than in per-service code.
//!
//! Status is never inferred locally: every operation that reaches the remote
//! side is followed by a fresh `GET /{service}/status`, and the enabled
//! operations ([`Affordances`]) are recomputed from that read.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::{remote_outcome, remote_reason, HoneydashError, RemoteOutcome};
use crate::http::{ApiRequest, Transport};

/// Static description of a managed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Endpoint prefix and log source name, e.g. `cowrie`.
    pub name: String,
    /// Human-readable name used in messages.
    pub display_name: String,
    /// Whether `configure` must run before `start`.
    pub has_configure_step: bool,
    /// Whether the service supports a host-level port redirect.
    pub has_redirect_step: bool,
    /// Status field carrying the install path, e.g. `cowrie_path`.
    pub path_field: String,
}

impl ServiceDescriptor {
    /// SSH/Telnet emulator: configure step plus SSH port redirect.
    pub fn cowrie() -> Self {
        Self {
            name: "cowrie".to_string(),
            display_name: "Cowrie".to_string(),
            has_configure_step: true,
            has_redirect_step: true,
            path_field: "cowrie_path".to_string(),
        }
    }

    /// Multi-protocol emulator: installs and starts without configuration.
    pub fn dionaea() -> Self {
        Self {
            name: "dionaea".to_string(),
            display_name: "Dionaea".to_string(),
            has_configure_step: false,
            has_redirect_step: false,
            path_field: "dionaea_path".to_string(),
        }
    }

    /// Built-in descriptors for every managed honeypot.
    pub fn builtin() -> Vec<Self> {
        vec![Self::cowrie(), Self::dionaea()]
    }

    /// Looks up a built-in descriptor by endpoint name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::builtin().into_iter().find(|d| d.name == name)
    }

    pub fn endpoint(&self, action: &str) -> String {
        format!("/{}/{}", self.name, action)
    }
}

/// Last observed status of a service, as reported by the control API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub installed: bool,
    /// `None` for services without a configuration step.
    pub configured: Option<bool>,
    pub running: bool,
    pub install_path: Option<String>,
    /// Port the emulator listens on, when reported.
    pub port: Option<u16>,
    /// Human-readable summary from the remote side.
    pub message: Option<String>,
}

impl ServiceStatus {
    /// Parses a `GET /{service}/status` payload.
    ///
    /// A payload without boolean `installed`/`running` fields, or one that
    /// breaks `running ⇒ installed` / `configured ⇒ installed`, is a protocol
    /// violation.
    pub fn from_response(
        descriptor: &ServiceDescriptor,
        endpoint: &str,
        body: &Value,
    ) -> Result<Self, HoneydashError> {
        let Some(object) = body.as_object() else {
            return Err(HoneydashError::protocol(endpoint, "status is not a JSON object"));
        };
        let flag = |key: &str| object.get(key).and_then(Value::as_bool);

        let (Some(installed), Some(running)) = (flag("installed"), flag("running")) else {
            // The API answers status failures with `{"error", "message"}`.
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

        let configured = if descriptor.has_configure_step {
            Some(flag("configured").unwrap_or(false))
        } else {
            None
        };

        let status = Self {
            installed,
            configured,
            running,
            install_path: object
                .get(&descriptor.path_field)
                .or_else(|| object.get("install_path"))
                .and_then(Value::as_str)
                .map(str::to_string),
            port: object
                .get(&format!("{}_port", descriptor.name))
                .and_then(Value::as_u64)
                .and_then(|port| u16::try_from(port).ok()),
            message: object
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        if !status.is_consistent() {
            return Err(HoneydashError::protocol(
                endpoint,
                format!(
                    "inconsistent status installed={} configured={:?} running={}",
                    status.installed, status.configured, status.running
                ),
            ));
        }
        Ok(status)
    }

    /// `running ⇒ installed` and `configured ⇒ installed`.
    pub fn is_consistent(&self) -> bool {
        (!self.running || self.installed) && (self.configured != Some(true) || self.installed)
    }

    pub fn phase(&self) -> LifecyclePhase {
        if self.running {
            LifecyclePhase::Running
        } else if !self.installed {
            LifecyclePhase::NotInstalled
        } else if self.configured == Some(true) {
            LifecyclePhase::Configured
        } else {
            LifecyclePhase::Installed
        }
    }
}

/// Position of a service in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecyclePhase {
    NotInstalled,
    Installed,
    Configured,
    Running,
}

/// Operations currently valid for a service.
///
/// A pure function of the last observed [`ServiceStatus`]; recomputed after
/// every status read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub install: bool,
    pub configure: bool,
    pub set_path: bool,
    pub start: bool,
    pub stop: bool,
    pub setup_redirect: bool,
    pub cleanup: bool,
}

impl Affordances {
    pub fn from_status(status: &ServiceStatus, descriptor: &ServiceDescriptor) -> Self {
        Self {
            install: !status.installed,
            configure: descriptor.has_configure_step
                && status.installed
                && status.configured != Some(true),
            set_path: true,
            start: status.installed && status.configured != Some(false) && !status.running,
            stop: status.running,
            setup_redirect: descriptor.has_redirect_step && status.installed,
            cleanup: true,
        }
    }
}

/// Operation names, matching the endpoint segment they post to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Install,
    Configure,
    SetPath,
    Start,
    Stop,
    SetupRedirect,
    Cleanup,
}

impl Operation {
    pub fn segment(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Configure => "configure",
            Self::SetPath => "set-path",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::SetupRedirect => "setup-redirect",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationOutcome {
    /// The remote side performed the operation.
    Applied,
    /// `install` found the service already installed; nothing was sent.
    AlreadyInstalled,
}

/// Result of a completed operation, including the status read that followed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub outcome: OperationOutcome,
    pub message: Option<String>,
    /// Extra fields returned by the remote side (`path`, `ssh_port`, ...).
    pub details: Map<String, Value>,
    /// Status read after the operation; `None` when that read failed.
    pub status: Option<ServiceStatus>,
    /// Why the follow-up status read failed. The operation itself was applied.
    pub refresh_error: Option<String>,
}

/// Side effect of `setup_redirect`, tracked separately from the status triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectInfo {
    /// Port the real SSH daemon was moved to.
    pub relocated_port: Option<u16>,
    pub message: Option<String>,
}

/// Drives one service through its lifecycle.
///
/// Mutating operations take `&mut self`, so a second mutation on the same
/// service cannot start before the previous one (and its status read) has
/// completed.
pub struct LifecycleController {
    descriptor: ServiceDescriptor,
    transport: Arc<dyn Transport>,
    status: Option<ServiceStatus>,
    affordances: Affordances,
    redirect: Option<RedirectInfo>,
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("service", &self.descriptor.name)
            .field("status", &self.status)
            .field("affordances", &self.affordances)
            .field("redirect", &self.redirect)
            .finish()
    }
}

impl LifecycleController {
    pub fn new(descriptor: ServiceDescriptor, transport: Arc<dyn Transport>) -> Self {
        Self {
            descriptor,
            transport,
            status: None,
            affordances: Affordances::default(),
            redirect: None,
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Last observed status, if any read has succeeded.
    pub fn status(&self) -> Option<&ServiceStatus> {
        self.status.as_ref()
    }

    /// Operations valid for the last observed status. Everything is disabled
    /// until a status read succeeds.
    pub fn affordances(&self) -> Affordances {
        self.affordances
    }

    /// Redirect set up by the last successful `setup_redirect`, until cleanup.
    pub fn redirect(&self) -> Option<&RedirectInfo> {
        self.redirect.as_ref()
    }

    /// Reads the current status from the control API.
    ///
    /// On failure the previous observation is discarded, so affordances fall
    /// back to all-disabled instead of reflecting stale state.
    pub async fn refresh(&mut self) -> Result<ServiceStatus, HoneydashError> {
        let result = fetch_service_status(self.transport.as_ref(), &self.descriptor).await;
        match &result {
            Ok(status) => {
                self.affordances = Affordances::from_status(status, &self.descriptor);
                self.status = Some(status.clone());
            }
            Err(e) => {
                warn!(service = %self.descriptor.name, "status read failed: {e}");
                self.status = None;
                self.affordances = Affordances::default();
            }
        }
        result
    }

    async fn observed(&mut self) -> Result<ServiceStatus, HoneydashError> {
        match &self.status {
            Some(status) => Ok(status.clone()),
            None => self.refresh().await,
        }
    }

    /// Installs the service. Reports [`OperationOutcome::AlreadyInstalled`]
    /// without calling `install` when a fresh read confirms it is installed.
    pub async fn install(&mut self) -> Result<OperationReport, HoneydashError> {
        if self.observed().await?.installed {
            let status = self.refresh().await?;
            if status.installed {
                info!(service = %self.descriptor.name, "already installed, skipping install");
                return Ok(OperationReport {
                    operation: Operation::Install,
                    outcome: OperationOutcome::AlreadyInstalled,
                    message: Some(format!(
                        "{} is already installed",
                        self.descriptor.display_name
                    )),
                    details: Map::new(),
                    status: Some(status),
                    refresh_error: None,
                });
            }
        }
        self.perform(Operation::Install, None).await
    }

    pub async fn configure(&mut self) -> Result<OperationReport, HoneydashError> {
        if !self.descriptor.has_configure_step {
            return Err(self.precondition("has no configuration step"));
        }
        let status = self.observed().await?;
        if !status.installed {
            return Err(self.precondition("must be installed before it can be configured"));
        }
        if status.configured == Some(true) {
            return Err(self.precondition("is already configured"));
        }
        self.perform(Operation::Configure, None).await
    }

    /// Points the remote side at an existing installation.
    ///
    /// Valid in any state; the path is validated locally before any call.
    pub async fn set_custom_install_path(
        &mut self,
        path: &str,
    ) -> Result<OperationReport, HoneydashError> {
        let path = validate_install_path(path)?;
        self.perform(Operation::SetPath, Some(json!({ "path": path })))
            .await
    }

    pub async fn start(&mut self) -> Result<OperationReport, HoneydashError> {
        let status = self.observed().await?;
        if !status.installed {
            return Err(self.precondition("must be installed before it can be started"));
        }
        if status.configured == Some(false) {
            return Err(self.precondition("must be configured before it can be started"));
        }
        if status.running {
            return Err(self.precondition("is already running"));
        }
        self.perform(Operation::Start, None).await
    }

    pub async fn stop(&mut self) -> Result<OperationReport, HoneydashError> {
        if !self.observed().await?.running {
            return Err(self.precondition("is not running"));
        }
        self.perform(Operation::Stop, None).await
    }

    /// Redirects the well-known port to the emulator.
    pub async fn setup_redirect(&mut self) -> Result<OperationReport, HoneydashError> {
        if !self.descriptor.has_redirect_step {
            return Err(self.precondition("does not support port redirection"));
        }
        if !self.observed().await?.installed {
            return Err(self.precondition("must be installed before redirecting traffic to it"));
        }
        let report = self.perform(Operation::SetupRedirect, None).await?;
        self.redirect = Some(RedirectInfo {
            relocated_port: report
                .details
                .get("ssh_port")
                .and_then(Value::as_u64)
                .and_then(|port| u16::try_from(port).ok()),
            message: report.message.clone(),
        });
        Ok(report)
    }

    /// Full teardown, valid from any state: stops the service if it is
    /// running, then asks the remote side to revert configuration and
    /// redirection.
    pub async fn cleanup(&mut self) -> Result<OperationReport, HoneydashError> {
        let running = match self.observed().await {
            Ok(status) => status.running,
            Err(e) => {
                warn!(service = %self.descriptor.name, "cleanup without a known status: {e}");
                false
            }
        };
        if running {
            if let Err(e) = self.perform(Operation::Stop, None).await {
                warn!(service = %self.descriptor.name, "stop before cleanup failed: {e}");
            }
        }
        let report = self.perform(Operation::Cleanup, None).await?;
        self.redirect = None;
        Ok(report)
    }

    /// Posts the operation, then re-reads status whatever the outcome.
    async fn perform(
        &mut self,
        operation: Operation,
        body: Option<Value>,
    ) -> Result<OperationReport, HoneydashError> {
        let endpoint = self.descriptor.endpoint(operation.segment());
        let mut request = ApiRequest::post(&endpoint);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(service = %self.descriptor.name, %operation, "sending operation");
        let response = self.transport.call(request).await;
        let refreshed = self.refresh().await;

        let body = response.map_err(|e| {
            error!(service = %self.descriptor.name, %operation, "transport failure: {e}");
            HoneydashError::from(e)
        })?;
        match remote_outcome(&body) {
            None => Err(HoneydashError::protocol(
                &endpoint,
                "missing boolean `success` field",
            )),
            Some(RemoteOutcome::Failure(message)) => {
                error!(service = %self.descriptor.name, %operation, "remote failure: {message}");
                Err(HoneydashError::RemoteFailure { message })
            }
            Some(RemoteOutcome::Success) => {
                // The remote side has applied the operation; a failed re-read
                // must not report it as failed.
                let (status, refresh_error) = match refreshed {
                    Ok(status) => {
                        info!(
                            service = %self.descriptor.name,
                            %operation,
                            phase = ?status.phase(),
                            "operation completed"
                        );
                        (Some(status), None)
                    }
                    Err(e) => {
                        warn!(
                            service = %self.descriptor.name,
                            %operation,
                            "operation completed but status re-read failed: {e}"
                        );
                        (None, Some(e.to_string()))
                    }
                };
                Ok(OperationReport {
                    operation,
                    outcome: OperationOutcome::Applied,
                    message: body.get("message").and_then(Value::as_str).map(str::to_string),
                    details: extra_fields(&body),
                    status,
                    refresh_error,
                })
            }
        }
    }

    fn precondition(&self, reason: &str) -> HoneydashError {
        HoneydashError::Precondition(format!("{} {reason}", self.descriptor.display_name))
    }
}

/// Reads and parses `GET /{service}/status`.
pub async fn fetch_service_status(
    transport: &dyn Transport,
    descriptor: &ServiceDescriptor,
) -> Result<ServiceStatus, HoneydashError> {
    let endpoint = descriptor.endpoint("status");
    let body = transport.call(ApiRequest::get(&endpoint)).await?;
    ServiceStatus::from_response(descriptor, &endpoint, &body)
}

/// Rejects paths the remote side could never accept as an installation
/// directory.
pub fn validate_install_path(path: &str) -> Result<&str, HoneydashError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(HoneydashError::Validation(
            "installation path must not be empty".to_string(),
        ));
    }
    if path.contains('\0') {
        return Err(HoneydashError::Validation(
            "installation path must not contain NUL bytes".to_string(),
        ));
    }
    if !path.starts_with('/') {
        return Err(HoneydashError::Validation(format!(
            "installation path '{path}' must be absolute"
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(HoneydashError::Validation(format!(
            "installation path '{path}' must not contain '..'"
        )));
    }
    Ok(path)
}

fn extra_fields(body: &Value) -> Map<String, Value> {
    body.as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "success" | "message"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
