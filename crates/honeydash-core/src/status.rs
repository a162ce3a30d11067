// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Combined status view over every managed service and the forwarding target.
//!
//! Status reads fan out concurrently and are joined only to build the
//! snapshot; a slow or failing service never blocks or hides the others.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::HoneydashError;
use crate::http::Transport;
use crate::services::{fetch_service_status, ServiceDescriptor, ServiceStatus};
use crate::siem::{fetch_target_status, ForwardingTargetStatus};

/// Presentation tag for a honeypot service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceTag {
    NotInstalled,
    InstalledUnconfigured,
    Ready,
    Running,
}

impl ServiceTag {
    pub fn from_status(status: &ServiceStatus) -> Self {
        if status.running {
            Self::Running
        } else if !status.installed {
            Self::NotInstalled
        } else if status.configured == Some(false) {
            Self::InstalledUnconfigured
        } else {
            Self::Ready
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not-installed",
            Self::InstalledUnconfigured => "installed-unconfigured",
            Self::Ready => "ready",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation tag for the forwarding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetTag {
    NotInstalled,
    Stopped,
    /// Running without a collector token: action required before forwarding.
    RunningUncredentialed,
    /// Running with a collector token: ready to forward.
    Ready,
}

impl TargetTag {
    pub fn from_status(status: &ForwardingTargetStatus) -> Self {
        match (status.installed, status.running, status.credential_present) {
            (false, _, _) => Self::NotInstalled,
            (true, false, _) => Self::Stopped,
            (true, true, false) => Self::RunningUncredentialed,
            (true, true, true) => Self::Ready,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not-installed",
            Self::Stopped => "stopped",
            Self::RunningUncredentialed => "running-uncredentialed",
            Self::Ready => "ready",
        }
    }

    pub fn action_required(self) -> bool {
        matches!(self, Self::RunningUncredentialed)
    }
}

impl fmt::Display for TargetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one service in an aggregate snapshot.
#[derive(Debug)]
pub struct ServiceSnapshot {
    pub descriptor: ServiceDescriptor,
    pub status: Result<ServiceStatus, HoneydashError>,
}

impl ServiceSnapshot {
    /// `None` when the status read failed.
    pub fn tag(&self) -> Option<ServiceTag> {
        self.status.as_ref().ok().map(ServiceTag::from_status)
    }
}

/// Status of every service and of the forwarding target at one point in time.
#[derive(Debug)]
pub struct AggregateSnapshot {
    pub services: Vec<ServiceSnapshot>,
    pub target_name: String,
    pub target: Result<ForwardingTargetStatus, HoneydashError>,
}

impl AggregateSnapshot {
    pub fn service(&self, name: &str) -> Option<&ServiceSnapshot> {
        self.services.iter().find(|s| s.descriptor.name == name)
    }

    pub fn target_tag(&self) -> Option<TargetTag> {
        self.target.as_ref().ok().map(TargetTag::from_status)
    }

    /// Whether every read in the snapshot succeeded.
    pub fn is_complete(&self) -> bool {
        self.target.is_ok() && self.services.iter().all(|s| s.status.is_ok())
    }
}

/// Polls every managed service and the forwarding target.
pub struct StatusAggregator {
    services: Vec<ServiceDescriptor>,
    target_name: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusAggregator")
            .field("services", &self.services)
            .field("target_name", &self.target_name)
            .finish()
    }
}

impl StatusAggregator {
    pub fn new(
        services: Vec<ServiceDescriptor>,
        target_name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            services,
            target_name: target_name.into(),
            transport,
        }
    }

    /// Issues all status reads concurrently and joins them into one snapshot.
    ///
    /// Individual failures are kept in the snapshot; this never fails as a whole.
    pub async fn poll(&self) -> AggregateSnapshot {
        let transport = self.transport.as_ref();
        let service_reads = join_all(
            self.services
                .iter()
                .map(|descriptor| fetch_service_status(transport, descriptor)),
        );
        let target_read = fetch_target_status(transport, &self.target_name);
        let (statuses, target) = tokio::join!(service_reads, target_read);

        let services = self
            .services
            .iter()
            .cloned()
            .zip(statuses)
            .map(|(descriptor, status)| {
                match &status {
                    Ok(status) => debug!(
                        service = %descriptor.name,
                        tag = %ServiceTag::from_status(status),
                        "status polled"
                    ),
                    Err(e) => warn!(service = %descriptor.name, "status poll failed: {e}"),
                }
                ServiceSnapshot { descriptor, status }
            })
            .collect();
        if let Err(e) = &target {
            warn!(target_name = %self.target_name, "status poll failed: {e}");
        }

        AggregateSnapshot {
            services,
            target_name: self.target_name.clone(),
            target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::{ApiRequest, TransportError};
    use crate::test_support::FakeControlApi;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Holds each read until the barrier has seen every expected read.
    struct BarrierTransport {
        api: FakeControlApi,
        barrier: Barrier,
    }

    #[async_trait]
    impl Transport for BarrierTransport {
        async fn call(&self, request: ApiRequest) -> Result<Value, TransportError> {
            self.barrier.wait().await;
            self.api.call(request).await
        }
    }

    #[test]
    fn test_service_tags() {
        let cases = [
            (false, Some(false), false, ServiceTag::NotInstalled),
            (true, Some(false), false, ServiceTag::InstalledUnconfigured),
            (true, Some(true), false, ServiceTag::Ready),
            (true, None, false, ServiceTag::Ready),
            (true, Some(true), true, ServiceTag::Running),
            (true, None, true, ServiceTag::Running),
        ];
        for (installed, configured, running, expected) in cases {
            let status = ServiceStatus {
                installed,
                configured,
                running,
                ..Default::default()
            };
            assert_eq!(ServiceTag::from_status(&status), expected, "{status:?}");
        }
    }

    #[test]
    fn test_target_tags() {
        let tag = |installed, running, credential_present| {
            TargetTag::from_status(&ForwardingTargetStatus {
                installed,
                running,
                credential_present,
            })
        };
        assert_eq!(tag(false, false, false), TargetTag::NotInstalled);
        assert_eq!(tag(true, false, true), TargetTag::Stopped);
        assert_eq!(tag(true, true, false), TargetTag::RunningUncredentialed);
        assert!(tag(true, true, false).action_required());
        assert_eq!(tag(true, true, true), TargetTag::Ready);
        assert!(!tag(true, true, true).action_required());
    }

    #[test]
    fn test_tags_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ServiceTag::InstalledUnconfigured).unwrap(),
            "\"installed-unconfigured\""
        );
        assert_eq!(
            serde_json::to_string(&TargetTag::RunningUncredentialed).unwrap(),
            "\"running-uncredentialed\""
        );
    }

    #[tokio::test]
    async fn test_poll_collects_every_service() {
        let api = Arc::new(
            FakeControlApi::new()
                .with_service("cowrie", true, Some(true), true)
                .with_target(true, true, None),
        );
        let aggregator = StatusAggregator::new(ServiceDescriptor::builtin(), "splunk", api.clone());

        let snapshot = aggregator.poll().await;
        assert!(snapshot.is_complete());
        assert_eq!(
            snapshot.service("cowrie").unwrap().tag(),
            Some(ServiceTag::Running)
        );
        assert_eq!(
            snapshot.service("dionaea").unwrap().tag(),
            Some(ServiceTag::NotInstalled)
        );
        assert_eq!(
            snapshot.target_tag(),
            Some(TargetTag::RunningUncredentialed)
        );
        assert_eq!(api.call_count(), 3);
    }

    #[tokio::test]
    async fn test_one_failing_service_does_not_hide_others() {
        let api = Arc::new(FakeControlApi::new().with_service("dionaea", true, None, false));
        api.fail_path("/cowrie/status");
        let aggregator = StatusAggregator::new(ServiceDescriptor::builtin(), "splunk", api);

        let snapshot = aggregator.poll().await;
        assert!(!snapshot.is_complete());
        let cowrie = snapshot.service("cowrie").unwrap();
        assert_eq!(
            cowrie.status.as_ref().unwrap_err().kind(),
            ErrorKind::Transport
        );
        assert_eq!(cowrie.tag(), None);
        assert_eq!(
            snapshot.service("dionaea").unwrap().tag(),
            Some(ServiceTag::Ready)
        );
        assert_eq!(snapshot.target_tag(), Some(TargetTag::NotInstalled));
    }

    #[tokio::test]
    async fn test_poll_reads_are_in_flight_together() {
        // Two services plus the target; a sequential poll would never release
        // the first read.
        let transport = Arc::new(BarrierTransport {
            api: FakeControlApi::new().with_target(true, false, None),
            barrier: Barrier::new(3),
        });
        let aggregator =
            StatusAggregator::new(ServiceDescriptor::builtin(), "splunk", transport.clone());

        let snapshot = tokio::time::timeout(Duration::from_secs(5), aggregator.poll())
            .await
            .expect("status reads were issued one after another");
        assert!(snapshot.is_complete());
        assert_eq!(transport.api.call_count(), 3);
        assert_eq!(snapshot.target_tag(), Some(TargetTag::Stopped));
    }
}
