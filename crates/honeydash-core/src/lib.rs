// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! # HoneyDash core
//!
//! Client-side orchestration for the HoneyDash control API: the lifecycle of
//! the cowrie and dionaea honeypots, the SIEM forwarding target, and the
//! query/project/forward pipeline for the events those honeypots record.
//!
//! - [`services`]: per-service lifecycle state machine and its guards
//! - [`siem`]: forwarding target start/stop and collector token handling
//! - [`status`]: concurrent status polling across every managed component
//! - [`logs`]: versioned event schemas, log queries and field projection
//! - [`forwarder`]: one-shot batch delivery to the forwarding target
//! - [`artifacts`]: paginated listing of captured binaries
//!
//! All remote calls go through the [`http::Transport`] trait so the state
//! machines can be exercised without a live API.

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod artifacts;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod logger;
pub mod logs;
pub mod services;
pub mod siem;
pub mod status;

#[cfg(test)]
mod test_support;

pub use config::HoneydashConfig;
pub use error::{ErrorKind, HoneydashError};
pub use http::{HttpTransport, Transport};
