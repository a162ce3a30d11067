// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-in for the HoneyDash control API.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::http::{ApiRequest, Transport, TransportError};

#[derive(Debug, Clone)]
struct FakeService {
    installed: bool,
    configured: Option<bool>,
    running: bool,
    path: Option<String>,
}

impl FakeService {
    fn fresh(name: &str) -> Self {
        Self {
            installed: false,
            configured: (name == "cowrie").then_some(false),
            running: false,
            path: None,
        }
    }
}

#[derive(Debug, Default)]
struct FakeTarget {
    installed: bool,
    running: bool,
    token: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    services: HashMap<String, FakeService>,
    target: FakeTarget,
    logs: HashMap<String, Vec<Value>>,
    binaries: HashMap<String, (Vec<Value>, usize)>,
    overrides: HashMap<(Method, String), VecDeque<Value>>,
    failing: HashSet<String>,
    calls: Vec<ApiRequest>,
    sent: Vec<Value>,
}

/// Simulates cowrie, dionaea and the `splunk` target, recording every call.
#[derive(Debug)]
pub(crate) struct FakeControlApi {
    state: Mutex<State>,
}

impl FakeControlApi {
    pub const RELOCATED_SSH_PORT: u16 = 22222;
    const TARGET: &'static str = "splunk";

    pub fn new() -> Self {
        let mut state = State::default();
        for name in ["cowrie", "dionaea"] {
            state.services.insert(name.to_string(), FakeService::fresh(name));
        }
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_service(
        self,
        name: &str,
        installed: bool,
        configured: Option<bool>,
        running: bool,
    ) -> Self {
        self.lock().services.insert(
            name.to_string(),
            FakeService {
                installed,
                configured,
                running,
                path: installed.then(|| format!("/opt/{name}")),
            },
        );
        self
    }

    pub fn with_target(self, installed: bool, running: bool, token: Option<&str>) -> Self {
        self.lock().target = FakeTarget {
            installed,
            running,
            token: token.map(str::to_string),
        };
        self
    }

    pub fn with_logs(self, kind: &str, logs: Vec<Value>) -> Self {
        self.lock().logs.insert(kind.to_string(), logs);
        self
    }

    pub fn with_binaries(self, kind: &str, binaries: Vec<Value>, page_size: usize) -> Self {
        self.lock()
            .binaries
            .insert(kind.to_string(), (binaries, page_size.max(1)));
        self
    }

    /// Queues a canned body for the next call to `path`.
    pub fn respond_once(&self, method: Method, path: &str, body: Value) {
        self.lock()
            .overrides
            .entry((method, path.to_string()))
            .or_default()
            .push_back(body);
    }

    /// Every later call to `path` fails with a network error.
    pub fn fail_path(&self, path: &str) {
        self.lock().failing.insert(path.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.path == path)
            .cloned()
            .collect()
    }

    /// `logs` arrays received by the send endpoint, in order.
    pub fn sent_batches(&self) -> Vec<Value> {
        self.lock().sent.clone()
    }
}

fn param<'a>(request: &'a ApiRequest, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn not_found() -> Value {
    json!({
        "error": "Endpoint not found",
        "message": "The requested route does not exist in the API"
    })
}

fn service_status(name: &str, service: &FakeService) -> Value {
    let mut body = json!({
        "installed": service.installed,
        "running": service.running,
    });
    if let Some(configured) = service.configured {
        body["configured"] = json!(configured);
    }
    if let Some(path) = &service.path {
        body[format!("{name}_path")] = json!(path);
    }
    body
}

fn route_service(name: &str, action: &str, request: &ApiRequest, service: &mut FakeService) -> Value {
    match (&request.method, action) {
        (&Method::GET, "status") => return service_status(name, service),
        (&Method::POST, "install") => {
            service.installed = true;
            if name == "cowrie" {
                service.configured = Some(false);
            }
            service.path = Some(format!("/opt/{name}"));
        }
        (&Method::POST, "configure") => service.configured = Some(true),
        (&Method::POST, "start") => service.running = true,
        (&Method::POST, "stop") => service.running = false,
        (&Method::POST, "cleanup") => *service = FakeService::fresh(name),
        (&Method::POST, "setup-redirect") => {
            return json!({
                "success": true,
                "message": "SSH moved, port 22 now redirected to cowrie",
                "ssh_port": FakeControlApi::RELOCATED_SSH_PORT,
            })
        }
        (&Method::POST, "set-path") => {
            let path = request
                .body
                .as_ref()
                .and_then(|b| b.get("path"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !path.starts_with("/opt/") {
                return json!({
                    "success": false,
                    "message": format!("{path} is not a valid {name} installation"),
                });
            }
            service.installed = true;
            service.path = Some(path.to_string());
            return json!({"success": true, "message": format!("Path successfully set to: {path}"), "path": path});
        }
        _ => return not_found(),
    }
    json!({"success": true, "message": format!("{name} {action} done")})
}

fn route_logs(request: &ApiRequest, logs: &[Value]) -> Value {
    let limit = param(request, "limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(50);
    let text = |log: &Value, field: &str| -> Option<String> {
        log.get(field).and_then(Value::as_str).map(str::to_string)
    };
    let matching: Vec<Value> = logs
        .iter()
        .filter(|log| {
            param(request, "event_id")
                .map_or(true, |id| text(log, "eventid").is_some_and(|e| e.contains(id)))
        })
        .filter(|log| {
            param(request, "type").map_or(true, |t| text(log, "type").as_deref() == Some(t))
        })
        .filter(|log| {
            param(request, "timestamp")
                .map_or(true, |since| text(log, "timestamp").is_some_and(|ts| ts.as_str() >= since))
        })
        .take(limit)
        .cloned()
        .collect();
    json!({"success": true, "logs": matching})
}

fn route_binaries(request: &ApiRequest, listing: Option<&(Vec<Value>, usize)>) -> Value {
    let page = param(request, "page")
        .and_then(|p| p.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    let Some((binaries, page_size)) = listing else {
        return json!({"binaries": [], "total_pages": 0});
    };
    let total_pages = binaries.len().div_ceil(*page_size);
    let items: Vec<Value> = binaries
        .iter()
        .skip((page - 1) * page_size)
        .take(*page_size)
        .cloned()
        .collect();
    json!({"binaries": items, "total_pages": total_pages})
}

fn route_target(action: &str, request: &ApiRequest, state: &mut State) -> Value {
    let target = &mut state.target;
    match (&request.method, action) {
        (&Method::GET, "status") => json!({
            "installed": target.installed,
            "running": target.running,
            "token": target.token,
        }),
        (&Method::POST, "start") => {
            target.running = true;
            json!({"success": true, "message": "Splunk started"})
        }
        (&Method::POST, "stop") => {
            target.running = false;
            json!({"success": true, "message": "Splunk stopped"})
        }
        (&Method::GET, "search") => match &target.token {
            Some(token) => json!({"success": true, "token": token, "message": "Token found"}),
            None => json!({"success": false, "token": null, "message": "HoneyDash token not found"}),
        },
        (&Method::POST, "create") => {
            let token = target
                .token
                .get_or_insert_with(|| "0f6c1d3e-hd-token".to_string())
                .clone();
            json!({"token": token, "message": "Token created"})
        }
        (&Method::POST, "send") => {
            if target.token.is_none() {
                return json!({"success": false, "message": "No HEC token available"});
            }
            let logs = request
                .body
                .as_ref()
                .and_then(|b| b.get("logs"))
                .cloned()
                .unwrap_or(Value::Null);
            state.sent.push(logs);
            json!({"success": true, "message": "Events sent to Splunk"})
        }
        _ => not_found(),
    }
}

#[async_trait]
impl Transport for FakeControlApi {
    async fn call(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let mut state = self.lock();
        state.calls.push(request.clone());

        if state.failing.contains(&request.path) {
            return Err(TransportError::Network {
                path: request.path.clone(),
                message: "connection refused".to_string(),
            });
        }
        let key = (request.method.clone(), request.path.clone());
        if let Some(body) = state.overrides.get_mut(&key).and_then(VecDeque::pop_front) {
            return Ok(body);
        }

        let mut segments = request.path.trim_start_matches('/').splitn(2, '/');
        let (prefix, action) = match (segments.next(), segments.next()) {
            (Some(prefix), Some(action)) => (prefix.to_string(), action.to_string()),
            _ => return Ok(not_found()),
        };

        let body = if prefix == Self::TARGET {
            route_target(&action, &request, &mut state)
        } else if action == "logs" && request.method == Method::GET {
            let logs = state.logs.get(&prefix).cloned().unwrap_or_default();
            route_logs(&request, &logs)
        } else if action == "binaries" && request.method == Method::GET {
            route_binaries(&request, state.binaries.get(&prefix))
        } else if let Some(service) = state.services.get_mut(&prefix) {
            route_service(&prefix, &action, &request, service)
        } else {
            not_found()
        };
        Ok(body)
    }
}
