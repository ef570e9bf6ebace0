//! Mock Hue bridge HTTP server
//!
//! Serves the subset of the Hue v1 API the bridge client uses, keeps light
//! state in memory and records every state change. Used by the
//! `mock_bridge` binary for local runs and by the integration tests.

use crate::domain::types::{SwitchIndex, SwitchState};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct MockLight {
    pub name: String,
    pub on: bool,
    pub reachable: bool,
}

impl MockLight {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), on: false, reachable: true }
    }
}

/// A state change accepted by the mock
#[derive(Debug, Clone)]
pub struct StateChange {
    pub index: SwitchIndex,
    pub state: SwitchState,
    pub at: Instant,
}

#[derive(Debug)]
struct MockBridgeState {
    user: String,
    lights: BTreeMap<u32, MockLight>,
    changes: Vec<StateChange>,
    lookups: u64,
}

#[derive(Debug, Deserialize)]
struct StateBody {
    on: Option<bool>,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

/// Hue-style error list, returned with HTTP 200 like the real bridge
fn api_error(error_type: u32, address: &str, description: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        serde_json::json!([{
            "error": { "type": error_type, "address": address, "description": description }
        }]),
    )
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from("Not Found")))
        .expect("static response should not fail")
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<Mutex<MockBridgeState>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let (user, id, is_state) = match segments.as_slice() {
        ["api", user, "lights", id] => (*user, *id, false),
        ["api", user, "lights", id, "state"] => (*user, *id, true),
        _ => return Ok(not_found()),
    };
    let address = format!("/lights/{}", id);

    if user != state.lock().user {
        return Ok(api_error(1, &address, "unauthorized user"));
    }
    let Ok(index) = id.parse::<u32>() else {
        return Ok(api_error(3, &address, &format!("resource, {}, not available", address)));
    };

    match (method, is_state) {
        (Method::GET, false) => {
            let mut state = state.lock();
            state.lookups += 1;
            match state.lights.get(&index) {
                Some(light) => Ok(json_response(
                    StatusCode::OK,
                    serde_json::json!({
                        "state": { "on": light.on, "reachable": light.reachable },
                        "type": "On/Off plug-in unit",
                        "name": light.name,
                    }),
                )),
                None => Ok(api_error(3, &address, &format!("resource, {}, not available", address))),
            }
        }
        (Method::PUT, true) => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return Ok(api_error(2, &address, "body contains invalid json")),
            };
            let Ok(StateBody { on: Some(on) }) = serde_json::from_slice::<StateBody>(&body) else {
                return Ok(api_error(2, &address, "body contains invalid json"));
            };

            let mut state = state.lock();
            let Some(light) = state.lights.get_mut(&index) else {
                return Ok(api_error(3, &address, &format!("resource, {}, not available", address)));
            };
            light.on = on;
            let switch_state = SwitchState::from(on);
            state.changes.push(StateChange {
                index: SwitchIndex(index),
                state: switch_state,
                at: Instant::now(),
            });
            info!(switch = %index, state = %switch_state, "mock_bridge_state_change");

            let mut success = serde_json::Map::new();
            success.insert(format!("{}/state/on", address), serde_json::Value::Bool(on));
            Ok(json_response(StatusCode::OK, serde_json::json!([{ "success": success }])))
        }
        _ => Ok(not_found()),
    }
}

/// Running mock bridge; stops when the shutdown signal fires
#[derive(Clone)]
pub struct MockBridge {
    addr: SocketAddr,
    state: Arc<Mutex<MockBridgeState>>,
}

impl MockBridge {
    /// Bind and start serving. Pass port 0 to get an ephemeral port.
    pub async fn start(
        bind: SocketAddr,
        user: &str,
        lights: impl IntoIterator<Item = (u32, MockLight)>,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(MockBridgeState {
            user: user.to_string(),
            lights: lights.into_iter().collect(),
            changes: Vec::new(),
            lookups: 0,
        }));

        info!(addr = %addr, "mock_bridge_started");

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _addr)) => {
                                let io = TokioIo::new(stream);
                                let state = server_state.clone();

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        let state = state.clone();
                                        async move { handle_request(req, state).await }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        error!(error = %e, "mock_bridge_http_error");
                                    }
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "mock_bridge_accept_error");
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("mock_bridge_shutdown");
                            return;
                        }
                    }
                }
            }
        });

        Ok(Self { addr, state })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host string suitable for `HueBridge::new`
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// All accepted state changes, oldest first
    pub fn state_changes(&self) -> Vec<StateChange> {
        self.state.lock().changes.clone()
    }

    pub fn lookups(&self) -> u64 {
        self.state.lock().lookups
    }

    /// Current on/off state of a light, `None` if it doesn't exist
    pub fn is_on(&self, index: u32) -> Option<bool> {
        self.state.lock().lights.get(&index).map(|l| l.on)
    }
}
