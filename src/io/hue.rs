//! Hue bridge client (v1 REST API)
//!
//! The switch is a Hue "light" addressed by index:
//! - lookup: `GET  /api/<user>/lights/<index>`
//! - set:    `PUT  /api/<user>/lights/<index>/state` with `{"on": true|false}`
//!
//! The bridge answers API-level failures with HTTP 200 and a JSON array of
//! `{"error": {...}}` entries, so every response body is inspected.

use crate::domain::types::{SwitchIndex, SwitchInfo, SwitchState};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Error entry returned by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: u32,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to build bridge HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("bridge request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("bridge returned HTTP {0}")]
    Status(u16),
    #[error("bridge error {} at {}: {}", .0.error_type, .0.address, .0.description)]
    Api(ApiError),
    #[error("unexpected bridge response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Control surface of a switch: resolve it, then set it on or off
#[async_trait]
pub trait SwitchControl: Send + Sync {
    async fn lookup(&self, index: SwitchIndex) -> Result<SwitchInfo, BridgeError>;

    async fn set_state(&self, index: SwitchIndex, state: SwitchState) -> Result<(), BridgeError>;
}

#[async_trait]
impl<T: SwitchControl + ?Sized> SwitchControl for Arc<T> {
    async fn lookup(&self, index: SwitchIndex) -> Result<SwitchInfo, BridgeError> {
        (**self).lookup(index).await
    }

    async fn set_state(&self, index: SwitchIndex, state: SwitchState) -> Result<(), BridgeError> {
        (**self).set_state(index, state).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiResult {
    Success(IgnoredAny),
    Error(ApiError),
}

#[derive(Debug, Deserialize)]
struct LightState {
    on: bool,
    #[serde(default = "default_reachable")]
    reachable: bool,
}

fn default_reachable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Light {
    #[serde(default)]
    name: String,
    state: LightState,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupBody {
    Results(Vec<ApiResult>),
    Light(Light),
}

/// First error entry in a result list, if any
fn first_error(results: Vec<ApiResult>) -> Option<ApiError> {
    results.into_iter().find_map(|r| match r {
        ApiResult::Error(e) => Some(e),
        ApiResult::Success(_) => None,
    })
}

/// Decode a lookup response body
fn parse_light(index: SwitchIndex, body: &str) -> Result<SwitchInfo, BridgeError> {
    match serde_json::from_str::<LookupBody>(body)? {
        LookupBody::Light(light) => Ok(SwitchInfo {
            index,
            name: light.name,
            state: SwitchState::from(light.state.on),
            reachable: light.state.reachable,
        }),
        LookupBody::Results(results) => match first_error(results) {
            Some(e) => Err(BridgeError::Api(e)),
            // A bare list without an error is not a light either
            None => Err(BridgeError::Decode(serde::de::Error::custom(
                "expected a light object, got a result list",
            ))),
        },
    }
}

/// Decode a state change response body
fn parse_state_reply(body: &str) -> Result<(), BridgeError> {
    let results: Vec<ApiResult> = serde_json::from_str(body)?;
    match first_error(results) {
        Some(e) => Err(BridgeError::Api(e)),
        None => Ok(()),
    }
}

/// Normalize a bridge host into a base URL; plain hosts get `http://`
fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

/// HTTP client for one Hue bridge and user
pub struct HueBridge {
    base_url: String,
    user: String,
    client: reqwest::Client,
}

impl HueBridge {
    pub fn new(host: &str, user: &str, timeout: Duration) -> Result<Self, BridgeError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .map_err(BridgeError::Client)?;

        Ok(Self { base_url: base_url(host), user: user.to_string(), client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn light_url(&self, index: SwitchIndex) -> String {
        format!("{}/api/{}/lights/{}", self.base_url, self.user, index)
    }

    /// Check the status and read the body; the URL (which holds the user) is
    /// stripped from transport errors so it never reaches the logs
    async fn read_body(response: reqwest::Response) -> Result<String, BridgeError> {
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status(status.as_u16()));
        }
        response.text().await.map_err(|e| BridgeError::Transport(e.without_url()))
    }
}

#[async_trait]
impl SwitchControl for HueBridge {
    async fn lookup(&self, index: SwitchIndex) -> Result<SwitchInfo, BridgeError> {
        let start = Instant::now();
        let response = self
            .client
            .get(self.light_url(index))
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.without_url()))?;
        let body = Self::read_body(response).await?;
        let info = parse_light(index, &body)?;

        debug!(
            switch = %index,
            name = %info.name,
            state = %info.state,
            reachable = %info.reachable,
            latency_us = %start.elapsed().as_micros(),
            "hue_lookup"
        );
        Ok(info)
    }

    async fn set_state(&self, index: SwitchIndex, state: SwitchState) -> Result<(), BridgeError> {
        let start = Instant::now();
        let response = self
            .client
            .put(format!("{}/state", self.light_url(index)))
            .json(&serde_json::json!({ "on": state.is_on() }))
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.without_url()))?;
        let body = Self::read_body(response).await?;
        parse_state_reply(&body)?;

        debug!(
            switch = %index,
            state = %state,
            latency_us = %start.elapsed().as_micros(),
            "hue_set_state"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("192.168.1.2"), "http://192.168.1.2");
        assert_eq!(base_url("http://hue.local/"), "http://hue.local");
        assert_eq!(base_url("https://hue.local:8443"), "https://hue.local:8443");
        assert_eq!(base_url(" 10.0.0.5:8080 "), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_light_url() {
        let bridge = HueBridge::new("10.0.0.5", "user1", Duration::from_secs(1)).unwrap();
        assert_eq!(bridge.light_url(SwitchIndex(12)), "http://10.0.0.5/api/user1/lights/12");
    }

    #[test]
    fn test_parse_light() {
        let body = r#"{
            "state": {"on": true, "bri": 254, "alert": "none", "reachable": true},
            "type": "On/Off plug-in unit",
            "name": "Mill plug",
            "modelid": "LOM001"
        }"#;

        let info = parse_light(SwitchIndex(12), body).unwrap();
        assert_eq!(info.index, SwitchIndex(12));
        assert_eq!(info.name, "Mill plug");
        assert_eq!(info.state, SwitchState::On);
        assert!(info.reachable);
    }

    #[test]
    fn test_parse_light_unreachable() {
        let body = r#"{"state": {"on": false, "reachable": false}, "name": "Plug"}"#;
        let info = parse_light(SwitchIndex(3), body).unwrap();
        assert_eq!(info.state, SwitchState::Off);
        assert!(!info.reachable);
    }

    #[test]
    fn test_parse_light_not_available() {
        let body = r#"[{"error": {"type": 3, "address": "/lights/99", "description": "resource, /lights/99, not available"}}]"#;

        match parse_light(SwitchIndex(99), body) {
            Err(BridgeError::Api(e)) => {
                assert_eq!(e.error_type, 3);
                assert_eq!(e.address, "/lights/99");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_light_garbage() {
        assert!(matches!(parse_light(SwitchIndex(1), "<html>"), Err(BridgeError::Decode(_))));
        assert!(matches!(parse_light(SwitchIndex(1), "[]"), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_parse_state_reply() {
        assert!(parse_state_reply(r#"[{"success": {"/lights/12/state/on": true}}]"#).is_ok());

        let err = parse_state_reply(
            r#"[{"error": {"type": 1, "address": "/", "description": "unauthorized user"}}]"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "bridge error 1 at /: unauthorized user");
    }

    #[test]
    fn test_parse_state_reply_mixed_success_payloads() {
        // Success payloads vary by attribute and are not inspected
        let body = r#"[
            {"success": {"/lights/12/state/on": true}},
            {"success": {"/lights/12/state/bri": 254}},
            {"success": "/lights/12/state"},
            {"error": {"type": 201, "address": "/lights/12/state/hue", "description": "device is off"}}
        ]"#;
        match parse_state_reply(body) {
            Err(BridgeError::Api(e)) => assert_eq!(e.error_type, 201),
            other => panic!("expected api error, got {:?}", other),
        }
    }
}
