//! Server-side data bridge exposed to bundles.
//!
//! Bundles can call `globalThis.hydra.fetch(request)` during a render to
//! fetch data from the host application without a network round trip. The
//! dispatcher enforces the bridge policy (method, path prefix, body size)
//! before the host-installed handler ever runs, and keeps the handler behind
//! its own mutex: the handle is copied out so user code executes unlocked.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::config::EngineConfig;

/// Request a bundle passes to `hydra.fetch`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiBridgeRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

/// Response returned to the bundle.
#[derive(Debug, Clone, Serialize)]
pub struct ApiBridgeResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl Default for ApiBridgeResponse {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            headers: BTreeMap::new(),
        }
    }
}

impl ApiBridgeResponse {
    fn plain(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }
}

/// Host-installed bridge handler.
pub type ApiBridgeHandler = Arc<dyn Fn(ApiBridgeRequest) -> ApiBridgeResponse + Send + Sync>;

/// Policy + handler slot shared by every runtime in the pool.
pub struct ApiBridgeDispatcher {
    enabled: bool,
    allowed_methods: std::collections::HashSet<String>,
    allowed_path_prefixes: Vec<String>,
    max_body_bytes: usize,
    handler: Mutex<Option<ApiBridgeHandler>>,
}

impl ApiBridgeDispatcher {
    pub(crate) fn from_config(config: &EngineConfig) -> Self {
        Self {
            enabled: config.api_bridge_enabled,
            allowed_methods: config.api_bridge_allowed_methods.clone(),
            allowed_path_prefixes: config.api_bridge_allowed_path_prefixes.clone(),
            max_body_bytes: config.api_bridge_max_body_bytes,
            handler: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn disabled() -> Self {
        Self {
            enabled: false,
            allowed_methods: std::collections::HashSet::new(),
            allowed_path_prefixes: Vec::new(),
            max_body_bytes: 0,
            handler: Mutex::new(None),
        }
    }

    pub fn set_handler(&self, handler: ApiBridgeHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Install the built-in internal handler unless the host already set one.
    pub(crate) fn install_default_handler(&self) {
        let mut slot = self.handler.lock().unwrap();
        if slot.is_none() {
            *slot = Some(Arc::new(default_internal_handler));
        }
    }

    /// Run the policy checks and the handler for one bridge call.
    pub fn dispatch(&self, request: ApiBridgeRequest) -> ApiBridgeResponse {
        if !self.enabled {
            return ApiBridgeResponse::plain(503, "Hydra API bridge disabled");
        }

        let handler = { self.handler.lock().unwrap().clone() };
        let Some(handler) = handler else {
            return ApiBridgeResponse::plain(404, "No Hydra API bridge handler registered");
        };

        let mut method = request.method.trim().to_ascii_uppercase();
        if method.is_empty() {
            method = "GET".to_string();
        }
        if !self.allowed_methods.contains(&method) {
            return ApiBridgeResponse::plain(
                405,
                format!("Hydra API bridge method is not allowed: {method}"),
            );
        }

        let path_allowed = self
            .allowed_path_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && request.path.starts_with(prefix));
        if !path_allowed {
            return ApiBridgeResponse::plain(
                403,
                format!("Hydra API bridge path is not allowed: {}", request.path),
            );
        }

        if request.body.len() > self.max_body_bytes {
            return ApiBridgeResponse::plain(413, "Hydra API bridge body exceeds max_body_bytes");
        }

        let normalized = ApiBridgeRequest {
            method,
            ..request
        };

        match catch_unwind(AssertUnwindSafe(|| handler(normalized))) {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::error!(%message, "Hydra API bridge handler panicked");
                ApiBridgeResponse::plain(500, message)
            }
        }
    }

    /// Wire-format entry point used by the runtime binding: JSON in,
    /// JSON out, never fails.
    pub(crate) fn dispatch_raw(&self, request_json: &str) -> String {
        let request = parse_bridge_request(request_json);
        let response = self.dispatch(request);
        serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"status":500,"body":"Hydra bridge response serialization failed","headers":{}}"#.to_string())
    }
}

fn parse_bridge_request(request_json: &str) -> ApiBridgeRequest {
    let mut request = ApiBridgeRequest::default();
    let Ok(parsed) = serde_json::from_str::<Value>(request_json) else {
        return request;
    };
    let Some(object) = parsed.as_object() else {
        return request;
    };

    request.method = object
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_string();
    request.path = object
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    request.query = object
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if let Some(body) = object.get("body") {
        request.body = match body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    if let Some(headers) = object.get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            if let Some(value) = value.as_str() {
                request.headers.insert(name.clone(), value.to_string());
            }
        }
    }
    request
}

fn default_internal_handler(request: ApiBridgeRequest) -> ApiBridgeResponse {
    match request.path.as_str() {
        "/hydra/internal/health" => ApiBridgeResponse::plain(200, "ok"),
        "/hydra/internal/echo" => ApiBridgeResponse::plain(200, request.body),
        other => ApiBridgeResponse::plain(404, format!("No internal handler for {other}")),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown Hydra API bridge error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn dispatcher(overrides: Value) -> ApiBridgeDispatcher {
        let mut manifest = tempfile::NamedTempFile::new().unwrap();
        write!(manifest, "{{}}").unwrap();
        let mut raw = json!({
            "asset_manifest_path": manifest.path().to_str().unwrap(),
            "api_bridge_enabled": true
        });
        if let (Some(base), Some(extra)) = (raw.as_object_mut(), overrides.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        let config = EngineConfig::from_json(&raw).unwrap();
        let dispatcher = ApiBridgeDispatcher::from_config(&config);
        dispatcher.install_default_handler();
        dispatcher
    }

    fn request(method: &str, path: &str) -> ApiBridgeRequest {
        ApiBridgeRequest {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_bridge_returns_503() {
        let dispatcher = dispatcher(json!({ "api_bridge_enabled": false }));
        let response = dispatcher.dispatch(request("GET", "/hydra/internal/health"));
        assert_eq!(response.status, 503);
    }

    #[test]
    fn health_endpoint_answers_ok() {
        let dispatcher = dispatcher(json!({}));
        let response = dispatcher.dispatch(request("GET", "/hydra/internal/health"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");
    }

    #[test]
    fn echo_endpoint_returns_body() {
        let dispatcher = dispatcher(json!({}));
        let mut req = request("POST", "/hydra/internal/echo");
        req.body = "payload".into();
        let response = dispatcher.dispatch(req);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "payload");
    }

    #[test]
    fn disallowed_method_returns_405_without_handler_run() {
        let dispatcher = dispatcher(json!({}));
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let witness = Arc::clone(&called);
        dispatcher.set_handler(Arc::new(move |_req| {
            witness.store(true, std::sync::atomic::Ordering::SeqCst);
            ApiBridgeResponse::default()
        }));

        let response = dispatcher.dispatch(request("DELETE", "/hydra/internal/health"));
        assert_eq!(response.status, 405);
        assert!(response.body.contains("DELETE"));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn method_is_case_insensitive_and_defaults_to_get() {
        let dispatcher = dispatcher(json!({}));
        assert_eq!(dispatcher.dispatch(request("get", "/hydra/internal/health")).status, 200);
        assert_eq!(dispatcher.dispatch(request("", "/hydra/internal/health")).status, 200);
    }

    #[test]
    fn path_outside_prefixes_returns_403() {
        let dispatcher = dispatcher(json!({}));
        let response = dispatcher.dispatch(request("GET", "/etc/passwd"));
        assert_eq!(response.status, 403);
    }

    #[test]
    fn oversized_body_returns_413() {
        let dispatcher = dispatcher(json!({ "api_bridge": { "max_body_bytes": 8 } }));
        let mut req = request("POST", "/hydra/internal/echo");
        req.body = "123456789".into();
        assert_eq!(dispatcher.dispatch(req).status, 413);
    }

    #[test]
    fn handler_panic_maps_to_500() {
        let dispatcher = dispatcher(json!({}));
        dispatcher.set_handler(Arc::new(|_req| panic!("handler exploded")));
        let response = dispatcher.dispatch(request("GET", "/hydra/internal/health"));
        assert_eq!(response.status, 500);
        assert!(response.body.contains("handler exploded"));
    }

    #[test]
    fn raw_dispatch_parses_and_serializes_json() {
        let dispatcher = dispatcher(json!({}));
        let raw = dispatcher.dispatch_raw(
            r#"{"method":"POST","path":"/hydra/internal/echo","body":{"n":1},"headers":{"x-a":"b"}}"#,
        );
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["status"], 200);
        assert_eq!(parsed["body"], r#"{"n":1}"#);
    }

    #[test]
    fn raw_dispatch_tolerates_garbage_input() {
        let dispatcher = dispatcher(json!({}));
        let raw = dispatcher.dispatch_raw("not json");
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        // Empty path fails the prefix policy.
        assert_eq!(parsed["status"], 403);
    }
}
