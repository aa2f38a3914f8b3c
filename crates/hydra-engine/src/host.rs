//! Host-application seams.
//!
//! The engine is embedded inside an HTTP application it does not own. These
//! traits are the full surface the engine reads from the host: a view of the
//! current request, per-call render options, and the capability to register
//! dev-mode asset proxy routes. The host decides what an HTTP request *is*;
//! the engine only negotiates locale/theme and composes the request context
//! from this view.

use std::time::Duration;

/// Read-only view of an incoming HTTP request.
///
/// Implementations adapt whatever request type the host framework uses.
/// Header and cookie lookups are expected to be case-insensitive where the
/// underlying framework is.
pub trait HostRequest {
    /// Request path without the query string (may be empty).
    fn path(&self) -> &str;

    /// Raw query string without the leading `?` (may be empty).
    fn query(&self) -> &str;

    /// HTTP method as an upper-case string (`GET`, `POST`, ...).
    fn method(&self) -> &str;

    /// Single header value by lower-case name.
    fn header(&self, name: &str) -> Option<String>;

    /// All headers as (name, value) pairs.
    fn headers(&self) -> Vec<(String, String)>;

    /// Single cookie value by name.
    fn cookie(&self, name: &str) -> Option<String>;

    /// All cookies as (name, value) pairs.
    fn cookies(&self) -> Vec<(String, String)>;

    /// Query parameter by name.
    fn parameter(&self, name: &str) -> Option<String>;
}

/// Per-call options for a render.
#[derive(Debug, Default, Clone)]
pub struct RenderOptions {
    /// When non-empty, used verbatim as the route URL instead of composing
    /// `path?query` from the request.
    pub url_override: String,
}

/// Capabilities the engine needs from the host application at startup.
///
/// In dev mode the engine asks the host to forward browser asset requests to
/// the dev asset server; the proxying itself belongs to the host.
pub trait HostAdapter {
    /// Register a forward-proxy route. `pattern` is either an exact path
    /// (e.g. `/@vite/client`) or an anchored regex (e.g. `^/assets/.*$`).
    fn register_proxy_route(&mut self, pattern: &str, origin: &str, timeout: Duration);
}
