//! The SSR engine: pool lifecycle and the render pipeline.
//!
//! One `SsrEngine` lives for the whole process. `init_and_start` validates
//! the configuration, resolves asset URLs, wires the API bridge, and brings
//! up the runtime pool; `render_result` runs the request pipeline: build the
//! request context, merge it into props, lease a runtime, execute the
//! bundle, interpret the returned envelope, wrap fragments in the document
//! shell, apply security headers, and record metrics. Failures mark the
//! lease for recycle and degrade to an error page — a render never panics
//! the host.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;

use crate::bridge::{ApiBridgeDispatcher, ApiBridgeHandler};
use crate::config::EngineConfig;
use crate::error::{HydraError, Result};
use crate::host::{HostAdapter, HostRequest, RenderOptions};
use crate::manifest::{join_origin_and_path, normalize_browser_path, resolve_assets_from_manifest};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::request_context::{build_request_context, first_header_token, sanitize_request_id};
use crate::response::{is_likely_full_document, try_parse_ssr_envelope, SsrRenderResult};
use crate::runtime::RuntimePool;
use crate::shell::{self, HtmlShellAssets};

/// Reserved top-level props key carrying the request context.
pub const RESERVED_REQUEST_PROPS_KEY: &str = "__hydra_request";

/// Content type for the Prometheus text exposition.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Browser-facing asset URLs after manifest/dev resolution.
#[derive(Debug, Clone, Default)]
struct ResolvedAssets {
    css_path: String,
    client_js_path: String,
    hmr_client_path: String,
    client_js_module: bool,
    dev_reload_probe_path: String,
    dev_reload_interval_ms: u64,
}

pub struct SsrEngine {
    config: EngineConfig,
    pool: Option<RuntimePool>,
    bridge: Arc<ApiBridgeDispatcher>,
    assets: ResolvedAssets,
    metrics: EngineMetrics,
    request_id_counter: AtomicU64,
    warned_unwrapped_fragment: AtomicBool,
}

impl SsrEngine {
    /// Validate the configuration, resolve assets, install the default
    /// bridge handler, and construct the runtime pool.
    pub fn init_and_start(config: &Value) -> Result<Self> {
        let config = EngineConfig::from_json(config)?;

        let bridge = Arc::new(ApiBridgeDispatcher::from_config(&config));
        bridge.install_default_handler();

        let assets = resolve_assets(&config);

        let pool_size = if config.pool_size > 0 {
            config.pool_size
        } else {
            num_cpus::get().max(1)
        };
        let pool = RuntimePool::new(
            pool_size,
            config.ssr_bundle_path.clone(),
            Arc::clone(&bridge),
        )?;

        tracing::info!(
            summary = %config.summary(),
            pool = pool_size,
            dev = config.dev_mode_enabled,
            api_bridge = config.api_bridge_enabled,
            request_routes = config.log_request_routes,
            locale = %config.i18n_default_locale,
            theme = %config.theme_default,
            "hydra engine initialized"
        );
        tracing::debug!(
            include_cookies = config.include_cookies,
            include_cookie_map = config.include_cookie_map,
            "hydra engine init detail"
        );

        Ok(Self {
            config,
            pool: Some(pool),
            bridge,
            assets,
            metrics: EngineMetrics::default(),
            request_id_counter: AtomicU64::new(0),
            warned_unwrapped_fragment: AtomicBool::new(false),
        })
    }

    /// Dispose the runtime pool. Subsequent renders answer 500.
    pub fn shutdown(&mut self) {
        self.pool = None;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the host's bridge handler, replacing the default one.
    pub fn set_api_bridge_handler(&self, handler: ApiBridgeHandler) {
        self.bridge.set_handler(handler);
    }

    /// Ask the host to forward dev asset requests to the dev server.
    /// No-op outside dev mode or when asset proxying is disabled.
    pub fn register_dev_proxy_routes(&self, adapter: &mut dyn HostAdapter) {
        if !self.config.dev_mode_enabled || !self.config.dev_proxy_assets {
            return;
        }
        const PROXY_PATTERNS: &[&str] = &[
            "/@vite/client",
            "/@react-refresh",
            "^/assets/.*$",
            "^/@vite/.*$",
            "^/%40vite/.*$",
            "^/@id/.*$",
            "^/@fs/.*$",
            "^/%40id/.*$",
            "^/%40fs/.*$",
            "^/src/.*$",
            "^/node_modules/.*$",
        ];
        let timeout = Duration::from_secs_f64(self.config.dev_proxy_timeout_sec);
        for pattern in PROXY_PATTERNS {
            adapter.register_proxy_route(pattern, &self.config.dev_proxy_origin, timeout);
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics_prometheus(&self) -> String {
        let (in_use, size) = match &self.pool {
            Some(pool) => (pool.in_use(), pool.size()),
            None => (0, 0),
        };
        self.metrics.prometheus(in_use, size)
    }

    /// Render with structured props.
    pub fn render_result(
        &self,
        req: Option<&dyn HostRequest>,
        props: &Value,
        options: &RenderOptions,
    ) -> SsrRenderResult {
        self.render_result_str(req, &props.to_string(), options)
    }

    /// HTML-only convenience over [`SsrEngine::render_result`].
    pub fn render(
        &self,
        req: Option<&dyn HostRequest>,
        props: &Value,
        options: &RenderOptions,
    ) -> String {
        self.render_result(req, props, options).html
    }

    /// Render with a pre-serialized props payload.
    ///
    /// When the payload parses as a JSON object the request context is
    /// merged in under [`RESERVED_REQUEST_PROPS_KEY`]; anything else is
    /// passed to the bundle untouched.
    pub fn render_result_str(
        &self,
        req: Option<&dyn HostRequest>,
        props_json: &str,
        options: &RenderOptions,
    ) -> SsrRenderResult {
        let request_started = Instant::now();
        let request_id = self.resolve_request_id(req);

        let Some(pool) = self.pool.as_ref() else {
            let mut unavailable = SsrRenderResult {
                status: 500,
                html: shell::error_page("Hydra SSR engine is not initialized"),
                ..Default::default()
            };
            unavailable
                .headers
                .insert("X-Request-Id".to_string(), request_id);
            self.apply_security_headers(&mut unavailable, false, "");
            return unavailable;
        };

        let route_url = build_route_url(req, options);
        let request_context = build_request_context(&self.config, req, &route_url, &request_id);
        let request_context_json = request_context.to_string();

        let mut effective_props = props_json.to_string();
        let mut page_id = String::new();
        if let Ok(Value::Object(mut props_object)) = serde_json::from_str::<Value>(props_json) {
            page_id = props_object
                .get(RESERVED_ROUTE_PROPS_KEY)
                .and_then(|route| route.get("pageId"))
                .and_then(Value::as_str)
                .or_else(|| props_object.get("page").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            props_object.insert(RESERVED_REQUEST_PROPS_KEY.to_string(), request_context);
            effective_props = Value::Object(props_object).to_string();
        }

        let method = req.map(|r| r.method().to_string()).unwrap_or_else(|| "GET".to_string());
        let script_nonce = if self.config.dev_mode_enabled {
            String::new()
        } else {
            generate_script_nonce()
        };

        let mut acquire_wait_us = 0u64;
        match self.try_render(
            pool,
            &route_url,
            &effective_props,
            &request_context_json,
            &mut acquire_wait_us,
        ) {
            Ok((raw_output, render_us)) => self.finish_ok(FinishOk {
                raw_output,
                effective_props,
                script_nonce,
                request_id,
                route_url,
                method,
                page_id,
                request_started,
                acquire_wait_us,
                render_us,
            }),
            Err(error) => self.finish_fail(
                error,
                request_started,
                acquire_wait_us,
                request_id,
                route_url,
                method,
            ),
        }
    }

    fn try_render(
        &self,
        pool: &RuntimePool,
        route_url: &str,
        props_json: &str,
        request_context_json: &str,
        acquire_wait_us: &mut u64,
    ) -> Result<(String, u64)> {
        let acquire_started = Instant::now();
        let mut lease = pool.acquire(self.config.acquire_timeout_ms)?;
        *acquire_wait_us = elapsed_us(acquire_started);

        let render_started = Instant::now();
        match lease.render(
            route_url,
            props_json,
            request_context_json,
            self.config.render_timeout_ms,
        ) {
            Ok(output) => Ok((output, elapsed_us(render_started))),
            Err(error) => {
                // The interpreter's state after a throw or forced timeout is
                // not trusted; rebuild the slot before it serves again.
                lease.mark_for_recycle();
                self.metrics.increment_runtime_recycles();
                Err(error)
            }
        }
    }

    fn finish_ok(&self, outcome: FinishOk) -> SsrRenderResult {
        let FinishOk {
            raw_output,
            effective_props,
            script_nonce,
            request_id,
            route_url,
            method,
            page_id,
            request_started,
            acquire_wait_us,
            render_us,
        } = outcome;

        let render_index = self.metrics.next_render_index();
        let acquire_ms = acquire_wait_us as f64 / 1000.0;
        let render_ms = render_us as f64 / 1000.0;
        self.metrics.observe_acquire_wait(acquire_ms);
        self.metrics.observe_render_latency(render_ms);

        let mut result = match try_parse_ssr_envelope(&raw_output) {
            Some(envelope) => envelope,
            None => SsrRenderResult {
                html: raw_output,
                ..Default::default()
            },
        };

        let is_redirect = result.is_redirect();
        let mut wrap_us = 0u64;
        let mut wrapped_with_shell = false;
        if !is_redirect && !result.html.is_empty() && !is_likely_full_document(&result.html) {
            if self.config.wrap_fragment {
                let wrap_started = Instant::now();
                result.html =
                    shell::wrap(&result.html, &effective_props, &self.shell_assets(&script_nonce));
                wrap_us = elapsed_us(wrap_started);
                wrapped_with_shell = true;
            } else if !self.warned_unwrapped_fragment.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "wrap_fragment=false while SSR returned an HTML fragment; \
                     CSS/JS injection will not happen"
                );
            }
        }

        let total_us = elapsed_us(request_started);
        let total_ms = total_us as f64 / 1000.0;
        self.metrics.increment_requests_ok();
        self.metrics.observe_request_code(result.status);
        self.metrics.observe_request_latency(total_ms);
        self.metrics
            .add_durations_us(acquire_wait_us, render_us, wrap_us, total_us);

        result
            .headers
            .entry("X-Request-Id".to_string())
            .or_insert_with(|| request_id.clone());
        self.apply_security_headers(&mut result, wrapped_with_shell, &script_nonce);

        if self.config.log_render_metrics {
            let counters = self.metrics.snapshot();
            tracing::info!(
                status = "ok",
                count = render_index,
                route = %route_url,
                request_id = %request_id,
                http_status = result.status,
                acquire_ms,
                render_ms,
                wrap_ms = wrap_us as f64 / 1000.0,
                pool_timeouts = counters.pool_timeouts,
                render_timeouts = counters.render_timeouts,
                runtime_recycles = counters.runtime_recycles,
                "hydra render"
            );
        }
        if self.config.log_request_routes {
            let page_label = if page_id.is_empty() { "-" } else { page_id.as_str() };
            tracing::info!(
                status = "ok",
                method = %method,
                route = %route_url,
                request_id = %request_id,
                http_status = result.status,
                page = %page_label,
                total_ms,
                "hydra request"
            );
        }

        result
    }

    fn finish_fail(
        &self,
        error: HydraError,
        request_started: Instant,
        acquire_wait_us: u64,
        request_id: String,
        route_url: String,
        method: String,
    ) -> SsrRenderResult {
        match &error {
            HydraError::AcquireTimeout(_) => self.metrics.increment_pool_timeouts(),
            HydraError::RenderTimeout(_) => self.metrics.increment_render_timeouts(),
            _ => {}
        }

        let total_us = elapsed_us(request_started);
        let total_ms = total_us as f64 / 1000.0;
        self.metrics.increment_requests_fail();
        self.metrics.increment_render_errors();
        self.metrics.observe_request_code(500);
        self.metrics.observe_request_latency(total_ms);
        self.metrics.observe_acquire_wait(acquire_wait_us as f64 / 1000.0);
        self.metrics.add_durations_us(acquire_wait_us, 0, 0, total_us);

        let counters = self.metrics.snapshot();
        tracing::error!(
            route = %route_url,
            request_id = %request_id,
            pool_timeouts = counters.pool_timeouts,
            render_timeouts = counters.render_timeouts,
            runtime_recycles = counters.runtime_recycles,
            error = %error,
            "hydra render failed"
        );
        if self.config.log_request_routes {
            tracing::warn!(
                status = "fail",
                method = %method,
                route = %route_url,
                request_id = %request_id,
                http_status = 500u16,
                total_ms,
                error = %error,
                "hydra request"
            );
        }

        let mut failed = SsrRenderResult {
            status: 500,
            html: shell::error_page(&error.to_string()),
            ..Default::default()
        };
        failed.headers.insert("X-Request-Id".to_string(), request_id);
        self.apply_security_headers(&mut failed, false, "");
        failed
    }

    fn apply_security_headers(
        &self,
        response: &mut SsrRenderResult,
        wrapped_with_shell: bool,
        script_nonce: &str,
    ) {
        response
            .headers
            .entry("X-Content-Type-Options".to_string())
            .or_insert_with(|| "nosniff".to_string());
        response
            .headers
            .entry("Referrer-Policy".to_string())
            .or_insert_with(|| "strict-origin-when-cross-origin".to_string());
        response
            .headers
            .entry("X-Frame-Options".to_string())
            .or_insert_with(|| "DENY".to_string());

        if self.config.dev_mode_enabled
            || response.headers.contains_key("Content-Security-Policy")
        {
            return;
        }

        let csp = if wrapped_with_shell && !script_nonce.is_empty() {
            format!(
                "default-src 'self'; script-src 'self' 'nonce-{script_nonce}'; \
                 style-src 'self' 'unsafe-inline'; connect-src 'self'; \
                 img-src 'self' data:; object-src 'none'; base-uri 'self'; \
                 frame-ancestors 'none'"
            )
        } else {
            "default-src 'self'; object-src 'none'; base-uri 'self'; frame-ancestors 'none'"
                .to_string()
        };
        response
            .headers
            .insert("Content-Security-Policy".to_string(), csp);
    }

    fn resolve_request_id(&self, req: Option<&dyn HostRequest>) -> String {
        if let Some(req) = req {
            if let Some(header) = req.header("x-request-id") {
                let sanitized = sanitize_request_id(first_header_token(&header));
                if !sanitized.is_empty() {
                    return sanitized;
                }
            }
        }
        let generated = self.request_id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("hydra-{generated}")
    }

    fn shell_assets(&self, script_nonce: &str) -> HtmlShellAssets {
        HtmlShellAssets {
            css_path: self.assets.css_path.clone(),
            client_js_path: self.assets.client_js_path.clone(),
            hmr_client_path: self.assets.hmr_client_path.clone(),
            script_nonce: script_nonce.to_string(),
            client_js_module: self.assets.client_js_module,
            dev_reload_probe_path: self.assets.dev_reload_probe_path.clone(),
            dev_reload_interval_ms: self.assets.dev_reload_interval_ms,
        }
    }
}

/// Props key the host's router uses to describe the matched page.
const RESERVED_ROUTE_PROPS_KEY: &str = "__hydra_route";

struct FinishOk {
    raw_output: String,
    effective_props: String,
    script_nonce: String,
    request_id: String,
    route_url: String,
    method: String,
    page_id: String,
    request_started: Instant,
    acquire_wait_us: u64,
    render_us: u64,
}

fn build_route_url(req: Option<&dyn HostRequest>, options: &RenderOptions) -> String {
    if !options.url_override.is_empty() {
        return options.url_override.clone();
    }
    let Some(req) = req else {
        return "/".to_string();
    };
    let mut route_url = if req.path().is_empty() {
        "/".to_string()
    } else {
        req.path().to_string()
    };
    if !req.query().is_empty() {
        route_url.push('?');
        route_url.push_str(req.query());
    }
    route_url
}

fn generate_script_nonce() -> String {
    const NONCE_CHARS: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut rng = rand::thread_rng();
    (0..24)
        .map(|_| NONCE_CHARS[rng.gen_range(0..NONCE_CHARS.len())] as char)
        .collect()
}

fn elapsed_us(since: Instant) -> u64 {
    since.elapsed().as_micros() as u64
}

fn resolve_assets(config: &EngineConfig) -> ResolvedAssets {
    let mut css_path = config.css_path.clone();
    let mut client_js_path = config.client_js_path.clone();
    let mut hmr_client_path = String::new();
    let mut client_js_module = false;

    if let Some(found) = resolve_assets_from_manifest(
        &config.asset_manifest_path,
        &config.asset_public_prefix,
        &config.client_manifest_entry,
    ) {
        if css_path.is_empty() {
            css_path = found.css_path;
        }
        if client_js_path.is_empty() {
            client_js_path = found.client_js_path;
        }
    }

    if config.dev_mode_enabled {
        css_path = if config.dev_proxy_assets {
            normalize_browser_path(&config.dev_css_path)
        } else {
            join_origin_and_path(&config.dev_proxy_origin, &config.dev_css_path)
        };
        client_js_module = true;
        if config.dev_proxy_assets {
            client_js_path = normalize_browser_path(&config.dev_client_entry_path);
            if config.dev_inject_hmr_client {
                hmr_client_path = normalize_browser_path(&config.dev_hmr_client_path);
            }
        } else {
            client_js_path =
                join_origin_and_path(&config.dev_proxy_origin, &config.dev_client_entry_path);
            if config.dev_inject_hmr_client {
                hmr_client_path =
                    join_origin_and_path(&config.dev_proxy_origin, &config.dev_hmr_client_path);
            }
        }
    } else {
        if css_path.is_empty() {
            css_path = "/assets/app.css".to_string();
            tracing::warn!(path = %css_path, "falling back to default css path");
        }
        if client_js_path.is_empty() {
            client_js_path = "/assets/client.js".to_string();
            tracing::warn!(path = %client_js_path, "falling back to default client js path");
        }
    }

    let (dev_reload_probe_path, dev_reload_interval_ms) =
        if config.dev_mode_enabled && config.dev_auto_reload {
            (
                normalize_browser_path(&config.dev_reload_probe_path),
                config.dev_reload_interval_ms,
            )
        } else {
            (String::new(), 0)
        };

    ResolvedAssets {
        css_path,
        client_js_path,
        hmr_client_path,
        client_js_module,
        dev_reload_probe_path,
        dev_reload_interval_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn nonce_is_24_chars_from_charset() {
        let nonce = generate_script_nonce();
        assert_eq!(nonce.len(), 24);
        assert!(nonce
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '+' || ch == '/'));
    }

    #[test]
    fn nonces_are_unique_per_call() {
        let nonces: HashSet<String> = (0..64).map(|_| generate_script_nonce()).collect();
        assert_eq!(nonces.len(), 64);
    }

    struct StubRequest;

    impl HostRequest for StubRequest {
        fn path(&self) -> &str {
            "/items"
        }
        fn query(&self) -> &str {
            "page=2"
        }
        fn method(&self) -> &str {
            "GET"
        }
        fn header(&self, _name: &str) -> Option<String> {
            None
        }
        fn headers(&self) -> Vec<(String, String)> {
            Vec::new()
        }
        fn cookie(&self, _name: &str) -> Option<String> {
            None
        }
        fn cookies(&self) -> Vec<(String, String)> {
            Vec::new()
        }
        fn parameter(&self, _name: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn route_url_composition() {
        let options = RenderOptions::default();
        assert_eq!(build_route_url(Some(&StubRequest), &options), "/items?page=2");
        assert_eq!(build_route_url(None, &options), "/");

        let options = RenderOptions {
            url_override: "/forced".to_string(),
        };
        assert_eq!(build_route_url(Some(&StubRequest), &options), "/forced");
    }

    #[test]
    fn shutdown_engine_serves_error_page_with_security_headers() {
        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        write!(bundle, "globalThis.render = () => \"<p>x</p>\";").unwrap();
        let mut manifest = tempfile::NamedTempFile::new().unwrap();
        write!(manifest, "{{}}").unwrap();

        let mut engine = SsrEngine::init_and_start(&json!({
            "ssr_bundle_path": bundle.path().to_str().unwrap(),
            "asset_manifest_path": manifest.path().to_str().unwrap(),
            "pool_size": 1,
        }))
        .unwrap();
        engine.shutdown();

        let result = engine.render_result_str(None, "{}", &RenderOptions::default());
        assert_eq!(result.status, 500);
        assert!(result.html.contains("not initialized"));
        assert_eq!(result.headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(result.headers["X-Frame-Options"], "DENY");
        assert!(result.headers.contains_key("X-Request-Id"));
        assert!(result.headers.contains_key("Content-Security-Policy"));
    }

    #[test]
    fn dev_proxy_routes_are_registered_through_adapter() {
        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        write!(bundle, "globalThis.render = () => \"<p>x</p>\";").unwrap();

        let engine = SsrEngine::init_and_start(&json!({
            "ssr_bundle_path": bundle.path().to_str().unwrap(),
            "pool_size": 1,
            "dev_mode": { "enabled": true }
        }))
        .unwrap();

        struct RecordingAdapter(Vec<String>);
        impl HostAdapter for RecordingAdapter {
            fn register_proxy_route(&mut self, pattern: &str, origin: &str, _timeout: Duration) {
                assert_eq!(origin, "http://127.0.0.1:5174");
                self.0.push(pattern.to_string());
            }
        }

        let mut adapter = RecordingAdapter(Vec::new());
        engine.register_dev_proxy_routes(&mut adapter);
        assert!(adapter.0.contains(&"/@vite/client".to_string()));
        assert!(adapter.0.contains(&"^/assets/.*$".to_string()));
        assert!(adapter.0.len() >= 10);
    }
}
