//! End-to-end pipeline tests: real engine, real pool, real Boa runtimes,
//! temp-file bundles.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use hydra_engine::{
    ApiBridgeResponse, HostRequest, RenderOptions, SsrEngine, SsrRenderResult,
};

struct TempArtifacts {
    _bundle: tempfile::NamedTempFile,
    _manifest: tempfile::NamedTempFile,
}

fn build_engine(bundle_source: &str, overrides: Value) -> (SsrEngine, TempArtifacts) {
    let mut bundle = tempfile::NamedTempFile::new().unwrap();
    write!(bundle, "{bundle_source}").unwrap();
    let mut manifest = tempfile::NamedTempFile::new().unwrap();
    write!(manifest, "{{}}").unwrap();

    let mut config = json!({
        "ssr_bundle_path": bundle.path().to_str().unwrap(),
        "asset_manifest_path": manifest.path().to_str().unwrap(),
        "pool_size": 1,
        "render_timeout_ms": 5000,
        "css_path": "/a.css",
        "client_js_path": "/c.js",
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let engine = SsrEngine::init_and_start(&config).unwrap();
    (
        engine,
        TempArtifacts {
            _bundle: bundle,
            _manifest: manifest,
        },
    )
}

#[derive(Default)]
struct FakeRequest {
    path: String,
    query: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    parameters: Vec<(String, String)>,
}

impl HostRequest for FakeRequest {
    fn path(&self) -> &str {
        &self.path
    }
    fn query(&self) -> &str {
        &self.query
    }
    fn method(&self) -> &str {
        "GET"
    }
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }
    fn cookies(&self) -> Vec<(String, String)> {
        self.cookies.clone()
    }
    fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }
}

fn nonce_from_csp(result: &SsrRenderResult) -> String {
    let csp = &result.headers["Content-Security-Policy"];
    let start = csp.find("'nonce-").expect("csp carries a nonce") + "'nonce-".len();
    let end = csp[start..].find('\'').unwrap() + start;
    csp[start..end].to_string()
}

#[test]
fn fragment_is_wrapped_into_full_document() {
    let (engine, _files) = build_engine(r#"globalThis.render = () => "<p>Hi</p>";"#, json!({}));
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());

    assert_eq!(result.status, 200);
    assert!(result.html.starts_with("<!doctype html>"));
    assert!(result.html.contains("<link rel=\"stylesheet\" href=\"/a.css\""));
    assert!(result.html.contains("<div id=\"root\"><p>Hi</p></div>"));

    let nonce = nonce_from_csp(&result);
    assert_eq!(nonce.len(), 24);
    assert!(result
        .html
        .contains(&format!("<script src=\"/c.js\" defer nonce=\"{nonce}\"")));
    assert!(result.html.contains(&format!(
        "<script id=\"__HYDRA_PROPS__\" type=\"application/json\" nonce=\"{nonce}\">"
    )));
}

#[test]
fn props_script_escapes_angle_brackets() {
    let (engine, _files) = build_engine(r#"globalThis.render = () => "<p>Hi</p>";"#, json!({}));
    let result = engine.render_result(
        None,
        &json!({"title": "<b>bold</b>"}),
        &RenderOptions::default(),
    );
    assert!(result.html.contains("\\u003cb\\u003ebold\\u003c/b\\u003e"));
    assert!(!result.html.contains("<b>bold</b>"));
}

#[test]
fn full_document_passes_through_verbatim() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => "<!doctype html><html><body>whole</body></html>";"#,
        json!({}),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 200);
    assert_eq!(result.html, "<!doctype html><html><body>whole</body></html>");
    // Not wrapped with the shell, so the CSP is the minimal variant.
    assert!(!result.headers["Content-Security-Policy"].contains("nonce"));
}

#[test]
fn envelope_status_and_headers_round_trip() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => JSON.stringify({
            html: "<p>teapot</p>",
            status: 418,
            headers: { "X-Flavor": "earl-grey" }
        });"#,
        json!({}),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 418);
    assert_eq!(result.headers["X-Flavor"], "earl-grey");
    assert!(result.html.contains("<div id=\"root\"><p>teapot</p></div>"));
}

#[test]
fn envelope_redirect_skips_shell_and_forces_302() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => JSON.stringify({ html: "", redirect: "/login" });"#,
        json!({}),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 302);
    assert_eq!(result.headers["Location"], "/login");
    assert_eq!(result.html, "");
}

#[test]
fn malformed_envelope_is_served_as_raw_html() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => "{this is not json";"#,
        json!({ "wrap_fragment": false }),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 200);
    assert_eq!(result.html, "{this is not json");
}

#[test]
fn props_object_gains_request_context() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = (url, props) => props;"#,
        json!({ "wrap_fragment": false }),
    );
    let req = FakeRequest {
        path: "/profile".into(),
        query: "tab=settings".into(),
        ..Default::default()
    };
    let result = engine.render_result(
        Some(&req),
        &json!({"user": "ada"}),
        &RenderOptions::default(),
    );

    let delivered: Value = serde_json::from_str(&result.html).unwrap();
    assert_eq!(delivered["user"], "ada");
    let context = &delivered["__hydra_request"];
    assert_eq!(context["routeUrl"], "/profile?tab=settings");
    assert_eq!(context["routePath"], "/profile");
    assert_eq!(context["locale"], "en");
    assert_eq!(context["theme"], "ocean");
    assert!(context["requestId"].as_str().unwrap().starts_with("hydra-"));
}

#[test]
fn non_object_props_pass_through_untouched() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = (url, props) => props;"#,
        json!({ "wrap_fragment": false }),
    );
    let result = engine.render_result_str(None, "[1,2,3]", &RenderOptions::default());
    assert_eq!(result.html, "[1,2,3]");
}

#[test]
fn render_receives_request_context_argument() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = (url, props, ctx) => JSON.parse(ctx).locale;"#,
        json!({
            "wrap_fragment": false,
            "i18n": { "supportedLocales": ["en", "fr-ca"] }
        }),
    );
    let req = FakeRequest {
        path: "/".into(),
        headers: vec![("accept-language".into(), "fr-CA,fr;q=0.9,en;q=0.8".into())],
        ..Default::default()
    };
    let result = engine.render_result_str(Some(&req), "{}", &RenderOptions::default());
    assert_eq!(result.html, "fr-ca");
}

#[test]
fn security_headers_are_always_present() {
    let (engine, _files) = build_engine(r#"globalThis.render = () => "<p>x</p>";"#, json!({}));

    let ok = engine.render_result_str(None, "{}", &RenderOptions::default());
    for header in ["X-Content-Type-Options", "Referrer-Policy", "X-Frame-Options"] {
        assert!(ok.headers.contains_key(header), "missing {header}");
    }
    assert_eq!(ok.headers["X-Content-Type-Options"], "nosniff");
    assert_eq!(ok.headers["Referrer-Policy"], "strict-origin-when-cross-origin");
    assert_eq!(ok.headers["X-Frame-Options"], "DENY");
    assert!(ok.headers.contains_key("Content-Security-Policy"));
}

#[test]
fn bundle_supplied_csp_is_not_overwritten() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => JSON.stringify({
            html: "<p>x</p>",
            headers: { "Content-Security-Policy": "default-src 'none'" }
        });"#,
        json!({}),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.headers["Content-Security-Policy"], "default-src 'none'");
}

#[test]
fn dev_mode_skips_nonce_and_csp() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => "<p>x</p>";"#,
        json!({ "dev_mode": { "enabled": true } }),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 200);
    assert!(!result.headers.contains_key("Content-Security-Policy"));
    assert!(!result.html.contains("nonce="));
    // Dev asset URLs replace the configured prod ones.
    assert!(result.html.contains("/src/entry-client.tsx"));
    assert!(result.html.contains("type=\"module\""));
}

#[test]
fn render_timeout_returns_500_and_recycles_slot() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = (url) => {
            if (url === "/hang") { while (true) {} }
            return "<p>alive</p>";
        };"#,
        json!({ "render_timeout_ms": 25 }),
    );

    let started = Instant::now();
    let result = engine.render_result_str(
        None,
        "{}",
        &RenderOptions {
            url_override: "/hang".into(),
        },
    );
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.status, 500);
    assert!(result.html.contains("SSR render exceeded timeout of 25ms"));
    assert!(result.headers.contains_key("X-Request-Id"));

    let snapshot = engine.metrics_snapshot();
    assert_eq!(snapshot.render_timeouts, 1);
    assert_eq!(snapshot.runtime_recycles, 1);
    assert_eq!(snapshot.requests_fail, 1);

    // The slot was reconstructed and serves again.
    let healthy = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(healthy.status, 200);
    assert!(healthy.html.contains("alive"));
}

#[test]
fn saturated_pool_times_out_acquire() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = (url) => {
            if (url === "/slow") {
                const start = Date.now();
                while (Date.now() - start < 400) {}
            }
            return "<p>done</p>";
        };"#,
        json!({ "acquire_timeout_ms": 10 }),
    );
    let engine = Arc::new(engine);

    let slow = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            engine.render_result_str(
                None,
                "{}",
                &RenderOptions {
                    url_override: "/slow".into(),
                },
            )
        })
    };
    // Let the slow render take the only slot.
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let starved = engine.render_result_str(None, "{}", &RenderOptions::default());
    let elapsed = started.elapsed();

    assert_eq!(starved.status, 500);
    assert!(starved.html.contains("Timed out waiting"));
    assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");
    assert_eq!(engine.metrics_snapshot().pool_timeouts, 1);

    let slow_result = slow.join().unwrap();
    assert_eq!(slow_result.status, 200);
}

#[test]
fn js_exception_becomes_error_page() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => { throw new Error("kaboom"); };"#,
        json!({}),
    );
    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 500);
    assert!(result.html.contains("kaboom"));
    assert!(result.html.starts_with("<!doctype html>"));

    let snapshot = engine.metrics_snapshot();
    assert_eq!(snapshot.render_errors, 1);
    assert_eq!(snapshot.runtime_recycles, 1);
    assert_eq!(snapshot.render_timeouts, 0);
}

#[test]
fn requests_by_code_counts_envelope_statuses() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = (url) => {
            if (url === "/go") return JSON.stringify({ html: "", redirect: "/target" });
            return JSON.stringify({ html: "<p>x</p>", status: 200 });
        };"#,
        json!({}),
    );

    engine.render_result_str(None, "{}", &RenderOptions::default());
    engine.render_result_str(
        None,
        "{}",
        &RenderOptions {
            url_override: "/go".into(),
        },
    );

    let text = engine.metrics_prometheus();
    assert!(text.contains("hydra_requests_by_code_total{code=\"200\"} 1\n"));
    assert!(text.contains("hydra_requests_by_code_total{code=\"302\"} 1\n"));
    assert!(text.contains("hydra_requests_total{status=\"ok\"} 2\n"));
    assert!(text.contains("hydra_pool_size 1\n"));
    assert!(text.contains("hydra_pool_in_use 0\n"));
}

#[test]
fn incoming_request_id_is_propagated_and_sanitized() {
    let (engine, _files) = build_engine(r#"globalThis.render = () => "<p>x</p>";"#, json!({}));

    let req = FakeRequest {
        path: "/".into(),
        headers: vec![("x-request-id".into(), "  req@42!abc, second".into())],
        ..Default::default()
    };
    let result = engine.render_result_str(Some(&req), "{}", &RenderOptions::default());
    assert_eq!(result.headers["X-Request-Id"], "req42abc");
}

#[test]
fn bridge_policy_blocks_method_before_handler() {
    let handler_called = Arc::new(AtomicBool::new(false));
    let witness = Arc::clone(&handler_called);

    let (engine, _files) = build_engine(
        r#"globalThis.render = () => {
            const res = hydra.fetch({ method: "DELETE", path: "/hydra/internal/health" });
            return JSON.stringify({ html: "<p>x</p>", status: res.status });
        };"#,
        json!({ "api_bridge_enabled": true }),
    );
    engine.set_api_bridge_handler(Arc::new(move |_req| {
        witness.store(true, Ordering::SeqCst);
        ApiBridgeResponse::default()
    }));

    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.status, 405);
    assert!(!handler_called.load(Ordering::SeqCst));
}

#[test]
fn bridge_handler_serves_bundle_data() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => {
            const res = hydra.fetch({ method: "GET", path: "/hydra/internal/greeting" });
            return "<p>" + res.body + "</p>";
        };"#,
        json!({ "api_bridge_enabled": true, "wrap_fragment": false }),
    );
    engine.set_api_bridge_handler(Arc::new(|req| {
        assert_eq!(req.method, "GET");
        ApiBridgeResponse {
            status: 200,
            body: format!("hello from {}", req.path),
            ..Default::default()
        }
    }));

    let result = engine.render_result_str(None, "{}", &RenderOptions::default());
    assert_eq!(result.html, "<p>hello from /hydra/internal/greeting</p>");
}

#[test]
fn pool_returns_to_fully_ready_after_concurrent_load() {
    let (engine, _files) = build_engine(
        r#"globalThis.render = () => "<p>x</p>";"#,
        json!({ "pool_size": 2 }),
    );
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            for _ in 0..5 {
                let result = engine.render_result_str(None, "{}", &RenderOptions::default());
                assert_eq!(result.status, 200);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.metrics_snapshot().requests_ok, 40);
    let text = engine.metrics_prometheus();
    assert!(text.contains("hydra_pool_in_use 0\n"));
}
