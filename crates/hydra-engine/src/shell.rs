//! Canonical HTML document shell.
//!
//! Bundles usually return a body fragment; the shell wraps it in a full
//! HTML5 document with the stylesheet link, the serialized props payload for
//! client hydration, the client entry script, and (in dev) the HMR client
//! and an auto-reload poller. When a script nonce is supplied every script
//! tag carries it so the CSP `script-src 'nonce-...'` directive holds.

use std::fmt::Write as _;

/// Everything the shell needs besides the rendered fragment.
#[derive(Debug, Clone, Default)]
pub struct HtmlShellAssets {
    pub css_path: String,
    pub client_js_path: String,
    /// Dev-server HMR client module; empty outside dev mode.
    pub hmr_client_path: String,
    /// Per-request CSP nonce; empty disables nonce attributes.
    pub script_nonce: String,
    /// Emit the client tag as `type="module"` instead of `defer`.
    pub client_js_module: bool,
    /// Probe endpoint for the dev auto-reload poller; empty disables it.
    pub dev_reload_probe_path: String,
    pub dev_reload_interval_ms: u64,
}

/// Replace characters that could terminate a `<script>` block early.
/// The payload stays valid JSON because the replacements are JSON string
/// escapes.
pub fn escape_for_script_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn nonce_attr(nonce: &str) -> String {
    if nonce.is_empty() {
        String::new()
    } else {
        format!(" nonce=\"{nonce}\"")
    }
}

/// Wrap a rendered fragment into the full document.
pub fn wrap(app_html: &str, props_json: &str, assets: &HtmlShellAssets) -> String {
    let nonce = nonce_attr(&assets.script_nonce);
    let mut html = String::with_capacity(app_html.len() + props_json.len() + 1024);

    html.push_str("<!doctype html>\n<html lang=\"en\">\n  <head>\n");
    html.push_str("    <meta charset=\"utf-8\" />\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n",
    );
    html.push_str("    <title>HydraStack</title>\n");
    if !assets.css_path.is_empty() {
        let _ = writeln!(html, "    <link rel=\"stylesheet\" href=\"{}\" />", assets.css_path);
    }
    html.push_str("  </head>\n  <body>\n");
    let _ = writeln!(html, "    <div id=\"root\">{app_html}</div>");
    let _ = writeln!(
        html,
        "    <script id=\"__HYDRA_PROPS__\" type=\"application/json\"{nonce}>{}</script>",
        escape_for_script_tag(props_json)
    );

    if !assets.hmr_client_path.is_empty() {
        // Vite's React plugin refuses to hot-update unless its preamble ran
        // before the client entry. The refresh runtime lives next to the HMR
        // client, so derive its URL from the same prefix.
        if let Some(prefix) = assets.hmr_client_path.strip_suffix("/@vite/client") {
            let _ = writeln!(
                html,
                "    <script type=\"module\"{nonce}>\n\
                 import RefreshRuntime from \"{prefix}/@react-refresh\";\n\
                 RefreshRuntime.injectIntoGlobalHook(window);\n\
                 window.$RefreshReg$ = () => {{}};\n\
                 window.$RefreshSig$ = () => (type) => type;\n\
                 window.__vite_plugin_react_preamble_installed__ = true;\n\
                 </script>"
            );
        }
        let _ = writeln!(
            html,
            "    <script type=\"module\" src=\"{}\"{nonce}></script>",
            assets.hmr_client_path
        );
    }

    if !assets.client_js_path.is_empty() {
        if assets.client_js_module {
            let _ = writeln!(
                html,
                "    <script type=\"module\" src=\"{}\"{nonce}></script>",
                assets.client_js_path
            );
        } else {
            let _ = writeln!(
                html,
                "    <script src=\"{}\" defer{nonce}></script>",
                assets.client_js_path
            );
        }
    }

    if !assets.dev_reload_probe_path.is_empty() && assets.dev_reload_interval_ms > 0 {
        let _ = writeln!(
            html,
            "    <script{nonce}>\n\
             (() => {{\n\
               const probe = \"{probe}\";\n\
               let knownStart = null;\n\
               setInterval(() => {{\n\
                 fetch(probe).then((res) => res.json()).then((body) => {{\n\
                   const started = body && body.process_started_ms;\n\
                   if (knownStart === null) {{ knownStart = started; return; }}\n\
                   if (started && started !== knownStart) window.location.reload();\n\
                 }}).catch(() => {{}});\n\
               }}, {interval});\n\
             }})();\n\
             </script>",
            probe = escape_for_script_tag(&assets.dev_reload_probe_path),
            interval = assets.dev_reload_interval_ms
        );
    }

    html.push_str("  </body>\n</html>\n");
    html
}

/// Minimal error document for failed renders. The message is escaped with
/// the script-tag rules, which also neutralize HTML here.
pub fn error_page(message: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n  \
         <head><meta charset=\"utf-8\" /><title>HydraStack Error</title></head>\n  \
         <body>\n    <h1>HydraStack SSR Error</h1>\n    <pre>{}</pre>\n  </body>\n</html>\n",
        escape_for_script_tag(message)
    )
}
