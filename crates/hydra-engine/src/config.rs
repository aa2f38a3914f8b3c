//! Configuration normalization.
//!
//! The engine is configured with a single JSON object (historically a plugin
//! config block). Keys come in two spellings: the current nested form
//! (`i18n.defaultLocale`, `dev_mode.enabled`, `api_bridge.max_body_bytes`)
//! and the legacy flat form (`i18n_default_locale`, `dev_mode_enabled`,
//! `api_bridge_max_body_bytes`). Nested keys win. Everything is validated
//! here, before any runtime is constructed: a bad config refuses to start.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{HydraError, Result};
use crate::request_context::{normalize_locale_tag, normalize_theme_tag};

pub(crate) const MAX_ACQUIRE_TIMEOUT_MS: u64 = 300_000;
pub(crate) const MAX_RENDER_TIMEOUT_MS: u64 = 120_000;
pub(crate) const MAX_RELOAD_INTERVAL_MS: u64 = 600_000;
pub(crate) const MAX_PROXY_TIMEOUT_SEC: f64 = 300.0;
pub(crate) const MAX_BRIDGE_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// How asset paths are resolved: from the build manifest (`Prod`), from the
/// dev asset server (`Dev`), or decided by `dev_mode.enabled` (`Auto`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMode {
    Auto,
    Dev,
    Prod,
}

impl AssetMode {
    pub fn name(self) -> &'static str {
        match self {
            AssetMode::Auto => "auto",
            AssetMode::Dev => "dev",
            AssetMode::Prod => "prod",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(AssetMode::Auto),
            "dev" => Ok(AssetMode::Dev),
            "prod" => Ok(AssetMode::Prod),
            other => Err(HydraError::ConfigInvalid(
                "asset_mode",
                format!("must be one of auto|dev|prod, got '{other}'"),
            )),
        }
    }
}

/// Fully normalized engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ssr_bundle_path: String,
    pub css_path: String,
    pub client_js_path: String,
    pub asset_manifest_path: String,
    pub asset_public_prefix: String,
    pub client_manifest_entry: String,

    pub acquire_timeout_ms: u64,
    pub render_timeout_ms: u64,
    /// 0 means "use the host worker count".
    pub pool_size: usize,
    pub wrap_fragment: bool,
    pub log_render_metrics: bool,
    pub log_request_routes: bool,

    pub configured_asset_mode: AssetMode,
    pub dev_mode_enabled: bool,
    pub dev_proxy_assets: bool,
    pub dev_inject_hmr_client: bool,
    pub dev_ansi_color_logs: bool,
    pub dev_proxy_origin: String,
    pub dev_client_entry_path: String,
    pub dev_hmr_client_path: String,
    pub dev_css_path: String,
    pub dev_proxy_timeout_sec: f64,
    pub dev_auto_reload: bool,
    pub dev_reload_probe_path: String,
    pub dev_reload_interval_ms: u64,

    pub api_bridge_enabled: bool,
    pub api_bridge_allowed_methods: HashSet<String>,
    pub api_bridge_allowed_path_prefixes: Vec<String>,
    pub api_bridge_max_body_bytes: usize,

    pub i18n_default_locale: String,
    pub i18n_query_param: String,
    pub i18n_cookie_name: String,
    pub i18n_include_locale_candidates: bool,
    pub i18n_supported_locales: HashSet<String>,
    pub i18n_supported_locale_order: Vec<String>,

    pub theme_default: String,
    pub theme_query_param: String,
    pub theme_cookie_name: String,
    pub theme_include_theme_candidates: bool,
    pub theme_supported_themes: HashSet<String>,
    pub theme_supported_theme_order: Vec<String>,

    pub include_cookies: bool,
    pub include_cookie_map: bool,
    pub allowed_cookies: HashSet<String>,
    pub header_allowlist: HashSet<String>,
    pub header_blocklist: HashSet<String>,
}

impl EngineConfig {
    pub fn resolved_asset_mode(&self) -> &'static str {
        if self.dev_mode_enabled {
            "dev"
        } else {
            "prod"
        }
    }

    /// One-line summary for the init log.
    pub fn summary(&self) -> String {
        format!(
            "runtime{{bundle={}, timeout_ms{{acquire={}, render={}}}}} | \
             assets{{mode={}, configured={}, manifest={}, css={}, client={}}} | \
             dev{{enabled={}, origin={}, proxy_assets={}, ansi_color_logs={}}}",
            self.ssr_bundle_path,
            self.acquire_timeout_ms,
            self.render_timeout_ms,
            self.resolved_asset_mode(),
            self.configured_asset_mode.name(),
            self.asset_manifest_path,
            or_placeholder(&self.css_path),
            or_placeholder(&self.client_js_path),
            on_off(self.dev_mode_enabled),
            self.dev_proxy_origin,
            on_off(self.dev_proxy_assets),
            on_off(self.dev_ansi_color_logs),
        )
    }

    /// Parse and validate a raw JSON configuration object.
    pub fn from_json(config: &Value) -> Result<Self> {
        let dev = nested_object(config, "dev_mode");
        if let Some(dev_obj) = dev {
            reject_unknown_dev_keys(dev_obj)?;
        }

        let i18n = nested_object(config, "i18n");
        let theme = nested_object(config, "theme");
        let request_context = nested_object(config, "request_context");
        let api_bridge = nested_object(config, "api_bridge");

        let ssr_bundle_path =
            read_string(config, "ssr_bundle_path", "./public/assets/ssr-bundle.js");
        let css_path = read_string(config, "css_path", "");
        let client_js_path = read_string(config, "client_js_path", "");
        let mut asset_manifest_path = read_string(config, "asset_manifest_path", "");
        if asset_manifest_path.is_empty() {
            asset_manifest_path = read_string(config, "manifest_path", "");
        }
        if asset_manifest_path.is_empty() {
            asset_manifest_path = "./public/assets/manifest.json".to_string();
        }
        let asset_public_prefix = read_string(config, "asset_public_prefix", "/assets");
        let mut client_manifest_entry = read_string(config, "client_manifest_entry", "");
        if client_manifest_entry.is_empty() {
            client_manifest_entry = read_string(config, "client_entry_key", "");
        }
        if client_manifest_entry.is_empty() {
            client_manifest_entry = "src/entry-client.tsx".to_string();
        }

        let acquire_timeout_ms = read_u64(config, "acquire_timeout_ms", 0);
        let render_timeout_ms = read_u64(config, "render_timeout_ms", 50);
        let pool_size = config
            .get("pool_size")
            .and_then(Value::as_u64)
            .or_else(|| config.get("isolate_pool_size").and_then(Value::as_u64))
            .unwrap_or(0) as usize;
        let wrap_fragment = read_bool(config, "wrap_fragment", true);
        let log_render_metrics = read_bool(config, "log_render_metrics", true);

        let mut asset_mode_raw = read_string(config, "asset_mode", "");
        if asset_mode_raw.trim().is_empty() {
            asset_mode_raw = dev
                .and_then(|d| d.get("asset_mode"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
        }
        let configured_asset_mode = AssetMode::parse(&asset_mode_raw)?;

        let legacy_dev_enabled = read_nested_bool(dev, config, "enabled", "dev_mode_enabled", false);
        let dev_mode_enabled = match configured_asset_mode {
            AssetMode::Auto => legacy_dev_enabled,
            AssetMode::Dev => true,
            AssetMode::Prod => false,
        };

        let api_bridge_enabled = config
            .get("api_bridge_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(dev_mode_enabled);

        let log_request_routes = dev
            .and_then(|d| d.get("log_request_routes"))
            .and_then(Value::as_bool)
            .or_else(|| config.get("log_request_routes").and_then(Value::as_bool))
            .or_else(|| config.get("log_requests").and_then(Value::as_bool))
            .unwrap_or(dev_mode_enabled);

        let dev_proxy_assets =
            read_nested_bool(dev, config, "proxy_assets", "dev_proxy_assets", dev_mode_enabled);
        let dev_inject_hmr_client = read_nested_bool(
            dev,
            config,
            "inject_hmr_client",
            "dev_inject_hmr_client",
            dev_mode_enabled,
        );
        let dev_proxy_origin = read_nested_string(
            dev,
            config,
            "vite_origin",
            "dev_proxy_origin",
            "http://127.0.0.1:5174",
        );
        let dev_client_entry_path = read_nested_string(
            dev,
            config,
            "client_entry_path",
            "dev_client_entry_path",
            "/src/entry-client.tsx",
        );
        let dev_hmr_client_path = read_nested_string(
            dev,
            config,
            "hmr_client_path",
            "dev_hmr_client_path",
            "/@vite/client",
        );
        let dev_css_path =
            read_nested_string(dev, config, "css_path", "dev_css_path", "/src/styles.css");
        let dev_proxy_timeout_sec =
            read_nested_f64(dev, config, "proxy_timeout_sec", "dev_proxy_timeout_sec", 10.0);
        let dev_auto_reload =
            read_nested_bool(dev, config, "auto_reload", "dev_auto_reload", dev_mode_enabled);
        let dev_reload_probe_path = read_nested_string(
            dev,
            config,
            "reload_probe_path",
            "dev_reload_probe_path",
            "/__hydra/test",
        );
        let dev_reload_interval_ms =
            read_nested_u64(dev, config, "reload_interval_ms", "dev_reload_interval_ms", 1000);
        let dev_ansi_color_logs =
            read_nested_bool(dev, config, "ansi_color_logs", "dev_ansi_color_logs", false);

        if acquire_timeout_ms > MAX_ACQUIRE_TIMEOUT_MS {
            return Err(HydraError::ConfigInvalid(
                "acquire_timeout_ms",
                format!("must be at most {MAX_ACQUIRE_TIMEOUT_MS}"),
            ));
        }
        if render_timeout_ms == 0 || render_timeout_ms > MAX_RENDER_TIMEOUT_MS {
            return Err(HydraError::ConfigInvalid(
                "render_timeout_ms",
                format!("must be in range 1..{MAX_RENDER_TIMEOUT_MS}"),
            ));
        }

        if dev_mode_enabled {
            if !has_http_scheme(dev_proxy_origin.trim()) {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode.vite_origin",
                    "must start with http:// or https://".to_string(),
                ));
            }
            if dev_client_entry_path.trim().is_empty() {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode.client_entry_path",
                    "must be set".to_string(),
                ));
            }
            if dev_css_path.trim().is_empty() {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode.css_path",
                    "must be set".to_string(),
                ));
            }
            if dev_inject_hmr_client && dev_hmr_client_path.trim().is_empty() {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode.hmr_client_path",
                    "must be set".to_string(),
                ));
            }
            if dev_proxy_timeout_sec <= 0.0 || dev_proxy_timeout_sec > MAX_PROXY_TIMEOUT_SEC {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode.proxy_timeout_sec",
                    format!("must be in range (0,{MAX_PROXY_TIMEOUT_SEC}]"),
                ));
            }
            if dev_reload_interval_ms == 0 || dev_reload_interval_ms > MAX_RELOAD_INTERVAL_MS {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode.reload_interval_ms",
                    format!("must be in range 1..{MAX_RELOAD_INTERVAL_MS}"),
                ));
            }
        } else {
            validate_manifest_path(&asset_manifest_path)?;
        }

        // API bridge policy.
        let mut api_bridge_allowed_methods = HashSet::new();
        let methods_value = api_bridge
            .and_then(|b| b.get("allowed_methods"))
            .or_else(|| config.get("api_bridge_allowed_methods"));
        if let Some(Value::Array(items)) = methods_value {
            for item in items {
                if let Some(method) = item.as_str() {
                    let method = method.trim().to_ascii_uppercase();
                    if !method.is_empty() {
                        api_bridge_allowed_methods.insert(method);
                    }
                }
            }
        }
        if api_bridge_allowed_methods.is_empty() {
            api_bridge_allowed_methods.insert("GET".to_string());
            api_bridge_allowed_methods.insert("POST".to_string());
        }

        let mut api_bridge_allowed_path_prefixes = Vec::new();
        let prefixes_value = api_bridge
            .and_then(|b| b.get("allowed_path_prefixes"))
            .or_else(|| config.get("api_bridge_allowed_path_prefixes"));
        if let Some(Value::Array(items)) = prefixes_value {
            for item in items {
                if let Some(prefix) = item.as_str() {
                    let prefix = prefix.trim();
                    if !prefix.is_empty() {
                        api_bridge_allowed_path_prefixes.push(prefix.to_string());
                    }
                }
            }
        }
        if api_bridge_allowed_path_prefixes.is_empty() {
            api_bridge_allowed_path_prefixes.push("/hydra/internal/".to_string());
        }

        let max_body_bytes = api_bridge
            .and_then(|b| b.get("max_body_bytes"))
            .and_then(Value::as_u64)
            .or_else(|| config.get("api_bridge_max_body_bytes").and_then(Value::as_u64))
            .unwrap_or(64 * 1024);
        if max_body_bytes == 0 || max_body_bytes > MAX_BRIDGE_BODY_BYTES {
            return Err(HydraError::ConfigInvalid(
                "api_bridge.max_body_bytes",
                format!("must be in range 1..{MAX_BRIDGE_BODY_BYTES}"),
            ));
        }

        // i18n.
        let mut i18n_default_locale = normalize_locale_tag(&read_nested_string(
            i18n,
            config,
            "defaultLocale",
            "i18n_default_locale",
            "en",
        ));
        if i18n_default_locale.is_empty() {
            i18n_default_locale = "en".to_string();
        }
        let mut i18n_query_param =
            read_nested_string(i18n, config, "queryParam", "i18n_query_param", "lang");
        i18n_query_param = non_empty_or(i18n_query_param.trim(), "lang");
        let mut i18n_cookie_name =
            read_nested_string(i18n, config, "cookieName", "i18n_cookie_name", "hydra_lang");
        i18n_cookie_name = non_empty_or(i18n_cookie_name.trim(), "hydra_lang");
        let mut i18n_include_locale_candidates = read_nested_bool(
            i18n,
            config,
            "includeLocaleCandidates",
            "i18n_include_locale_candidates",
            false,
        );
        i18n_include_locale_candidates = read_nested_bool(
            i18n,
            config,
            "include_locale_candidates",
            "i18n_includeLocaleCandidates",
            i18n_include_locale_candidates,
        );

        let mut i18n_supported_locales = HashSet::new();
        let mut i18n_supported_locale_order = Vec::new();
        for (nested_key, flat_key) in
            [("supportedLocales", "i18n_supported_locales"), ("supported_locales", "i18n_supportedLocales")]
        {
            append_tag_array(
                nested_value(i18n, config, nested_key, flat_key),
                normalize_locale_tag,
                &mut i18n_supported_locales,
                &mut i18n_supported_locale_order,
            );
        }
        if !i18n_supported_locales.contains(&i18n_default_locale) {
            i18n_supported_locales.insert(i18n_default_locale.clone());
            i18n_supported_locale_order.push(i18n_default_locale.clone());
        }

        // Theme.
        let mut theme_default = normalize_theme_tag(&read_nested_string(
            theme,
            config,
            "defaultTheme",
            "theme_default",
            "ocean",
        ));
        if theme_default.is_empty() {
            theme_default = "ocean".to_string();
        }
        let mut theme_query_param =
            read_nested_string(theme, config, "queryParam", "theme_query_param", "theme");
        theme_query_param = non_empty_or(theme_query_param.trim(), "theme");
        let mut theme_cookie_name =
            read_nested_string(theme, config, "cookieName", "theme_cookie_name", "hydra_theme");
        theme_cookie_name = non_empty_or(theme_cookie_name.trim(), "hydra_theme");
        let mut theme_include_theme_candidates = read_nested_bool(
            theme,
            config,
            "includeThemeCandidates",
            "theme_include_theme_candidates",
            false,
        );
        theme_include_theme_candidates = read_nested_bool(
            theme,
            config,
            "include_theme_candidates",
            "theme_includeThemeCandidates",
            theme_include_theme_candidates,
        );

        let mut theme_supported_themes = HashSet::new();
        let mut theme_supported_theme_order = Vec::new();
        for (nested_key, flat_key) in
            [("supportedThemes", "theme_supported_themes"), ("supported_themes", "theme_supportedThemes")]
        {
            append_tag_array(
                nested_value(theme, config, nested_key, flat_key),
                normalize_theme_tag,
                &mut theme_supported_themes,
                &mut theme_supported_theme_order,
            );
        }
        if !theme_supported_themes.contains(&theme_default) {
            theme_supported_themes.insert(theme_default.clone());
            theme_supported_theme_order.push(theme_default.clone());
        }

        // Request-context filtering.
        let include_cookies = read_nested_bool(
            request_context,
            config,
            "include_cookies",
            "request_context_include_cookies",
            false,
        );
        let mut include_cookie_map = read_nested_bool(
            request_context,
            config,
            "includeCookieMap",
            "request_context_includeCookieMap",
            include_cookies,
        );
        include_cookie_map = read_nested_bool(
            request_context,
            config,
            "include_cookie_map",
            "request_context_include_cookie_map",
            include_cookie_map,
        );

        let mut allowed_cookies = HashSet::new();
        append_lower_array(
            nested_value(request_context, config, "allowed_cookies", "request_context_allowed_cookies"),
            &mut allowed_cookies,
        );

        let mut header_allowlist = HashSet::new();
        for (nested_key, flat_key) in [
            ("include_headers", "request_context_include_headers"),
            ("include_header_allowlist", "request_context_include_header_allowlist"),
        ] {
            append_lower_array(
                nested_value(request_context, config, nested_key, flat_key),
                &mut header_allowlist,
            );
        }

        let mut header_blocklist: HashSet<String> = [
            "authorization",
            "proxy-authorization",
            "cookie",
            "set-cookie",
            "x-api-key",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        for (nested_key, flat_key) in [
            ("exclude_headers", "request_context_exclude_headers"),
            ("include_header_blocklist", "request_context_include_header_blocklist"),
        ] {
            append_lower_array(
                nested_value(request_context, config, nested_key, flat_key),
                &mut header_blocklist,
            );
        }

        Ok(EngineConfig {
            ssr_bundle_path,
            css_path,
            client_js_path,
            asset_manifest_path,
            asset_public_prefix,
            client_manifest_entry,
            acquire_timeout_ms,
            render_timeout_ms,
            pool_size,
            wrap_fragment,
            log_render_metrics,
            log_request_routes,
            configured_asset_mode,
            dev_mode_enabled,
            dev_proxy_assets,
            dev_inject_hmr_client,
            dev_ansi_color_logs,
            dev_proxy_origin,
            dev_client_entry_path,
            dev_hmr_client_path,
            dev_css_path,
            dev_proxy_timeout_sec,
            dev_auto_reload,
            dev_reload_probe_path,
            dev_reload_interval_ms,
            api_bridge_enabled,
            api_bridge_allowed_methods,
            api_bridge_allowed_path_prefixes,
            api_bridge_max_body_bytes: max_body_bytes as usize,
            i18n_default_locale,
            i18n_query_param,
            i18n_cookie_name,
            i18n_include_locale_candidates,
            i18n_supported_locales,
            i18n_supported_locale_order,
            theme_default,
            theme_query_param,
            theme_cookie_name,
            theme_include_theme_candidates,
            theme_supported_themes,
            theme_supported_theme_order,
            include_cookies,
            include_cookie_map,
            allowed_cookies,
            header_allowlist,
            header_blocklist,
        })
    }
}

const KNOWN_DEV_KEYS: &[&str] = &[
    "enabled",
    "proxy_assets",
    "inject_hmr_client",
    "vite_origin",
    "client_entry_path",
    "hmr_client_path",
    "css_path",
    "proxy_timeout_sec",
    "auto_reload",
    "reload_probe_path",
    "reload_interval_ms",
    "asset_mode",
    "log_request_routes",
    "ansi_color_logs",
];

fn reject_unknown_dev_keys(dev: &Value) -> Result<()> {
    if let Some(map) = dev.as_object() {
        for key in map.keys() {
            if !KNOWN_DEV_KEYS.contains(&key.as_str()) {
                return Err(HydraError::ConfigInvalid(
                    "dev_mode",
                    format!("unknown key 'dev_mode.{key}'"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_manifest_path(manifest_path: &str) -> Result<()> {
    if manifest_path.trim().is_empty() {
        return Err(HydraError::ConfigInvalid(
            "asset_manifest_path",
            "must be set in prod asset mode".to_string(),
        ));
    }
    let raw = std::fs::read_to_string(manifest_path)
        .map_err(|_| HydraError::ManifestMissing(manifest_path.to_string()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .map_err(|e| HydraError::ManifestParse(format!("{manifest_path}: {e}")))?;
    if !parsed.is_object() {
        return Err(HydraError::ManifestParse(format!(
            "{manifest_path}: manifest is not a JSON object"
        )));
    }
    Ok(())
}

fn nested_object<'a>(config: &'a Value, key: &str) -> Option<&'a Value> {
    config.get(key).filter(|v| v.is_object())
}

fn nested_value<'a>(
    object: Option<&'a Value>,
    fallback_root: &'a Value,
    nested_key: &str,
    flat_key: &str,
) -> Option<&'a Value> {
    object
        .and_then(|o| o.get(nested_key))
        .or_else(|| fallback_root.get(flat_key))
}

fn read_string(config: &Value, key: &str, default: &str) -> String {
    config
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn read_bool(config: &Value, key: &str, default: bool) -> bool {
    config.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn read_u64(config: &Value, key: &str, default: u64) -> u64 {
    config.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn read_nested_string(
    object: Option<&Value>,
    root: &Value,
    nested_key: &str,
    flat_key: &str,
    default: &str,
) -> String {
    nested_value(object, root, nested_key, flat_key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn read_nested_bool(
    object: Option<&Value>,
    root: &Value,
    nested_key: &str,
    flat_key: &str,
    default: bool,
) -> bool {
    nested_value(object, root, nested_key, flat_key)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn read_nested_u64(
    object: Option<&Value>,
    root: &Value,
    nested_key: &str,
    flat_key: &str,
    default: u64,
) -> u64 {
    nested_value(object, root, nested_key, flat_key)
        .and_then(Value::as_u64)
        .unwrap_or(default)
}

fn read_nested_f64(
    object: Option<&Value>,
    root: &Value,
    nested_key: &str,
    flat_key: &str,
    default: f64,
) -> f64 {
    nested_value(object, root, nested_key, flat_key)
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

fn append_tag_array(
    value: Option<&Value>,
    normalize: fn(&str) -> String,
    set: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for item in items {
        let Some(raw) = item.as_str() else { continue };
        let tag = normalize(raw);
        if tag.is_empty() {
            continue;
        }
        if set.insert(tag.clone()) {
            order.push(tag);
        }
    }
}

fn append_lower_array(value: Option<&Value>, out: &mut HashSet<String>) {
    let Some(Value::Array(items)) = value else {
        return;
    };
    for item in items {
        if let Some(raw) = item.as_str() {
            let key = raw.to_ascii_lowercase();
            if !key.is_empty() {
                out.insert(key);
            }
        }
    }
}

fn has_http_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn or_placeholder(value: &str) -> &str {
    if value.is_empty() {
        "<manifest/dev>"
    } else {
        value
    }
}
