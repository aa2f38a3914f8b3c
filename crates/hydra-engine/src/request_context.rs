//! Per-request context composition.
//!
//! Every render receives a sanitized JSON view of the incoming request:
//! route URL fields, a request id, the negotiated locale and theme, and a
//! filtered copy of headers/cookies. The bundle reads this object (merged
//! into props under `__hydra_request`) instead of touching the raw request.

use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::host::HostRequest;

/// First comma-separated token of a header value, trimmed. Forwarding
/// proxies append their own values, so only the first hop counts.
pub(crate) fn first_header_token(value: &str) -> &str {
    match value.find(',') {
        Some(pos) => value[..pos].trim(),
        None => value.trim(),
    }
}

/// Restrict a caller-supplied request id to `[A-Za-z0-9._-]`, capped at 64
/// characters. Returns an empty string when nothing usable remains.
pub(crate) fn sanitize_request_id(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        .take(64)
        .collect()
}

/// Normalize a locale tag: `_` becomes `-`, lower-cased, invalid characters
/// dropped, no consecutive/leading/trailing dashes.
pub(crate) fn normalize_locale_tag(locale: &str) -> String {
    let mut normalized = String::with_capacity(locale.len());
    let mut previous_dash = false;
    for ch in locale.trim().to_ascii_lowercase().chars() {
        let ch = if ch == '_' { '-' } else { ch };
        if ch.is_ascii_alphanumeric() {
            normalized.push(ch);
            previous_dash = false;
        } else if ch == '-' && !previous_dash && !normalized.is_empty() {
            normalized.push(ch);
            previous_dash = true;
        }
    }
    while normalized.ends_with('-') {
        normalized.pop();
    }
    normalized
}

/// Normalize a theme tag: lower-cased, only alphanumerics plus `-` and `_`.
pub(crate) fn normalize_theme_tag(theme: &str) -> String {
    theme
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
        .collect()
}

/// Expand `fr-ca-quebec` into `[fr-ca-quebec, fr-ca, fr]`.
pub(crate) fn locale_fallback_chain(normalized_locale: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = normalized_locale;
    while !current.is_empty() {
        chain.push(current.to_string());
        match current.rfind('-') {
            Some(pos) => current = &current[..pos],
            None => break,
        }
    }
    chain
}

/// Parse an `Accept-Language` header into locale tokens ordered by quality
/// (stable within equal quality). Wildcards and zero/invalid qualities drop.
pub(crate) fn parse_accept_language_candidates(header_value: &str) -> Vec<String> {
    struct Item {
        locale: String,
        quality: f64,
        order: usize,
    }

    let mut parsed: Vec<Item> = Vec::new();
    for (order, chunk) in header_value.split(',').enumerate() {
        let token = chunk.trim();
        if token.is_empty() {
            continue;
        }

        let mut language = token;
        let mut quality = 1.0_f64;
        if let Some(semicolon) = token.find(';') {
            language = token[..semicolon].trim();
            for param in token[semicolon + 1..].split(';') {
                let param = param.trim();
                let Some(equals) = param.find('=') else { continue };
                let key = param[..equals].trim().to_ascii_lowercase();
                let value = param[equals + 1..].trim();
                if key == "q" {
                    quality = value.parse::<f64>().unwrap_or(0.0);
                }
            }
        }

        if !language.is_empty() && language != "*" && quality > 0.0 {
            parsed.push(Item {
                locale: language.to_string(),
                quality,
                order,
            });
        }
    }

    parsed.sort_by(|lhs, rhs| {
        rhs.quality
            .partial_cmp(&lhs.quality)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(lhs.order.cmp(&rhs.order))
    });
    parsed.into_iter().map(|item| item.locale).collect()
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !value.is_empty() && !values.iter().any(|existing| *existing == value) {
        values.push(value);
    }
}

fn resolve_from_candidates<'a>(
    candidates: &'a [String],
    supported: &std::collections::HashSet<String>,
    supported_order: &'a [String],
    default: &'a str,
) -> &'a str {
    for candidate in candidates {
        if supported.is_empty() || supported.contains(candidate) {
            return candidate;
        }
    }
    // Nothing matched: if a supported set is configured and even the default
    // is outside it, the first configured entry wins.
    if !supported.is_empty() && !supported.contains(default) {
        if let Some(first) = supported_order.first() {
            return first;
        }
    }
    default
}

/// Compose the request-context JSON object for one render.
pub fn build_request_context(
    config: &EngineConfig,
    req: Option<&dyn HostRequest>,
    route_url: &str,
    request_id: &str,
) -> Value {
    let mut context = Map::new();
    context.insert("routeUrl".into(), json!(route_url));
    context.insert("requestId".into(), json!(request_id));
    context.insert("themeCookieName".into(), json!(config.theme_cookie_name));
    context.insert("themeQueryParam".into(), json!(config.theme_query_param));
    context.insert(
        "themeSupportedThemes".into(),
        json!(if config.theme_supported_theme_order.is_empty() {
            vec![config.theme_default.clone()]
        } else {
            config.theme_supported_theme_order.clone()
        }),
    );

    let Some(req) = req else {
        context.insert("routePath".into(), json!(route_url));
        context.insert("pathWithQuery".into(), json!(route_url));
        context.insert("url".into(), json!(route_url));
        context.insert("locale".into(), json!(config.i18n_default_locale));
        context.insert("theme".into(), json!(config.theme_default));
        if config.i18n_include_locale_candidates {
            context.insert("localeCandidates".into(), json!([config.i18n_default_locale]));
        }
        if config.theme_include_theme_candidates {
            context.insert("themeCandidates".into(), json!([config.theme_default]));
        }
        return Value::Object(context);
    };

    let route_path = if req.path().is_empty() { "/" } else { req.path() };
    let query = req.query();
    let mut path_with_query = route_path.to_string();
    if !query.is_empty() {
        path_with_query.push('?');
        path_with_query.push_str(query);
    }
    context.insert("routePath".into(), json!(route_path));
    context.insert("pathWithQuery".into(), json!(path_with_query));

    let forwarded_host = req.header("x-forwarded-host").unwrap_or_default();
    let mut host = first_header_token(&forwarded_host).to_string();
    if host.is_empty() {
        let host_header = req.header("host").unwrap_or_default();
        host = first_header_token(&host_header).to_string();
    }

    let forwarded_proto = req.header("x-forwarded-proto").unwrap_or_default();
    let proto = match first_header_token(&forwarded_proto).to_ascii_lowercase().as_str() {
        "https" => "https",
        _ => "http",
    };

    if host.is_empty() {
        context.insert("url".into(), json!(path_with_query));
    } else {
        context.insert("url".into(), json!(format!("{proto}://{host}{path_with_query}")));
    }
    context.insert("path".into(), json!(route_path));
    context.insert("query".into(), json!(query));
    context.insert("method".into(), json!(req.method()));

    // Locale negotiation: cookie, query parameter, Accept-Language by
    // quality, then the configured default — each expanded to its fallback
    // chain, first supported entry wins.
    let mut raw_locale_candidates = Vec::new();
    if let Some(cookie_locale) = req.cookie(&config.i18n_cookie_name) {
        if !cookie_locale.is_empty() {
            raw_locale_candidates.push(cookie_locale);
        }
    }
    if let Some(query_locale) = req.parameter(&config.i18n_query_param) {
        if !query_locale.is_empty() {
            raw_locale_candidates.push(query_locale);
        }
    }
    let accept_language = req.header("accept-language").unwrap_or_default();
    raw_locale_candidates.extend(parse_accept_language_candidates(&accept_language));
    raw_locale_candidates.push(config.i18n_default_locale.clone());

    let mut locale_candidates: Vec<String> = Vec::new();
    for candidate in &raw_locale_candidates {
        let normalized = normalize_locale_tag(candidate);
        if normalized.is_empty() {
            continue;
        }
        for fallback in locale_fallback_chain(&normalized) {
            push_unique(&mut locale_candidates, fallback);
        }
    }

    let resolved_locale = resolve_from_candidates(
        &locale_candidates,
        &config.i18n_supported_locales,
        &config.i18n_supported_locale_order,
        &config.i18n_default_locale,
    );
    context.insert("locale".into(), json!(resolved_locale));
    if config.i18n_include_locale_candidates {
        context.insert("localeCandidates".into(), json!(locale_candidates));
    }

    // Theme negotiation: same precedence, simpler normalization, no chain.
    let mut raw_theme_candidates = Vec::new();
    if let Some(cookie_theme) = req.cookie(&config.theme_cookie_name) {
        if !cookie_theme.is_empty() {
            raw_theme_candidates.push(cookie_theme);
        }
    }
    if let Some(query_theme) = req.parameter(&config.theme_query_param) {
        if !query_theme.is_empty() {
            raw_theme_candidates.push(query_theme);
        }
    }
    raw_theme_candidates.push(config.theme_default.clone());

    let mut theme_candidates: Vec<String> = Vec::new();
    for candidate in &raw_theme_candidates {
        push_unique(&mut theme_candidates, normalize_theme_tag(candidate));
    }

    let resolved_theme = resolve_from_candidates(
        &theme_candidates,
        &config.theme_supported_themes,
        &config.theme_supported_theme_order,
        &config.theme_default,
    );
    context.insert("theme".into(), json!(resolved_theme));
    if config.theme_include_theme_candidates {
        context.insert("themeCandidates".into(), json!(theme_candidates));
    }

    let mut headers = Map::new();
    for (name, value) in req.headers() {
        if should_include_header(config, &name) {
            headers.insert(name, json!(value));
        }
    }
    context.insert("headers".into(), Value::Object(headers));

    let mut cookie_map = Map::new();
    let mut cookie_header = String::new();
    if config.include_cookies || config.include_cookie_map {
        for (name, value) in req.cookies() {
            if !should_include_cookie(config, &name) {
                continue;
            }
            if config.include_cookie_map {
                cookie_map.insert(name.clone(), json!(value));
            }
            if config.include_cookies {
                if !cookie_header.is_empty() {
                    cookie_header.push_str("; ");
                }
                cookie_header.push_str(&name);
                cookie_header.push('=');
                cookie_header.push_str(&value);
            }
        }
    }
    // With no allowlist and nothing reconstructed, pass the raw header
    // through so cookie-parsing bundles keep working.
    if config.include_cookies && cookie_header.is_empty() && config.allowed_cookies.is_empty() {
        cookie_header = req.header("cookie").unwrap_or_default();
    }

    context.insert(
        "cookies".into(),
        json!(if config.include_cookies { cookie_header } else { String::new() }),
    );
    if config.include_cookie_map {
        context.insert("cookieMap".into(), Value::Object(cookie_map));
    }

    Value::Object(context)
}

fn should_include_header(config: &EngineConfig, header_name: &str) -> bool {
    let normalized = header_name.to_ascii_lowercase();
    if normalized.starts_with("x-forwarded-") {
        return false;
    }
    if !config.header_allowlist.is_empty() && !config.header_allowlist.contains(&normalized) {
        return false;
    }
    !config.header_blocklist.contains(&normalized)
}

fn should_include_cookie(config: &EngineConfig, cookie_name: &str) -> bool {
    config.allowed_cookies.is_empty()
        || config.allowed_cookies.contains(&cookie_name.to_ascii_lowercase())
}
