//! Build-manifest asset resolution.
//!
//! Production builds emit a manifest mapping source keys to hashed output
//! files. The engine needs exactly two things from it: the client entry
//! script URL and a stylesheet URL. Resolution is best-effort — a missing or
//! unreadable manifest downgrades to the pipeline's hardcoded fallbacks.

use serde_json::{Map, Value};

/// Browser-facing asset URLs extracted from a build manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellAssetPaths {
    pub css_path: String,
    pub client_js_path: String,
}

/// Ensure a browser path starts with `/` unless it is absolute already.
pub(crate) fn normalize_browser_path(path: &str) -> String {
    if path.is_empty() || has_http_scheme(path) || path.starts_with('/') {
        return path.to_string();
    }
    format!("/{path}")
}

/// Join a dev-server origin with a browser path, collapsing trailing
/// slashes on the origin.
pub(crate) fn join_origin_and_path(origin: &str, path: &str) -> String {
    let path = normalize_browser_path(path);
    if origin.is_empty() {
        return path;
    }
    let origin = origin.trim_end_matches('/');
    if path.is_empty() {
        return origin.to_string();
    }
    format!("{origin}{path}")
}

fn has_http_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn normalize_public_prefix(public_prefix: &str) -> String {
    let mut prefix = public_prefix.replace('\\', "/");
    if prefix.is_empty() {
        return "/assets".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.len() > 1 && prefix.ends_with('/') {
        prefix.pop();
    }
    prefix
}

/// Turn a manifest file path into a browser URL: drop leading `./`, pass
/// absolute paths through, prefix `assets/` outputs with `/`, and anchor
/// everything else under the public prefix.
pub(crate) fn to_public_asset_path(file_path: &str, public_prefix: &str) -> String {
    let mut path = file_path.replace('\\', "/");
    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped.to_string();
    }

    if path.is_empty() {
        return String::new();
    }
    if path.starts_with('/') {
        return path;
    }
    if path.starts_with("assets/") {
        return format!("/{path}");
    }
    format!("{}/{}", normalize_public_prefix(public_prefix), path)
}

fn entry_file(entry: &Value) -> &str {
    entry.get("file").and_then(Value::as_str).unwrap_or("")
}

fn is_entry(entry: &Value) -> bool {
    entry.get("isEntry").and_then(Value::as_bool).unwrap_or(false)
}

fn find_client_entry<'a>(manifest: &'a Map<String, Value>, client_entry_key: &str) -> Option<&'a Value> {
    if let Some(entry) = manifest.get(client_entry_key).filter(|v| v.is_object()) {
        return Some(entry);
    }

    let mut fallback = None;
    for (key, entry) in manifest {
        if !entry.is_object() || !is_entry(entry) {
            continue;
        }
        let file = entry_file(entry);
        if file.is_empty() {
            continue;
        }
        if key.contains("entry-client") || file.contains("client") {
            return Some(entry);
        }
        if fallback.is_none() && file.ends_with(".js") {
            fallback = Some(entry);
        }
    }
    fallback
}

fn first_css(entry: &Value, public_prefix: &str) -> Option<String> {
    entry
        .get("css")
        .and_then(Value::as_array)
        .and_then(|css| css.first())
        .and_then(Value::as_str)
        .map(|file| to_public_asset_path(file, public_prefix))
}

/// Resolve the client JS and CSS URLs from a manifest file.
///
/// CSS lookup order: the chosen entry's own `css`, CSS of any entry it
/// imports, a top-level `style.css` entry, then the first `.css` output
/// anywhere in the manifest.
pub fn resolve_assets_from_manifest(
    manifest_path: &str,
    public_prefix: &str,
    client_entry_key: &str,
) -> Option<ShellAssetPaths> {
    let raw = match std::fs::read_to_string(manifest_path) {
        Ok(raw) => raw,
        Err(_) => {
            tracing::warn!(path = %manifest_path, "asset manifest not found");
            return None;
        }
    };

    let manifest: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(path = %manifest_path, %error, "asset manifest parse failed");
            return None;
        }
    };
    let manifest = match manifest.as_object() {
        Some(map) => map,
        None => {
            tracing::warn!(path = %manifest_path, "asset manifest is not a JSON object");
            return None;
        }
    };

    let Some(client_entry) = find_client_entry(manifest, client_entry_key) else {
        tracing::warn!(entry = %client_entry_key, "asset manifest has no client entry");
        return None;
    };

    let client_js_path = to_public_asset_path(entry_file(client_entry), public_prefix);
    if client_js_path.is_empty() {
        tracing::warn!("asset manifest client entry has no JS file");
        return None;
    }

    let mut css_path = first_css(client_entry, public_prefix);

    if css_path.is_none() {
        if let Some(imports) = client_entry.get("imports").and_then(Value::as_array) {
            for import in imports {
                let Some(import_key) = import.as_str() else { continue };
                let Some(import_entry) = manifest.get(import_key).filter(|v| v.is_object()) else {
                    continue;
                };
                if let Some(found) = first_css(import_entry, public_prefix) {
                    css_path = Some(found);
                    break;
                }
            }
        }
    }

    if css_path.is_none() {
        css_path = manifest
            .get("style.css")
            .and_then(|entry| entry.get("file"))
            .and_then(Value::as_str)
            .filter(|file| !file.is_empty())
            .map(|file| to_public_asset_path(file, public_prefix));
    }

    if css_path.is_none() {
        for entry in manifest.values() {
            let file = entry_file(entry);
            if file.ends_with(".css") {
                css_path = Some(to_public_asset_path(file, public_prefix));
                break;
            }
        }
    }

    Some(ShellAssetPaths {
        css_path: css_path.unwrap_or_default(),
        client_js_path,
    })
}
