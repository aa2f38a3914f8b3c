//! Render results and the bundle response envelope.
//!
//! A bundle may return plain HTML, or a JSON envelope
//! `{html, status?, headers?, redirect?}` for richer control. The probe is
//! deliberately loose: only values whose first non-whitespace character is
//! `{` are even considered, and anything that fails to parse as an object
//! with an `html` member falls through to "raw HTML". Bundles relying on
//! that fallback exist, so it is contract, not accident.

use std::collections::BTreeMap;

use serde_json::Value;

/// Final outcome of one render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsrRenderResult {
    pub html: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl Default for SsrRenderResult {
    fn default() -> Self {
        Self {
            html: String::new(),
            status: 200,
            headers: BTreeMap::new(),
        }
    }
}

impl SsrRenderResult {
    /// True when the response is a redirect the shell must not wrap.
    pub fn is_redirect(&self) -> bool {
        (300..=399).contains(&self.status) && self.headers.contains_key("Location")
    }
}

fn coerce_header_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Try to interpret a render output as a response envelope.
///
/// Returns `None` for anything that is not a JSON object carrying `html`;
/// the caller then serves the output as raw HTML with status 200.
pub fn try_parse_ssr_envelope(render_output: &str) -> Option<SsrRenderResult> {
    let first = render_output.chars().find(|ch| !ch.is_whitespace())?;
    if first != '{' {
        return None;
    }

    let payload: Value = serde_json::from_str(render_output).ok()?;
    let payload = payload.as_object()?;
    if !payload.contains_key("html") {
        return None;
    }

    let mut result = SsrRenderResult {
        html: payload
            .get("html")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        ..Default::default()
    };

    let status = payload.get("status").and_then(Value::as_i64).unwrap_or(200);
    result.status = if (100..=599).contains(&status) {
        status as u16
    } else {
        200
    };

    if let Some(headers) = payload.get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            if let Some(coerced) = coerce_header_value(value) {
                result.headers.insert(name.clone(), coerced);
            }
        }
    }

    if let Some(redirect) = payload.get("redirect").and_then(Value::as_str) {
        let target = redirect.trim();
        if !target.is_empty() {
            result.headers.insert("Location".to_string(), target.to_string());
            if !(300..=399).contains(&result.status) {
                result.status = 302;
            }
        }
    } else if result.headers.contains_key("Location") && !(300..=399).contains(&result.status) {
        // A bundle that sets Location through headers means redirect too.
        result.status = 302;
    }

    Some(result)
}

/// Whether the rendered HTML already looks like a complete document.
pub(crate) fn is_likely_full_document(html: &str) -> bool {
    html.contains("<html") || html.contains("<!doctype") || html.contains("<!DOCTYPE")
}
