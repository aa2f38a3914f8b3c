//! HTTP host for the Hydra SSR engine.
//!
//! A thin hyper-based front: it adapts incoming HTTP requests to the
//! engine's [`HostRequest`] view, serves the Prometheus metrics endpoint,
//! and turns [`hydra_engine::SsrRenderResult`]s back into HTTP responses.
//! Everything interesting happens inside the engine; this crate only
//! owns sockets and byte shuffling.

pub mod http_server;

pub use http_server::{HttpServer, PropsBuilder};

use hydra_engine::HostRequest;

/// Owned snapshot of one incoming request.
///
/// The engine's render path is blocking and runs on the blocking thread
/// pool, so the request view must be detached from hyper's types. Header
/// names are stored lower-cased; cookie and query-parameter pairs are
/// pre-split. Values are kept verbatim — the engine only filters and
/// re-serializes them.
#[derive(Debug, Clone, Default)]
pub struct RequestSnapshot {
    path: String,
    query: String,
    method: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    parameters: Vec<(String, String)>,
}

impl RequestSnapshot {
    pub fn from_hyper<B>(req: &hyper::Request<B>) -> Self {
        let mut headers = Vec::with_capacity(req.headers().len());
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                headers.push((name.as_str().to_ascii_lowercase(), value.to_string()));
            }
        }

        let cookies = headers
            .iter()
            .find(|(name, _)| name == "cookie")
            .map(|(_, value)| parse_cookie_header(value))
            .unwrap_or_default();

        let query = req.uri().query().unwrap_or("").to_string();
        let parameters = parse_query_string(&query);

        Self {
            path: req.uri().path().to_string(),
            query,
            method: req.method().as_str().to_string(),
            headers,
            cookies,
            parameters,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(path: &str, query: &str, headers: Vec<(String, String)>) -> Self {
        let cookies = headers
            .iter()
            .find(|(name, _)| name == "cookie")
            .map(|(_, value)| parse_cookie_header(value))
            .unwrap_or_default();
        Self {
            path: path.to_string(),
            query: query.to_string(),
            method: "GET".to_string(),
            parameters: parse_query_string(query),
            headers,
            cookies,
        }
    }
}

impl HostRequest for RequestSnapshot {
    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .find(|(cookie_name, _)| cookie_name == name)
            .map(|(_, value)| value.clone())
    }

    fn cookies(&self) -> Vec<(String, String)> {
        self.cookies.clone()
    }

    fn parameter(&self, name: &str) -> Option<String> {
        self.parameters
            .iter()
            .find(|(param_name, _)| param_name == name)
            .map(|(_, value)| value.clone())
    }
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| match chunk.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (chunk.to_string(), String::new()),
        })
        .collect()
}
