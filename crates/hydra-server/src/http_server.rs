//! HTTP server for the Hydra SSR engine.
//!
//! This module provides the HTTP front implementation using hyper for
//! HTTP/1.1 server functionality. The server accepts browser requests and
//! forwards them through the engine's render pipeline.
//!
//! # Architecture
//!
//! The HTTP server:
//! - Listens on a TCP socket for incoming HTTP connections
//! - Spawns a tokio task for each connection
//! - Routes `GET /hydra/metrics` to the Prometheus text exposition
//! - Snapshots every other request and renders it through the engine on the
//!   blocking thread pool (the render pipeline is synchronous by design)
//! - Turns the engine's [`SsrRenderResult`] back into an HTTP response
//!
//! # Example
//!
//! ```ignore
//! use hydra_server::HttpServer;
//! use hydra_engine::SsrEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config: serde_json::Value = std::fs::read_to_string("hydra.json")?.parse()?;
//!     let engine = Arc::new(SsrEngine::init_and_start(&config)?);
//!     HttpServer::new(engine).run("127.0.0.1:8080".parse()?).await
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use hydra_engine::{RenderOptions, SsrEngine, SsrRenderResult, METRICS_CONTENT_TYPE};

use crate::RequestSnapshot;

/// Builds the props payload for a request. The host application decides
/// what data each page gets; the default is an empty object.
pub type PropsBuilder = Arc<dyn Fn(&RequestSnapshot) -> serde_json::Value + Send + Sync>;

/// HTTP server embedding one [`SsrEngine`].
///
/// The server owns nothing but the engine handle and the props builder;
/// sockets live only for the duration of [`HttpServer::run`].
pub struct HttpServer {
    engine: Arc<SsrEngine>,
    props_builder: PropsBuilder,
}

impl HttpServer {
    /// Creates a new HTTP server around an initialized engine.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine instance to render requests with
    ///
    /// # Returns
    ///
    /// A new `HttpServer` with the default empty-object props builder.
    pub fn new(engine: Arc<SsrEngine>) -> Self {
        Self {
            engine,
            props_builder: Arc::new(|_req| serde_json::json!({})),
        }
    }

    /// Replace the per-request props builder.
    ///
    /// # Arguments
    ///
    /// * `props_builder` - Closure producing the props value for each
    ///   incoming request; it runs on the blocking pool right before the
    ///   render
    pub fn with_props_builder(mut self, props_builder: PropsBuilder) -> Self {
        self.props_builder = props_builder;
        self
    }

    /// Runs the HTTP server on the specified address.
    ///
    /// Accepts connections until the listener fails; each connection is
    /// served on its own tokio task.
    ///
    /// # Arguments
    ///
    /// * `addr` - The socket address to bind to
    ///
    /// # Returns
    ///
    /// Only returns on failure: binding the listener or accepting a
    /// connection failed. Per-connection errors are logged, not propagated.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the accept loop
    /// breaks down.
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "hydra http server listening");

        let engine = self.engine;
        let props_builder = self.props_builder;
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let engine = Arc::clone(&engine);
            let props_builder = Arc::clone(&props_builder);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let engine = Arc::clone(&engine);
                    let props_builder = Arc::clone(&props_builder);
                    async move { handle_request(engine, props_builder, req).await }
                });

                if let Err(error) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!(%error, "error serving connection");
                }
            });
        }
    }
}

/// Handles one HTTP request.
///
/// `GET /hydra/metrics` answers with the Prometheus exposition directly;
/// everything else is snapshotted and rendered through the engine on the
/// blocking thread pool. A crashed render task degrades to a bare 500 —
/// this function never fails the connection.
///
/// # Arguments
///
/// * `engine` - The engine to render with
/// * `props_builder` - Builds the props payload for this request
/// * `req` - The incoming HTTP request
///
/// # Returns
///
/// The HTTP response; the error type is [`Infallible`].
async fn handle_request(
    engine: Arc<SsrEngine>,
    props_builder: PropsBuilder,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() == Method::GET && req.uri().path() == "/hydra/metrics" {
        let body = engine.metrics_prometheus();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(METRICS_CONTENT_TYPE),
        );
        return Ok(response);
    }

    let snapshot = RequestSnapshot::from_hyper(&req);
    let result = tokio::task::spawn_blocking(move || {
        let props = props_builder(&snapshot);
        engine.render_result(Some(&snapshot), &props, &RenderOptions::default())
    })
    .await;

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(%error, "render task failed");
            SsrRenderResult {
                status: 500,
                html: "<!doctype html><html><body><h1>Internal error</h1></body></html>"
                    .to_string(),
                ..Default::default()
            }
        }
    };

    Ok(to_http_response(result))
}

/// Converts an engine render result into a hyper response.
///
/// # Arguments
///
/// * `result` - The engine's render result: body, status, and headers
///
/// # Returns
///
/// An HTTP response with `text/html; charset=utf-8` as the base content
/// type and every valid engine header applied on top. Envelope headers come
/// from bundle code, so anything that is not a valid HTTP header name or
/// value is dropped with a warning instead of failing the whole response.
fn to_http_response(result: SsrRenderResult) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(result.html)));
    *response.status_mut() =
        StatusCode::from_u16(result.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );

    for (name, value) in &result.headers {
        let Ok(header_name) = name.parse::<HeaderName>() else {
            tracing::warn!(header = %name, "skipping invalid response header name");
            continue;
        };
        let Ok(header_value) = HeaderValue::from_str(value) else {
            tracing::warn!(header = %name, "skipping invalid response header value");
            continue;
        };
        response.headers_mut().insert(header_name, header_value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn render_result_maps_to_http_response() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Request-Id".to_string(), "rid-1".to_string());
        headers.insert("Location".to_string(), "/login".to_string());
        let result = SsrRenderResult {
            html: "<p>x</p>".to_string(),
            status: 302,
            headers,
        };

        let response = to_http_response(result);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["X-Request-Id"], "rid-1");
        assert_eq!(response.headers()["Location"], "/login");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    }

    #[test]
    fn invalid_headers_are_dropped_not_fatal() {
        let mut headers = BTreeMap::new();
        headers.insert("Bad Name".to_string(), "v".to_string());
        headers.insert("X-Ok".to_string(), "fine".to_string());
        let result = SsrRenderResult {
            html: String::new(),
            status: 200,
            headers,
        };

        let response = to_http_response(result);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("Bad Name").is_none());
        assert_eq!(response.headers()["X-Ok"], "fine");
    }
}
