//! Hydra SSR engine.
//!
//! A server-side rendering engine embedded inside a long-running HTTP
//! server. Given a request URL, a structured props value, and a per-request
//! context, it invokes a preloaded JavaScript bundle inside a pooled
//! interpreter, interprets the returned HTML (or response envelope), wraps
//! fragments in a canonical document shell, applies security headers, and
//! hands the final response back to the host.
//!
//! # Architecture
//!
//! - [`runtime::SsrRuntime`] — one Boa interpreter with the bundle
//!   preloaded, owned by a dedicated worker thread (`Context` is `!Send`).
//! - [`runtime::RuntimePool`] — fixed-size FIFO pool of runtimes with
//!   bounded-wait leases and recycle-on-fault.
//! - [`SsrEngine`] — the render pipeline: request context, props merging,
//!   lease/execute, envelope parsing, HTML shell, security headers,
//!   metrics.
//! - [`bridge`] — the synchronous `hydra.fetch` host bridge bundles use for
//!   server-side data fetching, policed before the host handler runs.
//!
//! # Example
//!
//! ```no_run
//! use hydra_engine::{RenderOptions, SsrEngine};
//! use serde_json::json;
//!
//! let engine = SsrEngine::init_and_start(&json!({
//!     "ssr_bundle_path": "./public/assets/ssr-bundle.js",
//!     "asset_manifest_path": "./public/assets/manifest.json",
//! }))?;
//!
//! let result = engine.render_result(None, &json!({"page": "home"}), &RenderOptions::default());
//! assert_eq!(result.status, 200);
//! # Ok::<(), hydra_engine::HydraError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod manifest;
pub mod metrics;
pub mod request_context;
pub mod response;
pub mod runtime;
pub mod shell;

pub use bridge::{ApiBridgeHandler, ApiBridgeRequest, ApiBridgeResponse};
pub use config::{AssetMode, EngineConfig};
pub use engine::{SsrEngine, METRICS_CONTENT_TYPE, RESERVED_REQUEST_PROPS_KEY};
pub use error::{HydraError, Result};
pub use host::{HostAdapter, HostRequest, RenderOptions};
pub use metrics::MetricsSnapshot;
pub use response::SsrRenderResult;
