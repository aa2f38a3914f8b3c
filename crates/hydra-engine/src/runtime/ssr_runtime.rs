//! A single SSR runtime: one Boa context preloaded with the bundle.
//!
//! `boa_engine::Context` has thread-local state and is `!Send`, so the
//! context lives on a dedicated worker thread for the runtime's whole life.
//! Render calls are dispatched as jobs over a channel and answered on a
//! per-call reply channel; the caller's bounded wait on that reply channel
//! is the render watchdog. A timed-out render is abandoned — the reply
//! receiver is dropped, the pool recycles the slot, and the orphaned worker
//! is left to run into the context's loop-iteration limit. A runtime that
//! timed out is never reused.

use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use boa_engine::{js_string, Context, JsError, JsValue, Source};

use crate::bridge::ApiBridgeDispatcher;
use crate::error::{HydraError, Result};
use crate::runtime::bindings;

/// Upper bound on iterations of any single loop. Far above anything a real
/// render does within its millisecond budget; bounds how long an abandoned
/// `while(true){}` render can keep its orphaned worker thread spinning.
const LOOP_ITERATION_LIMIT: u64 = 100_000_000;

/// Compatibility layer evaluated before the bundle. SSR bundles are built
/// for browser/node-flavored globals; the interpreter starts bare.
/// `setTimeout` runs its callback immediately — there is no event loop to
/// schedule against during a synchronous render.
const BOOTSTRAP_SOURCE: &str = r#"
if (typeof globalThis.global === "undefined") globalThis.global = globalThis;
if (typeof globalThis.self === "undefined") globalThis.self = globalThis;
if (typeof globalThis.process === "undefined") {
  globalThis.process = { env: { NODE_ENV: "production" } };
} else if (!globalThis.process.env) {
  globalThis.process.env = { NODE_ENV: "production" };
} else if (!globalThis.process.env.NODE_ENV) {
  globalThis.process.env.NODE_ENV = "production";
}
if (typeof globalThis.TextEncoder === "undefined") {
  globalThis.TextEncoder = class TextEncoder {
    encode(input = "") {
      const normalized = String(input);
      const encoded = unescape(encodeURIComponent(normalized));
      const bytes = new Uint8Array(encoded.length);
      for (let i = 0; i < encoded.length; ++i) {
        bytes[i] = encoded.charCodeAt(i);
      }
      return bytes;
    }
  };
}
if (typeof globalThis.TextDecoder === "undefined") {
  globalThis.TextDecoder = class TextDecoder {
    decode(input = new Uint8Array()) {
      let raw = "";
      for (let i = 0; i < input.length; ++i) {
        raw += String.fromCharCode(input[i]);
      }
      return decodeURIComponent(escape(raw));
    }
  };
}
if (typeof globalThis.queueMicrotask === "undefined") {
  globalThis.queueMicrotask = (fn) => Promise.resolve().then(fn);
}
if (typeof globalThis.setTimeout === "undefined") {
  globalThis.setTimeout = (fn) => {
    if (typeof fn === "function") fn();
    return 0;
  };
}
if (typeof globalThis.clearTimeout === "undefined") {
  globalThis.clearTimeout = () => {};
}
if (typeof globalThis.hydra === "undefined") {
  globalThis.hydra = {};
}
if (typeof globalThis.hydra.fetch !== "function") {
  globalThis.hydra.fetch = (request = {}) => {
    const payload = typeof request === "string" ? request : JSON.stringify(request);
    const raw = globalThis.__hydraFetch(payload);
    if (typeof raw === "string") {
      try {
        return JSON.parse(raw);
      } catch {
        return { status: 500, body: "Invalid bridge response", headers: {} };
      }
    }
    return raw;
  };
}
if (typeof globalThis.fetch !== "function") {
  globalThis.fetch = (request = {}) => Promise.resolve(globalThis.hydra.fetch(request));
}
"#;

struct RenderJob {
    url: String,
    props_json: String,
    request_context_json: String,
    reply: mpsc::Sender<Result<String>>,
}

/// Handle to a worker-thread-owned interpreter with the bundle preloaded.
///
/// At most one render may be in flight at a time; the pool's lease enforces
/// that. Dropping the runtime closes the job channel, which ends the worker
/// thread after its current job.
pub struct SsrRuntime {
    jobs: mpsc::Sender<RenderJob>,
}

impl SsrRuntime {
    /// Load the bundle from disk and bring up a fresh interpreter.
    ///
    /// Construction is synchronous: the worker thread reports back once the
    /// bootstrap and the bundle evaluated, and any failure along the way
    /// fails construction with the worker already gone.
    pub fn new(bundle_path: &Path, bridge: Arc<ApiBridgeDispatcher>) -> Result<Self> {
        let bundle_source = std::fs::read_to_string(bundle_path)
            .map_err(|e| HydraError::BundleLoad(format!("{}: {e}", bundle_path.display())))?;
        Self::from_source(bundle_source, bridge)
    }

    /// Bring up a fresh interpreter from an already-loaded bundle source.
    pub fn from_source(bundle_source: String, bridge: Arc<ApiBridgeDispatcher>) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<RenderJob>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        thread::Builder::new()
            .name("hydra-ssr-runtime".to_string())
            .spawn(move || runtime_worker(bundle_source, bridge, job_rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { jobs: job_tx }),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(HydraError::RuntimeUnavailable(
                "runtime worker exited during startup".to_string(),
            )),
        }
    }

    /// Invoke the bundle's `render(url, propsJson, requestContextJson)`.
    ///
    /// `timeout_ms = 0` waits indefinitely. On expiry the call fails with
    /// [`HydraError::RenderTimeout`] and this runtime must be recycled — the
    /// worker may still be executing the abandoned job and its state is no
    /// longer trusted.
    pub fn render(
        &self,
        url: &str,
        props_json: &str,
        request_context_json: &str,
        timeout_ms: u64,
    ) -> Result<String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.jobs
            .send(RenderJob {
                url: url.to_string(),
                props_json: props_json.to_string(),
                request_context_json: request_context_json.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| {
                HydraError::RuntimeUnavailable("runtime worker is gone".to_string())
            })?;

        if timeout_ms == 0 {
            return match reply_rx.recv() {
                Ok(result) => result,
                Err(_) => Err(HydraError::RuntimeUnavailable(
                    "runtime worker died mid-render".to_string(),
                )),
            };
        }

        match reply_rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(HydraError::RenderTimeout(timeout_ms)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(HydraError::RuntimeUnavailable(
                "runtime worker died mid-render".to_string(),
            )),
        }
    }
}

fn runtime_worker(
    bundle_source: String,
    bridge: Arc<ApiBridgeDispatcher>,
    job_rx: mpsc::Receiver<RenderJob>,
    ready_tx: mpsc::Sender<Result<()>>,
) {
    bindings::bind_bridge_dispatcher(bridge);

    let mut ctx = match build_context(&bundle_source) {
        Ok(ctx) => {
            let _ = ready_tx.send(Ok(()));
            ctx
        }
        Err(error) => {
            let _ = ready_tx.send(Err(error));
            return;
        }
    };

    while let Ok(job) = job_rx.recv() {
        let result = execute_render(&mut ctx, &job);
        // The receiver may already have timed out and moved on.
        let _ = job.reply.send(result);
    }
}

fn build_context(bundle_source: &str) -> Result<Context> {
    let mut ctx = Context::default();
    ctx.runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);

    bindings::install_host_bindings(&mut ctx)
        .map_err(|e| HydraError::BundleLoad(format!("failed to install host bridge: {e}")))?;

    ctx.eval(Source::from_bytes(BOOTSTRAP_SOURCE))
        .map_err(|e| HydraError::BundleLoad(format!("bootstrap script failed: {e}")))?;

    ctx.eval(Source::from_bytes(bundle_source))
        .map_err(|e| HydraError::BundleLoad(format!("bundle evaluation failed: {e}")))?;

    Ok(ctx)
}

fn execute_render(ctx: &mut Context, job: &RenderJob) -> Result<String> {
    let render_value = ctx
        .global_object()
        .get(js_string!("render"), ctx)
        .map_err(|_| HydraError::MissingRenderEntry)?;

    let render_fn = match render_value.as_object() {
        Some(object) if object.is_callable() => object.clone(),
        _ => return Err(HydraError::MissingRenderEntry),
    };

    let args = [
        JsValue::new(js_string!(job.url.as_str())),
        JsValue::new(js_string!(job.props_json.as_str())),
        JsValue::new(js_string!(job.request_context_json.as_str())),
    ];

    let result = render_fn
        .call(&JsValue::undefined(), &args, ctx)
        .map_err(|error| HydraError::RenderException(format_js_error(&error)))?;

    // Drain microtasks queued by the render (queueMicrotask polyfill).
    let _ = ctx.run_jobs();

    let rendered = result.to_string(ctx).map_err(|_| HydraError::InvalidReturn)?;
    Ok(rendered.to_std_string_escaped())
}

fn format_js_error(error: &JsError) -> String {
    error.to_string()
}
