//! Native host functions exposed to the bundle.
//!
//! This module provides the native Rust functions that are exposed to
//! JavaScript code running in Boa. They are the only way a bundle can reach
//! back into the host during a render.
//!
//! # JavaScript API
//!
//! The following function is registered on the global object:
//!
//! - `__hydraFetch(jsonRequest) -> jsonResponse` - Dispatch one bridge call
//!   and return the JSON-encoded response
//!
//! Bundles are not expected to call `__hydraFetch` directly; the bootstrap
//! script wraps it into the friendlier `globalThis.hydra.fetch(request)`
//! object API, which handles the JSON encoding on both sides.
//!
//! # Safety
//!
//! A native callback carries no user context, so the bridge dispatcher is
//! parked in a thread-local slot before the context is built. Each worker
//! thread hosts exactly one context for its entire life, which makes the
//! thread-local an interpreter-private slot: the callback can always reach
//! the dispatcher of the runtime it is executing inside, and it never
//! outlives it. No pointer-as-number storage is involved — the slot holds a
//! properly reference-counted `Arc`.

use std::cell::RefCell;
use std::sync::Arc;

use boa_engine::{
    js_string, native_function::NativeFunction, object::FunctionObjectBuilder,
    property::Attribute, Context, JsResult, JsValue,
};

use crate::bridge::ApiBridgeDispatcher;

thread_local! {
    static ACTIVE_DISPATCHER: RefCell<Option<Arc<ApiBridgeDispatcher>>> = RefCell::new(None);
}

/// Park the bridge dispatcher for the current worker thread.
///
/// Must run on the worker thread before [`install_host_bindings`], so that
/// the native callback finds the dispatcher on its first invocation. The
/// slot is written once per thread and lives until the thread exits.
///
/// # Parameters
///
/// * `dispatcher` - The shared bridge dispatcher this thread's context will
///   route `hydra.fetch` calls through
pub(crate) fn bind_bridge_dispatcher(dispatcher: Arc<ApiBridgeDispatcher>) {
    ACTIVE_DISPATCHER.with(|slot| {
        *slot.borrow_mut() = Some(dispatcher);
    });
}

/// Install the Hydra host bindings into a Boa context.
///
/// This is the SINGLE place where we expose native functions to the
/// JavaScript VM. It registers `__hydraFetch` as a global property; the
/// bootstrap script layers `globalThis.hydra.fetch` on top of it.
///
/// # Parameters
///
/// * `ctx` - Mutable reference to the Boa context under construction
///
/// # Returns
///
/// `Ok(())` if the binding was installed successfully.
///
/// # Errors
///
/// Returns an error if registering the global property fails.
pub(crate) fn install_host_bindings(ctx: &mut Context) -> JsResult<()> {
    let fetch_fn =
        FunctionObjectBuilder::new(ctx.realm(), NativeFunction::from_fn_ptr(hydra_fetch)).build();
    ctx.register_global_property(js_string!("__hydraFetch"), fetch_fn, Attribute::all())?;
    Ok(())
}

/// Native implementation of `__hydraFetch`.
///
/// Reads the JSON-encoded bridge request from the first argument, dispatches
/// it through the thread's bound [`ApiBridgeDispatcher`], and returns the
/// JSON-encoded response as a string.
///
/// # Parameters
///
/// * `_this` - Ignored; the function does not use its receiver
/// * `args` - `args[0]` is the JSON-encoded bridge request; a missing or
///   non-string argument is treated as an empty request object
/// * `_ctx` - The calling Boa context (unused; dispatch is pure Rust)
///
/// # Returns
///
/// A JS string holding the JSON-encoded `{status, body, headers}` response.
/// This function never throws into JavaScript: policy violations, handler
/// failures, and even a missing dispatcher are all reported through the
/// response's `status` field (`501` when no dispatcher is bound).
fn hydra_fetch(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let request_json = args
        .first()
        .and_then(|value| value.as_string())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|| "{}".to_string());

    let response_json = ACTIVE_DISPATCHER.with(|slot| match slot.borrow().as_ref() {
        Some(dispatcher) => dispatcher.dispatch_raw(&request_json),
        None => {
            r#"{"status":501,"body":"Hydra API bridge is not configured","headers":{}}"#.to_string()
        }
    });

    Ok(JsValue::new(js_string!(response_json)))
}
