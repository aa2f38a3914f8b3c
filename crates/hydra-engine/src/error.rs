use thiserror::Error;

/// Errors produced by the SSR engine.
///
/// The render pipeline branches on these variants to classify failures for
/// metrics (pool timeouts vs. render timeouts vs. render errors), so every
/// failure class the pipeline distinguishes gets its own variant.
#[derive(Error, Debug)]
pub enum HydraError {
    #[error("Hydra config '{0}' is invalid: {1}")]
    ConfigInvalid(&'static str, String),

    #[error("Unable to load SSR bundle: {0}")]
    BundleLoad(String),

    #[error("SSR asset manifest not found: {0}")]
    ManifestMissing(String),

    #[error("SSR asset manifest parse failed: {0}")]
    ManifestParse(String),

    #[error("Timed out waiting for available SSR runtime after {0}ms")]
    AcquireTimeout(u64),

    /// The watchdog deadline elapsed before the bundle returned. The Display
    /// text is the user-visible sentinel that ends up on the error page.
    #[error("SSR render exceeded timeout of {0}ms")]
    RenderTimeout(u64),

    #[error("SSR render threw exception: {0}")]
    RenderException(String),

    #[error("SSR bundle missing globalThis.render(url, propsJson, requestContextJson)")]
    MissingRenderEntry,

    #[error("SSR render did not return a string")]
    InvalidReturn,

    /// The runtime worker thread is gone (panicked or shut down).
    #[error("SSR runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HydraError>;
