//! JavaScript runtime layer: one Boa context per pooled runtime, each owned
//! by a dedicated worker thread.

mod bindings;
mod pool;
mod ssr_runtime;

pub use pool::{RuntimeLease, RuntimePool};
pub use ssr_runtime::SsrRuntime;
