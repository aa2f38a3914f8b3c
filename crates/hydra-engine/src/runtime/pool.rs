//! Fixed-size pool of SSR runtimes with FIFO lease semantics.
//!
//! Every slot is either in the ready queue or leased to exactly one caller.
//! A lease grants exclusive access to one runtime; dropping it returns the
//! slot. Leases marked for recycle reconstruct the slot's runtime before the
//! slot re-enters the ready queue — after a fault or a forced timeout the
//! old interpreter's state is not trusted.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::bridge::ApiBridgeDispatcher;
use crate::error::{HydraError, Result};
use crate::runtime::SsrRuntime;

struct PoolState {
    slots: Vec<Option<SsrRuntime>>,
    ready: VecDeque<usize>,
}

pub struct RuntimePool {
    state: Mutex<PoolState>,
    available: Condvar,
    bundle_path: PathBuf,
    bridge: Arc<ApiBridgeDispatcher>,
    size: usize,
}

impl RuntimePool {
    /// Construct `size` runtimes (floored at 1), each loading the bundle
    /// independently. Fails if any runtime fails to come up.
    pub fn new(
        size: usize,
        bundle_path: impl Into<PathBuf>,
        bridge: Arc<ApiBridgeDispatcher>,
    ) -> Result<Self> {
        let size = size.max(1);
        let bundle_path = bundle_path.into();

        let mut slots = Vec::with_capacity(size);
        let mut ready = VecDeque::with_capacity(size);
        for index in 0..size {
            slots.push(Some(SsrRuntime::new(&bundle_path, Arc::clone(&bridge))?));
            ready.push_back(index);
        }

        Ok(Self {
            state: Mutex::new(PoolState { slots, ready }),
            available: Condvar::new(),
            bundle_path,
            bridge,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of runtimes currently leased out.
    pub fn in_use(&self) -> usize {
        self.size - self.state.lock().unwrap().ready.len()
    }

    /// Take a lease on the next ready runtime, FIFO.
    ///
    /// `wait_ms = 0` blocks until a slot frees; otherwise the wait is
    /// bounded and expiry fails with [`HydraError::AcquireTimeout`].
    pub fn acquire(&self, wait_ms: u64) -> Result<RuntimeLease<'_>> {
        let mut state = self.state.lock().unwrap();

        if wait_ms == 0 {
            while state.ready.is_empty() {
                state = self.available.wait(state).unwrap();
            }
        } else {
            let deadline = Instant::now() + Duration::from_millis(wait_ms);
            while state.ready.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    return Err(HydraError::AcquireTimeout(wait_ms));
                }
                let (guard, _timed_out) =
                    self.available.wait_timeout(state, deadline - now).unwrap();
                state = guard;
            }
        }

        let index = state
            .ready
            .pop_front()
            .expect("ready queue non-empty after wait");
        let runtime = state.slots[index]
            .take()
            .expect("ready slot holds a runtime");

        Ok(RuntimeLease {
            pool: self,
            index,
            runtime: Some(runtime),
            recycle: false,
        })
    }

    fn release(&self, index: usize, runtime: SsrRuntime) {
        {
            let mut state = self.state.lock().unwrap();
            state.slots[index] = Some(runtime);
            state.ready.push_back(index);
        }
        self.available.notify_one();
    }

    /// Replace a slot's runtime and return the slot to the ready queue.
    ///
    /// Reconstruction failure keeps the existing runtime — it is usually
    /// still functional, and losing the slot would shrink the pool forever.
    /// This path never panics and always frees the slot.
    fn recycle(&self, index: usize, old: SsrRuntime) {
        let runtime = match SsrRuntime::new(&self.bundle_path, Arc::clone(&self.bridge)) {
            Ok(fresh) => {
                tracing::debug!(slot = index, "runtime recycled");
                drop(old);
                fresh
            }
            Err(error) => {
                tracing::warn!(slot = index, %error, "runtime recycle failed, keeping previous runtime");
                old
            }
        };
        self.release(index, runtime);
    }
}

/// Exclusive handle to one pooled runtime.
///
/// Movable, not clonable. The slot returns to the pool on drop.
pub struct RuntimeLease<'a> {
    pool: &'a RuntimePool,
    index: usize,
    runtime: Option<SsrRuntime>,
    recycle: bool,
}

impl std::fmt::Debug for RuntimeLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLease")
            .field("index", &self.index)
            .field("recycle", &self.recycle)
            .finish()
    }
}

impl RuntimeLease<'_> {
    pub fn render(
        &self,
        url: &str,
        props_json: &str,
        request_context_json: &str,
        timeout_ms: u64,
    ) -> Result<String> {
        match &self.runtime {
            Some(runtime) => runtime.render(url, props_json, request_context_json, timeout_ms),
            None => Err(HydraError::RuntimeUnavailable(
                "lease already released".to_string(),
            )),
        }
    }

    /// Request reconstruction of this slot's runtime when the lease drops.
    pub fn mark_for_recycle(&mut self) {
        self.recycle = true;
    }

    pub fn slot_index(&self) -> usize {
        self.index
    }
}

impl Drop for RuntimeLease<'_> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            if self.recycle {
                self.pool.recycle(self.index, runtime);
            } else {
                self.pool.release(self.index, runtime);
            }
        }
    }
}
