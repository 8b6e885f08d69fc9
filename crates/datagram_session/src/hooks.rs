use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A callback run once when a session is torn down.
pub type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of draining a [`CloseHooks`] registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub ran: usize,
    pub panicked: usize,
}

/// An ordered registry of close hooks.
///
/// Hooks are taken and cleared under the same lock that guards appends, so a
/// hook registered concurrently with the drain is either part of that drain
/// or, once the registry is drained, run straight away by the caller that
/// adds it. No hook is ever dropped or run twice.
#[derive(Default)]
pub struct CloseHooks {
    state: Mutex<HookState>,
}

#[derive(Default)]
struct HookState {
    hooks: Vec<CloseHook>,
    drained: bool,
}

impl CloseHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook`.
    ///
    /// If the registry has already been drained the hook runs immediately on
    /// the calling thread.
    pub fn add<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if !state.drained {
            state.hooks.push(Box::new(hook));
            return;
        }
        drop(state);

        tracing::debug!("Close hook registered after teardown, running it now");
        if !invoke(Box::new(hook)) {
            tracing::warn!("Late close hook panicked");
        }
    }

    /// Number of hooks waiting to run.
    pub fn len(&self) -> usize {
        self.state.lock().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_drained(&self) -> bool {
        self.state.lock().drained
    }

    /// Take every registered hook and mark the registry drained.
    fn take(&self) -> Vec<CloseHook> {
        let mut state = self.state.lock();
        state.drained = true;
        std::mem::take(&mut state.hooks)
    }

    /// Run every registered hook in registration order.
    ///
    /// A panicking hook is counted and the remaining hooks still run. Only the
    /// first call does any work.
    pub fn drain(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();
        for hook in self.take() {
            summary.ran += 1;
            if !invoke(hook) {
                summary.panicked += 1;
            }
        }
        summary
    }
}

impl fmt::Debug for CloseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CloseHooks")
            .field("pending", &state.hooks.len())
            .field("drained", &state.drained)
            .finish()
    }
}

fn invoke(hook: CloseHook) -> bool {
    panic::catch_unwind(AssertUnwindSafe(hook)).is_ok()
}
