use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;

use crate::context::Context;

/// One committed generation of a [`ContextCell`].
#[derive(Debug)]
pub struct ContextSnapshot {
    version: u64,
    context: Context,
}

impl ContextSnapshot {
    /// Number of updates committed before this snapshot. The first one is 0.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl Deref for ContextSnapshot {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

/// A versioned reference cell holding the current [`Context`].
///
/// Readers load a snapshot without taking a lock. Writers are serialized by a
/// mutex, so a read-modify-write in [`ContextCell::update`] always builds on
/// the latest committed generation and no update is lost.
#[derive(Debug)]
pub struct ContextCell {
    current: ArcSwap<ContextSnapshot>,
    writer: Mutex<()>,
}

impl ContextCell {
    pub fn new(context: Context) -> Self {
        Self {
            current: ArcSwap::from_pointee(ContextSnapshot {
                version: 0,
                context,
            }),
            writer: Mutex::new(()),
        }
    }

    /// The latest committed snapshot.
    pub fn load(&self) -> Arc<ContextSnapshot> {
        self.current.load_full()
    }

    /// Replace the context with `f(current)` and return the new snapshot.
    pub fn update<F>(&self, f: F) -> Arc<ContextSnapshot>
    where
        F: FnOnce(&Context) -> Context,
    {
        let _guard = self.writer.lock();
        let previous = self.current.load();
        let next = Arc::new(ContextSnapshot {
            version: previous.version + 1,
            context: f(&previous.context),
        });
        self.current.store(Arc::clone(&next));
        next
    }
}
