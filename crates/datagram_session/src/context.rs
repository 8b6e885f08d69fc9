use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Stand-in for "never" when a timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + timeout`, saturating to a far-future instant on overflow.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// A cancellable, value-carrying handle.
///
/// Contexts form a tree. A child created with [`Context::with_cancel`] or
/// [`Context::with_deadline`] is cancelled whenever its parent is. A child
/// created with [`Context::with_value`] shares its parent's cancellation and
/// deadline and only adds a key/value pair, so attaching metadata never loses
/// the cancellation wiring of the context it wraps.
///
/// Cloning is cheap: the token and the value chain are reference counted.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Option<Arc<ValueNode>>,
}

struct ValueNode {
    key: &'static str,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<ValueNode>>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel the paired context. Calling this more than once has no effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Context {
    /// A root context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: None,
        }
    }

    /// Derive a child that can be cancelled independently of its parent.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let token = self.token.child_token();
        let child = Context {
            token: token.clone(),
            deadline: self.deadline,
            values: self.values.clone(),
        };
        (child, CancelHandle { token })
    }

    /// Derive a child that also expires at `deadline`.
    ///
    /// A parent deadline that is earlier than `deadline` still wins.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        let (mut child, cancel) = self.with_cancel();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        (child, cancel)
    }

    /// Derive a child that expires `timeout` from now.
    ///
    /// A timeout too large to represent, such as `Duration::MAX`, yields a
    /// deadline decades away instead of overflowing.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.with_deadline(deadline_after(Instant::now(), timeout))
    }

    /// Wrap this context with one more key/value pair.
    ///
    /// The returned context shares this context's cancellation and deadline.
    pub fn with_value<V>(&self, key: &'static str, value: V) -> Context
    where
        V: Any + Send + Sync,
    {
        Context {
            token: self.token.clone(),
            deadline: self.deadline,
            values: Some(Arc::new(ValueNode {
                key,
                value: Box::new(value),
                parent: self.values.clone(),
            })),
        }
    }

    /// Look up the most recently attached value for `key`.
    ///
    /// Returns `None` if the key is absent or if the newest value stored
    /// under it is not a `V`.
    pub fn value<V: Any>(&self, key: &str) -> Option<&V> {
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            if current.key == key {
                return current.value.downcast_ref::<V>();
            }
            node = current.parent.as_deref();
        }
        None
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the context ends first.
    ///
    /// A context that has already ended fails without polling `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = fut => Ok(output),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            keys.push(current.key);
            node = current.parent.as_deref();
        }
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lookup_walks_the_chain() {
        let ctx = Context::background()
            .with_value("peer", "10.0.0.1".to_string())
            .with_value("tenant", 7u32);

        assert_eq!(ctx.value::<String>("peer").map(String::as_str), Some("10.0.0.1"));
        assert_eq!(ctx.value::<u32>("tenant"), Some(&7));
        assert_eq!(ctx.value::<u32>("missing"), None);
    }

    #[test]
    fn test_newer_value_shadows_older() {
        let first = Context::background().with_value("attempt", 1u8);
        let second = first.with_value("attempt", 2u8);

        assert_eq!(first.value::<u8>("attempt"), Some(&1));
        assert_eq!(second.value::<u8>("attempt"), Some(&2));
    }

    #[test]
    fn test_type_mismatch_returns_none() {
        let ctx = Context::background().with_value("port", 5684u16);
        assert_eq!(ctx.value::<u32>("port"), None);
    }

    #[test]
    fn test_cancel_propagates_to_children_and_value_wrappers() {
        let (parent, cancel) = Context::background().with_cancel();
        let (child, _child_cancel) = parent.with_cancel();
        let tagged = child.with_value("k", ());

        assert!(!tagged.is_done());
        cancel.cancel();

        assert_eq!(parent.err(), Some(ContextError::Cancelled));
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        assert_eq!(tagged.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn test_child_cancel_does_not_touch_parent() {
        let (parent, _cancel) = Context::background().with_cancel();
        let (child, child_cancel) = parent.with_cancel();

        child_cancel.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.err(), None);

        let err = ctx.done().await;
        assert_eq!(err, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_parent_deadline_wins() {
        let (parent, _p) = Context::background().with_timeout(Duration::from_secs(1));
        let (child, _c) = parent.with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_saturates() {
        let start = Instant::now();
        let (ctx, cancel) = Context::background().with_timeout(Duration::MAX);

        let deadline = ctx.deadline().unwrap();
        assert!(deadline >= start + FAR_FUTURE);
        assert_eq!(ctx.err(), None);

        cancel.cancel();
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn test_run_returns_output_when_live() {
        let ctx = Context::background();
        let out = ctx.run(async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_run_fails_fast_when_already_cancelled() {
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let out = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_unblocks_on_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();

        let handle = tokio::spawn(async move { ctx.run(std::future::pending::<()>()).await });
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), Err(ContextError::Cancelled));
    }

    #[test]
    fn test_debug_lists_keys_newest_first() {
        let ctx = Context::background().with_value("a", 1).with_value("b", 2);
        let debug = format!("{ctx:?}");
        assert!(debug.contains(r#"["b", "a"]"#));
    }
}
