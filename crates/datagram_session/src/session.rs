use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::cell::ContextCell;
use crate::config::SessionConfig;
use crate::context::Context;
use crate::error::{SessionError, TransportError};
use crate::hooks::CloseHooks;
use crate::idle::IdleTimer;
use crate::message::Message;
use crate::processor::Processor;
use crate::state::{Lifecycle, SessionState};
use crate::transport::Connection;

/// Owns the lifecycle of one transport connection.
///
/// A session reads datagrams from its [`Connection`] and hands them to a
/// [`Processor`] until the session is closed, the peer goes idle, or a read or
/// process step fails. Whichever way it ends, teardown runs exactly once:
/// the session context is cancelled, close hooks run in registration order,
/// and the transport is closed if the session owns it.
///
/// `close`, `add_on_close` and `set_context_value` may be called from any
/// task while `run` is in progress; share the session through an `Arc`.
pub struct Session<C: Connection> {
    id: Uuid,
    connection: C,
    config: SessionConfig,
    context: ContextCell,
    lifecycle: Arc<Lifecycle>,
    close_hooks: CloseHooks,
    started: AtomicBool,
    torn_down: AtomicBool,
}

/// Signals the end of a session. Returned by [`Session::done`].
#[derive(Debug, Clone)]
pub struct Done {
    context: Context,
}

impl Done {
    /// Wait until the session context is cancelled.
    pub async fn wait(&self) {
        self.context.done().await;
    }

    pub fn is_done(&self) -> bool {
        self.context.is_done()
    }
}

impl<C: Connection> Session<C> {
    /// Create a session over `connection`, derived from `ctx`.
    ///
    /// Cancelling `ctx` ends the session as if [`Session::close`] were called.
    pub fn new(ctx: &Context, connection: C, max_message_size: usize, close_socket: bool) -> Self {
        Self::with_config(
            ctx,
            connection,
            SessionConfig::new(max_message_size, close_socket),
        )
    }

    pub fn with_config(ctx: &Context, connection: C, config: SessionConfig) -> Self {
        let (context, cancel) = ctx.with_cancel();
        let id = Uuid::new_v4();

        debug!(
            session_id = %id,
            remote_addr = %connection.remote_addr(),
            max_message_size = config.max_message_size,
            close_socket = config.close_socket,
            "Session created"
        );

        Self {
            id,
            connection,
            config,
            context: ContextCell::new(context),
            lifecycle: Arc::new(Lifecycle::new(cancel)),
            close_hooks: CloseHooks::new(),
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Request termination.
    ///
    /// Cancels the session context and returns without waiting: teardown is
    /// carried out by [`Session::run`] as it unwinds. Calling this more than
    /// once has no further effect.
    pub fn close(&self) -> Result<(), SessionError> {
        if self.lifecycle.close() {
            debug!(session_id = %self.id, "Session close requested");
        }
        Ok(())
    }

    /// A signal that fires once the session context is cancelled.
    pub fn done(&self) -> Done {
        Done {
            context: self.context.load().context().clone(),
        }
    }

    /// Register a callback to run during teardown.
    ///
    /// Hooks run in registration order. A hook registered after teardown has
    /// drained the list runs immediately on the calling thread.
    pub fn add_on_close<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.close_hooks.add(hook);
    }

    /// Attach `value` under `key` to the session context.
    ///
    /// The new context wraps the previous one, so earlier values and the
    /// session's cancellation are preserved.
    pub fn set_context_value<V>(&self, key: &'static str, value: V)
    where
        V: Any + Send + Sync,
    {
        let snapshot = self.context.update(move |ctx| ctx.with_value(key, value));
        trace!(
            session_id = %self.id,
            key,
            version = snapshot.version(),
            "Session context updated"
        );
    }

    /// A snapshot of the current session context.
    pub fn context(&self) -> Context {
        self.context.load().context().clone()
    }

    /// Clone of the value stored under `key` in the current context.
    pub fn context_value<V>(&self, key: &str) -> Option<V>
    where
        V: Any + Clone,
    {
        self.context.load().value::<V>(key).cloned()
    }

    /// Serialize `message` and write it to the transport.
    ///
    /// The write is bounded by the message's own context, not the session's:
    /// a deadline on the message limits this write alone, and closing the
    /// session does not abort a write in flight. Failures are returned to the
    /// caller and leave the session running.
    pub async fn write_message<M: Message>(&self, message: &M) -> Result<(), SessionError> {
        let data = message
            .marshal()
            .map_err(|err| SessionError::Encoding(Box::new(err)))?;

        trace!(
            session_id = %self.id,
            len = data.len(),
            data = %HexDump(&data),
            "Outgoing message data"
        );

        self.connection
            .write_with_context(message.context(), &data)
            .await
            .map_err(SessionError::TransportWrite)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }

    pub fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_addr()
    }

    /// Read datagrams and pass them to `processor` until the session ends.
    ///
    /// Returns `Ok(())` when the session was closed on request (by
    /// [`Session::close`] or by cancelling the parent context). Otherwise
    /// returns the error that ended the loop; if the loop ended cleanly the
    /// first teardown failure is returned instead.
    ///
    /// Teardown also runs if the returned future is dropped before it
    /// completes. A session can only be run once.
    pub async fn run<P: Processor>(&self, mut processor: P) -> Result<(), SessionError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyRunning);
        }
        let _teardown = TeardownGuard { session: self };

        if self.lifecycle.start() {
            info!(
                session_id = %self.id,
                remote_addr = %self.remote_addr(),
                "Session running"
            );
        }

        let idle = self.arm_idle_timer();
        let result = self.read_loop(&mut processor, &idle).await;
        drop(idle);

        self.teardown(result)
    }

    fn arm_idle_timer(&self) -> IdleTimer {
        let lifecycle = Arc::clone(&self.lifecycle);
        let session_id = self.id;
        let timeout = self.config.idle_timeout;

        IdleTimer::spawn(timeout, self.context(), move || {
            warn!(session_id = %session_id, ?timeout, "Session idle, closing");
            lifecycle.close();
        })
    }

    async fn read_loop<P: Processor>(
        &self,
        processor: &mut P,
        idle: &IdleTimer,
    ) -> Result<(), SessionError> {
        let mut buf = vec![0u8; self.config.max_message_size];

        loop {
            let snapshot = self.context.load();
            let len = match self
                .connection
                .read_with_context(snapshot.context(), &mut buf)
                .await
            {
                Ok(len) => len.min(buf.len()),
                Err(err) => return self.read_failed(err, idle),
            };
            idle.reset();

            let datagram = &buf[..len];
            trace!(
                session_id = %self.id,
                len,
                data = %HexDump(datagram),
                "Incoming message data"
            );

            processor
                .process(datagram)
                .await
                .map_err(|err| SessionError::Processing(Box::new(err)))?;
        }
    }

    fn read_failed(&self, err: TransportError, idle: &IdleTimer) -> Result<(), SessionError> {
        if idle.fired() {
            return Err(SessionError::IdleTimeout(idle.timeout()));
        }
        if self.context.load().is_done() {
            debug!(session_id = %self.id, reason = %err, "Read interrupted by close");
            return Ok(());
        }
        Err(SessionError::TransportRead(err))
    }

    /// Cancel, drain hooks, close the transport. Runs once; later calls return
    /// `result` untouched.
    fn teardown(&self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return result;
        }

        let mut result = result;
        keep_first_error(self.id, &mut result, self.close());

        let summary = self.close_hooks.drain();
        debug!(session_id = %self.id, hooks = summary.ran, "Drained close hooks");
        if summary.panicked > 0 {
            keep_first_error(
                self.id,
                &mut result,
                Err(SessionError::HookPanicked(summary.panicked)),
            );
        }

        if self.config.close_socket {
            let closed = self.connection.close().map_err(SessionError::TransportClose);
            keep_first_error(self.id, &mut result, closed);
        }

        self.lifecycle.finish();
        info!(
            session_id = %self.id,
            remote_addr = %self.remote_addr(),
            "Session closed"
        );
        result
    }
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr())
            .field("state", &self.state())
            .field("config", &self.config)
            .field("close_hooks", &self.close_hooks)
            .finish()
    }
}

/// Runs teardown if `run` is dropped before it reaches its own teardown.
struct TeardownGuard<'a, C: Connection> {
    session: &'a Session<C>,
}

impl<C: Connection> Drop for TeardownGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.session.teardown(Ok(())) {
            warn!(
                session_id = %self.session.id,
                error = %err,
                "Teardown after cancelled run failed"
            );
        }
    }
}

fn keep_first_error(
    session_id: Uuid,
    result: &mut Result<(), SessionError>,
    next: Result<(), SessionError>,
) {
    let Err(err) = next else {
        return;
    };
    if result.is_ok() {
        *result = Err(err);
    } else {
        warn!(session_id = %session_id, error = %err, "Suppressed teardown error");
    }
}

struct HexDump<'a>(&'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
