use std::time::Duration;

/// Largest datagram read by default. Fits a CoAP message in a 1280-byte IPv6
/// MTU after DTLS and UDP overhead.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1152;

/// Inactivity window after which a session closes itself.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Size of the read buffer, and so the largest datagram accepted.
    pub max_message_size: usize,

    /// Close the transport when the session is torn down.
    /// When false the transport outlives the session.
    pub close_socket: bool,

    /// Close the session if no datagram arrives within this window.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            close_socket: true,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn new(max_message_size: usize, close_socket: bool) -> Self {
        Self {
            max_message_size,
            close_socket,
            ..Default::default()
        }
    }

    /// Set the read buffer size.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set whether teardown closes the transport.
    pub fn with_close_socket(mut self, close_socket: bool) -> Self {
        self.close_socket = close_socket;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}
