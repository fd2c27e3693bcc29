//! Subscriber session entity.
//!
//! A [`Session`] represents one open browser connection.  It owns an opaque
//! [`SessionTransport`] (the write half of a WebSocket in production, an
//! in-memory fake in tests), a liveness flag, and a lifecycle state:
//!
//! ```text
//! Connecting ──► Open ──► Closing ──► Closed
//!      └──────────────────────┘ (over the cap, or ack failed)
//! ```
//!
//! States only ever move forward.  The peer address is kept for log messages;
//! routing uses the [`SessionId`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors a transport can report when sending.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer is gone (or the session was already marked dead).
    #[error("connection closed")]
    Closed,

    /// The send did not complete within the broadcast timeout.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Write side of a subscriber connection.
///
/// Implementations must be safe to call from several tasks at once; the
/// WebSocket implementation serialises writers with an async mutex so frames
/// from one caller are never interleaved with another's.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Sends one text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Sends a close frame (best effort) and releases the connection.
    async fn close(&self);
}

/// Unique identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first UUID group is plenty to tell sessions apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// One connected subscriber.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    transport: Box<dyn SessionTransport>,
    alive: AtomicBool,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("alive", &self.is_alive())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Creates a session in the `Connecting` state.
    ///
    /// `cancel` is usually a child of the server's shutdown token, so a
    /// bridge shutdown ends every session's read loop.
    pub fn new(
        peer: SocketAddr,
        transport: impl SessionTransport + 'static,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: SessionId::new(),
            peer,
            transport: Box::new(transport),
            alive: AtomicBool::new(true),
            state: AtomicU8::new(SessionState::Connecting as u8),
            cancel,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the session forward to `next`.
    ///
    /// Returns `true` if the state changed; moving backwards (or to the same
    /// state) is a no-op that returns `false`.
    pub fn advance(&self, next: SessionState) -> bool {
        let prev = self.state.fetch_max(next as u8, Ordering::AcqRel);
        prev < next as u8
    }

    /// Flags the session as unable to receive and wakes its read loop.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Resolves once the session was marked dead or the bridge is shutting
    /// down.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Sends one text frame to the peer.
    ///
    /// A failed send marks the session dead.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let result = self.transport.send_text(text).await;
        if result.is_err() {
            self.mark_dead();
        }
        result
    }

    /// Closes the underlying transport and marks the session dead.
    pub async fn close_transport(&self) {
        self.mark_dead();
        self.transport.close().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
