//! Session handler: what the bridge does with each browser message.
//!
//! The WebSocket loop in `infrastructure::ws_server` owns the socket and calls
//! into [`SessionHandler`] for every lifecycle step, so the protocol rules can
//! be tested without a network.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use shot_core::ShotEvent;

use crate::application::broadcast::{BroadcastReport, Broadcaster};
use crate::application::session::{Session, SessionState, TransportError};
use crate::domain::messages::{ClientMsg, ServerMsg};

/// The shot broadcast in answer to `request_test_shot`.
pub fn canned_test_shot() -> ShotEvent {
    ShotEvent::new(120.0, -2.0, 2800.0, 2.5, 15.0)
}

/// What [`SessionHandler::handle_text`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Pong,
    Ready(Option<String>),
    TestShot(BroadcastReport),
    Ignored,
    Malformed,
}

/// Applies the browser protocol to one session at a time.
#[derive(Debug, Clone)]
pub struct SessionHandler {
    broadcaster: Arc<Broadcaster>,
    max_message_size: usize,
}

impl SessionHandler {
    /// Text frames longer than `max_message_size` bytes are dropped unparsed.
    pub fn new(broadcaster: Arc<Broadcaster>, max_message_size: usize) -> Self {
        Self {
            broadcaster,
            max_message_size,
        }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Sends the `connected` acknowledgement and moves the session to `Open`.
    pub async fn open(&self, session: &Session) -> Result<(), TransportError> {
        let ack = serde_json::to_string(&ServerMsg::connected())
            .map_err(|e| TransportError::Other(e.to_string()))?;
        session.send_text(ack).await?;
        session.advance(SessionState::Open);
        info!("session {} ({}) opened", session.id(), session.peer());
        Ok(())
    }

    /// Dispatches one inbound text frame.
    ///
    /// Malformed or oversized input is logged and ignored.  An error is
    /// returned only when replying to the sender failed.
    pub async fn handle_text(
        &self,
        session: &Session,
        text: &str,
    ) -> Result<Handled, TransportError> {
        if text.len() > self.max_message_size {
            warn!(
                "session {} ({}): ignoring {}-byte message (limit {})",
                session.id(),
                session.peer(),
                text.len(),
                self.max_message_size
            );
            return Ok(Handled::Malformed);
        }

        let msg: ClientMsg = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "session {} ({}): ignoring malformed message: {e}",
                    session.id(),
                    session.peer()
                );
                return Ok(Handled::Malformed);
            }
        };

        debug!("session {}: received '{}'", session.id(), msg.type_name());

        match msg {
            ClientMsg::Ping => {
                let pong = serde_json::to_string(&ServerMsg::Pong)
                    .map_err(|e| TransportError::Other(e.to_string()))?;
                let send_timeout = self.broadcaster.send_timeout();
                match timeout(send_timeout, session.send_text(pong)).await {
                    Ok(r) => r?,
                    Err(_) => {
                        session.mark_dead();
                        return Err(TransportError::Timeout(send_timeout));
                    }
                }
                Ok(Handled::Pong)
            }
            ClientMsg::Ready { game } => {
                info!(
                    "session {} ready (game: {})",
                    session.id(),
                    game.as_deref().unwrap_or("unspecified")
                );
                Ok(Handled::Ready(game))
            }
            ClientMsg::RequestTestShot => {
                info!("session {} requested a test shot", session.id());
                let report = self.broadcaster.broadcast_shot(&canned_test_shot()).await;
                Ok(Handled::TestShot(report))
            }
            ClientMsg::Unknown => {
                debug!("session {}: ignoring unknown message type", session.id());
                Ok(Handled::Ignored)
            }
        }
    }

    /// Closes the session and removes it from the registry.
    ///
    /// Safe to call more than once.
    pub async fn finish(&self, session: &Session) {
        if session.advance(SessionState::Closing) {
            let grace = self.broadcaster.send_timeout();
            if timeout(grace, session.close_transport()).await.is_err() {
                debug!("session {}: close frame timed out", session.id());
                session.mark_dead();
            }
        }
        session.advance(SessionState::Closed);
        if self.broadcaster.registry().remove(session.id()) {
            info!(
                "session {} ({}) closed, {} subscriber(s) remain",
                session.id(),
                session.peer(),
                self.broadcaster.registry().len()
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
