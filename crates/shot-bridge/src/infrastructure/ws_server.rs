//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket session.
//! 3. Turning away connections over the subscriber cap, then sending the
//!    `connected` acknowledgement and registering the session.
//! 4. Reading browser messages and handing them to the [`SessionHandler`].
//! 5. Closing every session when the shutdown token fires.
//!
//! # Scalability
//!
//! Each browser session runs in its own Tokio task, tracked in a `JoinSet` so
//! shutdown can wait for all of them.  The accept loop never blocks on a
//! session: it spawns the task and goes straight back to `accept()`.
//!
//! # Write path
//!
//! The read half of each socket stays in its session task.  The write half is
//! wrapped in a [`WsTransport`] behind an async mutex, because both the
//! session task (pong replies) and the broadcast engine write to it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::handler::SessionHandler;
use crate::application::session::{Session, SessionTransport, TransportError};
use crate::domain::config::BridgeConfig;

/// Upper bound on the HTTP upgrade handshake of a new connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept()` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Multiple of `max_message_size` at which tungstenite itself gives up on a
/// message.  Anything between the two is read and then dropped by the
/// [`SessionHandler`] with the session left open.
const TRANSPORT_CEILING_FACTOR: usize = 16;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

// ── Transport ─────────────────────────────────────────────────────────────────

/// Write half of a browser WebSocket.
pub struct WsTransport {
    sink: Mutex<WsSink>,
}

impl WsTransport {
    pub fn new(sink: WsSink) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        // Either call fails harmlessly if the peer already went away.
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    }
}

fn map_ws_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Other(other.to_string()),
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A bound, not yet running, subscriber listener.
pub struct SubscriberServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: SessionHandler,
    ws_config: WebSocketConfig,
    shutdown_grace: Duration,
}

impl SubscriberServer {
    /// Binds the WebSocket listener on `config.ws_bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is in use or cannot be bound.
    pub async fn bind(config: &BridgeConfig, handler: SessionHandler) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to bind WebSocket listener on {}",
                    config.ws_bind_addr
                )
            })?;
        let local_addr = listener
            .local_addr()
            .context("failed to read listener address")?;

        let ceiling = config
            .max_message_size
            .saturating_mul(TRANSPORT_CEILING_FACTOR);
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(ceiling);
        ws_config.max_frame_size = Some(ceiling);

        Ok(Self {
            listener,
            local_addr,
            handler,
            ws_config,
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts browsers until `cancel` fires, then closes every session.
    pub async fn run(self, cancel: CancellationToken) {
        info!("WebSocket bridge listening on {}", self.local_addr);

        let shared = Arc::new(SessionContext {
            handler: self.handler,
            ws_config: self.ws_config,
        });
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested; stopping accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("new browser connection from {peer}");
                        let ctx = Arc::clone(&shared);
                        sessions.spawn(handle_subscriber(stream, peer, ctx, cancel.child_token()));
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        drop(self.listener);

        // Session tokens are children of `cancel`, so every session is already
        // on its way out.  Give them the grace period to send Close frames.
        let remaining = sessions.len();
        if remaining > 0 {
            debug!("waiting for {remaining} session(s) to close");
        }
        let drained = timeout(self.shutdown_grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} session(s) did not close within {:?}; aborting",
                sessions.len(),
                self.shutdown_grace
            );
            sessions.abort_all();
        }
        info!("WebSocket server stopped");
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

struct SessionContext {
    handler: SessionHandler,
    ws_config: WebSocketConfig,
}

/// Entry point of each per-session task: runs the session and logs the
/// outcome.
async fn handle_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    cancel: CancellationToken,
) {
    if let Err(e) = run_session(stream, peer, ctx, cancel).await {
        warn!("session {peer} ended with error: {e:#}");
    }
}

async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    // ── Step 1: WebSocket handshake ───────────────────────────────────────────
    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        res = timeout(
            HANDSHAKE_TIMEOUT,
            accept_async_with_config(stream, Some(ctx.ws_config)),
        ) => res
            .with_context(|| format!("WebSocket handshake with {peer} timed out"))?
            .with_context(|| format!("WebSocket handshake failed with {peer}"))?,
    };

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let session = Arc::new(Session::new(peer, WsTransport::new(ws_tx), cancel));
    let handler = &ctx.handler;

    // ── Step 2: admit, acknowledge, then register ─────────────────────────────
    let registry = handler.broadcaster().registry();
    if registry.len() >= registry.capacity() {
        warn!(
            "rejecting {peer}: subscriber limit of {} reached",
            registry.capacity()
        );
        handler.finish(&session).await;
        return Ok(());
    }

    if let Err(e) = handler.open(&session).await {
        handler.finish(&session).await;
        return Err(e).with_context(|| format!("failed to acknowledge {peer}"));
    }

    // A concurrent handshake can still take the last slot after the check
    // above; that session is acknowledged and then closed.
    match registry.add(Arc::clone(&session)) {
        Ok(count) => info!(
            "session {} ({peer}) registered, {count} subscriber(s)",
            session.id()
        ),
        Err(e) => {
            warn!("rejecting {peer}: {e}");
            handler.finish(&session).await;
            return Ok(());
        }
    }

    // ── Step 3: read loop ─────────────────────────────────────────────────────
    loop {
        tokio::select! {
            _ = session.closed() => {
                debug!("session {}: closing (shutdown or failed send)", session.id());
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(e) = handler.handle_text(&session, &text).await {
                        debug!("session {}: reply failed: {e}", session.id());
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("session {}: peer closed the connection", session.id());
                    break;
                }
                // Binary frames are ignored; protocol ping/pong is answered by
                // tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("session {}: read error: {e}", session.id());
                    break;
                }
            },
        }
    }

    // ── Step 4: teardown ──────────────────────────────────────────────────────
    handler.finish(&session).await;
    Ok(())
}
