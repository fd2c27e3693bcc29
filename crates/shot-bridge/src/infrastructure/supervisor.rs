//! Bridge supervisor: wires the subscriber side and the device side together
//! and owns their lifecycle.
//!
//! # Threads and runtimes
//!
//! ```text
//! main tokio runtime                       "shot-device" OS thread
//! ───────────────────                      ───────────────────────
//! SubscriberServer (accept + sessions)     current-thread runtime
//! DispatchLoop ◄──── DispatchHandle ◄───── DeviceSource callback
//!                    forward_tx ──────────► send_shot
//! ```
//!
//! The device connection lives entirely on its own thread so a slow or
//! wedged launch monitor can never delay browser traffic.  The only ways
//! across are the dispatcher queue (device → browsers) and the forward queue
//! (injected shots → device).
//!
//! # Device lifecycle
//!
//! 1. `Connecting`: one connect attempt.  Failure is final: `Demo`.
//! 2. `Live`: heartbeat running, events pumped into the dispatcher.
//! 3. On a mid-run disconnect: `Reconnecting`, retrying every
//!    `reconnect_interval` until it succeeds (back to `Live`) or shutdown.
//! 4. `Stopped` once the thread has cleaned up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use shot_core::{DeviceEvent, ShotEvent};

use crate::application::broadcast::Broadcaster;
use crate::application::device::{DeviceSource, DeviceState, RunOutcome};
use crate::application::dispatcher::{dispatch_channel, DispatchHandle};
use crate::application::handler::SessionHandler;
use crate::application::registry::SubscriberRegistry;
use crate::domain::config::BridgeConfig;
use crate::infrastructure::ws_server::SubscriberServer;

/// Name of the producer thread.
pub const DEVICE_THREAD_NAME: &str = "shot-device";

/// Entry point for starting a bridge.
pub struct Bridge;

impl Bridge {
    /// Binds the WebSocket listener and starts every component.
    ///
    /// `device = None` starts straight in demo mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the device thread
    /// cannot be spawned.
    pub async fn start(
        config: BridgeConfig,
        device: Option<Arc<dyn DeviceSource>>,
    ) -> anyhow::Result<RunningBridge> {
        let cancel = CancellationToken::new();

        let registry = Arc::new(SubscriberRegistry::new(config.max_subscribers));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            config.send_timeout,
        ));

        let handler = SessionHandler::new(Arc::clone(&broadcaster), config.max_message_size);
        let server = SubscriberServer::bind(&config, handler).await?;
        let local_addr = server.local_addr();
        let server_task = tokio::spawn(server.run(cancel.child_token()));

        let (dispatch, dispatch_loop) = dispatch_channel(config.dispatch_capacity);
        let dispatch_task = tokio::spawn(
            dispatch_loop.run(Arc::clone(&broadcaster), cancel.child_token()),
        );

        let (state_tx, state_rx) = watch::channel(DeviceState::Connecting);
        let (forward_tx, forward_rx) = mpsc::channel(config.dispatch_capacity.max(1));

        let device_thread = match device {
            Some(device) => {
                let worker = DeviceWorker {
                    device,
                    dispatch: dispatch.clone(),
                    state: state_tx,
                    forward_rx,
                    cancel: cancel.child_token(),
                    heartbeat_interval: config.heartbeat_interval,
                    reconnect_interval: config.reconnect_interval,
                };
                match spawn_device_thread(worker) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        cancel.cancel();
                        return Err(e);
                    }
                }
            }
            None => {
                info!("no launch monitor configured; running in demo mode");
                state_tx.send_replace(DeviceState::Demo);
                None
            }
        };

        info!(
            "bridge started: ws={local_addr}, device={}",
            config.device_addr
        );

        Ok(RunningBridge {
            local_addr,
            registry,
            broadcaster,
            dispatch,
            forward_tx,
            state_rx,
            cancel,
            server_task,
            dispatch_task,
            device_thread,
            shutdown_grace: config.shutdown_grace,
        })
    }
}

fn spawn_device_thread(worker: DeviceWorker) -> anyhow::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(DEVICE_THREAD_NAME.to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("failed to build device runtime: {e}");
                    worker.state.send_replace(DeviceState::Stopped);
                    return;
                }
            };
            rt.block_on(worker.run());
        })
        .context("failed to spawn device thread")
}

// ── Running bridge ────────────────────────────────────────────────────────────

/// Handle to a started bridge.
pub struct RunningBridge {
    local_addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    broadcaster: Arc<Broadcaster>,
    dispatch: DispatchHandle,
    forward_tx: mpsc::Sender<ShotEvent>,
    state_rx: watch::Receiver<DeviceState>,
    cancel: CancellationToken,
    server_task: JoinHandle<()>,
    dispatch_task: JoinHandle<u64>,
    device_thread: Option<thread::JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl RunningBridge {
    /// The WebSocket address browsers connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Current device state.
    pub fn device_state(&self) -> DeviceState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every device state change.
    pub fn watch_device_state(&self) -> watch::Receiver<DeviceState> {
        self.state_rx.clone()
    }

    /// Injects a shot: broadcast to browsers and, when the device is live,
    /// forwarded to it.
    ///
    /// Returns `true` if the shot was handed to the device thread.
    pub fn forward_shot(&self, shot: ShotEvent) -> bool {
        let live = self.device_state().is_live();
        let forwarded = if live {
            match self.forward_tx.try_send(shot.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("cannot forward shot to device: {e}");
                    false
                }
            }
        } else {
            debug!("device not live; shot goes to browsers only");
            false
        };
        self.dispatch.schedule(DeviceEvent::Shot(shot));
        forwarded
    }

    /// Stops every component and waits for them to finish.
    pub async fn shutdown(self) {
        info!("shutting down bridge");
        self.cancel.cancel();

        if let Err(e) = self.server_task.await {
            warn!("WebSocket server task failed: {e}");
        }

        let stragglers = self.registry.drain();
        if !stragglers.is_empty() {
            debug!("closing {} remaining session(s)", stragglers.len());
            for session in stragglers {
                if timeout(self.shutdown_grace, session.close_transport())
                    .await
                    .is_err()
                {
                    debug!("session {}: close timed out", session.id());
                }
            }
        }

        match self.dispatch_task.await {
            Ok(n) => debug!("dispatch loop processed {n} event(s)"),
            Err(e) => warn!("dispatch task failed: {e}"),
        }

        if let Some(handle) = self.device_thread {
            let joined = tokio::task::spawn_blocking(move || handle.join());
            match timeout(self.shutdown_grace, joined).await {
                Ok(Ok(Ok(()))) => debug!("device thread joined"),
                Ok(Ok(Err(_))) => error!("device thread panicked"),
                Ok(Err(e)) => warn!("failed to join device thread: {e}"),
                Err(_) => warn!(
                    "device thread did not stop within {:?}; detaching",
                    self.shutdown_grace
                ),
            }
        }

        info!("bridge stopped");
    }
}

// ── Device worker ─────────────────────────────────────────────────────────────

struct DeviceWorker {
    device: Arc<dyn DeviceSource>,
    dispatch: DispatchHandle,
    state: watch::Sender<DeviceState>,
    forward_rx: mpsc::Receiver<ShotEvent>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
    reconnect_interval: Duration,
}

impl DeviceWorker {
    fn set_state(&self, state: DeviceState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("device state: {previous:?} -> {state:?}");
        }
    }

    async fn run(mut self) {
        self.set_state(DeviceState::Connecting);

        if !self.connect_once().await {
            if !self.cancel.is_cancelled() {
                warn!("launch monitor unavailable; running in demo mode");
                self.set_state(DeviceState::Demo);
                self.cancel.cancelled().await;
            }
            self.set_state(DeviceState::Stopped);
            return;
        }

        let dispatch = self.dispatch.clone();
        self.device.set_on_event(Arc::new(move |event: DeviceEvent| {
            dispatch.schedule(event);
        }));
        self.device
            .set_on_shot_success(Arc::new(|| debug!("device confirmed forwarded shot")));

        loop {
            self.device.start_heartbeat(self.heartbeat_interval);
            self.set_state(DeviceState::Live);

            if self.pump().await == RunOutcome::Cancelled {
                break;
            }

            self.device.shutdown().await;
            self.set_state(DeviceState::Reconnecting);
            warn!(
                "launch monitor disconnected; retrying every {:?}",
                self.reconnect_interval
            );
            if !self.reconnect().await {
                break;
            }
            info!("launch monitor reconnected");
        }

        self.device.shutdown().await;
        self.set_state(DeviceState::Stopped);
        debug!("device worker stopped");
    }

    async fn connect_once(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            ok = self.device.connect() => ok,
        }
    }

    /// Retries until connected (`true`) or cancelled (`false`).
    async fn reconnect(&self) -> bool {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
            if self.connect_once().await {
                return true;
            }
            if self.cancel.is_cancelled() {
                return false;
            }
            debug!("reconnect attempt failed");
        }
    }

    /// Runs the device read loop while serving forwarded shots.
    async fn pump(&mut self) -> RunOutcome {
        let run = self.device.run(self.cancel.clone());
        tokio::pin!(run);
        loop {
            tokio::select! {
                outcome = &mut run => return outcome,
                Some(shot) = self.forward_rx.recv() => {
                    if let Err(e) = self.device.send_shot(shot).await {
                        warn!("could not forward shot to device: {e}");
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
