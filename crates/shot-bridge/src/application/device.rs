//! Device event source abstraction.
//!
//! The supervisor talks to the launch monitor only through [`DeviceSource`],
//! so tests can substitute a mock (`MockDeviceSource`, generated by mockall)
//! and the real TCP client lives in the infrastructure layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use shot_core::{DeviceEvent, ProtocolError, ShotEvent};

/// Callback invoked for every shot or status frame the device emits.
///
/// Called on the device thread; implementations must not block.
pub type EventCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Callback invoked when the device accepts a forwarded shot.
pub type ShotSuccessCallback = Arc<dyn Fn() + Send + Sync>;

/// Errors returned by device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device is not connected")]
    NotConnected,

    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("device write timed out after {0:?}")]
    Timeout(Duration),
}

/// Why [`DeviceSource::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The device closed the connection or a read failed.
    Disconnected,
    /// The cancellation token fired.
    Cancelled,
}

/// Connection state of the producer side, as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Initial connect in progress.
    Connecting,
    /// Connected and pumping events.
    Live,
    /// Initial connect failed; browsers are served without a device.
    Demo,
    /// Connection dropped mid-run; retrying.
    Reconnecting,
    /// The producer thread has exited.
    Stopped,
}

impl DeviceState {
    /// `true` if shots can currently be forwarded to the device.
    pub fn is_live(self) -> bool {
        self == DeviceState::Live
    }
}

/// A source of shot/status events: the launch monitor connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Attempts to open the device connection.  Returns `true` on success.
    async fn connect(&self) -> bool;

    /// Starts writing keep-alive frames every `interval`.
    ///
    /// Must be called from inside a tokio runtime.  Calling it again replaces
    /// the previous heartbeat task.
    fn start_heartbeat(&self, interval: Duration);

    /// Forwards a shot to the device.
    async fn send_shot(&self, shot: ShotEvent) -> Result<(), DeviceError>;

    fn is_connected(&self) -> bool;

    fn set_connected(&self, connected: bool);

    /// Registers the callback fed with inbound shot and status events.
    fn set_on_event(&self, callback: EventCallback);

    /// Registers the callback fired when the device accepts a forwarded shot.
    fn set_on_shot_success(&self, callback: ShotSuccessCallback);

    /// Reads from the device until it disconnects or `cancel` fires.
    async fn run(&self, cancel: CancellationToken) -> RunOutcome;

    /// Stops the heartbeat and closes the connection.  Idempotent.
    async fn shutdown(&self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
