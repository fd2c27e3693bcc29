//! Cross-context dispatcher: moves device events from the producer thread onto
//! the subscriber runtime.
//!
//! # How it works (for beginners)
//!
//! The device client runs on its own OS thread with its own tokio runtime.
//! Browser sessions live on the main runtime.  Instead of letting the device
//! thread touch WebSocket sinks directly, it drops each event into a bounded
//! `tokio::sync::mpsc` channel:
//!
//! ```text
//! shot-device thread ──schedule()──► [ mpsc queue ] ──► DispatchLoop ──► Broadcaster
//! ```
//!
//! [`DispatchHandle::schedule`] uses `try_send`, which never blocks and never
//! needs a runtime, so it is safe to call from a plain callback.  The single
//! [`DispatchLoop`] drains the queue in order, so every subscriber sees events
//! in the order the device emitted them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shot_core::DeviceEvent;

use crate::application::broadcast::Broadcaster;

/// Creates a connected handle/loop pair with room for `capacity` pending
/// events.
pub fn dispatch_channel(capacity: usize) -> (DispatchHandle, DispatchLoop) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DispatchHandle {
            tx,
            dropped: Arc::clone(&dropped),
        },
        DispatchLoop { rx },
    )
}

/// Producer-side end of the dispatcher.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<DeviceEvent>,
    dropped: Arc<AtomicU64>,
}

impl DispatchHandle {
    /// Queues an event for broadcast without blocking.
    ///
    /// Returns `false` (and logs a warning) if the queue is full or the
    /// dispatch loop has stopped; the event is dropped in that case.
    pub fn schedule(&self, event: DeviceEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("dispatch queue full; dropping device event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("dispatch loop stopped; dropping device event");
                false
            }
        }
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer-side end of the dispatcher.
#[derive(Debug)]
pub struct DispatchLoop {
    rx: mpsc::Receiver<DeviceEvent>,
}

impl DispatchLoop {
    /// Broadcasts queued events until `cancel` fires or every handle is
    /// dropped.  Returns the number of events processed.
    pub async fn run(mut self, broadcaster: Arc<Broadcaster>, cancel: CancellationToken) -> u64 {
        let mut processed = 0u64;
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("dispatch loop cancelled");
                    break;
                }
                ev = self.rx.recv() => match ev {
                    Some(ev) => ev,
                    None => {
                        debug!("all dispatch handles dropped");
                        break;
                    }
                },
            };

            match &event {
                DeviceEvent::Shot(shot) => {
                    info!(
                        "shot: {:.1} mph, {:.0} rpm, VLA {:.1}°, HLA {:.1}°",
                        shot.ball_speed, shot.total_spin, shot.vla, shot.hla
                    );
                    broadcaster.broadcast_shot(shot).await;
                }
                DeviceEvent::Status(status) => {
                    debug!(
                        "device status: fw {} up {}s, {} shots",
                        status.firmware_version, status.uptime_seconds, status.shot_count
                    );
                    broadcaster.broadcast_status(status).await;
                }
            }
            processed += 1;
        }
        processed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::SubscriberRegistry;
    use crate::application::session::tests::{session_with, RecordingTransport};
    use serde_json::Value;
    use shot_core::{ShotEvent, StatusEvent};
    use std::time::Duration;

    fn shot(speed: f64) -> DeviceEvent {
        DeviceEvent::Shot(ShotEvent::new(speed, 0.0, 2500.0, 1.0, 12.0))
    }

    fn broadcaster_with(t: &RecordingTransport) -> Arc<Broadcaster> {
        let registry = Arc::new(SubscriberRegistry::new(8));
        registry.add(session_with(t.clone())).unwrap();
        Arc::new(Broadcaster::new(registry, Duration::from_millis(200)))
    }

    #[test]
    fn test_schedule_from_plain_thread_without_runtime() {
        // Arrange
        let (handle, _loop) = dispatch_channel(4);

        // Act: no tokio runtime on this thread
        let ok = std::thread::spawn(move || handle.schedule(shot(100.0)))
            .join()
            .unwrap();

        // Assert
        assert!(ok);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (handle, _loop) = dispatch_channel(1);

        assert!(handle.schedule(shot(100.0)));
        assert!(!handle.schedule(shot(101.0)));

        assert_eq!(handle.dropped(), 1);
    }

    #[test]
    fn test_schedule_after_loop_dropped_does_not_panic() {
        let (handle, dispatch_loop) = dispatch_channel(4);
        drop(dispatch_loop);

        assert!(!handle.schedule(shot(100.0)));
        assert_eq!(handle.dropped(), 1);
    }

    #[tokio::test]
    async fn test_events_buffered_before_run_are_broadcast_in_order() {
        // Arrange: schedule before the loop starts
        let t = RecordingTransport::default();
        let (handle, dispatch_loop) = dispatch_channel(8);
        handle.schedule(shot(100.0));
        handle.schedule(DeviceEvent::Status(StatusEvent {
            uptime_seconds: 1,
            firmware_version: "2.0".to_string(),
            shot_count: 1,
        }));
        handle.schedule(shot(110.0));
        drop(handle);

        // Act: the loop exits once the queue is drained and all handles are gone
        let processed = dispatch_loop
            .run(broadcaster_with(&t), CancellationToken::new())
            .await;

        // Assert
        assert_eq!(processed, 3);
        let types: Vec<String> = t
            .frames()
            .iter()
            .map(|f| {
                let v: Value = serde_json::from_str(f).unwrap();
                v["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(types, vec!["shot", "status", "shot"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_loop() {
        let t = RecordingTransport::default();
        let (_handle, dispatch_loop) = dispatch_channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let processed = tokio::time::timeout(
            Duration::from_secs(1),
            dispatch_loop.run(broadcaster_with(&t), cancel),
        )
        .await
        .expect("loop must stop on cancel");

        assert_eq!(processed, 0);
        assert!(t.frames().is_empty());
    }

    #[tokio::test]
    async fn test_events_from_another_runtime_reach_subscribers() {
        let t = RecordingTransport::default();
        let (handle, dispatch_loop) = dispatch_channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatch_loop.run(broadcaster_with(&t), cancel.clone()));

        // A separate OS thread with its own current-thread runtime, like the
        // device thread.
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                handle.schedule(shot(120.0));
            });
        })
        .join()
        .unwrap();

        let processed = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(processed, 1);
        assert_eq!(t.frames().len(), 1);
    }
}
