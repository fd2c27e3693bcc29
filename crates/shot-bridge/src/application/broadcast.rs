//! Broadcast engine: best-effort fan-out of one message to every subscriber.
//!
//! One broadcast pass:
//!
//! 1. Take a registry snapshot.  Empty → return immediately (no
//!    serialisation, no I/O, no log line).
//! 2. Serialise the message once.
//! 3. Send the same text to every session concurrently, each send bounded by
//!    `send_timeout` so one slow browser cannot stall the others.
//! 4. Remove every session whose send failed or timed out.
//!
//! Nothing is retried.  A subscriber that failed simply misses the event.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use shot_core::{ShotEvent, StatusEvent};

use crate::application::registry::SubscriberRegistry;
use crate::application::session::TransportError;
use crate::domain::messages::{Envelope, ServerMsg};

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions in the snapshot (one send attempt each).
    pub attempted: usize,
    /// Sends that completed successfully.
    pub delivered: usize,
    /// Sessions this pass removed from the registry.
    pub removed: usize,
}

/// Fans messages out to every registered session.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Broadcasts `{"type":"shot","data":{...}}`.
    pub async fn broadcast_shot(&self, shot: &ShotEvent) -> BroadcastReport {
        self.fan_out("shot", || {
            serde_json::to_string(&ServerMsg::Shot { data: shot.clone() })
        })
        .await
    }

    /// Broadcasts `{"type":"status","data":{...}}`.
    pub async fn broadcast_status(&self, status: &StatusEvent) -> BroadcastReport {
        self.fan_out("status", || {
            serde_json::to_string(&ServerMsg::Status {
                data: status.clone(),
            })
        })
        .await
    }

    /// Broadcasts an arbitrary `{"type": msg_type, "data": data}` envelope.
    pub async fn broadcast_message(&self, msg_type: &str, data: &Value) -> BroadcastReport {
        self.fan_out(msg_type, || serde_json::to_string(&Envelope { msg_type, data }))
            .await
    }

    async fn fan_out<F>(&self, type_name: &str, serialize: F) -> BroadcastReport
    where
        F: FnOnce() -> serde_json::Result<String>,
    {
        let sessions = self.registry.snapshot();
        if sessions.is_empty() {
            return BroadcastReport::default();
        }

        let text = match serialize() {
            Ok(t) => t,
            Err(e) => {
                error!("failed to serialise '{type_name}' broadcast: {e}");
                return BroadcastReport::default();
            }
        };

        let send_timeout = self.send_timeout;
        let sends = sessions.iter().map(|session| {
            let text = text.clone();
            async move {
                let result = match timeout(send_timeout, session.send_text(text)).await {
                    Ok(r) => r,
                    Err(_) => {
                        session.mark_dead();
                        Err(TransportError::Timeout(send_timeout))
                    }
                };
                (session, result)
            }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            attempted: sessions.len(),
            ..BroadcastReport::default()
        };
        for (session, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "session {} ({}): dropping subscriber after failed '{type_name}' send: {e}",
                        session.id(),
                        session.peer()
                    );
                    if self.registry.remove(session.id()) {
                        report.removed += 1;
                    }
                }
            }
        }

        debug!(
            "broadcast '{type_name}': {}/{} delivered, {} removed",
            report.delivered, report.attempted, report.removed
        );
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::tests::{session_with, RecordingTransport};
    use serde_json::json;

    fn setup() -> (Arc<SubscriberRegistry>, Broadcaster) {
        let registry = Arc::new(SubscriberRegistry::new(64));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Duration::from_millis(100));
        (registry, broadcaster)
    }

    fn test_shot() -> ShotEvent {
        ShotEvent::new(120.0, -2.0, 2800.0, 2.5, 15.0)
    }

    #[tokio::test]
    async fn test_empty_registry_does_nothing() {
        // Arrange
        let (_registry, broadcaster) = setup();
        let mut serialised = false;

        // Act
        let report = broadcaster
            .fan_out("shot", || {
                serialised = true;
                Ok(String::new())
            })
            .await;

        // Assert: no serialisation and no send attempts
        assert_eq!(report, BroadcastReport::default());
        assert!(!serialised);
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_exactly_one_send() {
        let (registry, broadcaster) = setup();
        let transports: Vec<_> = (0..5).map(|_| RecordingTransport::default()).collect();
        for t in &transports {
            registry.add(session_with(t.clone())).unwrap();
        }

        let report = broadcaster.broadcast_shot(&test_shot()).await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 5);
        assert_eq!(report.removed, 0);
        for t in &transports {
            let frames = t.frames();
            assert_eq!(frames.len(), 1);
            let v: Value = serde_json::from_str(&frames[0]).unwrap();
            assert_eq!(v["type"], "shot");
            assert_eq!(v["data"]["total_spin"], 2800.0);
        }
    }

    #[tokio::test]
    async fn test_failed_sends_are_removed_and_others_still_delivered() {
        // Arrange: two healthy, two broken subscribers
        let (registry, broadcaster) = setup();
        let good_a = RecordingTransport::default();
        let good_b = RecordingTransport::default();
        let bad_a = session_with(RecordingTransport::failing());
        let bad_b = session_with(RecordingTransport::failing());
        registry.add(session_with(good_a.clone())).unwrap();
        registry.add(session_with(good_b.clone())).unwrap();
        registry.add(Arc::clone(&bad_a)).unwrap();
        registry.add(Arc::clone(&bad_b)).unwrap();

        // Act
        let report = broadcaster.broadcast_shot(&test_shot()).await;

        // Assert
        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(bad_a.id()));
        assert!(!registry.contains(bad_b.id()));
        assert!(!registry.remove(bad_a.id()), "repeat removal is a no-op");
        assert_eq!(good_a.frames().len(), 1);
        assert_eq!(good_b.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_times_out_without_blocking_others() {
        let (registry, broadcaster) = setup();
        let good = RecordingTransport::default();
        let slow = session_with(RecordingTransport::stalling());
        registry.add(session_with(good.clone())).unwrap();
        registry.add(Arc::clone(&slow)).unwrap();

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            broadcaster.broadcast_shot(&test_shot()),
        )
        .await
        .expect("broadcast must finish despite a stalled subscriber");

        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(!slow.is_alive());
        assert_eq!(good.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_status_envelope() {
        let (registry, broadcaster) = setup();
        let t = RecordingTransport::default();
        registry.add(session_with(t.clone())).unwrap();

        broadcaster
            .broadcast_status(&StatusEvent {
                uptime_seconds: 10,
                firmware_version: "1.2.3".to_string(),
                shot_count: 3,
            })
            .await;

        let v: Value = serde_json::from_str(&t.frames()[0]).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["data"]["firmware_version"], "1.2.3");
    }

    #[tokio::test]
    async fn test_broadcast_message_uses_given_type() {
        let (registry, broadcaster) = setup();
        let t = RecordingTransport::default();
        registry.add(session_with(t.clone())).unwrap();

        let report = broadcaster
            .broadcast_message("leaderboard", &json!({"top": "ana"}))
            .await;

        assert_eq!(report.delivered, 1);
        let v: Value = serde_json::from_str(&t.frames()[0]).unwrap();
        assert_eq!(v, json!({"type": "leaderboard", "data": {"top": "ana"}}));
    }

    #[tokio::test]
    async fn test_messages_arrive_in_broadcast_order_per_session() {
        let (registry, broadcaster) = setup();
        let t = RecordingTransport::default();
        registry.add(session_with(t.clone())).unwrap();

        for speed in [100.0, 110.0, 120.0] {
            broadcaster
                .broadcast_shot(&ShotEvent::new(speed, 0.0, 2500.0, 0.0, 12.0))
                .await;
        }

        let speeds: Vec<f64> = t
            .frames()
            .iter()
            .map(|f| {
                let v: Value = serde_json::from_str(f).unwrap();
                v["data"]["ball_speed"].as_f64().unwrap()
            })
            .collect();
        assert_eq!(speeds, vec![100.0, 110.0, 120.0]);
    }
}
