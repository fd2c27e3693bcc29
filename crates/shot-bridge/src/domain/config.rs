//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built from defaults, then overlaid with the optional TOML tuning file
//! and finally with CLI host/port arguments (see `main.rs`).
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the bridge easy to embed in tests.

use std::net::SocketAddr;
use std::time::Duration;

/// Default WebSocket port browsers connect to.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Default TCP port of the launch monitor's JSON line API.
pub const DEFAULT_DEVICE_PORT: u16 = 2921;

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use shot_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8765);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the WebSocket listener binds to.  `0.0.0.0` accepts browsers on
    /// every interface.
    pub ws_bind_addr: SocketAddr,

    /// TCP address of the launch monitor.
    pub device_addr: SocketAddr,

    /// Identifier announced to the device in every outbound frame.
    pub device_id: String,

    /// How often a keep-alive frame is written to the device.
    pub heartbeat_interval: Duration,

    /// Delay between reconnect attempts after the device drops mid-run.
    pub reconnect_interval: Duration,

    /// Upper bound on a single device connect attempt.
    pub connect_timeout: Duration,

    /// Upper bound on one WebSocket send during a broadcast.  A subscriber that
    /// cannot accept a frame within this window is dropped.
    pub send_timeout: Duration,

    /// Maximum number of simultaneously registered subscribers.
    pub max_subscribers: usize,

    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,

    /// Capacity of the device → broadcast queue.
    pub dispatch_capacity: usize,

    /// How long shutdown waits for sessions and the device thread to finish.
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    /// | Field              | Default             |
    /// |--------------------|---------------------|
    /// | ws_bind_addr       | `0.0.0.0:8765`      |
    /// | device_addr        | `127.0.0.1:2921`    |
    /// | device_id          | `Shot Bridge 1.0`   |
    /// | heartbeat_interval | 5 seconds           |
    /// | reconnect_interval | 5 seconds           |
    /// | connect_timeout    | 3 seconds           |
    /// | send_timeout       | 2 seconds           |
    /// | max_subscribers    | 64                  |
    /// | max_message_size   | 64 KiB              |
    /// | dispatch_capacity  | 256                 |
    /// | shutdown_grace     | 2 seconds           |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_WS_PORT)),
            device_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_DEVICE_PORT)),
            device_id: "Shot Bridge 1.0".to_string(),
            heartbeat_interval: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            send_timeout: Duration::from_secs(2),
            max_subscribers: 64,
            max_message_size: 64 * 1024,
            dispatch_capacity: 256,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_bind_is_all_interfaces_on_8765() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.ws_bind_addr.port(), DEFAULT_WS_PORT);
        assert!(cfg.ws_bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_device_is_loopback_2921() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.device_addr.port(), DEFAULT_DEVICE_PORT);
        assert_eq!(cfg.device_addr.ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_default_heartbeat_interval_is_5s() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_default_limits_are_bounded() {
        // Neither the subscriber count nor the inbound message size may be
        // unbounded.
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.max_subscribers, 64);
        assert_eq!(cfg.max_message_size, 65_536);
        assert!(cfg.send_timeout > Duration::ZERO);
    }

    #[test]
    fn test_config_can_be_cloned() {
        let cfg = BridgeConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.ws_bind_addr, cloned.ws_bind_addr);
        assert_eq!(cfg.device_id, cloned.device_id);
    }
}
