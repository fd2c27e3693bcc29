//! shot-bridge library crate.
//!
//! Fans shot and status events from one launch monitor out to any number of
//! browser mini-games over WebSocket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Launch monitor (JSON lines over TCP)
//!         ↓
//! [shot-bridge]
//!   ├── domain/           Pure types: browser message enums, BridgeConfig
//!   ├── application/      Registry, broadcast, dispatcher, session rules
//!   └── infrastructure/
//!         ├── device_conn/  TCP client for the launch monitor (shot-core codec)
//!         ├── ws_server/    WebSocket accept loop (tokio-tungstenite)
//!         ├── supervisor/   Startup, device thread, shutdown
//!         └── config_file/  Optional TOML tuning file
//!         ↓
//! Browsers (JSON over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `shot-core`; sockets are reached
//!   only through the `SessionTransport` and `DeviceSource` traits.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: subscriber registry, broadcast and session handling.
pub mod application;

/// Infrastructure layer: sockets, threads and files.
pub mod infrastructure;
