//! Infrastructure layer for shot-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from browsers, talking to the launch monitor over TCP, reading the optional
//! tuning file, and running the device thread.
//!
//! # What does NOT belong here?
//!
//! - Protocol rules for browser messages (that is the application layer)
//! - Message and configuration types (that is the domain layer)
//! - Command-line parsing (that is done in `main.rs`)

pub mod config_file;
pub mod device_conn;
pub mod supervisor;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config_file::{apply_from_env, ConfigError, TuningFile, CONFIG_ENV_VAR};
pub use device_conn::OpenConnectClient;
pub use supervisor::{Bridge, RunningBridge};
pub use ws_server::{SubscriberServer, WsTransport};
