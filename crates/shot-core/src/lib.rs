//! # shot-core
//!
//! Shared library for the shot bridge containing the launch-monitor event
//! types, the spin decomposition helper, and the newline-delimited JSON codec
//! spoken by the device.
//!
//! This crate is used by the bridge binary and by anything that needs to talk
//! to a launch monitor.  It has zero dependencies on sockets, async runtimes,
//! or threads.
//!
//! # Architecture overview (for beginners)
//!
//! A launch monitor watches a golf ball leave the club face and reports what
//! it measured: ball speed, launch angles, spin.  Those measurements arrive as
//! JSON lines on a TCP connection and are then pushed to browser mini-games.
//!
//! - **`domain`** – The measurements themselves ([`ShotEvent`],
//!   [`ClubEvent`], [`StatusEvent`]) and the spin maths.  These are the types
//!   the browser ultimately sees.
//!
//! - **`protocol`** – How bytes travel between the bridge and the device.
//!   Each message is one JSON object terminated by `\n`; the codec buffers
//!   partial reads and hands back typed [`DeviceFrame`]s.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `shot_core::ShotEvent` instead of `shot_core::domain::shot::ShotEvent`.
pub use domain::shot::{ClubEvent, DeviceEvent, ShotEvent, StatusEvent};
pub use domain::spin::{decompose_spin, SpinComponents};
pub use protocol::codec::{encode_frame, LineDecoder, ProtocolError};
pub use protocol::messages::DeviceFrame;
