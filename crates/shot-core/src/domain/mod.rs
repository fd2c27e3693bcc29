//! Domain entities for the shot bridge.
//!
//! This module contains pure data and maths with no infrastructure
//! dependencies.  Everything here can be compiled and tested on any platform
//! without a device or a network.
//!
//! Code in outer layers (protocol codec, bridge, WebSocket server) depends on
//! the domain, but the domain never depends on them.

/// Shot, club, and status measurements.
pub mod shot;

/// Total spin + spin axis → back spin + side spin.
pub mod spin;
