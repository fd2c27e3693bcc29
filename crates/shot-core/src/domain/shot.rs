//! Launch-monitor measurement types.
//!
//! A [`ShotEvent`] is created once per detected shot, handed to every browser,
//! and then dropped.  Nothing in the bridge mutates or retains it.
//!
//! # JSON shape
//!
//! These structs serialise directly into the `data` payload the browser
//! receives, so field names are the browser-facing snake_case names.  Optional
//! fields are omitted entirely when absent instead of being sent as `null`:
//!
//! ```json
//! {"ball_speed":120.0,"spin_axis":-2.0,"total_spin":2800.0,"hla":2.5,"vla":15.0}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::spin::decompose_spin;

/// One detected ball-flight measurement.
///
/// Units are preserved from the device: speeds are whatever the launch monitor
/// reports (usually mph), angles are degrees, spin is rpm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotEvent {
    /// Ball speed off the club face.
    pub ball_speed: f64,

    /// Tilt of the spin axis in degrees.  Negative tilts left (draw),
    /// positive tilts right (fade).
    pub spin_axis: f64,

    /// Total spin rate in rpm.
    pub total_spin: f64,

    /// Back-spin component in rpm, only present if the source decomposed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_spin: Option<f64>,

    /// Side-spin component in rpm, only present if the source decomposed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_spin: Option<f64>,

    /// Horizontal launch angle in degrees (negative = left of target).
    pub hla: f64,

    /// Vertical launch angle in degrees.
    pub vla: f64,

    /// Carry distance, when the device computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carry_distance: Option<f64>,

    /// Club delivery data, when the device measures the club as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club: Option<ClubEvent>,
}

impl ShotEvent {
    /// Creates a shot with only the five mandatory ball measurements.
    pub fn new(ball_speed: f64, spin_axis: f64, total_spin: f64, hla: f64, vla: f64) -> Self {
        Self {
            ball_speed,
            spin_axis,
            total_spin,
            back_spin: None,
            side_spin: None,
            hla,
            vla,
            carry_distance: None,
            club: None,
        }
    }

    /// Attaches club data to the shot.
    pub fn with_club(mut self, club: ClubEvent) -> Self {
        self.club = Some(club);
        self
    }

    /// Attaches a carry distance to the shot.
    pub fn with_carry(mut self, carry_distance: f64) -> Self {
        self.carry_distance = Some(carry_distance);
        self
    }

    /// Returns `(back_spin, side_spin)`, computing them from `total_spin` and
    /// `spin_axis` when the device did not report them.
    pub fn spin_components(&self) -> (f64, f64) {
        match (self.back_spin, self.side_spin) {
            (Some(back), Some(side)) => (back, side),
            _ => {
                let parts = decompose_spin(self.total_spin, self.spin_axis);
                (parts.back_spin, parts.side_spin)
            }
        }
    }
}

/// Club delivery measurements attached to a shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClubEvent {
    /// Club head speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Angle of attack in degrees (negative = hitting down).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_of_attack: Option<f64>,
    /// Face angle relative to the target line in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_to_target: Option<f64>,
    /// Swing path relative to the target line in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<f64>,
}

/// Device health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Seconds since the device booted.
    pub uptime_seconds: u64,
    /// Firmware identifier string.
    pub firmware_version: String,
    /// Shots detected since boot.
    pub shot_count: u64,
}

/// Everything the device event source can hand to its callback.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Shot(ShotEvent),
    Status(StatusEvent),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
