//! Launch-monitor device protocol message types.
//!
//! The device speaks an Open-Connect-style JSON dialect: PascalCase field
//! names, one object per line.  Four kinds of frames travel on the wire:
//!
//! | Frame        | Direction        | Recognised by                          |
//! |--------------|------------------|----------------------------------------|
//! | shot         | both             | a `BallData` object is present         |
//! | heartbeat    | bridge → device  | `ShotDataOptions.IsHeartBeat == true`  |
//! | status       | device → bridge  | `"type": "status"`                     |
//! | response     | device → bridge  | a numeric `Code` field                 |
//!
//! The frames are not self-describing through a single tag, which is why
//! [`DeviceFrame::from_value`] classifies them by shape instead of relying on
//! a serde enum tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::shot::{ClubEvent, ShotEvent, StatusEvent};
use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// API version string sent in every outbound frame.
pub const API_VERSION: &str = "1";

/// Distance unit announced to the device.
pub const DEFAULT_UNITS: &str = "Yards";

/// Response code the device uses to acknowledge a forwarded shot.
pub const CODE_SHOT_ACCEPTED: u16 = 200;

/// Response code the device uses to push player information.
pub const CODE_PLAYER_INFO: u16 = 201;

// ── Payload objects ───────────────────────────────────────────────────────────

/// Ball flight measurements as the device encodes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BallData {
    pub speed: f64,
    pub spin_axis: f64,
    pub total_spin: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_spin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_spin: Option<f64>,
    #[serde(rename = "HLA")]
    pub hla: f64,
    #[serde(rename = "VLA")]
    pub vla: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carry_distance: Option<f64>,
}

/// Club delivery measurements as the device encodes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClubData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_of_attack: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_to_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<f64>,
}

/// Flags describing what an outbound frame carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShotDataOptions {
    pub contains_ball_data: bool,
    pub contains_club_data: bool,
    #[serde(default)]
    pub launch_monitor_is_ready: bool,
    #[serde(default)]
    pub launch_monitor_ball_detected: bool,
    #[serde(default)]
    pub is_heart_beat: bool,
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// A shot or heartbeat frame.
///
/// The same envelope is used for both: a heartbeat is a shot frame with no
/// ball data and `IsHeartBeat` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShotFrame {
    #[serde(rename = "DeviceID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default)]
    pub shot_number: u64,
    #[serde(rename = "APIversion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ball_data: Option<BallData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_data: Option<ClubData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_data_options: Option<ShotDataOptions>,
}

impl ShotFrame {
    /// Builds a keep-alive frame announcing that the launch monitor is ready.
    pub fn heartbeat(device_id: &str, shot_number: u64) -> Self {
        Self {
            device_id: Some(device_id.to_string()),
            units: Some(DEFAULT_UNITS.to_string()),
            shot_number,
            api_version: Some(API_VERSION.to_string()),
            ball_data: None,
            club_data: None,
            shot_data_options: Some(ShotDataOptions {
                contains_ball_data: false,
                contains_club_data: false,
                launch_monitor_is_ready: true,
                launch_monitor_ball_detected: false,
                is_heart_beat: true,
            }),
        }
    }

    /// Builds an outbound shot frame from a [`ShotEvent`].
    ///
    /// Back and side spin are always populated: the reported values are used
    /// when present, otherwise they are decomposed from total spin and axis.
    pub fn from_event(device_id: &str, shot_number: u64, shot: &ShotEvent) -> Self {
        let (back_spin, side_spin) = shot.spin_components();
        let club_data = shot.club.as_ref().map(|c| ClubData {
            speed: c.speed,
            angle_of_attack: c.angle_of_attack,
            face_to_target: c.face_to_target,
            path: c.path,
        });

        Self {
            device_id: Some(device_id.to_string()),
            units: Some(DEFAULT_UNITS.to_string()),
            shot_number,
            api_version: Some(API_VERSION.to_string()),
            ball_data: Some(BallData {
                speed: shot.ball_speed,
                spin_axis: shot.spin_axis,
                total_spin: shot.total_spin,
                back_spin: Some(back_spin),
                side_spin: Some(side_spin),
                hla: shot.hla,
                vla: shot.vla,
                carry_distance: shot.carry_distance,
            }),
            shot_data_options: Some(ShotDataOptions {
                contains_ball_data: true,
                contains_club_data: club_data.is_some(),
                launch_monitor_is_ready: true,
                launch_monitor_ball_detected: true,
                is_heart_beat: false,
            }),
            club_data,
        }
    }

    /// Returns `true` if this frame is a keep-alive rather than a shot.
    pub fn is_heartbeat(&self) -> bool {
        self.shot_data_options
            .as_ref()
            .is_some_and(|o| o.is_heart_beat)
    }

    /// Converts the frame into the browser-facing [`ShotEvent`].
    ///
    /// Returns `None` for frames without ball data (heartbeats).
    pub fn to_event(&self) -> Option<ShotEvent> {
        let ball = self.ball_data.as_ref()?;
        Some(ShotEvent {
            ball_speed: ball.speed,
            spin_axis: ball.spin_axis,
            total_spin: ball.total_spin,
            back_spin: ball.back_spin,
            side_spin: ball.side_spin,
            hla: ball.hla,
            vla: ball.vla,
            carry_distance: ball.carry_distance,
            club: self.club_data.as_ref().map(|c| ClubEvent {
                speed: c.speed,
                angle_of_attack: c.angle_of_attack,
                face_to_target: c.face_to_target,
                path: c.path,
            }),
        })
    }
}

/// A device health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    /// Always `"status"` on the wire.
    #[serde(rename = "type")]
    pub frame_type: String,
    pub uptime_seconds: u64,
    pub firmware_version: String,
    pub shot_count: u64,
}

impl StatusFrame {
    pub fn to_event(&self) -> StatusEvent {
        StatusEvent {
            uptime_seconds: self.uptime_seconds,
            firmware_version: self.firmware_version.clone(),
            shot_count: self.shot_count,
        }
    }
}

/// The device's reply to a shot or heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseFrame {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl ResponseFrame {
    /// `true` when the device accepted a forwarded shot.
    pub fn is_shot_accepted(&self) -> bool {
        self.code == CODE_SHOT_ACCEPTED
    }
}

/// Any frame the codec can decode from a device line.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceFrame {
    Shot(ShotFrame),
    Heartbeat(ShotFrame),
    Status(StatusFrame),
    Response(ResponseFrame),
}

impl DeviceFrame {
    /// Classifies a parsed JSON object by its shape and decodes it.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnrecognizedFrame`] if the object matches none of the
    ///   known frame shapes.
    /// - [`ProtocolError::MalformedFrame`] if the shape matched but a field has
    ///   the wrong type or is missing.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Some(obj) = value.as_object() else {
            return Err(ProtocolError::UnrecognizedFrame(
                "top-level value is not an object".to_string(),
            ));
        };

        if obj.contains_key("BallData") {
            let frame: ShotFrame = serde_json::from_value(value)
                .map_err(|e| ProtocolError::MalformedFrame(format!("shot: {e}")))?;
            return Ok(DeviceFrame::Shot(frame));
        }

        if obj.get("type").and_then(Value::as_str) == Some("status") {
            let frame: StatusFrame = serde_json::from_value(value)
                .map_err(|e| ProtocolError::MalformedFrame(format!("status: {e}")))?;
            return Ok(DeviceFrame::Status(frame));
        }

        if obj.contains_key("Code") {
            let frame: ResponseFrame = serde_json::from_value(value)
                .map_err(|e| ProtocolError::MalformedFrame(format!("response: {e}")))?;
            return Ok(DeviceFrame::Response(frame));
        }

        let is_heartbeat = obj
            .get("ShotDataOptions")
            .and_then(|o| o.get("IsHeartBeat"))
            .and_then(Value::as_bool)
            == Some(true);
        if is_heartbeat {
            let frame: ShotFrame = serde_json::from_value(value)
                .map_err(|e| ProtocolError::MalformedFrame(format!("heartbeat: {e}")))?;
            return Ok(DeviceFrame::Heartbeat(frame));
        }

        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        Err(ProtocolError::UnrecognizedFrame(format!(
            "keys: [{}]",
            keys.join(", ")
        )))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
