//! Shared message, payload, and error types for the teleop link.
//!
//! Everything that crosses the wire between the operator client and the
//! robot's control module is defined here so both ends of the link agree on
//! field names and codes.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name of the field carrying a message's channel identifier.
pub const CHANNEL_FIELD: &str = "id";

/// The named fields of a decoded message, with the channel field removed.
pub type Fields = Map<String, Value>;

/// Discrete motor states understood by the control module.
///
/// The discriminants are the integer codes used on the wire in the `type`
/// field of a `command` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum MotorState {
    RotateLeft = 0,
    RotateRight = 1,
    DriveForward = 2,
    DriveBackward = 3,
    /// Forward while veering left.
    DriveLeft = 4,
    /// Forward while veering right.
    DriveRight = 5,
    Halt = 6,
}

impl MotorState {
    pub const ALL: [MotorState; 7] = [
        MotorState::RotateLeft,
        MotorState::RotateRight,
        MotorState::DriveForward,
        MotorState::DriveBackward,
        MotorState::DriveLeft,
        MotorState::DriveRight,
        MotorState::Halt,
    ];

    /// Wire code of this state.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<MotorState> for u8 {
    fn from(state: MotorState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for MotorState {
    type Error = LinkError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        MotorState::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or(LinkError::InvalidMotorCode(code))
    }
}

impl std::fmt::Display for MotorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MotorState::RotateLeft => "rotate-left",
            MotorState::RotateRight => "rotate-right",
            MotorState::DriveForward => "drive-forward",
            MotorState::DriveBackward => "drive-backward",
            MotorState::DriveLeft => "drive-left",
            MotorState::DriveRight => "drive-right",
            MotorState::Halt => "halt",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Channel payloads
// ---------------------------------------------------------------------------

/// A payload type bound to a single named channel.
///
/// Implementors serialize to (and deserialize from) the message's fields
/// without the channel identifier.
pub trait ChannelPayload: Serialize + DeserializeOwned {
    /// Channel name carried in the `id` field.
    const CHANNEL: &'static str;
}

/// Free-form text from the control module (`message`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub text: String,
}

/// Estimated robot pose in tile units (`robot`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotPose {
    pub x: f64,
    pub y: f64,
    /// Heading in degrees.
    pub r: f64,
}

/// Side distance sensors and gyro reading (`sensor`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub left: f64,
    pub right: f64,
    pub rot: f64,
}

/// One sample of a lidar sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanNode {
    pub dist: f64,
    pub angle: f64,
    pub quality: f64,
}

/// A batch of lidar samples (`rplidar`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarScan {
    pub nodes: Vec<ScanNode>,
}

/// A single map cell update (`tile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileUpdate {
    pub col: i32,
    pub row: i32,
    #[serde(rename = "type")]
    pub kind: i32,
}

/// Full map as a row-major flat list of tile codes (`map`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub tiles: Vec<i32>,
}

impl MapSnapshot {
    /// Tile code at (`col`, `row`) for a map `cols` wide, if in range.
    pub fn tile_at(&self, col: usize, row: usize, cols: usize) -> Option<i32> {
        if col >= cols {
            return None;
        }
        let index = row.checked_mul(cols)?.checked_add(col)?;
        self.tiles.get(index).copied()
    }
}

/// Debug marker in tile units (`point`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebugPoint {
    pub col: f64,
    pub row: f64,
}

impl DebugPoint {
    /// A zero column or row means the module had no point to report.
    pub fn is_present(&self) -> bool {
        self.col != 0.0 && self.row != 0.0
    }
}

/// Wheel speeds and directions chosen by the steering module (`steering`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteeringReport {
    pub left_speed: f64,
    pub right_speed: f64,
    pub left_forward: bool,
    pub right_forward: bool,
}

/// Outbound motor command (`command`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCommand {
    #[serde(rename = "type")]
    pub state: MotorState,
}

/// Outbound controller gains (`calibration`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub kp: f32,
    pub kd: f32,
}

macro_rules! channel {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(impl ChannelPayload for $ty {
            const CHANNEL: &'static str = $name;
        })*
    };
}

channel! {
    TextMessage => "message",
    RobotPose => "robot",
    SensorReading => "sensor",
    LidarScan => "rplidar",
    TileUpdate => "tile",
    MapSnapshot => "map",
    DebugPoint => "point",
    SteeringReport => "steering",
    MotorCommand => "command",
    Calibration => "calibration",
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A decoded frame: channel identifier plus its remaining fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: String,
    pub fields: Fields,
}

impl Message {
    /// Decode a frame payload.
    ///
    /// # Errors
    ///
    /// * [`LinkError::Malformed`] – the payload is not JSON.
    /// * [`LinkError::NotAnObject`] – the payload is JSON but not an object.
    /// * [`LinkError::MissingChannel`] – the object has no usable `id`
    ///   (absent, empty, or not a string).
    pub fn decode(payload: &[u8]) -> Result<Self, LinkError> {
        let value: Value = serde_json::from_slice(payload).map_err(LinkError::Malformed)?;
        let Value::Object(mut fields) = value else {
            return Err(LinkError::NotAnObject);
        };
        match fields.remove(CHANNEL_FIELD) {
            Some(Value::String(channel)) if !channel.is_empty() => Ok(Self { channel, fields }),
            _ => Err(LinkError::MissingChannel),
        }
    }

    /// Deserialize the fields into the typed payload `P`.
    pub fn payload<P: ChannelPayload>(&self) -> Result<P, LinkError> {
        parse_fields(P::CHANNEL, &self.fields)
    }
}

/// Deserialize `fields` received on `channel` into `P`.
pub fn parse_fields<P: DeserializeOwned>(channel: &str, fields: &Fields) -> Result<P, LinkError> {
    serde_json::from_value(Value::Object(fields.clone())).map_err(|source| LinkError::Payload {
        channel: channel.to_string(),
        source,
    })
}

#[derive(Serialize)]
struct Envelope<'a, P> {
    id: &'a str,
    #[serde(flatten)]
    payload: &'a P,
}

/// Serialize `payload` as a JSON object tagged with its channel identifier.
pub fn encode<P: ChannelPayload>(payload: &P) -> Result<String, LinkError> {
    serde_json::to_string(&Envelope {
        id: P::CHANNEL,
        payload,
    })
    .map_err(|source| LinkError::Payload {
        channel: P::CHANNEL.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised anywhere in the link: socket lifecycle, decoding, routing,
/// and handler failures. None of them is fatal to the host loop.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("no live connection to the control module")]
    NotConnected,

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("socket {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame payload is not a JSON object")]
    NotAnObject,

    #[error("frame has no channel identifier")]
    MissingChannel,

    #[error("invalid payload on channel '{channel}': {source}")]
    Payload {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("handler on channel '{channel}' failed: {details}")]
    Handler { channel: String, details: String },

    #[error("unknown motor state code {0}")]
    InvalidMotorCode(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_state_codes_match_wire_values() {
        let codes: Vec<u8> = MotorState::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(MotorState::try_from(4).unwrap(), MotorState::DriveLeft);
        assert!(matches!(
            MotorState::try_from(7),
            Err(LinkError::InvalidMotorCode(7))
        ));
    }

    #[test]
    fn command_encodes_with_channel_and_integer_type() {
        let json = encode(&MotorCommand {
            state: MotorState::DriveForward,
        })
        .unwrap();
        assert_eq!(json, r#"{"id":"command","type":2}"#);
    }

    #[test]
    fn calibration_encodes_gains_as_floats() {
        let json = encode(&Calibration { kp: 1.5, kd: 0.25 }).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "calibration");
        assert_eq!(value["kp"], 1.5);
        assert_eq!(value["kd"], 0.25);
    }

    #[test]
    fn decode_strips_channel_field() {
        let msg = Message::decode(br#"{"id":"sensor","left":12.5,"right":8.0,"rot":90.0}"#)
            .unwrap();
        assert_eq!(msg.channel, "sensor");
        assert!(!msg.fields.contains_key(CHANNEL_FIELD));

        let reading: SensorReading = msg.payload().unwrap();
        assert_eq!(
            reading,
            SensorReading {
                left: 12.5,
                right: 8.0,
                rot: 90.0
            }
        );
    }

    #[test]
    fn decode_classifies_failures() {
        assert!(matches!(
            Message::decode(b"{not json"),
            Err(LinkError::Malformed(_))
        ));
        assert!(matches!(Message::decode(b"[1,2]"), Err(LinkError::NotAnObject)));
        assert!(matches!(
            Message::decode(br#"{"x":1}"#),
            Err(LinkError::MissingChannel)
        ));
        assert!(matches!(
            Message::decode(br#"{"id":7}"#),
            Err(LinkError::MissingChannel)
        ));
        assert!(matches!(
            Message::decode(br#"{"id":""}"#),
            Err(LinkError::MissingChannel)
        ));
    }

    #[test]
    fn payload_reports_channel_on_shape_mismatch() {
        let msg = Message::decode(br#"{"id":"robot","x":"east"}"#).unwrap();
        let err = msg.payload::<RobotPose>().unwrap_err();
        assert!(err.to_string().contains("robot"));
    }

    #[test]
    fn motor_command_rejects_unknown_code() {
        let msg = Message::decode(br#"{"id":"command","type":9}"#).unwrap();
        assert!(msg.payload::<MotorCommand>().is_err());
    }

    #[test]
    fn debug_point_zero_means_absent() {
        assert!(!DebugPoint { col: 0.0, row: 3.0 }.is_present());
        assert!(!DebugPoint { col: 2.0, row: 0.0 }.is_present());
        assert!(DebugPoint { col: 2.0, row: 3.0 }.is_present());
    }

    #[test]
    fn map_snapshot_indexes_row_major() {
        let map = MapSnapshot {
            tiles: vec![0, 1, 2, 1, 1, 2],
        };
        assert_eq!(map.tile_at(2, 0, 3), Some(2));
        assert_eq!(map.tile_at(0, 1, 3), Some(1));
        assert_eq!(map.tile_at(3, 0, 3), None);
        assert_eq!(map.tile_at(0, 2, 3), None);
        assert_eq!(map.tile_at(0, usize::MAX, 3), None);
        assert_eq!(map.tile_at(2, usize::MAX / 3, 3), None);
    }

    #[test]
    fn tile_codes_outside_byte_range_decode() {
        let message = Message::decode(br#"{"id":"map","tiles":[0,-1,300]}"#).unwrap();
        let map: MapSnapshot = message.payload().unwrap();
        assert_eq!(map.tiles, vec![0, -1, 300]);

        let message = Message::decode(br#"{"id":"tile","col":4,"row":1,"type":-2}"#).unwrap();
        let tile: TileUpdate = message.payload().unwrap();
        assert_eq!(tile.kind, -2);
    }

    #[test]
    fn lidar_scan_decodes_nested_nodes() {
        let msg = Message::decode(
            br#"{"id":"rplidar","nodes":[{"dist":120.0,"angle":45.5,"quality":15}]}"#,
        )
        .unwrap();
        let scan: LidarScan = msg.payload().unwrap();
        assert_eq!(scan.nodes.len(), 1);
        assert_eq!(scan.nodes[0].quality, 15.0);
    }
}
