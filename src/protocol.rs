//! Bus message types and line codec.
//!
//! Every process on the rover bus exchanges line-delimited JSON over TCP:
//! clients receive a stream of outbound messages and may submit inbound
//! command lines. Inbound and outbound sizes are bounded; anything larger is
//! rejected before parsing.

use arrayvec::ArrayString;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::drive::state::BridgeState;

pub const MAX_LINE_SIZE: usize = 512;

pub type LineBuffer = ArrayString<MAX_LINE_SIZE>;

/// Inbound velocity command for one drive-bridge instance. Normalized
/// fractions of maximum speed; sign is direction. Values are clamped at
/// ingress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveVelCmd {
    pub left: f32,
    pub right: f32,
}

/// Outbound per-axis telemetry sample. `wheel` encodes the controller's
/// physical group and axis side, e.g. `front_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveVelData {
    pub wheel: String,
    pub current_amps: f32,
    pub velocity_m_s: f32,
}

/// Outbound bridge state notification, emitted on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveStateData {
    pub pair: String,
    pub state: BridgeState,
}

/// Outbound interface bandwidth sample in megabits per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkBandwidth {
    pub tx_mbps: f32,
    pub rx_mbps: f32,
}

/// Inbound camera pipeline assignment request: desired camera device per
/// pipeline, `-1` to stop a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRequest {
    pub cameras: Vec<i32>,
}

/// Camera assignment outcome: the device actually streaming per pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraResponse {
    pub active: Vec<i32>,
}

/// Debug-echo service reply: the received request, echoed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub success: bool,
    pub echoed: serde_json::Value,
}

/// Envelope for everything a drive-bridge instance publishes; serialized
/// with the variant name as the JSON tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusMessage {
    DriveVelData(DriveVelData),
    DriveStateData(DriveStateData),
    NetworkBandwidth(NetworkBandwidth),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON message")]
    InvalidJson,
    #[error("message exceeds line size limit")]
    MessageTooLarge,
}

/// Decodes one inbound line, enforcing the size bound before parsing.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }
    serde_json::from_str(line.trim()).map_err(|_| ProtocolError::InvalidJson)
}

/// Outbound line encoder with a preallocated, size-bounded buffer.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: LineBuffer,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes one message into the internal buffer and returns it,
    /// without the trailing newline.
    pub fn encode<T: Serialize>(&mut self, message: &T) -> Result<&str, ProtocolError> {
        self.buffer.clear();
        let json = serde_json::to_string(message).map_err(|_| ProtocolError::InvalidJson)?;
        if json.len() > MAX_LINE_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.buffer.push_str(&json);
        Ok(&self.buffer)
    }
}
