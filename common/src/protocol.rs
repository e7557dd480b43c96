//! Protocol definition for the data socket.
//!
use serde::{Deserialize, Serialize};

/// Largest frame accepted on the data socket, enough for an uncompressed 4K still.
pub const MAX_FRAME_LENGTH: usize = 32 * 1024 * 1024;

/// Definition of protocol messages.
#[derive(Debug, Deserialize, Serialize)]
pub enum ProtoMsg {
    /// One encoded still image, to be run through the detector.
    Capture(CaptureMsg),
    /// Drop the current capture and return the session to idle.
    Reset,
}

/// Capture message.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CaptureMsg {
    /// Free-form name of the capturing device, only used for logging.
    pub source: String,
    /// Encoded image bytes (JPEG, PNG, ...).
    pub data: Vec<u8>,
}

impl CaptureMsg {
    pub fn new(source: String, data: Vec<u8>) -> Self {
        Self { source, data }
    }
}

impl ProtoMsg {
    pub fn serialize(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Box<bincode::ErrorKind>> {
        bincode::deserialize(bytes)
    }
}
