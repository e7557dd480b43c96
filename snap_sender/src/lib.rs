//! Capture a single still and hand it to `detect_server`.
pub mod sensors;
pub mod transport;
