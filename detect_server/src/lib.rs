pub mod annotate;
pub mod capture;
pub mod config;
pub mod data_socket;
pub mod detection;
pub mod endpoints;
pub mod error;
pub mod labels;
pub mod nn;
pub mod render;
pub mod session;
pub mod state;
pub mod utils;

/// Largest capture accepted over HTTP.
pub const MAX_CAPTURE_BYTES: usize = common::protocol::MAX_FRAME_LENGTH;
