use thiserror::Error;

/// Failures surfaced to the user of an interactive session.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to decode captured image: {0}")]
    Decode(String),
    #[error("Object detection failed: {0}")]
    Inference(String),
    #[error("Failed to encode annotated image: {0}")]
    Encode(String),
}
