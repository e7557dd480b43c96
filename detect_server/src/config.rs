//! Detector settings owned by the interactive session.
//!
use serde::{Deserialize, Serialize};

/// Options handed to the detector on every call.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ModelConfig {
    /// Minimum score for a candidate to survive, in `[0, 1]`.
    confidence_threshold: f32,
    /// IoU above which the weaker of two boxes is suppressed, in `[0, 1]`.
    overlap_threshold: f32,
    /// Run NMS across all classes instead of per class.
    pub class_agnostic: bool,
    /// Keep every class above threshold for a box, not just the best one.
    pub multi_label: bool,
    /// Upper bound on the number of detections per image.
    pub max_detections: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            overlap_threshold: 0.45,
            class_agnostic: false,
            multi_label: false,
            max_detections: 1000,
        }
    }
}

impl ModelConfig {
    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn overlap_threshold(&self) -> f32 {
        self.overlap_threshold
    }

    /// Set the confidence threshold, clamped into `[0, 1]`. NaN is ignored.
    pub fn set_confidence_threshold(&mut self, value: f32) {
        if let Some(value) = clamp_unit(value) {
            self.confidence_threshold = value;
        }
    }

    /// Set the overlap (IoU) threshold, clamped into `[0, 1]`. NaN is ignored.
    pub fn set_overlap_threshold(&mut self, value: f32) {
        if let Some(value) = clamp_unit(value) {
            self.overlap_threshold = value;
        }
    }

    pub fn with_confidence_threshold(mut self, value: f32) -> Self {
        self.set_confidence_threshold(value);
        self
    }

    pub fn with_overlap_threshold(mut self, value: f32) -> Self {
        self.set_overlap_threshold(value);
        self
    }
}

fn clamp_unit(value: f32) -> Option<f32> {
    match value {
        x if x.is_nan() => None,
        x => Some(x.clamp(0.0, 1.0)),
    }
}
