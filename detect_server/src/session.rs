//! State of the interactive session and the handling of user actions.
//!
use serde::Serialize;

use crate::{
    annotate::Annotator,
    capture::{encode_jpeg, CapturedImage},
    config::ModelConfig,
    detection::{CategoryTally, DetectionResult, TallyRow},
    error::SnapshotError,
    nn::Detector,
};

/// A user action.
#[derive(Debug)]
pub enum Event {
    SetConfidence(f32),
    SetOverlap(f32),
    /// Encoded still from the camera side. Empty means nothing was captured.
    Capture(Vec<u8>),
    /// Forget the captured image.
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Detecting,
    Displaying,
    Failed,
}

/// Outcome of one successful evaluation.
#[derive(Debug)]
pub struct DetectionReport {
    pub detections: DetectionResult,
    pub tally: CategoryTally,
    pub annotated_jpeg: Vec<u8>,
}

/// Machine readable view of the session.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub phase: Phase,
    pub config: ModelConfig,
    pub categories: Vec<TallyRow>,
    pub total: usize,
    pub error: Option<String>,
}

pub struct Session {
    config: ModelConfig,
    capture: Option<CapturedImage>,
    phase: Phase,
    report: Option<DetectionReport>,
    error: Option<SnapshotError>,
    evaluations: u64,
}

impl Session {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            capture: None,
            phase: Phase::Idle,
            report: None,
            error: None,
            evaluations: 0,
        }
    }

    /// Apply `event` and re-evaluate the session.
    ///
    /// With a captured image present, this calls the detector exactly once.
    pub fn handle(
        &mut self,
        event: Event,
        detector: &dyn Detector,
        annotator: &Annotator,
    ) -> Phase {
        match event {
            Event::SetConfidence(value) => self.config.set_confidence_threshold(value),
            Event::SetOverlap(value) => self.config.set_overlap_threshold(value),
            Event::Capture(bytes) => match CapturedImage::new(bytes) {
                Some(capture) => {
                    log::info!("Captured image of {} bytes", capture.bytes().len());
                    self.capture = Some(capture);
                }
                None => log::debug!("Ignoring empty capture"),
            },
            Event::Reset => {
                log::info!("Resetting session");
                self.capture = None;
            }
        }

        self.evaluate(detector, annotator);
        self.phase
    }

    fn evaluate(&mut self, detector: &dyn Detector, annotator: &Annotator) {
        let capture = match &self.capture {
            Some(capture) => capture,
            None => {
                self.phase = Phase::Idle;
                self.report = None;
                self.error = None;
                return;
            }
        };

        self.phase = Phase::Detecting;
        self.evaluations += 1;

        match run_detection(capture, &self.config, detector, annotator) {
            Ok(report) => {
                log::info!(
                    "Detected {} objects in {} categories",
                    report.tally.total(),
                    report.tally.len()
                );
                self.phase = Phase::Displaying;
                self.report = Some(report);
                self.error = None;
            }
            Err(err) => {
                log::warn!("Evaluation failed: {}", err);
                self.phase = Phase::Failed;
                self.report = None;
                self.error = Some(err);
            }
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn capture(&self) -> Option<&CapturedImage> {
        self.capture.as_ref()
    }

    pub fn report(&self) -> Option<&DetectionReport> {
        self.report.as_ref()
    }

    pub fn error(&self) -> Option<&SnapshotError> {
        self.error.as_ref()
    }

    /// Number of evaluations that reached the detector stage so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn summary(&self) -> Summary {
        let (categories, total) = match &self.report {
            Some(report) => (report.tally.rows(), report.tally.total()),
            None => (vec![], 0),
        };

        Summary {
            phase: self.phase,
            config: self.config.clone(),
            categories,
            total,
            error: self.error.as_ref().map(|err| err.to_string()),
        }
    }
}

/// Decode, detect, draw, encode and tally one captured image.
fn run_detection(
    capture: &CapturedImage,
    config: &ModelConfig,
    detector: &dyn Detector,
    annotator: &Annotator,
) -> Result<DetectionReport, SnapshotError> {
    let mut frame = capture.decode()?;
    log::debug!("Decoded {}x{} image", frame.width(), frame.height());

    let detections = detector
        .detect(&frame, config)
        .map_err(|err| SnapshotError::Inference(format!("{err:#}")))?;

    annotator.draw(&mut frame, &detections, |id| detector.category_name(id));
    let annotated_jpeg = encode_jpeg(&frame)?;
    let tally = CategoryTally::from_detections(&detections, |id| detector.category_name(id));

    Ok(DetectionReport {
        detections,
        tally,
        annotated_jpeg,
    })
}
