//! Object detection with a YOLOv5 network exported to ONNX.
//!
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use image::{imageops, Rgb, RgbImage};
use ndarray::{s, ArrayView2, Axis, Ix3};
use tract_onnx::prelude::*;

use crate::{
    config::ModelConfig,
    detection::{Bbox, Detection, DetectionResult},
    labels::Labels,
};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Upper bound on candidates handed to non-maximum-suppression.
const MAX_NMS_CANDIDATES: usize = 30_000;

/// Gray used to pad the letterboxed network input.
const PAD_VALUE: u8 = 114;

/// Leading columns of a prediction row: `cx, cy, w, h, objectness`.
const BOX_COLUMNS: usize = 5;

/// Anything that turns a pixel buffer into detections.
pub trait Detector: Send + Sync {
    /// Run detection once on `image` with the given settings.
    fn detect(&self, image: &RgbImage, config: &ModelConfig) -> Result<DetectionResult>;

    /// Human readable name of a category id, if known.
    fn category_name(&self, category_id: usize) -> Option<&str>;
}

pub struct YoloModel {
    model: NnModel,
    input_size: u32,
    labels: Labels,
}

impl YoloModel {
    /// Load the network from `model_path` for square inputs of `input_size` pixels.
    pub fn new(model_path: impl AsRef<Path>, input_size: u32, labels: Labels) -> Result<Self> {
        ensure!(input_size > 0, "network input size must be positive");
        let model = load_model(model_path.as_ref(), input_size)?;
        log::info!(
            "Loaded detector with {}x{} input and {} category names",
            input_size,
            input_size,
            labels.len()
        );

        Ok(Self {
            model,
            input_size,
            labels,
        })
    }

    fn preproc(&self, input: &RgbImage) -> (Tensor, Letterbox) {
        let (canvas, letterbox) = letterbox(input, self.input_size);
        let size = self.input_size as usize;

        let tensor: Tensor =
            tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
                canvas[(x as _, y as _)][c] as f32 / 255.0
            })
            .into();

        (tensor, letterbox)
    }

    fn postproc(
        &self,
        predictions: ArrayView2<f32>,
        letterbox: &Letterbox,
        config: &ModelConfig,
    ) -> DetectionResult {
        let candidates = decode_predictions(predictions, config);
        log::debug!("{} candidates above confidence threshold", candidates.len());

        let mut selected = non_maximum_suppression(
            candidates,
            config.overlap_threshold(),
            config.class_agnostic,
            config.max_detections,
        );
        for detection in selected.iter_mut() {
            detection.bbox = letterbox.to_image(&detection.bbox);
        }

        selected
    }
}

impl Detector for YoloModel {
    fn detect(&self, image: &RgbImage, config: &ModelConfig) -> Result<DetectionResult> {
        if image.width() == 0 || image.height() == 0 {
            bail!("cannot run detection on an empty image");
        }

        let (input, letterbox) = self.preproc(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        let output = outputs
            .get(0)
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let predictions = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<Ix3>()
            .context("expected model output of shape [1, boxes, 5 + classes]")?;
        let predictions = predictions.index_axis_move(Axis(0), 0);
        if predictions.ncols() <= BOX_COLUMNS {
            bail!(
                "model output rows have {} columns, need more than {}",
                predictions.ncols(),
                BOX_COLUMNS
            );
        }

        Ok(self.postproc(predictions, &letterbox, config))
    }

    fn category_name(&self, category_id: usize) -> Option<&str> {
        self.labels.name(category_id)
    }
}

fn load_model(model_path: &Path, input_size: u32) -> Result<NnModel> {
    let size = input_size as usize;
    let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size));
    let model = tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(0, input_fact)
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")?;

    Ok(model)
}

/// Mapping between network input coordinates and original image coordinates.
#[derive(Clone, Debug, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    width: u32,
    height: u32,
}

impl Letterbox {
    /// Undo padding and scaling, then clip to the original image.
    fn to_image(&self, bbox: &Bbox) -> Bbox {
        let (width, height) = (self.width as f32, self.height as f32);
        [
            ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, width),
            ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, height),
            ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, width),
            ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, height),
        ]
    }
}

/// Resize `image` into a `size`x`size` canvas, keeping the aspect ratio and centering it.
fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (width, height) = image.dimensions();
    let scale = f32::min(size as f32 / width as f32, size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;

    let resized = imageops::resize(
        image,
        new_width,
        new_height,
        imageops::FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            width,
            height,
        },
    )
}

/// Turn raw prediction rows into scored candidates, most confident first.
///
/// Each row is `[cx, cy, w, h, objectness, class scores...]`. The score of a class is
/// `objectness * class score`; only rows with objectness and score strictly above the
/// confidence threshold survive.
fn decode_predictions(predictions: ArrayView2<f32>, config: &ModelConfig) -> Vec<Detection> {
    let min_confidence = config.confidence_threshold();
    let mut candidates = vec![];

    for row in predictions.rows() {
        let objectness = row[4];
        if objectness <= min_confidence {
            continue;
        }

        let bbox = xywh_to_xyxy(row[0], row[1], row[2], row[3]);
        let class_scores = row.slice(s![BOX_COLUMNS..]);

        if config.multi_label {
            for (category_id, class_score) in class_scores.iter().enumerate() {
                let confidence = class_score * objectness;
                if confidence > min_confidence {
                    candidates.push(Detection::new(category_id, confidence, bbox));
                }
            }
        } else {
            let best = class_scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1));
            if let Some((category_id, class_score)) = best {
                let confidence = class_score * objectness;
                if confidence > min_confidence {
                    candidates.push(Detection::new(category_id, confidence, bbox));
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates.truncate(MAX_NMS_CANDIDATES);

    candidates
}

fn xywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> Bbox {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// Run non-maximum-suppression on candidates sorted by descending confidence.
///
/// Walk the candidates from the most confident one and keep only those which do not overlap
/// an already kept box of the same category (of any category if `class_agnostic`) with an IoU
/// above `max_iou`. Stop once `max_detections` boxes are kept.
fn non_maximum_suppression(
    sorted_candidates: Vec<Detection>,
    max_iou: f32,
    class_agnostic: bool,
    max_detections: usize,
) -> Vec<Detection> {
    let mut selected: Vec<Detection> = vec![];

    'candidates: for candidate in sorted_candidates {
        if selected.len() >= max_detections {
            break 'candidates;
        }

        // Check for overlap with any of the selected bboxes competing with this one
        for kept in selected.iter() {
            if !class_agnostic && kept.category_id != candidate.category_id {
                continue;
            }
            if iou(&candidate.bbox, &kept.bbox) > max_iou {
                continue 'candidates;
            }
        }

        selected.push(candidate);
    }

    selected
}

/// Calculate the intersection-over-union metric for two bounding boxes.
fn iou(bbox_a: &Bbox, bbox_b: &Bbox) -> f32 {
    // If the boxes do not overlap, the overlap box is ill defined and has zero area.
    let overlap_box: Bbox = [
        f32::max(bbox_a[0], bbox_b[0]),
        f32::max(bbox_a[1], bbox_b[1]),
        f32::min(bbox_a[2], bbox_b[2]),
        f32::min(bbox_a[3], bbox_b[3]),
    ];

    let overlap_area = bbox_area(&overlap_box);

    // Avoid division-by-zero with `EPS`
    overlap_area / (bbox_area(bbox_a) + bbox_area(bbox_b) - overlap_area + EPS)
}

/// Calculate the area enclosed by a bounding box.
///
/// If the bottom-right point lies above or left of the top-left point, the area is zero.
fn bbox_area(bbox: &Bbox) -> f32 {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    if width < 0.0 || height < 0.0 {
        return 0.0;
    }

    width * height
}
