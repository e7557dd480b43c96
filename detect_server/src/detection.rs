//! Detection results and the per-category tally derived from them.
//!
use std::collections::HashMap;

use serde::Serialize;

/// Bounding box as `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]` in pixels.
pub type Bbox = [f32; 4];

/// A single detected object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub category_id: usize,
    pub confidence: f32,
    pub bbox: Bbox,
}

impl Detection {
    pub fn new(category_id: usize, confidence: f32, bbox: Bbox) -> Self {
        Self {
            category_id,
            confidence,
            bbox,
        }
    }
}

/// Detections of one detector invocation, most confident first.
pub type DetectionResult = Vec<Detection>;

/// Number of detections per category name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryTally {
    counts: HashMap<String, usize>,
}

/// One row of the summary table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TallyRow {
    pub category: String,
    pub count: usize,
}

impl CategoryTally {
    /// Count detections per category, resolving ids with `name_of`.
    ///
    /// Ids without a name are counted as `class <id>`.
    pub fn from_detections<'a, F>(detections: &[Detection], name_of: F) -> Self
    where
        F: Fn(usize) -> Option<&'a str>,
    {
        let mut counts = HashMap::new();
        for detection in detections {
            let name = match name_of(detection.category_id) {
                Some(name) => name.to_owned(),
                None => format!("class {}", detection.category_id),
            };
            *counts.entry(name).or_insert(0) += 1;
        }

        Self { counts }
    }

    pub fn get(&self, category: &str) -> usize {
        self.counts.get(category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.counts.values().copied().max().unwrap_or(0)
    }

    /// Table rows, highest count first, ties broken by name.
    pub fn rows(&self) -> Vec<TallyRow> {
        let mut rows: Vec<_> = self
            .counts
            .iter()
            .map(|(category, count)| TallyRow {
                category: category.clone(),
                count: *count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

        rows
    }
}
