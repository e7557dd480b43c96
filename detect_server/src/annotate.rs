//! Drawing detections onto the captured image.
//!
use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use rusttype::{Font, Scale};

use crate::detection::Detection;

/// Box colors, picked by category id.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Paints bounding boxes and, with a font available, their labels.
pub struct Annotator {
    font: Option<Font<'static>>,
}

impl Annotator {
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self { font }
    }

    /// Load a TrueType font for the labels. Without it, only boxes are drawn.
    pub fn with_font_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(data) => Font::try_from_vec(data),
            Err(err) => {
                log::warn!("Could not read font {}: {}", path.display(), err);
                None
            }
        };

        match &font {
            Some(_) => log::info!("Using label font {}", path.display()),
            None => log::warn!("No usable label font, drawing boxes without labels"),
        }

        Self::new(font)
    }

    /// Draw every detection onto `frame` in place.
    pub fn draw<'a, F>(&self, frame: &mut RgbImage, detections: &[Detection], name_of: F)
    where
        F: Fn(usize) -> Option<&'a str>,
    {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let line_width = line_width(width, height);
        let font_size = f32::max(12.0, line_width as f32 * 6.0);

        for detection in detections {
            let color = Rgb(PALETTE[detection.category_id % PALETTE.len()]);

            // Coordinate frame basis is on the top left corner
            let x_tl = detection.bbox[0].max(0.0) as i32;
            let y_tl = detection.bbox[1].max(0.0) as i32;
            let x_br = detection.bbox[2].min(width as f32) as i32;
            let y_br = detection.bbox[3].min(height as f32) as i32;

            for inset in 0..line_width as i32 {
                let rect_width = x_br - x_tl - 2 * inset;
                let rect_height = y_br - y_tl - 2 * inset;
                if rect_width < 1 || rect_height < 1 {
                    break;
                }
                let rect = Rect::at(x_tl + inset, y_tl + inset)
                    .of_size(rect_width as u32, rect_height as u32);
                draw_hollow_rect_mut(frame, rect, color);
            }

            if let Some(font) = &self.font {
                let text = match name_of(detection.category_id) {
                    Some(name) => format!("{} {:.2}", name, detection.confidence),
                    None => format!("class {} {:.2}", detection.category_id, detection.confidence),
                };
                let label_width = (text.chars().count() as f32 * font_size * 0.6).ceil() as u32;
                let label_height = font_size.ceil() as u32;

                // Put the label above the box if it fits, inside otherwise
                let label_y = match y_tl - label_height as i32 {
                    y if y >= 0 => y,
                    _ => y_tl,
                };

                draw_filled_rect_mut(
                    frame,
                    Rect::at(x_tl, label_y).of_size(label_width.max(1), label_height.max(1)),
                    color,
                );
                draw_text_mut(
                    frame,
                    TEXT_COLOR,
                    x_tl,
                    label_y,
                    Scale::uniform(font_size),
                    font,
                    &text,
                );
            }
        }
    }
}

/// Box line width, growing with the image size.
fn line_width(width: u32, height: u32) -> u32 {
    let mean_side = (width + height) as f32 / 2.0;
    u32::max((mean_side * 0.003).round() as u32, 2)
}
