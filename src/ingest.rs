use image::Rgb;
use tracing::debug;

use crate::colors::Palette;
use crate::config::ColorKey;
use crate::detection::Detection;
use crate::mask::MaskMatrix;
use crate::rect::BoundingBox;

/// What an overlay is drawn from.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayGeometry {
    Mask(MaskMatrix),
    BoundingBox(BoundingBox),
}

/// Drawable representation of one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct LesionOverlay {
    /// Position of the detection in the inference result.
    pub id: usize,
    pub color: Rgb<u8>,
    pub geometry: OverlayGeometry,
    pub class_label: String,
    pub confidence: f32,
}

impl LesionOverlay {
    pub fn is_mask(&self) -> bool {
        matches!(self.geometry, OverlayGeometry::Mask(_))
    }

    /// Caption drawn next to the overlay, e.g. `"cerumen 87.50%"`.
    pub fn label_text(&self) -> String {
        format!("{} {:.2}%", self.class_label, self.confidence * 100.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions<'a> {
    pub palette: &'a Palette,
    pub color_by: ColorKey,
    pub min_confidence: f32,
}

/// Turns raw detections into drawable overlays, in detection order.
///
/// A well-formed mask wins over a bounding box. A detection whose mask is
/// malformed falls back to its box; one with neither usable mask nor box is
/// dropped. Dropping one detection never affects the others.
pub fn ingest(detections: &[Detection], options: &IngestOptions<'_>) -> Vec<LesionOverlay> {
    detections
        .iter()
        .enumerate()
        .filter_map(|(index, detection)| ingest_one(index, detection, options))
        .collect()
}

fn ingest_one(
    index: usize,
    detection: &Detection,
    options: &IngestOptions<'_>,
) -> Option<LesionOverlay> {
    if detection.confidence < options.min_confidence {
        debug!(
            index,
            confidence = detection.confidence,
            "detection below draw threshold"
        );
        return None;
    }

    let mask = detection
        .mask
        .as_deref()
        .and_then(|rows| match MaskMatrix::from_rows(rows) {
            Ok(mask) => Some(mask),
            Err(err) => {
                debug!(index, %err, "mask rejected");
                None
            }
        });

    let geometry = match mask {
        Some(mask) => OverlayGeometry::Mask(mask),
        None => {
            let Some(components) = detection.bbox.as_deref() else {
                debug!(index, "detection has neither mask nor bbox");
                return None;
            };
            match BoundingBox::from_components(components) {
                Ok(bbox) => OverlayGeometry::BoundingBox(bbox),
                Err(err) => {
                    debug!(index, %err, "bbox rejected");
                    return None;
                }
            }
        }
    };

    let color_index = match options.color_by {
        ColorKey::DetectionIndex => index,
        ColorKey::ClassId => detection.class_id.map_or(index, |id| id as usize),
    };

    Some(LesionOverlay {
        id: index,
        color: options.palette.color_for(color_index),
        geometry,
        class_label: detection.class_name.clone(),
        confidence: detection.confidence,
    })
}
