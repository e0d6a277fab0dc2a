use serde::{Deserialize, Serialize};

use crate::colors::Palette;
use crate::error::{OverlayError, Result};
use crate::ingest::IngestOptions;

/// Tuning knobs for overlay drawing. Every field has a default, so a partial
/// TOML document is enough to override a single value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Draw the block-batched translucent fill under mask outlines and boxes.
    pub fill: bool,
    pub fill_opacity: f32,
    pub stroke_opacity: f32,
    pub block_size: BlockSize,
    pub stroke_width: StrokeWidth,
    /// Target point count of a simplified contour.
    pub stroke_sample_cap: usize,
    /// Contours with more points than this are simplified and may be closed.
    pub min_simplify_len: usize,
    /// Chain jump threshold as a multiple of the stroke width.
    pub jump_threshold_factor: f32,
    /// Lower bound of the jump threshold, in mask cells.
    pub min_jump_threshold: f32,
    /// Contour stamp radius as a fraction of the stroke width.
    pub dot_radius_factor: f32,
    /// Paths shorter than this are drawn as stamps only.
    pub min_polyline_points: usize,
    /// Draw a "class confidence%" label at each overlay's anchor.
    pub labels: bool,
    pub contour: ContourMethod,
    pub color_by: ColorKey,
    pub palette: Palette,
    /// Detections below this confidence are not drawn.
    pub min_confidence: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill: true,
            fill_opacity: 0.25,
            stroke_opacity: 0.9,
            block_size: BlockSize::default(),
            stroke_width: StrokeWidth::default(),
            stroke_sample_cap: 150,
            min_simplify_len: 10,
            jump_threshold_factor: 3.0,
            min_jump_threshold: 1.5,
            dot_radius_factor: 0.5,
            min_polyline_points: 3,
            labels: true,
            contour: ContourMethod::default(),
            color_by: ColorKey::default(),
            palette: Palette::default(),
            min_confidence: 0.0,
        }
    }
}

/// Fill block edge in mask cells: `max(min, mask_width / divisor)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSize {
    pub min: u32,
    pub divisor: u32,
}

impl Default for BlockSize {
    fn default() -> Self {
        Self { min: 10, divisor: 20 }
    }
}

impl BlockSize {
    pub fn for_mask_width(&self, mask_width: u32) -> u32 {
        self.min
            .max(mask_width / self.divisor.max(1))
            .max(1)
    }
}

/// Stroke width in device pixels: `max(min, per_scale * display_scale * dpr)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeWidth {
    pub per_scale: f32,
    pub min: f32,
}

impl Default for StrokeWidth {
    fn default() -> Self {
        Self {
            per_scale: 2.0,
            min: 1.0,
        }
    }
}

impl StrokeWidth {
    pub fn device_width(&self, display_scale: f32, device_pixel_ratio: f32) -> f32 {
        (self.per_scale * display_scale * device_pixel_ratio).max(self.min)
    }
}

/// How a mask is turned into outline paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourMethod {
    /// Greedy nearest-neighbour chaining of boundary cells.
    #[default]
    NearestNeighbor,
    /// Border following per connected component (outer borders only).
    BorderTrace,
}

/// What selects an overlay's palette entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorKey {
    #[default]
    DetectionIndex,
    /// Falls back to the detection index when a detection has no class id.
    ClassId,
}

impl OverlayStyle {
    /// Parses and validates a TOML style document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let style: OverlayStyle = toml::from_str(source)?;
        style.validate()?;
        Ok(style)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(OverlayError::InvalidConfig(format!(
                    "{name} must be within 0..=1, got {v}"
                )))
            }
        };
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(OverlayError::InvalidConfig(format!(
                    "{name} must be a positive finite number, got {v}"
                )))
            }
        };

        unit("fill_opacity", self.fill_opacity)?;
        unit("stroke_opacity", self.stroke_opacity)?;
        positive("stroke_width.per_scale", self.stroke_width.per_scale)?;
        positive("stroke_width.min", self.stroke_width.min)?;
        positive("jump_threshold_factor", self.jump_threshold_factor)?;
        positive("min_jump_threshold", self.min_jump_threshold)?;
        positive("dot_radius_factor", self.dot_radius_factor)?;

        if self.block_size.min == 0 || self.block_size.divisor == 0 {
            return Err(OverlayError::InvalidConfig(
                "block_size.min and block_size.divisor must be at least 1".into(),
            ));
        }
        if self.stroke_sample_cap == 0 {
            return Err(OverlayError::InvalidConfig(
                "stroke_sample_cap must be at least 1".into(),
            ));
        }
        if !self.min_confidence.is_finite() {
            return Err(OverlayError::InvalidConfig(
                "min_confidence must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Jump threshold T in mask cells for a stroke `stroke_width` device pixels wide,
    /// where one mask cell spans `grid_to_device_scale` device pixels.
    pub fn jump_threshold(&self, stroke_width: f32, grid_to_device_scale: f32) -> f32 {
        if !(grid_to_device_scale.is_finite() && grid_to_device_scale > 0.0) {
            return self.min_jump_threshold;
        }
        (self.jump_threshold_factor * stroke_width / grid_to_device_scale)
            .max(self.min_jump_threshold)
    }

    pub fn ingest_options(&self) -> IngestOptions<'_> {
        IngestOptions {
            palette: &self.palette,
            color_by: self.color_by,
            min_confidence: self.min_confidence,
        }
    }
}
