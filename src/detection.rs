//! Wire format of the segmentation service's inference result.
//!
//! Payloads are read leniently: a `mask` or `bbox` that is not an array of
//! numbers is treated as absent, so a single bad record cannot reject the
//! whole result. Shape problems (ragged rows, short boxes) are left for
//! [`ingest`](crate::ingest::ingest) to sort out per detection.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::geometry::MaskPlacement;

/// One finding reported by the segmentation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default = "unknown_class")]
    pub class_name: String,
    #[serde(default)]
    pub class_id: Option<u32>,
    #[serde(default)]
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in source image pixels.
    #[serde(default, deserialize_with = "lenient_bbox")]
    pub bbox: Option<Vec<f64>>,
    /// Row-major mask grid; cells `> 0` are inside the lesion.
    #[serde(default, deserialize_with = "lenient_mask")]
    pub mask: Option<Vec<Vec<f32>>>,
}

fn unknown_class() -> String {
    "unknown".to_string()
}

impl Detection {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            class_id: None,
            confidence: 1.0,
            bbox: None,
            mask: None,
        }
    }

    pub fn with_class_id(mut self, class_id: u32) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox.to_vec());
        self
    }

    pub fn with_mask<R: AsRef<[u8]>>(mut self, rows: &[R]) -> Self {
        self.mask = Some(
            rows.iter()
                .map(|r| r.as_ref().iter().map(|&v| v as f32).collect())
                .collect(),
        );
        self
    }
}

fn cell_value(v: &Value) -> Option<f32> {
    match v {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    }
}

fn lenient_mask<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Vec<f32>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(rows)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = rows
        .iter()
        .map(|row| match row {
            Value::Array(cells) => cells.iter().map(cell_value).collect::<Option<Vec<f32>>>(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>();
    if parsed.is_none() {
        debug!("ignoring mask with non-numeric cells");
    }
    Ok(parsed)
}

fn lenient_bbox<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = items.iter().map(Value::as_f64).collect::<Option<Vec<f64>>>();
    if parsed.is_none() {
        debug!("ignoring bbox with non-numeric components");
    }
    Ok(parsed)
}

/// Which frame the service reported coordinates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateType {
    /// Mapped back onto the uploaded image.
    #[default]
    Original,
    /// Left in the frame of the circular crop the model ran on.
    Cropped,
}

/// The crop the service applied before inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CropInfo {
    #[serde(default)]
    pub success: bool,
    /// `(x1, y1, x2, y2)` of the crop within the original image.
    #[serde(default)]
    pub crop_coords: Option<[f64; 4]>,
    /// `(height, width)` of the original image.
    #[serde(default)]
    pub original_shape: Option<[u32; 2]>,
    /// `(height, width)` of the cropped image.
    #[serde(default)]
    pub cropped_shape: Option<[u32; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub crop_info: Option<CropInfo>,
    #[serde(default)]
    pub coordinate_type: CoordinateType,
}

impl InferenceResult {
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Best guess of the mask placement from the crop metadata.
    ///
    /// Only a successful crop whose results were left in cropped coordinates
    /// puts the mask grid over a sub-region; everything else covers the full image.
    pub fn mask_placement(&self) -> MaskPlacement {
        match (&self.crop_info, self.coordinate_type) {
            (
                Some(CropInfo {
                    success: true,
                    crop_coords: Some([x1, y1, x2, y2]),
                    ..
                }),
                CoordinateType::Cropped,
            ) if x2 > x1 && y2 > y1 => MaskPlacement::Region {
                x: *x1 as f32,
                y: *y1 as f32,
                width: (x2 - x1) as f32,
                height: (y2 - y1) as f32,
            },
            _ => MaskPlacement::FullImage,
        }
    }
}
