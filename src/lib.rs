//! Renders per-lesion segmentation results as contour and fill overlays over a
//! letterboxed clinical image.
//!
//! Detections go through [`ingest`](ingest::ingest) to become [`LesionOverlay`]s;
//! each mask is reduced to boundary cells ([`edges`]), chained into an outline
//! ([`contours`]) and painted by the [`OverlayRenderer`] onto any [`Surface`],
//! positioned by the contain fit in [`geometry`]. [`OverlayView`] wires those
//! steps to the image-load, detection, toggle and resize triggers.

pub mod colors;
pub mod config;
pub mod contours;
pub mod detection;
pub mod edges;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod mask;
pub mod rect;
pub mod render;
pub mod surface;
pub mod view;

pub use config::OverlayStyle;
pub use detection::{Detection, InferenceResult};
pub use error::{OverlayError, Result};
pub use geometry::{ImageSize, MaskPlacement, Viewport};
pub use ingest::LesionOverlay;
pub use render::{OverlayRenderer, RenderOutcome};
pub use surface::{RasterSurface, RecordingSurface, Surface};
pub use view::OverlayView;
