//! Coordinate spaces and the "contain" fit that maps a source image into a viewport.
//!
//! Three spaces are involved when an overlay is drawn:
//!
//! * **mask grid** - cell coordinates of a [`MaskMatrix`](crate::mask::MaskMatrix),
//! * **source** - intrinsic pixels of the clinical image,
//! * **screen** - CSS pixels of the viewport (multiplied by the device pixel ratio
//!   on the drawing surface).
//!
//! [`MaskPlacement`] maps grid to source, [`DisplayTransform`] maps source to screen.
//! Both reduce to an axis-aligned [`Affine`] so they compose by multiplication.

use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Intrinsic pixel size of the displayed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Display area in CSS pixels plus the device pixel ratio of the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio: 1.0,
        }
    }

    pub fn with_device_pixel_ratio(mut self, device_pixel_ratio: f32) -> Self {
        self.device_pixel_ratio = device_pixel_ratio;
        self
    }

    /// A viewport is unusable until layout has produced a positive, finite size.
    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Device pixel ratio, falling back to 1.0 when the environment reports nonsense.
    pub fn dpr(&self) -> f32 {
        if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        }
    }

    /// Backing-store size of the drawing surface in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        if self.is_empty() {
            return (0, 0);
        }
        let dpr = self.dpr();
        (
            (self.width * dpr).round() as u32,
            (self.height * dpr).round() as u32,
        )
    }
}

/// Axis-aligned affine map: `p' = (p.x * sx + tx, p.y * sy + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub sx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        sx: 1.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(sx: f32, sy: f32, tx: f32, ty: f32) -> Self {
        Self { sx, sy, tx, ty }
    }

    pub fn scale(s: f32) -> Self {
        Self::new(s, s, 0.0, 0.0)
    }

    /// Returns the map that applies `self` first and `outer` second.
    pub fn then(self, outer: Affine) -> Affine {
        Affine {
            sx: self.sx * outer.sx,
            sy: self.sy * outer.sy,
            tx: self.tx * outer.sx + outer.tx,
            ty: self.ty * outer.sy + outer.ty,
        }
    }

    pub fn apply(&self, p: Point<f32>) -> Point<f32> {
        Point::new(p.x * self.sx + self.tx, p.y * self.sy + self.ty)
    }

    /// The smaller of the two axis scales, used to size strokes isotropically.
    pub fn min_scale(&self) -> f32 {
        self.sx.abs().min(self.sy.abs())
    }
}

/// Result of a contain fit of a source image into a viewport (in CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl DisplayTransform {
    pub fn as_affine(&self) -> Affine {
        Affine::new(self.scale_x, self.scale_y, self.offset_x, self.offset_y)
    }

    /// Source to device pixels: the display transform followed by the DPR scale.
    pub fn to_device(&self, device_pixel_ratio: f32) -> Affine {
        self.as_affine().then(Affine::scale(device_pixel_ratio))
    }

    pub fn display_scale(&self) -> f32 {
        self.scale_x.min(self.scale_y)
    }
}

/// Computes the aspect-preserving "contain" fit of `source` into `viewport`.
///
/// The image is scaled to touch the viewport on its relatively wider axis and
/// centred on the other one, leaving letterbox gaps.
///
/// Returns `None` while either size has a zero (or unknown) dimension; callers
/// skip drawing in that case.
///
/// # Examples
///
/// ```
/// use lesion_overlay::geometry::{ImageSize, Viewport, contain_fit};
///
/// let t = contain_fit(ImageSize::new(200, 100), &Viewport::new(100.0, 100.0)).unwrap();
/// assert_eq!((t.scale_x, t.scale_y), (0.5, 0.5));
/// assert_eq!((t.offset_x, t.offset_y), (0.0, 25.0));
/// ```
pub fn contain_fit(source: ImageSize, viewport: &Viewport) -> Option<DisplayTransform> {
    if source.is_empty() || viewport.is_empty() {
        return None;
    }

    let image_w = source.width as f32;
    let image_h = source.height as f32;
    let image_aspect = image_w / image_h;
    let viewport_aspect = viewport.width / viewport.height;

    let (display_w, display_h, offset_x, offset_y) = if image_aspect > viewport_aspect {
        let display_h = viewport.width / image_aspect;
        (
            viewport.width,
            display_h,
            0.0,
            (viewport.height - display_h) / 2.0,
        )
    } else {
        let display_w = viewport.height * image_aspect;
        (
            display_w,
            viewport.height,
            (viewport.width - display_w) / 2.0,
            0.0,
        )
    };

    Some(DisplayTransform {
        scale_x: display_w / image_w,
        scale_y: display_h / image_h,
        offset_x,
        offset_y,
    })
}

/// How a mask grid lies over the source image.
///
/// The inference service does not pin this down: masks may cover the full
/// image or only the crop the model actually saw. The mapping is therefore
/// an input to rendering rather than an assumption baked into it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskPlacement {
    /// The grid is stretched over the whole source image.
    #[default]
    FullImage,
    /// The grid is stretched over a sub-rectangle of the source image.
    Region {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// One grid cell is one source pixel, anchored at the image origin.
    PixelAligned,
}

impl MaskPlacement {
    /// Grid to source map for a `mask_width` x `mask_height` grid.
    ///
    /// Returns `None` for an empty grid, or a `FullImage` placement over an empty source.
    pub fn grid_to_source(
        &self,
        mask_width: u32,
        mask_height: u32,
        source: ImageSize,
    ) -> Option<Affine> {
        if mask_width == 0 || mask_height == 0 {
            return None;
        }
        let mw = mask_width as f32;
        let mh = mask_height as f32;
        match *self {
            MaskPlacement::FullImage => {
                if source.is_empty() {
                    return None;
                }
                Some(Affine::new(
                    source.width as f32 / mw,
                    source.height as f32 / mh,
                    0.0,
                    0.0,
                ))
            }
            MaskPlacement::Region {
                x,
                y,
                width,
                height,
            } => Some(Affine::new(width / mw, height / mh, x, y)),
            MaskPlacement::PixelAligned => Some(Affine::IDENTITY),
        }
    }

    /// Map to source pixels for bounding boxes reported alongside the masks.
    ///
    /// Boxes are in source pixels already, except under a `Region` placement:
    /// there the service reported everything in the region's own frame, so
    /// boxes are shifted by the region origin.
    pub fn bbox_to_source(&self) -> Affine {
        match *self {
            MaskPlacement::Region { x, y, .. } => Affine::new(1.0, 1.0, x, y),
            MaskPlacement::FullImage | MaskPlacement::PixelAligned => Affine::IDENTITY,
        }
    }
}
