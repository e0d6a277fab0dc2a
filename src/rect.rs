use imageproc::point::Point;
use num_traits::ToPrimitive;

use crate::error::{OverlayError, Result};
use crate::geometry::Affine;

/// Axis-aligned rectangle in floating point screen (or device) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two opposite corners, in any order.
    pub fn from_corners(a: Point<f32>, b: Point<f32>) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: a.x.max(b.x) - x,
            height: a.y.max(b.y) - y,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Grows the rectangle by `margin` on every side.
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + 2.0 * margin,
            height: self.height + 2.0 * margin,
        }
    }
}

/// Calculates the axis-aligned rectangle enclosing `points`.
///
/// Generic over any coordinate type with a partial order, so it serves both
/// the integer contours of a border trace and floating point screen paths.
/// Returns `None` for an empty slice or when a coordinate cannot be
/// represented as `f32`.
///
/// # Examples
///
/// ```
/// use imageproc::point::Point;
/// use lesion_overlay::rect::enclosing_rect;
///
/// let diamond = [
///     Point { x: 50.0, y: 10.0 },
///     Point { x: 90.0, y: 50.0 },
///     Point { x: 50.0, y: 90.0 },
///     Point { x: 10.0, y: 50.0 },
/// ];
///
/// let r = enclosing_rect(&diamond).unwrap();
/// assert_eq!((r.x, r.y, r.width, r.height), (10.0, 10.0, 80.0, 80.0));
/// ```
pub fn enclosing_rect<T>(points: &[Point<T>]) -> Option<ScreenRect>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    let (first, rest) = points.split_first()?;
    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;

    // `T` is only `PartialOrd` so that floats are accepted; no `Ord::min`/`max`.
    for p in rest {
        if p.x < min_x {
            min_x = p.x;
        }
        if p.x > max_x {
            max_x = p.x;
        }
        if p.y < min_y {
            min_y = p.y;
        }
        if p.y > max_y {
            max_y = p.y;
        }
    }

    let x = min_x.to_f32()?;
    let y = min_y.to_f32()?;
    Some(ScreenRect {
        x,
        y,
        width: max_x.to_f32()? - x,
        height: max_y.to_f32()? - y,
    })
}

/// Detection box `[x1, y1, x2, y2]` in source image pixels, normalised so `x1 <= x2`, `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Reads the first four components; anything after them is ignored.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidBoundingBox`] when there are fewer than four
    /// components or one of them is not a finite `f32` (NaN, infinite, or too
    /// large to represent).
    pub fn from_components(components: &[f64]) -> Result<Self> {
        let [a, b, c, d] = match components {
            [a, b, c, d, ..] => [*a as f32, *b as f32, *c as f32, *d as f32],
            _ => return Err(OverlayError::InvalidBoundingBox(components.len())),
        };
        if ![a, b, c, d].iter().all(|v| v.is_finite()) {
            return Err(OverlayError::InvalidBoundingBox(components.len()));
        }
        Ok(Self {
            x1: a.min(c),
            y1: b.min(d),
            x2: a.max(c),
            y2: b.max(d),
        })
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Maps the box through `transform` into a screen rectangle.
    pub fn to_screen(&self, transform: &Affine) -> ScreenRect {
        ScreenRect::from_corners(
            transform.apply(Point::new(self.x1, self.y1)),
            transform.apply(Point::new(self.x2, self.y2)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enclosing_rect_for_rotated_rect() {
        let vertices = [
            Point { x: 50, y: 10 },
            Point { x: 90, y: 50 },
            Point { x: 50, y: 90 },
            Point { x: 10, y: 50 },
        ];
        assert_eq!(
            enclosing_rect(&vertices),
            Some(ScreenRect::new(10.0, 10.0, 80.0, 80.0))
        );
    }

    #[test]
    fn test_enclosing_rect_with_negative_coordinates() {
        let vertices = [
            Point { x: -10.0, y: -20.0 },
            Point { x: 50.0, y: 30.0 },
            Point { x: 50.0, y: -20.0 },
            Point { x: -10.0, y: 30.0 },
        ];
        assert_eq!(
            enclosing_rect(&vertices),
            Some(ScreenRect::new(-10.0, -20.0, 60.0, 50.0))
        );
    }

    #[test]
    fn test_enclosing_rect_degenerate() {
        let empty: [Point<f32>; 0] = [];
        assert!(enclosing_rect(&empty).is_none());
        assert_eq!(
            enclosing_rect(&[Point::new(3u32, 4u32)]),
            Some(ScreenRect::new(3.0, 4.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_bounding_box_from_components() {
        let b = BoundingBox::from_components(&[30.0, 40.0, 10.0, 20.0, 99.0]).unwrap();
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (10.0, 20.0, 30.0, 40.0));
        assert_eq!((b.width(), b.height()), (20.0, 20.0));

        assert!(matches!(
            BoundingBox::from_components(&[1.0, 2.0, 3.0]),
            Err(OverlayError::InvalidBoundingBox(3))
        ));
        assert!(BoundingBox::from_components(&[1.0, f64::NAN, 3.0, 4.0]).is_err());
    }

    #[test]
    fn test_bounding_box_rejects_values_beyond_f32() {
        assert!(matches!(
            BoundingBox::from_components(&[0.0, 0.0, 1e300, 10.0]),
            Err(OverlayError::InvalidBoundingBox(4))
        ));
        assert!(BoundingBox::from_components(&[-1e39, 0.0, 10.0, 10.0]).is_err());
        assert!(BoundingBox::from_components(&[0.0, 0.0, 3.0e38, 10.0]).is_ok());
    }

    #[test]
    fn test_bounding_box_to_screen() {
        let b = BoundingBox::from_components(&[10.0, 10.0, 20.0, 30.0]).unwrap();
        let r = b.to_screen(&Affine::new(2.0, 2.0, 5.0, 0.0));
        assert_eq!(r, ScreenRect::new(25.0, 20.0, 20.0, 40.0));
        assert_eq!((r.right(), r.bottom()), (45.0, 60.0));
        assert_eq!(r.expand(1.0), ScreenRect::new(24.0, 19.0, 22.0, 42.0));
    }
}
