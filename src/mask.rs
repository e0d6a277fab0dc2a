use image::{GrayImage, Luma};
use imageproc::point::Point;

use crate::error::{OverlayError, Result};

const INSIDE: Luma<u8> = Luma([255]);
const OUTSIDE: Luma<u8> = Luma([0]);

/// A cell value of a raw mask: anything that can say whether it is inside the lesion.
pub trait MaskValue: Copy {
    fn is_set(self) -> bool;
}

impl MaskValue for bool {
    fn is_set(self) -> bool {
        self
    }
}

macro_rules! impl_mask_value {
    ($($t:ty),*) => {
        $(impl MaskValue for $t {
            fn is_set(self) -> bool {
                self > (0 as $t)
            }
        })*
    };
}

impl_mask_value!(u8, u16, u32, i32, i64, f32, f64);

/// Binary per-lesion mask grid, stored as a 0/255 [`GrayImage`].
///
/// The grid has its own size, independent of the source image; see
/// [`MaskPlacement`](crate::geometry::MaskPlacement) for how it lies over the image.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskMatrix {
    grid: GrayImage,
}

impl MaskMatrix {
    /// Builds a mask from row-major rows. Cells are "inside" when [`MaskValue::is_set`].
    ///
    /// # Errors
    ///
    /// [`OverlayError::EmptyMask`] for zero rows or zero-length rows,
    /// [`OverlayError::RaggedMask`] when row lengths disagree.
    pub fn from_rows<R, T>(rows: &[R]) -> Result<Self>
    where
        R: AsRef<[T]>,
        T: MaskValue,
    {
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if width == 0 {
            return Err(OverlayError::EmptyMask);
        }
        if let Some((row, found)) = rows
            .iter()
            .map(|r| r.as_ref().len())
            .enumerate()
            .find(|&(_, len)| len != width)
        {
            return Err(OverlayError::RaggedMask {
                row,
                expected: width,
                found,
            });
        }

        let grid = GrayImage::from_fn(width as u32, rows.len() as u32, |x, y| {
            if rows[y as usize].as_ref()[x as usize].is_set() {
                INSIDE
            } else {
                OUTSIDE
            }
        });
        Ok(Self { grid })
    }

    /// Wraps a grayscale image, treating every non-zero pixel as inside.
    pub fn from_gray(image: &GrayImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OverlayError::EmptyMask);
        }
        let grid = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if image.get_pixel(x, y)[0] > 0 {
                INSIDE
            } else {
                OUTSIDE
            }
        });
        Ok(Self { grid })
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    /// `false` outside the grid.
    pub fn is_set(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return false;
        }
        self.grid.get_pixel(x as u32, y as u32)[0] > 0
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.grid
    }

    /// Number of inside cells.
    pub fn area(&self) -> u64 {
        self.grid.pixels().filter(|p| p[0] > 0).count() as u64
    }

    /// Mean of the inside cell centres in grid coordinates, `None` for an empty mask.
    ///
    /// Used as the anchor for a lesion label.
    pub fn centroid(&self) -> Option<Point<f32>> {
        let (mut sum_x, mut sum_y, mut n) = (0.0f64, 0.0f64, 0u64);
        for (x, y, p) in self.grid.enumerate_pixels() {
            if p[0] > 0 {
                sum_x += x as f64 + 0.5;
                sum_y += y as f64 + 0.5;
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }
        Some(Point::new(
            (sum_x / n as f64) as f32,
            (sum_y / n as f64) as f32,
        ))
    }
}
