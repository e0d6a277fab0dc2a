use image::Rgb;
use palette::{FromColor, Hsl, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};

/// Colours of the segmentation model's plotting palette, in RGB order.
pub const DEFAULT_PALETTE: [[u8; 3]; 20] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 193],
    [255, 178, 238],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
    [0, 24, 236],
    [132, 56, 255],
    [82, 0, 133],
    [203, 56, 255],
    [255, 149, 200],
    [255, 55, 199],
];

/// A fixed, ordered, non-empty list of RGB colours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[u8; 3]>", into = "Vec<[u8; 3]>")]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    pub fn new(colors: Vec<[u8; 3]>) -> Result<Self> {
        if colors.is_empty() {
            return Err(OverlayError::InvalidConfig(
                "palette must contain at least one colour".into(),
            ));
        }
        Ok(Self { colors })
    }

    /// Generates `n` visually distinct, contrasting colours (evenly spaced hues).
    ///
    /// `n == 0` is treated as 1 so the result is always a usable palette.
    pub fn contrasting(n: usize) -> Self {
        let n = n.max(1);
        let colors = (0..n)
            .map(|i| {
                let hue = (i as f32 * 360.0) / n as f32;
                let hsl_color = Hsl::new(hue, 0.9, 0.5);
                let srgb_u8: Srgb<u8> = Srgb::from_color(hsl_color).into_format();
                [srgb_u8.red, srgb_u8.green, srgb_u8.blue]
            })
            .collect();
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Colour for the `index`-th overlay: `palette[index mod len]`.
    pub fn color_for(&self, index: usize) -> Rgb<u8> {
        Rgb(self.colors[index % self.colors.len()])
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE.to_vec(),
        }
    }
}

impl TryFrom<Vec<[u8; 3]>> for Palette {
    type Error = OverlayError;

    fn try_from(colors: Vec<[u8; 3]>) -> Result<Self> {
        Self::new(colors)
    }
}

impl From<Palette> for Vec<[u8; 3]> {
    fn from(palette: Palette) -> Self {
        palette.colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_for_cycles_through_palette() {
        let palette = Palette::new(vec![
            [1, 0, 0],
            [2, 0, 0],
            [3, 0, 0],
            [4, 0, 0],
            [5, 0, 0],
            [6, 0, 0],
        ])
        .unwrap();
        assert_eq!(palette.color_for(7), palette.color_for(1));
        assert_eq!(palette.color_for(0), Rgb([1, 0, 0]));
        assert_eq!(palette.color_for(5), Rgb([6, 0, 0]));
        assert_eq!(palette.color_for(6), Rgb([1, 0, 0]));
    }

    #[test]
    fn default_palette_is_stable() {
        let a = Palette::default();
        let b = Palette::default();
        for i in 0..50 {
            assert_eq!(a.color_for(i), b.color_for(i));
        }
        assert_eq!(a.color_for(0), Rgb([255, 56, 56]));
        assert_eq!(a.color_for(20), Rgb([255, 56, 56]));
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(Palette::new(Vec::new()).is_err());
        assert!(serde_json::from_str::<Palette>("[]").is_err());
        let parsed: Palette = serde_json::from_str("[[1,2,3]]").unwrap();
        assert_eq!(parsed.color_for(9), Rgb([1, 2, 3]));
    }

    #[test]
    fn contrasting_palette_works() {
        assert_eq!(Palette::contrasting(0).len(), 1);
        assert_eq!(Palette::contrasting(1).color_for(0), Rgb([242, 13, 13]));

        let two = Palette::contrasting(2);
        assert_eq!(two.color_for(0), Rgb([242, 13, 13]));
        assert_eq!(two.color_for(1), Rgb([13, 242, 242]));

        let three = Palette::contrasting(3);
        assert_eq!(three.color_for(0), Rgb([242, 13, 13]));
        assert_eq!(three.color_for(1), Rgb([13, 242, 13]));
        assert_eq!(three.color_for(2), Rgb([13, 13, 242]));
    }
}
