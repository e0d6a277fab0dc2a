//! Drawing surfaces the renderer paints onto.
//!
//! All coordinates handed to a [`Surface`] are device pixels; colours carry
//! their opacity in the alpha channel. Each call composites as a unit, so a
//! translucent polyline does not darken where its own segments overlap.

use image::{GrayImage, Luma, Pixel, Rgba, RgbaImage};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    },
    point::Point,
    rect::Rect,
};

use crate::rect::{ScreenRect, enclosing_rect};

/// A write-only 2D canvas, owned by the caller and lent to one render pass at a time.
pub trait Surface {
    /// Resizes the backing store and clears it to transparent.
    fn reset(&mut self, width: u32, height: u32);

    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba<u8>);

    /// Outlines `rect` with a stroke of `line_width` centred on its edges.
    fn stroke_rect(&mut self, rect: ScreenRect, line_width: f32, color: Rgba<u8>);

    fn fill_circle(&mut self, center: Point<f32>, radius: f32, color: Rgba<u8>);

    /// Strokes the polyline through `points` with round joins.
    fn stroke_polyline(
        &mut self,
        points: &[Point<f32>],
        closed: bool,
        line_width: f32,
        color: Rgba<u8>,
    );

    /// Draws `text` on a dark translucent plate whose lower left corner sits at `anchor`.
    fn draw_label(&mut self, anchor: Point<f32>, text: &str, color: Rgba<u8>);
}

/// A recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Reset {
        width: u32,
        height: u32,
    },
    FillRect {
        rect: ScreenRect,
        color: Rgba<u8>,
    },
    StrokeRect {
        rect: ScreenRect,
        line_width: f32,
        color: Rgba<u8>,
    },
    FillCircle {
        center: Point<f32>,
        radius: f32,
        color: Rgba<u8>,
    },
    StrokePolyline {
        points: Vec<Point<f32>>,
        closed: bool,
        line_width: f32,
        color: Rgba<u8>,
    },
    Label {
        anchor: Point<f32>,
        text: String,
        color: Rgba<u8>,
    },
}

impl DrawCommand {
    pub fn color(&self) -> Option<Rgba<u8>> {
        match self {
            DrawCommand::Reset { .. } => None,
            DrawCommand::FillRect { color, .. }
            | DrawCommand::StrokeRect { color, .. }
            | DrawCommand::FillCircle { color, .. }
            | DrawCommand::StrokePolyline { color, .. }
            | DrawCommand::Label { color, .. } => Some(*color),
        }
    }
}

/// Surface that only logs what it was asked to draw.
///
/// A reset discards the log, mirroring how a real surface discards its pixels.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    size: (u32, u32),
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Commands since the last reset, the reset itself included.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands since the last reset that actually draw something.
    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|c| !matches!(c, DrawCommand::Reset { .. }))
    }
}

impl Surface for RecordingSurface {
    fn reset(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.commands.clear();
        self.commands.push(DrawCommand::Reset { width, height });
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba<u8>) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: ScreenRect, line_width: f32, color: Rgba<u8>) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            line_width,
            color,
        });
    }

    fn fill_circle(&mut self, center: Point<f32>, radius: f32, color: Rgba<u8>) {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            color,
        });
    }

    fn stroke_polyline(
        &mut self,
        points: &[Point<f32>],
        closed: bool,
        line_width: f32,
        color: Rgba<u8>,
    ) {
        self.commands.push(DrawCommand::StrokePolyline {
            points: points.to_vec(),
            closed,
            line_width,
            color,
        });
    }

    fn draw_label(&mut self, anchor: Point<f32>, text: &str, color: Rgba<u8>) {
        self.commands.push(DrawCommand::Label {
            anchor,
            text: text.to_string(),
            color,
        });
    }
}

const COVERED: Luma<u8> = Luma([255]);
const UNCOVERED: Luma<u8> = Luma([0]);

const LABEL_PLATE: Rgba<u8> = Rgba([0, 0, 0, 140]);
/// Nominal glyph advance and cap height of a label, in device pixels.
const LABEL_CHAR_WIDTH: f32 = 9.0;
const LABEL_TEXT_HEIGHT: f32 = 14.0;
const LABEL_PADDING: f32 = 6.0;

/// Plate behind a label of `chars` characters, extending right of and above `anchor`.
fn label_plate(anchor: Point<f32>, chars: usize) -> ScreenRect {
    ScreenRect::new(
        anchor.x,
        anchor.y - LABEL_TEXT_HEIGHT - LABEL_PADDING,
        chars as f32 * LABEL_CHAR_WIDTH + 2.0 * LABEL_PADDING,
        LABEL_TEXT_HEIGHT + 2.0 * LABEL_PADDING,
    )
}

/// Surface backed by an RGBA image, rasterised with `imageproc`.
///
/// Every call first draws a coverage mask over the pixels it may touch, then
/// blends its colour once per covered pixel.
///
/// No font is bundled, so a label is drawn as its plate framed in the label
/// colour, sized for the text but without glyphs.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Runs `draw` on a coverage mask spanning `bounds` (clipped to the image) and
    /// blends `color` wherever it marked a pixel. `draw` receives the mask origin.
    fn composite<F>(&mut self, bounds: ScreenRect, color: Rgba<u8>, draw: F)
    where
        F: FnOnce(&mut GrayImage, Point<f32>),
    {
        let (w, h) = self.image.dimensions();
        let x0 = bounds.x.floor().max(0.0);
        let y0 = bounds.y.floor().max(0.0);
        let x1 = bounds.right().ceil().min(w as f32);
        let y1 = bounds.bottom().ceil().min(h as f32);
        if !(x1 > x0 && y1 > y0) || color[3] == 0 {
            return;
        }

        let (ox, oy) = (x0 as u32, y0 as u32);
        let mut coverage = GrayImage::new(x1 as u32 - ox, y1 as u32 - oy);
        draw(&mut coverage, Point::new(x0, y0));

        for (x, y, c) in coverage.enumerate_pixels() {
            if c[0] > 0 {
                self.image.get_pixel_mut(ox + x, oy + y).blend(&color);
            }
        }
    }
}

fn to_local(p: Point<f32>, origin: Point<f32>) -> Point<f32> {
    Point::new(p.x - origin.x, p.y - origin.y)
}

/// Pixel rect covering `rect` after rounding its edges; `None` when nothing is left.
fn pixel_rect(rect: ScreenRect, origin: Point<f32>) -> Option<Rect> {
    let left = (rect.x - origin.x).round();
    let top = (rect.y - origin.y).round();
    let width = (rect.right() - origin.x).round() - left;
    let height = (rect.bottom() - origin.y).round() - top;
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size(width as u32, height as u32))
}

fn disc(mask: &mut GrayImage, center: Point<f32>, radius: f32) {
    draw_filled_circle_mut(
        mask,
        (center.x.round() as i32, center.y.round() as i32),
        radius.round().max(0.0) as i32,
        COVERED,
    );
}

fn thick_segment(mask: &mut GrayImage, a: Point<f32>, b: Point<f32>, half_width: f32) {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length = dx.hypot(dy);
    if length < 1e-3 {
        return;
    }
    if half_width < 1.0 {
        draw_line_segment_mut(mask, (a.x, a.y), (b.x, b.y), COVERED);
        return;
    }

    let (nx, ny) = (-dy / length * half_width, dx / length * half_width);
    let corner = |p: Point<f32>, sign: f32| {
        Point::new((p.x + sign * nx).round() as i32, (p.y + sign * ny).round() as i32)
    };
    let quad = [corner(a, 1.0), corner(b, 1.0), corner(b, -1.0), corner(a, -1.0)];
    if quad[0] == quad[3] {
        draw_line_segment_mut(mask, (a.x, a.y), (b.x, b.y), COVERED);
    } else {
        draw_polygon_mut(mask, &quad, COVERED);
    }
}

impl Surface for RasterSurface {
    fn reset(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba<u8>) {
        self.composite(rect, color, |mask, origin| {
            if let Some(r) = pixel_rect(rect, origin) {
                draw_filled_rect_mut(mask, r, COVERED);
            }
        });
    }

    fn stroke_rect(&mut self, rect: ScreenRect, line_width: f32, color: Rgba<u8>) {
        let half = (line_width / 2.0).max(0.5);
        let outer = rect.expand(half);
        self.composite(outer.expand(1.0), color, |mask, origin| {
            if let Some(r) = pixel_rect(outer, origin) {
                draw_filled_rect_mut(mask, r, COVERED);
            }
            if let Some(r) = pixel_rect(rect.expand(-half), origin) {
                draw_filled_rect_mut(mask, r, UNCOVERED);
            }
        });
    }

    fn fill_circle(&mut self, center: Point<f32>, radius: f32, color: Rgba<u8>) {
        let bounds = ScreenRect::new(center.x, center.y, 0.0, 0.0).expand(radius + 1.0);
        self.composite(bounds, color, |mask, origin| {
            disc(mask, to_local(center, origin), radius);
        });
    }

    fn stroke_polyline(
        &mut self,
        points: &[Point<f32>],
        closed: bool,
        line_width: f32,
        color: Rgba<u8>,
    ) {
        let Some(extent) = enclosing_rect(points) else {
            return;
        };
        let half = line_width / 2.0;
        self.composite(extent.expand(half + 1.0), color, |mask, origin| {
            let local: Vec<Point<f32>> = points.iter().map(|&p| to_local(p, origin)).collect();
            for pair in local.windows(2) {
                thick_segment(mask, pair[0], pair[1], half);
            }
            if closed && local.len() > 2 {
                thick_segment(mask, local[local.len() - 1], local[0], half);
            }
            if half >= 1.0 {
                for &p in &local {
                    disc(mask, p, half);
                }
            }
        });
    }
    fn draw_label(&mut self, anchor: Point<f32>, text: &str, color: Rgba<u8>) {
        let plate = label_plate(anchor, text.chars().count());
        self.fill_rect(plate, LABEL_PLATE);
        self.stroke_rect(plate, 1.0, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn covered(surface: &RasterSurface) -> usize {
        surface.image().pixels().filter(|p| p[3] > 0).count()
    }

    #[test]
    fn recording_surface_reset_discards_log() {
        let mut surface = RecordingSurface::new();
        surface.fill_rect(ScreenRect::new(0.0, 0.0, 1.0, 1.0), RED);
        surface.reset(10, 20);
        assert_eq!(surface.size(), (10, 20));
        assert_eq!(
            surface.commands(),
            &[DrawCommand::Reset {
                width: 10,
                height: 20
            }]
        );
        assert_eq!(surface.draw_calls().count(), 0);
    }

    #[test]
    fn fill_rect_covers_exact_pixels() {
        let mut surface = RasterSurface::new(10, 10);
        surface.fill_rect(ScreenRect::new(2.0, 3.0, 4.0, 2.0), RED);
        assert_eq!(covered(&surface), 8);
        assert_eq!(surface.image().get_pixel(2, 3), &RED);
        assert_eq!(surface.image().get_pixel(5, 4), &RED);
        assert_eq!(surface.image().get_pixel(6, 4)[3], 0);
    }

    #[test]
    fn drawing_is_clipped_to_surface() {
        let mut surface = RasterSurface::new(4, 4);
        surface.fill_rect(ScreenRect::new(-10.0, -10.0, 100.0, 100.0), RED);
        assert_eq!(covered(&surface), 16);
        surface.reset(4, 4);
        surface.fill_circle(Point::new(50.0, 50.0), 3.0, RED);
        assert_eq!(covered(&surface), 0);
    }

    #[test]
    fn translucent_polyline_blends_once_per_pixel() {
        let translucent = Rgba([0, 0, 255, 128]);
        let mut surface = RasterSurface::new(40, 40);
        let points = [
            Point::new(5.0, 5.0),
            Point::new(30.0, 5.0),
            Point::new(30.0, 30.0),
            Point::new(5.0, 30.0),
        ];
        surface.stroke_polyline(&points, true, 4.0, translucent);
        let alphas: Vec<u8> = surface
            .image()
            .pixels()
            .map(|p| p[3])
            .filter(|&a| a > 0)
            .collect();
        assert!(!alphas.is_empty());
        assert!(alphas.iter().all(|&a| a == alphas[0] && a < 255));
        // Interior of the square stays untouched.
        assert_eq!(surface.image().get_pixel(17, 17)[3], 0);
        // Closing edge is drawn.
        assert!(surface.image().get_pixel(5, 17)[3] > 0);
    }

    #[test]
    fn label_draws_a_framed_plate_above_the_anchor() {
        let mut surface = RasterSurface::new(100, 60);
        surface.draw_label(Point::new(10.0, 40.0), "ab", RED);

        // Plate spans x 10..40 and y 20..46.
        let inside = surface.image().get_pixel(25, 33);
        assert!(inside[3].abs_diff(LABEL_PLATE[3]) <= 1);
        assert_eq!((inside[0], inside[1], inside[2]), (0, 0, 0));
        assert_eq!(surface.image().get_pixel(10, 33), &RED);
        assert_eq!(surface.image().get_pixel(25, 50)[3], 0);
        assert_eq!(surface.image().get_pixel(45, 33)[3], 0);
    }

    #[test]
    fn recording_surface_logs_labels() {
        let mut surface = RecordingSurface::new();
        surface.draw_label(Point::new(1.0, 2.0), "lesion 50.00%", RED);
        assert_eq!(
            surface.commands(),
            &[DrawCommand::Label {
                anchor: Point::new(1.0, 2.0),
                text: "lesion 50.00%".to_string(),
                color: RED,
            }]
        );
    }

    #[test]
    fn stroke_rect_leaves_interior_clear() {
        let mut surface = RasterSurface::new(30, 30);
        surface.stroke_rect(ScreenRect::new(5.0, 5.0, 20.0, 20.0), 2.0, RED);
        assert_eq!(surface.image().get_pixel(5, 5), &RED);
        assert_eq!(surface.image().get_pixel(24, 15), &RED);
        assert_eq!(surface.image().get_pixel(15, 15)[3], 0);
        assert_eq!(surface.image().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn fill_circle_is_centred() {
        let mut surface = RasterSurface::new(20, 20);
        surface.fill_circle(Point::new(10.0, 10.0), 3.0, RED);
        assert_eq!(surface.image().get_pixel(10, 10), &RED);
        assert_eq!(surface.image().get_pixel(13, 10), &RED);
        assert_eq!(surface.image().get_pixel(15, 10)[3], 0);
    }
}
