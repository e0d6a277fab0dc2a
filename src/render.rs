use image::{Rgb, Rgba};
use imageproc::point::Point;
use tracing::{debug, trace};

use crate::config::{ContourMethod, OverlayStyle};
use crate::contours::{ChainOptions, ContourPath, Outline, order_points, trace_borders};
use crate::edges::extract_edges;
use crate::geometry::{Affine, ImageSize, MaskPlacement, Viewport, contain_fit};
use crate::ingest::{LesionOverlay, OverlayGeometry};
use crate::mask::MaskMatrix;
use crate::rect::{BoundingBox, ScreenRect};
use crate::surface::Surface;

/// Everything one render pass needs to know.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    /// `None` until the image has loaded.
    pub source: Option<ImageSize>,
    pub viewport: Viewport,
    /// Painted in order; later overlays cover earlier ones.
    pub overlays: &'a [LesionOverlay],
    pub placement: MaskPlacement,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    NoTransform,
    NoOverlays,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub overlays: usize,
    pub fill_blocks: usize,
    pub stamps: usize,
    pub polylines: usize,
    pub boxes: usize,
    pub labels: usize,
}

/// How a pass ended. Either way the surface was reset first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Cleared(SkipReason),
    Drawn(RenderStats),
}

fn with_opacity(color: Rgb<u8>, opacity: f32) -> Rgba<u8> {
    let [r, g, b] = color.0;
    Rgba([r, g, b, (opacity.clamp(0.0, 1.0) * 255.0).round() as u8])
}

/// Paints lesion overlays onto a [`Surface`].
///
/// A pass is stateless: the surface is reset to the viewport's device size, then
/// every overlay is drawn from scratch. Nothing is cached between passes.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        scene: &Scene<'_>,
    ) -> RenderOutcome {
        let (width, height) = scene.viewport.device_size();
        surface.reset(width, height);

        if !scene.visible {
            debug!(reason = "hidden", "overlay pass skipped");
            return RenderOutcome::Cleared(SkipReason::Hidden);
        }
        let Some((source, transform)) = scene
            .source
            .and_then(|source| contain_fit(source, &scene.viewport).map(|t| (source, t)))
        else {
            debug!(
                reason = "no transform",
                source = ?scene.source,
                viewport = ?scene.viewport,
                "overlay pass skipped"
            );
            return RenderOutcome::Cleared(SkipReason::NoTransform);
        };
        if scene.overlays.is_empty() {
            return RenderOutcome::Cleared(SkipReason::NoOverlays);
        }

        let dpr = scene.viewport.dpr();
        let to_device = transform.to_device(dpr);
        let mut pass = Pass {
            style: &self.style,
            surface,
            stroke_width: self
                .style
                .stroke_width
                .device_width(transform.display_scale(), dpr),
            stats: RenderStats::default(),
        };

        for overlay in scene.overlays {
            let anchor = match &overlay.geometry {
                OverlayGeometry::Mask(mask) => {
                    let Some(grid_to_source) =
                        scene
                            .placement
                            .grid_to_source(mask.width(), mask.height(), source)
                    else {
                        debug!(id = overlay.id, "mask has no placement on the image");
                        continue;
                    };
                    let grid_to_device = grid_to_source.then(to_device);
                    trace!(id = overlay.id, ?grid_to_device, "drawing mask overlay");
                    pass.draw_mask(overlay.color, mask, &grid_to_device);
                    mask.centroid().map(|c| grid_to_device.apply(c))
                }
                OverlayGeometry::BoundingBox(bbox) => {
                    let bbox_to_device = scene.placement.bbox_to_source().then(to_device);
                    trace!(id = overlay.id, ?bbox, ?bbox_to_device, "drawing box overlay");
                    let rect = pass.draw_box(overlay.color, bbox, &bbox_to_device);
                    Some(Point::new(rect.x, rect.y))
                }
            };
            if let Some(anchor) = anchor {
                pass.draw_label(overlay, anchor);
            }
            pass.stats.overlays += 1;
        }

        let stats = pass.stats;
        debug!(?stats, "overlay pass complete");
        RenderOutcome::Drawn(stats)
    }
}

/// State of one render pass: the borrowed surface and what has been drawn so far.
struct Pass<'a, S: ?Sized> {
    style: &'a OverlayStyle,
    surface: &'a mut S,
    /// In device pixels.
    stroke_width: f32,
    stats: RenderStats,
}

impl<S: Surface + ?Sized> Pass<'_, S> {
    fn draw_mask(&mut self, color: Rgb<u8>, mask: &MaskMatrix, grid_to_device: &Affine) {
        if self.style.fill {
            let fill = with_opacity(color, self.style.fill_opacity);
            self.fill_blocks(fill, mask, grid_to_device);
        }

        let stroke = with_opacity(color, self.style.stroke_opacity);
        match self.style.contour {
            ContourMethod::NearestNeighbor => {
                let edges = extract_edges(mask);
                let options = ChainOptions {
                    threshold: self
                        .style
                        .jump_threshold(self.stroke_width, grid_to_device.min_scale()),
                    sample_cap: self.style.stroke_sample_cap,
                    min_simplify_len: self.style.min_simplify_len,
                };
                match order_points(&edges, &options) {
                    Outline::Dots(points) => self.stamp(stroke, &points, grid_to_device),
                    Outline::Path { path, stragglers } => {
                        self.draw_path(stroke, &path, grid_to_device);
                        self.stamp(stroke, &stragglers, grid_to_device);
                    }
                }
            }
            ContourMethod::BorderTrace => {
                let paths = trace_borders(
                    mask,
                    self.style.stroke_sample_cap,
                    self.style.min_simplify_len,
                );
                for path in &paths {
                    self.draw_path(stroke, path, grid_to_device);
                }
            }
        }
    }

    /// Fills each block of the mask grid that holds at least one inside cell.
    fn fill_blocks(&mut self, fill: Rgba<u8>, mask: &MaskMatrix, grid_to_device: &Affine) {
        let (w, h) = (mask.width(), mask.height());
        let block = self.style.block_size.for_mask_width(w);

        for by in (0..h).step_by(block as usize) {
            let bh = block.min(h - by);
            for bx in (0..w).step_by(block as usize) {
                let bw = block.min(w - bx);
                let occupied = (by..by + bh)
                    .any(|y| (bx..bx + bw).any(|x| mask.is_set(x as i64, y as i64)));
                if !occupied {
                    continue;
                }
                let rect = ScreenRect::from_corners(
                    grid_to_device.apply(Point::new(bx as f32, by as f32)),
                    grid_to_device.apply(Point::new((bx + bw) as f32, (by + bh) as f32)),
                );
                self.surface.fill_rect(rect, fill);
                self.stats.fill_blocks += 1;
            }
        }
    }

    /// Stamps every path point, then strokes the path when it is long enough.
    fn draw_path(&mut self, stroke: Rgba<u8>, path: &ContourPath, grid_to_device: &Affine) {
        self.stamp(stroke, &path.points, grid_to_device);
        if path.len() < self.style.min_polyline_points {
            return;
        }
        let device: Vec<Point<f32>> = path
            .points
            .iter()
            .map(|&p| grid_to_device.apply(p))
            .collect();
        self.surface
            .stroke_polyline(&device, path.closed, self.stroke_width, stroke);
        self.stats.polylines += 1;
    }

    fn stamp(&mut self, stroke: Rgba<u8>, points: &[Point<f32>], grid_to_device: &Affine) {
        let radius = self.stroke_width * self.style.dot_radius_factor;
        for &p in points {
            self.surface
                .fill_circle(grid_to_device.apply(p), radius, stroke);
        }
        self.stats.stamps += points.len();
    }

    /// Fill and outline of a box overlay; returns the outlined rect.
    fn draw_box(&mut self, color: Rgb<u8>, bbox: &BoundingBox, to_device: &Affine) -> ScreenRect {
        let rect = bbox.to_screen(to_device);
        if self.style.fill {
            self.surface
                .fill_rect(rect, with_opacity(color, self.style.fill_opacity));
            self.stats.fill_blocks += 1;
        }
        self.surface.stroke_rect(
            rect,
            self.stroke_width,
            with_opacity(color, self.style.stroke_opacity),
        );
        self.stats.boxes += 1;
        rect
    }

    /// Anchor is the mask centroid or the box's top left corner, in device pixels.
    fn draw_label(&mut self, overlay: &LesionOverlay, anchor: Point<f32>) {
        if !self.style.labels {
            return;
        }
        let [r, g, b] = overlay.color.0;
        self.surface
            .draw_label(anchor, &overlay.label_text(), Rgba([r, g, b, 255]));
        self.stats.labels += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::Palette;
    use crate::detection::Detection;
    use crate::ingest::ingest;
    use crate::surface::{DrawCommand, RasterSurface, RecordingSurface};

    fn overlays_for(detections: &[Detection], style: &OverlayStyle) -> Vec<LesionOverlay> {
        ingest(detections, &style.ingest_options())
    }

    fn scene<'a>(
        overlays: &'a [LesionOverlay],
        source: ImageSize,
        viewport: Viewport,
    ) -> Scene<'a> {
        Scene {
            source: Some(source),
            viewport,
            overlays,
            placement: MaskPlacement::FullImage,
            visible: true,
        }
    }

    #[test]
    fn square_mask_end_to_end() {
        let style = OverlayStyle::default();
        let overlays = overlays_for(&[Detection::new("lesion").with_mask(&[[1u8; 4]; 4])], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();

        let outcome = renderer.render(
            &mut surface,
            &scene(&overlays, ImageSize::new(100, 100), Viewport::new(200.0, 200.0)),
        );

        let RenderOutcome::Drawn(stats) = outcome else {
            panic!("expected a drawn pass, got {outcome:?}");
        };
        assert_eq!(
            stats,
            RenderStats {
                overlays: 1,
                fill_blocks: 1,
                stamps: 12,
                polylines: 1,
                boxes: 0,
                labels: 1,
            }
        );

        let commands = surface.commands();
        assert_eq!(
            commands[0],
            DrawCommand::Reset {
                width: 200,
                height: 200
            }
        );
        let DrawCommand::FillRect { rect, color } = &commands[1] else {
            panic!("expected the fill first, got {:?}", commands[1]);
        };
        assert_eq!(*rect, ScreenRect::new(0.0, 0.0, 200.0, 200.0));
        assert_eq!(color[3], 64);

        assert!(commands[2..14]
            .iter()
            .all(|c| matches!(c, DrawCommand::FillCircle { radius, .. } if *radius == 2.0)));
        let DrawCommand::StrokePolyline {
            points,
            closed,
            line_width,
            ..
        } = &commands[14]
        else {
            panic!("expected the outline last, got {:?}", commands[14]);
        };
        assert!(*closed);
        assert_eq!(*line_width, 4.0);
        assert_eq!(points.len(), 12);
        assert_eq!(points[0], Point::new(25.0, 25.0));
        assert_eq!(points[3], Point::new(175.0, 25.0));

        assert_eq!(commands.len(), 16);
        let DrawCommand::Label { anchor, text, color } = &commands[15] else {
            panic!("expected the label on top, got {:?}", commands[15]);
        };
        assert_eq!(*anchor, Point::new(100.0, 100.0));
        assert_eq!(text, "lesion 100.00%");
        assert_eq!(color[3], 255);
    }

    #[test]
    fn hidden_overlays_only_clear() {
        let style = OverlayStyle::default();
        let overlays = overlays_for(&[Detection::new("lesion").with_mask(&[[1u8; 4]; 4])], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        surface.fill_rect(ScreenRect::new(0.0, 0.0, 5.0, 5.0), Rgba([1, 2, 3, 4]));

        let mut s = scene(&overlays, ImageSize::new(100, 100), Viewport::new(50.0, 50.0));
        s.visible = false;
        assert_eq!(
            renderer.render(&mut surface, &s),
            RenderOutcome::Cleared(SkipReason::Hidden)
        );
        assert_eq!(surface.draw_calls().count(), 0);
        assert_eq!(surface.size(), (50, 50));
    }

    #[test]
    fn invalid_geometry_skips_drawing() {
        let style = OverlayStyle::default();
        let boxed = Detection::new("box").with_bbox([0.0, 0.0, 5.0, 5.0]);
        let overlays = overlays_for(&[boxed], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();

        let zero_image = scene(&overlays, ImageSize::new(0, 100), Viewport::new(50.0, 50.0));
        assert_eq!(
            renderer.render(&mut surface, &zero_image),
            RenderOutcome::Cleared(SkipReason::NoTransform)
        );
        assert_eq!(surface.draw_calls().count(), 0);

        let unloaded = Scene {
            source: None,
            ..zero_image
        };
        assert_eq!(
            renderer.render(&mut surface, &unloaded),
            RenderOutcome::Cleared(SkipReason::NoTransform)
        );

        let empty = scene(&[], ImageSize::new(10, 10), Viewport::new(50.0, 50.0));
        assert_eq!(
            renderer.render(&mut surface, &empty),
            RenderOutcome::Cleared(SkipReason::NoOverlays)
        );
    }

    #[test]
    fn overlays_paint_in_detection_order() {
        let style = OverlayStyle::default();
        let detections = vec![
            Detection::new("first").with_bbox([0.0, 0.0, 50.0, 50.0]),
            Detection::new("dropped"),
            Detection::new("second").with_mask(&[[0u8, 1, 1, 0], [0, 1, 1, 0]]),
            Detection::new("third").with_bbox([25.0, 25.0, 75.0, 75.0]),
        ];
        let overlays = overlays_for(&detections, &style);
        let palette = Palette::default();
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        renderer.render(
            &mut surface,
            &scene(&overlays, ImageSize::new(100, 100), Viewport::new(100.0, 100.0)),
        );

        let order: Vec<[u8; 3]> = surface
            .draw_calls()
            .filter_map(DrawCommand::color)
            .map(|c| [c[0], c[1], c[2]])
            .fold(Vec::new(), |mut seen, rgb| {
                if seen.last() != Some(&rgb) {
                    seen.push(rgb);
                }
                seen
            });
        assert_eq!(
            order,
            vec![
                palette.color_for(0).0,
                palette.color_for(2).0,
                palette.color_for(3).0
            ]
        );
    }

    #[test]
    fn boxes_are_filled_and_outlined_through_the_transform() {
        let style = OverlayStyle {
            fill: false,
            ..OverlayStyle::default()
        };
        let boxed = Detection::new("box").with_bbox([50.0, 0.0, 150.0, 100.0]);
        let overlays = overlays_for(&[boxed], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        // 200x100 image in a 100x100 viewport at 2x DPR: scale 0.5, offset_y 25.
        let viewport = Viewport::new(100.0, 100.0).with_device_pixel_ratio(2.0);
        renderer.render(&mut surface, &scene(&overlays, ImageSize::new(200, 100), viewport));

        let calls: Vec<&DrawCommand> = surface.draw_calls().collect();
        assert_eq!(calls.len(), 2);
        let DrawCommand::StrokeRect { rect, line_width, .. } = calls[0] else {
            panic!("expected a box outline, got {:?}", calls[0]);
        };
        assert_eq!(*rect, ScreenRect::new(50.0, 50.0, 100.0, 100.0));
        assert_eq!(*line_width, 2.0);
        assert_eq!(surface.size(), (200, 200));
        // The label hangs off the top left corner of the box.
        assert!(matches!(
            calls[1],
            DrawCommand::Label { anchor, .. } if *anchor == Point::new(50.0, 50.0)
        ));
    }

    #[test]
    fn labels_can_be_switched_off() {
        let style = OverlayStyle {
            labels: false,
            ..OverlayStyle::default()
        };
        let boxed = Detection::new("box").with_bbox([0.0, 0.0, 5.0, 5.0]);
        let overlays = overlays_for(&[boxed], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        let outcome = renderer.render(
            &mut surface,
            &scene(&overlays, ImageSize::new(10, 10), Viewport::new(10.0, 10.0)),
        );
        assert!(matches!(outcome, RenderOutcome::Drawn(s) if s.labels == 0 && s.boxes == 1));
        assert!(!surface
            .draw_calls()
            .any(|c| matches!(c, DrawCommand::Label { .. })));
    }

    #[test]
    fn cropped_masks_and_boxes_share_the_region() {
        let style = OverlayStyle {
            labels: false,
            ..OverlayStyle::default()
        };
        let detections = vec![
            Detection::new("mask").with_mask(&[[1u8; 4]; 4]),
            Detection::new("box").with_bbox([0.0, 0.0, 100.0, 100.0]),
        ];
        let overlays = overlays_for(&detections, &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        let cropped = Scene {
            placement: MaskPlacement::Region {
                x: 50.0,
                y: 0.0,
                width: 100.0,
                height: 100.0,
            },
            ..scene(&overlays, ImageSize::new(200, 100), Viewport::new(200.0, 100.0))
        };
        renderer.render(&mut surface, &cropped);

        let fills: Vec<ScreenRect> = surface
            .draw_calls()
            .filter_map(|c| match c {
                DrawCommand::FillRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect();
        let expected = ScreenRect::new(50.0, 0.0, 100.0, 100.0);
        assert_eq!(fills, vec![expected, expected]);
        assert!(surface.draw_calls().any(
            |c| matches!(c, DrawCommand::StrokeRect { rect, .. } if *rect == expected)
        ));
    }

    #[test]
    fn tiny_masks_are_drawn_as_dots() {
        let style = OverlayStyle {
            fill: false,
            ..OverlayStyle::default()
        };
        let overlays = overlays_for(&[Detection::new("speck").with_mask(&[[0u8, 1, 1]])], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        let outcome = renderer.render(
            &mut surface,
            &scene(&overlays, ImageSize::new(30, 10), Viewport::new(30.0, 10.0)),
        );
        let RenderOutcome::Drawn(stats) = outcome else {
            panic!("expected a drawn pass");
        };
        assert_eq!(stats.stamps, 2);
        assert_eq!(stats.polylines, 0);
        assert_eq!(stats.labels, 1);
        assert!(surface
            .draw_calls()
            .all(|c| matches!(c, DrawCommand::FillCircle { .. } | DrawCommand::Label { .. })));
    }

    #[test]
    fn border_trace_draws_one_path_per_component() {
        let style = OverlayStyle {
            fill: false,
            contour: ContourMethod::BorderTrace,
            ..OverlayStyle::default()
        };
        let mask = [
            [1u8, 1, 1, 0, 0, 0, 0],
            [1, 1, 1, 0, 0, 1, 1],
            [1, 1, 1, 0, 0, 1, 1],
        ];
        let overlays = overlays_for(&[Detection::new("pair").with_mask(&mask)], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RecordingSurface::new();
        let outcome = renderer.render(
            &mut surface,
            &scene(&overlays, ImageSize::new(70, 30), Viewport::new(70.0, 30.0)),
        );
        let RenderOutcome::Drawn(stats) = outcome else {
            panic!("expected a drawn pass");
        };
        assert_eq!(stats.polylines, 2);
    }

    #[test]
    fn raster_pass_respects_letterbox() {
        let style = OverlayStyle::default();
        let overlays = overlays_for(&[Detection::new("lesion").with_mask(&[[1u8; 4]; 4])], &style);
        let renderer = OverlayRenderer::new(style);
        let mut surface = RasterSurface::new(1, 1);
        // Square image in a wide viewport: pillarboxed between x = 50 and x = 150.
        renderer.render(
            &mut surface,
            &scene(&overlays, ImageSize::new(100, 100), Viewport::new(200.0, 100.0)),
        );

        let image = surface.image();
        assert_eq!(image.dimensions(), (200, 100));
        assert_eq!(image.get_pixel(10, 50)[3], 0);
        assert_eq!(image.get_pixel(190, 90)[3], 0);
        // Top edge of the outline runs along y = 12.5.
        assert!(image.get_pixel(75, 13)[3] > 200);
        // Interior away from the label only carries the translucent fill.
        let interior = image.get_pixel(75, 70);
        assert!(interior[3] > 0 && interior[3] < 128);
        // The label plate sits just above the centroid.
        assert!(image.get_pixel(110, 45)[3] > 128);
    }
}
