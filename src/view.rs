use tracing::debug;

use crate::config::OverlayStyle;
use crate::detection::{Detection, InferenceResult};
use crate::geometry::{ImageSize, MaskPlacement, Viewport};
use crate::ingest::{LesionOverlay, ingest};
use crate::render::{OverlayRenderer, RenderOutcome, Scene};
use crate::surface::Surface;

/// Inputs of an overlay display and the triggers that repaint it.
///
/// The view keeps only what its collaborators hand it (image size, viewport,
/// detections, mask placement, toggle). Overlays, edges and contours are
/// derived again on every trigger, and each trigger completes one full pass
/// on the surface it is given before returning.
#[derive(Debug, Clone)]
pub struct OverlayView {
    renderer: OverlayRenderer,
    source: Option<ImageSize>,
    viewport: Viewport,
    placement: MaskPlacement,
    detections: Vec<Detection>,
    visible: bool,
}

impl Default for OverlayView {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

impl OverlayView {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            renderer: OverlayRenderer::new(style),
            source: None,
            viewport: Viewport::new(0.0, 0.0),
            placement: MaskPlacement::default(),
            detections: Vec::new(),
            visible: true,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn placement(&self) -> MaskPlacement {
        self.placement
    }

    /// Sets how mask grids lie over the image. Takes effect on the next trigger.
    pub fn set_mask_placement(&mut self, placement: MaskPlacement) {
        self.placement = placement;
    }

    /// Overlays the current detections would produce.
    pub fn overlays(&self) -> Vec<LesionOverlay> {
        ingest(&self.detections, &self.renderer.style().ingest_options())
    }

    /// A new image replaces the previous one wholesale.
    pub fn load_image<S: Surface + ?Sized>(
        &mut self,
        size: ImageSize,
        surface: &mut S,
    ) -> RenderOutcome {
        self.source = Some(size);
        self.refresh(surface)
    }

    pub fn resize<S: Surface + ?Sized>(
        &mut self,
        viewport: Viewport,
        surface: &mut S,
    ) -> RenderOutcome {
        self.viewport = viewport;
        self.refresh(surface)
    }

    pub fn set_visible<S: Surface + ?Sized>(
        &mut self,
        visible: bool,
        surface: &mut S,
    ) -> RenderOutcome {
        self.visible = visible;
        self.refresh(surface)
    }

    /// Replaces the detections; the mask placement is left as configured.
    pub fn set_detections<S: Surface + ?Sized>(
        &mut self,
        detections: Vec<Detection>,
        surface: &mut S,
    ) -> RenderOutcome {
        self.detections = detections;
        self.refresh(surface)
    }

    /// Replaces the detections and derives the mask placement from the result's crop metadata.
    pub fn set_inference_result<S: Surface + ?Sized>(
        &mut self,
        result: InferenceResult,
        surface: &mut S,
    ) -> RenderOutcome {
        self.placement = result.mask_placement();
        self.set_detections(result.detections, surface)
    }

    pub fn clear_detections<S: Surface + ?Sized>(&mut self, surface: &mut S) -> RenderOutcome {
        self.detections.clear();
        self.refresh(surface)
    }

    /// Runs one full render pass with the current inputs.
    pub fn refresh<S: Surface + ?Sized>(&self, surface: &mut S) -> RenderOutcome {
        let overlays = if self.visible {
            self.overlays()
        } else {
            Vec::new()
        };
        debug!(
            detections = self.detections.len(),
            overlays = overlays.len(),
            visible = self.visible,
            "overlay view triggered"
        );
        self.renderer.render(
            surface,
            &Scene {
                source: self.source,
                viewport: self.viewport,
                overlays: &overlays,
                placement: self.placement,
                visible: self.visible,
            },
        )
    }
}
