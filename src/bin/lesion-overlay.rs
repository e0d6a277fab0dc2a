use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use image::{Rgba, RgbaImage, imageops};
use lesion_overlay::geometry::contain_fit;
use lesion_overlay::{
    ImageSize, InferenceResult, MaskPlacement, OverlayStyle, OverlayView, RasterSurface, Viewport,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lesion-overlay", about = "Draw segmentation overlays onto a clinical image")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the default overlay style as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Image the detections were computed on
    #[arg(long, required_unless_present = "print_config")]
    image: Option<PathBuf>,

    /// Inference result JSON from the segmentation service
    #[arg(long, required_unless_present = "print_config")]
    detections: Option<PathBuf>,

    /// Overlay style TOML (see --print-config)
    #[arg(long)]
    style: Option<PathBuf>,

    /// Viewport width in CSS pixels [default: image width]
    #[arg(long)]
    width: Option<f32>,

    /// Viewport height in CSS pixels [default: image height]
    #[arg(long)]
    height: Option<f32>,

    /// Device pixel ratio of the output
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,

    /// How mask grids lie over the image
    #[arg(long, value_enum, default_value_t = Placement::Auto)]
    placement: Placement,

    /// Output PNG path
    #[arg(short, long, default_value = "overlay.png")]
    output: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Placement {
    /// Derive from the result's crop metadata
    Auto,
    /// Stretch the mask over the whole image
    Full,
    /// One mask cell per image pixel
    Pixel,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&OverlayStyle::default())?);
        return Ok(());
    }
    let (Some(image_path), Some(detections_path)) = (&cli.image, &cli.detections) else {
        bail!("--image and --detections are required");
    };

    let style = match &cli.style {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read style {}", path.display()))?;
            OverlayStyle::from_toml_str(&text)
                .with_context(|| format!("Invalid style {}", path.display()))?
        }
        None => OverlayStyle::default(),
    };

    let photo = image::open(image_path)
        .with_context(|| format!("Failed to open {}", image_path.display()))?
        .to_rgba8();
    let payload = fs::read_to_string(detections_path)
        .with_context(|| format!("Failed to read {}", detections_path.display()))?;
    let result = InferenceResult::from_json(&payload)
        .with_context(|| format!("Invalid inference result {}", detections_path.display()))?;

    let source = ImageSize::new(photo.width(), photo.height());
    let viewport = Viewport::new(
        cli.width.unwrap_or(source.width as f32),
        cli.height.unwrap_or(source.height as f32),
    )
    .with_device_pixel_ratio(cli.dpr);
    let placement = match cli.placement {
        Placement::Auto => result.mask_placement(),
        Placement::Full => MaskPlacement::FullImage,
        Placement::Pixel => MaskPlacement::PixelAligned,
    };
    info!(
        detections = result.detections.len(),
        ?placement,
        "Inference result loaded"
    );

    let mut view = OverlayView::new(style);
    let mut surface = RasterSurface::new(0, 0);
    view.set_mask_placement(placement);
    view.set_detections(result.detections, &mut surface);
    view.load_image(source, &mut surface);
    let outcome = view.resize(viewport, &mut surface);
    info!(?outcome, "Overlay pass finished");

    let canvas = compose(&photo, &viewport, surface.image());
    canvas
        .save(&cli.output)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!(output = %cli.output.display(), "Overlay image saved");

    Ok(())
}

/// Letterboxes `photo` into the viewport on a black background and lays the overlay on top.
fn compose(photo: &RgbaImage, viewport: &Viewport, overlay: &RgbaImage) -> RgbaImage {
    let (width, height) = overlay.dimensions();
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    if let Some(fit) = contain_fit(ImageSize::new(photo.width(), photo.height()), viewport) {
        let to_device = fit.to_device(viewport.dpr());
        let fitted_w = (photo.width() as f32 * to_device.sx).round().max(1.0) as u32;
        let fitted_h = (photo.height() as f32 * to_device.sy).round().max(1.0) as u32;
        let fitted = imageops::resize(photo, fitted_w, fitted_h, imageops::FilterType::Triangle);
        imageops::overlay(
            &mut canvas,
            &fitted,
            to_device.tx.round() as i64,
            to_device.ty.round() as i64,
        );
    }

    imageops::overlay(&mut canvas, overlay, 0, 0);
    canvas
}
