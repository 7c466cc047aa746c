//! Letterboxing still images onto the output canvas.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::error::{PipelineError, Result};

const JPEG_QUALITY: u8 = 95;

/// Size of `(width, height)` scaled to fit inside `(target_w, target_h)`
/// with its aspect ratio preserved.
pub fn fit_inside(width: u32, height: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let scale = f64::min(
        target_w as f64 / width as f64,
        target_h as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, target_w);
    let h = ((height as f64 * scale).round() as u32).clamp(1, target_h);
    (w, h)
}

/// Resize `img` to fit the target and center it on an opaque black canvas.
pub fn letterbox(img: &DynamicImage, target_w: u32, target_h: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if (w, h) == (target_w, target_h) {
        return img.to_rgb8();
    }
    let (new_w, new_h) = fit_inside(w, h, target_w, target_h);
    let resized = img.resize_exact(new_w, new_h, FilterType::Lanczos3).to_rgb8();

    let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb([0, 0, 0]));
    let x = (target_w - new_w) / 2;
    let y = (target_h - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

/// Rewrite the image at `path` in place as a `target_w` x `target_h`
/// letterboxed picture. Images already at the target size are left alone.
pub fn normalize_in_place(path: &Path, target_w: u32, target_h: u32) -> Result<()> {
    let img = image::open(path).map_err(|source| PipelineError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    if img.dimensions() == (target_w, target_h) {
        log::debug!("{} already {}x{}", path.display(), target_w, target_h);
        return Ok(());
    }

    let boxed = letterbox(&img, target_w, target_h);
    save(&boxed, path)?;
    log::info!(
        "Normalized {} ({}x{} -> {}x{})",
        path.display(),
        img.width(),
        img.height(),
        target_w,
        target_h
    );
    Ok(())
}

fn save(img: &RgbImage, path: &Path) -> Result<()> {
    let image_err = |source| PipelineError::Image {
        path: path.to_path_buf(),
        source,
    };
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false);

    if is_jpeg {
        let writer = BufWriter::new(File::create(path)?);
        JpegEncoder::new_with_quality(writer, JPEG_QUALITY)
            .encode_image(img)
            .map_err(image_err)
    } else {
        img.save(path).map_err(image_err)
    }
}
