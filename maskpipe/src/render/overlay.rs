//! PNG overlays of the segmentation and of each mask's points.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use maskcore::data::point::ScaledPoint;
use maskcore::data::raster::{MaskRaster, BACKGROUND};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::render::palette::{channel_colors, mask_color};

pub const MASKS_OVERLAY_FILE_NAME: &str = "masks_overlay.png";

/// Largest accepted `RenderOptions::upscale`.
pub const MAX_UPSCALE: u32 = 32;

pub fn mask_visualization_file_name(mask_id: u32) -> String {
    format!("mask_{}_point_visualization.png", mask_id)
}

/// Rendering parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Output pixels per raster pixel along each axis
    pub upscale: u32,
    /// Half-width of a point marker in output pixels, 0 draws single pixels
    pub marker_radius: u32,
    pub mask_alpha: f32,
    pub point_alpha: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            upscale: 2,
            marker_radius: 0,
            mask_alpha: 0.2,
            point_alpha: 0.5,
        }
    }
}

/// Loads a background image as grayscale, resized to the raster grid if needed.
pub fn load_background(path: &Path, width: u32, height: u32) -> PipelineResult<GrayImage> {
    let gray = image::open(path)
        .map_err(|e| PipelineError::image(path, e))?
        .to_luma8();

    if gray.dimensions() == (width, height) {
        Ok(gray)
    } else {
        Ok(imageops::resize(&gray, width, height, FilterType::Triangle))
    }
}

#[inline]
fn blend(dst: &mut Rgb<u8>, src: Rgb<u8>, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for c in 0..3 {
        let mixed = dst[c] as f32 * (1.0 - alpha) + src[c] as f32 * alpha;
        dst[c] = mixed.round() as u8;
    }
}

fn canvas_size(raster: &MaskRaster, upscale: u32) -> PipelineResult<(u32, u32)> {
    let scaled = |side: usize| {
        u32::try_from(side)
            .ok()
            .and_then(|side| side.checked_mul(upscale))
            .ok_or_else(|| PipelineError::InvalidConfig {
                reason: format!(
                    "a {}x{} raster upscaled {} times exceeds the image size limit",
                    raster.width(),
                    raster.height(),
                    upscale
                ),
            })
    };
    Ok((scaled(raster.width())?, scaled(raster.height())?))
}

// grayscale background at output resolution, black without a background image
fn base_canvas(raster: &MaskRaster, background: Option<&GrayImage>, upscale: u32) -> PipelineResult<RgbImage> {
    let (w, h) = canvas_size(raster, upscale)?;
    Ok(match background {
        Some(bg) => RgbImage::from_fn(w, h, |x, y| {
            let v = bg.get_pixel(x / upscale, y / upscale)[0];
            Rgb([v, v, v])
        }),
        None => RgbImage::new(w, h),
    })
}

/// Draws every mask tinted with its palette color over the background.
pub fn render_masks_overlay(
    raster: &MaskRaster,
    background: Option<&GrayImage>,
    options: &RenderOptions,
) -> PipelineResult<RgbImage> {
    let upscale = options.upscale.max(1);
    let mut canvas = base_canvas(raster, background, upscale)?;

    let ids = raster.mask_ids();
    let n_masks = ids.len();
    // ids are sorted, so rank lookup is a binary search
    let color_of = |label: u32| ids.binary_search(&label).ok().map(|rank| mask_color(rank, n_masks));

    for ((row, col), &label) in raster.labels().indexed_iter() {
        if label == BACKGROUND {
            continue;
        }
        let Some(color) = color_of(label) else { continue };
        let (x0, y0) = (col as u32 * upscale, row as u32 * upscale);
        for dy in 0..upscale {
            for dx in 0..upscale {
                blend(canvas.get_pixel_mut(x0 + dx, y0 + dy), color, options.mask_alpha);
            }
        }
    }

    Ok(canvas)
}

/// Draws one mask's points over the background, colored by channel.
///
/// # Arguments
///
/// * `raster` - label raster, sets the canvas size
/// * `points` - the mask's points in pixel-grid units
/// * `channels` - ascending channel list of every point in the batch,
///   so a channel keeps its color across images
/// * `background` - optional grayscale background at raster resolution
/// * `options` - rendering parameters
///
pub fn render_mask_points(
    raster: &MaskRaster,
    points: &[ScaledPoint],
    channels: &[i64],
    background: Option<&GrayImage>,
    options: &RenderOptions,
) -> PipelineResult<RgbImage> {
    let upscale = options.upscale.max(1);
    let mut canvas = base_canvas(raster, background, upscale)?;
    let (w, h) = canvas.dimensions();
    let colors = channel_colors(channels.len());
    let r = options.marker_radius as i64;

    for p in points {
        let Ok(idx) = channels.binary_search(&p.channel) else { continue };
        let color = colors[idx];
        let cx = (p.x * upscale as f64).floor() as i64;
        let cy = (p.y * upscale as f64).floor() as i64;

        for y in (cy - r)..=(cy + r) {
            for x in (cx - r)..=(cx + r) {
                if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                    continue;
                }
                blend(canvas.get_pixel_mut(x as u32, y as u32), color, options.point_alpha);
            }
        }
    }

    Ok(canvas)
}

pub fn save_png(image: &RgbImage, path: &Path) -> PipelineResult<()> {
    image.save(path).map_err(|e| PipelineError::image(path, e))
}
