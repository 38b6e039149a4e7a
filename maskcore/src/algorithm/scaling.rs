use crate::data::point::{Point, ScaledPoint};

/// Physical units (nanometers) covered by one raster pixel.
pub const DEFAULT_NM_PER_PIXEL: f64 = 100.0;

/// Converts points from physical units to pixel-grid units.
///
/// # Arguments
///
/// * `points` - localizations in physical units
/// * `factor` - physical units per pixel
///
/// # Returns
///
/// * one `ScaledPoint` per input point, same order, channel unchanged
///
pub fn scale_points(points: &[Point], factor: f64) -> Vec<ScaledPoint> {
    points
        .iter()
        .map(|p| ScaledPoint::new(p.x / factor, p.y / factor, p.channel))
        .collect()
}
