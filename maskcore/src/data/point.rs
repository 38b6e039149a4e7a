use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A single localization as read from a points table.
///
/// # Description
///
/// `x` and `y` are in physical units (nanometers), `channel` is the
/// acquisition channel the detection came from.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub channel: i64,
}

impl Point {
    pub fn new(x: f64, y: f64, channel: i64) -> Self {
        Point { x, y, channel }
    }
}

/// A localization with coordinates expressed in pixel-grid units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaledPoint {
    pub x: f64,
    pub y: f64,
    pub channel: i64,
}

impl ScaledPoint {
    pub fn new(x: f64, y: f64, channel: i64) -> Self {
        ScaledPoint { x, y, channel }
    }

    /// Pixel column and row of the point, truncated toward zero.
    ///
    /// Returns `None` when either coordinate is not finite or falls on a
    /// negative pixel index.
    pub fn pixel(&self) -> Option<(usize, usize)> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        let px = self.x.trunc();
        let py = self.y.trunc();
        if px < 0.0 || py < 0.0 {
            return None;
        }
        Some((px as usize, py as usize))
    }

    /// Row layout used by array dumps: `[x, y, channel]`.
    pub fn to_row(&self) -> [f64; 3] {
        [self.x, self.y, self.channel as f64]
    }
}

impl Display for ScaledPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScaledPoint(x: {:.3}, y: {:.3}, channel: {})", self.x, self.y, self.channel)
    }
}
