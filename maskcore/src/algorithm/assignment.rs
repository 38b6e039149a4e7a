//! Point-to-mask assignment.
//!
//! Every scaled point is truncated to its pixel and bucketed by the label
//! found there, in a single pass over the points.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::point::ScaledPoint;
use crate::data::raster::{MaskRaster, BACKGROUND};

/// Result of assigning a batch of points to the masks of one raster.
///
/// `masks` holds an entry for every mask identifier in the raster, in
/// ascending order, with the points in input order. Points that fell on
/// background or off the grid are only counted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskAssignment {
    pub masks: BTreeMap<u32, Vec<ScaledPoint>>,
    pub background: usize,
    pub out_of_bounds: usize,
}

impl MaskAssignment {
    pub fn points_for(&self, mask_id: u32) -> &[ScaledPoint] {
        self.masks.get(&mask_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_assigned(&self) -> usize {
        self.masks.values().map(Vec::len).sum()
    }

    /// Number of points seen by the assignment, assigned or not.
    pub fn total_points(&self) -> usize {
        self.total_assigned() + self.background + self.out_of_bounds
    }

    /// Point count per channel for one mask.
    pub fn channel_counts(&self, mask_id: u32) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for p in self.points_for(mask_id) {
            *counts.entry(p.channel).or_insert(0) += 1;
        }
        counts
    }
}

/// Distinct channels of a point set, ascending.
///
/// Computed over the whole batch, including points that land on background
/// or off the grid, so a channel maps to the same palette slot whichever
/// masks it reaches.
pub fn distinct_channels(points: &[ScaledPoint]) -> Vec<i64> {
    points
        .iter()
        .map(|p| p.channel)
        .sorted_unstable()
        .dedup()
        .collect()
}

/// Assigns scaled points to the masks of a labeled raster.
///
/// # Arguments
///
/// * `raster` - label raster, `0` is background
/// * `scaled_points` - points in pixel-grid units
///
/// # Returns
///
/// * `MaskAssignment` with one entry per mask id present in the raster
///
/// A point belongs to mask `m` iff `raster[py][px] == m`, where `(px, py)`
/// are its coordinates truncated toward zero. Points with non-finite
/// coordinates or a pixel outside the raster are counted in
/// `out_of_bounds` and dropped.
pub fn assign_points_to_masks(raster: &MaskRaster, scaled_points: &[ScaledPoint]) -> MaskAssignment {
    let mut masks: BTreeMap<u32, Vec<ScaledPoint>> = raster
        .mask_ids()
        .into_iter()
        .map(|id| (id, Vec::new()))
        .collect();

    let mut background = 0;
    let mut out_of_bounds = 0;

    for point in scaled_points {
        let label = point
            .pixel()
            .and_then(|(px, py)| raster.label_at(px, py));

        match label {
            None => out_of_bounds += 1,
            Some(BACKGROUND) => background += 1,
            Some(id) => masks.entry(id).or_default().push(*point),
        }
    }

    MaskAssignment { masks, background, out_of_bounds }
}
