use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ShapeError};

/// Label value reserved for pixels that belong to no mask.
pub const BACKGROUND: u32 = 0;

/// A labeled segmentation raster.
///
/// # Description
///
/// Each pixel carries the identifier of the mask it belongs to, `0` marks
/// background. Indexing is row-major: `labels[[row, col]]` is the pixel at
/// `y = row`, `x = col`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct MaskRaster {
    labels: Array2<u32>,
}

impl MaskRaster {
    pub fn new(labels: Array2<u32>) -> Self {
        MaskRaster { labels }
    }

    /// Builds a raster from row-major label data.
    ///
    /// # Arguments
    ///
    /// * `height` - number of rows
    /// * `width` - number of columns
    /// * `data` - `height * width` labels, row after row
    ///
    pub fn from_shape_vec(height: usize, width: usize, data: Vec<u32>) -> Result<Self, ShapeError> {
        let labels = Array2::from_shape_vec((height, width), data)?;
        Ok(MaskRaster::new(labels))
    }

    pub fn width(&self) -> usize {
        self.labels.ncols()
    }

    pub fn height(&self) -> usize {
        self.labels.nrows()
    }

    pub fn labels(&self) -> &Array2<u32> {
        &self.labels
    }

    /// Label at pixel column `px`, row `py`, or `None` off the grid.
    #[inline]
    pub fn label_at(&self, px: usize, py: usize) -> Option<u32> {
        self.labels.get((py, px)).copied()
    }

    /// Distinct non-background labels in ascending order.
    ///
    /// Identifiers are taken as they appear in the raster, gaps included.
    pub fn mask_ids(&self) -> Vec<u32> {
        self.labels
            .iter()
            .copied()
            .filter(|&label| label != BACKGROUND)
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect()
    }

    /// Pixel count per mask identifier.
    pub fn mask_areas(&self) -> BTreeMap<u32, usize> {
        let mut areas = BTreeMap::new();
        for &label in self.labels.iter().filter(|&&label| label != BACKGROUND) {
            *areas.entry(label).or_insert(0) += 1;
        }
        areas
    }
}
