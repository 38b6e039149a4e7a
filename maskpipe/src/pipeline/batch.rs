//! Batch driver: load, scale, assign, write and render one input pair at a
//! time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use maskcore::algorithm::assignment::{assign_points_to_masks, distinct_channels, MaskAssignment};
use maskcore::algorithm::scaling::scale_points;
use maskcore::data::raster::MaskRaster;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::io::loader::{load_mask_raster, load_points};
use crate::io::writer::{write_mask_points, write_summary};
use crate::pipeline::config::{BatchInput, PipelineConfig};
use crate::render::overlay::{
    load_background, mask_visualization_file_name, render_mask_points, render_masks_overlay, save_png,
    MASKS_OVERLAY_FILE_NAME,
};

/// Per-mask entry of a batch report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskSummary {
    pub mask_id: u32,
    pub area_px: usize,
    pub n_points: usize,
    pub channel_counts: BTreeMap<i64, usize>,
    pub points_file: Option<PathBuf>,
}

/// Outcome of one batch, also written as `summary.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_number: usize,
    pub segmentation: PathBuf,
    pub points: PathBuf,
    pub output_dir: PathBuf,
    pub nm_per_pixel: f64,
    pub raster_width: usize,
    pub raster_height: usize,
    pub total_points: usize,
    pub assigned_points: usize,
    pub background_points: usize,
    pub out_of_bounds_points: usize,
    pub masks: Vec<MaskSummary>,
    pub images: Vec<PathBuf>,
}

impl BatchReport {
    pub fn empty_masks(&self) -> Vec<u32> {
        self.masks
            .iter()
            .filter(|m| m.n_points == 0)
            .map(|m| m.mask_id)
            .collect()
    }
}

fn render_batch(
    config: &PipelineConfig,
    batch: &BatchInput,
    output_dir: &Path,
    raster: &MaskRaster,
    assignment: &MaskAssignment,
    channels: &[i64],
) -> PipelineResult<Vec<PathBuf>> {
    let background = match &batch.background {
        Some(path) => Some(load_background(path, raster.width() as u32, raster.height() as u32)?),
        None => None,
    };
    let options = &config.render_options;
    let mut images = Vec::new();

    let overlay_path = output_dir.join(MASKS_OVERLAY_FILE_NAME);
    save_png(&render_masks_overlay(raster, background.as_ref(), options)?, &overlay_path)?;
    images.push(overlay_path);

    for (&mask_id, points) in &assignment.masks {
        let path = output_dir.join(mask_visualization_file_name(mask_id));
        save_png(&render_mask_points(raster, points, channels, background.as_ref(), options)?, &path)?;
        images.push(path);
    }

    if let Some(last) = images.last() {
        info!("Mask visualization with points saved to {}", last.display());
    }
    Ok(images)
}

/// Processes one batch into `config.batch_dir(batch_number, batch)`.
///
/// # Arguments
///
/// * `config` - run configuration
/// * `batch_number` - 1-based position of the batch in the run
/// * `batch` - input files
///
/// # Returns
///
/// * the batch report, also persisted as `summary.json` in the batch directory
///
pub fn run_batch(config: &PipelineConfig, batch_number: usize, batch: &BatchInput) -> PipelineResult<BatchReport> {
    let output_dir = config.batch_dir(batch_number, batch);
    fs::create_dir_all(&output_dir).map_err(|e| PipelineError::io(&output_dir, e))?;

    info!("Processing batch {}...", batch_number);

    let raster = load_mask_raster(&batch.segmentation)?;
    let points = load_points(&batch.points)?;
    let scaled = scale_points(&points, config.nm_per_pixel);
    let assignment = assign_points_to_masks(&raster, &scaled);

    info!(
        "Batch {}: {} points, {} masks, {} assigned, {} on background",
        batch_number,
        assignment.total_points(),
        assignment.masks.len(),
        assignment.total_assigned(),
        assignment.background
    );
    if assignment.out_of_bounds > 0 {
        warn!(
            "Batch {}: dropped {} points outside the {}x{} raster",
            batch_number,
            assignment.out_of_bounds,
            raster.width(),
            raster.height()
        );
    }

    let areas = raster.mask_areas();
    let mut masks = Vec::with_capacity(assignment.masks.len());
    for (&mask_id, mask_points) in &assignment.masks {
        debug!("Mask {}: {} points", mask_id, mask_points.len());
        let points_file = write_mask_points(
            &output_dir,
            mask_id,
            mask_points,
            config.output_format,
            config.compress,
        )?;
        masks.push(MaskSummary {
            mask_id,
            area_px: areas.get(&mask_id).copied().unwrap_or(0),
            n_points: mask_points.len(),
            channel_counts: assignment.channel_counts(mask_id),
            points_file,
        });
    }

    let images = if config.render {
        render_batch(config, batch, &output_dir, &raster, &assignment, &distinct_channels(&scaled))?
    } else {
        Vec::new()
    };

    let report = BatchReport {
        batch_number,
        segmentation: batch.segmentation.clone(),
        points: batch.points.clone(),
        output_dir: output_dir.clone(),
        nm_per_pixel: config.nm_per_pixel,
        raster_width: raster.width(),
        raster_height: raster.height(),
        total_points: assignment.total_points(),
        assigned_points: assignment.total_assigned(),
        background_points: assignment.background,
        out_of_bounds_points: assignment.out_of_bounds,
        masks,
        images,
    };
    write_summary(&output_dir, &report)?;

    let empty = report.empty_masks();
    if !empty.is_empty() {
        info!("Batch {}: {} masks received no points: {:?}", batch_number, empty.len(), empty);
    }

    info!(
        "Batch {} processing complete. Outputs saved to {}",
        batch_number,
        output_dir.display()
    );
    Ok(report)
}

/// Runs every configured batch in order.
///
/// The first failing batch aborts the run unless `continue_on_error` is
/// set, in which case the failure is logged and only the successful
/// reports are returned.
pub fn run_pipeline(config: &PipelineConfig) -> PipelineResult<Vec<BatchReport>> {
    config.validate()?;
    fs::create_dir_all(&config.output_root).map_err(|e| PipelineError::io(&config.output_root, e))?;

    let mut reports = Vec::with_capacity(config.batches.len());
    for (i, batch) in config.batches.iter().enumerate() {
        let batch_number = i + 1;
        match run_batch(config, batch_number, batch) {
            Ok(report) => reports.push(report),
            Err(e) if config.continue_on_error => {
                error!("Batch {} failed: {}", batch_number, e);
            }
            Err(e) => return Err(e),
        }
    }

    info!("All batches processed ({} of {} succeeded).", reports.len(), config.batches.len());
    Ok(reports)
}
