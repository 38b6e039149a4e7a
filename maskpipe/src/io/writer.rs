use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::info;
use maskcore::data::point::ScaledPoint;
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

pub const SUMMARY_FILE_NAME: &str = "summary.json";

/// On-disk encoding of a mask's point subset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `n x 3` float64 array, rows `(x, y, channel)`
    #[default]
    Npy,
    /// Pretty-printed JSON record
    Json,
    /// Bincode record, optionally zstd compressed
    Bincode,
}

impl OutputFormat {
    pub fn extension(&self, compress: bool) -> &'static str {
        match (self, compress) {
            (OutputFormat::Npy, _) => "npy",
            (OutputFormat::Json, _) => "json",
            (OutputFormat::Bincode, false) => "bin",
            (OutputFormat::Bincode, true) => "bin.zst",
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct MaskPointsFile {
    pub version: u32,
    pub mask_id: u32,
    pub points: Vec<ScaledPoint>,
}

impl MaskPointsFile {
    pub fn new(mask_id: u32, points: Vec<ScaledPoint>) -> Self {
        Self { version: 1, mask_id, points }
    }
}

pub fn mask_points_file_name(mask_id: u32, format: OutputFormat, compress: bool) -> String {
    format!("mask_{}_points.{}", mask_id, format.extension(compress))
}

fn create(path: &Path) -> PipelineResult<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| PipelineError::io(path, e))
}

fn points_to_array(points: &[ScaledPoint]) -> Array2<f64> {
    let mut array = Array2::zeros((points.len(), 3));
    for (mut row, p) in array.rows_mut().into_iter().zip(points) {
        let [x, y, channel] = p.to_row();
        row[0] = x;
        row[1] = y;
        row[2] = channel;
    }
    array
}

// a dropped BufWriter swallows its final write error
fn finish(mut writer: BufWriter<File>, path: &Path) -> PipelineResult<()> {
    writer.flush().map_err(|e| PipelineError::io(path, e))
}

fn save_npy(path: &Path, points: &[ScaledPoint]) -> PipelineResult<()> {
    let mut writer = create(path)?;
    points_to_array(points)
        .write_npy(&mut writer)
        .map_err(|e| PipelineError::serialization(path, e))?;
    finish(writer, path)
}

fn save_json(path: &Path, file: &MaskPointsFile) -> PipelineResult<()> {
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, file).map_err(|e| PipelineError::serialization(path, e))?;
    finish(writer, path)
}

fn save_bincode(path: &Path, file: &MaskPointsFile, compress: bool) -> PipelineResult<()> {
    let mut bw = create(path)?;
    if compress {
        let mut zw = zstd::Encoder::new(&mut bw, 3).map_err(|e| PipelineError::io(path, e))?;
        bincode::serialize_into(&mut zw, file).map_err(|e| PipelineError::serialization(path, e))?;
        zw.finish().map_err(|e| PipelineError::io(path, e))?;
    } else {
        bincode::serialize_into(&mut bw, file).map_err(|e| PipelineError::serialization(path, e))?;
    }
    finish(bw, path)
}

/// Persists the points assigned to one mask.
///
/// # Arguments
///
/// * `output_dir` - batch output directory, must exist
/// * `mask_id` - mask identifier, used in the file name
/// * `points` - the mask's points in pixel-grid units
/// * `format` - file encoding
/// * `compress` - zstd compression, bincode only
///
/// # Returns
///
/// * the written path, or `None` when `points` is empty and nothing was written
///
pub fn write_mask_points(
    output_dir: &Path,
    mask_id: u32,
    points: &[ScaledPoint],
    format: OutputFormat,
    compress: bool,
) -> PipelineResult<Option<PathBuf>> {
    if points.is_empty() {
        info!("No points found for mask {}", mask_id);
        return Ok(None);
    }

    let path = output_dir.join(mask_points_file_name(mask_id, format, compress));
    match format {
        OutputFormat::Npy => save_npy(&path, points)?,
        OutputFormat::Json => save_json(&path, &MaskPointsFile::new(mask_id, points.to_vec()))?,
        OutputFormat::Bincode => save_bincode(&path, &MaskPointsFile::new(mask_id, points.to_vec()), compress)?,
    }

    info!("Saved {} points for mask {} to {}", points.len(), mask_id, path.display());
    Ok(Some(path))
}

fn load_npy(path: &Path) -> PipelineResult<Vec<ScaledPoint>> {
    let f = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let array = Array2::<f64>::read_npy(BufReader::new(f)).map_err(|e| PipelineError::npy(path, e))?;
    if array.ncols() != 3 {
        return Err(PipelineError::malformed(
            path,
            format!("expected 3 columns (x, y, channel), found {}", array.ncols()),
        ));
    }
    Ok(array
        .rows()
        .into_iter()
        .map(|row| ScaledPoint::new(row[0], row[1], row[2] as i64))
        .collect())
}

fn load_json(path: &Path) -> PipelineResult<MaskPointsFile> {
    let f = BufReader::new(File::open(path).map_err(|e| PipelineError::io(path, e))?);
    serde_json::from_reader(f).map_err(|e| PipelineError::serialization(path, e))
}

fn load_bincode(path: &Path, compressed: bool) -> PipelineResult<MaskPointsFile> {
    let f = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    if compressed {
        let mut zr = zstd::Decoder::new(f).map_err(|e| PipelineError::io(path, e))?;
        bincode::deserialize_from(&mut zr).map_err(|e| PipelineError::serialization(path, e))
    } else {
        bincode::deserialize_from(BufReader::new(f)).map_err(|e| PipelineError::serialization(path, e))
    }
}

/// Reads back a file written by [`write_mask_points`], format chosen by extension.
pub fn read_mask_points(path: &Path) -> PipelineResult<Vec<ScaledPoint>> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if name.ends_with(".npy") {
        load_npy(path)
    } else if name.ends_with(".json") {
        Ok(load_json(path)?.points)
    } else if name.ends_with(".bin.zst") {
        Ok(load_bincode(path, true)?.points)
    } else if name.ends_with(".bin") {
        Ok(load_bincode(path, false)?.points)
    } else {
        Err(PipelineError::malformed(path, "unknown mask points file extension"))
    }
}

/// Writes a batch summary as pretty JSON into `output_dir`.
pub fn write_summary<T: Serialize>(output_dir: &Path, summary: &T) -> PipelineResult<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE_NAME);
    let mut writer = create(&path)?;
    serde_json::to_writer_pretty(&mut writer, summary).map_err(|e| PipelineError::serialization(&path, e))?;
    finish(writer, &path)?;
    Ok(path)
}
