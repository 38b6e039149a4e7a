use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use maskcore::algorithm::scaling::DEFAULT_NM_PER_PIXEL;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::io::writer::OutputFormat;
use crate::render::overlay::{RenderOptions, MAX_UPSCALE};

/// Input files of one batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchInput {
    /// Segmentation archive (`.npz` with a `masks` array, or a bare `.npy`)
    pub segmentation: PathBuf,
    /// Tab-separated points table
    pub points: PathBuf,
    /// Optional image drawn under the overlays
    #[serde(default)]
    pub background: Option<PathBuf>,
}

impl BatchInput {
    pub fn new(segmentation: PathBuf, points: PathBuf, background: Option<PathBuf>) -> Self {
        BatchInput { segmentation, points, background }
    }

    /// Stem of the points file, used to name the batch directory.
    pub fn points_stem(&self) -> String {
        self.points
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "points".to_string())
    }
}

/// Configuration of a pipeline run.
///
/// Built from a JSON manifest or from command-line flags and passed down
/// explicitly; nothing below reads global state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batches: Vec<BatchInput>,
    pub output_root: PathBuf,
    /// Nanometers per raster pixel
    pub nm_per_pixel: f64,
    pub output_format: OutputFormat,
    /// zstd compression of bincode output
    pub compress: bool,
    pub render: bool,
    pub render_options: RenderOptions,
    /// Keep going after a failed batch instead of aborting the run
    pub continue_on_error: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            batches: Vec::new(),
            output_root: PathBuf::from("output"),
            nm_per_pixel: DEFAULT_NM_PER_PIXEL,
            output_format: OutputFormat::Npy,
            compress: false,
            render: true,
            render_options: RenderOptions::default(),
            continue_on_error: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> PipelineResult<Self> {
        let f = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| PipelineError::serialization(path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |reason: &str| Err(PipelineError::InvalidConfig { reason: reason.to_string() });

        if self.batches.is_empty() {
            return invalid("no batches configured");
        }
        if !self.nm_per_pixel.is_finite() || self.nm_per_pixel <= 0.0 {
            return invalid("nm_per_pixel must be a positive number");
        }
        if !(1..=MAX_UPSCALE).contains(&self.render_options.upscale) {
            return Err(PipelineError::InvalidConfig {
                reason: format!("render_options.upscale must be between 1 and {}", MAX_UPSCALE),
            });
        }
        Ok(())
    }

    /// Output directory of the `batch_number`-th batch (1-based).
    pub fn batch_dir(&self, batch_number: usize, batch: &BatchInput) -> PathBuf {
        self.output_root
            .join(format!("batch_{}_{}", batch_number, batch.points_stem()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn one_batch() -> PipelineConfig {
        PipelineConfig {
            batches: vec![BatchInput::new("seg.npz".into(), "data/run_002.txt".into(), None)],
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.nm_per_pixel, 100.0);
        assert_eq!(config.output_format, OutputFormat::Npy);
        assert!(config.render);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_validate() {
        assert!(one_batch().validate().is_ok());
        assert!(PipelineConfig::default().validate().is_err());

        let mut config = one_batch();
        config.nm_per_pixel = 0.0;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig { .. })));
        config.nm_per_pixel = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = one_batch();
        config.render_options.upscale = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_upscale_bound() {
        let mut config = one_batch();
        config.render_options.upscale = MAX_UPSCALE;
        assert!(config.validate().is_ok());

        config.render_options.upscale = MAX_UPSCALE + 1;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig { .. })));
        config.render_options.upscale = 70_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_dir_uses_points_stem() {
        let config = one_batch();
        let dir = config.batch_dir(1, &config.batches[0]);
        assert_eq!(dir, PathBuf::from("output").join("batch_1_run_002"));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batches.json");
        let mut f = File::create(&path).unwrap();
        write!(
            f,
            r#"{{
                "batches": [{{"segmentation": "a_seg.npz", "points": "a.txt", "background": "a.tif"}}],
                "output_root": "out",
                "output_format": "bincode",
                "compress": true,
                "render_options": {{"upscale": 3}}
            }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.batches[0].background, Some(PathBuf::from("a.tif")));
        assert_eq!(config.output_format, OutputFormat::Bincode);
        assert!(config.compress);
        assert_eq!(config.nm_per_pixel, 100.0);
        assert_eq!(config.render_options.upscale, 3);
        assert_eq!(config.render_options.point_alpha, 0.5);
    }

    #[test]
    fn test_demo_manifest_parses() {
        let config: PipelineConfig = serde_json::from_str(include_str!("../../../demos/batches.json")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.batches.len(), 2);
        assert_eq!(config.batches[1].background, None);
    }

    #[test]
    fn test_from_json_file_rejects_empty_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batches.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(PipelineConfig::from_json_file(&path), Err(PipelineError::InvalidConfig { .. })));
    }
}
