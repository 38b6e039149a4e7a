use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;
use maskcore::algorithm::scaling::DEFAULT_NM_PER_PIXEL;
use maskpipe::io::writer::OutputFormat;
use maskpipe::logging::setup_logging;
use maskpipe::pipeline::batch::run_pipeline;
use maskpipe::pipeline::config::{BatchInput, PipelineConfig};
use maskpipe::render::overlay::RenderOptions;

#[derive(Parser)]
#[command(name = "maskpipe")]
#[command(about = "Assign localization microscopy points to segmentation masks and render overlays")]
#[command(version)]
struct Cli {
    /// Log level, overridden by RUST_LOG.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write rotating log files into this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every batch listed in a JSON manifest.
    Run {
        /// Path to the manifest.
        #[arg(long)]
        config: PathBuf,
    },

    /// Process a single segmentation/points pair.
    Assign(AssignArgs),
}

#[derive(Debug, Clone, Args)]
struct AssignArgs {
    /// Segmentation archive (.npz with a "masks" array, or a bare .npy).
    #[arg(long)]
    segmentation: PathBuf,

    /// Tab-separated points table.
    #[arg(long)]
    points: PathBuf,

    /// Output root; the batch directory is created inside it.
    #[arg(long)]
    output: PathBuf,

    /// Optional background image for the overlays.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Nanometers per raster pixel.
    #[arg(long, default_value_t = DEFAULT_NM_PER_PIXEL)]
    nm_per_pixel: f64,

    /// Encoding of the per-mask point files.
    #[arg(long, value_enum, default_value_t = OutputFormat::Npy)]
    format: OutputFormat,

    /// zstd-compress bincode output.
    #[arg(long)]
    compress: bool,

    /// Skip the PNG overlays.
    #[arg(long)]
    no_render: bool,

    /// Output pixels per raster pixel in the overlays.
    #[arg(long, default_value = "2")]
    upscale: u32,
}

impl AssignArgs {
    fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            batches: vec![BatchInput::new(self.segmentation, self.points, self.background)],
            output_root: self.output,
            nm_per_pixel: self.nm_per_pixel,
            output_format: self.format,
            compress: self.compress,
            render: !self.no_render,
            render_options: RenderOptions {
                upscale: self.upscale,
                ..RenderOptions::default()
            },
            continue_on_error: false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level, cli.log_dir.as_deref())
        .context("failed to initialize logging")?;

    let config = match cli.command {
        Commands::Run { config } => PipelineConfig::from_json_file(&config)
            .with_context(|| format!("failed to load manifest {}", config.display()))?,
        Commands::Assign(args) => args.into_config(),
    };

    let reports = run_pipeline(&config).context("pipeline run failed")?;
    for report in &reports {
        info!(
            "batch {}: {} of {} points assigned to {} masks -> {}",
            report.batch_number,
            report.assigned_points,
            report.total_points,
            report.masks.len(),
            report.output_dir.display()
        );
    }
    Ok(())
}
