use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use raster_seg_rs::{
    preview::{render_rgb, PreviewOptions},
    raster::{RasterDataset, Window},
    server::{self, AppState},
    Cli, Command, InferConfig, OnnxSegmentationModel, PreviewConfig, RasterProcessor,
    ServeConfig,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Command::Serve(config) => run_serve(config),
        Command::Infer(config) => run_infer(config),
        Command::Preview(config) => run_preview(&config),
    }
}

fn load_model(model_path: &Path, device_id: i32) -> Result<OnnxSegmentationModel> {
    ensure!(
        model_path.exists(),
        "Model path does not exist: {}",
        model_path.display()
    );
    OnnxSegmentationModel::new(model_path, device_id)
        .with_context(|| format!("Failed to load model: {}", model_path.display()))
}

fn run_serve(config: ServeConfig) -> Result<()> {
    let model = Arc::new(load_model(&config.model_path, config.device_id)?);
    let state = AppState::new(model).with_temp_dir(config.temp_dir.clone());
    let app = server::router(state, config.body_limit_bytes);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(server::serve(app, &config.bind_address()))
}

fn run_infer(config: InferConfig) -> Result<()> {
    ensure!(
        config.input_dir.exists(),
        "Input directory does not exist: {}",
        config.input_dir.display()
    );
    ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()?;

    let model = load_model(&config.model_path, config.device_id)?;
    let summary = RasterProcessor::new(model, config).process_directory()?;
    ensure!(
        summary.failed == 0,
        "{} of {} rasters failed",
        summary.failed,
        summary.processed + summary.failed
    );
    Ok(())
}

fn run_preview(config: &PreviewConfig) -> Result<()> {
    let dataset = RasterDataset::open(&config.input)?;
    let bands: [usize; 3] = config
        .bands
        .as_slice()
        .try_into()
        .context("exactly three bands are needed")?;
    let crop = match config.crop.as_deref() {
        Some(&[px, py, w, h]) => Some(Window::new(px, py, w, h)),
        Some(_) => anyhow::bail!("a crop is four values: px,py,w,h"),
        None => None,
    };
    let (stack, meta) = dataset.read_crop(crop, None)?;
    let options = PreviewOptions {
        bands,
        clip_percentile: (config.clip_low, config.clip_high),
        clip_values: None,
        nodata: meta.nodata,
    };
    render_rgb(stack.view(), &options)?
        .save(&config.output)
        .with_context(|| format!("Failed to save preview: {}", config.output.display()))?;
    info!("preview written to {}", config.output.display());
    Ok(())
}
