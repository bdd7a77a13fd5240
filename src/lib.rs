pub mod config;
pub mod errors;
pub mod model;
pub mod npy;
pub mod pipeline;
pub mod preview;
pub mod raster;
pub mod server;
pub mod stats;
pub mod traits;

pub mod mocks;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

pub use config::{Cli, Command, InferConfig, PreviewConfig, ServeConfig};
pub use errors::{RasterSegError, Result};
pub use model::OnnxSegmentationModel;
pub use pipeline::infer_image;
pub use traits::*;

/// Raster uploads and inputs are accepted by extension only.
pub fn is_supported_raster_format(path: &Path) -> bool {
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        matches!(extension.to_lowercase().as_str(), "tif" | "tiff")
    } else {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Offline counterpart of the HTTP service: segments every raster under a
/// directory, mirroring the tree into the output directory.
pub struct RasterProcessor<M: SegmentationModel> {
    model: M,
    config: InferConfig,
}

impl<M: SegmentationModel> RasterProcessor<M> {
    pub const fn new(model: M, config: InferConfig) -> Self {
        Self { model, config }
    }

    pub fn process_directory(&self) -> Result<ProcessSummary> {
        let input_path = &self.config.input_dir;
        let output_path = &self.config.output_dir;

        if !input_path.exists() {
            return Err(RasterSegError::FileSystem {
                path: input_path.clone(),
                operation: "input directory lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        fs::create_dir_all(output_path).map_err(|e| RasterSegError::FileSystem {
            path: output_path.clone(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;

        let raster_files = self.collect_raster_files(input_path);

        if raster_files.is_empty() {
            info!("no rasters found under {}", input_path.display());
            return Ok(ProcessSummary::default());
        }

        let pb = ProgressBar::new(raster_files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .map_err(|e| RasterSegError::Configuration {
                message: e.to_string(),
            })?
            .progress_chars("#>-"),
        );

        let failed = raster_files
            .par_iter()
            .filter(|input_file| {
                let result = self.process_single_raster(input_file, output_path);
                pb.inc(1);
                match result {
                    Ok(()) => false,
                    Err(e) => {
                        error!("{}: {}", input_file.display(), e);
                        true
                    }
                }
            })
            .count();

        pb.finish_and_clear();
        let summary = ProcessSummary {
            processed: raster_files.len() - failed,
            failed,
        };
        info!(
            processed = summary.processed,
            failed = summary.failed,
            "directory processed"
        );
        Ok(summary)
    }

    fn collect_raster_files(&self, input_path: &Path) -> Vec<PathBuf> {
        WalkDir::new(input_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported_raster_format(e.path()))
            .map(|e| e.into_path())
            .collect()
    }

    fn process_single_raster(&self, input_file: &Path, output_dir: &Path) -> Result<()> {
        let mask = infer_image(&self.model, input_file)?;

        let output_file = output_dir
            .join(self.get_relative_path(input_file)?)
            .with_extension("npy");

        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|e| RasterSegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }

        let file = File::create(&output_file).map_err(|e| RasterSegError::FileSystem {
            path: output_file.clone(),
            operation: "mask creation".to_string(),
            source: e,
        })?;
        npy::write_npy(BufWriter::new(file), mask.view()).map_err(|e| {
            RasterSegError::FileSystem {
                path: output_file.clone(),
                operation: "mask write".to_string(),
                source: e,
            }
        })?;

        if self.config.preview {
            let dataset = raster::RasterDataset::open(input_file)?;
            let options = preview::PreviewOptions {
                nodata: dataset.meta().nodata,
                ..preview::PreviewOptions::default()
            };
            let rendered = preview::render_rgb(dataset.read(), &options)?;
            let overlay = preview::overlay_mask(&rendered, mask.view())?;
            let preview_file = output_file.with_extension("png");
            overlay.save(&preview_file)?;
        }

        Ok(())
    }

    pub fn get_relative_path(&self, input_file: &Path) -> Result<PathBuf> {
        let input_dir = &self.config.input_dir;
        input_file
            .strip_prefix(input_dir)
            .map(|p| p.to_path_buf())
            .map_err(|_| RasterSegError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "input file is not inside the input directory",
                ),
            })
    }
}
