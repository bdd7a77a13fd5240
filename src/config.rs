use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::thread;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Serve the segmentation model over HTTP
    Serve(ServeConfig),
    /// Segment every raster in a directory and write .npy masks
    Infer(InferConfig),
    /// Render an RGB preview of a raster
    Preview(PreviewConfig),
}

#[derive(Args, Clone, Debug)]
pub struct ServeConfig {
    #[arg(short, long, env = "MODEL_PATH", default_value = "./model/live_model.onnx")]
    pub model_path: PathBuf,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    #[arg(long, env = "BODY_LIMIT_BYTES", default_value_t = 256 * 1024 * 1024)]
    pub body_limit_bytes: usize,

    /// Where uploads are staged; the system temp dir when unset
    #[arg(long, env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    #[arg(short, long, env = "DEVICE_ID", default_value_t = 0)]
    pub device_id: i32,
}

impl ServeConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Args, Clone, Debug)]
pub struct InferConfig {
    pub input_dir: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(short, long, env = "MODEL_PATH", default_value = "./model/live_model.onnx")]
    pub model_path: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Also write a PNG preview with the mask overlaid
    #[arg(long)]
    pub preview: bool,

    #[arg(short, long, default_value_t = default_threads())]
    pub num_threads: usize,
}

#[derive(Args, Clone, Debug)]
pub struct PreviewConfig {
    pub input: PathBuf,

    pub output: PathBuf,

    /// 1-based bands used as red, green and blue
    #[arg(long, value_delimiter = ',', default_values_t = [3, 2, 1], value_parser = check_band)]
    pub bands: Vec<usize>,

    #[arg(long, default_value_t = 2.0, value_parser = check_percentile)]
    pub clip_low: f64,

    #[arg(long, default_value_t = 98.0, value_parser = check_percentile)]
    pub clip_high: f64,

    /// Pixel window `px,py,w,h` to render instead of the whole raster
    #[arg(long, value_delimiter = ',')]
    pub crop: Option<Vec<usize>>,
}

fn default_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

fn check_band(s: &str) -> Result<usize, String> {
    let band: usize = s
        .parse()
        .map_err(|_| format!("`{}` is not a band number", s))?;
    if band == 0 {
        return Err("bands are numbered from 1".to_string());
    }
    Ok(band)
}

fn check_percentile(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("`{}` is not a number", s))?;
    if !(0.0..=100.0).contains(&value) {
        return Err(format!("{} is not a percentile between 0 and 100", value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["raster-seg-rs", "serve"]).unwrap();
        let Command::Serve(config) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.model_path, PathBuf::from("./model/live_model.onnx"));
        assert!(config.temp_dir.is_none());
    }

    #[test]
    fn test_preview_bands_parse() {
        let cli = Cli::try_parse_from([
            "raster-seg-rs",
            "preview",
            "in.tif",
            "out.png",
            "--bands",
            "4,3,2",
        ])
        .unwrap();
        let Command::Preview(config) = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(config.bands, vec![4, 3, 2]);
        assert_eq!((config.clip_low, config.clip_high), (2.0, 98.0));
        assert!(config.crop.is_none());
    }

    #[test]
    fn test_preview_defaults_and_crop() {
        let cli = Cli::try_parse_from([
            "raster-seg-rs",
            "preview",
            "in.tif",
            "out.png",
            "--crop",
            "10,20,256,128",
        ])
        .unwrap();
        let Command::Preview(config) = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(config.bands, vec![3, 2, 1]);
        assert_eq!(config.crop, Some(vec![10, 20, 256, 128]));
    }

    #[test]
    fn test_preview_rejects_band_zero() {
        let result = Cli::try_parse_from([
            "raster-seg-rs",
            "preview",
            "in.tif",
            "out.png",
            "--bands",
            "3,0,1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_value_checks() {
        assert!(check_band("0").is_err());
        assert_eq!(check_band("3"), Ok(3));
        assert!(check_percentile("101").is_err());
        assert_eq!(check_percentile("98"), Ok(98.0));
    }
}
