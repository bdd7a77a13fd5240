//! HTTP surface: `/`, `/healthz` and `/inference`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::errors::{RasterSegError, Result};
use crate::npy::to_npy_bytes;
use crate::pipeline::infer_image;
use crate::traits::SegmentationModel;
use crate::is_supported_raster_format;

pub struct AppState<M: SegmentationModel> {
    pub model: Arc<M>,
    /// Directory for staged uploads; the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl<M: SegmentationModel> AppState<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            temp_dir: None,
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }
}

impl IntoResponse for RasterSegError {
    fn into_response(self) -> Response {
        let status = match self {
            RasterSegError::Validation { .. } => StatusCode::BAD_REQUEST,
            RasterSegError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router<M: SegmentationModel + 'static>(state: AppState<M>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/inference", post(inference::<M>))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(Arc::new(state))
}

async fn root() -> StatusCode {
    StatusCode::OK
}

async fn healthz() -> &'static str {
    "Ok"
}

/// Body-limit overruns keep their 413; any other stream failure is a bad request.
fn stream_error(err: MultipartError) -> RasterSegError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RasterSegError::PayloadTooLarge {
            reason: err.body_text(),
        }
    } else {
        RasterSegError::validation("file", &err.body_text())
    }
}

struct Upload {
    filename: String,
    bytes: axum::body::Bytes,
}

async fn read_upload(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Upload> {
    let mut multipart =
        multipart.map_err(|_| RasterSegError::validation("file", "No file part"))?;
    while let Some(field) = multipart.next_field().await.map_err(stream_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(RasterSegError::validation("file", "No selected file"));
        }
        if !is_supported_raster_format(Path::new(&filename)) {
            return Err(RasterSegError::validation("file", "File type not permitted"));
        }
        let bytes = field.bytes().await.map_err(stream_error)?;
        return Ok(Upload { filename, bytes });
    }
    Err(RasterSegError::validation("file", "No file part"))
}

fn stage_upload(upload: &Upload, temp_dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("upload-").suffix(".tif");
    let mut staged = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| RasterSegError::FileSystem {
        path: temp_dir.map_or_else(std::env::temp_dir, Path::to_path_buf),
        operation: "temporary file creation".to_string(),
        source: e,
    })?;
    staged
        .write_all(&upload.bytes)
        .and_then(|()| staged.flush())
        .map_err(|e| RasterSegError::FileSystem {
            path: staged.path().to_path_buf(),
            operation: "upload staging".to_string(),
            source: e,
        })?;
    Ok(staged)
}

async fn inference<M: SegmentationModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    match run_inference(state, multipart).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response(),
        Err(e) => {
            if e.is_client_error() {
                warn!("rejected upload: {}", e);
            } else {
                error!("{}", e);
            }
            e.into_response()
        }
    }
}

async fn run_inference<M: SegmentationModel + 'static>(
    state: Arc<AppState<M>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>> {
    let upload = read_upload(multipart).await?;

    info!("Saving file to a temporary location");
    // removed on drop, whichever way this function returns
    let staged = stage_upload(&upload, state.temp_dir.as_deref())?;
    let path = staged.path().to_path_buf();

    info!("Running inference for {}", upload.filename);
    let model = Arc::clone(&state.model);
    let mask = tokio::task::spawn_blocking(move || infer_image(&*model, &path))
        .await
        .map_err(|e| RasterSegError::Model {
            operation: "inference task".to_string(),
            source: Box::new(e),
        })??;
    drop(staged);

    to_npy_bytes(mask.view()).map_err(|e| RasterSegError::FileSystem {
        path: PathBuf::from(&upload.filename),
        operation: "mask serialization".to_string(),
        source: e,
    })
}

/// Bind `address` and serve until Ctrl-C.
pub async fn serve(app: Router, address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
}
