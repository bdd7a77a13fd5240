use std::path::Path;

use crate::{
    errors::{RasterSegError, Result},
    pipeline::{MASK_SIZE, MODEL_BANDS},
    traits::SegmentationModel,
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// UNet exported to ONNX (10 input channels, 1 output channel).
///
/// The session needs `&mut` to run, so it sits behind a mutex; concurrent callers
/// serialize on it and one inference completes before the next begins.
pub struct OnnxSegmentationModel {
    input_bands: usize,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxSegmentationModel {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| RasterSegError::Model {
                operation: "session builder initialization".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| RasterSegError::Model {
                operation: "execution provider registration".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| RasterSegError::Model {
                operation: "memory pattern configuration".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| RasterSegError::Model {
                operation: format!("loading model file {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input = session.inputs.first().ok_or_else(|| RasterSegError::Model {
            operation: "reading model inputs".to_string(),
            source: "model declares no inputs".into(),
        })?;
        let input_name = input.name.clone();
        // dynamic channel axes are reported as -1
        let input_bands = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(1).copied())
            .filter(|&channels| channels > 0)
            .map_or(MODEL_BANDS, |channels| channels as usize);
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| RasterSegError::Model {
                operation: "reading model outputs".to_string(),
                source: "model declares no outputs".into(),
            })?;

        debug!(%input_name, %output_name, input_bands, "model signature");

        // warm up
        let data = Array4::<f32>::zeros((1, input_bands, MASK_SIZE, MASK_SIZE));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data).map_err(|e| RasterSegError::Model {
                operation: "warm-up tensor creation".to_string(),
                source: Box::new(e),
            })?])
            .map_err(|e| RasterSegError::Model {
                operation: "warm-up run".to_string(),
                source: Box::new(e),
            })?;

        info!(path = %model_path.display(), input_bands, "model loaded");

        Ok(Self {
            input_bands,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl SegmentationModel for OnnxSegmentationModel {
    fn input_bands(&self) -> usize {
        self.input_bands
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let mask = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        Ok(mask)
    }
}
