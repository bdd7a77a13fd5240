use crate::errors::{RasterSegError, Result};
use crate::pipeline::MODEL_BANDS;
use crate::traits::SegmentationModel;
use ndarray::prelude::*;

/// Test model that answers every pixel with the same value.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub value: f32,
}

impl MockSegmentationModel {
    pub const fn new(value: f32) -> Self {
        Self { value }
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn input_bands(&self) -> usize {
        MODEL_BANDS
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let shape = tensor.shape();
        Ok(Array4::<f32>::from_elem(
            (shape[0], 1, shape[2], shape[3]),
            self.value,
        ))
    }
}

/// Test model whose output is the per-pixel mean over the input channels.
/// Rejects tensors with the wrong channel count, like a real network would.
#[derive(Debug, Clone, Copy)]
pub struct ChannelMeanModel;

impl SegmentationModel for ChannelMeanModel {
    fn input_bands(&self) -> usize {
        MODEL_BANDS
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let channels = tensor.len_of(Axis(1));
        if channels != MODEL_BANDS {
            return Err(RasterSegError::Model {
                operation: "forward pass".to_string(),
                source: format!("expected {} input channels, got {}", MODEL_BANDS, channels)
                    .into(),
            });
        }
        tensor
            .mean_axis(Axis(1))
            .map(|mean| mean.insert_axis(Axis(1)))
            .ok_or_else(|| RasterSegError::Model {
                operation: "forward pass".to_string(),
                source: "empty input tensor".into(),
            })
    }
}

/// Test model that always fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingModel;

impl SegmentationModel for FailingModel {
    fn input_bands(&self) -> usize {
        MODEL_BANDS
    }

    fn predict(&self, _tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        Err(RasterSegError::Model {
            operation: "forward pass".to_string(),
            source: "model unavailable".into(),
        })
    }
}

pub const fn create_mock_model() -> MockSegmentationModel {
    MockSegmentationModel::new(0.0)
}
