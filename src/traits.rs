use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over the segmentation network.
///
/// The pipeline only ever sees this trait, so a real ONNX session and the
/// lightweight models in `mocks` are interchangeable. Implementations are loaded
/// once and shared read-only; `predict` takes `&self`.
pub trait SegmentationModel: Send + Sync {
    /// Number of input channels the network was trained on.
    fn input_bands(&self) -> usize;

    /// Raw forward pass: `(batch, bands, height, width)` in,
    /// `(batch, 1, height, width)` out.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for std::sync::Arc<M> {
    fn input_bands(&self) -> usize {
        (**self).input_bands()
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(tensor)
    }
}
