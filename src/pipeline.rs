use std::path::Path;

use ndarray::prelude::*;
use tracing::debug;

use crate::errors::{RasterSegError, Result};
use crate::raster::RasterDataset;
use crate::stats::percentile;
use crate::traits::SegmentationModel;

/// Spectral bands the network was trained on.
pub const MODEL_BANDS: usize = 10;
/// Side length of the tiles the network was trained on.
pub const MASK_SIZE: usize = 512;
pub const MASK_THRESHOLD: f32 = 0.5;
pub const NORMALIZATION_PERCENTILE: f64 = 90.0;

/// Run the full pipeline on the raster at `path` and return a
/// `MASK_SIZE x MASK_SIZE` mask of 0.0 / 1.0 values.
///
/// Only the first `model.input_bands()` bands are fed to the network.
pub fn infer_image<M>(model: &M, path: &Path) -> Result<Array2<f32>>
where
    M: SegmentationModel + ?Sized,
{
    let dataset = RasterDataset::open(path)?;
    let mut inputs = select_bands(dataset.into_array(), model.input_bands());
    normalize_bands(&mut inputs);
    infer_tensor(model, inputs)
}

/// Model and threshold stages on an already normalized band stack.
pub fn infer_tensor<M>(model: &M, inputs: Array3<f32>) -> Result<Array2<f32>>
where
    M: SegmentationModel + ?Sized,
{
    debug!(shape = ?inputs.shape(), "running model");
    let raw = model.predict(inputs.insert_axis(Axis(0)).view())?;
    threshold_mask(raw)
}

/// First `count` bands of a band-major stack. Fewer bands are passed through
/// as-is; the model reports the mismatch.
pub fn select_bands(stack: Array3<f32>, count: usize) -> Array3<f32> {
    let available = stack.len_of(Axis(0));
    if available <= count {
        return stack;
    }
    stack.slice_move(s![..count, .., ..])
}

/// Rescale every band against its own 90th percentile.
pub fn normalize_bands(bands: &mut Array3<f32>) {
    for band in bands.axis_iter_mut(Axis(0)) {
        normalize_band(band);
    }
}

/// Clip values above the band's 90th percentile and divide by it, mapping the
/// band into `[0, 1]`. Bands whose percentile is not strictly positive (zero,
/// negative, or NaN) are left untouched.
pub fn normalize_band(mut band: ArrayViewMut2<f32>) {
    let mut values: Vec<f32> = band.iter().copied().collect();
    let perc = percentile(&mut values, NORMALIZATION_PERCENTILE);
    if !(perc > 0.0) {
        return;
    }
    let perc = perc as f32;
    band.mapv_inplace(|v| if v > perc { 1.0 } else { v / perc });
}

/// Flatten the raw network output to `MASK_SIZE x MASK_SIZE` and binarize it:
/// strictly above `MASK_THRESHOLD` is 1, everything else 0.
pub fn threshold_mask<D: Dimension>(raw: Array<f32, D>) -> Result<Array2<f32>> {
    let actual = raw.len();
    if actual != MASK_SIZE * MASK_SIZE {
        return Err(RasterSegError::ShapeMismatch {
            expected: vec![MASK_SIZE, MASK_SIZE],
            actual,
        });
    }
    let values = raw
        .iter()
        .map(|&v| if v > MASK_THRESHOLD { 1.0 } else { 0.0 })
        .collect();
    Ok(Array2::from_shape_vec((MASK_SIZE, MASK_SIZE), values)?)
}
