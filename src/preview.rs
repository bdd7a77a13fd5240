//! RGB previews of band stacks and mask overlays, for eyeballing results.

use image::{Rgba, RgbaImage};
use ndarray::prelude::*;

use crate::errors::{RasterSegError, Result};
use crate::stats::nan_percentile;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewOptions {
    /// 1-based bands used as red, green and blue.
    pub bands: [usize; 3],
    /// Clip to these percentiles of the selected bands; `(0, 100)` disables clipping.
    pub clip_percentile: (f64, f64),
    /// Clip to fixed values instead; takes precedence over `clip_percentile`.
    pub clip_values: Option<(f32, f32)>,
    /// Treated as transparent.
    pub nodata: Option<f64>,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            bands: [3, 2, 1],
            clip_percentile: (2.0, 98.0),
            clip_values: None,
            nodata: None,
        }
    }
}

/// Render a band stack as RGBA. Stacks of three or more bands are reduced to
/// `options.bands`; smaller stacks are used as-is (a single band renders as gray).
pub fn render_rgb(stack: ArrayView3<f32>, options: &PreviewOptions) -> Result<RgbaImage> {
    let count = stack.len_of(Axis(0));
    let mut channels = if count >= 3 {
        if let Some(&band) = options.bands.iter().find(|&&b| b == 0 || b > count) {
            return Err(RasterSegError::validation(
                "bands",
                &format!("band {} out of range for a {}-band raster", band, count),
            ));
        }
        let indices: Vec<usize> = options.bands.iter().map(|b| b - 1).collect();
        stack.select(Axis(0), &indices)
    } else {
        stack.to_owned()
    };

    if let Some(nodata) = options.nodata {
        let nodata = nodata as f32;
        channels.mapv_inplace(|v| if v == nodata { f32::NAN } else { v });
    }

    let (low, high) = match options.clip_values {
        Some((low, high)) => {
            if low >= high {
                return Err(RasterSegError::validation(
                    "clip_values",
                    "clip minimum should be smaller than clip maximum",
                ));
            }
            (low, high)
        }
        None => clip_range(&channels, options.clip_percentile)?,
    };

    let scale = high - low;
    channels.mapv_inplace(|v| {
        if v.is_nan() {
            v
        } else if scale > 0.0 {
            (v.clamp(low, high) - low) / scale
        } else {
            0.0
        }
    });

    let (_, height, width) = channels.dim();
    let to_byte = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    Ok(RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let pixel = channels.slice(s![.., y, x]);
        let opaque = pixel.iter().all(|v| !v.is_nan());
        let channel = |i: usize| {
            let value = pixel.get(i).or_else(|| pixel.get(0)).copied().unwrap_or(0.0);
            if value.is_nan() { 0 } else { to_byte(value) }
        };
        Rgba([
            channel(0),
            if count == 1 { channel(0) } else { channel(1) },
            if count == 1 { channel(0) } else { channel(2) },
            if opaque { 255 } else { 0 },
        ])
    }))
}

fn clip_range(channels: &Array3<f32>, (low, high): (f64, f64)) -> Result<(f32, f32)> {
    if low >= high {
        return Err(RasterSegError::validation(
            "clip_percentile",
            "clip percentile minimum should be smaller than maximum",
        ));
    }
    let values: Vec<f32> = channels.iter().copied().collect();
    if (low, high) == (0.0, 100.0) {
        let finite = values.iter().copied().filter(|v| !v.is_nan());
        let min = finite.clone().fold(f32::INFINITY, f32::min);
        let max = finite.fold(f32::NEG_INFINITY, f32::max);
        return Ok((min, max));
    }
    Ok((
        nan_percentile(&values, low) as f32,
        nan_percentile(&values, high) as f32,
    ))
}

/// Blend a 0/1 mask over a preview as a half-transparent gray layer.
pub fn overlay_mask(preview: &RgbaImage, mask: ArrayView2<f32>) -> Result<RgbaImage> {
    let (height, width) = mask.dim();
    if (preview.width() as usize, preview.height() as usize) != (width, height) {
        return Err(RasterSegError::ShapeMismatch {
            expected: vec![preview.height() as usize, preview.width() as usize],
            actual: mask.len(),
        });
    }
    let mut blended = preview.clone();
    for (x, y, pixel) in blended.enumerate_pixels_mut() {
        let gray = mask[[y as usize, x as usize]].clamp(0.0, 1.0) * 255.0;
        for c in pixel.0.iter_mut().take(3) {
            *c = (0.5 * f32::from(*c) + 0.5 * gray).round() as u8;
        }
        pixel.0[3] = 255;
    }
    Ok(blended)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_rgb_selects_bands_and_stretches() {
        // band b holds the value b everywhere, except band 3 which ramps
        let stack = Array3::from_shape_fn((5, 2, 2), |(b, r, c)| {
            if b == 2 { (r * 2 + c) as f32 } else { b as f32 }
        });
        let options = PreviewOptions {
            clip_values: Some((0.0, 3.0)),
            ..PreviewOptions::default()
        };
        let image = render_rgb(stack.view(), &options).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        // red = band 3, green = band 2 (value 1), blue = band 1 (value 0)
        assert_eq!(image.get_pixel(0, 0).0, [0, 85, 0, 255]);
        assert_eq!(image.get_pixel(1, 1).0, [255, 85, 0, 255]);
    }

    #[test]
    fn test_render_rgb_reorders_three_band_stack() {
        let stack = Array3::from_shape_fn((3, 1, 1), |(b, _, _)| b as f32);
        let options = PreviewOptions {
            clip_values: Some((0.0, 2.0)),
            ..PreviewOptions::default()
        };
        let image = render_rgb(stack.view(), &options).unwrap();
        // red = band 3, green = band 2, blue = band 1
        assert_eq!(image.get_pixel(0, 0).0, [255, 128, 0, 255]);

        let options = PreviewOptions {
            bands: [1, 2, 3],
            clip_values: Some((0.0, 2.0)),
            ..PreviewOptions::default()
        };
        let image = render_rgb(stack.view(), &options).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 128, 255, 255]);
    }

    #[test]
    fn test_render_rgb_nodata_is_transparent() {
        let mut stack = Array3::from_elem((3, 2, 2), 10.0f32);
        stack[[1, 0, 1]] = -9999.0;
        let options = PreviewOptions {
            nodata: Some(-9999.0),
            clip_percentile: (0.0, 100.0),
            ..PreviewOptions::default()
        };
        let image = render_rgb(stack.view(), &options).unwrap();
        assert_eq!(image.get_pixel(1, 0).0[3], 0);
        assert_eq!(image.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn test_render_rgb_rejects_inverted_clip() {
        let stack = Array3::<f32>::zeros((3, 1, 1));
        let options = PreviewOptions {
            clip_percentile: (98.0, 2.0),
            ..PreviewOptions::default()
        };
        assert!(render_rgb(stack.view(), &options).is_err());
    }

    #[test]
    fn test_overlay_mask_blends_gray() {
        let preview = RgbaImage::from_pixel(2, 1, Rgba([100, 100, 100, 255]));
        let mask = arr2(&[[0.0f32, 1.0]]);
        let blended = overlay_mask(&preview, mask.view()).unwrap();
        assert_eq!(blended.get_pixel(0, 0).0, [50, 50, 50, 255]);
        assert_eq!(blended.get_pixel(1, 0).0, [178, 178, 178, 255]);
    }

    #[test]
    fn test_overlay_mask_rejects_mismatched_size() {
        let preview = RgbaImage::new(4, 4);
        let mask = Array2::<f32>::zeros((2, 2));
        assert!(overlay_mask(&preview, mask.view()).is_err());
    }
}
