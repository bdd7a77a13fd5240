//! GeoTIFF reading.
//!
//! A dataset is decoded in full into a band-major `(bands, height, width)` f32
//! array. Bands come either from the samples of a single image (chunky layout,
//! the usual multispectral GeoTIFF) or from one single-sample page per band.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{s, stack, Array2, Array3, ArrayView3, Axis};
use num_traits::AsPrimitive;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::{PlanarConfiguration, Tag};
use tracing::debug;

use crate::errors::{RasterSegError, Result};

/// Affine pixel → world transform, coefficients in GDAL/rasterio `Affine` order:
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Transform of a window whose top-left pixel is `(col_off, row_off)`.
    pub fn for_window(&self, col_off: usize, row_off: usize) -> Self {
        let (c, f) = self.apply(col_off as f64, row_off as f64);
        Self { c, f, ..*self }
    }

    /// From the GeoTIFF `ModelTransformationTag` (4x4 row-major matrix).
    fn from_model_transformation(m: &[f64]) -> Option<Self> {
        (m.len() >= 8).then(|| Self {
            a: m[0],
            b: m[1],
            c: m[3],
            d: m[4],
            e: m[5],
            f: m[7],
        })
    }

    /// From `ModelPixelScaleTag` `(sx, sy, sz)` and the first
    /// `ModelTiepointTag` `(i, j, k, x, y, z)`.
    fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let (sx, sy) = (scale[0], scale[1]);
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Some(Self {
            a: sx,
            b: 0.0,
            c: x - i * sx,
            d: 0.0,
            e: -sy,
            f: y + j * sy,
        })
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta {
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub nodata: Option<f64>,
    pub transform: GeoTransform,
}

/// Pixel window `(px, py, w, h)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub const fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }
}

pub struct RasterDataset {
    meta: RasterMeta,
    data: Array3<f32>,
}

impl RasterDataset {
    pub fn open(path: &Path) -> Result<Self> {
        let shown = path.display().to_string();
        let decode_err = |e: tiff::TiffError| RasterSegError::decode(shown.as_str(), e);

        let file = File::open(path).map_err(|e| RasterSegError::decode(shown.as_str(), e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(decode_err)?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(decode_err)?;
        let (width, height) = (width as usize, height as usize);
        let nodata = read_nodata(&mut decoder).map_err(decode_err)?;
        let transform = read_transform(&mut decoder).map_err(decode_err)?;
        let samples = decoder
            .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)
            .map_err(decode_err)?
            .unwrap_or(1) as usize;
        let planar = decoder
            .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
            .map_err(decode_err)?
            .unwrap_or(PlanarConfiguration::Chunky.to_u16());
        if samples > 1 && planar == PlanarConfiguration::Planar.to_u16() {
            // the decoder only returns the first plane of a band-separate image
            return Err(RasterSegError::decode(
                shown.as_str(),
                "band-separate (planar) sample layout is not supported",
            ));
        }
        let colortype = decoder.colortype().ok();
        debug!(path = %shown, samples, ?colortype, "decoding raster");

        let first = samples_to_f32(decoder.read_image().map_err(decode_err)?);

        let bands = if samples > 1 {
            deinterleave(first, samples, height, width)
                .map_err(|e| RasterSegError::decode(shown.as_str(), e))?
        } else {
            let mut bands = vec![Array2::from_shape_vec((height, width), first)
                .map_err(|e| RasterSegError::decode(shown.as_str(), e))?];
            while decoder.more_images() {
                decoder.next_image().map_err(decode_err)?;
                let dims = decoder.dimensions().map_err(decode_err)?;
                if dims != (width as u32, height as u32) {
                    // reduced-resolution overviews follow the full-size bands
                    debug!(path = %shown, page = bands.len(), ?dims, "skipping overview pages");
                    break;
                }
                let page = samples_to_f32(decoder.read_image().map_err(decode_err)?);
                bands.push(
                    Array2::from_shape_vec((height, width), page)
                        .map_err(|e| RasterSegError::decode(shown.as_str(), e))?,
                );
            }
            bands
        };

        let views: Vec<_> = bands.iter().map(|band| band.view()).collect();
        let data = stack(Axis(0), &views).map_err(|e| RasterSegError::decode(shown.as_str(), e))?;

        let meta = RasterMeta {
            width,
            height,
            count: data.len_of(Axis(0)),
            nodata,
            transform,
        };
        debug!(path = %shown, ?meta, "raster opened");

        Ok(Self { meta, data })
    }

    pub fn meta(&self) -> &RasterMeta {
        &self.meta
    }

    /// All bands, band-major.
    pub fn read(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// Read 1-based `bands` (all when `None`) over `crop` (whole raster when `None`).
    ///
    /// The crop's width and height are shrunk to fit the dataset; the offset must lie
    /// inside it. The returned metadata describes the cropped array.
    pub fn read_crop(
        &self,
        crop: Option<Window>,
        bands: Option<&[usize]>,
    ) -> Result<(Array3<f32>, RasterMeta)> {
        let all: Vec<usize> = (1..=self.meta.count).collect();
        let bands = bands.unwrap_or(&all);
        if let Some(&band) = bands.iter().find(|&&b| b == 0 || b > self.meta.count) {
            return Err(RasterSegError::validation(
                "bands",
                &format!(
                    "band {} out of range for a {}-band raster",
                    band, self.meta.count
                ),
            ));
        }

        let window = match crop {
            Some(window) => clamp_window(window, self.meta.width, self.meta.height)?,
            None => Window::new(0, 0, self.meta.width, self.meta.height),
        };

        let indices: Vec<usize> = bands.iter().map(|b| b - 1).collect();
        let selected = self.data.select(Axis(0), &indices);
        let cropped = selected
            .slice(s![
                ..,
                window.row_off..window.row_off + window.height,
                window.col_off..window.col_off + window.width
            ])
            .to_owned();

        let meta = RasterMeta {
            width: window.width,
            height: window.height,
            count: bands.len(),
            nodata: self.meta.nodata,
            transform: self.meta.transform.for_window(window.col_off, window.row_off),
        };
        Ok((cropped, meta))
    }
}

fn clamp_window(window: Window, width: usize, height: usize) -> Result<Window> {
    if window.col_off >= width || window.row_off >= height {
        return Err(RasterSegError::validation(
            "crop",
            &format!(
                "crop offset ({}, {}) lies outside a {}x{} raster",
                window.col_off, window.row_off, width, height
            ),
        ));
    }
    Ok(Window {
        width: window.width.min(width - window.col_off),
        height: window.height.min(height - window.row_off),
        ..window
    })
}

fn read_nodata<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<Option<f64>> {
    let Some(value) = decoder.find_tag(Tag::GdalNodata)? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    Ok(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<GeoTransform> {
    if let Some(matrix) = decoder.find_tag(Tag::ModelTransformationTag)? {
        if let Some(transform) = GeoTransform::from_model_transformation(&matrix.into_f64_vec()?)
        {
            return Ok(transform);
        }
    }
    let scale = decoder.find_tag(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.find_tag(Tag::ModelTiepointTag)?;
    Ok(match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) => GeoTransform::from_scale_and_tiepoint(
            &scale.into_f64_vec()?,
            &tiepoint.into_f64_vec()?,
        )
        .unwrap_or_default(),
        _ => GeoTransform::IDENTITY,
    })
}

fn cast_all<T: AsPrimitive<f32>>(values: Vec<T>) -> Vec<f32> {
    values.into_iter().map(AsPrimitive::as_).collect()
}

fn samples_to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(v) => cast_all(v),
        DecodingResult::U16(v) => cast_all(v),
        DecodingResult::U32(v) => cast_all(v),
        DecodingResult::U64(v) => cast_all(v),
        DecodingResult::I8(v) => cast_all(v),
        DecodingResult::I16(v) => cast_all(v),
        DecodingResult::I32(v) => cast_all(v),
        DecodingResult::I64(v) => cast_all(v),
        DecodingResult::F16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => cast_all(v),
    }
}

/// Split pixel-interleaved samples into one `(height, width)` array per band.
pub fn deinterleave(
    samples: Vec<f32>,
    bands: usize,
    height: usize,
    width: usize,
) -> std::result::Result<Vec<Array2<f32>>, ndarray::ShapeError> {
    let pixels = Array3::from_shape_vec((height, width, bands), samples)?;
    Ok(pixels
        .axis_iter(Axis(2))
        .map(|band| band.to_owned())
        .collect())
}
