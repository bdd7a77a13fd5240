#![allow(dead_code)]

use std::fs::File;
use std::path::Path;

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::TiffEncoder;
use tiff::tags::{PhotometricInterpretation, SampleFormat, Tag};

pub const BOUNDARY: &str = "raster-seg-test-boundary";

/// Write a float raster with one page per band.
pub fn write_raster(path: &Path, bands: &[Vec<f32>], width: u32, height: u32) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    for band in bands {
        encoder
            .write_image::<colortype::Gray32Float>(width, height, band)
            .unwrap();
    }
}

/// Ten f32 samples per pixel, MinIsBlack: the layout GDAL writes for a
/// multiband GTiff by default.
pub struct TenBandFloat;

impl ColorType for TenBandFloat {
    type Inner = f32;
    const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
    const BITS_PER_SAMPLE: &'static [u16] = &[32; 10];
    const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::IEEEFP; 10];

    fn horizontal_predict(_: &[f32], _: &mut Vec<f32>) {
        unreachable!()
    }
}

/// Write ten bands as a single pixel-interleaved image with nine extra samples.
pub fn write_interleaved_raster(path: &Path, bands: &[Vec<f32>], width: u32, height: u32) {
    assert_eq!(bands.len(), 10);
    let pixels = (width * height) as usize;
    let interleaved: Vec<f32> = (0..pixels)
        .flat_map(|px| bands.iter().map(move |band| band[px]))
        .collect();

    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<TenBandFloat>(width, height).unwrap();
    image
        .encoder()
        .write_tag(Tag::ExtraSamples, &[0u16; 9][..])
        .unwrap();
    image.write_data(&interleaved).unwrap();
}

/// `count` bands of `width x height` pixels, all holding `value`.
pub fn constant_raster(path: &Path, count: usize, width: u32, height: u32, value: f32) {
    let bands = vec![vec![value; (width * height) as usize]; count];
    write_raster(path, &bands, width, height);
}

/// Multipart body with one field; `filename: None` sends a plain form field.
pub fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = format!("--{}\r\n", BOUNDARY).into_bytes();
    let disposition = match filename {
        Some(filename) => format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        ),
        None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
    };
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Header length and payload of an `.npy` buffer.
pub fn npy_payload(bytes: &[u8]) -> (&str, Vec<f32>) {
    assert_eq!(&bytes[..6], b"\x93NUMPY");
    let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let header = std::str::from_utf8(&bytes[10..10 + len]).unwrap();
    let values = bytes[10 + len..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    (header, values)
}
