//! NumPy `.npy` (format version 1.0) writer for f32 arrays.

use std::io::{self, Write};

use ndarray::{ArrayView, Dimension};

const MAGIC: &[u8] = b"\x93NUMPY";
const VERSION: [u8; 2] = [1, 0];
/// The preamble (magic, version, header length, header) is padded to this.
const ALIGNMENT: usize = 64;

fn header(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape = match dims.as_slice() {
        [single] => format!("({},)", single),
        _ => format!("({})", dims.join(", ")),
    };
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape
    );

    let unpadded = MAGIC.len() + VERSION.len() + 2 + dict.len() + 1;
    let pad = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    format!("{}{}\n", dict, " ".repeat(pad))
}

/// Write `array` in logical (C) order regardless of its memory layout.
pub fn write_npy<W: Write, D: Dimension>(mut writer: W, array: ArrayView<'_, f32, D>) -> io::Result<()> {
    let header = header(array.shape());
    let header_len = u16::try_from(header.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "npy header too long"))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION)?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for value in array.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()
}

pub fn to_npy_bytes<D: Dimension>(array: ArrayView<'_, f32, D>) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(ALIGNMENT * 2 + array.len() * 4);
    write_npy(&mut bytes, array)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    fn split(bytes: &[u8]) -> (&str, &[u8]) {
        assert_eq!(&bytes[..6], MAGIC);
        assert_eq!(&bytes[6..8], &VERSION);
        let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let header = std::str::from_utf8(&bytes[10..10 + len]).unwrap();
        (header, &bytes[10 + len..])
    }

    #[test]
    fn test_header_describes_mask() {
        let mask = Array2::<f32>::zeros((512, 512));
        let bytes = to_npy_bytes(mask.view()).unwrap();
        let (header, data) = split(&bytes);

        assert!(header.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (512, 512), }"));
        assert!(header.ends_with('\n'));
        assert_eq!((10 + header.len()) % ALIGNMENT, 0);
        assert_eq!(data.len(), 512 * 512 * 4);
    }

    #[test]
    fn test_data_is_row_major_even_for_transposed_views() {
        let array = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]);
        let bytes = to_npy_bytes(array.t()).unwrap();
        let (header, data) = split(&bytes);
        assert!(header.contains("'shape': (2, 2)"));

        let values: Vec<f32> = data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_one_dimensional_shape_has_trailing_comma() {
        assert!(header(&[7]).contains("'shape': (7,)"));
    }
}
