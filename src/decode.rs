//! Decode headerless raw sensor captures into sample grids.
//!
//! Thermal captures are `640x480` little-endian `u16` dumps,
//! PSII fluorescence frames are `1936x1216` `u8` dumps. The
//! NDVI/PRI sensors instead store a single ASCII-encoded
//! decimal value at a fixed byte range.

use std::{fs, io::ErrorKind, ops::Range, path::Path};

use ndarray::{s, Array2};

use crate::{
    error::{Error, Result},
    parse::parse_le_samples,
    sensor::{FrameLayout, SampleType},
};

/// Byte range of the ASCII value in NDVI/PRI captures.
pub const SPECTRAL_VALUE_RANGE: Range<usize> = 49..66;

/// A decoded capture, indexed `[row, col]`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFrame {
    U8(Array2<u8>),
    U16(Array2<u16>),
}

impl RawFrame {
    /// `(height, width)`
    pub fn dim(&self) -> (usize, usize) {
        match self {
            RawFrame::U8(a) => a.dim(),
            RawFrame::U16(a) => a.dim(),
        }
    }

    pub fn to_f64(&self) -> Array2<f64> {
        match self {
            RawFrame::U8(a) => a.mapv(f64::from),
            RawFrame::U16(a) => a.mapv(f64::from),
        }
    }

    pub fn into_u8(self) -> Result<Array2<u8>> {
        match self {
            RawFrame::U8(a) => Ok(a),
            RawFrame::U16(_) => Err(Error::Decode("expected 8-bit frame, found 16-bit".into())),
        }
    }

    /// Apply `turns` counter-clockwise quarter turns.
    pub fn rotated(self, turns: u8) -> Self {
        match self {
            RawFrame::U8(a) => RawFrame::U8(rotate_quarter_turns(&a, turns)),
            RawFrame::U16(a) => RawFrame::U16(rotate_quarter_turns(&a, turns)),
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

/// Read and decode the capture at `path`.
pub fn decode(path: &Path, layout: &FrameLayout) -> Result<RawFrame> {
    let bytes = read_file(path)?;
    decode_bytes(&bytes, layout).map_err(|e| with_path(e, path))
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::Decode(msg) => Error::Decode(format!("{}: {}", path.display(), msg)),
        other => other,
    }
}

/// Decode a capture already held in memory. The buffer must hold
/// exactly the header plus one frame.
pub fn decode_bytes(bytes: &[u8], layout: &FrameLayout) -> Result<RawFrame> {
    if bytes.len() != layout.byte_len() {
        let what = if bytes.len() < layout.byte_len() {
            "truncated"
        } else {
            "oversized"
        };
        return Err(Error::Decode(format!(
            "{} capture: expected {} bytes, found {}",
            what,
            layout.byte_len(),
            bytes.len()
        )));
    }
    let body = &bytes[layout.header_bytes..];
    let shape = (layout.height, layout.width);
    let count = layout.num_samples();
    let decode_err = |e: std::io::Error| Error::Decode(e.to_string());
    let shape_err = |e: ndarray::ShapeError| Error::Decode(e.to_string());

    Ok(match layout.sample {
        SampleType::U8 => {
            let samples = parse_le_samples::<u8>(body, count).map_err(decode_err)?;
            RawFrame::U8(Array2::from_shape_vec(shape, samples).map_err(shape_err)?)
        }
        SampleType::U16 => {
            let samples = parse_le_samples::<u16>(body, count).map_err(decode_err)?;
            RawFrame::U16(Array2::from_shape_vec(shape, samples).map_err(shape_err)?)
        }
    })
}

/// Read the ASCII decimal value stored at `range` (normally
/// [`SPECTRAL_VALUE_RANGE`]).
pub fn decode_spectral_value(path: &Path, range: Range<usize>) -> Result<f64> {
    let bytes = read_file(path)?;
    parse_spectral_value(&bytes, range).map_err(|e| with_path(e, path))
}

pub fn parse_spectral_value(bytes: &[u8], range: Range<usize>) -> Result<f64> {
    let field = bytes.get(range.clone()).ok_or_else(|| {
        Error::Decode(format!(
            "record too short for value at {:?}: {} bytes",
            range,
            bytes.len()
        ))
    })?;
    let text = std::str::from_utf8(field)
        .map_err(|e| Error::Decode(format!("value is not ASCII: {}", e)))?;
    text.trim()
        .parse()
        .map_err(|e| Error::Decode(format!("unparseable value {:?}: {}", text.trim(), e)))
}

/// Rotate by `turns` quarter turns counter-clockwise (same sense as
/// numpy's `rot90`). Three turns is a 90° clockwise rotation.
pub fn rotate_quarter_turns<T: Clone>(a: &Array2<T>, turns: u8) -> Array2<T> {
    match turns % 4 {
        0 => a.clone(),
        1 => a.t().slice(s![..;-1, ..]).to_owned(),
        2 => a.slice(s![..;-1, ..;-1]).to_owned(),
        _ => a.t().slice(s![.., ..;-1]).to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    fn encode_u16(grid: &Array2<u16>) -> Vec<u8> {
        grid.iter().flat_map(|v| v.to_le_bytes().to_vec()).collect()
    }

    #[test]
    fn decodes_what_was_encoded() {
        let layout = FrameLayout {
            width: 4,
            height: 3,
            sample: SampleType::U16,
            header_bytes: 0,
        };
        let grid = Array2::from_shape_fn((3, 4), |(r, c)| (r * 1000 + c * 7) as u16 + 300);
        let frame = decode_bytes(&encode_u16(&grid), &layout).unwrap();
        assert_eq!(frame, RawFrame::U16(grid));
    }

    #[test]
    fn header_is_skipped() {
        let layout = FrameLayout {
            width: 2,
            height: 2,
            sample: SampleType::U8,
            header_bytes: 3,
        };
        let bytes = [9, 9, 9, 1, 2, 3, 4];
        let frame = decode_bytes(&bytes, &layout).unwrap();
        assert_eq!(frame, RawFrame::U8(array![[1, 2], [3, 4]]));
    }

    #[test]
    fn truncated_capture_is_a_decode_error() {
        let bytes = vec![0u8; FrameLayout::THERMAL.byte_len() - 1];
        let err = decode_bytes(&bytes, &FrameLayout::THERMAL).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn capture_of_another_resolution_is_rejected() {
        let bytes = vec![0u8; 640 * 512 * 2];
        match decode_bytes(&bytes, &FrameLayout::THERMAL) {
            Err(Error::Decode(msg)) => assert!(msg.starts_with("oversized"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
        let one_extra = vec![0u8; FrameLayout::THERMAL.byte_len() + 1];
        assert!(decode_bytes(&one_extra, &FrameLayout::THERMAL).is_err());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = decode(Path::new("/nonexistent/abc_ir.bin"), &FrameLayout::THERMAL).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn decodes_full_thermal_frame_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let grid = Array2::from_elem((480, 640), 500u16);
        file.write_all(&encode_u16(&grid)).unwrap();
        let frame = decode(file.path(), &FrameLayout::THERMAL).unwrap();
        assert_eq!(frame.dim(), (480, 640));
        assert_eq!(frame.to_f64()[(479, 639)], 500.);
    }

    #[test]
    fn rotations_match_rot90() {
        let a = array![[1, 2, 3], [4, 5, 6]];
        assert_eq!(rotate_quarter_turns(&a, 1), array![[3, 6], [2, 5], [1, 4]]);
        assert_eq!(rotate_quarter_turns(&a, 2), array![[6, 5, 4], [3, 2, 1]]);
        assert_eq!(rotate_quarter_turns(&a, 3), array![[4, 1], [5, 2], [6, 3]]);
        assert_eq!(rotate_quarter_turns(&a, 4), a);
    }

    #[test]
    fn spectral_value_at_fixed_offset() {
        let mut bytes = vec![b'x'; 49];
        bytes.extend_from_slice(b"   0.734215000000");
        bytes.extend_from_slice(b"trailing");
        assert_eq!(bytes[49..66].len(), 17);
        let v = parse_spectral_value(&bytes, SPECTRAL_VALUE_RANGE).unwrap();
        assert!((v - 0.734215).abs() < 1e-12);
    }

    #[test]
    fn unparseable_spectral_value() {
        let mut bytes = vec![b' '; 49];
        bytes.extend_from_slice(b"not-a-number-here");
        let err = parse_spectral_value(&bytes, SPECTRAL_VALUE_RANGE).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(parse_spectral_value(b"short", SPECTRAL_VALUE_RANGE).is_err());
    }
}
