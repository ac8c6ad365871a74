//! Decoding of interleaved raw rows into per-channel image planes.
//!
//! Each row holds one little-endian value per channel, in channel ordinal order.
//! Rows are in scan order, `scan_width` pixels per scan line.

use log::warn;
use ndarray::{Array2, Array3};
use winnow::{
    Parser,
    binary::{le_f32, le_f64},
    combinator::repeat,
    error::ContextError,
};

use crate::error::AcquisitionError;
use crate::types::image_stack::{ImageStack, Precision, Sample};
use crate::types::layout::{AcquisitionLayout, ValueWidth};
use crate::utils::source::ContainerSource;

/// Parses exactly `count` values of the given width.
fn parse_values<T: Sample>(
    input: &mut &[u8],
    width: ValueWidth,
    count: usize,
) -> Result<Vec<T>, ContextError> {
    match width {
        ValueWidth::F32 => repeat(count, le_f32.map(T::from_f32)).parse_next(input),
        ValueWidth::F64 => repeat(count, le_f64.map(T::from_f64)).parse_next(input),
    }
}

/// Read the raw rows of an acquisition. Never reads past the resolved range.
pub fn read_acquisition_buffer<S: ContainerSource + ?Sized>(
    source: &S,
    layout: &AcquisitionLayout,
) -> Result<Vec<u8>, AcquisitionError> {
    source
        .read_range(layout.byte_range())
        .map_err(|e| AcquisitionError::io(&layout.acquisition_id, e))
}

/// Decode raw bytes into a `(nrows, channel_count)` matrix.
pub fn decode_rows<T: Sample>(
    bytes: &[u8],
    layout: &AcquisitionLayout,
    allow_narrowing: bool,
) -> Result<Array2<T>, AcquisitionError> {
    let id = layout.acquisition_id.as_str();
    if T::PRECISION == Precision::F32 && layout.value_width == ValueWidth::F64 && !allow_narrowing
    {
        return Err(AcquisitionError::ImplicitNarrowing { id: id.to_string() });
    }
    if layout.nrows == 0 || layout.channel_count == 0 {
        return Err(AcquisitionError::Empty { id: id.to_string() });
    }
    if bytes.len() as u64 != layout.byte_len() {
        return Err(AcquisitionError::Decode {
            id: id.to_string(),
            message: format!(
                "expected {} bytes of row data, got {}",
                layout.byte_len(),
                bytes.len()
            ),
        });
    }

    let nrows = layout.nrows as usize;
    let mut input = bytes;
    let values = parse_values::<T>(&mut input, layout.value_width, nrows * layout.channel_count)
        .map_err(|e| AcquisitionError::Decode {
            id: id.to_string(),
            message: e.to_string(),
        })?;
    Array2::from_shape_vec((nrows, layout.channel_count), values).map_err(|e| {
        AcquisitionError::Decode {
            id: id.to_string(),
            message: e.to_string(),
        }
    })
}

/// Reshape decoded rows into a `[channel, height, width]` stack.
///
/// Without a scan width the stack is a single scan line of all rows. A trailing
/// incomplete scan line is dropped.
pub fn build_stack<T: Sample>(
    rows: &Array2<T>,
    scan_width: Option<u32>,
    acquisition_id: &str,
) -> Result<ImageStack<T>, AcquisitionError> {
    let (nrows, channels) = rows.dim();
    if nrows == 0 {
        return Err(AcquisitionError::Empty {
            id: acquisition_id.to_string(),
        });
    }
    let width = match scan_width {
        Some(w) if w > 0 => w as usize,
        _ => nrows,
    };
    let height = nrows / width;
    if height == 0 {
        return Err(AcquisitionError::Empty {
            id: acquisition_id.to_string(),
        });
    }
    if nrows % width != 0 {
        warn!(
            "Acquisition {acquisition_id}: dropping {} pixels of an incomplete scan line",
            nrows % width
        );
    }
    let data = Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        rows[[y * width + x, c]]
    });
    Ok(ImageStack::new(data))
}

/// Read, decode and reshape one acquisition.
pub fn decode_acquisition<T: Sample, S: ContainerSource + ?Sized>(
    source: &S,
    layout: &AcquisitionLayout,
    allow_narrowing: bool,
) -> Result<ImageStack<T>, AcquisitionError> {
    let bytes = read_acquisition_buffer(source, layout)?;
    let rows = decode_rows::<T>(&bytes, layout, allow_narrowing)?;
    build_stack(&rows, layout.scan_width, &layout.acquisition_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(width: ValueWidth, channels: usize, nrows: u64, scan_width: Option<u32>) -> AcquisitionLayout {
        let row_size = channels as u64 * width.bytes();
        AcquisitionLayout::builder()
            .acquisition_id("1")
            .data_offset_start(0)
            .data_offset_end(nrows * row_size)
            .value_width(width)
            .channel_count(channels)
            .row_size(row_size)
            .declared_rows(nrows)
            .nrows(nrows)
            .maybe_scan_width(scan_width)
            .build()
    }

    fn f32_bytes(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
        values.into_iter().flat_map(f32::to_le_bytes).collect()
    }

    #[test]
    fn rows_become_planes() {
        // 4 rows of 3 channels, scan width 2.
        let values = (0..12).map(|v| v as f32 * 1.5);
        let bytes = f32_bytes(values);
        let stack = decode_acquisition::<f32, _>(&bytes, &layout(ValueWidth::F32, 3, 4, Some(2)), false)
            .unwrap();
        let view = stack.view();
        assert_eq!(view.dim(), (3, 2, 2));
        // Pixel (y=1, x=0) is row 2; channel 1 of row 2 is value index 7.
        assert_eq!(view[[1, 1, 0]], 10.5);
        assert_eq!(view[[2, 1, 1]], 16.5);
    }

    #[test]
    fn narrowing_requires_opt_in() {
        let bytes: Vec<u8> = [0.1f64, 0.2].iter().flat_map(|v| v.to_le_bytes()).collect();
        let l = layout(ValueWidth::F64, 1, 2, Some(2));
        let err = decode_acquisition::<f32, _>(&bytes, &l, false).unwrap_err();
        assert!(matches!(err, AcquisitionError::ImplicitNarrowing { .. }));

        let narrowed = decode_acquisition::<f32, _>(&bytes, &l, true).unwrap();
        assert_eq!(narrowed.view()[[0, 0, 1]], 0.2f32);
        let exact = decode_acquisition::<f64, _>(&bytes, &l, false).unwrap();
        assert_eq!(exact.view()[[0, 0, 0]], 0.1f64);
    }

    #[test]
    fn widening_is_exact() {
        let bytes = f32_bytes([0.1f32, 3.3]);
        let stack = decode_acquisition::<f64, _>(&bytes, &layout(ValueWidth::F32, 2, 1, Some(1)), false)
            .unwrap();
        assert_eq!(stack.view()[[1, 0, 0]], f64::from(3.3f32));
    }

    #[test]
    fn missing_width_gives_a_single_scan_line() {
        let bytes = f32_bytes((0..5).map(|v| v as f32));
        let stack = decode_acquisition::<f32, _>(&bytes, &layout(ValueWidth::F32, 1, 5, None), false)
            .unwrap();
        assert_eq!(stack.view().dim(), (1, 1, 5));
    }

    #[test_log::test]
    fn incomplete_scan_line_is_dropped() {
        let bytes = f32_bytes((0..7).map(|v| v as f32));
        let stack = decode_acquisition::<f32, _>(&bytes, &layout(ValueWidth::F32, 1, 7, Some(3)), false)
            .unwrap();
        assert_eq!(stack.view().dim(), (1, 2, 3));
        assert_eq!(stack.view()[[0, 1, 2]], 5.0);

        let short = f32_bytes([1.0, 2.0]);
        let err = decode_acquisition::<f32, _>(&short, &layout(ValueWidth::F32, 1, 2, Some(3)), false)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Empty { .. }));
    }

    #[test]
    fn short_sources_are_io_errors() {
        let bytes = f32_bytes([1.0]);
        let err = decode_acquisition::<f32, _>(&bytes, &layout(ValueWidth::F32, 1, 2, None), false)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Io { .. }));
    }
}
