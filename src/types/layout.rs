use std::ops::Range;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Width of one stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueWidth {
    F32,
    F64,
}

impl ValueWidth {
    pub fn from_value_bytes(bytes: u64) -> Option<Self> {
        match bytes {
            4 => Some(Self::F32),
            8 => Some(Self::F64),
            _ => None,
        }
    }

    pub fn bytes(self) -> u64 {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// The declared range runs past the end of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncatedAcquisition {
    pub declared_rows: u64,
    pub available_rows: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionStatus {
    #[default]
    Complete,
    Partial(TruncatedAcquisition),
}

/// Validated location of one acquisition's raw rows inside the container.
///
/// `data_offset_end` is the declared end, normalised to be exclusive. For a
/// complete acquisition `data_offset_end - data_offset_start == nrows * row_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct AcquisitionLayout {
    #[builder(into)]
    pub acquisition_id: String,
    pub data_offset_start: u64,
    pub data_offset_end: u64,
    pub value_width: ValueWidth,
    pub channel_count: usize,
    /// Bytes per row: one value per channel.
    pub row_size: u64,
    pub declared_rows: u64,
    /// Rows that will actually be read. Lower than `declared_rows` when partial.
    pub nrows: u64,
    pub scan_width: Option<u32>,
    pub scan_height: Option<u32>,
    #[builder(default)]
    pub status: AcquisitionStatus,
}

impl AcquisitionLayout {
    /// Bytes that will be read, never past the end of the container.
    pub fn byte_range(&self) -> Range<u64> {
        self.data_offset_start..self.data_offset_start + self.nrows * self.row_size
    }

    pub fn byte_len(&self) -> u64 {
        self.nrows * self.row_size
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, AcquisitionStatus::Partial(_))
    }

    pub(crate) fn overlaps(&self, other: &AcquisitionLayout) -> bool {
        let (a, b) = (self.byte_range(), other.byte_range());
        !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(start: u64, nrows: u64) -> AcquisitionLayout {
        AcquisitionLayout::builder()
            .acquisition_id("1")
            .data_offset_start(start)
            .data_offset_end(start + nrows * 12)
            .value_width(ValueWidth::F32)
            .channel_count(3)
            .row_size(12)
            .declared_rows(nrows)
            .nrows(nrows)
            .build()
    }

    #[test]
    fn byte_range_covers_complete_rows() {
        let l = layout(16, 4);
        assert_eq!(l.byte_range(), 16..64);
        assert_eq!(l.byte_len(), 48);
        assert!(!l.is_partial());
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        assert!(!layout(16, 4).overlaps(&layout(64, 1)));
        assert!(layout(16, 4).overlaps(&layout(60, 1)));
        assert!(!layout(16, 4).overlaps(&layout(20, 0)));
    }

    #[test]
    fn value_widths() {
        assert_eq!(ValueWidth::from_value_bytes(4), Some(ValueWidth::F32));
        assert_eq!(ValueWidth::from_value_bytes(2), None);
        assert_eq!(ValueWidth::F64.bytes(), 8);
    }
}
