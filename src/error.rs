//! Error taxonomy for container opening, acquisition decoding and channel access.
//!
//! Container-level errors ([`ContainerFormatError`], [`MetadataParseError`]) abort
//! opening a file. [`AcquisitionError`] only ever concerns a single acquisition, and
//! [`ChannelError`] a single façade request.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::types::entities::EntityKind;

/// The embedded metadata document could not be located.
#[derive(Debug, Error)]
pub enum ContainerFormatError {
    #[error("metadata start marker not found in a container of {len} bytes")]
    StartMarkerNotFound { len: u64 },
    #[error("metadata end marker at byte {end} has no preceding start marker")]
    EndWithoutStart { end: u64 },
    #[error("metadata start marker at byte {start} is not followed by an end marker")]
    Unterminated { start: u64 },
    #[error("I/O error while scanning container: {0}")]
    Io(#[from] io::Error),
}

/// The located metadata document is not a well-formed document.
#[derive(Debug, Error)]
pub enum MetadataParseError {
    #[error("metadata document is not valid {encoding} text")]
    Encoding { encoding: &'static str },
    #[error("malformed metadata XML near byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("metadata document ended with {open} unclosed element(s)")]
    UnexpectedEof { open: usize },
    #[error("metadata document has no root element")]
    NoRoot,
}

/// A cross reference between metadata entities that does not resolve.
///
/// These are collected while the graph is built and reported as warnings; the
/// referencing entity stays in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ReferenceError {
    pub from: EntityKind,
    pub from_id: String,
    pub target: EntityKind,
    /// `None` when the referencing entity does not name a target at all.
    pub target_id: Option<String>,
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target_id {
            Some(target_id) => write!(
                f,
                "{} {} references missing {} {}",
                self.from, self.from_id, self.target, target_id
            ),
            None => write!(
                f,
                "{} {} has no {} reference",
                self.from, self.from_id, self.target
            ),
        }
    }
}

/// Why an acquisition's data range was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptReason {
    MissingField(&'static str),
    InvertedRange { start: u64, end: u64 },
    RowSizeMismatch { span: u64, row_size: u64 },
    UnsupportedValueBytes(u64),
    ChannelOrdinals(String),
    Overlap { other: String },
}

impl fmt::Display for CorruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing or unreadable {field}"),
            Self::InvertedRange { start, end } => {
                write!(f, "data range ends at {end} before it starts at {start}")
            }
            Self::RowSizeMismatch { span, row_size } => write!(
                f,
                "row size of {row_size} bytes does not divide the {span} byte data span"
            ),
            Self::UnsupportedValueBytes(n) => write!(f, "unsupported value width of {n} bytes"),
            Self::ChannelOrdinals(detail) => write!(f, "channel ordinals are unusable: {detail}"),
            Self::Overlap { other } => write!(f, "data range overlaps acquisition {other}"),
        }
    }
}

/// Failure affecting exactly one acquisition. Sibling acquisitions stay readable.
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    #[error("acquisition {0} is not declared in the metadata")]
    Unknown(String),
    #[error("corrupt acquisition {id}: {reason}")]
    Corrupt { id: String, reason: CorruptReason },
    #[error("acquisition {id} is empty")]
    Empty { id: String },
    #[error("acquisition {id} stores 64-bit values; decoding to 32-bit requires allow_narrowing")]
    ImplicitNarrowing { id: String },
    #[error("could not decode rows of acquisition {id}: {message}")]
    Decode { id: String, message: String },
    #[error("I/O error while reading acquisition {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: Arc<io::Error>,
    },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl AcquisitionError {
    pub(crate) fn corrupt(id: &str, reason: CorruptReason) -> Self {
        Self::Corrupt {
            id: id.to_string(),
            reason,
        }
    }

    pub(crate) fn io(id: &str, source: io::Error) -> Self {
        Self::Io {
            id: id.to_string(),
            source: Arc::new(source),
        }
    }

    /// True for the `CorruptAcquisitionError` class of failures.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// A channel lookup key, used in [`ChannelError::NotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelQuery {
    Index(usize),
    Label(String),
    Metal(String),
}

impl fmt::Display for ChannelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "index {i}"),
            Self::Label(label) => write!(f, "label {label:?}"),
            Self::Metal(metal) => write!(f, "metal {metal:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(
        "channel metadata mismatch: {labels} labels, {masses} masses, {metals} metals for {planes} planes"
    )]
    MetadataMismatch {
        labels: usize,
        masses: usize,
        metals: usize,
        planes: usize,
    },
    #[error("no channel with {0}")]
    NotFound(ChannelQuery),
    #[error("{query} matches channels {indices:?}")]
    Ambiguous {
        query: ChannelQuery,
        indices: Vec<usize>,
    },
}

/// Errors of the OME-TIFF and delimited-text adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid OME-XML: {0}")]
    OmeXml(String),
    #[error("invalid IMC text data: {0}")]
    InvalidText(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("page {page} is {found:?} pixels but the first page is {expected:?}")]
    InconsistentPages {
        page: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("image stores 64-bit values; decoding to 32-bit requires allow_narrowing")]
    ImplicitNarrowing,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Crate-level error wrapping every component error.
#[derive(Debug, Error)]
pub enum McdError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    ContainerFormat(#[from] ContainerFormatError),
    #[error(transparent)]
    MetadataParse(#[from] MetadataParseError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("table error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
    #[error("{kind} {id} is not declared in the metadata")]
    UnknownEntity { kind: EntityKind, id: String },
    #[error("{kind} {id} declares an image offset beyond the addressable range")]
    ImageOffsetOverflow { kind: EntityKind, id: String },
}

pub type Result<T, E = McdError> = std::result::Result<T, E>;
