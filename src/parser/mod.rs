//! MCD container parsing functionality

pub mod locator;
pub mod metadata_parser;
pub mod offset_resolver;
pub mod row_decoder;

// Re-export the parsing functions
pub use locator::{MetadataSpan, locate_metadata, read_document};
pub use metadata_parser::{decode_document, parse_metadata};
pub use offset_resolver::{resolve_acquisition, resolve_all};
pub use row_decoder::{build_stack, decode_acquisition, decode_rows, read_acquisition_buffer};
