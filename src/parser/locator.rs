use std::io;
use std::ops::Range;

use log::debug;
use memchr::memmem;

use crate::config::LocatorConfig;
use crate::error::ContainerFormatError;
use crate::utils::source::ContainerSource;

/// Byte span of the metadata document, from the first byte of the start marker to
/// one past the last byte of the end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataSpan {
    pub start: u64,
    pub end: u64,
}

impl MetadataSpan {
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Locate the authoritative metadata document in a container.
///
/// The last start marker wins; earlier copies are stale. The document ends at the
/// first end marker after it.
pub fn locate_metadata<S: ContainerSource + ?Sized>(
    source: &S,
    config: &LocatorConfig,
) -> Result<MetadataSpan, ContainerFormatError> {
    let start_marker = config.encoding.encode(&config.start_marker);
    let end_marker = config.encoding.encode(&config.end_marker);
    let len = source.len();

    let Some(start) = rfind(source, &start_marker, len, config.block_size)? else {
        return Err(match rfind(source, &end_marker, len, config.block_size)? {
            Some(end) => ContainerFormatError::EndWithoutStart { end },
            None => ContainerFormatError::StartMarkerNotFound { len },
        });
    };
    let after_start = start + start_marker.len() as u64;
    let end = find(source, &end_marker, after_start, config.block_size)?
        .ok_or(ContainerFormatError::Unterminated { start })?;

    let span = MetadataSpan {
        start,
        end: end + end_marker.len() as u64,
    };
    debug!(
        "Located {} metadata document at bytes {}..{} of {len}",
        config.encoding.name(),
        span.start,
        span.end
    );
    Ok(span)
}

/// Read the bytes of a located document.
pub fn read_document<S: ContainerSource + ?Sized>(
    source: &S,
    span: MetadataSpan,
) -> io::Result<Vec<u8>> {
    source.read_range(span.range())
}

// Blocks overlap by `needle.len() - 1` bytes so an occurrence is never split.
fn block_len(block_size: usize, needle: &[u8]) -> u64 {
    block_size.max(needle.len() * 2) as u64
}

/// Last occurrence of `needle` ending at or before `before`.
fn rfind<S: ContainerSource + ?Sized>(
    source: &S,
    needle: &[u8],
    before: u64,
    block_size: usize,
) -> io::Result<Option<u64>> {
    if needle.is_empty() {
        return Ok(None);
    }
    let finder = memmem::FinderRev::new(needle);
    let block = block_len(block_size, needle);
    let overlap = needle.len() as u64 - 1;
    let mut buf = Vec::new();
    let mut end = before;
    while end >= needle.len() as u64 {
        let start = end.saturating_sub(block);
        buf.resize((end - start) as usize, 0);
        source.read_exact_at(start, &mut buf)?;
        if let Some(pos) = finder.rfind(&buf) {
            return Ok(Some(start + pos as u64));
        }
        if start == 0 {
            break;
        }
        end = start + overlap;
    }
    Ok(None)
}

/// First occurrence of `needle` starting at or after `from`.
fn find<S: ContainerSource + ?Sized>(
    source: &S,
    needle: &[u8],
    from: u64,
    block_size: usize,
) -> io::Result<Option<u64>> {
    if needle.is_empty() {
        return Ok(None);
    }
    let finder = memmem::Finder::new(needle);
    let block = block_len(block_size, needle);
    let overlap = needle.len() as u64 - 1;
    let len = source.len();
    let mut buf = Vec::new();
    let mut start = from;
    while start + needle.len() as u64 <= len {
        let end = (start + block).min(len);
        buf.resize((end - start) as usize, 0);
        source.read_exact_at(start, &mut buf)?;
        if let Some(pos) = finder.find(&buf) {
            return Ok(Some(start + pos as u64));
        }
        if end == len {
            break;
        }
        start = end - overlap;
    }
    Ok(None)
}
