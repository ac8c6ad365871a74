//! Positioned byte access to a container.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use memmap2::Mmap;
use parking_lot::Mutex;

/// Random access to the bytes of a container without a shared cursor.
///
/// Reads never go past [`ContainerSource::len`]; a request that would fails with
/// [`io::ErrorKind::UnexpectedEof`] instead of returning a short buffer.
pub trait ContainerSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from the bytes starting at `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let len = range
            .end
            .checked_sub(range.start)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "inverted byte range"))?;
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "byte range too large"))?;
        let mut buf = vec![0; len];
        self.read_exact_at(range.start, &mut buf)?;
        Ok(buf)
    }
}

fn out_of_bounds(offset: u64, wanted: usize, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {wanted} bytes at {offset} runs past the end of a {len} byte container"),
    )
}

impl ContainerSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let slice = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .and_then(|range| self.get(range))
            .ok_or_else(|| out_of_bounds(offset, buf.len(), ContainerSource::len(self)))?;
        buf.copy_from_slice(slice);
        Ok(())
    }
}

impl ContainerSource for Vec<u8> {
    fn len(&self) -> u64 {
        ContainerSource::len(self.as_slice())
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.as_slice().read_exact_at(offset, buf)
    }
}

impl ContainerSource for Mmap {
    fn len(&self) -> u64 {
        ContainerSource::len(&self[..])
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self[..].read_exact_at(offset, buf)
    }
}

impl<S: ContainerSource + ?Sized> ContainerSource for &S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

/// A seekable reader shared behind a mutex. Each seek and read pair happens under
/// the lock, so concurrent reads never observe each other's cursor.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: Mutex<R>,
    len: u64,
}

impl<R: Read + Seek + Send> ReaderSource<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader: Mutex::new(reader),
            len,
        })
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read + Seek + Send> ContainerSource for ReaderSource<R> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if offset.saturating_add(buf.len() as u64) > self.len {
            return Err(out_of_bounds(offset, buf.len(), self.len));
        }
        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)
    }
}

/// Memory map a container file.
pub fn read_binary_file_mmap(path: impl AsRef<Path>) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // Safety: the container is treated as read-only for the lifetime of the map
    unsafe { Mmap::map(&file) }
}
