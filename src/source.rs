//! Random-access views over the local source file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{UploadError, UploadResult};

/// Positional reads that never move a shared cursor.
pub trait ReadAt {
    /// Reads up to `buf.len()` bytes at `offset`, returning the count read.
    /// A return of `0` for a non-empty buffer means end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Fills `buf` from `offset`, leaving whatever lies past end of file as
    /// zero. Returns the number of bytes that came from the source.
    fn read_padded_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf[filled..].fill(0);
        Ok(filled)
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = match usize::try_from(offset) {
            Ok(start) if start < self.len() => start,
            _ => return Ok(0),
        };
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

/// An open source file together with its size at open time.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    file: File,
    size: u64,
}

impl SourceFile {
    /// Opens `path` for random reads and records its size.
    pub fn open(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| UploadError::OpenSource {
            path: path.clone(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| UploadError::StatSource {
                path: path.clone(),
                source,
            })?
            .len();

        Ok(Self { path, file, size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl ReadAt for SourceFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }
}

/// A lazy window of `len` bytes starting at `offset` over a shared source.
#[derive(Debug)]
pub struct SectionView<R: ?Sized> {
    source: Arc<R>,
    offset: u64,
    len: u64,
}

impl<R: ?Sized> Clone for SectionView<R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            offset: self.offset,
            len: self.len,
        }
    }
}

impl<R: ReadAt + ?Sized> SectionView<R> {
    pub fn new(source: Arc<R>, offset: u64, len: u64) -> Self {
        Self {
            source,
            offset,
            len,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the first `size` bytes of the view. Bytes past the end of the
    /// underlying source are returned as zero.
    pub fn read_prefix(&self, size: u64) -> io::Result<Vec<u8>> {
        let size = size.min(self.len);
        let mut buf = vec![0u8; size as usize];
        self.source.read_padded_at(&mut buf, self.offset)?;
        Ok(buf)
    }
}
