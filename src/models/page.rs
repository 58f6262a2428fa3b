//! Page blob data models.

/// Alignment the service enforces on page blob sizes and page writes.
pub const PAGE_ALIGNMENT: u64 = 512;

/// Default page unit used to scan the source for non-zero content.
pub const DEFAULT_PAGE_SIZE: u64 = 4 * 1024;

/// Largest range a single Put Page call accepts.
pub const MAX_PAGE_RANGE_SIZE: u64 = 4 * 1024 * 1024; // 4 MiB per write operation

/// Largest page blob the service allows.
pub const MAX_PAGE_BLOB_SIZE: u64 = 8 * 1024 * 1024 * 1024 * 1024; // 8 TiB

/// Rounds `size` up to the next multiple of `page_size`.
pub fn padded_size(size: u64, page_size: u64) -> u64 {
    match size % page_size {
        0 => size,
        rem => size + (page_size - rem),
    }
}

/// A page-aligned region of the source that has to be transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Start byte offset.
    pub offset: u64,
    /// Number of bytes, a whole number of pages.
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Offset one past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Returns the inclusive page range to write, clipped so it never
    /// extends past the last byte of a blob of `blob_size` bytes.
    pub fn clip_to(&self, blob_size: u64) -> Option<PageRange> {
        if self.length == 0 || blob_size <= self.offset {
            return None;
        }
        let end = (self.end() - 1).min(blob_size - 1);
        Some(PageRange::new(self.offset, end))
    }
}

/// A range of pages in a page blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    /// Start byte offset (inclusive).
    pub start: u64,
    /// End byte offset (inclusive).
    pub end: u64,
}

impl PageRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns the length of this page range.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Formats the range the way the `x-ms-range` header expects.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}
