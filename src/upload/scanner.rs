//! Splits a source into the page-aligned ranges that hold non-zero data.

use tracing::debug;

use crate::error::{UploadError, UploadResult};
use crate::models::{padded_size, ByteRange};
use crate::source::ReadAt;

/// Scans `source` one page at a time and returns the ranges that contain at
/// least one non-zero byte, merged up to `max_range_size` each.
///
/// The source is treated as `padded_size(size, page_size)` bytes long; the
/// tail past `size` reads as zero. Ranges come back disjoint, page aligned and
/// in ascending offset order.
pub fn scan_ranges<R: ReadAt + ?Sized>(
    source: &R,
    size: u64,
    page_size: u64,
    max_range_size: u64,
) -> UploadResult<Vec<ByteRange>> {
    if page_size == 0 || max_range_size < page_size {
        return Err(UploadError::validation(format!(
            "max range size {} must hold at least one page of {} bytes",
            max_range_size, page_size
        )));
    }
    let blob_size = padded_size(size, page_size);

    let mut ranges = Vec::new();
    let mut current = ByteRange::new(0, 0);
    let mut page = vec![0u8; page_size as usize];

    let mut offset = 0;
    while offset < blob_size {
        source
            .read_padded_at(&mut page, offset)
            .map_err(|source| UploadError::ScanRead { offset, source })?;

        if page.iter().all(|&b| b == 0) {
            if current.length != 0 {
                ranges.push(current);
            }
            current = ByteRange::new(offset + page_size, 0);
        } else {
            current.length += page_size;
            // The next page would not fit under the ceiling.
            if current.length + page_size > max_range_size || current.end() == blob_size {
                ranges.push(current);
                current = ByteRange::new(offset + page_size, 0);
            }
        }

        offset += page_size;
    }

    debug!(
        size,
        blob_size,
        ranges = ranges.len(),
        "scanned source for non-zero pages"
    );

    Ok(ranges)
}
