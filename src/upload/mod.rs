//! Sparse page blob upload pipeline.
//!
//! A source is scanned page by page ([`scan_ranges`]), the non-zero ranges are
//! seeded into a closed [`RangeQueue`], and a pool of workers started by
//! [`PageUploader`] writes them concurrently. [`BlobUpload`] sits in front and
//! decides whether the pipeline runs at all.

mod coordinator;
mod dispatch;
mod queue;
mod scanner;
mod worker;

pub use coordinator::{PageUploader, UploadSummary};
pub use dispatch::{BlobUpload, UploadOutcome, BLOCK_SIZE, MAX_SINGLE_PUT_SIZE};
pub use queue::{RangeQueue, UploadUnit};
pub use scanner::scan_ranges;
pub use worker::FirstError;
