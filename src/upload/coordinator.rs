//! Drives a sparse page blob upload: scan, seed the queue, run the pool.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::client::BlobClient;
use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::models::{padded_size, BlobLocation, ByteRange};
use crate::source::{ReadAt, SourceFile};

use super::queue::RangeQueue;
use super::scanner::scan_ranges;
use super::worker::{run_worker, FirstError, WorkerContext};

/// Outcome of a successful page upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    /// Size the page blob was created with.
    pub blob_size: u64,
    /// Ranges written.
    pub ranges: usize,
    /// Bytes sent across all ranges.
    pub bytes: u64,
}

/// Uploads the non-zero pages of a source into an existing page blob.
pub struct PageUploader {
    client: Arc<dyn BlobClient>,
    config: UploadConfig,
}

impl PageUploader {
    pub fn new(client: Arc<dyn BlobClient>, config: UploadConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Scans `source` and writes every non-zero range into the page blob at
    /// `location`, which must already be `padded_size(source.size())` long.
    pub async fn upload_source(
        &self,
        location: &BlobLocation,
        source: Arc<SourceFile>,
    ) -> UploadResult<UploadSummary> {
        self.config.validate()?;
        let size = source.size();
        let blob_size = padded_size(size, self.config.page_size);
        let page_size = self.config.page_size;
        let max_range_size = self.config.max_range_size;

        let scan_source = Arc::clone(&source);
        let ranges = tokio::task::spawn_blocking(move || {
            scan_ranges(scan_source.as_ref(), size, page_size, max_range_size)
        })
        .await
        .map_err(|e| UploadError::Worker(e.to_string()))??;

        let path = source.path().to_path_buf();
        self.upload_ranges(location, source, &path, ranges, blob_size)
            .await
    }

    /// Writes `ranges` of `source` with a pool of workers and waits for all of
    /// them. Returns the first error any worker reported.
    pub async fn upload_ranges<R>(
        &self,
        location: &BlobLocation,
        source: Arc<R>,
        source_path: &Path,
        ranges: Vec<ByteRange>,
        blob_size: u64,
    ) -> UploadResult<UploadSummary>
    where
        R: ReadAt + Send + Sync + 'static,
    {
        self.config.validate()?;
        let oversized = ranges
            .iter()
            .find(|r| r.length > self.config.max_range_size);
        if let Some(range) = oversized {
            return Err(UploadError::validation(format!(
                "range at offset {} is {} bytes, above the max range size {}",
                range.offset, range.length, self.config.max_range_size
            )));
        }

        let worker_count = self.config.worker_count();
        let bytes: u64 = ranges
            .iter()
            .filter_map(|r| r.clip_to(blob_size))
            .map(|r| r.length())
            .sum();

        info!(
            blob = %location,
            source = %source_path.display(),
            ranges = ranges.len(),
            bytes,
            workers = worker_count,
            "uploading non-zero page ranges"
        );

        let ctx = Arc::new(WorkerContext {
            client: Arc::clone(&self.client),
            location: location.clone(),
            source_path: source_path.to_path_buf(),
            blob_size,
            queue: RangeQueue::seed(&source, &ranges),
            errors: FirstError::new(),
            completed: AtomicUsize::new(0),
        });

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(run_worker(id, Arc::clone(&ctx)));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                ctx.errors.record(UploadError::Worker(e.to_string()));
            }
        }

        let completed = ctx.completed.load(Ordering::Acquire);
        if let Some(err) = ctx.errors.take() {
            error!(
                blob = %location,
                failures = ctx.errors.reported(),
                completed,
                "page upload failed"
            );
            return Err(err);
        }

        info!(blob = %location, completed, "page upload complete");
        Ok(UploadSummary {
            blob_size,
            ranges: ctx.queue.total(),
            bytes,
        })
    }
}
