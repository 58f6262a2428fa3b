//! Upload worker draining the range queue.

use bytes::Bytes;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::BlobClient;
use crate::error::{UploadError, UploadResult};
use crate::models::BlobLocation;
use crate::source::ReadAt;

use super::queue::{RangeQueue, UploadUnit};

/// Keeps the first error any worker reports and drops the rest.
#[derive(Debug, Default)]
pub struct FirstError {
    slot: Mutex<Option<UploadError>>,
    reported: AtomicUsize,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, err: UploadError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            warn!(error = %err, "discarding upload error, an earlier one is already recorded");
        }
    }

    /// Number of errors reported, including discarded ones.
    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }

    pub fn take(&self) -> Option<UploadError> {
        self.slot.lock().take()
    }
}

/// State shared by every worker of one upload.
pub struct WorkerContext<R> {
    pub client: Arc<dyn BlobClient>,
    pub location: BlobLocation,
    pub source_path: PathBuf,
    /// Size of the target blob; writes never extend past it.
    pub blob_size: u64,
    pub queue: RangeQueue<R>,
    pub errors: FirstError,
    /// Units that have signalled completion, successful or not.
    pub completed: AtomicUsize,
}

/// Takes units until the queue is empty. Each unit is counted as completed
/// exactly once, and a failed unit never stops the loop.
pub async fn run_worker<R>(id: usize, ctx: Arc<WorkerContext<R>>)
where
    R: ReadAt + Send + Sync + 'static,
{
    let mut handled = 0usize;
    while let Some(unit) = ctx.queue.pop() {
        if let Err(err) = upload_unit(&ctx, unit).await {
            ctx.errors.record(err);
        }
        ctx.completed.fetch_add(1, Ordering::AcqRel);
        handled += 1;
    }
    debug!(worker = id, handled, "upload worker finished");
}

async fn upload_unit<R>(ctx: &WorkerContext<R>, unit: UploadUnit<R>) -> UploadResult<()>
where
    R: ReadAt + Send + Sync + 'static,
{
    let offset = unit.range.offset;
    let range = unit.range.clip_to(ctx.blob_size).ok_or_else(|| {
        UploadError::validation(format!(
            "range at offset {} lies outside a blob of {} bytes",
            offset, ctx.blob_size
        ))
    })?;
    let size = range.length();

    let section = unit.section;
    let chunk = tokio::task::spawn_blocking(move || section.read_prefix(size))
        .await
        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))
        .map_err(|source| UploadError::RangeRead {
            path: ctx.source_path.clone(),
            offset,
            source,
        })?;

    debug!(start = range.start, end = range.end, "writing page range");
    ctx.client
        .write_range(&ctx.location, range, Bytes::from(chunk))
        .await
        .map_err(|source| UploadError::RangeWrite {
            path: ctx.source_path.clone(),
            offset,
            source,
        })
}
