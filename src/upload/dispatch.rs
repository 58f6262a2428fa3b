//! Entry point that picks the creation path for a blob.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::client::BlobClient;
use crate::config::UploadConfig;
use crate::error::{StorageError, UploadError, UploadResult};
use crate::models::{
    padded_size, BlobLocation, BlobProperties, BlobType, CopyStatus, MAX_PAGE_BLOB_SIZE,
    PAGE_ALIGNMENT,
};
use crate::source::SourceFile;

use super::coordinator::{PageUploader, UploadSummary};

/// Files up to this size are sent as a single Put Blob.
pub const MAX_SINGLE_PUT_SIZE: u64 = 256 * 1024 * 1024;

/// Block size used when a block blob is staged in pieces.
pub const BLOCK_SIZE: u64 = 100 * 1024 * 1024;

/// What the caller wants to end up in storage.
#[derive(Debug, Clone, Default)]
pub struct BlobUpload {
    pub location: BlobLocation,
    /// `block` or `page`, case-insensitive.
    pub blob_type: String,
    pub properties: BlobProperties,
    /// Explicit size for an empty page blob; `0` means unset.
    pub size: u64,
    /// Local file to upload.
    pub source: Option<PathBuf>,
    /// Blob URL to copy from; takes precedence over everything else.
    pub source_uri: Option<String>,
}

/// Which path [`BlobUpload::create`] took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Copied { copy_id: String },
    CreatedEmpty { blob_type: BlobType, size: u64 },
    UploadedBlock { bytes: u64, blocks: usize },
    UploadedPages(UploadSummary),
}

impl BlobUpload {
    /// Validates the request and creates the blob through `client`.
    ///
    /// Every validation failure is returned before the first remote call.
    pub async fn create(
        &self,
        client: Arc<dyn BlobClient>,
        config: &UploadConfig,
    ) -> UploadResult<UploadOutcome> {
        if let Some(source_uri) = self.source_uri.as_deref().filter(|s| !s.is_empty()) {
            return self.copy(client.as_ref(), source_uri, config).await;
        }

        let blob_type: BlobType = self.blob_type.parse()?;
        match (blob_type, self.source.as_deref()) {
            (BlobType::BlockBlob, None) => self.create_empty_block_blob(client.as_ref()).await,
            (BlobType::BlockBlob, Some(source)) => {
                self.upload_block_blob(client.as_ref(), source).await
            }
            (BlobType::PageBlob, None) => self.create_empty_page_blob(client.as_ref()).await,
            (BlobType::PageBlob, Some(source)) => {
                self.upload_page_blob(client, source, config).await
            }
        }
    }

    fn storage_error(&self, operation: &'static str, source: StorageError) -> UploadError {
        UploadError::Storage {
            operation,
            blob: self.location.to_string(),
            source,
        }
    }

    async fn copy(
        &self,
        client: &dyn BlobClient,
        source_uri: &str,
        config: &UploadConfig,
    ) -> UploadResult<UploadOutcome> {
        info!(blob = %self.location, source = source_uri, "starting server-side copy");
        let mut state = client
            .start_copy(&self.location, source_uri, &self.properties.metadata)
            .await
            .map_err(|e| self.storage_error("copy", e))?;

        while state.status == CopyStatus::Pending {
            debug!(copy_id = %state.copy_id, "copy pending");
            tokio::time::sleep(config.copy_poll_interval).await;
            state = client
                .copy_status(&self.location)
                .await
                .map_err(|e| self.storage_error("copy status", e))?;
        }

        if state.status != CopyStatus::Success {
            return Err(self.storage_error(
                "copy",
                StorageError::CopyFailed {
                    copy_id: state.copy_id,
                    status: state.status.as_str().to_string(),
                    description: state.description.unwrap_or_default(),
                },
            ));
        }

        info!(blob = %self.location, copy_id = %state.copy_id, "copy complete");
        Ok(UploadOutcome::Copied {
            copy_id: state.copy_id,
        })
    }

    async fn create_empty_block_blob(&self, client: &dyn BlobClient) -> UploadResult<UploadOutcome> {
        if self.size != 0 {
            warn!(size = self.size, "size is ignored for block blobs");
        }
        client
            .put_block_blob(&self.location, Bytes::new(), &self.properties)
            .await
            .map_err(|e| self.storage_error("put block blob", e))?;

        Ok(UploadOutcome::CreatedEmpty {
            blob_type: BlobType::BlockBlob,
            size: 0,
        })
    }

    async fn upload_block_blob(
        &self,
        client: &dyn BlobClient,
        source: &Path,
    ) -> UploadResult<UploadOutcome> {
        let mut file = tokio::fs::File::open(source)
            .await
            .map_err(|e| UploadError::OpenSource {
                path: source.to_path_buf(),
                source: e,
            })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| UploadError::StatSource {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();

        if size <= MAX_SINGLE_PUT_SIZE {
            let mut content = Vec::with_capacity(size as usize);
            file.read_to_end(&mut content)
                .await
                .map_err(|e| UploadError::RangeRead {
                    path: source.to_path_buf(),
                    offset: 0,
                    source: e,
                })?;
            let bytes = content.len() as u64;
            client
                .put_block_blob(&self.location, Bytes::from(content), &self.properties)
                .await
                .map_err(|e| self.storage_error("put block blob", e))?;
            info!(blob = %self.location, bytes, "uploaded block blob");
            return Ok(UploadOutcome::UploadedBlock { bytes, blocks: 0 });
        }

        let mut block_ids = Vec::new();
        let mut offset = 0u64;
        while offset < size {
            let len = BLOCK_SIZE.min(size - offset);
            let mut chunk = vec![0u8; len as usize];
            file.read_exact(&mut chunk)
                .await
                .map_err(|e| UploadError::RangeRead {
                    path: source.to_path_buf(),
                    offset,
                    source: e,
                })?;

            let block_id = block_id(block_ids.len());
            client
                .put_block(&self.location, &block_id, Bytes::from(chunk))
                .await
                .map_err(|e| UploadError::RangeWrite {
                    path: source.to_path_buf(),
                    offset,
                    source: e,
                })?;
            debug!(offset, len, "staged block");
            block_ids.push(block_id);
            offset += len;
        }

        client
            .put_block_list(&self.location, &block_ids, &self.properties)
            .await
            .map_err(|e| self.storage_error("put block list", e))?;
        info!(blob = %self.location, bytes = size, blocks = block_ids.len(), "uploaded block blob");

        Ok(UploadOutcome::UploadedBlock {
            bytes: size,
            blocks: block_ids.len(),
        })
    }

    async fn create_empty_page_blob(&self, client: &dyn BlobClient) -> UploadResult<UploadOutcome> {
        if self.size == 0 {
            return Err(UploadError::validation("`size` cannot be zero for a page blob"));
        }
        if self.size % PAGE_ALIGNMENT != 0 {
            return Err(UploadError::validation(format!(
                "`size` must be a multiple of {} for a page blob, got {}",
                PAGE_ALIGNMENT, self.size
            )));
        }
        if self.size > MAX_PAGE_BLOB_SIZE {
            return Err(UploadError::validation(format!(
                "`size` {} exceeds the maximum page blob size",
                self.size
            )));
        }

        client
            .create_page_blob(&self.location, self.size, &self.properties)
            .await
            .map_err(|e| self.storage_error("put page blob", e))?;

        Ok(UploadOutcome::CreatedEmpty {
            blob_type: BlobType::PageBlob,
            size: self.size,
        })
    }

    async fn upload_page_blob(
        &self,
        client: Arc<dyn BlobClient>,
        source: &Path,
        config: &UploadConfig,
    ) -> UploadResult<UploadOutcome> {
        if self.size != 0 {
            return Err(UploadError::validation(
                "`size` cannot be set for an uploaded page blob",
            ));
        }
        config.validate()?;

        let source = Arc::new(SourceFile::open(source)?);
        let blob_size = padded_size(source.size(), config.page_size);
        if blob_size > MAX_PAGE_BLOB_SIZE {
            return Err(UploadError::validation(format!(
                "source file {:?} is larger than the maximum page blob size",
                source.path()
            )));
        }

        client
            .create_page_blob(&self.location, blob_size, &self.properties)
            .await
            .map_err(|e| self.storage_error("put page blob", e))?;

        let summary = PageUploader::new(client, config.clone())
            .upload_source(&self.location, source)
            .await?;

        Ok(UploadOutcome::UploadedPages(summary))
    }
}

/// Block IDs must all have the same length within a blob.
fn block_id(index: usize) -> String {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    BASE64.encode(format!("block-{:08}", index))
}
