//! Remote blob storage collaborator.
//!
//! The uploader only talks to storage through [`BlobClient`]; the REST
//! implementation lives in [`RestBlobClient`]. Retries and timeouts are the
//! client's concern, callers treat every call as a single attempt.

mod auth;
mod rest;
mod xml;

pub use auth::{string_to_sign, SharedKeyCredential};
pub use rest::RestBlobClient;
pub use xml::{parse_error_body, serialize_block_list, ErrorBody};

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

use crate::error::StorageResult;
use crate::models::{BlobLocation, BlobProperties, CopyState, PageRange};

/// Operations the uploader needs from blob storage.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Creates (or replaces) a zero-filled page blob of exactly `size` bytes.
    async fn create_page_blob(
        &self,
        location: &BlobLocation,
        size: u64,
        properties: &BlobProperties,
    ) -> StorageResult<()>;

    /// Writes `content` to the inclusive byte range `range` of a page blob.
    /// `content.len()` equals `range.length()`.
    async fn write_range(
        &self,
        location: &BlobLocation,
        range: PageRange,
        content: Bytes,
    ) -> StorageResult<()>;

    /// Creates a block blob holding `content` in a single request.
    async fn put_block_blob(
        &self,
        location: &BlobLocation,
        content: Bytes,
        properties: &BlobProperties,
    ) -> StorageResult<()>;

    /// Stages one uncommitted block.
    async fn put_block(
        &self,
        location: &BlobLocation,
        block_id: &str,
        content: Bytes,
    ) -> StorageResult<()>;

    /// Commits previously staged blocks, in order, as the blob content.
    async fn put_block_list(
        &self,
        location: &BlobLocation,
        block_ids: &[String],
        properties: &BlobProperties,
    ) -> StorageResult<()>;

    /// Starts a server-side copy from `source_url` into `location`.
    async fn start_copy(
        &self,
        location: &BlobLocation,
        source_url: &str,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<CopyState>;

    /// Returns the state of the latest copy into `location`.
    async fn copy_status(&self, location: &BlobLocation) -> StorageResult<CopyState>;
}
