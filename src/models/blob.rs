//! Blob identity and creation settings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{StorageError, UploadError};

/// Blob types this tool can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobType {
    BlockBlob,
    PageBlob,
}

impl BlobType {
    /// Value of the `x-ms-blob-type` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobType::BlockBlob => "BlockBlob",
            BlobType::PageBlob => "PageBlob",
        }
    }
}

impl FromStr for BlobType {
    type Err = UploadError;

    /// Accepts `block`/`page` as well as the header spellings, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" | "blockblob" => Ok(BlobType::BlockBlob),
            "page" | "pageblob" => Ok(BlobType::PageBlob),
            _ => Err(UploadError::UnsupportedBlobType(s.to_string())),
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container and blob name of the upload target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub container: String,
    pub blob: String,
}

impl BlobLocation {
    pub fn new(container: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: blob.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

/// Properties applied when a blob is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    /// Content type; the client falls back to `application/octet-stream`.
    pub content_type: Option<String>,
    /// User metadata sent as `x-ms-meta-*` headers.
    pub metadata: BTreeMap<String, String>,
}

/// Copy states reported in `x-ms-copy-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        }
    }
}

impl FromStr for CopyStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(CopyStatus::Pending),
            "success" => Ok(CopyStatus::Success),
            "aborted" => Ok(CopyStatus::Aborted),
            "failed" => Ok(CopyStatus::Failed),
            _ => Err(StorageError::InvalidHeader {
                name: "x-ms-copy-status".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Progress of a server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyState {
    pub copy_id: String,
    pub status: CopyStatus,
    pub description: Option<String>,
}
