//! pageblob-upload: sparse-aware parallel uploads to Azure page blobs.
//!
//! A local file is scanned in page units, all-zero pages are skipped, and the
//! remaining pages are merged into ranges that a pool of workers writes into a
//! pre-sized page blob. Block blobs and server-side copies are supported
//! through the same entry point.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pageblob_upload::{BlobLocation, BlobUpload, ClientConfig, RestBlobClient, UploadConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = Arc::new(RestBlobClient::new(&ClientConfig::emulator())?);
//!     let request = BlobUpload {
//!         location: BlobLocation::new("vhds", "disk.vhd"),
//!         blob_type: "page".to_string(),
//!         source: Some("disk.vhd".into()),
//!         ..BlobUpload::default()
//!     };
//!     request.create(client, &UploadConfig::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod source;
pub mod upload;

// Re-exports for convenience
pub use client::{BlobClient, RestBlobClient};
pub use config::{Args, ClientConfig, Config, UploadConfig, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY};
pub use error::{StorageError, StorageResult, UploadError, UploadResult};
pub use models::{BlobLocation, BlobProperties, BlobType, ByteRange, PageRange};
pub use source::{ReadAt, SourceFile};
pub use upload::{scan_ranges, BlobUpload, PageUploader, UploadOutcome, UploadSummary};
