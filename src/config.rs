//! Command-line arguments and upload configuration.

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{UploadError, UploadResult};
use crate::models::{BlobLocation, BlobProperties, MAX_PAGE_RANGE_SIZE, PAGE_ALIGNMENT};
use crate::upload::BlobUpload;

pub use crate::models::DEFAULT_PAGE_SIZE;

/// Account name of the local storage emulator.
pub const DEFAULT_ACCOUNT: &str = "devstoreaccount1";

/// Account key of the local storage emulator (base64 encoded).
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob service port of the local storage emulator.
pub const DEFAULT_BLOB_PORT: u16 = 10000;

/// REST API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2021-10-04";

/// Workers started per processing unit.
pub const DEFAULT_PARALLELISM: usize = 8;

/// Delay between copy status polls.
pub const DEFAULT_COPY_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Per-request timeout of the REST client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Attempts after the first for transient request failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "pageblob-upload")]
#[command(about = "Upload a local file to Azure Blob Storage, skipping zero pages for page blobs")]
#[command(version)]
pub struct Args {
    /// Storage account name.
    #[arg(long, env = "AZURE_STORAGE_ACCOUNT", default_value = DEFAULT_ACCOUNT)]
    pub account: String,

    /// Storage account key (base64 encoded).
    #[arg(long, env = "AZURE_STORAGE_KEY", default_value = DEFAULT_ACCOUNT_KEY, hide_default_value = true)]
    pub key: String,

    /// Blob service endpoint, e.g. http://127.0.0.1:10000/devstoreaccount1.
    /// Defaults to https://{account}.blob.core.windows.net.
    #[arg(long)]
    pub endpoint: Option<Url>,

    /// Target container.
    #[arg(long, short = 'c')]
    pub container: String,

    /// Target blob name.
    #[arg(long, short = 'b')]
    pub blob: String,

    /// Blob type: `block` or `page`.
    #[arg(long = "type", short = 't', default_value = "page")]
    pub blob_type: String,

    /// Local file to upload.
    #[arg(long, short = 's')]
    pub source: Option<PathBuf>,

    /// URL of a blob to copy from instead of uploading.
    #[arg(long)]
    pub source_uri: Option<String>,

    /// Size in bytes of an empty page blob.
    #[arg(long, default_value_t = 0)]
    pub size: u64,

    /// Content type of the blob.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Metadata entry as key=value; may be repeated.
    #[arg(long = "metadata", short = 'm', value_parser = parse_metadata)]
    pub metadata: Vec<(String, String)>,

    /// Upload workers started per processing unit.
    #[arg(long, short = 'p', default_value_t = DEFAULT_PARALLELISM)]
    pub parallelism: usize,

    /// Processing units to size the worker pool with. Defaults to the
    /// available parallelism of the host.
    #[arg(long)]
    pub processing_units: Option<usize>,

    /// Page unit used to scan for non-zero data, in bytes.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,

    /// Largest range sent in a single page write, in bytes.
    #[arg(long, default_value_t = MAX_PAGE_RANGE_SIZE)]
    pub max_range_size: u64,

    /// Seconds between copy status polls.
    #[arg(long, default_value_t = DEFAULT_COPY_POLL_INTERVAL.as_secs())]
    pub copy_poll_interval: u64,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Retries for transient request failures.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (errors only).
    #[arg(long)]
    pub silent: bool,
}

fn parse_metadata(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err("metadata key cannot be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

/// Tuning knobs of the page upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Page unit the source is scanned in.
    pub page_size: u64,
    /// Upper bound on the length of a merged range.
    pub max_range_size: u64,
    /// Workers per processing unit.
    pub parallelism: usize,
    /// Processing units; `None` uses the host's available parallelism.
    pub processing_units: Option<usize>,
    /// Delay between copy status polls.
    pub copy_poll_interval: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_range_size: MAX_PAGE_RANGE_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            processing_units: None,
            copy_poll_interval: DEFAULT_COPY_POLL_INTERVAL,
        }
    }
}

impl UploadConfig {
    /// Checks the page geometry against what the service accepts.
    pub fn validate(&self) -> UploadResult<()> {
        if self.page_size == 0 || self.page_size % PAGE_ALIGNMENT != 0 {
            return Err(UploadError::validation(format!(
                "page size {} must be a non-zero multiple of {}",
                self.page_size, PAGE_ALIGNMENT
            )));
        }
        if self.max_range_size < self.page_size || self.max_range_size % self.page_size != 0 {
            return Err(UploadError::validation(format!(
                "max range size {} must be a multiple of the page size {}",
                self.max_range_size, self.page_size
            )));
        }
        if self.max_range_size > MAX_PAGE_RANGE_SIZE {
            return Err(UploadError::validation(format!(
                "max range size {} exceeds the service limit of {}",
                self.max_range_size, MAX_PAGE_RANGE_SIZE
            )));
        }
        if self.parallelism == 0 || self.processing_units == Some(0) {
            return Err(UploadError::validation(
                "parallelism and processing units must be at least 1",
            ));
        }
        Ok(())
    }

    /// Number of upload workers: parallelism times processing units.
    pub fn worker_count(&self) -> usize {
        let units = self.processing_units.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        self.parallelism.saturating_mul(units).max(1)
    }
}

/// Connection settings of the REST client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub account: String,
    /// Base64 encoded account key.
    pub key: String,
    /// Service endpoint; `None` uses the public cloud endpoint of `account`.
    pub endpoint: Option<Url>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            account: DEFAULT_ACCOUNT.to_string(),
            key: DEFAULT_ACCOUNT_KEY.to_string(),
            endpoint: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Settings for the local storage emulator on its default port.
    pub fn emulator() -> Self {
        Self {
            endpoint: Url::parse(&format!(
                "http://127.0.0.1:{}/{}",
                DEFAULT_BLOB_PORT, DEFAULT_ACCOUNT
            ))
            .ok(),
            ..Self::default()
        }
    }

    /// Returns the endpoint blob URLs are built from.
    pub fn resolved_endpoint(&self) -> Result<Url, url::ParseError> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Url::parse(&format!("https://{}.blob.core.windows.net", self.account)),
        }
    }
}

/// Everything one invocation of the binary needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub upload: UploadConfig,
    pub request: BlobUpload,
    pub debug: bool,
    pub silent: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let client = ClientConfig {
            account: args.account,
            key: args.key,
            endpoint: args.endpoint,
            timeout: Duration::from_secs(args.timeout),
            max_retries: args.max_retries,
            ..ClientConfig::default()
        };

        let upload = UploadConfig {
            page_size: args.page_size,
            max_range_size: args.max_range_size,
            parallelism: args.parallelism,
            processing_units: args.processing_units,
            copy_poll_interval: Duration::from_secs(args.copy_poll_interval),
        };

        let request = BlobUpload {
            location: BlobLocation::new(args.container, args.blob),
            blob_type: args.blob_type,
            properties: BlobProperties {
                content_type: args.content_type,
                metadata: args.metadata.into_iter().collect::<BTreeMap<_, _>>(),
            },
            size: args.size,
            source: args.source,
            source_uri: args.source_uri,
        };

        Self {
            client,
            upload,
            request,
            debug: args.debug,
            silent: args.silent,
        }
    }
}
