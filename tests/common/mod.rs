//! Common test utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, Bytes as AxumBytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use url::Url;

use pageblob_upload::client::SharedKeyCredential;
use pageblob_upload::models::{CopyState, CopyStatus};
use pageblob_upload::{
    BlobClient, BlobLocation, BlobProperties, BlobType, ClientConfig, PageRange, StorageError,
    StorageResult, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY,
};

/// Writes `content` to a fresh temporary file.
pub fn source_file(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

// ============================================================================
// In-memory client
// ============================================================================

/// A blob held by [`MemoryBlobClient`].
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub blob_type: BlobType,
    pub content: Vec<u8>,
    pub properties: BlobProperties,
}

/// Records every call and keeps blobs in memory.
#[derive(Default)]
pub struct MemoryBlobClient {
    pub blobs: Mutex<HashMap<BlobLocation, StoredBlob>>,
    staged: Mutex<HashMap<(BlobLocation, String), Bytes>>,
    /// Every call of any kind.
    pub calls: AtomicUsize,
    /// `write_range` calls, failed ones included.
    pub write_attempts: AtomicUsize,
    /// Ranges written, as received.
    pub writes: Mutex<Vec<PageRange>>,
    /// Start offsets whose writes fail.
    pub fail_writes_at: Mutex<HashSet<u64>>,
    pub write_delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Copy status polls left before the copy settles.
    pub copy_polls: AtomicUsize,
    pub copy_outcome: Mutex<Option<CopyStatus>>,
    pub copy_status_calls: AtomicUsize,
}

impl MemoryBlobClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_write_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn fail_write_at(&self, offset: u64) {
        self.fail_writes_at.lock().insert(offset);
    }

    pub fn blob(&self, location: &BlobLocation) -> Option<StoredBlob> {
        self.blobs.lock().get(location).cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

fn not_found() -> StorageError {
    StorageError::service(404, "BlobNotFound", "The specified blob does not exist.")
}

#[async_trait]
impl BlobClient for MemoryBlobClient {
    async fn create_page_blob(
        &self,
        location: &BlobLocation,
        size: u64,
        properties: &BlobProperties,
    ) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().insert(
            location.clone(),
            StoredBlob {
                blob_type: BlobType::PageBlob,
                content: vec![0u8; size as usize],
                properties: properties.clone(),
            },
        );
        Ok(())
    }

    async fn write_range(
        &self,
        location: &BlobLocation,
        range: PageRange,
        content: Bytes,
    ) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_writes_at.lock().contains(&range.start) {
            return Err(StorageError::service(500, "InternalError", "injected failure"));
        }
        if content.len() as u64 != range.length() {
            return Err(StorageError::service(400, "InvalidHeaderValue", "length mismatch"));
        }

        let mut blobs = self.blobs.lock();
        let blob = blobs.get_mut(location).ok_or_else(not_found)?;
        if blob.blob_type != BlobType::PageBlob || range.end >= blob.content.len() as u64 {
            return Err(StorageError::service(416, "InvalidPageRange", "bad range"));
        }
        blob.content[range.start as usize..=range.end as usize].copy_from_slice(&content);
        self.writes.lock().push(range);
        Ok(())
    }

    async fn put_block_blob(
        &self,
        location: &BlobLocation,
        content: Bytes,
        properties: &BlobProperties,
    ) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().insert(
            location.clone(),
            StoredBlob {
                blob_type: BlobType::BlockBlob,
                content: content.to_vec(),
                properties: properties.clone(),
            },
        );
        Ok(())
    }

    async fn put_block(
        &self,
        location: &BlobLocation,
        block_id: &str,
        content: Bytes,
    ) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.staged
            .lock()
            .insert((location.clone(), block_id.to_string()), content);
        Ok(())
    }

    async fn put_block_list(
        &self,
        location: &BlobLocation,
        block_ids: &[String],
        properties: &BlobProperties,
    ) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let staged = self.staged.lock();
        let mut content = Vec::new();
        for id in block_ids {
            let block = staged
                .get(&(location.clone(), id.clone()))
                .ok_or_else(|| StorageError::service(400, "InvalidBlockList", id.clone()))?;
            content.extend_from_slice(block);
        }
        self.blobs.lock().insert(
            location.clone(),
            StoredBlob {
                blob_type: BlobType::BlockBlob,
                content,
                properties: properties.clone(),
            },
        );
        Ok(())
    }

    async fn start_copy(
        &self,
        location: &BlobLocation,
        _source_url: &str,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<CopyState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().insert(
            location.clone(),
            StoredBlob {
                blob_type: BlobType::BlockBlob,
                content: Vec::new(),
                properties: BlobProperties {
                    content_type: None,
                    metadata: metadata.clone(),
                },
            },
        );
        Ok(CopyState {
            copy_id: "copy-1".to_string(),
            status: CopyStatus::Pending,
            description: None,
        })
    }

    async fn copy_status(&self, _location: &BlobLocation) -> StorageResult<CopyState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.copy_status_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.copy_polls.load(Ordering::SeqCst);
        let status = if remaining > 0 {
            self.copy_polls.fetch_sub(1, Ordering::SeqCst);
            CopyStatus::Pending
        } else {
            self.copy_outcome.lock().unwrap_or(CopyStatus::Success)
        };
        Ok(CopyState {
            copy_id: "copy-1".to_string(),
            status,
            description: (status == CopyStatus::Failed).then(|| "source went away".to_string()),
        })
    }
}

// ============================================================================
// Stub Blob REST service
// ============================================================================

/// A blob held by the stub service.
#[derive(Debug, Clone, Default)]
pub struct StubBlob {
    pub blob_type: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub copy_polls_left: usize,
}

/// Shared state of the stub service.
pub struct StubState {
    credential: SharedKeyCredential,
    pub blobs: Mutex<HashMap<String, StubBlob>>,
    staged: Mutex<HashMap<String, Vec<u8>>>,
    pub page_writes: AtomicUsize,
    /// Upcoming requests answered with 503.
    pub transient_failures: AtomicUsize,
    /// Status polls a copy stays pending for.
    pub copy_polls: AtomicUsize,
    pub rejected_signatures: AtomicUsize,
}

impl StubState {
    pub fn blob(&self, path: &str) -> Option<StubBlob> {
        self.blobs.lock().get(path).cloned()
    }
}

/// Stub server wrapper.
pub struct TestServer {
    pub endpoint: String,
    pub state: Arc<StubState>,
}

impl TestServer {
    /// Starts the stub on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(StubState {
            credential: SharedKeyCredential::new(DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY).unwrap(),
            blobs: Mutex::new(HashMap::new()),
            staged: Mutex::new(HashMap::new()),
            page_writes: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
            copy_polls: AtomicUsize::new(0),
            rejected_signatures: AtomicUsize::new(0),
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://127.0.0.1:{}/{}", port, DEFAULT_ACCOUNT),
            state,
        }
    }

    /// Client settings pointing at the stub.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: Some(Url::parse(&self.endpoint).unwrap()),
            retry_delay: Duration::from_millis(10),
            ..ClientConfig::default()
        }
    }

    /// Key the stub stores a blob under.
    pub fn blob_path(container: &str, blob: &str) -> String {
        format!("/{}/{}/{}", DEFAULT_ACCOUNT, container, blob)
    }
}

fn reply(status: StatusCode, headers: &[(&str, String)], body: String) -> Response {
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder.body(Body::from(body)).unwrap()
}

fn error_reply(status: StatusCode, code: &str, message: &str) -> Response {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Error>
  <Code>{}</Code>
  <Message>{}
RequestId:00000000-0000-0000-0000-000000000000
Time:2026-10-16T00:00:00.000Z</Message>
</Error>"#,
        code, message
    );
    reply(
        status,
        &[
            ("content-type", "application/xml".to_string()),
            ("x-ms-error-code", code.to_string()),
        ],
        xml,
    )
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Recomputes the SharedKey signature the way the service does.
fn signature_matches(state: &StubState, method: &Method, uri: &Uri, headers: &HeaderMap, len: usize) -> bool {
    let Some(provided) = header(headers, "authorization") else {
        return false;
    };

    let mut signed_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        signed_headers.insert(
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()).unwrap(),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()).unwrap(),
        );
    }
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap();
    let url = Url::parse(&format!("http://localhost{}", uri)).unwrap();

    let expected = state
        .credential
        .authorization(&method, &url, &signed_headers, len as u64)
        .unwrap();
    provided == expected
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    if !signature_matches(&state, &method, &uri, &headers, body.len()) {
        state.rejected_signatures.fetch_add(1, Ordering::SeqCst);
        return error_reply(StatusCode::FORBIDDEN, "AuthenticationFailed", "Signature mismatch.");
    }

    if state
        .transient_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return error_reply(StatusCode::SERVICE_UNAVAILABLE, "ServerBusy", "Try again later.");
    }

    let path = uri.path().to_string();
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    match method {
        Method::HEAD => head_blob(&state, &path),
        Method::PUT => match query.get("comp").map(String::as_str) {
            Some("page") => put_page(&state, &path, &headers, &body),
            Some("block") => {
                let id = query.get("blockid").cloned().unwrap_or_default();
                state
                    .staged
                    .lock()
                    .insert(format!("{}#{}", path, id), body.to_vec());
                reply(StatusCode::CREATED, &[], String::new())
            }
            Some("blocklist") => put_block_list(&state, &path, &headers, &body),
            Some(_) => error_reply(StatusCode::BAD_REQUEST, "UnsupportedQueryParameter", "comp"),
            None if headers.contains_key("x-ms-copy-source") => copy_blob(&state, &path, &headers),
            None => put_blob(&state, &path, &headers, &body),
        },
        _ => error_reply(StatusCode::METHOD_NOT_ALLOWED, "UnsupportedHttpVerb", "verb"),
    }
}

fn metadata_from(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix("x-ms-meta-")?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

fn put_blob(state: &StubState, path: &str, headers: &HeaderMap, body: &[u8]) -> Response {
    let blob_type = header(headers, "x-ms-blob-type").unwrap_or("");
    let content = match blob_type {
        "PageBlob" => {
            let Some(size) = header(headers, "x-ms-blob-content-length").and_then(|s| s.parse::<u64>().ok())
            else {
                return error_reply(StatusCode::BAD_REQUEST, "MissingRequiredHeader", "size");
            };
            if size % 512 != 0 {
                return error_reply(
                    StatusCode::BAD_REQUEST,
                    "InvalidHeaderValue",
                    "Page blob size must be aligned to 512 bytes",
                );
            }
            vec![0u8; size as usize]
        }
        "BlockBlob" => body.to_vec(),
        _ => return error_reply(StatusCode::BAD_REQUEST, "InvalidBlobType", blob_type),
    };

    state.blobs.lock().insert(
        path.to_string(),
        StubBlob {
            blob_type: blob_type.to_string(),
            content,
            content_type: header(headers, "x-ms-blob-content-type").map(str::to_string),
            metadata: metadata_from(headers),
            copy_polls_left: 0,
        },
    );
    reply(StatusCode::CREATED, &[], String::new())
}

fn put_page(state: &StubState, path: &str, headers: &HeaderMap, body: &[u8]) -> Response {
    state.page_writes.fetch_add(1, Ordering::SeqCst);

    let Some((start, end)) = header(headers, "x-ms-range").and_then(parse_range) else {
        return error_reply(StatusCode::BAD_REQUEST, "MissingRequiredHeader", "x-ms-range");
    };
    if header(headers, "x-ms-page-write") != Some("update") {
        return error_reply(StatusCode::BAD_REQUEST, "InvalidHeaderValue", "x-ms-page-write");
    }
    if start % 512 != 0 || (end + 1) % 512 != 0 || body.len() as u64 != end - start + 1 {
        return error_reply(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "InvalidPageRange",
            "Page ranges must be aligned to 512 bytes",
        );
    }
    let md5 = BASE64.encode(Md5::digest(body));
    if header(headers, "content-md5") != Some(md5.as_str()) {
        return error_reply(StatusCode::BAD_REQUEST, "Md5Mismatch", "Content-MD5 mismatch");
    }

    let mut blobs = state.blobs.lock();
    let Some(blob) = blobs.get_mut(path) else {
        return error_reply(StatusCode::NOT_FOUND, "BlobNotFound", "The specified blob does not exist.");
    };
    if blob.blob_type != "PageBlob" || end >= blob.content.len() as u64 {
        return error_reply(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "InvalidPageRange",
            "The page range specified is invalid.",
        );
    }
    blob.content[start as usize..=end as usize].copy_from_slice(body);
    reply(StatusCode::CREATED, &[], String::new())
}

fn put_block_list(state: &StubState, path: &str, headers: &HeaderMap, body: &[u8]) -> Response {
    let xml = String::from_utf8_lossy(body);
    let staged = state.staged.lock();
    let mut content = Vec::new();
    for part in xml.split("<Latest>").skip(1) {
        let id = part.split("</Latest>").next().unwrap_or("");
        match staged.get(&format!("{}#{}", path, id)) {
            Some(block) => content.extend_from_slice(block),
            None => return error_reply(StatusCode::BAD_REQUEST, "InvalidBlockList", id),
        }
    }

    state.blobs.lock().insert(
        path.to_string(),
        StubBlob {
            blob_type: "BlockBlob".to_string(),
            content,
            content_type: header(headers, "x-ms-blob-content-type").map(str::to_string),
            metadata: metadata_from(headers),
            copy_polls_left: 0,
        },
    );
    reply(StatusCode::CREATED, &[], String::new())
}

fn copy_blob(state: &StubState, path: &str, headers: &HeaderMap) -> Response {
    let source = header(headers, "x-ms-copy-source")
        .and_then(|s| Url::parse(s).ok())
        .and_then(|url| state.blob(url.path()));
    let Some(source) = source else {
        return error_reply(StatusCode::NOT_FOUND, "CannotVerifyCopySource", "source");
    };

    let polls = state.copy_polls.load(Ordering::SeqCst);
    state.blobs.lock().insert(
        path.to_string(),
        StubBlob {
            metadata: metadata_from(headers),
            copy_polls_left: polls,
            ..source
        },
    );

    let status = if polls > 0 { "pending" } else { "success" };
    reply(
        StatusCode::ACCEPTED,
        &[
            ("x-ms-copy-id", "stub-copy".to_string()),
            ("x-ms-copy-status", status.to_string()),
        ],
        String::new(),
    )
}

fn head_blob(state: &StubState, path: &str) -> Response {
    let mut blobs = state.blobs.lock();
    let Some(blob) = blobs.get_mut(path) else {
        return reply(
            StatusCode::NOT_FOUND,
            &[("x-ms-error-code", "BlobNotFound".to_string())],
            String::new(),
        );
    };

    let status = if blob.copy_polls_left > 0 {
        blob.copy_polls_left -= 1;
        "pending"
    } else {
        "success"
    };
    reply(
        StatusCode::OK,
        &[
            ("x-ms-blob-type", blob.blob_type.clone()),
            ("x-ms-copy-id", "stub-copy".to_string()),
            ("x-ms-copy-status", status.to_string()),
        ],
        String::new(),
    )
}
