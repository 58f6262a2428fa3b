//! Blob REST API client.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, DEFAULT_API_VERSION};
use crate::error::{StorageError, StorageResult};
use crate::models::{BlobLocation, BlobProperties, BlobType, CopyState, CopyStatus, PageRange};

use super::auth::SharedKeyCredential;
use super::xml::{parse_error_body, serialize_block_list};
use super::BlobClient;

/// [`BlobClient`] over HTTP with SharedKey authentication.
#[derive(Debug, Clone)]
pub struct RestBlobClient {
    http: reqwest::Client,
    credential: SharedKeyCredential,
    endpoint: Url,
    max_retries: u32,
    retry_delay: Duration,
}

/// A request before the per-attempt headers are added and it is signed.
struct BlobRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl BlobRequest {
    fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn header(mut self, name: &str, value: &str) -> StorageResult<Self> {
        let invalid = || StorageError::InvalidHeader {
            name: name.to_string(),
            value: value.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    fn properties(mut self, properties: &BlobProperties) -> StorageResult<Self> {
        let content_type = match properties.content_type.as_deref() {
            Some(content_type) => content_type.to_string(),
            None => mime::APPLICATION_OCTET_STREAM.to_string(),
        };
        self = self.header("x-ms-blob-content-type", &content_type)?;
        self.metadata(&properties.metadata)
    }

    fn metadata(mut self, metadata: &BTreeMap<String, String>) -> StorageResult<Self> {
        for (key, value) in metadata {
            self = self.header(&format!("x-ms-meta-{}", key.to_lowercase()), value)?;
        }
        Ok(self)
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

impl RestBlobClient {
    /// Creates a client for the account and endpoint in `config`.
    pub fn new(config: &ClientConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            credential: SharedKeyCredential::new(config.account.clone(), &config.key)?,
            endpoint: config.resolved_endpoint()?,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    /// URL of a blob below the configured endpoint.
    pub fn blob_url(&self, location: &BlobLocation) -> StorageResult<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty().push(&location.container);
            for part in location.blob.split('/') {
                segments.push(part);
            }
        }
        Ok(url)
    }

    fn blob_url_with(&self, location: &BlobLocation, query: &[(&str, &str)]) -> StorageResult<Url> {
        let mut url = self.blob_url(location)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Sends `request`, retrying transient failures with exponential backoff.
    async fn send(&self, request: BlobRequest) -> StorageResult<Response> {
        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt);
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt = attempt + 1,
                        error = %e,
                        "request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &BlobRequest) -> StorageResult<Response> {
        let mut headers = request.headers.clone();
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let request_id = Uuid::new_v4().to_string();
        for (name, value) in [
            ("x-ms-date", date.as_str()),
            ("x-ms-version", DEFAULT_API_VERSION),
            ("x-ms-client-request-id", request_id.as_str()),
        ] {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).map_err(|_| StorageError::InvalidHeader {
                    name: name.to_string(),
                    value: value.to_string(),
                })?,
            );
        }

        let authorization = self.credential.authorization(
            &request.method,
            &request.url,
            &headers,
            request.body.len() as u64,
        )?;
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|_| StorageError::InvalidHeader {
                name: "authorization".to_string(),
                value: authorization.clone(),
            })?,
        );

        debug!(method = %request.method, url = %request.url, %request_id, "sending request");
        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Turns a non-success response into a [`StorageError::Service`].
async fn error_from_response(response: Response) -> StorageError {
    let status = response.status();
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let header_code = header("x-ms-error-code");
    let request_id = header("x-ms-request-id");

    let body = response.text().await.unwrap_or_default();
    let parsed = parse_error_body(&body);

    StorageError::Service {
        status: status.as_u16(),
        code: parsed
            .code
            .or(header_code)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
        message: parsed
            .message
            .unwrap_or_else(|| format!("request failed with status {}", status)),
        request_id,
    }
}

fn copy_state(headers: &HeaderMap) -> StorageResult<CopyState> {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let copy_id = get("x-ms-copy-id").ok_or(StorageError::MissingHeader("x-ms-copy-id"))?;
    let status: CopyStatus = get("x-ms-copy-status")
        .ok_or(StorageError::MissingHeader("x-ms-copy-status"))?
        .parse()?;

    Ok(CopyState {
        copy_id: copy_id.to_string(),
        status,
        description: get("x-ms-copy-status-description").map(str::to_string),
    })
}

#[async_trait]
impl BlobClient for RestBlobClient {
    async fn create_page_blob(
        &self,
        location: &BlobLocation,
        size: u64,
        properties: &BlobProperties,
    ) -> StorageResult<()> {
        let request = BlobRequest::new(Method::PUT, self.blob_url(location)?)
            .header("x-ms-blob-type", BlobType::PageBlob.as_str())?
            .header("x-ms-blob-content-length", &size.to_string())?
            .header("x-ms-blob-sequence-number", "0")?
            .properties(properties)?;

        self.send(request).await?;
        debug!(blob = %location, size, "created page blob");
        Ok(())
    }

    async fn write_range(
        &self,
        location: &BlobLocation,
        range: PageRange,
        content: Bytes,
    ) -> StorageResult<()> {
        let content_md5 = BASE64.encode(Md5::digest(&content));
        let request = BlobRequest::new(
            Method::PUT,
            self.blob_url_with(location, &[("comp", "page")])?,
        )
        .header("x-ms-page-write", "update")?
        .header("x-ms-range", &range.header_value())?
        .header("content-md5", &content_md5)?
        .body(content);

        self.send(request).await?;
        Ok(())
    }

    async fn put_block_blob(
        &self,
        location: &BlobLocation,
        content: Bytes,
        properties: &BlobProperties,
    ) -> StorageResult<()> {
        let request = BlobRequest::new(Method::PUT, self.blob_url(location)?)
            .header("x-ms-blob-type", BlobType::BlockBlob.as_str())?
            .properties(properties)?
            .body(content);

        self.send(request).await?;
        Ok(())
    }

    async fn put_block(
        &self,
        location: &BlobLocation,
        block_id: &str,
        content: Bytes,
    ) -> StorageResult<()> {
        let url = self.blob_url_with(location, &[("comp", "block"), ("blockid", block_id)])?;
        let request = BlobRequest::new(Method::PUT, url).body(content);

        self.send(request).await?;
        Ok(())
    }

    async fn put_block_list(
        &self,
        location: &BlobLocation,
        block_ids: &[String],
        properties: &BlobProperties,
    ) -> StorageResult<()> {
        let body = serialize_block_list(block_ids);
        let request = BlobRequest::new(
            Method::PUT,
            self.blob_url_with(location, &[("comp", "blocklist")])?,
        )
        .header("content-type", "application/xml")?
        .properties(properties)?
        .body(Bytes::from(body));

        self.send(request).await?;
        Ok(())
    }

    async fn start_copy(
        &self,
        location: &BlobLocation,
        source_url: &str,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<CopyState> {
        let request = BlobRequest::new(Method::PUT, self.blob_url(location)?)
            .header("x-ms-copy-source", source_url)?
            .metadata(metadata)?;

        let response = self.send(request).await?;
        if response.status() != StatusCode::ACCEPTED {
            debug!(status = %response.status(), "copy start returned non-202 success status");
        }
        copy_state(response.headers())
    }

    async fn copy_status(&self, location: &BlobLocation) -> StorageResult<CopyState> {
        let request = BlobRequest::new(Method::HEAD, self.blob_url(location)?);
        let response = self.send(request).await?;
        copy_state(response.headers())
    }
}
