//! SharedKey request signing for the Azure Blob Storage API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::Method;
use sha2::Sha256;
use std::collections::BTreeMap;
use url::Url;

use crate::error::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Account name plus decoded account key.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeyCredential {
    /// Creates a credential from a base64 encoded account key.
    pub fn new(account: impl Into<String>, key: &str) -> StorageResult<Self> {
        let key = BASE64
            .decode(key)
            .map_err(|e| StorageError::InvalidAccountKey(e.to_string()))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Computes the base64 HMAC-SHA256 of `string_to_sign`.
    pub fn sign(&self, string_to_sign: &str) -> StorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| StorageError::InvalidAccountKey(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Returns the `Authorization` header value for a request.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: u64,
    ) -> StorageResult<String> {
        let string_to_sign = string_to_sign(&self.account, method, url, headers, content_length);
        Ok(format!(
            "SharedKey {}:{}",
            self.account,
            self.sign(&string_to_sign)?
        ))
    }
}

/// Builds the SharedKey string-to-sign for a request.
pub fn string_to_sign(
    account: &str,
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    content_length: u64,
) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let mut parts = vec![method.as_str().to_uppercase()];
    parts.push(header("content-encoding"));
    parts.push(header("content-language"));
    // Content-Length is empty when zero
    parts.push(match content_length {
        0 => String::new(),
        len => len.to_string(),
    });
    parts.push(header("content-md5"));
    parts.push(header("content-type"));
    // Date stays empty, x-ms-date is always sent
    parts.push(String::new());
    for name in [
        "if-modified-since",
        "if-match",
        "if-none-match",
        "if-unmodified-since",
        "range",
    ] {
        parts.push(header(name));
    }

    format!(
        "{}\n{}{}",
        parts.join("\n"),
        canonicalized_headers(headers),
        canonicalized_resource(account, url)
    )
}

/// `x-ms-*` headers, sorted, one `name:value\n` line each.
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let ms_headers: BTreeMap<&str, String> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("");
            (
                name.as_str(),
                value.split_whitespace().collect::<Vec<_>>().join(" "),
            )
        })
        .collect();

    let mut result = String::new();
    for (name, value) in ms_headers {
        result.push_str(name);
        result.push(':');
        result.push_str(&value);
        result.push('\n');
    }
    result
}

/// `/{account}{path}` followed by the decoded query parameters, sorted by key.
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (key, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&key);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}
