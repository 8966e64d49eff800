//! S3-compatible object storage.
//!
//! Uploaded files are written with a single signed `PutObject` request
//! against a path-style endpoint (`{endpoint}/{bucket}/{key}`), which works
//! for AWS S3, MinIO, Ceph RGW, and similar servers.
//!
//! Requests are signed with AWS Signature Version 4. No SDK is involved;
//! the signing helpers below cover exactly what `PutObject` needs.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{required, StorageConfig};
use crate::traits::ObjectStore;

type HmacSha256 = Hmac<Sha256>;

/// Fallback when neither the upload nor the filename names a type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct S3Storage {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
}

impl S3Storage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: required(&config.endpoint, "STORAGE_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            bucket: required(&config.bucket, "STORAGE_BUCKET")?.to_string(),
            region: config.region.clone(),
            access_key: required(&config.access_key, "STORAGE_ACCESS_KEY")?.to_string(),
            secret_key: required(&config.secret_key, "STORAGE_SECRET_KEY")?.to_string(),
        })
    }

    /// Public URL of an object, `{endpoint}/{bucket}/{key}`.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}{}", self.endpoint, self.canonical_uri(key))
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("/{}/{}", uri_encode(&self.bucket), encode_key(key))
    }

    /// Authorization header for a `PutObject` of a payload with hash
    /// `payload_hash`, signed at `now`.
    fn authorization(
        &self,
        key: &str,
        content_type: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let headers = [
            ("content-type", content_type.to_string()),
            ("host", s3_host(&self.endpoint)),
            ("x-amz-content-sha256", payload_hash.to_string()),
            ("x-amz-date", amz_date.clone()),
        ];
        let signed_headers = headers.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            self.canonical_uri(key),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3")?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, credential_scope, signed_headers, signature
        ))
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<String> {
        let now = Utc::now();
        let payload_hash = hex_sha256(&data);
        let authorization = self.authorization(key, content_type, &payload_hash, now)?;
        let url = self.object_url(key);
        let size = data.len();

        let resp = self
            .client
            .put(&url)
            .header("Authorization", authorization)
            .header("Content-Type", content_type)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", now.format("%Y%m%dT%H%M%SZ").to_string())
            .body(data)
            .send()
            .await
            .map_err(|e| anyhow!("failed to upload s3://{}/{}: {}", self.bucket, key, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            match parse_error_response(&body) {
                Some(err) => bail!(
                    "S3 PutObject failed (HTTP {}) for key '{}': {}: {}",
                    status,
                    key,
                    err.code,
                    err.message
                ),
                None => bail!("S3 PutObject failed (HTTP {}) for key '{}'", status, key),
            }
        }

        debug!(bucket = %self.bucket, key, size, "stored object");
        Ok(url)
    }
}

/// Body of an S3 `<Error>` response.
#[derive(Debug, Deserialize, PartialEq)]
struct S3ErrorResponse {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

fn parse_error_response(xml: &str) -> Option<S3ErrorResponse> {
    quick_xml::de::from_str(xml).ok()
}

/// Content type for an upload: the declared type when it is meaningful,
/// else a guess from the filename extension, else octet-stream.
pub fn resolve_content_type(declared: Option<&str>, filename: &str) -> String {
    match declared.map(str::trim) {
        Some(ct) if !ct.is_empty() && ct != DEFAULT_CONTENT_TYPE => ct.to_string(),
        _ => detect_content_type(filename)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string(),
    }
}

/// Guess a MIME type from a filename extension.
fn detect_content_type(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ct = match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "txt" => "text/plain",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return None,
    };
    Some(ct)
}

// ============ AWS SigV4 Helpers ============

/// Host (with port, if any) of the configured endpoint.
fn s3_host(endpoint: &str) -> String {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

/// Encode an object key segment by segment, keeping `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
