//! S3-compatible object store adapter.
//!
//! Provides `ObjectStore`, the uniform surface the migration workers use
//! for HEAD / streaming GET / checksummed PUT / multipart upload. One
//! instance wraps one client configuration (endpoint, region,
//! credentials); a copy operation holds two — source and destination.
//!
//! ## Integrity headers
//!
//! Every PUT and UploadPart carries a `ChecksumSHA256` value so the store
//! verifies the body server-side. For single PUTs of a whole shard the
//! checksum is the shard cid's digest; for parts it is the digest of the
//! part body.
//!
//! ## Timeout Configuration
//!
//! The `timeout_ms` setting controls the total operation timeout, which
//! **includes SDK retry time**.

use crate::error::{Result, StorageError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    ChecksumAlgorithm, CompletedMultipartUpload, CompletedPart,
};
use aws_sdk_s3::Client;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Object store configuration.
///
/// `access_key_id`/`secret_access_key` override the ambient credential
/// chain — destination stores (R2) are usually configured this way while
/// the source store rides on the default chain.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreConfig {
    /// Region override (R2 destinations use the literal `"auto"`)
    pub region: Option<String>,
    /// Endpoint override (R2, LocalStack, MinIO)
    pub endpoint: Option<String>,
    /// Static access key id (paired with `secret_access_key`)
    pub access_key_id: Option<String>,
    /// Static secret access key
    pub secret_access_key: Option<String>,
    /// Operation timeout in milliseconds (includes SDK retry time)
    pub timeout_ms: Option<u64>,
    /// Max retries *after* the initial attempt
    pub max_retries: Option<u32>,
    /// Initial backoff for retries in milliseconds
    pub retry_base_delay_ms: Option<u64>,
    /// Max backoff for retries in milliseconds
    pub retry_max_delay_ms: Option<u64>,
}

/// S3-compatible object store.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
}

impl Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore").finish()
    }
}

/// Result of a HEAD: the object exists and has this size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
}

/// A GET response: declared size plus the chunked body.
pub struct ObjectBody {
    pub content_length: u64,
    stream: ByteStream,
}

impl ObjectBody {
    /// Pull the next body chunk; `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.stream
            .try_next()
            .await
            .map_err(|e| StorageError::io(format!("failed to read object body: {e}")))
    }

    /// Drain the remaining body into memory. Only for small artifacts
    /// (side indexes); shard bodies go through `next_chunk`.
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.content_length as usize);
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

/// One uploaded part, as needed for completion.
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: String,
    pub checksum_sha256: String,
}

/// One key in a list page.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// A page of a bucket listing.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub continuation_token: Option<String>,
}

impl ObjectStore {
    /// Build a store from SDK config plus per-store overrides.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: ObjectStoreConfig) -> Result<Self> {
        if sdk_config.region().is_none() && config.region.is_none() {
            return Err(StorageError::invalid_config("no AWS region configured"));
        }

        // Inherit HTTP client, sleep impl, etc. from SdkConfig, then apply
        // our overrides.
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);

        if let Some(region) = &config.region {
            builder = builder.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            builder = builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "carhaul-static",
            ));
        }

        if config.max_retries.is_some()
            || config.retry_base_delay_ms.is_some()
            || config.retry_max_delay_ms.is_some()
        {
            // AWS SDK uses "max attempts" = initial attempt + retries
            let max_attempts = config.max_retries.unwrap_or(0).saturating_add(1).max(1);
            let mut retry_config = RetryConfig::standard().with_max_attempts(max_attempts);
            if let Some(ms) = config.retry_base_delay_ms {
                retry_config = retry_config.with_initial_backoff(Duration::from_millis(ms));
            }
            if let Some(ms) = config.retry_max_delay_ms {
                retry_config = retry_config.with_max_backoff(Duration::from_millis(ms));
            }
            builder = builder.retry_config(retry_config);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Create from a pre-built client (for testing).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// HEAD an object. `None` means a clean 404; any other failure is an
    /// error — absence is the only status that licenses an overwrite.
    pub async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectHead {
                content_length: output.content_length().unwrap_or(0).max(0) as u64,
            })),
            Err(e) => {
                // Pattern match on SdkError to avoid panic from into_service_error()
                use aws_sdk_s3::error::SdkError;
                match &e {
                    SdkError::ServiceError(service_err)
                        if service_err.raw().status().as_u16() == 404 =>
                    {
                        Ok(None)
                    }
                    _ => Err(map_s3_error(e, key)),
                }
            }
        }
    }

    /// GET an object as a chunked stream.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        Ok(ObjectBody {
            content_length: response.content_length().unwrap_or(0).max(0) as u64,
            stream: response.body,
        })
    }

    /// PUT a fully-materialized body.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        checksum_sha256: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body));
        if let Some(checksum) = checksum_sha256 {
            request = request.checksum_sha256(checksum);
        }
        request.send().await.map_err(|e| map_s3_error(e, key))?;
        Ok(())
    }

    /// PUT with a channel-fed streaming body.
    ///
    /// `content_length` must equal the total bytes sent through `rx`; the
    /// store rejects short or long bodies, and rejects the object when the
    /// streamed bytes do not hash to `checksum_sha256`.
    pub async fn put_stream(
        &self,
        bucket: &str,
        key: &str,
        content_length: u64,
        checksum_sha256: Option<&str>,
        rx: mpsc::Receiver<Bytes>,
    ) -> Result<()> {
        let frames = ReceiverStream::new(rx)
            .map(|chunk| Ok::<_, Infallible>(http_body::Frame::data(chunk)));
        let body = ByteStream::from_body_1_x(http_body_util::StreamBody::new(frames));

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(content_length as i64)
            .body(body);
        if let Some(checksum) = checksum_sha256 {
            request = request.checksum_sha256(checksum);
        }
        request.send().await.map_err(|e| map_s3_error(e, key))?;
        Ok(())
    }

    /// Start a multipart upload with SHA-256 part checksums enabled.
    pub async fn create_multipart(&self, bucket: &str, key: &str) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        output
            .upload_id()
            .map(|id| id.to_string())
            .ok_or_else(|| StorageError::s3(format!("no upload id returned for '{key}'")))
    }

    /// Upload one part.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        checksum_sha256: &str,
    ) -> Result<UploadedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(body.len() as i64)
            .checksum_sha256(checksum_sha256)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        let etag = output
            .e_tag()
            .map(|t| t.to_string())
            .ok_or_else(|| StorageError::s3(format!("no ETag for part {part_number} of '{key}'")))?;

        Ok(UploadedPart {
            part_number,
            etag,
            checksum_sha256: checksum_sha256.to_string(),
        })
    }

    /// Complete a multipart upload with the given parts, in part order.
    pub async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .checksum_sha256(&p.checksum_sha256)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;
        Ok(())
    }

    /// Abort a multipart upload so no parts dangle.
    pub async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;
        Ok(())
    }

    /// List one page of keys under a prefix.
    pub async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(max_keys as i32);
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_s3_error(e, prefix))?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|k| ObjectSummary {
                    key: k.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect();

        Ok(ListPage {
            objects,
            continuation_token: response.next_continuation_token().map(|s| s.to_string()),
        })
    }
}

/// Map an SDK error with proper HTTP status classification.
fn map_s3_error<E: std::fmt::Debug>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError {
    use aws_sdk_s3::error::SdkError;

    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            match status {
                404 => StorageError::not_found(format!("key not found: {key}")),
                // Retryable server errors: throttling (429), server errors
                429 | 500 | 502 | 503 | 504 => StorageError::throttled(format!(
                    "retryable error for key '{key}' (HTTP {status})"
                )),
                _ => StorageError::s3(format!("S3 error for key '{key}' (HTTP {status}): {err:?}")),
            }
        }
        SdkError::TimeoutError(_) => {
            StorageError::io(format!("S3 timeout for key '{key}': {err:?}"))
        }
        SdkError::DispatchFailure(_) => {
            StorageError::io(format!("S3 connection error for key '{key}': {err:?}"))
        }
        _ => StorageError::s3(format!("S3 error for key '{key}': {err:?}")),
    }
}
