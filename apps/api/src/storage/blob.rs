//! Binary storage collaborator — uploaded documents, the form template and
//! the filled form artifact.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::errors::AppError;

#[async_trait]
pub trait BinaryStorage: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Bytes, AppError>;
    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), AppError>;
}

/// S3 / MinIO object storage scoped to one bucket.
#[derive(Clone)]
pub struct S3BinaryStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BinaryStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BinaryStorage for S3BinaryStorage {
    async fn fetch(&self, key: &str) -> Result<Bytes, AppError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let e = e.into_service_error();
                if e.is_no_such_key() {
                    return Err(AppError::NotFound(format!("Object '{key}' does not exist")));
                }
                return Err(AppError::Storage(format!(
                    "S3 download of s3://{}/{key} failed: {e}",
                    self.bucket
                )));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("S3 body read for '{key}' failed: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), AppError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload to '{key}' failed: {e}")))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
