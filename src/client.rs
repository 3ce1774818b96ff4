//! Defines the object storage plumbing.

use anyhow::{Context, Result};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::{AsyncRead, BufReader};

/// Checks whether an object exists, returning its size in bytes when
/// it does. Only a not-found response maps to `None`; any other
/// failure is a genuine error.
pub async fn exists(client: &Client, bucket: &str, key: &str) -> Result<Option<i64>> {
    match client.head_object().bucket(bucket).key(key).send().await {
        Ok(head) => Ok(Some(head.content_length())),
        Err(SdkError::ServiceError(e)) if matches!(e.err(), HeadObjectError::NotFound(_)) => {
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to check the existence of object {:?} in bucket {:?}",
                key, bucket
            )
        }),
    }
}

/// Opens an object as a buffered async reader, without staging it
/// locally.
pub async fn open(client: &Client, bucket: &str, key: &str) -> Result<impl AsyncRead + Unpin> {
    let body = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| format!("Failed to open object {:?} from bucket {:?}", key, bucket))?
        .body
        .into_async_read();
    Ok(BufReader::new(body))
}

/// Uploads a derived blob.
pub async fn upload(client: &Client, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to upload derived object {:?} to bucket {:?}",
                key, bucket
            )
        })?;
    Ok(())
}

/// Creates the given bucket if it doesn't exist yet.
pub async fn ensure_bucket(client: &Client, bucket: &str) -> Result<()> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => Ok(()),
        Err(SdkError::ServiceError(e)) if matches!(e.err(), HeadBucketError::NotFound(_)) => {
            client
                .create_bucket()
                .bucket(bucket)
                .send()
                .await
                .with_context(|| format!("Failed to create bucket {:?}", bucket))?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to check for bucket {:?}", bucket)),
    }
}
