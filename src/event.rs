//! Defines the notification envelope and the blob-created descriptor
//! parsed from inbound queue messages.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// The event type emitted by the storage account when a blob is
/// created or committed. Envelopes carrying any other event type are
/// not eligible for processing.
pub const BLOB_CREATED: &str = "Microsoft.Storage.BlobCreated";

/// A parsed storage-change notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// The kind of storage change this notification describes.
    pub event_type: String,

    /// The resource the notification refers to.
    pub subject: String,

    /// The opaque event payload; its shape depends on the event type.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parses the body of a queue message into envelopes. The
    /// notification gateway delivers either a single notification
    /// object or an array of them.
    pub fn from_message(body: &str) -> Result<Vec<Self>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<Envelope>),
            One(Envelope),
        }
        match serde_json::from_str(body).context("Failed to parse the notification body")? {
            OneOrMany::Many(envelopes) => Ok(envelopes),
            OneOrMany::One(envelope) => Ok(vec![envelope]),
        }
    }

    /// Whether this envelope announces a created blob.
    pub fn is_blob_created(&self) -> bool {
        self.event_type == BLOB_CREATED
    }

    /// Decode the opaque payload into a blob-created descriptor.
    pub fn blob_created(&self) -> Result<BlobCreated> {
        serde_json::from_value(self.data.clone())
            .context("Failed to decode the blob-created event data")
    }
}

/// The decoded payload of a blob-created notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobCreated {
    /// The full resource URL of the created blob.
    pub url: String,

    /// The upload API that produced the blob.
    pub api: String,

    /// The declared content type.
    #[serde(default)]
    pub content_type: String,

    /// The declared size in bytes.
    #[serde(default)]
    pub content_length: i64,
}

/// The location of a blob, decomposed from a notification's resource
/// URL: the first path segment names the bucket, the remainder is the
/// object key.
#[derive(Debug, PartialEq, Eq)]
pub struct BlobPath {
    pub bucket: String,
    pub key: String,
}

impl BlobPath {
    /// Decompose a resource URL. Fails if the URL's path doesn't
    /// contain at least a bucket and a key. Query and fragment
    /// components are not part of the blob path.
    pub fn from_url(url: &str) -> Result<Self> {
        let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        let path_end = after_scheme
            .find(&['?', '#'][..])
            .unwrap_or(after_scheme.len());
        let after_scheme = &after_scheme[..path_end];
        let path = after_scheme
            .split_once('/')
            .map(|(_, path)| path)
            .ok_or_else(|| anyhow!("Blob URL {:?} has no path", url))?;
        let (bucket, key) = path.split_once('/').ok_or_else(|| {
            anyhow!("Blob URL {:?} doesn't name both a bucket and a key", url)
        })?;
        if bucket.is_empty() || key.is_empty() {
            return Err(anyhow!(
                "Blob URL {:?} contains an empty bucket or key segment",
                url
            ));
        }
        Ok(BlobPath {
            bucket: String::from(bucket),
            key: String::from(key),
        })
    }
}
