//! Defines the handler pipeline: screening of inbound notifications
//! and processing of admitted blobs.

use crate::client;
use crate::conf::{aws_service_config, Settings};
use crate::emit::{self, ProcessedEvent};
use crate::event::{BlobPath, Envelope};
use crate::filter::AdmissionFilter;
use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, instrument, warn};

/// The service clients used to process blobs, constructed once at
/// startup and passed by handle.
pub struct Clients {
    pub s3: aws_sdk_s3::Client,
    pub sqs: aws_sdk_sqs::Client,
}

impl Clients {
    /// Build both service clients from the shared AWS configuration.
    pub async fn build() -> Self {
        let config = aws_service_config().await;
        Clients {
            s3: aws_sdk_s3::Client::new(&config),
            sqs: aws_sdk_sqs::Client::new(&config),
        }
    }
}

/// The outcome of screening a notification envelope. Skips are not
/// errors: the triggering message counts as handled either way.
#[derive(Debug, PartialEq, Eq)]
pub enum Screened {
    /// The notification was admitted; process the blob at this
    /// location.
    Process { bucket: String, key: String },

    /// The notification was discarded for the stated reason.
    Skip(SkipReason),
}

/// Why a notification was discarded during screening.
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The event type is not a blob-created notification.
    NotBlobCreated,

    /// The data payload couldn't be decoded.
    UndecodablePayload,

    /// The upload API is not in the accepted set.
    UploadApiRejected,

    /// The resource URL doesn't name both a bucket and a key.
    UnparsableUrl,
}

/// An App is an initialized application state, derived from settings.
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The filter gating which notifications get processed.
    filter: AdmissionFilter,
}

impl App {
    /// Initialize an App instance given a settings struct. Consumes
    /// the settings struct.
    pub fn new(settings: Settings) -> Self {
        let filter = AdmissionFilter::from_settings(&settings);
        App { settings, filter }
    }

    /// Decide what to do with a notification envelope. All rejections
    /// are non-fatal: the caller acknowledges the triggering message
    /// regardless of the outcome.
    pub fn screen(&self, envelope: &Envelope) -> Screened {
        if !envelope.is_blob_created() {
            warn!("Received non-blob-created event: {}", envelope.event_type);
            return Screened::Skip(SkipReason::NotBlobCreated);
        }
        let descriptor = match envelope.blob_created() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Failed to decode blob-created event data: {:?}", e);
                return Screened::Skip(SkipReason::UndecodablePayload);
            }
        };
        info!(
            "Blob URL: {}, API: {}, content type: {}, content length: {}",
            descriptor.url, descriptor.api, descriptor.content_type, descriptor.content_length
        );
        if !self.filter.admits(&descriptor.api) {
            info!(
                "Ignoring event with API {:?}; only accepting {:?}",
                descriptor.api, self.settings.accepted_upload_apis
            );
            return Screened::Skip(SkipReason::UploadApiRejected);
        }
        match BlobPath::from_url(&descriptor.url) {
            Ok(path) => Screened::Process {
                bucket: path.bucket,
                key: path.key,
            },
            Err(e) => {
                warn!(
                    "Unable to parse the blob path from URL {:?}: {:?}",
                    descriptor.url, e
                );
                Screened::Skip(SkipReason::UnparsableUrl)
            }
        }
    }

    /// Handle the body of a single queue message: parse the contained
    /// notifications, screen each one, and process the admitted
    /// blobs. Malformed notifications are discarded and the message
    /// still counts as handled; only genuine processing failures
    /// produce an error, which makes the message eligible for
    /// redelivery.
    #[instrument(skip(self, body, clients))]
    pub async fn handle(&self, body: &str, clients: &Clients) -> Result<()> {
        let envelopes = match Envelope::from_message(body) {
            Ok(envelopes) => envelopes,
            Err(e) => {
                warn!("Discarding undecodable notification body: {:?}", e);
                return Ok(());
            }
        };
        for envelope in &envelopes {
            info!(
                "Event type: {}, subject: {}",
                envelope.event_type, envelope.subject
            );
            if let Screened::Process { bucket, key } = self.screen(envelope) {
                self.process(&bucket, &key, clients)
                    .await
                    .with_context(|| {
                        format!("Failed to process blob {:?} from bucket {:?}", key, bucket)
                    })?;
            }
        }
        Ok(())
    }

    /// Process a single admitted blob: read it from storage, apply
    /// the transformation, write the derived blob, and publish a
    /// processing event.
    async fn process(&self, bucket: &str, key: &str, clients: &Clients) -> Result<()> {
        let size = match client::exists(&clients.s3, bucket, key).await? {
            Some(size) => size,
            None => {
                warn!("Source blob does not exist: {}/{}", bucket, key);
                return Ok(());
            }
        };
        info!("Processing blob {}/{}, size: {} bytes", bucket, key, size);

        let mut source = client::open(&clients.s3, bucket, key).await?;
        let derived = transform(&mut source).await?;

        let derived_key = format!("{}_new_{}", Local::now().format("%Y%m%d%H%M%S"), key);
        client::ensure_bucket(&clients.s3, &self.settings.target_bucket).await?;
        info!(
            "Destination blob: {}/{}",
            self.settings.target_bucket, derived_key
        );
        client::upload(&clients.s3, &self.settings.target_bucket, &derived_key, derived).await?;

        if let Some(queue_url) = &self.settings.event_queue_url {
            emit::send(&clients.sqs, queue_url, &ProcessedEvent::new(key)).await?;
        } else {
            warn!("Event queue is not configured; skipping event emission");
        }
        Ok(())
    }
}

/// The transformation applied to a source blob to produce the derived
/// blob.
async fn transform(source: &mut (impl AsyncRead + Unpin)) -> Result<Vec<u8>> {
    // TODO: replace the pass-through with the real transformation
    let mut derived = Vec::new();
    source
        .read_to_end(&mut derived)
        .await
        .context("Failed to read the source blob stream")?;
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BLOB_CREATED;
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            accepted_upload_apis: vec![String::from("SftpCommit")],
            filter_upload_apis: true,
            target_bucket: String::from("filtered-csv"),
            event_queue_url: None,
        }
    }

    fn envelope(event_type: &str, data: serde_json::Value) -> Envelope {
        serde_json::from_value(json!({
            "eventType": event_type,
            "subject": "/storage/containers/landing/blobs/reports/daily.csv",
            "data": data
        }))
        .unwrap()
    }

    fn blob_created_data(api: &str, url: &str) -> serde_json::Value {
        json!({
            "url": url,
            "api": api,
            "contentType": "text/csv",
            "contentLength": 4096
        })
    }

    #[test]
    fn admits_a_committed_upload() {
        let app = App::new(settings());
        let screened = app.screen(&envelope(
            BLOB_CREATED,
            blob_created_data("SftpCommit", "https://store.example.com/landing/reports/daily.csv"),
        ));
        assert_eq!(
            screened,
            Screened::Process {
                bucket: String::from("landing"),
                key: String::from("reports/daily.csv"),
            }
        );
    }

    #[test]
    fn skips_other_event_types() {
        let app = App::new(settings());
        let screened = app.screen(&envelope(
            "Microsoft.Storage.BlobDeleted",
            blob_created_data("SftpCommit", "https://store.example.com/landing/daily.csv"),
        ));
        assert_eq!(screened, Screened::Skip(SkipReason::NotBlobCreated));
    }

    #[test]
    fn skips_an_undecodable_payload() {
        let app = App::new(settings());
        let screened = app.screen(&envelope(BLOB_CREATED, json!({"contentType": "text/csv"})));
        assert_eq!(screened, Screened::Skip(SkipReason::UndecodablePayload));
    }

    #[test]
    fn skips_an_upload_that_has_only_started() {
        let app = App::new(settings());
        let screened = app.screen(&envelope(
            BLOB_CREATED,
            blob_created_data("SftpCreate", "https://store.example.com/landing/daily.csv"),
        ));
        assert_eq!(screened, Screened::Skip(SkipReason::UploadApiRejected));
    }

    #[test]
    fn skips_a_url_without_enough_path_segments() {
        let app = App::new(settings());
        let screened = app.screen(&envelope(
            BLOB_CREATED,
            blob_created_data("SftpCommit", "https://store.example.com/landing"),
        ));
        assert_eq!(screened, Screened::Skip(SkipReason::UnparsableUrl));
    }

    #[test]
    fn disabled_filtering_admits_a_started_upload() {
        let app = App::new(Settings {
            filter_upload_apis: false,
            ..settings()
        });
        let screened = app.screen(&envelope(
            BLOB_CREATED,
            blob_created_data("SftpCreate", "https://store.example.com/landing/daily.csv"),
        ));
        assert_eq!(
            screened,
            Screened::Process {
                bucket: String::from("landing"),
                key: String::from("daily.csv"),
            }
        );
    }

    #[test]
    fn a_widened_accepted_set_admits_both_markers() {
        let app = App::new(Settings {
            accepted_upload_apis: vec![String::from("SftpCreate"), String::from("SftpCommit")],
            ..settings()
        });
        for api in ["SftpCreate", "SftpCommit"] {
            let screened = app.screen(&envelope(
                BLOB_CREATED,
                blob_created_data(api, "https://store.example.com/landing/daily.csv"),
            ));
            assert!(matches!(screened, Screened::Process { .. }));
        }
    }

    fn offline_clients() -> Clients {
        let config = aws_config::SdkConfig::builder().build();
        Clients {
            s3: aws_sdk_s3::Client::new(&config),
            sqs: aws_sdk_sqs::Client::new(&config),
        }
    }

    #[tokio::test]
    async fn an_undecodable_body_still_counts_as_handled() {
        let app = App::new(settings());
        let result = app.handle("not json at all", &offline_clients()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn a_rejected_notification_still_counts_as_handled() {
        let app = App::new(settings());
        let body = json!({
            "eventType": BLOB_CREATED,
            "subject": "/storage/containers/landing/blobs/reports/daily.csv",
            "data": blob_created_data(
                "SftpCreate",
                "https://store.example.com/landing/reports/daily.csv"
            )
        })
        .to_string();
        let result = app.handle(&body, &offline_clients()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn the_transformation_is_a_pass_through() {
        let mut source = &b"a,b,c\n1,2,3\n"[..];
        let derived = transform(&mut source).await.unwrap();
        assert_eq!(derived, b"a,b,c\n1,2,3\n");
    }
}
