//! Defines configuration as read from the environment.

use aws_config::{from_env, SdkConfig};
use serde::Deserialize;
use std::env;

/// Default `accepted_upload_apis` value.
fn default_accepted_upload_apis() -> Vec<String> {
    vec![String::from("SftpCommit")]
}

/// Default `filter_upload_apis` value.
fn default_filter_upload_apis() -> bool {
    true
}

/// Default `target_bucket` value.
fn default_target_bucket() -> String {
    String::from("filtered-csv")
}

/// The bridge is configured to consume blob-created notifications
/// from a queue, screen them, process the referenced blobs, and
/// publish processing events. The configuration must be given as
/// environment variables.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Defines the upload-API identifiers admitted for processing,
    /// given as a comma-separated list. Upload front-ends notify both
    /// when an upload starts (`SftpCreate`, the object may still be
    /// incomplete) and when it finishes (`SftpCommit`). Only the
    /// completion marker is accepted by default, so that a logical
    /// upload is processed once, and only once it is whole.
    #[serde(default = "default_accepted_upload_apis")]
    pub accepted_upload_apis: Vec<String>,

    /// Defines whether admission filtering by upload API is applied
    /// at all. Disabling it admits every blob-created notification.
    #[serde(default = "default_filter_upload_apis")]
    pub filter_upload_apis: bool,

    /// Defines the bucket that receives derived blobs.
    #[serde(default = "default_target_bucket")]
    pub target_bucket: String,

    /// Defines the queue that receives processing events. If
    /// omitted, event emission is skipped.
    #[serde(default)]
    pub event_queue_url: Option<String>,
}

impl Settings {
    /// Read the settings from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(envy::from_env()?)
    }
}

/// Assemble the AWS service configuration shared by the storage and
/// queue clients, honoring endpoint overrides so that the bridge can
/// be pointed at S3-compatible endpoints.
pub async fn aws_service_config() -> SdkConfig {
    let endpoint_url_var = env::var("AWS_ENDPOINT_URL");
    if let Ok(endpoint_url) = endpoint_url_var {
        from_env()
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region("us-east-1") // should be OK since the endpoint was overridden
            .load()
            .await
    } else {
        from_env().load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_vars(vars: Vec<(&str, &str)>) -> Settings {
        envy::from_iter(
            vars.into_iter()
                .map(|(k, v)| (String::from(k), String::from(v))),
        )
        .expect("settings should parse")
    }

    #[test]
    fn defaults_accept_only_the_commit_marker() {
        let settings = from_vars(Vec::new());
        assert_eq!(settings.accepted_upload_apis, vec!["SftpCommit"]);
        assert!(settings.filter_upload_apis);
        assert_eq!(settings.target_bucket, "filtered-csv");
        assert!(settings.event_queue_url.is_none());
    }

    #[test]
    fn accepted_apis_are_read_as_a_comma_separated_list() {
        let settings = from_vars(vec![("ACCEPTED_UPLOAD_APIS", "SftpCreate,SftpCommit")]);
        assert_eq!(
            settings.accepted_upload_apis,
            vec!["SftpCreate", "SftpCommit"]
        );
    }

    #[test]
    fn filtering_can_be_disabled() {
        let settings = from_vars(vec![("FILTER_UPLOAD_APIS", "false")]);
        assert!(!settings.filter_upload_apis);
    }

    #[test]
    fn event_queue_url_is_optional() {
        let settings = from_vars(vec![(
            "EVENT_QUEUE_URL",
            "https://sqs.us-east-1.example.com/1/processed-blobs",
        )]);
        assert_eq!(
            settings.event_queue_url.as_deref(),
            Some("https://sqs.us-east-1.example.com/1/processed-blobs")
        );
    }
}
