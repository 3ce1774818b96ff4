//! Defines the admission filter that gates which blob-created
//! notifications proceed to processing.

use crate::conf::Settings;
use std::collections::HashSet;

/// Decides whether a blob-created notification should be processed,
/// based on the upload API that produced the blob. Admission is a
/// case-sensitive exact membership test against the accepted set; an
/// empty set admits everything. The filter holds no mutable state and
/// is safe to consult concurrently.
#[derive(Debug)]
pub struct AdmissionFilter {
    accepted: HashSet<String>,
}

impl AdmissionFilter {
    /// Build a filter accepting the given upload-API identifiers.
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AdmissionFilter {
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the filter described by the settings. Disabled filtering
    /// maps to an empty accepted set.
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.filter_upload_apis {
            Self::new(settings.accepted_upload_apis.iter().cloned())
        } else {
            Self::new(Vec::<String>::new())
        }
    }

    /// Whether a notification produced by the given upload API should
    /// be processed. Rejection is not an error: the caller discards
    /// the notification and considers it handled.
    pub fn admits(&self, api: &str) -> bool {
        self.accepted.is_empty() || self.accepted.contains(api)
    }
}
