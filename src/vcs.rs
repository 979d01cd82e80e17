//! The seam through which masterlist repositories are read and updated.
//!
//! Masterlists are distributed through version control, but this library does
//! not bundle a version control implementation: the host supplies one by
//! implementing [VcsClient], in the same way that it supplies the logging
//! sink.
use std::path::Path;

/// The identity of a masterlist revision: a revision ID and the ISO 8601 date
/// that it was committed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MasterlistRevision {
    id: String,
    date: String,
}

impl MasterlistRevision {
    /// Create a value from a revision ID and its ISO 8601 commit date.
    #[must_use]
    pub fn new(id: String, date: String) -> Self {
        Self { id, date }
    }

    /// Get the revision ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the date that the revision was committed, in ISO 8601 format.
    pub fn date(&self) -> &str {
        &self.date
    }
}

/// The operations a version control client must support for masterlist
/// management.
///
/// Implementations must be transactional: a failed [VcsClient::update] must
/// leave the on-disk masterlist untouched. An update may take seconds, so
/// implementations should check for a host-requested abort between network
/// chunks, though no in-flight guarantees are made.
pub trait VcsClient {
    /// Update the file at `local_path` from the given remote repository
    /// branch, returning `true` if the on-disk contents changed.
    fn update(
        &self,
        local_path: &Path,
        remote_url: &str,
        branch: &str,
    ) -> Result<bool, GitStateError>;

    /// Get the revision of the file at `local_path`. If `short` is true, a
    /// shortened form of the revision ID is returned.
    fn revision(&self, local_path: &Path, short: bool)
    -> Result<MasterlistRevision, GitStateError>;

    /// Check if the file at `local_path` is at the latest revision of the
    /// given branch.
    fn is_latest(&self, local_path: &Path, branch: &str) -> Result<bool, GitStateError>;
}

/// Represents an error in the state of a version-controlled masterlist, e.g.
/// a dirty working copy, an unknown branch or a network failure.
#[derive(Debug)]
pub struct GitStateError {
    message: Box<str>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl GitStateError {
    /// Create an error with the given message.
    #[must_use]
    pub fn new(message: String) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error with the given message and underlying cause.
    #[must_use]
    pub fn with_source(
        message: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }
}

impl std::fmt::Display for GitStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "version control operation failed: {}", self.message)
    }
}

impl std::error::Error for GitStateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
