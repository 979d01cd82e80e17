use std::path::Path;

use crate::{
    logging,
    metadata::{
        error::LoadMetadataError,
        metadata_document::{MetadataDocument, MetadataSource},
    },
    vcs::{GitStateError, MasterlistRevision, VcsClient},
};

/// A metadata document plus the provenance of the file it was loaded from.
#[derive(Debug)]
pub(crate) struct Masterlist {
    document: MetadataDocument,
    revision: Option<MasterlistRevision>,
    branch: Option<String>,
}

impl Masterlist {
    pub(crate) fn new() -> Self {
        Self {
            document: MetadataDocument::new(MetadataSource::Masterlist),
            revision: None,
            branch: None,
        }
    }

    pub(crate) fn document(&self) -> &MetadataDocument {
        &self.document
    }

    /// Load the masterlist from the given path, replacing any previously
    /// loaded data. Loading directly does not record any provenance.
    pub(crate) fn load(&mut self, path: &Path) -> Result<(), LoadMetadataError> {
        let mut document = MetadataDocument::new(MetadataSource::Masterlist);
        document.load(path)?;

        self.document = document;
        self.revision = None;

        Ok(())
    }

    /// Update the masterlist file at the given path from the given remote
    /// repository branch, then load the new contents.
    ///
    /// Returns `true` if the on-disk masterlist changed. The in-memory
    /// masterlist is only replaced once the new file has parsed successfully,
    /// so a parse failure leaves the previously loaded data in effect.
    pub(crate) fn update(
        &mut self,
        path: &Path,
        remote_url: &str,
        branch: &str,
        client: &dyn VcsClient,
    ) -> Result<bool, UpdateMasterlistError> {
        let changed = client.update(path, remote_url, branch)?;

        if !changed {
            logging::debug!(
                "The masterlist at \"{}\" is already up to date.",
                crate::escape_ascii(path)
            );
            return Ok(false);
        }

        let mut document = MetadataDocument::new(MetadataSource::Masterlist);
        document.load(path)?;

        self.document = document;
        self.branch = Some(branch.to_owned());
        self.revision = match client.revision(path, true) {
            Ok(revision) => Some(revision),
            Err(e) => {
                logging::error!(
                    "Failed to read the revision of the updated masterlist: {}",
                    logging::format_details(&e)
                );
                None
            }
        };

        Ok(true)
    }

    /// Get the revision recorded by the last successful update, if any.
    pub(crate) fn revision(&self) -> Option<&MasterlistRevision> {
        self.revision.as_ref()
    }

    /// Get the branch recorded by the last successful update, if any.
    pub(crate) fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }
}

/// Represents an error that occurred while updating a masterlist.
#[derive(Debug)]
#[non_exhaustive]
pub enum UpdateMasterlistError {
    GitStateError(GitStateError),
    LoadMetadataError(LoadMetadataError),
}

impl std::fmt::Display for UpdateMasterlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitStateError(_) => write!(f, "failed to update the masterlist file"),
            Self::LoadMetadataError(_) => write!(f, "failed to load the updated masterlist"),
        }
    }
}

impl std::error::Error for UpdateMasterlistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::GitStateError(e) => Some(e),
            Self::LoadMetadataError(e) => Some(e),
        }
    }
}

impl From<GitStateError> for UpdateMasterlistError {
    fn from(value: GitStateError) -> Self {
        UpdateMasterlistError::GitStateError(value)
    }
}

impl From<LoadMetadataError> for UpdateMasterlistError {
    fn from(value: LoadMetadataError) -> Self {
        UpdateMasterlistError::LoadMetadataError(value)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    /// A fake client that copies a "remote" file into place.
    struct FakeVcsClient {
        remote_content: Option<String>,
        revision: MasterlistRevision,
    }

    impl VcsClient for FakeVcsClient {
        fn update(
            &self,
            local_path: &Path,
            _remote_url: &str,
            _branch: &str,
        ) -> Result<bool, GitStateError> {
            let Some(content) = &self.remote_content else {
                return Err(GitStateError::new("network failure".into()));
            };

            let existing = std::fs::read_to_string(local_path).ok();
            if existing.as_deref() == Some(content) {
                return Ok(false);
            }

            std::fs::write(local_path, content)
                .map_err(|e| GitStateError::with_source("write failed".into(), Box::new(e)))?;

            Ok(true)
        }

        fn revision(
            &self,
            _local_path: &Path,
            _short: bool,
        ) -> Result<MasterlistRevision, GitStateError> {
            Ok(self.revision.clone())
        }

        fn is_latest(&self, _local_path: &Path, _branch: &str) -> Result<bool, GitStateError> {
            Ok(true)
        }
    }

    fn masterlist_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("masterlist.yaml")
    }

    #[test]
    fn update_should_load_the_new_file_and_record_provenance_when_contents_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = masterlist_path(&dir);

        let client = FakeVcsClient {
            remote_content: Some("bash_tags:\n  - Relev\n".into()),
            revision: MasterlistRevision::new("abc123".into(), "2024-05-01".into()),
        };

        let mut masterlist = Masterlist::new();
        let changed = masterlist
            .update(&path, "https://example.com/masterlist.git", "main", &client)
            .unwrap();

        assert!(changed);
        assert_eq!(&["Relev"], masterlist.document().bash_tags());
        assert_eq!("abc123", masterlist.revision().unwrap().id());
        assert_eq!(Some("main"), masterlist.branch());
    }

    #[test]
    fn update_should_return_false_and_not_load_when_contents_are_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = masterlist_path(&dir);
        std::fs::write(&path, "bash_tags:\n  - Relev\n").unwrap();

        let client = FakeVcsClient {
            remote_content: Some("bash_tags:\n  - Relev\n".into()),
            revision: MasterlistRevision::default(),
        };

        let mut masterlist = Masterlist::new();
        let changed = masterlist
            .update(&path, "https://example.com/masterlist.git", "main", &client)
            .unwrap();

        assert!(!changed);
        assert!(masterlist.document().bash_tags().is_empty());
    }

    #[test]
    fn update_should_keep_the_loaded_masterlist_if_the_client_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = masterlist_path(&dir);
        std::fs::write(&path, "bash_tags:\n  - Relev\n").unwrap();

        let mut masterlist = Masterlist::new();
        masterlist.load(&path).unwrap();

        let client = FakeVcsClient {
            remote_content: None,
            revision: MasterlistRevision::default(),
        };

        let result = masterlist.update(&path, "https://example.com/masterlist.git", "main", &client);

        assert!(matches!(
            result,
            Err(UpdateMasterlistError::GitStateError(_))
        ));
        assert_eq!(&["Relev"], masterlist.document().bash_tags());
    }

    #[test]
    fn update_should_keep_the_loaded_masterlist_if_the_new_file_does_not_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = masterlist_path(&dir);
        std::fs::write(&path, "bash_tags:\n  - Relev\n").unwrap();

        let mut masterlist = Masterlist::new();
        masterlist.load(&path).unwrap();

        let client = FakeVcsClient {
            remote_content: Some("unknown_key:\n  - a\n".into()),
            revision: MasterlistRevision::default(),
        };

        let result = masterlist.update(&path, "https://example.com/masterlist.git", "main", &client);

        assert!(matches!(
            result,
            Err(UpdateMasterlistError::LoadMetadataError(_))
        ));
        assert_eq!(&["Relev"], masterlist.document().bash_tags());
    }
}
