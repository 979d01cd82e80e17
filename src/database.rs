use std::path::Path;

use crate::{
    conditions::{ConditionEvaluationError, State},
    logging,
    masterlist::{Masterlist, UpdateMasterlistError},
    metadata::{
        File, Group, Message, PluginCleaningData, PluginMetadata, Tag,
        error::{LoadMetadataError, RegexError, WriteMetadataError, WriteMetadataErrorReason},
        metadata_document::{MetadataDocument, MetadataSource},
    },
    vcs::{GitStateError, MasterlistRevision, VcsClient},
};

/// Control behaviour when writing to files.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum WriteMode {
    /// Create the file if it does not exist, otherwise error.
    Create,
    /// Create the file if it does not exist, otherwise replace its contents.
    CreateOrTruncate,
}

/// The interface through which metadata can be accessed.
#[derive(Debug)]
pub struct Database {
    masterlist: Masterlist,
    userlist: MetadataDocument,
    condition_evaluator_state: State,
}

impl Database {
    #[must_use]
    pub(crate) fn new(condition_evaluator_state: State) -> Self {
        Self {
            masterlist: Masterlist::new(),
            userlist: MetadataDocument::new(MetadataSource::User),
            condition_evaluator_state,
        }
    }

    pub(crate) fn condition_evaluator_state_mut(&mut self) -> &mut State {
        &mut self.condition_evaluator_state
    }

    pub(crate) fn clear_condition_cache(&self) {
        self.condition_evaluator_state.clear_condition_cache();
    }

    /// Loads the masterlist and/or userlist from the given paths.
    ///
    /// Either path may be `None` to leave the corresponding list untouched. A
    /// given path that does not point to a readable metadata file is an
    /// error.
    pub fn load_lists(
        &mut self,
        masterlist_path: Option<&Path>,
        userlist_path: Option<&Path>,
    ) -> Result<(), LoadMetadataError> {
        if let Some(path) = masterlist_path {
            self.load_masterlist(path)?;
        }

        if let Some(path) = userlist_path {
            self.load_userlist(path)?;
        }

        Ok(())
    }

    /// Loads the masterlist from the given path.
    ///
    /// Replaces any existing data that was previously loaded from a
    /// masterlist.
    pub fn load_masterlist(&mut self, path: &Path) -> Result<(), LoadMetadataError> {
        self.masterlist.load(path)
    }

    /// Loads the userlist from the given path.
    ///
    /// Replaces any existing data that was previously loaded from a userlist.
    pub fn load_userlist(&mut self, path: &Path) -> Result<(), LoadMetadataError> {
        let mut userlist = MetadataDocument::new(MetadataSource::User);
        userlist.load(path)?;

        self.userlist = userlist;

        Ok(())
    }

    /// Update the masterlist file at the given path from the given remote
    /// repository branch, using the given version control client.
    ///
    /// Returns `true` if the on-disk masterlist changed. On a successful
    /// update the new masterlist replaces the loaded masterlist atomically:
    /// either the previous masterlist remains fully in effect, or the new one
    /// is. Updating the masterlist clears the condition cache.
    pub fn update_masterlist(
        &mut self,
        path: &Path,
        remote_url: &str,
        branch: &str,
        client: &dyn VcsClient,
    ) -> Result<bool, UpdateMasterlistError> {
        let changed = self.masterlist.update(path, remote_url, branch, client)?;

        if changed {
            self.clear_condition_cache();
        }

        Ok(changed)
    }

    /// Get the revision recorded when the loaded masterlist was last updated,
    /// if it has been updated.
    pub fn masterlist_revision(&self) -> Option<&MasterlistRevision> {
        self.masterlist.revision()
    }

    /// Get the branch that the loaded masterlist was last updated from, if it
    /// has been updated.
    pub fn masterlist_branch(&self) -> Option<&str> {
        self.masterlist.branch()
    }

    /// Check if the masterlist file at the given path is at the latest
    /// revision of the given branch.
    pub fn is_latest_masterlist(
        &self,
        path: &Path,
        branch: &str,
        client: &dyn VcsClient,
    ) -> Result<bool, GitStateError> {
        client.is_latest(path, branch)
    }

    /// Writes a metadata file containing all loaded user-added metadata.
    ///
    /// If the path already exists, it is only overwritten if `mode` is
    /// [WriteMode::CreateOrTruncate].
    pub fn write_user_metadata(
        &self,
        output_path: &Path,
        mode: WriteMode,
    ) -> Result<(), WriteMetadataError> {
        validate_write_path(output_path, mode)?;

        self.userlist.save(output_path)
    }

    /// Writes a metadata file that only contains plugin Bash Tag suggestions
    /// and dirty info.
    ///
    /// If the path already exists, it is only overwritten if `mode` is
    /// [WriteMode::CreateOrTruncate].
    pub fn write_minimal_list(
        &self,
        output_path: &Path,
        mode: WriteMode,
    ) -> Result<(), WriteMetadataError> {
        validate_write_path(output_path, mode)?;

        let mut doc = MetadataDocument::new(MetadataSource::Masterlist);

        for plugin in self.masterlist.document().plugins_iter() {
            let Ok(mut minimal_plugin) = PluginMetadata::new(plugin.name()) else {
                // This should never happen because the regex plugin name from
                // an existing PluginMetadata object must be valid.
                logging::error!(
                    "Unexpectedly encountered a regex error trying to create a PluginMetadata object with the name {}",
                    plugin.name()
                );
                continue;
            };
            minimal_plugin.set_tags(plugin.tags().to_vec());
            minimal_plugin.set_dirty_info(plugin.dirty_info().to_vec());

            doc.set_plugin_metadata(minimal_plugin);
        }

        doc.save(output_path)
    }

    /// Evaluate the given condition string.
    pub fn evaluate(&self, condition: &str) -> Result<bool, ConditionEvaluationError> {
        self.condition_evaluator_state.evaluate(condition)
    }

    /// Gets the Bash Tags that are listed in the loaded metadata lists.
    ///
    /// The result is the union of the masterlist's and userlist's sets of
    /// known tags. Bash Tag suggestions can include Bash Tags not in this
    /// list.
    pub fn known_bash_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();

        for tag in self
            .masterlist
            .document()
            .bash_tags()
            .iter()
            .chain(self.userlist.bash_tags())
        {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        tags
    }

    /// Get all general messages listed in the loaded metadata lists, with the
    /// masterlist's messages before the userlist's.
    ///
    /// If `evaluate_conditions` is `true`, the condition cache is cleared and
    /// then each message is included iff its condition holds (or it has
    /// none).
    pub fn general_messages(
        &self,
        evaluate_conditions: bool,
    ) -> Result<Vec<Message>, ConditionEvaluationError> {
        let messages_iter = self
            .masterlist
            .document()
            .messages()
            .iter()
            .chain(self.userlist.messages());

        if evaluate_conditions {
            self.clear_condition_cache();

            let mut messages = Vec::new();
            for message in messages_iter {
                if self.holds(message.condition())? {
                    messages.push(message.clone());
                }
            }

            Ok(messages)
        } else {
            Ok(messages_iter.cloned().collect())
        }
    }

    /// Gets the groups that are defined in the loaded metadata lists.
    ///
    /// If `include_user_metadata` is `true`, any group metadata present in
    /// the userlist is included in the returned metadata, otherwise the
    /// metadata returned only includes metadata from the masterlist.
    pub fn groups(&self, include_user_metadata: bool) -> Vec<Group> {
        if include_user_metadata {
            merge_groups(self.masterlist.document().groups(), self.userlist.groups())
        } else {
            self.masterlist.document().groups().to_vec()
        }
    }

    /// Gets the groups that are defined or extended in the loaded userlist.
    pub fn user_groups(&self) -> &[Group] {
        self.userlist.groups()
    }

    /// Sets the group definitions to store in the userlist, replacing any
    /// definitions already loaded from the userlist.
    pub fn set_user_groups(&mut self, groups: Vec<Group>) {
        self.userlist.set_groups(groups);
    }

    /// Get all of a plugin's loaded metadata.
    ///
    /// If `include_user_metadata` is `true`, the userlist's metadata for the
    /// plugin is merged into the masterlist's.
    ///
    /// If `evaluate_conditions` is `true`, each conditional metadata value is
    /// only included if its condition holds, and the condition strings are
    /// cleared from the returned copy. Evaluating plugin metadata conditions
    /// does **not** clear the condition cache.
    pub fn plugin_metadata(
        &self,
        plugin_name: &str,
        include_user_metadata: bool,
        evaluate_conditions: bool,
    ) -> Result<Option<PluginMetadata>, MetadataRetrievalError> {
        let mut metadata = self.masterlist.document().find_plugin(plugin_name)?;

        if include_user_metadata
            && let Some(user_metadata) = self.userlist.find_plugin(plugin_name)?
        {
            if let Some(metadata) = &mut metadata {
                metadata.merge_metadata(&user_metadata);
            } else {
                metadata = Some(user_metadata);
            }
        }

        match metadata {
            Some(metadata) if evaluate_conditions => {
                self.evaluate_all_conditions(metadata).map_err(Into::into)
            }
            metadata => Ok(metadata),
        }
    }

    /// Get a plugin's metadata loaded from the userlist alone.
    ///
    /// If `evaluate_conditions` is `true`, each conditional metadata value is
    /// only included if its condition holds, and the condition strings are
    /// cleared from the returned copy. Evaluating plugin metadata conditions
    /// does **not** clear the condition cache.
    pub fn plugin_user_metadata(
        &self,
        plugin_name: &str,
        evaluate_conditions: bool,
    ) -> Result<Option<PluginMetadata>, MetadataRetrievalError> {
        let metadata = self.userlist.find_plugin(plugin_name)?;

        match metadata {
            Some(metadata) if evaluate_conditions => {
                self.evaluate_all_conditions(metadata).map_err(Into::into)
            }
            metadata => Ok(metadata),
        }
    }

    /// Sets a plugin's user metadata, replacing any loaded user metadata for
    /// that plugin.
    pub fn set_plugin_user_metadata(&mut self, plugin_metadata: PluginMetadata) {
        // Erase then add, so that the given metadata replaces rather than
        // merges with any existing user metadata for the plugin.
        self.userlist.remove_plugin_metadata(plugin_metadata.name());
        self.userlist.set_plugin_metadata(plugin_metadata);
    }

    /// Discards all loaded user metadata for the plugin with the given
    /// filename.
    pub fn discard_plugin_user_metadata(&mut self, plugin: &str) {
        self.userlist.remove_plugin_metadata(plugin);
    }

    /// Discards all loaded user metadata for all groups and plugins, and any
    /// user-added general messages and known bash tags.
    pub fn discard_all_user_metadata(&mut self) {
        self.userlist.clear();
    }

    fn holds(&self, condition: Option<&str>) -> Result<bool, ConditionEvaluationError> {
        match condition {
            Some(condition) => self.condition_evaluator_state.evaluate(condition),
            None => Ok(true),
        }
    }

    /// Resolve every conditional value in the given metadata, dropping the
    /// values whose conditions do not hold and clearing the condition strings
    /// of those that do.
    fn evaluate_all_conditions(
        &self,
        mut metadata: PluginMetadata,
    ) -> Result<Option<PluginMetadata>, ConditionEvaluationError> {
        metadata.set_load_after_files(self.filter_files(metadata.load_after_files())?);
        metadata.set_requirements(self.filter_files(metadata.requirements())?);
        metadata.set_incompatibilities(self.filter_files(metadata.incompatibilities())?);

        let mut messages: Vec<Message> = Vec::new();
        for message in metadata.messages() {
            if self.holds(message.condition())? {
                messages.push(message.clone().without_condition());
            }
        }
        metadata.set_messages(messages);

        let mut tags: Vec<Tag> = Vec::new();
        for tag in metadata.tags() {
            if self.holds(tag.condition())? {
                tags.push(tag.clone().without_condition());
            }
        }
        metadata.set_tags(tags);

        if !metadata.is_regex_plugin() {
            let dirty_info = self.filter_dirty_info(metadata.name(), metadata.dirty_info())?;
            metadata.set_dirty_info(dirty_info);
        }

        if metadata.has_name_only() {
            Ok(None)
        } else {
            Ok(Some(metadata))
        }
    }

    fn filter_files(&self, files: &[File]) -> Result<Vec<File>, ConditionEvaluationError> {
        let mut filtered = Vec::new();
        for file in files {
            if self.holds(file.condition())? {
                filtered.push(file.clone().without_condition());
            }
        }

        Ok(filtered)
    }

    /// A plugin is only dirty if the CRC of its installed file matches a
    /// recorded CRC, which is checked by evaluating a checksum condition so
    /// that the result is cached.
    fn filter_dirty_info(
        &self,
        plugin_name: &str,
        dirty_info: &[PluginCleaningData],
    ) -> Result<Vec<PluginCleaningData>, ConditionEvaluationError> {
        if plugin_name.is_empty() {
            return Ok(Vec::new());
        }

        let mut filtered = Vec::new();
        for info in dirty_info {
            let condition = format!("checksum(\"{}\", {:08X})", plugin_name, info.crc());

            if self.condition_evaluator_state.evaluate(&condition)? {
                filtered.push(info.clone());
            }
        }

        Ok(filtered)
    }
}

fn validate_write_path(output_path: &Path, mode: WriteMode) -> Result<(), WriteMetadataError> {
    if !output_path.parent().is_some_and(Path::exists) {
        Err(WriteMetadataError::new(
            output_path.into(),
            WriteMetadataErrorReason::ParentDirectoryNotFound,
        ))
    } else if mode == WriteMode::Create && output_path.exists() {
        Err(WriteMetadataError::new(
            output_path.into(),
            WriteMetadataErrorReason::PathAlreadyExists,
        ))
    } else {
        Ok(())
    }
}

fn merge_groups(lhs: &[Group], rhs: &[Group]) -> Vec<Group> {
    let mut groups = lhs.to_vec();

    let mut new_groups = Vec::new();

    for rhs_group in rhs {
        if let Some(group) = groups.iter_mut().find(|g| g.name() == rhs_group.name()) {
            if !rhs_group.after_groups().is_empty() {
                let mut after_groups = group.after_groups().to_vec();
                after_groups.extend_from_slice(rhs_group.after_groups());

                *group = Group::new(group.name().to_owned()).with_after_groups(after_groups);
            }
        } else {
            new_groups.push(rhs_group.clone());
        }
    }

    groups.extend(new_groups);

    groups
}

/// Represents an error that occurred while retrieving metadata for a plugin.
#[derive(Debug)]
#[non_exhaustive]
pub enum MetadataRetrievalError {
    ConditionEvaluationError(ConditionEvaluationError),
    RegexError(RegexError),
}

impl std::fmt::Display for MetadataRetrievalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to retrieve metadata")
    }
}

impl std::error::Error for MetadataRetrievalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConditionEvaluationError(e) => Some(e),
            Self::RegexError(e) => Some(e),
        }
    }
}

impl From<ConditionEvaluationError> for MetadataRetrievalError {
    fn from(value: ConditionEvaluationError) -> Self {
        MetadataRetrievalError::ConditionEvaluationError(value)
    }
}

impl From<RegexError> for MetadataRetrievalError {
    fn from(value: RegexError) -> Self {
        MetadataRetrievalError::RegexError(value)
    }
}
