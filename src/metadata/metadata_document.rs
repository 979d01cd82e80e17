use std::{collections::HashMap, path::Path};

use saphyr::{LoadableYamlNode, MarkedYaml, YamlData};

use crate::{escape_ascii, logging};

use super::{
    error::{
        ExpectedType, LoadMetadataError, MetadataDocumentParsingError, ParseMetadataError,
        RegexError, WriteMetadataError,
    },
    file::Filename,
    group::Group,
    message::Message,
    plugin_metadata::PluginMetadata,
    yaml::{YamlObjectType, get_as_slice, reject_unknown_keys},
    yaml_emit::{EmitYaml, YamlEmitter},
};

/// Identifies which list a document's metadata came from. Priorities read
/// from a userlist are marked as user-sourced so that merges and sort
/// tie-breaks can distinguish them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum MetadataSource {
    Masterlist,
    User,
}

#[derive(Clone, Debug)]
pub(crate) struct MetadataDocument {
    source: MetadataSource,
    bash_tags: Vec<String>,
    groups: Vec<Group>,
    messages: Vec<Message>,
    plugins: HashMap<Filename, PluginMetadata>,
    regex_plugins: Vec<PluginMetadata>,
}

impl MetadataDocument {
    pub(crate) fn new(source: MetadataSource) -> Self {
        Self {
            source,
            bash_tags: Vec::new(),
            groups: vec![Group::default()],
            messages: Vec::new(),
            plugins: HashMap::new(),
            regex_plugins: Vec::new(),
        }
    }

    pub(crate) fn load(&mut self, file_path: &Path) -> Result<(), LoadMetadataError> {
        if !file_path.exists() {
            return Err(LoadMetadataError::new(
                file_path.into(),
                MetadataDocumentParsingError::PathNotFound,
            ));
        }

        logging::trace!("Loading file at \"{}\"", escape_ascii(file_path));

        let content = std::fs::read_to_string(file_path)
            .map_err(|e| LoadMetadataError::from_io_error(file_path.into(), e))?;

        self.load_from_str(&content)
            .map_err(|e| LoadMetadataError::new(file_path.into(), e))?;

        logging::trace!(
            "Successfully loaded metadata from file at \"{}\".",
            escape_ascii(file_path)
        );

        Ok(())
    }

    pub(crate) fn load_from_str(
        &mut self,
        string: &str,
    ) -> Result<(), MetadataDocumentParsingError> {
        let mut docs = MarkedYaml::load_from_str(string)?;

        let doc = docs.pop().ok_or(MetadataDocumentParsingError::NoDocuments)?;

        if !docs.is_empty() {
            return Err(MetadataDocumentParsingError::MoreThanOneDocument(
                docs.len() + 1,
            ));
        }

        let YamlData::Hash(doc) = &doc.data else {
            return Err(ParseMetadataError::unexpected_type(
                doc.span.start,
                YamlObjectType::MetadataDocument,
                ExpectedType::Map,
            )
            .into());
        };

        reject_unknown_keys(
            doc,
            &["bash_tags", "globals", "plugins", "groups"],
            YamlObjectType::MetadataDocument,
        )?;

        let mut plugins = HashMap::new();
        let mut regex_plugins = Vec::new();
        for plugin_yaml in get_as_slice(doc, "plugins", YamlObjectType::MetadataDocument)? {
            let mut plugin = PluginMetadata::try_from(plugin_yaml)?;

            if self.source == MetadataSource::User {
                plugin.mark_priorities_as_user_metadata();
            }

            if plugin.is_regex_plugin() {
                regex_plugins.push(plugin);
            } else {
                let filename = Filename::new(plugin.name().to_owned());
                if let Some(old) = plugins.insert(filename, plugin) {
                    return Err(ParseMetadataError::duplicate_entry(
                        plugin_yaml.span.start,
                        old.name().to_owned(),
                        YamlObjectType::PluginMetadata,
                    )
                    .into());
                }
            }
        }

        let messages = get_as_slice(doc, "globals", YamlObjectType::MetadataDocument)?
            .iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut bash_tags = Vec::new();
        for bash_tag_yaml in get_as_slice(doc, "bash_tags", YamlObjectType::MetadataDocument)? {
            let bash_tag = match bash_tag_yaml.data.as_str() {
                Some(b) => b,
                None => {
                    return Err(ParseMetadataError::unexpected_type(
                        bash_tag_yaml.span.start,
                        YamlObjectType::BashTagsElement,
                        ExpectedType::String,
                    )
                    .into());
                }
            };

            bash_tags.push(bash_tag.to_owned());
        }

        let mut group_names = std::collections::HashSet::new();
        let mut groups = Vec::new();
        for group_yaml in get_as_slice(doc, "groups", YamlObjectType::MetadataDocument)? {
            let group = Group::try_from(group_yaml)?;

            if !group_names.insert(group.name().to_owned()) {
                return Err(ParseMetadataError::duplicate_entry(
                    group_yaml.span.start,
                    group.name().to_owned(),
                    YamlObjectType::Group,
                )
                .into());
            }

            groups.push(group);
        }

        if !group_names.contains(Group::DEFAULT_NAME) {
            groups.insert(0, Group::default());
        }

        self.plugins = plugins;
        self.regex_plugins = regex_plugins;
        self.messages = messages;
        self.bash_tags = bash_tags;
        self.groups = groups;

        Ok(())
    }

    pub(crate) fn save(&self, file_path: &Path) -> Result<(), WriteMetadataError> {
        logging::trace!("Saving metadata list to: \"{}\"", escape_ascii(file_path));

        let mut emitter = YamlEmitter::new();

        emitter.begin_map();

        if !self.bash_tags.is_empty() {
            emitter.map_key("bash_tags");

            emitter.begin_array();
            for tag in &self.bash_tags {
                emitter.unquoted_str(tag);
            }
            emitter.end_array();
        }

        if self.groups.len() > 1 {
            emitter.map_key("groups");
            self.groups.emit_yaml(&mut emitter);
        }

        if !self.messages.is_empty() {
            emitter.map_key("globals");
            self.messages.emit_yaml(&mut emitter);
        }

        let plugins: Vec<_> = self
            .plugins_iter()
            .filter(|p| !p.has_name_only())
            .cloned()
            .collect();
        if !plugins.is_empty() {
            emitter.map_key("plugins");
            plugins.emit_yaml(&mut emitter);
        }

        emitter.end_map();

        let mut contents = emitter.into_string();
        if contents.is_empty() {
            contents = "{}".into();
        }
        contents.push('\n');

        std::fs::write(file_path, contents)
            .map_err(|e| WriteMetadataError::new(file_path.into(), e.into()))?;

        Ok(())
    }

    pub(crate) fn bash_tags(&self) -> &[String] {
        &self.bash_tags
    }

    pub(crate) fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub(crate) fn set_groups(&mut self, groups: Vec<Group>) {
        // Ensure that the default group is present.
        let default_group_exists = groups.iter().any(|g| g.name() == Group::DEFAULT_NAME);

        if default_group_exists {
            self.groups = groups;
        } else {
            self.groups.clear();
            self.groups.push(Group::default());
            self.groups.extend(groups);
        }
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Iterates over exact-name entries in name order, then regex entries in
    /// declaration order, so that iteration is deterministic.
    pub(crate) fn plugins_iter(&self) -> impl Iterator<Item = &PluginMetadata> {
        let mut plugins: Vec<_> = self.plugins.values().collect();
        plugins.sort_by_key(|p| Filename::new(p.name().to_owned()));

        plugins.into_iter().chain(self.regex_plugins.iter())
    }

    pub(crate) fn find_plugin(
        &self,
        plugin_name: &str,
    ) -> Result<Option<PluginMetadata>, RegexError> {
        let mut metadata = match self.plugins.get(&Filename::new(plugin_name.to_owned())) {
            Some(m) => m.clone(),
            None => PluginMetadata::new(plugin_name)?,
        };

        // Any number of regex entries may also match the given name.
        for regex_plugin in &self.regex_plugins {
            if regex_plugin.name_matches(plugin_name) {
                metadata.merge_metadata(regex_plugin);
            }
        }

        if metadata.has_name_only() {
            Ok(None)
        } else {
            Ok(Some(metadata))
        }
    }

    pub(crate) fn set_plugin_metadata(&mut self, mut plugin_metadata: PluginMetadata) {
        if self.source == MetadataSource::User {
            plugin_metadata.mark_priorities_as_user_metadata();
        }

        if plugin_metadata.is_regex_plugin() {
            self.regex_plugins.push(plugin_metadata);
        } else {
            let filename = Filename::new(plugin_metadata.name().to_owned());
            self.plugins.insert(filename, plugin_metadata);
        }
    }

    pub(crate) fn remove_plugin_metadata(&mut self, plugin_name: &str) {
        let filename = Filename::new(plugin_name.to_owned());

        let was_removed = self.plugins.remove(&filename).is_some();

        // Only remove regex entries if no exact entry was removed, because
        // they're mutually exclusive.
        if !was_removed {
            self.regex_plugins
                .retain(|p| !unicase::eq(p.name(), plugin_name));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.bash_tags.clear();
        self.groups.clear();
        self.groups.push(Group::default());
        self.messages.clear();
        self.plugins.clear();
        self.regex_plugins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Priority, PrioritySource};

    const METADATA: &str = "
bash_tags:
  - Relev
  - Delev
globals:
  - type: say
    content: 'A general message'
groups:
  - name: group1
  - name: group2
    after:
      - group1
plugins:
  - name: Blank.esm
    priority: 5
  - name: 'Blank.+\\.esp'
    tag:
      - Relev
";

    fn document_from_str(source: MetadataSource, metadata: &str) -> MetadataDocument {
        let mut document = MetadataDocument::new(source);
        document.load_from_str(metadata).unwrap();
        document
    }

    mod load {
        use super::*;

        #[test]
        fn should_error_if_the_path_does_not_exist() {
            let mut document = MetadataDocument::new(MetadataSource::Masterlist);

            assert!(document.load(Path::new("missing/metadata.yaml")).is_err());
        }

        #[test]
        fn should_load_all_document_sections() {
            let document = document_from_str(MetadataSource::Masterlist, METADATA);

            assert_eq!(&["Relev", "Delev"], document.bash_tags());
            assert_eq!(1, document.messages().len());
            assert_eq!(3, document.groups().len());
            assert_eq!(Group::DEFAULT_NAME, document.groups()[0].name());
            assert_eq!(2, document.plugins_iter().count());
        }

        #[test]
        fn should_error_if_the_document_is_not_a_map() {
            let mut document = MetadataDocument::new(MetadataSource::Masterlist);

            assert!(document.load_from_str("- a\n- b").is_err());
        }

        #[test]
        fn should_error_if_the_document_has_an_unknown_key() {
            let mut document = MetadataDocument::new(MetadataSource::Masterlist);

            assert!(document.load_from_str("prelude:\n  - a").is_err());
        }

        #[test]
        fn should_error_if_there_are_duplicate_plugin_entries() {
            let mut document = MetadataDocument::new(MetadataSource::Masterlist);

            let metadata = "plugins:\n  - name: Blank.esm\n  - name: blank.esm";

            assert!(document.load_from_str(metadata).is_err());
        }

        #[test]
        fn should_error_if_there_are_duplicate_groups() {
            let mut document = MetadataDocument::new(MetadataSource::Masterlist);

            let metadata = "groups:\n  - name: group1\n  - name: group1";

            assert!(document.load_from_str(metadata).is_err());
        }

        #[test]
        fn should_error_if_a_condition_is_invalid() {
            let mut document = MetadataDocument::new(MetadataSource::Masterlist);

            let metadata = "globals:\n  - type: say\n    content: text\n    condition: invalid";

            assert!(document.load_from_str(metadata).is_err());
        }

        #[test]
        fn should_mark_priorities_as_user_metadata_if_the_source_is_user() {
            let masterlist = document_from_str(MetadataSource::Masterlist, METADATA);
            let userlist = document_from_str(MetadataSource::User, METADATA);

            let masterlist_priority = masterlist
                .find_plugin("Blank.esm")
                .unwrap()
                .unwrap()
                .priority();
            let userlist_priority = userlist
                .find_plugin("Blank.esm")
                .unwrap()
                .unwrap()
                .priority();

            assert_eq!(PrioritySource::Default, masterlist_priority.source());
            assert_eq!(PrioritySource::User, userlist_priority.source());
        }
    }

    mod find_plugin {
        use super::*;

        #[test]
        fn should_find_an_exact_entry_case_insensitively() {
            let document = document_from_str(MetadataSource::Masterlist, METADATA);

            let plugin = document.find_plugin("blank.esm").unwrap().unwrap();

            assert_eq!(Priority::new(5), plugin.priority());
        }

        #[test]
        fn should_merge_matching_regex_entries() {
            let document = document_from_str(MetadataSource::Masterlist, METADATA);

            let plugin = document.find_plugin("Blank - Different.esp").unwrap().unwrap();

            assert_eq!(1, plugin.tags().len());
        }

        #[test]
        fn should_return_none_if_no_metadata_exists() {
            let document = document_from_str(MetadataSource::Masterlist, METADATA);

            assert!(document.find_plugin("Other.esp").unwrap().is_none());
        }
    }

    mod set_plugin_metadata {
        use super::*;

        #[test]
        fn should_replace_an_existing_entry() {
            let mut document = document_from_str(MetadataSource::Masterlist, METADATA);

            let mut plugin = PluginMetadata::new("Blank.esm").unwrap();
            plugin.set_priority(Priority::new(10));
            document.set_plugin_metadata(plugin);

            let found = document.find_plugin("Blank.esm").unwrap().unwrap();
            assert_eq!(10, found.priority().value());
        }
    }

    mod remove_plugin_metadata {
        use super::*;

        #[test]
        fn should_remove_an_exact_entry() {
            let mut document = document_from_str(MetadataSource::Masterlist, METADATA);

            document.remove_plugin_metadata("Blank.esm");

            assert!(document.find_plugin("Blank.esm").unwrap().is_none());
        }

        #[test]
        fn should_remove_a_regex_entry_with_an_identical_name() {
            let mut document = document_from_str(MetadataSource::Masterlist, METADATA);

            document.remove_plugin_metadata("Blank.+\\.esp");

            assert!(document.find_plugin("Blank - Different.esp").unwrap().is_none());
        }
    }

    mod save {
        use super::*;

        #[test]
        fn should_error_if_the_path_cannot_be_written() {
            let document = MetadataDocument::new(MetadataSource::Masterlist);

            assert!(document.save(Path::new("missing/metadata.yaml")).is_err());
        }

        #[test]
        fn should_round_trip_the_document() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("metadata.yaml");

            let document = document_from_str(MetadataSource::Masterlist, METADATA);
            document.save(&path).unwrap();

            let mut reloaded = MetadataDocument::new(MetadataSource::Masterlist);
            reloaded.load(&path).unwrap();

            assert_eq!(document.bash_tags(), reloaded.bash_tags());
            assert_eq!(document.groups(), reloaded.groups());
            assert_eq!(document.messages(), reloaded.messages());
            assert_eq!(
                document.plugins_iter().cloned().collect::<Vec<_>>(),
                reloaded.plugins_iter().cloned().collect::<Vec<_>>()
            );
        }

        #[test]
        fn should_write_an_empty_flow_map_for_an_empty_document() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("metadata.yaml");

            let document = MetadataDocument::new(MetadataSource::User);
            document.save(&path).unwrap();

            assert_eq!("{}\n", std::fs::read_to_string(&path).unwrap());
        }
    }
}
