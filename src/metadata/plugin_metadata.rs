use fancy_regex::{Error as RegexImplError, Regex};
use saphyr::MarkedYaml;

use crate::{logging, regex};

use super::{
    error::{MetadataParsingErrorReason, ParseMetadataError, RegexError},
    file::File,
    location::Location,
    message::Message,
    plugin_cleaning_data::PluginCleaningData,
    priority::Priority,
    tag::Tag,
    yaml::{
        YamlObjectType, get_as_hash, get_as_slice, get_bool_value, get_i8_value,
        get_required_string_value, get_string_value, reject_unknown_keys,
    },
    yaml_emit::{EmitYaml, YamlEmitter},
};

pub(crate) const GHOST_FILE_EXTENSION: &str = ".ghost";

/// Represents a plugin's metadata.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PluginMetadata {
    name: PluginName,
    group: Option<String>,
    enabled: Option<bool>,
    priority: Priority,
    global_priority: Priority,
    load_after: Vec<File>,
    requirements: Vec<File>,
    incompatibilities: Vec<File>,
    messages: Vec<Message>,
    tags: Vec<Tag>,
    dirty_info: Vec<PluginCleaningData>,
    locations: Vec<Location>,
}

impl PluginMetadata {
    /// Construct a [PluginMetadata] object with no metadata for a plugin with
    /// the given filename.
    pub fn new(name: &str) -> Result<Self, RegexError> {
        Ok(Self {
            name: PluginName::new(name).map_err(RegexError::from)?,
            ..Default::default()
        })
    }

    /// Get the plugin name.
    pub fn name(&self) -> &str {
        &self.name.string
    }

    /// Get the plugin's group.
    ///
    /// The [Option] is `None` if no group is explicitly set.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Check if the plugin's metadata is enabled for use during sorting.
    ///
    /// Metadata is enabled by default.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Get the plugin's priority relative to other plugins in the same group.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get the plugin's priority relative to all other plugins.
    pub fn global_priority(&self) -> Priority {
        self.global_priority
    }

    /// Get the plugins that the plugin must load after.
    pub fn load_after_files(&self) -> &[File] {
        &self.load_after
    }

    /// Get the files that the plugin requires to be installed.
    pub fn requirements(&self) -> &[File] {
        &self.requirements
    }

    /// Get the files that the plugin is incompatible with.
    pub fn incompatibilities(&self) -> &[File] {
        &self.incompatibilities
    }

    /// Get the plugin's messages.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the plugin's Bash Tag suggestions.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Get the plugin's dirty plugin information.
    pub fn dirty_info(&self) -> &[PluginCleaningData] {
        &self.dirty_info
    }

    /// Get the locations at which this plugin can be found.
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Set the plugin's group.
    pub fn set_group(&mut self, group: &str) {
        self.group = Some(group.to_owned());
    }

    /// Unsets the plugin's group, so that it is implicitly a member of the
    /// default group.
    pub fn unset_group(&mut self) {
        self.group = None;
    }

    /// Set whether the plugin's metadata is enabled for use during sorting.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    /// Set the plugin's priority relative to other plugins in the same group.
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Set the plugin's priority relative to all other plugins.
    pub fn set_global_priority(&mut self, global_priority: Priority) {
        self.global_priority = global_priority;
    }

    /// Set the plugins that the plugin must load after.
    pub fn set_load_after_files(&mut self, files: Vec<File>) {
        self.load_after = files;
    }

    /// Set the files that the plugin requires to be installed.
    pub fn set_requirements(&mut self, files: Vec<File>) {
        self.requirements = files;
    }

    /// Set the files that the plugin is incompatible with.
    pub fn set_incompatibilities(&mut self, files: Vec<File>) {
        self.incompatibilities = files;
    }

    /// Set the plugin's messages.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Set the plugin's Bash Tag suggestions.
    pub fn set_tags(&mut self, tags: Vec<Tag>) {
        self.tags = tags;
    }

    /// Set the plugin's dirty plugin information.
    pub fn set_dirty_info(&mut self, dirty_info: Vec<PluginCleaningData>) {
        self.dirty_info = dirty_info;
    }

    /// Set the locations at which this plugin can be found.
    pub fn set_locations(&mut self, locations: Vec<Location>) {
        self.locations = locations;
    }

    /// Merge metadata from the given [PluginMetadata] object into this object.
    ///
    /// Scalar fields (group, enabled state and priorities) are replaced by the
    /// given object's values where those are explicitly set. Set-like fields
    /// are unioned without duplicating equal values, and messages are
    /// concatenated with this object's messages first.
    pub fn merge_metadata(&mut self, plugin: &PluginMetadata) {
        if plugin.has_name_only() {
            return;
        }

        if plugin.group.is_some() {
            self.group = plugin.group.clone();
        }

        if plugin.enabled.is_some() {
            self.enabled = plugin.enabled;
        }

        self.priority = self.priority.merge(plugin.priority);
        self.global_priority = self.global_priority.merge(plugin.global_priority);

        merge_vecs(&mut self.load_after, &plugin.load_after);
        merge_vecs(&mut self.requirements, &plugin.requirements);
        merge_vecs(&mut self.incompatibilities, &plugin.incompatibilities);
        merge_tags(&mut self.tags, &plugin.tags);
        self.messages.extend(plugin.messages.iter().cloned());
        merge_dirty_info(&mut self.dirty_info, &plugin.dirty_info);
        merge_vecs(&mut self.locations, &plugin.locations);
    }

    /// Check if no plugin metadata is set.
    pub fn has_name_only(&self) -> bool {
        self.group.is_none()
            && self.enabled.is_none()
            && !self.priority.is_set()
            && !self.global_priority.is_set()
            && self.load_after.is_empty()
            && self.requirements.is_empty()
            && self.incompatibilities.is_empty()
            && self.messages.is_empty()
            && self.tags.is_empty()
            && self.dirty_info.is_empty()
            && self.locations.is_empty()
    }

    /// Check if the plugin name is a regular expression.
    ///
    /// Returns `true` if the plugin name contains any of the characters
    /// `:\*?|` and `false` otherwise.
    pub fn is_regex_plugin(&self) -> bool {
        self.name.regex.is_some()
    }

    /// Check if the given plugin name matches this plugin metadata object's
    /// name field.
    ///
    /// If the name field is a regular expression, the given plugin name will
    /// be matched against it, otherwise the strings will be compared
    /// case-insensitively. The given plugin name must be literal, i.e. not a
    /// regular expression.
    pub fn name_matches(&self, other_name: &str) -> bool {
        if let Some(regex) = &self.name.regex {
            regex.is_match(other_name).unwrap_or_else(|e| {
                logging::error!(
                    "Encountered an error while trying to match the regex {} to the string {}: {}",
                    regex.as_str(),
                    other_name,
                    e
                );
                false
            })
        } else {
            unicase::eq(self.name.string.as_str(), other_name)
        }
    }

    /// Serialises the plugin metadata as YAML.
    pub fn as_yaml(&self) -> String {
        let mut emitter = YamlEmitter::new();
        self.emit_yaml(&mut emitter);
        emitter.into_string()
    }

    pub(crate) fn mark_priorities_as_user_metadata(&mut self) {
        self.priority = self.priority.into_user();
        self.global_priority = self.global_priority.into_user();
    }
}

#[derive(Clone, Debug, Default)]
struct PluginName {
    string: String,
    regex: Option<Regex>,
}

impl PluginName {
    fn new(name: &str) -> Result<Self, Box<RegexImplError>> {
        let name = trim_dot_ghost(name).to_owned();

        if is_regex_name(&name) {
            let regex = regex(&format!("^{}$", &name))?;
            Ok(Self {
                string: name,
                regex: Some(regex),
            })
        } else {
            Ok(Self {
                string: name,
                regex: None,
            })
        }
    }
}

impl std::cmp::PartialEq for PluginName {
    fn eq(&self, other: &Self) -> bool {
        self.string == other.string
    }
}

impl std::cmp::Eq for PluginName {}

impl std::cmp::PartialOrd for PluginName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::cmp::Ord for PluginName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.string.cmp(&other.string)
    }
}

impl std::hash::Hash for PluginName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.string.hash(state);
    }
}

pub(crate) fn trim_dot_ghost(string: &str) -> &str {
    if iends_with_ascii(string, GHOST_FILE_EXTENSION) {
        string.get(..string.len() - GHOST_FILE_EXTENSION.len()).unwrap_or(string)
    } else {
        string
    }
}

pub(crate) fn iends_with_ascii(string: &str, suffix: &str) -> bool {
    string.len() >= suffix.len()
        && string
            .as_bytes()
            .iter()
            .rev()
            .zip(suffix.as_bytes().iter().rev())
            .all(|(string_byte, suffix_byte)| string_byte.eq_ignore_ascii_case(suffix_byte))
}

fn is_regex_name(name: &str) -> bool {
    name.contains(|c| ":\\*?|".chars().any(|n| c == n))
}

fn merge_vecs<T: Clone + PartialEq>(target: &mut Vec<T>, source: &[T]) {
    let initial_target_len = target.len();
    for element in source {
        if !target.get(..initial_target_len).unwrap_or(&[]).contains(element) {
            target.push(element.clone());
        }
    }
}

// Tags are keyed on name and addition/removal, so a tag from the other
// object with a matching key replaces the existing suggestion whatever its
// condition, rather than duplicating it.
fn merge_tags(target: &mut Vec<Tag>, source: &[Tag]) {
    for tag in source {
        let existing = target
            .iter_mut()
            .find(|t| t.name() == tag.name() && t.is_addition() == tag.is_addition());

        if let Some(existing) = existing {
            *existing = tag.clone();
        } else {
            target.push(tag.clone());
        }
    }
}

// Cleaning data is keyed on CRC alone, so that a userlist entry for the same
// plugin version replaces rather than duplicates the masterlist's record.
fn merge_dirty_info(target: &mut Vec<PluginCleaningData>, source: &[PluginCleaningData]) {
    for element in source {
        if let Some(existing) = target.iter_mut().find(|t| t.crc() == element.crc()) {
            *existing = element.clone();
        } else {
            target.push(element.clone());
        }
    }
}

impl TryFrom<&MarkedYaml> for PluginMetadata {
    type Error = ParseMetadataError;

    fn try_from(value: &MarkedYaml) -> Result<Self, Self::Error> {
        let hash = get_as_hash(value, YamlObjectType::PluginMetadata)?;

        reject_unknown_keys(
            hash,
            &[
                "name",
                "group",
                "enabled",
                "priority",
                "global_priority",
                "after",
                "req",
                "inc",
                "msg",
                "tag",
                "dirty",
                "url",
            ],
            YamlObjectType::PluginMetadata,
        )?;

        let name = get_required_string_value(
            value.span.start,
            hash,
            "name",
            YamlObjectType::PluginMetadata,
        )?;
        let name = match PluginName::new(name) {
            Ok(n) => n,
            Err(e) => {
                return Err(ParseMetadataError::new(
                    value.span.start,
                    MetadataParsingErrorReason::InvalidRegex(e),
                ));
            }
        };

        let group = get_string_value(hash, "group", YamlObjectType::PluginMetadata)?;

        let enabled = get_bool_value(hash, "enabled", YamlObjectType::PluginMetadata)?;

        let priority = get_i8_value(hash, "priority", YamlObjectType::PluginMetadata)?
            .map_or_else(Priority::default, Priority::new);

        let global_priority = get_i8_value(hash, "global_priority", YamlObjectType::PluginMetadata)?
            .map_or_else(Priority::default, Priority::new);

        let load_after = get_vec::<File>(hash, "after")?;
        let requirements = get_vec::<File>(hash, "req")?;
        let incompatibilities = get_vec::<File>(hash, "inc")?;
        let messages = get_vec::<Message>(hash, "msg")?;
        let tags = get_vec::<Tag>(hash, "tag")?;
        let dirty_info = get_vec::<PluginCleaningData>(hash, "dirty")?;
        let locations = get_vec::<Location>(hash, "url")?;

        Ok(PluginMetadata {
            name,
            group: group.map(|g| g.1.to_owned()),
            enabled,
            priority,
            global_priority,
            load_after,
            requirements,
            incompatibilities,
            messages,
            tags,
            dirty_info,
            locations,
        })
    }
}

fn get_vec<'a, T: TryFrom<&'a MarkedYaml, Error = ParseMetadataError>>(
    hash: &'a saphyr::AnnotatedHash<MarkedYaml>,
    key: &'static str,
) -> Result<Vec<T>, ParseMetadataError> {
    get_as_slice(hash, key, YamlObjectType::PluginMetadata)?
        .iter()
        .map(T::try_from)
        .collect()
}

impl EmitYaml for PluginMetadata {
    fn emit_yaml(&self, emitter: &mut YamlEmitter) {
        emitter.begin_map();

        emitter.map_key("name");
        emitter.single_quoted_str(self.name());

        if let Some(group) = &self.group {
            emitter.map_key("group");
            emitter.single_quoted_str(group);
        }

        if let Some(enabled) = self.enabled {
            emitter.map_key("enabled");
            emitter.bool(enabled);
        }

        if self.priority.is_set() {
            emitter.map_key("priority");
            emitter.i8(self.priority.value());
        }

        if self.global_priority.is_set() {
            emitter.map_key("global_priority");
            emitter.i8(self.global_priority.value());
        }

        if !self.load_after.is_empty() {
            emitter.map_key("after");
            self.load_after.emit_yaml(emitter);
        }

        if !self.requirements.is_empty() {
            emitter.map_key("req");
            self.requirements.emit_yaml(emitter);
        }

        if !self.incompatibilities.is_empty() {
            emitter.map_key("inc");
            self.incompatibilities.emit_yaml(emitter);
        }

        if !self.messages.is_empty() {
            emitter.map_key("msg");
            self.messages.emit_yaml(emitter);
        }

        if !self.tags.is_empty() {
            emitter.map_key("tag");
            self.tags.emit_yaml(emitter);
        }

        if !self.dirty_info.is_empty() {
            emitter.map_key("dirty");
            self.dirty_info.emit_yaml(emitter);
        }

        if !self.locations.is_empty() {
            emitter.map_key("url");
            self.locations.emit_yaml(emitter);
        }

        emitter.end_map();
    }
}
