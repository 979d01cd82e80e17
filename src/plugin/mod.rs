pub mod error;

use std::{
    fs::File,
    hash::Hasher,
    io::{BufRead, BufReader},
    path::Path,
    sync::LazyLock,
};

use esplugin::ParseOptions;
use fancy_regex::Regex;

use crate::{GameType, metadata::plugin_metadata::trim_dot_ghost, regex};
use error::{InvalidFilenameReason, LoadPluginError, PluginDataError};

static VERSION_REGEXES: LazyLock<Box<[Regex]>> = LazyLock::new(|| {
    /* The string below matches the range of version strings that the version
    comparison supports, excluding space separators, as they make version
    extraction from inside sentences very tricky and have not been
    seen "in the wild". */
    let version_regex_str = r"(\d+(?:\.\d+)+(?:[-._:]?[A-Za-z0-9]+)*)(?!,)";

    Box::new([
        /* The string below matches timestamps that use forwardslashes for date
        separators. However, the version comparison will only compare the first
        two digits as it does not recognise forwardslashes as separators. */
        regex(r"(\d{1,2}/\d{1,2}/\d{1,4} \d{1,2}:\d{1,2}:\d{1,2})")
            .expect("Hardcoded version timestamp regex should be valid"),
        regex(&(String::from(r"version:?\s") + version_regex_str))
            .expect("Hardcoded version-prefixed version regex should be valid"),
        regex(&(String::from(r"(?:^|v|\s)") + version_regex_str))
            .expect("Hardcoded version regex should be valid"),
        /* The string below matches a number containing one or more
        digits found at the start of the search string or preceded by
        'v' or 'version:'. */
        regex(r"(?:^|v|version:\s*)(\d+)")
            .expect("Hardcoded prefixed version number regex should be valid"),
    ])
});

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum LoadScope {
    HeaderOnly,
    WholePlugin,
}

impl std::fmt::Display for LoadScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadScope::HeaderOnly => write!(f, "plugin header"),
            LoadScope::WholePlugin => write!(f, "whole plugin"),
        }
    }
}

/// An immutable view of a plugin file that has been loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct Plugin {
    name: String,
    plugin: esplugin::Plugin,
    crc: Option<u32>,
    version: Option<String>,
    tags: Vec<String>,
}

impl Plugin {
    pub(crate) fn new(
        game_type: GameType,
        plugin_path: &Path,
        load_scope: LoadScope,
    ) -> Result<Self, LoadPluginError> {
        let name = name_string(plugin_path)?;

        let (parse_options, crc) = if load_scope == LoadScope::HeaderOnly {
            (ParseOptions::header_only(), None)
        } else {
            let crc = calculate_crc(plugin_path)?;
            (ParseOptions::whole_plugin(), Some(crc))
        };

        let mut plugin = esplugin::Plugin::new(game_type.into(), plugin_path);
        plugin.parse_file(parse_options)?;

        let mut version = None;
        let mut tags = Vec::new();
        if let Some(description) = plugin.description()? {
            tags = extract_bash_tags(&description);
            version = extract_version(&description)?;
        }

        Ok(Self {
            name,
            plugin,
            crc,
            version,
            tags,
        })
    }

    /// Get the plugin's filename.
    ///
    /// If the plugin was ghosted when it was loaded, this filename will be
    /// without the .ghost suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the plugin's version number from its description field.
    ///
    /// The description field may not contain a version number, or the library
    /// may be unable to detect it. The description field parsing may fail to
    /// extract the version number correctly, though it functions correctly in
    /// all known cases.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Get the plugin's masters, as declared in its header.
    pub fn masters(&self) -> Result<Vec<String>, PluginDataError> {
        self.plugin.masters().map_err(Into::into)
    }

    /// Get any Bash Tags found in the plugin's description field.
    pub fn bash_tags(&self) -> &[String] {
        &self.tags
    }

    /// Get the plugin's CRC-32 checksum.
    ///
    /// This will be `None` if the plugin is not fully loaded.
    pub fn crc(&self) -> Option<u32> {
        self.crc
    }

    /// Check if the plugin is a master plugin.
    ///
    /// The term "master" is potentially confusing: a plugin A may not be a
    /// *master plugin*, but may still be a *master of* another plugin by being
    /// listed as such in that plugin's header record. Master plugins are
    /// sometimes referred to as *master files* or simply *masters*, while the
    /// other meaning is always referenced in relation to another plugin.
    pub fn is_master(&self) -> bool {
        self.plugin.is_master_file()
    }

    /// Check if the plugin is a light plugin. Light plugins are treated as
    /// non-masters when partitioning the load order.
    pub fn is_light_plugin(&self) -> bool {
        self.plugin.is_light_plugin()
    }

    /// Check if the plugin contains any records other than its header.
    pub fn is_empty(&self) -> bool {
        self.plugin.record_and_group_count().unwrap_or(0) == 0
    }

    /// Check if two plugins contain a record with the same ID.
    pub fn do_records_overlap(&self, plugin: &Plugin) -> Result<bool, PluginDataError> {
        self.plugin.overlaps_with(&plugin.plugin).map_err(Into::into)
    }
}

pub(crate) fn validate_plugin_path_and_header(
    game_type: GameType,
    plugin_path: &Path,
) -> Result<(), error::PluginValidationError> {
    use error::{PluginValidationError, PluginValidationErrorReason};

    if !has_plugin_file_extension(game_type, plugin_path) {
        Err(PluginValidationError::invalid(
            plugin_path.into(),
            InvalidFilenameReason::UnsupportedFileExtension,
        ))
    } else if esplugin::Plugin::is_valid(game_type.into(), plugin_path, ParseOptions::header_only())
    {
        Ok(())
    } else {
        Err(PluginValidationError::new(
            plugin_path.into(),
            PluginValidationErrorReason::InvalidPluginHeader,
        ))
    }
}

fn has_plugin_file_extension(game_type: GameType, plugin_path: &Path) -> bool {
    let extension = if has_ascii_extension(plugin_path, "ghost") {
        plugin_path
            .file_stem()
            .and_then(|s| Path::new(s).extension())
    } else {
        plugin_path.extension()
    };

    if let Some(extension) = extension {
        if extension.eq_ignore_ascii_case("esp") || extension.eq_ignore_ascii_case("esm") {
            true
        } else {
            game_type.supports_light_plugins() && extension.eq_ignore_ascii_case("esl")
        }
    } else {
        false
    }
}

pub(crate) fn has_ascii_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

fn name_string(path: &Path) -> Result<String, LoadPluginError> {
    match path.file_name() {
        Some(f) => match f.to_str() {
            Some(f) => Ok(trim_dot_ghost(f).to_owned()),
            None => Err(LoadPluginError::InvalidFilename(
                InvalidFilenameReason::NonUnicode,
            )),
        },
        None => Err(LoadPluginError::InvalidFilename(
            InvalidFilenameReason::Empty,
        )),
    }
}

fn calculate_crc(path: &Path) -> std::io::Result<u32> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = crc32fast::Hasher::new();

    let mut buffer = reader.fill_buf()?;
    while !buffer.is_empty() {
        hasher.write(buffer);
        let length = buffer.len();
        reader.consume(length);

        buffer = reader.fill_buf()?;
    }

    Ok(hasher.finalize())
}

fn extract_bash_tags(description: &str) -> Vec<String> {
    let bash_tags_opener = "{{BASH:";

    if let Some(mut start_pos) = description.find(bash_tags_opener) {
        start_pos += bash_tags_opener.len();

        if let Some(end_pos) = description[start_pos..].find("}}") {
            return description[start_pos..start_pos + end_pos]
                .split(",")
                .map(|s| s.trim().to_owned())
                .collect();
        }
    }
    Vec::new()
}

fn extract_version(description: &str) -> Result<Option<String>, Box<fancy_regex::Error>> {
    for regex in &*VERSION_REGEXES {
        let version = regex
            .captures(description)
            .map_err(Box::new)?
            .iter()
            .flat_map(|captures| captures.iter())
            .flatten()
            .skip(1) // Skip the first capture as that's the whole match.
            .map(|m| m.as_str().trim())
            .find(|v| !v.is_empty())
            .map(|v| v.to_owned());

        if version.is_some() {
            return Ok(version);
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod extract_version {
        use super::*;

        #[test]
        fn should_extract_a_dotted_version() {
            let version = extract_version("Version: 1.2.3").unwrap();

            assert_eq!("1.2.3", version.unwrap());
        }

        #[test]
        fn should_extract_a_v_prefixed_version() {
            let version = extract_version("My Mod v2.0").unwrap();

            assert_eq!("2.0", version.unwrap());
        }

        #[test]
        fn should_extract_a_bare_version_number_after_a_version_prefix() {
            let version = extract_version("version: 5").unwrap();

            assert_eq!("5", version.unwrap());
        }

        #[test]
        fn should_return_none_if_no_version_is_present() {
            let version = extract_version("No numbers here").unwrap();

            assert!(version.is_none());
        }
    }

    mod extract_bash_tags {
        use super::*;

        #[test]
        fn should_split_and_trim_listed_tags() {
            let tags = extract_bash_tags("Some text {{BASH: Relev, Delev }} more text");

            assert_eq!(vec!["Relev".to_owned(), "Delev".to_owned()], tags);
        }

        #[test]
        fn should_return_no_tags_if_the_opener_is_missing() {
            assert!(extract_bash_tags("Some text").is_empty());
        }

        #[test]
        fn should_return_no_tags_if_the_closer_is_missing() {
            assert!(extract_bash_tags("Some text {{BASH: Relev").is_empty());
        }
    }

    mod has_plugin_file_extension {
        use super::*;

        #[test]
        fn should_accept_esp_and_esm_for_all_games() {
            assert!(has_plugin_file_extension(
                GameType::Oblivion,
                Path::new("Blank.esp")
            ));
            assert!(has_plugin_file_extension(
                GameType::Oblivion,
                Path::new("Blank.esm")
            ));
        }

        #[test]
        fn should_look_past_a_ghost_extension() {
            assert!(has_plugin_file_extension(
                GameType::Oblivion,
                Path::new("Blank.esp.ghost")
            ));
            assert!(!has_plugin_file_extension(
                GameType::Oblivion,
                Path::new("Blank.bsa.ghost")
            ));
        }

        #[test]
        fn should_only_accept_esl_for_games_that_support_light_plugins() {
            assert!(!has_plugin_file_extension(
                GameType::Oblivion,
                Path::new("Blank.esl")
            ));
            assert!(has_plugin_file_extension(
                GameType::SkyrimSE,
                Path::new("Blank.esl")
            ));
        }

        #[test]
        fn should_reject_non_plugin_extensions() {
            assert!(!has_plugin_file_extension(
                GameType::Oblivion,
                Path::new("Blank.bsa")
            ));
        }
    }
}
