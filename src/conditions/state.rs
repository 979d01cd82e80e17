use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    sync::RwLock,
};

use crate::{
    game::GameType,
    logging,
    metadata::plugin_metadata::{GHOST_FILE_EXTENSION, iends_with_ascii, trim_dot_ghost},
};

use super::{ConditionEvaluationError, Expression};

/// Holds the game state that conditions are evaluated against, along with the
/// condition-result and CRC caches.
///
/// Condition results are memoised per condition string until the cache is
/// explicitly cleared. The CRC cache is never cleared: it lives for as long as
/// the state does.
#[derive(Debug)]
pub struct State {
    game_type: GameType,
    data_path: PathBuf,
    active_plugins: Vec<String>,
    plugin_versions: HashMap<String, String>,
    plugin_master_flags: HashMap<String, bool>,
    executable_version: Option<String>,
    crc_cache: RwLock<HashMap<PathBuf, u32>>,
    condition_cache: RwLock<HashMap<String, bool>>,
}

impl State {
    pub fn new(game_type: GameType, data_path: PathBuf) -> Self {
        Self {
            game_type,
            data_path,
            active_plugins: Vec::new(),
            plugin_versions: HashMap::new(),
            plugin_master_flags: HashMap::new(),
            executable_version: None,
            crc_cache: RwLock::new(HashMap::new()),
            condition_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Evaluate the given condition string, using a cached result if one
    /// exists for it.
    pub fn evaluate(&self, condition: &str) -> Result<bool, ConditionEvaluationError> {
        if let Some(result) = read_cache(&self.condition_cache, condition) {
            return Ok(result);
        }

        let expression = Expression::from_str(condition)?;
        let result = expression.eval(self)?;

        write_cache(&self.condition_cache, condition.to_owned(), result);

        Ok(result)
    }

    /// Forget all cached condition results, starting a new cache epoch.
    pub fn clear_condition_cache(&self) {
        match self.condition_cache.write() {
            Ok(mut cache) => cache.clear(),
            Err(e) => {
                logging::error!("The condition cache's lock is poisoned, assigning a new cache");
                *e.into_inner() = HashMap::new();
            }
        }
    }

    /// Record which plugins are currently active in the load order.
    pub fn set_active_plugins(&mut self, plugin_names: &[&str]) {
        self.active_plugins = plugin_names.iter().map(|n| n.to_lowercase()).collect();
    }

    /// Record the versions read from loaded plugins' description fields.
    pub fn set_plugin_versions(&mut self, plugin_versions: &[(&str, &str)]) {
        self.plugin_versions = plugin_versions
            .iter()
            .map(|(name, version)| (name.to_lowercase(), (*version).to_owned()))
            .collect();
    }

    /// Record the master flags of loaded plugins, so that `is_master()`
    /// conditions don't need to re-read their headers.
    pub fn set_plugin_master_flags(&mut self, flags: &[(&str, bool)]) {
        self.plugin_master_flags = flags
            .iter()
            .map(|(name, is_master)| (name.to_lowercase(), *is_master))
            .collect();
    }

    /// Pre-populate the CRC cache with the CRCs of loaded plugins.
    pub fn set_cached_plugin_crcs(&mut self, crcs: &[(&str, u32)]) {
        match self.crc_cache.write() {
            Ok(mut cache) => {
                for (name, crc) in crcs {
                    cache.insert(self.data_path.join(name), *crc);
                }
            }
            Err(e) => {
                logging::error!("The CRC cache's lock is poisoned, assigning a new cache");
                *e.into_inner() = crcs
                    .iter()
                    .map(|(name, crc)| (self.data_path.join(name), *crc))
                    .collect();
            }
        }
    }

    /// Set the version of the game's executable, used by `version("", ...)`
    /// conditions.
    pub fn set_executable_version(&mut self, version: String) {
        self.executable_version = Some(version);
    }

    pub(super) fn executable_version(&self) -> Option<&str> {
        self.executable_version.as_deref()
    }

    pub(super) fn file_exists(&self, relative_path: &str) -> bool {
        self.resolve_path(relative_path).is_some()
    }

    pub(super) fn is_active(&self, plugin_name: &str) -> bool {
        let name = plugin_name.to_lowercase();
        self.active_plugins.iter().any(|p| *p == name)
    }

    pub(super) fn count_active_matching(&self, regex: &fancy_regex::Regex) -> usize {
        self.active_plugins
            .iter()
            .filter(|p| regex.is_match(p).unwrap_or(false))
            .count()
    }

    pub(super) fn count_files_matching(
        &self,
        parent_path: &str,
        regex: &fancy_regex::Regex,
    ) -> Result<usize, ConditionEvaluationError> {
        let directory = self.data_path.join(parent_path);
        if !directory.is_dir() {
            return Ok(0);
        }

        let entries = std::fs::read_dir(&directory)
            .map_err(|e| ConditionEvaluationError::IoError(directory.clone(), e))?;

        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| ConditionEvaluationError::IoError(directory.clone(), e))?;

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };

            let file_name = trim_dot_ghost(file_name);
            if regex.is_match(file_name).unwrap_or(false) {
                count += 1;
            }
        }

        Ok(count)
    }

    pub(super) fn plugin_version(&self, plugin_name: &str) -> Option<&str> {
        self.plugin_versions
            .get(&trim_dot_ghost(plugin_name).to_lowercase())
            .map(String::as_str)
    }

    pub(super) fn is_master(&self, plugin_name: &str) -> Result<bool, ConditionEvaluationError> {
        if let Some(is_master) = self
            .plugin_master_flags
            .get(&trim_dot_ghost(plugin_name).to_lowercase())
        {
            return Ok(*is_master);
        }

        let Some(path) = self.resolve_path(plugin_name) else {
            return Ok(false);
        };

        let mut plugin = esplugin::Plugin::new(self.game_type.into(), &path);
        match plugin.parse_file(esplugin::ParseOptions::header_only()) {
            Ok(()) => Ok(plugin.is_master_file()),
            Err(e) => Err(ConditionEvaluationError::PluginParsingError(
                path,
                Box::new(e),
            )),
        }
    }

    pub(super) fn crc(&self, relative_path: &str) -> Result<Option<u32>, ConditionEvaluationError> {
        if let Ok(cache) = self.crc_cache.read()
            && let Some(crc) = cache.get(&self.data_path.join(relative_path))
        {
            return Ok(Some(*crc));
        }

        let Some(path) = self.resolve_path(relative_path) else {
            return Ok(None);
        };

        if let Ok(cache) = self.crc_cache.read()
            && let Some(crc) = cache.get(&path)
        {
            return Ok(Some(*crc));
        }

        let bytes = std::fs::read(&path)
            .map_err(|e| ConditionEvaluationError::IoError(path.clone(), e))?;
        let crc = crc32fast::hash(&bytes);

        match self.crc_cache.write() {
            Ok(mut cache) => {
                cache.insert(path, crc);
            }
            Err(e) => {
                logging::error!("The CRC cache's lock is poisoned, assigning a new cache");
                *e.into_inner() = HashMap::from([(path, crc)]);
            }
        }

        Ok(Some(crc))
    }

    /// Resolve a forward-slash relative path against the data directory,
    /// falling back to a .ghost suffix for plugin files.
    fn resolve_path(&self, relative_path: &str) -> Option<PathBuf> {
        let path = self.data_path.join(relative_path);
        if path.exists() {
            return Some(path);
        }

        if !iends_with_ascii(relative_path, GHOST_FILE_EXTENSION) {
            let ghosted = append_ghost_extension(&path);
            if ghosted.exists() {
                return Some(ghosted);
            }
        }

        None
    }
}

fn append_ghost_extension(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(file_name) => {
            let mut file_name = file_name.to_os_string();
            file_name.push(GHOST_FILE_EXTENSION);
            path.with_file_name(file_name)
        }
        None => path.to_path_buf(),
    }
}

fn read_cache(cache: &RwLock<HashMap<String, bool>>, condition: &str) -> Option<bool> {
    match cache.read() {
        Ok(cache) => cache.get(condition).copied(),
        Err(_) => None,
    }
}

fn write_cache(cache: &RwLock<HashMap<String, bool>>, condition: String, result: bool) {
    match cache.write() {
        Ok(mut cache) => {
            cache.insert(condition, result);
        }
        Err(e) => {
            logging::error!("The condition cache's lock is poisoned, assigning a new cache");
            *e.into_inner() = HashMap::from([(condition, result)]);
        }
    }
}
