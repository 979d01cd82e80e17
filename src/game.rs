use std::{
    collections::HashSet,
    fmt::Display,
    path::{Path, PathBuf},
};

use loadorder::WritableLoadOrder;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    conditions::State,
    database::Database,
    error::{GameHandleCreationError, LoadOrderError, LoadPluginsError, SortPluginsError},
    escape_ascii,
    logging::{self, format_details},
    metadata::{Filename, plugin_metadata::GHOST_FILE_EXTENSION},
    plugin::{
        LoadScope, Plugin,
        error::{InvalidFilenameReason, PluginValidationError},
        validate_plugin_path_and_header,
    },
    sorting::{
        groups::build_groups_graph,
        plugins::{PluginSortingData, sort_plugins},
    },
};

/// Codes used to create handles for specific games.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum GameType {
    /// The Elder Scrolls III: Morrowind
    Morrowind,
    /// The Elder Scrolls IV: Oblivion
    Oblivion,
    /// The Elder Scrolls V: Skyrim
    Skyrim,
    /// The Elder Scrolls V: Skyrim Special Edition
    SkyrimSE,
    /// The Elder Scrolls V: Skyrim VR
    SkyrimVR,
    /// Fallout 3
    Fallout3,
    /// Fallout: New Vegas
    FalloutNV,
    /// Fallout 4
    Fallout4,
    /// Fallout 4 VR
    Fallout4VR,
    /// Starfield
    Starfield,
}

impl GameType {
    pub(crate) fn supports_light_plugins(self) -> bool {
        matches!(
            self,
            GameType::SkyrimSE
                | GameType::SkyrimVR
                | GameType::Fallout4
                | GameType::Fallout4VR
                | GameType::Starfield
        )
    }
}

impl Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameType::Morrowind => write!(f, "The Elder Scrolls III: Morrowind"),
            GameType::Oblivion => write!(f, "The Elder Scrolls IV: Oblivion"),
            GameType::Skyrim => write!(f, "The Elder Scrolls V: Skyrim"),
            GameType::SkyrimSE => write!(f, "The Elder Scrolls V: Skyrim Special Edition"),
            GameType::SkyrimVR => write!(f, "The Elder Scrolls V: Skyrim VR"),
            GameType::Fallout3 => write!(f, "Fallout 3"),
            GameType::FalloutNV => write!(f, "Fallout: New Vegas"),
            GameType::Fallout4 => write!(f, "Fallout 4"),
            GameType::Fallout4VR => write!(f, "Fallout 4 VR"),
            GameType::Starfield => write!(f, "Starfield"),
        }
    }
}

impl From<GameType> for loadorder::GameId {
    fn from(value: GameType) -> Self {
        match value {
            GameType::Morrowind => loadorder::GameId::Morrowind,
            GameType::Oblivion => loadorder::GameId::Oblivion,
            GameType::Skyrim => loadorder::GameId::Skyrim,
            GameType::SkyrimSE => loadorder::GameId::SkyrimSE,
            GameType::SkyrimVR => loadorder::GameId::SkyrimVR,
            GameType::Fallout3 => loadorder::GameId::Fallout3,
            GameType::FalloutNV => loadorder::GameId::FalloutNV,
            GameType::Fallout4 => loadorder::GameId::Fallout4,
            GameType::Fallout4VR => loadorder::GameId::Fallout4VR,
            GameType::Starfield => loadorder::GameId::Starfield,
        }
    }
}

impl From<GameType> for esplugin::GameId {
    fn from(value: GameType) -> Self {
        match value {
            GameType::Morrowind => esplugin::GameId::Morrowind,
            GameType::Oblivion => esplugin::GameId::Oblivion,
            GameType::Skyrim => esplugin::GameId::Skyrim,
            GameType::SkyrimSE | GameType::SkyrimVR => esplugin::GameId::SkyrimSE,
            GameType::Fallout3 => esplugin::GameId::Fallout3,
            GameType::FalloutNV => esplugin::GameId::FalloutNV,
            GameType::Fallout4 | GameType::Fallout4VR => esplugin::GameId::Fallout4,
            GameType::Starfield => esplugin::GameId::Starfield,
        }
    }
}

/// The interface through which game-specific functionality is provided.
///
/// A game handle is not safe for concurrent use from multiple threads:
/// callers must serialise their own access.
#[derive(Debug)]
pub struct Game {
    game_type: GameType,
    game_path: PathBuf,
    load_order: Box<(dyn WritableLoadOrder + Send + Sync + 'static)>,
    database: Database,
    cache: GameCache,
}

impl Game {
    /// Initialise a new game handle, which is then used by all game-specific
    /// functions.
    ///
    /// - `game_type` is a value representing which game to create the handle
    ///   for,
    /// - `game_path` is the relative or absolute path to the directory
    ///   containing the game's executable.
    ///
    /// This function will attempt to look up the game's local data path,
    /// which may fail in some situations. [Game::with_local_path] can be used
    /// to provide the local path instead.
    pub fn new(game_type: GameType, game_path: &Path) -> Result<Self, GameHandleCreationError> {
        logging::info!(
            "Attempting to create a game handle for game type \"{}\" with game path \"{}\"",
            game_type,
            escape_ascii(game_path)
        );

        if !game_path.is_dir() {
            return Err(GameHandleCreationError::NotADirectory(game_path.into()));
        }

        let load_order =
            loadorder::GameSettings::new(game_type.into(), game_path)?.into_load_order();

        let state = new_condition_evaluator_state(game_type, game_path);

        Ok(Game {
            game_type,
            game_path: game_path.to_path_buf(),
            load_order,
            database: Database::new(state),
            cache: GameCache::default(),
        })
    }

    /// Initialise a new game handle, which is then used by all game-specific
    /// functions.
    ///
    /// - `game_type` is a value representing which game to create the handle
    ///   for,
    /// - `game_path` is the relative or absolute path to the directory
    ///   containing the game's executable.
    /// - `game_local_path` is the relative or absolute path to the game's
    ///   local data path, which is usually in `%LOCALAPPDATA%` on Windows.
    pub fn with_local_path(
        game_type: GameType,
        game_path: &Path,
        game_local_path: &Path,
    ) -> Result<Self, GameHandleCreationError> {
        logging::info!(
            "Attempting to create a game handle for game type \"{}\" with game path \"{}\" and game local path \"{}\"",
            game_type,
            escape_ascii(game_path),
            escape_ascii(game_local_path)
        );

        if !game_path.is_dir() {
            return Err(GameHandleCreationError::NotADirectory(game_path.into()));
        }

        if game_local_path.exists() && !game_local_path.is_dir() {
            return Err(GameHandleCreationError::NotADirectory(
                game_local_path.into(),
            ));
        }

        let load_order = loadorder::GameSettings::with_local_path(
            game_type.into(),
            game_path,
            game_local_path,
        )?
        .into_load_order();

        let state = new_condition_evaluator_state(game_type, game_path);

        Ok(Game {
            game_type,
            game_path: game_path.to_path_buf(),
            load_order,
            database: Database::new(state),
            cache: GameCache::default(),
        })
    }

    /// Get the game's type.
    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    /// Get the object used for accessing metadata-related functionality.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the object used for accessing metadata-related functionality,
    /// mutably.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    /// Set the version of the game's executable, which `version("", ...)`
    /// conditions compare against.
    pub fn set_executable_version(&mut self, version: String) {
        self.database
            .condition_evaluator_state_mut()
            .set_executable_version(version);
    }

    /// Check if a file is a valid plugin.
    ///
    /// The validity check is not exhaustive: it generally checks that the
    /// file has a valid plugin file extension for the game and that its
    /// header can be parsed.
    ///
    /// `plugin_path` can be absolute or relative: relative paths are resolved
    /// relative to the game's plugins directory, while absolute paths are
    /// used as given.
    pub fn is_valid_plugin(&self, plugin_path: &Path) -> bool {
        let resolved_path = resolve_plugin_path(
            &data_path(self.game_type, &self.game_path),
            plugin_path,
        );
        validate_plugin_path_and_header(self.game_type, &resolved_path).is_ok()
    }

    /// Fully parses plugins and loads their data.
    ///
    /// If a given plugin filename (or one that is case-insensitively equal)
    /// has already been loaded, its previously-loaded data is discarded.
    ///
    /// Relative paths in `plugin_paths` are resolved relative to the game's
    /// plugins directory, while absolute paths are used as given. Each plugin
    /// filename must be unique within the slice.
    ///
    /// Loading plugins clears the condition cache.
    pub fn load_plugins(&mut self, plugin_paths: &[&Path]) -> Result<(), LoadPluginsError> {
        let plugins = self.load_plugins_common(plugin_paths, LoadScope::WholePlugin)?;

        self.store_plugins(plugins);

        Ok(())
    }

    /// Parses plugin headers and loads their data.
    ///
    /// If a given plugin filename (or one that is case-insensitively equal)
    /// has already been loaded, its previously-loaded data is discarded.
    ///
    /// Relative paths in `plugin_paths` are resolved relative to the game's
    /// plugins directory, while absolute paths are used as given. Each plugin
    /// filename must be unique within the slice.
    ///
    /// Loading plugin headers clears the condition cache.
    pub fn load_plugin_headers(&mut self, plugin_paths: &[&Path]) -> Result<(), LoadPluginsError> {
        let plugins = self.load_plugins_common(plugin_paths, LoadScope::HeaderOnly)?;

        self.store_plugins(plugins);

        Ok(())
    }

    fn load_plugins_common(
        &mut self,
        plugin_paths: &[&Path],
        load_scope: LoadScope,
    ) -> Result<Vec<Plugin>, LoadPluginsError> {
        let data_path = data_path(self.game_type, &self.game_path);

        validate_plugin_paths(self.game_type, &data_path, plugin_paths)?;

        logging::trace!("Starting loading each {load_scope}.");

        let plugins: Vec<_> = plugin_paths
            .par_iter()
            .filter_map(|path| try_load_plugin(&data_path, path, self.game_type, load_scope))
            .collect();

        Ok(plugins)
    }

    fn store_plugins(&mut self, plugins: Vec<Plugin>) {
        self.cache.insert_plugins(plugins);

        update_loaded_plugin_state(
            self.database.condition_evaluator_state_mut(),
            self.cache.plugins_iter(),
        );
    }

    /// Clears the plugins loaded by previous calls to [Game::load_plugins] or
    /// [Game::load_plugin_headers].
    pub fn clear_loaded_plugins(&mut self) {
        self.cache.clear_plugins();
    }

    /// Get data for a loaded plugin.
    pub fn plugin(&self, plugin_name: &str) -> Option<&Plugin> {
        self.cache.plugin(plugin_name)
    }

    /// Get data for all loaded plugins.
    pub fn loaded_plugins(&self) -> Vec<&Plugin> {
        self.cache.plugins_iter().collect()
    }

    /// Calculates a new load order for the game's installed plugins
    /// (including inactive plugins) and returns the sorted order.
    ///
    /// This pulls metadata from the masterlist and userlist if they are
    /// loaded, and uses the loaded data of each plugin. No changes are
    /// applied to the load order used by the game. This function does not
    /// load or evaluate the masterlist or userlist.
    ///
    /// The order in which plugins are listed in `plugin_names` is used as
    /// their current load order. All given plugins must have already been
    /// loaded using [Game::load_plugins] or [Game::load_plugin_headers].
    pub fn sort_plugins(&self, plugin_names: &[&str]) -> Result<Vec<String>, SortPluginsError> {
        let plugins = plugin_names
            .iter()
            .map(|n| {
                self.cache
                    .plugin(n)
                    .ok_or_else(|| SortPluginsError::PluginNotLoaded((*n).to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let plugins_sorting_data = plugins
            .into_iter()
            .enumerate()
            .map(|(i, p)| to_plugin_sorting_data(&self.database, p, i))
            .collect::<Result<Vec<_>, _>>()?;

        logging::debug!("Current load order:");
        for plugin_name in plugin_names {
            logging::debug!("\t{plugin_name}");
        }

        let groups_graph = build_groups_graph(
            &self.database.groups(false),
            self.database.user_groups(),
        )?;

        let new_load_order = sort_plugins(
            plugins_sorting_data,
            &groups_graph,
            self.load_order.game_settings().early_loading_plugins(),
        )?;

        logging::debug!("Sorted load order:");
        for plugin_name in &new_load_order {
            logging::debug!("\t{plugin_name}");
        }

        Ok(new_load_order)
    }

    /// Load the current load order state, discarding any previously held
    /// state.
    ///
    /// This function should be called whenever the load order or active state
    /// of plugins "on disk" changes, so that the cached state is updated to
    /// reflect the changes.
    ///
    /// Loading the current load order state clears the condition cache.
    pub fn load_current_load_order_state(&mut self) -> Result<(), LoadOrderError> {
        self.load_order.load()?;

        self.database.clear_condition_cache();
        self.database
            .condition_evaluator_state_mut()
            .set_active_plugins(&self.load_order.active_plugin_names());

        Ok(())
    }

    /// Check if the given plugin is active.
    pub fn is_plugin_active(&self, plugin_name: &str) -> bool {
        self.load_order.is_active(plugin_name)
    }

    /// Get the current load order.
    pub fn load_order(&self) -> Vec<&str> {
        self.load_order.plugin_names()
    }

    /// Set the game's load order and persist it.
    pub fn set_load_order(&mut self, load_order: &[&str]) -> Result<(), LoadOrderError> {
        self.load_order.set_load_order(load_order)?;
        self.load_order.save()?;
        Ok(())
    }
}

fn data_path(game_type: GameType, game_path: &Path) -> PathBuf {
    match game_type {
        GameType::Morrowind => game_path.join("Data Files"),
        _ => game_path.join("Data"),
    }
}

fn new_condition_evaluator_state(game_type: GameType, game_path: &Path) -> State {
    State::new(game_type, data_path(game_type, game_path))
}

fn validate_plugin_paths(
    game_type: GameType,
    data_path: &Path,
    plugin_paths: &[&Path],
) -> Result<(), PluginValidationError> {
    // Check that all plugin filenames are unique.
    let mut set = HashSet::new();
    for path in plugin_paths {
        let filename = match path.file_name() {
            Some(f) => f.to_string_lossy(),
            None => {
                return Err(PluginValidationError::invalid(
                    (*path).into(),
                    InvalidFilenameReason::Empty,
                ));
            }
        };
        if !set.insert(Filename::new(filename.to_string())) {
            return Err(PluginValidationError::invalid(
                (*path).into(),
                InvalidFilenameReason::NonUnique,
            ));
        }
    }

    plugin_paths
        .par_iter()
        .map(|path| {
            let resolved_path = resolve_plugin_path(data_path, path);
            validate_plugin_path_and_header(game_type, &resolved_path)
        })
        .collect()
}

fn try_load_plugin(
    data_path: &Path,
    plugin_path: &Path,
    game_type: GameType,
    load_scope: LoadScope,
) -> Option<Plugin> {
    let resolved_path = resolve_plugin_path(data_path, plugin_path);

    match Plugin::new(game_type, &resolved_path, load_scope) {
        Ok(p) => Some(p),
        Err(e) => {
            logging::error!(
                "Caught error while trying to load \"{}\": {}",
                escape_ascii(plugin_path),
                format_details(&e)
            );
            None
        }
    }
}

fn resolve_plugin_path(data_path: &Path, plugin_path: &Path) -> PathBuf {
    let plugin_path = data_path.join(plugin_path);

    if !plugin_path.exists() {
        if let Some(filename) = plugin_path.file_name() {
            logging::debug!(
                "Could not find plugin at \"{}\", adding {} file extension",
                escape_ascii(&plugin_path),
                GHOST_FILE_EXTENSION
            );
            let mut filename = filename.to_os_string();
            filename.push(GHOST_FILE_EXTENSION);
            plugin_path.with_file_name(filename)
        } else {
            plugin_path
        }
    } else {
        plugin_path
    }
}

fn update_loaded_plugin_state<'a>(
    state: &mut State,
    plugins: impl Iterator<Item = &'a Plugin>,
) {
    let mut plugin_versions = Vec::new();
    let mut plugin_crcs = Vec::new();
    let mut plugin_master_flags = Vec::new();

    for plugin in plugins {
        if let Some(version) = plugin.version() {
            plugin_versions.push((plugin.name(), version));
        }

        if let Some(crc) = plugin.crc() {
            plugin_crcs.push((plugin.name(), crc));
        }

        plugin_master_flags.push((plugin.name(), plugin.is_master()));
    }

    state.clear_condition_cache();
    state.set_plugin_versions(&plugin_versions);
    state.set_cached_plugin_crcs(&plugin_crcs);
    state.set_plugin_master_flags(&plugin_master_flags);
}

fn to_plugin_sorting_data<'a>(
    database: &Database,
    plugin: &'a Plugin,
    load_order_index: usize,
) -> Result<PluginSortingData<'a, Plugin>, SortPluginsError> {
    // Disabled metadata entries still exist (e.g. for queries), but
    // contribute nothing to sorting.
    let masterlist_metadata = database
        .plugin_metadata(plugin.name(), false, true)?
        .filter(|m| m.is_enabled());

    let user_metadata = database
        .plugin_user_metadata(plugin.name(), true)?
        .filter(|m| m.is_enabled());

    Ok(PluginSortingData::new(
        plugin,
        masterlist_metadata.as_ref(),
        user_metadata.as_ref(),
        load_order_index,
    ))
}

impl crate::sorting::plugins::SortingPlugin for Plugin {
    fn name(&self) -> &str {
        self.name()
    }

    fn is_master(&self) -> bool {
        self.is_master()
    }

    fn is_light(&self) -> bool {
        self.is_light_plugin()
    }

    fn masters(&self) -> Result<Vec<String>, crate::plugin::error::PluginDataError> {
        self.masters()
    }
}

#[derive(Debug, Default)]
pub(crate) struct GameCache {
    plugins: std::collections::HashMap<Filename, Plugin>,
}

impl GameCache {
    fn insert_plugins(&mut self, plugins: Vec<Plugin>) {
        for plugin in plugins {
            self.plugins
                .insert(Filename::new(plugin.name().to_owned()), plugin);
        }
    }

    fn clear_plugins(&mut self) {
        self.plugins.clear();
    }

    fn plugins_iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    fn plugin(&self, plugin_name: &str) -> Option<&Plugin> {
        self.plugins.get(&Filename::new(plugin_name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod game_type {
        use super::*;

        #[test]
        fn display_should_name_the_game() {
            assert_eq!(
                "The Elder Scrolls IV: Oblivion",
                GameType::Oblivion.to_string()
            );
        }

        #[test]
        fn only_newer_games_should_support_light_plugins() {
            assert!(!GameType::Oblivion.supports_light_plugins());
            assert!(!GameType::Morrowind.supports_light_plugins());
            assert!(GameType::SkyrimSE.supports_light_plugins());
            assert!(GameType::Starfield.supports_light_plugins());
        }
    }

    mod game {
        use super::*;

        #[test]
        fn new_should_error_if_the_game_path_is_not_a_directory() {
            let dir = tempfile::tempdir().unwrap();
            let file_path = dir.path().join("not-a-directory");
            std::fs::write(&file_path, "").unwrap();

            assert!(matches!(
                Game::new(GameType::Morrowind, &file_path),
                Err(GameHandleCreationError::NotADirectory(_))
            ));
        }

        #[test]
        fn with_local_path_should_error_if_the_local_path_is_a_file() {
            let dir = tempfile::tempdir().unwrap();
            let file_path = dir.path().join("not-a-directory");
            std::fs::write(&file_path, "").unwrap();

            assert!(matches!(
                Game::with_local_path(GameType::Morrowind, dir.path(), &file_path),
                Err(GameHandleCreationError::NotADirectory(_))
            ));
        }

        #[test]
        fn sort_plugins_should_error_if_a_plugin_has_not_been_loaded() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("Data Files")).unwrap();

            let game = Game::new(GameType::Morrowind, dir.path()).unwrap();

            assert!(matches!(
                game.sort_plugins(&["Blank.esp"]),
                Err(SortPluginsError::PluginNotLoaded(_))
            ));
        }

        #[test]
        fn load_plugins_should_error_if_plugin_filenames_are_not_unique() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("Data Files")).unwrap();

            let mut game = Game::new(GameType::Morrowind, dir.path()).unwrap();

            let result =
                game.load_plugins(&[Path::new("Blank.esp"), Path::new("blank.esp")]);

            assert!(result.is_err());
        }
    }

    mod resolve_plugin_path {
        use super::*;

        #[test]
        fn should_add_a_ghost_extension_if_the_plugin_does_not_exist() {
            let dir = tempfile::tempdir().unwrap();

            let path = resolve_plugin_path(dir.path(), Path::new("Blank.esp"));

            assert_eq!(dir.path().join("Blank.esp.ghost"), path);
        }

        #[test]
        fn should_use_the_path_as_is_if_the_plugin_exists() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("Blank.esp"), "").unwrap();

            let path = resolve_plugin_path(dir.path(), Path::new("Blank.esp"));

            assert_eq!(dir.path().join("Blank.esp"), path);
        }
    }
}
