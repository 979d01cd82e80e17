//! loadstone is a library for deriving a correct load order for a game's
//! plugin files from community-curated metadata.
//!
//! A [Game] handle owns the loaded plugin data and a [Database] of metadata
//! loaded from a masterlist and userlist. Sorting builds a graph over the
//! installed plugins from their headers, their metadata and their groups,
//! then derives a deterministic order from it.
mod conditions;
mod database;
pub mod error;
mod game;
mod logging;
mod masterlist;
pub mod metadata;
mod plugin;
mod sorting;
mod vcs;
mod version;

use std::{path::Path, slice::EscapeAscii};

use fancy_regex::{Error as RegexImplError, Regex};

pub use database::{Database, WriteMode};
pub use game::{Game, GameType};
pub use logging::{LogLevel, set_log_level, set_logging_callback};
pub use plugin::Plugin;
pub use sorting::vertex::{EdgeType, Vertex};
pub use vcs::{MasterlistRevision, VcsClient};
pub use version::{LOADSTONE_REVISION, LOADSTONE_VERSION, version_components};

fn regex(value: &str) -> Result<Regex, Box<RegexImplError>> {
    Regex::new(&format!("(?i){value}")).map_err(Box::new)
}

fn escape_ascii(path: &Path) -> EscapeAscii<'_> {
    path.as_os_str().as_encoded_bytes().escape_ascii()
}
