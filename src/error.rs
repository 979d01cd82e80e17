//! Holds all error types aside from those related to metadata.
use std::path::PathBuf;

pub use crate::conditions::{ConditionEvaluationError, ConditionSyntaxError};
pub use crate::database::MetadataRetrievalError;
pub use crate::masterlist::UpdateMasterlistError;
pub use crate::plugin::error::{PluginDataError, PluginValidationError};
pub use crate::sorting::error::{CyclicInteractionError, UndefinedGroupError};
pub use crate::vcs::GitStateError;

use crate::metadata::error::{LoadMetadataError, WriteMetadataError};
use crate::sorting::error::{BuildGroupsGraphError, SortingError, display_cycle};
use crate::{Vertex, escape_ascii};

/// Represents an error that occurred while trying to create a
/// [Game][crate::Game].
#[derive(Debug)]
#[non_exhaustive]
pub enum GameHandleCreationError {
    NotADirectory(PathBuf),
    LoadOrderError(LoadOrderError),
}

impl std::fmt::Display for GameHandleCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotADirectory(p) => write!(
                f,
                "the path \"{}\" does not resolve to a directory",
                escape_ascii(p)
            ),
            Self::LoadOrderError(_) => {
                write!(f, "failed to initialise the load order game settings")
            }
        }
    }
}

impl std::error::Error for GameHandleCreationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotADirectory(_) => None,
            Self::LoadOrderError(e) => Some(e),
        }
    }
}

impl From<loadorder::Error> for GameHandleCreationError {
    fn from(value: loadorder::Error) -> Self {
        GameHandleCreationError::LoadOrderError(value.into())
    }
}

/// Represents an error that occurred while trying to interact with the load
/// order.
#[derive(Debug)]
pub struct LoadOrderError(Box<loadorder::Error>);

impl std::fmt::Display for LoadOrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load order interaction failed")
    }
}

impl std::error::Error for LoadOrderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<loadorder::Error> for LoadOrderError {
    fn from(value: loadorder::Error) -> Self {
        LoadOrderError(Box::new(value))
    }
}

/// Represents an error that occurred while loading plugins.
#[derive(Debug)]
#[non_exhaustive]
pub enum LoadPluginsError {
    IoError(Box<std::io::Error>),
    PluginValidationError(PluginValidationError),
}

impl std::fmt::Display for LoadPluginsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(_) => write!(f, "an I/O error occurred"),
            Self::PluginValidationError(_) => write!(f, "failed validation of input plugin paths"),
        }
    }
}

impl std::error::Error for LoadPluginsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            Self::PluginValidationError(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for LoadPluginsError {
    fn from(value: std::io::Error) -> Self {
        LoadPluginsError::IoError(Box::new(value))
    }
}

impl From<PluginValidationError> for LoadPluginsError {
    fn from(value: PluginValidationError) -> Self {
        LoadPluginsError::PluginValidationError(value)
    }
}

/// Represents an error that occurred during sorting.
#[derive(Debug)]
#[non_exhaustive]
pub enum SortPluginsError {
    PluginNotLoaded(String),
    MetadataRetrievalError(MetadataRetrievalError),
    UndefinedGroup(String),
    CycleFound(Vec<Vertex>),
    PluginDataError(PluginDataError),
}

impl std::fmt::Display for SortPluginsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PluginNotLoaded(n) => write!(f, "the plugin \"{n}\" has not been loaded"),
            Self::MetadataRetrievalError(_) => write!(f, "failed to retrieve plugin metadata"),
            Self::UndefinedGroup(g) => write!(f, "the group \"{g}\" does not exist"),
            Self::CycleFound(c) => write!(f, "found a cycle: {}", display_cycle(c)),
            Self::PluginDataError(_) => write!(f, "failed to read loaded plugin data"),
        }
    }
}

impl std::error::Error for SortPluginsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MetadataRetrievalError(e) => Some(e),
            Self::PluginDataError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SortingError> for SortPluginsError {
    fn from(value: SortingError) -> Self {
        match value {
            SortingError::UndefinedGroup(g) => Self::UndefinedGroup(g.into_group_name()),
            SortingError::CycleFound(c) => Self::CycleFound(c.into_cycle()),
            SortingError::PluginDataError(e) => Self::PluginDataError(e),
        }
    }
}

impl From<BuildGroupsGraphError> for SortPluginsError {
    fn from(value: BuildGroupsGraphError) -> Self {
        match value {
            BuildGroupsGraphError::UndefinedGroup(g) => Self::UndefinedGroup(g.into_group_name()),
            BuildGroupsGraphError::CycleFound(c) => Self::CycleFound(c.into_cycle()),
        }
    }
}

impl From<PluginDataError> for SortPluginsError {
    fn from(value: PluginDataError) -> Self {
        SortPluginsError::PluginDataError(value)
    }
}

impl From<MetadataRetrievalError> for SortPluginsError {
    fn from(value: MetadataRetrievalError) -> Self {
        SortPluginsError::MetadataRetrievalError(value)
    }
}

impl From<ConditionEvaluationError> for SortPluginsError {
    fn from(value: ConditionEvaluationError) -> Self {
        SortPluginsError::MetadataRetrievalError(MetadataRetrievalError::ConditionEvaluationError(
            value,
        ))
    }
}

/// The stable numeric codes that identify error kinds across the API
/// boundary. The code values are part of the compatibility surface and never
/// change meaning.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    Ok,
    FileAccess,
    ConditionSyntax,
    CyclicInteraction,
    GitState,
    InvalidArgument,
    UndefinedGroup,
    MetadataParse,
    Unknown,
}

impl ErrorCode {
    /// Get the numeric value of this code.
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::FileAccess => 1,
            ErrorCode::ConditionSyntax => 2,
            ErrorCode::CyclicInteraction => 3,
            ErrorCode::GitState => 4,
            ErrorCode::InvalidArgument => 5,
            ErrorCode::UndefinedGroup => 6,
            ErrorCode::MetadataParse => 7,
            ErrorCode::Unknown => 8,
        }
    }
}

impl From<&ConditionSyntaxError> for ErrorCode {
    fn from(_: &ConditionSyntaxError) -> Self {
        ErrorCode::ConditionSyntax
    }
}

impl From<&ConditionEvaluationError> for ErrorCode {
    fn from(value: &ConditionEvaluationError) -> Self {
        match value {
            ConditionEvaluationError::SyntaxError(_) => ErrorCode::ConditionSyntax,
            _ => ErrorCode::FileAccess,
        }
    }
}

impl From<&LoadMetadataError> for ErrorCode {
    fn from(value: &LoadMetadataError) -> Self {
        if value.is_file_access_error() {
            ErrorCode::FileAccess
        } else if value.is_condition_syntax_error() {
            ErrorCode::ConditionSyntax
        } else {
            ErrorCode::MetadataParse
        }
    }
}

impl From<&WriteMetadataError> for ErrorCode {
    fn from(value: &WriteMetadataError) -> Self {
        if value.is_invalid_argument() {
            ErrorCode::InvalidArgument
        } else {
            ErrorCode::FileAccess
        }
    }
}

impl From<&GitStateError> for ErrorCode {
    fn from(_: &GitStateError) -> Self {
        ErrorCode::GitState
    }
}

impl From<&UpdateMasterlistError> for ErrorCode {
    fn from(value: &UpdateMasterlistError) -> Self {
        match value {
            UpdateMasterlistError::GitStateError(e) => e.into(),
            UpdateMasterlistError::LoadMetadataError(e) => e.into(),
        }
    }
}

impl From<&SortPluginsError> for ErrorCode {
    fn from(value: &SortPluginsError) -> Self {
        match value {
            SortPluginsError::PluginNotLoaded(_) => ErrorCode::InvalidArgument,
            SortPluginsError::MetadataRetrievalError(
                MetadataRetrievalError::ConditionEvaluationError(e),
            ) => e.into(),
            SortPluginsError::MetadataRetrievalError(_) => ErrorCode::Unknown,
            SortPluginsError::UndefinedGroup(_) => ErrorCode::UndefinedGroup,
            SortPluginsError::CycleFound(_) => ErrorCode::CyclicInteraction,
            SortPluginsError::PluginDataError(_) => ErrorCode::FileAccess,
        }
    }
}
