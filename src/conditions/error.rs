use std::path::PathBuf;

use crate::escape_ascii;

/// Represents an error in the syntax of a condition string.
#[derive(Clone, Debug)]
pub struct ConditionSyntaxError {
    condition: Box<str>,
    offset: usize,
    expected: Box<str>,
}

impl ConditionSyntaxError {
    pub(super) fn new(condition: &str, offset: usize, expected: impl Into<Box<str>>) -> Self {
        Self {
            condition: condition.into(),
            offset,
            expected: expected.into(),
        }
    }
}

impl std::fmt::Display for ConditionSyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to parse the condition \"{}\": expected {} at byte offset {}",
            self.condition, self.expected, self.offset
        )
    }
}

impl std::error::Error for ConditionSyntaxError {}

/// Represents an error that occurred while evaluating a condition.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConditionEvaluationError {
    SyntaxError(ConditionSyntaxError),
    IoError(PathBuf, std::io::Error),
    PluginParsingError(PathBuf, Box<esplugin::Error>),
}

impl std::fmt::Display for ConditionEvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SyntaxError(e) => e.fmt(f),
            Self::IoError(p, _) => write!(
                f,
                "an I/O error occurred while reading \"{}\"",
                escape_ascii(p)
            ),
            Self::PluginParsingError(p, _) => write!(
                f,
                "failed to parse the plugin at \"{}\"",
                escape_ascii(p)
            ),
        }
    }
}

impl std::error::Error for ConditionEvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SyntaxError(e) => Some(e),
            Self::IoError(_, e) => Some(e),
            Self::PluginParsingError(_, e) => Some(e),
        }
    }
}

impl From<ConditionSyntaxError> for ConditionEvaluationError {
    fn from(value: ConditionSyntaxError) -> Self {
        ConditionEvaluationError::SyntaxError(value)
    }
}
