//! The boolean condition language that metadata entries use to restrict when
//! they apply.
mod error;
mod parse;
mod state;
mod version;

use std::str::FromStr;

pub use error::{ConditionEvaluationError, ConditionSyntaxError};
pub use state::State;

use crate::logging;
use version::compare_versions;

/// A parsed condition string.
///
/// Conditions combine filesystem and load-order predicates with `and`, `or`
/// and `not`, e.g. `file("Foo.esp") and not active("Bar.esp")`.
#[derive(Clone, Debug)]
pub(crate) struct Expression {
    // Alternatives are or-joined, their elements and-joined.
    alternatives: Vec<Vec<Term>>,
}

impl Expression {
    pub(crate) fn eval(&self, state: &State) -> Result<bool, ConditionEvaluationError> {
        for compound in &self.alternatives {
            if eval_compound(compound, state)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

impl FromStr for Expression {
    type Err = ConditionSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse_expression(s)
    }
}

fn eval_compound(terms: &[Term], state: &State) -> Result<bool, ConditionEvaluationError> {
    for term in terms {
        if !term.eval(state)? {
            return Ok(false);
        }
    }

    Ok(true)
}

#[derive(Clone, Debug)]
struct Term {
    negated: bool,
    operand: Operand,
}

impl Term {
    fn eval(&self, state: &State) -> Result<bool, ConditionEvaluationError> {
        let value = match &self.operand {
            Operand::Nested(expression) => expression.eval(state)?,
            Operand::Function(function) => function.eval(state)?,
        };

        Ok(value != self.negated)
    }
}

#[derive(Clone, Debug)]
enum Operand {
    Nested(Box<Expression>),
    Function(Function),
}

#[derive(Clone, Debug)]
enum Function {
    /// True if the named plugin or data-directory file is installed.
    File(String),
    /// True if the named plugin is active in the load order.
    Active(String),
    /// True if at least two data-directory files match the regex.
    Many(FilenameRegex),
    /// True if at least two active plugins match the regex.
    ManyActive(FilenameRegex),
    /// True if the named plugin has its master flag set.
    IsMaster(String),
    /// True if the named file's CRC-32 equals the literal.
    Checksum(String, u32),
    /// True if the named plugin's version compares as given against the
    /// literal. An empty name refers to the game's executable.
    Version(String, String, Comparator),
}

impl Function {
    fn eval(&self, state: &State) -> Result<bool, ConditionEvaluationError> {
        match self {
            Function::File(path) => Ok(state.file_exists(path)),
            Function::Active(name) => Ok(state.is_active(name)),
            Function::Many(regex) => {
                Ok(state.count_files_matching(&regex.parent_path, &regex.regex)? > 1)
            }
            Function::ManyActive(regex) => Ok(state.count_active_matching(&regex.regex) > 1),
            Function::IsMaster(name) => state.is_master(name),
            Function::Checksum(path, crc) => Ok(state.crc(path)? == Some(*crc)),
            Function::Version(name, version, comparator) => {
                eval_version(name, version, *comparator, state)
            }
        }
    }
}

fn eval_version(
    name: &str,
    version: &str,
    comparator: Comparator,
    state: &State,
) -> Result<bool, ConditionEvaluationError> {
    let installed = if name.is_empty() {
        match state.executable_version() {
            Some(v) => Some(v.to_owned()),
            None => {
                logging::debug!(
                    "No executable version is known, treating a version comparison against it as a comparison against a missing file"
                );
                None
            }
        }
    } else if state.file_exists(name) {
        // A file that exists but has no readable version compares as "0".
        Some(state.plugin_version(name).unwrap_or("0").to_owned())
    } else {
        None
    };

    let Some(installed) = installed else {
        // A missing file has no version, which is treated as being less than
        // any version that could be given in a condition.
        return Ok(matches!(
            comparator,
            Comparator::NotEqual | Comparator::LessThan | Comparator::LessThanOrEqual
        ));
    };

    let ordering = compare_versions(&installed, version);

    Ok(match comparator {
        Comparator::Equal => ordering.is_eq(),
        Comparator::NotEqual => ordering.is_ne(),
        Comparator::LessThan => ordering.is_lt(),
        Comparator::GreaterThan => ordering.is_gt(),
        Comparator::LessThanOrEqual => ordering.is_le(),
        Comparator::GreaterThanOrEqual => ordering.is_ge(),
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Comparator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

/// A compiled `many()`/`many_active()` argument: an optional literal parent
/// path and a regex that the final path component is matched against.
#[derive(Clone, Debug)]
struct FilenameRegex {
    parent_path: String,
    regex: std::sync::Arc<fancy_regex::Regex>,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::game::GameType;

    fn state_with_files(files: &[&str]) -> (tempfile::TempDir, State) {
        let dir = tempfile::tempdir().unwrap();

        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        let state = State::new(GameType::Oblivion, dir.path().to_path_buf());

        (dir, state)
    }

    mod eval {
        use super::*;

        #[test]
        fn file_should_be_true_iff_the_path_exists_in_the_data_directory() {
            let (_dir, state) = state_with_files(&["Blank.esp", "sub/texture.dds"]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(parse("file(\"Blank.esp\")").eval(&state).unwrap());
            assert!(parse("file(\"sub/texture.dds\")").eval(&state).unwrap());
            assert!(!parse("file(\"Missing.esp\")").eval(&state).unwrap());
        }

        #[test]
        fn file_should_find_ghosted_plugins() {
            let (_dir, state) = state_with_files(&["Blank.esp.ghost"]);

            let expression = Expression::from_str("file(\"Blank.esp\")").unwrap();

            assert!(expression.eval(&state).unwrap());
        }

        #[test]
        fn active_should_be_true_iff_the_plugin_is_active() {
            let (_dir, mut state) = state_with_files(&[]);
            state.set_active_plugins(&["Blank.esp"]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(parse("active(\"Blank.esp\")").eval(&state).unwrap());
            assert!(parse("active(\"BLANK.ESP\")").eval(&state).unwrap());
            assert!(!parse("active(\"Other.esp\")").eval(&state).unwrap());
        }

        #[test]
        fn many_should_be_true_iff_at_least_two_files_match() {
            let (_dir, state) = state_with_files(&["Blank.esp", "Blank - Different.esp"]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(parse("many(\"Blank.*\\.esp\")").eval(&state).unwrap());
            assert!(
                !parse("many(\"Blank - Different\\.esp\")")
                    .eval(&state)
                    .unwrap()
            );
        }

        #[test]
        fn many_active_should_be_true_iff_at_least_two_active_plugins_match() {
            let (_dir, mut state) = state_with_files(&[]);
            state.set_active_plugins(&["Blank.esp", "Blank - Different.esp", "Other.esp"]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(parse("many_active(\"Blank.*\\.esp\")").eval(&state).unwrap());
            assert!(!parse("many_active(\"Other\\.esp\")").eval(&state).unwrap());
        }

        #[test]
        fn checksum_should_compare_the_crc_of_the_file() {
            let (dir, state) = state_with_files(&[]);
            std::fs::write(dir.path().join("Blank.esp"), "plugin bytes").unwrap();

            let crc = crc32fast::hash(b"plugin bytes");

            let matching = format!("checksum(\"Blank.esp\", {crc:08X})");
            let expression = Expression::from_str(&matching).unwrap();
            assert!(expression.eval(&state).unwrap());

            let expression = Expression::from_str("checksum(\"Blank.esp\", DEADBEEF)").unwrap();
            assert!(!expression.eval(&state).unwrap());
        }

        #[test]
        fn version_should_use_the_loaded_plugin_version() {
            let (_dir, mut state) = state_with_files(&["Blank.esm"]);
            state.set_plugin_versions(&[("Blank.esm", "1.2.3")]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(
                parse("version(\"Blank.esm\", \"1.0.0\", \">=\")")
                    .eval(&state)
                    .unwrap()
            );
            assert!(
                !parse("version(\"Blank.esm\", \"1.2.4\", \">=\")")
                    .eval(&state)
                    .unwrap()
            );
        }

        #[test]
        fn version_should_treat_a_versionless_plugin_as_version_zero() {
            let (_dir, state) = state_with_files(&["Blank.esm"]);

            let expression =
                Expression::from_str("version(\"Blank.esm\", \"1.0\", \"<\")").unwrap();

            assert!(expression.eval(&state).unwrap());
        }

        #[test]
        fn version_should_treat_a_missing_file_as_older_than_any_version() {
            let (_dir, state) = state_with_files(&[]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(
                parse("version(\"Missing.esm\", \"1.0\", \"<\")")
                    .eval(&state)
                    .unwrap()
            );
            assert!(
                parse("version(\"Missing.esm\", \"1.0\", \"!=\")")
                    .eval(&state)
                    .unwrap()
            );
            assert!(
                !parse("version(\"Missing.esm\", \"1.0\", \"==\")")
                    .eval(&state)
                    .unwrap()
            );
        }

        #[test]
        fn not_should_negate_its_operand() {
            let (_dir, state) = state_with_files(&["Blank.esp"]);

            let parse = |s: &str| Expression::from_str(s).unwrap();

            assert!(!parse("not file(\"Blank.esp\")").eval(&state).unwrap());
            assert!(parse("not file(\"Missing.esp\")").eval(&state).unwrap());
        }

        #[test]
        fn and_should_bind_more_tightly_than_or() {
            let (_dir, state) = state_with_files(&["Blank.esp"]);

            let expression = Expression::from_str(
                "file(\"Blank.esp\") or file(\"Missing.esp\") and file(\"AlsoMissing.esp\")",
            )
            .unwrap();

            assert!(expression.eval(&state).unwrap());
        }

        #[test]
        fn parentheses_should_group_subexpressions() {
            let (_dir, state) = state_with_files(&["Blank.esp"]);

            let expression = Expression::from_str(
                "( file(\"Blank.esp\") or file(\"Missing.esp\") ) and file(\"AlsoMissing.esp\")",
            )
            .unwrap();

            assert!(!expression.eval(&state).unwrap());
        }

        #[test]
        fn io_failures_should_not_be_confused_with_false_results() {
            let dir = tempfile::tempdir().unwrap();
            let state = State::new(
                GameType::Oblivion,
                PathBuf::from(dir.path().join("missing data dir")),
            );

            // A missing data directory means there is nothing to match, not an
            // error.
            let expression = Expression::from_str("many(\".*\\.esp\")").unwrap();
            assert!(!expression.eval(&state).unwrap());
        }
    }
}
