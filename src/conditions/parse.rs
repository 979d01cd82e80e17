use std::path::{Component, Path};
use std::sync::Arc;

use super::{
    Comparator, ConditionSyntaxError, Expression, FilenameRegex, Function, Operand, Term,
};

pub(super) fn parse_expression(input: &str) -> Result<Expression, ConditionSyntaxError> {
    let mut parser = Parser::new(input);

    let expression = parser.expression()?;

    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("end of input"));
    }

    Ok(expression)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or("")
    }

    fn at_end(&self) -> bool {
        self.rest().is_empty()
    }

    fn error(&self, expected: &str) -> ConditionSyntaxError {
        ConditionSyntaxError::new(self.input, self.pos, expected)
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn eat(&mut self, literal: &str) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    /// Like eat, but only matches if the keyword is not followed by another
    /// identifier character.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        if let Some(after) = rest.strip_prefix(keyword) {
            match after.chars().next() {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => false,
                _ => {
                    self.pos += keyword.len();
                    true
                }
            }
        } else {
            false
        }
    }

    fn expression(&mut self) -> Result<Expression, ConditionSyntaxError> {
        let mut alternatives = vec![self.compound()?];

        loop {
            self.skip_whitespace();
            if self.eat_keyword("or") {
                alternatives.push(self.compound()?);
            } else {
                break;
            }
        }

        Ok(Expression { alternatives })
    }

    fn compound(&mut self) -> Result<Vec<Term>, ConditionSyntaxError> {
        let mut terms = vec![self.term()?];

        loop {
            self.skip_whitespace();
            if self.eat_keyword("and") {
                terms.push(self.term()?);
            } else {
                break;
            }
        }

        Ok(terms)
    }

    fn term(&mut self) -> Result<Term, ConditionSyntaxError> {
        self.skip_whitespace();

        let negated = self.eat_keyword("not");
        self.skip_whitespace();

        let operand = if self.eat("(") {
            let expression = self.expression()?;

            self.skip_whitespace();
            if !self.eat(")") {
                return Err(self.error("a closing parenthesis"));
            }

            Operand::Nested(Box::new(expression))
        } else {
            Operand::Function(self.function()?)
        };

        Ok(Term { negated, operand })
    }

    fn function(&mut self) -> Result<Function, ConditionSyntaxError> {
        let name = self.identifier();

        match name {
            "file" => {
                let path = self.single_string_argument()?;
                self.validate_path(&path)?;
                Ok(Function::File(path))
            }
            "active" => {
                let name = self.single_string_argument()?;
                Ok(Function::Active(name))
            }
            "many" => {
                let pattern = self.single_string_argument()?;
                let regex = self.filename_regex(&pattern)?;
                Ok(Function::Many(regex))
            }
            "many_active" => {
                let pattern = self.single_string_argument()?;
                let regex = self.filename_regex(&pattern)?;
                Ok(Function::ManyActive(regex))
            }
            "is_master" => {
                let path = self.single_string_argument()?;
                self.validate_path(&path)?;
                Ok(Function::IsMaster(path))
            }
            "checksum" => {
                self.open_parenthesis()?;
                let path = self.quoted_string()?;
                self.validate_path(&path)?;
                self.comma()?;
                let crc = self.hex_u32()?;
                self.close_parenthesis()?;
                Ok(Function::Checksum(path, crc))
            }
            "version" => {
                self.open_parenthesis()?;
                let path = self.quoted_string()?;
                if !path.is_empty() {
                    self.validate_path(&path)?;
                }
                self.comma()?;
                let version = self.quoted_string()?;
                self.comma()?;
                let comparator = self.comparator()?;
                self.close_parenthesis()?;
                Ok(Function::Version(path, version, comparator))
            }
            _ => Err(self.error("a function name")),
        }
    }

    fn identifier(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !c.is_ascii_lowercase() && c != '_')
            .unwrap_or(rest.len());

        self.pos += end;
        rest.get(..end).unwrap_or("")
    }

    fn single_string_argument(&mut self) -> Result<String, ConditionSyntaxError> {
        self.open_parenthesis()?;
        let value = self.quoted_string()?;
        self.close_parenthesis()?;

        Ok(value)
    }

    fn open_parenthesis(&mut self) -> Result<(), ConditionSyntaxError> {
        self.skip_whitespace();
        if self.eat("(") {
            Ok(())
        } else {
            Err(self.error("an opening parenthesis"))
        }
    }

    fn close_parenthesis(&mut self) -> Result<(), ConditionSyntaxError> {
        self.skip_whitespace();
        if self.eat(")") {
            Ok(())
        } else {
            Err(self.error("a closing parenthesis"))
        }
    }

    fn comma(&mut self) -> Result<(), ConditionSyntaxError> {
        self.skip_whitespace();
        if self.eat(",") {
            Ok(())
        } else {
            Err(self.error("a comma"))
        }
    }

    fn quoted_string(&mut self) -> Result<String, ConditionSyntaxError> {
        self.skip_whitespace();
        if !self.eat("\"") {
            return Err(self.error("a double-quoted string"));
        }

        let rest = self.rest();
        let Some(end) = rest.find('"') else {
            return Err(self.error("a closing double quote"));
        };

        self.pos += end + 1;
        Ok(rest.get(..end).unwrap_or("").to_owned())
    }

    fn hex_u32(&mut self) -> Result<u32, ConditionSyntaxError> {
        self.skip_whitespace();
        let _ = self.eat("0x") || self.eat("0X");

        let rest = self.rest();
        let end = rest
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(rest.len());

        let digits = rest.get(..end).unwrap_or("");
        if digits.is_empty() || digits.len() > 8 {
            return Err(self.error("a CRC-32 value in hexadecimal"));
        }

        match u32::from_str_radix(digits, 16) {
            Ok(crc) => {
                self.pos += end;
                Ok(crc)
            }
            Err(_) => Err(self.error("a CRC-32 value in hexadecimal")),
        }
    }

    fn comparator(&mut self) -> Result<Comparator, ConditionSyntaxError> {
        self.skip_whitespace();
        if !self.eat("\"") {
            return Err(self.error("a double-quoted comparison operator"));
        }

        let comparator = if self.eat("==") {
            Comparator::Equal
        } else if self.eat("!=") {
            Comparator::NotEqual
        } else if self.eat("<=") {
            Comparator::LessThanOrEqual
        } else if self.eat(">=") {
            Comparator::GreaterThanOrEqual
        } else if self.eat("<") {
            Comparator::LessThan
        } else if self.eat(">") {
            Comparator::GreaterThan
        } else {
            return Err(self.error("a comparison operator"));
        };

        if self.eat("\"") {
            Ok(comparator)
        } else {
            Err(self.error("a closing double quote"))
        }
    }

    fn validate_path(&self, path: &str) -> Result<(), ConditionSyntaxError> {
        let is_invalid = path.is_empty()
            || path.contains('\\')
            || Path::new(path)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));

        if is_invalid {
            Err(self.error("a relative path using forward slashes"))
        } else {
            Ok(())
        }
    }

    fn filename_regex(&self, pattern: &str) -> Result<FilenameRegex, ConditionSyntaxError> {
        let (parent_path, filename_pattern) = match pattern.rsplit_once('/') {
            Some((parent, filename)) => (parent, filename),
            None => ("", pattern),
        };

        if !parent_path.is_empty() {
            self.validate_path(parent_path)?;
        }

        match crate::regex(&format!("^{filename_pattern}$")) {
            Ok(regex) => Ok(FilenameRegex {
                parent_path: parent_path.to_owned(),
                regex: Arc::new(regex),
            }),
            Err(_) => Err(self.error("a valid regular expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn should_parse_each_function() {
        let conditions = &[
            "file(\"Blank.esp\")",
            "active(\"Blank.esp\")",
            "many(\"Blank.*\\.esp\")",
            "many_active(\"Blank.*\\.esp\")",
            "is_master(\"Blank.esp\")",
            "checksum(\"Blank.esp\", DEADBEEF)",
            "version(\"Blank.esp\", \"1.0\", \">=\")",
        ];

        for condition in conditions {
            assert!(
                Expression::from_str(condition).is_ok(),
                "failed to parse {condition}"
            );
        }
    }

    #[test]
    fn should_parse_operators_and_parentheses() {
        let conditions = &[
            "not file(\"Blank.esp\")",
            "file(\"A.esp\") and file(\"B.esp\")",
            "file(\"A.esp\") or file(\"B.esp\")",
            "file(\"A.esp\") and not ( file(\"B.esp\") or file(\"C.esp\") )",
        ];

        for condition in conditions {
            assert!(
                Expression::from_str(condition).is_ok(),
                "failed to parse {condition}"
            );
        }
    }

    #[test]
    fn should_be_whitespace_insensitive() {
        assert!(Expression::from_str("file( \"Blank.esp\" )").is_ok());
        assert!(Expression::from_str("checksum( \"Blank.esp\" , DEADBEEF )").is_ok());
        assert!(Expression::from_str("  not  file(\"Blank.esp\")  ").is_ok());
    }

    #[test]
    fn should_error_on_an_unknown_function() {
        assert!(Expression::from_str("invalid(\"Blank.esp\")").is_err());
        assert!(Expression::from_str("invalid").is_err());
    }

    #[test]
    fn should_error_on_trailing_input() {
        assert!(Expression::from_str("file(\"Blank.esp\") garbage").is_err());
    }

    #[test]
    fn should_error_on_an_unterminated_string() {
        assert!(Expression::from_str("file(\"Blank.esp)").is_err());
    }

    #[test]
    fn should_error_on_a_missing_argument() {
        assert!(Expression::from_str("checksum(\"Blank.esp\")").is_err());
        assert!(Expression::from_str("version(\"Blank.esp\", \"1.0\")").is_err());
    }

    #[test]
    fn should_error_on_an_invalid_crc() {
        assert!(Expression::from_str("checksum(\"Blank.esp\", XYZ)").is_err());
        assert!(Expression::from_str("checksum(\"Blank.esp\", 123456789)").is_err());
    }

    #[test]
    fn should_error_on_an_invalid_comparator() {
        assert!(Expression::from_str("version(\"Blank.esp\", \"1.0\", \"=\")").is_err());
        assert!(Expression::from_str("version(\"Blank.esp\", \"1.0\", >=)").is_err());
    }

    #[test]
    fn should_reject_paths_that_leave_the_data_directory() {
        assert!(Expression::from_str("file(\"../Blank.esp\")").is_err());
        assert!(Expression::from_str("file(\"sub/../../Blank.esp\")").is_err());
        assert!(Expression::from_str("file(\"C:\\\\Blank.esp\")").is_err());
    }

    #[test]
    fn should_reject_an_invalid_regex() {
        assert!(Expression::from_str("many(\"(unclosed\")").is_err());
    }

    #[test]
    fn should_not_treat_identifier_prefixes_as_keywords() {
        // "nothing" starts with "not" and "android" starts with "and".
        assert!(Expression::from_str("nothing(\"Blank.esp\")").is_err());
        assert!(Expression::from_str("file(\"A.esp\") android(\"B.esp\")").is_err());
    }
}
