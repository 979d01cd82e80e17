use saphyr::{MarkedYaml, YamlData};

use super::{
    error::{ExpectedType, ParseMetadataError},
    yaml::{
        YamlObjectType, get_as_hash, get_required_string_value, parse_condition,
        reject_unknown_keys,
    },
    yaml_emit::{EmitYaml, YamlEmitter},
};

/// Represents whether a Bash Tag suggestion is for addition or removal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TagSuggestion {
    #[default]
    Addition,
    Removal,
}

/// Represents a Bash Tag suggestion for a plugin.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Tag {
    name: String,
    suggestion: TagSuggestion,
    condition: Option<String>,
}

impl Tag {
    /// Create a [Tag] suggestion for the given tag name.
    #[must_use]
    pub fn new(name: String, suggestion: TagSuggestion) -> Self {
        Self {
            name,
            suggestion,
            condition: None,
        }
    }

    /// Set the condition string.
    #[must_use]
    pub fn with_condition(mut self, condition: String) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Get the tag's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get if the tag should be added.
    pub fn is_addition(&self) -> bool {
        self.suggestion == TagSuggestion::Addition
    }

    /// Get the condition string.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub(crate) fn without_condition(mut self) -> Self {
        self.condition = None;
        self
    }
}

impl TryFrom<&MarkedYaml> for Tag {
    type Error = ParseMetadataError;

    fn try_from(value: &MarkedYaml) -> Result<Self, Self::Error> {
        match &value.data {
            YamlData::String(s) => {
                let (name, suggestion) = name_and_suggestion(s);
                Ok(Tag {
                    name,
                    suggestion,
                    condition: None,
                })
            }
            YamlData::Hash(_) => {
                let hash = get_as_hash(value, YamlObjectType::Tag)?;

                reject_unknown_keys(hash, &["name", "condition"], YamlObjectType::Tag)?;

                let name =
                    get_required_string_value(value.span.start, hash, "name", YamlObjectType::Tag)?;

                let condition = parse_condition(hash, YamlObjectType::Tag)?;

                let (name, suggestion) = name_and_suggestion(name);
                Ok(Tag {
                    name,
                    suggestion,
                    condition,
                })
            }
            _ => Err(ParseMetadataError::unexpected_type(
                value.span.start,
                YamlObjectType::Tag,
                ExpectedType::MapOrString,
            )),
        }
    }
}

fn name_and_suggestion(value: &str) -> (String, TagSuggestion) {
    if let Some(name) = value.strip_prefix("-") {
        (name.to_owned(), TagSuggestion::Removal)
    } else {
        (value.to_owned(), TagSuggestion::Addition)
    }
}

impl EmitYaml for Tag {
    fn is_scalar(&self) -> bool {
        self.condition.is_none()
    }

    fn emit_yaml(&self, emitter: &mut YamlEmitter) {
        if self.is_scalar() {
            emitter.unquoted_str(&self.emitted_name());
            return;
        }

        emitter.begin_map();

        emitter.map_key("name");
        emitter.unquoted_str(&self.emitted_name());

        if let Some(condition) = &self.condition {
            emitter.map_key("condition");
            emitter.single_quoted_str(condition);
        }

        emitter.end_map();
    }
}

impl Tag {
    fn emitted_name(&self) -> String {
        if self.is_addition() {
            self.name.clone()
        } else {
            format!("-{}", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod try_from_yaml {
        use crate::metadata::parse;

        use super::*;

        #[test]
        fn should_read_an_addition_from_a_scalar() {
            let yaml = parse("Relev");

            let tag = Tag::try_from(&yaml).unwrap();

            assert_eq!("Relev", tag.name());
            assert!(tag.is_addition());
            assert!(tag.condition().is_none());
        }

        #[test]
        fn should_read_a_removal_from_a_scalar_with_a_hyphen_prefix() {
            let yaml = parse("'-Relev'");

            let tag = Tag::try_from(&yaml).unwrap();

            assert_eq!("Relev", tag.name());
            assert!(!tag.is_addition());
        }

        #[test]
        fn should_read_name_and_condition_from_a_map() {
            let yaml = parse("{name: Relev, condition: 'file(\"Foo.esp\")'}");

            let tag = Tag::try_from(&yaml).unwrap();

            assert_eq!("Relev", tag.name());
            assert!(tag.is_addition());
            assert_eq!("file(\"Foo.esp\")", tag.condition().unwrap());
        }

        #[test]
        fn should_error_if_given_a_list() {
            let yaml = parse("[0, 1, 2]");

            assert!(Tag::try_from(&yaml).is_err());
        }

        #[test]
        fn should_error_if_given_an_unknown_key() {
            let yaml = parse("{name: Relev, display: Relev}");

            assert!(Tag::try_from(&yaml).is_err());
        }

        #[test]
        fn should_error_if_given_an_invalid_condition() {
            let yaml = parse("{name: Relev, condition: invalid}");

            assert!(Tag::try_from(&yaml).is_err());
        }
    }

    mod emit_yaml {
        use crate::metadata::emit;

        use super::*;

        #[test]
        fn should_emit_an_addition_as_a_scalar() {
            let tag = Tag::new("Relev".into(), TagSuggestion::Addition);

            assert_eq!("Relev", emit(&tag));
        }

        #[test]
        fn should_emit_a_removal_with_a_hyphen_prefix() {
            let tag = Tag::new("Relev".into(), TagSuggestion::Removal);

            assert_eq!("-Relev", emit(&tag));
        }

        #[test]
        fn should_emit_a_map_if_a_condition_is_set() {
            let tag =
                Tag::new("Relev".into(), TagSuggestion::Addition).with_condition("condition1".into());

            assert_eq!("name: Relev\ncondition: 'condition1'", emit(&tag));
        }
    }
}
