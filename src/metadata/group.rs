use saphyr::MarkedYaml;

use super::error::ParseMetadataError;
use super::yaml::{
    YamlObjectType, get_as_hash, get_required_string_value, get_strings_vec_value,
    reject_unknown_keys,
};
use super::yaml_emit::{EmitYaml, YamlEmitter};

/// Represents a group to which plugin metadata objects can belong.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Group {
    name: String,
    after_groups: Vec<String>,
}

impl Group {
    /// The name of the group to which all plugins belong by default.
    pub const DEFAULT_NAME: &'static str = "default";

    /// Construct a [Group] with the given name.
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name,
            after_groups: Vec::new(),
        }
    }

    /// Set the names of the groups that this group loads after.
    #[must_use]
    pub fn with_after_groups(mut self, after_groups: Vec<String>) -> Self {
        self.after_groups = after_groups;
        self
    }

    /// Get the name of the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the names of the groups that this group loads after.
    pub fn after_groups(&self) -> &[String] {
        &self.after_groups
    }
}

impl std::default::Default for Group {
    /// Construct a Group with the default name and an empty set of groups to
    /// load after.
    fn default() -> Self {
        Self {
            name: Group::DEFAULT_NAME.to_owned(),
            after_groups: Vec::new(),
        }
    }
}

impl TryFrom<&MarkedYaml> for Group {
    type Error = ParseMetadataError;

    fn try_from(value: &MarkedYaml) -> Result<Self, Self::Error> {
        let hash = get_as_hash(value, YamlObjectType::Group)?;

        reject_unknown_keys(hash, &["name", "after"], YamlObjectType::Group)?;

        let name =
            get_required_string_value(value.span.start, hash, "name", YamlObjectType::Group)?;

        let after = get_strings_vec_value(hash, "after", YamlObjectType::Group)?;

        Ok(Group {
            name: name.to_owned(),
            after_groups: after.iter().map(|a| (*a).to_owned()).collect(),
        })
    }
}

impl EmitYaml for Group {
    fn emit_yaml(&self, emitter: &mut YamlEmitter) {
        emitter.begin_map();

        emitter.map_key("name");
        emitter.single_quoted_str(&self.name);

        if !self.after_groups.is_empty() {
            emitter.map_key("after");
            emitter.begin_array();

            for after in &self.after_groups {
                emitter.unquoted_str(after);
            }

            emitter.end_array();
        }

        emitter.end_map();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod try_from_yaml {
        use crate::metadata::parse;

        use super::*;

        #[test]
        fn should_error_if_name_is_missing() {
            let yaml = parse("{after: [a]}");

            assert!(Group::try_from(&yaml).is_err());
        }

        #[test]
        fn should_error_if_given_an_unknown_key() {
            let yaml = parse("{name: a, description: text}");

            assert!(Group::try_from(&yaml).is_err());
        }

        #[test]
        fn should_leave_after_groups_empty_if_not_present() {
            let yaml = parse("{name: a}");

            let group = Group::try_from(&yaml).unwrap();

            assert_eq!("a", group.name());
            assert!(group.after_groups().is_empty());
        }

        #[test]
        fn should_set_all_given_fields() {
            let yaml = parse("{name: b, after: [a, c]}");

            let group = Group::try_from(&yaml).unwrap();

            assert_eq!("b", group.name());
            assert_eq!(&["a".to_owned(), "c".to_owned()], group.after_groups());
        }
    }

    mod emit_yaml {
        use super::*;
        use crate::metadata::emit;

        #[test]
        fn should_omit_after_key_if_the_field_is_empty() {
            let group = Group::new("name".into());
            let yaml = emit(&group);

            assert_eq!(format!("name: '{}'", group.name), yaml);
        }

        #[test]
        fn should_include_after_key_if_after_groups_is_not_empty() {
            let group =
                Group::new("name".into()).with_after_groups(vec!["after1".into(), "after2".into()]);

            let yaml = emit(&group);

            assert_eq!(
                format!(
                    "name: '{}'\nafter:\n  - {}\n  - {}",
                    group.name, group.after_groups[0], group.after_groups[1]
                ),
                yaml
            );
        }
    }
}
