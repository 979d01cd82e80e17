use saphyr::{MarkedYaml, YamlData};

use super::{
    error::{ExpectedType, ParseMetadataError},
    yaml::{YamlObjectType, get_as_hash, get_required_string_value, reject_unknown_keys},
    yaml_emit::{EmitYaml, YamlEmitter},
};

/// Represents a URL at which the parent plugin can be found.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location {
    url: String,
    name: Option<String>,
}

impl Location {
    /// Construct a [Location] with the given URL.
    #[must_use]
    pub fn new(url: String) -> Self {
        Location {
            url,
            ..Default::default()
        }
    }

    /// Set a name for the URL, eg. the page or site name.
    #[must_use]
    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    /// Get the URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the descriptive name of this location.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl TryFrom<&MarkedYaml> for Location {
    type Error = ParseMetadataError;

    fn try_from(value: &MarkedYaml) -> Result<Self, Self::Error> {
        match &value.data {
            YamlData::String(s) => Ok(Location {
                url: s.to_string(),
                name: None,
            }),
            YamlData::Hash(_) => {
                let hash = get_as_hash(value, YamlObjectType::Location)?;

                reject_unknown_keys(hash, &["link", "name"], YamlObjectType::Location)?;

                let link = get_required_string_value(
                    value.span.start,
                    hash,
                    "link",
                    YamlObjectType::Location,
                )?;
                let name = get_required_string_value(
                    value.span.start,
                    hash,
                    "name",
                    YamlObjectType::Location,
                )?;

                Ok(Location {
                    url: link.to_owned(),
                    name: Some(name.to_owned()),
                })
            }
            _ => Err(ParseMetadataError::unexpected_type(
                value.span.start,
                YamlObjectType::Location,
                ExpectedType::MapOrString,
            )),
        }
    }
}

impl EmitYaml for Location {
    fn is_scalar(&self) -> bool {
        self.name.is_none()
    }

    fn emit_yaml(&self, emitter: &mut YamlEmitter) {
        if let Some(name) = &self.name {
            emitter.begin_map();

            emitter.map_key("link");
            emitter.single_quoted_str(&self.url);

            emitter.map_key("name");
            emitter.single_quoted_str(name);

            emitter.end_map();
        } else {
            emitter.single_quoted_str(&self.url);
        }
    }
}
