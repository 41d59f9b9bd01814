//! Logic for loading configuration in to an object model
use std::collections::BTreeMap;
use std::str::FromStr;

use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        /// What was being checked.
        message: &'static str,
        /// The underlying failure.
        error: String,
    },
}

/// The configuration for the executor.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builder.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Which character the `hero` root field resolves to.
    #[serde(default)]
    pub heroes: Heroes,

    /// Relation traversal options.
    #[serde(default)]
    pub traversal: Traversal,

    /// Limits protecting the parser and the executor.
    #[serde(default)]
    pub limits: Limits,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(heroes: Option<Heroes>, traversal: Option<Traversal>, limits: Option<Limits>) -> Self {
        Self {
            heroes: heroes.unwrap_or_default(),
            traversal: traversal.unwrap_or_default(),
            limits: limits.unwrap_or_default(),
        }
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

/// Hero selection for the `hero(episode:)` root field.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Heroes {
    /// The hero of the saga, used when no episode matches.
    /// default: "2001"
    #[serde(default = "default_saga_hero")]
    pub saga: String,

    /// Per-episode hero ids, keyed by the exact `episode` argument value.
    /// default: NewHope -> 1000, Awakens -> 2002
    #[serde(default = "default_episode_heroes")]
    pub episodes: BTreeMap<String, String>,
}

fn default_saga_hero() -> String {
    "2001".to_string()
}

fn default_episode_heroes() -> BTreeMap<String, String> {
    [("NewHope", "1000"), ("Awakens", "2002")]
        .into_iter()
        .map(|(episode, id)| (episode.to_string(), id.to_string()))
        .collect()
}

#[buildstructor::buildstructor]
impl Heroes {
    #[builder]
    pub fn new(saga: Option<String>, episodes: BTreeMap<String, String>) -> Self {
        Self {
            saga: saga.unwrap_or_else(default_saga_hero),
            episodes: if episodes.is_empty() {
                default_episode_heroes()
            } else {
                episodes
            },
        }
    }

    /// The canonical id of the hero of `episode`.
    pub fn hero_id(&self, episode: Option<&str>) -> &str {
        episode
            .and_then(|episode| self.episodes.get(episode))
            .unwrap_or(&self.saga)
    }
}

impl Default for Heroes {
    fn default() -> Self {
        Heroes::builder().build()
    }
}

/// Relation traversal options.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Traversal {
    /// Collapse duplicate friendship edges into a single friend.
    /// default: false
    #[serde(default)]
    pub deduplicate_friends: bool,
}

#[buildstructor::buildstructor]
impl Traversal {
    #[builder]
    pub fn new(deduplicate_friends: Option<bool>) -> Self {
        Self {
            deduplicate_friends: deduplicate_friends.unwrap_or_default(),
        }
    }
}

/// Limits protecting the parser and the executor.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// Recursion limit handed to the GraphQL parser.
    /// default: 4096
    #[serde(default = "default_parser_recursion_limit")]
    pub parser_recursion_limit: usize,

    /// Maximum nesting of selections, fragments included.
    /// default: 512
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of selections bound for one operation, counted after
    /// named fragments are expanded at each use site.
    /// default: 10000
    #[serde(default = "default_max_selections")]
    pub max_selections: usize,
}

fn default_parser_recursion_limit() -> usize {
    // This is `apollo-parser`’s default, which protects against stack overflow
    // but is still very high for "reasonable" queries.
    4096
}

fn default_max_depth() -> usize {
    512
}

fn default_max_selections() -> usize {
    10_000
}

#[buildstructor::buildstructor]
impl Limits {
    #[builder]
    pub fn new(
        parser_recursion_limit: Option<usize>,
        max_depth: Option<usize>,
        max_selections: Option<usize>,
    ) -> Self {
        Self {
            parser_recursion_limit: parser_recursion_limit
                .unwrap_or_else(default_parser_recursion_limit),
            max_depth: max_depth.unwrap_or_else(default_max_depth),
            max_selections: max_selections.unwrap_or_else(default_max_selections),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::builder().build()
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = false;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}

/// Parses and checks a YAML configuration. An empty document yields the defaults.
pub fn validate_configuration(raw_yaml: &str) -> Result<Configuration, ConfigurationError> {
    if raw_yaml.trim().is_empty() {
        return Ok(Configuration::default());
    }

    let configuration = Configuration::from_str(raw_yaml).map_err(|e| {
        ConfigurationError::InvalidConfiguration {
            message: "failed to parse yaml",
            error: e.to_string(),
        }
    })?;

    let limits = &configuration.limits;
    if limits.max_depth == 0 || limits.parser_recursion_limit == 0 || limits.max_selections == 0 {
        return Err(ConfigurationError::InvalidConfiguration {
            message: "invalid limits",
            error: "limits must be greater than zero".to_string(),
        });
    }
    if configuration.heroes.saga.is_empty() {
        return Err(ConfigurationError::InvalidConfiguration {
            message: "invalid heroes",
            error: "the saga hero id cannot be empty".to_string(),
        });
    }

    Ok(configuration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let configuration = validate_configuration("").unwrap();
        assert_eq!(configuration, Configuration::default());
        assert_eq!(configuration.heroes.hero_id(Some("NewHope")), "1000");
        assert_eq!(configuration.heroes.hero_id(Some("Awakens")), "2002");
        assert_eq!(configuration.heroes.hero_id(Some("Empire")), "2001");
        assert_eq!(configuration.heroes.hero_id(None), "2001");
        assert!(!configuration.traversal.deduplicate_friends);
        assert_eq!(configuration.limits.max_depth, 512);
        assert_eq!(configuration.limits.max_selections, 10_000);
    }

    #[test]
    fn yaml_overrides() {
        let configuration = validate_configuration(
            r#"
heroes:
  saga: "1000"
traversal:
  deduplicate_friends: true
limits:
  max_depth: 8
  max_selections: 50
"#,
        )
        .unwrap();
        assert_eq!(configuration.heroes.hero_id(None), "1000");
        assert_eq!(configuration.heroes.hero_id(Some("NewHope")), "1000");
        assert!(configuration.traversal.deduplicate_friends);
        assert_eq!(configuration.limits.max_depth, 8);
        assert_eq!(configuration.limits.parser_recursion_limit, 4096);
        assert_eq!(configuration.limits.max_selections, 50);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = validate_configuration("traversal:\n  follow_edges: backward\n").unwrap_err();
        assert!(error.to_string().starts_with("failed to parse yaml: "));

        let error = validate_configuration("limits:\n  max_depth: 0\n").unwrap_err();
        insta::assert_snapshot!(error.to_string(), @"invalid limits: limits must be greater than zero");

        let error = validate_configuration("limits:\n  max_selections: 0\n").unwrap_err();
        insta::assert_snapshot!(error.to_string(), @"invalid limits: limits must be greater than zero");
    }

    #[test]
    fn builder() {
        let configuration = Configuration::builder()
            .traversal(Traversal::builder().deduplicate_friends(true).build())
            .build();
        assert!(configuration.traversal.deduplicate_friends);
        assert_eq!(configuration.limits, Limits::default());
    }

    #[test]
    fn schema_lists_sections() {
        let schema = serde_json::to_value(generate_config_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("heroes"));
        assert!(properties.contains_key("traversal"));
        assert!(properties.contains_key("limits"));
    }
}
