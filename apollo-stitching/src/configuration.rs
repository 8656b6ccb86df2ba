//! Declarative configuration of type merging.

use std::str::FromStr;

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;

use crate::error::StitchingError;
use crate::merge_config::MergeTypes;
use crate::merge_config::MergeTypesRepr;

/// Type merging configuration.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Which types exposed by several subschemas are selected for merging: `true` for every type,
    /// a list of type names, or `false` (the default) for the types with a merge configuration.
    ///
    /// Selecting a type never merges it on its own. Only the subschemas declaring a merge
    /// configuration for a type take part in merging it, and a selected type that none of them
    /// configures is left unmerged and reported at trace level.
    #[schemars(with = "MergeTypesRepr")]
    pub merge_types: MergeTypes,
}

impl Configuration {
    pub fn from_yaml(text: &str) -> Result<Self, StitchingError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, StitchingError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The JSON schema of the configuration.
    pub fn schema() -> RootSchema {
        schemars::schema_for!(Configuration)
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = StitchingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml(s)
    }
}
