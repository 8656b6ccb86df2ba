//! Subschemas and the stitched schema composed from them.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_compiler::ast::NamedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::StitchingError;
use crate::merge_config::MergedTypeConfig;
use crate::stitching_info::StitchingInfo;

/// Identifies a subschema within one [`StitchingInfo`].
///
/// Subschemas are compared by identity: two services exposing the same SDL are still two
/// subschemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubschemaId(usize);

impl SubschemaId {
    pub(crate) const fn new(index: usize) -> Self {
        SubschemaId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubschemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A backend service as declared before composition: its schema, as exposed to the gateway, and
/// the merge configuration of every type it can resolve by key.
#[derive(Clone, Debug)]
pub struct SubschemaConfig {
    name: String,
    schema: Arc<Valid<Schema>>,
    merge: IndexMap<String, MergedTypeConfig>,
}

impl SubschemaConfig {
    pub fn new(name: impl Into<String>, schema: impl Into<Arc<Valid<Schema>>>) -> Self {
        SubschemaConfig {
            name: name.into(),
            schema: schema.into(),
            merge: IndexMap::new(),
        }
    }

    /// Parses and validates the SDL exposed by the service.
    pub fn parse(name: impl Into<String>, sdl: &str) -> Result<Self, StitchingError> {
        let name = name.into();
        let schema = Schema::parse_and_validate(sdl, format!("{name}.graphql")).map_err(
            |errors| StitchingError::InvalidSchema {
                name: name.clone(),
                message: errors.errors.to_string(),
            },
        )?;
        Ok(Self::new(name, schema))
    }

    /// Declares how to fetch this service's contribution to `type_name`.
    pub fn merge(mut self, type_name: impl Into<String>, config: MergedTypeConfig) -> Self {
        self.merge.insert(type_name.into(), config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A subschema taking part in a stitched schema.
pub struct Subschema {
    id: SubschemaId,
    name: String,
    schema: Arc<Valid<Schema>>,
    merge: IndexMap<String, MergedTypeConfig>,
}

impl Subschema {
    pub(crate) fn new(id: SubschemaId, config: SubschemaConfig) -> Self {
        let SubschemaConfig {
            name,
            schema,
            merge,
        } = config;
        Subschema {
            id,
            name,
            schema,
            merge,
        }
    }

    pub fn id(&self) -> SubschemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema of the service, as exposed to the gateway.
    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub fn merged_type_config(&self, type_name: &str) -> Option<&MergedTypeConfig> {
        self.merge.get(type_name)
    }
}

impl fmt::Debug for Subschema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subschema")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("merge", &self.merge.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Extension data attached to a stitched schema.
#[derive(Clone, Debug, Default)]
pub struct SchemaExtensions {
    /// Absent when the stitched schema has no merged types.
    pub stitching_info: Option<Arc<StitchingInfo>>,
}

/// The schema served to clients, composed from every subschema.
#[derive(Clone, Debug)]
pub struct StitchedSchema {
    schema: Valid<Schema>,
    pub extensions: SchemaExtensions,
}

impl StitchedSchema {
    pub fn new(schema: Valid<Schema>) -> Self {
        StitchedSchema {
            schema,
            extensions: SchemaExtensions::default(),
        }
    }

    pub fn parse(sdl: &str) -> Result<Self, StitchingError> {
        let schema = Schema::parse_and_validate(sdl, "stitched.graphql").map_err(|errors| {
            StitchingError::InvalidSchema {
                name: "stitched".to_owned(),
                message: errors.errors.to_string(),
            }
        })?;
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// Whether `type_name` is an interface or a union.
    pub(crate) fn is_abstract_type(&self, type_name: &NamedType) -> bool {
        self.schema
            .types
            .get(type_name)
            .is_some_and(|ty| ty.is_interface() || ty.is_union())
    }

    /// The name of the type `type_name`, as stored in the schema.
    pub(crate) fn type_name(&self, type_name: &str) -> Option<&NamedType> {
        self.schema.types.get_key_value(type_name).map(|(name, _)| name)
    }
}

/// Attaches stitching metadata to the stitched schema, so that the entry handler can find it.
pub fn add_stitching_info(schema: StitchedSchema, stitching_info: StitchingInfo) -> StitchedSchema {
    StitchedSchema {
        extensions: SchemaExtensions {
            stitching_info: Some(Arc::new(stitching_info)),
        },
        ..schema
    }
}
