//! How each subschema contributes to a merged type.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::context::Context;
use crate::delegate::DelegationResult;
use crate::external::ExternalObject;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::request::RequestInfo;
use crate::resolution::Resolution;
use crate::schema::Subschema;
use crate::selection::Field;
use crate::selection::SelectionSet;

/// Builds the arguments of the follow-up root field from the object resolved so far.
pub type ArgsFn = Arc<dyn Fn(&ExternalObject) -> Object + Send + Sync>;

/// Extracts the key identifying the object resolved so far, for batched delegation.
pub type KeyFn = Arc<dyn Fn(&ExternalObject) -> Value + Send + Sync>;

/// Builds the arguments of a batched root field from the keys collected in one batch.
pub type ArgsFromKeysFn = Arc<dyn Fn(&[Value]) -> Object + Send + Sync>;

/// Computes the selections a custom field resolver needs, from the field node being resolved.
pub type DynamicSelectionSetFn = Arc<dyn Fn(&Field) -> SelectionSet + Send + Sync>;

/// Decides whether a type exposed by several subschemas should be merged.
pub type MergeTypeFilter = Arc<dyn Fn(&[MergeTypeCandidate], &str) -> bool + Send + Sync>;

/// Fetches a subschema's contribution to a merged object.
pub trait MergedTypeResolver: Send + Sync {
    /// Requests `selection_set` from `subschema` for the object resolved so far.
    fn resolve(
        &self,
        object: &ExternalObject,
        context: &Context,
        info: &Arc<RequestInfo>,
        subschema: &Arc<Subschema>,
        selection_set: SelectionSet,
    ) -> Resolution<DelegationResult>;
}

impl<F> MergedTypeResolver for F
where
    F: Fn(
            &ExternalObject,
            &Context,
            &Arc<RequestInfo>,
            &Arc<Subschema>,
            SelectionSet,
        ) -> Resolution<DelegationResult>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        object: &ExternalObject,
        context: &Context,
        info: &Arc<RequestInfo>,
        subschema: &Arc<Subschema>,
        selection_set: SelectionSet,
    ) -> Resolution<DelegationResult> {
        self(object, context, info, subschema, selection_set)
    }
}

/// The merge configuration of one type in one subschema.
///
/// Either [`MergedTypeConfig::resolve`] is set, or [`MergedTypeConfig::field_name`] is set along
/// with [`MergedTypeConfig::args`] or [`MergedTypeConfig::key`], in which case the resolver
/// delegating to that root field is synthesized when the stitching info is built.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MergedTypeConfig {
    /// The fields this subschema needs to know before it can resolve the type, e.g. `{ id }`.
    pub selection_set: Option<String>,

    /// The root field resolving the type by key.
    pub field_name: Option<String>,

    /// Additional requirements of individual fields.
    pub fields: IndexMap<String, MergedFieldConfig>,

    #[serde(skip)]
    pub(crate) args: Option<ArgsFn>,
    #[serde(skip)]
    pub(crate) key: Option<KeyFn>,
    #[serde(skip)]
    pub(crate) args_from_keys: Option<ArgsFromKeysFn>,
    #[serde(skip)]
    pub(crate) resolve: Option<Arc<dyn MergedTypeResolver>>,
}

impl MergedTypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection_set(mut self, selection_set: impl Into<String>) -> Self {
        self.selection_set = Some(selection_set.into());
        self
    }

    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    /// Requires `selection_set` to be known before `field` can be fetched from this subschema.
    pub fn field(mut self, field: impl Into<String>, selection_set: impl Into<String>) -> Self {
        self.fields.insert(
            field.into(),
            MergedFieldConfig {
                selection_set: Some(selection_set.into()),
            },
        );
        self
    }

    pub fn args(
        mut self,
        args: impl Fn(&ExternalObject) -> Object + Send + Sync + 'static,
    ) -> Self {
        self.args = Some(Arc::new(args));
        self
    }

    /// Resolves the type in batches: the key of every object is collected and sent in one call.
    pub fn key(mut self, key: impl Fn(&ExternalObject) -> Value + Send + Sync + 'static) -> Self {
        self.key = Some(Arc::new(key));
        self
    }

    /// Builds batched arguments from the collected keys. Defaults to `{ ids: [keys] }`.
    pub fn args_from_keys(
        mut self,
        args_from_keys: impl Fn(&[Value]) -> Object + Send + Sync + 'static,
    ) -> Self {
        self.args_from_keys = Some(Arc::new(args_from_keys));
        self
    }

    pub fn resolve<F>(mut self, resolve: F) -> Self
    where
        F: Fn(
                &ExternalObject,
                &Context,
                &Arc<RequestInfo>,
                &Arc<Subschema>,
                SelectionSet,
            ) -> Resolution<DelegationResult>
            + Send
            + Sync
            + 'static,
    {
        self.resolve = Some(Arc::new(resolve));
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn MergedTypeResolver>) -> Self {
        self.resolve = Some(resolver);
        self
    }
}

impl fmt::Debug for MergedTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedTypeConfig")
            .field("selection_set", &self.selection_set)
            .field("field_name", &self.field_name)
            .field("fields", &self.fields)
            .field("args", &self.args.is_some())
            .field("key", &self.key.is_some())
            .field("resolve", &self.resolve.is_some())
            .finish()
    }
}

/// Requirements of one field of a merged type.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MergedFieldConfig {
    pub selection_set: Option<String>,
}

/// Selections a custom field resolver of the stitched schema needs on its parent object.
#[derive(Clone, Default)]
pub struct FieldResolverConfig {
    pub selection_set: Option<FieldSelectionSet>,
    /// A fragment such as `... on Product { sku }`, applied to the fragment's type.
    pub fragment: Option<String>,
}

#[derive(Clone)]
pub enum FieldSelectionSet {
    Static(String),
    Dynamic(DynamicSelectionSetFn),
}

impl fmt::Debug for FieldResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selection_set = match &self.selection_set {
            Some(FieldSelectionSet::Static(text)) => Some(text.as_str()),
            Some(FieldSelectionSet::Dynamic(_)) => Some("<dynamic>"),
            None => None,
        };
        f.debug_struct("FieldResolverConfig")
            .field("selection_set", &selection_set)
            .field("fragment", &self.fragment)
            .finish()
    }
}

/// Custom field resolvers of the stitched schema, by type name then field name.
pub type Resolvers = IndexMap<String, IndexMap<String, FieldResolverConfig>>;

/// A subschema exposing a type that may be merged.
#[derive(Clone, Debug)]
pub struct MergeTypeCandidate {
    pub subschema: Arc<Subschema>,
}

/// Which types exposed by several subschemas are selected for merging.
///
/// The policy does not add merged types. Whatever it selects, only subschemas declaring a merge
/// configuration for a type take part in merging it, and a type none of them configures stays
/// unmerged. Such a type is only reported, at trace level, when the policy selects it.
#[derive(Clone, Default)]
pub enum MergeTypes {
    /// Types for which at least one subschema declares a merge configuration.
    #[default]
    Configured,
    All,
    Only(Vec<String>),
    Filter(MergeTypeFilter),
}

impl MergeTypes {
    pub(crate) fn selects(&self, candidates: &[MergeTypeCandidate], type_name: &str) -> bool {
        match self {
            MergeTypes::Configured => false,
            MergeTypes::All => true,
            MergeTypes::Only(type_names) => type_names.iter().any(|name| name == type_name),
            MergeTypes::Filter(filter) => filter(candidates, type_name),
        }
    }
}

impl fmt::Debug for MergeTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeTypes::Configured => f.write_str("Configured"),
            MergeTypes::All => f.write_str("All"),
            MergeTypes::Only(type_names) => f.debug_tuple("Only").field(type_names).finish(),
            MergeTypes::Filter(_) => f.write_str("Filter"),
        }
    }
}

/// How [`MergeTypes`] is written in configuration files: `true`, `false` or a list of types.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub(crate) enum MergeTypesRepr {
    Bool(bool),
    List(Vec<String>),
}

impl From<MergeTypesRepr> for MergeTypes {
    fn from(repr: MergeTypesRepr) -> Self {
        match repr {
            MergeTypesRepr::Bool(true) => MergeTypes::All,
            MergeTypesRepr::Bool(false) => MergeTypes::Configured,
            MergeTypesRepr::List(type_names) => MergeTypes::Only(type_names),
        }
    }
}

impl<'de> Deserialize<'de> for MergeTypes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        MergeTypesRepr::deserialize(deserializer).map(Into::into)
    }
}
