//! Merge metadata, built once when the stitched schema is composed.
//!
//! [`StitchingInfo`] holds one [`MergedTypeInfo`] per merged type, along with the supplemental
//! selections to request whenever a field is resolved. Nothing in here changes after composition
//! except the memoization caches of the merge passes.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::NamedType;
use apollo_compiler::ast::OperationType;
use apollo_compiler::name;
use apollo_compiler::schema::ExtendedType;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::contains::type_contains_selection_set;
use crate::delegate::BatchDelegateResolver;
use crate::delegate::DelegateResolver;
use crate::delegate::Delegator;
use crate::delegate::default_args_from_keys;
use crate::error::StitchingError;
use crate::merge::PlanCache;
use crate::merge::ProxiabilityCache;
use crate::merge::memo_cache;
use crate::merge_config::DynamicSelectionSetFn;
use crate::merge_config::FieldSelectionSet;
use crate::merge_config::MergeTypeCandidate;
use crate::merge_config::MergeTypes;
use crate::merge_config::MergedTypeConfig;
use crate::merge_config::MergedTypeResolver;
use crate::merge_config::Resolvers;
use crate::schema::Subschema;
use crate::schema::SubschemaConfig;
use crate::schema::SubschemaId;
use crate::selection::Field;
use crate::selection::InlineFragment;
use crate::selection::Selection;
use crate::selection::SelectionSet;
use crate::selection::concat_inline_fragments;
use crate::selection::parse_fragment_to_inline_fragment;
use crate::selection::parse_selection_set;

/// Which subschemas expose a field of a merged type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldOwnership {
    /// Exposed by a single subschema.
    Unique(SubschemaId),
    /// Exposed by several subschemas, in declaration order.
    Shared(Vec<SubschemaId>),
}

/// Merge metadata of one type.
pub struct MergedTypeInfo {
    type_name: NamedType,
    subschemas: IndexMap<SubschemaId, Arc<Subschema>>,
    target_subschemas: IndexMap<SubschemaId, Vec<SubschemaId>>,
    selection_sets: IndexMap<SubschemaId, SelectionSet>,
    field_selection_sets: IndexMap<SubschemaId, IndexMap<Name, SelectionSet>>,
    /// For each subschema, whether its type contains the required selection of each other
    /// subschema that declares one.
    contains_selection_set: IndexMap<SubschemaId, IndexMap<SubschemaId, bool>>,
    fields: IndexMap<Name, FieldOwnership>,
    resolvers: IndexMap<SubschemaId, Arc<dyn MergedTypeResolver>>,
    pub(crate) proxiability_cache: ProxiabilityCache,
    pub(crate) plan_cache: PlanCache,
}

impl MergedTypeInfo {
    fn new(
        type_name: NamedType,
        candidates: Vec<Arc<Subschema>>,
        delegator: &Arc<dyn Delegator>,
    ) -> Result<Self, StitchingError> {
        let mut subschemas = IndexMap::new();
        let mut selection_sets = IndexMap::new();
        let mut field_selection_sets = IndexMap::new();
        let mut resolvers = IndexMap::new();
        let mut supporting_subschemas: IndexMap<Name, Vec<SubschemaId>> = IndexMap::new();

        for subschema in candidates {
            let id = subschema.id();
            let Some(config) = subschema.merged_type_config(&type_name) else {
                continue;
            };
            if let Some(ExtendedType::Object(object)) = subschema.schema().types.get(&type_name) {
                for field_name in object.fields.keys() {
                    supporting_subschemas
                        .entry(field_name.clone())
                        .or_default()
                        .push(id);
                }
            }
            if let Some(text) = &config.selection_set {
                selection_sets.insert(id, parse_selection_set(text)?);
            }
            let requirements = config
                .fields
                .iter()
                .filter_map(|(field_name, field_config)| {
                    let text = field_config.selection_set.as_ref()?;
                    Some((field_name, text))
                })
                .map(|(field_name, text)| {
                    let field_name = Name::new(field_name).map_err(|_| {
                        malformed(
                            &subschema,
                            &type_name,
                            format!("invalid field name \"{field_name}\""),
                        )
                    })?;
                    Ok((field_name, parse_selection_set(text)?))
                })
                .collect::<Result<IndexMap<_, _>, StitchingError>>()?;
            if !requirements.is_empty() {
                field_selection_sets.insert(id, requirements);
            }
            resolvers.insert(id, resolver(&subschema, &type_name, config, delegator)?);
            subschemas.insert(id, subschema);
        }

        let ids: Vec<SubschemaId> = subschemas.keys().copied().collect();
        let target_subschemas = ids
            .iter()
            .filter_map(|&id| {
                let others = ids.iter().copied().filter(|&other| other != id).collect_vec();
                (!others.is_empty()).then_some((id, others))
            })
            .collect();

        let contains_selection_set = subschemas
            .iter()
            .map(|(&id, subschema)| {
                let schema: &Schema = subschema.schema();
                let contained = selection_sets
                    .iter()
                    .filter(|&(&other, _)| other != id)
                    .map(|(&other, selection_set)| {
                        (
                            other,
                            type_contains_selection_set(schema, &type_name, selection_set),
                        )
                    })
                    .collect();
                (id, contained)
            })
            .collect();

        let fields = supporting_subschemas
            .into_iter()
            .map(|(field_name, mut supporting)| {
                let ownership = if supporting.len() == 1 {
                    FieldOwnership::Unique(supporting.remove(0))
                } else {
                    FieldOwnership::Shared(supporting)
                };
                (field_name, ownership)
            })
            .collect();

        Ok(MergedTypeInfo {
            type_name,
            subschemas,
            target_subschemas,
            selection_sets,
            field_selection_sets,
            contains_selection_set,
            fields,
            resolvers,
            proxiability_cache: memo_cache(),
            plan_cache: memo_cache(),
        })
    }

    pub fn type_name(&self) -> &NamedType {
        &self.type_name
    }

    /// The subschemas contributing to the type, in declaration order.
    pub fn subschemas(&self) -> impl Iterator<Item = &Arc<Subschema>> {
        self.subschemas.values()
    }

    pub fn subschema(&self, id: SubschemaId) -> Option<&Arc<Subschema>> {
        self.subschemas.get(&id)
    }

    /// The other subschemas `source` may delegate to. `None` if it is the only contributor.
    pub fn target_subschemas(&self, source: SubschemaId) -> Option<&[SubschemaId]> {
        self.target_subschemas.get(&source).map(Vec::as_slice)
    }

    /// The selection `subschema` needs to know before it can be delegated to.
    pub fn selection_set(&self, subschema: SubschemaId) -> Option<&SelectionSet> {
        self.selection_sets.get(&subschema)
    }

    /// The per-field requirements declared by `subschema`.
    pub fn field_selection_sets(
        &self,
        subschema: SubschemaId,
    ) -> Option<&IndexMap<Name, SelectionSet>> {
        self.field_selection_sets.get(&subschema)
    }

    /// Whether the type as exposed by `source` contains the required selection of `target`.
    pub fn contains_selection_set(&self, source: SubschemaId, target: SubschemaId) -> bool {
        self.contains_selection_set
            .get(&source)
            .and_then(|contained| contained.get(&target))
            .copied()
            .unwrap_or(false)
    }

    pub fn field_ownership(&self, field_name: &str) -> Option<&FieldOwnership> {
        self.fields.get(field_name)
    }

    /// Fields exposed by exactly one subschema.
    pub fn unique_fields(&self) -> impl Iterator<Item = (&Name, SubschemaId)> {
        self.fields.iter().filter_map(|(name, ownership)| match ownership {
            FieldOwnership::Unique(owner) => Some((name, *owner)),
            FieldOwnership::Shared(_) => None,
        })
    }

    /// Fields exposed by several subschemas, with their candidates in declaration order.
    pub fn non_unique_fields(&self) -> impl Iterator<Item = (&Name, &[SubschemaId])> {
        self.fields.iter().filter_map(|(name, ownership)| match ownership {
            FieldOwnership::Unique(_) => None,
            FieldOwnership::Shared(candidates) => Some((name, candidates.as_slice())),
        })
    }

    pub fn resolver(&self, subschema: SubschemaId) -> Option<&Arc<dyn MergedTypeResolver>> {
        self.resolvers.get(&subschema)
    }
}

impl fmt::Debug for MergedTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedTypeInfo")
            .field("type_name", &self.type_name)
            .field(
                "subschemas",
                &self.subschemas.values().map(|s| s.name()).collect_vec(),
            )
            .field("target_subschemas", &self.target_subschemas)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

fn malformed(subschema: &Subschema, type_name: &str, reason: String) -> StitchingError {
    StitchingError::MalformedMergeConfig {
        subschema: subschema.name().to_owned(),
        type_name: type_name.to_owned(),
        reason,
    }
}

/// The configured resolver, or one delegating to the configured root field.
fn resolver(
    subschema: &Subschema,
    type_name: &str,
    config: &MergedTypeConfig,
    delegator: &Arc<dyn Delegator>,
) -> Result<Arc<dyn MergedTypeResolver>, StitchingError> {
    if let Some(resolve) = &config.resolve {
        return Ok(resolve.clone());
    }
    let missing = || {
        malformed(
            subschema,
            type_name,
            "either `resolve` or `fieldName` with `args` or `key` is required".to_owned(),
        )
    };
    let field_name = config.field_name.clone().ok_or_else(missing)?;
    if let Some(key) = &config.key {
        return Ok(Arc::new(BatchDelegateResolver {
            field_name,
            key: key.clone(),
            args_from_keys: config
                .args_from_keys
                .clone()
                .unwrap_or_else(|| Arc::new(default_args_from_keys)),
            delegator: delegator.clone(),
        }));
    }
    let args = config.args.clone().ok_or_else(missing)?;
    Ok(Arc::new(DelegateResolver {
        field_name,
        args,
        delegator: delegator.clone(),
    }))
}

/// Stitching metadata attached to the stitched schema.
pub struct StitchingInfo {
    subschemas: Vec<Arc<Subschema>>,
    merged_types: IndexMap<NamedType, Arc<MergedTypeInfo>>,
    selection_sets_by_field: IndexMap<String, IndexMap<String, SelectionSet>>,
    dynamic_selection_sets_by_field: IndexMap<String, IndexMap<String, Vec<DynamicSelectionSetFn>>>,
    fragments_by_field: IndexMap<String, IndexMap<String, InlineFragment>>,
}

impl StitchingInfo {
    /// Builds the merge metadata of every object type exposed by the subschemas.
    ///
    /// A type is merged when at least one subschema declares a merge configuration for it.
    /// `merge_types` can select more types, but only subschemas with a merge configuration take
    /// part in merging them. Root operation types and built-in types are never merged.
    pub fn new(
        subschemas: Vec<SubschemaConfig>,
        merge_types: &MergeTypes,
        delegator: Arc<dyn Delegator>,
    ) -> Result<Self, StitchingError> {
        let subschemas: Vec<Arc<Subschema>> = subschemas
            .into_iter()
            .enumerate()
            .map(|(index, config)| Arc::new(Subschema::new(SubschemaId::new(index), config)))
            .collect();

        let mut type_candidates: IndexMap<NamedType, Vec<MergeTypeCandidate>> = IndexMap::new();
        for subschema in &subschemas {
            let schema = subschema.schema();
            for (type_name, ty) in &schema.types {
                if ty.is_built_in() || !ty.is_object() || is_root_type(schema, type_name) {
                    continue;
                }
                type_candidates
                    .entry(type_name.clone())
                    .or_default()
                    .push(MergeTypeCandidate {
                        subschema: subschema.clone(),
                    });
            }
        }

        let mut merged_types = IndexMap::new();
        for (type_name, candidates) in type_candidates {
            let configured = candidates
                .iter()
                .filter(|candidate| candidate.subschema.merged_type_config(&type_name).is_some())
                .map(|candidate| candidate.subschema.clone())
                .collect_vec();
            if configured.is_empty() {
                if merge_types.selects(&candidates, &type_name) {
                    tracing::trace!(
                        "graphql.type" = %type_name,
                        "type selected for merging but no subschema declares how to merge it"
                    );
                }
                continue;
            }
            let merged_type_info = MergedTypeInfo::new(type_name.clone(), configured, &delegator)?;
            merged_types.insert(type_name, Arc::new(merged_type_info));
        }

        let selection_sets_by_field = selection_sets_by_field(&merged_types);
        tracing::debug!(
            merged_types = merged_types.len(),
            subschemas = subschemas.len(),
            "built stitching info"
        );
        Ok(StitchingInfo {
            subschemas,
            merged_types,
            selection_sets_by_field,
            dynamic_selection_sets_by_field: IndexMap::new(),
            fragments_by_field: IndexMap::new(),
        })
    }

    /// Adds the selections needed by the custom field resolvers of the stitched schema.
    ///
    /// Static selection sets are appended to the supplemental selection of their field, dynamic
    /// ones are kept to be evaluated against each field node, and fragments are grouped by their
    /// type condition.
    pub fn complete(mut self, resolvers: &Resolvers) -> Result<Self, StitchingError> {
        let mut parsed_fragments: IndexMap<String, IndexMap<String, Vec<InlineFragment>>> =
            IndexMap::new();
        for (type_name, fields) in resolvers {
            for (field_name, field) in fields {
                match &field.selection_set {
                    Some(FieldSelectionSet::Dynamic(selection_set)) => {
                        self.dynamic_selection_sets_by_field
                            .entry(type_name.clone())
                            .or_default()
                            .entry(field_name.clone())
                            .or_default()
                            .push(selection_set.clone());
                    }
                    Some(FieldSelectionSet::Static(text)) => {
                        let selection_set = parse_selection_set(text)?;
                        let existing = self
                            .selection_sets_by_field
                            .entry(type_name.clone())
                            .or_default()
                            .entry(field_name.clone())
                            .or_default();
                        *existing = existing.concat(&selection_set);
                    }
                    None => {}
                }
                if let Some(text) = &field.fragment {
                    let fragment = parse_fragment_to_inline_fragment(text)?;
                    let Some(actual_type_name) = fragment.type_condition.clone() else {
                        continue;
                    };
                    parsed_fragments
                        .entry(actual_type_name.to_string())
                        .or_default()
                        .entry(field_name.clone())
                        .or_default()
                        .push(fragment);
                }
            }
        }

        for (type_name, fields) in parsed_fragments {
            let type_condition = Name::new(&type_name).map_err(|_| StitchingError::UnknownType {
                type_name: type_name.clone(),
            })?;
            let by_field = self.fragments_by_field.entry(type_name).or_default();
            for (field_name, fragments) in fields {
                by_field.insert(
                    field_name,
                    concat_inline_fragments(Some(type_condition.clone()), &fragments),
                );
            }
        }
        Ok(self)
    }

    pub fn subschemas(&self) -> &[Arc<Subschema>] {
        &self.subschemas
    }

    pub fn subschema(&self, id: SubschemaId) -> Option<&Arc<Subschema>> {
        self.subschemas.get(id.index())
    }

    pub fn merged_type(&self, type_name: &str) -> Option<&Arc<MergedTypeInfo>> {
        self.merged_types.get(type_name)
    }

    pub fn merged_types(&self) -> impl Iterator<Item = &Arc<MergedTypeInfo>> {
        self.merged_types.values()
    }

    pub fn selection_set_by_field(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&SelectionSet> {
        self.selection_sets_by_field.get(type_name)?.get(field_name)
    }

    pub fn fragment_by_field(&self, type_name: &str, field_name: &str) -> Option<&InlineFragment> {
        self.fragments_by_field.get(type_name)?.get(field_name)
    }

    /// Every selection to request along with `field` on `type_name`: static requirements, the
    /// fragment of its custom resolver and dynamic requirements evaluated against `field`.
    pub fn supplemental_selection_set(&self, type_name: &str, field: &Field) -> SelectionSet {
        let field_name = field.name.as_str();
        let mut selections = Vec::new();
        if let Some(selection_set) = self.selection_set_by_field(type_name, field_name) {
            selections.extend(selection_set.selections.iter().cloned());
        }
        if let Some(fragment) = self.fragment_by_field(type_name, field_name) {
            selections.push(Selection::InlineFragment(Node::new(fragment.clone())));
        }
        if let Some(dynamic) = self
            .dynamic_selection_sets_by_field
            .get(type_name)
            .and_then(|fields| fields.get(field_name))
        {
            for selection_set in dynamic {
                selections.extend(selection_set(field).selections);
            }
        }
        SelectionSet { selections }
    }
}

impl fmt::Debug for StitchingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitchingInfo")
            .field("subschemas", &self.subschemas)
            .field("merged_types", &self.merged_types)
            .field("selection_sets_by_field", &self.selection_sets_by_field)
            .field("fragments_by_field", &self.fragments_by_field)
            .finish_non_exhaustive()
    }
}

fn is_root_type(schema: &Schema, type_name: &NamedType) -> bool {
    [
        OperationType::Query,
        OperationType::Mutation,
        OperationType::Subscription,
    ]
    .into_iter()
    .any(|operation_type| schema.root_operation(operation_type) == Some(type_name))
}

/// For each field of each merged type: `__typename` and the required selections of every
/// subschema exposing the field.
fn selection_sets_by_field(
    merged_types: &IndexMap<NamedType, Arc<MergedTypeInfo>>,
) -> IndexMap<String, IndexMap<String, SelectionSet>> {
    let typename = SelectionSet::from_fields([Node::new(Field::new(name!("__typename")))]);
    let mut by_type = IndexMap::new();
    for (type_name, merged_type_info) in merged_types {
        let mut by_field: IndexMap<String, SelectionSet> = IndexMap::new();
        for (id, selection_set) in &merged_type_info.selection_sets {
            let Some(subschema) = merged_type_info.subschema(*id) else {
                continue;
            };
            let Some(ExtendedType::Object(object)) = subschema.schema().types.get(type_name) else {
                continue;
            };
            for field_name in object.fields.keys() {
                let existing = by_field
                    .entry(field_name.to_string())
                    .or_insert_with(|| typename.clone());
                *existing = existing.concat(selection_set);
            }
        }
        // A field requirement is fetched along with its field, whoever resolves it.
        for (field_name, selection_set) in merged_type_info.field_selection_sets.values().flatten()
        {
            let existing = by_field
                .entry(field_name.to_string())
                .or_insert_with(|| typename.clone());
            *existing = existing.concat(selection_set);
        }
        if !by_field.is_empty() {
            by_type.insert(
                type_name.to_string(),
                by_field
                    .into_iter()
                    .map(|(field_name, selection_set)| (field_name, selection_set.deduplicated()))
                    .collect(),
            );
        }
    }
    by_type
}
