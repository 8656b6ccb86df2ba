use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use lru::LruCache;
use parking_lot::Mutex;

use crate::schema::SubschemaId;
use crate::selection::Field;
use crate::selection::SelectionSet;
use crate::selection::is_typename;
use crate::stitching_info::FieldOwnership;
use crate::stitching_info::MergedTypeInfo;

/// The fields each subschema is asked for in one merge pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DelegationPlan {
    /// Subschemas in the order they were first assigned a field.
    pub delegation_map: IndexMap<SubschemaId, SelectionSet>,
    /// Fields no proxiable subschema can resolve in this pass.
    pub unassigned_field_nodes: Vec<Node<Field>>,
}

impl fmt::Display for DelegationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (subschema, selection_set) in &self.delegation_map {
            writeln!(f, "{subschema}: {selection_set}")?;
        }
        write!(f, "unassigned: [")?;
        for (index, field) in self.unassigned_field_nodes.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(field.response_key())?;
        }
        f.write_str("]")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Assignment {
    Skip,
    Delegate(SubschemaId),
    Unassigned,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PlanKey {
    fields: Vec<Name>,
    proxiable: Vec<SubschemaId>,
}

/// Assignments only depend on field names, so they are shared by every field set with the same
/// names whatever their arguments or sub-selections.
pub(crate) type PlanCache = Mutex<LruCache<PlanKey, Arc<[Assignment]>>>;

/// Assigns every field of `field_nodes` to one of the `proxiable` subschemas.
///
/// A field owned by one subschema goes to that subschema if it is proxiable. A field shared by
/// several subschemas goes to one already chosen in this pass if possible, so that the pass makes
/// as few calls as it can, and otherwise to the first proxiable candidate in declaration order.
/// `__typename` is never delegated.
pub fn build_delegation_plan(
    merged_type_info: &MergedTypeInfo,
    field_nodes: &[Node<Field>],
    proxiable: &[SubschemaId],
) -> DelegationPlan {
    let key = PlanKey {
        fields: field_nodes.iter().map(|field| field.name.clone()).collect(),
        proxiable: proxiable.to_vec(),
    };
    let cached = merged_type_info.plan_cache.lock().get(&key).cloned();
    let assignments = match cached {
        Some(assignments) => assignments,
        None => {
            let assignments: Arc<[Assignment]> =
                assign_fields(merged_type_info, &key.fields, proxiable).into();
            merged_type_info
                .plan_cache
                .lock()
                .put(key, assignments.clone());
            assignments
        }
    };

    let mut fields_by_subschema: IndexMap<SubschemaId, Vec<Node<Field>>> = IndexMap::new();
    let mut unassigned_field_nodes = Vec::new();
    for (field, assignment) in field_nodes.iter().zip(assignments.iter()) {
        match assignment {
            Assignment::Skip => {}
            Assignment::Delegate(subschema) => fields_by_subschema
                .entry(*subschema)
                .or_default()
                .push(field.clone()),
            Assignment::Unassigned => unassigned_field_nodes.push(field.clone()),
        }
    }
    DelegationPlan {
        delegation_map: fields_by_subschema
            .into_iter()
            .map(|(subschema, fields)| (subschema, SelectionSet::from_fields(fields)))
            .collect(),
        unassigned_field_nodes,
    }
}

fn assign_fields(
    merged_type_info: &MergedTypeInfo,
    field_names: &[Name],
    proxiable: &[SubschemaId],
) -> Vec<Assignment> {
    let mut chosen: Vec<SubschemaId> = Vec::new();
    field_names
        .iter()
        .map(|field_name| {
            if is_typename(field_name) {
                return Assignment::Skip;
            }
            let subschema = match merged_type_info.field_ownership(field_name) {
                Some(FieldOwnership::Unique(owner)) => {
                    Some(*owner).filter(|owner| proxiable.contains(owner))
                }
                Some(FieldOwnership::Shared(candidates)) => {
                    let mut candidates = candidates
                        .iter()
                        .copied()
                        .filter(|candidate| proxiable.contains(candidate))
                        .peekable();
                    let first = candidates.peek().copied();
                    candidates
                        .find(|candidate| chosen.contains(candidate))
                        .or(first)
                }
                None => None,
            };
            match subschema {
                Some(subschema) => {
                    if !chosen.contains(&subschema) {
                        chosen.push(subschema);
                    }
                    Assignment::Delegate(subschema)
                }
                None => Assignment::Unassigned,
            }
        })
        .collect()
}
