use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::contains::ExposedType;
use crate::contains::types_contain_selection_set;
use crate::schema::SubschemaId;
use crate::selection::Field;
use crate::selection::SelectionSet;
use crate::stitching_info::MergedTypeInfo;
use crate::utils::logging::merge_snapshot;

/// Delegation targets, split by whether what they need is already known.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Proxiability {
    /// Targets that can be delegated to in this pass, in candidate order.
    pub proxiable: Vec<SubschemaId>,
    /// Targets to reconsider once more data is known.
    pub non_proxiable: Vec<SubschemaId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ProxiabilityKey {
    known: Vec<SubschemaId>,
    targets: Vec<SubschemaId>,
    fields: Vec<Name>,
}

pub(crate) type ProxiabilityCache = Mutex<LruCache<ProxiabilityKey, Arc<Proxiability>>>;

/// Splits `targets` into the subschemas that can resolve `field_nodes` given the data the `known`
/// subschemas already supplied, and the ones that cannot yet.
///
/// A target is proxiable when its required selection is contained by the type as exposed by the
/// known subschemas, and so is the requirement of every requested field it declares one for.
pub fn sort_subschemas_by_proxiability(
    merged_type_info: &MergedTypeInfo,
    known: &[SubschemaId],
    targets: &[SubschemaId],
    field_nodes: &[Node<Field>],
) -> Arc<Proxiability> {
    let mut sorted_known = known.to_vec();
    sorted_known.sort();
    sorted_known.dedup();
    // Only the set of field names matters here, not aliases or repetitions.
    let mut fields: Vec<Name> = field_nodes.iter().map(|field| field.name.clone()).collect();
    fields.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    fields.dedup();
    let key = ProxiabilityKey {
        known: sorted_known,
        targets: targets.to_vec(),
        fields,
    };
    let cached = merged_type_info.proxiability_cache.lock().get(&key).cloned();
    if let Some(cached) = cached {
        return cached;
    }

    let exposed_types = merged_type_info.exposed_types(&key.known);
    let known_contain = |selection_set: &SelectionSet| {
        types_contain_selection_set(&exposed_types, selection_set)
    };

    let mut proxiability = Proxiability::default();
    for &target in targets {
        let contained = match merged_type_info.selection_set(target) {
            None => true,
            Some(selection_set) => {
                key.known
                    .iter()
                    .any(|&source| merged_type_info.contains_selection_set(source, target))
                    || known_contain(selection_set)
            }
        };
        let proxiable = contained
            && merged_type_info
                .field_selection_sets(target)
                .is_none_or(|field_selection_sets| {
                    field_nodes.iter().all(|field| {
                        field_selection_sets
                            .get(&field.name)
                            .is_none_or(|selection_set| known_contain(selection_set))
                    })
                });
        if proxiable {
            proxiability.proxiable.push(target);
        } else {
            proxiability.non_proxiable.push(target);
        }
    }
    merge_snapshot!(
        merged_type_info.type_name(),
        proxiability,
        "sorted subschemas by proxiability"
    );

    let proxiability = Arc::new(proxiability);
    merged_type_info
        .proxiability_cache
        .lock()
        .put(key, proxiability.clone());
    proxiability
}

impl MergedTypeInfo {
    /// The merged type as exposed by each of `subschemas` that defines it.
    fn exposed_types(&self, subschemas: &[SubschemaId]) -> Vec<ExposedType<'_>> {
        subschemas
            .iter()
            .filter_map(|id| self.subschema(*id))
            .filter(|subschema| subschema.schema().types.contains_key(self.type_name()))
            .map(|subschema| (&**subschema.schema(), self.type_name()))
            .collect()
    }
}
