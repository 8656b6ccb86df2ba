//! Objects returned by subschemas, with their provenance and errors.

use indexmap::IndexMap;
use serde::Serialize;

use crate::delegate::DelegationResult;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::deep_merge_objects;
use crate::schema::SubschemaId;

/// A (possibly partial) object resolved by one or more subschemas.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalObject {
    pub data: Object,

    /// Errors of the requests that produced this object, relative to the object's path.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,

    /// The subschema that produced the object in the first place.
    pub subschema: Option<SubschemaId>,

    /// The subschema that supplied each response key, when it is not [`Self::subschema`].
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub field_subschemas: IndexMap<String, SubschemaId>,
}

impl ExternalObject {
    pub fn new(data: Object) -> Self {
        ExternalObject {
            data,
            ..Default::default()
        }
    }

    pub fn with_subschema(mut self, subschema: SubschemaId) -> Self {
        self.subschema = Some(subschema);
        self
    }

    /// The subschema that supplied `response_key`.
    pub fn field_subschema(&self, response_key: &str) -> Option<SubschemaId> {
        self.field_subschemas
            .get(response_key)
            .copied()
            .or(self.subschema)
    }
}

/// Folds the results of one merge pass into `target`, in order.
///
/// Data is deep merged. Each response key remembers the subschema that supplied it. A failed call
/// contributes its error and nothing else.
pub(crate) fn merge_proxied_results(
    mut target: ExternalObject,
    results: impl IntoIterator<Item = (SubschemaId, DelegationResult)>,
) -> ExternalObject {
    for (subschema, result) in results {
        match result {
            Ok(source) => {
                let origin = source.subschema.unwrap_or(subschema);
                for key in source.data.keys() {
                    let supplier = source
                        .field_subschemas
                        .get(key.as_str())
                        .copied()
                        .unwrap_or(origin);
                    target
                        .field_subschemas
                        .insert(key.as_str().to_owned(), supplier);
                }
                deep_merge_objects(&mut target.data, source.data);
                target.errors.extend(source.errors);
            }
            Err(error) => target.errors.push(error),
        }
    }
    target
}
