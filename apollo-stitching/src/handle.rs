//! Entry point of type merging for an object freshly returned by a subschema.

use std::collections::HashSet;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast::NamedType;
use apollo_compiler::schema::ExtendedType;
use indexmap::IndexMap;

use crate::context::Context;
use crate::external::ExternalObject;
use crate::graphql::Error;
use crate::json_ext::Value;
use crate::merge::merge_fields;
use crate::request::RequestInfo;
use crate::resolution::Resolution;
use crate::schema::SubschemaId;
use crate::selection::Field;
use crate::selection::FieldCollector;
use crate::stitching_info::MergedTypeInfo;
use crate::stitching_info::StitchingInfo;

/// Records `errors` and the provenance of `object`, then merges in the requested fields that
/// `subschema` does not expose.
///
/// `type_name` is the return type of the field being resolved. For interfaces and unions, the
/// concrete type is read from the object's `__typename`. Merging is skipped when
/// `skip_type_merging` is set, when the stitched schema carries no stitching info, or when no
/// other subschema contributes to the type.
pub fn handle_object(
    type_name: &NamedType,
    mut object: ExternalObject,
    errors: &[Error],
    subschema: SubschemaId,
    context: &Context,
    info: &Arc<RequestInfo>,
    skip_type_merging: bool,
) -> Resolution<ExternalObject> {
    object.errors.extend(errors.iter().map(Error::sliced));
    object.subschema = Some(subschema);

    let Some(stitching_info) = info.schema.extensions.stitching_info.clone() else {
        return Resolution::Ready(object);
    };
    if skip_type_merging {
        return Resolution::Ready(object);
    }

    let concrete_type = if info.schema.is_abstract_type(type_name) {
        let typename = match object.data.get("__typename") {
            Some(Value::String(typename)) => info.schema.type_name(typename.as_str()),
            _ => None,
        };
        match typename {
            Some(typename) => typename.clone(),
            None => {
                tracing::debug!(
                    "graphql.type" = %type_name,
                    "cannot merge an object of an abstract type without a known __typename"
                );
                return Resolution::Ready(object);
            }
        }
    } else {
        type_name.clone()
    };

    let Some(merged_type_info) = stitching_info.merged_type(&concrete_type) else {
        return Resolution::Ready(object);
    };
    let Some(targets) = merged_type_info.target_subschemas(subschema) else {
        return Resolution::Ready(object);
    };
    let field_nodes =
        get_fields_not_in_subschema(info, &stitching_info, merged_type_info, subschema);

    merge_fields(
        merged_type_info.clone(),
        object,
        field_nodes,
        vec![subschema],
        targets.to_vec(),
        context,
        info,
    )
}

/// The requested fields of the merged type, with their supplemental selections, that `subschema`
/// does not expose.
pub fn get_fields_not_in_subschema(
    info: &RequestInfo,
    stitching_info: &StitchingInfo,
    merged_type_info: &MergedTypeInfo,
    subschema: SubschemaId,
) -> Vec<Node<Field>> {
    let type_name = merged_type_info.type_name();
    let sub_fields = collect_sub_fields(info, stitching_info, type_name);
    let exposed = merged_type_info
        .subschema(subschema)
        .and_then(|subschema| match subschema.schema().types.get(type_name) {
            Some(ExtendedType::Object(object)) => Some(&object.fields),
            _ => None,
        });
    sub_fields
        .into_values()
        .filter(|fields| {
            fields.first().is_some_and(|field| {
                !exposed.is_some_and(|exposed| exposed.contains_key(&field.name))
            })
        })
        .flat_map(|fields| {
            let mut distinct: Vec<Node<Field>> = Vec::with_capacity(fields.len());
            for field in fields {
                if !distinct.contains(&field) {
                    distinct.push(field);
                }
            }
            distinct
        })
        .collect()
}

/// Collects the sub-fields selected under the current field nodes for `type_name`, along with the
/// supplemental selections of each of them, grouped by response key.
pub(crate) fn collect_sub_fields(
    info: &RequestInfo,
    stitching_info: &StitchingInfo,
    type_name: &NamedType,
) -> IndexMap<Name, Vec<Node<Field>>> {
    let mut collector = FieldCollector {
        schema: info.schema.schema(),
        fragments: &info.fragments,
        variables: &info.variables,
        visited_fragments: HashSet::new(),
    };
    let mut sub_fields = IndexMap::new();
    for field_node in &info.field_nodes {
        collector.collect(type_name, &field_node.selection_set, &mut sub_fields);
    }

    let requested: Vec<Node<Field>> = sub_fields
        .values()
        .filter_map(|fields| fields.first().cloned())
        .collect();
    for field in requested {
        let supplemental = stitching_info.supplemental_selection_set(type_name, &field);
        if !supplemental.is_empty() {
            collector.collect(type_name, &supplemental, &mut sub_fields);
        }
    }
    sub_fields
}
