//! Structural containment of selection sets by schema types.
//!
//! A type contains a selection set when every selected field exists on the type and, for fields
//! with sub-selections, the field's type recursively contains the sub-selection. Inline fragments
//! are followed when their type condition is the type itself, one of its supertypes, or one of its
//! possible types.

use apollo_compiler::Schema;
use apollo_compiler::ast::NamedType;
use apollo_compiler::schema::ExtendedType;

use crate::selection::Selection;
use crate::selection::SelectionSet;
use crate::selection::is_typename;

/// A type as exposed by one service's schema.
pub type ExposedType<'a> = (&'a Schema, &'a NamedType);

/// Whether `type_name` in `schema` structurally provides every field of `selection_set`.
pub fn type_contains_selection_set(
    schema: &Schema,
    type_name: &NamedType,
    selection_set: &SelectionSet,
) -> bool {
    types_contain_selection_set(&[(schema, type_name)], selection_set)
}

/// Whether the given types, taken together, provide every field of `selection_set`.
///
/// Each field only needs to exist on one of the types; sub-selections are then checked against the
/// field's type in every schema that defines the field.
pub fn types_contain_selection_set(
    types: &[ExposedType<'_>],
    selection_set: &SelectionSet,
) -> bool {
    selection_set
        .selections
        .iter()
        .all(|selection| types_contain_selection(types, selection))
}

fn types_contain_selection(types: &[ExposedType<'_>], selection: &Selection) -> bool {
    match selection {
        Selection::Field(field) => {
            if is_typename(&field.name) {
                return true;
            }
            let field_types: Vec<ExposedType<'_>> = types
                .iter()
                .filter_map(|&(schema, type_name)| {
                    field_type(schema, type_name, field.name.as_str()).map(|ty| (schema, ty))
                })
                .collect();
            if field_types.is_empty() {
                return false;
            }
            field.selection_set.is_empty()
                || types_contain_selection_set(&field_types, &field.selection_set)
        }
        Selection::InlineFragment(fragment) => {
            let Some(condition) = &fragment.type_condition else {
                return types_contain_selection_set(types, &fragment.selection_set);
            };
            let mut known_condition = false;
            let applicable: Vec<ExposedType<'_>> = types
                .iter()
                .filter_map(|&(schema, type_name)| {
                    let (condition_name, _) = schema.types.get_key_value(condition)?;
                    known_condition = true;
                    if fragment_condition_applies(schema, condition, type_name) {
                        Some((schema, type_name))
                    } else if is_subtype(schema, type_name, condition) {
                        Some((schema, condition_name))
                    } else {
                        None
                    }
                })
                .collect();
            if !known_condition {
                return false;
            }
            applicable.is_empty()
                || types_contain_selection_set(&applicable, &fragment.selection_set)
        }
        // Required selections cannot reference named fragments.
        Selection::FragmentSpread(_) => false,
    }
}

/// The named type of `field_name` on the object or interface type `type_name`.
pub(crate) fn field_type<'a>(
    schema: &'a Schema,
    type_name: &NamedType,
    field_name: &str,
) -> Option<&'a NamedType> {
    match schema.types.get(type_name)? {
        ExtendedType::Object(object) => object
            .fields
            .get(field_name)
            .map(|field| field.ty.inner_named_type()),
        ExtendedType::Interface(interface) => interface
            .fields
            .get(field_name)
            .map(|field| field.ty.inner_named_type()),
        _ => None,
    }
}

/// Whether a fragment with type condition `condition` applies to values of type `type_name`.
pub(crate) fn fragment_condition_applies(
    schema: &Schema,
    condition: &NamedType,
    type_name: &NamedType,
) -> bool {
    condition == type_name || is_subtype(schema, condition, type_name)
}

/// Whether `maybe_subtype` implements the interface, or is a member of the union, `abstract_type`.
pub(crate) fn is_subtype(
    schema: &Schema,
    abstract_type: &NamedType,
    maybe_subtype: &NamedType,
) -> bool {
    match schema.types.get(abstract_type) {
        Some(ExtendedType::Union(union_)) => union_
            .members
            .iter()
            .any(|member| member.name == *maybe_subtype),
        Some(ExtendedType::Interface(_)) => match schema.types.get(maybe_subtype) {
            Some(ExtendedType::Object(object)) => object
                .implements_interfaces
                .iter()
                .any(|interface| interface.name == *abstract_type),
            Some(ExtendedType::Interface(interface)) => interface
                .implements_interfaces
                .iter()
                .any(|parent| parent.name == *abstract_type),
            _ => false,
        },
        _ => false,
    }
}
