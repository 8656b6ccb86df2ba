//! What is known about the field being resolved when a merged object is handled.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast::NamedType;
use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::ExtendedType;
use indexmap::IndexMap;

use crate::error::StitchingError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::schema::StitchedSchema;
use crate::selection::Field;
use crate::selection::Fragment;
use crate::selection::Operation;

/// The field currently resolved against the stitched schema.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub schema: Arc<StitchedSchema>,
    /// Every node selecting the field under the same response key.
    pub field_nodes: Vec<Node<Field>>,
    pub fragments: IndexMap<Name, Node<Fragment>>,
    pub variables: Object,
    /// The named type of the field, which may be abstract.
    pub return_type: NamedType,
    pub path: Path,
}

impl RequestInfo {
    /// Request info for the root query field selected under `response_key` in `operation`.
    ///
    /// Variables missing from `variables` take the default value declared by the operation.
    pub fn for_root_field(
        schema: Arc<StitchedSchema>,
        operation: &Operation,
        response_key: &str,
        mut variables: Object,
    ) -> Result<RequestInfo, StitchingError> {
        for (name, default_value) in &operation.variable_defaults {
            if !variables.contains_key(name.as_str()) {
                variables.insert(name.clone(), default_value.clone());
            }
        }
        let field = operation
            .root_field(response_key)
            .ok_or_else(|| StitchingError::InvalidOperation {
                message: format!("no root field selected as \"{response_key}\""),
            })?;
        let query_type = schema
            .schema()
            .root_operation(OperationType::Query)
            .ok_or_else(|| StitchingError::UnknownType {
                type_name: "Query".to_owned(),
            })?;
        let return_type = match schema.schema().types.get(query_type) {
            Some(ExtendedType::Object(object)) => object
                .fields
                .get(&field.name)
                .map(|definition| definition.ty.inner_named_type().clone()),
            _ => None,
        }
        .ok_or_else(|| StitchingError::InvalidOperation {
            message: format!("field \"{}\" is not defined on type \"{query_type}\"", field.name),
        })?;
        let field_nodes = operation
            .selection_set
            .fields()
            .filter(|node| node.response_key().as_str() == response_key)
            .cloned()
            .collect();
        Ok(RequestInfo {
            field_nodes,
            fragments: operation.fragments.clone(),
            variables,
            return_type,
            path: Path(vec![PathElement::Key(response_key.to_owned())]),
            schema,
        })
    }
}
