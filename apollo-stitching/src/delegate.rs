//! The boundary with the engine that sends selection sets to subschemas.
//!
//! Type merging never executes requests itself: every follow-up request goes through a
//! [`Delegator`], which is also responsible for batching, deduplication, timeouts and retries.

use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use apollo_compiler::ast::NamedType;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::context::Context;
use crate::external::ExternalObject;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::merge_config::ArgsFn;
use crate::merge_config::ArgsFromKeysFn;
use crate::merge_config::KeyFn;
use crate::merge_config::MergedTypeResolver;
use crate::request::RequestInfo;
use crate::resolution::Resolution;
use crate::schema::Subschema;
use crate::selection::SelectionSet;

/// The outcome of one delegated call: the partial object, carrying its own errors, or the
/// failure of the whole call.
pub type DelegationResult = Result<ExternalObject, Error>;

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        })
    }
}

impl From<OperationKind> for apollo_compiler::ast::OperationType {
    fn from(value: OperationKind) -> Self {
        match value {
            OperationKind::Query => apollo_compiler::ast::OperationType::Query,
            OperationKind::Mutation => apollo_compiler::ast::OperationType::Mutation,
            OperationKind::Subscription => apollo_compiler::ast::OperationType::Subscription,
        }
    }
}

/// A root field to call on a subschema, with the selection set to fetch under it.
#[derive(Clone, Debug)]
pub struct DelegationRequest {
    pub subschema: Arc<Subschema>,
    pub operation: OperationKind,
    pub field_name: String,
    pub return_type: NamedType,
    pub arguments: Object,
    pub selection_set: SelectionSet,
    pub context: Context,
    pub info: Arc<RequestInfo>,
    /// Set on follow-up requests made by type merging, so that their results are not merged again.
    pub skip_type_merging: bool,
}

/// One object's share of a batched call.
///
/// The delegator collects the keys of every object asking for the same root field and selection
/// set, sends one request with the arguments built by `args_from_keys`, and hands each object the
/// result matching its key.
#[derive(Clone)]
pub struct BatchDelegationRequest {
    pub key: Value,
    pub args_from_keys: ArgsFromKeysFn,
    /// `arguments` is left empty: it depends on the whole batch.
    pub request: DelegationRequest,
}

impl fmt::Debug for BatchDelegationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchDelegationRequest")
            .field("key", &self.key)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Sends delegated requests to subschemas.
pub trait Delegator: Send + Sync {
    fn delegate(&self, request: DelegationRequest) -> Resolution<DelegationResult>;

    fn delegate_batch(&self, request: BatchDelegationRequest) -> Resolution<DelegationResult>;
}

/// Arguments of a batched call when the merge configuration does not say otherwise.
pub(crate) fn default_args_from_keys(keys: &[Value]) -> Object {
    let mut arguments = Object::new();
    arguments.insert(ByteString::from("ids"), Value::Array(keys.to_vec()));
    arguments
}

/// Resolves a merged type by calling `field_name` with arguments built from the object.
pub(crate) struct DelegateResolver {
    pub(crate) field_name: String,
    pub(crate) args: ArgsFn,
    pub(crate) delegator: Arc<dyn Delegator>,
}

impl MergedTypeResolver for DelegateResolver {
    fn resolve(
        &self,
        object: &ExternalObject,
        context: &Context,
        info: &Arc<RequestInfo>,
        subschema: &Arc<Subschema>,
        selection_set: SelectionSet,
    ) -> Resolution<DelegationResult> {
        self.delegator.delegate(DelegationRequest {
            subschema: subschema.clone(),
            operation: OperationKind::Query,
            field_name: self.field_name.clone(),
            return_type: info.return_type.clone(),
            arguments: (self.args)(object),
            selection_set,
            context: context.clone(),
            info: info.clone(),
            skip_type_merging: true,
        })
    }
}

/// Resolves a merged type through a batched call to `field_name`, keyed by the object's key.
pub(crate) struct BatchDelegateResolver {
    pub(crate) field_name: String,
    pub(crate) key: KeyFn,
    pub(crate) args_from_keys: ArgsFromKeysFn,
    pub(crate) delegator: Arc<dyn Delegator>,
}

impl MergedTypeResolver for BatchDelegateResolver {
    fn resolve(
        &self,
        object: &ExternalObject,
        context: &Context,
        info: &Arc<RequestInfo>,
        subschema: &Arc<Subschema>,
        selection_set: SelectionSet,
    ) -> Resolution<DelegationResult> {
        self.delegator.delegate_batch(BatchDelegationRequest {
            key: (self.key)(object),
            args_from_keys: self.args_from_keys.clone(),
            request: DelegationRequest {
                subschema: subschema.clone(),
                operation: OperationKind::Query,
                field_name: self.field_name.clone(),
                return_type: info.return_type.clone(),
                arguments: Object::new(),
                selection_set,
                context: context.clone(),
                info: info.clone(),
                skip_type_merging: true,
            },
        })
    }
}
