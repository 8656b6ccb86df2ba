use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use apollo_stitching::Context;
use apollo_stitching::Delegator;
use apollo_stitching::ExternalObject;
use apollo_stitching::MergeTypes;
use apollo_stitching::RequestInfo;
use apollo_stitching::Resolution;
use apollo_stitching::StitchedSchema;
use apollo_stitching::StitchingError;
use apollo_stitching::StitchingInfo;
use apollo_stitching::SubschemaConfig;
use apollo_stitching::add_stitching_info;
use apollo_stitching::delegate::BatchDelegationRequest;
use apollo_stitching::delegate::DelegationRequest;
use apollo_stitching::delegate::DelegationResult;
use apollo_stitching::graphql::Error;
use apollo_stitching::handle_object;
use apollo_stitching::json_ext::Object;
use apollo_stitching::json_ext::Path;
use apollo_stitching::json_ext::Value;
use apollo_stitching::merge_config::Resolvers;
use apollo_stitching::schema::SubschemaId;
use apollo_stitching::selection::Operation;
use apollo_stitching::selection::Selection;
use apollo_stitching::selection::SelectionSet;
use parking_lot::Mutex;

/// A delegated call, as seen by a subschema.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Call {
    pub(crate) subschema: String,
    pub(crate) field_name: String,
    pub(crate) arguments: Value,
    pub(crate) selection_set: String,
    pub(crate) batch_key: Option<Value>,
    pub(crate) skip_type_merging: bool,
}

/// Serves every subschema from in-memory records.
///
/// A plain call returns the record whose fields match every argument. A batched call returns the
/// record whose key field equals the key.
#[derive(Default)]
pub(crate) struct InMemoryDelegator {
    records: HashMap<String, (String, Vec<Object>)>,
    failing: Mutex<HashSet<String>>,
    pending: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl InMemoryDelegator {
    pub(crate) fn serve(mut self, subschema: &str, key_field: &str, records: Value) -> Self {
        let records = match records {
            Value::Array(records) => records
                .into_iter()
                .filter_map(|record| match record {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.records
            .insert(subschema.to_owned(), (key_field.to_owned(), records));
        self
    }

    pub(crate) fn answer_later(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail(&self, subschema: &str) {
        self.failing.lock().insert(subschema.to_owned());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn answer(
        &self,
        request: &DelegationRequest,
        find: impl Fn(&str, &Object) -> bool,
    ) -> Resolution<DelegationResult> {
        let subschema = request.subschema.name();
        let result = if self.failing.lock().contains(subschema) {
            Err(Error::builder()
                .message(format!("{subschema} is unavailable"))
                .path(Path::from(&request.field_name))
                .extension_code("SUBSCHEMA_UNAVAILABLE")
                .build())
        } else {
            let record = self.records.get(subschema).and_then(|(key_field, records)| {
                records.iter().find(|record| find(key_field.as_str(), *record))
            });
            match record {
                Some(record) => Ok(ExternalObject::new(project(record, &request.selection_set))
                    .with_subschema(request.subschema.id())),
                None => Err(Error::builder()
                    .message(format!("not found in {subschema}"))
                    .build()),
            }
        };
        if self.pending.load(Ordering::SeqCst) {
            Resolution::pending(async move {
                tokio::task::yield_now().await;
                result
            })
        } else {
            Resolution::Ready(result)
        }
    }
}

impl Delegator for InMemoryDelegator {
    fn delegate(&self, request: DelegationRequest) -> Resolution<DelegationResult> {
        self.calls.lock().push(Call {
            subschema: request.subschema.name().to_owned(),
            field_name: request.field_name.clone(),
            arguments: Value::Object(request.arguments.clone()),
            selection_set: request.selection_set.to_string(),
            batch_key: None,
            skip_type_merging: request.skip_type_merging,
        });
        let arguments = request.arguments.clone();
        self.answer(&request, |_, record| {
            arguments
                .iter()
                .all(|(name, value)| record.get(name.as_str()) == Some(value))
        })
    }

    fn delegate_batch(&self, batch: BatchDelegationRequest) -> Resolution<DelegationResult> {
        let arguments = (batch.args_from_keys)(std::slice::from_ref(&batch.key));
        self.calls.lock().push(Call {
            subschema: batch.request.subschema.name().to_owned(),
            field_name: batch.request.field_name.clone(),
            arguments: Value::Object(arguments),
            selection_set: batch.request.selection_set.to_string(),
            batch_key: Some(batch.key.clone()),
            skip_type_merging: batch.request.skip_type_merging,
        });
        let key = batch.key.clone();
        self.answer(&batch.request, |key_field, record| {
            record.get(key_field) == Some(&key)
        })
    }
}

/// Keeps the fields of `record` selected by `selection_set`, under their response keys.
pub(crate) fn project(record: &Object, selection_set: &SelectionSet) -> Object {
    let mut projected = Object::new();
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                let Some(value) = record.get(field.name.as_str()) else {
                    continue;
                };
                let value = if field.selection_set.is_empty() {
                    value.clone()
                } else {
                    project_value(value, &field.selection_set)
                };
                projected.insert(field.response_key().as_str(), value);
            }
            Selection::InlineFragment(fragment) => {
                projected.extend(project(record, &fragment.selection_set));
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    projected
}

fn project_value(value: &Value, selection_set: &SelectionSet) -> Value {
    match value {
        Value::Object(object) => Value::Object(project(object, selection_set)),
        Value::Array(values) => Value::Array(
            values
                .iter()
                .map(|value| project_value(value, selection_set))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub(crate) fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        other => panic!("expected an object, got {other:?}"),
    }
}

/// A stitched schema served by an [`InMemoryDelegator`].
pub(crate) struct Gateway {
    pub(crate) schema: Arc<StitchedSchema>,
    pub(crate) delegator: Arc<InMemoryDelegator>,
}

impl Gateway {
    pub(crate) fn new(
        stitched_sdl: &str,
        subschemas: Vec<SubschemaConfig>,
        delegator: InMemoryDelegator,
    ) -> Result<Gateway, StitchingError> {
        Self::with_resolvers(stitched_sdl, subschemas, delegator, &Resolvers::default())
    }

    pub(crate) fn with_resolvers(
        stitched_sdl: &str,
        subschemas: Vec<SubschemaConfig>,
        delegator: InMemoryDelegator,
        resolvers: &Resolvers,
    ) -> Result<Gateway, StitchingError> {
        let delegator = Arc::new(delegator);
        let stitching_info =
            StitchingInfo::new(subschemas, &MergeTypes::default(), delegator.clone())?
                .complete(resolvers)?;
        let schema = add_stitching_info(StitchedSchema::parse(stitched_sdl)?, stitching_info);
        Ok(Gateway {
            schema: Arc::new(schema),
            delegator,
        })
    }

    pub(crate) fn request(
        &self,
        operation: &str,
        root_field: &str,
        variables: Value,
    ) -> Arc<RequestInfo> {
        let operation = Operation::parse(operation).unwrap();
        Arc::new(
            RequestInfo::for_root_field(
                self.schema.clone(),
                &operation,
                root_field,
                object(variables),
            )
            .unwrap(),
        )
    }

    pub(crate) fn subschema_id(&self, name: &str) -> SubschemaId {
        self.schema
            .extensions
            .stitching_info
            .as_ref()
            .and_then(|stitching_info| {
                stitching_info
                    .subschemas()
                    .iter()
                    .find(|subschema| subschema.name() == name)
                    .map(|subschema| subschema.id())
            })
            .unwrap()
    }

    /// Hands `data`, as returned by `subschema` for the root field of `info`, to type merging.
    pub(crate) fn handle(
        &self,
        info: &Arc<RequestInfo>,
        subschema: &str,
        data: Value,
        errors: &[Error],
    ) -> Resolution<ExternalObject> {
        handle_object(
            &info.return_type,
            ExternalObject::new(object(data)),
            errors,
            self.subschema_id(subschema),
            &Context::new(),
            info,
            false,
        )
    }
}

/// Arguments `{ sku }` taken from the merged object.
pub(crate) fn by_sku(object: &ExternalObject) -> Object {
    let mut arguments = Object::new();
    if let Some(sku) = object.data.get("sku") {
        arguments.insert("sku", sku.clone());
    }
    arguments
}
