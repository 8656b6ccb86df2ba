use std::future::IntoFuture;
use std::sync::Arc;

use apollo_compiler::Node;
use futures::FutureExt;
use futures::future::join_all;
use tracing::Instrument;

use super::MERGE_FIELDS_SPAN_NAME;
use super::plan::build_delegation_plan;
use super::proxiability::sort_subschemas_by_proxiability;
use crate::context::Context;
use crate::delegate::DelegationResult;
use crate::external::ExternalObject;
use crate::external::merge_proxied_results;
use crate::graphql::Error;
use crate::request::RequestInfo;
use crate::resolution::Resolution;
use crate::schema::SubschemaId;
use crate::selection::Field;
use crate::stitching_info::MergedTypeInfo;
use crate::utils::logging::merge_snapshot;

type Call = (SubschemaId, Resolution<DelegationResult>);

/// Fetches `field_nodes` of `object` from the subschemas able to resolve them, then folds the
/// results into `object`.
///
/// Each pass delegates the fields that can be resolved with what is known so far, all calls of a
/// pass running concurrently. The subschemas that answered become known, which may make more
/// targets proxiable for the remaining fields. Merging stops when no field is left or when a pass
/// cannot delegate anything; fields that were never assigned are left out of the object.
///
/// The result is ready as long as every call of every pass answered without waiting.
pub fn merge_fields(
    merged_type_info: Arc<MergedTypeInfo>,
    object: ExternalObject,
    field_nodes: Vec<Node<Field>>,
    known: Vec<SubschemaId>,
    targets: Vec<SubschemaId>,
    context: &Context,
    info: &Arc<RequestInfo>,
) -> Resolution<ExternalObject> {
    let span = tracing::debug_span!(
        MERGE_FIELDS_SPAN_NAME,
        "graphql.type" = %merged_type_info.type_name(),
    );
    let mut state = MergeState {
        merged_type_info,
        object,
        field_nodes,
        known,
        targets,
        context: context.clone(),
        info: info.clone(),
        pass: 0,
    };

    let _guard = span.enter();
    loop {
        let Some(calls) = state.next_pass() else {
            return Resolution::Ready(state.object);
        };
        if calls.iter().all(|(_, call)| call.is_ready()) {
            let results = calls
                .into_iter()
                .filter_map(|(subschema, call)| call.ready().ok().map(|result| (subschema, result)))
                .collect::<Vec<_>>();
            state.fold(results);
            continue;
        }
        return Resolution::pending(state.run_pending(calls).instrument(span.clone()));
    }
}

struct MergeState {
    merged_type_info: Arc<MergedTypeInfo>,
    object: ExternalObject,
    field_nodes: Vec<Node<Field>>,
    known: Vec<SubschemaId>,
    targets: Vec<SubschemaId>,
    context: Context,
    info: Arc<RequestInfo>,
    pass: usize,
}

impl MergeState {
    /// Plans the next pass and issues its calls, or returns `None` when merging is over.
    fn next_pass(&mut self) -> Option<Vec<Call>> {
        if self.field_nodes.is_empty() {
            return None;
        }
        self.pass += 1;
        let merged_type_info = &self.merged_type_info;
        let proxiability = sort_subschemas_by_proxiability(
            merged_type_info,
            &self.known,
            &self.targets,
            &self.field_nodes,
        );
        let plan =
            build_delegation_plan(merged_type_info, &self.field_nodes, &proxiability.proxiable);
        tracing::debug!(
            pass = self.pass,
            delegations = plan.delegation_map.len(),
            unassigned = plan.unassigned_field_nodes.len(),
            "planned type merging pass"
        );
        merge_snapshot!(merged_type_info.type_name(), plan => display, "built delegation plan");
        if plan.delegation_map.is_empty() {
            return None;
        }

        let calls = plan
            .delegation_map
            .into_iter()
            .map(|(subschema, selection_set)| {
                let call = match (
                    merged_type_info.subschema(subschema),
                    merged_type_info.resolver(subschema),
                ) {
                    (Some(target), Some(resolver)) => resolver.resolve(
                        &self.object,
                        &self.context,
                        &self.info,
                        target,
                        selection_set,
                    ),
                    _ => Resolution::Ready(Err(Error::builder()
                        .message(format!(
                            "no resolver for type {} in subschema {subschema}",
                            merged_type_info.type_name()
                        ))
                        .path(self.info.path.clone())
                        .build())),
                };
                (subschema, call)
            })
            .collect();

        self.field_nodes = plan.unassigned_field_nodes;
        for &subschema in &proxiability.proxiable {
            if !self.known.contains(&subschema) {
                self.known.push(subschema);
            }
        }
        self.targets = proxiability.non_proxiable.clone();
        Some(calls)
    }

    fn fold(&mut self, results: Vec<(SubschemaId, DelegationResult)>) {
        let object = std::mem::take(&mut self.object);
        self.object = merge_proxied_results(object, results);
    }

    async fn run_pending(mut self, mut calls: Vec<Call>) -> ExternalObject {
        loop {
            let results = join_all(calls.into_iter().map(|(subschema, call)| {
                call.into_future().map(move |result| (subschema, result))
            }))
            .await;
            self.fold(results);
            match self.next_pass() {
                Some(next) => calls = next,
                None => return self.object,
            }
        }
    }
}
