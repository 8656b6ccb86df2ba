/// Records the state of a merge pass at trace level, so that a merge can be replayed step by step
/// from the logs.
///
/// Every record carries the merged type under `graphql.type`, the Rust type of the recorded value
/// under `snapshot` and the value itself under `data`. The value is either serialized to JSON, as
/// done for the proxiability split computed at the start of each pass:
/// ```ignore
/// merge_snapshot!(merged_type_info.type_name(), proxiability, "sorted subschemas by proxiability");
/// ```
/// or written with its `Display` form, as done for the delegation plan of the pass, which reads as
/// one line per delegated subschema followed by the fields left for a later pass:
/// ```ignore
/// merge_snapshot!(merged_type_info.type_name(), plan => display, "built delegation plan");
/// ```
/// A value that fails to serialize is recorded as the serialization error.
///
/// Nothing is emitted unless the `snapshot_tracing` feature is enabled.
macro_rules! merge_snapshot {
    ($type_name:expr, $value:expr => display, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(
            "graphql.type" = %$type_name,
            snapshot = std::any::type_name_of_val(&$value),
            data = %$value,
            $msg
        );
    };
    ($type_name:expr, $value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(
            "graphql.type" = %$type_name,
            snapshot = std::any::type_name_of_val(&$value),
            data = serde_json::to_string(&$value).unwrap_or_else(|error| error.to_string()),
            $msg
        );
    };
}

pub(crate) use merge_snapshot;
