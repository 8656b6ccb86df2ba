//! Merging objects from several subschemas.
//!
//! [`merge_fields`] drives the passes. Each pass sorts the delegation targets by proxiability
//! ([`sort_subschemas_by_proxiability`]), assigns the remaining fields to the proxiable ones
//! ([`build_delegation_plan`]), calls them and folds their results into the object.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

mod execute;
mod plan;
mod proxiability;

pub use execute::merge_fields;
pub use plan::DelegationPlan;
pub use plan::build_delegation_plan;
pub(crate) use plan::PlanCache;
pub use proxiability::Proxiability;
pub(crate) use proxiability::ProxiabilityCache;
pub use proxiability::sort_subschemas_by_proxiability;

pub(crate) const MERGE_FIELDS_SPAN_NAME: &str = "merge_fields";

/// Entries kept by each memoization cache of a merged type before the least recently used is
/// evicted.
pub(crate) const MEMO_CACHE_CAPACITY: usize = 512;

pub(crate) fn memo_cache<K: Hash + Eq, V>() -> Mutex<LruCache<K, V>> {
    let capacity = NonZeroUsize::new(MEMO_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
}
