//! Type merging for stitched GraphQL schemas.
//!
//! A stitched schema exposes types whose fields are spread over several subschemas. When a
//! subschema returns an object of such a type, [`handle_object`] finds the requested fields it
//! could not provide and fetches them from the other subschemas, pass after pass, until every
//! field that can be resolved is.
//!
//! ## Usage
//!
//! Build the [`StitchingInfo`] once, from the subschemas and their merge configuration, and attach
//! it to the stitched schema with [`add_stitching_info`]. The engine executing requests against
//! subschemas is provided as a [`Delegator`].

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod configuration;
pub mod contains;
pub mod context;
pub mod delegate;
pub mod error;
pub mod external;
pub mod graphql;
pub mod handle;
pub mod json_ext;
pub mod merge;
pub mod merge_config;
pub mod request;
pub mod resolution;
pub mod schema;
pub mod selection;
pub mod stitching_info;
pub(crate) mod utils;

pub use crate::configuration::Configuration;
pub use crate::context::Context;
pub use crate::delegate::Delegator;
pub use crate::error::StitchingError;
pub use crate::external::ExternalObject;
pub use crate::handle::handle_object;
pub use crate::merge_config::MergeTypes;
pub use crate::merge_config::MergedTypeConfig;
pub use crate::request::RequestInfo;
pub use crate::resolution::Resolution;
pub use crate::schema::StitchedSchema;
pub use crate::schema::SubschemaConfig;
pub use crate::schema::add_stitching_info;
pub use crate::stitching_info::StitchingInfo;

const fn assert_thread_safe<T: Send + Sync>() {}

const _: () = {
    assert_thread_safe::<StitchingInfo>();
    assert_thread_safe::<StitchedSchema>();
    assert_thread_safe::<RequestInfo>();
    assert_thread_safe::<ExternalObject>();
};
