//! Errors raised while composing stitching metadata.
//!
//! These are setup-time failures: they abort schema composition before any request is served.
//! Failures that happen while resolving a request are GraphQL [`crate::graphql::Error`]s attached
//! to the object being merged instead.

use apollo_compiler::ast::Document;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use thiserror::Error;

/// Error types for stitching composition.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StitchingError {
    /// invalid schema for subschema "{name}": {message}
    InvalidSchema {
        /// The subschema name.
        name: String,
        /// The schema diagnostics.
        message: String,
    },

    /// invalid selection set "{source_text}": {message}
    InvalidSelectionSet {
        /// The selection text as written in the configuration.
        source_text: String,
        /// The parser diagnostics.
        message: String,
    },

    /// invalid fragment "{source_text}": {message}
    InvalidFragment {
        /// The fragment text as written in the configuration.
        source_text: String,
        /// Why the fragment was rejected.
        message: String,
    },

    /// invalid operation: {message}
    InvalidOperation {
        /// Why the operation was rejected.
        message: String,
    },

    /// invalid merge configuration for type "{type_name}" in subschema "{subschema}": {reason}
    MalformedMergeConfig {
        /// The subschema declaring the configuration.
        subschema: String,
        /// The merged type.
        type_name: String,
        /// What is missing or inconsistent.
        reason: String,
    },

    /// type "{type_name}" is not defined in the stitched schema
    UnknownType {
        /// The type that could not be found.
        type_name: String,
    },

    /// invalid configuration: {message}
    InvalidConfiguration {
        /// The deserialization failure.
        message: String,
    },
}

impl StitchingError {
    pub(crate) fn invalid_selection_set(
        source_text: &str,
        errors: WithErrors<Document>,
    ) -> StitchingError {
        StitchingError::InvalidSelectionSet {
            source_text: source_text.to_owned(),
            message: errors.errors.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for StitchingError {
    fn from(error: serde_yaml::Error) -> Self {
        StitchingError::InvalidConfiguration {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for StitchingError {
    fn from(error: serde_json::Error) -> Self {
        StitchingError::InvalidConfiguration {
            message: error.to_string(),
        }
    }
}
