//! Error types for the Stitch engine.

use crate::{CollectionName, FieldName};
use thiserror::Error;

/// All possible errors from the Stitch engine.
///
/// Relation declaration errors are fatal at setup time and abort
/// initialization of the relation that produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Relation declaration errors
    #[error("relation declaration is missing a {0} name")]
    EmptyDeclaration(&'static str),

    #[error("missing reverse relation field for child collection '{0}'")]
    MissingReverseField(CollectionName),

    #[error("relation declares the same collection '{0}' for parent and child")]
    SelfReferentialRelation(CollectionName),

    #[error("field '{0}' is managed by the engine and cannot be ignored")]
    ProtectedFieldIgnored(FieldName),

    #[error("array field '{0}' collides with the link field")]
    ArrayFieldCollision(FieldName),

    // Document shape errors
    #[error("malformed child document: {0}")]
    MalformedChildDocument(&'static str),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
