//! Error types for the propagation engine
//!
//! Three caller-facing kinds:
//! - `NotFound`: a referenced resource, ref or node is absent
//! - `DataIntegrity`: the operation would break a chain invariant
//! - `RelatedObjectNotFound`: the owner node of a new resource is absent
//!
//! Collaborator failures are wrapped unchanged. Nothing is retried and a
//! failed operation never leaves a partial cascade behind.

use colab_hierarchy::{HierarchyError, Node};
use colab_resource::{AbstractResourceId, StoreError};
use serde::Serialize;
use std::fmt;

/// The absent object of a [`EngineError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Missing {
    Resource(AbstractResourceId),
    Node(Node),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Resource(id) => write!(f, "{id}"),
            Missing::Node(node) => write!(f, "{node}"),
        }
    }
}

/// Coarse classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    DataIntegrity,
    RelatedObjectNotFound,
    /// Failure of a collaborator's storage
    Backend,
}

/// Main engine error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Referenced resource, ref or node is absent
    #[error("not found: {0}")]
    NotFound(Missing),

    /// Operation would violate an invariant
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// Owner node given at creation does not exist
    #[error("related object not found: {0}")]
    RelatedObjectNotFound(Node),

    /// Resource store rejected a mutation
    #[error("store error: {0}")]
    Store(StoreError),

    /// Hierarchy collaborator failed
    #[error("hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),
}

impl EngineError {
    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    /// Classify for callers
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DataIntegrity(_) | Self::Store(_) => ErrorKind::DataIntegrity,
            Self::RelatedObjectNotFound(_) => ErrorKind::RelatedObjectNotFound,
            Self::Hierarchy(HierarchyError::Backend(_)) => ErrorKind::Backend,
            Self::Hierarchy(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Hierarchy(_) => ErrorKind::DataIntegrity,
        }
    }

    /// Only collaborator backend failures may succeed on a second attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Backend
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => EngineError::NotFound(Missing::Resource(id)),
            other => EngineError::Store(other),
        }
    }
}
