//! Store errors

use crate::model::{AbstractResourceId, DocumentId};
use colab_hierarchy::Node;

/// Errors raised by [`ResourceStore`](crate::ResourceStore)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No entry with this id
    #[error("abstract resource not found: {0}")]
    NotFound(AbstractResourceId),

    /// Entry is a ref where a resource was expected
    #[error("{0} is not a resource")]
    NotAResource(AbstractResourceId),

    /// Entry is a resource where a ref was expected
    #[error("{0} is not a resource reference")]
    NotARef(AbstractResourceId),

    /// `target` points at a missing entry
    #[error("{id} points at missing {target}")]
    DanglingTarget {
        id: AbstractResourceId,
        target: AbstractResourceId,
    },

    /// Following `target` never reaches a resource
    #[error("chain starting at {0} does not terminate")]
    CyclicChain(AbstractResourceId),

    /// A second entry of the same lineage at one node
    #[error("{node} already holds {existing} for the lineage of {resource}")]
    DuplicateLineage {
        node: Node,
        resource: AbstractResourceId,
        existing: AbstractResourceId,
    },

    /// Re-pointing a ref at an entry of another lineage
    #[error("re-pointing {id} at {target} would leave the lineage of {resource}")]
    LineageMismatch {
        id: AbstractResourceId,
        target: AbstractResourceId,
        resource: AbstractResourceId,
    },

    /// Document already backs a resource
    #[error("{document} is already attached to {resource}")]
    DocumentAlreadyAttached {
        document: DocumentId,
        resource: AbstractResourceId,
    },

    /// Document listed twice in one payload
    #[error("{0} is listed twice")]
    DuplicateDocument(DocumentId),

    /// Secondary index disagrees with the entries
    #[error("index out of sync: {0}")]
    IndexMismatch(String),
}

impl StoreError {
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Errors that mean stored data broke a chain invariant
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::DanglingTarget { .. } | Self::CyclicChain(_) | Self::IndexMismatch(_)
        )
    }
}
