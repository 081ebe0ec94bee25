//! The hierarchy as seen by the propagation engine.
//!
//! The engine never mutates the hierarchy. It reads propagation edges through
//! [`HierarchyView`] and reacts to [`StructuralChange`] notifications.

use crate::error::HierarchyError;
use crate::types::{CardContentId, CardId, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Read access to propagation edges.
pub trait HierarchyView {
    /// Whether the node currently exists
    fn contains(&self, node: Node) -> bool;

    /// Nodes that inherit references from `node`.
    ///
    /// - card type / type ref: cards whose type chain contains it
    /// - card: its content variants
    /// - card content: its sub-cards
    ///
    /// # Errors
    /// [`HierarchyError::NodeNotFound`] if `node` is absent
    fn direct_propagation_targets(&self, node: Node) -> Result<Vec<Node>, HierarchyError>;

    /// Inverse of [`direct_propagation_targets`](Self::direct_propagation_targets).
    ///
    /// For a card: its parent content first, then its type chain.
    ///
    /// # Errors
    /// [`HierarchyError::NodeNotFound`] if `node` is absent
    fn propagation_sources(&self, node: Node) -> Result<Vec<Node>, HierarchyError>;

    /// Structural parent: card -> parent content, content -> card.
    ///
    /// # Errors
    /// [`HierarchyError::NodeNotFound`] if `node` is absent
    fn parent_of(&self, node: Node) -> Result<Option<Node>, HierarchyError>;

    /// Whether `ancestor` is `node` or one of its structural ancestors.
    ///
    /// A loop in the parent chain is reported as a match.
    ///
    /// # Errors
    /// Propagates [`parent_of`](Self::parent_of) failures
    fn is_ancestor_or_self(&self, ancestor: Node, node: Node) -> Result<bool, HierarchyError> {
        let mut seen = HashSet::new();
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return Ok(true);
            }
            if !seen.insert(n) {
                return Ok(true);
            }
            current = self.parent_of(n)?;
        }
        Ok(false)
    }
}

/// Structural events the engine subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralChange {
    /// A card was created under a card content
    CardCreated { card: CardId, parent: CardContentId },

    /// A content variant was added to a card
    CardContentCreated { content: CardContentId, card: CardId },

    /// A card changed parent content
    CardMoved {
        card: CardId,
        from: CardContentId,
        to: CardContentId,
    },

    /// Nodes were deleted from the hierarchy
    NodesRemoved { nodes: Vec<Node> },
}

/// Source of pending structural changes
pub trait ChangeFeed {
    /// Drain changes recorded since the last call, oldest first
    fn take_changes(&self) -> Vec<StructuralChange>;

    /// Put back changes that could not be applied, ahead of anything
    /// recorded since they were taken
    fn requeue(&self, changes: Vec<StructuralChange>);
}
