//! Hierarchy errors

use crate::types::{CardContentId, CardId, Node, ProjectId};

/// Errors raised by a hierarchy collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    /// Node absent from the hierarchy
    #[error("node not found: {0}")]
    NodeNotFound(Node),

    /// Project absent from the hierarchy
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// Node used as a card type is not one
    #[error("{0} is not a card type or a card type reference")]
    NotAType(Node),

    /// Node used outside of its project scope
    #[error("{node} is not usable from {project}")]
    ScopeMismatch { node: Node, project: ProjectId },

    /// Card moved beneath its own subtree
    #[error("moving {card} under {parent} would create a cycle")]
    CycleDetected { card: CardId, parent: CardContentId },

    /// Root cards are fixed
    #[error("root card {0} cannot be moved or removed")]
    RootCard(CardId),

    /// Failure of the underlying store
    #[error("hierarchy backend failure: {0}")]
    Backend(String),
}

impl HierarchyError {
    /// Missing-entity errors, as opposed to rule violations
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound(_) | Self::ProjectNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardTypeId;

    #[test]
    fn not_found_classification() {
        assert!(HierarchyError::NodeNotFound(Node::CardType(CardTypeId::new())).is_not_found());
        assert!(!HierarchyError::RootCard(CardId::new()).is_not_found());
    }

    #[test]
    fn cycle_message_names_both_ends() {
        let card = CardId::new();
        let parent = CardContentId::new();
        let msg = HierarchyError::CycleDetected { card, parent }.to_string();
        assert!(msg.contains(&card.to_string()));
        assert!(msg.contains(&parent.to_string()));
    }
}
