//! Hierarchy identifiers and the [`Node`] tagged union.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! hierarchy_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

hierarchy_id!(
    /// Project scope identifier
    ProjectId,
    "project"
);
hierarchy_id!(
    /// Concrete card type identifier
    CardTypeId,
    "card-type"
);
hierarchy_id!(
    /// Card type reference identifier (a project-local alias of another type)
    CardTypeRefId,
    "card-type-ref"
);
hierarchy_id!(
    /// Card identifier
    CardId,
    "card"
);
hierarchy_id!(
    /// Card content (variant) identifier
    CardContentId,
    "card-content"
);

/// A node of the hierarchy able to anchor resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum Node {
    /// Concrete card type
    CardType(CardTypeId),
    /// Reference to a card type (or to another reference)
    CardTypeRef(CardTypeRefId),
    /// Card
    Card(CardId),
    /// Card content variant
    CardContent(CardContentId),
}

/// Discriminant of [`Node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// [`Node::CardType`]
    CardType,
    /// [`Node::CardTypeRef`]
    CardTypeRef,
    /// [`Node::Card`]
    Card,
    /// [`Node::CardContent`]
    CardContent,
}

/// Condition attached to a propagation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    /// Always propagates (card to its own content variants)
    Unconditional,
    /// Propagates only while the originating resource is published
    Published,
}

impl Gate {
    /// Whether the edge lets a lineage through
    #[inline]
    #[must_use]
    pub fn is_open(self, published: bool) -> bool {
        match self {
            Gate::Unconditional => true,
            Gate::Published => published,
        }
    }
}

impl Node {
    /// Node discriminant
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::CardType(_) => NodeKind::CardType,
            Node::CardTypeRef(_) => NodeKind::CardTypeRef,
            Node::Card(_) => NodeKind::Card,
            Node::CardContent(_) => NodeKind::CardContent,
        }
    }

    /// Gate applied to every edge leaving this node.
    ///
    /// Only card -> card content is unconditional.
    #[inline]
    #[must_use]
    pub fn outgoing_gate(&self) -> Gate {
        match self {
            Node::Card(_) => Gate::Unconditional,
            Node::CardType(_) | Node::CardTypeRef(_) | Node::CardContent(_) => Gate::Published,
        }
    }

    /// True for card types and card type references
    #[inline]
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(self, Node::CardType(_) | Node::CardTypeRef(_))
    }

    /// Card id, if this node is a card
    #[inline]
    #[must_use]
    pub fn as_card(&self) -> Option<CardId> {
        match self {
            Node::Card(id) => Some(*id),
            _ => None,
        }
    }

    /// Card content id, if this node is a card content
    #[inline]
    #[must_use]
    pub fn as_card_content(&self) -> Option<CardContentId> {
        match self {
            Node::CardContent(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::CardType(id) => write!(f, "{id}"),
            Node::CardTypeRef(id) => write!(f, "{id}"),
            Node::Card(id) => write!(f, "{id}"),
            Node::CardContent(id) => write!(f, "{id}"),
        }
    }
}

impl From<CardTypeId> for Node {
    fn from(id: CardTypeId) -> Self {
        Node::CardType(id)
    }
}

impl From<CardTypeRefId> for Node {
    fn from(id: CardTypeRefId) -> Self {
        Node::CardTypeRef(id)
    }
}

impl From<CardId> for Node {
    fn from(id: CardId) -> Self {
        Node::Card(id)
    }
}

impl From<CardContentId> for Node {
    fn from(id: CardContentId) -> Self {
        Node::CardContent(id)
    }
}
