//! Colab Hierarchy
//!
//! The card type / card / card content tree that resources are attached to,
//! as consumed by the propagation engine.
//!
//! # Overview
//!
//! - [`Node`]: tagged union of every node able to anchor a resource
//! - [`HierarchyView`]: read-only propagation edges
//! - [`StructuralChange`] / [`ChangeFeed`]: notifications the engine reacts to
//! - [`InMemoryHierarchy`]: petgraph-backed collaborator
//!
//! # Example
//!
//! ```rust
//! use colab_hierarchy::{HierarchyView, InMemoryHierarchy, Node};
//!
//! let hierarchy = InMemoryHierarchy::new();
//! let project = hierarchy.create_project();
//! let (card, content) = hierarchy.create_card(project.root_content, None).unwrap();
//!
//! let targets = hierarchy.direct_propagation_targets(Node::Card(card)).unwrap();
//! assert_eq!(targets, vec![Node::CardContent(content)]);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod types;
pub mod view;

// Re-exports
pub use error::HierarchyError;
pub use memory::{InMemoryHierarchy, ProjectHandle};
pub use types::{CardContentId, CardId, CardTypeId, CardTypeRefId, Gate, Node, NodeKind, ProjectId};
pub use view::{ChangeFeed, HierarchyView, StructuralChange};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
