//! Colab Resource Store
//!
//! Resources and the reference chains that carry them down the hierarchy.
//!
//! # Overview
//!
//! - [`AbstractResource`]: a terminal [`Resource`] or a [`ResourceRef`] link
//! - [`ResourceStore`]: persistent arena with owner and downstream indexes
//! - [`ResourceStore::verify_integrity`]: chain and index checks
//!
//! The store enforces the per-node lineage uniqueness and chain
//! termination rules on every insert; it knows nothing about publish
//! gates or the hierarchy shape.
//!
//! # Example
//!
//! ```rust
//! use colab_hierarchy::{CardContentId, CardId, Node};
//! use colab_resource::{ResourceData, ResourceStore};
//!
//! let mut store = ResourceStore::new();
//! let resource = store
//!     .insert_resource(Node::Card(CardId::new()), ResourceData::new("Runbook"))
//!     .unwrap();
//! let link = store
//!     .insert_ref(Node::CardContent(CardContentId::new()), resource)
//!     .unwrap();
//!
//! assert_eq!(store.resolve(link).unwrap(), resource);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod integrity;
pub mod model;
pub mod store;

// Re-exports
pub use error::StoreError;
pub use integrity::IntegrityReport;
pub use model::{
    AbstractResource, AbstractResourceId, DocumentId, Resource, ResourceData, ResourcePatch,
    ResourceRef,
};
pub use store::ResourceStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
