//! Colab Propagation
//!
//! Keeps resources attached to card types, cards and card contents visible
//! to everything below them, through chains of resource references.
//!
//! # Overview
//!
//! - [`PropagationEngine`]: lifecycle operations and hierarchy reactions,
//!   each one all-or-nothing over a [`ResourceStore`](colab_resource::ResourceStore)
//! - [`availability`]: which lineages exist at a node and which are usable
//! - [`category`]: inherited category labels and cascading renames
//! - [`ResourceService`]: locked store plus change feed, the caller surface
//! - [`test_harness`]: seeded random simulator checking store invariants
//!
//! # Quick Start
//!
//! ```rust
//! use colab_hierarchy::{InMemoryHierarchy, Node};
//! use colab_propagation::{EngineConfig, ResourceService};
//! use colab_resource::ResourceData;
//! use std::sync::Arc;
//!
//! let hierarchy = Arc::new(InMemoryHierarchy::new());
//! let project = hierarchy.create_project();
//! let (card, _) = hierarchy.create_card(project.root_content, None).unwrap();
//! let (_, below) = hierarchy.create_card(project.root_content, None).unwrap();
//!
//! let service = ResourceService::new(hierarchy.clone(), EngineConfig::default());
//! let runbook = service
//!     .create_resource(Node::Card(project.root_card), ResourceData::new("Runbook"))
//!     .unwrap();
//! assert!(service.available_resource_ids(Node::Card(card)).unwrap().is_empty());
//!
//! service.publish_resource(runbook).unwrap();
//! assert_eq!(service.available_resource_ids(Node::CardContent(below)).unwrap(), vec![runbook]);
//! ```

#![warn(missing_docs)]

pub mod availability;
pub mod category;
pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod summary;

// Test harness
pub mod test_harness;

// Re-exports
pub use availability::{available_active_resources, resource_chain, ResourceChain};
pub use config::{EngineConfig, FileConfig, SimulatorConfig};
pub use engine::{CascadeStats, PropagationEngine};
pub use error::{EngineError, ErrorKind, Missing};
pub use service::ResourceService;
pub use summary::{AbstractResourceSummary, EntryKind, ResourceSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
