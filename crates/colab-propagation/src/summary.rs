//! Serializable views handed to service callers

use crate::availability::ResourceChain;
use crate::category::effective_category;
use crate::error::EngineError;
use colab_hierarchy::Node;
use colab_resource::{AbstractResource, AbstractResourceId, DocumentId, Resource, ResourceStore};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Resource,
    Ref,
}

/// One chain entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbstractResourceSummary {
    pub id: AbstractResourceId,
    pub kind: EntryKind,
    pub owner: Node,
    pub target: Option<AbstractResourceId>,
    /// Effective category
    pub category: Option<String>,
    pub residual: bool,
    pub refused: bool,
    pub refused_by: Option<AbstractResourceId>,
}

impl AbstractResourceSummary {
    /// # Errors
    /// Broken chain while resolving the category
    pub fn of(store: &ResourceStore, entry: &AbstractResource) -> Result<Self, EngineError> {
        let (kind, refused_by) = match entry {
            AbstractResource::Resource(_) => (EntryKind::Resource, None),
            AbstractResource::Ref(r) => (EntryKind::Ref, r.refused_by),
        };
        Ok(Self {
            id: entry.id(),
            kind,
            owner: entry.owner(),
            target: entry.target(),
            category: effective_category(store, entry.id())?.map(str::to_owned),
            residual: entry.is_residual(),
            refused: entry.is_refused(),
            refused_by,
        })
    }
}

/// A resource as listed at a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub id: AbstractResourceId,
    pub owner: Node,
    pub title: String,
    pub teaser: Option<String>,
    /// Effective category of the entry it was reached through
    pub category: Option<String>,
    pub documents: Vec<DocumentId>,
    pub published: bool,
    pub deprecated: bool,
    pub requesting_for_glory: bool,
}

impl ResourceSummary {
    /// `category` is the one shown at the listing node
    #[must_use]
    pub fn of(resource: &Resource, category: Option<String>) -> Self {
        Self {
            id: resource.id(),
            owner: resource.owner(),
            title: resource.title.clone(),
            teaser: resource.teaser.clone(),
            category,
            documents: resource.documents().to_vec(),
            published: resource.published,
            deprecated: resource.deprecated,
            requesting_for_glory: resource.requesting_for_glory,
        }
    }

    /// Summary of the chain's resource as seen from the chain's node
    ///
    /// # Errors
    /// Broken chain while resolving the category
    pub fn of_chain(store: &ResourceStore, chain: &ResourceChain<'_>) -> Result<Self, EngineError> {
        let category = effective_category(store, chain.nearest().id())?.map(str::to_owned);
        Ok(Self::of(chain.resource(), category))
    }
}
