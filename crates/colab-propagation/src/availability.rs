//! Availability resolver
//!
//! Pure read path: which lineages exist at a node, and which of them a user
//! may actually use there.

use crate::error::EngineError;
use colab_hierarchy::{Gate, Node};
use colab_resource::{AbstractResource, Resource, ResourceStore};

/// One lineage as seen from a node: its local entry first, the resource last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChain<'s> {
    entries: Vec<&'s AbstractResource>,
    resource: &'s Resource,
}

impl<'s> ResourceChain<'s> {
    fn new(entries: Vec<&'s AbstractResource>) -> Result<Self, EngineError> {
        let resource = entries
            .last()
            .copied()
            .and_then(AbstractResource::as_resource)
            .ok_or_else(|| EngineError::integrity("chain does not end at a resource"))?;
        Ok(Self { entries, resource })
    }

    #[must_use]
    pub fn entries(&self) -> &[&'s AbstractResource] {
        &self.entries
    }

    /// Entry anchored at the node itself
    #[must_use]
    pub fn nearest(&self) -> &'s AbstractResource {
        self.entries[0]
    }

    #[must_use]
    pub fn resource(&self) -> &'s Resource {
        self.resource
    }

    #[must_use]
    pub fn is_residual(&self) -> bool {
        self.nearest().is_residual()
    }

    /// Nearest entry refused
    #[must_use]
    pub fn is_refused(&self) -> bool {
        self.nearest().is_refused()
    }

    /// Any link refused
    #[must_use]
    pub fn has_refused_link(&self) -> bool {
        self.entries.iter().any(|entry| entry.is_refused())
    }

    /// Whether some link leaves a node whose outgoing edges wait for publish
    #[must_use]
    pub fn crosses_gated_edge(&self) -> bool {
        self.entries[1..]
            .iter()
            .any(|upstream| upstream.owner().outgoing_gate() == Gate::Published)
    }

    /// Usable at the node
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.is_residual()
            && !self.has_refused_link()
            && (self.resource.published || !self.crosses_gated_edge())
    }
}

/// Every lineage with an entry at `node`, ordered by local entry id
///
/// # Errors
/// A broken chain in the store
pub fn resource_chain(store: &ResourceStore, node: Node) -> Result<Vec<ResourceChain<'_>>, EngineError> {
    store
        .entries_at(node)
        .into_iter()
        .map(|id| ResourceChain::new(store.chain(id)?))
        .collect()
}

/// Resources usable at `node`
///
/// # Errors
/// A broken chain in the store
pub fn available_active_resources(store: &ResourceStore, node: Node) -> Result<Vec<&Resource>, EngineError> {
    Ok(resource_chain(store, node)?
        .into_iter()
        .filter(ResourceChain::is_available)
        .map(|chain| chain.resource())
        .collect())
}
