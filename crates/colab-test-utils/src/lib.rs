//! Testing utilities for the colab workspace
//!
//! Shared fixtures wiring an in-memory hierarchy to a resource service.

#![allow(missing_docs)]

use colab_hierarchy::{CardContentId, CardId, InMemoryHierarchy, Node, ProjectHandle};
use colab_propagation::{EngineConfig, ResourceService};
use colab_resource::{AbstractResource, AbstractResourceId, ResourceData, ResourceStore};
use std::sync::Arc;

/// One project, its hierarchy and a service over it.
///
/// Every hierarchy helper syncs the service afterwards, so reads see the
/// engine's reaction immediately.
pub struct World {
    pub hierarchy: Arc<InMemoryHierarchy>,
    pub service: ResourceService<InMemoryHierarchy>,
    pub project: ProjectHandle,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let hierarchy = Arc::new(InMemoryHierarchy::new());
        let project = hierarchy.create_project();
        let service = ResourceService::new(Arc::clone(&hierarchy), config);
        Self {
            hierarchy,
            service,
            project,
        }
    }

    pub fn root_card(&self) -> Node {
        Node::Card(self.project.root_card)
    }

    pub fn root_content(&self) -> Node {
        Node::CardContent(self.project.root_content)
    }

    /// Untyped card under `parent`
    pub fn card(&self, parent: CardContentId) -> (CardId, CardContentId) {
        let created = self.hierarchy.create_card(parent, None).unwrap();
        self.service.sync().unwrap();
        created
    }

    pub fn typed_card(&self, parent: CardContentId, card_type: Node) -> (CardId, CardContentId) {
        let created = self.hierarchy.create_card(parent, Some(card_type)).unwrap();
        self.service.sync().unwrap();
        created
    }

    pub fn content(&self, card: CardId) -> CardContentId {
        let content = self.hierarchy.create_card_content(card).unwrap();
        self.service.sync().unwrap();
        content
    }

    pub fn move_card(&self, card: CardId, to: CardContentId) {
        self.hierarchy.move_card(card, to).unwrap();
        self.service.sync().unwrap();
    }

    pub fn remove_card(&self, card: CardId) -> Vec<Node> {
        let removed = self.hierarchy.remove_card(card).unwrap();
        self.service.sync().unwrap();
        removed
    }

    pub fn resource(&self, owner: Node, title: &str) -> AbstractResourceId {
        self.service
            .create_resource(owner, ResourceData::new(title))
            .unwrap()
    }

    pub fn store(&self) -> ResourceStore {
        self.service.snapshot()
    }

    /// Entry of `resource`'s lineage anchored at `node`
    pub fn entry(&self, node: Node, resource: AbstractResourceId) -> Option<AbstractResource> {
        let store = self.store();
        store
            .entry_in_lineage(node, resource)
            .unwrap()
            .map(|id| store.get(id).unwrap().clone())
    }

    pub fn entry_id(&self, node: Node, resource: AbstractResourceId) -> AbstractResourceId {
        self.entry(node, resource)
            .unwrap_or_else(|| panic!("no entry of {resource} at {node}"))
            .id()
    }

    /// Number of entries resolving to `resource`
    pub fn lineage_len(&self, resource: AbstractResourceId) -> usize {
        self.service.lineage(resource).map_or(0, |lineage| lineage.len())
    }
}
