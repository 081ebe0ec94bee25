//! Storage facade over the engine
//!
//! [`ResourceService`] owns the committed store. Writers are serialized by a
//! write lock and every write first applies the structural changes the
//! hierarchy recorded since the previous one. A batch the engine rejects is
//! kept on the feed and retried by the next write or [`ResourceService::sync`].
//! Readers only ever see committed state.

use crate::availability::{available_active_resources, resource_chain};
use crate::category;
use crate::config::EngineConfig;
use crate::engine::{CascadeStats, PropagationEngine};
use crate::error::{EngineError, Missing};
use crate::summary::{AbstractResourceSummary, ResourceSummary};
use colab_hierarchy::{ChangeFeed, HierarchyView, Node, StructuralChange};
use colab_resource::{AbstractResourceId, IntegrityReport, Resource, ResourceData, ResourcePatch, ResourceStore};
use parking_lot::RwLock;
use std::sync::Arc;

/// Resource operations as exposed to service callers
#[derive(Debug)]
pub struct ResourceService<H> {
    hierarchy: Arc<H>,
    store: RwLock<ResourceStore>,
    config: EngineConfig,
}

impl<H: HierarchyView + ChangeFeed> ResourceService<H> {
    /// Service with an empty store
    #[must_use]
    pub fn new(hierarchy: Arc<H>, config: EngineConfig) -> Self {
        Self::with_store(hierarchy, config, ResourceStore::new())
    }

    /// Service resuming from an existing store
    #[must_use]
    pub fn with_store(hierarchy: Arc<H>, config: EngineConfig, store: ResourceStore) -> Self {
        Self {
            hierarchy,
            store: RwLock::new(store),
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> &Arc<H> {
        &self.hierarchy
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn engine(&self) -> PropagationEngine<'_, H> {
        PropagationEngine::new(&*self.hierarchy, self.config.clone())
    }

    /// Apply pending structural changes.
    ///
    /// The drained batch is applied to one draft and committed as a whole.
    /// If any change is rejected nothing is committed and the batch goes back
    /// onto the feed for the next attempt.
    ///
    /// # Errors
    /// First change the engine rejected
    pub fn sync(&self) -> Result<CascadeStats, EngineError> {
        let mut store = self.store.write();
        self.apply_pending(&self.engine(), &mut store)
    }

    fn apply_pending(
        &self,
        engine: &PropagationEngine<'_, H>,
        store: &mut ResourceStore,
    ) -> Result<CascadeStats, EngineError> {
        let changes = self.hierarchy.take_changes();
        if changes.is_empty() {
            return Ok(CascadeStats::default());
        }

        let mut draft = store.clone();
        let mut total = CascadeStats::default();
        let mut failure = None;
        for change in &changes {
            let outcome = match self.current_form(change.clone()) {
                Ok(Some(change)) => engine.on_structural_change(&mut draft, &change),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(stats) => total.add(&stats),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            self.hierarchy.requeue(changes);
            return Err(e);
        }
        *store = draft;
        Ok(total)
    }

    /// A recorded change as it applies to the hierarchy now; `None` once its
    /// subject is gone again
    fn current_form(&self, change: StructuralChange) -> Result<Option<StructuralChange>, EngineError> {
        let present = |node: Node| self.hierarchy.contains(node);
        Ok(match change {
            StructuralChange::CardCreated { card, .. } if !present(Node::Card(card)) => None,
            StructuralChange::CardContentCreated { content, .. } if !present(Node::CardContent(content)) => None,
            StructuralChange::CardMoved { card, from, .. } => {
                if !present(Node::Card(card)) {
                    return Ok(None);
                }
                // a later move may already have taken the card elsewhere
                match self.hierarchy.parent_of(Node::Card(card))? {
                    Some(Node::CardContent(to)) => Some(StructuralChange::CardMoved { card, from, to }),
                    _ => None,
                }
            }
            change => Some(change),
        })
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&PropagationEngine<'_, H>, &mut ResourceStore) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut store = self.store.write();
        let engine = self.engine();
        // a rejected batch stays queued and must not fail the caller's operation
        if let Err(e) = self.apply_pending(&engine, &mut store) {
            tracing::warn!("Structural changes deferred: {e}");
        }
        f(&engine, &mut store)
    }

    fn require_node(&self, node: Node) -> Result<(), EngineError> {
        if self.hierarchy.contains(node) {
            Ok(())
        } else {
            Err(EngineError::NotFound(Missing::Node(node)))
        }
    }

    /// # Errors
    /// See [`PropagationEngine::create_resource`]
    pub fn create_resource(&self, owner: Node, data: ResourceData) -> Result<AbstractResourceId, EngineError> {
        self.write(|engine, store| engine.create_resource(store, owner, data))
    }

    /// # Errors
    /// See [`PropagationEngine::publish`]
    pub fn publish_resource(&self, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.write(|engine, store| engine.publish(store, id))
    }

    /// # Errors
    /// See [`PropagationEngine::unpublish`]
    pub fn unpublish_resource(&self, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.write(|engine, store| engine.unpublish(store, id))
    }

    /// # Errors
    /// See [`PropagationEngine::discard`]
    pub fn discard_resource_or_ref(&self, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.write(|engine, store| engine.discard(store, id))
    }

    /// # Errors
    /// See [`PropagationEngine::restore`]
    pub fn restore_resource_or_ref(&self, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.write(|engine, store| engine.restore(store, id))
    }

    /// # Errors
    /// See [`PropagationEngine::delete_resource`]
    pub fn delete_resource(&self, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.write(|engine, store| engine.delete_resource(store, id))
    }

    /// # Errors
    /// See [`PropagationEngine::update_resource`]
    pub fn update_resource(&self, id: AbstractResourceId, patch: &ResourcePatch) -> Result<(), EngineError> {
        self.write(|engine, store| engine.update_resource(store, id, patch))
    }

    /// # Errors
    /// See [`PropagationEngine::set_category`]
    pub fn set_category(&self, id: AbstractResourceId, name: Option<&str>) -> Result<(), EngineError> {
        self.write(|engine, store| engine.set_category(store, id, name))
    }

    /// # Errors
    /// Unknown anchor, or see [`PropagationEngine::rename_category`]
    pub fn rename_category(&self, anchor: Node, old: &str, new: &str) -> Result<usize, EngineError> {
        self.require_node(anchor)?;
        self.write(|engine, store| engine.rename_category(store, anchor, old, new))
    }

    /// Every lineage at `node`, each chain from the local entry to its resource
    ///
    /// # Errors
    /// Unknown node or a broken chain
    pub fn get_resource_chain(&self, node: Node) -> Result<Vec<Vec<AbstractResourceSummary>>, EngineError> {
        self.require_node(node)?;
        let store = self.store.read();
        resource_chain(&store, node)?
            .iter()
            .map(|chain| {
                chain
                    .entries()
                    .iter()
                    .map(|entry| AbstractResourceSummary::of(&store, entry))
                    .collect()
            })
            .collect()
    }

    /// Resources usable at `node`
    ///
    /// # Errors
    /// Unknown node or a broken chain
    pub fn get_available_active_resources(&self, node: Node) -> Result<Vec<ResourceSummary>, EngineError> {
        self.require_node(node)?;
        let store = self.store.read();
        resource_chain(&store, node)?
            .iter()
            .filter(|chain| chain.is_available())
            .map(|chain| ResourceSummary::of_chain(&store, chain))
            .collect()
    }

    /// Ids of the resources usable at `node`
    ///
    /// # Errors
    /// Unknown node or a broken chain
    pub fn available_resource_ids(&self, node: Node) -> Result<Vec<AbstractResourceId>, EngineError> {
        self.require_node(node)?;
        let store = self.store.read();
        Ok(available_active_resources(&store, node)?
            .into_iter()
            .map(Resource::id)
            .collect())
    }

    /// # Errors
    /// Unknown node or a broken chain
    pub fn list_categories(&self, node: Node) -> Result<Vec<String>, EngineError> {
        self.require_node(node)?;
        category::list_categories(&self.store.read(), node)
    }

    /// Resources physically anchored at `node`
    ///
    /// # Errors
    /// Unknown node
    pub fn direct_resources(&self, node: Node) -> Result<Vec<ResourceSummary>, EngineError> {
        self.require_node(node)?;
        let store = self.store.read();
        Ok(store
            .entries_at(node)
            .into_iter()
            .filter_map(|id| store.resource(id).ok())
            .map(|resource| ResourceSummary::of(resource, resource.category.clone()))
            .collect())
    }

    /// Every entry resolving to `resource`, resource first
    ///
    /// # Errors
    /// Unknown resource
    pub fn lineage(&self, resource: AbstractResourceId) -> Result<Vec<AbstractResourceSummary>, EngineError> {
        let store = self.store.read();
        store
            .lineage(resource)?
            .into_iter()
            .map(|id| AbstractResourceSummary::of(&store, store.get(id)?))
            .collect()
    }

    /// Committed store as of now
    #[must_use]
    pub fn snapshot(&self) -> ResourceStore {
        self.store.read().clone()
    }

    /// # Errors
    /// First inconsistency found in the committed store
    pub fn verify_integrity(&self) -> Result<IntegrityReport, EngineError> {
        Ok(self.store.read().verify_integrity()?)
    }
}
