//! Propagation engine.
//!
//! Keeps every node aware of the resources attached above it by creating,
//! re-pointing and flagging [`ResourceRef`](colab_resource::ResourceRef)s.
//!
//! Every public operation runs as one transaction: a draft of the store is
//! mutated and swapped in only when the whole cascade succeeded.
//!
//! A lineage is brought up to date by [`Cascade::reconcile`] in two passes:
//! - grow: breadth-first from the resource over passing entries (reached,
//!   not refused) and open gates, creating missing refs and re-pointing refs
//!   whose upstream entry is no longer a live source
//! - settle: along the existing chains, `residual` is set exactly when some
//!   link above is closed (gate shut, or the edge left the hierarchy). An
//!   unpublished lineage therefore keeps its card to content refs active;
//!   only refs below a content to sub-card gate turn residual.
//!
//! Refusal is tracked separately through `refused_by` stamps.

use crate::category;
use crate::config::EngineConfig;
use crate::error::{EngineError, Missing};
use colab_hierarchy::{CardContentId, CardId, HierarchyView, Node, StructuralChange};
use colab_resource::{AbstractResource, AbstractResourceId, ResourceData, ResourcePatch, ResourceStore};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// What a committed operation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeStats {
    /// Refs inserted
    pub created: usize,
    /// Refs re-pointed at a different upstream entry
    pub retargeted: usize,
    /// Refs whose `residual` flag was cleared
    pub activated: usize,
    /// Refs whose `residual` flag was set
    pub residualized: usize,
    /// Refs stamped by a discard
    pub refused: usize,
    /// Refs whose refusal stamp was lifted
    pub restored: usize,
    /// Entries deleted
    pub removed: usize,
}

impl CascadeStats {
    /// Whether nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Accumulate another operation's counts
    pub fn add(&mut self, other: &Self) {
        self.created += other.created;
        self.retargeted += other.retargeted;
        self.activated += other.activated;
        self.residualized += other.residualized;
        self.refused += other.refused;
        self.restored += other.restored;
        self.removed += other.removed;
    }
}

/// Reacts to resource lifecycle calls and hierarchy changes
#[derive(Debug)]
pub struct PropagationEngine<'h, H: ?Sized> {
    hierarchy: &'h H,
    config: EngineConfig,
}

impl<'h, H: HierarchyView + ?Sized> PropagationEngine<'h, H> {
    /// Engine reading structure from `hierarchy`
    #[must_use]
    pub fn new(hierarchy: &'h H, config: EngineConfig) -> Self {
        Self { hierarchy, config }
    }

    /// Limits in force
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hierarchy the engine reads
    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> &'h H {
        self.hierarchy
    }

    fn transact<T>(
        &self,
        store: &mut ResourceStore,
        operation: &str,
        f: impl FnOnce(&mut Cascade<'_, H>) -> Result<T, EngineError>,
    ) -> Result<(T, CascadeStats), EngineError> {
        let mut cascade = Cascade {
            hierarchy: self.hierarchy,
            config: &self.config,
            store: store.clone(),
            stats: CascadeStats::default(),
        };
        match f(&mut cascade) {
            Ok(value) => {
                tracing::debug!("{operation} committed: {:?}", cascade.stats);
                *store = cascade.store;
                Ok((value, cascade.stats))
            }
            Err(e) => {
                tracing::warn!("{operation} rejected: {e}");
                Err(e)
            }
        }
    }

    /// Attach a new, unpublished resource to `owner` and propagate it along
    /// unconditional edges.
    ///
    /// # Errors
    /// [`EngineError::RelatedObjectNotFound`] for an unknown owner,
    /// `DataIntegrity` for a document that already backs a resource or an
    /// invalid category
    pub fn create_resource(
        &self,
        store: &mut ResourceStore,
        owner: Node,
        mut data: ResourceData,
    ) -> Result<AbstractResourceId, EngineError> {
        let (id, _) = self.transact(store, "create resource", |c| {
            if !c.hierarchy.contains(owner) {
                return Err(EngineError::RelatedObjectNotFound(owner));
            }
            data.category = category::normalize(data.category.as_deref(), c.config.max_category_len)?;
            let id = c.store.insert_resource(owner, data)?;
            c.reconcile(id)?;
            Ok(id)
        })?;
        tracing::info!("Created {id} at {owner}");
        Ok(id)
    }

    /// Publish a resource and open every gated edge of its lineage.
    ///
    /// # Errors
    /// Unknown id, or `id` is a ref
    pub fn publish(&self, store: &mut ResourceStore, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.set_published(store, id, true)
    }

    /// Unpublish a resource; refs behind a gated edge turn residual and stay.
    ///
    /// Refs reached only through unconditional card to content edges stay
    /// active rather than every ref of the lineage turning residual. They are
    /// the same refs `create_resource` makes for an unpublished resource.
    ///
    /// # Errors
    /// Unknown id, or `id` is a ref
    pub fn unpublish(&self, store: &mut ResourceStore, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        self.set_published(store, id, false)
    }

    fn set_published(
        &self,
        store: &mut ResourceStore,
        id: AbstractResourceId,
        published: bool,
    ) -> Result<CascadeStats, EngineError> {
        let operation = if published { "publish" } else { "unpublish" };
        let (_, stats) = self.transact(store, operation, |c| {
            c.store.set_published(id, published)?;
            c.reconcile(id)
        })?;
        tracing::info!(
            "{operation} {id}: {} created, {} activated, {} residual",
            stats.created,
            stats.activated,
            stats.residualized
        );
        Ok(stats)
    }

    /// Refuse a ref and everything inherited through it.
    ///
    /// Discarding an already discarded ref changes nothing.
    ///
    /// # Errors
    /// Unknown id, or `id` is a resource
    pub fn discard(&self, store: &mut ResourceStore, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        let (_, stats) = self.transact(store, "discard", |c| c.discard(id))?;
        tracing::info!("Discarded {id} ({} refs refused)", stats.refused);
        Ok(stats)
    }

    /// Lift a discard and catch up on what was missed meanwhile.
    ///
    /// # Errors
    /// Unknown id, a resource, or a ref refused by an upstream discard
    pub fn restore(&self, store: &mut ResourceStore, id: AbstractResourceId) -> Result<CascadeStats, EngineError> {
        let (_, stats) = self.transact(store, "restore", |c| c.restore(id))?;
        tracing::info!(
            "Restored {id} ({} refs restored, {} created)",
            stats.restored,
            stats.created
        );
        Ok(stats)
    }

    /// Delete a resource with its whole lineage.
    ///
    /// # Errors
    /// Unknown id, or `id` is a ref
    pub fn delete_resource(
        &self,
        store: &mut ResourceStore,
        id: AbstractResourceId,
    ) -> Result<CascadeStats, EngineError> {
        let (_, stats) = self.transact(store, "delete", |c| {
            c.store.resource(id)?;
            let removed = c.store.remove_closure(id)?;
            c.stats.removed += removed.len();
            Ok(())
        })?;
        tracing::info!("Deleted {id} ({} entries removed)", stats.removed);
        Ok(stats)
    }

    /// Edit descriptive fields of a resource
    ///
    /// # Errors
    /// Unknown id, or `id` is a ref
    pub fn update_resource(
        &self,
        store: &mut ResourceStore,
        id: AbstractResourceId,
        patch: &ResourcePatch,
    ) -> Result<(), EngineError> {
        self.transact(store, "update", |c| Ok(c.store.update_resource(id, patch)?))?;
        tracing::info!("Updated {id}");
        Ok(())
    }

    /// Set or clear the explicit category of a resource or ref
    ///
    /// # Errors
    /// Unknown id or an over-long name
    pub fn set_category(
        &self,
        store: &mut ResourceStore,
        id: AbstractResourceId,
        name: Option<&str>,
    ) -> Result<(), EngineError> {
        self.transact(store, "set category", |c| {
            let name = category::normalize(name, c.config.max_category_len)?;
            Ok(c.store.set_category(id, name)?)
        })?;
        Ok(())
    }

    /// Rename a category at `anchor` and below; returns the entries rewritten
    ///
    /// # Errors
    /// Empty or over-long new name
    pub fn rename_category(
        &self,
        store: &mut ResourceStore,
        anchor: Node,
        old: &str,
        new: &str,
    ) -> Result<usize, EngineError> {
        let (renamed, _) = self.transact(store, "rename category", |c| {
            category::rename(&mut c.store, anchor, old, new, c.config.max_category_len)
        })?;
        tracing::info!("Renamed category {old:?} to {new:?} at {anchor} ({renamed} entries)");
        Ok(renamed)
    }

    /// A card appeared under `parent`.
    ///
    /// # Errors
    /// Unknown card or a cascade failure
    pub fn on_card_created(
        &self,
        store: &mut ResourceStore,
        card: CardId,
        parent: CardContentId,
    ) -> Result<CascadeStats, EngineError> {
        let (_, stats) = self.transact(store, "card created", |c| c.catch_up(Node::Card(card)))?;
        tracing::info!("Card {card} created under {parent}: {} refs created", stats.created);
        Ok(stats)
    }

    /// A content variant was added to `card`.
    ///
    /// # Errors
    /// Unknown content or a cascade failure
    pub fn on_card_content_created(
        &self,
        store: &mut ResourceStore,
        content: CardContentId,
        card: CardId,
    ) -> Result<CascadeStats, EngineError> {
        let (_, stats) =
            self.transact(store, "content created", |c| c.catch_up(Node::CardContent(content)))?;
        tracing::info!("Content {content} created on {card}: {} refs created", stats.created);
        Ok(stats)
    }

    /// `card` moved from `from` to `to`.
    ///
    /// Lineages lost with the old parent turn residual, lineages gained with
    /// the new one are created, lineages present under both are re-pointed in
    /// place.
    ///
    /// # Errors
    /// `DataIntegrity` if `to` lies inside the card's own subtree
    pub fn on_card_moved(
        &self,
        store: &mut ResourceStore,
        card: CardId,
        from: CardContentId,
        to: CardContentId,
    ) -> Result<CascadeStats, EngineError> {
        let (_, stats) = self.transact(store, "move", |c| {
            let node = Node::Card(card);
            c.require_node(node)?;
            if c.hierarchy.is_ancestor_or_self(node, Node::CardContent(to))? {
                return Err(EngineError::integrity(format!(
                    "cannot move {card} beneath its own descendant {to}"
                )));
            }
            let mut nodes = vec![node, Node::CardContent(from)];
            nodes.extend(c.hierarchy.propagation_sources(node)?);
            c.reconcile_lineages_at(&nodes)
        })?;
        tracing::info!(
            "Moved {card} from {from} to {to}: {} created, {} residual, {} activated",
            stats.created,
            stats.residualized,
            stats.activated
        );
        Ok(stats)
    }

    /// Nodes left the hierarchy; everything anchored there goes with them.
    ///
    /// # Errors
    /// Cascade failure
    pub fn on_nodes_removed(
        &self,
        store: &mut ResourceStore,
        nodes: &[Node],
    ) -> Result<CascadeStats, EngineError> {
        let (_, stats) = self.transact(store, "nodes removed", |c| c.remove_nodes(nodes))?;
        tracing::info!("{} nodes removed: {} entries dropped", nodes.len(), stats.removed);
        Ok(stats)
    }

    /// Dispatch a hierarchy notification
    ///
    /// # Errors
    /// Whatever the matching handler returns
    pub fn on_structural_change(
        &self,
        store: &mut ResourceStore,
        change: &StructuralChange,
    ) -> Result<CascadeStats, EngineError> {
        match change {
            StructuralChange::CardCreated { card, parent } => self.on_card_created(store, *card, *parent),
            StructuralChange::CardContentCreated { content, card } => {
                self.on_card_content_created(store, *content, *card)
            }
            StructuralChange::CardMoved { card, from, to } => self.on_card_moved(store, *card, *from, *to),
            StructuralChange::NodesRemoved { nodes } => self.on_nodes_removed(store, nodes),
        }
    }
}

/// Draft state of one transaction
struct Cascade<'a, H: ?Sized> {
    hierarchy: &'a H,
    config: &'a EngineConfig,
    store: ResourceStore,
    stats: CascadeStats,
}

impl<H: HierarchyView + ?Sized> Cascade<'_, H> {
    fn require_node(&self, node: Node) -> Result<(), EngineError> {
        if self.hierarchy.contains(node) {
            Ok(())
        } else {
            Err(EngineError::NotFound(Missing::Node(node)))
        }
    }

    /// Resources with an entry at any of `nodes`
    fn lineages_at(&self, nodes: &[Node]) -> Result<BTreeSet<AbstractResourceId>, EngineError> {
        let mut lineages = BTreeSet::new();
        for node in nodes {
            for id in self.store.entries_at(*node) {
                lineages.insert(self.store.resolve(id)?);
            }
        }
        Ok(lineages)
    }

    fn reconcile_lineages_at(&mut self, nodes: &[Node]) -> Result<(), EngineError> {
        for resource in self.lineages_at(nodes)? {
            self.reconcile(resource)?;
        }
        Ok(())
    }

    /// Bring a freshly attached node up to date with everything above it
    fn catch_up(&mut self, node: Node) -> Result<(), EngineError> {
        self.require_node(node)?;
        let mut nodes = vec![node];
        nodes.extend(self.hierarchy.propagation_sources(node)?);
        self.reconcile_lineages_at(&nodes)
    }

    fn reconcile(&mut self, resource: AbstractResourceId) -> Result<(), EngineError> {
        let published = self.store.resource(resource)?.published;
        self.grow(resource, published)?;
        self.settle(resource, published)
    }

    fn grow(&mut self, resource: AbstractResourceId, published: bool) -> Result<(), EngineError> {
        let mut passing = HashSet::from([resource]);
        let mut queue = VecDeque::from([(resource, 0usize)]);

        while let Some((entry, depth)) = queue.pop_front() {
            let source = self.store.get(entry)?.owner();
            if !source.outgoing_gate().is_open(published) || !self.hierarchy.contains(source) {
                continue;
            }
            for target in self.hierarchy.direct_propagation_targets(source)? {
                let Some(next) = self.link(entry, target, resource, published, &passing)? else {
                    continue;
                };
                if depth >= self.config.max_cascade_depth {
                    return Err(EngineError::integrity(format!(
                        "cascade of {resource} exceeds depth {}",
                        self.config.max_cascade_depth
                    )));
                }
                passing.insert(next);
                queue.push_back((next, depth + 1));
            }
        }
        Ok(())
    }

    /// Entry of `resource` at `target` reached from `source_entry`;
    /// `None` where propagation stops
    fn link(
        &mut self,
        source_entry: AbstractResourceId,
        target: Node,
        resource: AbstractResourceId,
        published: bool,
        passing: &HashSet<AbstractResourceId>,
    ) -> Result<Option<AbstractResourceId>, EngineError> {
        let Some(existing) = self.store.entry_in_lineage(target, resource)? else {
            let id = self.store.insert_ref(target, source_entry)?;
            self.stats.created += 1;
            return Ok(Some(id));
        };
        if passing.contains(&existing) {
            return Ok(None);
        }

        let (upstream, stamp) = match self.store.get(existing)? {
            AbstractResource::Ref(r) => (r.target(), r.refused_by),
            AbstractResource::Resource(_) => return Ok(None),
        };
        if upstream != source_entry && !self.upstream_holds(upstream, target, published, passing)? {
            self.store.retarget(existing, source_entry)?;
            self.stats.retargeted += 1;
            // a refusal inherited from the old upstream stays behind with it
            if let Some(origin) = stamp.filter(|origin| *origin != existing) {
                self.lift_refusal(existing, origin)?;
                return Ok(Some(existing));
            }
        }
        // refused refs follow the hierarchy but pass nothing on
        Ok(stamp.is_none().then_some(existing))
    }

    /// Clear the stamps `origin` left on `entry` and below
    fn lift_refusal(&mut self, entry: AbstractResourceId, origin: AbstractResourceId) -> Result<(), EngineError> {
        for id in self.store.downstream_closure(entry)? {
            if self.store.resource_ref(id)?.refused_by == Some(origin) {
                self.store.set_refused_by(id, None)?;
                self.stats.restored += 1;
            }
        }
        Ok(())
    }

    /// Whether `upstream` is still a live source of `target`
    fn upstream_holds(
        &self,
        upstream: AbstractResourceId,
        target: Node,
        published: bool,
        passing: &HashSet<AbstractResourceId>,
    ) -> Result<bool, EngineError> {
        if !passing.contains(&upstream) {
            return Ok(false);
        }
        let owner = self.store.get(upstream)?.owner();
        Ok(owner.outgoing_gate().is_open(published)
            && self.hierarchy.propagation_sources(target)?.contains(&owner))
    }

    fn settle(&mut self, resource: AbstractResourceId, published: bool) -> Result<(), EngineError> {
        let mut live = HashSet::from([resource]);
        let mut sources = HashMap::new();

        // lineage order is breadth-first, so upstream entries are settled first
        for id in self.store.lineage(resource)? {
            let (owner, upstream) = match self.store.get(id)? {
                AbstractResource::Ref(r) => (r.owner(), r.target()),
                AbstractResource::Resource(_) => continue,
            };
            let upstream_owner = self.store.get(upstream)?.owner();
            let edge_live = live.contains(&upstream)
                && upstream_owner.outgoing_gate().is_open(published)
                && self.sources_of(owner, &mut sources)?.contains(&upstream_owner);
            if edge_live {
                live.insert(id);
            }
            if self.store.set_residual(id, !edge_live)? {
                if edge_live {
                    self.stats.activated += 1;
                } else {
                    self.stats.residualized += 1;
                }
            }
        }
        Ok(())
    }

    fn sources_of<'c>(
        &self,
        node: Node,
        cache: &'c mut HashMap<Node, Vec<Node>>,
    ) -> Result<&'c [Node], EngineError> {
        if !cache.contains_key(&node) {
            let found = if self.hierarchy.contains(node) {
                self.hierarchy.propagation_sources(node)?
            } else {
                Vec::new()
            };
            cache.insert(node, found);
        }
        Ok(cache.get(&node).map(Vec::as_slice).unwrap_or_default())
    }

    fn discard(&mut self, id: AbstractResourceId) -> Result<(), EngineError> {
        let previous = match self.store.get(id)? {
            AbstractResource::Ref(r) if r.explicitly_refused() => return Ok(()),
            AbstractResource::Ref(r) => r.refused_by,
            AbstractResource::Resource(_) => {
                return Err(EngineError::integrity(format!(
                    "{id} is a resource; only references can be discarded"
                )))
            }
        };

        // deeper, unrelated discards keep their own stamp
        for entry in self.store.downstream_closure(id)? {
            let stamp = self.store.resource_ref(entry)?.refused_by;
            if entry == id || stamp == previous {
                self.store.set_refused_by(entry, Some(id))?;
                self.stats.refused += 1;
            }
        }
        Ok(())
    }

    fn restore(&mut self, id: AbstractResourceId) -> Result<(), EngineError> {
        let upstream = match self.store.get(id)? {
            AbstractResource::Ref(r) => match r.refused_by {
                None => return Ok(()),
                Some(origin) if origin != id => {
                    return Err(EngineError::integrity(format!(
                        "{id} is refused through {origin}; restore {origin} instead"
                    )))
                }
                Some(_) => r.target(),
            },
            AbstractResource::Resource(_) => {
                return Err(EngineError::integrity(format!(
                    "{id} is a resource; only references can be restored"
                )))
            }
        };

        // refs below a later upstream discard stay refused, now through it
        let handover = self
            .store
            .get(upstream)?
            .as_resource_ref()
            .and_then(|r| r.refused_by);
        for entry in self.store.downstream_closure(id)? {
            if self.store.resource_ref(entry)?.refused_by == Some(id) {
                self.store.set_refused_by(entry, handover)?;
                self.stats.restored += 1;
            }
        }

        if handover.is_none() {
            let resource = self.store.resolve(id)?;
            self.reconcile(resource)?;
        }
        Ok(())
    }

    fn remove_nodes(&mut self, nodes: &[Node]) -> Result<(), EngineError> {
        let mut touched = BTreeSet::new();
        for node in nodes {
            for id in self.store.entries_at(*node) {
                if !self.store.contains(id) {
                    continue;
                }
                touched.insert(self.store.resolve(id)?);
                self.stats.removed += self.store.remove_closure(id)?.len();
            }
        }
        for resource in touched {
            if self.store.contains(resource) {
                self.reconcile(resource)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use colab_hierarchy::{InMemoryHierarchy, ProjectHandle};

    fn setup() -> (InMemoryHierarchy, ProjectHandle, ResourceStore) {
        let h = InMemoryHierarchy::new();
        let p = h.create_project();
        (h, p, ResourceStore::new())
    }

    fn engine(h: &InMemoryHierarchy) -> PropagationEngine<'_, InMemoryHierarchy> {
        PropagationEngine::new(h, EngineConfig::default())
    }

    /// Add a card under `parent` and notify the engine
    fn card(
        h: &InMemoryHierarchy,
        store: &mut ResourceStore,
        parent: CardContentId,
    ) -> (CardId, CardContentId) {
        let (card, content) = h.create_card(parent, None).unwrap();
        let e = engine(h);
        e.on_card_created(store, card, parent).unwrap();
        e.on_card_content_created(store, content, card).unwrap();
        (card, content)
    }

    fn entry(store: &ResourceStore, node: Node, resource: AbstractResourceId) -> Option<AbstractResourceId> {
        store.entry_in_lineage(node, resource).unwrap()
    }

    #[test]
    fn new_resource_reaches_contents_only() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (c2, _) = card(&h, &mut store, c1a);

        let r = engine(&h)
            .create_resource(&mut store, Node::Card(c1), ResourceData::new("r"))
            .unwrap();

        let at_content = entry(&store, Node::CardContent(c1a), r).unwrap();
        assert!(store.get(at_content).unwrap().is_active());
        assert_eq!(entry(&store, Node::Card(c2), r), None);
    }

    #[test]
    fn unknown_owner_is_a_related_object_error() {
        let (h, _, mut store) = setup();
        let err = engine(&h)
            .create_resource(&mut store, Node::Card(CardId::new()), ResourceData::new("r"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RelatedObjectNotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn publish_opens_gates_and_unpublish_keeps_residuals() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (c2, c2a) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();

        let stats = e.publish(&mut store, r).unwrap();
        assert_eq!(stats.created, 2);
        let at_c2 = entry(&store, Node::Card(c2), r).unwrap();
        let at_c2a = entry(&store, Node::CardContent(c2a), r).unwrap();

        e.unpublish(&mut store, r).unwrap();
        assert!(store.get(at_c2).unwrap().is_residual());
        assert!(store.get(at_c2a).unwrap().is_residual());
        let at_c1a = entry(&store, Node::CardContent(c1a), r).unwrap();
        assert!(!store.get(at_c1a).unwrap().is_residual());

        let stats = e.publish(&mut store, r).unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.activated, 2);
        assert_eq!(entry(&store, Node::Card(c2), r), Some(at_c2));
    }

    #[test]
    fn publishing_a_ref_is_rejected() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        let link = entry(&store, Node::CardContent(c1a), r).unwrap();

        let err = e.publish(&mut store, link).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn discard_blocks_and_restore_catches_up() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();
        let cut = entry(&store, Node::CardContent(c1a), r).unwrap();

        e.discard(&mut store, cut).unwrap();
        let (late, _) = card(&h, &mut store, c1a);
        assert_eq!(entry(&store, Node::Card(late), r), None);

        let stats = e.restore(&mut store, cut).unwrap();
        assert_eq!(stats.restored, 1);
        assert!(entry(&store, Node::Card(late), r).is_some());
    }

    #[test]
    fn inherited_refusal_cannot_be_restored_below() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (c2, _) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();
        let top = entry(&store, Node::CardContent(c1a), r).unwrap();
        let below = entry(&store, Node::Card(c2), r).unwrap();

        e.discard(&mut store, top).unwrap();
        assert_eq!(store.resource_ref(below).unwrap().refused_by, Some(top));

        let before = store.clone();
        let err = e.restore(&mut store, below).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        assert_eq!(store, before);
    }

    #[test]
    fn restore_hands_refusal_to_a_later_upstream_discard() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (c2, c2a) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();
        let upper = entry(&store, Node::CardContent(c1a), r).unwrap();
        let lower = entry(&store, Node::Card(c2), r).unwrap();
        let leaf = entry(&store, Node::CardContent(c2a), r).unwrap();

        e.discard(&mut store, lower).unwrap();
        e.discard(&mut store, upper).unwrap();
        assert_eq!(store.resource_ref(lower).unwrap().refused_by, Some(lower));

        e.restore(&mut store, lower).unwrap();
        assert_eq!(store.resource_ref(lower).unwrap().refused_by, Some(upper));
        assert_eq!(store.resource_ref(leaf).unwrap().refused_by, Some(upper));

        e.restore(&mut store, upper).unwrap();
        assert!(store.get(leaf).unwrap().is_active());
    }

    #[test]
    fn discarding_a_resource_is_rejected() {
        let (h, p, mut store) = setup();
        let (c1, _) = card(&h, &mut store, p.root_content);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        assert_eq!(e.discard(&mut store, r).unwrap_err().kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn move_residualizes_and_moving_back_reactivates() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (_, c3a) = card(&h, &mut store, p.root_content);
        let (c2, c2a) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();
        let at_c2 = entry(&store, Node::Card(c2), r).unwrap();
        let at_c2a = entry(&store, Node::CardContent(c2a), r).unwrap();

        h.move_card(c2, c3a).unwrap();
        e.on_card_moved(&mut store, c2, c1a, c3a).unwrap();
        assert!(store.get(at_c2).unwrap().is_residual());
        assert!(store.get(at_c2a).unwrap().is_residual());

        h.move_card(c2, c1a).unwrap();
        let stats = e.on_card_moved(&mut store, c2, c3a, c1a).unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(entry(&store, Node::Card(c2), r), Some(at_c2));
        assert!(store.get(at_c2).unwrap().is_active());
        assert!(store.get(at_c2a).unwrap().is_active());
    }

    #[test]
    fn move_into_a_reached_branch_repoints_in_place() {
        let (h, p, mut store) = setup();
        let (_, c1a) = card(&h, &mut store, p.root_content);
        let (_, c3a) = card(&h, &mut store, p.root_content);
        let (c2, _) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let root = Node::Card(p.root_card);
        let r = e.create_resource(&mut store, root, ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();
        let at_c2 = entry(&store, Node::Card(c2), r).unwrap();

        h.move_card(c2, c3a).unwrap();
        e.on_card_moved(&mut store, c2, c1a, c3a).unwrap();

        let moved = store.resource_ref(at_c2).unwrap();
        assert!(!moved.residual);
        assert_eq!(Some(moved.target()), entry(&store, Node::CardContent(c3a), r));
        store.verify_integrity().unwrap();
    }

    #[test]
    fn cycle_move_is_rejected_without_changes() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (_, c2a) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();

        let before = store.clone();
        let err = e.on_card_moved(&mut store, c1, p.root_content, c2a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        assert_eq!(store, before);
    }

    #[test]
    fn delete_removes_the_whole_lineage() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        card(&h, &mut store, c1a);
        let e = engine(&h);
        let r = e.create_resource(&mut store, Node::Card(c1), ResourceData::new("r")).unwrap();
        e.publish(&mut store, r).unwrap();

        let stats = e.delete_resource(&mut store, r).unwrap();
        assert_eq!(stats.removed, 4);
        assert!(store.is_empty());
    }

    #[test]
    fn types_reach_cards_through_type_refs() {
        let (h, p, mut store) = setup();
        let global = h.create_card_type(None).unwrap();
        let alias = h.create_card_type_ref(p.project, global.into()).unwrap();
        let (typed, _) = h.create_card(p.root_content, Some(alias.into())).unwrap();
        let e = engine(&h);

        let r = e
            .create_resource(&mut store, Node::CardType(global), ResourceData::new("template"))
            .unwrap();
        assert_eq!(entry(&store, Node::Card(typed), r), None);

        e.publish(&mut store, r).unwrap();
        let at_card = entry(&store, Node::Card(typed), r).unwrap();
        assert_eq!(store.resource_ref(at_card).unwrap().target(), r);
        assert_eq!(entry(&store, Node::CardTypeRef(alias), r), None);
    }

    #[test]
    fn removed_nodes_take_their_entries_along() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (c2, _) = card(&h, &mut store, c1a);
        let e = engine(&h);
        let root = e
            .create_resource(&mut store, Node::Card(p.root_card), ResourceData::new("root"))
            .unwrap();
        e.publish(&mut store, root).unwrap();
        let local = e.create_resource(&mut store, Node::Card(c2), ResourceData::new("local")).unwrap();

        let removed = h.remove_card(c1).unwrap();
        e.on_nodes_removed(&mut store, &removed).unwrap();

        assert!(!store.contains(local));
        assert_eq!(entry(&store, Node::Card(c1), root), None);
        assert_eq!(store.lineage(root).unwrap().len(), 2);
        store.verify_integrity().unwrap();
    }

    #[test]
    fn depth_limit_aborts_the_whole_cascade() {
        let (h, p, mut store) = setup();
        let (c1, c1a) = card(&h, &mut store, p.root_content);
        let (_, c2a) = card(&h, &mut store, c1a);
        card(&h, &mut store, c2a);
        let shallow = PropagationEngine::new(&h, EngineConfig::new().with_max_cascade_depth(2));
        let r = shallow
            .create_resource(&mut store, Node::Card(c1), ResourceData::new("r"))
            .unwrap();

        let before = store.clone();
        let err = shallow.publish(&mut store, r).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        assert_eq!(store, before);
    }
}
