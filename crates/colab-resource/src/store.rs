//! Arena of abstract resources.
//!
//! Entries are keyed by [`AbstractResourceId`] in persistent `im` maps, so a
//! clone of the whole store is O(1). Callers use that to mutate a draft and
//! swap it in only once a cascade has succeeded.
//!
//! Indexes kept alongside the entries:
//! - `by_owner`: node -> entries anchored there
//! - `downstream`: entry -> refs whose `target` is that entry
//! - `documents`: document -> resource it backs

use crate::error::StoreError;
use crate::model::{
    AbstractResource, AbstractResourceId, DocumentId, Resource, ResourceData, ResourcePatch,
    ResourceRef,
};
use colab_hierarchy::Node;
use im::{OrdMap, OrdSet};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Resource and reference arena
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceStore {
    pub(crate) entries: OrdMap<AbstractResourceId, AbstractResource>,
    pub(crate) by_owner: OrdMap<Node, OrdSet<AbstractResourceId>>,
    pub(crate) downstream: OrdMap<AbstractResourceId, OrdSet<AbstractResourceId>>,
    pub(crate) documents: OrdMap<DocumentId, AbstractResourceId>,
    next_id: u64,
}

impl ResourceStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: AbstractResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Entry by id
    ///
    /// # Errors
    /// [`StoreError::NotFound`]
    pub fn get(&self, id: AbstractResourceId) -> Result<&AbstractResource, StoreError> {
        self.entries.get(&id).ok_or(StoreError::NotFound(id))
    }

    /// Resource by id
    ///
    /// # Errors
    /// Missing entry or a ref
    pub fn resource(&self, id: AbstractResourceId) -> Result<&Resource, StoreError> {
        self.get(id)?
            .as_resource()
            .ok_or(StoreError::NotAResource(id))
    }

    /// Ref by id
    ///
    /// # Errors
    /// Missing entry or a resource
    pub fn resource_ref(&self, id: AbstractResourceId) -> Result<&ResourceRef, StoreError> {
        self.get(id)?
            .as_resource_ref()
            .ok_or(StoreError::NotARef(id))
    }

    /// Every entry, by id
    pub fn iter(&self) -> impl Iterator<Item = &AbstractResource> {
        self.entries.values()
    }

    /// Every resource, by id
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entries.values().filter_map(AbstractResource::as_resource)
    }

    /// Nodes holding at least one entry
    #[must_use]
    pub fn anchored_nodes(&self) -> Vec<Node> {
        self.by_owner.keys().copied().collect()
    }

    /// Entries anchored at `node`, by id
    #[must_use]
    pub fn entries_at(&self, node: Node) -> Vec<AbstractResourceId> {
        self.by_owner
            .get(&node)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Refs pointing directly at `id`, by id
    #[must_use]
    pub fn downstream(&self, id: AbstractResourceId) -> Vec<AbstractResourceId> {
        self.downstream
            .get(&id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Resource a document is attached to
    #[must_use]
    pub fn document_owner(&self, document: DocumentId) -> Option<AbstractResourceId> {
        self.documents.get(&document).copied()
    }

    /// Terminal resource of the chain starting at `id`
    ///
    /// # Errors
    /// Missing entry, dangling target, or a chain that never terminates
    pub fn resolve(&self, id: AbstractResourceId) -> Result<AbstractResourceId, StoreError> {
        self.chain(id)
            .map(|chain| chain.last().map_or(id, |entry| entry.id()))
    }

    /// `id` followed by every upstream entry up to and including the resource
    ///
    /// # Errors
    /// Missing entry, dangling target, or a chain that never terminates
    pub fn chain(&self, id: AbstractResourceId) -> Result<Vec<&AbstractResource>, StoreError> {
        let mut current = self.get(id)?;
        let mut chain = vec![current];
        while let Some(target) = current.target() {
            if chain.len() > self.entries.len() {
                return Err(StoreError::CyclicChain(id));
            }
            current = self
                .entries
                .get(&target)
                .ok_or(StoreError::DanglingTarget {
                    id: current.id(),
                    target,
                })?;
            chain.push(current);
        }
        Ok(chain)
    }

    /// Entry at `node` whose chain resolves to `resource`
    ///
    /// # Errors
    /// Propagates chain walk failures
    pub fn entry_in_lineage(
        &self,
        node: Node,
        resource: AbstractResourceId,
    ) -> Result<Option<AbstractResourceId>, StoreError> {
        for id in self.entries_at(node) {
            if self.resolve(id)? == resource {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// `id` and every entry downstream of it, breadth-first
    ///
    /// # Errors
    /// [`StoreError::NotFound`]
    pub fn downstream_closure(
        &self,
        id: AbstractResourceId,
    ) -> Result<Vec<AbstractResourceId>, StoreError> {
        self.get(id)?;
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            out.push(current);
            queue.extend(self.downstream(current));
        }
        Ok(out)
    }

    /// Every entry resolving to `resource`, the resource first
    ///
    /// # Errors
    /// Missing entry or a ref
    pub fn lineage(&self, resource: AbstractResourceId) -> Result<Vec<AbstractResourceId>, StoreError> {
        self.resource(resource)?;
        self.downstream_closure(resource)
    }

    fn allocate(&mut self) -> AbstractResourceId {
        self.next_id += 1;
        AbstractResourceId(self.next_id)
    }

    fn put(&mut self, entry: AbstractResource) {
        let (id, owner) = (entry.id(), entry.owner());
        self.entries.insert(id, entry);
        let mut ids = self.by_owner.get(&owner).cloned().unwrap_or_default();
        ids.insert(id);
        self.by_owner.insert(owner, ids);
    }

    fn unlink_owner(&mut self, owner: Node, id: AbstractResourceId) {
        if let Some(mut ids) = self.by_owner.get(&owner).cloned() {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_owner.remove(&owner);
            } else {
                self.by_owner.insert(owner, ids);
            }
        }
    }

    fn link_downstream(&mut self, target: AbstractResourceId, id: AbstractResourceId) {
        let mut ids = self.downstream.get(&target).cloned().unwrap_or_default();
        ids.insert(id);
        self.downstream.insert(target, ids);
    }

    fn unlink_downstream(&mut self, target: AbstractResourceId, id: AbstractResourceId) {
        if let Some(mut ids) = self.downstream.get(&target).cloned() {
            ids.remove(&id);
            if ids.is_empty() {
                self.downstream.remove(&target);
            } else {
                self.downstream.insert(target, ids);
            }
        }
    }

    fn resource_mut(&mut self, id: AbstractResourceId) -> Result<&mut Resource, StoreError> {
        match self.entries.get_mut(&id) {
            Some(AbstractResource::Resource(r)) => Ok(r),
            Some(AbstractResource::Ref(_)) => Err(StoreError::NotAResource(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn ref_mut(&mut self, id: AbstractResourceId) -> Result<&mut ResourceRef, StoreError> {
        match self.entries.get_mut(&id) {
            Some(AbstractResource::Ref(r)) => Ok(r),
            Some(AbstractResource::Resource(_)) => Err(StoreError::NotARef(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Insert a new, unpublished resource at `owner`
    ///
    /// # Errors
    /// A document already attached elsewhere or listed twice
    pub fn insert_resource(
        &mut self,
        owner: Node,
        data: ResourceData,
    ) -> Result<AbstractResourceId, StoreError> {
        let mut listed = BTreeSet::new();
        for document in &data.documents {
            if let Some(resource) = self.document_owner(*document) {
                return Err(StoreError::DocumentAlreadyAttached {
                    document: *document,
                    resource,
                });
            }
            if !listed.insert(*document) {
                return Err(StoreError::DuplicateDocument(*document));
            }
        }

        let id = self.allocate();
        for document in listed {
            self.documents.insert(document, id);
        }
        self.put(AbstractResource::Resource(Resource::new(id, owner, data)));
        Ok(id)
    }

    /// Insert an active ref at `owner` pointing at `target`
    ///
    /// # Errors
    /// Unknown target, or `owner` already holds an entry of that lineage
    pub fn insert_ref(
        &mut self,
        owner: Node,
        target: AbstractResourceId,
    ) -> Result<AbstractResourceId, StoreError> {
        let resource = self.resolve(target)?;
        if let Some(existing) = self.entry_in_lineage(owner, resource)? {
            return Err(StoreError::DuplicateLineage {
                node: owner,
                resource,
                existing,
            });
        }

        let id = self.allocate();
        self.put(AbstractResource::Ref(ResourceRef::new(id, owner, target)));
        self.link_downstream(target, id);
        Ok(id)
    }

    /// Point a ref at another upstream entry of the same lineage
    ///
    /// # Errors
    /// Unknown ids, a different lineage, or a target downstream of `id`
    pub fn retarget(
        &mut self,
        id: AbstractResourceId,
        target: AbstractResourceId,
    ) -> Result<(), StoreError> {
        let old = self.resource_ref(id)?.target();
        if old == target {
            return Ok(());
        }
        if self.chain(target)?.iter().any(|entry| entry.id() == id) {
            return Err(StoreError::CyclicChain(id));
        }
        let resource = self.resolve(id)?;
        if self.resolve(target)? != resource {
            return Err(StoreError::LineageMismatch {
                id,
                target,
                resource,
            });
        }

        self.ref_mut(id)?.set_target(target);
        self.unlink_downstream(old, id);
        self.link_downstream(target, id);
        Ok(())
    }

    /// Returns whether the flag changed
    ///
    /// # Errors
    /// Unknown id or a resource
    pub fn set_residual(&mut self, id: AbstractResourceId, residual: bool) -> Result<bool, StoreError> {
        let r = self.ref_mut(id)?;
        let changed = r.residual != residual;
        r.residual = residual;
        Ok(changed)
    }

    /// Stamp (or clear) the discard a ref is refused by
    ///
    /// # Errors
    /// Unknown id or a resource
    pub fn set_refused_by(
        &mut self,
        id: AbstractResourceId,
        refused_by: Option<AbstractResourceId>,
    ) -> Result<(), StoreError> {
        self.ref_mut(id)?.refused_by = refused_by;
        Ok(())
    }

    /// Returns whether the flag changed
    ///
    /// # Errors
    /// Unknown id or a ref
    pub fn set_published(&mut self, id: AbstractResourceId, published: bool) -> Result<bool, StoreError> {
        let r = self.resource_mut(id)?;
        let changed = r.published != published;
        r.published = published;
        Ok(changed)
    }

    /// # Errors
    /// [`StoreError::NotFound`]
    pub fn set_category(
        &mut self,
        id: AbstractResourceId,
        category: Option<String>,
    ) -> Result<(), StoreError> {
        let entry = self.entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        *entry.category_mut() = category;
        Ok(())
    }

    /// # Errors
    /// Unknown id or a ref
    pub fn update_resource(
        &mut self,
        id: AbstractResourceId,
        patch: &ResourcePatch,
    ) -> Result<(), StoreError> {
        patch.apply(self.resource_mut(id)?);
        Ok(())
    }

    /// Remove `id` and everything downstream of it; returns the removed entries
    ///
    /// # Errors
    /// [`StoreError::NotFound`]
    pub fn remove_closure(
        &mut self,
        id: AbstractResourceId,
    ) -> Result<Vec<AbstractResource>, StoreError> {
        let ids = self.downstream_closure(id)?;
        if let Some(target) = self.get(id)?.target() {
            self.unlink_downstream(target, id);
        }

        let mut removed = Vec::with_capacity(ids.len());
        for current in ids {
            if let Some(entry) = self.entries.remove(&current) {
                self.unlink_owner(entry.owner(), current);
                self.downstream.remove(&current);
                if let AbstractResource::Resource(r) = &entry {
                    for document in r.documents() {
                        self.documents.remove(document);
                    }
                }
                removed.push(entry);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colab_hierarchy::{CardContentId, CardId};
    use pretty_assertions::assert_eq;

    fn card() -> Node {
        Node::Card(CardId::new())
    }

    fn content() -> Node {
        Node::CardContent(CardContentId::new())
    }

    /// resource at a card, one ref at a content, one at a sub-card
    fn chain_of_three(store: &mut ResourceStore) -> (AbstractResourceId, AbstractResourceId, AbstractResourceId) {
        let r = store.insert_resource(card(), ResourceData::new("r")).unwrap();
        let a = store.insert_ref(content(), r).unwrap();
        let b = store.insert_ref(card(), a).unwrap();
        (r, a, b)
    }

    #[test]
    fn chain_walks_to_the_resource() {
        let mut store = ResourceStore::new();
        let (r, a, b) = chain_of_three(&mut store);

        let ids: Vec<_> = store.chain(b).unwrap().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![b, a, r]);
        assert_eq!(store.resolve(b).unwrap(), r);
        assert_eq!(store.resolve(r).unwrap(), r);
        assert_eq!(store.lineage(r).unwrap(), vec![r, a, b]);
    }

    #[test]
    fn one_entry_per_lineage_per_node() {
        let mut store = ResourceStore::new();
        let r = store.insert_resource(card(), ResourceData::new("r")).unwrap();
        let node = content();
        let a = store.insert_ref(node, r).unwrap();

        let err = store.insert_ref(node, r).unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateLineage {
                node,
                resource: r,
                existing: a
            }
        );

        // another lineage at the same node is fine
        let other = store.insert_resource(card(), ResourceData::new("o")).unwrap();
        store.insert_ref(node, other).unwrap();
        assert_eq!(store.entries_at(node).len(), 2);
    }

    #[test]
    fn documents_back_one_resource() {
        let mut store = ResourceStore::new();
        let doc = DocumentId::new();
        let r = store
            .insert_resource(card(), ResourceData::new("r").with_document(doc))
            .unwrap();

        let err = store
            .insert_resource(card(), ResourceData::new("again").with_document(doc))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DocumentAlreadyAttached {
                document: doc,
                resource: r
            }
        );

        let twice = DocumentId::new();
        let err = store
            .insert_resource(
                card(),
                ResourceData::new("twice").with_document(twice).with_document(twice),
            )
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateDocument(twice));
        assert_eq!(store.document_owner(twice), None);
    }

    #[test]
    fn retarget_moves_the_downstream_edge() {
        let mut store = ResourceStore::new();
        let (r, a, b) = chain_of_three(&mut store);

        store.retarget(b, r).unwrap();
        assert_eq!(store.resource_ref(b).unwrap().target(), r);
        assert!(store.downstream(a).is_empty());
        assert_eq!(store.downstream(r), vec![a, b]);
        store.verify_integrity().unwrap();
    }

    #[test]
    fn retarget_rejects_cycles_and_foreign_lineages() {
        let mut store = ResourceStore::new();
        let (_, a, b) = chain_of_three(&mut store);
        assert_eq!(store.retarget(a, b), Err(StoreError::CyclicChain(a)));

        let other = store.insert_resource(card(), ResourceData::new("o")).unwrap();
        assert!(matches!(
            store.retarget(b, other),
            Err(StoreError::LineageMismatch { .. })
        ));
    }

    #[test]
    fn remove_closure_drops_descendants_and_documents() {
        let mut store = ResourceStore::new();
        let doc = DocumentId::new();
        let r = store
            .insert_resource(card(), ResourceData::new("r").with_document(doc))
            .unwrap();
        let a = store.insert_ref(content(), r).unwrap();
        let b = store.insert_ref(card(), a).unwrap();
        let sibling = store.insert_ref(content(), r).unwrap();

        let removed = store.remove_closure(a).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!store.contains(b));
        assert_eq!(store.downstream(r), vec![sibling]);

        store.remove_closure(r).unwrap();
        assert!(store.is_empty());
        assert!(store.anchored_nodes().is_empty());
        assert_eq!(store.document_owner(doc), None);
    }

    #[test]
    fn draft_changes_stay_off_the_snapshot() {
        let mut store = ResourceStore::new();
        let (r, a, _) = chain_of_three(&mut store);
        let snapshot = store.clone();

        store.set_residual(a, true).unwrap();
        store.set_published(r, true).unwrap();
        store.remove_closure(a).unwrap();

        assert!(snapshot.contains(a));
        assert!(!snapshot.get(a).unwrap().is_residual());
        assert!(!snapshot.resource(r).unwrap().published);
        assert_ne!(snapshot, store);
    }

    #[test]
    fn flag_setters_check_the_entry_kind() {
        let mut store = ResourceStore::new();
        let (r, a, _) = chain_of_three(&mut store);

        assert_eq!(store.set_residual(r, true), Err(StoreError::NotARef(r)));
        assert_eq!(store.set_published(a, true), Err(StoreError::NotAResource(a)));
        assert!(store.set_residual(a, true).unwrap());
        assert!(!store.set_residual(a, true).unwrap());

        store.set_category(a, Some("docs".into())).unwrap();
        assert_eq!(store.get(a).unwrap().category(), Some("docs"));
    }

    proptest::proptest! {
        #[test]
        fn random_chains_keep_indexes_in_sync(
            picks in proptest::collection::vec((0..64usize, proptest::bool::ANY), 1..60),
            removals in proptest::collection::vec(0..64usize, 0..5),
        ) {
            let mut store = ResourceStore::new();
            let mut ids = vec![store.insert_resource(card(), ResourceData::new("root")).unwrap()];
            for (pick, new_resource) in picks {
                let id = if new_resource {
                    store.insert_resource(card(), ResourceData::new("r")).unwrap()
                } else {
                    store.insert_ref(content(), ids[pick % ids.len()]).unwrap()
                };
                ids.push(id);
            }

            for pick in removals {
                let id = ids[pick % ids.len()];
                if store.contains(id) {
                    store.remove_closure(id).unwrap();
                }
            }

            let report = store.verify_integrity().unwrap();
            proptest::prop_assert_eq!(report.resources + report.refs, store.len());
        }
    }
}
