//! In-memory hierarchy backed by a petgraph `DiGraphMap`.
//!
//! Edges carry a [`Link`]:
//! - `Contains`: content -> card, card -> content
//! - `TypeOf`: card type / type ref -> card
//! - `RefersTo`: type ref -> referenced type (or type ref)
//!
//! Every mutation that the propagation engine must react to is queued as a
//! [`StructuralChange`] and handed out through [`ChangeFeed`].

use crate::error::HierarchyError;
use crate::types::{CardContentId, CardId, CardTypeId, CardTypeRefId, Node, NodeKind, ProjectId};
use crate::view::{ChangeFeed, HierarchyView, StructuralChange};
use parking_lot::{Mutex, RwLock};
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Contains,
    TypeOf,
    RefersTo,
}

/// A project and its fixed root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHandle {
    /// Project id
    pub project: ProjectId,
    /// Untyped root card
    pub root_card: CardId,
    /// Single content of the root card
    pub root_content: CardContentId,
}

#[derive(Debug, Default)]
struct Inner {
    graph: DiGraphMap<Node, Link>,
    scopes: HashMap<Node, Option<ProjectId>>,
    projects: HashMap<ProjectId, ProjectHandle>,
    roots: HashSet<CardId>,
}

impl Inner {
    fn require(&self, node: Node) -> Result<(), HierarchyError> {
        if self.graph.contains_node(node) {
            Ok(())
        } else {
            Err(HierarchyError::NodeNotFound(node))
        }
    }

    fn require_project(&self, project: ProjectId) -> Result<(), HierarchyError> {
        if self.projects.contains_key(&project) {
            Ok(())
        } else {
            Err(HierarchyError::ProjectNotFound(project))
        }
    }

    fn scope(&self, node: Node) -> Option<ProjectId> {
        self.scopes.get(&node).copied().flatten()
    }

    fn neighbors(&self, node: Node, dir: Direction, link: Link) -> Vec<Node> {
        let mut out: Vec<Node> = self
            .graph
            .neighbors_directed(node, dir)
            .filter(|other| {
                let (from, to) = match dir {
                    Direction::Outgoing => (node, *other),
                    Direction::Incoming => (*other, node),
                };
                self.graph.edge_weight(from, to) == Some(&link)
            })
            .collect();
        out.sort();
        out
    }

    fn parent(&self, node: Node) -> Option<Node> {
        self.neighbors(node, Direction::Incoming, Link::Contains)
            .into_iter()
            .next()
    }

    fn type_of(&self, card: Node) -> Option<Node> {
        self.neighbors(card, Direction::Incoming, Link::TypeOf)
            .into_iter()
            .next()
    }

    /// `start` followed by every node it refers to, transitively
    fn type_chain(&self, start: Node) -> Vec<Node> {
        let mut chain = vec![start];
        let mut current = start;
        while let Some(next) = self
            .neighbors(current, Direction::Outgoing, Link::RefersTo)
            .into_iter()
            .next()
        {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Cards whose type chain contains `type_node`
    fn cards_using(&self, type_node: Node) -> Vec<Node> {
        let mut cards = Vec::new();
        let mut frontier = vec![type_node];
        let mut seen = HashSet::new();
        while let Some(t) = frontier.pop() {
            if !seen.insert(t) {
                continue;
            }
            cards.extend(self.neighbors(t, Direction::Outgoing, Link::TypeOf));
            frontier.extend(self.neighbors(t, Direction::Incoming, Link::RefersTo));
        }
        cards.sort();
        cards.dedup();
        cards
    }

    /// `root` and everything it contains, parents before children
    fn subtree(&self, root: Node) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut children = self.neighbors(node, Direction::Outgoing, Link::Contains);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    fn add(&mut self, node: Node, scope: Option<ProjectId>) {
        self.graph.add_node(node);
        self.scopes.insert(node, scope);
    }
}

/// Reference hierarchy collaborator.
///
/// Thread-safe through interior locking, the same way the kernel DAG is.
#[derive(Debug, Default)]
pub struct InMemoryHierarchy {
    inner: RwLock<Inner>,
    changes: Mutex<Vec<StructuralChange>>,
}

impl InMemoryHierarchy {
    /// Empty hierarchy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, change: StructuralChange) {
        self.changes.lock().push(change);
    }

    /// Create a project with its root card and root content
    pub fn create_project(&self) -> ProjectHandle {
        let handle = ProjectHandle {
            project: ProjectId::new(),
            root_card: CardId::new(),
            root_content: CardContentId::new(),
        };
        let mut g = self.inner.write();
        let card = Node::Card(handle.root_card);
        let content = Node::CardContent(handle.root_content);
        g.add(card, Some(handle.project));
        g.add(content, Some(handle.project));
        g.graph.add_edge(card, content, Link::Contains);
        g.projects.insert(handle.project, handle);
        g.roots.insert(handle.root_card);
        handle
    }

    /// Create a card type; `None` makes it global
    ///
    /// # Errors
    /// [`HierarchyError::ProjectNotFound`]
    pub fn create_card_type(&self, project: Option<ProjectId>) -> Result<CardTypeId, HierarchyError> {
        let mut g = self.inner.write();
        if let Some(p) = project {
            g.require_project(p)?;
        }
        let id = CardTypeId::new();
        g.add(Node::CardType(id), project);
        Ok(id)
    }

    /// Create a project-local reference to a type or type reference
    ///
    /// # Errors
    /// Unknown project or target, or a target that is not a type
    pub fn create_card_type_ref(
        &self,
        project: ProjectId,
        target: Node,
    ) -> Result<CardTypeRefId, HierarchyError> {
        let mut g = self.inner.write();
        g.require_project(project)?;
        g.require(target)?;
        if !target.is_type() {
            return Err(HierarchyError::NotAType(target));
        }
        let id = CardTypeRefId::new();
        let node = Node::CardTypeRef(id);
        g.add(node, Some(project));
        g.graph.add_edge(node, target, Link::RefersTo);
        Ok(id)
    }

    /// Create a card with its first content variant under `parent`.
    ///
    /// The type, if any, must belong to the parent's project; global and
    /// foreign types are used through a type reference.
    ///
    /// # Errors
    /// Unknown parent or type, non-type node, or scope mismatch
    pub fn create_card(
        &self,
        parent: CardContentId,
        card_type: Option<Node>,
    ) -> Result<(CardId, CardContentId), HierarchyError> {
        let card = CardId::new();
        let content = CardContentId::new();
        {
            let mut g = self.inner.write();
            let parent_node = Node::CardContent(parent);
            g.require(parent_node)?;
            let project = g
                .scope(parent_node)
                .ok_or(HierarchyError::NodeNotFound(parent_node))?;
            if let Some(t) = card_type {
                g.require(t)?;
                if !t.is_type() {
                    return Err(HierarchyError::NotAType(t));
                }
                if g.scope(t) != Some(project) {
                    return Err(HierarchyError::ScopeMismatch { node: t, project });
                }
            }

            g.add(Node::Card(card), Some(project));
            g.add(Node::CardContent(content), Some(project));
            g.graph.add_edge(parent_node, Node::Card(card), Link::Contains);
            g.graph
                .add_edge(Node::Card(card), Node::CardContent(content), Link::Contains);
            if let Some(t) = card_type {
                g.graph.add_edge(t, Node::Card(card), Link::TypeOf);
            }
        }
        self.record(StructuralChange::CardCreated { card, parent });
        self.record(StructuralChange::CardContentCreated { content, card });
        Ok((card, content))
    }

    /// Add a content variant to a card
    ///
    /// # Errors
    /// [`HierarchyError::NodeNotFound`]
    pub fn create_card_content(&self, card: CardId) -> Result<CardContentId, HierarchyError> {
        let content = CardContentId::new();
        {
            let mut g = self.inner.write();
            let card_node = Node::Card(card);
            g.require(card_node)?;
            let scope = g.scope(card_node);
            g.add(Node::CardContent(content), scope);
            g.graph
                .add_edge(card_node, Node::CardContent(content), Link::Contains);
        }
        self.record(StructuralChange::CardContentCreated { content, card });
        Ok(content)
    }

    /// Move a card under another content of the same project.
    ///
    /// Moving to the current parent is a no-op and records nothing.
    ///
    /// # Errors
    /// Unknown nodes, root card, scope mismatch, or a cycle
    pub fn move_card(&self, card: CardId, new_parent: CardContentId) -> Result<(), HierarchyError> {
        let from = {
            let mut g = self.inner.write();
            let card_node = Node::Card(card);
            let to_node = Node::CardContent(new_parent);
            g.require(card_node)?;
            g.require(to_node)?;
            if g.roots.contains(&card) {
                return Err(HierarchyError::RootCard(card));
            }
            if let Some(project) = g.scope(card_node) {
                if g.scope(to_node) != Some(project) {
                    return Err(HierarchyError::ScopeMismatch { node: to_node, project });
                }
            }
            if has_path_connecting(&g.graph, card_node, to_node, None) {
                return Err(HierarchyError::CycleDetected {
                    card,
                    parent: new_parent,
                });
            }
            let from_node = g
                .parent(card_node)
                .ok_or(HierarchyError::RootCard(card))?;
            if from_node == to_node {
                return Ok(());
            }
            g.graph.remove_edge(from_node, card_node);
            g.graph.add_edge(to_node, card_node, Link::Contains);
            from_node
                .as_card_content()
                .ok_or(HierarchyError::NodeNotFound(from_node))?
        };
        self.record(StructuralChange::CardMoved {
            card,
            from,
            to: new_parent,
        });
        Ok(())
    }

    /// Remove a card and its whole subtree; returns the removed nodes
    ///
    /// # Errors
    /// Unknown card or root card
    pub fn remove_card(&self, card: CardId) -> Result<Vec<Node>, HierarchyError> {
        let removed = {
            let mut g = self.inner.write();
            let card_node = Node::Card(card);
            g.require(card_node)?;
            if g.roots.contains(&card) {
                return Err(HierarchyError::RootCard(card));
            }
            let removed = g.subtree(card_node);
            for node in &removed {
                g.graph.remove_node(*node);
                g.scopes.remove(node);
            }
            removed
        };
        self.record(StructuralChange::NodesRemoved {
            nodes: removed.clone(),
        });
        Ok(removed)
    }

    /// Project by id
    #[must_use]
    pub fn project(&self, project: ProjectId) -> Option<ProjectHandle> {
        self.inner.read().projects.get(&project).copied()
    }

    /// Owning project; `None` for global types and unknown nodes
    #[must_use]
    pub fn project_of(&self, node: Node) -> Option<ProjectId> {
        self.inner.read().scope(node)
    }

    /// Type node used by a card
    #[must_use]
    pub fn type_of(&self, card: CardId) -> Option<Node> {
        self.inner.read().type_of(Node::Card(card))
    }

    /// Content variants of a card
    #[must_use]
    pub fn contents_of(&self, card: CardId) -> Vec<CardContentId> {
        self.inner
            .read()
            .neighbors(Node::Card(card), Direction::Outgoing, Link::Contains)
            .into_iter()
            .filter_map(|n| n.as_card_content())
            .collect()
    }

    /// Sub-cards of a content
    #[must_use]
    pub fn sub_cards(&self, content: CardContentId) -> Vec<CardId> {
        self.inner
            .read()
            .neighbors(Node::CardContent(content), Direction::Outgoing, Link::Contains)
            .into_iter()
            .filter_map(|n| n.as_card())
            .collect()
    }

    /// Card and everything beneath it, parents first
    #[must_use]
    pub fn subtree(&self, card: CardId) -> Vec<Node> {
        let g = self.inner.read();
        if g.graph.contains_node(Node::Card(card)) {
            g.subtree(Node::Card(card))
        } else {
            Vec::new()
        }
    }

    /// All nodes of a kind, sorted
    #[must_use]
    pub fn nodes(&self, kind: NodeKind) -> Vec<Node> {
        let g = self.inner.read();
        let mut out: Vec<Node> = g.graph.nodes().filter(|n| n.kind() == kind).collect();
        out.sort();
        out
    }

    /// Whether the card is a project root
    #[must_use]
    pub fn is_root(&self, card: CardId) -> bool {
        self.inner.read().roots.contains(&card)
    }
}

impl HierarchyView for InMemoryHierarchy {
    fn contains(&self, node: Node) -> bool {
        self.inner.read().graph.contains_node(node)
    }

    fn direct_propagation_targets(&self, node: Node) -> Result<Vec<Node>, HierarchyError> {
        let g = self.inner.read();
        g.require(node)?;
        Ok(match node {
            Node::CardType(_) | Node::CardTypeRef(_) => g.cards_using(node),
            Node::Card(_) | Node::CardContent(_) => {
                g.neighbors(node, Direction::Outgoing, Link::Contains)
            }
        })
    }

    fn propagation_sources(&self, node: Node) -> Result<Vec<Node>, HierarchyError> {
        let g = self.inner.read();
        g.require(node)?;
        Ok(match node {
            Node::CardType(_) | Node::CardTypeRef(_) => Vec::new(),
            Node::CardContent(_) => g.parent(node).into_iter().collect(),
            Node::Card(_) => {
                let mut sources: Vec<Node> = g.parent(node).into_iter().collect();
                if let Some(t) = g.type_of(node) {
                    sources.extend(g.type_chain(t));
                }
                sources
            }
        })
    }

    fn parent_of(&self, node: Node) -> Result<Option<Node>, HierarchyError> {
        let g = self.inner.read();
        g.require(node)?;
        Ok(match node {
            Node::CardType(_) | Node::CardTypeRef(_) => None,
            Node::Card(_) | Node::CardContent(_) => g.parent(node),
        })
    }
}

impl ChangeFeed for InMemoryHierarchy {
    fn take_changes(&self) -> Vec<StructuralChange> {
        std::mem::take(&mut *self.changes.lock())
    }

    fn requeue(&self, mut changes: Vec<StructuralChange>) {
        let mut pending = self.changes.lock();
        changes.append(&mut pending);
        *pending = changes;
    }
}
