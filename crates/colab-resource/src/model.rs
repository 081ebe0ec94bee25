//! Resource entities
//!
//! An [`AbstractResource`] is either the terminal, content-bearing
//! [`Resource`] of a chain or a [`ResourceRef`] link pointing one step
//! upstream. Both are anchored at exactly one hierarchy [`Node`].

use colab_hierarchy::Node;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable arena key of an abstract resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbstractResourceId(pub u64);

impl fmt::Display for AbstractResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

/// Document attached to a resource (content lives elsewhere)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Generate new document ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document:{}", self.0)
    }
}

/// Terminal node of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    id: AbstractResourceId,
    owner: Node,
    documents: Vec<DocumentId>,
    /// Explicit category
    pub category: Option<String>,
    pub title: String,
    pub teaser: Option<String>,
    pub published: bool,
    pub deprecated: bool,
    pub requesting_for_glory: bool,
}

impl Resource {
    pub(crate) fn new(id: AbstractResourceId, owner: Node, data: ResourceData) -> Self {
        Self {
            id,
            owner,
            documents: data.documents,
            category: data.category,
            title: data.title,
            teaser: data.teaser,
            published: false,
            deprecated: false,
            requesting_for_glory: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> AbstractResourceId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Node {
        self.owner
    }

    /// Attached documents
    #[inline]
    #[must_use]
    pub fn documents(&self) -> &[DocumentId] {
        &self.documents
    }
}

/// Non-terminal chain link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    id: AbstractResourceId,
    owner: Node,
    target: AbstractResourceId,
    /// Explicit category; `None` inherits from `target`
    pub category: Option<String>,
    /// Kept while the upstream gate is closed or the node was moved away
    pub residual: bool,
    /// Ref the refusing discard was issued on (itself or an upstream ref)
    pub refused_by: Option<AbstractResourceId>,
}

impl ResourceRef {
    pub(crate) fn new(id: AbstractResourceId, owner: Node, target: AbstractResourceId) -> Self {
        Self {
            id,
            owner,
            target,
            category: None,
            residual: false,
            refused_by: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> AbstractResourceId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Node {
        self.owner
    }

    /// Immediate upstream entry
    #[inline]
    #[must_use]
    pub fn target(&self) -> AbstractResourceId {
        self.target
    }

    pub(crate) fn set_target(&mut self, target: AbstractResourceId) {
        self.target = target;
    }

    #[inline]
    #[must_use]
    pub fn refused(&self) -> bool {
        self.refused_by.is_some()
    }

    /// Refused because of a discard issued on this very ref
    #[inline]
    #[must_use]
    pub fn explicitly_refused(&self) -> bool {
        self.refused_by == Some(self.id)
    }
}

/// Polymorphic chain entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AbstractResource {
    Resource(Resource),
    Ref(ResourceRef),
}

impl AbstractResource {
    #[must_use]
    pub fn id(&self) -> AbstractResourceId {
        match self {
            AbstractResource::Resource(r) => r.id,
            AbstractResource::Ref(r) => r.id,
        }
    }

    #[must_use]
    pub fn owner(&self) -> Node {
        match self {
            AbstractResource::Resource(r) => r.owner,
            AbstractResource::Ref(r) => r.owner,
        }
    }

    /// Explicit category only
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        match self {
            AbstractResource::Resource(r) => r.category.as_deref(),
            AbstractResource::Ref(r) => r.category.as_deref(),
        }
    }

    pub(crate) fn category_mut(&mut self) -> &mut Option<String> {
        match self {
            AbstractResource::Resource(r) => &mut r.category,
            AbstractResource::Ref(r) => &mut r.category,
        }
    }

    /// Upstream entry; `None` for a [`Resource`]
    #[must_use]
    pub fn target(&self) -> Option<AbstractResourceId> {
        match self {
            AbstractResource::Resource(_) => None,
            AbstractResource::Ref(r) => Some(r.target),
        }
    }

    #[must_use]
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            AbstractResource::Resource(r) => Some(r),
            AbstractResource::Ref(_) => None,
        }
    }

    #[must_use]
    pub fn as_resource_ref(&self) -> Option<&ResourceRef> {
        match self {
            AbstractResource::Resource(_) => None,
            AbstractResource::Ref(r) => Some(r),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_resource(&self) -> bool {
        matches!(self, AbstractResource::Resource(_))
    }

    #[must_use]
    pub fn is_residual(&self) -> bool {
        matches!(self, AbstractResource::Ref(r) if r.residual)
    }

    #[must_use]
    pub fn is_refused(&self) -> bool {
        matches!(self, AbstractResource::Ref(r) if r.refused())
    }

    /// Neither residual nor refused; a [`Resource`] is always active
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_residual() && !self.is_refused()
    }
}

/// Creation payload of a [`Resource`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    pub title: String,
    pub teaser: Option<String>,
    pub documents: Vec<DocumentId>,
    pub category: Option<String>,
}

impl ResourceData {
    /// Payload with a title only
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_teaser(mut self, teaser: impl Into<String>) -> Self {
        self.teaser = Some(teaser.into());
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: DocumentId) -> Self {
        self.documents.push(document);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Partial update of a [`Resource`]'s descriptive fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub teaser: Option<Option<String>>,
    pub deprecated: Option<bool>,
    pub requesting_for_glory: Option<bool>,
}

impl ResourcePatch {
    /// Apply every set field
    pub fn apply(&self, resource: &mut Resource) {
        if let Some(title) = &self.title {
            resource.title.clone_from(title);
        }
        if let Some(teaser) = &self.teaser {
            resource.teaser.clone_from(teaser);
        }
        if let Some(deprecated) = self.deprecated {
            resource.deprecated = deprecated;
        }
        if let Some(glory) = self.requesting_for_glory {
            resource.requesting_for_glory = glory;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colab_hierarchy::CardId;

    #[test]
    fn new_resource_starts_unpublished() {
        let owner = Node::Card(CardId::new());
        let r = Resource::new(
            AbstractResourceId(1),
            owner,
            ResourceData::new("Guide").with_category("docs"),
        );
        assert!(!r.published);
        assert_eq!(r.owner(), owner);
        assert_eq!(r.category.as_deref(), Some("docs"));
    }

    #[test]
    fn refusal_provenance() {
        let owner = Node::Card(CardId::new());
        let mut r = ResourceRef::new(AbstractResourceId(2), owner, AbstractResourceId(1));
        assert!(!r.refused());

        r.refused_by = Some(AbstractResourceId(2));
        assert!(r.refused());
        assert!(r.explicitly_refused());

        r.refused_by = Some(AbstractResourceId(9));
        assert!(r.refused());
        assert!(!r.explicitly_refused());
    }

    #[test]
    fn abstract_resource_flags() {
        let owner = Node::Card(CardId::new());
        let resource = AbstractResource::Resource(Resource::new(
            AbstractResourceId(1),
            owner,
            ResourceData::new("r"),
        ));
        assert!(resource.is_active());
        assert_eq!(resource.target(), None);

        let mut link = ResourceRef::new(AbstractResourceId(2), owner, AbstractResourceId(1));
        link.residual = true;
        let link = AbstractResource::Ref(link);
        assert!(!link.is_active());
        assert!(link.is_residual());
        assert_eq!(link.target(), Some(AbstractResourceId(1)));
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut r = Resource::new(
            AbstractResourceId(1),
            Node::Card(CardId::new()),
            ResourceData::new("old").with_teaser("keep"),
        );
        ResourcePatch {
            title: Some("new".into()),
            deprecated: Some(true),
            ..ResourcePatch::default()
        }
        .apply(&mut r);

        assert_eq!(r.title, "new");
        assert_eq!(r.teaser.as_deref(), Some("keep"));
        assert!(r.deprecated);
        assert!(!r.requesting_for_glory);
    }
}
