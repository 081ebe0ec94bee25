//! Reference walkthrough of a resource's life
//!
//! A card `C1` of a local type gets resource `r1`; a sub-card `C2` appears
//! under `C1`'s content `c1a`; `r1` is then published, unpublished, its ref
//! at `c1a` discarded, and finally `r1` is deleted. Each step records what
//! `c1a` and `C2` hold for `r1` and whether that matches the expected state.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::service::ResourceService;
use colab_hierarchy::{HierarchyView, InMemoryHierarchy, Node};
use colab_resource::{AbstractResourceId, ResourceData};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Flags of one ref
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryState {
    pub id: AbstractResourceId,
    pub residual: bool,
    pub refused: bool,
}

impl EntryState {
    fn active(&self) -> bool {
        !self.residual && !self.refused
    }
}

/// State observed after one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioStep {
    pub action: String,
    /// `r1`'s ref at `c1a`
    pub content_ref: Option<EntryState>,
    /// `r1`'s ref at `C2`, once `C2` exists
    pub sub_card_ref: Option<EntryState>,
    pub expected: String,
    pub holds: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub resource: AbstractResourceId,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|step| step.holds)
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::from("=== Resource Walkthrough ===\n\n");
        let show = |state: Option<EntryState>| match state {
            None => "-".to_string(),
            Some(s) if s.active() => format!("{} active", s.id),
            Some(s) => format!(
                "{}{}{}",
                s.id,
                if s.residual { " residual" } else { "" },
                if s.refused { " refused" } else { "" }
            ),
        };
        for (i, step) in self.steps.iter().enumerate() {
            let _ = writeln!(
                report,
                "{}. {}\n   c1a: {}\n   C2:  {}\n   expected {}: {}",
                i + 1,
                step.action,
                show(step.content_ref),
                show(step.sub_card_ref),
                step.expected,
                if step.holds { "ok" } else { "MISMATCH" }
            );
        }
        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

fn state_at(
    service: &ResourceService<InMemoryHierarchy>,
    node: Node,
    resource: AbstractResourceId,
) -> Result<Option<EntryState>, EngineError> {
    if !service.hierarchy().contains(node) {
        return Ok(None);
    }
    let chains = service.get_resource_chain(node)?;
    Ok(chains
        .iter()
        .find(|chain| chain.last().is_some_and(|last| last.id == resource))
        .and_then(|chain| chain.first())
        .map(|nearest| EntryState {
            id: nearest.id,
            residual: nearest.residual,
            refused: nearest.refused,
        }))
}

type Check = fn(Option<EntryState>, Option<EntryState>) -> bool;

struct Walkthrough {
    service: ResourceService<InMemoryHierarchy>,
    content: Node,
    sub_card: Option<Node>,
    steps: Vec<ScenarioStep>,
}

impl Walkthrough {
    fn record(
        &mut self,
        r1: AbstractResourceId,
        action: &str,
        expected: &str,
        check: Check,
    ) -> Result<(), EngineError> {
        let content_ref = state_at(&self.service, self.content, r1)?;
        let sub_card_ref = match self.sub_card {
            Some(node) => state_at(&self.service, node, r1)?,
            None => None,
        };
        self.steps.push(ScenarioStep {
            action: action.to_string(),
            content_ref,
            sub_card_ref,
            expected: expected.to_string(),
            holds: check(content_ref, sub_card_ref),
        });
        Ok(())
    }
}

/// Run the walkthrough against a fresh hierarchy
///
/// # Errors
/// Any step the service rejects
pub fn run_scenario() -> Result<ScenarioReport, EngineError> {
    let hierarchy = Arc::new(InMemoryHierarchy::new());
    let project = hierarchy.create_project();
    let card_type = hierarchy.create_card_type(Some(project.project))?;
    let (c1, c1a) = hierarchy.create_card(project.root_content, Some(Node::CardType(card_type)))?;
    let mut walk = Walkthrough {
        service: ResourceService::new(Arc::clone(&hierarchy), EngineConfig::default()),
        content: Node::CardContent(c1a),
        sub_card: None,
        steps: Vec::new(),
    };

    let r1 = walk
        .service
        .create_resource(Node::Card(c1), ResourceData::new("r1"))?;
    walk.record(r1, "create r1 on C1", "c1a holds an active ref", |content, _| {
        content.is_some_and(|c| c.active())
    })?;

    let (c2, _) = hierarchy.create_card(c1a, None)?;
    walk.service.sync()?;
    walk.sub_card = Some(Node::Card(c2));
    walk.record(
        r1,
        "create C2 under c1a",
        "C2 has no ref while r1 is unpublished",
        |_, below| below.is_none(),
    )?;

    walk.service.publish_resource(r1)?;
    walk.record(r1, "publish r1", "C2 holds an active ref", |_, below| {
        below.is_some_and(|b| b.active())
    })?;

    walk.service.unpublish_resource(r1)?;
    walk.record(r1, "unpublish r1", "C2's ref is kept as residual", |_, below| {
        below.is_some_and(|b| b.residual && !b.refused)
    })?;

    if let Some(at_content) = state_at(&walk.service, walk.content, r1)? {
        walk.service.discard_resource_or_ref(at_content.id)?;
    }
    walk.record(r1, "discard the ref at c1a", "both refs are refused", |content, below| {
        content.is_some_and(|c| c.refused) && below.is_some_and(|b| b.refused)
    })?;

    walk.service.delete_resource(r1)?;
    walk.record(r1, "delete r1", "both refs are gone", |content, below| {
        content.is_none() && below.is_none()
    })?;

    Ok(ScenarioReport {
        resource: r1,
        steps: walk.steps,
    })
}
