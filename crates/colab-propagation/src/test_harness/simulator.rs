//! Propagation simulator - randomized invariant testing for the engine
//!
//! Drives an [`InMemoryHierarchy`] and a [`PropagationEngine`] with a seeded
//! mix of valid and invalid operations, and checks the store after every
//! step.

use crate::config::{EngineConfig, SimulatorConfig};
use crate::engine::PropagationEngine;
use crate::error::EngineError;
use colab_hierarchy::{
    CardContentId, CardId, ChangeFeed, HierarchyView, InMemoryHierarchy, Node, ProjectHandle,
};
use colab_resource::{AbstractResource, AbstractResourceId, IntegrityReport, Resource, ResourceData, ResourceStore};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet, VecDeque};

const CATEGORY_NAMES: &[&str] = &["docs", "specs", "media"];

/// All operations the simulator can generate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    // Hierarchy
    CreateCard {
        parent: CardContentId,
        card_type: Option<Node>,
    },
    CreateContent(CardId),
    MoveCard {
        card: CardId,
        to: CardContentId,
    },
    RemoveCard(CardId),

    // Resource lifecycle
    CreateResource(Node),
    Publish(AbstractResourceId),
    Unpublish(AbstractResourceId),
    Discard(AbstractResourceId),
    Restore(AbstractResourceId),
    Delete(AbstractResourceId),
    SetCategory(AbstractResourceId, Option<String>),
    RenameCategory {
        anchor: Node,
        old: String,
        new: String,
    },

    // Must be rejected
    DiscardResource(AbstractResourceId),
    CycleMove {
        card: CardId,
        into: CardContentId,
    },
}

impl SimulatedOperation {
    /// Variant name, used for per-type counts
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateCard { .. } => "CreateCard",
            Self::CreateContent(_) => "CreateContent",
            Self::MoveCard { .. } => "MoveCard",
            Self::RemoveCard(_) => "RemoveCard",
            Self::CreateResource(_) => "CreateResource",
            Self::Publish(_) => "Publish",
            Self::Unpublish(_) => "Unpublish",
            Self::Discard(_) => "Discard",
            Self::Restore(_) => "Restore",
            Self::Delete(_) => "Delete",
            Self::SetCategory(..) => "SetCategory",
            Self::RenameCategory { .. } => "RenameCategory",
            Self::DiscardResource(_) => "DiscardResource",
            Self::CycleMove { .. } => "CycleMove",
        }
    }
}

/// Expected result classification for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedResult {
    ShouldSucceed,
    ShouldFail,
}

/// Store invariants checked after every step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvariantCheck {
    /// Indexes, chains and per-node lineage uniqueness
    StoreIntegrity,
    /// Every entry sits on a node that still exists
    AnchorsExist,
    /// Below a refused ref everything is refused, stamps name discarded refs
    RefusalInherited,
    /// Every node reachable through open gates has a usable entry
    CascadeComplete,
    /// `residual` is set exactly on refs with a closed link above
    ResidualMatchesStructure,
    /// A ref whose upstream is no longer a source is re-pointed whenever a
    /// source holds an active entry of the lineage
    ChainsFollowHierarchy,
}

/// A specific invariant violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub check: InvariantCheck,
    pub details: String,
}

impl InvariantViolation {
    fn new(check: InvariantCheck, details: impl Into<String>) -> Self {
        Self {
            check,
            details: details.into(),
        }
    }
}

/// A violation detected during simulation
#[derive(Debug, Clone)]
pub enum Violation {
    /// Operation outcome didn't match expectation
    UnexpectedOutcome {
        operation_index: u64,
        operation: SimulatedOperation,
        expected: ExpectedResult,
        actual: Result<String, String>,
    },
    /// A rejected operation still changed the store
    PartialCascade {
        operation_index: u64,
        operation: SimulatedOperation,
    },
    /// Invariant broken after an operation
    Invariant {
        operation_index: u64,
        violation: InvariantViolation,
    },
}

/// Statistics collected during simulation
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub operations_by_type: BTreeMap<&'static str, u64>,
}

impl OperationStats {
    pub fn record(&mut self, operation: &SimulatedOperation, succeeded: bool) {
        self.total_operations += 1;
        *self.operations_by_type.entry(operation.name()).or_insert(0) += 1;
        if succeeded {
            self.successful_operations += 1;
        } else {
            self.failed_operations += 1;
        }
    }
}

/// Final report from the simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: OperationStats,
    pub violations: Vec<Violation>,
    pub final_card_count: usize,
    /// Store shape at the end, if it still verified
    pub integrity: Option<IntegrityReport>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate a text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Propagation Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Total Operations: {}\n", self.stats.total_operations));
        report.push_str(&format!("Successful: {}\n", self.stats.successful_operations));
        report.push_str(&format!("Failed: {}\n", self.stats.failed_operations));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));
        report.push_str(&format!("Final Cards: {}\n", self.final_card_count));
        if let Some(integrity) = &self.integrity {
            report.push_str(&format!(
                "Final Entries: {} resources, {} refs, longest chain {}\n",
                integrity.resources, integrity.refs, integrity.longest_chain
            ));
        }

        report.push_str("\n=== Operations ===\n");
        for (name, count) in &self.stats.operations_by_type {
            report.push_str(&format!("{name}: {count}\n"));
        }

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// Run the propagation simulator
///
/// The cascade depth limit is sized to the deepest hierarchy `max_cards`
/// allows, so no valid operation trips it.
#[must_use]
pub fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    // every card adds two levels
    let engine = EngineConfig::new().with_max_cascade_depth(config.max_cards * 4 + 8);
    run_simulator_with(config, engine)
}

/// Run the propagation simulator with explicit engine limits
#[must_use]
pub fn run_simulator_with(config: SimulatorConfig, engine: EngineConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut world = Simulation::new(engine);
    let mut stats = OperationStats::default();
    let mut violations = Vec::new();

    for i in 0..config.total_operations {
        let operation = world.generate(&mut rng, config.max_cards);
        let expected = world.expected_result(&operation);

        let before = world.store.clone();
        let actual = world.execute(&operation);

        let matches = matches!(
            (expected, &actual),
            (ExpectedResult::ShouldSucceed, Ok(())) | (ExpectedResult::ShouldFail, Err(_))
        );
        if !matches {
            violations.push(Violation::UnexpectedOutcome {
                operation_index: i,
                operation: operation.clone(),
                expected,
                actual: actual.clone().map(|()| "success".to_string()).map_err(|e| e.to_string()),
            });
        }
        if actual.is_err() && world.store != before {
            violations.push(Violation::PartialCascade {
                operation_index: i,
                operation: operation.clone(),
            });
        }
        violations.extend(
            check_invariants(&world.hierarchy, &world.store)
                .into_iter()
                .map(|violation| Violation::Invariant {
                    operation_index: i,
                    violation,
                }),
        );

        stats.record(&operation, actual.is_ok());

        if config.stop_on_first_violation && !violations.is_empty() {
            break;
        }
    }

    SimulatorReport {
        final_card_count: world.cards.len(),
        integrity: world.store.verify_integrity().ok(),
        config,
        stats,
        violations,
    }
}

/// Hierarchy plus store, with the simulator's own record of live nodes
struct Simulation {
    hierarchy: InMemoryHierarchy,
    store: ResourceStore,
    engine_config: EngineConfig,
    project: ProjectHandle,
    /// Creation order, so picks only depend on the seed
    cards: Vec<CardId>,
    contents: Vec<CardContentId>,
    card_types: Vec<Node>,
    /// Types that may own resources without being usable by cards directly
    foreign_types: Vec<Node>,
}

impl Simulation {
    fn new(engine_config: EngineConfig) -> Self {
        let hierarchy = InMemoryHierarchy::new();
        let project = hierarchy.create_project();
        let mut card_types = Vec::new();
        let mut foreign_types = Vec::new();
        if let Ok(local) = hierarchy.create_card_type(Some(project.project)) {
            card_types.push(Node::CardType(local));
        }
        if let Ok(global) = hierarchy.create_card_type(None) {
            foreign_types.push(Node::CardType(global));
            if let Ok(alias) = hierarchy.create_card_type_ref(project.project, Node::CardType(global)) {
                card_types.push(Node::CardTypeRef(alias));
            }
        }
        hierarchy.take_changes();

        Self {
            hierarchy,
            store: ResourceStore::new(),
            engine_config,
            cards: vec![project.root_card],
            contents: vec![project.root_content],
            project,
            card_types,
            foreign_types,
        }
    }

    /// Engine over the hierarchy alongside the store it mutates
    fn split(&mut self) -> (PropagationEngine<'_, InMemoryHierarchy>, &mut ResourceStore) {
        (
            PropagationEngine::new(&self.hierarchy, self.engine_config.clone()),
            &mut self.store,
        )
    }

    fn movable_cards(&self) -> Vec<CardId> {
        self.cards
            .iter()
            .copied()
            .filter(|card| *card != self.project.root_card)
            .collect()
    }

    fn resource_ids(&self) -> Vec<AbstractResourceId> {
        self.store.resources().map(Resource::id).collect()
    }

    fn ref_ids(&self) -> Vec<AbstractResourceId> {
        self.store
            .iter()
            .filter(|entry| !entry.is_resource())
            .map(AbstractResource::id)
            .collect()
    }

    fn any_owner(&self, rng: &mut StdRng) -> Node {
        match rng.gen_range(0..10) {
            0..=3 => Node::Card(*self.cards.choose(rng).unwrap_or(&self.project.root_card)),
            4..=7 => Node::CardContent(*self.contents.choose(rng).unwrap_or(&self.project.root_content)),
            8 => self.card_types.choose(rng).copied().unwrap_or(Node::Card(self.project.root_card)),
            _ => self.foreign_types.choose(rng).copied().unwrap_or(Node::Card(self.project.root_card)),
        }
    }

    fn generate(&self, rng: &mut StdRng, max_cards: usize) -> SimulatedOperation {
        let resources = self.resource_ids();
        let refs = self.ref_ids();
        let movable = self.movable_cards();
        let create_card = |rng: &mut StdRng| SimulatedOperation::CreateCard {
            parent: *self.contents.choose(rng).unwrap_or(&self.project.root_content),
            card_type: if rng.gen_bool(0.25) {
                self.card_types.choose(rng).copied()
            } else {
                None
            },
        };
        let create_resource = |rng: &mut StdRng| SimulatedOperation::CreateResource(self.any_owner(rng));

        match rng.gen_range(0..100) {
            0..=11 if self.cards.len() < max_cards => create_card(rng),
            12..=15 => SimulatedOperation::CreateContent(*self.cards.choose(rng).unwrap_or(&self.project.root_card)),
            16..=23 => match movable.choose(rng) {
                Some(&card) => {
                    let to = *self.contents.choose(rng).unwrap_or(&self.project.root_content);
                    if self.hierarchy.subtree(card).contains(&Node::CardContent(to)) {
                        SimulatedOperation::CycleMove { card, into: to }
                    } else {
                        SimulatedOperation::MoveCard { card, to }
                    }
                }
                None => create_card(rng),
            },
            24..=26 => match movable.choose(rng) {
                Some(&card) => SimulatedOperation::RemoveCard(card),
                None => create_card(rng),
            },
            42..=55 => resources
                .choose(rng)
                .map_or_else(|| create_resource(rng), |&id| SimulatedOperation::Publish(id)),
            56..=63 => resources
                .choose(rng)
                .map_or_else(|| create_resource(rng), |&id| SimulatedOperation::Unpublish(id)),
            64..=73 => refs
                .choose(rng)
                .map_or_else(|| create_resource(rng), |&id| SimulatedOperation::Discard(id)),
            74..=81 => {
                let refused: Vec<_> = refs
                    .iter()
                    .copied()
                    .filter(|id| self.store.get(*id).is_ok_and(AbstractResource::is_refused))
                    .collect();
                refused
                    .choose(rng)
                    .map_or_else(|| create_resource(rng), |&id| SimulatedOperation::Restore(id))
            }
            82..=84 => resources
                .choose(rng)
                .map_or_else(|| create_resource(rng), |&id| SimulatedOperation::Delete(id)),
            85..=89 => {
                let name = CATEGORY_NAMES.choose(rng).filter(|_| rng.gen_bool(0.8));
                let entries: Vec<_> = resources.iter().chain(&refs).copied().collect();
                entries.choose(rng).map_or_else(
                    || create_resource(rng),
                    |&id| SimulatedOperation::SetCategory(id, name.map(|n| (*n).to_string())),
                )
            }
            90..=91 => {
                let mut names = CATEGORY_NAMES.choose_multiple(rng, 2);
                match (names.next(), names.next()) {
                    (Some(old), Some(new)) => SimulatedOperation::RenameCategory {
                        anchor: self.any_owner(rng),
                        old: (*old).to_string(),
                        new: (*new).to_string(),
                    },
                    _ => create_resource(rng),
                }
            }
            92..=95 => resources
                .choose(rng)
                .map_or_else(|| create_resource(rng), |&id| SimulatedOperation::DiscardResource(id)),
            96..=99 => match movable.choose(rng) {
                Some(&card) => {
                    let own = self.hierarchy.contents_of(card);
                    match own.choose(rng) {
                        Some(&into) => SimulatedOperation::CycleMove { card, into },
                        None => create_card(rng),
                    }
                }
                None => create_card(rng),
            },
            _ => create_resource(rng),
        }
    }

    fn expected_result(&self, operation: &SimulatedOperation) -> ExpectedResult {
        match operation {
            SimulatedOperation::DiscardResource(_) | SimulatedOperation::CycleMove { .. } => {
                ExpectedResult::ShouldFail
            }
            SimulatedOperation::Restore(id) => match self.store.resource_ref(*id) {
                Ok(r) if r.refused_by.map_or(true, |origin| origin == *id) => ExpectedResult::ShouldSucceed,
                _ => ExpectedResult::ShouldFail,
            },
            _ => ExpectedResult::ShouldSucceed,
        }
    }

    fn execute(&mut self, operation: &SimulatedOperation) -> Result<(), EngineError> {
        match operation {
            SimulatedOperation::CreateCard { parent, card_type } => {
                let (card, content) = self.hierarchy.create_card(*parent, *card_type)?;
                self.cards.push(card);
                self.contents.push(content);
                self.apply_changes()
            }
            SimulatedOperation::CreateContent(card) => {
                let content = self.hierarchy.create_card_content(*card)?;
                self.contents.push(content);
                self.apply_changes()
            }
            SimulatedOperation::MoveCard { card, to } => {
                self.hierarchy.move_card(*card, *to)?;
                self.apply_changes()
            }
            SimulatedOperation::RemoveCard(card) => {
                let removed: HashSet<Node> = self.hierarchy.remove_card(*card)?.into_iter().collect();
                self.cards.retain(|c| !removed.contains(&Node::Card(*c)));
                self.contents.retain(|c| !removed.contains(&Node::CardContent(*c)));
                self.apply_changes()
            }
            SimulatedOperation::CreateResource(owner) => {
                let (engine, store) = self.split();
                let data = ResourceData::new(format!("resource {}", store.len()));
                engine.create_resource(store, *owner, data).map(|_| ())
            }
            SimulatedOperation::Publish(id) => {
                let (engine, store) = self.split();
                engine.publish(store, *id).map(|_| ())
            }
            SimulatedOperation::Unpublish(id) => {
                let (engine, store) = self.split();
                engine.unpublish(store, *id).map(|_| ())
            }
            SimulatedOperation::Discard(id) | SimulatedOperation::DiscardResource(id) => {
                let (engine, store) = self.split();
                engine.discard(store, *id).map(|_| ())
            }
            SimulatedOperation::Restore(id) => {
                let (engine, store) = self.split();
                engine.restore(store, *id).map(|_| ())
            }
            SimulatedOperation::Delete(id) => {
                let (engine, store) = self.split();
                engine.delete_resource(store, *id).map(|_| ())
            }
            SimulatedOperation::SetCategory(id, name) => {
                let (engine, store) = self.split();
                engine.set_category(store, *id, name.as_deref())
            }
            SimulatedOperation::RenameCategory { anchor, old, new } => {
                let (engine, store) = self.split();
                engine.rename_category(store, *anchor, old, new).map(|_| ())
            }
            SimulatedOperation::CycleMove { card, into } => {
                let from = match self.hierarchy.parent_of(Node::Card(*card))? {
                    Some(Node::CardContent(parent)) => parent,
                    _ => return Err(EngineError::integrity(format!("{card} has no parent content"))),
                };
                let (engine, store) = self.split();
                engine.on_card_moved(store, *card, from, *into).map(|_| ())
            }
        }
    }

    /// Feed recorded hierarchy changes to the engine, oldest first
    fn apply_changes(&mut self) -> Result<(), EngineError> {
        let changes = self.hierarchy.take_changes();
        let (engine, store) = self.split();
        for change in &changes {
            engine.on_structural_change(store, change)?;
        }
        Ok(())
    }
}

/// Check every store invariant against the current hierarchy
#[must_use]
pub fn check_invariants<H: HierarchyView + ?Sized>(
    hierarchy: &H,
    store: &ResourceStore,
) -> Vec<InvariantViolation> {
    let mut found = Vec::new();
    if let Err(e) = store.verify_integrity() {
        // the remaining checks walk chains and would only repeat this
        found.push(InvariantViolation::new(InvariantCheck::StoreIntegrity, e.to_string()));
        return found;
    }
    check_anchors(hierarchy, store, &mut found);
    check_refusal(store, &mut found);
    check_cascades(hierarchy, store, &mut found);
    check_residuals(hierarchy, store, &mut found);
    check_chain_links(hierarchy, store, &mut found);
    found
}

fn check_anchors<H: HierarchyView + ?Sized>(
    hierarchy: &H,
    store: &ResourceStore,
    found: &mut Vec<InvariantViolation>,
) {
    for node in store.anchored_nodes() {
        if !hierarchy.contains(node) {
            found.push(InvariantViolation::new(
                InvariantCheck::AnchorsExist,
                format!("entries remain at removed {node}"),
            ));
        }
    }
}

fn check_refusal(store: &ResourceStore, found: &mut Vec<InvariantViolation>) {
    for entry in store.iter() {
        let AbstractResource::Ref(r) = entry else {
            continue;
        };
        if let Some(origin) = r.refused_by {
            if !store.resource_ref(origin).is_ok_and(|o| o.explicitly_refused()) {
                found.push(InvariantViolation::new(
                    InvariantCheck::RefusalInherited,
                    format!("{} is refused through {origin}, which is not discarded", r.id()),
                ));
            }
            let above = store
                .chain(r.id())
                .is_ok_and(|chain| chain.iter().any(|entry| entry.id() == origin));
            if !above {
                found.push(InvariantViolation::new(
                    InvariantCheck::RefusalInherited,
                    format!("{} is refused through {origin}, which is not on its chain", r.id()),
                ));
            }
        }
        if !r.refused() && store.get(r.target()).is_ok_and(AbstractResource::is_refused) {
            found.push(InvariantViolation::new(
                InvariantCheck::RefusalInherited,
                format!("{} sits below refused {} but is not refused", r.id(), r.target()),
            ));
        }
    }
}

fn check_cascades<H: HierarchyView + ?Sized>(
    hierarchy: &H,
    store: &ResourceStore,
    found: &mut Vec<InvariantViolation>,
) {
    for resource in store.resources() {
        let mut visited = HashSet::from([resource.owner()]);
        let mut queue = VecDeque::from([resource.owner()]);
        while let Some(node) = queue.pop_front() {
            if !node.outgoing_gate().is_open(resource.published) {
                continue;
            }
            let Ok(targets) = hierarchy.direct_propagation_targets(node) else {
                continue;
            };
            for target in targets {
                if !visited.insert(target) {
                    continue;
                }
                let entry = store
                    .entry_in_lineage(target, resource.id())
                    .ok()
                    .flatten()
                    .and_then(|id| store.get(id).ok());
                match entry {
                    None => found.push(InvariantViolation::new(
                        InvariantCheck::CascadeComplete,
                        format!("{target} is reachable from {} but has no entry", resource.id()),
                    )),
                    Some(entry) if entry.is_refused() => {}
                    Some(entry) if entry.is_residual() => found.push(InvariantViolation::new(
                        InvariantCheck::CascadeComplete,
                        format!("{} at reachable {target} is residual", entry.id()),
                    )),
                    Some(_) => queue.push_back(target),
                }
            }
        }
    }
}

fn check_residuals<H: HierarchyView + ?Sized>(
    hierarchy: &H,
    store: &ResourceStore,
    found: &mut Vec<InvariantViolation>,
) {
    for entry in store.iter() {
        let AbstractResource::Ref(r) = entry else {
            continue;
        };
        let Ok(chain) = store.chain(r.id()) else {
            continue;
        };
        let published = chain
            .last()
            .and_then(|last| last.as_resource())
            .is_some_and(|resource| resource.published);
        let live = chain.windows(2).all(|link| {
            let (below, above) = (link[0].owner(), link[1].owner());
            above.outgoing_gate().is_open(published)
                && hierarchy.contains(below)
                && hierarchy
                    .propagation_sources(below)
                    .is_ok_and(|sources| sources.contains(&above))
        });
        if r.residual == live {
            found.push(InvariantViolation::new(
                InvariantCheck::ResidualMatchesStructure,
                format!("{} has residual={} but its chain is {}", r.id(), r.residual, if live { "live" } else { "cut" }),
            ));
        }
    }
}

fn check_chain_links<H: HierarchyView + ?Sized>(
    hierarchy: &H,
    store: &ResourceStore,
    found: &mut Vec<InvariantViolation>,
) {
    for entry in store.iter() {
        let AbstractResource::Ref(r) = entry else {
            continue;
        };
        let (Ok(upstream), Ok(sources)) = (store.get(r.target()), hierarchy.propagation_sources(r.owner()))
        else {
            continue;
        };
        if sources.contains(&upstream.owner()) {
            continue;
        }
        let Ok(resource) = store.resolve(r.id()).and_then(|id| store.resource(id)) else {
            continue;
        };
        let live_source = sources.into_iter().find(|source| {
            source.outgoing_gate().is_open(resource.published)
                && store
                    .entry_in_lineage(*source, resource.id())
                    .ok()
                    .flatten()
                    .and_then(|id| store.get(id).ok())
                    .is_some_and(AbstractResource::is_active)
        });
        if let Some(source) = live_source {
            found.push(InvariantViolation::new(
                InvariantCheck::ChainsFollowHierarchy,
                format!("{} still points at {} although {source} holds an active entry", r.id(), r.target()),
            ));
        }
    }
}
