//! Service surface: summaries, categories, change feed handling

use colab_hierarchy::Node;
use colab_propagation::{EngineConfig, EntryKind, ErrorKind};
use colab_resource::{ResourceData, ResourcePatch};
use colab_test_utils::World;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;

#[test]
fn test_chain_summaries_run_from_node_to_resource() {
    let world = World::new();
    let (a, a1) = world.card(world.project.root_content);
    let r = world
        .service
        .create_resource(world.root_card(), ResourceData::new("r").with_category("docs"))
        .unwrap();
    world.service.publish_resource(r).unwrap();

    let chains = world.service.get_resource_chain(Node::CardContent(a1)).unwrap();
    assert_eq!(chains.len(), 1);
    let chain = &chains[0];
    let owners: Vec<_> = chain.iter().map(|entry| entry.owner).collect();
    assert_eq!(
        owners,
        vec![Node::CardContent(a1), Node::Card(a), world.root_content(), world.root_card()]
    );
    assert_eq!(chain.last().unwrap().kind, EntryKind::Resource);
    assert!(chain.iter().all(|entry| entry.category.as_deref() == Some("docs")));
    assert!(chain[..3].iter().all(|entry| entry.kind == EntryKind::Ref && !entry.residual));
}

#[test]
fn test_available_summaries_carry_resource_fields() {
    let world = World::new();
    let (_, a1) = world.card(world.project.root_content);
    let r = world
        .service
        .create_resource(
            world.root_card(),
            ResourceData::new("Runbook").with_teaser("how to").with_category("docs"),
        )
        .unwrap();
    world.service.publish_resource(r).unwrap();
    world
        .service
        .update_resource(
            r,
            &ResourcePatch {
                title: Some("Runbook v2".into()),
                deprecated: Some(true),
                ..ResourcePatch::default()
            },
        )
        .unwrap();
    let local = world.entry_id(Node::CardContent(a1), r);
    world.service.set_category(local, Some("ops")).unwrap();

    let available = world.service.get_available_active_resources(Node::CardContent(a1)).unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, r);
    assert_eq!(available[0].title, "Runbook v2");
    assert_eq!(available[0].teaser.as_deref(), Some("how to"));
    assert_eq!(available[0].category.as_deref(), Some("ops"));
    assert!(available[0].published);
    assert!(available[0].deprecated);

    let direct = world.service.direct_resources(world.root_card()).unwrap();
    assert_eq!(direct[0].category.as_deref(), Some("docs"));
}

#[test]
fn test_rename_cascades_until_an_override() {
    let world = World::new();
    let (a, a1) = world.card(world.project.root_content);
    let (b, b1) = world.card(a1);
    let r = world
        .service
        .create_resource(world.root_card(), ResourceData::new("r").with_category("docs"))
        .unwrap();
    world.service.publish_resource(r).unwrap();
    world
        .service
        .set_category(world.entry_id(Node::Card(b), r), Some("private"))
        .unwrap();

    let renamed = world.service.rename_category(Node::Card(a), "docs", "manuals").unwrap();
    assert_eq!(renamed, 1);
    assert_eq!(world.service.list_categories(Node::CardContent(a1)).unwrap(), vec!["manuals"]);
    assert_eq!(world.service.list_categories(Node::CardContent(b1)).unwrap(), vec!["private"]);
    assert_eq!(world.service.list_categories(world.root_content()).unwrap(), vec!["docs"]);
}

#[test]
fn test_clearing_a_category_falls_back_to_upstream() {
    let world = World::new();
    let (_, a1) = world.card(world.project.root_content);
    let r = world
        .service
        .create_resource(world.root_card(), ResourceData::new("r").with_category("docs"))
        .unwrap();
    world.service.publish_resource(r).unwrap();
    let local = world.entry_id(Node::CardContent(a1), r);

    world.service.set_category(local, Some("  ops ")).unwrap();
    assert_eq!(world.service.list_categories(Node::CardContent(a1)).unwrap(), vec!["ops"]);
    world.service.set_category(local, Some("   ")).unwrap();
    assert_eq!(world.service.list_categories(Node::CardContent(a1)).unwrap(), vec!["docs"]);
}

#[test]
fn test_removed_cards_take_their_resources_along() {
    let world = World::new();
    let (a, a1) = world.card(world.project.root_content);
    let (b, _) = world.card(a1);
    let shared = world.resource(world.root_card(), "shared");
    world.service.publish_resource(shared).unwrap();
    let local = world.resource(Node::Card(b), "local");

    let removed = world.remove_card(a);
    assert!(removed.contains(&Node::Card(b)));
    assert_eq!(world.lineage_len(local), 0);
    assert_eq!(world.lineage_len(shared), 2);
    world.service.verify_integrity().unwrap();
}

#[test]
fn test_sync_skips_changes_whose_nodes_are_gone() {
    let world = World::new();
    let r = world.resource(world.root_card(), "r");
    world.service.publish_resource(r).unwrap();

    // created and removed again before the service hears about either
    let (a, a1) = world.hierarchy.create_card(world.project.root_content, None).unwrap();
    world.hierarchy.create_card(a1, None).unwrap();
    world.hierarchy.remove_card(a).unwrap();

    world.service.sync().unwrap();
    assert_eq!(world.lineage_len(r), 2);
    world.service.verify_integrity().unwrap();
}

#[test]
fn test_writes_apply_pending_changes_first() {
    let world = World::new();
    let (a, a1) = world.hierarchy.create_card(world.project.root_content, None).unwrap();
    let (_, z1) = world.hierarchy.create_card(world.project.root_content, None).unwrap();
    world.hierarchy.move_card(a, z1).unwrap();
    world.hierarchy.move_card(a, world.project.root_content).unwrap();

    let r = world.resource(world.root_card(), "r");
    world.service.publish_resource(r).unwrap();
    assert!(world.entry(Node::CardContent(a1), r).unwrap().is_active());
    world.service.verify_integrity().unwrap();
}

#[test]
fn test_rejected_changes_stay_queued_without_failing_writes() {
    let world = World::with_config(EngineConfig::new().with_max_cascade_depth(3));
    let r = world.resource(world.root_card(), "r");
    world.service.publish_resource(r).unwrap();

    // too deep for the limit once the engine hears about it
    let (a, a1) = world.hierarchy.create_card(world.project.root_content, None).unwrap();
    let (b, _) = world.hierarchy.create_card(a1, None).unwrap();

    let other = world
        .service
        .create_resource(world.root_card(), ResourceData::new("other"))
        .unwrap();
    assert_eq!(world.entry(world.root_content(), other).map(|e| e.is_active()), Some(true));
    assert_eq!(world.entry(Node::Card(a), r), None);

    // the batch is kept, not half applied
    assert_eq!(world.service.sync().unwrap_err().kind(), ErrorKind::DataIntegrity);
    assert_eq!(world.service.sync().unwrap_err().kind(), ErrorKind::DataIntegrity);
    assert_eq!(world.entry(Node::Card(a), r), None);

    world.remove_card(b);
    assert!(world.entry(Node::CardContent(a1), r).unwrap().is_active());
    assert_eq!(world.service.direct_resources(world.root_card()).unwrap().len(), 2);
    world.service.verify_integrity().unwrap();
}

#[test]
fn test_readers_see_committed_state_during_writes() {
    let world = Arc::new(World::new());
    let (_, a1) = world.card(world.project.root_content);
    let content = Node::CardContent(a1);

    let writer = {
        let world = Arc::clone(&world);
        thread::spawn(move || {
            for i in 0..50 {
                let r = world.resource(world.root_card(), &format!("r{i}"));
                world.service.publish_resource(r).unwrap();
            }
        })
    };
    let reader = {
        let world = Arc::clone(&world);
        thread::spawn(move || {
            for _ in 0..50 {
                // a resource is listed only once its whole cascade is in
                for chain in world.service.get_resource_chain(content).unwrap() {
                    assert!(chain.iter().all(|entry| !entry.residual));
                }
                world.service.verify_integrity().unwrap();
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(world.service.get_available_active_resources(content).unwrap().len(), 50);
}
