//! Negative tests - rejected operations and their error kinds

use colab_hierarchy::{CardId, Node};
use colab_propagation::{EngineConfig, ErrorKind};
use colab_resource::{AbstractResourceId, DocumentId, ResourceData};
use colab_test_utils::World;

#[test]
fn test_rejects_unknown_owner() {
    let world = World::new();
    let err = world
        .service
        .create_resource(Node::Card(CardId::new()), ResourceData::new("r"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RelatedObjectNotFound);
    assert!(world.store().is_empty());
}

#[test]
fn test_rejects_unknown_ids() {
    let world = World::new();
    let missing = AbstractResourceId(999);
    for result in [
        world.service.publish_resource(missing),
        world.service.unpublish_resource(missing),
        world.service.discard_resource_or_ref(missing),
        world.service.restore_resource_or_ref(missing),
        world.service.delete_resource(missing),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }
    assert_eq!(
        world.service.set_category(missing, Some("docs")).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_rejects_reads_at_unknown_nodes() {
    let world = World::new();
    let node = Node::Card(CardId::new());
    assert_eq!(world.service.get_resource_chain(node).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        world.service.get_available_active_resources(node).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        world.service.rename_category(node, "a", "b").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_rejects_discarding_a_resource() {
    let world = World::new();
    let r = world.resource(world.root_card(), "r");
    let before = world.store();

    let err = world.service.discard_resource_or_ref(r).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert!(!err.is_retryable());
    assert_eq!(world.store(), before);
}

#[test]
fn test_rejects_lifecycle_calls_on_refs() {
    let world = World::new();
    let r = world.resource(world.root_card(), "r");
    let link = world.entry_id(world.root_content(), r);

    for result in [
        world.service.publish_resource(link),
        world.service.unpublish_resource(link),
        world.service.delete_resource(link),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DataIntegrity);
    }
}

#[test]
fn test_rejects_restoring_an_inherited_refusal() {
    let world = World::new();
    let (a, a1) = world.card(world.project.root_content);
    let r = world.resource(world.root_card(), "r");
    world.service.publish_resource(r).unwrap();
    world
        .service
        .discard_resource_or_ref(world.entry_id(world.root_content(), r))
        .unwrap();
    let before = world.store();

    for node in [Node::Card(a), Node::CardContent(a1)] {
        let err = world
            .service
            .restore_resource_or_ref(world.entry_id(node, r))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }
    assert_eq!(world.store(), before);
}

#[test]
fn test_rejects_double_anchored_document() {
    let world = World::new();
    let (a, _) = world.card(world.project.root_content);
    let document = DocumentId::new();
    world
        .service
        .create_resource(world.root_card(), ResourceData::new("first").with_document(document))
        .unwrap();

    let err = world
        .service
        .create_resource(Node::Card(a), ResourceData::new("second").with_document(document))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert_eq!(world.service.direct_resources(Node::Card(a)).unwrap().len(), 0);
}

#[test]
fn test_rejects_overlong_category() {
    let world = World::with_config(EngineConfig::new().with_max_category_len(4));
    let r = world.resource(world.root_card(), "r");
    assert_eq!(
        world.service.set_category(r, Some("manuals")).unwrap_err().kind(),
        ErrorKind::DataIntegrity
    );
    let err = world
        .service
        .create_resource(world.root_card(), ResourceData::new("s").with_category("manuals"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
}

#[test]
fn test_depth_limit_rolls_back_publish() {
    let world = World::with_config(EngineConfig::new().with_max_cascade_depth(3));
    let (_, a1) = world.card(world.project.root_content);
    let (_, b1) = world.card(a1);
    world.card(b1);
    let r = world.resource(world.root_card(), "r");
    let before = world.store();

    let err = world.service.publish_resource(r).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert_eq!(world.store(), before);
    assert!(!world.store().resource(r).unwrap().published);
}
