use rusqlite::Connection;
use worldsmith_core::db::open_db_in_memory;
use worldsmith_core::repo::card_repo::SqliteCardRepository;
use worldsmith_core::repo::container_repo::SqliteContainerRepository;
use worldsmith_core::{
    CancelToken, Card, CardService, Container, ContainerService, DocumentRepository, EngineError,
    EntityKind, LayoutService, NewCard, NewContainer, TagService, World, WorldService,
};

struct Fixture {
    world: World,
    act: Container,
    intro: Card,
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

/// World "Aldara" / container "Act 1" / card "Intro".
fn seed(conn: &Connection) -> Fixture {
    let world = WorldService::try_new(conn)
        .unwrap()
        .create("Aldara", "")
        .unwrap();
    let act = ContainerService::try_new(conn)
        .unwrap()
        .create(NewContainer::root(world.id, "Act 1"))
        .unwrap();
    let intro = CardService::try_new(conn)
        .unwrap()
        .create(NewCard {
            parent_id: act.id,
            name: "Intro".to_string(),
            ..NewCard::default()
        })
        .unwrap();
    Fixture { world, act, intro }
}

fn load_card(conn: &Connection, card: &Card) -> Card {
    SqliteCardRepository::try_new(conn)
        .unwrap()
        .get(card.id, true)
        .unwrap()
        .unwrap()
}

fn load_container(conn: &Connection, container: &Container) -> Container {
    SqliteContainerRepository::try_new(conn)
        .unwrap()
        .get(container.id, true)
        .unwrap()
        .unwrap()
}

#[test]
fn soft_delete_container_hides_subtree_and_restore_revives_it() {
    let conn = setup();
    let fx = seed(&conn);
    let containers = ContainerService::try_new(&conn).unwrap();
    let cards = CardService::try_new(&conn).unwrap();

    assert_eq!(containers.soft_delete(fx.act.id).unwrap(), 2);
    assert!(containers
        .list_roots(fx.world.id, 0, 0)
        .unwrap()
        .is_empty());
    assert!(cards.list(fx.act.id, None, 0, 0).unwrap().is_empty());
    assert!(containers.list_children(fx.act.id, 0, 0).unwrap().is_empty());
    let deleted = load_card(&conn, &fx.intro);
    assert!(deleted.is_deleted);
    assert_eq!(deleted.version, fx.intro.version + 1);
    assert!(matches!(
        cards.get(fx.intro.id).unwrap_err(),
        EngineError::NotFound {
            kind: EntityKind::Card,
            ..
        }
    ));

    assert_eq!(containers.restore(fx.act.id).unwrap(), 2);
    let restored = load_card(&conn, &fx.intro);
    assert!(!restored.is_deleted);
    assert_eq!(restored.version, fx.intro.version + 2);
    assert!(restored.updated_at >= deleted.updated_at);
    assert_eq!(load_container(&conn, &fx.act).version, fx.act.version + 2);
    assert_eq!(cards.get(fx.intro.id).unwrap().name, "Intro");
    let listed = cards.list(fx.act.id, None, 0, 0).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, fx.intro.id);
}

/// `(id, version, is_deleted)` of every container and card, sorted by id.
fn tree_state(conn: &Connection) -> Vec<(String, i64, bool)> {
    let mut stmt = conn
        .prepare(
            "SELECT id, version, is_deleted FROM containers
             UNION ALL
             SELECT id, version, is_deleted FROM cards
             ORDER BY id;",
        )
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)? == 1,
            ))
        })
        .unwrap();
    rows.map(Result::unwrap).collect()
}

#[test]
fn nested_tree_round_trips_through_delete_and_restore() {
    let conn = setup();
    let fx = seed(&conn);
    let containers = ContainerService::try_new(&conn).unwrap();
    let cards = CardService::try_new(&conn).unwrap();
    let card_in = |parent: &Container, name: &str| {
        cards
            .create(NewCard {
                parent_id: parent.id,
                name: name.to_string(),
                ..NewCard::default()
            })
            .unwrap()
    };

    let scene = containers
        .create(NewContainer::child(fx.act.id, "Scene"))
        .unwrap();
    let beat = containers
        .create(NewContainer::child(scene.id, "Beat"))
        .unwrap();
    let epilogue = containers
        .create(NewContainer::root(fx.world.id, "Epilogue"))
        .unwrap();
    let hidden_cards = [
        card_in(&scene, "Ambush"),
        card_in(&scene, "Parley"),
        card_in(&beat, "Twist"),
    ];
    let outside = card_in(&epilogue, "Farewell");

    let mut hidden: Vec<String> = [fx.act.id, scene.id, beat.id, fx.intro.id]
        .into_iter()
        .chain(hidden_cards.iter().map(|card| card.id))
        .map(|id| id.to_string())
        .collect();
    hidden.sort();
    let before = tree_state(&conn);

    assert_eq!(containers.soft_delete(fx.act.id).unwrap(), hidden.len());
    let after_delete = tree_state(&conn);
    let deleted: Vec<String> = after_delete
        .iter()
        .filter(|(_, _, is_deleted)| *is_deleted)
        .map(|(id, _, _)| id.clone())
        .collect();
    assert_eq!(deleted, hidden);
    for row in [epilogue.id.to_string(), outside.id.to_string()] {
        let old = before.iter().find(|(id, _, _)| *id == row).unwrap();
        let new = after_delete.iter().find(|(id, _, _)| *id == row).unwrap();
        assert_eq!(old, new);
    }

    assert_eq!(containers.restore(fx.act.id).unwrap(), hidden.len());
    let after_restore = tree_state(&conn);
    assert!(after_restore.iter().all(|(_, _, is_deleted)| !is_deleted));
    for (old, new) in before.iter().zip(&after_restore) {
        assert_eq!(old.0, new.0);
        if hidden.contains(&old.0) {
            assert!(new.1 > old.1, "{} version did not advance", old.0);
        } else {
            assert_eq!(new.1, old.1);
        }
    }
    assert_eq!(cards.list(beat.id, None, 0, 0).unwrap()[0].name, "Twist");
    assert_eq!(containers.list_by_world(fx.world.id, 0, 0).unwrap().len(), 4);
}

#[test]
fn cascade_stamps_one_timestamp_on_every_row() {
    let conn = setup();
    let fx = seed(&conn);
    let child = ContainerService::try_new(&conn)
        .unwrap()
        .create(NewContainer::child(fx.act.id, "Scene"))
        .unwrap();

    ContainerService::try_new(&conn)
        .unwrap()
        .soft_delete(fx.act.id)
        .unwrap();

    let act = load_container(&conn, &fx.act);
    let scene = load_container(&conn, &child);
    let intro = load_card(&conn, &fx.intro);
    assert_eq!(act.updated_at, scene.updated_at);
    assert_eq!(act.updated_at, intro.updated_at);
    assert_eq!(scene.world_id, fx.world.id);
}

#[test]
fn soft_delete_twice_reports_no_changes() {
    let conn = setup();
    let fx = seed(&conn);
    let containers = ContainerService::try_new(&conn).unwrap();

    assert_eq!(containers.soft_delete(fx.act.id).unwrap(), 2);
    let after_first = load_card(&conn, &fx.intro);
    assert_eq!(containers.soft_delete(fx.act.id).unwrap(), 0);
    assert_eq!(load_card(&conn, &fx.intro), after_first);
}

#[test]
fn purge_removes_rows_and_is_idempotent() {
    let conn = setup();
    let fx = seed(&conn);
    let tag = TagService::try_new(&conn)
        .unwrap()
        .create("Boss", 0xFFFF_0000)
        .unwrap();
    CardService::try_new(&conn)
        .unwrap()
        .set_tags(fx.intro.id, &[tag.id], None)
        .unwrap();
    LayoutService::try_new(&conn)
        .unwrap()
        .set(fx.intro.id, serde_json::json!({ "blocks": [] }), None)
        .unwrap();

    let containers = ContainerService::try_new(&conn).unwrap();
    // link + layout + card + container
    assert_eq!(containers.purge(fx.act.id).unwrap(), 4);
    assert_eq!(containers.purge(fx.act.id).unwrap(), 0);

    let remaining: i64 = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM cards)
                  + (SELECT COUNT(*) FROM containers)
                  + (SELECT COUNT(*) FROM card_tags)
                  + (SELECT COUNT(*) FROM card_layouts);",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(matches!(
        CardService::try_new(&conn)
            .unwrap()
            .list(fx.act.id, None, 0, 0)
            .unwrap_err(),
        EngineError::NotFound {
            kind: EntityKind::Container,
            ..
        }
    ));
    // Tags are not part of the content tree.
    assert_eq!(TagService::try_new(&conn).unwrap().get(tag.id).unwrap().id, tag.id);
}

#[test]
fn restore_conflicts_with_alive_sibling_created_meanwhile() {
    let conn = setup();
    let fx = seed(&conn);
    let containers = ContainerService::try_new(&conn).unwrap();

    containers.soft_delete(fx.act.id).unwrap();
    containers
        .create(NewContainer::root(fx.world.id, "act 1"))
        .unwrap();

    let err = containers.restore(fx.act.id).unwrap_err();
    match err {
        EngineError::CascadeConflict { kind, id, .. } => {
            assert_eq!(kind, EntityKind::Container);
            assert_eq!(id, fx.act.id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(load_container(&conn, &fx.act).is_deleted);
    assert!(load_card(&conn, &fx.intro).is_deleted);
}

#[test]
fn restore_conflicts_inside_the_subtree() {
    let conn = setup();
    let fx = seed(&conn);
    let cards = CardService::try_new(&conn).unwrap();

    cards.soft_delete(fx.intro.id).unwrap();
    cards
        .create(NewCard {
            parent_id: fx.act.id,
            name: "INTRO".to_string(),
            ..NewCard::default()
        })
        .unwrap();
    let containers = ContainerService::try_new(&conn).unwrap();
    containers.soft_delete(fx.act.id).unwrap();

    assert!(matches!(
        containers.restore(fx.act.id).unwrap_err(),
        EngineError::CascadeConflict {
            kind: EntityKind::Card,
            ..
        }
    ));
}

#[test]
fn restore_under_deleted_parent_is_refused() {
    let conn = setup();
    let fx = seed(&conn);
    let containers = ContainerService::try_new(&conn).unwrap();
    let scene = containers
        .create(NewContainer::child(fx.act.id, "Scene"))
        .unwrap();

    containers.soft_delete(scene.id).unwrap();
    containers.soft_delete(fx.act.id).unwrap();

    let err = containers.restore(scene.id).unwrap_err();
    match err {
        EngineError::NotFound { kind, id } => {
            assert_eq!(kind, EntityKind::Container);
            assert_eq!(id, fx.act.id);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn world_cascade_covers_containers_and_cards() {
    let conn = setup();
    let fx = seed(&conn);
    let worlds = WorldService::try_new(&conn).unwrap();

    assert_eq!(worlds.soft_delete(fx.world.id).unwrap(), 3);
    assert!(worlds.list(0, 0).unwrap().is_empty());
    assert!(load_container(&conn, &fx.act).is_deleted);

    assert_eq!(worlds.restore(fx.world.id).unwrap(), 3);
    assert_eq!(worlds.get(fx.world.id).unwrap().version, fx.world.version + 2);
    assert!(!load_card(&conn, &fx.intro).is_deleted);

    assert_eq!(worlds.purge(fx.world.id).unwrap(), 3);
    assert_eq!(worlds.purge(fx.world.id).unwrap(), 0);
}

#[test]
fn world_restore_conflicts_with_new_world_of_same_name() {
    let conn = setup();
    let fx = seed(&conn);
    let worlds = WorldService::try_new(&conn).unwrap();

    worlds.soft_delete(fx.world.id).unwrap();
    worlds.create("  aldara ", "").unwrap();

    assert!(matches!(
        worlds.restore(fx.world.id).unwrap_err(),
        EngineError::CascadeConflict {
            kind: EntityKind::World,
            ..
        }
    ));
}

#[test]
fn single_card_restore_reports_duplicate_name() {
    let conn = setup();
    let fx = seed(&conn);
    let cards = CardService::try_new(&conn).unwrap();

    cards.soft_delete(fx.intro.id).unwrap();
    cards
        .create(NewCard {
            parent_id: fx.act.id,
            name: "Intro".to_string(),
            ..NewCard::default()
        })
        .unwrap();

    assert!(matches!(
        cards.restore(fx.intro.id).unwrap_err(),
        EngineError::DuplicateName {
            kind: EntityKind::Card,
            ..
        }
    ));
}

#[test]
fn cancelled_cascade_leaves_no_change() {
    let conn = setup();
    let fx = seed(&conn);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = ContainerService::try_new(&conn)
        .unwrap()
        .with_cancel(cancel)
        .soft_delete(fx.act.id)
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(err.code(), "cancelled");
    assert!(!load_container(&conn, &fx.act).is_deleted);
    assert!(!load_card(&conn, &fx.intro).is_deleted);
}

#[test]
fn missing_root_is_not_found() {
    let conn = setup();
    seed(&conn);
    let missing = uuid::Uuid::new_v4();

    let containers = ContainerService::try_new(&conn).unwrap();
    assert!(matches!(
        containers.soft_delete(missing).unwrap_err(),
        EngineError::NotFound {
            kind: EntityKind::Container,
            ..
        }
    ));
    assert_eq!(containers.purge(missing).unwrap(), 0);
}
