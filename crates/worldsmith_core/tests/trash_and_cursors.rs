use std::collections::HashSet;
use worldsmith_core::db::open_db_in_memory;
use worldsmith_core::{
    list_trash, CardService, ContainerService, EngineConfig, EntityKind, FeedCursor, NewCard,
    NewContainer, SqliteSyncCursorRepository, StoreError, WorldService,
};

#[test]
fn trash_lists_deleted_containers_and_cards_of_one_world() {
    let conn = open_db_in_memory().unwrap();
    let worlds = WorldService::try_new(&conn).unwrap();
    let aldara = worlds.create("Aldara", "").unwrap();
    let other = worlds.create("Brenn", "").unwrap();
    let containers = ContainerService::try_new(&conn).unwrap();
    let act = containers
        .create(NewContainer::root(aldara.id, "Act 1"))
        .unwrap();
    let scene = containers
        .create(NewContainer::child(act.id, "Scene"))
        .unwrap();
    let elsewhere = containers
        .create(NewContainer::root(other.id, "Elsewhere"))
        .unwrap();
    let cards = CardService::try_new(&conn).unwrap();
    let intro = cards
        .create(NewCard {
            parent_id: act.id,
            name: "Intro".to_string(),
            ..NewCard::default()
        })
        .unwrap();

    cards.soft_delete(intro.id).unwrap();
    containers.soft_delete(scene.id).unwrap();
    containers.soft_delete(elsewhere.id).unwrap();

    let config = EngineConfig::default();
    let items = list_trash(&conn, &config, aldara.id, 0, 0).unwrap();
    let ids: HashSet<_> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, HashSet::from([intro.id, scene.id]));
    assert!(items
        .windows(2)
        .all(|pair| pair[0].updated_at >= pair[1].updated_at));

    let card_item = items.iter().find(|item| item.id == intro.id).unwrap();
    assert_eq!(card_item.kind, EntityKind::Card);
    assert_eq!(card_item.name, "Intro");
    assert_eq!(card_item.parent_id, Some(act.id));

    assert_eq!(list_trash(&conn, &config, aldara.id, 1, 1).unwrap().len(), 1);

    containers.restore(scene.id).unwrap();
    let remaining = list_trash(&conn, &config, aldara.id, 0, 0).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, intro.id);
}

#[test]
fn sync_cursors_round_trip_per_scope_and_entity() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSyncCursorRepository::try_new(&conn).unwrap();
    let id = uuid::Uuid::new_v4();

    assert_eq!(repo.get_cursor("device-a", EntityKind::Card).unwrap(), None);

    repo.set_cursor("device-a", EntityKind::Card, &FeedCursor::after(42, id))
        .unwrap();
    repo.set_cursor("device-a", EntityKind::World, &FeedCursor::start())
        .unwrap();
    repo.set_cursor("device-b", EntityKind::Card, &FeedCursor::after(7, id))
        .unwrap();
    assert_eq!(
        repo.get_cursor("device-a", EntityKind::Card).unwrap(),
        Some(FeedCursor::after(42, id))
    );

    repo.set_cursor("device-a", EntityKind::Card, &FeedCursor::after(99, id))
        .unwrap();
    let scope = repo.list_scope("device-a").unwrap();
    assert_eq!(
        scope,
        vec![
            (EntityKind::Card, FeedCursor::after(99, id)),
            (EntityKind::World, FeedCursor::start()),
        ]
    );

    assert!(repo.clear_cursor("device-a", EntityKind::Card).unwrap());
    assert!(!repo.clear_cursor("device-a", EntityKind::Card).unwrap());
    assert_eq!(
        repo.get_cursor("device-b", EntityKind::Card).unwrap(),
        Some(FeedCursor::after(7, id))
    );

    assert!(matches!(
        repo.set_cursor("  ", EntityKind::Tag, &FeedCursor::start())
            .unwrap_err(),
        StoreError::InvalidData(_)
    ));
}
