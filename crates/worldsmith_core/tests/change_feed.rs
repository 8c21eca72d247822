use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use worldsmith_core::db::open_db_in_memory;
use worldsmith_core::{
    BlockTemplateService, CardService, ChangeFeed, ContainerService, EngineConfig, FeedCursor,
    LayoutService, NewCard, NewContainer, TagService, World, WorldService,
};

fn create_worlds(conn: &Connection, count: usize) -> Vec<World> {
    let worlds = WorldService::try_new(conn).unwrap();
    (0..count)
        .map(|index| worlds.create(&format!("World {index}"), "").unwrap())
        .collect()
}

fn force_timestamp(conn: &Connection, table: &str, updated_at: i64) {
    conn.execute(&format!("UPDATE {table} SET updated_at = ?1;"), [updated_at])
        .unwrap();
}

#[test]
fn paging_through_timestamp_ties_is_gap_free() {
    let conn = open_db_in_memory().unwrap();
    let created = create_worlds(&conn, 5);
    force_timestamp(&conn, "worlds", 1_000);
    let feed = ChangeFeed::new(&conn);

    let mut cursor = FeedCursor::start();
    let mut seen = Vec::new();
    let mut pages = 0;
    loop {
        let page = feed.worlds_since(&cursor, 2).unwrap();
        pages += 1;
        assert!(page.items.len() <= 2);
        seen.extend(page.items.iter().map(|world| world.id));
        cursor = page.next_cursor;
        if !page.has_more {
            break;
        }
    }

    assert_eq!(pages, 3);
    let mut expected: Vec<_> = created.iter().map(|world| world.id).collect();
    expected.sort();
    assert_eq!(seen, expected);
    assert_eq!(cursor, FeedCursor::after(1_000, expected[4]));
}

#[test]
fn empty_page_keeps_the_cursor() {
    let conn = open_db_in_memory().unwrap();
    create_worlds(&conn, 2);
    let feed = ChangeFeed::new(&conn);

    let first = feed.worlds_since(&FeedCursor::start(), 10).unwrap();
    assert_eq!(first.items.len(), 2);
    assert!(!first.has_more);

    let empty = feed.worlds_since(&first.next_cursor, 10).unwrap();
    assert!(empty.items.is_empty());
    assert!(!empty.has_more);
    assert_eq!(empty.next_cursor, first.next_cursor);
}

#[test]
fn deleted_rows_are_included_and_purged_rows_are_gone() {
    let conn = open_db_in_memory().unwrap();
    let created = create_worlds(&conn, 3);
    force_timestamp(&conn, "worlds", 1_000);
    let worlds = WorldService::try_new(&conn).unwrap();
    worlds.soft_delete(created[0].id).unwrap();
    worlds.purge(created[1].id).unwrap();

    let page = ChangeFeed::new(&conn)
        .worlds_since(&FeedCursor::start(), 0)
        .unwrap();
    let ids: Vec<_> = page.items.iter().map(|world| world.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&created[1].id));
    // The soft-deleted world was stamped last.
    let last = page.items.last().unwrap();
    assert_eq!(last.id, created[0].id);
    assert!(last.is_deleted);
}

#[test]
fn take_is_clamped_by_config() {
    let conn = open_db_in_memory().unwrap();
    create_worlds(&conn, 4);
    let config = EngineConfig {
        feed_default_take: 1,
        feed_max_take: 3,
        ..EngineConfig::default()
    };
    let feed = ChangeFeed::new(&conn).with_config(config);

    let default_page = feed.worlds_since(&FeedCursor::start(), 0).unwrap();
    assert_eq!(default_page.items.len(), 1);
    assert!(default_page.has_more);

    let clamped = feed.worlds_since(&FeedCursor::start(), 50).unwrap();
    assert_eq!(clamped.items.len(), 3);
    assert!(clamped.has_more);
}

#[test]
fn every_entity_family_has_a_feed() {
    let conn = open_db_in_memory().unwrap();
    let world = create_worlds(&conn, 1).remove(0);
    let act = ContainerService::try_new(&conn)
        .unwrap()
        .create(NewContainer::root(world.id, "Act 1"))
        .unwrap();
    let cards = CardService::try_new(&conn).unwrap();
    let intro = cards
        .create(NewCard {
            parent_id: act.id,
            name: "Intro".to_string(),
            ..NewCard::default()
        })
        .unwrap();
    let tag = TagService::try_new(&conn)
        .unwrap()
        .create("Opening", 7)
        .unwrap();
    cards.set_tags(intro.id, &[tag.id], None).unwrap();
    LayoutService::try_new(&conn)
        .unwrap()
        .set(intro.id, json!({ "blocks": [] }), None)
        .unwrap();
    BlockTemplateService::try_new(&conn)
        .unwrap()
        .create("Lore", json!({}))
        .unwrap();

    let feed = ChangeFeed::new(&conn);
    let start = FeedCursor::start();
    assert_eq!(feed.containers_since(&start, 0).unwrap().items[0].id, act.id);
    let card_page = feed.cards_since(&start, 0).unwrap();
    assert_eq!(card_page.items[0].tag_ids, vec![tag.id]);
    assert_eq!(feed.tags_since(&start, 0).unwrap().items.len(), 1);
    let layout_page = feed.layouts_since(&start, 0).unwrap();
    assert_eq!(layout_page.items[0].card_id, intro.id);
    assert_eq!(layout_page.next_cursor.after_id, Some(intro.id));
    assert_eq!(feed.block_templates_since(&start, 0).unwrap().items.len(), 1);

    let distinct: HashSet<_> = feed
        .worlds_since(&start, 0)
        .unwrap()
        .items
        .into_iter()
        .map(|world| world.id)
        .collect();
    assert_eq!(distinct.len(), 1);
}
