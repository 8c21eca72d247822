use rusqlite::Connection;
use worldsmith_core::db::open_db_in_memory;
use worldsmith_core::repo::card_repo::SqliteCardRepository;
use worldsmith_core::{
    Card, CardService, Container, ContainerService, DocumentRepository, EngineError, EntityKind,
    NewCard, NewContainer, NewVariant, WorldService,
};

fn setup() -> (Connection, Container) {
    let conn = open_db_in_memory().unwrap();
    let world = WorldService::try_new(&conn)
        .unwrap()
        .create("Aldara", "")
        .unwrap();
    let shop = ContainerService::try_new(&conn)
        .unwrap()
        .create(NewContainer::root(world.id, "Shop"))
        .unwrap();
    (conn, shop)
}

fn create_card(service: &CardService<'_>, parent: &Container, name: &str) -> Card {
    service
        .create(NewCard {
            parent_id: parent.id,
            name: name.to_string(),
            ..NewCard::default()
        })
        .unwrap()
}

fn variant(name: &str) -> NewVariant {
    NewVariant {
        name: name.to_string(),
        ..NewVariant::default()
    }
}

fn stored(conn: &Connection, id: uuid::Uuid) -> Card {
    SqliteCardRepository::try_new(conn)
        .unwrap()
        .get(id, true)
        .unwrap()
        .unwrap()
}

#[test]
fn create_variant_appends_in_order() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");

    let blue = cards.create_variant(potion.id, variant("Potion (Blue)")).unwrap();
    let red = cards.create_variant(potion.id, variant("Potion (Red)")).unwrap();

    assert_eq!(blue.variant_of_id, Some(potion.id));
    assert_eq!(blue.parent_id, shop.id);
    assert_eq!(blue.variant_order, 0);
    assert_eq!(red.variant_order, 1);
    assert_eq!(blue.version, 0);
    assert!(blue.is_variant());
}

#[test]
fn reorder_swaps_orders_atomically() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let v0 = cards.create_variant(potion.id, variant("Blue")).unwrap();
    let v1 = cards.create_variant(potion.id, variant("Red")).unwrap();

    assert_eq!(cards.reorder_variants(potion.id, &[v1.id, v0.id]).unwrap(), 2);

    let group = cards.get_group(potion.id).unwrap();
    assert_eq!(group.root.id, potion.id);
    assert_eq!(group.ids(), vec![potion.id, v1.id, v0.id]);
    assert_eq!(stored(&conn, v1.id).variant_order, 0);
    assert_eq!(stored(&conn, v0.id).variant_order, 1);
    assert_eq!(stored(&conn, v0.id).version, v0.version + 1);
}

/// Every ordering of `items`, lexicographic by input position.
fn permutations<T: Copy>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (index, first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(index);
        for mut tail in permutations(&rest) {
            tail.insert(0, *first);
            out.push(tail);
        }
    }
    out
}

#[test]
fn reorder_applies_every_permutation_of_four_variants() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let variants: Vec<uuid::Uuid> = ["Blue", "Red", "Green", "Gold"]
        .into_iter()
        .map(|name| cards.create_variant(potion.id, variant(name)).unwrap().id)
        .collect();

    let orders = permutations(&variants);
    assert_eq!(orders.len(), 24);
    for order in orders {
        assert_eq!(cards.reorder_variants(potion.id, &order).unwrap(), 4);

        let group = cards.get_group(potion.id).unwrap();
        let mut expected = vec![potion.id];
        expected.extend(&order);
        assert_eq!(group.ids(), expected);
        for (slot, id) in order.iter().enumerate() {
            assert_eq!(stored(&conn, *id).variant_order, slot as i64);
        }
    }

    let duplicate_slots: i64 = conn
        .query_row(
            "SELECT COUNT(*) - COUNT(DISTINCT variant_order)
             FROM cards
             WHERE variant_of_id = ?1;",
            [potion.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(duplicate_slots, 0);
}

#[test]
fn reorder_rejects_partial_or_foreign_permutations() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let stranger = create_card(&cards, &shop, "Sword");
    let v0 = cards.create_variant(potion.id, variant("Blue")).unwrap();
    let v1 = cards.create_variant(potion.id, variant("Red")).unwrap();

    for attempt in [
        vec![v0.id],
        vec![v0.id, stranger.id],
        vec![v0.id, v0.id],
        vec![v0.id, v1.id, stranger.id],
    ] {
        let err = cards.reorder_variants(potion.id, &attempt).unwrap_err();
        assert!(
            matches!(err, EngineError::Integrity(_)),
            "unexpected error: {err}"
        );
    }
    assert_eq!(stored(&conn, v0.id).variant_order, 0);
    assert_eq!(stored(&conn, v1.id).variant_order, 1);
}

#[test]
fn variant_of_variant_is_rejected() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let blue = cards.create_variant(potion.id, variant("Blue")).unwrap();

    assert!(matches!(
        cards.create_variant(blue.id, variant("Dark Blue")).unwrap_err(),
        EngineError::Integrity(_)
    ));
}

#[test]
fn variant_must_share_root_container() {
    let (conn, shop) = setup();
    let other = ContainerService::try_new(&conn)
        .unwrap()
        .create(NewContainer::root(shop.world_id, "Forge"))
        .unwrap();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");

    let draft = NewVariant {
        parent_id: Some(other.id),
        ..variant("Blue")
    };
    assert!(matches!(
        cards.create_variant(potion.id, draft).unwrap_err(),
        EngineError::Integrity(_)
    ));
}

#[test]
fn delete_variant_keeps_sibling_orders() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let v0 = cards.create_variant(potion.id, variant("Blue")).unwrap();
    let v1 = cards.create_variant(potion.id, variant("Red")).unwrap();

    assert!(cards.delete_variant(v0.id).unwrap());
    assert!(!cards.delete_variant(v0.id).unwrap());

    let group = cards.get_group(v1.id).unwrap();
    assert_eq!(group.root.id, potion.id);
    assert_eq!(group.variants.len(), 1);
    assert_eq!(group.variants[0].variant_order, 1);
    assert!(!stored(&conn, potion.id).is_deleted);

    assert!(matches!(
        cards.delete_variant(potion.id).unwrap_err(),
        EngineError::Integrity(_)
    ));
    assert!(matches!(
        cards.delete_variant(uuid::Uuid::new_v4()).unwrap_err(),
        EngineError::NotFound {
            kind: EntityKind::Card,
            ..
        }
    ));
}

#[test]
fn new_variant_order_skips_deleted_slots() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    cards.create_variant(potion.id, variant("Blue")).unwrap();
    let red = cards.create_variant(potion.id, variant("Red")).unwrap();
    cards.delete_variant(red.id).unwrap();

    let green = cards.create_variant(potion.id, variant("Green")).unwrap();
    assert_eq!(green.variant_order, 2);
}

#[test]
fn restored_variant_is_reslotted_when_order_is_taken() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let v0 = cards.create_variant(potion.id, variant("Blue")).unwrap();
    let v1 = cards.create_variant(potion.id, variant("Red")).unwrap();

    cards.delete_variant(v0.id).unwrap();
    cards.reorder_variants(potion.id, &[v1.id]).unwrap();
    assert_eq!(stored(&conn, v1.id).variant_order, 0);

    assert_eq!(cards.restore(v0.id).unwrap(), 1);
    let restored = stored(&conn, v0.id);
    assert!(!restored.is_deleted);
    assert_eq!(restored.variant_order, 1);
    assert_eq!(cards.get_group(potion.id).unwrap().ids(), vec![potion.id, v1.id, v0.id]);
}

#[test]
fn root_lifecycle_carries_variants() {
    let (conn, shop) = setup();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let v0 = cards.create_variant(potion.id, variant("Blue")).unwrap();
    let v1 = cards.create_variant(potion.id, variant("Red")).unwrap();

    assert_eq!(cards.soft_delete(potion.id).unwrap(), 3);
    assert!(stored(&conn, v0.id).is_deleted);

    // A variant cannot come back before its root.
    assert!(matches!(
        cards.restore(v1.id).unwrap_err(),
        EngineError::NotFound {
            kind: EntityKind::Card,
            ..
        }
    ));
    assert_eq!(cards.restore(potion.id).unwrap(), 1);
    assert_eq!(cards.restore(v1.id).unwrap(), 1);

    assert_eq!(cards.purge(potion.id).unwrap(), 3);
    assert_eq!(cards.purge(potion.id).unwrap(), 0);
}

#[test]
fn moving_root_moves_variants_and_variants_cannot_move_alone() {
    let (conn, shop) = setup();
    let forge = ContainerService::try_new(&conn)
        .unwrap()
        .create(NewContainer::root(shop.world_id, "Forge"))
        .unwrap();
    let cards = CardService::try_new(&conn).unwrap();
    let potion = create_card(&cards, &shop, "Potion");
    let blue = cards.create_variant(potion.id, variant("Blue")).unwrap();

    assert!(matches!(
        cards.move_to(blue.id, forge.id, None).unwrap_err(),
        EngineError::Integrity(_)
    ));

    let moved = cards.move_to(potion.id, forge.id, None).unwrap();
    assert_eq!(moved.parent_id, forge.id);
    assert_eq!(stored(&conn, blue.id).parent_id, forge.id);
    assert!(cards.list(shop.id, None, 0, 0).unwrap().is_empty());
    assert_eq!(cards.list(forge.id, None, 0, 0).unwrap().len(), 2);
}
