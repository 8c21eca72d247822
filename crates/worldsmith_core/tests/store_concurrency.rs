use worldsmith_core::db::open_db_in_memory;
use worldsmith_core::repo::world_repo::SqliteWorldRepository;
use worldsmith_core::{
    CancelToken, ContainerService, DocumentRepository, EngineError, EntityKind, NewContainer,
    StoreError, World, WorldService,
};

#[test]
fn upsert_inserts_at_version_zero_then_bumps() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteWorldRepository::try_new(&conn).unwrap();

    let world = World::new("Aldara", "");
    let inserted = repo.upsert(&world, None).unwrap();
    assert_eq!(inserted.version, 0);
    assert!(inserted.updated_at > 0);

    let mut edited = inserted.clone();
    edited.description = "A shattered continent".to_string();
    let updated = repo.upsert(&edited, Some(0)).unwrap();
    assert_eq!(updated.version, 1);
    assert!(updated.updated_at >= inserted.updated_at);
    assert_eq!(updated.description, "A shattered continent");
}

#[test]
fn stale_expected_version_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteWorldRepository::try_new(&conn).unwrap();
    let world = repo.upsert(&World::new("Aldara", ""), None).unwrap();
    repo.upsert(&world, Some(0)).unwrap();

    let err = repo.upsert(&world, Some(0)).unwrap_err();
    match err {
        StoreError::ConcurrencyConflict {
            kind,
            id,
            expected,
            actual,
        } => {
            assert_eq!(kind, EntityKind::World);
            assert_eq!(id, world.id);
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn expected_version_on_missing_row_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteWorldRepository::try_new(&conn).unwrap();

    let err = repo.upsert(&World::new("Ghost", ""), Some(3)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            kind: EntityKind::World,
            ..
        }
    ));
}

#[test]
fn guarded_delete_checks_version_and_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteWorldRepository::try_new(&conn).unwrap();
    let world = repo.upsert(&World::new("Aldara", ""), None).unwrap();

    assert!(matches!(
        repo.delete(world.id, Some(7)).unwrap_err(),
        StoreError::ConcurrencyConflict { actual: 0, .. }
    ));
    assert!(repo.delete(world.id, Some(0)).unwrap());
    assert!(!repo.delete(world.id, Some(0)).unwrap());
    assert!(repo.get(world.id, false).unwrap().is_none());
    assert!(repo.get(world.id, true).unwrap().unwrap().is_deleted);
}

#[test]
fn service_maps_stale_versions_to_engine_conflicts() {
    let conn = open_db_in_memory().unwrap();
    let worlds = WorldService::try_new(&conn).unwrap();
    let world = worlds.create("Aldara", "").unwrap();
    worlds.rename(world.id, "Aldara Prime", Some(0)).unwrap();

    let err = worlds.rename(world.id, "Aldara Minor", Some(0)).unwrap_err();
    assert_eq!(err.code(), "concurrency_conflict");
    assert!(matches!(
        err,
        EngineError::ConcurrencyConflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert_eq!(worlds.get(world.id).unwrap().name, "Aldara Prime");
}

#[test]
fn cancelled_command_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let world = WorldService::try_new(&conn)
        .unwrap()
        .create("Aldara", "")
        .unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = ContainerService::try_new(&conn)
        .unwrap()
        .with_cancel(cancel)
        .create(NewContainer::root(world.id, "Act 1"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM containers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
