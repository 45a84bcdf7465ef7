use {
    super::{CountingLocks, Fixture, DATABASE},
    catalog::{
        entity::{
            Area, AreaContent, Column, ColumnDef, Constraint, ConstraintKind, File, Index, Table,
            TableDef,
        },
        persist::Persist,
        CatalogConfig, Database, Environment, Error, LogData, Severity, Status, Treatment,
    },
    def::{transaction::TransactionContext, ObjectId, Tuple},
    std::{
        collections::BTreeMap,
        fs,
        sync::{atomic::Ordering, Arc},
    },
    tempfile::tempdir,
};

#[test]
fn created_objects_survive_reopen() {
    let mut fx = Fixture::new();
    let area_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", area_path.to_str().unwrap())
        .unwrap();
    let table = fx.table("t", Some(area));
    let index = fx
        .db
        .create_index(&fx.tx, "t", "t_id", &["id"], true)
        .unwrap();
    fx.db.persist(&fx.tx).unwrap();

    let mut fx = fx.reopen();
    let objects = fx.db.objects();

    let t = objects.table_named("t").unwrap();
    assert_eq!(t.object().id(), table);
    assert_eq!(t.object().status(), Status::Persistent);
    assert_eq!(t.area(), area);
    let columns = objects
        .columns_of(t)
        .iter()
        .map(|c| c.object().name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(columns, ["id", "label"]);

    let i = fx.db.get::<Index>(index).unwrap();
    assert!(i.is_unique());
    assert_eq!(i.columns(), [0]);
    let constraint = objects
        .constraints
        .values()
        .find(|c| c.table() == table)
        .unwrap();
    assert_eq!(constraint.kind(), ConstraintKind::Unique);
    assert_eq!(constraint.index(), index);

    let files = t.files().collect::<Vec<_>>();
    assert_eq!(files.len(), 2);
    for id in files {
        let file = fx.db.get::<File>(id).unwrap();
        assert!(file.path().starts_with(&area_path));
        assert!(file.path().exists());
        assert_eq!(objects.content_for(id).unwrap().area(), area);
    }

    assert!(fx.db.verify(Treatment::REPORT).unwrap().is_good());
}

#[test]
fn dropping_an_unpersisted_table_cancels_it() {
    let mut fx = Fixture::new();
    let table = fx.table("t", None);
    let dir = fx.file_path(fx.heap_of(table));
    assert!(dir.exists());

    fx.db.drop_table(&fx.tx, "t").unwrap();
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().object().status(),
        Status::CreateCanceled
    );
    assert!(fx.db.objects().table_named("t").is_none());

    let evicted = fx.db.persist(&fx.tx).unwrap();
    assert!(evicted.is_empty());
    assert!(fx.db.get::<Table>(table).is_none());
    assert!(!dir.exists());

    let fx = fx.reopen();
    assert!(fx.db.objects().is_empty());
}

#[test]
fn evicted_table_comes_back() {
    let mut fx = Fixture::new();
    let table = fx.table("t", None);
    let data = fx.file_path(fx.heap_of(table));
    fx.db.persist(&fx.tx).unwrap();

    fx.db.drop_table(&fx.tx, "t").unwrap();
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().object().status(),
        Status::Deleted
    );
    assert!(!fx.db.is_valid(table, u64::MAX));

    // the table, its two columns and its heap file
    let evicted = fx.db.persist(&fx.tx).unwrap();
    assert_eq!(evicted.len(), 4);
    assert!(fx.db.get::<Table>(table).is_none());
    assert!(!data.exists());

    for entity in evicted {
        fx.db.restore_evicted(entity);
    }
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().object().status(),
        Status::DeleteCanceled
    );
    fx.db.persist(&fx.tx).unwrap();
    assert!(data.is_dir());

    let fx = fx.reopen();
    let t = fx.db.objects().table_named("t").unwrap();
    assert_eq!(t.object().id(), table);
    assert_eq!(fx.db.objects().columns_of(t).len(), 2);
    assert_eq!(fx.file_path(fx.heap_of(table)), data);
}

#[test]
fn area_in_use_cannot_be_dropped() {
    let mut fx = Fixture::new();
    let path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", path.to_str().unwrap())
        .unwrap();
    fx.table("t", Some(area));

    assert!(matches!(
        fx.db.drop_area(&fx.tx, "a1"),
        Err(Error::InUse { .. })
    ));

    fx.db.drop_table(&fx.tx, "t").unwrap();
    fx.db.drop_area(&fx.tx, "a1").unwrap();
    assert!(fx.db.objects().area_named("a1").is_none());
}

#[test]
fn names_are_unique() {
    let mut fx = Fixture::new();
    fx.table("t", None);

    let def = TableDef::new("t", vec![]);
    assert!(matches!(
        fx.db.create_table(&fx.tx, &def),
        Err(Error::DuplicateName { .. })
    ));
    assert!(matches!(
        fx.db.create_index(&fx.tx, "t", "i", &["missing"], false),
        Err(Error::NameNotFound { .. })
    ));
}

#[test]
fn read_only_transactions_change_nothing() {
    let mut fx = Fixture::new();
    let tx = TransactionContext::read_only(2);

    let def = TableDef::new("t", vec![]);
    assert!(matches!(
        fx.db.create_table(&tx, &def),
        Err(Error::ReadOnly { .. })
    ));
    assert!(fx.db.objects().is_empty());
}

#[test]
fn row_ids_keep_rising_across_reopen() {
    let mut fx = Fixture::new();
    fx.table("t", None);

    let next = |fx: &Fixture| {
        fx.db
            .next_row_id(&fx.tx, "t")
            .unwrap()
            .as_i64()
            .unwrap()
    };
    let first = next(&fx);
    let second = next(&fx);
    assert!(second > first);

    let fx = fx.reopen();
    assert!(next(&fx) > second);
}

#[test]
fn verify_recreates_missing_data_directories() {
    let mut fx = Fixture::new();
    let table = fx.table("t", None);
    fx.db.persist(&fx.tx).unwrap();

    let dir = fx.file_path(fx.heap_of(table));
    fs::remove_dir_all(&dir).unwrap();

    let report = fx.db.verify(Treatment::REPORT).unwrap();
    assert!(!report.is_good());
    assert_eq!(report.count(Severity::Correctable), 1);
    assert!(!dir.exists());

    let fixed = fx.db.verify(Treatment::CORRECT).unwrap();
    assert!(fixed.is_good());
    assert_eq!(fixed.count(Severity::Corrected), 1);
    assert!(dir.exists());
}

#[test]
fn database_moves_and_drops() {
    let mut fx = Fixture::new();
    fx.table("t", None);
    fx.db.persist(&fx.tx).unwrap();

    let old = fx.db.root().to_path_buf();
    let new = fx.path("moved");
    fx.db.move_to(&fx.tx, new.clone()).unwrap();
    assert_eq!(fx.db.root(), new);
    assert!(!old.exists());
    assert!(matches!(
        fx.log.records(DATABASE).last(),
        Some(LogData::MoveDatabase(_))
    ));

    let mut fx = fx.reopen();
    assert!(fx.db.objects().table_named("t").is_some());

    let data_dir = fx.db.data_dir().to_path_buf();
    fx.db.drop_database(&fx.tx).unwrap();
    assert!(!new.exists());
    assert!(!data_dir.exists());
    assert!(matches!(
        fx.db.create_table(&fx.tx, &TableDef::new("u", vec![])),
        Err(Error::ObjectNotFound { .. })
    ));
}

#[test]
fn store_latches_are_always_released() {
    let dir = tempdir().unwrap();
    let locks = Arc::new(CountingLocks::default());
    let env = Environment::builder(CatalogConfig::with_data_dir(dir.path()))
        .lock_manager(locks.clone())
        .build()
        .unwrap();
    let tx = TransactionContext::read_write(1);

    let mut db = Database::create(env.clone(), &tx, DATABASE, "db").unwrap();
    let def = TableDef::new("t", vec![ColumnDef::new("id", "int", false)]);
    db.create_table(&tx, &def).unwrap();
    db.persist(&tx).unwrap();
    db.drop_table(&tx, "t").unwrap();
    db.persist(&tx).unwrap();
    db.close(&tx).unwrap();

    assert!(locks.acquired.load(Ordering::SeqCst) > 0);
    assert!(locks.balanced());

    let db = Database::open(env, DATABASE, "db").unwrap();
    assert!(db.objects().is_empty());
    assert!(locks.balanced());
}

fn check_locators<T: Persist>(db: &Database) {
    for entity in T::map(db.objects()).values() {
        let object = entity.object();
        let stored = matches!(
            object.status(),
            Status::Persistent | Status::Changed | Status::Deleted | Status::DeletedInRecovery
        );
        assert_eq!(
            object.locator().is_some(),
            stored,
            "{} {} is {}",
            object.category(),
            object.id(),
            object.status()
        );
    }
}

/// Only objects with a tuple in their store carry a locator.
fn locators_follow_status(db: &Database) {
    check_locators::<Area>(db);
    check_locators::<AreaContent>(db);
    check_locators::<Table>(db);
    check_locators::<Column>(db);
    check_locators::<Constraint>(db);
    check_locators::<Index>(db);
    check_locators::<File>(db);
}

#[test]
fn locators_track_the_stored_tuple() {
    let mut fx = Fixture::new();
    let path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", path.to_str().unwrap())
        .unwrap();
    let table = fx.table("t", Some(area));
    let index = fx
        .db
        .create_index(&fx.tx, "t", "t_id", &["id"], true)
        .unwrap();
    let status = |fx: &Fixture, id| fx.db.objects().find(id).unwrap().status();

    assert_eq!(status(&fx, table), Status::Created);
    locators_follow_status(&fx.db);

    fx.db.persist(&fx.tx).unwrap();
    assert_eq!(status(&fx, table), Status::Persistent);
    locators_follow_status(&fx.db);

    fx.db.rename_table(&fx.tx, "t", "u").unwrap();
    assert_eq!(status(&fx, table), Status::Changed);
    locators_follow_status(&fx.db);

    fx.db.drop_index(&fx.tx, "t_id").unwrap();
    assert_eq!(status(&fx, index), Status::Deleted);
    locators_follow_status(&fx.db);

    // the index, its constraint, its file and the file's area content
    let evicted = fx.db.persist(&fx.tx).unwrap();
    assert_eq!(evicted.len(), 4);
    for entity in &evicted {
        assert_eq!(entity.object().status(), Status::ReallyDeleted);
        assert!(entity.object().locator().is_none());
    }
    locators_follow_status(&fx.db);

    for entity in evicted {
        fx.db.restore_evicted(entity);
    }
    assert_eq!(status(&fx, index), Status::DeleteCanceled);
    locators_follow_status(&fx.db);

    fx.db.persist(&fx.tx).unwrap();
    assert_eq!(status(&fx, index), Status::Persistent);
    locators_follow_status(&fx.db);

    let fx = fx.reopen();
    assert_eq!(status(&fx, index), Status::Persistent);
    locators_follow_status(&fx.db);
}

fn tuples<T: Persist>(db: &Database) -> BTreeMap<ObjectId, Tuple> {
    T::map(db.objects())
        .iter()
        .map(|(id, entity)| (*id, entity.tuple()))
        .collect()
}

fn snapshot(db: &Database) -> [(&'static str, BTreeMap<ObjectId, Tuple>); 7] {
    [
        ("area", tuples::<Area>(db)),
        ("area content", tuples::<AreaContent>(db)),
        ("table", tuples::<Table>(db)),
        ("column", tuples::<Column>(db)),
        ("constraint", tuples::<Constraint>(db)),
        ("index", tuples::<Index>(db)),
        ("file", tuples::<File>(db)),
    ]
}

#[test]
fn every_category_reads_back_what_was_written() {
    let mut fx = Fixture::new();
    let path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", path.to_str().unwrap())
        .unwrap();
    fx.table("t", Some(area));
    fx.table("plain", None);
    fx.db
        .create_index(&fx.tx, "t", "t_id", &["id"], true)
        .unwrap();
    fx.db.persist(&fx.tx).unwrap();

    // an update goes through the store as well
    fx.db.rename_table(&fx.tx, "plain", "renamed").unwrap();
    fx.db.persist(&fx.tx).unwrap();

    let written = snapshot(&fx.db);
    for (category, tuples) in &written {
        assert!(!tuples.is_empty(), "no {category} was written");
    }

    let fx = fx.reopen();
    for ((category, before), (_, after)) in written.iter().zip(snapshot(&fx.db)) {
        assert_eq!(before, &after, "{category} tuples differ after reopen");
    }
    assert!(fx.db.objects().table_named("renamed").is_some());
}
