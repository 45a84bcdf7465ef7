use {
    super::{Fixture, DATABASE},
    catalog::{
        entity::{Area, File, Table, TableDef},
        persist::Persist,
        Error, LogData, Status,
    },
    def::ObjectId,
    std::fs,
};

#[test]
fn failed_area_move_puts_everything_back() {
    let mut fx = Fixture::new();
    let table = fx.table("t", None);
    let file = fx.heap_of(table);
    let original = fx.fill(file);

    let area_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", area_path.to_str().unwrap())
        .unwrap();
    fx.db.persist(&fx.tx).unwrap();
    let file_seen = fx.db.get::<File>(file).unwrap().object().timestamp();
    let table_seen = fx.db.get::<Table>(table).unwrap().object().timestamp();

    fx.db
        .env()
        .faults()
        .arm("file.move_area.catalog_updated", 1);
    let result = fx.db.move_table_area(&fx.tx, "t", Some("a1"));
    assert!(matches!(result, Err(Error::FaultInjected { .. })));

    let f = fx.db.get::<File>(file).unwrap();
    assert_eq!(f.object().status(), Status::Persistent);
    assert!(fx.db.is_valid(file, file_seen));
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().object().status(),
        Status::Persistent
    );
    assert!(fx.db.is_valid(table, table_seen));
    assert_eq!(f.area(), ObjectId::INVALID);
    assert_eq!(f.path(), original);
    assert_eq!(fs::read(original.join("rows")).unwrap(), b"rows");
    assert!(!area_path.join("t").exists());
    assert_eq!(fx.db.objects().contents_of(area).count(), 0);
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().area(),
        ObjectId::INVALID
    );
    assert!(fx.db.check_available().is_ok());
    assert!(!matches!(
        fx.log.records(DATABASE).last(),
        Some(LogData::AlterTableArea(_))
    ));

    // nothing is left armed, so the same move now goes through
    fx.db.move_table_area(&fx.tx, "t", Some("a1")).unwrap();
    let moved = fx.file_path(file);
    assert!(moved.starts_with(&area_path));
    assert_eq!(fs::read(moved.join("rows")).unwrap(), b"rows");
    assert!(!original.exists());
    assert_eq!(fx.db.objects().content_for(file).unwrap().area(), area);
    fx.db.persist(&fx.tx).unwrap();

    let fx = fx.reopen();
    assert_eq!(fx.db.get::<File>(file).unwrap().area(), area);
    assert_eq!(fx.db.get::<Table>(table).unwrap().area(), area);
    assert_eq!(fx.file_path(file), moved);
}

#[test]
fn table_moves_back_out_of_an_area() {
    let mut fx = Fixture::new();
    let area_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", area_path.to_str().unwrap())
        .unwrap();
    let table = fx.table("t", Some(area));
    let file = fx.heap_of(table);
    fx.fill(file);
    fx.db.persist(&fx.tx).unwrap();

    fx.db.move_table_area(&fx.tx, "t", None).unwrap();
    let path = fx.file_path(file);
    assert!(path.starts_with(fx.db.data_dir()));
    assert!(path.join("rows").exists());
    assert!(fx.db.objects().content_for(file).is_none());

    fx.db.persist(&fx.tx).unwrap();
    fx.db.drop_area(&fx.tx, "a1").unwrap();
}

#[test]
fn failed_table_creation_leaves_no_trace() {
    let mut fx = Fixture::new();
    fx.db
        .env()
        .faults()
        .arm("database.create_table.directory_created", 1);

    let def = TableDef::new("t", vec![]);
    assert!(matches!(
        fx.db.create_table(&fx.tx, &def),
        Err(Error::FaultInjected { .. })
    ));
    assert!(fx.db.objects().is_empty());
    assert!(!fx.db.data_dir().join("t").exists());
    assert!(fx.log.records(DATABASE).is_empty());

    // the name was given back
    fx.table("t", None);
}

#[test]
fn rename_moves_data_under_the_new_name() {
    let mut fx = Fixture::new();
    let table = fx.table("t", None);
    let file = fx.heap_of(table);
    let original = fx.fill(file);
    fx.db.persist(&fx.tx).unwrap();

    fx.db.rename_table(&fx.tx, "t", "u").unwrap();
    assert!(fx.db.objects().table_named("t").is_none());
    assert_eq!(fx.db.objects().table_named("u").unwrap().object().id(), table);

    let renamed = fx.file_path(file);
    assert_eq!(renamed, File::data_path(fx.db.data_dir(), "u", file));
    assert!(renamed.join("rows").exists());
    assert!(!original.exists());
    assert!(matches!(
        fx.log.records(DATABASE).last(),
        Some(LogData::RenameTable(r)) if r.from == "t" && r.to == "u"
    ));

    let fx = fx.reopen();
    assert_eq!(fx.db.objects().table_named("u").unwrap().object().id(), table);
    assert_eq!(fx.file_path(file), renamed);
}

#[test]
fn failed_rename_keeps_the_old_name() {
    let mut fx = Fixture::new();
    let table = fx.table("t", None);
    let file = fx.heap_of(table);
    let original = fx.fill(file);
    fx.db.persist(&fx.tx).unwrap();
    let seen = fx.db.get::<Table>(table).unwrap().object().timestamp();

    fx.db.env().faults().arm("table.rename.file_renamed", 1);
    assert!(fx.db.rename_table(&fx.tx, "t", "u").is_err());

    assert_eq!(fx.db.objects().table_named("t").unwrap().object().id(), table);
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().object().status(),
        Status::Persistent
    );
    assert!(fx.db.is_valid(table, seen));
    assert_eq!(
        fx.db.get::<File>(file).unwrap().object().status(),
        Status::Persistent
    );
    assert_eq!(fx.file_path(file), original);
    assert!(original.join("rows").exists());

    // the reservation of the new name went away with the failure
    fx.table("u", None);
}

#[test]
fn altered_area_path_takes_the_files_along() {
    let mut fx = Fixture::new();
    let old_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", old_path.to_str().unwrap())
        .unwrap();
    let table = fx.table("t", Some(area));
    let file = fx.heap_of(table);
    fx.fill(file);
    fx.db.persist(&fx.tx).unwrap();

    let new_path = fx.path("area2");
    fx.db
        .alter_area_path(&fx.tx, "a1", new_path.to_str().unwrap())
        .unwrap();

    let moved = fx.file_path(file);
    assert_eq!(moved, File::data_path(&new_path, "t", file));
    assert!(moved.join("rows").exists());
    assert!(!old_path.exists());
    assert_eq!(
        fx.db.objects().area_named("a1").unwrap().path(),
        new_path.to_str().unwrap()
    );

    let fx = fx.reopen();
    assert_eq!(fx.file_path(file), moved);
}

#[test]
fn failed_path_change_leaves_the_area_untouched() {
    let mut fx = Fixture::new();
    let old_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", old_path.to_str().unwrap())
        .unwrap();
    let table = fx.table("t", Some(area));
    let file = fx.heap_of(table);
    let original = fx.fill(file);
    fx.db.persist(&fx.tx).unwrap();
    let seen = fx.db.get::<Area>(area).unwrap().object().timestamp();

    let new_path = fx.path("area2");
    fx.db.env().faults().arm("area.alter_path.removed", 1);
    assert!(matches!(
        fx.db.alter_area_path(&fx.tx, "a1", new_path.to_str().unwrap()),
        Err(Error::FaultInjected { .. })
    ));

    let a = fx.db.get::<Area>(area).unwrap();
    assert_eq!(a.path(), old_path.to_str().unwrap());
    assert_eq!(a.object().status(), Status::Persistent);
    assert!(fx.db.is_valid(area, seen));
    assert_eq!(
        fx.db.get::<File>(file).unwrap().object().status(),
        Status::Persistent
    );
    assert_eq!(fx.file_path(file), original);
    assert!(original.join("rows").exists());
    assert!(!new_path.exists());
}
