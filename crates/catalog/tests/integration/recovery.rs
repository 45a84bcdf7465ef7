use {
    super::{Fixture, DATABASE},
    catalog::{
        entity::{File, Index, Table},
        persist::Persist,
        Error, LogData, LogKind, Status,
    },
    def::ObjectId,
    std::fs,
};

fn kinds(records: &[LogData]) -> Vec<LogKind> {
    records.iter().map(LogData::kind).collect()
}

#[test]
fn redo_rebuilds_a_catalog_that_never_saw_the_changes() {
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
    fx.db.rename_table(&fx.tx, "t", "u").unwrap();

    let records = fx.log.records(DATABASE);
    assert_eq!(
        kinds(&records),
        [
            LogKind::CreateArea,
            LogKind::CreateTable,
            LogKind::CreateIndex,
            LogKind::RenameTable
        ]
    );

    let mut other = Fixture::new();
    for record in &records {
        other.db.redo(&other.tx, record).unwrap();
    }
    // replaying again finds everything in place
    for record in &records {
        other.db.redo(&other.tx, record).unwrap();
    }
    assert!(other.log.records(DATABASE).is_empty());

    let objects = other.db.objects();
    let t = objects.table_named("u").unwrap();
    assert_eq!(t.object().id(), table);
    assert_eq!(t.area(), area);
    assert_eq!(objects.columns_of(t).len(), 2);
    assert_eq!(t.files().count(), 2);
    assert!(other.db.get::<Index>(index).unwrap().is_unique());
    assert_eq!(objects.area_named("a1").unwrap().object().id(), area);

    other.db.persist(&other.tx).unwrap();
    let other = other.reopen();
    assert!(other.db.objects().table_named("u").is_some());
}

#[test]
fn redo_finishes_a_move_the_catalog_missed() {
    let mut fx = Fixture::new();
    let area_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", area_path.to_str().unwrap())
        .unwrap();
    let table = fx.table("t", None);
    let file = fx.heap_of(table);
    let original = fx.fill(file);
    fx.db.persist(&fx.tx).unwrap();
    fx.log.clear();

    // the bytes move, the catalog write never happens
    fx.db.move_table_area(&fx.tx, "t", Some("a1")).unwrap();
    let moved = fx.file_path(file);
    let mut fx = fx.crash();
    assert_eq!(fx.file_path(file), original);
    assert!(!original.exists());

    let records = fx.log.records(DATABASE);
    assert_eq!(kinds(&records), [LogKind::AlterTableArea]);
    fx.db.redo(&fx.tx, &records[0]).unwrap();

    assert_eq!(fx.file_path(file), moved);
    assert_eq!(fs::read(moved.join("rows")).unwrap(), b"rows");
    assert_eq!(fx.db.get::<File>(file).unwrap().area(), area);
    assert_eq!(fx.db.get::<Table>(table).unwrap().area(), area);
    assert_eq!(fx.db.objects().content_for(file).unwrap().area(), area);
}

#[test]
fn undo_reverses_changes_in_reverse_order() {
    let mut fx = Fixture::new();
    let area_path = fx.path("area1");
    fx.db
        .create_area(&fx.tx, "a1", area_path.to_str().unwrap())
        .unwrap();
    fx.db.persist(&fx.tx).unwrap();
    fx.log.clear();

    let table = fx.table("t", None);
    let file = fx.heap_of(table);
    let original = fx.fill(file);
    fx.db.move_table_area(&fx.tx, "t", Some("a1")).unwrap();
    fx.db.rename_table(&fx.tx, "t", "u").unwrap();

    let records = fx.log.records(DATABASE);
    assert_eq!(
        kinds(&records),
        [
            LogKind::CreateTable,
            LogKind::AlterTableArea,
            LogKind::RenameTable
        ]
    );

    for record in records.iter().rev().take(2) {
        fx.db.undo(&fx.tx, record).unwrap();
    }
    assert_eq!(fx.db.objects().table_named("t").unwrap().object().id(), table);
    assert_eq!(fx.file_path(file), original);
    assert!(original.join("rows").exists());
    assert_eq!(fx.db.get::<File>(file).unwrap().area(), ObjectId::INVALID);

    fx.db.undo(&fx.tx, &records[0]).unwrap();
    assert_eq!(
        fx.db.get::<Table>(table).unwrap().object().status(),
        Status::CreateCanceled
    );
    fx.db.persist(&fx.tx).unwrap();
    assert!(fx.db.get::<Table>(table).is_none());
    assert!(!original.exists());

    // undoing logs nothing of its own
    assert_eq!(fx.log.records(DATABASE).len(), 3);
}

#[test]
fn dropped_area_comes_back_on_undo() {
    let mut fx = Fixture::new();
    let area_path = fx.path("area1");
    let area = fx
        .db
        .create_area(&fx.tx, "a1", area_path.to_str().unwrap())
        .unwrap();
    fx.db.persist(&fx.tx).unwrap();
    fx.log.clear();

    fx.db.drop_area(&fx.tx, "a1").unwrap();
    assert!(fx.db.objects().area_named("a1").is_none());

    let records = fx.log.records(DATABASE);
    fx.db.undo(&fx.tx, &records[0]).unwrap();
    let a = fx.db.objects().area_named("a1").unwrap();
    assert_eq!(a.object().id(), area);
    assert_eq!(a.object().status(), Status::Persistent);
    assert!(fx.db.persist(&fx.tx).unwrap().is_empty());
}

#[test]
fn drops_cannot_be_undone() {
    let mut fx = Fixture::new();
    fx.table("t", None);
    fx.db.persist(&fx.tx).unwrap();
    fx.db.drop_table(&fx.tx, "t").unwrap();

    let records = fx.log.records(DATABASE);
    let drop = records.last().unwrap();
    assert_eq!(drop.kind(), LogKind::DropTable);
    assert!(matches!(
        fx.db.undo(&fx.tx, drop),
        Err(Error::NotUndoable { .. })
    ));
}
