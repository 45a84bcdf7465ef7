use {
    super::{valid, Database, IndexIds, Mode, TableIds},
    crate::{
        entity::{Area, ColumnDef, Index, Table, TableDef},
        error::{NotUndoableSnafu, Result},
        log::{CreateTableRecord, LogData},
        persist::Persist,
    },
    def::{transaction::Transaction, ObjectId},
    snafu::prelude::*,
    std::path::PathBuf,
};

impl Database {
    /// Replays a logged change. Changes that are already in the catalog are skipped.
    pub fn redo(&mut self, tx: &dyn Transaction, data: &LogData) -> Result<()> {
        self.begin(tx)?;
        tracing::debug!(database = %self.id, kind = %data.kind(), subject = %data.subject(), "redo");

        let mode = Mode::Redo;
        match data {
            LogData::CreateArea(r) => {
                if !self.objects.areas.contains_key(&r.area) {
                    self.create_area_with(tx, &r.name, &r.path, Some(r.area), mode)?;
                }
            }
            LogData::AlterArea(r) => {
                if self.entity::<Area>(r.area)?.path() != r.to {
                    self.alter_area_with(tx, r.area, &r.to, mode)?;
                }
            }
            LogData::DropArea(r) => {
                if self.entity::<Area>(r.area).is_ok() {
                    self.drop_area_with(tx, r.area, mode)?;
                }
            }
            LogData::CreateTable(r) => {
                if !self.objects.tables.contains_key(&r.table) {
                    let (def, ids) = table_from_record(r);
                    self.create_table_with(tx, &def, &ids, mode)?;
                }
            }
            LogData::DropTable(r) => {
                if self.entity::<Table>(r.id).is_ok() {
                    self.drop_table_with(tx, r.id, mode)?;
                }
            }
            LogData::AlterTableArea(r) => {
                self.move_table_area_with(tx, r.table, r.to, mode)?;
            }
            LogData::RenameTable(r) => {
                self.rename_table_with(tx, r.table, &r.to, mode)?;
            }
            LogData::CreateIndex(r) => {
                if !self.objects.indexes.contains_key(&r.index) {
                    let ids = IndexIds {
                        index: Some(r.index),
                        file: Some(r.file),
                        content: None,
                        constraint: valid(r.constraint),
                    };
                    self.create_index_with(
                        tx,
                        r.table,
                        &r.name,
                        r.columns.clone(),
                        r.unique,
                        ids,
                        mode,
                    )?;
                }
            }
            LogData::DropIndex(r) => {
                if self.entity::<Index>(r.id).is_ok() {
                    self.drop_index_with(tx, r.id, mode)?;
                }
            }
            LogData::MoveDatabase(r) => {
                self.move_to_with(tx, PathBuf::from(&r.to), mode)?;
            }
            LogData::DropDatabase(_) => {
                self.drop_database_with(tx, mode)?;
            }
        }
        Ok(())
    }

    /// Reverses a logged change that did not commit.
    pub fn undo(&mut self, tx: &dyn Transaction, data: &LogData) -> Result<()> {
        self.begin(tx)?;
        let kind = data.kind();
        ensure!(
            kind.is_undoable(),
            NotUndoableSnafu {
                category: kind.name()
            }
        );
        tracing::debug!(database = %self.id, %kind, subject = %data.subject(), "undo");

        let mode = Mode::Undo;
        match data {
            LogData::CreateArea(r) => {
                if self.entity::<Area>(r.area).is_ok() {
                    self.drop_area_with(tx, r.area, mode)?;
                }
            }
            LogData::AlterArea(r) => {
                self.alter_area_with(tx, r.area, &r.from, mode)?;
            }
            LogData::DropArea(r) => match self.objects.areas.get_mut(&r.area) {
                Some(area) => area.object_mut().undo_drop(self.env.marks()),
                None => {
                    self.create_area_with(tx, &r.name, &r.path, Some(r.area), mode)?;
                }
            },
            LogData::CreateTable(r) => {
                if self.entity::<Table>(r.table).is_ok() {
                    self.drop_table_with(tx, r.table, mode)?;
                }
            }
            LogData::AlterTableArea(r) => {
                self.move_table_area_with(tx, r.table, r.from, mode)?;
            }
            LogData::RenameTable(r) => {
                self.rename_table_with(tx, r.table, &r.from, mode)?;
            }
            LogData::CreateIndex(r) => {
                if self.entity::<Index>(r.index).is_ok() {
                    self.drop_index_with(tx, r.index, mode)?;
                }
            }
            LogData::MoveDatabase(r) => {
                self.move_to_with(tx, PathBuf::from(&r.from), mode)?;
            }
            LogData::DropTable(_) | LogData::DropIndex(_) | LogData::DropDatabase(_) => {}
        }
        Ok(())
    }
}

fn table_from_record(r: &CreateTableRecord) -> (TableDef, TableIds) {
    let columns = r
        .column_names
        .iter()
        .zip(&r.column_types)
        .zip(&r.nullable)
        .map(|((name, type_name), nullable)| {
            ColumnDef::new(name.as_str(), type_name.as_str(), *nullable != 0)
        })
        .collect();
    let mut def = TableDef::new(r.name.as_str(), columns);
    def.area = valid(r.area);

    let ids = TableIds {
        table: Some(r.table),
        columns: r.column_ids.iter().copied().map(ObjectId).collect(),
        file: Some(r.file),
        content: valid(r.content),
    };
    (def, ids)
}
