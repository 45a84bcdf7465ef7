use {
    super::{Database, IndexIds, Mode, TableIds},
    crate::{
        entity::{
            Area, AreaContent, Column, Constraint, ConstraintKind, File, FileKind, Index, Table,
            TableDef,
        },
        error::{DuplicateNameSnafu, InUseSnafu, NameNotFoundSnafu, Result, StorageSnafu},
        log::{
            AlterAreaRecord, AlterTableAreaRecord, AreaRecord, CreateIndexRecord,
            CreateTableRecord, DropRecord, LogData, RenameTableRecord,
        },
        persist::Persist,
        reorganize::Saga,
    },
    def::{transaction::Transaction, Category, ObjectId},
    snafu::prelude::*,
    std::path::Path,
};

fn forget_created<T: Persist>(db: &mut Database, id: ObjectId) -> Result<()> {
    db.forget::<T>(id);
    Ok(())
}

impl Database {
    pub fn create_area(&mut self, tx: &dyn Transaction, name: &str, path: &str) -> Result<ObjectId> {
        self.begin(tx)?;
        self.create_area_with(tx, name, path, None, Mode::Normal)
    }

    pub(super) fn create_area_with(
        &mut self,
        tx: &dyn Transaction,
        name: &str,
        path: &str,
        supplied: Option<ObjectId>,
        mode: Mode,
    ) -> Result<ObjectId> {
        ensure!(
            self.objects.area_named(name).is_none(),
            DuplicateNameSnafu {
                category: Category::Area,
                name
            }
        );

        let area = self.reserved(tx, Category::Area, name, |db| {
            let area = db.add(tx, Area::new(db.id, name, path), supplied)?;
            if let Err(e) = db.env.driver().create(Path::new(path)).context(StorageSnafu) {
                db.forget::<Area>(area);
                return Err(e);
            }
            Ok(area)
        })?;

        if mode.logs() {
            self.log(
                tx,
                LogData::CreateArea(AreaRecord {
                    area,
                    name: name.to_string(),
                    path: path.to_string(),
                }),
            )?;
        }
        Ok(area)
    }

    pub fn drop_area(&mut self, tx: &dyn Transaction, name: &str) -> Result<()> {
        self.begin(tx)?;
        let area = self.area_id(name)?;
        self.drop_area_with(tx, area, Mode::Normal)
    }

    pub(super) fn drop_area_with(&mut self, tx: &dyn Transaction, area: ObjectId, mode: Mode) -> Result<()> {
        let (name, path) = {
            let area = self.entity::<Area>(area)?;
            (area.object().name().to_string(), area.path().to_string())
        };
        ensure!(
            self.objects.contents_of(area).next().is_none(),
            InUseSnafu {
                category: Category::Area,
                id: area
            }
        );

        self.drop_object::<Area>(area, mode.recovery());
        if mode.logs() {
            self.log(tx, LogData::DropArea(AreaRecord { area, name, path }))?;
        }
        Ok(())
    }

    /// Points the area at `path`, moving every file stored in it.
    pub fn alter_area_path(&mut self, tx: &dyn Transaction, name: &str, path: &str) -> Result<()> {
        self.begin(tx)?;
        let area = self.area_id(name)?;
        self.alter_area_with(tx, area, path, Mode::Normal)
    }

    pub(super) fn alter_area_with(
        &mut self,
        tx: &dyn Transaction,
        area: ObjectId,
        path: &str,
        mode: Mode,
    ) -> Result<()> {
        let from = self.entity::<Area>(area)?.path().to_string();
        if from == path {
            return Ok(());
        }
        self.alter_path(tx, area, path, mode)?;

        if mode.logs() {
            self.log(
                tx,
                LogData::AlterArea(AlterAreaRecord {
                    area,
                    from,
                    to: path.to_string(),
                }),
            )?;
        }
        Ok(())
    }

    /// Creates a table with its columns and heap file.
    #[tracing::instrument(skip(self, tx, def), fields(database = %self.id, table = %def.name))]
    pub fn create_table(&mut self, tx: &dyn Transaction, def: &TableDef) -> Result<ObjectId> {
        self.begin(tx)?;
        self.create_table_with(tx, def, &TableIds::default(), Mode::Normal)
    }

    pub(super) fn create_table_with(
        &mut self,
        tx: &dyn Transaction,
        def: &TableDef,
        ids: &TableIds,
        mode: Mode,
    ) -> Result<ObjectId> {
        ensure!(
            self.objects.table_named(&def.name).is_none(),
            DuplicateNameSnafu {
                category: Category::Table,
                name: &def.name
            }
        );
        let area = match def.area {
            Some(area) => {
                self.entity::<Area>(area)?;
                area
            }
            None => ObjectId::INVALID,
        };

        let record = self.reserved(tx, Category::Table, &def.name, |db| {
            db.build_table(tx, def, area, ids)
        })?;
        let table = record.table;
        if mode.logs() {
            self.log(tx, LogData::CreateTable(record))?;
        }
        Ok(table)
    }

    fn build_table(
        &mut self,
        tx: &dyn Transaction,
        def: &TableDef,
        area: ObjectId,
        ids: &TableIds,
    ) -> Result<CreateTableRecord> {
        let database = self.id;
        let mut saga: Saga<'_, Self> =
            Saga::new("database.create_table", tx, self.env.clone(), database);

        let table = Table::new(database, &def.name, def.scope, area);
        let table = saga.stage(
            self,
            "table_created",
            |db| db.add(tx, table, ids.table),
            forget_created::<Table>,
        )?;

        let mut columns = Vec::with_capacity(def.columns.len());
        for (n, column) in def.columns.iter().enumerate() {
            let column = Column::new(
                database,
                table,
                &column.name,
                def.scope,
                n as u32,
                &column.type_name,
                column.nullable,
            );
            let supplied = ids.columns.get(n).copied();
            columns.push(saga.stage(
                self,
                "column_created",
                |db| db.add(tx, column, supplied),
                forget_created::<Column>,
            )?);
        }

        let file = File::new(database, table, def.scope, FileKind::Heap, ObjectId::INVALID, area);
        let file = saga.stage(
            self,
            "file_created",
            |db| db.add(tx, file, ids.file),
            forget_created::<File>,
        )?;
        place_file(&mut saga, self, file, area, &def.name)?;

        let content = if area.is_valid() {
            let content = AreaContent::new(database, area, file, Category::File);
            saga.stage(
                self,
                "content_created",
                |db| db.add(tx, content, ids.content),
                forget_created::<AreaContent>,
            )?
        } else {
            ObjectId::INVALID
        };
        saga.finish();

        Ok(CreateTableRecord {
            table,
            name: def.name.clone(),
            area,
            file,
            content,
            column_ids: columns.iter().map(|c| c.0).collect(),
            column_names: def.columns.iter().map(|c| c.name.clone()).collect(),
            column_types: def.columns.iter().map(|c| c.type_name.clone()).collect(),
            nullable: def.columns.iter().map(|c| u32::from(c.nullable)).collect(),
        })
    }

    /// Drops a table with everything that belongs to it.
    pub fn drop_table(&mut self, tx: &dyn Transaction, name: &str) -> Result<()> {
        self.begin(tx)?;
        let table = self.table_id(name)?;
        self.drop_table_with(tx, table, Mode::Normal)
    }

    pub(super) fn drop_table_with(&mut self, tx: &dyn Transaction, table: ObjectId, mode: Mode) -> Result<()> {
        let recovery = mode.recovery();
        let (name, columns, indexes, constraints, files) = {
            let t = self.entity::<Table>(table)?;
            (
                t.object().name().to_string(),
                t.columns().collect::<Vec<_>>(),
                t.indexes().collect::<Vec<_>>(),
                t.constraints().collect::<Vec<_>>(),
                t.files().collect::<Vec<_>>(),
            )
        };
        let contents = files
            .iter()
            .filter_map(|f| self.objects.content_for(*f))
            .map(|c| c.object().id())
            .collect::<Vec<_>>();

        for id in contents {
            self.drop_object::<AreaContent>(id, recovery);
        }
        for id in files {
            self.drop_object::<File>(id, recovery);
        }
        for id in constraints {
            self.drop_object::<Constraint>(id, recovery);
        }
        for id in indexes {
            self.drop_object::<Index>(id, recovery);
        }
        for id in columns {
            self.drop_object::<Column>(id, recovery);
        }
        self.drop_object::<Table>(table, recovery);

        if mode.logs() {
            self.log(tx, LogData::DropTable(DropRecord { id: table, name }))?;
        }
        Ok(())
    }

    /// Creates an index over the named columns of `table`. A unique index
    /// also gets the constraint it enforces.
    pub fn create_index(
        &mut self,
        tx: &dyn Transaction,
        table: &str,
        name: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<ObjectId> {
        self.begin(tx)?;
        let table = self.table_id(table)?;
        let positions = {
            let defined = self.objects.columns_of(self.entity::<Table>(table)?);
            columns
                .iter()
                .map(|name| {
                    defined
                        .iter()
                        .find(|c| c.object().name() == *name)
                        .map(|c| c.position())
                        .context(NameNotFoundSnafu {
                            category: Category::Column,
                            name: *name,
                        })
                })
                .collect::<Result<Vec<_>>>()?
        };
        self.create_index_with(
            tx,
            table,
            name,
            positions,
            unique,
            IndexIds::default(),
            Mode::Normal,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn create_index_with(
        &mut self,
        tx: &dyn Transaction,
        table: ObjectId,
        name: &str,
        columns: Vec<u32>,
        unique: bool,
        ids: IndexIds,
        mode: Mode,
    ) -> Result<ObjectId> {
        ensure!(
            self.objects.index_named(name).is_none(),
            DuplicateNameSnafu {
                category: Category::Index,
                name
            }
        );
        self.entity::<Table>(table)?;

        let record = self.reserved(tx, Category::Index, name, |db| {
            db.build_index(tx, table, name, columns, unique, ids)
        })?;
        let index = record.index;
        if mode.logs() {
            self.log(tx, LogData::CreateIndex(record))?;
        }
        Ok(index)
    }

    fn build_index(
        &mut self,
        tx: &dyn Transaction,
        table: ObjectId,
        name: &str,
        columns: Vec<u32>,
        unique: bool,
        ids: IndexIds,
    ) -> Result<CreateIndexRecord> {
        let database = self.id;
        let (scope, area, table_name) = {
            let t = self.entity::<Table>(table)?;
            (t.object().scope(), t.area(), t.object().name().to_string())
        };
        let mut saga: Saga<'_, Self> =
            Saga::new("database.create_index", tx, self.env.clone(), database);

        let index = Index::new(database, table, name, scope, unique, columns.clone());
        let index = saga.stage(
            self,
            "index_created",
            |db| db.add(tx, index, ids.index),
            forget_created::<Index>,
        )?;

        let file = File::new(database, table, scope, FileKind::Index, index, area);
        let file = saga.stage(
            self,
            "file_created",
            |db| db.add(tx, file, ids.file),
            forget_created::<File>,
        )?;
        place_file(&mut saga, self, file, area, &table_name)?;

        if area.is_valid() {
            let content = AreaContent::new(database, area, file, Category::File);
            saga.stage(
                self,
                "content_created",
                |db| db.add(tx, content, ids.content),
                forget_created::<AreaContent>,
            )?;
        }

        let constraint = if unique {
            let constraint = Constraint::new(
                database,
                table,
                name,
                scope,
                ConstraintKind::Unique,
                index,
                columns.clone(),
            );
            saga.stage(
                self,
                "constraint_created",
                |db| db.add(tx, constraint, ids.constraint),
                forget_created::<Constraint>,
            )?
        } else {
            ObjectId::INVALID
        };
        saga.finish();

        Ok(CreateIndexRecord {
            index,
            table,
            name: name.to_string(),
            unique,
            columns,
            file,
            constraint,
        })
    }

    /// Drops an index with its file and the constraints it enforces.
    pub fn drop_index(&mut self, tx: &dyn Transaction, name: &str) -> Result<()> {
        self.begin(tx)?;
        let index = self.index_id(name)?;
        self.drop_index_with(tx, index, Mode::Normal)
    }

    pub(super) fn drop_index_with(&mut self, tx: &dyn Transaction, index: ObjectId, mode: Mode) -> Result<()> {
        let recovery = mode.recovery();
        let name = self.entity::<Index>(index)?.object().name().to_string();

        let files = self
            .objects
            .files
            .values()
            .filter(|f| f.index() == index && !f.object().status().is_deleted())
            .map(|f| f.object().id())
            .collect::<Vec<_>>();
        let contents = files
            .iter()
            .filter_map(|f| self.objects.content_for(*f))
            .map(|c| c.object().id())
            .collect::<Vec<_>>();
        let constraints = self
            .objects
            .constraints
            .values()
            .filter(|c| c.index() == index && !c.object().status().is_deleted())
            .map(|c| c.object().id())
            .collect::<Vec<_>>();

        for id in contents {
            self.drop_object::<AreaContent>(id, recovery);
        }
        for id in files {
            self.drop_object::<File>(id, recovery);
        }
        for id in constraints {
            self.drop_object::<Constraint>(id, recovery);
        }
        self.drop_object::<Index>(index, recovery);

        if mode.logs() {
            self.log(tx, LogData::DropIndex(DropRecord { id: index, name }))?;
        }
        Ok(())
    }

    /// Moves every file of the table into `area`, or back to the database's
    /// data directory for `None`.
    #[tracing::instrument(skip(self, tx), fields(database = %self.id))]
    pub fn move_table_area(
        &mut self,
        tx: &dyn Transaction,
        table: &str,
        area: Option<&str>,
    ) -> Result<()> {
        self.begin(tx)?;
        let table = self.table_id(table)?;
        let area = match area {
            Some(name) => self.area_id(name)?,
            None => ObjectId::INVALID,
        };
        self.move_table_area_with(tx, table, area, Mode::Normal)
    }

    pub(super) fn move_table_area_with(
        &mut self,
        tx: &dyn Transaction,
        table: ObjectId,
        area: ObjectId,
        mode: Mode,
    ) -> Result<()> {
        let from = self.entity::<Table>(table)?.area();
        if from == area {
            return Ok(());
        }
        if area.is_valid() {
            self.entity::<Area>(area)?;
        }
        self.move_table(tx, table, area, mode)?;

        if mode.logs() {
            self.log(
                tx,
                LogData::AlterTableArea(AlterTableAreaRecord {
                    table,
                    from,
                    to: area,
                }),
            )?;
        }
        Ok(())
    }

    pub fn rename_table(&mut self, tx: &dyn Transaction, from: &str, to: &str) -> Result<()> {
        self.begin(tx)?;
        let table = self.table_id(from)?;
        self.rename_table_with(tx, table, to, Mode::Normal)
    }

    pub(super) fn rename_table_with(
        &mut self,
        tx: &dyn Transaction,
        table: ObjectId,
        to: &str,
        mode: Mode,
    ) -> Result<()> {
        let from = self.entity::<Table>(table)?.object().name().to_string();
        if from == to {
            return Ok(());
        }
        ensure!(
            self.objects.table_named(to).is_none(),
            DuplicateNameSnafu {
                category: Category::Table,
                name: to
            }
        );

        self.reserved(tx, Category::Table, to, |db| db.rename(tx, table, to, mode))?;
        if mode.logs() {
            self.log(
                tx,
                LogData::RenameTable(RenameTableRecord {
                    table,
                    from,
                    to: to.to_string(),
                }),
            )?;
        }
        Ok(())
    }
}

/// Creates the data directory of a new file and records its path. The
/// directory is removed again if the creation is compensated.
fn place_file(
    saga: &mut Saga<'_, Database>,
    db: &mut Database,
    file: ObjectId,
    area: ObjectId,
    table: &str,
) -> Result<()> {
    saga.stage(
        db,
        "directory_created",
        |db| {
            let path = db.data_path(area, table, file)?;
            db.env.driver().create(&path).context(StorageSnafu)?;
            db.entity_mut::<File>(file)?.set_path(path.clone());
            Ok(path)
        },
        |db, path| db.env.driver().destroy(&path).context(StorageSnafu),
    )?;
    Ok(())
}
