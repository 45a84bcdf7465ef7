mod ddl;
mod recovery;

use {
    crate::{
        entity::{Area, AreaContent, Column, Constraint, Entity, File, Index, Objects, Table},
        environment::Environment,
        error::{
            AlreadyExistsSnafu, DatabaseUnavailableSnafu, LogSnafu, NameNotFoundSnafu,
            ObjectNotFoundSnafu, Result, StorageSnafu,
        },
        id::IdAllocator,
        log::{DropRecord, LogData, MoveDatabaseRecord},
        object::{Object, Status},
        persist::{after_load_all, load_all, persist_all, Persist, PersistContext},
        reorganize::Saga,
        sequence::SequenceValue,
        store::CatalogStore,
        verify::{Progress, Severity, Treatment},
    },
    def::{log::LogTarget, transaction::Transaction, Category, ObjectId, Timestamp},
    snafu::prelude::*,
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

const ID_FILE: &str = "ID";
const ROW_ID_DIR: &str = "RowID";

/// Runs `$body` once per entity category, with `$t` naming the entity type.
/// The order is the order categories are loaded and persisted in.
macro_rules! for_each_entity {
    ($t:ident => $body:block) => {
        {
            type $t = Area;
            $body
        }
        {
            type $t = Table;
            $body
        }
        {
            type $t = Column;
            $body
        }
        {
            type $t = Index;
            $body
        }
        {
            type $t = Constraint;
            $body
        }
        {
            type $t = File;
            $body
        }
        {
            type $t = AreaContent;
            $body
        }
    };
}

/// How a schema change is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Normal,
    /// Replaying a logged change after a crash.
    Redo,
    /// Reversing a logged change.
    Undo,
}

impl Mode {
    fn logs(self) -> bool {
        self == Mode::Normal
    }

    pub(crate) fn recovery(self) -> bool {
        self != Mode::Normal
    }
}

/// Identifiers a logged table creation handed out.
#[derive(Debug, Default, Clone)]
struct TableIds {
    table: Option<ObjectId>,
    columns: Vec<ObjectId>,
    file: Option<ObjectId>,
    content: Option<ObjectId>,
}

#[derive(Debug, Default, Clone, Copy)]
struct IndexIds {
    index: Option<ObjectId>,
    file: Option<ObjectId>,
    content: Option<ObjectId>,
    constraint: Option<ObjectId>,
}

fn valid(id: ObjectId) -> Option<ObjectId> {
    id.is_valid().then_some(id)
}

/// The catalog of one database: its stores, its object identifiers and the
/// cache of every object it holds.
///
/// Catalog files live under `<root>/<system dir>`; table data lives in the
/// area a table is assigned to, or under the database's data directory.
#[derive(Debug)]
pub struct Database {
    pub(crate) env: Arc<Environment>,
    pub(crate) id: ObjectId,
    pub(crate) root: PathBuf,
    pub(crate) data_dir: PathBuf,
    pub(crate) ids: IdAllocator,
    pub(crate) stores: BTreeMap<Category, CatalogStore>,
    pub(crate) objects: Objects,
    deleting: bool,
}

impl Database {
    fn assemble(env: Arc<Environment>, id: ObjectId, root: PathBuf) -> Result<Self> {
        let system = root.join(&env.config().system_dir);
        let ids = IdAllocator::new(env.clone(), system.join(ID_FILE))?;

        let mut stores = BTreeMap::new();
        for_each_entity!(T => {
            let dir = system.join(T::CATEGORY.name());
            let store = CatalogStore::new(env.clone(), id, T::CATEGORY, dir, T::INDEXES);
            stores.insert(T::CATEGORY, store);
        });

        let data_dir = env.config().data_dir.join("tables").join(id.to_string());
        Ok(Self {
            env,
            id,
            root,
            data_dir,
            ids,
            stores,
            objects: Objects::default(),
            deleting: false,
        })
    }

    /// Where a database named `name` is created by default.
    pub fn default_root(env: &Environment, name: &str) -> PathBuf {
        env.config().data_dir.join(name)
    }

    pub fn create(
        env: Arc<Environment>,
        tx: &dyn Transaction,
        id: ObjectId,
        name: &str,
    ) -> Result<Self> {
        let root = Self::default_root(&env, name);
        Self::create_at(env, tx, id, root)
    }

    /// Lays out an empty catalog: every store and the identifier sequence.
    pub fn create_at(
        env: Arc<Environment>,
        tx: &dyn Transaction,
        id: ObjectId,
        root: PathBuf,
    ) -> Result<Self> {
        tx.check_writable()?;
        ensure!(!root.exists(), AlreadyExistsSnafu { path: &root });

        let mut db = Self::assemble(env, id, root)?;
        for store in db.stores.values_mut() {
            store.create()?;
        }
        db.ids.sequence().create()?;
        db.env.driver().create(&db.data_dir).context(StorageSnafu)?;
        tx.touch_database(id);

        tracing::info!(database = %id, root = %db.root.display(), "database created");
        Ok(db)
    }

    pub fn open(env: Arc<Environment>, id: ObjectId, name: &str) -> Result<Self> {
        let root = Self::default_root(&env, name);
        Self::open_at(env, id, root)
    }

    /// Mounts the stores and loads every object into the cache.
    pub fn open_at(env: Arc<Environment>, id: ObjectId, root: PathBuf) -> Result<Self> {
        ensure!(
            root.exists(),
            ObjectNotFoundSnafu {
                category: Category::Database,
                id
            }
        );

        let mut db = Self::assemble(env, id, root)?;
        db.load()?;

        if db.env.config().verify_on_open {
            let progress = db.verify(Treatment::REPORT)?;
            if !progress.is_good() {
                tracing::warn!(
                    database = %id,
                    findings = progress.findings().len(),
                    "database opened with inconsistencies"
                );
            }
        }
        Ok(db)
    }

    fn load(&mut self) -> Result<()> {
        for store in self.stores.values_mut() {
            if !store.is_mounted() {
                store.mount()?;
            }
        }

        let ctx = PersistContext {
            env: &self.env,
            database: self.id,
            root: &self.root,
            deleting: false,
        };
        let mut max = None;
        for_each_entity!(T => {
            let store = self
                .stores
                .get(&T::CATEGORY)
                .ok_or_else(|| ctx.corrupted(format!("no {} store", T::CATEGORY)))?;
            max = max.max(load_all::<T>(&ctx, store, &mut self.objects)?);
        });
        for_each_entity!(T => {
            after_load_all::<T>(&ctx, &mut self.objects)?;
        });

        if let Some(max) = max {
            self.ids.reconcile_max(max)?;
        }
        tracing::info!(database = %self.id, objects = self.objects.len(), "catalog loaded");
        Ok(())
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn objects(&self) -> &Objects {
        &self.objects
    }

    pub fn get<T: Persist>(&self, id: ObjectId) -> Option<&T> {
        T::map(&self.objects).get(&id)
    }

    pub fn check_available(&self) -> Result<()> {
        ensure!(
            self.env.availability().is_available(self.id),
            DatabaseUnavailableSnafu { database: self.id }
        );
        Ok(())
    }

    fn begin(&self, tx: &dyn Transaction) -> Result<()> {
        ensure!(
            !self.deleting,
            ObjectNotFoundSnafu {
                category: Category::Database,
                id: self.id
            }
        );
        self.check_available()?;
        tx.check_canceled()?;
        tx.check_writable()?;
        tx.touch_database(self.id);
        Ok(())
    }

    fn log(&self, tx: &dyn Transaction, data: LogData) -> Result<()> {
        let lsn = self
            .env
            .log()
            .append(tx, LogTarget::Database(self.id), &data.encode()?)
            .context(LogSnafu)?;
        tracing::debug!(database = %self.id, kind = %data.kind(), lsn, "change logged");
        Ok(())
    }

    /// Whether a reader that saw object `id` at `timestamp` still sees its current state.
    pub fn is_valid(&self, id: ObjectId, timestamp: Timestamp) -> bool {
        self.objects
            .find(id)
            .map_or(false, |o| !o.status().is_deleted() && o.timestamp() <= timestamp)
    }

    pub(crate) fn entity<T: Persist>(&self, id: ObjectId) -> Result<&T> {
        T::map(&self.objects)
            .get(&id)
            .filter(|t| !t.object().status().is_deleted())
            .context(ObjectNotFoundSnafu {
                category: T::CATEGORY,
                id,
            })
    }

    pub(crate) fn entity_mut<T: Persist>(&mut self, id: ObjectId) -> Result<&mut T> {
        T::map_mut(&mut self.objects)
            .get_mut(&id)
            .filter(|t| !t.object().status().is_deleted())
            .context(ObjectNotFoundSnafu {
                category: T::CATEGORY,
                id,
            })
    }

    /// Assigns `entity` an identifier, enters it into the cache and registers
    /// it with its parent.
    pub(crate) fn add<T: Persist>(
        &mut self,
        tx: &dyn Transaction,
        mut entity: T,
        supplied: Option<ObjectId>,
    ) -> Result<ObjectId> {
        let id = self.ids.assign(tx, supplied)?;
        entity.object_mut().create(id, self.env.marks());

        let parent = entity.object().parent();
        T::map_mut(&mut self.objects).insert(id, entity);
        T::attach(&mut self.objects, parent, id);
        tracing::debug!(category = %T::CATEGORY, %id, "object created");
        Ok(id)
    }

    /// Takes a never persisted object out of the cache again.
    pub(crate) fn forget<T: Persist>(&mut self, id: ObjectId) {
        if let Some(entity) = T::map_mut(&mut self.objects).remove(&id) {
            T::detach(&mut self.objects, entity.object().parent(), id);
        }
    }

    pub(crate) fn drop_object<T: Persist>(&mut self, id: ObjectId, recovery: bool) {
        if let Some(entity) = T::map_mut(&mut self.objects).get_mut(&id) {
            entity.object_mut().drop(recovery, true, self.env.marks());
            tracing::debug!(category = %T::CATEGORY, %id, status = %entity.object().status(), "object dropped");
        }
    }

    pub(crate) fn touch<T: Persist>(&mut self, id: ObjectId) {
        if let Some(entity) = T::map_mut(&mut self.objects).get_mut(&id) {
            entity.object_mut().touch(self.env.marks());
        }
    }

    /// The timestamp of `id` while it is `Persistent`; `None` once it is dirty.
    pub(crate) fn clean_state<T: Persist>(&self, id: ObjectId) -> Option<Timestamp> {
        T::map(&self.objects)
            .get(&id)
            .map(Persist::object)
            .filter(|o| o.status() == Status::Persistent)
            .map(Object::timestamp)
    }

    /// Takes back the touches made since `clean_state` returned `clean`.
    pub(crate) fn restore_clean<T: Persist>(&mut self, id: ObjectId, clean: Option<Timestamp>) {
        let Some(timestamp) = clean else {
            return;
        };
        if let Some(entity) = T::map_mut(&mut self.objects).get_mut(&id) {
            let object = entity.object_mut();
            object.untouch(self.env.marks());
            object.set_timestamp(timestamp);
        }
    }

    /// The directory files assigned to `area` are placed under.
    pub(crate) fn base_path(&self, area: ObjectId) -> Result<PathBuf> {
        if area.is_valid() {
            Ok(PathBuf::from(self.entity::<Area>(area)?.path()))
        } else {
            Ok(self.data_dir.clone())
        }
    }

    pub(crate) fn data_path(&self, area: ObjectId, table: &str, file: ObjectId) -> Result<PathBuf> {
        Ok(File::data_path(&self.base_path(area)?, table, file))
    }

    fn area_id(&self, name: &str) -> Result<ObjectId> {
        self.objects
            .area_named(name)
            .map(|a| a.object().id())
            .context(NameNotFoundSnafu {
                category: Category::Area,
                name,
            })
    }

    fn table_id(&self, name: &str) -> Result<ObjectId> {
        self.objects
            .table_named(name)
            .map(|t| t.object().id())
            .context(NameNotFoundSnafu {
                category: Category::Table,
                name,
            })
    }

    fn index_id(&self, name: &str) -> Result<ObjectId> {
        self.objects
            .index_named(name)
            .map(|i| i.object().id())
            .context(NameNotFoundSnafu {
                category: Category::Index,
                name,
            })
    }

    /// Runs `f` holding the session's reservation of `name`, which is given
    /// back if `f` fails and otherwise kept until the next persist.
    fn reserved<R>(
        &mut self,
        tx: &dyn Transaction,
        category: Category,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.env
            .names()
            .reserve(self.id, category, name, tx.session_id())?;
        let result = f(self);
        if result.is_err() {
            self.env.names().release(self.id, category, name);
        }
        result
    }

    /// Hands out the next row id of `table`.
    pub fn next_row_id(&self, tx: &dyn Transaction, table: &str) -> Result<SequenceValue> {
        self.check_available()?;
        let table = self.entity::<Table>(self.table_id(table)?)?;
        table
            .row_ids(&self.env, &self.root, tx.session_id())?
            .next_value(tx, true)
    }

    /// Writes every pending change to the stores. Objects whose deletion
    /// landed leave the cache and are returned, so a later logical undo can
    /// bring them back with [`Database::restore_evicted`].
    #[tracing::instrument(skip(self, tx), fields(database = %self.id))]
    pub fn persist(&mut self, tx: &dyn Transaction) -> Result<Vec<Entity>> {
        self.check_available()?;
        self.env
            .log()
            .flush(LogTarget::Database(self.id))
            .context(LogSnafu)?;

        self.ids.persist()?;
        for table in self.objects.tables.values() {
            if let Some(row_ids) = table.attached_row_ids() {
                row_ids.persist()?;
            }
        }

        let ctx = PersistContext {
            env: &self.env,
            database: self.id,
            root: &self.root,
            deleting: self.deleting,
        };
        let mut evicted = Vec::new();
        for_each_entity!(T => {
            persist_all::<T>(&ctx, &mut self.stores, &mut self.objects, &mut evicted)?;
        });
        if !self.deleting {
            for store in self.stores.values_mut() {
                store.flush()?;
            }
        }

        self.env.names().release_database(self.id, tx.session_id());
        tracing::debug!(evicted = evicted.len(), "database persisted");
        Ok(evicted)
    }

    /// Writes pending changes and releases the files behind the catalog.
    pub fn close(mut self, tx: &dyn Transaction) -> Result<()> {
        self.persist(tx)?;
        for table in self.objects.tables.values() {
            if let Some(row_ids) = table.attached_row_ids() {
                row_ids.unmount()?;
            }
        }
        self.ids.sequence().unmount()?;
        for store in self.stores.values_mut() {
            store.unmount()?;
        }
        tracing::debug!(database = %self.id, "database closed");
        Ok(())
    }

    /// Brings back an object a persist pass evicted after its drop; the next
    /// pass inserts it again under a new locator.
    pub fn restore_evicted(&mut self, entity: Entity) {
        tracing::debug!(category = %entity.object().category(), id = %entity.object().id(), "evicted object restored");
        entity.restore(&mut self.objects, self.env.marks());
    }

    /// Checks the stores, the sequences and the data directories.
    #[tracing::instrument(skip(self), fields(database = %self.id))]
    pub fn verify(&mut self, treatment: Treatment) -> Result<Progress> {
        let mut progress = Progress::default();

        let mut max = None;
        for store in self.stores.values_mut() {
            max = max.max(valid(store.verify(treatment, &mut progress)?));
        }
        self.ids
            .verify(treatment, &mut progress, max.unwrap_or(ObjectId::INVALID))?;

        let system_dir = &self.env.config().system_dir;
        for table in self.objects.tables.values() {
            if !table.object().scope().is_stored() {
                continue;
            }
            let path = Table::row_id_path(&self.root, system_dir, table.object().id());
            if table.attached_row_ids().is_some() || path.exists() {
                table
                    .row_ids(&self.env, &self.root, 0)?
                    .verify(treatment, &mut progress, None)?;
            }
        }

        let driver = self.env.driver();
        for file in self.objects.files.values() {
            let object = file.object();
            if object.status().is_deleted() || !object.scope().is_stored() {
                continue;
            }
            if driver.exists(file.path()) {
                continue;
            }
            let subject = format!("file {} of table {}", object.id(), file.table());
            if treatment.correct {
                driver.create(file.path()).context(StorageSnafu)?;
                progress.report(Severity::Corrected, subject, "data directory recreated");
            } else {
                progress.report(
                    Severity::Correctable,
                    subject,
                    format!("data directory {} is missing", file.path().display()),
                );
            }
        }

        tracing::info!(findings = progress.findings().len(), good = progress.is_good(), "database verified");
        Ok(progress)
    }

    /// Moves the catalog files to `root`. Table data stays where it is.
    pub fn move_to(&mut self, tx: &dyn Transaction, root: PathBuf) -> Result<()> {
        self.begin(tx)?;
        self.move_to_with(tx, root, Mode::Normal)
    }

    pub(super) fn move_to_with(&mut self, tx: &dyn Transaction, root: PathBuf, mode: Mode) -> Result<()> {
        if root == self.root {
            return Ok(());
        }
        ensure!(!root.exists(), AlreadyExistsSnafu { path: &root });
        let from = self.root.clone();
        self.persist(tx)?;

        let system_dir = self.env.config().system_dir.clone();
        let (old_system, new_system) = (from.join(&system_dir), root.join(&system_dir));
        let mut saga: Saga<'_, Self> = Saga::new("database.move", tx, self.env.clone(), self.id);

        let categories = self.stores.keys().copied().collect::<Vec<_>>();
        for category in categories {
            let (to, back) = (
                new_system.join(category.name()),
                old_system.join(category.name()),
            );
            saga.stage(
                self,
                "store_moved",
                |db| db.store_mut(category)?.move_to(tx, to),
                move |db, ()| db.store_mut(category)?.move_to(tx, back),
            )?;
        }

        let (to, back) = (new_system.join(ID_FILE), old_system.join(ID_FILE));
        saga.stage(
            self,
            "ids_moved",
            |db| db.ids.move_to(to),
            move |db, ()| db.ids.move_to(back),
        )?;

        let (to, back) = (new_system.join(ROW_ID_DIR), old_system.join(ROW_ID_DIR));
        let compensation = (back.clone(), to.clone());
        saga.guarded(
            self,
            "row_ids_moved",
            move |db: &mut Self| {
                let (back, to) = compensation;
                db.env.driver().relocate(&to, &back).context(StorageSnafu)
            },
            |db| {
                for table in db.objects.tables.values() {
                    if let Some(row_ids) = table.attached_row_ids() {
                        row_ids.unmount()?;
                    }
                    table.forget_row_ids();
                }
                db.env.driver().relocate(&back, &to).context(StorageSnafu)
            },
        )?;

        let back = from.clone();
        saga.stage(
            self,
            "root_set",
            |db| {
                db.root = root;
                Ok(())
            },
            move |db, ()| {
                db.root = back;
                Ok(())
            },
        )?;
        saga.finish();

        // what is left are the emptied directories
        storage::remove_if_empty(&old_system);
        storage::remove_if_empty(&from);

        if mode.logs() {
            self.log(
                tx,
                LogData::MoveDatabase(MoveDatabaseRecord {
                    database: self.id,
                    from: from.to_string_lossy().into_owned(),
                    to: self.root.to_string_lossy().into_owned(),
                }),
            )?;
        }
        tracing::info!(database = %self.id, root = %self.root.display(), "database moved");
        Ok(())
    }

    fn store_mut(&mut self, category: Category) -> Result<&mut CatalogStore> {
        let database = self.id;
        self.stores
            .get_mut(&category)
            .context(ObjectNotFoundSnafu {
                category,
                id: database,
            })
    }

    /// Drops every object and removes the catalog and the data directory.
    /// Nothing is written to the stores on the way out.
    pub fn drop_database(&mut self, tx: &dyn Transaction) -> Result<()> {
        self.begin(tx)?;
        self.drop_database_with(tx, Mode::Normal)
    }

    pub(super) fn drop_database_with(&mut self, tx: &dyn Transaction, mode: Mode) -> Result<()> {
        if mode.logs() {
            let name = self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.log(
                tx,
                LogData::DropDatabase(DropRecord { id: self.id, name }),
            )?;
        }

        self.deleting = true;
        for_each_entity!(T => {
            let ids = T::map(&self.objects).keys().copied().collect::<Vec<_>>();
            for id in ids {
                self.drop_object::<T>(id, mode.recovery());
            }
        });
        self.persist(tx)?;

        for store in self.stores.values_mut() {
            store.drop()?;
        }
        self.ids.sequence().destroy()?;
        let driver = self.env.driver();
        driver.destroy(&self.data_dir).context(StorageSnafu)?;
        driver.destroy(&self.root).context(StorageSnafu)?;
        self.env.marks().clear(self.id);

        tracing::info!(database = %self.id, "database dropped");
        Ok(())
    }
}
