mod verify;

use {
    crate::{
        environment::Environment,
        error::{
            AlreadyExistsSnafu, CodecSnafu, IoSnafu, KeyChangedSnafu, MetaDatabaseCorruptedSnafu,
            NameNotFoundSnafu, Result, StorageSnafu,
        },
        latch::Latch,
        object::{Object, Status},
        reorganize::Saga,
    },
    def::{
        codec::{Decoder, Encoder, TupleCodec},
        lock::{LockMode, LockName},
        transaction::Transaction,
        Category, ObjectId, Timestamp, Tuple, Value,
    },
    snafu::prelude::*,
    std::{
        fs,
        path::{Path, PathBuf},
        sync::Arc,
    },
    storage::{IndexFile, Locator, PhysicalFile, RecordFile},
};

const INSERT_RECORD: &str = "catalog_store.insert.record";
const INSERT_INDEX: &str = "catalog_store.insert.index";
const UPDATE_RECORD: &str = "catalog_store.update.record";
const EXPUNGE_INDEX: &str = "catalog_store.expunge.index";
const EXPUNGE_RECORD: &str = "catalog_store.expunge.record";

const RECORD_FILE: &str = "record";

/// A secondary index: entries map the tuple field at `key` to the object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub key: usize,
}

impl IndexSpec {
    pub const fn new(name: &'static str, key: usize) -> Self {
        Self { name, key }
    }

    fn entry(&self, tuple: &Tuple) -> (Value, Value) {
        let field = |n: usize| tuple.get(n).cloned().unwrap_or(Value::Null);
        (field(self.key), field(0))
    }
}

/// Durable tuples of one category in one database: a record file plus one
/// index file per [`IndexSpec`], kept consistent by hand.
#[derive(Debug)]
pub struct CatalogStore {
    env: Arc<Environment>,
    database: ObjectId,
    category: Category,
    dir: PathBuf,
    specs: &'static [IndexSpec],
    record: RecordFile,
    indexes: Vec<IndexFile>,
}

impl CatalogStore {
    pub fn new(
        env: Arc<Environment>,
        database: ObjectId,
        category: Category,
        dir: PathBuf,
        specs: &'static [IndexSpec],
    ) -> Self {
        let record = RecordFile::new(env.manager().clone(), dir.join(RECORD_FILE));
        let indexes = specs
            .iter()
            .map(|spec| IndexFile::new(env.manager().clone(), index_path(&dir, spec)))
            .collect();

        Self {
            env,
            database,
            category,
            dir,
            specs,
            record,
            indexes,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn database(&self) -> ObjectId {
        self.database
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn specs(&self) -> &'static [IndexSpec] {
        self.specs
    }

    fn latch(&self, mode: LockMode) -> Result<Latch> {
        Latch::acquire(
            &self.env,
            LockName::System {
                database: self.database,
                label: format!("store/{}", self.category),
            },
            mode,
        )
    }

    fn fault(&self, point: &str) -> Result<()> {
        self.env.faults().check(point)
    }

    fn files(&mut self) -> impl Iterator<Item = &mut dyn PhysicalFile> {
        std::iter::once(&mut self.record as &mut dyn PhysicalFile)
            .chain(self.indexes.iter_mut().map(|i| i as &mut dyn PhysicalFile))
    }

    fn for_each_file(
        &mut self,
        mut f: impl FnMut(&mut dyn PhysicalFile) -> storage::Result<()>,
    ) -> Result<()> {
        let _latch = self.latch(LockMode::Exclusive)?;
        for file in self.files() {
            f(file).context(StorageSnafu)?;
        }
        Ok(())
    }

    /// A compensation failed: the store may now disagree with itself.
    fn compensation_failed(&self, operation: &str, error: &crate::Error) {
        tracing::error!(
            category = %self.category,
            database = %self.database,
            operation,
            %error,
            "error recovery failed, database marked unavailable"
        );
        self.env.availability().set(self.database, false);
    }

    fn corrupted(&self, details: String) -> crate::Error {
        self.env.availability().set(self.database, false);
        MetaDatabaseCorruptedSnafu {
            database: self.database,
            details: format!("{} store: {details}", self.category),
        }
        .build()
    }

    /// Creates the directory and every file. Nothing is left behind on failure.
    pub fn create(&mut self) -> Result<()> {
        let _latch = self.latch(LockMode::Exclusive)?;
        ensure!(!self.dir.exists(), AlreadyExistsSnafu { path: &self.dir });

        if let Err(e) = self.create_files() {
            if let Err(undo) = self.destroy_files() {
                self.compensation_failed("create", &undo);
            }
            return Err(e);
        }
        tracing::debug!(category = %self.category, dir = %self.dir.display(), "catalog store created");
        Ok(())
    }

    fn create_files(&mut self) -> Result<()> {
        let dir = &self.dir;
        fs::create_dir_all(dir).context(IoSnafu { path: dir })?;
        for file in self.files() {
            file.create().context(StorageSnafu)?;
        }
        Ok(())
    }

    fn destroy_files(&mut self) -> Result<()> {
        for file in self.files() {
            file.destroy().context(StorageSnafu)?;
        }
        let dir = &self.dir;
        if dir.exists() {
            fs::remove_dir_all(dir).context(IoSnafu { path: dir })?;
        }
        Ok(())
    }

    pub fn drop(&mut self) -> Result<()> {
        let _latch = self.latch(LockMode::Exclusive)?;
        self.destroy_files()?;
        tracing::debug!(category = %self.category, dir = %self.dir.display(), "catalog store dropped");
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.record.is_accessible()
    }

    pub fn is_mounted(&self) -> bool {
        self.record.is_mounted()
    }

    pub fn mount(&mut self) -> Result<()> {
        self.for_each_file(|f| f.mount())
    }

    pub fn unmount(&mut self) -> Result<()> {
        self.for_each_file(|f| f.unmount())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.for_each_file(|f| f.flush())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.for_each_file(|f| f.sync())
    }

    pub fn start_backup(&mut self, at: Timestamp) -> Result<()> {
        self.for_each_file(|f| f.start_backup(at))
    }

    pub fn end_backup(&mut self) -> Result<()> {
        self.for_each_file(|f| f.end_backup())
    }

    pub fn recover(&mut self, point: Timestamp) -> Result<()> {
        self.for_each_file(|f| f.recover(point))
    }

    pub fn restore(&mut self, point: Timestamp) -> Result<()> {
        self.for_each_file(|f| f.restore(point))
    }

    fn encode(tuple: &Tuple) -> Result<Vec<u8>> {
        TupleCodec.encode(tuple).context(CodecSnafu)
    }

    fn decode(&self, locator: Locator, bytes: &[u8]) -> Result<Tuple> {
        TupleCodec
            .decode(bytes)
            .map(|(tuple, _)| tuple)
            .map_err(|e| self.corrupted(format!("tuple at {locator} does not decode: {e}")))
    }

    /// Writes the tuple and then its entry in every index. If an index entry
    /// cannot be written, the entries already written and the tuple are removed
    /// again before the error is returned.
    pub fn insert(&mut self, tuple: &Tuple) -> Result<Locator> {
        let _latch = self.latch(LockMode::Exclusive)?;
        let bytes = Self::encode(tuple)?;
        let locator = self.record.insert(&bytes).context(StorageSnafu)?;

        let mut done = 0;
        let result = self
            .fault(INSERT_RECORD)
            .and_then(|()| self.insert_entries(tuple, &mut done));

        if let Err(e) = result {
            if let Err(undo) = self.undo_insert(locator, tuple, done) {
                self.compensation_failed("insert", &undo);
            }
            return Err(e);
        }

        tracing::debug!(category = %self.category, %locator, id = ?tuple.first(), "tuple inserted");
        Ok(locator)
    }

    fn insert_entries(&mut self, tuple: &Tuple, done: &mut usize) -> Result<()> {
        for (spec, index) in self.specs.iter().zip(&mut self.indexes) {
            self.env.faults().check(INSERT_INDEX)?;
            let (key, value) = spec.entry(tuple);
            index.insert(key, value).context(StorageSnafu)?;
            *done += 1;
        }
        Ok(())
    }

    fn undo_insert(&mut self, locator: Locator, tuple: &Tuple, done: usize) -> Result<()> {
        for n in (0..done).rev() {
            let (key, value) = self.specs[n].entry(tuple);
            self.indexes[n].expunge(&key, &value).context(StorageSnafu)?;
        }
        self.record.expunge(locator).context(StorageSnafu)
    }

    /// Rewrites a tuple in place. Index keys never change through an update,
    /// so no index is written. Returns the tuple's possibly new locator.
    pub fn update(&mut self, locator: Locator, tuple: &Tuple) -> Result<Locator> {
        let _latch = self.latch(LockMode::Exclusive)?;
        let old = self.fetch_unlatched(locator)?;
        let bytes = Self::encode(tuple)?;

        if let Some(spec) = self.specs.iter().find(|spec| spec.entry(&old) != spec.entry(tuple)) {
            let id = match old.first() {
                Some(Value::Uint(id)) => ObjectId(*id),
                _ => ObjectId::INVALID,
            };
            return KeyChangedSnafu {
                category: self.category,
                id,
                index: spec.name,
            }
            .fail();
        }

        self.fault(UPDATE_RECORD)?;
        let moved = self.record.update(locator, &bytes).context(StorageSnafu)?;
        tracing::debug!(category = %self.category, %locator, %moved, "tuple updated");
        Ok(moved)
    }

    /// Removes the index entries and then the tuple. If the tuple cannot be
    /// removed, the index entries are written back before the error is returned.
    pub fn expunge(&mut self, locator: Locator, tuple: &Tuple) -> Result<()> {
        let _latch = self.latch(LockMode::Exclusive)?;

        let mut done = 0;
        let result = self
            .expunge_entries(tuple, &mut done)
            .and_then(|()| self.fault(EXPUNGE_RECORD))
            .and_then(|()| self.record.expunge(locator).context(StorageSnafu));

        if let Err(e) = result {
            if let Err(undo) = self.undo_expunge(tuple, done) {
                self.compensation_failed("expunge", &undo);
            }
            return Err(e);
        }

        tracing::debug!(category = %self.category, %locator, id = ?tuple.first(), "tuple expunged");
        Ok(())
    }

    fn expunge_entries(&mut self, tuple: &Tuple, done: &mut usize) -> Result<()> {
        for (spec, index) in self.specs.iter().zip(&mut self.indexes) {
            self.env.faults().check(EXPUNGE_INDEX)?;
            let (key, value) = spec.entry(tuple);
            index.expunge(&key, &value).context(StorageSnafu)?;
            *done += 1;
        }
        Ok(())
    }

    fn undo_expunge(&mut self, tuple: &Tuple, done: usize) -> Result<()> {
        for n in (0..done).rev() {
            let (key, value) = self.specs[n].entry(tuple);
            self.indexes[n].insert(key, value).context(StorageSnafu)?;
        }
        Ok(())
    }

    fn fetch_unlatched(&self, locator: Locator) -> Result<Tuple> {
        let bytes = self.record.fetch(locator).context(StorageSnafu)?;
        self.decode(locator, &bytes)
    }

    pub fn fetch(&self, locator: Locator) -> Result<Tuple> {
        let _latch = self.latch(LockMode::Shared)?;
        let tuple = self.fetch_unlatched(locator)?;
        tracing::trace!(category = %self.category, %locator, "tuple fetched");
        Ok(tuple)
    }

    /// Every tuple with its locator, in storage order.
    pub fn scan(&self) -> Result<Vec<(Locator, Tuple)>> {
        let rows = {
            let _latch = self.latch(LockMode::Shared)?;
            self.record.scan().context(StorageSnafu)?
        };
        tracing::trace!(category = %self.category, count = rows.len(), "store scanned");

        rows.into_iter()
            .map(|(locator, bytes)| Ok((locator, self.decode(locator, &bytes)?)))
            .collect()
    }

    /// Ids of the objects whose `index` key equals `key`.
    pub fn lookup(&self, index: &str, key: &Value) -> Result<Vec<ObjectId>> {
        let n = self
            .specs
            .iter()
            .position(|spec| spec.name == index)
            .context(NameNotFoundSnafu {
                category: self.category,
                name: index,
            })?;

        let _latch = self.latch(LockMode::Shared)?;
        self.indexes[n]
            .fetch(key)
            .into_iter()
            .map(|value| match value {
                Value::Uint(id) => Ok(ObjectId(id)),
                other => Err(self.corrupted(format!(
                    "index {index} holds a {} value",
                    other.type_name()
                ))),
            })
            .collect()
    }

    pub fn count(&self) -> Result<usize> {
        let _latch = self.latch(LockMode::Shared)?;
        self.record.count().context(StorageSnafu)
    }

    /// Writes `object` according to its status: inserted when new, updated
    /// when changed, expunged when deleted. The object is `Persistent`
    /// afterwards; a deleted one keeps its locator until its hooks have run.
    pub fn store_object(&mut self, object: &mut Object, tuple: &Tuple) -> Result<()> {
        match object.status() {
            Status::Created | Status::Mounted | Status::DeleteCanceled => {
                let locator = self.insert(tuple)?;
                object.set_locator(Some(locator));
            }
            Status::Changed => {
                let locator = self.require_locator(object)?;
                let locator = self.update(locator, tuple)?;
                object.set_locator(Some(locator));
            }
            Status::Deleted | Status::DeletedInRecovery => {
                let locator = self.require_locator(object)?;
                self.expunge(locator, tuple)?;
            }
            Status::Unknown
            | Status::Persistent
            | Status::ReallyDeleted
            | Status::CreateCanceled => return Ok(()),
        }
        object.set_status(Status::Persistent);
        Ok(())
    }

    fn require_locator(&self, object: &Object) -> Result<Locator> {
        object.locator().ok_or_else(|| {
            self.corrupted(format!(
                "{} {} is {} but was never stored",
                object.category(),
                object.id(),
                object.status()
            ))
        })
    }

    /// Moves every file of the store to `dir`, as one staged operation.
    pub fn move_to(&mut self, tx: &dyn Transaction, dir: PathBuf) -> Result<()> {
        if dir == self.dir {
            return Ok(());
        }
        self.flush()?;
        let _latch = self.latch(LockMode::Exclusive)?;

        let from = self.dir.clone();
        let mut saga = Saga::new("catalog_store.move", tx, self.env.clone(), self.database);

        let target = dir.clone();
        saga.stage(
            self,
            "directory_created",
            |_| {
                let existed = target.exists();
                fs::create_dir_all(&target).context(IoSnafu { path: &target })?;
                Ok((target, existed))
            },
            |_, (target, existed): (PathBuf, bool)| {
                if !existed {
                    fs::remove_dir_all(&target).context(IoSnafu { path: &target })?;
                }
                Ok(())
            },
        )?;

        let record_path = dir.join(RECORD_FILE);
        saga.stage(
            self,
            "record_moved",
            |store| store.record.move_to(&record_path).context(StorageSnafu),
            |store, ()| {
                let back = store.dir.join(RECORD_FILE);
                store.record.move_to(&back).context(StorageSnafu)
            },
        )?;

        let specs = self.specs;
        let target = dir.clone();
        saga.guarded(
            self,
            "index_moved",
            move |store: &mut CatalogStore| {
                for (spec, index) in specs.iter().zip(&mut store.indexes) {
                    let back = index_path(&store.dir, spec);
                    if index.path() != back {
                        index.move_to(&back).context(StorageSnafu)?;
                    }
                }
                Ok(())
            },
            |store| {
                for (spec, index) in specs.iter().zip(&mut store.indexes) {
                    index
                        .move_to(&index_path(&target, spec))
                        .context(StorageSnafu)?;
                }
                Ok(())
            },
        )?;

        saga.stage(
            self,
            "directory_removed",
            |store| {
                let dir = &store.dir;
                fs::remove_dir_all(dir).context(IoSnafu { path: dir })
            },
            |store, ()| {
                let dir = &store.dir;
                fs::create_dir_all(dir).context(IoSnafu { path: dir })
            },
        )?;

        saga.stage(
            self,
            "set_path",
            |store| {
                store.dir = dir;
                Ok(())
            },
            move |store, ()| {
                store.dir = from;
                Ok(())
            },
        )?;
        saga.finish();

        tracing::debug!(category = %self.category, dir = %self.dir.display(), "catalog store moved");
        Ok(())
    }
}

fn index_path(dir: &Path, spec: &IndexSpec) -> PathBuf {
    dir.join(format!("{}.idx", spec.name))
}
