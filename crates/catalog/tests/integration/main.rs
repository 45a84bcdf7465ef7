mod lifecycle;
mod recovery;
mod reorganize;

use {
    catalog::{
        entity::{ColumnDef, TableDef},
        CatalogConfig, Database, Environment, LogData,
    },
    def::{
        lock::{self, LockManager, LockMode, LockName, ProcessLockManager},
        log::{self, LogTarget, LogicalLog, Lsn},
        transaction::{Transaction, TransactionContext},
        ObjectId,
    },
    parking_lot::Mutex,
    std::{
        fs,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
    tempfile::{tempdir, TempDir},
};

pub const DATABASE: ObjectId = ObjectId(1);

/// Keeps every appended record so tests can replay them.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<(LogTarget, Vec<u8>)>>,
}

impl MemoryLog {
    pub fn records(&self, database: ObjectId) -> Vec<LogData> {
        self.records
            .lock()
            .iter()
            .filter(|(target, _)| *target == LogTarget::Database(database))
            .map(|(_, bytes)| LogData::decode(bytes).unwrap())
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogicalLog for MemoryLog {
    fn append(&self, _tx: &dyn Transaction, target: LogTarget, record: &[u8]) -> log::Result<Lsn> {
        let mut records = self.records.lock();
        records.push((target, record.to_vec()));
        Ok(records.len() as Lsn)
    }

    fn flush(&self, _target: LogTarget) -> log::Result<()> {
        Ok(())
    }
}

/// Counts grants and releases on top of the process lock manager.
#[derive(Debug, Default)]
pub struct CountingLocks {
    inner: ProcessLockManager,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl CountingLocks {
    pub fn balanced(&self) -> bool {
        self.acquired.load(Ordering::SeqCst) == self.released.load(Ordering::SeqCst)
    }
}

impl LockManager for CountingLocks {
    fn acquire(&self, name: &LockName, mode: LockMode, timeout: Option<Duration>) -> lock::Result<()> {
        self.inner.acquire(name, mode, timeout)?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, name: &LockName, mode: LockMode) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(name, mode);
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub log: Arc<MemoryLog>,
    pub tx: TransactionContext,
    pub db: Database,
}

pub fn environment(dir: &Path, log: Arc<MemoryLog>) -> Arc<Environment> {
    Environment::builder(CatalogConfig::with_data_dir(dir.join("data")))
        .log(log)
        .build()
        .unwrap()
}

impl Fixture {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let dir = tempdir().unwrap();
        let log = Arc::new(MemoryLog::default());
        let env = environment(dir.path(), log.clone());
        let tx = TransactionContext::read_write(1);
        let db = Database::create(env, &tx, DATABASE, "db").unwrap();

        Self { dir, log, tx, db }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Closes the database and opens it again from disk in a fresh environment.
    pub fn reopen(self) -> Self {
        let Self { dir, log, tx, db } = self;
        let root = db.root().to_path_buf();
        db.close(&tx).unwrap();

        let env = environment(dir.path(), log.clone());
        let db = Database::open_at(env, DATABASE, root).unwrap();
        Self { dir, log, tx, db }
    }

    /// Opens the database again from disk without writing what was pending.
    pub fn crash(self) -> Self {
        let Self { dir, log, tx, db } = self;
        let root = db.root().to_path_buf();
        drop(db);

        let env = environment(dir.path(), log.clone());
        let db = Database::open_at(env, DATABASE, root).unwrap();
        Self { dir, log, tx, db }
    }

    /// A table with two columns, stored in `area` when given.
    pub fn table(&mut self, name: &str, area: Option<ObjectId>) -> ObjectId {
        let mut def = TableDef::new(
            name,
            vec![
                ColumnDef::new("id", "int", false),
                ColumnDef::new("label", "text", true),
            ],
        );
        def.area = area;
        self.db.create_table(&self.tx, &def).unwrap()
    }

    /// Writes a marker file into the data directory of `file`.
    pub fn fill(&self, file: ObjectId) -> PathBuf {
        let dir = self.file_path(file);
        fs::write(dir.join("rows"), b"rows").unwrap();
        dir
    }

    pub fn file_path(&self, file: ObjectId) -> PathBuf {
        self.db
            .get::<catalog::entity::File>(file)
            .unwrap()
            .path()
            .to_path_buf()
    }

    pub fn heap_of(&self, table: ObjectId) -> ObjectId {
        let table = self.db.get::<catalog::entity::Table>(table).unwrap();
        table.files().next().unwrap()
    }
}
