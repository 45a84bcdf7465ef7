mod error;

use {
    crate::{ObjectId, Timestamp},
    parking_lot::Mutex,
    snafu::prelude::*,
    std::{
        collections::BTreeSet,
        sync::atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use error::{CanceledSnafu, ReadOnlySnafu};
pub use error::{Error, Result};

pub type SessionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCategory {
    ReadOnly,
    ReadWrite,
}

/// What the catalog needs from the surrounding transaction.
pub trait Transaction: Send + Sync {
    fn category(&self) -> TransactionCategory;

    fn session_id(&self) -> SessionId;

    fn is_canceled(&self) -> bool;

    /// Logical time the transaction started at.
    fn begin_timestamp(&self) -> Timestamp;

    /// Records that the transaction wrote to `database`.
    fn touch_database(&self, database: ObjectId);

    fn check_canceled(&self) -> Result<()> {
        ensure!(!self.is_canceled(), CanceledSnafu);
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        ensure!(
            self.category() == TransactionCategory::ReadWrite,
            ReadOnlySnafu
        );
        Ok(())
    }
}

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// Next value of the process-wide logical clock.
pub fn tick() -> Timestamp {
    CLOCK.fetch_add(1, Ordering::SeqCst)
}

/// A self-contained transaction used by tools and tests.
#[derive(Debug)]
pub struct TransactionContext {
    category: TransactionCategory,
    session: SessionId,
    begin: Timestamp,
    canceled: AtomicBool,
    touched: Mutex<BTreeSet<ObjectId>>,
}

impl TransactionContext {
    pub fn new(category: TransactionCategory, session: SessionId) -> Self {
        Self {
            category,
            session,
            begin: tick(),
            canceled: AtomicBool::new(false),
            touched: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn read_write(session: SessionId) -> Self {
        Self::new(TransactionCategory::ReadWrite, session)
    }

    pub fn read_only(session: SessionId) -> Self {
        Self::new(TransactionCategory::ReadOnly, session)
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn touched_databases(&self) -> Vec<ObjectId> {
        self.touched.lock().iter().copied().collect()
    }
}

impl Transaction for TransactionContext {
    fn category(&self) -> TransactionCategory {
        self.category
    }

    fn session_id(&self) -> SessionId {
        self.session
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn begin_timestamp(&self) -> Timestamp {
        self.begin
    }

    fn touch_database(&self, database: ObjectId) {
        self.touched.lock().insert(database);
    }
}
