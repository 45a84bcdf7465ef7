use {
    crate::ObjectId,
    parking_lot::{Condvar, Mutex},
    snafu::{prelude::*, Backtrace},
    std::{
        collections::HashMap,
        fmt,
        time::{Duration, Instant},
    },
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("timed out waiting for {mode:?} lock on {name}"))]
    Timeout {
        name: LockName,
        mode: LockMode,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Resource a lock is taken on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockName {
    Database(ObjectId),
    Table { database: ObjectId, table: ObjectId },
    File { database: ObjectId, table: ObjectId, file: ObjectId },
    /// A catalog store or a sequence file, identified by its owner and a label.
    System { database: ObjectId, label: String },
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(id) => write!(f, "database {id}"),
            Self::Table { database, table } => write!(f, "table {database}/{table}"),
            Self::File {
                database,
                table,
                file,
            } => write!(f, "file {database}/{table}/{file}"),
            Self::System { database, label } => write!(f, "system {database}/{label}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub trait LockManager: Send + Sync {
    /// Blocks until the lock is granted. `None` waits forever.
    fn acquire(&self, name: &LockName, mode: LockMode, timeout: Option<Duration>) -> Result<()>;

    fn release(&self, name: &LockName, mode: LockMode);
}

#[derive(Debug, Default)]
struct Holders {
    shared: usize,
    exclusive: bool,
}

impl Holders {
    fn grantable(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => !self.exclusive,
            LockMode::Exclusive => !self.exclusive && self.shared == 0,
        }
    }
}

/// Lock table shared by every thread of this process.
#[derive(Debug, Default)]
pub struct ProcessLockManager {
    table: Mutex<HashMap<LockName, Holders>>,
    released: Condvar,
}

impl ProcessLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockManager for ProcessLockManager {
    fn acquire(&self, name: &LockName, mode: LockMode, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut table = self.table.lock();

        loop {
            let holders = table.entry(name.clone()).or_default();
            if holders.grantable(mode) {
                match mode {
                    LockMode::Shared => holders.shared += 1,
                    LockMode::Exclusive => holders.exclusive = true,
                }
                return Ok(());
            }

            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut table, deadline).timed_out() {
                        tracing::debug!(%name, ?mode, "lock wait timed out");
                        return TimeoutSnafu {
                            name: name.clone(),
                            mode,
                        }
                        .fail();
                    }
                }
                None => self.released.wait(&mut table),
            }
        }
    }

    fn release(&self, name: &LockName, mode: LockMode) {
        let mut table = self.table.lock();
        if let Some(holders) = table.get_mut(name) {
            match mode {
                LockMode::Shared => holders.shared = holders.shared.saturating_sub(1),
                LockMode::Exclusive => holders.exclusive = false,
            }
            if holders.shared == 0 && !holders.exclusive {
                table.remove(name);
            }
        }
        self.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc, std::thread};

    fn name() -> LockName {
        LockName::System {
            database: ObjectId(1),
            label: "Table".into(),
        }
    }

    #[test]
    fn shared_locks_coexist() -> Result<()> {
        let locks = ProcessLockManager::new();
        locks.acquire(&name(), LockMode::Shared, None)?;
        locks.acquire(&name(), LockMode::Shared, None)?;

        let blocked = locks.acquire(&name(), LockMode::Exclusive, Some(Duration::from_millis(10)));
        assert!(matches!(blocked, Err(Error::Timeout { .. })));

        locks.release(&name(), LockMode::Shared);
        locks.release(&name(), LockMode::Shared);
        locks.acquire(&name(), LockMode::Exclusive, Some(Duration::from_millis(10)))
    }

    #[test]
    fn release_wakes_waiter() -> Result<()> {
        let locks = Arc::new(ProcessLockManager::new());
        locks.acquire(&name(), LockMode::Exclusive, None)?;

        let waiter = {
            let locks = locks.clone();
            thread::spawn(move || locks.acquire(&name(), LockMode::Exclusive, Some(Duration::from_secs(5))))
        };

        thread::sleep(Duration::from_millis(20));
        locks.release(&name(), LockMode::Exclusive);

        assert!(waiter.join().expect("waiter panicked").is_ok());
        Ok(())
    }
}
