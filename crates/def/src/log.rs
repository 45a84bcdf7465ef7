use {
    crate::{transaction::Transaction, ObjectId},
    snafu::{prelude::*, Backtrace},
    std::{fmt, io},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to write the logical log of {target}"))]
    Write {
        target: LogTarget,
        source: io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("the logical log of {target} is not available"))]
    Unavailable {
        target: LogTarget,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Log sequence number.
pub type Lsn = u64;

/// Which log a record goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTarget {
    System,
    Database(ObjectId),
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Database(id) => write!(f, "database {id}"),
        }
    }
}

/// Durable logical log the catalog appends schema changes to.
pub trait LogicalLog: Send + Sync {
    fn append(&self, tx: &dyn Transaction, target: LogTarget, record: &[u8]) -> Result<Lsn>;

    fn flush(&self, target: LogTarget) -> Result<()>;
}

/// A log that drops every record. Used when recovery is not wanted.
#[derive(Debug, Default)]
pub struct NullLog;

impl LogicalLog for NullLog {
    fn append(&self, _tx: &dyn Transaction, _target: LogTarget, _record: &[u8]) -> Result<Lsn> {
        Ok(0)
    }

    fn flush(&self, _target: LogTarget) -> Result<()> {
        Ok(())
    }
}
