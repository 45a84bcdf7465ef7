use {
    def::{Category, ObjectId},
    snafu::{prelude::*, Backtrace},
    std::{io, path::PathBuf},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{category} named '{name}' already exists"))]
    DuplicateName {
        category: Category,
        name: String,
        backtrace: Backtrace,
    },

    #[snafu(display("{category} {id} not found"))]
    ObjectNotFound {
        category: Category,
        id: ObjectId,
        backtrace: Backtrace,
    },

    #[snafu(display("{category} named '{name}' not found"))]
    NameNotFound {
        category: Category,
        name: String,
        backtrace: Backtrace,
    },

    #[snafu(display("{category} {id} is still in use"))]
    InUse {
        category: Category,
        id: ObjectId,
        backtrace: Backtrace,
    },

    #[snafu(display("update of {category} {id} changes its {index} key"))]
    KeyChanged {
        category: Category,
        id: ObjectId,
        index: String,
        backtrace: Backtrace,
    },

    #[snafu(display("sequence {} exceeded its limit", path.display()))]
    SequenceLimitExceeded { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("sequence file {} does not exist", path.display()))]
    SequenceMissing { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("invalid sequence option: {details}"))]
    InvalidSequenceOption { details: String, backtrace: Backtrace },

    #[snafu(display("catalog of database {database} is corrupted: {details}"))]
    MetaDatabaseCorrupted {
        database: ObjectId,
        details: String,
        backtrace: Backtrace,
    },

    #[snafu(display("database {database} is unavailable"))]
    DatabaseUnavailable {
        database: ObjectId,
        backtrace: Backtrace,
    },

    #[snafu(display("the operation was canceled"))]
    Canceled { backtrace: Backtrace },

    #[snafu(display("the transaction is read-only"))]
    ReadOnly { backtrace: Backtrace },

    #[snafu(display("fault injected at {point}"))]
    FaultInjected { point: String, backtrace: Backtrace },

    #[snafu(display("log record {category} cannot be undone"))]
    NotUndoable {
        category: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid log record: {details}"))]
    InvalidLogRecord { details: String, backtrace: Backtrace },

    #[snafu(display("invalid configuration: {details}"))]
    Config { details: String, backtrace: Backtrace },

    #[snafu(display("{} already exists", path.display()))]
    AlreadyExists { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("I/O error on {}", path.display()))]
    Io {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },

    Storage {
        #[snafu(backtrace)]
        source: storage::Error,
    },

    Tuple {
        #[snafu(backtrace)]
        source: def::tuple::Error,
    },

    Codec {
        #[snafu(backtrace)]
        source: def::codec::Error,
    },

    Lock {
        #[snafu(backtrace)]
        source: def::lock::Error,
    },

    Log {
        #[snafu(backtrace)]
        source: def::log::Error,
    },
}

impl Error {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

impl From<def::transaction::Error> for Error {
    fn from(e: def::transaction::Error) -> Self {
        match e {
            def::transaction::Error::Canceled { .. } => CanceledSnafu.build(),
            def::transaction::Error::ReadOnly { .. } => ReadOnlySnafu.build(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
