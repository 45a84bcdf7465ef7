use {
    crate::{slotted_page, Locator},
    snafu::{prelude::*, Backtrace},
    std::{io, path::PathBuf},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("I/O error on {}", path.display()))]
    Io {
        path: PathBuf,
        source: io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("{} is not accessible", path.display()))]
    NotAccessible { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("{} already exists", path.display()))]
    AlreadyExists { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("{} is not mounted", path.display()))]
    NotMounted { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("no record at {locator} in {}", path.display()))]
    RecordNotFound {
        path: PathBuf,
        locator: Locator,
        backtrace: Backtrace,
    },

    #[snafu(display("record of {len} bytes does not fit in a page"))]
    RecordTooLarge { len: usize, backtrace: Backtrace },

    #[snafu(display("index entry not found in {}", path.display()))]
    EntryNotFound { path: PathBuf, backtrace: Backtrace },

    #[snafu(display("{} is corrupted: {details}", path.display()))]
    Corrupted {
        path: PathBuf,
        details: String,
        backtrace: Backtrace,
    },

    Page {
        #[snafu(backtrace)]
        source: slotted_page::Error,
    },

    Codec {
        source: def::codec::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
