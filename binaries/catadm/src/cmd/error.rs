use {
    snafu::{prelude::*, Backtrace},
    std::io,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("Failed with catalog error, source: {}", source))]
    Catalog {
        #[snafu(backtrace)]
        source: catalog::Error,
    },

    #[snafu(display("Failed to write the report, source: {}", source))]
    Output {
        source: io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
