use snafu::{prelude::*, Backtrace};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(in crate::transaction)))]
pub enum Error {
    #[snafu(display("the transaction has been canceled"))]
    Canceled { backtrace: Backtrace },

    #[snafu(display("the transaction is read-only"))]
    ReadOnly { backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;
