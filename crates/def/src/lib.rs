pub mod codec;
mod id;
pub mod lock;
pub mod log;
pub mod transaction;
pub mod tuple;
mod value;

pub use {
    id::{Category, ObjectId, Scope, Timestamp},
    tuple::Tuple,
    value::Value,
};
