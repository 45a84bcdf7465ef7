//! Schema catalog of a database: durable stores for every schema object,
//! the object cache in front of them, and the sagas that keep files on disk
//! and catalog entries in step when either has to change.

pub mod config;
mod database;
pub mod entity;
pub mod environment;
mod error;
pub mod fault;
mod id;
mod latch;
pub mod log;
pub mod object;
pub mod persist;
mod reorganize;
pub mod sequence;
pub mod store;
pub mod verify;

pub use {
    config::CatalogConfig,
    database::Database,
    environment::{Environment, EnvironmentBuilder},
    error::{Error, Result},
    log::{LogData, LogKind},
    object::{Object, Status},
    verify::{Progress, Severity, Treatment},
};
