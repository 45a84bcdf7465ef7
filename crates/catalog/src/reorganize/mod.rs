//! Multi-step reorganizations that move bytes on disk and catalog pointers
//! together, each step paired with the compensation that reverses it.

mod area;
mod file;
mod table;

use {
    crate::{
        environment::Environment,
        error::{IoSnafu, Result},
        Error,
    },
    def::{transaction::Transaction, ObjectId},
    snafu::prelude::*,
    std::{fs, path::Path, sync::Arc},
};

pub(crate) use file::FileMove;

/// Removes `dir` if it exists and holds nothing. Returns whether it was removed.
pub(crate) fn remove_if_empty(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(dir).context(IoSnafu { path: dir })?;
    if entries.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir).context(IoSnafu { path: dir })?;
    Ok(true)
}

type Compensation<'a, C> = Box<dyn FnOnce(&mut C) -> Result<()> + 'a>;

/// Runs named stages in order against a context `C` and, when one fails,
/// the compensations of every completed stage in reverse.
///
/// Cancellation is polled before each stage. After each stage the fault point
/// `<saga>.<stage>` is checked, so tests can fail a saga right after any stage.
/// If a compensation fails the database is marked unavailable, the remaining
/// compensations are skipped and the original error is returned.
pub struct Saga<'a, C> {
    name: &'static str,
    tx: &'a dyn Transaction,
    env: Arc<Environment>,
    database: ObjectId,
    completed: Vec<(&'static str, Compensation<'a, C>)>,
}

impl<'a, C> Saga<'a, C> {
    pub fn new(
        name: &'static str,
        tx: &'a dyn Transaction,
        env: Arc<Environment>,
        database: ObjectId,
    ) -> Self {
        tracing::debug!(saga = name, %database, "saga started");
        Self {
            name,
            tx,
            env,
            database,
            completed: Vec::new(),
        }
    }

    /// Runs `action` and returns its output. A copy of the output is handed
    /// to `compensate` should a later stage fail.
    pub fn stage<T: Clone + 'a>(
        &mut self,
        ctx: &mut C,
        stage: &'static str,
        action: impl FnOnce(&mut C) -> Result<T>,
        compensate: impl FnOnce(&mut C, T) -> Result<()> + 'a,
    ) -> Result<T> {
        if let Err(e) = self.tx.check_canceled() {
            return Err(self.abort(ctx, e.into()));
        }

        match action(ctx) {
            Ok(value) => {
                let kept = value.clone();
                self.completed
                    .push((stage, Box::new(move |ctx: &mut C| compensate(ctx, kept))));
                self.after_stage(ctx, stage)?;
                Ok(value)
            }
            Err(e) => Err(self.abort(ctx, e)),
        }
    }

    /// Like [`Saga::stage`], for actions that may leave partial effects when
    /// they fail: the compensation is registered before the action runs.
    pub fn guarded(
        &mut self,
        ctx: &mut C,
        stage: &'static str,
        compensate: impl FnOnce(&mut C) -> Result<()> + 'a,
        action: impl FnOnce(&mut C) -> Result<()>,
    ) -> Result<()> {
        if let Err(e) = self.tx.check_canceled() {
            return Err(self.abort(ctx, e.into()));
        }

        self.completed.push((stage, Box::new(compensate)));
        match action(ctx) {
            Ok(()) => self.after_stage(ctx, stage),
            Err(e) => Err(self.abort(ctx, e)),
        }
    }

    fn after_stage(&mut self, ctx: &mut C, stage: &'static str) -> Result<()> {
        tracing::debug!(saga = self.name, stage, "stage completed");

        let point = format!("{}.{stage}", self.name);
        match self.env.faults().check(&point) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.abort(ctx, e)),
        }
    }

    fn abort(&mut self, ctx: &mut C, error: Error) -> Error {
        tracing::warn!(saga = self.name, %error, "saga failed, compensating");

        while let Some((stage, compensate)) = self.completed.pop() {
            match compensate(ctx) {
                Ok(()) => tracing::debug!(saga = self.name, stage, "stage compensated"),
                Err(e) => {
                    tracing::error!(
                        saga = self.name,
                        stage,
                        error = %e,
                        database = %self.database,
                        "error recovery failed, database marked unavailable"
                    );
                    self.env.availability().set(self.database, false);
                    self.completed.clear();
                    break;
                }
            }
        }
        error
    }

    /// Ends the saga; the compensations are discarded.
    pub fn finish(self) {
        tracing::debug!(saga = self.name, stages = self.completed.len(), "saga finished");
    }
}
