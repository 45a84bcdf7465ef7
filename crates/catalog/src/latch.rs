use {
    crate::{
        environment::Environment,
        error::{LockSnafu, Result},
    },
    def::lock::{LockManager, LockMode, LockName},
    snafu::prelude::*,
    std::sync::Arc,
};

/// Holds a lock-manager lock until dropped.
#[must_use]
pub struct Latch {
    locks: Arc<dyn LockManager>,
    name: LockName,
    mode: LockMode,
}

impl Latch {
    pub fn acquire(env: &Environment, name: LockName, mode: LockMode) -> Result<Self> {
        env.locks()
            .acquire(&name, mode, env.config().lock_timeout)
            .context(LockSnafu)?;
        tracing::trace!(%name, ?mode, "latched");

        Ok(Self {
            locks: env.locks().clone(),
            name,
            mode,
        })
    }
}

impl Drop for Latch {
    fn drop(&mut self) {
        self.locks.release(&self.name, self.mode);
    }
}
