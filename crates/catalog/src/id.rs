use {
    crate::{
        environment::Environment,
        error::Result,
        sequence::{Sequence, SequenceOptions, SequenceValue},
        verify::{Progress, Treatment},
    },
    def::{transaction::Transaction, ObjectId},
    std::{path::PathBuf, sync::Arc},
};

/// Hands out the object identifiers of one database.
#[derive(Debug)]
pub struct IdAllocator {
    sequence: Sequence,
}

fn options() -> SequenceOptions {
    // ObjectId::INVALID is never handed out
    SequenceOptions::unsigned().bounds(0, i64::from(u32::MAX - 1))
}

impl IdAllocator {
    pub fn new(env: Arc<Environment>, path: PathBuf) -> Result<Self> {
        Ok(Self {
            sequence: Sequence::new(env, path, options())?,
        })
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Returns a fresh identifier, or reconciles with `supplied` when redoing
    /// a logged create so later identifiers never collide with it.
    pub fn assign(&self, tx: &dyn Transaction, supplied: Option<ObjectId>) -> Result<ObjectId> {
        match supplied.filter(ObjectId::is_valid) {
            Some(id) => {
                self.sequence.reconcile(SequenceValue::Unsigned(id.0))?;
                Ok(id)
            }
            None => {
                let value = self.sequence.next_value(tx, true)?;
                Ok(ObjectId(value.as_i64().unwrap_or_default() as u32))
            }
        }
    }

    /// Makes sure the next identifier lies beyond `max`, the largest one found in the stores.
    pub fn reconcile_max(&self, max: ObjectId) -> Result<()> {
        if max.is_valid() {
            self.sequence.reconcile(SequenceValue::Unsigned(max.0))?;
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        self.sequence.persist()
    }

    pub fn move_to(&mut self, path: PathBuf) -> Result<()> {
        self.sequence.persist()?;
        self.sequence.move_to(path)
    }

    pub fn verify(
        &self,
        treatment: Treatment,
        progress: &mut Progress,
        max: ObjectId,
    ) -> Result<()> {
        let floor = max.is_valid().then(|| SequenceValue::Unsigned(max.0));
        self.sequence.verify(treatment, progress, floor)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{config::CatalogConfig, error::IoSnafu},
        def::transaction::TransactionContext,
        snafu::prelude::*,
    };

    #[test]
    fn supplied_ids_push_the_sequence() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = Environment::new(CatalogConfig::with_data_dir(dir.path()))?;
        let tx = TransactionContext::read_write(1);
        let ids = IdAllocator::new(env, dir.path().join("id"))?;

        assert_eq!(ids.assign(&tx, None)?, ObjectId(0));
        assert_eq!(ids.assign(&tx, None)?, ObjectId(1));
        assert_eq!(ids.assign(&tx, Some(ObjectId(40)))?, ObjectId(40));
        assert_eq!(ids.assign(&tx, Some(ObjectId(7)))?, ObjectId(7));
        assert_eq!(ids.assign(&tx, None)?, ObjectId(41));
        assert_eq!(ids.assign(&tx, Some(ObjectId::INVALID))?, ObjectId(42));

        ids.reconcile_max(ObjectId(100))?;
        assert_eq!(ids.assign(&tx, None)?, ObjectId(101));
        Ok(())
    }
}
