use {
    super::SequenceValue,
    crate::error::Result,
    def::{transaction::SessionId, ObjectId},
    parking_lot::Mutex,
    std::collections::HashMap,
};

/// Owner of a session-scoped sequence: (session, table, column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemporaryKey {
    pub session: SessionId,
    pub table: ObjectId,
    pub column: ObjectId,
}

/// Values of sequences that never touch disk.
#[derive(Debug, Default)]
pub struct TemporarySequences(Mutex<HashMap<TemporaryKey, SequenceValue>>);

impl TemporarySequences {
    /// Read-modify-write of one value under the registry lock. The new value is
    /// kept only when `f` succeeds.
    pub fn update<R>(
        &self,
        key: TemporaryKey,
        f: impl FnOnce(&mut SequenceValue) -> Result<R>,
    ) -> Result<R> {
        let mut values = self.0.lock();
        let mut value = values.get(&key).copied().unwrap_or(SequenceValue::Invalid);

        let r = f(&mut value)?;
        values.insert(key, value);
        Ok(r)
    }

    pub fn get(&self, key: &TemporaryKey) -> SequenceValue {
        self.0
            .lock()
            .get(key)
            .copied()
            .unwrap_or(SequenceValue::Invalid)
    }

    pub fn remove(&self, key: &TemporaryKey) {
        self.0.lock().remove(key);
    }

    pub fn release_session(&self, session: SessionId) {
        self.0.lock().retain(|key, _| key.session != session);
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
