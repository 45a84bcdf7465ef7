mod temporary;
mod value;

use {
    crate::{
        environment::Environment,
        error::{
            InvalidSequenceOptionSnafu, IoSnafu, Result, SequenceLimitExceededSnafu,
            SequenceMissingSnafu, StorageSnafu,
        },
        verify::{Progress, Severity, Treatment},
    },
    def::{transaction::Transaction, Timestamp},
    parking_lot::Mutex,
    snafu::prelude::*,
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
    storage::{PageFile, PhysicalFile, UnfixMode},
};
pub use {
    temporary::{TemporaryKey, TemporarySequences},
    value::SequenceValue,
};

/// Shape of a sequence: representation, direction, bounds and wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceOptions {
    pub signed: bool,
    pub start: i64,
    pub increment: i32,
    pub min: i64,
    pub max: i64,
    pub cycle: bool,
}

impl SequenceOptions {
    /// 0, 1, 2, ... up to `u32::MAX`, without wrapping.
    pub fn unsigned() -> Self {
        Self {
            signed: false,
            start: 0,
            increment: 1,
            min: 0,
            max: i64::from(u32::MAX),
            cycle: false,
        }
    }

    pub fn signed() -> Self {
        Self {
            signed: true,
            start: 1,
            increment: 1,
            min: i64::from(i32::MIN),
            max: i64::from(i32::MAX),
            cycle: false,
        }
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    pub fn increment(mut self, increment: i32) -> Self {
        self.increment = increment;
        self
    }

    pub fn bounds(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn cycle(mut self, cycle: bool) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (lowest, highest) = if self.signed {
            (i64::from(i32::MIN), i64::from(i32::MAX))
        } else {
            (0, i64::from(u32::MAX))
        };

        ensure!(
            self.increment != 0,
            InvalidSequenceOptionSnafu {
                details: "increment must not be zero"
            }
        );
        ensure!(
            lowest <= self.min && self.max <= highest,
            InvalidSequenceOptionSnafu {
                details: format!(
                    "bounds [{}, {}] do not fit the representation",
                    self.min, self.max
                )
            }
        );
        ensure!(
            self.min < self.max,
            InvalidSequenceOptionSnafu {
                details: format!("minimum {} is not below maximum {}", self.min, self.max)
            }
        );
        ensure!(
            (self.min..=self.max).contains(&self.start),
            InvalidSequenceOptionSnafu {
                details: format!("start {} lies outside the bounds", self.start)
            }
        );
        Ok(())
    }

    fn value(&self, v: i64) -> SequenceValue {
        SequenceValue::from_i64(self.signed, v)
    }

    fn is_ascending(&self) -> bool {
        self.increment > 0
    }

    /// The bound the sequence runs toward.
    fn limit(&self) -> SequenceValue {
        self.value(if self.is_ascending() { self.max } else { self.min })
    }

    /// Where a cyclic sequence restarts after reaching its limit.
    fn restart(&self) -> SequenceValue {
        self.value(if self.is_ascending() { self.min } else { self.max })
    }

    fn contains(&self, v: SequenceValue) -> bool {
        v.as_i64()
            .map_or(false, |v| (self.min..=self.max).contains(&v))
    }

    fn next(&self, current: SequenceValue) -> Option<SequenceValue> {
        if current.is_invalid() {
            Some(self.value(self.start))
        } else if current.is_able_to_add(self.increment, self.limit()) {
            Some(current.add(self.increment))
        } else if self.cycle {
            Some(self.restart())
        } else {
            None
        }
    }

    /// Whether `candidate` lies further along the direction of the sequence than `current`.
    fn is_further(&self, current: SequenceValue, candidate: SequenceValue) -> bool {
        if current.is_invalid() {
            return true;
        }
        if self.is_ascending() {
            candidate > current
        } else {
            candidate < current
        }
    }
}

#[derive(Debug)]
enum Backing {
    Page(PageFile),
    Temporary(TemporaryKey),
}

#[derive(Debug)]
struct State {
    backing: Backing,
    value: SequenceValue,
    loaded: bool,
    dirty: bool,
}

/// A recoverable counter. Persistent sequences keep their value in a single
/// page file and flush it lazily; temporary ones live in the session registry.
#[derive(Debug)]
pub struct Sequence {
    env: Arc<Environment>,
    path: PathBuf,
    options: SequenceOptions,
    state: Mutex<State>,
}

impl Sequence {
    pub fn new(env: Arc<Environment>, path: PathBuf, options: SequenceOptions) -> Result<Self> {
        options.validate()?;

        let file = PageFile::new(env.manager().clone(), path.clone());
        Ok(Self {
            env,
            path,
            options,
            state: Mutex::new(State {
                backing: Backing::Page(file),
                value: SequenceValue::Invalid,
                loaded: false,
                dirty: false,
            }),
        })
    }

    pub fn temporary(
        env: Arc<Environment>,
        key: TemporaryKey,
        options: SequenceOptions,
    ) -> Result<Self> {
        options.validate()?;

        let path = PathBuf::from(format!(
            "temporary/{}/{}/{}",
            key.session, key.table, key.column
        ));
        Ok(Self {
            env,
            path,
            options,
            state: Mutex::new(State {
                backing: Backing::Temporary(key),
                value: SequenceValue::Invalid,
                loaded: true,
                dirty: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &SequenceOptions {
        &self.options
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.state.lock().backing, Backing::Temporary(_))
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    fn load(&self, state: &mut State, init_if_absent: bool) -> Result<()> {
        if state.loaded {
            return Ok(());
        }
        if let Backing::Page(file) = &mut state.backing {
            if file.is_vacant() {
                ensure!(init_if_absent, SequenceMissingSnafu { path: &self.path });
            } else {
                let page = file.attach_page().context(StorageSnafu)?;
                state.value = SequenceValue::read(page.bytes())
                    .context(IoSnafu { path: &self.path })?;
                file.detach_page(&page, UnfixMode::NotDirty)
                    .context(StorageSnafu)?;
            }
        }
        state.loaded = true;
        Ok(())
    }

    /// Read-modify-write of the current value under the sequence's critical section.
    fn update<R>(
        &self,
        init_if_absent: bool,
        f: impl FnOnce(&mut SequenceValue) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        if let Backing::Temporary(key) = state.backing {
            return self.env.temporary().update(key, f);
        }

        self.load(&mut state, init_if_absent)?;
        let mut value = state.value;
        let r = f(&mut value)?;
        if value != state.value {
            state.value = value;
            state.dirty = true;
        }
        Ok(r)
    }

    /// Advances the sequence and returns the new value. The first call yields
    /// the start value; at the limit a cyclic sequence restarts, others fail.
    pub fn next_value(
        &self,
        tx: &dyn Transaction,
        init_if_absent: bool,
    ) -> Result<SequenceValue> {
        tx.check_canceled()?;
        tx.check_writable()?;

        let options = self.options;
        let path = &self.path;
        self.update(init_if_absent, |value| {
            let next = options
                .next(*value)
                .context(SequenceLimitExceededSnafu { path })?;
            *value = next;
            Ok(next)
        })
    }

    pub fn last_value(&self) -> Result<SequenceValue> {
        let mut state = self.state.lock();
        if let Backing::Temporary(key) = state.backing {
            return Ok(self.env.temporary().get(&key));
        }
        self.load(&mut state, true)?;
        Ok(state.value)
    }

    pub fn set_value(&self, v: SequenceValue) -> Result<()> {
        ensure!(
            v.is_invalid() || self.options.contains(v),
            InvalidSequenceOptionSnafu {
                details: format!("value {v} lies outside the bounds")
            }
        );
        self.update(true, |value| {
            *value = v;
            Ok(())
        })
    }

    /// Moves the sequence to `candidate` if that is further along its
    /// direction, so generated values never fall behind supplied ones.
    /// Returns the value the sequence holds afterwards.
    pub fn reconcile(&self, candidate: SequenceValue) -> Result<SequenceValue> {
        ensure!(
            self.options.contains(candidate),
            SequenceLimitExceededSnafu { path: &self.path }
        );

        let options = self.options;
        self.update(true, |value| {
            if options.is_further(*value, candidate) {
                tracing::trace!(from = %value, to = %candidate, "sequence reconciled");
                *value = candidate;
            }
            Ok(*value)
        })
    }

    /// Writes a deferred value to the page file, creating the file on first write.
    pub fn persist(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(());
        }
        let value = state.value;
        if let Backing::Page(file) = &mut state.backing {
            if file.is_vacant() {
                file.create().context(StorageSnafu)?;
            }
            let mut page = file.attach_page().context(StorageSnafu)?;
            value
                .write(page.bytes_mut())
                .context(IoSnafu { path: &self.path })?;
            file.detach_page(&page, UnfixMode::Dirty)
                .context(StorageSnafu)?;
            tracing::debug!(path = %self.path.display(), %value, "sequence persisted");
        }
        state.dirty = false;
        Ok(())
    }

    /// Checks that the backing file exists and the value is within bounds.
    /// `floor` is the largest value already handed out, if known; a sequence
    /// behind it would hand out duplicates.
    pub fn verify(
        &self,
        treatment: Treatment,
        progress: &mut Progress,
        floor: Option<SequenceValue>,
    ) -> Result<()> {
        let subject = self.path.display().to_string();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Backing::Page(file) = &mut state.backing {
                if file.is_vacant() && !state.dirty {
                    if treatment.correct {
                        file.create().context(StorageSnafu)?;
                        state.loaded = false;
                        progress.report(Severity::Corrected, &subject, "missing file recreated");
                    } else {
                        progress.report(Severity::Correctable, &subject, "file is missing");
                        return Ok(());
                    }
                }
            }
        }

        let value = self.last_value()?;
        if !value.is_invalid() && !self.options.contains(value) {
            progress.report(
                Severity::Inconsistent,
                &subject,
                format!("value {value} lies outside the bounds"),
            );
        }

        if let Some(floor) = floor {
            if self.options.is_further(value, floor) {
                if treatment.correct {
                    self.reconcile(floor)?;
                    self.persist()?;
                    progress.report(
                        Severity::Corrected,
                        &subject,
                        format!("value advanced from {value} to {floor}"),
                    );
                } else {
                    progress.report(
                        Severity::Correctable,
                        &subject,
                        format!("value {value} is behind {floor}"),
                    );
                }
            }
        }
        Ok(())
    }

    fn with_file(&self, f: impl FnOnce(&mut PageFile) -> storage::Result<()>) -> Result<()> {
        match &mut self.state.lock().backing {
            Backing::Page(file) => f(file).context(StorageSnafu),
            Backing::Temporary(_) => Ok(()),
        }
    }

    pub fn create(&self) -> Result<()> {
        self.with_file(|file| file.create())
    }

    pub fn destroy(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if let Backing::Temporary(key) = state.backing {
                self.env.temporary().remove(&key);
            }
            state.value = SequenceValue::Invalid;
            state.dirty = false;
            state.loaded = matches!(state.backing, Backing::Temporary(_));
        }
        self.with_file(|file| {
            if file.is_vacant() {
                Ok(())
            } else {
                file.destroy()
            }
        })
    }

    /// Relocates the page file. The value must have been persisted, or it
    /// follows the file only once persisted again.
    pub fn move_to(&mut self, path: PathBuf) -> Result<()> {
        self.with_file(|file| {
            if file.is_vacant() {
                Ok(())
            } else {
                file.move_to(&path)
            }
        })?;
        if let Backing::Page(file) = &mut self.state.get_mut().backing {
            *file = PageFile::new(self.env.manager().clone(), path.clone());
        }
        self.path = path;
        Ok(())
    }

    pub fn mount(&self) -> Result<()> {
        self.with_file(|file| file.mount())
    }

    pub fn unmount(&self) -> Result<()> {
        self.persist()?;
        self.with_file(|file| file.unmount())?;
        self.state.lock().loaded = false;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.persist()?;
        self.with_file(|file| file.sync())
    }

    pub fn start_backup(&self, at: Timestamp) -> Result<()> {
        self.persist()?;
        self.with_file(|file| file.start_backup(at))
    }

    pub fn end_backup(&self) -> Result<()> {
        self.with_file(|file| file.end_backup())
    }

    pub fn recover(&self, point: Timestamp) -> Result<()> {
        self.with_file(|file| file.recover(point))?;
        self.state.lock().loaded = false;
        Ok(())
    }

    pub fn restore(&self, point: Timestamp) -> Result<()> {
        self.with_file(|file| file.restore(point))?;
        let mut state = self.state.lock();
        state.loaded = false;
        state.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{config::CatalogConfig, Error},
        def::{transaction::TransactionContext, ObjectId},
        rand::Rng,
    };

    fn env(dir: &Path) -> Result<Arc<Environment>> {
        Environment::new(CatalogConfig::with_data_dir(dir))
    }

    #[test]
    fn cyclic_sequence_wraps_to_minimum() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = env(dir.path())?;
        let tx = TransactionContext::read_write(1);

        let options = SequenceOptions::unsigned().bounds(0, 2).cycle(true);
        let seq = Sequence::new(env, dir.path().join("seq"), options)?;

        let values = (0..7)
            .map(|_| seq.next_value(&tx, true))
            .collect::<Result<Vec<_>>>()?;
        let values = values.iter().filter_map(|v| v.as_i64()).collect::<Vec<_>>();
        assert_eq!(values, [0, 1, 2, 0, 1, 2, 0]);
        Ok(())
    }

    #[test]
    fn exhaustion_without_cycle() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = env(dir.path())?;
        let tx = TransactionContext::read_write(1);

        let options = SequenceOptions::signed().start(10).increment(-5).bounds(0, 10);
        let seq = Sequence::new(env, dir.path().join("seq"), options)?;

        assert_eq!(seq.next_value(&tx, true)?, SequenceValue::Signed(10));
        assert_eq!(seq.next_value(&tx, true)?, SequenceValue::Signed(5));
        assert_eq!(seq.next_value(&tx, true)?, SequenceValue::Signed(0));
        assert!(matches!(
            seq.next_value(&tx, true),
            Err(Error::SequenceLimitExceeded { .. })
        ));
        // a failed call leaves the value alone
        assert_eq!(seq.last_value()?, SequenceValue::Signed(0));
        Ok(())
    }

    #[test]
    fn values_stay_within_bounds() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = env(dir.path())?;
        let tx = TransactionContext::read_write(1);
        let mut rng = rand::thread_rng();

        for round in 0..20 {
            let min = rng.gen_range(-50..0);
            let max = rng.gen_range(1..50);
            let increment = rng.gen_range(1..7) * if rng.gen_bool(0.5) { 1 } else { -1 };
            let options = SequenceOptions::signed()
                .bounds(min, max)
                .start(rng.gen_range(min..=max))
                .increment(increment)
                .cycle(true);
            let seq = Sequence::new(env.clone(), dir.path().join(format!("seq{round}")), options)?;

            let mut previous: Option<i64> = None;
            for _ in 0..100 {
                let v = seq.next_value(&tx, true)?.as_i64().unwrap_or(i64::MIN);
                assert!((min..=max).contains(&v), "{v} outside [{min}, {max}]");
                if let Some(p) = previous {
                    let stepped = v == p + i64::from(increment);
                    let wrapped = if increment > 0 { v == min } else { v == max };
                    assert!(stepped || wrapped, "{p} -> {v} by {increment}");
                }
                previous = Some(v);
            }
        }
        Ok(())
    }

    #[test]
    fn persisted_value_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = env(dir.path())?;
        let tx = TransactionContext::read_write(1);
        let path = dir.path().join("ids");

        let seq = Sequence::new(env.clone(), path.clone(), SequenceOptions::unsigned())?;
        for _ in 0..5 {
            seq.next_value(&tx, true)?;
        }
        assert!(seq.is_dirty());
        assert!(!path.exists());
        seq.persist()?;
        assert!(!seq.is_dirty());

        let reopened = Sequence::new(env, path, SequenceOptions::unsigned())?;
        assert_eq!(reopened.last_value()?, SequenceValue::Unsigned(4));
        assert_eq!(reopened.next_value(&tx, false)?, SequenceValue::Unsigned(5));
        Ok(())
    }

    #[test]
    fn missing_file_without_init() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let tx = TransactionContext::read_write(1);
        let seq = Sequence::new(env(dir.path())?, dir.path().join("gone"), SequenceOptions::unsigned())?;

        assert!(matches!(
            seq.next_value(&tx, false),
            Err(Error::SequenceMissing { .. })
        ));
        Ok(())
    }

    #[test]
    fn reconcile_only_moves_forward() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let tx = TransactionContext::read_write(1);
        let seq = Sequence::new(env(dir.path())?, dir.path().join("seq"), SequenceOptions::unsigned())?;

        assert_eq!(seq.reconcile(SequenceValue::Unsigned(7))?, SequenceValue::Unsigned(7));
        assert_eq!(seq.reconcile(SequenceValue::Unsigned(3))?, SequenceValue::Unsigned(7));
        assert_eq!(seq.next_value(&tx, true)?, SequenceValue::Unsigned(8));

        // descending: smaller is further
        let down = SequenceOptions::signed().start(100).increment(-1).bounds(0, 100);
        let seq = Sequence::new(env(dir.path())?, dir.path().join("down"), down)?;
        seq.next_value(&tx, true)?;
        assert_eq!(seq.reconcile(SequenceValue::Signed(40))?, SequenceValue::Signed(40));
        assert_eq!(seq.reconcile(SequenceValue::Signed(60))?, SequenceValue::Signed(40));
        Ok(())
    }

    #[test]
    fn read_only_transaction_cannot_advance() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let seq = Sequence::new(env(dir.path())?, dir.path().join("seq"), SequenceOptions::unsigned())?;

        let tx = TransactionContext::read_only(1);
        assert!(matches!(seq.next_value(&tx, true), Err(Error::ReadOnly { .. })));
        Ok(())
    }

    #[test]
    fn temporary_values_are_per_session() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = env(dir.path())?;
        let key = |session| TemporaryKey {
            session,
            table: ObjectId(5),
            column: ObjectId(6),
        };

        let first = Sequence::temporary(env.clone(), key(1), SequenceOptions::unsigned())?;
        let second = Sequence::temporary(env.clone(), key(2), SequenceOptions::unsigned())?;
        let tx1 = TransactionContext::read_write(1);
        let tx2 = TransactionContext::read_write(2);

        first.next_value(&tx1, true)?;
        first.next_value(&tx1, true)?;
        assert_eq!(second.next_value(&tx2, true)?, SequenceValue::Unsigned(0));
        assert_eq!(first.last_value()?, SequenceValue::Unsigned(1));
        first.persist()?;
        assert!(!dir.path().join("temporary").exists());

        env.end_session(1);
        assert_eq!(first.last_value()?, SequenceValue::Invalid);
        assert_eq!(env.temporary().len(), 1);
        Ok(())
    }

    #[test]
    fn verify_reports_and_corrects() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = env(dir.path())?;
        let tx = TransactionContext::read_write(1);
        let seq = Sequence::new(env, dir.path().join("seq"), SequenceOptions::unsigned())?;
        seq.next_value(&tx, true)?;
        seq.persist()?;

        let mut progress = Progress::default();
        seq.verify(Treatment::REPORT, &mut progress, Some(SequenceValue::Unsigned(9)))?;
        assert_eq!(progress.count(Severity::Correctable), 1);
        assert_eq!(seq.last_value()?, SequenceValue::Unsigned(0));

        let mut progress = Progress::default();
        seq.verify(Treatment::CORRECT, &mut progress, Some(SequenceValue::Unsigned(9)))?;
        assert!(progress.is_good());
        assert_eq!(seq.next_value(&tx, false)?, SequenceValue::Unsigned(10));
        Ok(())
    }

    #[test]
    fn invalid_options_are_rejected() {
        for options in [
            SequenceOptions::unsigned().increment(0),
            SequenceOptions::unsigned().bounds(5, 5),
            SequenceOptions::unsigned().bounds(-1, 5),
            SequenceOptions::signed().bounds(0, 10).start(11),
        ] {
            assert!(matches!(
                options.validate(),
                Err(Error::InvalidSequenceOption { .. })
            ));
        }
    }

    #[test]
    fn move_follows_the_file() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let tx = TransactionContext::read_write(1);
        let mut seq = Sequence::new(env(dir.path())?, dir.path().join("a/seq"), SequenceOptions::unsigned())?;
        seq.next_value(&tx, true)?;
        seq.next_value(&tx, true)?;
        seq.persist()?;

        seq.move_to(dir.path().join("b/seq"))?;
        assert!(!dir.path().join("a/seq").exists());
        assert_eq!(seq.last_value()?, SequenceValue::Unsigned(1));
        assert_eq!(seq.path(), dir.path().join("b/seq"));
        Ok(())
    }
}
