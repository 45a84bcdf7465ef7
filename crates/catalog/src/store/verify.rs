use {
    super::CatalogStore,
    crate::{
        error::{Result, StorageSnafu},
        verify::{Progress, Severity, Treatment},
    },
    def::{lock::LockMode, ObjectId, Value},
    snafu::prelude::*,
    std::collections::BTreeSet,
    storage::PhysicalFile,
};

impl CatalogStore {
    /// Checks that every index holds exactly one entry per tuple, with the
    /// tuple's key and id, and nothing else. Returns the largest object id
    /// found, or `ObjectId::INVALID` for an empty store.
    pub fn verify(&mut self, treatment: Treatment, progress: &mut Progress) -> Result<ObjectId> {
        let subject = format!("{} store of database {}", self.category, self.database);
        if !self.is_mounted() {
            self.mount()?;
        }

        if treatment.cascade {
            let mut problems = self.record.verify().context(StorageSnafu)?;
            for index in &mut self.indexes {
                problems.extend(index.verify().context(StorageSnafu)?);
            }
            for problem in problems {
                progress.report(Severity::Inconsistent, &subject, problem);
            }
        }

        let rows = self.scan()?;
        let mut max = None;
        for (locator, tuple) in &rows {
            match tuple.first() {
                Some(Value::Uint(id)) => max = max.max(Some(*id)),
                _ => progress.report(
                    Severity::Inconsistent,
                    &subject,
                    format!("tuple at {locator} carries no object id"),
                ),
            }
        }

        for n in 0..self.specs.len() {
            let spec = self.specs[n];
            let expected = rows
                .iter()
                .map(|(_, tuple)| spec.entry(tuple))
                .collect::<BTreeSet<_>>();
            let actual = self.indexes[n]
                .entries()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeSet<_>>();

            let mut problems = Vec::new();
            let stored = self.indexes[n].count();
            if stored != rows.len() {
                problems.push(format!(
                    "index {} holds {stored} entries for {} tuples",
                    spec.name,
                    rows.len()
                ));
            }
            problems.extend(
                self.indexes[n]
                    .duplicates()
                    .map(|(k, v)| format!("index {} repeats {k:?} -> {v:?}", spec.name)),
            );
            problems.extend(
                expected
                    .difference(&actual)
                    .map(|(k, v)| format!("index {} misses {k:?} -> {v:?}", spec.name)),
            );
            problems.extend(
                actual
                    .difference(&expected)
                    .map(|(k, v)| format!("index {} has extra {k:?} -> {v:?}", spec.name)),
            );
            if problems.is_empty() {
                continue;
            }

            if treatment.correct {
                self.rebuild_index(n, expected)?;
                progress.report(
                    Severity::Corrected,
                    &subject,
                    format!("index {} rebuilt ({} problems)", spec.name, problems.len()),
                );
            } else {
                for problem in problems {
                    progress.report(Severity::Correctable, &subject, problem);
                }
                if !treatment.continue_on_error {
                    break;
                }
            }
        }

        Ok(max.map_or(ObjectId::INVALID, ObjectId))
    }

    fn rebuild_index(&mut self, n: usize, entries: BTreeSet<(Value, Value)>) -> Result<()> {
        let _latch = self.latch(LockMode::Exclusive)?;
        let index = &mut self.indexes[n];

        index.clear().context(StorageSnafu)?;
        for (key, value) in entries {
            index.insert(key, value).context(StorageSnafu)?;
        }
        index.flush().context(StorageSnafu)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::CatalogConfig,
            environment::Environment,
            error::{CodecSnafu, IoSnafu},
            store::IndexSpec,
        },
        def::{
            codec::{Encoder, TupleCodec},
            Category,
        },
        std::sync::Arc,
        storage::RecordFile,
    };

    const SPECS: &[IndexSpec] = &[IndexSpec::new("parent", 1)];

    fn tuple(id: u32, parent: u32) -> Vec<Value> {
        vec![Value::Uint(id), Value::Uint(parent), Value::from("a"), Value::Uint(1)]
    }

    fn store(env: Arc<Environment>, dir: &std::path::Path) -> CatalogStore {
        CatalogStore::new(env, ObjectId(1), Category::Area, dir.join("Area"), SPECS)
    }

    #[test]
    fn finds_and_rebuilds_a_damaged_index() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env: Arc<Environment> = Environment::new(CatalogConfig::with_data_dir(dir.path()))?;
        let mut store = store(env, dir.path());
        store.create()?;
        store.insert(&tuple(3, 1))?;
        store.insert(&tuple(9, 2))?;

        let mut progress = Progress::default();
        assert_eq!(store.verify(Treatment::REPORT, &mut progress)?, ObjectId(9));
        assert!(progress.findings().is_empty());

        // lose one entry and gain a stray one behind the store's back
        store.indexes[0]
            .expunge(&Value::Uint(1), &Value::Uint(3))
            .context(StorageSnafu)?;
        store.indexes[0]
            .insert(Value::Uint(5), Value::Uint(77))
            .context(StorageSnafu)?;

        let mut progress = Progress::default();
        store.verify(Treatment::REPORT, &mut progress)?;
        assert_eq!(progress.count(Severity::Correctable), 2);
        assert!(!progress.is_good());

        let mut progress = Progress::default();
        store.verify(Treatment::CORRECT, &mut progress)?;
        assert_eq!(progress.count(Severity::Corrected), 1);
        assert!(progress.is_good());

        let mut progress = Progress::default();
        store.verify(Treatment::REPORT, &mut progress)?;
        assert!(progress.findings().is_empty());
        assert_eq!(store.lookup("parent", &Value::Uint(1))?, [ObjectId(3)]);
        Ok(())
    }

    #[test]
    fn repeated_index_record_is_found() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = Environment::new(CatalogConfig::with_data_dir(dir.path()))?;
        let mut store = store(env.clone(), dir.path());
        store.create()?;
        store.insert(&tuple(3, 1))?;
        store.insert(&tuple(9, 2))?;
        store.unmount()?;

        // a second record for (1 -> 3), written past the store
        let mut records = RecordFile::new(env.manager().clone(), dir.path().join("Area/parent.idx"));
        records.mount().context(StorageSnafu)?;
        let bytes = TupleCodec
            .encode(&vec![Value::Uint(1), Value::Uint(3)])
            .context(CodecSnafu)?;
        records.insert(&bytes).context(StorageSnafu)?;
        records.unmount().context(StorageSnafu)?;

        store.mount()?;
        let mut progress = Progress::default();
        store.verify(Treatment::REPORT, &mut progress)?;
        assert_eq!(progress.count(Severity::Correctable), 2);
        assert!(progress
            .findings()
            .iter()
            .any(|f| f.message.contains("holds 3 entries for 2 tuples")));

        let mut progress = Progress::default();
        store.verify(Treatment::CORRECT, &mut progress)?;
        assert_eq!(progress.count(Severity::Corrected), 1);

        store.unmount()?;
        store.mount()?;
        let mut progress = Progress::default();
        store.verify(Treatment::REPORT, &mut progress)?;
        assert!(progress.findings().is_empty());
        assert_eq!(store.lookup("parent", &Value::Uint(1))?, [ObjectId(3)]);
        Ok(())
    }

    #[test]
    fn empty_store_has_no_max() -> Result<()> {
        let dir = tempfile::tempdir().context(IoSnafu { path: "tempdir" })?;
        let env = Environment::new(CatalogConfig::with_data_dir(dir.path()))?;
        let mut store = store(env, dir.path());
        store.create()?;

        let mut progress = Progress::default();
        assert_eq!(store.verify(Treatment::REPORT, &mut progress)?, ObjectId::INVALID);
        Ok(())
    }
}
