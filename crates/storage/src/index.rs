use {
    crate::{
        error::{CodecSnafu, CorruptedSnafu, EntryNotFoundSnafu},
        Locator, PhysicalFile, RecordFile, Result, StorageManager,
    },
    def::{
        codec::{Decoder, Encoder, TupleCodec},
        Timestamp, Value,
    },
    snafu::prelude::*,
    std::{
        collections::BTreeMap,
        ops::Bound,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Ordered (key, value) entries persisted in a record file.
///
/// Records repeating an entry already loaded are kept apart in `duplicates`;
/// lookups never see them but they still count as stored records.
#[derive(Debug)]
pub struct IndexFile {
    records: RecordFile,
    entries: BTreeMap<(Value, Value), Locator>,
    duplicates: Vec<((Value, Value), Locator)>,
}

impl IndexFile {
    pub fn new(manager: Arc<StorageManager>, path: PathBuf) -> Self {
        Self {
            records: RecordFile::new(manager, path),
            entries: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<()> {
        let entry = (key, value);
        if self.entries.contains_key(&entry) {
            return Ok(());
        }

        let bytes = TupleCodec
            .encode(&vec![entry.0.clone(), entry.1.clone()])
            .context(CodecSnafu)?;
        let locator = self.records.insert(&bytes)?;
        self.entries.insert(entry, locator);

        Ok(())
    }

    pub fn expunge(&mut self, key: &Value, value: &Value) -> Result<()> {
        let entry = (key.clone(), value.clone());
        let locator = *self.entries.get(&entry).context(EntryNotFoundSnafu {
            path: self.records.path(),
        })?;

        self.records.expunge(locator)?;
        self.entries.remove(&entry);

        Ok(())
    }

    pub fn contains(&self, key: &Value, value: &Value) -> bool {
        self.entries.contains_key(&(key.clone(), value.clone()))
    }

    /// Every value stored under `key`, in order.
    pub fn fetch(&self, key: &Value) -> Vec<Value> {
        self.entries
            .range((
                Bound::Included((key.clone(), Value::Null)),
                Bound::Unbounded,
            ))
            .take_while(|((k, _), _)| k == key)
            .map(|((_, v), _)| v.clone())
            .collect()
    }

    /// Stored records, duplicates included.
    pub fn count(&self) -> usize {
        self.entries.len() + self.duplicates.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.keys().map(|(k, v)| (k, v))
    }

    /// Entries found more than once when the file was loaded, once per extra record.
    pub fn duplicates(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.duplicates.iter().map(|((k, v), _)| (k, v))
    }

    /// Removes every record.
    pub fn clear(&mut self) -> Result<()> {
        let locators = self
            .entries
            .values()
            .chain(self.duplicates.iter().map(|(_, locator)| locator))
            .copied()
            .collect::<Vec<_>>();
        for locator in locators {
            self.records.expunge(locator)?;
        }
        self.entries.clear();
        self.duplicates.clear();

        Ok(())
    }

    fn forget(&mut self) {
        self.entries.clear();
        self.duplicates.clear();
    }

    fn load(&mut self) -> Result<()> {
        self.forget();
        for (locator, bytes) in self.records.scan()? {
            let (mut entry, _) = TupleCodec.decode(&bytes).context(CodecSnafu)?;
            ensure!(
                entry.len() == 2,
                CorruptedSnafu {
                    path: self.records.path(),
                    details: format!("entry at {locator} has {} fields", entry.len()),
                }
            );
            let value = entry.pop().unwrap_or(Value::Null);
            let key = entry.pop().unwrap_or(Value::Null);

            let entry = (key, value);
            if self.entries.contains_key(&entry) {
                tracing::warn!(path = %self.records.path().display(), %locator, "duplicate index record");
                self.duplicates.push((entry, locator));
            } else {
                self.entries.insert(entry, locator);
            }
        }

        Ok(())
    }

    pub fn verify(&mut self) -> Result<Vec<String>> {
        self.records.verify()
    }
}

impl PhysicalFile for IndexFile {
    fn path(&self) -> &Path {
        self.records.path()
    }

    fn create(&mut self) -> Result<()> {
        self.records.create()?;
        self.forget();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.records.destroy()?;
        self.forget();
        Ok(())
    }

    fn move_to(&mut self, path: &Path) -> Result<()> {
        self.records.move_to(path)
    }

    fn mount(&mut self) -> Result<()> {
        if self.records.is_mounted() {
            return Ok(());
        }
        self.records.mount()?;
        self.load()
    }

    fn unmount(&mut self) -> Result<()> {
        self.records.unmount()?;
        self.forget();
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.records.is_mounted()
    }

    fn flush(&mut self) -> Result<()> {
        self.records.flush()
    }

    fn sync(&mut self) -> Result<()> {
        self.records.sync()
    }

    fn start_backup(&mut self, at: Timestamp) -> Result<()> {
        self.records.start_backup(at)
    }

    fn end_backup(&mut self) -> Result<()> {
        self.records.end_backup()
    }

    fn recover(&mut self, point: Timestamp) -> Result<()> {
        self.records.recover(point)?;
        if self.records.is_mounted() {
            self.load()?;
        }
        Ok(())
    }

    fn restore(&mut self, point: Timestamp) -> Result<()> {
        self.records.restore(point)?;
        if self.records.is_mounted() {
            self.load()?;
        }
        Ok(())
    }
}
