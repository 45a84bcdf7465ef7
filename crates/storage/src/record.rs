use {
    crate::{
        backup,
        error::{
            AlreadyExistsSnafu, IoSnafu, NotAccessibleSnafu, NotMountedSnafu, PageSnafu,
            RecordNotFoundSnafu, RecordTooLargeSnafu,
        },
        slotted_page::{self, SlottedPage, SlottedPageRef},
        Locator, Page, PageNum, PhysicalFile, Result, StorageManager, PAGE_SIZE,
    },
    def::Timestamp,
    snafu::prelude::*,
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Heap of variable-length records kept in slotted pages.
///
/// Pages are held in memory once mounted and written back on flush.
#[derive(Debug)]
pub struct RecordFile {
    manager: Arc<StorageManager>,
    path: PathBuf,
    pages: Vec<Page>,
    dirty: BTreeSet<PageNum>,
    mounted: bool,
}

impl RecordFile {
    pub fn new(manager: Arc<StorageManager>, path: PathBuf) -> Self {
        Self {
            manager,
            path,
            pages: vec![],
            dirty: BTreeSet::new(),
            mounted: false,
        }
    }

    fn check_mounted(&self) -> Result<()> {
        ensure!(self.mounted, NotMountedSnafu { path: &self.path });
        Ok(())
    }

    fn page(&self, locator: Locator) -> Result<&Page> {
        self.pages
            .get(locator.page as usize)
            .context(RecordNotFoundSnafu {
                path: &self.path,
                locator,
            })
    }

    fn page_mut(&mut self, locator: Locator) -> Result<&mut Page> {
        let path = &self.path;
        self.pages
            .get_mut(locator.page as usize)
            .context(RecordNotFoundSnafu { path, locator })
    }

    pub fn insert(&mut self, data: &[u8]) -> Result<Locator> {
        self.check_mounted()?;
        ensure!(
            data.len() <= SlottedPage::capacity(PAGE_SIZE),
            RecordTooLargeSnafu { len: data.len() }
        );

        let page_num = match self.pages.iter_mut().position(|page| {
            SlottedPage::new(page.bytes_mut()).fits(data.len())
        }) {
            Some(n) => n,
            None => {
                let mut page = Page::new();
                SlottedPage::new(page.bytes_mut()).init();
                self.pages.push(page);
                self.pages.len() - 1
            }
        };

        let slot = SlottedPage::new(self.pages[page_num].bytes_mut())
            .insert(data)
            .context(PageSnafu)?;
        self.dirty.insert(page_num as PageNum);

        Ok(Locator::new(page_num as PageNum, slot as u16))
    }

    /// Replaces a record. The record keeps its locator unless its page is full,
    /// in which case it moves and the new locator is returned.
    pub fn update(&mut self, locator: Locator, data: &[u8]) -> Result<Locator> {
        self.check_mounted()?;
        let path = self.path.clone();

        let result = SlottedPage::new(self.page_mut(locator)?.bytes_mut())
            .update(locator.slot as usize, data);

        match result {
            Ok(()) => {
                self.dirty.insert(locator.page);
                Ok(locator)
            }
            Err(slotted_page::Error::SpaceNotEnough { .. }) => {
                let moved = self.insert(data)?;
                self.expunge(locator)?;
                tracing::debug!(path = %path.display(), %locator, %moved, "record relocated");
                Ok(moved)
            }
            Err(e) => Err(not_found(e, &path, locator)),
        }
    }

    pub fn expunge(&mut self, locator: Locator) -> Result<()> {
        self.check_mounted()?;
        let path = self.path.clone();

        SlottedPage::new(self.page_mut(locator)?.bytes_mut())
            .delete(locator.slot as usize)
            .map_err(|e| not_found(e, &path, locator))?;
        self.dirty.insert(locator.page);

        Ok(())
    }

    pub fn fetch(&self, locator: Locator) -> Result<Vec<u8>> {
        self.check_mounted()?;

        SlottedPageRef::new(self.page(locator)?.bytes())
            .get(locator.slot as usize)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| not_found(e, &self.path, locator))
    }

    pub fn scan(&self) -> Result<Vec<(Locator, Vec<u8>)>> {
        self.check_mounted()?;

        Ok(self
            .pages
            .iter()
            .enumerate()
            .flat_map(|(n, page)| {
                SlottedPageRef::new(page.bytes())
                    .iter()
                    .map(move |(slot, bytes)| {
                        (Locator::new(n as PageNum, slot as u16), bytes.to_vec())
                    })
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    pub fn count(&self) -> Result<usize> {
        self.check_mounted()?;

        Ok(self
            .pages
            .iter()
            .map(|page| SlottedPageRef::new(page.bytes()).live_count())
            .sum())
    }

    /// Structural problems found in the pages, one message per bad page.
    pub fn verify(&mut self) -> Result<Vec<String>> {
        self.check_mounted()?;

        Ok(self
            .pages
            .iter_mut()
            .enumerate()
            .filter_map(|(n, page)| {
                SlottedPage::new(page.bytes_mut())
                    .check()
                    .err()
                    .map(|e| format!("page {n}: {e}"))
            })
            .collect())
    }

    fn load(&mut self) -> Result<()> {
        let path = &self.path;
        let count = self.manager.page_count(path).context(IoSnafu { path })?;

        self.pages = (0..count)
            .map(|n| {
                let mut page = Page::new();
                self.manager
                    .read_page(path, n, &mut page)
                    .context(IoSnafu { path })?;
                Ok(page)
            })
            .collect::<Result<_>>()?;
        self.dirty.clear();

        Ok(())
    }
}

fn not_found(e: slotted_page::Error, path: &Path, locator: Locator) -> crate::Error {
    match e {
        slotted_page::Error::IndexOutOfRange { .. } | slotted_page::Error::SlotVacant { .. } => {
            RecordNotFoundSnafu { path, locator }.build()
        }
        e => crate::Error::Page { source: e },
    }
}

impl PhysicalFile for RecordFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create(&mut self) -> Result<()> {
        let path = &self.path;
        ensure!(!path.exists(), AlreadyExistsSnafu { path });

        self.manager.create(path).context(IoSnafu { path })?;
        self.pages.clear();
        self.dirty.clear();
        self.mounted = true;

        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let path = &self.path;
        if path.exists() {
            self.manager.remove(path).context(IoSnafu { path })?;
        }
        backup::discard_image(path)?;

        self.pages.clear();
        self.dirty.clear();
        self.mounted = false;

        Ok(())
    }

    fn move_to(&mut self, path: &Path) -> Result<()> {
        if self.mounted {
            self.flush()?;
        }

        let from = &self.path;
        if from.exists() {
            self.manager
                .rename(from, path)
                .context(IoSnafu { path: from })?;
            backup::move_image(from, path)?;
        }
        self.path = path.to_path_buf();

        Ok(())
    }

    fn mount(&mut self) -> Result<()> {
        if self.mounted {
            return Ok(());
        }

        let path = &self.path;
        ensure!(path.exists(), NotAccessibleSnafu { path });

        self.load()?;
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }

        self.flush()?;
        self.manager.evict(&self.path);
        self.pages.clear();
        self.mounted = false;

        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn flush(&mut self) -> Result<()> {
        let path = &self.path;
        for n in std::mem::take(&mut self.dirty) {
            self.manager
                .write_page(path, n, &self.pages[n as usize])
                .context(IoSnafu { path })?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()?;

        let path = &self.path;
        if path.exists() {
            self.manager.sync(path).context(IoSnafu { path })?;
        }
        Ok(())
    }

    fn start_backup(&mut self, at: Timestamp) -> Result<()> {
        self.flush()?;
        backup::take_image(&self.manager, &self.path, at)
    }

    fn end_backup(&mut self) -> Result<()> {
        Ok(())
    }

    fn recover(&mut self, point: Timestamp) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if backup::apply_image(&self.manager, &self.path, point)? && self.mounted {
            self.load()?;
        }
        Ok(())
    }

    fn restore(&mut self, point: Timestamp) -> Result<()> {
        if backup::apply_image(&self.manager, &self.path, point)? && self.mounted {
            self.load()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{distributions::Alphanumeric, Rng},
        std::num::NonZeroUsize,
        tempfile::tempdir,
    };

    fn manager() -> Arc<StorageManager> {
        Arc::new(StorageManager::new(NonZeroUsize::new(8).unwrap()))
    }

    #[test]
    fn insert_fetch_expunge() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut file = RecordFile::new(manager(), dir.path().join("Table").join("record"));
        file.create()?;

        let a = file.insert(b"first")?;
        let b = file.insert(b"second")?;
        assert_eq!(file.fetch(a)?, b"first");
        assert_eq!(file.count()?, 2);

        file.expunge(a)?;
        assert!(matches!(
            file.fetch(a),
            Err(crate::Error::RecordNotFound { .. })
        ));
        assert_eq!(file.fetch(b)?, b"second");
        Ok(())
    }

    #[test]
    fn survives_remount() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record");
        let manager = manager();

        let mut rng = rand::thread_rng();
        let records = (0..300)
            .map(|_| {
                let len = rng.gen_range(10..200);
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .collect::<Vec<u8>>()
            })
            .collect::<Vec<_>>();

        let mut file = RecordFile::new(manager.clone(), path.clone());
        file.create()?;
        let locators = records
            .iter()
            .map(|r| file.insert(r))
            .collect::<Result<Vec<_>>>()?;
        file.unmount()?;

        let mut file = RecordFile::new(manager, path);
        file.mount()?;
        for (locator, record) in locators.iter().zip(&records) {
            assert_eq!(&file.fetch(*locator)?, record);
        }
        assert_eq!(file.scan()?.len(), records.len());
        assert!(file.verify()?.is_empty());
        Ok(())
    }

    #[test]
    fn update_relocates_when_page_is_full() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut file = RecordFile::new(manager(), dir.path().join("record"));
        file.create()?;

        let filler = vec![1u8; 1000];
        let locators = (0..4)
            .map(|_| file.insert(&filler))
            .collect::<Result<Vec<_>>>()?;
        assert!(locators.iter().all(|l| l.page == 0));

        let grown = vec![2u8; 1500];
        let moved = file.update(locators[0], &grown)?;
        assert_ne!(moved, locators[0]);
        assert_eq!(file.fetch(moved)?, grown);
        assert_eq!(file.count()?, 4);
        Ok(())
    }

    #[test]
    fn move_and_restore() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut file = RecordFile::new(manager(), dir.path().join("a").join("record"));
        file.create()?;
        let l = file.insert(b"kept")?;
        file.start_backup(5)?;
        file.end_backup()?;

        file.insert(b"lost")?;
        file.move_to(&dir.path().join("b").join("record"))?;
        assert!(!dir.path().join("a").join("record").exists());
        assert_eq!(file.count()?, 2);

        // an image newer than the requested point is ignored
        file.restore(4)?;
        assert_eq!(file.count()?, 2);

        file.restore(5)?;
        assert_eq!(file.count()?, 1);
        assert_eq!(file.fetch(l)?, b"kept");
        Ok(())
    }

    #[test]
    fn create_twice_fails() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record");
        RecordFile::new(manager(), path.clone()).create()?;

        assert!(matches!(
            RecordFile::new(manager(), path).create(),
            Err(crate::Error::AlreadyExists { .. })
        ));
        Ok(())
    }
}
