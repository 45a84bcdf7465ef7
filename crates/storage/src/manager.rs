use {
    crate::{Page, PageNum, PAGE_SIZE},
    lru::LruCache,
    parking_lot::Mutex,
    std::{
        fs::{self, File, OpenOptions},
        io::{Read, Result, Seek, SeekFrom, Write},
        num::NonZeroUsize,
        path::{Path, PathBuf},
    },
};

/// Page-level file access with a bounded cache of open handles.
#[derive(Debug)]
pub struct StorageManager {
    opened_files: Mutex<LruCache<PathBuf, File>>,
}

impl StorageManager {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            opened_files: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn with_file<T>(&self, path: &Path, f: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        let mut files = self.opened_files.lock();
        let key = path.to_path_buf();

        if !files.contains(&key) {
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            files.put(key.clone(), file);
        }

        match files.get_mut(&key) {
            Some(file) => f(file),
            None => Err(std::io::ErrorKind::NotFound.into()),
        }
    }

    /// Creates an empty file, along with any missing parent directories.
    pub fn create(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    pub fn read_page(&self, path: &Path, page: PageNum, data: &mut Page) -> Result<()> {
        self.with_file(path, |file| {
            file.seek(SeekFrom::Start(page as u64 * PAGE_SIZE as u64))?;
            file.read_exact(data.bytes_mut())
        })
    }

    pub fn write_page(&self, path: &Path, page: PageNum, data: &Page) -> Result<()> {
        self.with_file(path, |file| {
            file.seek(SeekFrom::Start(page as u64 * PAGE_SIZE as u64))?;
            file.write_all(data.bytes())
        })
    }

    pub fn page_count(&self, path: &Path) -> Result<u32> {
        self.with_file(path, |file| {
            Ok((file.metadata()?.len() / PAGE_SIZE as u64) as u32)
        })
    }

    pub fn truncate(&self, path: &Path, pages: u32) -> Result<()> {
        self.with_file(path, |file| file.set_len(pages as u64 * PAGE_SIZE as u64))
    }

    pub fn sync(&self, path: &Path) -> Result<()> {
        self.with_file(path, |file| file.sync_all())
    }

    /// Drops the cached handle so the file can be renamed or removed.
    pub fn evict(&self, path: &Path) {
        self.opened_files.lock().pop(&path.to_path_buf());
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        self.evict(path);
        fs::remove_file(path)
    }

    pub fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.evict(from);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)
    }

    pub fn open_count(&self) -> usize {
        self.opened_files.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::tempdir};

    #[test]
    fn write_and_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("pages");

        let manager = StorageManager::new(NonZeroUsize::new(4).unwrap());
        manager.create(&path)?;

        let mut page_w = Page::new();
        page_w.bytes_mut().fill(123);
        let mut page_r = Page::new();

        manager.write_page(&path, 1, &page_w)?;
        manager.read_page(&path, 1, &mut page_r)?;

        assert_eq!(page_w.bytes(), page_r.bytes());
        assert_eq!(manager.page_count(&path)?, 2);

        Ok(())
    }

    #[test]
    fn handle_cache_is_bounded() -> Result<()> {
        let dir = tempdir()?;
        let manager = StorageManager::new(NonZeroUsize::new(2).unwrap());

        for i in 0..5 {
            let path = dir.path().join(format!("f{i}"));
            manager.create(&path)?;
            manager.write_page(&path, 0, &Page::new())?;
        }
        assert_eq!(manager.open_count(), 2);

        let moved = dir.path().join("moved").join("f4");
        manager.rename(&dir.path().join("f4"), &moved)?;
        assert_eq!(manager.page_count(&moved)?, 1);

        Ok(())
    }
}
