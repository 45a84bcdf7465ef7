use {
    crate::{
        backup,
        error::{AlreadyExistsSnafu, IoSnafu, NotAccessibleSnafu},
        Page, PhysicalFile, Result, StorageManager,
    },
    def::Timestamp,
    snafu::prelude::*,
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfixMode {
    Dirty,
    NotDirty,
}

/// A file made of exactly one page, attached and detached as a whole.
#[derive(Debug)]
pub struct PageFile {
    manager: Arc<StorageManager>,
    path: PathBuf,
    mounted: bool,
}

impl PageFile {
    pub fn new(manager: Arc<StorageManager>, path: PathBuf) -> Self {
        Self {
            manager,
            path,
            mounted: false,
        }
    }

    /// True until the file has been created on disk.
    pub fn is_vacant(&self) -> bool {
        !self.path.exists()
    }

    pub fn attach_page(&mut self) -> Result<Page> {
        let path = &self.path;
        ensure!(path.exists(), NotAccessibleSnafu { path });

        let mut page = Page::new();
        if self.manager.page_count(path).context(IoSnafu { path })? > 0 {
            self.manager
                .read_page(path, 0, &mut page)
                .context(IoSnafu { path })?;
        }
        self.mounted = true;

        Ok(page)
    }

    pub fn detach_page(&mut self, page: &Page, mode: UnfixMode) -> Result<()> {
        if mode == UnfixMode::Dirty {
            let path = &self.path;
            self.manager
                .write_page(path, 0, page)
                .context(IoSnafu { path })?;
        }
        Ok(())
    }
}

impl PhysicalFile for PageFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create(&mut self) -> Result<()> {
        let path = &self.path;
        ensure!(!path.exists(), AlreadyExistsSnafu { path });

        self.manager.create(path).context(IoSnafu { path })?;
        self.manager
            .write_page(path, 0, &Page::new())
            .context(IoSnafu { path })?;
        self.mounted = true;

        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let path = &self.path;
        if path.exists() {
            self.manager.remove(path).context(IoSnafu { path })?;
        }
        backup::discard_image(path)?;
        self.mounted = false;

        Ok(())
    }

    fn move_to(&mut self, path: &Path) -> Result<()> {
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
        let path = &self.path;
        ensure!(path.exists(), NotAccessibleSnafu { path });
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.manager.evict(&self.path);
        self.mounted = false;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let path = &self.path;
        if path.exists() {
            self.manager.sync(path).context(IoSnafu { path })?;
        }
        Ok(())
    }

    fn start_backup(&mut self, at: Timestamp) -> Result<()> {
        backup::take_image(&self.manager, &self.path, at)
    }

    fn end_backup(&mut self) -> Result<()> {
        Ok(())
    }

    fn recover(&mut self, point: Timestamp) -> Result<()> {
        if self.is_vacant() {
            backup::apply_image(&self.manager, &self.path, point)?;
        }
        Ok(())
    }

    fn restore(&mut self, point: Timestamp) -> Result<()> {
        backup::apply_image(&self.manager, &self.path, point).map(|_| ())
    }
}
