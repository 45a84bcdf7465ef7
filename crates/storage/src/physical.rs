use {crate::Result, def::Timestamp, std::path::Path};

/// Lifecycle shared by every file the catalog keeps on disk.
pub trait PhysicalFile {
    fn path(&self) -> &Path;

    fn create(&mut self) -> Result<()>;

    fn destroy(&mut self) -> Result<()>;

    /// Relocates the file to `path`. The file is flushed first.
    fn move_to(&mut self, path: &Path) -> Result<()>;

    fn mount(&mut self) -> Result<()>;

    fn unmount(&mut self) -> Result<()>;

    fn is_mounted(&self) -> bool;

    fn is_accessible(&self) -> bool {
        self.path().exists()
    }

    /// Writes dirty pages back to the file.
    fn flush(&mut self) -> Result<()>;

    /// Flushes and forces the file to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Takes a point-in-time image of the file tagged with `at`.
    fn start_backup(&mut self, at: Timestamp) -> Result<()>;

    fn end_backup(&mut self) -> Result<()>;

    /// Rebuilds a missing file from its image if the image is not newer than `point`.
    fn recover(&mut self, point: Timestamp) -> Result<()>;

    /// Rolls the file back to its image if the image is not newer than `point`.
    fn restore(&mut self, point: Timestamp) -> Result<()>;
}
