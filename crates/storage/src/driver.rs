use {
    crate::{error::IoSnafu, Result},
    snafu::prelude::*,
    std::{fs, path::Path},
};

/// Physical operations on the directories that hold table and index data.
pub trait FileDriver: Send + Sync {
    fn create(&self, dir: &Path) -> Result<()>;

    /// Removes `dir` and everything in it. Missing directories are ignored.
    fn destroy(&self, dir: &Path) -> Result<()>;

    /// Moves `from` to `to`. A missing `from` is a no-op.
    fn relocate(&self, from: &Path, to: &Path) -> Result<()>;

    fn exists(&self, dir: &Path) -> bool {
        dir.exists()
    }
}

#[derive(Debug, Default)]
pub struct DirectoryDriver;

impl FileDriver for DirectoryDriver {
    fn create(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context(IoSnafu { path: dir })
    }

    fn destroy(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            fs::remove_dir_all(dir).context(IoSnafu { path: dir })?;
            remove_empty_parent(dir);
        }
        Ok(())
    }

    fn relocate(&self, from: &Path, to: &Path) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if !from.exists() {
            tracing::debug!(from = %from.display(), "nothing to relocate");
            return Ok(());
        }

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }
        fs::rename(from, to).context(IoSnafu { path: from })?;
        remove_empty_parent(from);

        tracing::debug!(from = %from.display(), to = %to.display(), "directory relocated");
        Ok(())
    }
}

// Data directories are laid out as <root>/<table>/<file>; once the last file
// of a table leaves, its directory goes too.
fn remove_empty_parent(dir: &Path) {
    let Some(parent) = dir.parent() else {
        return;
    };
    remove_if_empty(parent);
}

/// Removes `dir` when it holds no entries, logging a failed removal.
pub fn remove_if_empty(dir: &Path) {
    let empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if !empty {
        return;
    }
    if let Err(error) = fs::remove_dir(dir) {
        tracing::warn!(dir = %dir.display(), %error, "cannot remove empty directory");
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::tempdir};

    #[test]
    fn relocate_and_destroy() -> Result<()> {
        let root = tempdir().unwrap();
        let from = root.path().join("a").join("t1").join("f1");
        let to = root.path().join("b").join("t1").join("f1");

        let driver = DirectoryDriver;
        driver.create(&from)?;
        fs::write(from.join("data"), b"rows").unwrap();

        driver.relocate(&from, &to)?;
        assert!(!from.exists());
        assert!(!root.path().join("a").join("t1").exists());
        assert_eq!(fs::read(to.join("data")).unwrap(), b"rows");

        // moving something that was never created does nothing
        driver.relocate(&from, &root.path().join("c"))?;
        assert!(!root.path().join("c").exists());

        driver.destroy(&to)?;
        assert!(!to.exists());
        driver.destroy(&to)
    }

    #[test]
    fn only_empty_directories_are_removed() {
        let root = tempdir().unwrap();
        let full = root.path().join("full");
        fs::create_dir(&full).unwrap();
        fs::write(full.join("data"), b"rows").unwrap();
        let empty = root.path().join("empty");
        fs::create_dir(&empty).unwrap();

        remove_if_empty(&full);
        remove_if_empty(&empty);
        remove_if_empty(&root.path().join("missing"));

        assert!(full.join("data").exists());
        assert!(!empty.exists());
    }
}
