use {
    crate::{error::IoSnafu, Result, StorageManager},
    byteorder::{ReadBytesExt, WriteBytesExt, LE},
    def::Timestamp,
    snafu::prelude::*,
    std::{
        fs::{self, File},
        path::{Path, PathBuf},
    },
};

fn image_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".image");
    PathBuf::from(name)
}

fn stamp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".stamp");
    PathBuf::from(name)
}

/// Copies `path` aside together with the time the copy was taken at.
pub(crate) fn take_image(manager: &StorageManager, path: &Path, at: Timestamp) -> Result<()> {
    manager.sync(path).context(IoSnafu { path })?;

    let image = image_path(path);
    fs::copy(path, &image).context(IoSnafu { path: &image })?;

    let stamp = stamp_path(path);
    let mut file = File::create(&stamp).context(IoSnafu { path: &stamp })?;
    file.write_u64::<LE>(at).context(IoSnafu { path: &stamp })?;

    tracing::debug!(path = %path.display(), at, "image taken");
    Ok(())
}

fn image_stamp(path: &Path) -> Result<Option<Timestamp>> {
    let stamp = stamp_path(path);
    if !stamp.exists() || !image_path(path).exists() {
        return Ok(None);
    }

    let mut file = File::open(&stamp).context(IoSnafu { path: &stamp })?;
    Ok(Some(file.read_u64::<LE>().context(IoSnafu { path: &stamp })?))
}

/// Puts the image back in place of `path` when it was taken at or before `point`.
/// Returns whether anything was restored.
pub(crate) fn apply_image(manager: &StorageManager, path: &Path, point: Timestamp) -> Result<bool> {
    match image_stamp(path)? {
        Some(at) if at <= point => {
            manager.evict(path);
            fs::copy(image_path(path), path).context(IoSnafu { path })?;
            tracing::info!(path = %path.display(), at, point, "image applied");
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub(crate) fn discard_image(path: &Path) -> Result<()> {
    for p in [image_path(path), stamp_path(path)] {
        if p.exists() {
            fs::remove_file(&p).context(IoSnafu { path: &p })?;
        }
    }
    Ok(())
}

/// Moves the image files that belong to `from` next to `to`.
pub(crate) fn move_image(from: &Path, to: &Path) -> Result<()> {
    for (src, dst) in [
        (image_path(from), image_path(to)),
        (stamp_path(from), stamp_path(to)),
    ] {
        if src.exists() {
            fs::rename(&src, &dst).context(IoSnafu { path: &src })?;
        }
    }
    Ok(())
}
