use {
    super::{remove_if_empty, Saga},
    crate::{
        database::{Database, Mode},
        entity::{AreaContent, File, Table},
        error::{IoSnafu, Result, StorageSnafu},
        persist::Persist,
    },
    def::{transaction::Transaction, Category, ObjectId},
    snafu::prelude::*,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Why a file's data directory moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileMove {
    /// Into the directory of another area.
    AreaPath,
    /// Along with an area whose path was redefined.
    DataPath,
    /// Under the new name of its table.
    Rename,
}

impl FileMove {
    fn saga(self) -> &'static str {
        match self {
            Self::AreaPath => "file.move_area_path",
            Self::DataPath => "file.move_path",
            Self::Rename => "file.move_rename",
        }
    }
}

impl Database {
    fn set_file_path(&mut self, file: ObjectId, path: PathBuf) {
        if let Some(f) = self.objects.files.get_mut(&file) {
            f.set_path(path);
            f.object_mut().touch(self.env.marks());
        }
    }

    /// Moves the data directory of `file` to `to` and records the new path.
    ///
    /// When redoing, the directory may or may not have moved before the
    /// crash; it is moved if it is still at the old place, and the path is
    /// recorded either way.
    pub(crate) fn relocate_file(
        &mut self,
        tx: &dyn Transaction,
        file: ObjectId,
        to: PathBuf,
        how: FileMove,
        mode: Mode,
    ) -> Result<()> {
        let from = self.entity::<File>(file)?.path().to_path_buf();
        if from == to {
            return Ok(());
        }

        if mode == Mode::Redo {
            let driver = self.env.driver();
            if driver.exists(&from) && !driver.exists(&to) {
                driver.relocate(&from, &to).context(StorageSnafu)?;
            }
            self.set_file_path(file, to);
            return Ok(());
        }

        let mut saga: Saga<'_, Self> = Saga::new(how.saga(), tx, self.env.clone(), self.id);

        let parent = to.parent().map(Path::to_path_buf).unwrap_or_default();
        saga.stage(
            self,
            "moving",
            |db| {
                let existed = db.env.driver().exists(&parent);
                db.env.driver().create(&parent).context(StorageSnafu)?;
                Ok((parent, existed))
            },
            |_, (parent, existed)| {
                if !existed {
                    remove_if_empty(&parent)?;
                }
                Ok(())
            },
        )?;

        let (source, target) = (from.clone(), to.clone());
        saga.guarded(
            self,
            "moved",
            move |db: &mut Self| db.env.driver().relocate(&target, &source).context(StorageSnafu),
            |db| db.env.driver().relocate(&from, &to).context(StorageSnafu),
        )?;

        let back = from.clone();
        saga.stage(
            self,
            "file_id_set",
            |db| {
                let clean = db.clean_state::<File>(file);
                db.set_file_path(file, to);
                Ok(clean)
            },
            move |db, clean| {
                if let Some(f) = db.objects.files.get_mut(&file) {
                    f.set_path(back);
                }
                db.restore_clean::<File>(file, clean);
                Ok(())
            },
        )?;

        let old_parent = from.parent().map(Path::to_path_buf).unwrap_or_default();
        saga.stage(
            self,
            "removed",
            |_| {
                let removed = remove_if_empty(&old_parent)?;
                Ok((old_parent, removed))
            },
            |_, (old_parent, removed)| {
                if removed {
                    fs::create_dir_all(&old_parent).context(IoSnafu { path: &old_parent })?;
                }
                Ok(())
            },
        )?;
        saga.finish();

        tracing::debug!(%file, from = %from.display(), "file relocated");
        Ok(())
    }

    /// Records `file` as stored in `area`: a content entry for the new area
    /// replaces the one for the old area. Returns the dropped and the created entry.
    fn move_content(
        &mut self,
        tx: &dyn Transaction,
        file: ObjectId,
        area: ObjectId,
        recovery: bool,
    ) -> Result<(Option<ObjectId>, Option<ObjectId>)> {
        let old = self.objects.content_for(file).map(|c| c.object().id());
        let new = if area.is_valid() {
            let content = AreaContent::new(self.id, area, file, Category::File);
            Some(self.add(tx, content, None)?)
        } else {
            None
        };
        if let Some(old) = old {
            self.drop_object::<AreaContent>(old, recovery);
        }
        Ok((old, new))
    }

    /// Moves a file into `area`, or into the database's data directory for
    /// `ObjectId::INVALID`.
    pub(crate) fn move_file_area(
        &mut self,
        tx: &dyn Transaction,
        file: ObjectId,
        area: ObjectId,
        mode: Mode,
    ) -> Result<()> {
        let (from_area, table, back) = {
            let f = self.entity::<File>(file)?;
            (f.area(), f.table(), f.path().to_path_buf())
        };
        if from_area == area {
            return Ok(());
        }
        let table_name = self.entity::<Table>(table)?.object().name().to_string();
        let to = self.data_path(area, &table_name, file)?;

        let mut saga: Saga<'_, Self> = Saga::new("file.move_area", tx, self.env.clone(), self.id);

        saga.stage(
            self,
            "file_moved",
            |db| {
                let clean = db.clean_state::<File>(file);
                db.relocate_file(tx, file, to, FileMove::AreaPath, mode)?;
                Ok(clean)
            },
            move |db, clean| {
                db.relocate_file(tx, file, back, FileMove::AreaPath, Mode::Undo)?;
                db.restore_clean::<File>(file, clean);
                Ok(())
            },
        )?;

        saga.stage(
            self,
            "content_moved",
            |db| db.move_content(tx, file, area, mode.recovery()),
            |db, (old, new)| {
                if let Some(new) = new {
                    db.forget::<AreaContent>(new);
                }
                if let Some(content) = old.and_then(|old| db.objects.contents.get_mut(&old)) {
                    content.object_mut().undo_drop(db.env.marks());
                }
                Ok(())
            },
        )?;

        saga.stage(
            self,
            "catalog_updated",
            |db| {
                let clean = db.clean_state::<File>(file);
                db.entity_mut::<File>(file)?.set_area(area);
                db.touch::<File>(file);
                Ok(clean)
            },
            move |db, clean| {
                if let Some(f) = db.objects.files.get_mut(&file) {
                    f.set_area(from_area);
                }
                db.restore_clean::<File>(file, clean);
                Ok(())
            },
        )?;

        saga.stage(
            self,
            "touched",
            |db| {
                let clean = db.clean_state::<Table>(table);
                db.touch::<Table>(table);
                Ok(clean)
            },
            move |db, clean| {
                db.restore_clean::<Table>(table, clean);
                Ok(())
            },
        )?;
        saga.finish();

        tracing::debug!(%file, from = %from_area, to = %area, "file moved to area");
        Ok(())
    }
}
