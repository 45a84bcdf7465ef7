use {
    super::{remove_if_empty, FileMove, Saga},
    crate::{
        database::{Database, Mode},
        entity::{Area, File, Table},
        error::{IoSnafu, Result, StorageSnafu},
        persist::Persist,
    },
    def::{transaction::Transaction, ObjectId},
    snafu::prelude::*,
    std::{fs, path::PathBuf},
};

impl Database {
    /// Points `area` at `path`. Every file stored in the area moves along,
    /// keeping its place relative to the area's directory.
    pub(crate) fn alter_path(
        &mut self,
        tx: &dyn Transaction,
        area: ObjectId,
        path: &str,
        mode: Mode,
    ) -> Result<()> {
        let from = PathBuf::from(self.entity::<Area>(area)?.path());
        let target = PathBuf::from(path);
        let files = self.objects.files_in(area);

        let mut saga: Saga<'_, Self> = Saga::new("area.alter_path", tx, self.env.clone(), self.id);

        let created = target.clone();
        saga.stage(
            self,
            "directory_created",
            |db| {
                let existed = db.env.driver().exists(&target);
                db.env.driver().create(&target).context(StorageSnafu)?;
                Ok(existed)
            },
            move |_, existed| {
                if !existed {
                    remove_if_empty(&created)?;
                }
                Ok(())
            },
        )?;

        for file in files {
            saga.stage(
                self,
                "file_moved",
                |db| {
                    let (table, back) = {
                        let f = db.entity::<File>(file)?;
                        (f.table(), f.path().to_path_buf())
                    };
                    let name = db.entity::<Table>(table)?.object().name().to_string();
                    let to = File::data_path(&target, &name, file);
                    let clean = db.clean_state::<File>(file);
                    db.relocate_file(tx, file, to, FileMove::DataPath, mode)?;
                    Ok((back, clean))
                },
                move |db, (back, clean)| {
                    db.relocate_file(tx, file, back, FileMove::DataPath, Mode::Undo)?;
                    db.restore_clean::<File>(file, clean);
                    Ok(())
                },
            )?;
        }

        let back = from.to_string_lossy().into_owned();
        saga.stage(
            self,
            "path_set",
            |db| {
                let clean = db.clean_state::<Area>(area);
                db.entity_mut::<Area>(area)?.set_path(path);
                db.touch::<Area>(area);
                Ok(clean)
            },
            move |db, clean| {
                if let Some(a) = db.objects.areas.get_mut(&area) {
                    a.set_path(back);
                }
                db.restore_clean::<Area>(area, clean);
                Ok(())
            },
        )?;

        saga.stage(
            self,
            "removed",
            |_| {
                let removed = remove_if_empty(&from)?;
                Ok((from, removed))
            },
            |_, (from, removed)| {
                if removed {
                    fs::create_dir_all(&from).context(IoSnafu { path: &from })?;
                }
                Ok(())
            },
        )?;
        saga.finish();

        tracing::info!(%area, to = path, "area path altered");
        Ok(())
    }
}
