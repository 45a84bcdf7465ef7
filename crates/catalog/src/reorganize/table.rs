use {
    super::{FileMove, Saga},
    crate::{
        database::{Database, Mode},
        entity::{File, Table},
        error::Result,
        persist::Persist,
    },
    def::{transaction::Transaction, ObjectId},
};

impl Database {
    /// Moves every file of `table` into `area` and records the table there.
    pub(crate) fn move_table(
        &mut self,
        tx: &dyn Transaction,
        table: ObjectId,
        area: ObjectId,
        mode: Mode,
    ) -> Result<()> {
        let (from, files) = {
            let t = self.entity::<Table>(table)?;
            (t.area(), t.files().collect::<Vec<_>>())
        };

        let mut saga: Saga<'_, Self> = Saga::new("table.move_area", tx, self.env.clone(), self.id);
        for file in files {
            saga.stage(
                self,
                "file_moved",
                |db| {
                    let back = db.entity::<File>(file)?.area();
                    let clean = (db.clean_state::<File>(file), db.clean_state::<Table>(table));
                    db.move_file_area(tx, file, area, mode)?;
                    Ok((back, clean))
                },
                move |db, (back, (file_clean, table_clean))| {
                    db.move_file_area(tx, file, back, Mode::Undo)?;
                    db.restore_clean::<File>(file, file_clean);
                    db.restore_clean::<Table>(table, table_clean);
                    Ok(())
                },
            )?;
        }

        saga.stage(
            self,
            "table_updated",
            |db| {
                let clean = db.clean_state::<Table>(table);
                db.entity_mut::<Table>(table)?.set_area(area);
                db.touch::<Table>(table);
                Ok(clean)
            },
            move |db, clean| {
                if let Some(t) = db.objects.tables.get_mut(&table) {
                    t.set_area(from);
                }
                db.restore_clean::<Table>(table, clean);
                Ok(())
            },
        )?;
        saga.finish();

        tracing::info!(%table, %from, to = %area, "table moved");
        Ok(())
    }

    /// Renames `table` and moves its file directories under the new name.
    pub(crate) fn rename(
        &mut self,
        tx: &dyn Transaction,
        table: ObjectId,
        to: &str,
        mode: Mode,
    ) -> Result<()> {
        let files = self.entity::<Table>(table)?.files().collect::<Vec<_>>();

        let mut saga: Saga<'_, Self> = Saga::new("table.rename", tx, self.env.clone(), self.id);
        let (from, _) = saga.stage(
            self,
            "renamed",
            |db| {
                let clean = db.clean_state::<Table>(table);
                let object = db.entity_mut::<Table>(table)?.object_mut();
                let from = object.name().to_string();
                object.set_name(to);
                db.touch::<Table>(table);
                Ok((from, clean))
            },
            move |db, (from, clean)| {
                if let Some(t) = db.objects.tables.get_mut(&table) {
                    t.object_mut().set_name(from);
                }
                db.restore_clean::<Table>(table, clean);
                Ok(())
            },
        )?;

        for file in files {
            saga.stage(
                self,
                "file_renamed",
                |db| {
                    let (area, back) = {
                        let f = db.entity::<File>(file)?;
                        (f.area(), f.path().to_path_buf())
                    };
                    let target = db.data_path(area, to, file)?;
                    let clean = db.clean_state::<File>(file);
                    db.relocate_file(tx, file, target, FileMove::Rename, mode)?;
                    Ok((back, clean))
                },
                move |db, (back, clean)| {
                    db.relocate_file(tx, file, back, FileMove::Rename, Mode::Undo)?;
                    db.restore_clean::<File>(file, clean);
                    Ok(())
                },
            )?;
        }
        saga.finish();

        tracing::info!(%table, %from, to, "table renamed");
        Ok(())
    }
}
