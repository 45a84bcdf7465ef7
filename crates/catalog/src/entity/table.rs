use {
    crate::{
        entity::Objects,
        environment::Environment,
        error::Result,
        object::{Object, Reference, Status},
        persist::{Persist, PersistContext},
        sequence::{Sequence, SequenceOptions, TemporaryKey},
        store::IndexSpec,
    },
    def::{transaction::SessionId, tuple_struct, Category, ObjectId, Scope, Tuple},
    std::{
        collections::{BTreeMap, BTreeSet},
        path::{Path, PathBuf},
        sync::Arc,
    },
};

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct TableData {
        area: (ObjectId, Uint),
    }
}

/// A table. Its columns, indexes, constraints and files register themselves
/// here by id when they are created or loaded.
#[derive(Debug, Clone)]
pub struct Table {
    object: Object,
    area: ObjectId,
    columns: BTreeSet<ObjectId>,
    indexes: BTreeSet<ObjectId>,
    constraints: BTreeSet<ObjectId>,
    files: BTreeSet<ObjectId>,
    row_ids: Reference<Arc<Sequence>>,
}

impl Table {
    pub fn new(database: ObjectId, name: impl Into<String>, scope: Scope, area: ObjectId) -> Self {
        Self {
            object: Object::new(Category::Table, database, database, name, scope),
            area,
            columns: BTreeSet::new(),
            indexes: BTreeSet::new(),
            constraints: BTreeSet::new(),
            files: BTreeSet::new(),
            row_ids: Reference::default(),
        }
    }

    /// The area new files of the table go to; `ObjectId::INVALID` for the database's data directory.
    pub fn area(&self) -> ObjectId {
        self.area
    }

    pub(crate) fn set_area(&mut self, area: ObjectId) {
        self.area = area;
    }

    pub fn columns(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.columns.iter().copied()
    }

    pub fn indexes(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.indexes.iter().copied()
    }

    pub fn constraints(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.constraints.iter().copied()
    }

    pub fn files(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.files.iter().copied()
    }

    pub fn row_id_path(root: &Path, system_dir: &str, table: ObjectId) -> PathBuf {
        root.join(system_dir).join("RowID").join(table.to_string())
    }

    /// The table's row id sequence, attached on first use. Tables that never
    /// reach a store keep their row ids in the session registry.
    pub(crate) fn row_ids(
        &self,
        env: &Arc<Environment>,
        root: &Path,
        session: SessionId,
    ) -> Result<Arc<Sequence>> {
        self.row_ids.get_or_resolve(|| {
            let id = self.object.id();
            let sequence = if self.object.scope().is_stored() {
                let path = Self::row_id_path(root, &env.config().system_dir, id);
                Sequence::new(env.clone(), path, SequenceOptions::unsigned())?
            } else {
                let key = TemporaryKey {
                    session,
                    table: id,
                    column: ObjectId::INVALID,
                };
                Sequence::temporary(env.clone(), key, SequenceOptions::unsigned())?
            };
            tracing::trace!(table = %id, "row id sequence attached");
            Ok(Arc::new(sequence))
        })
    }

    /// The attached row id sequence, if any.
    pub(crate) fn attached_row_ids(&self) -> Option<Arc<Sequence>> {
        self.row_ids.get()
    }

    /// Detaches the row id sequence; the next use attaches it again.
    pub(crate) fn forget_row_ids(&self) {
        self.row_ids.clear();
    }
}

impl Persist for Table {
    const CATEGORY: Category = Category::Table;
    const INDEXES: &'static [IndexSpec] = &[IndexSpec::new("database", 1)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        TableData { area: self.area }.into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = TableData::try_from(data)?;
        let mut table = Self::new(object.database(), "", object.scope(), data.area);
        table.object = object;
        Ok(table)
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.tables
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.tables
    }

    fn after_persist(&self, ctx: &PersistContext<'_>, status: Status) -> Result<()> {
        if matches!(status, Status::Deleted | Status::DeletedInRecovery) {
            self.row_ids(ctx.env, ctx.root, 0)?.destroy()?;
            self.forget_row_ids();
        }
        Ok(())
    }

    fn after_load(&self, objects: &Objects) -> std::result::Result<(), String> {
        if self.area.is_valid() && !objects.areas.contains_key(&self.area) {
            return Err(format!("area {} does not exist", self.area));
        }
        Ok(())
    }
}

/// Which child collection of a table an object registers with.
pub(crate) enum Children {
    Columns,
    Indexes,
    Constraints,
    Files,
}

impl Table {
    fn children(&mut self, children: Children) -> &mut BTreeSet<ObjectId> {
        match children {
            Children::Columns => &mut self.columns,
            Children::Indexes => &mut self.indexes,
            Children::Constraints => &mut self.constraints,
            Children::Files => &mut self.files,
        }
    }

    pub(crate) fn register(objects: &mut Objects, table: ObjectId, children: Children, id: ObjectId) {
        if let Some(table) = objects.tables.get_mut(&table) {
            table.children(children).insert(id);
        }
    }

    pub(crate) fn unregister(objects: &mut Objects, table: ObjectId, children: Children, id: ObjectId) {
        if let Some(table) = objects.tables.get_mut(&table) {
            table.children(children).remove(&id);
        }
    }
}
