use {
    super::table::{Children, Table},
    crate::{
        entity::Objects,
        error::{Result, StorageSnafu},
        object::{Object, Status},
        persist::{Persist, PersistContext},
        store::IndexSpec,
    },
    def::{tuple_struct, u32_enum, Category, ObjectId, Scope, Tuple},
    snafu::prelude::*,
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

u32_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum FileKind {
        Heap = 0,
        Index = 1,
    }
}

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct FileData {
        index: (ObjectId, Uint),
        kind: (FileKind, Uint),
        area: (ObjectId, Uint),
        path: (String, String),
    }
}

/// A data directory of a table: its heap, or the entries of one index.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    object: Object,
    index: ObjectId,
    kind: FileKind,
    area: ObjectId,
    path: PathBuf,
}

impl File {
    pub fn new(
        database: ObjectId,
        table: ObjectId,
        scope: Scope,
        kind: FileKind,
        index: ObjectId,
        area: ObjectId,
    ) -> Self {
        Self {
            object: Object::new(Category::File, database, table, "", scope),
            index,
            kind,
            area,
            path: PathBuf::new(),
        }
    }

    /// `<base>/<table name>/<file id>`, where the base is an area's path or
    /// the database's data directory.
    pub fn data_path(base: &Path, table: &str, file: ObjectId) -> PathBuf {
        base.join(table).join(file.to_string())
    }

    pub fn table(&self) -> ObjectId {
        self.object.parent()
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// The index whose entries the file holds, `ObjectId::INVALID` for a heap.
    pub fn index(&self) -> ObjectId {
        self.index
    }

    pub fn area(&self) -> ObjectId {
        self.area
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn set_area(&mut self, area: ObjectId) {
        self.area = area;
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }
}

impl Persist for File {
    const CATEGORY: Category = Category::File;
    const INDEXES: &'static [IndexSpec] = &[IndexSpec::new("table", 1)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        FileData {
            index: self.index,
            kind: self.kind,
            area: self.area,
            path: self.path.to_string_lossy().into_owned(),
        }
        .into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = FileData::try_from(data)?;
        Ok(Self {
            object,
            index: data.index,
            kind: data.kind,
            area: data.area,
            path: PathBuf::from(data.path),
        })
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.files
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.files
    }

    fn before_persist(&self, ctx: &PersistContext<'_>, status: Status) -> Result<()> {
        let gone = matches!(
            status,
            Status::Deleted | Status::DeletedInRecovery | Status::CreateCanceled
        );
        let exists = ctx.env.driver().exists(&self.path);
        if gone && exists {
            ctx.env.driver().destroy(&self.path).context(StorageSnafu)?;
            tracing::debug!(file = %self.object.id(), path = %self.path.display(), "data removed");
        }
        // a drop that already reached the store took the directory along
        if status == Status::DeleteCanceled && !exists && !ctx.deleting {
            ctx.env.driver().create(&self.path).context(StorageSnafu)?;
            tracing::debug!(file = %self.object.id(), path = %self.path.display(), "data directory recreated");
        }
        Ok(())
    }

    fn after_load(&self, objects: &Objects) -> std::result::Result<(), String> {
        if !objects.tables.contains_key(&self.table()) {
            return Err(format!("table {} does not exist", self.table()));
        }
        if self.kind == FileKind::Index && !objects.indexes.contains_key(&self.index) {
            return Err(format!("index {} does not exist", self.index));
        }
        if self.area.is_valid() && !objects.areas.contains_key(&self.area) {
            return Err(format!("area {} does not exist", self.area));
        }
        Ok(())
    }

    fn attach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::register(objects, parent, Children::Files, id);
    }

    fn detach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::unregister(objects, parent, Children::Files, id);
    }
}
