use {
    super::table::{Children, Table},
    crate::{entity::Objects, object::Object, persist::Persist, store::IndexSpec},
    def::{tuple_struct, u32_enum, Category, ObjectId, Scope, Tuple},
    std::collections::BTreeMap,
};

u32_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ConstraintKind {
        PrimaryKey = 0,
        Unique = 1,
        NotNull = 2,
    }
}

impl ConstraintKind {
    /// Whether an index enforces constraints of this kind.
    pub fn needs_index(&self) -> bool {
        matches!(self, Self::PrimaryKey | Self::Unique)
    }
}

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct ConstraintData {
        kind: (ConstraintKind, Uint),
        index: (ObjectId, Uint),
        columns: (Vec<u32>, UintArray),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    object: Object,
    kind: ConstraintKind,
    index: ObjectId,
    columns: Vec<u32>,
}

impl Constraint {
    pub fn new(
        database: ObjectId,
        table: ObjectId,
        name: impl Into<String>,
        scope: Scope,
        kind: ConstraintKind,
        index: ObjectId,
        columns: Vec<u32>,
    ) -> Self {
        Self {
            object: Object::new(Category::Constraint, database, table, name, scope),
            kind,
            index,
            columns,
        }
    }

    pub fn table(&self) -> ObjectId {
        self.object.parent()
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// The enforcing index, `ObjectId::INVALID` for kinds that need none.
    pub fn index(&self) -> ObjectId {
        self.index
    }

    pub fn columns(&self) -> &[u32] {
        &self.columns
    }
}

impl Persist for Constraint {
    const CATEGORY: Category = Category::Constraint;
    const INDEXES: &'static [IndexSpec] = &[IndexSpec::new("table", 1)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        ConstraintData {
            kind: self.kind,
            index: self.index,
            columns: self.columns.clone(),
        }
        .into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = ConstraintData::try_from(data)?;
        Ok(Self {
            object,
            kind: data.kind,
            index: data.index,
            columns: data.columns,
        })
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.constraints
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.constraints
    }

    fn after_load(&self, objects: &Objects) -> Result<(), String> {
        if !objects.tables.contains_key(&self.table()) {
            return Err(format!("table {} does not exist", self.table()));
        }
        if self.kind.needs_index() && !objects.indexes.contains_key(&self.index) {
            return Err(format!("enforcing index {} does not exist", self.index));
        }
        Ok(())
    }

    fn attach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::register(objects, parent, Children::Constraints, id);
    }

    fn detach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::unregister(objects, parent, Children::Constraints, id);
    }
}
