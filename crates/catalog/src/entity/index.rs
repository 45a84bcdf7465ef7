use {
    super::table::{Children, Table},
    crate::{entity::Objects, object::Object, persist::Persist, store::IndexSpec},
    def::{tuple_struct, Category, ObjectId, Scope, Tuple},
    std::collections::BTreeMap,
};

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct IndexData {
        unique: (bool, Boolean),
        columns: (Vec<u32>, UintArray),
    }
}

/// An index over some columns of its parent table, by column position.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    object: Object,
    unique: bool,
    columns: Vec<u32>,
}

impl Index {
    pub fn new(
        database: ObjectId,
        table: ObjectId,
        name: impl Into<String>,
        scope: Scope,
        unique: bool,
        columns: Vec<u32>,
    ) -> Self {
        Self {
            object: Object::new(Category::Index, database, table, name, scope),
            unique,
            columns,
        }
    }

    pub fn table(&self) -> ObjectId {
        self.object.parent()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn columns(&self) -> &[u32] {
        &self.columns
    }
}

impl Persist for Index {
    const CATEGORY: Category = Category::Index;
    const INDEXES: &'static [IndexSpec] = &[IndexSpec::new("table", 1)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        IndexData {
            unique: self.unique,
            columns: self.columns.clone(),
        }
        .into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = IndexData::try_from(data)?;
        Ok(Self {
            object,
            unique: data.unique,
            columns: data.columns,
        })
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.indexes
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.indexes
    }

    fn after_load(&self, objects: &Objects) -> Result<(), String> {
        let Some(table) = objects.tables.get(&self.table()) else {
            return Err(format!("table {} does not exist", self.table()));
        };
        let width = table.columns().count() as u32;
        if let Some(position) = self.columns.iter().find(|p| **p >= width) {
            return Err(format!("column position {position} is out of range"));
        }
        Ok(())
    }

    fn attach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::register(objects, parent, Children::Indexes, id);
    }

    fn detach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::unregister(objects, parent, Children::Indexes, id);
    }
}
