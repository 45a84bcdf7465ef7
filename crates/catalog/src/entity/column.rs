use {
    super::table::{Children, Table},
    crate::{entity::Objects, object::Object, persist::Persist, store::IndexSpec},
    def::{tuple_struct, Category, ObjectId, Scope, Tuple},
    std::collections::BTreeMap,
};

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct ColumnData {
        position: (u32, Uint),
        type_name: (String, String),
        nullable: (bool, Boolean),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    object: Object,
    position: u32,
    type_name: String,
    nullable: bool,
}

impl Column {
    pub fn new(
        database: ObjectId,
        table: ObjectId,
        name: impl Into<String>,
        scope: Scope,
        position: u32,
        type_name: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Self {
            object: Object::new(Category::Column, database, table, name, scope),
            position,
            type_name: type_name.into(),
            nullable,
        }
    }

    pub fn table(&self) -> ObjectId {
        self.object.parent()
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl Persist for Column {
    const CATEGORY: Category = Category::Column;
    const INDEXES: &'static [IndexSpec] = &[IndexSpec::new("table", 1)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        ColumnData {
            position: self.position,
            type_name: self.type_name.clone(),
            nullable: self.nullable,
        }
        .into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = ColumnData::try_from(data)?;
        Ok(Self {
            object,
            position: data.position,
            type_name: data.type_name,
            nullable: data.nullable,
        })
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.columns
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.columns
    }

    fn after_load(&self, objects: &Objects) -> Result<(), String> {
        if !objects.tables.contains_key(&self.table()) {
            return Err(format!("table {} does not exist", self.table()));
        }
        Ok(())
    }

    fn attach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::register(objects, parent, Children::Columns, id);
    }

    fn detach(objects: &mut Objects, parent: ObjectId, id: ObjectId) {
        Table::unregister(objects, parent, Children::Columns, id);
    }
}
