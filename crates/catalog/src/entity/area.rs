use {
    crate::{
        entity::Objects,
        object::Object,
        persist::Persist,
        store::IndexSpec,
    },
    def::{tuple_struct, Category, ObjectId, Scope, Tuple},
    std::collections::BTreeMap,
};

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct AreaData {
        path: (String, String),
    }
}

/// A named storage location that table and index files can be placed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    object: Object,
    path: String,
}

impl Area {
    pub fn new(database: ObjectId, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            object: Object::new(Category::Area, database, database, name, Scope::Permanent),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }
}

impl Persist for Area {
    const CATEGORY: Category = Category::Area;
    const INDEXES: &'static [IndexSpec] = &[IndexSpec::new("database", 1)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        AreaData {
            path: self.path.clone(),
        }
        .into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = AreaData::try_from(data)?;
        Ok(Self {
            object,
            path: data.path,
        })
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.areas
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.areas
    }
}
