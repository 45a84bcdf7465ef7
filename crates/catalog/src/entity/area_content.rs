use {
    crate::{entity::Objects, object::Object, persist::Persist, store::IndexSpec},
    def::{tuple_struct, Category, ObjectId, Scope, Tuple},
    std::collections::BTreeMap,
};

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct ContentData {
        target: (ObjectId, Uint),
        target_category: (Category, Uint),
    }
}

/// Records that an object's files live in an area. The parent is the area.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaContent {
    object: Object,
    target: ObjectId,
    target_category: Category,
}

impl AreaContent {
    pub fn new(database: ObjectId, area: ObjectId, target: ObjectId, category: Category) -> Self {
        Self {
            object: Object::new(Category::AreaContent, database, area, "", Scope::Permanent),
            target,
            target_category: category,
        }
    }

    pub fn area(&self) -> ObjectId {
        self.object.parent()
    }

    pub fn target(&self) -> ObjectId {
        self.target
    }

    pub fn target_category(&self) -> Category {
        self.target_category
    }
}

impl Persist for AreaContent {
    const CATEGORY: Category = Category::AreaContent;
    const INDEXES: &'static [IndexSpec] =
        &[IndexSpec::new("area", 1), IndexSpec::new("target", 4)];

    fn object(&self) -> &Object {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    fn data(&self) -> Tuple {
        ContentData {
            target: self.target,
            target_category: self.target_category,
        }
        .into()
    }

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self> {
        let data = ContentData::try_from(data)?;
        Ok(Self {
            object,
            target: data.target,
            target_category: data.target_category,
        })
    }

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self> {
        &objects.contents
    }

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self> {
        &mut objects.contents
    }

    fn after_load(&self, objects: &Objects) -> Result<(), String> {
        if !objects.areas.contains_key(&self.area()) {
            return Err(format!("area {} does not exist", self.area()));
        }
        if objects.find(self.target).is_none() {
            return Err(format!("{} {} does not exist", self.target_category, self.target));
        }
        Ok(())
    }
}
