mod area;
mod area_content;
mod column;
mod constraint;
mod file;
mod index;
mod table;

use {
    crate::{environment::DirtyMarks, object::Object, persist::Persist},
    common::pub_fields_struct,
    def::{ObjectId, Scope},
    std::collections::BTreeMap,
};
pub use {
    area::Area,
    area_content::AreaContent,
    column::Column,
    constraint::{Constraint, ConstraintKind},
    file::{File, FileKind},
    index::Index,
    table::Table,
};

pub_fields_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct ColumnDef {
        name: String,
        type_name: String,
        nullable: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TableDef {
        name: String,
        area: Option<ObjectId>,
        scope: Scope,
        columns: Vec<ColumnDef>,
    }
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            area: None,
            scope: Scope::Permanent,
            columns,
        }
    }
}

/// The in-memory cache of one database: every loaded or newly created object
/// by category and id. Objects refer to each other only by id.
#[derive(Debug, Default)]
pub struct Objects {
    pub areas: BTreeMap<ObjectId, Area>,
    pub contents: BTreeMap<ObjectId, AreaContent>,
    pub tables: BTreeMap<ObjectId, Table>,
    pub columns: BTreeMap<ObjectId, Column>,
    pub constraints: BTreeMap<ObjectId, Constraint>,
    pub indexes: BTreeMap<ObjectId, Index>,
    pub files: BTreeMap<ObjectId, File>,
}

fn live<T: Persist>(map: &BTreeMap<ObjectId, T>) -> impl Iterator<Item = &T> {
    map.values().filter(|t| !t.object().status().is_deleted())
}

impl Objects {
    /// The header of any cached object.
    pub fn find(&self, id: ObjectId) -> Option<&Object> {
        self.areas
            .get(&id)
            .map(Persist::object)
            .or_else(|| self.contents.get(&id).map(Persist::object))
            .or_else(|| self.tables.get(&id).map(Persist::object))
            .or_else(|| self.columns.get(&id).map(Persist::object))
            .or_else(|| self.constraints.get(&id).map(Persist::object))
            .or_else(|| self.indexes.get(&id).map(Persist::object))
            .or_else(|| self.files.get(&id).map(Persist::object))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
            + self.contents.len()
            + self.tables.len()
            + self.columns.len()
            + self.constraints.len()
            + self.indexes.len()
            + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn area_named(&self, name: &str) -> Option<&Area> {
        live(&self.areas).find(|a| a.object().name() == name)
    }

    pub fn table_named(&self, name: &str) -> Option<&Table> {
        live(&self.tables).find(|t| t.object().name() == name)
    }

    pub fn index_named(&self, name: &str) -> Option<&Index> {
        live(&self.indexes).find(|i| i.object().name() == name)
    }

    /// Live area contents that point into `area`.
    pub fn contents_of(&self, area: ObjectId) -> impl Iterator<Item = &AreaContent> {
        live(&self.contents).filter(move |c| c.object().parent() == area)
    }

    /// Live area content that records where `target` is stored.
    pub fn content_for(&self, target: ObjectId) -> Option<&AreaContent> {
        live(&self.contents).find(|c| c.target() == target)
    }

    /// Columns of `table`, by position.
    pub fn columns_of(&self, table: &Table) -> Vec<&Column> {
        let mut columns = table
            .columns()
            .filter_map(|id| self.columns.get(&id))
            .filter(|c| !c.object().status().is_deleted())
            .collect::<Vec<_>>();
        columns.sort_by_key(|c| c.position());
        columns
    }

    /// Live files stored in `area`, or without an area for `ObjectId::INVALID`.
    pub fn files_in(&self, area: ObjectId) -> Vec<ObjectId> {
        live(&self.files)
            .filter(|f| f.area() == area)
            .map(|f| f.object().id())
            .collect()
    }
}

fn restore<T: Persist>(mut entity: T, objects: &mut Objects, marks: &DirtyMarks) {
    entity.object_mut().undo_drop(marks);
    let (parent, id) = (entity.object().parent(), entity.object().id());
    T::map_mut(objects).insert(id, entity);
    T::attach(objects, parent, id);
}

macro_rules! entities {
    ($($variant:ident($ty:ty),)*) => {
        /// An object of any category, as handed back by a persist pass that evicted it.
        #[derive(Debug)]
        pub enum Entity {
            $($variant($ty),)*
        }

        $(
            impl From<$ty> for Entity {
                fn from(entity: $ty) -> Self {
                    Self::$variant(entity)
                }
            }
        )*

        impl Entity {
            pub fn object(&self) -> &Object {
                match self {
                    $(Self::$variant(entity) => entity.object(),)*
                }
            }

            /// Undoes the drop of an evicted object and puts it back into the
            /// cache; the next persist pass inserts it again.
            pub(crate) fn restore(self, objects: &mut Objects, marks: &DirtyMarks) {
                match self {
                    $(Self::$variant(entity) => restore(entity, objects, marks),)*
                }
            }
        }
    };
}

entities! {
    Area(Area),
    AreaContent(AreaContent),
    Table(Table),
    Column(Column),
    Constraint(Constraint),
    Index(Index),
    File(File),
}
