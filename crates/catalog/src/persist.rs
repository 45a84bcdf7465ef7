use {
    crate::{
        entity::{Entity, Objects},
        environment::Environment,
        error::{MetaDatabaseCorruptedSnafu, Result},
        object::{Object, Status},
        store::{CatalogStore, IndexSpec},
    },
    def::{Category, ObjectId, Tuple},
    snafu::prelude::*,
    std::{
        collections::BTreeMap,
        fmt,
        path::Path,
        sync::Arc,
    },
};

/// What the hooks may look at while a database is persisted or loaded.
pub struct PersistContext<'a> {
    pub env: &'a Arc<Environment>,
    pub database: ObjectId,
    pub root: &'a Path,
    /// The database itself is being dropped; its stores are not written.
    pub deleting: bool,
}

impl PersistContext<'_> {
    pub(crate) fn corrupted(&self, details: impl Into<String>) -> crate::Error {
        self.env.availability().set(self.database, false);
        MetaDatabaseCorruptedSnafu {
            database: self.database,
            details: details.into(),
        }
        .build()
    }
}

/// A catalog entity: a tuple layout over [`Object`] plus the hooks run
/// around its store writes.
pub trait Persist: Sized + fmt::Debug + Into<Entity> {
    const CATEGORY: Category;
    const INDEXES: &'static [IndexSpec];

    fn object(&self) -> &Object;

    fn object_mut(&mut self) -> &mut Object;

    /// Fields stored after the common header.
    fn data(&self) -> Tuple;

    fn from_parts(object: Object, data: Tuple) -> def::tuple::Result<Self>;

    fn map(objects: &Objects) -> &BTreeMap<ObjectId, Self>;

    fn map_mut(objects: &mut Objects) -> &mut BTreeMap<ObjectId, Self>;

    fn tuple(&self) -> Tuple {
        let mut tuple = self.object().pack();
        tuple.extend(self.data());
        tuple
    }

    /// Runs before the store write for `status`.
    fn before_persist(&self, _ctx: &PersistContext<'_>, _status: Status) -> Result<()> {
        Ok(())
    }

    /// Runs once the store write for `status` has landed.
    fn after_persist(&self, _ctx: &PersistContext<'_>, _status: Status) -> Result<()> {
        Ok(())
    }

    /// Checks a freshly loaded object against the rest of the catalog.
    fn after_load(&self, _objects: &Objects) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Registers `id` with its parent's child collection.
    fn attach(_objects: &mut Objects, _parent: ObjectId, _id: ObjectId) {}

    fn detach(_objects: &mut Objects, _parent: ObjectId, _id: ObjectId) {}
}

/// Writes every dirty object of category `T`. Deleted objects leave the cache
/// once their tuple is gone and are handed back in `evicted`.
pub(crate) fn persist_all<T: Persist>(
    ctx: &PersistContext<'_>,
    stores: &mut BTreeMap<Category, CatalogStore>,
    objects: &mut Objects,
    evicted: &mut Vec<Entity>,
) -> Result<()> {
    let dirty = T::map(objects)
        .values()
        .filter(|t| t.object().status().is_dirty())
        .map(|t| t.object().id())
        .collect::<Vec<_>>();

    for id in &dirty {
        persist_one::<T>(ctx, stores, objects, *id, evicted)?;
    }

    if !dirty.is_empty() {
        ctx.env.marks().unset(ctx.database, T::CATEGORY);
        tracing::debug!(category = %T::CATEGORY, count = dirty.len(), "category persisted");
    }
    Ok(())
}

fn persist_one<T: Persist>(
    ctx: &PersistContext<'_>,
    stores: &mut BTreeMap<Category, CatalogStore>,
    objects: &mut Objects,
    id: ObjectId,
    evicted: &mut Vec<Entity>,
) -> Result<()> {
    let Some(entity) = T::map(objects).get(&id) else {
        return Ok(());
    };
    let status = entity.object().status();
    let parent = entity.object().parent();
    entity.before_persist(ctx, status)?;

    if status == Status::CreateCanceled {
        T::map_mut(objects).remove(&id);
        T::detach(objects, parent, id);
        tracing::debug!(category = %T::CATEGORY, %id, "creation canceled");
        return Ok(());
    }

    let Some(entity) = T::map_mut(objects).get_mut(&id) else {
        return Ok(());
    };
    if entity.object().scope().is_stored() && !ctx.deleting {
        let tuple = entity.tuple();
        let store = stores
            .get_mut(&T::CATEGORY)
            .ok_or_else(|| ctx.corrupted(format!("no {} store", T::CATEGORY)))?;
        store.store_object(entity.object_mut(), &tuple)?;
    } else {
        entity.object_mut().set_status(Status::Persistent);
    }
    entity.after_persist(ctx, status)?;

    if matches!(status, Status::Deleted | Status::DeletedInRecovery) {
        if let Some(mut entity) = T::map_mut(objects).remove(&id) {
            let object = entity.object_mut();
            object.set_status(Status::ReallyDeleted);
            object.set_locator(None);
            T::detach(objects, parent, id);
            tracing::debug!(category = %T::CATEGORY, %id, "evicted");
            evicted.push(entity.into());
        }
    }
    Ok(())
}

/// Reads every tuple of `store` into the cache. Returns the largest id seen.
pub(crate) fn load_all<T: Persist>(
    ctx: &PersistContext<'_>,
    store: &CatalogStore,
    objects: &mut Objects,
) -> Result<Option<ObjectId>> {
    let mut max = None;
    for (locator, tuple) in store.scan()? {
        let (mut object, data) = Object::unpack(T::CATEGORY, ctx.database, tuple)
            .map_err(|e| ctx.corrupted(format!("{} at {locator}: {e}", T::CATEGORY)))?;
        object.set_locator(Some(locator));

        let id = object.id();
        let entity = T::from_parts(object, data)
            .map_err(|e| ctx.corrupted(format!("{} {id}: {e}", T::CATEGORY)))?;
        max = max.max(Some(id));
        T::map_mut(objects).insert(id, entity);
    }
    tracing::trace!(category = %T::CATEGORY, count = T::map(objects).len(), "category loaded");
    Ok(max)
}

/// Validates loaded objects of category `T` and registers them with their parents.
pub(crate) fn after_load_all<T: Persist>(
    ctx: &PersistContext<'_>,
    objects: &mut Objects,
) -> Result<()> {
    let mut links = Vec::new();
    for entity in T::map(objects).values() {
        entity.after_load(objects).map_err(|details| {
            ctx.corrupted(format!("{} {}: {details}", T::CATEGORY, entity.object().id()))
        })?;
        links.push((entity.object().parent(), entity.object().id()));
    }
    for (parent, id) in links {
        T::attach(objects, parent, id);
    }
    Ok(())
}
