use {
    crate::{
        config::CatalogConfig,
        error::{DuplicateNameSnafu, Result},
        fault::FaultInjector,
        sequence::TemporarySequences,
    },
    def::{
        lock::{LockManager, ProcessLockManager},
        log::{LogicalLog, NullLog},
        transaction::SessionId,
        Category, ObjectId,
    },
    parking_lot::Mutex,
    snafu::prelude::*,
    std::{
        collections::{hash_map::Entry, HashMap, HashSet},
        sync::Arc,
    },
    storage::{DirectoryDriver, FileDriver, StorageManager},
};

/// Per (database, category) record of whether the catalog has unpersisted changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mark {
    Clean,
    Dirty,
    DirtyDeleted,
}

#[derive(Debug, Default)]
pub struct DirtyMarks(Mutex<HashMap<(ObjectId, Category), Mark>>);

impl DirtyMarks {
    /// Raises the mark. A `DirtyDeleted` mark is never lowered to `Dirty`.
    pub fn set(&self, database: ObjectId, category: Category, mark: Mark) {
        let mut marks = self.0.lock();
        let current = marks.entry((database, category)).or_insert(Mark::Clean);
        *current = (*current).max(mark);
    }

    pub fn unset(&self, database: ObjectId, category: Category) {
        self.0.lock().remove(&(database, category));
    }

    pub fn get(&self, database: ObjectId, category: Category) -> Mark {
        self.0
            .lock()
            .get(&(database, category))
            .copied()
            .unwrap_or(Mark::Clean)
    }

    pub fn is_dirty(&self, database: ObjectId) -> bool {
        self.0.lock().keys().any(|(db, _)| *db == database)
    }

    pub fn clear(&self, database: ObjectId) {
        self.0.lock().retain(|(db, _), _| *db != database);
    }
}

/// Databases that a failed compensation has taken offline.
#[derive(Debug, Default)]
pub struct Availability(Mutex<HashSet<ObjectId>>);

impl Availability {
    pub fn set(&self, database: ObjectId, available: bool) {
        let mut unavailable = self.0.lock();
        if available {
            unavailable.remove(&database);
        } else if unavailable.insert(database) {
            tracing::error!(%database, "database marked unavailable");
        }
    }

    pub fn is_available(&self, database: ObjectId) -> bool {
        !self.0.lock().contains(&database)
    }
}

/// Names claimed by sessions that have created but not yet committed an object.
#[derive(Debug, Default)]
pub struct NameReservations(Mutex<HashMap<(ObjectId, Category, String), SessionId>>);

impl NameReservations {
    pub fn reserve(
        &self,
        database: ObjectId,
        category: Category,
        name: &str,
        session: SessionId,
    ) -> Result<()> {
        match self.0.lock().entry((database, category, name.to_string())) {
            Entry::Occupied(holder) => {
                ensure!(*holder.get() == session, DuplicateNameSnafu { category, name });
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        Ok(())
    }

    pub fn release(&self, database: ObjectId, category: Category, name: &str) {
        self.0.lock().remove(&(database, category, name.to_string()));
    }

    pub fn release_database(&self, database: ObjectId, session: SessionId) {
        self.0
            .lock()
            .retain(|(db, _, _), holder| !(*db == database && *holder == session));
    }

    pub fn release_session(&self, session: SessionId) {
        self.0.lock().retain(|_, holder| *holder != session);
    }
}

/// Everything the catalog engine shares between databases and threads.
pub struct Environment {
    config: CatalogConfig,
    manager: Arc<StorageManager>,
    locks: Arc<dyn LockManager>,
    log: Arc<dyn LogicalLog>,
    driver: Arc<dyn FileDriver>,
    marks: DirtyMarks,
    availability: Availability,
    names: NameReservations,
    temporary: TemporarySequences,
    faults: FaultInjector,
}

pub struct EnvironmentBuilder {
    config: CatalogConfig,
    locks: Option<Arc<dyn LockManager>>,
    log: Option<Arc<dyn LogicalLog>>,
    driver: Option<Arc<dyn FileDriver>>,
}

impl EnvironmentBuilder {
    pub fn lock_manager(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn log(mut self, log: Arc<dyn LogicalLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn driver(mut self, driver: Arc<dyn FileDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<Arc<Environment>> {
        self.config.validate()?;

        Ok(Arc::new(Environment {
            manager: Arc::new(StorageManager::new(self.config.open_files)),
            locks: self
                .locks
                .unwrap_or_else(|| Arc::new(ProcessLockManager::new())),
            log: self.log.unwrap_or_else(|| Arc::new(NullLog)),
            driver: self.driver.unwrap_or_else(|| Arc::new(DirectoryDriver)),
            config: self.config,
            marks: DirtyMarks::default(),
            availability: Availability::default(),
            names: NameReservations::default(),
            temporary: TemporarySequences::default(),
            faults: FaultInjector::default(),
        }))
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn builder(config: CatalogConfig) -> EnvironmentBuilder {
        EnvironmentBuilder {
            config,
            locks: None,
            log: None,
            driver: None,
        }
    }

    pub fn new(config: CatalogConfig) -> Result<Arc<Self>> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<StorageManager> {
        &self.manager
    }

    pub fn locks(&self) -> &Arc<dyn LockManager> {
        &self.locks
    }

    pub fn log(&self) -> &dyn LogicalLog {
        self.log.as_ref()
    }

    pub fn driver(&self) -> &dyn FileDriver {
        self.driver.as_ref()
    }

    pub fn marks(&self) -> &DirtyMarks {
        &self.marks
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn names(&self) -> &NameReservations {
        &self.names
    }

    pub fn temporary(&self) -> &TemporarySequences {
        &self.temporary
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Releases what a finished session still holds in the shared registries.
    pub fn end_session(&self, session: SessionId) {
        self.temporary.release_session(session);
        self.names.release_session(session);
        tracing::debug!(session, "session resources released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_only_rise_until_unset() {
        let marks = DirtyMarks::default();
        let db = ObjectId(1);

        marks.set(db, Category::Table, Mark::DirtyDeleted);
        marks.set(db, Category::Table, Mark::Dirty);
        assert_eq!(marks.get(db, Category::Table), Mark::DirtyDeleted);
        assert!(marks.is_dirty(db));

        marks.unset(db, Category::Table);
        assert_eq!(marks.get(db, Category::Table), Mark::Clean);
        assert!(!marks.is_dirty(db));
    }

    #[test]
    fn reservations_conflict_across_sessions() {
        let names = NameReservations::default();
        let db = ObjectId(1);

        assert!(names.reserve(db, Category::Table, "t", 1).is_ok());
        assert!(names.reserve(db, Category::Table, "t", 1).is_ok());
        assert!(matches!(
            names.reserve(db, Category::Table, "t", 2),
            Err(crate::Error::DuplicateName { .. })
        ));

        names.release_session(1);
        assert!(names.reserve(db, Category::Table, "t", 2).is_ok());
    }

    #[test]
    fn availability_toggles() {
        let availability = Availability::default();
        availability.set(ObjectId(3), false);
        assert!(!availability.is_available(ObjectId(3)));
        availability.set(ObjectId(3), true);
        assert!(availability.is_available(ObjectId(3)));
    }
}
