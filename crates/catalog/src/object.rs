use {
    crate::{
        environment::{DirtyMarks, Mark},
        error::{Result, TupleSnafu},
    },
    def::{transaction::tick, tuple_struct, Category, ObjectId, Scope, Timestamp, Tuple},
    parking_lot::RwLock,
    snafu::prelude::*,
    std::fmt,
    storage::Locator,
};

/// Lifecycle state every catalog object carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not yet created, or shadowed by a duplicate name.
    Unknown,
    Created,
    /// Created by attaching an existing physical database.
    Mounted,
    Changed,
    Deleted,
    DeletedInRecovery,
    Persistent,
    ReallyDeleted,
    CreateCanceled,
    DeleteCanceled,
}

impl Status {
    /// States whose object needs a store write on the next persist pass.
    pub fn is_dirty(&self) -> bool {
        !matches!(self, Self::Persistent | Self::ReallyDeleted | Self::Unknown)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(
            self,
            Self::Deleted | Self::DeletedInRecovery | Self::ReallyDeleted | Self::CreateCanceled
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

tuple_struct! {
    #[derive(Debug, Clone, PartialEq)]
    struct Header {
        id: (ObjectId, Uint),
        parent: (ObjectId, Uint),
        name: (String, String),
        scope: (Scope, Uint),
    }
}

/// Attributes shared by every catalog entity, plus its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    id: ObjectId,
    parent: ObjectId,
    database: ObjectId,
    name: String,
    category: Category,
    scope: Scope,
    status: Status,
    timestamp: Timestamp,
    locator: Option<Locator>,
}

impl Object {
    pub fn new(
        category: Category,
        database: ObjectId,
        parent: ObjectId,
        name: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            id: ObjectId::INVALID,
            parent,
            database,
            name: name.into(),
            category,
            scope,
            status: Status::Unknown,
            timestamp: tick(),
            locator: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn parent(&self) -> ObjectId {
        self.parent
    }

    pub fn database(&self) -> ObjectId {
        self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn locator(&self) -> Option<Locator> {
        self.locator
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn set_locator(&mut self, locator: Option<Locator>) {
        self.locator = locator;
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    fn mark(&self, marks: &DirtyMarks, mark: Mark) {
        marks.set(self.database, self.category, mark);
    }

    fn unmark(&self, marks: &DirtyMarks) {
        marks.unset(self.database, self.category);
    }

    #[track_caller]
    fn violation(&self, operation: &str) -> ! {
        tracing::error!(
            id = %self.id,
            category = %self.category,
            status = %self.status,
            operation,
            "illegal lifecycle transition"
        );
        panic!(
            "illegal lifecycle transition: {operation} on {} {} in state {}",
            self.category, self.id, self.status
        );
    }

    /// Takes an identifier and enters `Created`, whatever the prior state.
    pub fn create(&mut self, id: ObjectId, marks: &DirtyMarks) {
        self.id = id;
        self.status = Status::Created;
        self.timestamp = tick();
        self.mark(marks, Mark::Dirty);
    }

    /// Like `create`, for objects that already exist on disk and are being attached.
    pub fn mount(&mut self, id: ObjectId, marks: &DirtyMarks) {
        self.id = id;
        self.status = Status::Mounted;
        self.timestamp = tick();
        self.mark(marks, Mark::Dirty);
    }

    /// Flags a persisted object as changed and invalidates readers holding the old timestamp.
    pub fn touch(&mut self, marks: &DirtyMarks) {
        match self.status {
            Status::Persistent => {
                self.status = Status::Changed;
                self.timestamp = tick();
                self.mark(marks, Mark::Dirty);
            }
            Status::Created
            | Status::Mounted
            | Status::Changed
            | Status::Deleted
            | Status::DeletedInRecovery
            | Status::ReallyDeleted
            | Status::CreateCanceled
            | Status::DeleteCanceled => {}
            Status::Unknown => self.violation("touch"),
        }
    }

    pub fn untouch(&mut self, marks: &DirtyMarks) {
        match self.status {
            Status::Mounted | Status::Changed => {
                self.status = Status::Persistent;
                self.unmark(marks);
            }
            Status::Created
            | Status::Deleted
            | Status::DeletedInRecovery
            | Status::Persistent
            | Status::ReallyDeleted
            | Status::CreateCanceled
            | Status::DeleteCanceled => {}
            Status::Unknown => self.violation("untouch"),
        }
    }

    /// Drops the object. A never persisted object is canceled in place: it
    /// becomes `CreateCanceled` when `no_unset` keeps it around for a later
    /// `undo_drop`, or `Persistent` with its dirty mark cleared otherwise.
    pub fn drop(&mut self, recovery: bool, no_unset: bool, marks: &DirtyMarks) {
        match self.status {
            Status::Created | Status::Mounted | Status::DeleteCanceled => {
                if no_unset {
                    self.status = Status::CreateCanceled;
                } else {
                    self.status = Status::Persistent;
                    self.unmark(marks);
                }
            }
            Status::Persistent | Status::Changed => {
                self.status = if recovery {
                    Status::DeletedInRecovery
                } else {
                    Status::Deleted
                };
                self.mark(marks, Mark::DirtyDeleted);
            }
            Status::Unknown
            | Status::Deleted
            | Status::DeletedInRecovery
            | Status::ReallyDeleted
            | Status::CreateCanceled => {}
        }
    }

    pub fn undo_drop(&mut self, marks: &DirtyMarks) {
        match self.status {
            Status::Deleted | Status::DeletedInRecovery => {
                self.status = Status::Persistent;
                self.unmark(marks);
            }
            Status::ReallyDeleted => {
                self.status = Status::DeleteCanceled;
                self.mark(marks, Mark::Dirty);
            }
            Status::CreateCanceled => {
                self.status = Status::Created;
                self.mark(marks, Mark::Dirty);
            }
            Status::Persistent
            | Status::Created
            | Status::Changed
            | Status::Mounted
            | Status::DeleteCanceled => {}
            Status::Unknown => self.violation("undo_drop"),
        }
    }

    pub(crate) fn pack(&self) -> Tuple {
        Header {
            id: self.id,
            parent: self.parent,
            name: self.name.clone(),
            scope: self.scope,
        }
        .into()
    }

    /// Splits a stored tuple into the header object and the entity-specific fields.
    pub(crate) fn unpack(
        category: Category,
        database: ObjectId,
        mut tuple: Tuple,
    ) -> Result<(Self, Tuple)> {
        let header_len = Header::FIELDS.len().min(tuple.len());
        let data = tuple.split_off(header_len);
        let header = Header::try_from(tuple).context(TupleSnafu)?;

        let object = Self {
            id: header.id,
            parent: header.parent,
            database,
            name: header.name,
            category,
            scope: header.scope,
            status: Status::Persistent,
            timestamp: tick(),
            locator: None,
        };
        Ok((object, data))
    }
}

/// Value of a lazily resolved reference.
#[derive(Debug, Clone)]
pub enum Resolved<T> {
    Unresolved,
    Resolved(T),
}

/// A cross reference resolved on first use and cached until cleared.
#[derive(Debug)]
pub struct Reference<T>(RwLock<Resolved<T>>);

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self(RwLock::new(Resolved::Unresolved))
    }
}

impl<T: Clone> Reference<T> {
    pub fn get(&self) -> Option<T> {
        match &*self.0.read() {
            Resolved::Resolved(v) => Some(v.clone()),
            Resolved::Unresolved => None,
        }
    }

    /// Returns the cached value, running `resolve` at most once among concurrent callers.
    pub fn get_or_resolve<E>(
        &self,
        resolve: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        if let Some(v) = self.get() {
            return Ok(v);
        }

        let mut slot = self.0.write();
        if let Resolved::Resolved(v) = &*slot {
            return Ok(v.clone());
        }
        let v = resolve()?;
        *slot = Resolved::Resolved(v.clone());
        Ok(v)
    }

    pub fn clear(&self) {
        *self.0.write() = Resolved::Unresolved;
    }
}

impl<T: Clone> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self(RwLock::new(self.0.read().clone()))
    }
}
