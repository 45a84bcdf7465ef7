mod backup;
mod driver;
mod error;
mod index;
mod manager;
mod page_file;
mod physical;
mod record;
pub mod slotted_page;

use std::fmt;
pub use {
    driver::{remove_if_empty, DirectoryDriver, FileDriver},
    error::{Error, Result},
    index::IndexFile,
    manager::StorageManager,
    page_file::{PageFile, UnfixMode},
    physical::PhysicalFile,
    record::RecordFile,
};

pub type PageNum = u32;
pub const PAGE_SIZE: usize = 1 << 12;

/// Position of a record inside a record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locator {
    pub page: PageNum,
    pub slot: u16,
}

impl Locator {
    pub fn new(page: PageNum, slot: u16) -> Self {
        Self { page, slot }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page, self.slot)
    }
}

/// One page-sized, 8-byte aligned buffer.
#[derive(Clone)]
pub struct Page(Box<[u64; PAGE_SIZE / 8]>);

impl Page {
    pub fn new() -> Self {
        Self(Box::new([0; PAGE_SIZE / 8]))
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.0[..])
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.0[..])
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").finish_non_exhaustive()
    }
}
