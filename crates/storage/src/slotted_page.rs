use {
    bytemuck::{cast_slice, cast_slice_mut, from_bytes, from_bytes_mut},
    snafu::{prelude::*, Backtrace},
    std::{mem::size_of, ops::Range},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("slot {index} out of range"))]
    IndexOutOfRange { index: usize, backtrace: Backtrace },

    #[snafu(display("slot {index} is vacant"))]
    SlotVacant { index: usize, backtrace: Backtrace },

    #[snafu(display("space is not enough for {len} bytes"))]
    SpaceNotEnough { len: usize, backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// | state:2 | offset:15 | length:15 |
#[derive(Debug, Copy, Clone)]
#[repr(transparent)]
pub struct Slot(u32);
unsafe impl bytemuck::Zeroable for Slot {}
unsafe impl bytemuck::Pod for Slot {}

impl Slot {
    fn new(offset: usize, len: usize, state: SlotState) -> Self {
        Self(((state as u32) << 30) | (offset as u32 & 0x7FFF) << 15 | (len as u32 & 0x7FFF))
    }

    pub fn offset(&self) -> usize {
        ((self.0 >> 15) & 0x7FFF) as usize
    }

    pub fn len(&self) -> usize {
        (self.0 & 0x7FFF) as usize
    }

    pub fn range(&self) -> Range<usize> {
        let offset = self.offset();
        offset..offset + self.len()
    }

    fn is_used(&self) -> bool {
        (self.0 >> 30) & 0x03 == SlotState::Normal as u32
    }
}

#[repr(u8)]
enum SlotState {
    Unused = 0,
    Normal = 1,
}

#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct Header {
    slot_count: u16,
    live_count: u16,
    used_bytes: u16,
    cell_area_start: u16,
}
unsafe impl bytemuck::Zeroable for Header {}
unsafe impl bytemuck::Pod for Header {}

/// A page of variable-length cells addressed by slot number.
///
/// Slot numbers stay stable for the lifetime of a cell: deleting marks the
/// slot unused, and compaction moves cells without renumbering them.
#[derive(Debug)]
pub struct SlottedPage<'a> {
    header: &'a mut Header,
    body: &'a mut [u8],
}

impl<'a> SlottedPage<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let (header, body) = bytes.split_at_mut(size_of::<Header>());
        Self {
            header: from_bytes_mut(header),
            body,
        }
    }

    pub fn init(&mut self) {
        *self.header = Header {
            slot_count: 0,
            live_count: 0,
            used_bytes: 0,
            cell_area_start: self.body.len() as u16,
        };
    }

    /// Largest cell a fresh page can hold.
    pub fn capacity(page_size: usize) -> usize {
        page_size - size_of::<Header>() - size_of::<Slot>()
    }

    pub fn slot_count(&self) -> usize {
        self.header.slot_count as usize
    }

    pub fn live_count(&self) -> usize {
        self.header.live_count as usize
    }

    fn slots_size(&self) -> usize {
        self.slot_count() * size_of::<Slot>()
    }

    fn slots(&self) -> &[Slot] {
        cast_slice(&self.body[..self.slots_size()])
    }

    fn slots_mut(&mut self) -> &mut [Slot] {
        let size = self.slots_size();
        cast_slice_mut(&mut self.body[..size])
    }

    /// Bytes available once the page is compacted.
    pub fn free_space(&self) -> usize {
        self.body.len() - self.slots_size() - self.header.used_bytes as usize
    }

    fn contiguous_space(&self) -> usize {
        self.header.cell_area_start as usize - self.slots_size()
    }

    fn vacant_slot(&self) -> Option<usize> {
        self.slots().iter().position(|s| !s.is_used())
    }

    /// Whether `len` bytes could be inserted, compacting if needed.
    pub fn fits(&self, len: usize) -> bool {
        let slot_cost = match self.vacant_slot() {
            Some(_) => 0,
            None => size_of::<Slot>(),
        };
        self.free_space() >= len + slot_cost
    }

    pub fn insert(&mut self, data: &[u8]) -> Result<usize> {
        let len = data.len();
        ensure!(self.fits(len), SpaceNotEnoughSnafu { len });

        let index = match self.vacant_slot() {
            Some(index) => index,
            None => {
                if self.contiguous_space() < size_of::<Slot>() {
                    self.compact();
                }
                self.header.slot_count += 1;
                let index = self.slot_count() - 1;
                self.slots_mut()[index] = Slot::new(0, 0, SlotState::Unused);
                index
            }
        };

        let offset = self.allocate(len);
        self.body[offset..offset + len].copy_from_slice(data);
        self.slots_mut()[index] = Slot::new(offset, len, SlotState::Normal);
        self.header.live_count += 1;
        self.header.used_bytes += len as u16;

        Ok(index)
    }

    pub fn get(&self, index: usize) -> Result<&[u8]> {
        let slot = self.slot(index)?;
        Ok(&self.body[slot.range()])
    }

    /// Replaces the cell in place when it shrinks, otherwise reallocates it.
    pub fn update(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let slot = self.slot(index)?;
        let (old_len, len) = (slot.len(), data.len());

        if len <= old_len {
            let offset = slot.offset();
            self.body[offset..offset + len].copy_from_slice(data);
            self.slots_mut()[index] = Slot::new(offset, len, SlotState::Normal);
            self.header.used_bytes -= (old_len - len) as u16;
            return Ok(());
        }

        ensure!(
            self.free_space() + old_len >= len,
            SpaceNotEnoughSnafu { len }
        );

        // Release the old cell first so compaction can reclaim it.
        self.slots_mut()[index] = Slot::new(0, 0, SlotState::Normal);
        self.header.used_bytes -= old_len as u16;

        let offset = self.allocate(len);
        self.body[offset..offset + len].copy_from_slice(data);
        self.slots_mut()[index] = Slot::new(offset, len, SlotState::Normal);
        self.header.used_bytes += len as u16;

        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<()> {
        let len = self.slot(index)?.len();

        self.slots_mut()[index] = Slot::new(0, 0, SlotState::Unused);
        self.header.live_count -= 1;
        self.header.used_bytes -= len as u16;

        while self.slot_count() > 0 && !self.slots()[self.slot_count() - 1].is_used() {
            self.header.slot_count -= 1;
        }
        if self.header.live_count == 0 {
            self.init();
        }

        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u8])> + '_ {
        self.slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_used())
            .map(|(i, slot)| (i, &self.body[slot.range()]))
    }

    /// Checks that every live cell lies inside the cell area and that the
    /// header counters agree with the slots.
    pub fn check(&self) -> std::result::Result<(), String> {
        let area = self.header.cell_area_start as usize..self.body.len();
        let mut live = 0;
        let mut used = 0;

        for (i, slot) in self.slots().iter().enumerate().filter(|(_, s)| s.is_used()) {
            let range = slot.range();
            if slot.len() > 0 && (range.start < area.start || range.end > area.end) {
                return Err(format!("slot {i} points outside the cell area"));
            }
            live += 1;
            used += slot.len();
        }

        if live != self.live_count() || used != self.header.used_bytes as usize {
            return Err("header counters disagree with slots".to_string());
        }
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<Slot> {
        let slot = *self
            .slots()
            .get(index)
            .context(IndexOutOfRangeSnafu { index })?;
        ensure!(slot.is_used(), SlotVacantSnafu { index });
        Ok(slot)
    }

    /// Takes `len` bytes from the cell area, compacting first if the gap is too small.
    fn allocate(&mut self, len: usize) -> usize {
        if self.contiguous_space() < len {
            self.compact();
        }

        let offset = self.header.cell_area_start as usize - len;
        self.header.cell_area_start = offset as u16;
        offset
    }

    fn compact(&mut self) {
        let cells = self
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_used())
            .map(|(i, slot)| (i, self.body[slot.range()].to_vec()))
            .collect::<Vec<_>>();

        let mut end = self.body.len();
        for (i, cell) in cells {
            let offset = end - cell.len();
            self.body[offset..end].copy_from_slice(&cell);
            self.slots_mut()[i] = Slot::new(offset, cell.len(), SlotState::Normal);
            end = offset;
        }
        self.header.cell_area_start = end as u16;
    }
}

/// Read-only view used by scans.
pub struct SlottedPageRef<'a> {
    header: &'a Header,
    body: &'a [u8],
}

impl<'a> SlottedPageRef<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let (header, body) = bytes.split_at(size_of::<Header>());
        Self {
            header: from_bytes(header),
            body,
        }
    }

    pub fn live_count(&self) -> usize {
        self.header.live_count as usize
    }

    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        let slots: &[Slot] =
            cast_slice(&self.body[..self.header.slot_count as usize * size_of::<Slot>()]);
        let slot = slots.get(index).context(IndexOutOfRangeSnafu { index })?;
        ensure!(slot.is_used(), SlotVacantSnafu { index });
        Ok(&self.body[slot.range()])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a [u8])> + 'a {
        let body = self.body;
        let slots: &'a [Slot] =
            cast_slice(&body[..self.header.slot_count as usize * size_of::<Slot>()]);
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_used())
            .map(move |(i, slot)| (i, &body[slot.range()]))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::Page};

    #[test]
    fn slots_are_stable_across_deletes() -> Result<()> {
        let mut page = Page::new();
        let mut sp = SlottedPage::new(page.bytes_mut());
        sp.init();

        let a = sp.insert(b"alpha")?;
        let b = sp.insert(b"beta")?;
        let c = sp.insert(b"gamma")?;
        assert_eq!((a, b, c), (0, 1, 2));

        sp.delete(b)?;
        assert_eq!(sp.get(a)?, b"alpha");
        assert_eq!(sp.get(c)?, b"gamma");
        assert!(matches!(sp.get(b), Err(Error::SlotVacant { .. })));

        // the vacant slot is reused
        assert_eq!(sp.insert(b"delta")?, 1);
        assert_eq!(sp.live_count(), 3);
        Ok(())
    }

    #[test]
    fn update_grows_and_shrinks() -> Result<()> {
        let mut page = Page::new();
        let mut sp = SlottedPage::new(page.bytes_mut());
        sp.init();

        let i = sp.insert(b"short")?;
        sp.update(i, b"a considerably longer cell")?;
        assert_eq!(sp.get(i)?, b"a considerably longer cell");

        sp.update(i, b"tiny")?;
        assert_eq!(sp.get(i)?, b"tiny");
        assert!(sp.check().is_ok());
        Ok(())
    }

    #[test]
    fn compaction_reclaims_holes() -> Result<()> {
        let mut page = Page::new();
        let mut sp = SlottedPage::new(page.bytes_mut());
        sp.init();

        let cell = [7u8; 500];
        let mut slots = vec![];
        while sp.fits(cell.len()) {
            slots.push(sp.insert(&cell)?);
        }
        assert!(matches!(
            sp.insert(&cell),
            Err(Error::SpaceNotEnough { .. })
        ));

        // punch holes, then insert a cell only the compacted page can hold
        sp.delete(slots[0])?;
        sp.delete(slots[2])?;
        let big = [9u8; 900];
        let i = sp.insert(&big)?;

        assert_eq!(sp.get(i)?, &big[..]);
        assert_eq!(sp.get(slots[1])?, &cell[..]);
        assert!(sp.check().is_ok());
        Ok(())
    }

    #[test]
    fn read_only_view() -> Result<()> {
        let mut page = Page::new();
        {
            let mut sp = SlottedPage::new(page.bytes_mut());
            sp.init();
            sp.insert(b"one")?;
            let two = sp.insert(b"two")?;
            sp.insert(b"three")?;
            sp.delete(two)?;
        }

        let view = SlottedPageRef::new(page.bytes());
        let cells = view.iter().map(|(i, c)| (i, c.to_vec())).collect::<Vec<_>>();
        assert_eq!(cells, vec![(0, b"one".to_vec()), (2, b"three".to_vec())]);
        assert_eq!(view.live_count(), 2);
        Ok(())
    }
}
