use super::error::FakeError;
use crate::{
    hal::flash::{self, SECTOR_SIZE, WORD_SIZE},
    utilities::{bitwise::SliceBitSubset, memory::is_aligned},
};
use std::{cell::Cell, rc::Rc};

/// Erased NOR flash state.
pub const ERASED: u8 = 0xFF;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    pub offset: u32,
    pub length: usize,
}

/// RAM-backed flash that enforces NOR rules: erased cells read 0xFF,
/// programming can only clear bits, and programming must be word aligned.
pub struct FakeFlash {
    data: Vec<u8>,
    pub erased_sectors: Vec<u32>,
    pub writes: Vec<WriteRecord>,
    pub reads: usize,
    pub fail_erase: bool,
    pub fail_write: bool,
    /// Sectors whose erase always fails.
    pub locked_sectors: Vec<u32>,
    pub unguarded_operations: usize,
    exclusion: Option<Rc<Cell<bool>>>,
}

impl FakeFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![ERASED; size],
            erased_sectors: Vec::new(),
            writes: Vec::new(),
            reads: 0,
            fail_erase: false,
            fail_write: false,
            locked_sectors: Vec::new(),
            unguarded_operations: 0,
            exclusion: None,
        }
    }

    /// Counts any program or erase issued while `flag` is not raised.
    pub fn watch(&mut self, flag: Rc<Cell<bool>>) { self.exclusion = Some(flag); }

    /// Places raw bytes, bypassing the NOR rules and the operation log.
    pub fn preload(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn contents(&self, offset: u32, length: usize) -> &[u8] {
        &self.data[offset as usize..offset as usize + length]
    }

    pub fn bytes_written(&self) -> usize { self.writes.iter().map(|w| w.length).sum() }

    /// Number of device operations that mutate the flash.
    pub fn mutations(&self) -> usize { self.writes.len() + self.erased_sectors.len() }

    fn check_guard(&mut self) {
        if let Some(flag) = &self.exclusion {
            if !flag.get() {
                self.unguarded_operations += 1;
            }
        }
    }

    fn range(&self, offset: u32, length: usize) -> Result<core::ops::Range<usize>, FakeError> {
        let start = offset as usize;
        let end = start.checked_add(length).ok_or(FakeError::OutOfBounds)?;
        if end > self.data.len() {
            Err(FakeError::OutOfBounds)
        } else {
            Ok(start..end)
        }
    }
}

impl flash::Device for FakeFlash {
    type Error = FakeError;
}

impl flash::Read for FakeFlash {
    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> nb::Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        self.reads += 1;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }
}

impl flash::Write for FakeFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> nb::Result<(), Self::Error> {
        self.check_guard();
        if self.fail_write {
            return Err(nb::Error::Other(FakeError::Injected));
        }
        if !is_aligned(offset as usize, WORD_SIZE) || !is_aligned(bytes.len(), WORD_SIZE) {
            return Err(nb::Error::Other(FakeError::MisalignedAccess));
        }
        let range = self.range(offset, bytes.len())?;
        if !bytes.is_subset_of(&self.data[range.clone()]) {
            return Err(nb::Error::Other(FakeError::NotErased));
        }
        self.data[range].copy_from_slice(bytes);
        self.writes.push(WriteRecord { offset, length: bytes.len() });
        Ok(())
    }
}

impl flash::EraseSector for FakeFlash {
    fn erase_sector(&mut self, sector: u32) -> nb::Result<(), Self::Error> {
        self.check_guard();
        if self.fail_erase || self.locked_sectors.contains(&sector) {
            return Err(nb::Error::Other(FakeError::Injected));
        }
        let range = self.range(sector * SECTOR_SIZE as u32, SECTOR_SIZE)?;
        self.data[range].iter_mut().for_each(|b| *b = ERASED);
        self.erased_sectors.push(sector);
        Ok(())
    }
}
