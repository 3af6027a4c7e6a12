//! Block storage device interface.
//!
//! Offsets are raw byte offsets into the flash chip. Implementers may
//! assume every offset and length handed down by this crate is already
//! aligned: writes to [`WORD_SIZE`], erases to whole sectors.
use core::fmt;
use marker_blanket::marker_blanket;

/// Minimum erase granularity.
pub const SECTOR_SIZE: usize = kb!(4);
/// Minimum programmable unit.
pub const WORD_SIZE: usize = 4;

static_assertions::const_assert!(SECTOR_SIZE % WORD_SIZE == 0);

/// Common error reporting for all storage operations.
pub trait Device {
    type Error: Clone + Copy + fmt::Debug;
}

/// Reads a range of bytes at an arbitrary offset
pub trait Read: Device {
    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> nb::Result<(), Self::Error>;
}

/// Programs a word aligned range of bytes. The target range must have
/// been erased beforehand: this is a raw program operation, not a
/// read-modify-write.
pub trait Write: Device {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> nb::Result<(), Self::Error>;
}

/// Erases a single sector, identified by its index (`offset / SECTOR_SIZE`).
pub trait EraseSector: Device {
    fn erase_sector(&mut self, sector: u32) -> nb::Result<(), Self::Error>;
}

/// A supported storage device must be able to read, program and erase.
#[marker_blanket]
pub trait BlockStorage: Read + Write + EraseSector {}
