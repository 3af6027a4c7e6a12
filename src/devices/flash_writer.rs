//! Streaming writer for a single flash slot.
//!
//! The writer owns a cursor into the target region. Callers hand it
//! whatever bytes they have buffered; it programs the largest word
//! aligned prefix and hands back how many trailing bytes are still
//! pending, already moved to the front of the caller's buffer.
use crate::{
    error::Error,
    hal::{
        exclusive::Exclusive,
        flash::{BlockStorage, SECTOR_SIZE, WORD_SIZE},
    },
    log::trace,
    utilities::memory::{align_down, is_aligned, sectors_spanned},
};
use nb::block;

pub struct FlashWriter<'a, F: BlockStorage, X: Exclusive> {
    flash: &'a mut F,
    exclusive: &'a mut X,
    cursor: u32,
    end: u32,
}

/// Erases every sector touched by `[address, address + size)`.
/// Each sector is erased under its own exclusive section.
pub fn erase_region<F: BlockStorage, X: Exclusive>(
    flash: &mut F,
    exclusive: &mut X,
    address: u32,
    size: usize,
) -> Result<(), Error> {
    if !is_aligned(address as usize, SECTOR_SIZE) {
        return Err(Error::MisalignedAccess);
    }
    for sector in sectors_spanned(address as usize, size, SECTOR_SIZE) {
        trace!("Erasing sector {}", sector);
        exclusive
            .exclusive(|| block!(flash.erase_sector(sector as u32)))
            .map_err(|_| Error::EraseError)?;
    }
    Ok(())
}

impl<'a, F: BlockStorage, X: Exclusive> FlashWriter<'a, F, X> {
    /// Writer for `size` bytes starting at `address`. The region must
    /// have been erased beforehand.
    pub fn new(
        flash: &'a mut F,
        exclusive: &'a mut X,
        address: u32,
        size: usize,
    ) -> Result<Self, Error> {
        if !is_aligned(address as usize, WORD_SIZE) || !is_aligned(size, WORD_SIZE) {
            return Err(Error::MisalignedAccess);
        }
        let end = address.checked_add(size as u32).ok_or(Error::MisalignedAccess)?;
        Ok(Self { flash, exclusive, cursor: address, end })
    }

    /// Offset the next programmed word will land at.
    pub fn cursor(&self) -> u32 { self.cursor }

    pub fn remaining(&self) -> usize { (self.end - self.cursor) as usize }

    /// Programs the word aligned prefix of `data` at the cursor.
    ///
    /// Returns how many bytes were left over. Those bytes are moved to
    /// the front of `data`, so appending the next chunk after them keeps
    /// the stream contiguous. When `data` holds less than a word, nothing
    /// touches the device and the whole input is reported as leftover.
    pub fn write(&mut self, data: &mut [u8]) -> Result<usize, Error> {
        let aligned = align_down(data.len(), WORD_SIZE);
        if aligned == 0 {
            return Ok(data.len());
        }
        if aligned > self.remaining() {
            return Err(Error::FlashWriteError);
        }

        let (flash, cursor) = (&mut *self.flash, self.cursor);
        let chunk = &data[..aligned];
        self.exclusive
            .exclusive(|| block!(flash.write(cursor, chunk)))
            .map_err(|_| Error::FlashWriteError)?;
        self.cursor += aligned as u32;

        let leftover = data.len() - aligned;
        data.copy_within(aligned.., 0);
        Ok(leftover)
    }
}
