//! Persisted boot configuration.
//!
//! A single record at the start of a reserved sector tells the boot
//! stage which slot to run. Its byte layout is shared with that stage
//! and must not change:
//!
//! | offset | field         |
//! |--------|---------------|
//! | 0      | magic         |
//! | 1      | version       |
//! | 2      | mode          |
//! | 3      | current rom   |
//! | 4      | gpio rom      |
//! | 5      | count         |
//! | 6..8   | padding       |
//! | 8..24  | rom addresses (4 x u32, little endian) |
//! | 24     | checksum (`boot-config-checksum` only, then padded to 28) |
use crate::{
    config::BOOT_CONFIG_SECTOR,
    error::Error,
    hal::{
        exclusive::Exclusive,
        flash::{self, BlockStorage, SECTOR_SIZE, WORD_SIZE},
    },
    log::{debug, info},
    utilities::memory::is_aligned,
};
use nb::block;
use static_assertions::const_assert;

pub const MAGIC: u8 = 0xE1;
pub const VERSION: u8 = 0x01;
pub const MAX_ROMS: usize = 4;
pub const CHECKSUM_SEED: u8 = 0xEF;

const ROMS_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = ROMS_OFFSET + MAX_ROMS * 4;

#[cfg(feature = "boot-config-checksum")]
pub const RECORD_SIZE: usize = CHECKSUM_OFFSET + 4;
#[cfg(not(feature = "boot-config-checksum"))]
pub const RECORD_SIZE: usize = CHECKSUM_OFFSET;

const_assert!(RECORD_SIZE % WORD_SIZE == 0);
const_assert!(RECORD_SIZE <= SECTOR_SIZE);

const CONFIG_OFFSET: u32 = BOOT_CONFIG_SECTOR * SECTOR_SIZE as u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootMode {
    Standard,
    /// Boot `gpio_rom` while a strap pin is held.
    GpioRom,
    /// Modes this engine doesn't know about are carried through untouched.
    Other(u8),
}

impl From<u8> for BootMode {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => BootMode::Standard,
            0x01 => BootMode::GpioRom,
            other => BootMode::Other(other),
        }
    }
}

impl From<BootMode> for u8 {
    fn from(mode: BootMode) -> Self {
        match mode {
            BootMode::Standard => 0x00,
            BootMode::GpioRom => 0x01,
            BootMode::Other(other) => other,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    pub magic: u8,
    pub version: u8,
    pub mode: BootMode,
    pub current_rom: u8,
    pub gpio_rom: u8,
    pub count: u8,
    /// Flash offset of each slot; only the first `count` are meaningful.
    pub roms: [u32; MAX_ROMS],
    /// Stored checksum, present only when the record carries one.
    /// Always recomputed on serialization.
    pub checksum: Option<u8>,
}

/// XOR of `bytes`, seeded the way the boot stage expects.
pub fn checksum(bytes: &[u8]) -> u8 { bytes.iter().fold(CHECKSUM_SEED, |sum, b| sum ^ b) }

impl BootConfig {
    /// Standard mode record booting `current_rom` out of `roms`.
    pub fn new(roms: &[u32], current_rom: u8) -> Self {
        let mut slots = [0u32; MAX_ROMS];
        slots.iter_mut().zip(roms).for_each(|(o, i)| *o = *i);
        Self {
            magic: MAGIC,
            version: VERSION,
            mode: BootMode::Standard,
            current_rom,
            gpio_rom: 0,
            count: roms.len().min(MAX_ROMS) as u8,
            roms: slots,
            checksum: None,
        }
    }

    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut roms = [0u32; MAX_ROMS];
        bytes[ROMS_OFFSET..CHECKSUM_OFFSET]
            .chunks_exact(4)
            .zip(roms.iter_mut())
            .for_each(|(raw, rom)| *rom = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
        Self {
            magic: bytes[0],
            version: bytes[1],
            mode: BootMode::from(bytes[2]),
            current_rom: bytes[3],
            gpio_rom: bytes[4],
            count: bytes[5],
            roms,
            checksum: bytes.get(CHECKSUM_OFFSET).copied(),
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0] = self.magic;
        bytes[1] = self.version;
        bytes[2] = self.mode.into();
        bytes[3] = self.current_rom;
        bytes[4] = self.gpio_rom;
        bytes[5] = self.count;
        bytes[ROMS_OFFSET..CHECKSUM_OFFSET]
            .chunks_exact_mut(4)
            .zip(self.roms.iter())
            .for_each(|(raw, rom)| raw.copy_from_slice(&rom.to_le_bytes()));
        #[cfg(feature = "boot-config-checksum")]
        {
            bytes[CHECKSUM_OFFSET] = checksum(&bytes[..CHECKSUM_OFFSET]);
        }
        bytes
    }

    /// Addresses of the configured slots.
    pub fn slots(&self) -> &[u32] { &self.roms[..(self.count as usize).min(MAX_ROMS)] }

    pub fn rom(&self, slot: u8) -> Option<u32> { self.slots().get(slot as usize).copied() }

    /// Address of `slot`, provided it is configured and sector aligned.
    pub fn slot_address(&self, slot: u8) -> Result<u32, Error> {
        self.rom(slot)
            .filter(|rom| is_aligned(*rom as usize, SECTOR_SIZE))
            .ok_or(Error::BadSlotAddress)
    }

    /// Slot to write an update into: the other half of the A/B pair.
    pub fn upgrade_slot(&self) -> u8 {
        if self.current_rom == 0 {
            1
        } else {
            0
        }
    }

    /// Checks the record header. Slot addresses are checked individually
    /// by [`slot_address`](Self::slot_address) when a slot is used.
    pub fn validate(&self) -> Result<(), Error> {
        let well_formed = self.magic == MAGIC
            && self.version == VERSION
            && self.count as usize <= MAX_ROMS
            && self.current_rom < self.count;
        let checksum_matches = !cfg!(feature = "boot-config-checksum")
            || self.checksum == Some(checksum(&self.to_bytes()[..CHECKSUM_OFFSET]));
        if well_formed && checksum_matches {
            Ok(())
        } else {
            Err(Error::BadBootConfig)
        }
    }

    pub fn log_summary(&self) {
        debug!("bootconf.magic: {:#x}", self.magic);
        debug!("bootconf.version: {}", self.version);
        debug!("bootconf.mode: {}", u8::from(self.mode));
        debug!("bootconf.current_rom: {}", self.current_rom);
        debug!("bootconf.gpio_rom: {}", self.gpio_rom);
        debug!("bootconf.count: {}", self.count);
        for (index, rom) in self.slots().iter().enumerate() {
            debug!("bootconf.roms[{}]: {:#x}", index, *rom);
        }
    }

    /// Raw copy of the persisted record. Callers validate.
    pub fn read<F: flash::Read>(flash: &mut F) -> Result<Self, Error> {
        let mut bytes = [0u8; RECORD_SIZE];
        block!(flash.read(CONFIG_OFFSET, &mut bytes)).map_err(|_| Error::ConfigReadError)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Rewrites the record in place. The rest of the sector is read back
    /// first and programmed again, so data sharing the sector survives.
    pub fn write<F: BlockStorage, X: Exclusive>(
        &self,
        flash: &mut F,
        exclusive: &mut X,
    ) -> Result<(), Error> {
        let mut sector = [0u8; SECTOR_SIZE];
        block!(flash.read(CONFIG_OFFSET, &mut sector)).map_err(|_| Error::ConfigWriteError)?;
        sector[..RECORD_SIZE].copy_from_slice(&self.to_bytes());
        exclusive
            .exclusive(|| block!(flash.erase_sector(BOOT_CONFIG_SECTOR)))
            .map_err(|_| Error::ConfigWriteError)?;
        exclusive
            .exclusive(|| block!(flash.write(CONFIG_OFFSET, &sector)))
            .map_err(|_| Error::ConfigWriteError)
    }
}

/// Slot the boot stage will run next.
pub fn current_rom<F: flash::Read>(flash: &mut F) -> Result<u8, Error> {
    Ok(BootConfig::read(flash)?.current_rom)
}

/// Points the boot stage at `slot`.
pub fn set_current_rom<F: BlockStorage, X: Exclusive>(
    flash: &mut F,
    exclusive: &mut X,
    slot: u8,
) -> Result<(), Error> {
    let mut config = BootConfig::read(flash)?;
    if slot >= config.count {
        return Err(Error::InvalidSlot);
    }
    config.current_rom = slot;
    config.write(flash, exclusive)?;
    info!("Boot configuration now selects rom {}", slot);
    Ok(())
}
