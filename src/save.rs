//! Cartridge save data (SRAM / EEPROM / FlashRAM / Controller Pak)
//!
//! Buffers are autosized from the game database match and persisted next to
//! the ROM (`<rom>.save`, `<rom>.mempack`). Writes are debounced: a dirty
//! buffer is flushed once no new write has arrived for a short run of
//! frames, and `force_persist` flushes immediately on reset and shutdown.

use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::rom::SaveType;

/// Frames of quiet before a dirty buffer is flushed to disk
const WRITE_DELAY_FRAMES: u32 = 60;

/// Controller Pak size
const MEMPACK_SIZE: usize = 0x8000;

/// Save-data state for the loaded title
pub struct SaveData {
    save_type: SaveType,
    save_path: Option<PathBuf>,
    mempack_path: Option<PathBuf>,

    /// Cartridge save buffer (SRAM/EEPROM/FlashRAM), sized by save_type.
    /// Empty until the title is known.
    save: Vec<u8>,
    /// Controller Pak buffer, allocated on first use
    mempack: Vec<u8>,

    save_dirty: bool,
    mempack_dirty: bool,
    /// Frames remaining before a flush; reset on every write
    countdown: u32,
}

impl SaveData {
    pub fn new() -> Self {
        Self {
            save_type: SaveType::None,
            save_path: None,
            mempack_path: None,
            save: Vec::new(),
            mempack: Vec::new(),
            save_dirty: false,
            mempack_dirty: false,
            countdown: 0,
        }
    }

    /// Size the buffers for a newly loaded title and pull in any existing
    /// save files.
    pub fn init(&mut self, save_type: SaveType, rom_path: Option<&str>) {
        self.save_type = save_type;
        self.save = vec![0x00; save_type.size()];
        self.mempack = Vec::new();
        self.save_dirty = false;
        self.mempack_dirty = false;
        self.countdown = 0;

        self.save_path = rom_path.map(|p| PathBuf::from(format!("{}.save", p)));
        self.mempack_path = rom_path.map(|p| PathBuf::from(format!("{}.mempack", p)));

        if let Some(path) = &self.save_path {
            if let Ok(data) = fs::read(path) {
                let len = data.len().min(self.save.len());
                self.save[..len].copy_from_slice(&data[..len]);
                info!("Restored {} bytes of save data from {}", len, path.display());
            }
        }
        if let Some(path) = &self.mempack_path {
            if let Ok(data) = fs::read(path) {
                self.mempack = vec![0x00; MEMPACK_SIZE];
                let len = data.len().min(MEMPACK_SIZE);
                self.mempack[..len].copy_from_slice(&data[..len]);
                info!("Restored Controller Pak from {}", path.display());
            }
        }
    }

    /// Drop the buffers. Called on system reset, after a final flush.
    pub fn release(&mut self) {
        self.save = Vec::new();
        self.mempack = Vec::new();
        self.save_dirty = false;
        self.mempack_dirty = false;
        self.countdown = 0;
    }

    pub fn save_type(&self) -> SaveType {
        self.save_type
    }

    // ========== Cartridge save access (SRAM/FlashRAM window, EEPROM commands) ==========

    /// Read a byte of the cartridge save. Out-of-range or absent save reads
    /// as 0xFF, matching unprogrammed save hardware.
    pub fn read8(&self, offset: u32) -> u8 {
        match self.save.get(offset as usize) {
            Some(&b) => b,
            None => 0xFF,
        }
    }

    pub fn write8(&mut self, offset: u32, value: u8) {
        let offset = offset as usize;
        if offset < self.save.len() {
            self.save[offset] = value;
            self.mark_save_dirty();
        }
    }

    pub fn read32(&self, offset: u32) -> u32 {
        u32::from_be_bytes([
            self.read8(offset),
            self.read8(offset.wrapping_add(1)),
            self.read8(offset.wrapping_add(2)),
            self.read8(offset.wrapping_add(3)),
        ])
    }

    pub fn write32(&mut self, offset: u32, value: u32) {
        for (i, b) in value.to_be_bytes().iter().enumerate() {
            self.write8(offset.wrapping_add(i as u32), *b);
        }
    }

    /// EEPROM 8-byte block read (PIF command 0x04)
    pub fn eeprom_read_block(&self, block: u8, out: &mut [u8; 8]) {
        let base = block as usize * 8;
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.read8((base + i) as u32);
        }
    }

    /// EEPROM 8-byte block write (PIF command 0x05)
    pub fn eeprom_write_block(&mut self, block: u8, data: &[u8; 8]) {
        let base = block as u32 * 8;
        for (i, b) in data.iter().enumerate() {
            self.write8(base + i as u32, *b);
        }
    }

    // ========== Controller Pak access ==========

    pub fn mempack_read8(&self, offset: u32) -> u8 {
        match self.mempack.get(offset as usize % MEMPACK_SIZE) {
            Some(&b) => b,
            None => 0x00,
        }
    }

    pub fn mempack_write8(&mut self, offset: u32, value: u8) {
        if self.mempack.is_empty() {
            self.mempack = vec![0x00; MEMPACK_SIZE];
        }
        let offset = offset as usize % MEMPACK_SIZE;
        self.mempack[offset] = value;
        self.mempack_dirty = true;
        self.countdown = WRITE_DELAY_FRAMES;
    }

    fn mark_save_dirty(&mut self) {
        self.save_dirty = true;
        self.countdown = WRITE_DELAY_FRAMES;
    }

    // ========== Persistence ==========

    /// Frame-tail flush: counts down from the last write, then writes any
    /// dirty buffer to disk.
    pub fn persist_backup(&mut self) {
        if !self.save_dirty && !self.mempack_dirty {
            return;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return;
        }
        self.flush();
    }

    /// Immediate flush, used on reset and shutdown.
    pub fn force_persist(&mut self) {
        if self.save_dirty || self.mempack_dirty {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.save_dirty {
            if let Some(path) = &self.save_path {
                match fs::write(path, &self.save) {
                    Ok(()) => info!("Persisted save data to {}", path.display()),
                    Err(e) => warn!("Failed to persist save data: {}", e),
                }
            }
            self.save_dirty = false;
        }
        if self.mempack_dirty {
            if let Some(path) = &self.mempack_path {
                match fs::write(path, &self.mempack) {
                    Ok(()) => info!("Persisted Controller Pak to {}", path.display()),
                    Err(e) => warn!("Failed to persist Controller Pak: {}", e),
                }
            }
            self.mempack_dirty = false;
        }
    }
}

impl Default for SaveData {
    fn default() -> Self {
        Self::new()
    }
}
