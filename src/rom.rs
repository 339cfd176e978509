//! N64 cartridge ROM loader (.z64, .v64, .n64)
//!
//! Parses the 64-byte cartridge header and normalizes the image to the
//! native big-endian (.z64) byte order. The three extensions correspond to
//! the three byte layouts found in the wild:
//!
//!   .z64 - big-endian (native), magic 0x80371240
//!   .v64 - 16-bit byteswapped,  magic 0x37804012
//!   .n64 - 32-bit wordswapped,  magic 0x40123780
//!
//! Header layout (offsets into the normalized image):
//!   0x08  u32  initial program counter
//!   0x10  u32  CRC1
//!   0x14  u32  CRC2
//!   0x20  [u8; 20]  title, space-padded ASCII
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/ROM_Header)

use crate::memory::read32;
use crate::N64Error;

/// Magic word of a native big-endian image
const MAGIC_Z64: u32 = 0x8037_1240;
/// Magic word of a 16-bit byteswapped image
const MAGIC_V64: u32 = 0x3780_4012;
/// Magic word of a 32-bit wordswapped image
const MAGIC_N64: u32 = 0x4012_3780;

/// Cartridge header size
const HEADER_SIZE: usize = 0x40;

/// Byte layout of a ROM image as found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomByteOrder {
    /// Native big-endian (.z64)
    BigEndian,
    /// Every 16-bit half swapped (.v64)
    ByteSwapped,
    /// Every 32-bit word swapped (.n64)
    WordSwapped,
}

/// Save hardware present on the cartridge, resolved from the game database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveType {
    None,
    Eeprom4k,
    Eeprom16k,
    Sram256k,
    Flash1m,
    Sram768k,
}

impl SaveType {
    /// Backing buffer size in bytes
    pub fn size(&self) -> usize {
        match self {
            SaveType::None => 0,
            SaveType::Eeprom4k => 512,
            SaveType::Eeprom16k => 2048,
            SaveType::Sram256k => 0x8000,
            SaveType::Flash1m => 0x20000,
            SaveType::Sram768k => 0x18000,
        }
    }
}

/// Parsed cartridge header
#[derive(Debug, Clone)]
pub struct RomHeader {
    /// Entry point the boot code jumps to
    pub program_counter: u32,
    /// CRC pair identifying the title
    pub crc1: u32,
    pub crc2: u32,
    /// Title from the header, trimmed of padding
    pub title: String,
}

/// A game database entry
#[derive(Debug, Clone)]
pub struct GameDbEntry {
    pub crc1: u32,
    pub crc2: u32,
    pub name: &'static str,
    pub save_type: SaveType,
}

/// CRC-keyed table of per-title quirks. Unknown CRCs fall back to 4kbit
/// EEPROM, the most common configuration.
///
/// This table carries the titles the core is routinely tested with; a full
/// database is loaded by the front-end.
const GAME_DB: &[GameDbEntry] = &[
    GameDbEntry {
        crc1: 0x3CE6_0709,
        crc2: 0xF579_8F55,
        name: "Super Mario 64",
        save_type: SaveType::Eeprom4k,
    },
    GameDbEntry {
        crc1: 0xEC70_11B7,
        crc2: 0x7616_D72B,
        name: "The Legend of Zelda: Ocarina of Time",
        save_type: SaveType::Sram256k,
    },
    GameDbEntry {
        crc1: 0x0EC1_58F5,
        crc2: 0xF1AF_4A24,
        name: "The Legend of Zelda: Majora's Mask",
        save_type: SaveType::Flash1m,
    },
    GameDbEntry {
        crc1: 0x0B58_B881,
        crc2: 0x5DD8_1E29,
        name: "Banjo-Kazooie",
        save_type: SaveType::Eeprom16k,
    },
    GameDbEntry {
        crc1: 0xA03C_F036,
        crc2: 0x8965_C2BF,
        name: "Paper Mario",
        save_type: SaveType::Flash1m,
    },
];

/// A loaded cartridge: the normalized ROM image plus its parsed header and
/// database match.
pub struct Cartridge {
    /// ROM image in big-endian byte order
    rom: Vec<u8>,
    /// Parsed header
    pub header: RomHeader,
    /// Save hardware for this title
    pub save_type: SaveType,
    /// Database name, when the CRC matched
    pub db_name: Option<&'static str>,
}

impl Cartridge {
    /// Load a ROM image from raw file bytes, sniffing the byte order from
    /// the magic word and normalizing to big-endian.
    pub fn load(data: &[u8]) -> Result<Self, N64Error> {
        if data.len() < HEADER_SIZE {
            return Err(N64Error::RomInvalid(format!(
                "ROM too short: {} bytes",
                data.len()
            )));
        }

        let order = sniff_byte_order(read32(data, 0))?;
        let rom = normalize(data, order);
        let header = parse_header(&rom);

        let db = GAME_DB
            .iter()
            .find(|entry| entry.crc1 == header.crc1 && entry.crc2 == header.crc2);
        let save_type = db.map(|entry| entry.save_type).unwrap_or(SaveType::Eeprom4k);
        let db_name = db.map(|entry| entry.name);

        match db_name {
            Some(name) => log::info!(
                "Loaded \"{}\" ({}), save type {:?}",
                name,
                header.title,
                save_type
            ),
            None => log::info!(
                "Loaded unknown title \"{}\" (CRC {:08X} {:08X}), assuming {:?}",
                header.title,
                header.crc1,
                header.crc2,
                save_type
            ),
        }

        Ok(Self {
            rom,
            header,
            save_type,
            db_name,
        })
    }

    /// ROM size in bytes
    pub fn len(&self) -> usize {
        self.rom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rom.is_empty()
    }

    /// Read a byte. `offset` is relative to the start of the ROM window;
    /// reads past the end return 0xFF (open bus on a real cart).
    pub fn read8(&self, offset: u32) -> u8 {
        match self.rom.get(offset as usize) {
            Some(&b) => b,
            None => 0xFF,
        }
    }

    pub fn read16(&self, offset: u32) -> u16 {
        let offset = offset as usize;
        if offset + 2 <= self.rom.len() {
            crate::memory::read16(&self.rom, offset)
        } else {
            0xFFFF
        }
    }

    pub fn read32(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        if offset + 4 <= self.rom.len() {
            read32(&self.rom, offset)
        } else {
            0xFFFF_FFFF
        }
    }

    pub fn read64(&self, offset: u32) -> u64 {
        let hi = self.read32(offset) as u64;
        let lo = self.read32(offset.wrapping_add(4)) as u64;
        (hi << 32) | lo
    }

    /// Borrow a region of the image for DMA. Clamped to the ROM size.
    pub fn slice(&self, offset: u32, len: usize) -> &[u8] {
        let start = (offset as usize).min(self.rom.len());
        let end = (start + len).min(self.rom.len());
        &self.rom[start..end]
    }
}

fn sniff_byte_order(magic: u32) -> Result<RomByteOrder, N64Error> {
    match magic {
        MAGIC_Z64 => Ok(RomByteOrder::BigEndian),
        MAGIC_V64 => Ok(RomByteOrder::ByteSwapped),
        MAGIC_N64 => Ok(RomByteOrder::WordSwapped),
        other => Err(N64Error::RomInvalid(format!(
            "unrecognized ROM magic 0x{:08X}",
            other
        ))),
    }
}

/// Rewrite an image into big-endian byte order
fn normalize(data: &[u8], order: RomByteOrder) -> Vec<u8> {
    let mut rom = data.to_vec();
    // Trailing partial words are left alone; real dumps are word-aligned.
    match order {
        RomByteOrder::BigEndian => {}
        RomByteOrder::ByteSwapped => {
            for half in rom.chunks_exact_mut(2) {
                half.swap(0, 1);
            }
        }
        RomByteOrder::WordSwapped => {
            for word in rom.chunks_exact_mut(4) {
                word.reverse();
            }
        }
    }
    rom
}

fn parse_header(rom: &[u8]) -> RomHeader {
    let title_bytes = &rom[0x20..0x34];
    let title = title_bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string();

    RomHeader {
        program_counter: read32(rom, 0x08),
        crc1: read32(rom, 0x10),
        crc2: read32(rom, 0x14),
        title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal big-endian image with the given header fields
    fn build_z64(pc: u32, crc1: u32, crc2: u32, title: &str) -> Vec<u8> {
        let mut rom = vec![0u8; 0x1000];
        crate::memory::write32(&mut rom, 0x00, MAGIC_Z64);
        crate::memory::write32(&mut rom, 0x08, pc);
        crate::memory::write32(&mut rom, 0x10, crc1);
        crate::memory::write32(&mut rom, 0x14, crc2);
        let bytes = title.as_bytes();
        rom[0x20..0x20 + bytes.len()].copy_from_slice(bytes);
        for b in &mut rom[0x20 + bytes.len()..0x34] {
            *b = b' ';
        }
        rom
    }

    #[test]
    fn test_load_z64() {
        let rom = build_z64(0x8000_0400, 0x1111_2222, 0x3333_4444, "TEST CART");
        let cart = Cartridge::load(&rom).unwrap();
        assert_eq!(cart.header.program_counter, 0x8000_0400);
        assert_eq!(cart.header.crc1, 0x1111_2222);
        assert_eq!(cart.header.title, "TEST CART");
        assert_eq!(cart.read32(0x00), MAGIC_Z64);
    }

    #[test]
    fn test_load_v64_byteswapped() {
        let z64 = build_z64(0x8000_0400, 0, 0, "SWAP");
        let mut v64 = z64.clone();
        for half in v64.chunks_exact_mut(2) {
            half.swap(0, 1);
        }
        let cart = Cartridge::load(&v64).unwrap();
        assert_eq!(cart.header.program_counter, 0x8000_0400);
        assert_eq!(cart.read32(0x00), MAGIC_Z64);
        assert_eq!(cart.header.title, "SWAP");
    }

    #[test]
    fn test_load_n64_wordswapped() {
        let z64 = build_z64(0xA400_0040, 0, 0, "WORD");
        let mut n64 = z64.clone();
        for word in n64.chunks_exact_mut(4) {
            word.reverse();
        }
        let cart = Cartridge::load(&n64).unwrap();
        assert_eq!(cart.header.program_counter, 0xA400_0040);
        assert_eq!(cart.read32(0x00), MAGIC_Z64);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut rom = vec![0u8; 0x1000];
        crate::memory::write32(&mut rom, 0x00, 0xDEAD_BEEF);
        assert!(Cartridge::load(&rom).is_err());
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(Cartridge::load(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_game_db_match() {
        let rom = build_z64(0x8000_0400, 0xEC70_11B7, 0x7616_D72B, "ZELDA");
        let cart = Cartridge::load(&rom).unwrap();
        assert_eq!(cart.save_type, SaveType::Sram256k);
        assert!(cart.db_name.is_some());
    }

    #[test]
    fn test_game_db_fallback() {
        let rom = build_z64(0x8000_0400, 0x0BAD_F00D, 0x0BAD_F00D, "NOBODY");
        let cart = Cartridge::load(&rom).unwrap();
        assert_eq!(cart.save_type, SaveType::Eeprom4k);
        assert!(cart.db_name.is_none());
    }

    #[test]
    fn test_out_of_range_reads_open_bus() {
        let rom = build_z64(0, 0, 0, "TINY");
        let cart = Cartridge::load(&rom).unwrap();
        assert_eq!(cart.read8(0x10_0000), 0xFF);
        assert_eq!(cart.read32(0x10_0000), 0xFFFF_FFFF);
    }
}
