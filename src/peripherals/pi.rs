//! Peripheral interface (PI)
//!
//! Memory-mapped at 0x04600000. The PI moves blocks between the cartridge
//! address space (ROM and SRAM/FlashRAM) and RDRAM. Transfers complete
//! instantly from the CPU's point of view and raise the PI interrupt on
//! completion.
//!
//! Register map (offsets from 0x04600000):
//! ```text
//! 0x00 PI_DRAM_ADDR   RDRAM side of the transfer (24-bit)
//! 0x04 PI_CART_ADDR   cartridge side of the transfer
//! 0x08 PI_RD_LEN      write starts RDRAM -> cartridge (len+1 bytes)
//! 0x0C PI_WR_LEN      write starts cartridge -> RDRAM (len+1 bytes)
//! 0x10 PI_STATUS      read: busy/intr; write: reset DMA / ack intr
//! 0x14.. BSD_DOM*     bus timing configuration, latched and read back
//! ```
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/Peripheral_Interface)

use log::{info, warn};

use super::mi::{InterruptKind, MipsInterface};
use crate::memory::addr;
use crate::memory::Rdram;
use crate::rom::Cartridge;
use crate::save::SaveData;

/// Register offsets within the PI block
mod regs {
    pub const DRAM_ADDR: u32 = 0x00;
    pub const CART_ADDR: u32 = 0x04;
    pub const RD_LEN: u32 = 0x08;
    pub const WR_LEN: u32 = 0x0C;
    pub const STATUS: u32 = 0x10;
    pub const BSD_DOM_BASE: u32 = 0x14;
    pub const BSD_DOM_END: u32 = 0x34;
}

/// PI_STATUS write bit acknowledging the PI interrupt
const STATUS_CLEAR_INTR: u32 = 1 << 1;

pub struct PeripheralInterface {
    pub dram_addr: u32,
    pub cart_addr: u32,
    /// Bus timing registers, latched for readback only
    bsd: [u32; 8],
}

impl PeripheralInterface {
    pub fn new() -> Self {
        Self {
            dram_addr: 0,
            cart_addr: 0,
            bsd: [0; 8],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read32(&self, mi: &MipsInterface, offset: u32) -> u32 {
        match offset {
            regs::DRAM_ADDR => self.dram_addr,
            regs::CART_ADDR => self.cart_addr,
            regs::RD_LEN | regs::WR_LEN => {
                warn!("Read from write-only PI register offset 0x{:02X}", offset);
                0
            }
            regs::STATUS => {
                // DMA completes instantly, so busy bits never read set
                let mut value = 0;
                if mi.intr.contains(super::mi::InterruptFlag::PI) {
                    value |= 1 << 3;
                }
                value
            }
            o if (regs::BSD_DOM_BASE..regs::BSD_DOM_END).contains(&o) => {
                self.bsd[((o - regs::BSD_DOM_BASE) / 4) as usize]
            }
            _ => {
                warn!("Read from unknown PI register offset 0x{:02X}", offset);
                0
            }
        }
    }

    pub fn write32(
        &mut self,
        mi: &mut MipsInterface,
        rdram: &mut Rdram,
        cart: Option<&Cartridge>,
        save: &mut SaveData,
        offset: u32,
        value: u32,
    ) {
        match offset {
            regs::DRAM_ADDR => {
                self.dram_addr = value & 0xFF_FFFF;
            }
            regs::CART_ADDR => {
                self.cart_addr = value;
            }
            regs::RD_LEN => {
                let len = (value & 0xFF_FFFF) + 1;
                self.dma_from_dram(rdram, save, len);
                mi.raise(InterruptKind::Pi);
            }
            regs::WR_LEN => {
                let len = (value & 0xFF_FFFF) + 1;
                dma_cart_to_dram(rdram, cart, save, self.cart_addr, self.dram_addr, len);
                mi.raise(InterruptKind::Pi);
            }
            regs::STATUS => {
                if value & STATUS_CLEAR_INTR != 0 {
                    mi.lower(InterruptKind::Pi);
                }
            }
            o if (regs::BSD_DOM_BASE..regs::BSD_DOM_END).contains(&o) => {
                self.bsd[((o - regs::BSD_DOM_BASE) / 4) as usize] = value & 0xFF;
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown PI register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }

    /// RDRAM -> cartridge. Only the SRAM/FlashRAM window is writable.
    fn dma_from_dram(&self, rdram: &Rdram, save: &mut SaveData, len: u32) {
        if (addr::SRAM_START..addr::SRAM_END).contains(&self.cart_addr) {
            let base = self.cart_addr - addr::SRAM_START;
            for i in 0..len {
                save.write8(base + i, rdram.read8(self.dram_addr + i));
            }
            info!(
                "PI DMA: {} bytes RDRAM 0x{:06X} -> SRAM 0x{:05X}",
                len, self.dram_addr, base
            );
        } else {
            warn!(
                "PI DMA to non-writable cartridge address 0x{:08X} dropped",
                self.cart_addr
            );
        }
    }
}

/// Cartridge -> RDRAM block transfer, shared by the register path and the
/// headless boot (which performs the bootcode's cartridge copy itself).
pub fn dma_cart_to_dram(
    rdram: &mut Rdram,
    cart: Option<&Cartridge>,
    save: &SaveData,
    cart_addr: u32,
    dram_addr: u32,
    len: u32,
) {
    if (addr::ROM_START..addr::ROM_END).contains(&cart_addr) {
        let cart = match cart {
            Some(cart) => cart,
            None => {
                warn!("PI DMA from ROM with no cartridge loaded");
                return;
            }
        };
        let src = cart.slice(cart_addr - addr::ROM_START, len as usize);
        rdram.write_block(dram_addr, src);
        // Short ROMs: the tail past the image reads as open bus
        for i in src.len() as u32..len {
            rdram.write8(dram_addr + i, 0xFF);
        }
        info!(
            "PI DMA: {} bytes ROM 0x{:07X} -> RDRAM 0x{:06X}",
            len,
            cart_addr - addr::ROM_START,
            dram_addr
        );
    } else if (addr::SRAM_START..addr::SRAM_END).contains(&cart_addr) {
        let base = cart_addr - addr::SRAM_START;
        for i in 0..len {
            rdram.write8(dram_addr + i, save.read8(base + i));
        }
        info!(
            "PI DMA: {} bytes SRAM 0x{:05X} -> RDRAM 0x{:06X}",
            len, base, dram_addr
        );
    } else {
        warn!(
            "PI DMA from unmapped cartridge address 0x{:08X} dropped",
            cart_addr
        );
    }
}

impl Default for PeripheralInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::SaveType;

    fn test_cart() -> Cartridge {
        let mut rom = vec![0u8; 0x2000];
        crate::memory::write32(&mut rom, 0x00, 0x8037_1240);
        for i in 0..0x100 {
            rom[0x1000 + i] = i as u8;
        }
        Cartridge::load(&rom).unwrap()
    }

    #[test]
    fn test_rom_to_rdram_dma() {
        let mut pi = PeripheralInterface::new();
        let mut mi = MipsInterface::new();
        let mut rdram = Rdram::new();
        let mut save = SaveData::new();
        let cart = test_cart();

        pi.write32(&mut mi, &mut rdram, Some(&cart), &mut save, regs::DRAM_ADDR, 0x2000);
        pi.write32(&mut mi, &mut rdram, Some(&cart), &mut save, regs::CART_ADDR, 0x1000_1000);
        pi.write32(&mut mi, &mut rdram, Some(&cart), &mut save, regs::WR_LEN, 0xFF);

        for i in 0..0x100u32 {
            assert_eq!(rdram.read8(0x2000 + i), i as u8);
        }
        assert!(mi.intr.contains(super::super::mi::InterruptFlag::PI));
    }

    #[test]
    fn test_sram_round_trip_via_dma() {
        let mut pi = PeripheralInterface::new();
        let mut mi = MipsInterface::new();
        let mut rdram = Rdram::new();
        let mut save = SaveData::new();
        save.init(SaveType::Sram256k, None);

        rdram.write_block(0x1000, &[0xDE, 0xAD, 0xBE, 0xEF]);

        // RDRAM -> SRAM
        pi.write32(&mut mi, &mut rdram, None, &mut save, regs::DRAM_ADDR, 0x1000);
        pi.write32(&mut mi, &mut rdram, None, &mut save, regs::CART_ADDR, 0x0800_0000);
        pi.write32(&mut mi, &mut rdram, None, &mut save, regs::RD_LEN, 3);
        assert_eq!(save.read8(0), 0xDE);
        assert_eq!(save.read8(3), 0xEF);

        // SRAM -> RDRAM somewhere else
        pi.write32(&mut mi, &mut rdram, None, &mut save, regs::DRAM_ADDR, 0x4000);
        pi.write32(&mut mi, &mut rdram, None, &mut save, regs::WR_LEN, 3);
        assert_eq!(rdram.read32(0x4000), 0xDEAD_BEEF);
    }

    #[test]
    fn test_status_write_acks_interrupt() {
        let mut pi = PeripheralInterface::new();
        let mut mi = MipsInterface::new();
        let mut rdram = Rdram::new();
        let mut save = SaveData::new();
        mi.raise(InterruptKind::Pi);

        pi.write32(&mut mi, &mut rdram, None, &mut save, regs::STATUS, STATUS_CLEAR_INTR);
        assert!(!mi.intr.contains(super::super::mi::InterruptFlag::PI));
    }

    #[test]
    fn test_bsd_registers_latch() {
        let mut pi = PeripheralInterface::new();
        let mut mi = MipsInterface::new();
        let mut rdram = Rdram::new();
        let mut save = SaveData::new();

        pi.write32(&mut mi, &mut rdram, None, &mut save, 0x14, 0x40);
        assert_eq!(pi.read32(&mi, 0x14), 0x40);
    }
}
