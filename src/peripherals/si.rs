//! Serial interface (SI)
//!
//! Memory-mapped at 0x04800000. The SI shuttles the 64-byte PIF RAM block
//! between the PIF and RDRAM. A transfer in either direction runs the PIF
//! command processor (controller polls, EEPROM access) and raises the SI
//! interrupt on completion.
//!
//! Register map (offsets from 0x04800000):
//! ```text
//! 0x00 SI_DRAM_ADDR     RDRAM side of the transfer (24-bit)
//! 0x04 SI_PIF_AD_RD64B  write starts PIF RAM -> RDRAM
//! 0x10 SI_PIF_AD_WR64B  write starts RDRAM -> PIF RAM
//! 0x18 SI_STATUS        read: intr state; write: ack SI interrupt
//! ```
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/Serial_Interface)

use log::{trace, warn};

use super::mi::{InterruptKind, MipsInterface};
use crate::memory::{addr, Pif, Rdram};
use crate::pif::{self, Controller};
use crate::save::SaveData;

/// Register offsets within the SI block
mod regs {
    pub const DRAM_ADDR: u32 = 0x00;
    pub const PIF_AD_RD64B: u32 = 0x04;
    pub const PIF_AD_WR64B: u32 = 0x10;
    pub const STATUS: u32 = 0x18;
}

pub struct SerialInterface {
    pub dram_addr: u32,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self { dram_addr: 0 }
    }

    pub fn reset(&mut self) {
        self.dram_addr = 0;
    }

    pub fn read32(&self, mi: &MipsInterface, offset: u32) -> u32 {
        match offset {
            regs::DRAM_ADDR => self.dram_addr,
            regs::STATUS => {
                let mut value = 0;
                if mi.intr.contains(super::mi::InterruptFlag::SI) {
                    value |= 1 << 12;
                }
                value
            }
            regs::PIF_AD_RD64B | regs::PIF_AD_WR64B => {
                warn!("Read from write-only SI register offset 0x{:02X}", offset);
                0
            }
            _ => {
                warn!("Read from unknown SI register offset 0x{:02X}", offset);
                0
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write32(
        &mut self,
        mi: &mut MipsInterface,
        rdram: &mut Rdram,
        pif: &mut Pif,
        controllers: &[Controller; 4],
        save: &mut SaveData,
        offset: u32,
        value: u32,
    ) {
        match offset {
            regs::DRAM_ADDR => {
                self.dram_addr = value & 0xFF_FFFF;
            }
            regs::PIF_AD_RD64B => {
                // Run the pending commands, then copy the response block out
                pif::process_commands(pif, controllers, save);
                for i in 0..addr::PIF_RAM_SIZE as u32 {
                    rdram.write8(self.dram_addr + i, pif.ram_read8(i));
                }
                trace!("SI DMA: PIF RAM -> RDRAM 0x{:06X}", self.dram_addr);
                mi.raise(InterruptKind::Si);
            }
            regs::PIF_AD_WR64B => {
                for i in 0..addr::PIF_RAM_SIZE as u32 {
                    pif.ram_write8(i, rdram.read8(self.dram_addr + i));
                }
                pif::process_commands(pif, controllers, save);
                trace!("SI DMA: RDRAM 0x{:06X} -> PIF RAM", self.dram_addr);
                mi.raise(InterruptKind::Si);
            }
            regs::STATUS => {
                mi.lower(InterruptKind::Si);
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown SI register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> (SerialInterface, MipsInterface, Rdram, Pif, [Controller; 4], SaveData) {
        let mut controllers = [Controller::default(); 4];
        controllers[0].plugged_in = true;
        (
            SerialInterface::new(),
            MipsInterface::new(),
            Rdram::new(),
            Pif::new(),
            controllers,
            SaveData::new(),
        )
    }

    #[test]
    fn test_rd64b_copies_and_raises() {
        let (mut si, mut mi, mut rdram, mut pif, controllers, mut save) = parts();
        pif.ram_write8(0, 0xFE); // no commands
        pif.ram_write8(1, 0x42);

        si.write32(&mut mi, &mut rdram, &mut pif, &controllers, &mut save, regs::DRAM_ADDR, 0x1000);
        si.write32(&mut mi, &mut rdram, &mut pif, &controllers, &mut save, regs::PIF_AD_RD64B, 0);

        assert_eq!(rdram.read8(0x1000), 0xFE);
        assert_eq!(rdram.read8(0x1001), 0x42);
        assert!(mi.intr.contains(super::super::mi::InterruptFlag::SI));
    }

    #[test]
    fn test_wr64b_copies_in() {
        let (mut si, mut mi, mut rdram, mut pif, controllers, mut save) = parts();
        rdram.write8(0x2000, 0xFE);

        si.write32(&mut mi, &mut rdram, &mut pif, &controllers, &mut save, regs::DRAM_ADDR, 0x2000);
        si.write32(&mut mi, &mut rdram, &mut pif, &controllers, &mut save, regs::PIF_AD_WR64B, 0);

        assert_eq!(pif.ram_read8(0), 0xFE);
        assert!(mi.intr.contains(super::super::mi::InterruptFlag::SI));
    }

    #[test]
    fn test_status_write_acks_interrupt() {
        let (mut si, mut mi, mut rdram, mut pif, controllers, mut save) = parts();
        mi.raise(InterruptKind::Si);
        si.write32(&mut mi, &mut rdram, &mut pif, &controllers, &mut save, regs::STATUS, 0);
        assert!(!mi.intr.contains(super::super::mi::InterruptFlag::SI));
    }
}
