//! System bus for the Nintendo 64
//!
//! Two layers, matching the hardware:
//!
//! 1. **Virtual address resolution.** CPU addresses are partitioned by the
//!    top three bits: KSEG0/KSEG1 are direct-mapped (subtract the segment
//!    base), KUSEG and KSSEG/KSEG3 probe the TLB. A miss synthesizes the
//!    standard refill exception rather than aborting.
//! 2. **Physical routing.** The physical address dispatches to RDRAM, the
//!    RSP scratchpads, the cartridge, the PIF, or one of the register
//!    banks (see the map in `memory.rs`).
//!
//! Reads from write-only registers and writes to read-only registers are
//! logged and recovered (read zero / dropped), never fatal. The bus owns
//! every component except the CPU, so `Cpu::step(&mut Bus)` is the only
//! aliasing contract in the core.
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/Memory_map)

use log::{trace, warn};

use crate::cpu::cp0::Cp0;
use crate::cpu::{Exception, ExceptionKind};
use crate::memory::{addr, Pif, Rdram};
use crate::peripherals::{
    AudioInterface, DpCommandRegs, MipsInterface, PeripheralInterface, SerialInterface,
    VideoInterface,
};
use crate::pif::Controller;
use crate::rom::Cartridge;
use crate::rsp::Rsp;
use crate::save::SaveData;

/// Direction of a bus access, for TLB exception selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    Read,
    Write,
}

/// Virtual segment bases
const KSEG0_BASE: u32 = 0x8000_0000;
const KSEG1_BASE: u32 = 0xA000_0000;

/// Translate a virtual address to a physical address.
///
/// The segment is selected by the top three bits. KSEG0/KSEG1 subtract the
/// base with no permission check; the mapped segments probe the TLB and a
/// miss is returned as the matching refill exception.
pub fn resolve_virtual_address(
    vaddr: u64,
    cp0: &Cp0,
    access: BusAccess,
) -> Result<u32, Exception> {
    let addr32 = vaddr as u32;
    match addr32 >> 29 {
        // KSEG0: unmapped, cached
        0x4 => {
            let physical = addr32 - KSEG0_BASE;
            trace!("KSEG0: translated 0x{:08X} to 0x{:08X}", addr32, physical);
            Ok(physical)
        }
        // KSEG1: unmapped, uncached
        0x5 => {
            let physical = addr32 - KSEG1_BASE;
            trace!("KSEG1: translated 0x{:08X} to 0x{:08X}", addr32, physical);
            Ok(physical)
        }
        // KUSEG, KSSEG, KSEG3: TLB-mapped
        _ => match cp0.tlb_probe(vaddr & 0xFFFF_FFFF) {
            Some(physical) => Ok(physical),
            None => {
                let kind = match access {
                    BusAccess::Read => ExceptionKind::TlbMissLoad,
                    BusAccess::Write => ExceptionKind::TlbMissStore,
                };
                Err(Exception::with_vaddr(kind, vaddr))
            }
        },
    }
}

/// Everything on the far side of the CPU: memories, cartridge, RSP and the
/// register banks.
pub struct Bus {
    pub rdram: Rdram,
    pub cart: Option<Cartridge>,
    pub pif: Pif,
    pub rsp: Rsp,
    pub save: SaveData,
    pub controllers: [Controller; 4],

    pub mi: MipsInterface,
    pub vi: VideoInterface,
    pub ai: AudioInterface,
    pub pi: PeripheralInterface,
    pub si: SerialInterface,
    pub dpc: DpCommandRegs,

    /// RDRAM interface configuration, latched and read back only
    ri_regs: [u32; 8],
}

impl Bus {
    pub fn new() -> Self {
        Self {
            rdram: Rdram::new(),
            cart: None,
            pif: Pif::new(),
            rsp: Rsp::new(),
            save: SaveData::new(),
            controllers: [Controller::default(); 4],
            mi: MipsInterface::new(),
            vi: VideoInterface::new(),
            ai: AudioInterface::new(),
            pi: PeripheralInterface::new(),
            si: SerialInterface::new(),
            dpc: DpCommandRegs::new(),
            ri_regs: [0; 8],
        }
    }

    /// Reset everything on the bus. The cartridge (and PIF ROM) survive.
    pub fn reset(&mut self) {
        self.rdram.reset();
        self.pif.reset();
        self.rsp.reset();
        self.mi.reset();
        self.vi.reset();
        self.ai.reset();
        self.pi.reset();
        self.si.reset();
        self.dpc.reset();
        self.ri_regs = [0; 8];
        self.controllers = [Controller::default(); 4];
        self.controllers[0].plugged_in = true;
    }

    // ========== Virtual entry points ==========

    pub fn read8(&mut self, cp0: &Cp0, vaddr: u64) -> Result<u8, Exception> {
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Read)?;
        Ok(self.read_phys8(paddr))
    }

    pub fn read16(&mut self, cp0: &Cp0, vaddr: u64) -> Result<u16, Exception> {
        if vaddr & 1 != 0 {
            return Err(Exception::with_vaddr(ExceptionKind::AddressErrorLoad, vaddr));
        }
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Read)?;
        Ok(self.read_phys16(paddr))
    }

    pub fn read32(&mut self, cp0: &Cp0, vaddr: u64) -> Result<u32, Exception> {
        if vaddr & 3 != 0 {
            return Err(Exception::with_vaddr(ExceptionKind::AddressErrorLoad, vaddr));
        }
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Read)?;
        Ok(self.read_phys32(paddr))
    }

    pub fn read64(&mut self, cp0: &Cp0, vaddr: u64) -> Result<u64, Exception> {
        if vaddr & 7 != 0 {
            return Err(Exception::with_vaddr(ExceptionKind::AddressErrorLoad, vaddr));
        }
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Read)?;
        Ok(self.read_phys64(paddr))
    }

    pub fn write8(&mut self, cp0: &Cp0, vaddr: u64, value: u8) -> Result<(), Exception> {
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Write)?;
        self.write_phys8(paddr, value);
        Ok(())
    }

    pub fn write16(&mut self, cp0: &Cp0, vaddr: u64, value: u16) -> Result<(), Exception> {
        if vaddr & 1 != 0 {
            return Err(Exception::with_vaddr(ExceptionKind::AddressErrorStore, vaddr));
        }
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Write)?;
        self.write_phys16(paddr, value);
        Ok(())
    }

    pub fn write32(&mut self, cp0: &Cp0, vaddr: u64, value: u32) -> Result<(), Exception> {
        if vaddr & 3 != 0 {
            return Err(Exception::with_vaddr(ExceptionKind::AddressErrorStore, vaddr));
        }
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Write)?;
        self.write_phys32(paddr, value);
        Ok(())
    }

    pub fn write64(&mut self, cp0: &Cp0, vaddr: u64, value: u64) -> Result<(), Exception> {
        if vaddr & 7 != 0 {
            return Err(Exception::with_vaddr(ExceptionKind::AddressErrorStore, vaddr));
        }
        let paddr = resolve_virtual_address(vaddr, cp0, BusAccess::Write)?;
        self.write_phys64(paddr, value);
        Ok(())
    }

    // ========== Physical routing ==========

    pub fn read_phys8(&mut self, paddr: u32) -> u8 {
        match paddr {
            addr::RDRAM_START..=0x007F_FFFF => self.rdram.read8(paddr),
            addr::SP_DMEM_START..=0x0400_0FFF => {
                self.rsp.dmem[(paddr - addr::SP_DMEM_START) as usize]
            }
            addr::SP_IMEM_START..=0x0400_1FFF => {
                self.rsp.imem[(paddr - addr::SP_IMEM_START) as usize]
            }
            addr::SRAM_START..=0x0FFF_FFFF => self.save.read8(paddr - addr::SRAM_START),
            addr::ROM_START..=0x1FBF_FFFF => match &self.cart {
                Some(cart) => cart.read8(paddr - addr::ROM_START),
                None => 0xFF,
            },
            addr::PIF_ROM_START..=0x1FC0_07BF => self.pif.rom_read8(paddr - addr::PIF_ROM_START),
            addr::PIF_RAM_START..=0x1FC0_07FF => self.pif.ram_read8(paddr - addr::PIF_RAM_START),
            // Register banks: extract the byte from the containing word
            _ => {
                let word = self.read_phys32(paddr & !3);
                (word >> (8 * (3 - (paddr & 3)))) as u8
            }
        }
    }

    pub fn read_phys16(&mut self, paddr: u32) -> u16 {
        let hi = self.read_phys8(paddr) as u16;
        let lo = self.read_phys8(paddr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn read_phys32(&mut self, paddr: u32) -> u32 {
        match paddr {
            addr::RDRAM_START..=0x007F_FFFF => self.rdram.read32(paddr),
            addr::SP_DMEM_START..=0x0400_0FFF => {
                crate::memory::read32(&self.rsp.dmem, (paddr - addr::SP_DMEM_START) as usize & !3)
            }
            addr::SP_IMEM_START..=0x0400_1FFF => {
                crate::memory::read32(&self.rsp.imem, (paddr - addr::SP_IMEM_START) as usize & !3)
            }
            addr::SP_REGS_START..=0x0404_001F => self.rsp.read_reg(paddr - addr::SP_REGS_START),
            addr::SP_PC_REG..=0x0408_0003 => self.rsp.pc as u32,
            addr::DPC_REGS_START..=0x0410_001F => self.dpc.read32(paddr - addr::DPC_REGS_START),
            addr::MI_REGS_START..=0x0430_000F => self.mi.read32(paddr - addr::MI_REGS_START),
            addr::VI_REGS_START..=0x0440_0037 => self.vi.read32(paddr - addr::VI_REGS_START),
            addr::AI_REGS_START..=0x0450_0017 => {
                self.ai.read32(&self.mi, paddr - addr::AI_REGS_START)
            }
            addr::PI_REGS_START..=0x0460_0033 => {
                self.pi.read32(&self.mi, paddr - addr::PI_REGS_START)
            }
            addr::RI_REGS_START..=0x0470_001F => {
                self.ri_regs[((paddr - addr::RI_REGS_START) / 4) as usize]
            }
            addr::SI_REGS_START..=0x0480_001B => {
                self.si.read32(&self.mi, paddr - addr::SI_REGS_START)
            }
            addr::SRAM_START..=0x0FFF_FFFF => self.save.read32(paddr - addr::SRAM_START),
            addr::ROM_START..=0x1FBF_FFFF => match &self.cart {
                Some(cart) => cart.read32(paddr - addr::ROM_START),
                None => 0xFFFF_FFFF,
            },
            addr::PIF_ROM_START..=0x1FC0_07BF => self.pif.rom_read32(paddr - addr::PIF_ROM_START),
            addr::PIF_RAM_START..=0x1FC0_07FF => self.pif.ram_read32(paddr - addr::PIF_RAM_START),
            _ => {
                warn!("Unmapped physical read from 0x{:08X}", paddr);
                0
            }
        }
    }

    pub fn read_phys64(&mut self, paddr: u32) -> u64 {
        let hi = self.read_phys32(paddr) as u64;
        let lo = self.read_phys32(paddr.wrapping_add(4)) as u64;
        (hi << 32) | lo
    }

    pub fn write_phys8(&mut self, paddr: u32, value: u8) {
        match paddr {
            addr::RDRAM_START..=0x007F_FFFF => self.rdram.write8(paddr, value),
            addr::SP_DMEM_START..=0x0400_0FFF => {
                self.rsp.dmem[(paddr - addr::SP_DMEM_START) as usize] = value;
            }
            addr::SP_IMEM_START..=0x0400_1FFF => {
                self.rsp.write_imem8(paddr - addr::SP_IMEM_START, value);
            }
            addr::SRAM_START..=0x0FFF_FFFF => self.save.write8(paddr - addr::SRAM_START, value),
            addr::ROM_START..=0x1FBF_FFFF => {
                warn!("Byte write 0x{:02X} to read-only ROM at 0x{:08X}", value, paddr);
            }
            addr::PIF_RAM_START..=0x1FC0_07FF => {
                self.pif.ram_write8(paddr - addr::PIF_RAM_START, value);
            }
            _ => {
                warn!(
                    "Unsupported byte write 0x{:02X} to register space at 0x{:08X}",
                    value, paddr
                );
            }
        }
    }

    pub fn write_phys16(&mut self, paddr: u32, value: u16) {
        self.write_phys8(paddr, (value >> 8) as u8);
        self.write_phys8(paddr.wrapping_add(1), value as u8);
    }

    pub fn write_phys32(&mut self, paddr: u32, value: u32) {
        match paddr {
            addr::RDRAM_START..=0x007F_FFFF => self.rdram.write32(paddr, value),
            addr::SP_DMEM_START..=0x0400_0FFF => {
                crate::memory::write32(
                    &mut self.rsp.dmem,
                    (paddr - addr::SP_DMEM_START) as usize & !3,
                    value,
                );
            }
            addr::SP_IMEM_START..=0x0400_1FFF => {
                self.rsp.write_imem32(paddr - addr::SP_IMEM_START, value);
            }
            addr::SP_REGS_START..=0x0404_001F => {
                let Bus { rsp, mi, rdram, .. } = self;
                rsp.write_reg(mi, rdram, paddr - addr::SP_REGS_START, value);
            }
            addr::SP_PC_REG..=0x0408_0003 => {
                self.rsp.set_pc(value);
            }
            addr::DPC_REGS_START..=0x0410_001F => {
                self.dpc.write32(paddr - addr::DPC_REGS_START, value);
            }
            addr::MI_REGS_START..=0x0430_000F => {
                self.mi.write32(paddr - addr::MI_REGS_START, value);
            }
            addr::VI_REGS_START..=0x0440_0037 => {
                let Bus { vi, mi, .. } = self;
                vi.write32(mi, paddr - addr::VI_REGS_START, value);
            }
            addr::AI_REGS_START..=0x0450_0017 => {
                let Bus { ai, mi, .. } = self;
                ai.write32(mi, paddr - addr::AI_REGS_START, value);
            }
            addr::PI_REGS_START..=0x0460_0033 => {
                let Bus {
                    pi,
                    mi,
                    rdram,
                    cart,
                    save,
                    ..
                } = self;
                pi.write32(mi, rdram, cart.as_ref(), save, paddr - addr::PI_REGS_START, value);
            }
            addr::RI_REGS_START..=0x0470_001F => {
                self.ri_regs[((paddr - addr::RI_REGS_START) / 4) as usize] = value;
            }
            addr::SI_REGS_START..=0x0480_001B => {
                let Bus {
                    si,
                    mi,
                    rdram,
                    pif,
                    controllers,
                    save,
                    ..
                } = self;
                si.write32(mi, rdram, pif, controllers, save, paddr - addr::SI_REGS_START, value);
            }
            addr::SRAM_START..=0x0FFF_FFFF => {
                self.save.write32(paddr - addr::SRAM_START, value);
            }
            addr::ROM_START..=0x1FBF_FFFF => {
                warn!("Word write 0x{:08X} to read-only ROM at 0x{:08X}", value, paddr);
            }
            addr::PIF_ROM_START..=0x1FC0_07BF => {
                warn!(
                    "Word write 0x{:08X} to read-only PIF ROM at 0x{:08X}",
                    value, paddr
                );
            }
            addr::PIF_RAM_START..=0x1FC0_07FF => {
                self.pif.ram_write32(paddr - addr::PIF_RAM_START, value);
            }
            _ => {
                warn!("Unmapped physical write 0x{:08X} to 0x{:08X}", value, paddr);
            }
        }
    }

    pub fn write_phys64(&mut self, paddr: u32, value: u64) {
        self.write_phys32(paddr, (value >> 32) as u32);
        self.write_phys32(paddr.wrapping_add(4), value as u32);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kseg_translation_round_trip() {
        let cp0 = Cp0::new();
        // KSEG0: identity minus the segment base
        assert_eq!(
            resolve_virtual_address(0xFFFF_FFFF_8000_1234, &cp0, BusAccess::Read).unwrap(),
            0x0000_1234
        );
        // KSEG1
        assert_eq!(
            resolve_virtual_address(0xFFFF_FFFF_A400_0040, &cp0, BusAccess::Read).unwrap(),
            0x0400_0040
        );
    }

    #[test]
    fn test_kuseg_miss_is_tlb_exception() {
        let cp0 = Cp0::new();
        let err = resolve_virtual_address(0x0000_1000, &cp0, BusAccess::Read).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TlbMissLoad);
        assert_eq!(err.bad_vaddr, Some(0x1000));

        let err = resolve_virtual_address(0x0000_1000, &cp0, BusAccess::Write).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::TlbMissStore);
    }

    #[test]
    fn test_ksseg_probes_tlb() {
        let mut cp0 = Cp0::new();
        // Map KSSEG page 0xC0000000 to physical 0x100000 (global, valid)
        cp0.entry_hi = 0xC000_0000;
        cp0.entry_lo0 = (0x100 << 6) | 0x2 | 1;
        cp0.entry_lo1 = (0x101 << 6) | 0x2 | 1;
        cp0.tlb_write(0);

        assert_eq!(
            resolve_virtual_address(0xFFFF_FFFF_C000_0010, &cp0, BusAccess::Read).unwrap(),
            0x10_0010
        );
    }

    #[test]
    fn test_rdram_round_trip_through_bus() {
        let mut bus = Bus::new();
        let cp0 = Cp0::new();
        bus.write32(&cp0, 0xFFFF_FFFF_8000_0100, 0xCAFE_BABE).unwrap();
        assert_eq!(bus.read32(&cp0, 0xFFFF_FFFF_8000_0100).unwrap(), 0xCAFE_BABE);
        // Same cell through KSEG1
        assert_eq!(bus.read32(&cp0, 0xFFFF_FFFF_A000_0100).unwrap(), 0xCAFE_BABE);
    }

    #[test]
    fn test_unaligned_word_is_address_error() {
        let mut bus = Bus::new();
        let cp0 = Cp0::new();
        let err = bus.read32(&cp0, 0xFFFF_FFFF_8000_0101).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::AddressErrorLoad);
        let err = bus.write16(&cp0, 0xFFFF_FFFF_8000_0101, 0).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::AddressErrorStore);
    }

    #[test]
    fn test_dmem_routing() {
        let mut bus = Bus::new();
        bus.write_phys32(addr::SP_DMEM_START + 0x40, 0x1234_5678);
        assert_eq!(bus.rsp.dmem[0x40], 0x12);
        assert_eq!(bus.read_phys32(addr::SP_DMEM_START + 0x40), 0x1234_5678);
        assert_eq!(bus.read_phys8(addr::SP_DMEM_START + 0x43), 0x78);
    }

    #[test]
    fn test_imem_write_invalidates_icache() {
        let mut bus = Bus::new();
        bus.write_phys32(addr::SP_IMEM_START + 0x10, 0xDEAD_BEEF);
        assert_eq!(bus.read_phys32(addr::SP_IMEM_START + 0x10), 0xDEAD_BEEF);
        assert!(!bus.rsp.icache_entry_decoded(0x10));
    }

    #[test]
    fn test_vi_register_routing() {
        let mut bus = Bus::new();
        bus.write_phys32(addr::VI_REGS_START + 0x08, 0x140); // VI_WIDTH
        assert_eq!(bus.vi.width, 0x140);
        assert_eq!(bus.read_phys32(addr::VI_REGS_START + 0x08), 0x140);
    }

    #[test]
    fn test_unmapped_read_is_recovered() {
        let mut bus = Bus::new();
        assert_eq!(bus.read_phys32(0x0500_0000), 0);
        bus.write_phys32(0x0500_0000, 0x1234_5678);
    }

    #[test]
    fn test_ri_regs_latch() {
        let mut bus = Bus::new();
        bus.write_phys32(addr::RI_REGS_START + 0x04, 0x40);
        assert_eq!(bus.read_phys32(addr::RI_REGS_START + 0x04), 0x40);
    }

    #[test]
    fn test_dword_entry_point() {
        let mut bus = Bus::new();
        let cp0 = Cp0::new();
        bus.write64(&cp0, 0xFFFF_FFFF_8000_0200, 0x0102_0304_0506_0708)
            .unwrap();
        assert_eq!(
            bus.read64(&cp0, 0xFFFF_FFFF_8000_0200).unwrap(),
            0x0102_0304_0506_0708
        );
        assert_eq!(bus.rdram.read8(0x200), 0x01);
    }
}
