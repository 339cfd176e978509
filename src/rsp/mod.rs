//! RSP (Reality Signal Processor)
//!
//! A MIPS-derived scalar core with an 8-lane SIMD vector unit, 4KB DMEM
//! and 4KB IMEM scratchpads, and a DMA engine into RDRAM. The scheduler
//! grants the RSP two steps for every three CPU cycles while the status
//! register's halt bit is clear.
//!
//! # Module Organization
//!
//! - `decode`: scalar + CP2 instruction decoding into small `Copy` tags
//! - `execute`: scalar and vector instruction handlers
//! - `vector`: vector registers, accumulator planes, flags, divide latch
//! - `dma`: the DMEM/IMEM <-> RDRAM block mover
//!
//! # Instruction cache
//!
//! IMEM is mirrored by a 1024-entry cache of {raw word, decoded tag}. An
//! entry decodes on first execution and is reset to the `Undecoded`
//! sentinel by any IMEM write, DMA or reset, so stale handlers can never
//! run.
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/RSP)

use bitflags::bitflags;
use log::{trace, warn};

pub mod decode;
pub mod dma;
mod execute;
pub mod vector;

use crate::cpu::instruction::Instruction;
use crate::memory::{addr, Rdram};
use crate::peripherals::mi::{InterruptKind, MipsInterface};
use crate::peripherals::DpCommandRegs;
use decode::RspInstr;
use dma::SpDma;
use vector::VectorUnit;

bitflags! {
    /// SP_STATUS register bits
    pub struct RspStatus: u32 {
        const HALT          = 1 << 0;
        const BROKE         = 1 << 1;
        const DMA_BUSY      = 1 << 2;
        const DMA_FULL      = 1 << 3;
        const IO_FULL       = 1 << 4;
        const SINGLE_STEP   = 1 << 5;
        const INTR_ON_BREAK = 1 << 6;
        const SIGNAL_0      = 1 << 7;
        const SIGNAL_1      = 1 << 8;
        const SIGNAL_2      = 1 << 9;
        const SIGNAL_3      = 1 << 10;
        const SIGNAL_4      = 1 << 11;
        const SIGNAL_5      = 1 << 12;
        const SIGNAL_6      = 1 << 13;
        const SIGNAL_7      = 1 << 14;
    }
}

/// One instruction-cache entry: the raw IMEM word and its decoded tag
#[derive(Debug, Clone, Copy)]
struct IcacheEntry {
    raw: u32,
    decoded: RspInstr,
}

impl IcacheEntry {
    const UNDECODED: IcacheEntry = IcacheEntry {
        raw: 0,
        decoded: RspInstr::Undecoded,
    };
}

/// Number of icache entries (one per IMEM word)
const ICACHE_ENTRIES: usize = addr::SP_MEM_SIZE / 4;

/// SP register offsets within the control block
mod regs {
    pub const MEM_ADDR: u32 = 0x00;
    pub const DRAM_ADDR: u32 = 0x04;
    pub const RD_LEN: u32 = 0x08;
    pub const WR_LEN: u32 = 0x0C;
    pub const STATUS: u32 = 0x10;
    pub const DMA_FULL: u32 = 0x14;
    pub const DMA_BUSY: u32 = 0x18;
    pub const SEMAPHORE: u32 = 0x1C;
}

pub struct Rsp {
    /// Scalar registers; index 0 reads as zero
    pub gpr: [u32; 32],
    /// PC pipeline: the executing, next, and previously executed word
    /// addresses, all 12-bit
    pub prev_pc: u16,
    pub pc: u16,
    pub next_pc: u16,

    pub status: RspStatus,
    pub io: SpDma,
    pub semaphore_held: bool,

    /// Step budget granted by the scheduler
    pub steps: u32,

    pub vu: VectorUnit,

    icache: [IcacheEntry; ICACHE_ENTRIES],

    pub dmem: [u8; addr::SP_MEM_SIZE],
    pub imem: [u8; addr::SP_MEM_SIZE],
}

impl Rsp {
    pub fn new() -> Self {
        Self {
            gpr: [0; 32],
            prev_pc: 0,
            pc: 0,
            next_pc: 4,
            // The RSP comes out of reset halted
            status: RspStatus::HALT,
            io: SpDma::default(),
            semaphore_held: false,
            steps: 0,
            vu: VectorUnit::new(),
            icache: [IcacheEntry::UNDECODED; ICACHE_ENTRIES],
            dmem: [0; addr::SP_MEM_SIZE],
            imem: [0; addr::SP_MEM_SIZE],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn halted(&self) -> bool {
        self.status.contains(RspStatus::HALT)
    }

    /// Register write that keeps r0 hardwired to zero
    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u32) {
        if index != 0 {
            self.gpr[index] = value;
        }
    }

    /// Load a new program counter (SP_PC write). Resets the pipeline.
    pub fn set_pc(&mut self, value: u32) {
        self.pc = (value as u16) & 0xFFC;
        self.next_pc = self.pc.wrapping_add(4) & 0xFFF;
        self.prev_pc = self.pc;
    }

    // ========== Step contract ==========

    /// Execute one RSP instruction: consult the decoded instruction cache
    /// (filling the entry on a sentinel hit), rotate the PC pipeline, run
    /// the handler.
    pub fn step(&mut self, mi: &mut MipsInterface, rdram: &mut Rdram, dpc: &mut DpCommandRegs) {
        let index = (self.pc as usize & 0xFFF) >> 2;
        let entry = self.icache[index];
        let (raw, decoded) = if entry.decoded == RspInstr::Undecoded {
            let raw = crate::memory::read32(&self.imem, index << 2);
            let decoded = decode::decode_rsp(Instruction(raw));
            self.icache[index] = IcacheEntry { raw, decoded };
            (raw, decoded)
        } else {
            (entry.raw, entry.decoded)
        };

        // Rotate the pipeline before executing: branches write next_pc,
        // which takes effect after the delay slot has run.
        self.prev_pc = self.pc;
        self.pc = self.next_pc;
        self.next_pc = self.pc.wrapping_add(4) & 0xFFF;

        execute::execute_rsp(self, mi, rdram, dpc, decoded, Instruction(raw));
    }

    /// Run the budget granted by the scheduler
    pub fn run(&mut self, mi: &mut MipsInterface, rdram: &mut Rdram, dpc: &mut DpCommandRegs) {
        while self.steps > 0 && !self.halted() {
            self.steps -= 1;
            self.step(mi, rdram, dpc);
            if self.status.contains(RspStatus::SINGLE_STEP) {
                self.status.insert(RspStatus::HALT);
            }
        }
    }

    // ========== Instruction cache ==========

    /// Reset every cache entry to the decode sentinel
    pub fn invalidate_icache(&mut self) {
        self.icache = [IcacheEntry::UNDECODED; ICACHE_ENTRIES];
    }

    /// True when the entry covering IMEM offset `offset` holds a decoded
    /// handler
    pub fn icache_entry_decoded(&self, offset: u32) -> bool {
        self.icache[(offset as usize & 0xFFF) >> 2].decoded != RspInstr::Undecoded
    }

    /// Decode the entry covering IMEM offset 0 eagerly (tests)
    #[cfg(test)]
    pub(crate) fn fill_icache_entry(&mut self, offset: u32) {
        let index = (offset as usize & 0xFFF) >> 2;
        let raw = crate::memory::read32(&self.imem, index << 2);
        self.icache[index] = IcacheEntry {
            raw,
            decoded: decode::decode_rsp(Instruction(raw)),
        };
    }

    /// Byte write into IMEM, invalidating the covering cache entry
    pub fn write_imem8(&mut self, offset: u32, value: u8) {
        let offset = offset as usize & 0xFFF;
        self.imem[offset] = value;
        self.icache[offset >> 2] = IcacheEntry::UNDECODED;
    }

    /// Word write into IMEM, invalidating the covering cache entry
    pub fn write_imem32(&mut self, offset: u32, value: u32) {
        let offset = offset as usize & 0xFFC;
        crate::memory::write32(&mut self.imem, offset, value);
        self.icache[offset >> 2] = IcacheEntry::UNDECODED;
    }

    // ========== DMEM access (scalar loads/stores wrap inside DMEM) ==========

    pub fn dmem_read8(&self, offset: u32) -> u8 {
        self.dmem[(offset & 0xFFF) as usize]
    }

    pub fn dmem_write8(&mut self, offset: u32, value: u8) {
        self.dmem[(offset & 0xFFF) as usize] = value;
    }

    pub fn dmem_read16(&self, offset: u32) -> u16 {
        ((self.dmem_read8(offset) as u16) << 8) | self.dmem_read8(offset.wrapping_add(1)) as u16
    }

    pub fn dmem_write16(&mut self, offset: u32, value: u16) {
        self.dmem_write8(offset, (value >> 8) as u8);
        self.dmem_write8(offset.wrapping_add(1), value as u8);
    }

    pub fn dmem_read32(&self, offset: u32) -> u32 {
        ((self.dmem_read16(offset) as u32) << 16)
            | self.dmem_read16(offset.wrapping_add(2)) as u32
    }

    pub fn dmem_write32(&mut self, offset: u32, value: u32) {
        self.dmem_write16(offset, (value >> 16) as u16);
        self.dmem_write16(offset.wrapping_add(2), value as u16);
    }

    // ========== SP control registers ==========

    /// CPU-side register read. Reading the semaphore acquires it.
    pub fn read_reg(&mut self, offset: u32) -> u32 {
        match offset {
            regs::MEM_ADDR => self.io.mem_addr,
            regs::DRAM_ADDR => self.io.dram_addr,
            regs::RD_LEN | regs::WR_LEN => self.io.len_raw,
            regs::STATUS => self.status.bits(),
            regs::DMA_FULL => self.status.contains(RspStatus::DMA_FULL) as u32,
            regs::DMA_BUSY => self.status.contains(RspStatus::DMA_BUSY) as u32,
            regs::SEMAPHORE => {
                if self.semaphore_held {
                    1
                } else {
                    self.semaphore_held = true;
                    0
                }
            }
            _ => {
                warn!("Read from unknown SP register offset 0x{:02X}", offset);
                0
            }
        }
    }

    /// CPU- or RSP-side register write. Length writes fire DMA; status
    /// writes use clear/set bit pairs.
    pub fn write_reg(
        &mut self,
        mi: &mut MipsInterface,
        rdram: &mut Rdram,
        offset: u32,
        value: u32,
    ) {
        match offset {
            regs::MEM_ADDR => {
                // Queued until the transfer fires
                self.io.shadow_mem_addr = value & 0x1FFF;
                if self.status.contains(RspStatus::DMA_BUSY) {
                    self.status.insert(RspStatus::DMA_FULL);
                }
            }
            regs::DRAM_ADDR => {
                self.io.shadow_dram_addr = value & 0xFF_FFFF;
                if self.status.contains(RspStatus::DMA_BUSY) {
                    self.status.insert(RspStatus::DMA_FULL);
                }
            }
            regs::RD_LEN => dma::dma_to_spmem(self, rdram, value),
            regs::WR_LEN => dma::dma_to_rdram(self, rdram, value),
            regs::STATUS => self.write_status(mi, value),
            regs::DMA_FULL | regs::DMA_BUSY => {
                warn!(
                    "Write 0x{:08X} to read-only SP register offset 0x{:02X}",
                    value, offset
                );
            }
            regs::SEMAPHORE => {
                self.semaphore_held = false;
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown SP register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }

    /// SP_STATUS write: clear/set pairs for halt, interrupt, single-step,
    /// intr-on-break and the eight signal bits, plus clear-broke.
    fn write_status(&mut self, mi: &mut MipsInterface, value: u32) {
        if value & (1 << 0) != 0 {
            trace!("SP: halt cleared, resuming at pc 0x{:03X}", self.pc);
            self.status.remove(RspStatus::HALT);
        }
        if value & (1 << 1) != 0 {
            self.status.insert(RspStatus::HALT);
        }
        if value & (1 << 2) != 0 {
            self.status.remove(RspStatus::BROKE);
        }
        if value & (1 << 3) != 0 {
            mi.lower(InterruptKind::Sp);
        }
        if value & (1 << 4) != 0 {
            mi.raise(InterruptKind::Sp);
        }
        if value & (1 << 5) != 0 {
            self.status.remove(RspStatus::SINGLE_STEP);
        }
        if value & (1 << 6) != 0 {
            self.status.insert(RspStatus::SINGLE_STEP);
        }
        if value & (1 << 7) != 0 {
            self.status.remove(RspStatus::INTR_ON_BREAK);
        }
        if value & (1 << 8) != 0 {
            self.status.insert(RspStatus::INTR_ON_BREAK);
        }
        for signal in 0..8 {
            let flag = RspStatus::from_bits_truncate(RspStatus::SIGNAL_0.bits() << signal);
            if value & (1 << (9 + signal * 2)) != 0 {
                self.status.remove(flag);
            }
            if value & (1 << (10 + signal * 2)) != 0 {
                self.status.insert(flag);
            }
        }
    }
}

impl Default for Rsp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> (Rsp, MipsInterface, Rdram, DpCommandRegs) {
        (
            Rsp::new(),
            MipsInterface::new(),
            Rdram::new(),
            DpCommandRegs::new(),
        )
    }

    /// Assemble a word into IMEM at the given offset
    fn poke_imem(rsp: &mut Rsp, offset: u32, word: u32) {
        crate::memory::write32(&mut rsp.imem, offset as usize, word);
    }

    #[test]
    fn test_reset_state() {
        let rsp = Rsp::new();
        assert!(rsp.halted());
        assert!(!rsp.icache_entry_decoded(0));
        assert_eq!(rsp.pc, 0);
        assert_eq!(rsp.next_pc, 4);
    }

    #[test]
    fn test_icache_fills_on_execution() {
        let (mut rsp, mut mi, mut rdram, mut dpc) = parts();
        poke_imem(&mut rsp, 0, 0x3C08_1234); // LUI r8, 0x1234
        rsp.status.remove(RspStatus::HALT);

        assert!(!rsp.icache_entry_decoded(0));
        rsp.step(&mut mi, &mut rdram, &mut dpc);
        assert!(rsp.icache_entry_decoded(0));
        assert_eq!(rsp.gpr[8], 0x1234_0000);
    }

    #[test]
    fn test_imem_write_reverts_entry_to_sentinel() {
        let (mut rsp, mut mi, mut rdram, mut dpc) = parts();
        poke_imem(&mut rsp, 0, 0x3C08_1234);
        rsp.status.remove(RspStatus::HALT);
        rsp.step(&mut mi, &mut rdram, &mut dpc);
        assert!(rsp.icache_entry_decoded(0));

        rsp.write_imem32(0, 0x3C08_5678);
        assert!(!rsp.icache_entry_decoded(0));

        // Re-executing picks up the new word, not the stale handler
        rsp.set_pc(0);
        rsp.step(&mut mi, &mut rdram, &mut dpc);
        assert_eq!(rsp.gpr[8], 0x5678_0000);
    }

    #[test]
    fn test_pc_pipeline_branch_delay() {
        let (mut rsp, mut mi, mut rdram, mut dpc) = parts();
        // 0x000: J 0x100
        // 0x004: ADDI r1, r0, 5   (delay slot, must execute)
        // 0x100: ADDI r2, r0, 7
        poke_imem(&mut rsp, 0x000, (0x02 << 26) | (0x100 >> 2));
        poke_imem(&mut rsp, 0x004, 0x2001_0005);
        poke_imem(&mut rsp, 0x100, 0x2002_0007);
        rsp.status.remove(RspStatus::HALT);

        rsp.step(&mut mi, &mut rdram, &mut dpc); // J
        rsp.step(&mut mi, &mut rdram, &mut dpc); // delay slot
        assert_eq!(rsp.gpr[1], 5);
        assert_eq!(rsp.pc, 0x100);
        rsp.step(&mut mi, &mut rdram, &mut dpc);
        assert_eq!(rsp.gpr[2], 7);
    }

    #[test]
    fn test_pc_wraps_at_imem_end() {
        let (mut rsp, mut mi, mut rdram, mut dpc) = parts();
        rsp.set_pc(0xFFC);
        rsp.status.remove(RspStatus::HALT);
        rsp.step(&mut mi, &mut rdram, &mut dpc);
        assert_eq!(rsp.pc, 0x000);
    }

    #[test]
    fn test_halted_rsp_makes_no_state_change(){
        let (mut rsp, mut mi, mut rdram, mut dpc) = parts();
        poke_imem(&mut rsp, 0, 0x2001_0005); // ADDI r1, r0, 5
        rsp.steps = 10;
        rsp.run(&mut mi, &mut rdram, &mut dpc);
        assert_eq!(rsp.gpr[1], 0);
        assert_eq!(rsp.pc, 0);

        // Clearing halt through the status register resumes at current PC
        let mut rdram2 = Rdram::new();
        rsp.write_reg(&mut mi, &mut rdram2, regs::STATUS, 1);
        rsp.steps = 1;
        rsp.run(&mut mi, &mut rdram, &mut dpc);
        assert_eq!(rsp.gpr[1], 5);
    }

    #[test]
    fn test_status_write_pairs() {
        let (mut rsp, mut mi, mut rdram, _) = parts();
        // Set signal 2 (bit 10 + 2*2 = 14), set intr_on_break (bit 8)
        rsp.write_reg(&mut mi, &mut rdram, regs::STATUS, (1 << 14) | (1 << 8));
        assert!(rsp.status.contains(RspStatus::SIGNAL_2));
        assert!(rsp.status.contains(RspStatus::INTR_ON_BREAK));
        // Clear signal 2 (bit 9 + 2*2 = 13)
        rsp.write_reg(&mut mi, &mut rdram, regs::STATUS, 1 << 13);
        assert!(!rsp.status.contains(RspStatus::SIGNAL_2));
    }

    #[test]
    fn test_status_write_raises_and_acks_sp_interrupt() {
        let (mut rsp, mut mi, mut rdram, _) = parts();
        rsp.write_reg(&mut mi, &mut rdram, regs::STATUS, 1 << 4);
        assert!(mi.intr.contains(crate::peripherals::InterruptFlag::SP));
        rsp.write_reg(&mut mi, &mut rdram, regs::STATUS, 1 << 3);
        assert!(!mi.intr.contains(crate::peripherals::InterruptFlag::SP));
    }

    #[test]
    fn test_semaphore_acquire_release() {
        let (mut rsp, mut mi, mut rdram, _) = parts();
        assert_eq!(rsp.read_reg(regs::SEMAPHORE), 0); // acquired
        assert_eq!(rsp.read_reg(regs::SEMAPHORE), 1); // already held
        rsp.write_reg(&mut mi, &mut rdram, regs::SEMAPHORE, 0);
        assert_eq!(rsp.read_reg(regs::SEMAPHORE), 0);
    }

    #[test]
    fn test_dmem_wrapping_access() {
        let mut rsp = Rsp::new();
        rsp.dmem_write32(0xFFE, 0xAABB_CCDD);
        assert_eq!(rsp.dmem_read8(0xFFE), 0xAA);
        assert_eq!(rsp.dmem_read8(0xFFF), 0xBB);
        assert_eq!(rsp.dmem_read8(0x000), 0xCC);
        assert_eq!(rsp.dmem_read8(0x001), 0xDD);
    }
}
