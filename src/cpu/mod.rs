//! VR4300 CPU interpreter
//!
//! The VR4300 is the 64-bit MIPS III core in the N64, clocked at 93.75 MHz.
//! One `step` executes one instruction and returns a fixed cycle count; the
//! scheduler batches steps against scanline budgets.
//!
//! # Module Organization
//!
//! - `instruction`: field accessors over the raw 32-bit word
//! - `decode`: opcode/funct/mask-match partitioning into a tagged `Instr`
//! - `execute`: one handler per instruction tag
//! - `cp0`: the system coprocessor (status/cause/EPC, count/compare, TLB)
//!
//! # Branch delay
//!
//! Every MIPS branch has exactly one delay slot. A taken branch arms a
//! pending target with a one-step delay counter; the top of `step` commits
//! the target once the counter hits zero, so the instruction after the
//! branch always executes exactly once first.
//!
//! # References
//! - VR4300 User's Manual (NEC)
//! - n64brew wiki (https://n64brew.dev/wiki/CPU)

use log::{debug, trace};

pub mod cp0;
pub mod decode;
mod execute;
pub mod instruction;

#[cfg(test)]
mod tests;

pub use cp0::Cp0;
pub use instruction::Instruction;

use crate::bus::Bus;
use cp0::COUNT_MASK;

/// Fixed cost of one interpreted instruction
pub const CYCLES_PER_INSTR: u32 = 1;

/// MIPS exception classes the core can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Interrupt,
    TlbMissLoad,
    TlbMissStore,
    AddressErrorLoad,
    AddressErrorStore,
    InstructionBusError,
    DataBusError,
    Syscall,
    Breakpoint,
    ReservedInstruction,
    CoprocessorUnusable(u32),
    Overflow,
    Trap,
}

impl ExceptionKind {
    /// MIPS ExcCode value written into cause
    pub fn code(self) -> u32 {
        match self {
            ExceptionKind::Interrupt => 0,
            ExceptionKind::TlbMissLoad => 2,
            ExceptionKind::TlbMissStore => 3,
            ExceptionKind::AddressErrorLoad => 4,
            ExceptionKind::AddressErrorStore => 5,
            ExceptionKind::InstructionBusError => 6,
            ExceptionKind::DataBusError => 7,
            ExceptionKind::Syscall => 8,
            ExceptionKind::Breakpoint => 9,
            ExceptionKind::ReservedInstruction => 10,
            ExceptionKind::CoprocessorUnusable(_) => 11,
            ExceptionKind::Overflow => 12,
            ExceptionKind::Trap => 13,
        }
    }

    /// TLB refill misses use the dedicated vector when EXL is clear
    fn is_tlb_refill(self) -> bool {
        matches!(self, ExceptionKind::TlbMissLoad | ExceptionKind::TlbMissStore)
    }
}

/// An exception in flight, carrying the faulting address when there is one
#[derive(Debug, Clone, Copy)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub bad_vaddr: Option<u64>,
}

impl Exception {
    pub fn new(kind: ExceptionKind) -> Self {
        Self {
            kind,
            bad_vaddr: None,
        }
    }

    pub fn with_vaddr(kind: ExceptionKind, vaddr: u64) -> Self {
        Self {
            kind,
            bad_vaddr: Some(vaddr),
        }
    }
}

/// VR4300 CPU state
pub struct Cpu {
    /// General registers; index 0 reads as zero
    pub gpr: [u64; 32],
    /// Virtual program counter (sign-extended 32-bit addresses)
    pub pc: u64,
    pub hi: u64,
    pub lo: u64,
    /// Load-linked flag for LL/SC
    pub llbit: bool,

    /// A taken branch is pending
    pub branch: bool,
    /// Steps until the pending target commits
    pub branch_delay: u32,
    /// Pending branch target
    pub branch_pc: u64,

    /// cause.IP & status.IM, kept current by `update_interrupts`
    pub interrupts: u8,

    pub cp0: Cp0,

    // CP1 (FPU) register file and control
    pub fpr: [u64; 32],
    pub fcr0: u32,
    pub fcr31: u32,
}

impl Cpu {
    pub fn new() -> Self {
        let mut cpu = Self {
            gpr: [0; 32],
            pc: 0,
            hi: 0,
            lo: 0,
            llbit: false,
            branch: false,
            branch_delay: 0,
            branch_pc: 0,
            interrupts: 0,
            cp0: Cp0::new(),
            fpr: [0; 32],
            fcr0: 0x0A00, // FPU implementation/revision
            fcr31: 0,
        };
        cpu.reset();
        cpu
    }

    /// Power-on / reset state
    pub fn reset(&mut self) {
        self.gpr = [0; 32];
        self.hi = 0;
        self.lo = 0;
        self.llbit = false;
        self.branch = false;
        self.branch_delay = 0;
        self.branch_pc = 0;
        self.interrupts = 0;
        self.fpr = [0; 32];
        self.fcr31 = 0;

        self.cp0 = Cp0::new();
        self.cp0.status.set_bev(true);
        self.cp0.status.set_erl(false);
        self.cp0.cause.set_raw(0xB000_007C);
        self.cp0.epc = 0xFFFF_FFFF_FFFF_FFFF;
        self.cp0.error_epc = 0xFFFF_FFFF_FFFF_FFFF;
        self.cp0.prid = 0x0000_0B22;
        self.cp0.config = 0x7000_0000;
        self.cp0.random = 0x1F;

        // Cold boot fetches the PIF ROM; the HLE boot path overrides this
        self.pc = 0xFFFF_FFFF_BFC0_0000;
    }

    /// Register write that keeps r0 hardwired to zero
    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u64) {
        if index != 0 {
            self.gpr[index] = value;
        }
    }

    /// Set the PC directly (boot, test harnesses). Cancels any pending
    /// branch.
    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
        self.branch = false;
        self.branch_delay = 0;
    }

    // ========== Step contract ==========

    /// Execute one instruction: resolve the branch pipeline, fetch, decode,
    /// execute. Returns the cycle count consumed.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        // 1. Branch-delay resolution
        if self.branch {
            if self.branch_delay == 0 {
                trace!("[BRANCH DELAY] Branching to 0x{:08X}", self.branch_pc as u32);
                self.pc = self.branch_pc;
                self.branch = false;
            } else {
                self.branch_delay -= 1;
            }
        }

        let pc = self.pc;

        // 2. Fetch
        let word = match bus.read32(&self.cp0, pc) {
            Ok(word) => word,
            Err(e) => {
                self.handle_fault(pc, e);
                return CYCLES_PER_INSTR;
            }
        };
        self.pc = self.pc.wrapping_add(4);

        // 3. Decode
        let instr = Instruction(word);
        let kind = decode::decode(instr);
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "[0x{:08X}] {}",
                pc as u32,
                crate::disasm::disassemble(pc as u32, word)
            );
        }

        // 4. Execute
        if let Err(e) = execute::execute(self, bus, kind, instr) {
            self.handle_fault(pc, e);
        }

        CYCLES_PER_INSTR
    }

    // ========== Exceptions ==========

    fn handle_fault(&mut self, faulting_pc: u64, e: Exception) {
        self.handle_exception(faulting_pc, e.kind, self.branch, e.bad_vaddr);
    }

    /// Dispatch an exception: record EPC/BD and the cause code, set EXL,
    /// and jump to the vector selected by BEV and the exception kind.
    pub fn handle_exception(
        &mut self,
        faulting_pc: u64,
        kind: ExceptionKind,
        in_delay_slot: bool,
        bad_vaddr: Option<u64>,
    ) {
        debug!(
            "Exception {:?} at 0x{:08X} (delay slot: {})",
            kind, faulting_pc as u32, in_delay_slot
        );

        let refill_vector = kind.is_tlb_refill() && !self.cp0.status.exl();

        if !self.cp0.status.exl() {
            if in_delay_slot {
                self.cp0.epc = faulting_pc.wrapping_sub(4);
                self.cp0.cause.set_bd(true);
            } else {
                self.cp0.epc = faulting_pc;
                self.cp0.cause.set_bd(false);
            }
        }

        self.cp0.cause.set_exc_code(kind.code());
        if let ExceptionKind::CoprocessorUnusable(unit) = kind {
            self.cp0.cause.set_ce(unit);
        } else {
            self.cp0.cause.set_ce(0);
        }

        if let Some(vaddr) = bad_vaddr {
            self.cp0.bad_vaddr = vaddr;
            self.cp0.context =
                (self.cp0.context & !0x7F_FFF0) | ((vaddr >> 9) & 0x7F_FFF0);
            self.cp0.entry_hi = (self.cp0.entry_hi & 0xFF) | (vaddr & 0xFFFF_E000);
        }

        self.cp0.status.set_exl(true);

        let base: u64 = if self.cp0.status.bev() {
            0xFFFF_FFFF_BFC0_0200
        } else {
            0xFFFF_FFFF_8000_0000
        };
        let offset: u64 = if refill_vector { 0x000 } else { 0x180 };
        self.pc = base.wrapping_add(offset);

        // An exception cancels any pending branch
        self.branch = false;
        self.branch_delay = 0;
    }

    // ========== Interrupts ==========

    /// Re-derive the pending-interrupt set from cause.IP and status.IM
    pub fn update_interrupts(&mut self) {
        self.interrupts = self.cp0.cause.ip() & self.cp0.status.im();
    }

    /// Route the MI interrupt line into cause.IP2
    pub fn set_ip2(&mut self, pending: bool) {
        self.cp0.cause.set_ip2(pending);
        self.update_interrupts();
    }

    /// Take a pending interrupt at an instruction boundary, if the status
    /// register allows it. Returns true when the exception was dispatched.
    pub fn check_interrupts(&mut self) -> bool {
        if self.interrupts == 0 {
            return false;
        }
        let status = self.cp0.status;
        if !status.ie() || status.exl() || status.erl() {
            return false;
        }

        // EPC must name the instruction that would have executed next; when
        // that is a delay slot, EPC backs up to its branch.
        let (faulting_pc, bd) = if self.branch {
            if self.branch_delay == 0 {
                // The pending target was about to commit
                (self.branch_pc, false)
            } else {
                // The next instruction is the delay slot
                (self.pc, true)
            }
        } else {
            (self.pc, false)
        };
        self.handle_exception(faulting_pc, ExceptionKind::Interrupt, bd, None);
        true
    }

    // ========== Count/Compare timer ==========

    /// Advance the 33-bit count register and raise cause.IP7 when the
    /// timer compare value is crossed.
    pub fn timer_step(&mut self, cycles: u32) {
        let old = self.cp0.count >> 1;
        let new = (self.cp0.count + cycles as u64) >> 1;
        let compare = self.cp0.compare as u64;
        if old < compare && new >= compare {
            debug!(
                "Compare interrupt: count 0x{:08X} reached compare 0x{:08X}",
                new, compare
            );
            self.cp0.cause.set_ip7(true);
            self.update_interrupts();
        }
        self.cp0.count = (self.cp0.count + cycles as u64) & COUNT_MASK;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
