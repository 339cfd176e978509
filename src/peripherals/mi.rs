//! MIPS interface (MI)
//!
//! Memory-mapped at 0x04300000. The MI owns the console-wide interrupt
//! controller: a pair of registers with one bit per source
//! {SP, SI, AI, VI, PI, DP}. A source is pending when its bit is set in
//! both `intr` and `intr_mask`; the derived state feeds CP0 cause.IP2
//! through the system-level raise/lower wrappers.
//!
//! Register map (offsets from 0x04300000):
//! ```text
//! 0x00 MI_MODE       init/ebus/RDRAM mode, write bit 11 clears DP intr
//! 0x04 MI_VERSION    hardware revision constant (read-only)
//! 0x08 MI_INTR       raised sources (read-only)
//! 0x0C MI_INTR_MASK  enabled sources, written as clear/set bit pairs
//! ```
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/MIPS_Interface)

use bitflags::bitflags;
use log::{info, warn};

bitflags! {
    /// One bit per interrupt source, in hardware register order
    pub struct InterruptFlag: u32 {
        const SP = 1 << 0;
        const SI = 1 << 1;
        const AI = 1 << 2;
        const VI = 1 << 3;
        const PI = 1 << 4;
        const DP = 1 << 5;
    }
}

/// Interrupt source identifiers used by raise/lower call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    Sp,
    Si,
    Ai,
    Vi,
    Pi,
    Dp,
}

impl InterruptKind {
    fn flag(self) -> InterruptFlag {
        match self {
            InterruptKind::Sp => InterruptFlag::SP,
            InterruptKind::Si => InterruptFlag::SI,
            InterruptKind::Ai => InterruptFlag::AI,
            InterruptKind::Vi => InterruptFlag::VI,
            InterruptKind::Pi => InterruptFlag::PI,
            InterruptKind::Dp => InterruptFlag::DP,
        }
    }

    fn name(self) -> &'static str {
        match self {
            InterruptKind::Sp => "SP",
            InterruptKind::Si => "SI",
            InterruptKind::Ai => "AI",
            InterruptKind::Vi => "VI",
            InterruptKind::Pi => "PI",
            InterruptKind::Dp => "DP",
        }
    }
}

/// MI_VERSION value on retail hardware
const MI_VERSION: u32 = 0x0202_0102;

/// MI_MODE write bit that acknowledges the DP interrupt
const MODE_CLEAR_DP: u32 = 1 << 11;

/// Register offsets within the MI block
mod regs {
    pub const MODE: u32 = 0x00;
    pub const VERSION: u32 = 0x04;
    pub const INTR: u32 = 0x08;
    pub const INTR_MASK: u32 = 0x0C;
}

pub struct MipsInterface {
    /// Raised sources
    pub intr: InterruptFlag,
    /// Enabled sources
    pub intr_mask: InterruptFlag,
    /// Latched MI_MODE bits (init length / init / ebus / upper)
    mode: u32,
}

impl MipsInterface {
    pub fn new() -> Self {
        Self {
            intr: InterruptFlag::empty(),
            intr_mask: InterruptFlag::empty(),
            mode: 0,
        }
    }

    pub fn reset(&mut self) {
        self.intr = InterruptFlag::empty();
        self.intr_mask = InterruptFlag::empty();
        self.mode = 0;
    }

    /// Set a source's raised bit. The caller re-derives CP0 cause.IP2.
    pub fn raise(&mut self, kind: InterruptKind) {
        info!("Raising {} interrupt", kind.name());
        self.intr.insert(kind.flag());
    }

    /// Clear a source's raised bit. The caller re-derives CP0 cause.IP2.
    pub fn lower(&mut self, kind: InterruptKind) {
        info!("Lowering {} interrupt", kind.name());
        self.intr.remove(kind.flag());
    }

    /// True when any raised source is also enabled
    pub fn interrupt_pending(&self) -> bool {
        self.intr.intersects(self.intr_mask)
    }

    pub fn read32(&self, offset: u32) -> u32 {
        match offset {
            regs::MODE => self.mode,
            regs::VERSION => MI_VERSION,
            regs::INTR => self.intr.bits(),
            regs::INTR_MASK => self.intr_mask.bits(),
            _ => {
                warn!("Read from unknown MI register offset 0x{:02X}", offset);
                0
            }
        }
    }

    pub fn write32(&mut self, offset: u32, value: u32) {
        match offset {
            regs::MODE => {
                // Init length and mode toggle bits are latched; bit 11 acks
                // the DP interrupt.
                self.mode = value & 0x3FF;
                if value & MODE_CLEAR_DP != 0 {
                    self.lower(InterruptKind::Dp);
                }
            }
            regs::VERSION | regs::INTR => {
                warn!(
                    "Write 0x{:08X} to read-only MI register offset 0x{:02X}",
                    value, offset
                );
            }
            regs::INTR_MASK => {
                // Six clear/set bit pairs, one per source
                const SOURCES: [InterruptFlag; 6] = [
                    InterruptFlag::SP,
                    InterruptFlag::SI,
                    InterruptFlag::AI,
                    InterruptFlag::VI,
                    InterruptFlag::PI,
                    InterruptFlag::DP,
                ];
                for (i, source) in SOURCES.iter().enumerate() {
                    let clear = value & (1 << (i * 2)) != 0;
                    let set = value & (1 << (i * 2 + 1)) != 0;
                    if clear {
                        self.intr_mask.remove(*source);
                    }
                    if set {
                        self.intr_mask.insert(*source);
                    }
                }
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown MI register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }
}

impl Default for MipsInterface {
    fn default() -> Self {
        Self::new()
    }
}
