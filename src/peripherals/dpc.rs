//! RDP command interface (DPC)
//!
//! Memory-mapped at 0x04100000. The rasterizer itself is an external
//! collaborator; this bank latches the command-list window the CPU or RSP
//! hands over and exposes the status bits that collaborator and the game
//! poll. Writing DPC_END makes the latched span available and is where a
//! connected rasterizer would consume it.
//!
//! Register map (offsets from 0x04100000):
//! ```text
//! 0x00 DPC_START    command list start (24-bit)
//! 0x04 DPC_END      command list end; write hands the span over
//! 0x08 DPC_CURRENT  read pointer (tracks END with no rasterizer attached)
//! 0x0C DPC_STATUS   read: state bits; write: set/clear xbus/freeze/flush
//! 0x10 DPC_CLOCK    free-running counter (read-only)
//! 0x14 DPC_BUSY     busy counter (read-only)
//! 0x18 DPC_PIPE_BUSY
//! 0x1C DPC_TMEM_BUSY
//! ```
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/Reality_Display_Processor)

use log::{trace, warn};

/// DPC_STATUS write bits (clear/set pairs)
const WSTATUS_CLR_XBUS: u32 = 1 << 0;
const WSTATUS_SET_XBUS: u32 = 1 << 1;
const WSTATUS_CLR_FREEZE: u32 = 1 << 2;
const WSTATUS_SET_FREEZE: u32 = 1 << 3;
const WSTATUS_CLR_FLUSH: u32 = 1 << 4;
const WSTATUS_SET_FLUSH: u32 = 1 << 5;

/// DPC_STATUS read bits
const STATUS_XBUS: u32 = 1 << 0;
const STATUS_FREEZE: u32 = 1 << 1;
const STATUS_FLUSH: u32 = 1 << 2;
const STATUS_CBUF_READY: u32 = 1 << 7;

/// Register offsets within the DPC block
mod regs {
    pub const START: u32 = 0x00;
    pub const END: u32 = 0x04;
    pub const CURRENT: u32 = 0x08;
    pub const STATUS: u32 = 0x0C;
    pub const CLOCK: u32 = 0x10;
    pub const BUSY: u32 = 0x14;
    pub const PIPE_BUSY: u32 = 0x18;
    pub const TMEM_BUSY: u32 = 0x1C;
}

pub struct DpCommandRegs {
    pub start: u32,
    pub end: u32,
    pub current: u32,
    xbus: bool,
    freeze: bool,
    flush: bool,
}

impl DpCommandRegs {
    pub fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            current: 0,
            xbus: false,
            freeze: false,
            flush: false,
        }
    }

    /// Power-on status value
    pub fn reset(&mut self) {
        *self = Self::new();
        // Command buffer ready out of reset
        // (status raw reads 0x80 until a span is latched)
    }

    pub fn status(&self) -> u32 {
        let mut value = STATUS_CBUF_READY;
        if self.xbus {
            value |= STATUS_XBUS;
        }
        if self.freeze {
            value |= STATUS_FREEZE;
        }
        if self.flush {
            value |= STATUS_FLUSH;
        }
        value
    }

    pub fn read32(&self, offset: u32) -> u32 {
        match offset {
            regs::START => self.start,
            regs::END => self.end,
            regs::CURRENT => self.current,
            regs::STATUS => self.status(),
            // No rasterizer attached: the counters idle at zero
            regs::CLOCK | regs::BUSY | regs::PIPE_BUSY | regs::TMEM_BUSY => 0,
            _ => {
                warn!("Read from unknown DPC register offset 0x{:02X}", offset);
                0
            }
        }
    }

    pub fn write32(&mut self, offset: u32, value: u32) {
        match offset {
            regs::START => {
                self.start = value & 0xFF_FFF8;
                self.current = self.start;
            }
            regs::END => {
                self.end = value & 0xFF_FFF8;
                trace!(
                    "DPC span handed over: 0x{:06X}..0x{:06X}",
                    self.start,
                    self.end
                );
                // A connected rasterizer consumes [current, end) here; with
                // none attached the read pointer just catches up.
                self.current = self.end;
            }
            regs::STATUS => {
                if value & WSTATUS_CLR_XBUS != 0 {
                    self.xbus = false;
                }
                if value & WSTATUS_SET_XBUS != 0 {
                    self.xbus = true;
                }
                if value & WSTATUS_CLR_FREEZE != 0 {
                    self.freeze = false;
                }
                if value & WSTATUS_SET_FREEZE != 0 {
                    self.freeze = true;
                }
                if value & WSTATUS_CLR_FLUSH != 0 {
                    self.flush = false;
                }
                if value & WSTATUS_SET_FLUSH != 0 {
                    self.flush = true;
                }
            }
            regs::CURRENT | regs::CLOCK | regs::BUSY | regs::PIPE_BUSY | regs::TMEM_BUSY => {
                warn!(
                    "Write 0x{:08X} to read-only DPC register offset 0x{:02X}",
                    value, offset
                );
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown DPC register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }
}

impl Default for DpCommandRegs {
    fn default() -> Self {
        Self::new()
    }
}
