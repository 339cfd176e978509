//! Nintendo 64 Emulator Core
//!
//! This crate is the synchronized execution engine of an N64 emulator: a
//! cycle-approximated VR4300 CPU interpreter, the RSP scalar+vector
//! coprocessor, and the field-based VI timing unit, driven in lockstep by
//! a scanline scheduler over a shared physical bus. Presentation (window,
//! RDP rasterizer, audio output, input) lives in external front-ends that
//! talk to the core through the framebuffer origin, the DPC command
//! window and the register contracts.
//!
//! # Architecture
//!
//! - `memory`: RDRAM, PIF ROM/RAM, big-endian accessors, the address map
//! - `bus`: virtual address resolution (TLB) and physical routing
//! - `cpu`: the VR4300 interpreter (decode, execute, CP0, exceptions)
//! - `rsp`: the RSP, its vector unit, instruction cache and DMA engine
//! - `peripherals`: MI/VI/AI/PI/SI/DPC register banks
//! - `scheduler`: the scanline frame loop and the CPU:RSP step ratio
//! - `system`: the owning aggregate and its reset/boot/run entry points
//! - `rom`, `save`, `pif`: cartridge loading, save persistence, boot/input
//!
//! # Physical Memory Map
//!
//! | Address Range           | Region              |
//! |-------------------------|---------------------|
//! | 0x00000000 - 0x007FFFFF | RDRAM (8MB)         |
//! | 0x04000000 - 0x04001FFF | RSP DMEM + IMEM     |
//! | 0x04040000 - 0x0404001F | RSP registers       |
//! | 0x04100000 - 0x048FFFFF | Interface registers |
//! | 0x08000000 - 0x0FFFFFFF | Cartridge SRAM      |
//! | 0x10000000 - 0x1FBFFFFF | Cartridge ROM       |
//! | 0x1FC00000 - 0x1FC007FF | PIF ROM + RAM       |

use thiserror::Error;

pub mod bus;
pub mod cpu;
pub mod disasm;
pub mod memory;
pub mod peripherals;
pub mod pif;
pub mod rom;
pub mod rsp;
pub mod save;
pub mod scheduler;
pub mod system;

#[cfg(test)]
mod system_integration_test;

pub use system::{DumpOrder, N64System};

/// Host-visible errors. Emulation-visible faults are MIPS exceptions and
/// never unwind past the CPU's dispatcher.
#[derive(Debug, Error)]
pub enum N64Error {
    #[error("invalid ROM: {0}")]
    RomInvalid(String),

    #[error("test ROM reported failure #{0}")]
    TestFailed(i64),

    #[error("test ROM timed out after {0} steps")]
    TestTimeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
