//! N64 memory-mapped interface banks
//!
//! One module per register bank on the physical bus:
//! - MIPS interface / interrupt controller (0x04300000)
//! - Video interface (0x04400000)
//! - Audio interface (0x04500000)
//! - Peripheral interface (0x04600000)
//! - Serial interface (0x04800000)
//! - RDP command interface (0x04100000)
//!
//! Address decoding between the banks lives in `bus.rs`; the RSP control
//! registers (0x04040000) live with the RSP itself in `rsp/`.

pub mod ai;
pub mod dpc;
pub mod mi;
pub mod pi;
pub mod si;
pub mod vi;

pub use ai::AudioInterface;
pub use dpc::DpCommandRegs;
pub use mi::{InterruptFlag, InterruptKind, MipsInterface};
pub use pi::PeripheralInterface;
pub use si::SerialInterface;
pub use vi::VideoInterface;
