//! VR4300 CPU tests
//!
//! Organized into:
//! - instructions.rs: ALU, memory, branch and multiply/divide behavior
//! - exceptions.rs: exception dispatch, interrupts, TLB and ERET
//!
//! Programs are assembled as raw words into RDRAM at physical 0x1000 and
//! executed through KSEG0, so every test also exercises the bus path.

use super::*;
use crate::bus::Bus;

mod exceptions;

/// Physical address test programs load at
const PROGRAM_BASE: u32 = 0x1000;
/// The same address through KSEG0
const PROGRAM_PC: u64 = 0xFFFF_FFFF_8000_1000;

/// A CPU at the test program entry and a fresh bus
fn setup() -> (Cpu, Bus) {
    let mut cpu = Cpu::new();
    let bus = Bus::new();
    cpu.set_pc(PROGRAM_PC);
    (cpu, bus)
}

/// Place a program at the test base
fn load_program(bus: &mut Bus, words: &[u32]) {
    for (n, word) in words.iter().enumerate() {
        bus.write_phys32(PROGRAM_BASE + (n as u32) * 4, *word);
    }
}

/// Step `n` instructions
fn run(cpu: &mut Cpu, bus: &mut Bus, n: usize) {
    for _ in 0..n {
        cpu.step(bus);
    }
}
