//! System orchestrator
//!
//! `N64System` is the process-wide aggregate: the CPU plus the bus (which
//! owns everything else) plus the scheduler. It is constructed once,
//! passed explicitly, and sub-components borrow from it in non-overlapping
//! ways - the CPU and RSP never alias the same field at the same time.
//!
//! The swap hook is the seam to the external presenter: at the vsync
//! midpoint it receives the VI origin and width, and reads the framebuffer
//! out of RDRAM itself.

use std::fs;

use log::info;

use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::peripherals::InterruptKind;
use crate::pif;
use crate::rom::Cartridge;
use crate::scheduler::{self, Scheduler};
use crate::N64Error;

/// Headless test contract: the register a test ROM reports through
const TEST_STATUS_REGISTER: usize = 30;
/// Headless test contract: step budget before a timeout
pub const TEST_MAX_STEPS: u64 = 10_000_000;

/// Invoked at the vsync midpoint with (framebuffer origin, width)
pub type SwapHook = Box<dyn FnMut(u32, u32)>;

/// Invoked at each frame tail with the completed frame's metrics
pub type DebugHook = Box<dyn FnMut(&crate::scheduler::FrameMetrics)>;

/// Byte order of an RDRAM dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpOrder {
    BigEndian,
    LittleEndian,
}

pub struct N64System {
    pub cpu: Cpu,
    pub bus: Bus,
    pub scheduler: Scheduler,

    /// Path of the loaded ROM, used to derive save file names
    pub rom_path: Option<String>,

    swap_hook: Option<SwapHook>,
    debug_hook: Option<DebugHook>,
}

impl N64System {
    pub fn new() -> Self {
        let mut sys = Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            scheduler: Scheduler::new(),
            rom_path: None,
            swap_hook: None,
            debug_hook: None,
        };
        sys.reset();
        sys
    }

    /// Reset to power-on state. Flushes and releases save data, zeroes the
    /// memories, halts the RSP and reinstates the CP0 boot values. The
    /// cartridge and PIF ROM survive; a loaded cartridge is booted again.
    pub fn reset(&mut self) {
        self.bus.save.force_persist();
        self.bus.save.release();

        self.cpu.reset();
        self.bus.reset();
        self.scheduler.reset();

        if let Some(cart) = &self.bus.cart {
            let save_type = cart.save_type;
            self.bus.save.init(save_type, self.rom_path.as_deref());
            self.boot();
        }
    }

    /// Load a ROM image from disk: byte-order normalization, header parse,
    /// game-database match, save-data setup, then boot.
    pub fn load_rom(&mut self, rom_path: &str) -> Result<(), N64Error> {
        info!("Loading {}", rom_path);
        let data = fs::read(rom_path)?;
        self.rom_path = Some(rom_path.to_string());
        self.load_rom_bytes(&data)
    }

    /// Load a ROM image already in memory
    pub fn load_rom_bytes(&mut self, data: &[u8]) -> Result<(), N64Error> {
        let cart = Cartridge::load(data)?;
        let save_type = cart.save_type;
        self.bus.cart = Some(cart);
        self.bus.save.init(save_type, self.rom_path.as_deref());
        self.boot();
        Ok(())
    }

    /// Install an optional PIF boot ROM. Without one, boot is synthesized.
    pub fn load_pif_rom(&mut self, path: &str) -> Result<(), N64Error> {
        let data = fs::read(path)?;
        self.bus.pif.load_rom(&data)
    }

    fn boot(&mut self) {
        if self.bus.pif.has_rom() {
            // Cold boot through the real PIF ROM at the reset vector
            self.cpu.set_pc(0xFFFF_FFFF_BFC0_0000);
        } else if let Some(cart) = &self.bus.cart {
            pif::hle_boot(&mut self.cpu, &mut self.bus.rsp, cart);
        }
    }

    // ========== Interrupt controller facade ==========

    /// Raise an interrupt source and propagate the derived pending state
    /// into CP0 cause.IP2.
    pub fn interrupt_raise(&mut self, kind: InterruptKind) {
        self.bus.mi.raise(kind);
        self.sync_interrupts();
    }

    /// Lower an interrupt source and propagate the derived pending state.
    pub fn interrupt_lower(&mut self, kind: InterruptKind) {
        self.bus.mi.lower(kind);
        self.sync_interrupts();
    }

    /// Re-derive cause.IP2 and the CPU's pending set from the MI registers
    pub fn sync_interrupts(&mut self) {
        self.cpu.set_ip2(self.bus.mi.interrupt_pending());
    }

    // ========== Stepping ==========

    /// One system step (debug tools; frame timing uses the scheduler)
    pub fn step(&mut self) -> u32 {
        scheduler::system_step(self)
    }

    /// One full frame of scanlines
    pub fn run_frame(&mut self) {
        scheduler::run_frame(self);
    }

    /// Frame loop until `request_quit`; flushes save data on exit
    pub fn run(&mut self) {
        scheduler::run(self);
    }

    /// Ask the frame loop to stop at the next frame boundary
    pub fn request_quit(&mut self) {
        self.scheduler.should_quit = true;
    }

    // ========== Swap hook ==========

    pub fn set_swap_hook(&mut self, hook: SwapHook) {
        self.swap_hook = Some(hook);
    }

    pub(crate) fn invoke_swap_hook(&mut self) {
        if let Some(hook) = &mut self.swap_hook {
            hook(self.bus.vi.origin, self.bus.vi.width);
        }
    }

    /// Attach a per-frame debugger callback
    pub fn set_debug_hook(&mut self, hook: DebugHook) {
        self.debug_hook = Some(hook);
    }

    pub(crate) fn invoke_debug_hook(&mut self) {
        if let Some(hook) = &mut self.debug_hook {
            hook(&self.scheduler.last_frame);
        }
    }

    // ========== Headless test contract ==========

    /// Run a test ROM: the bootcode's cartridge copy is performed directly,
    /// the PC starts at the header entry, and GPR 30 reports the verdict
    /// (-1 pass, positive failure index).
    pub fn run_test(&mut self) -> Result<u64, N64Error> {
        self.run_test_with_limit(TEST_MAX_STEPS)
    }

    /// `run_test` with an explicit step budget
    pub fn run_test_with_limit(&mut self, max_steps: u64) -> Result<u64, N64Error> {
        let entry = {
            let cart = self
                .bus
                .cart
                .as_ref()
                .ok_or_else(|| N64Error::RomInvalid("no ROM loaded".into()))?;
            // Normally done by the boot code
            crate::peripherals::pi::dma_cart_to_dram(
                &mut self.bus.rdram,
                Some(cart),
                &self.bus.save,
                0x1000_1000,
                0x0000_1000,
                0x10_0000,
            );
            cart.header.program_counter
        };
        self.cpu.set_pc(entry as i32 as i64 as u64);
        info!("Test entry PC: 0x{:08X}", entry);

        for steps in 0..max_steps {
            let verdict = self.cpu.gpr[TEST_STATUS_REGISTER] as i64;
            if verdict != 0 {
                return if verdict == -1 {
                    Ok(steps)
                } else {
                    Err(N64Error::TestFailed(verdict))
                };
            }
            self.step();
        }
        Err(N64Error::TestTimeout(max_steps))
    }

    // ========== Front-end services ==========

    /// Dump all of RDRAM in the requested byte order
    pub fn dump_rdram(&mut self, order: DumpOrder) -> Vec<u8> {
        match order {
            DumpOrder::BigEndian => self.bus.rdram.dump_big_endian(),
            DumpOrder::LittleEndian => self.bus.rdram.dump_little_endian(),
        }
    }

    /// Update a controller button/stick snapshot
    pub fn set_controller(&mut self, port: usize, buttons: u16, joy_x: i8, joy_y: i8) {
        if port < 4 {
            let c = &mut self.bus.controllers[port];
            c.buttons = buttons;
            c.joy_x = joy_x;
            c.joy_y = joy_y;
        }
    }
}

impl Default for N64System {
    fn default() -> Self {
        Self::new()
    }
}
