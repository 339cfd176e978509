//! Frame timing scheduler
//!
//! A video frame is a fixed ladder of scanlines split into SHORT (blanking)
//! and LONG (visible) lines, each with a CPU cycle budget. Per line the
//! scheduler:
//!
//! 1. publishes the line index as VI v_current and checks the VI interrupt
//!    compare,
//! 2. invokes the screen-swap hook at the vsync midpoint,
//! 3. steps the CPU until the line budget is spent (the signed overflow
//!    carries into the next line so budgets accumulate without drift),
//! 4. grants the RSP two steps for every three CPU cycles, keeping a
//!    running remainder so the ratio holds across frames,
//! 5. advances the AI by the line's cycle budget.
//!
//! After the last line the frame tail runs: save-data persistence and the
//! per-frame metric reset. The outer loop polls `should_quit` at each
//! frame top.

use log::trace;

use crate::cpu::CYCLES_PER_INSTR;
use crate::peripherals::InterruptKind;
use crate::system::N64System;

/// VR4300 clock rate
pub const CPU_HERTZ: u32 = 93_750_000;
/// CPU cycles in one 60Hz frame
pub const CPU_CYCLES_PER_FRAME: u32 = CPU_HERTZ / 60;

/// Blanking-region lines per frame and their cycle budget
pub const NUM_SHORTLINES: u32 = 25;
pub const SHORTLINE_CYCLES: i32 = 3093;
/// Visible-region lines per frame and their cycle budget
pub const NUM_LONGLINES: u32 = 237;
pub const LONGLINE_CYCLES: i32 = 6150;

/// Per-frame counters, reset at each frame tail
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMetrics {
    pub cpu_cycles: u64,
    pub rsp_steps: u64,
}

/// Scheduler state carried across lines and frames
pub struct Scheduler {
    /// Cycle budget overflow carried into the next line
    cycle_carry: i32,
    /// Remainder of the 3-CPU-cycles : 2-RSP-steps ratio
    rsp_remainder: i32,
    /// Polled at the top of each frame
    pub should_quit: bool,

    /// Counters for the frame in progress
    pub metrics: FrameMetrics,
    /// Counters of the most recently completed frame
    pub last_frame: FrameMetrics,
    /// Completed frames since reset
    pub frames: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            cycle_carry: 0,
            rsp_remainder: 0,
            should_quit: false,
            metrics: FrameMetrics::default(),
            last_frame: FrameMetrics::default(),
            frames: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// One system step: interrupt check, one CPU instruction, the count/compare
/// timer, and the RSP's share of the budget. Returns the cycles consumed.
///
/// This is the contract a JIT backend must also satisfy: advance one
/// logical instruction, return its cycle count, leave the observable state
/// identical at scanline boundaries.
pub fn system_step(sys: &mut N64System) -> u32 {
    // Interrupts raised mid-instruction are taken at the next boundary
    sys.sync_interrupts();
    if sys.cpu.check_interrupts() {
        sys.scheduler.metrics.cpu_cycles += CYCLES_PER_INSTR as u64;
        return CYCLES_PER_INSTR;
    }

    let taken = sys.cpu.step(&mut sys.bus);
    sys.cpu.timer_step(taken);
    sys.scheduler.metrics.cpu_cycles += taken as u64;

    if sys.bus.rsp.halted() {
        sys.scheduler.rsp_remainder = 0;
        sys.bus.rsp.steps = 0;
    } else {
        // 2 RSP steps per 3 CPU cycles
        sys.scheduler.rsp_remainder += taken as i32;
        while sys.scheduler.rsp_remainder > 2 {
            sys.bus.rsp.steps += 2;
            sys.scheduler.rsp_remainder -= 3;
        }
        let granted = sys.bus.rsp.steps as u64;
        let crate::bus::Bus {
            rsp,
            mi,
            rdram,
            dpc,
            ..
        } = &mut sys.bus;
        rsp.run(mi, rdram, dpc);
        sys.scheduler.metrics.rsp_steps += granted - sys.bus.rsp.steps as u64;
    }

    taken
}

/// Raise the VI interrupt when the current line matches the compare line
pub fn check_vi_interrupt(sys: &mut N64System) {
    if sys.bus.vi.intr_line_matches() {
        trace!(
            "VI interrupt line {} reached",
            sys.bus.vi.v_current
        );
        sys.interrupt_raise(InterruptKind::Vi);
    }
}

/// Invoke the screen-swap hook at the vsync midpoint
fn check_vsync(sys: &mut N64System) {
    if sys.bus.vi.v_current == sys.bus.vi.vsync >> 1 {
        sys.invoke_swap_hook();
    }
}

/// Drive one full frame of scanlines
pub fn run_frame(sys: &mut N64System) {
    let mut cycles = sys.scheduler.cycle_carry;

    for line in 0..NUM_SHORTLINES {
        sys.bus.vi.v_current = line;
        check_vi_interrupt(sys);
        check_vsync(sys);
        while cycles <= SHORTLINE_CYCLES {
            cycles += system_step(sys) as i32;
        }
        cycles -= SHORTLINE_CYCLES;
        let crate::bus::Bus { ai, mi, .. } = &mut sys.bus;
        ai.step(mi, SHORTLINE_CYCLES as u32);
    }

    for line in NUM_SHORTLINES..NUM_SHORTLINES + NUM_LONGLINES {
        sys.bus.vi.v_current = line;
        check_vi_interrupt(sys);
        check_vsync(sys);
        while cycles <= LONGLINE_CYCLES {
            cycles += system_step(sys) as i32;
        }
        cycles -= LONGLINE_CYCLES;
        let crate::bus::Bus { ai, mi, .. } = &mut sys.bus;
        ai.step(mi, LONGLINE_CYCLES as u32);
    }

    sys.bus.vi.v_current = NUM_SHORTLINES + NUM_LONGLINES;
    check_vi_interrupt(sys);
    check_vsync(sys);

    sys.scheduler.cycle_carry = cycles;

    // Frame tail: debugger tick, persistence, metric rollover
    sys.bus.save.persist_backup();
    sys.scheduler.last_frame = sys.scheduler.metrics;
    sys.scheduler.metrics = FrameMetrics::default();
    sys.scheduler.frames += 1;
    sys.invoke_debug_hook();
}

/// Frame loop: runs until `should_quit` is observed at a frame boundary,
/// then flushes save data.
pub fn run(sys: &mut N64System) {
    while !sys.scheduler.should_quit {
        run_frame(sys);
    }
    sys.bus.save.force_persist();
}
