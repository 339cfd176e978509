//! Audio interface (AI)
//!
//! Memory-mapped at 0x04500000. The AI streams sample buffers out of RDRAM
//! at the DAC rate. Host-side resampling and output are external
//! collaborators; the core's job is the register contract and the timing:
//! two DMA slots, a countdown clocked by the scheduler's per-line cycle
//! budget, and the AI interrupt raised each time a buffer drains.
//!
//! Register map (offsets from 0x04500000):
//! ```text
//! 0x00 AI_DRAM_ADDR  buffer base in RDRAM (24-bit, write-only)
//! 0x04 AI_LEN        buffer length in bytes; a non-zero write arms a slot
//! 0x08 AI_CONTROL    bit 0 enables DMA
//! 0x0C AI_STATUS     read: busy/full; write: ack AI interrupt
//! 0x10 AI_DACRATE    video-clock divider selecting the sample rate
//! 0x14 AI_BITRATE    bits per sample
//! ```
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/Audio_Interface)

use log::{trace, warn};

use super::mi::{InterruptKind, MipsInterface};
use crate::scheduler::CPU_HERTZ;

/// NTSC video clock feeding the DAC divider
const VIDEO_CLOCK: u32 = 48_681_812;

/// Bytes consumed per stereo 16-bit sample
const BYTES_PER_SAMPLE: u32 = 4;

/// Register offsets within the AI block
mod regs {
    pub const DRAM_ADDR: u32 = 0x00;
    pub const LEN: u32 = 0x04;
    pub const CONTROL: u32 = 0x08;
    pub const STATUS: u32 = 0x0C;
    pub const DACRATE: u32 = 0x10;
    pub const BITRATE: u32 = 0x14;
}

/// DAC timing derived from AI_DACRATE
struct Dac {
    frequency: u32,
    /// CPU cycles per output sample
    period: u32,
    precision: u32,
}

pub struct AudioInterface {
    dma_enable: bool,
    dac_rate: u32,
    bit_rate: u32,

    /// Armed DMA slots: base address and remaining length, slot 0 active
    dma_count: usize,
    dma_address: [u32; 2],
    dma_length: [u32; 2],

    dac: Dac,
    /// Cycles accumulated toward the next sample
    cycles: u32,
}

impl AudioInterface {
    pub fn new() -> Self {
        let mut ai = Self {
            dma_enable: false,
            dac_rate: 0,
            bit_rate: 0,
            dma_count: 0,
            dma_address: [0; 2],
            dma_length: [0; 2],
            dac: Dac {
                frequency: 44100,
                period: 0,
                precision: 16,
            },
            cycles: 0,
        };
        ai.dac.period = CPU_HERTZ / ai.dac.frequency;
        ai
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read32(&self, mi: &MipsInterface, offset: u32) -> u32 {
        match offset {
            regs::LEN => {
                if self.dma_count > 0 {
                    self.dma_length[0]
                } else {
                    0
                }
            }
            regs::STATUS => {
                let mut value = 0;
                if self.dma_count == 2 {
                    value |= 0x8000_0001; // full
                }
                if self.dma_count > 0 {
                    value |= 1 << 30; // busy
                }
                if mi.intr.contains(super::mi::InterruptFlag::AI) {
                    value |= 1 << 25;
                }
                value
            }
            regs::DRAM_ADDR | regs::CONTROL | regs::DACRATE | regs::BITRATE => {
                warn!("Read from write-only AI register offset 0x{:02X}", offset);
                0
            }
            _ => {
                warn!("Read from unknown AI register offset 0x{:02X}", offset);
                0
            }
        }
    }

    pub fn write32(&mut self, mi: &mut MipsInterface, offset: u32, value: u32) {
        match offset {
            regs::DRAM_ADDR => {
                if self.dma_count < 2 {
                    self.dma_address[self.dma_count] = value & 0xFF_FFFF;
                }
            }
            regs::LEN => {
                let length = value & 0x3_FFF8;
                if self.dma_count < 2 && length > 0 {
                    self.dma_length[self.dma_count] = length;
                    self.dma_count += 1;
                    trace!(
                        "AI DMA slot armed: 0x{:06X} + {} bytes",
                        self.dma_address[self.dma_count - 1],
                        length
                    );
                }
            }
            regs::CONTROL => {
                self.dma_enable = value & 1 != 0;
            }
            regs::STATUS => {
                mi.lower(InterruptKind::Ai);
            }
            regs::DACRATE => {
                self.dac_rate = value & 0x3FFF;
                self.dac.frequency = (VIDEO_CLOCK / (self.dac_rate + 1)).max(1);
                self.dac.period = CPU_HERTZ / self.dac.frequency;
            }
            regs::BITRATE => {
                self.bit_rate = value & 0xF;
                self.dac.precision = self.bit_rate + 1;
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown AI register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }

    /// Advance the DAC by a scanline's worth of CPU cycles, draining the
    /// active DMA slot one sample at a time. Raises the AI interrupt every
    /// time a slot empties.
    pub fn step(&mut self, mi: &mut MipsInterface, cpu_cycles: u32) {
        if !self.dma_enable || self.dma_count == 0 || self.dac.period == 0 {
            return;
        }

        self.cycles += cpu_cycles;
        while self.cycles >= self.dac.period {
            self.cycles -= self.dac.period;

            let remaining = self.dma_length[0].saturating_sub(BYTES_PER_SAMPLE);
            self.dma_length[0] = remaining;
            self.dma_address[0] = self.dma_address[0].wrapping_add(BYTES_PER_SAMPLE);

            if remaining == 0 {
                mi.raise(InterruptKind::Ai);
                self.dma_count -= 1;
                self.dma_address[0] = self.dma_address[1];
                self.dma_length[0] = self.dma_length[1];
                if self.dma_count == 0 {
                    self.cycles = 0;
                    break;
                }
            }
        }
    }
}

impl Default for AudioInterface {
    fn default() -> Self {
        Self::new()
    }
}
