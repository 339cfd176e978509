//! Video interface (VI)
//!
//! Memory-mapped at 0x04400000. The VI is the display output state machine:
//! it sweeps `v_current` across the frame's scanlines (driven by the
//! scheduler), raises the VI interrupt when the current line matches
//! `v_intr`, and tells the external presenter where the framebuffer lives
//! through `origin`.
//!
//! Register map (offsets from 0x04400000):
//! ```text
//! 0x00 VI_STATUS     control bits; bit 6 (serrate) selects interlacing
//! 0x04 VI_ORIGIN     framebuffer base in RDRAM (24-bit)
//! 0x08 VI_WIDTH      framebuffer width in pixels (11-bit)
//! 0x0C VI_V_INTR     half-line to interrupt on (10-bit)
//! 0x10 VI_V_CURRENT  current half-line; writing any value acks the intr
//! 0x14 VI_BURST      color burst timing
//! 0x18 VI_V_SYNC     half-lines per field
//! 0x1C VI_H_SYNC     quarter-pixels per line
//! 0x20 VI_LEAP       PAL leap pattern
//! 0x24 VI_H_START    active horizontal span
//! 0x28 VI_V_START    active vertical span
//! 0x2C VI_V_BURST    burst vertical span
//! 0x30 VI_X_SCALE    horizontal scale factor
//! 0x34 VI_Y_SCALE    vertical scale factor
//! ```
//!
//! All registers read back their latest written value; V_CURRENT reads the
//! live scan position.
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/Video_Interface)

use log::{info, trace, warn};

use super::mi::{InterruptKind, MipsInterface};
use crate::scheduler::CPU_CYCLES_PER_FRAME;

/// VI_STATUS bit selecting interlaced output
const STATUS_SERRATE: u32 = 1 << 6;

/// Register offsets within the VI block
mod regs {
    pub const STATUS: u32 = 0x00;
    pub const ORIGIN: u32 = 0x04;
    pub const WIDTH: u32 = 0x08;
    pub const V_INTR: u32 = 0x0C;
    pub const V_CURRENT: u32 = 0x10;
    pub const BURST: u32 = 0x14;
    pub const V_SYNC: u32 = 0x18;
    pub const H_SYNC: u32 = 0x1C;
    pub const LEAP: u32 = 0x20;
    pub const H_START: u32 = 0x24;
    pub const V_START: u32 = 0x28;
    pub const V_BURST: u32 = 0x2C;
    pub const X_SCALE: u32 = 0x30;
    pub const Y_SCALE: u32 = 0x34;
}

pub struct VideoInterface {
    pub status: u32,
    /// Framebuffer base in RDRAM, masked to 24 bits
    pub origin: u32,
    pub width: u32,
    /// Half-line the VI interrupt fires on
    pub v_intr: u32,
    /// Current half-line of the sweep
    pub v_current: u32,
    pub burst: u32,
    pub vsync: u32,
    pub hsync: u32,
    pub leap: u32,
    pub hstart: u32,
    pub vstart: u32,
    pub vburst: u32,
    pub xscale: u32,
    pub yscale: u32,

    /// 1 progressive, 2 interlaced; derived from status.serrate
    pub num_fields: u32,
    /// Derived from vsync
    pub num_halflines: u32,
    pub cycles_per_halfline: u32,

    /// Framebuffer flips observed (origin changes)
    pub swaps: u64,
}

impl VideoInterface {
    pub fn new() -> Self {
        Self {
            status: 0,
            origin: 0,
            width: 0,
            // Matches the power-on line compare observed on hardware
            v_intr: 256,
            v_current: 0,
            burst: 0,
            vsync: 0,
            hsync: 0,
            leap: 0,
            hstart: 0,
            vstart: 0,
            vburst: 0,
            xscale: 0,
            yscale: 0,
            num_fields: 1,
            num_halflines: 0,
            cycles_per_halfline: 0,
            swaps: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// True when the current sweep position matches the interrupt line.
    /// The low bit of v_current carries the field in interlaced modes, so
    /// the comparison masks it out.
    pub fn intr_line_matches(&self) -> bool {
        (self.v_current & 0x3FE) == self.v_intr
    }

    pub fn read32(&self, offset: u32) -> u32 {
        let value = match offset {
            regs::STATUS => self.status,
            regs::ORIGIN => self.origin,
            regs::WIDTH => self.width,
            regs::V_INTR => self.v_intr,
            regs::V_CURRENT => self.v_current,
            regs::BURST => self.burst,
            regs::V_SYNC => self.vsync,
            regs::H_SYNC => self.hsync,
            regs::LEAP => self.leap,
            regs::H_START => self.hstart,
            regs::V_START => self.vstart,
            regs::V_BURST => self.vburst,
            regs::X_SCALE => self.xscale,
            regs::Y_SCALE => self.yscale,
            _ => {
                warn!("Read from unknown VI register offset 0x{:02X}", offset);
                return 0;
            }
        };
        trace!("VI read offset 0x{:02X} -> 0x{:08X}", offset, value);
        value
    }

    pub fn write32(&mut self, mi: &mut MipsInterface, offset: u32, value: u32) {
        match offset {
            regs::STATUS => {
                self.status = value;
                // Serrate set means two fields per interlaced frame
                self.num_fields = if value & STATUS_SERRATE != 0 { 2 } else { 1 };
            }
            regs::ORIGIN => {
                let masked = value & 0xFF_FFFF;
                if self.origin != masked {
                    self.swaps += 1;
                }
                self.origin = masked;
                info!("VI origin is now 0x{:08X} (wrote 0x{:08X})", masked, value);
            }
            regs::WIDTH => {
                self.width = value & 0x7FF;
            }
            regs::V_INTR => {
                self.v_intr = value & 0x3FF;
                info!(
                    "VI interrupt line is now {} (wrote 0x{:08X})",
                    self.v_intr, value
                );
            }
            regs::V_CURRENT => {
                // Writing any value acknowledges the VI interrupt
                trace!("V_CURRENT written, VI interrupt cleared");
                mi.lower(InterruptKind::Vi);
            }
            regs::BURST => {
                self.burst = value;
            }
            regs::V_SYNC => {
                self.vsync = value & 0x3FF;
                self.num_halflines = self.vsync >> 1;
                self.cycles_per_halfline = if self.num_halflines > 0 {
                    CPU_CYCLES_PER_FRAME / self.num_halflines
                } else {
                    0
                };
                info!(
                    "VI vsync is now {} ({} halflines, {} cycles each)",
                    self.vsync, self.num_halflines, self.cycles_per_halfline
                );
            }
            regs::H_SYNC => {
                self.hsync = value & 0x3FF;
            }
            regs::LEAP => {
                self.leap = value;
            }
            regs::H_START => {
                self.hstart = value;
            }
            regs::V_START => {
                self.vstart = value;
            }
            regs::V_BURST => {
                self.vburst = value;
            }
            regs::X_SCALE => {
                self.xscale = value;
            }
            regs::Y_SCALE => {
                self.yscale = value;
            }
            _ => {
                warn!(
                    "Write 0x{:08X} to unknown VI register offset 0x{:02X}",
                    value, offset
                );
            }
        }
    }
}

impl Default for VideoInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serrate_selects_fields() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();

        vi.write32(&mut mi, regs::STATUS, STATUS_SERRATE);
        assert_eq!(vi.num_fields, 2);

        vi.write32(&mut mi, regs::STATUS, 0);
        assert_eq!(vi.num_fields, 1);
    }

    #[test]
    fn test_origin_mask_and_swap_count() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();

        vi.write32(&mut mi, regs::ORIGIN, 0xFF10_0000);
        assert_eq!(vi.origin, 0x10_0000);
        assert_eq!(vi.swaps, 1);

        // Same value again: no new swap
        vi.write32(&mut mi, regs::ORIGIN, 0x0010_0000);
        assert_eq!(vi.swaps, 1);

        vi.write32(&mut mi, regs::ORIGIN, 0x0020_0000);
        assert_eq!(vi.swaps, 2);
    }

    #[test]
    fn test_register_masks() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();

        vi.write32(&mut mi, regs::WIDTH, 0xFFFF_FFFF);
        assert_eq!(vi.width, 0x7FF);

        vi.write32(&mut mi, regs::V_INTR, 0xFFFF_FFFF);
        assert_eq!(vi.v_intr, 0x3FF);
    }

    #[test]
    fn test_v_current_write_acks_interrupt() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();
        mi.raise(InterruptKind::Vi);

        vi.write32(&mut mi, regs::V_CURRENT, 0x1234);
        assert!(!mi.intr.contains(super::super::mi::InterruptFlag::VI));
        // The sweep position itself is unchanged by the write
        assert_eq!(vi.v_current, 0);
    }

    #[test]
    fn test_vsync_derives_halfline_timing() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();

        vi.write32(&mut mi, regs::V_SYNC, 525);
        assert_eq!(vi.num_halflines, 262);
        assert_eq!(vi.cycles_per_halfline, CPU_CYCLES_PER_FRAME / 262);
    }

    #[test]
    fn test_reads_return_latest_written() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();

        vi.write32(&mut mi, regs::X_SCALE, 0x0100_0200);
        assert_eq!(vi.read32(regs::X_SCALE), 0x0100_0200);

        vi.write32(&mut mi, regs::BURST, 0x0003_E52B);
        assert_eq!(vi.read32(regs::BURST), 0x0003_E52B);
    }

    #[test]
    fn test_intr_line_match_masks_field_bit() {
        let mut vi = VideoInterface::new();
        let mut mi = MipsInterface::new();
        vi.write32(&mut mi, regs::V_INTR, 0x200);

        vi.v_current = 0x200;
        assert!(vi.intr_line_matches());
        vi.v_current = 0x201;
        assert!(vi.intr_line_matches());
        vi.v_current = 0x202;
        assert!(!vi.intr_line_matches());
    }
}
