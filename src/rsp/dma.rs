//! RSP DMA engine
//!
//! Moves rows of bytes between the scratchpads (DMEM/IMEM, selected by bit
//! 12 of the mem address) and RDRAM. The length register packs three
//! fields:
//!
//! ```text
//! bits  0..11  length  (row is length+1 bytes)
//! bits 12..19  count   (count+1 rows)
//! bits 20..31  skip    (RDRAM-side stride padding between rows)
//! ```
//!
//! Address writes land in shadow registers and promote to the active pair
//! when a length write fires the transfer; a transfer completes
//! instantaneously from the CPU's point of view, so `dma_busy`/`dma_full`
//! are visible only across the copy itself.

use log::trace;

use super::{Rsp, RspStatus};
use crate::memory::Rdram;

/// Bit of the mem address selecting IMEM over DMEM
const MEM_ADDR_IMEM: u32 = 1 << 12;

/// DMA descriptor state: active pair, shadow pair, and the packed
/// length/count/skip register.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpDma {
    pub mem_addr: u32,
    pub dram_addr: u32,
    pub shadow_mem_addr: u32,
    pub shadow_dram_addr: u32,
    pub len_raw: u32,
}

impl SpDma {
    pub fn length(&self) -> u32 {
        self.len_raw & 0xFFF
    }

    pub fn count(&self) -> u32 {
        (self.len_raw >> 12) & 0xFF
    }

    pub fn skip(&self) -> u32 {
        self.len_raw >> 20
    }
}

/// RDRAM -> DMEM/IMEM transfer (a write to SP_RD_LEN)
pub(super) fn dma_to_spmem(rsp: &mut Rsp, rdram: &Rdram, len_raw: u32) {
    rsp.io.len_raw = len_raw;
    promote_shadow(rsp);
    rsp.status.insert(RspStatus::DMA_BUSY);

    let row = rsp.io.length() + 1;
    let rows = rsp.io.count() + 1;
    let skip = rsp.io.skip();
    let imem = rsp.io.mem_addr & MEM_ADDR_IMEM != 0;

    let mut mem = rsp.io.mem_addr & 0xFFF;
    let mut dram = rsp.io.dram_addr & 0xFF_FFFF;
    for _ in 0..rows {
        for i in 0..row {
            let byte = rdram.read8(dram + i);
            let offset = ((mem + i) & 0xFFF) as usize;
            if imem {
                rsp.imem[offset] = byte;
            } else {
                rsp.dmem[offset] = byte;
            }
        }
        mem = (mem + row) & 0xFFF;
        dram += row + skip;
    }
    rsp.io.mem_addr = (rsp.io.mem_addr & MEM_ADDR_IMEM) | mem;
    rsp.io.dram_addr = dram;

    if imem {
        // Freshly DMA'd code must decode anew
        rsp.invalidate_icache();
    }

    trace!(
        "SP DMA: {} bytes RDRAM -> {}",
        row * rows,
        if imem { "IMEM" } else { "DMEM" }
    );
    rsp.status.remove(RspStatus::DMA_BUSY);
    rsp.status.remove(RspStatus::DMA_FULL);
}

/// DMEM/IMEM -> RDRAM transfer (a write to SP_WR_LEN)
pub(super) fn dma_to_rdram(rsp: &mut Rsp, rdram: &mut Rdram, len_raw: u32) {
    rsp.io.len_raw = len_raw;
    promote_shadow(rsp);
    rsp.status.insert(RspStatus::DMA_BUSY);

    let row = rsp.io.length() + 1;
    let rows = rsp.io.count() + 1;
    let skip = rsp.io.skip();
    let imem = rsp.io.mem_addr & MEM_ADDR_IMEM != 0;

    let mut mem = rsp.io.mem_addr & 0xFFF;
    let mut dram = rsp.io.dram_addr & 0xFF_FFFF;
    for _ in 0..rows {
        for i in 0..row {
            let offset = ((mem + i) & 0xFFF) as usize;
            let byte = if imem { rsp.imem[offset] } else { rsp.dmem[offset] };
            rdram.write8(dram + i, byte);
        }
        mem = (mem + row) & 0xFFF;
        dram += row + skip;
    }
    rsp.io.mem_addr = (rsp.io.mem_addr & MEM_ADDR_IMEM) | mem;
    rsp.io.dram_addr = dram;

    trace!(
        "SP DMA: {} bytes {} -> RDRAM",
        row * rows,
        if imem { "IMEM" } else { "DMEM" }
    );
    rsp.status.remove(RspStatus::DMA_BUSY);
    rsp.status.remove(RspStatus::DMA_FULL);
}

/// Queued addresses become the active pair when the transfer fires
fn promote_shadow(rsp: &mut Rsp) {
    rsp.io.mem_addr = rsp.io.shadow_mem_addr;
    rsp.io.dram_addr = rsp.io.shadow_dram_addr & 0xFF_FFFF;
}
