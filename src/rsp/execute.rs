//! RSP instruction execution
//!
//! Scalar handlers mirror the CPU's but in 32 bits with no exceptions; the
//! vector handlers implement the accumulator, clamp and flag semantics of
//! the SU/VU pipelines. Element selection, clamping behavior and the flag
//! updates follow the public RSP documentation.
//!
//! Reference: RSP vector opcodes (https://n64brew.dev/wiki/RSP/Vector_opcodes)

use log::warn;

use super::decode::{lsv, vecop, RspInstr};
use super::vector::{
    clamp_signed, clamp_unsigned_low, reciprocal, reciprocal_sqrt, select_elem, VuReg,
};
use super::{Rsp, RspStatus};
use crate::cpu::instruction::Instruction;
use crate::memory::Rdram;
use crate::peripherals::mi::{InterruptKind, MipsInterface};
use crate::peripherals::DpCommandRegs;

/// Unsigned clamp of the accumulator's upper bits (VMULU/VMACU result)
#[inline]
fn clamp_unsigned_high(acc: i64) -> u16 {
    let v = acc >> 16;
    if v < 0 {
        0
    } else if v > 0x7FFF {
        0xFFFF
    } else {
        v as u16
    }
}

pub(super) fn execute_rsp(
    rsp: &mut Rsp,
    mi: &mut MipsInterface,
    rdram: &mut Rdram,
    dpc: &mut DpCommandRegs,
    kind: RspInstr,
    i: Instruction,
) {
    match kind {
        RspInstr::Undecoded => unreachable!("icache sentinel reached execution"),
        RspInstr::Nop => {}
        RspInstr::Invalid => {
            warn!(
                "RSP reserved instruction 0x{:08X} at pc 0x{:03X}, ignored",
                i.0, rsp.prev_pc
            );
        }

        // ---- Scalar ALU ----
        RspInstr::Lui => rsp.set_gpr(i.rt(), (i.immediate() as u32) << 16),
        RspInstr::Addi => {
            let result = rsp.gpr[i.rs()].wrapping_add(i.simmediate() as i32 as u32);
            rsp.set_gpr(i.rt(), result);
        }
        RspInstr::Slti => {
            let result = (rsp.gpr[i.rs()] as i32) < i.simmediate() as i32;
            rsp.set_gpr(i.rt(), result as u32);
        }
        RspInstr::Sltiu => {
            let result = rsp.gpr[i.rs()] < i.simmediate() as i32 as u32;
            rsp.set_gpr(i.rt(), result as u32);
        }
        RspInstr::Andi => rsp.set_gpr(i.rt(), rsp.gpr[i.rs()] & i.immediate() as u32),
        RspInstr::Ori => rsp.set_gpr(i.rt(), rsp.gpr[i.rs()] | i.immediate() as u32),
        RspInstr::Xori => rsp.set_gpr(i.rt(), rsp.gpr[i.rs()] ^ i.immediate() as u32),
        RspInstr::Sll => rsp.set_gpr(i.rd(), rsp.gpr[i.rt()] << i.sa()),
        RspInstr::Srl => rsp.set_gpr(i.rd(), rsp.gpr[i.rt()] >> i.sa()),
        RspInstr::Sra => rsp.set_gpr(i.rd(), ((rsp.gpr[i.rt()] as i32) >> i.sa()) as u32),
        RspInstr::Sllv => {
            let sa = rsp.gpr[i.rs()] & 0x1F;
            rsp.set_gpr(i.rd(), rsp.gpr[i.rt()] << sa);
        }
        RspInstr::Srlv => {
            let sa = rsp.gpr[i.rs()] & 0x1F;
            rsp.set_gpr(i.rd(), rsp.gpr[i.rt()] >> sa);
        }
        RspInstr::Srav => {
            let sa = rsp.gpr[i.rs()] & 0x1F;
            rsp.set_gpr(i.rd(), ((rsp.gpr[i.rt()] as i32) >> sa) as u32);
        }
        RspInstr::Add => {
            rsp.set_gpr(i.rd(), rsp.gpr[i.rs()].wrapping_add(rsp.gpr[i.rt()]));
        }
        RspInstr::Sub => {
            rsp.set_gpr(i.rd(), rsp.gpr[i.rs()].wrapping_sub(rsp.gpr[i.rt()]));
        }
        RspInstr::And => rsp.set_gpr(i.rd(), rsp.gpr[i.rs()] & rsp.gpr[i.rt()]),
        RspInstr::Or => rsp.set_gpr(i.rd(), rsp.gpr[i.rs()] | rsp.gpr[i.rt()]),
        RspInstr::Xor => rsp.set_gpr(i.rd(), rsp.gpr[i.rs()] ^ rsp.gpr[i.rt()]),
        RspInstr::Nor => rsp.set_gpr(i.rd(), !(rsp.gpr[i.rs()] | rsp.gpr[i.rt()])),
        RspInstr::Slt => {
            let result = (rsp.gpr[i.rs()] as i32) < rsp.gpr[i.rt()] as i32;
            rsp.set_gpr(i.rd(), result as u32);
        }
        RspInstr::Sltu => {
            let result = rsp.gpr[i.rs()] < rsp.gpr[i.rt()];
            rsp.set_gpr(i.rd(), result as u32);
        }

        // ---- Branches (one delay slot via the PC pipeline) ----
        RspInstr::J => {
            rsp.next_pc = ((i.target() << 2) & 0xFFF) as u16;
        }
        RspInstr::Jal => {
            rsp.set_gpr(31, (rsp.pc.wrapping_add(4) & 0xFFF) as u32);
            rsp.next_pc = ((i.target() << 2) & 0xFFF) as u16;
        }
        RspInstr::Jr => {
            rsp.next_pc = (rsp.gpr[i.rs()] & 0xFFC) as u16;
        }
        RspInstr::Jalr => {
            let target = rsp.gpr[i.rs()];
            rsp.set_gpr(i.rd(), (rsp.pc.wrapping_add(4) & 0xFFF) as u32);
            rsp.next_pc = (target & 0xFFC) as u16;
        }
        RspInstr::Beq => branch(rsp, i, rsp.gpr[i.rs()] == rsp.gpr[i.rt()]),
        RspInstr::Bne => branch(rsp, i, rsp.gpr[i.rs()] != rsp.gpr[i.rt()]),
        RspInstr::Blez => branch(rsp, i, rsp.gpr[i.rs()] as i32 <= 0),
        RspInstr::Bgtz => branch(rsp, i, rsp.gpr[i.rs()] as i32 > 0),
        RspInstr::Bltz => branch(rsp, i, (rsp.gpr[i.rs()] as i32) < 0),
        RspInstr::Bgez => branch(rsp, i, rsp.gpr[i.rs()] as i32 >= 0),
        RspInstr::Bltzal => {
            rsp.set_gpr(31, (rsp.pc.wrapping_add(4) & 0xFFF) as u32);
            branch(rsp, i, (rsp.gpr[i.rs()] as i32) < 0);
        }
        RspInstr::Bgezal => {
            rsp.set_gpr(31, (rsp.pc.wrapping_add(4) & 0xFFF) as u32);
            branch(rsp, i, rsp.gpr[i.rs()] as i32 >= 0);
        }

        // ---- Scalar memory ----
        RspInstr::Lb => {
            let value = rsp.dmem_read8(ea(rsp, i)) as i8 as i32 as u32;
            rsp.set_gpr(i.rt(), value);
        }
        RspInstr::Lbu => {
            let value = rsp.dmem_read8(ea(rsp, i)) as u32;
            rsp.set_gpr(i.rt(), value);
        }
        RspInstr::Lh => {
            let value = rsp.dmem_read16(ea(rsp, i)) as i16 as i32 as u32;
            rsp.set_gpr(i.rt(), value);
        }
        RspInstr::Lhu => {
            let value = rsp.dmem_read16(ea(rsp, i)) as u32;
            rsp.set_gpr(i.rt(), value);
        }
        RspInstr::Lw => {
            let value = rsp.dmem_read32(ea(rsp, i));
            rsp.set_gpr(i.rt(), value);
        }
        RspInstr::Sb => rsp.dmem_write8(ea(rsp, i), rsp.gpr[i.rt()] as u8),
        RspInstr::Sh => rsp.dmem_write16(ea(rsp, i), rsp.gpr[i.rt()] as u16),
        RspInstr::Sw => rsp.dmem_write32(ea(rsp, i), rsp.gpr[i.rt()]),

        RspInstr::Break => {
            rsp.status.insert(RspStatus::BROKE | RspStatus::HALT);
            if rsp.status.contains(RspStatus::INTR_ON_BREAK) {
                mi.raise(InterruptKind::Sp);
            }
        }

        // ---- System control (SP and DPC registers) ----
        RspInstr::Mfc0 => {
            let value = match i.rd() {
                0..=7 => rsp.read_reg((i.rd() as u32) * 4),
                _ => dpc.read32(((i.rd() as u32) - 8) * 4),
            };
            rsp.set_gpr(i.rt(), value);
        }
        RspInstr::Mtc0 => {
            let value = rsp.gpr[i.rt()];
            match i.rd() {
                0..=7 => rsp.write_reg(mi, rdram, (i.rd() as u32) * 4, value),
                _ => dpc.write32(((i.rd() as u32) - 8) * 4, value),
            }
        }

        // ---- Vector unit ----
        RspInstr::Mfc2 => {
            let reg = rsp.vu.regs[i.rd()];
            let e = i.mv_e() as usize;
            let value = ((reg.byte(e) as u16) << 8) | reg.byte(e + 1) as u16;
            rsp.set_gpr(i.rt(), value as i16 as i32 as u32);
        }
        RspInstr::Mtc2 => {
            let value = rsp.gpr[i.rt()] as u16;
            let e = i.mv_e() as usize;
            let reg = &mut rsp.vu.regs[i.rd()];
            reg.set_byte(e, (value >> 8) as u8);
            if e < 15 {
                reg.set_byte(e + 1, value as u8);
            }
        }
        RspInstr::Cfc2 => {
            let value = match i.rd() & 3 {
                0 => rsp.vu.vco.packed(),
                1 => rsp.vu.vcc.packed(),
                _ => rsp.vu.vce as u16,
            };
            rsp.set_gpr(i.rt(), value as i16 as i32 as u32);
        }
        RspInstr::Ctc2 => {
            let value = rsp.gpr[i.rt()] as u16;
            match i.rd() & 3 {
                0 => rsp.vu.vco.set_packed(value),
                1 => rsp.vu.vcc.set_packed(value),
                _ => rsp.vu.vce = value as u8,
            }
        }

        RspInstr::LoadVec(sub) => load_vec(rsp, sub, i),
        RspInstr::StoreVec(sub) => store_vec(rsp, sub, i),
        RspInstr::VecOp(funct) => vec_op(rsp, funct, i),
    }
}

/// Effective DMEM address of a scalar load/store
#[inline]
fn ea(rsp: &Rsp, i: Instruction) -> u32 {
    rsp.gpr[i.base()].wrapping_add(i.simmediate() as i32 as u32)
}

/// Conditional branch relative to the delay slot
#[inline]
fn branch(rsp: &mut Rsp, i: Instruction, taken: bool) {
    if taken {
        let target = (rsp.pc as i32).wrapping_add((i.simmediate() as i32) << 2);
        rsp.next_pc = (target as u16) & 0xFFF;
    }
}

// ========== Vector loads/stores ==========

fn load_vec(rsp: &mut Rsp, sub: u32, i: Instruction) {
    let e = i.ls_e() as usize;
    let vt = i.vt();
    match sub {
        lsv::BYTE => {
            let addr = vec_ea(rsp, i, 1);
            let byte = rsp.dmem_read8(addr);
            rsp.vu.regs[vt].set_byte(e, byte);
        }
        lsv::SHORT => load_span(rsp, i, vt, e, 2),
        lsv::LONG => load_span(rsp, i, vt, e, 4),
        lsv::DOUBLE => load_span(rsp, i, vt, e, 8),
        lsv::QUAD => {
            // From the effective address to the end of its 16-byte block
            let addr = vec_ea(rsp, i, 16);
            let count = 16 - (addr & 15) as usize;
            for n in 0..count.min(16 - e) {
                let byte = rsp.dmem_read8(addr + n as u32);
                rsp.vu.regs[vt].set_byte(e + n, byte);
            }
        }
        lsv::REST => {
            // From the start of the block up to the effective address
            let addr = vec_ea(rsp, i, 16);
            let offset = (addr & 15) as usize;
            let base = addr & !15;
            for n in 0..offset {
                let byte = rsp.dmem_read8(base + n as u32);
                rsp.vu.regs[vt].set_byte(16 - offset + n, byte);
            }
        }
        other => {
            warn!("Unhandled RSP vector load sub-opcode 0x{:02X}", other);
        }
    }
}

fn store_vec(rsp: &mut Rsp, sub: u32, i: Instruction) {
    let e = i.ls_e() as usize;
    let vt = i.vt();
    match sub {
        lsv::BYTE => {
            let addr = vec_ea(rsp, i, 1);
            rsp.dmem_write8(addr, rsp.vu.regs[vt].byte(e));
        }
        lsv::SHORT => store_span(rsp, i, vt, e, 2),
        lsv::LONG => store_span(rsp, i, vt, e, 4),
        lsv::DOUBLE => store_span(rsp, i, vt, e, 8),
        lsv::QUAD => {
            let addr = vec_ea(rsp, i, 16);
            let count = 16 - (addr & 15) as usize;
            for n in 0..count {
                let byte = rsp.vu.regs[vt].byte((e + n) & 15);
                rsp.dmem_write8(addr + n as u32, byte);
            }
        }
        lsv::REST => {
            let addr = vec_ea(rsp, i, 16);
            let offset = (addr & 15) as usize;
            let base = addr & !15;
            for n in 0..offset {
                let byte = rsp.vu.regs[vt].byte((16 - offset + n) & 15);
                rsp.dmem_write8(base + n as u32, byte);
            }
        }
        other => {
            warn!("Unhandled RSP vector store sub-opcode 0x{:02X}", other);
        }
    }
}

/// Effective address of a vector load/store: offset scales by access size
#[inline]
fn vec_ea(rsp: &Rsp, i: Instruction, scale: i32) -> u32 {
    rsp.gpr[i.base()].wrapping_add((i.ls_offset() * scale) as u32)
}

fn load_span(rsp: &mut Rsp, i: Instruction, vt: usize, e: usize, size: usize) {
    let addr = vec_ea(rsp, i, size as i32);
    for n in 0..size.min(16 - e) {
        let byte = rsp.dmem_read8(addr + n as u32);
        rsp.vu.regs[vt].set_byte(e + n, byte);
    }
}

fn store_span(rsp: &mut Rsp, i: Instruction, vt: usize, e: usize, size: usize) {
    let addr = vec_ea(rsp, i, size as i32);
    for n in 0..size {
        rsp.dmem_write8(addr + n as u32, rsp.vu.regs[vt].byte((e + n) & 15));
    }
}

// ========== Vector ops ==========

fn vec_op(rsp: &mut Rsp, funct: u32, i: Instruction) {
    let e = i.vec_e();
    let vs = rsp.vu.regs[i.vs()];
    let vt = rsp.vu.regs[i.vt()];
    let mut result = VuReg::new();

    match funct {
        // ---- Multiply family ----
        vecop::VMULF | vecop::VMULU => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i64;
                let b = select_elem(&vt, e, lane) as i16 as i64;
                let product = a * b * 2 + 0x8000;
                rsp.vu.acc.set(lane, product);
                let clamped = if funct == vecop::VMULF {
                    clamp_signed(rsp.vu.acc.get(lane))
                } else {
                    clamp_unsigned_high(rsp.vu.acc.get(lane))
                };
                result.set_elem(lane, clamped);
            }
        }
        vecop::VMACF | vecop::VMACU => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i64;
                let b = select_elem(&vt, e, lane) as i16 as i64;
                rsp.vu.acc.add(lane, a * b * 2);
                let clamped = if funct == vecop::VMACF {
                    clamp_signed(rsp.vu.acc.get(lane))
                } else {
                    clamp_unsigned_high(rsp.vu.acc.get(lane))
                };
                result.set_elem(lane, clamped);
            }
        }
        vecop::VMUDL => {
            for lane in 0..8 {
                let a = vs.elem(lane) as u64;
                let b = select_elem(&vt, e, lane) as u64;
                rsp.vu.acc.set(lane, ((a * b) >> 16) as i64);
                result.set_elem(lane, clamp_unsigned_low(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMUDM => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i64;
                let b = select_elem(&vt, e, lane) as i64; // unsigned
                rsp.vu.acc.set(lane, a * b);
                result.set_elem(lane, clamp_signed(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMUDN => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i64; // unsigned
                let b = select_elem(&vt, e, lane) as i16 as i64;
                rsp.vu.acc.set(lane, a * b);
                result.set_elem(lane, clamp_unsigned_low(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMUDH => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i64;
                let b = select_elem(&vt, e, lane) as i16 as i64;
                rsp.vu.acc.set(lane, (a * b) << 16);
                result.set_elem(lane, clamp_signed(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMADL => {
            for lane in 0..8 {
                let a = vs.elem(lane) as u64;
                let b = select_elem(&vt, e, lane) as u64;
                rsp.vu.acc.add(lane, ((a * b) >> 16) as i64);
                result.set_elem(lane, clamp_unsigned_low(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMADM => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i64;
                let b = select_elem(&vt, e, lane) as i64;
                rsp.vu.acc.add(lane, a * b);
                result.set_elem(lane, clamp_signed(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMADN => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i64;
                let b = select_elem(&vt, e, lane) as i16 as i64;
                rsp.vu.acc.add(lane, a * b);
                result.set_elem(lane, clamp_unsigned_low(rsp.vu.acc.get(lane)));
            }
        }
        vecop::VMADH => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i64;
                let b = select_elem(&vt, e, lane) as i16 as i64;
                rsp.vu.acc.add(lane, (a * b) << 16);
                result.set_elem(lane, clamp_signed(rsp.vu.acc.get(lane)));
            }
        }

        // ---- Add/subtract family ----
        vecop::VADD => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i32;
                let b = select_elem(&vt, e, lane) as i16 as i32;
                let carry = rsp.vu.vco.lo_bit(lane) as i32;
                let sum = a + b + carry;
                rsp.vu.acc.l[lane] = sum as u16;
                result.set_elem(lane, saturate16(sum));
            }
            rsp.vu.vco.clear();
        }
        vecop::VSUB => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16 as i32;
                let b = select_elem(&vt, e, lane) as i16 as i32;
                let carry = rsp.vu.vco.lo_bit(lane) as i32;
                let diff = a - b - carry;
                rsp.vu.acc.l[lane] = diff as u16;
                result.set_elem(lane, saturate16(diff));
            }
            rsp.vu.vco.clear();
        }
        vecop::VABS => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16;
                let b = select_elem(&vt, e, lane) as i16;
                let r = if a < 0 {
                    if b == i16::MIN {
                        0x7FFF
                    } else {
                        (-b) as u16
                    }
                } else if a > 0 {
                    b as u16
                } else {
                    0
                };
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
        }
        vecop::VADDC => {
            for lane in 0..8 {
                let a = vs.elem(lane) as u32;
                let b = select_elem(&vt, e, lane) as u32;
                let sum = a + b;
                rsp.vu.acc.l[lane] = sum as u16;
                result.set_elem(lane, sum as u16);
                rsp.vu.vco.set_lo(lane, sum > 0xFFFF);
                rsp.vu.vco.set_hi(lane, false);
            }
        }
        vecop::VSUBC => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i32;
                let b = select_elem(&vt, e, lane) as i32;
                let diff = a - b;
                rsp.vu.acc.l[lane] = diff as u16;
                result.set_elem(lane, diff as u16);
                rsp.vu.vco.set_lo(lane, diff < 0);
                rsp.vu.vco.set_hi(lane, diff != 0);
            }
        }
        vecop::VSAR => {
            // Read back one accumulator plane: e = 8 high, 9 mid, 10 low
            for lane in 0..8 {
                let value = match e {
                    8 => rsp.vu.acc.h[lane],
                    9 => rsp.vu.acc.m[lane],
                    10 => rsp.vu.acc.l[lane],
                    _ => 0,
                };
                result.set_elem(lane, value);
            }
        }

        // ---- Logical family ----
        vecop::VAND | vecop::VNAND | vecop::VOR | vecop::VNOR | vecop::VXOR | vecop::VNXOR => {
            for lane in 0..8 {
                let a = vs.elem(lane);
                let b = select_elem(&vt, e, lane);
                let r = match funct {
                    vecop::VAND => a & b,
                    vecop::VNAND => !(a & b),
                    vecop::VOR => a | b,
                    vecop::VNOR => !(a | b),
                    vecop::VXOR => a ^ b,
                    _ => !(a ^ b),
                };
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
        }

        // ---- Compare family ----
        vecop::VLT => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16;
                let b = select_elem(&vt, e, lane) as i16;
                let on_equal =
                    a == b && rsp.vu.vco.lo_bit(lane) && rsp.vu.vco.hi_bit(lane);
                let cond = a < b || on_equal;
                rsp.vu.vcc.set_lo(lane, cond);
                rsp.vu.vcc.set_hi(lane, false);
                let r = if cond { a as u16 } else { b as u16 };
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
            rsp.vu.vco.clear();
        }
        vecop::VEQ => {
            for lane in 0..8 {
                let a = vs.elem(lane);
                let b = select_elem(&vt, e, lane);
                let cond = a == b && !rsp.vu.vco.hi_bit(lane);
                rsp.vu.vcc.set_lo(lane, cond);
                rsp.vu.vcc.set_hi(lane, false);
                rsp.vu.acc.l[lane] = b;
                result.set_elem(lane, b);
            }
            rsp.vu.vco.clear();
        }
        vecop::VNE => {
            for lane in 0..8 {
                let a = vs.elem(lane);
                let b = select_elem(&vt, e, lane);
                let cond = a != b || rsp.vu.vco.hi_bit(lane);
                rsp.vu.vcc.set_lo(lane, cond);
                rsp.vu.vcc.set_hi(lane, false);
                rsp.vu.acc.l[lane] = a;
                result.set_elem(lane, a);
            }
            rsp.vu.vco.clear();
        }
        vecop::VGE => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16;
                let b = select_elem(&vt, e, lane) as i16;
                let on_equal =
                    a == b && !(rsp.vu.vco.lo_bit(lane) && rsp.vu.vco.hi_bit(lane));
                let cond = a > b || on_equal;
                rsp.vu.vcc.set_lo(lane, cond);
                rsp.vu.vcc.set_hi(lane, false);
                let r = if cond { a as u16 } else { b as u16 };
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
            rsp.vu.vco.clear();
        }
        vecop::VCL => {
            for lane in 0..8 {
                let s = vs.elem(lane);
                let t = select_elem(&vt, e, lane);
                let sign = rsp.vu.vco.lo_bit(lane);
                let ne = rsp.vu.vco.hi_bit(lane);
                let r = if sign {
                    if !ne {
                        let sum = s as u32 + t as u32;
                        let carry = sum > 0xFFFF;
                        let sum16 = sum as u16;
                        let le = if rsp.vu.vce & (1 << lane) != 0 {
                            sum16 == 0 || !carry
                        } else {
                            sum16 == 0 && !carry
                        };
                        rsp.vu.vcc.set_lo(lane, le);
                    }
                    if rsp.vu.vcc.lo_bit(lane) {
                        (t as i16).wrapping_neg() as u16
                    } else {
                        s
                    }
                } else {
                    if !ne {
                        rsp.vu.vcc.set_hi(lane, s >= t);
                    }
                    if rsp.vu.vcc.hi_bit(lane) {
                        t
                    } else {
                        s
                    }
                };
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
            rsp.vu.vco.clear();
            rsp.vu.vce = 0;
        }
        vecop::VCH => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16;
                let b = select_elem(&vt, e, lane) as i16;
                let sign = (a ^ b) < 0;
                let r;
                if sign {
                    let sum = (a as i32) + (b as i32);
                    let le = sum <= 0;
                    let ge = b < 0;
                    let vce_bit = sum == -1;
                    rsp.vu.vcc.set_lo(lane, le);
                    rsp.vu.vcc.set_hi(lane, ge);
                    rsp.vu.vco.set_lo(lane, true);
                    rsp.vu.vco.set_hi(lane, sum != 0 && !vce_bit);
                    if vce_bit {
                        rsp.vu.vce |= 1 << lane;
                    } else {
                        rsp.vu.vce &= !(1 << lane);
                    }
                    r = if le { b.wrapping_neg() as u16 } else { a as u16 };
                } else {
                    let diff = (a as i32) - (b as i32);
                    let le = a < 0;
                    let ge = diff >= 0;
                    rsp.vu.vcc.set_lo(lane, le);
                    rsp.vu.vcc.set_hi(lane, ge);
                    rsp.vu.vco.set_lo(lane, false);
                    rsp.vu.vco.set_hi(lane, diff != 0);
                    rsp.vu.vce &= !(1 << lane);
                    r = if ge { b as u16 } else { a as u16 };
                }
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
        }
        vecop::VCR => {
            for lane in 0..8 {
                let a = vs.elem(lane) as i16;
                let b = select_elem(&vt, e, lane) as i16;
                let r;
                if (a ^ b) < 0 {
                    let ge = b < 0;
                    let le = (a as i32) + (b as i32) < 0;
                    rsp.vu.vcc.set_lo(lane, le);
                    rsp.vu.vcc.set_hi(lane, ge);
                    r = if le { !b as u16 } else { a as u16 };
                } else {
                    let le = b < 0;
                    let ge = (a as i32) - (b as i32) >= 0;
                    rsp.vu.vcc.set_lo(lane, le);
                    rsp.vu.vcc.set_hi(lane, ge);
                    r = if ge { b as u16 } else { a as u16 };
                }
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
            rsp.vu.vco.clear();
            rsp.vu.vce = 0;
        }
        vecop::VMRG => {
            for lane in 0..8 {
                let a = vs.elem(lane);
                let b = select_elem(&vt, e, lane);
                let r = if rsp.vu.vcc.lo_bit(lane) { a } else { b };
                rsp.vu.acc.l[lane] = r;
                result.set_elem(lane, r);
            }
            rsp.vu.vco.clear();
        }

        // ---- Divide family and element moves ----
        vecop::VRCP | vecop::VRCPL | vecop::VRCPH | vecop::VRSQ | vecop::VRSQL
        | vecop::VRSQH | vecop::VMOV | vecop::VNOP => {
            divide_family(rsp, funct, i, &vt, e, &mut result);
        }

        other => {
            warn!("Unhandled RSP vector op funct 0x{:02X}, ignored", other);
            return;
        }
    }

    if funct != vecop::VNOP {
        rsp.vu.regs[i.vd()] = result;
    }
}

/// VRCP/VRSQ reciprocal pipeline, VMOV and VNOP. The destination writes a
/// single element (the de field rides in the vs slot); the accumulator's
/// low plane captures the selected operand lanes.
fn divide_family(
    rsp: &mut Rsp,
    funct: u32,
    i: Instruction,
    vt: &VuReg,
    e: u32,
    result: &mut VuReg,
) {
    // These ops write one element of vd and leave the rest intact
    *result = rsp.vu.regs[i.vd()];
    let de = i.vs() & 7;
    let selected = select_elem(vt, e, (e & 7) as usize);

    for lane in 0..8 {
        rsp.vu.acc.l[lane] = select_elem(vt, e, lane);
    }

    match funct {
        vecop::VRCP | vecop::VRSQ => {
            let input = selected as i16 as i32;
            rsp.vu.divout = if funct == vecop::VRCP {
                reciprocal(input)
            } else {
                reciprocal_sqrt(input)
            };
            rsp.vu.divin_loaded = false;
            result.set_elem(de, rsp.vu.divout as u16);
        }
        vecop::VRCPL | vecop::VRSQL => {
            let input = if rsp.vu.divin_loaded {
                ((rsp.vu.divin as i32) << 16) | selected as i32
            } else {
                selected as i16 as i32
            };
            rsp.vu.divout = if funct == vecop::VRCPL {
                reciprocal(input)
            } else {
                reciprocal_sqrt(input)
            };
            rsp.vu.divin_loaded = false;
            result.set_elem(de, rsp.vu.divout as u16);
        }
        vecop::VRCPH | vecop::VRSQH => {
            result.set_elem(de, (rsp.vu.divout >> 16) as u16);
            rsp.vu.divin = selected as i16;
            rsp.vu.divin_loaded = true;
        }
        vecop::VMOV => {
            result.set_elem(de, selected);
        }
        _ => {} // VNOP
    }
}

/// Saturate a 17-bit sum/difference to signed 16 bits
#[inline]
fn saturate16(value: i32) -> u16 {
    if value > 32767 {
        0x7FFF
    } else if value < -32768 {
        0x8000
    } else {
        value as u16
    }
}
