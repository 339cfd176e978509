//! MIPS disassembler
//!
//! Renders one instruction word as text for trace logging and the headless
//! runner's fault dumps. Register names use the o32 conventions.

use crate::cpu::decode::{decode, FpuFmt, Instr};
use crate::cpu::instruction::Instruction;

/// o32 register names
const REG_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

fn r(index: usize) -> &'static str {
    REG_NAMES[index & 31]
}

/// Disassemble the word at `pc`
pub fn disassemble(pc: u32, word: u32) -> String {
    let i = Instruction(word);
    let kind = decode(i);

    let two_reg_imm = |name: &str| {
        format!("{} {}, {}, 0x{:04X}", name, r(i.rt()), r(i.rs()), i.immediate())
    };
    let mem = |name: &str| {
        format!("{} {}, {}({})", name, r(i.rt()), i.simmediate(), r(i.base()))
    };
    let three_reg = |name: &str| {
        format!("{} {}, {}, {}", name, r(i.rd()), r(i.rs()), r(i.rt()))
    };
    let shift = |name: &str| {
        format!("{} {}, {}, {}", name, r(i.rd()), r(i.rt()), i.sa())
    };
    let branch_target = pc.wrapping_add(4).wrapping_add(((i.simmediate() as i32) << 2) as u32);
    let branch2 = |name: &str| {
        format!("{} {}, {}, 0x{:08X}", name, r(i.rs()), r(i.rt()), branch_target)
    };
    let branch1 = |name: &str| format!("{} {}, 0x{:08X}", name, r(i.rs()), branch_target);
    let jump_target = (pc.wrapping_add(4) & 0xF000_0000) | (i.target() << 2);

    match kind {
        Instr::Nop => "nop".to_string(),
        Instr::Lui => format!("lui {}, 0x{:04X}", r(i.rt()), i.immediate()),
        Instr::Addi => two_reg_imm("addi"),
        Instr::Addiu => two_reg_imm("addiu"),
        Instr::Daddi => two_reg_imm("daddi"),
        Instr::Daddiu => two_reg_imm("daddiu"),
        Instr::Slti => two_reg_imm("slti"),
        Instr::Sltiu => two_reg_imm("sltiu"),
        Instr::Andi => two_reg_imm("andi"),
        Instr::Ori => two_reg_imm("ori"),
        Instr::Xori => two_reg_imm("xori"),

        Instr::Lb => mem("lb"),
        Instr::Lbu => mem("lbu"),
        Instr::Lh => mem("lh"),
        Instr::Lhu => mem("lhu"),
        Instr::Lw => mem("lw"),
        Instr::Lwu => mem("lwu"),
        Instr::Ld => mem("ld"),
        Instr::Lwl => mem("lwl"),
        Instr::Lwr => mem("lwr"),
        Instr::Ldl => mem("ldl"),
        Instr::Ldr => mem("ldr"),
        Instr::Ll => mem("ll"),
        Instr::Lld => mem("lld"),
        Instr::Sb => mem("sb"),
        Instr::Sh => mem("sh"),
        Instr::Sw => mem("sw"),
        Instr::Sd => mem("sd"),
        Instr::Swl => mem("swl"),
        Instr::Swr => mem("swr"),
        Instr::Sdl => mem("sdl"),
        Instr::Sdr => mem("sdr"),
        Instr::Sc => mem("sc"),
        Instr::Scd => mem("scd"),
        Instr::Lwc1 => format!("lwc1 f{}, {}({})", i.ft(), i.simmediate(), r(i.base())),
        Instr::Ldc1 => format!("ldc1 f{}, {}({})", i.ft(), i.simmediate(), r(i.base())),
        Instr::Swc1 => format!("swc1 f{}, {}({})", i.ft(), i.simmediate(), r(i.base())),
        Instr::Sdc1 => format!("sdc1 f{}, {}({})", i.ft(), i.simmediate(), r(i.base())),

        Instr::J => format!("j 0x{:08X}", jump_target),
        Instr::Jal => format!("jal 0x{:08X}", jump_target),
        Instr::Jr => format!("jr {}", r(i.rs())),
        Instr::Jalr => format!("jalr {}, {}", r(i.rd()), r(i.rs())),
        Instr::Beq => branch2("beq"),
        Instr::Bne => branch2("bne"),
        Instr::Beql => branch2("beql"),
        Instr::Bnel => branch2("bnel"),
        Instr::Blez => branch1("blez"),
        Instr::Bgtz => branch1("bgtz"),
        Instr::Blezl => branch1("blezl"),
        Instr::Bgtzl => branch1("bgtzl"),
        Instr::Bltz => branch1("bltz"),
        Instr::Bgez => branch1("bgez"),
        Instr::Bltzl => branch1("bltzl"),
        Instr::Bgezl => branch1("bgezl"),
        Instr::Bltzal => branch1("bltzal"),
        Instr::Bgezal => branch1("bgezal"),
        Instr::Bltzall => branch1("bltzall"),
        Instr::Bgezall => branch1("bgezall"),

        Instr::Sll => shift("sll"),
        Instr::Srl => shift("srl"),
        Instr::Sra => shift("sra"),
        Instr::Dsll => shift("dsll"),
        Instr::Dsrl => shift("dsrl"),
        Instr::Dsra => shift("dsra"),
        Instr::Dsll32 => shift("dsll32"),
        Instr::Dsrl32 => shift("dsrl32"),
        Instr::Dsra32 => shift("dsra32"),
        Instr::Sllv => three_reg("sllv"),
        Instr::Srlv => three_reg("srlv"),
        Instr::Srav => three_reg("srav"),
        Instr::Dsllv => three_reg("dsllv"),
        Instr::Dsrlv => three_reg("dsrlv"),
        Instr::Dsrav => three_reg("dsrav"),
        Instr::Add => three_reg("add"),
        Instr::Addu => three_reg("addu"),
        Instr::Sub => three_reg("sub"),
        Instr::Subu => three_reg("subu"),
        Instr::Dadd => three_reg("dadd"),
        Instr::Daddu => three_reg("daddu"),
        Instr::Dsub => three_reg("dsub"),
        Instr::Dsubu => three_reg("dsubu"),
        Instr::And => three_reg("and"),
        Instr::Or => three_reg("or"),
        Instr::Xor => three_reg("xor"),
        Instr::Nor => three_reg("nor"),
        Instr::Slt => three_reg("slt"),
        Instr::Sltu => three_reg("sltu"),

        Instr::Mfhi => format!("mfhi {}", r(i.rd())),
        Instr::Mthi => format!("mthi {}", r(i.rs())),
        Instr::Mflo => format!("mflo {}", r(i.rd())),
        Instr::Mtlo => format!("mtlo {}", r(i.rs())),
        Instr::Mult => format!("mult {}, {}", r(i.rs()), r(i.rt())),
        Instr::Multu => format!("multu {}, {}", r(i.rs()), r(i.rt())),
        Instr::Div => format!("div {}, {}", r(i.rs()), r(i.rt())),
        Instr::Divu => format!("divu {}, {}", r(i.rs()), r(i.rt())),
        Instr::Dmult => format!("dmult {}, {}", r(i.rs()), r(i.rt())),
        Instr::Dmultu => format!("dmultu {}, {}", r(i.rs()), r(i.rt())),
        Instr::Ddiv => format!("ddiv {}, {}", r(i.rs()), r(i.rt())),
        Instr::Ddivu => format!("ddivu {}, {}", r(i.rs()), r(i.rt())),

        Instr::Syscall => "syscall".to_string(),
        Instr::Break => "break".to_string(),
        Instr::Sync => "sync".to_string(),
        Instr::Cache => format!("cache 0x{:02X}, {}({})", i.rt(), i.simmediate(), r(i.base())),

        Instr::Tge => three_reg("tge"),
        Instr::Tgeu => three_reg("tgeu"),
        Instr::Tlt => three_reg("tlt"),
        Instr::Tltu => three_reg("tltu"),
        Instr::Teq => three_reg("teq"),
        Instr::Tne => three_reg("tne"),
        Instr::Tgei => branch1("tgei"),
        Instr::Tgeiu => branch1("tgeiu"),
        Instr::Tlti => branch1("tlti"),
        Instr::Tltiu => branch1("tltiu"),
        Instr::Teqi => branch1("teqi"),
        Instr::Tnei => branch1("tnei"),

        Instr::Mfc0 => format!("mfc0 {}, cp0[{}]", r(i.rt()), i.rd()),
        Instr::Dmfc0 => format!("dmfc0 {}, cp0[{}]", r(i.rt()), i.rd()),
        Instr::Mtc0 => format!("mtc0 {}, cp0[{}]", r(i.rt()), i.rd()),
        Instr::Dmtc0 => format!("dmtc0 {}, cp0[{}]", r(i.rt()), i.rd()),
        Instr::Tlbr => "tlbr".to_string(),
        Instr::Tlbwi => "tlbwi".to_string(),
        Instr::Tlbwr => "tlbwr".to_string(),
        Instr::Tlbp => "tlbp".to_string(),
        Instr::Eret => "eret".to_string(),

        Instr::Mfc1 => format!("mfc1 {}, f{}", r(i.rt()), i.fs()),
        Instr::Dmfc1 => format!("dmfc1 {}, f{}", r(i.rt()), i.fs()),
        Instr::Mtc1 => format!("mtc1 {}, f{}", r(i.rt()), i.fs()),
        Instr::Dmtc1 => format!("dmtc1 {}, f{}", r(i.rt()), i.fs()),
        Instr::Cfc1 => format!("cfc1 {}, fcr{}", r(i.rt()), i.fs()),
        Instr::Ctc1 => format!("ctc1 {}, fcr{}", r(i.rt()), i.fs()),
        Instr::Bc1f => format!("bc1f 0x{:08X}", branch_target),
        Instr::Bc1t => format!("bc1t 0x{:08X}", branch_target),
        Instr::Bc1fl => format!("bc1fl 0x{:08X}", branch_target),
        Instr::Bc1tl => format!("bc1tl 0x{:08X}", branch_target),
        Instr::FpuOp(fmt) => {
            let fmt_name = match fmt {
                FpuFmt::S => "s",
                FpuFmt::D => "d",
                FpuFmt::W => "w",
                FpuFmt::L => "l",
            };
            format!(
                "cop1.{} funct=0x{:02X} f{}, f{}, f{}",
                fmt_name,
                i.funct(),
                i.fd(),
                i.fs(),
                i.ft()
            )
        }

        Instr::CopUnusable(unit) => format!("cop{} (unusable) 0x{:08X}", unit, word),
        Instr::Invalid => format!(".word 0x{:08X}", word),
    }
}
