//! VR4300 instruction decoder
//!
//! Decoding partitions on the 6-bit primary opcode, then on the secondary
//! field the encoding demands: the SPECIAL funct field, the REGIMM rt
//! field, or - for the coprocessor opcodes - a mask-and-match over the full
//! word (MTC0 is `010000 00100 ..... ........ 00000000000`). An encoding
//! that matches nothing decodes to `Invalid` and raises a reserved
//! instruction exception at execution; genuinely reserved opcode slots are
//! never an emulator abort.
//!
//! Reference: VR4300 User's Manual, chapter 1 (CPU instruction set) and
//! chapter 7 (FPU instruction set)

use super::instruction::Instruction;

/// Primary opcodes
mod op {
    pub const SPECIAL: u32 = 0x00;
    pub const REGIMM: u32 = 0x01;
    pub const J: u32 = 0x02;
    pub const JAL: u32 = 0x03;
    pub const BEQ: u32 = 0x04;
    pub const BNE: u32 = 0x05;
    pub const BLEZ: u32 = 0x06;
    pub const BGTZ: u32 = 0x07;
    pub const ADDI: u32 = 0x08;
    pub const ADDIU: u32 = 0x09;
    pub const SLTI: u32 = 0x0A;
    pub const SLTIU: u32 = 0x0B;
    pub const ANDI: u32 = 0x0C;
    pub const ORI: u32 = 0x0D;
    pub const XORI: u32 = 0x0E;
    pub const LUI: u32 = 0x0F;
    pub const COP0: u32 = 0x10;
    pub const COP1: u32 = 0x11;
    pub const COP2: u32 = 0x12;
    pub const COP3: u32 = 0x13;
    pub const BEQL: u32 = 0x14;
    pub const BNEL: u32 = 0x15;
    pub const BLEZL: u32 = 0x16;
    pub const BGTZL: u32 = 0x17;
    pub const DADDI: u32 = 0x18;
    pub const DADDIU: u32 = 0x19;
    pub const LDL: u32 = 0x1A;
    pub const LDR: u32 = 0x1B;
    pub const LB: u32 = 0x20;
    pub const LH: u32 = 0x21;
    pub const LWL: u32 = 0x22;
    pub const LW: u32 = 0x23;
    pub const LBU: u32 = 0x24;
    pub const LHU: u32 = 0x25;
    pub const LWR: u32 = 0x26;
    pub const LWU: u32 = 0x27;
    pub const SB: u32 = 0x28;
    pub const SH: u32 = 0x29;
    pub const SWL: u32 = 0x2A;
    pub const SW: u32 = 0x2B;
    pub const SDL: u32 = 0x2C;
    pub const SDR: u32 = 0x2D;
    pub const SWR: u32 = 0x2E;
    pub const CACHE: u32 = 0x2F;
    pub const LL: u32 = 0x30;
    pub const LWC1: u32 = 0x31;
    pub const LLD: u32 = 0x34;
    pub const LDC1: u32 = 0x35;
    pub const LD: u32 = 0x37;
    pub const SC: u32 = 0x38;
    pub const SWC1: u32 = 0x39;
    pub const SCD: u32 = 0x3C;
    pub const SDC1: u32 = 0x3D;
    pub const SD: u32 = 0x3F;
}

/// SPECIAL funct codes
mod funct {
    pub const SLL: u32 = 0x00;
    pub const SRL: u32 = 0x02;
    pub const SRA: u32 = 0x03;
    pub const SLLV: u32 = 0x04;
    pub const SRLV: u32 = 0x06;
    pub const SRAV: u32 = 0x07;
    pub const JR: u32 = 0x08;
    pub const JALR: u32 = 0x09;
    pub const SYSCALL: u32 = 0x0C;
    pub const BREAK: u32 = 0x0D;
    pub const SYNC: u32 = 0x0F;
    pub const MFHI: u32 = 0x10;
    pub const MTHI: u32 = 0x11;
    pub const MFLO: u32 = 0x12;
    pub const MTLO: u32 = 0x13;
    pub const DSLLV: u32 = 0x14;
    pub const DSRLV: u32 = 0x16;
    pub const DSRAV: u32 = 0x17;
    pub const MULT: u32 = 0x18;
    pub const MULTU: u32 = 0x19;
    pub const DIV: u32 = 0x1A;
    pub const DIVU: u32 = 0x1B;
    pub const DMULT: u32 = 0x1C;
    pub const DMULTU: u32 = 0x1D;
    pub const DDIV: u32 = 0x1E;
    pub const DDIVU: u32 = 0x1F;
    pub const ADD: u32 = 0x20;
    pub const ADDU: u32 = 0x21;
    pub const SUB: u32 = 0x22;
    pub const SUBU: u32 = 0x23;
    pub const AND: u32 = 0x24;
    pub const OR: u32 = 0x25;
    pub const XOR: u32 = 0x26;
    pub const NOR: u32 = 0x27;
    pub const SLT: u32 = 0x2A;
    pub const SLTU: u32 = 0x2B;
    pub const DADD: u32 = 0x2C;
    pub const DADDU: u32 = 0x2D;
    pub const DSUB: u32 = 0x2E;
    pub const DSUBU: u32 = 0x2F;
    pub const TGE: u32 = 0x30;
    pub const TGEU: u32 = 0x31;
    pub const TLT: u32 = 0x32;
    pub const TLTU: u32 = 0x33;
    pub const TEQ: u32 = 0x34;
    pub const TNE: u32 = 0x36;
    pub const DSLL: u32 = 0x38;
    pub const DSRL: u32 = 0x3A;
    pub const DSRA: u32 = 0x3B;
    pub const DSLL32: u32 = 0x3C;
    pub const DSRL32: u32 = 0x3E;
    pub const DSRA32: u32 = 0x3F;
}

/// REGIMM rt codes
mod regimm {
    pub const BLTZ: u32 = 0x00;
    pub const BGEZ: u32 = 0x01;
    pub const BLTZL: u32 = 0x02;
    pub const BGEZL: u32 = 0x03;
    pub const TGEI: u32 = 0x08;
    pub const TGEIU: u32 = 0x09;
    pub const TLTI: u32 = 0x0A;
    pub const TLTIU: u32 = 0x0B;
    pub const TEQI: u32 = 0x0C;
    pub const TNEI: u32 = 0x0E;
    pub const BLTZAL: u32 = 0x10;
    pub const BGEZAL: u32 = 0x11;
    pub const BLTZALL: u32 = 0x12;
    pub const BGEZALL: u32 = 0x13;
}

// Coprocessor reg-move encodings, matched over the full word
const MFC0_MASK: u32 = 0xFFE0_07FF;
const MFC0_VALUE: u32 = 0x4000_0000;
const DMFC0_VALUE: u32 = 0x4020_0000;
const MTC0_VALUE: u32 = 0x4080_0000;
const DMTC0_VALUE: u32 = 0x40A0_0000;

const COP0_CO_MASK: u32 = 0xFE00_003F;
const TLBR_VALUE: u32 = 0x4200_0001;
const TLBWI_VALUE: u32 = 0x4200_0002;
const TLBWR_VALUE: u32 = 0x4200_0006;
const TLBP_VALUE: u32 = 0x4200_0008;
const ERET_VALUE: u32 = 0x4200_0018;

/// CP1 rs sub-codes
mod cop1_rs {
    pub const MF: u32 = 0x00;
    pub const DMF: u32 = 0x01;
    pub const CF: u32 = 0x02;
    pub const MT: u32 = 0x04;
    pub const DMT: u32 = 0x05;
    pub const CT: u32 = 0x06;
    pub const BC: u32 = 0x08;
    pub const FMT_S: u32 = 0x10;
    pub const FMT_D: u32 = 0x11;
    pub const FMT_W: u32 = 0x14;
    pub const FMT_L: u32 = 0x15;
}

/// FPU operand format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuFmt {
    S,
    D,
    W,
    L,
}

/// Decoded instruction tag. Handlers dispatch on this; the raw word still
/// rides along for field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Nop,

    // Immediate ALU
    Lui,
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Daddi,
    Daddiu,

    // Loads
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwu,
    Ld,
    Lwl,
    Lwr,
    Ldl,
    Ldr,
    Ll,
    Lld,

    // Stores
    Sb,
    Sh,
    Sw,
    Sd,
    Swl,
    Swr,
    Sdl,
    Sdr,
    Sc,
    Scd,

    // Branches and jumps
    J,
    Jal,
    Beq,
    Bne,
    Blez,
    Bgtz,
    Beql,
    Bnel,
    Blezl,
    Bgtzl,
    Bltz,
    Bgez,
    Bltzl,
    Bgezl,
    Bltzal,
    Bgezal,
    Bltzall,
    Bgezall,

    // Misc
    Cache,
    Sync,

    // SPECIAL register ALU
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Jr,
    Jalr,
    Syscall,
    Break,
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
    Dsllv,
    Dsrlv,
    Dsrav,
    Mult,
    Multu,
    Div,
    Divu,
    Dmult,
    Dmultu,
    Ddiv,
    Ddivu,
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Dadd,
    Daddu,
    Dsub,
    Dsubu,
    Dsll,
    Dsrl,
    Dsra,
    Dsll32,
    Dsrl32,
    Dsra32,
    Tge,
    Tgeu,
    Tlt,
    Tltu,
    Teq,
    Tne,
    Tgei,
    Tgeiu,
    Tlti,
    Tltiu,
    Teqi,
    Tnei,

    // CP0
    Mfc0,
    Dmfc0,
    Mtc0,
    Dmtc0,
    Tlbr,
    Tlbwi,
    Tlbwr,
    Tlbp,
    Eret,

    // CP1
    Mfc1,
    Dmfc1,
    Cfc1,
    Mtc1,
    Dmtc1,
    Ctc1,
    Bc1f,
    Bc1t,
    Bc1fl,
    Bc1tl,
    Lwc1,
    Ldc1,
    Swc1,
    Sdc1,
    FpuOp(FpuFmt),

    // Coprocessor present but op targets an unusable unit
    CopUnusable(u32),

    /// Reserved encoding: raises a reserved instruction exception
    Invalid,
}

/// Decode one instruction word
pub fn decode(instr: Instruction) -> Instr {
    match instr.op() {
        op::SPECIAL => decode_special(instr),
        op::REGIMM => decode_regimm(instr),
        op::COP0 => decode_cop0(instr),
        op::COP1 => decode_cop1(instr),
        // The VR4300 has no CP2/CP3; any access raises coprocessor unusable
        op::COP2 => Instr::CopUnusable(2),
        op::COP3 => Instr::Invalid,

        op::J => Instr::J,
        op::JAL => Instr::Jal,
        op::BEQ => Instr::Beq,
        op::BNE => Instr::Bne,
        op::BLEZ => Instr::Blez,
        op::BGTZ => Instr::Bgtz,
        op::BEQL => Instr::Beql,
        op::BNEL => Instr::Bnel,
        op::BLEZL => Instr::Blezl,
        op::BGTZL => Instr::Bgtzl,

        op::ADDI => Instr::Addi,
        op::ADDIU => Instr::Addiu,
        op::SLTI => Instr::Slti,
        op::SLTIU => Instr::Sltiu,
        op::ANDI => Instr::Andi,
        op::ORI => Instr::Ori,
        op::XORI => Instr::Xori,
        op::LUI => Instr::Lui,
        op::DADDI => Instr::Daddi,
        op::DADDIU => Instr::Daddiu,

        op::LB => Instr::Lb,
        op::LBU => Instr::Lbu,
        op::LH => Instr::Lh,
        op::LHU => Instr::Lhu,
        op::LW => Instr::Lw,
        op::LWU => Instr::Lwu,
        op::LD => Instr::Ld,
        op::LWL => Instr::Lwl,
        op::LWR => Instr::Lwr,
        op::LDL => Instr::Ldl,
        op::LDR => Instr::Ldr,
        op::LL => Instr::Ll,
        op::LLD => Instr::Lld,

        op::SB => Instr::Sb,
        op::SH => Instr::Sh,
        op::SW => Instr::Sw,
        op::SD => Instr::Sd,
        op::SWL => Instr::Swl,
        op::SWR => Instr::Swr,
        op::SDL => Instr::Sdl,
        op::SDR => Instr::Sdr,
        op::SC => Instr::Sc,
        op::SCD => Instr::Scd,

        op::CACHE => Instr::Cache,
        op::LWC1 => Instr::Lwc1,
        op::LDC1 => Instr::Ldc1,
        op::SWC1 => Instr::Swc1,
        op::SDC1 => Instr::Sdc1,

        _ => Instr::Invalid,
    }
}

fn decode_special(instr: Instruction) -> Instr {
    match instr.funct() {
        // SLL r0, r0, 0 is the canonical NOP
        funct::SLL if instr.0 == 0 => Instr::Nop,
        funct::SLL => Instr::Sll,
        funct::SRL => Instr::Srl,
        funct::SRA => Instr::Sra,
        funct::SLLV => Instr::Sllv,
        funct::SRLV => Instr::Srlv,
        funct::SRAV => Instr::Srav,
        funct::JR => Instr::Jr,
        funct::JALR => Instr::Jalr,
        funct::SYSCALL => Instr::Syscall,
        funct::BREAK => Instr::Break,
        funct::SYNC => Instr::Sync,
        funct::MFHI => Instr::Mfhi,
        funct::MTHI => Instr::Mthi,
        funct::MFLO => Instr::Mflo,
        funct::MTLO => Instr::Mtlo,
        funct::DSLLV => Instr::Dsllv,
        funct::DSRLV => Instr::Dsrlv,
        funct::DSRAV => Instr::Dsrav,
        funct::MULT => Instr::Mult,
        funct::MULTU => Instr::Multu,
        funct::DIV => Instr::Div,
        funct::DIVU => Instr::Divu,
        funct::DMULT => Instr::Dmult,
        funct::DMULTU => Instr::Dmultu,
        funct::DDIV => Instr::Ddiv,
        funct::DDIVU => Instr::Ddivu,
        funct::ADD => Instr::Add,
        funct::ADDU => Instr::Addu,
        funct::SUB => Instr::Sub,
        funct::SUBU => Instr::Subu,
        funct::AND => Instr::And,
        funct::OR => Instr::Or,
        funct::XOR => Instr::Xor,
        funct::NOR => Instr::Nor,
        funct::SLT => Instr::Slt,
        funct::SLTU => Instr::Sltu,
        funct::DADD => Instr::Dadd,
        funct::DADDU => Instr::Daddu,
        funct::DSUB => Instr::Dsub,
        funct::DSUBU => Instr::Dsubu,
        funct::TGE => Instr::Tge,
        funct::TGEU => Instr::Tgeu,
        funct::TLT => Instr::Tlt,
        funct::TLTU => Instr::Tltu,
        funct::TEQ => Instr::Teq,
        funct::TNE => Instr::Tne,
        funct::DSLL => Instr::Dsll,
        funct::DSRL => Instr::Dsrl,
        funct::DSRA => Instr::Dsra,
        funct::DSLL32 => Instr::Dsll32,
        funct::DSRL32 => Instr::Dsrl32,
        funct::DSRA32 => Instr::Dsra32,
        _ => Instr::Invalid,
    }
}

fn decode_regimm(instr: Instruction) -> Instr {
    match instr.rt() as u32 {
        regimm::BLTZ => Instr::Bltz,
        regimm::BGEZ => Instr::Bgez,
        regimm::BLTZL => Instr::Bltzl,
        regimm::BGEZL => Instr::Bgezl,
        regimm::BLTZAL => Instr::Bltzal,
        regimm::BGEZAL => Instr::Bgezal,
        regimm::BLTZALL => Instr::Bltzall,
        regimm::BGEZALL => Instr::Bgezall,
        regimm::TGEI => Instr::Tgei,
        regimm::TGEIU => Instr::Tgeiu,
        regimm::TLTI => Instr::Tlti,
        regimm::TLTIU => Instr::Tltiu,
        regimm::TEQI => Instr::Teqi,
        regimm::TNEI => Instr::Tnei,
        _ => Instr::Invalid,
    }
}

fn decode_cop0(instr: Instruction) -> Instr {
    let raw = instr.0;
    match raw & MFC0_MASK {
        MFC0_VALUE => return Instr::Mfc0,
        DMFC0_VALUE => return Instr::Dmfc0,
        MTC0_VALUE => return Instr::Mtc0,
        DMTC0_VALUE => return Instr::Dmtc0,
        _ => {}
    }
    match raw & COP0_CO_MASK {
        TLBR_VALUE => Instr::Tlbr,
        TLBWI_VALUE => Instr::Tlbwi,
        TLBWR_VALUE => Instr::Tlbwr,
        TLBP_VALUE => Instr::Tlbp,
        ERET_VALUE => Instr::Eret,
        _ => Instr::Invalid,
    }
}

fn decode_cop1(instr: Instruction) -> Instr {
    match instr.fmt() {
        cop1_rs::MF => Instr::Mfc1,
        cop1_rs::DMF => Instr::Dmfc1,
        cop1_rs::CF => Instr::Cfc1,
        cop1_rs::MT => Instr::Mtc1,
        cop1_rs::DMT => Instr::Dmtc1,
        cop1_rs::CT => Instr::Ctc1,
        cop1_rs::BC => match instr.rt() as u32 {
            0x00 => Instr::Bc1f,
            0x01 => Instr::Bc1t,
            0x02 => Instr::Bc1fl,
            0x03 => Instr::Bc1tl,
            _ => Instr::Invalid,
        },
        cop1_rs::FMT_S => Instr::FpuOp(FpuFmt::S),
        cop1_rs::FMT_D => Instr::FpuOp(FpuFmt::D),
        cop1_rs::FMT_W => Instr::FpuOp(FpuFmt::W),
        cop1_rs::FMT_L => Instr::FpuOp(FpuFmt::L),
        _ => Instr::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(word: u32) -> Instr {
        decode(Instruction(word))
    }

    #[test]
    fn test_decode_immediate_alu() {
        assert_eq!(dec(0x3C01_8000), Instr::Lui); // LUI r1, 0x8000
        assert_eq!(dec(0x2021_0004), Instr::Addi); // ADDI r1, r1, 4
        assert_eq!(dec(0x2421_0004), Instr::Addiu);
        assert_eq!(dec(0x3021_00FF), Instr::Andi);
        assert_eq!(dec(0x3421_0180), Instr::Ori);
        assert_eq!(dec(0x3821_5555), Instr::Xori);
        assert_eq!(dec(0x2821_0010), Instr::Slti);
    }

    #[test]
    fn test_decode_memory() {
        assert_eq!(dec(0x8C28_0000), Instr::Lw); // LW r8, 0(r1)
        assert_eq!(dec(0xA028_0000), Instr::Sb);
        assert_eq!(dec(0xAC28_0000), Instr::Sw);
        assert_eq!(dec(0xDC28_0000), Instr::Ld);
        assert_eq!(dec(0xFC28_0000), Instr::Sd);
    }

    #[test]
    fn test_decode_branches() {
        assert_eq!(dec(0x1028_0010), Instr::Beq);
        assert_eq!(dec(0x5028_0010), Instr::Beql);
        assert_eq!(dec(0x1428_0010), Instr::Bne);
        assert_eq!(dec(0x0C00_0100), Instr::Jal);
        assert_eq!(dec(0x0421_0010), Instr::Bgez); // REGIMM, rs=r1
        assert_eq!(dec(0x0431_0010), Instr::Bgezal);
    }

    #[test]
    fn test_decode_special() {
        assert_eq!(dec(0x0000_0000), Instr::Nop);
        assert_eq!(dec(0x0001_0902), Instr::Srl); // SRL r1, r1, 4
        assert_eq!(dec(0x0020_0008), Instr::Jr); // JR r1
        assert_eq!(dec(0x0043_0825), Instr::Or); // OR r1, r2, r3
        assert_eq!(dec(0x0000_000C), Instr::Syscall);
        assert_eq!(dec(0x0000_000D), Instr::Break);
    }

    #[test]
    fn test_decode_cop0_mask_match() {
        // MTC0 r3, Status = 0x40836000
        assert_eq!(dec(0x4083_6000), Instr::Mtc0);
        // MFC0 r3, Cause
        assert_eq!(dec(0x4003_6800), Instr::Mfc0);
        assert_eq!(dec(0x4200_0018), Instr::Eret);
        assert_eq!(dec(0x4200_0002), Instr::Tlbwi);
        // MTC0-like word with junk in the low bits is not MTC0
        assert_eq!(dec(0x4083_6001), Instr::Invalid);
    }

    #[test]
    fn test_decode_cop1() {
        // ADD.S f0, f2, f4: op COP1, fmt S, ft=4, fs=2, fd=0
        let word = (0x11 << 26) | (0x10 << 21) | (4 << 16) | (2 << 11);
        assert_eq!(dec(word), Instr::FpuOp(FpuFmt::S));
        // MTC1 r2, f4
        let word = (0x11 << 26) | (0x04 << 21) | (2 << 16) | (4 << 11);
        assert_eq!(dec(word), Instr::Mtc1);
        // BC1T offset
        let word = (0x11 << 26) | (0x08 << 21) | (0x01 << 16) | 0x10;
        assert_eq!(dec(word), Instr::Bc1t);
    }

    #[test]
    fn test_reserved_encodings_are_invalid() {
        assert_eq!(dec(0x7000_0000), Instr::Invalid); // opcode 0x1C
        assert_eq!(dec(0x0000_0001), Instr::Invalid); // SPECIAL funct 1
        assert_eq!(dec((0x01 << 26) | (0x1F << 16)), Instr::Invalid); // REGIMM 0x1F
    }

    /// Every opcode the original decoder recognized maps to its tag and
    /// nothing else.
    #[test]
    fn test_decode_totality_of_base_set() {
        let cases: &[(u32, Instr)] = &[
            (0x3C01_8000, Instr::Lui),
            (0x2021_0004, Instr::Addi),
            (0x2421_0004, Instr::Addiu),
            (0x3021_00FF, Instr::Andi),
            (0x3421_0180, Instr::Ori),
            (0x3821_5555, Instr::Xori),
            (0x2821_0010, Instr::Slti),
            (0x8C28_0000, Instr::Lw),
            (0xA028_0000, Instr::Sb),
            (0xAC28_0000, Instr::Sw),
            (0x1028_0010, Instr::Beq),
            (0x5028_0010, Instr::Beql),
            (0x1428_0010, Instr::Bne),
            (0x0C00_0100, Instr::Jal),
            (0x0000_0000, Instr::Nop),
            (0x0001_0902, Instr::Srl),
            (0x0020_0008, Instr::Jr),
            (0x0043_0825, Instr::Or),
            (0x4083_6000, Instr::Mtc0),
        ];
        for &(word, expect) in cases {
            assert_eq!(dec(word), expect, "word 0x{:08X}", word);
        }
    }
}
