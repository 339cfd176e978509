//! Exception dispatch, interrupt and TLB behavior

use super::*;

/// General exception vector with BEV clear
const GENERAL_VECTOR: u64 = 0xFFFF_FFFF_8000_0180;
/// TLB refill vector with BEV clear
const REFILL_VECTOR: u64 = 0xFFFF_FFFF_8000_0000;
/// General exception vector with BEV set (boot)
const BEV_VECTOR: u64 = 0xFFFF_FFFF_BFC0_0380;

fn setup_runtime() -> (Cpu, Bus) {
    let (mut cpu, bus) = setup();
    // Leave boot: vectors move to the KSEG0 bases
    cpu.cp0.status.set_bev(false);
    (cpu, bus)
}

#[test]
fn test_reserved_instruction_exception() {
    let (mut cpu, mut bus) = setup_runtime();
    load_program(&mut bus, &[0x7000_0000]); // reserved opcode 0x1C
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 10);
    assert_eq!(cpu.cp0.epc, PROGRAM_PC);
    assert!(cpu.cp0.status.exl());
    assert!(!cpu.cp0.cause.bd());
    assert_eq!(cpu.pc, GENERAL_VECTOR);
}

#[test]
fn test_bev_selects_boot_vector() {
    let (mut cpu, mut bus) = setup();
    assert!(cpu.cp0.status.bev());
    load_program(&mut bus, &[0x0000_000C]); // SYSCALL
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 8);
    assert_eq!(cpu.pc, BEV_VECTOR);
}

#[test]
fn test_breakpoint_code() {
    let (mut cpu, mut bus) = setup_runtime();
    load_program(&mut bus, &[0x0000_000D]); // BREAK
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 9);
}

#[test]
fn test_exception_in_delay_slot_sets_bd() {
    let (mut cpu, mut bus) = setup_runtime();
    load_program(
        &mut bus,
        &[
            0x1000_0002, // BEQ zero, zero, +2
            0x0000_000C, // SYSCALL (in the delay slot)
        ],
    );
    run(&mut cpu, &mut bus, 2);
    assert!(cpu.cp0.cause.bd());
    // EPC names the branch, not the slot
    assert_eq!(cpu.cp0.epc, PROGRAM_PC);
    assert_eq!(cpu.pc, GENERAL_VECTOR);
    // The pending branch was cancelled
    assert!(!cpu.branch);
}

#[test]
fn test_exl_preserves_first_epc() {
    let (mut cpu, mut bus) = setup_runtime();
    load_program(&mut bus, &[0x0000_000C]); // SYSCALL
    run(&mut cpu, &mut bus, 1);
    let first_epc = cpu.cp0.epc;

    // A second exception while EXL is set must not move EPC
    bus.write_phys32(0x180, 0x0000_000D); // BREAK at the vector
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.epc, first_epc);
    assert_eq!(cpu.cp0.cause.exc_code(), 9);
}

#[test]
fn test_eret_returns_and_clears_exl() {
    let (mut cpu, mut bus) = setup_runtime();
    cpu.cp0.epc = PROGRAM_PC;
    cpu.cp0.status.set_exl(true);
    load_program(&mut bus, &[0x2421_0001]); // ADDIU at, at, 1 (return target)
    bus.write_phys32(0x180, 0x4200_0018); // ERET at the vector
    cpu.set_pc(GENERAL_VECTOR);

    run(&mut cpu, &mut bus, 1); // ERET
    assert!(!cpu.cp0.status.exl());
    assert_eq!(cpu.pc, PROGRAM_PC);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.gpr[1], 1);
}

#[test]
fn test_interrupt_taken_between_instructions() {
    let (mut cpu, _bus) = setup_runtime();
    // Enable IE with IM2 unmasked, raise IP2
    cpu.cp0.status.set_raw(0x0000_0401);
    cpu.set_ip2(true);
    assert!(cpu.interrupts > 0);

    assert!(cpu.check_interrupts());
    assert_eq!(cpu.cp0.cause.exc_code(), 0);
    assert_eq!(cpu.cp0.epc, PROGRAM_PC);
    assert_eq!(cpu.pc, GENERAL_VECTOR);
}

#[test]
fn test_interrupt_blocked_by_exl_erl_ie() {
    let (mut cpu, _bus) = setup_runtime();
    cpu.set_ip2(true);

    // IE clear
    cpu.cp0.status.set_raw(0x0000_0400);
    cpu.update_interrupts();
    assert!(!cpu.check_interrupts());

    // IE set but EXL set
    cpu.cp0.status.set_raw(0x0000_0403);
    cpu.update_interrupts();
    assert!(!cpu.check_interrupts());

    // IE set but ERL set
    cpu.cp0.status.set_raw(0x0000_0405);
    cpu.update_interrupts();
    assert!(!cpu.check_interrupts());

    // Masked in IM
    cpu.cp0.status.set_raw(0x0000_0001);
    cpu.update_interrupts();
    assert!(!cpu.check_interrupts());
}

#[test]
fn test_interrupt_with_pending_branch_uses_target() {
    let (mut cpu, mut bus) = setup_runtime();
    load_program(
        &mut bus,
        &[
            0x1000_0002, // BEQ zero, zero, +2
            0x0000_0000, // NOP (delay slot)
        ],
    );
    run(&mut cpu, &mut bus, 2); // branch + slot; commit pending
    assert!(cpu.branch);

    cpu.cp0.status.set_raw(0x0000_0401);
    cpu.set_ip2(true);
    assert!(cpu.check_interrupts());
    // The interrupted instruction is the branch target, not a delay slot
    assert!(!cpu.cp0.cause.bd());
    assert_eq!(cpu.cp0.epc, PROGRAM_PC + 12);
}

#[test]
fn test_tlb_miss_uses_refill_vector() {
    let (mut cpu, mut bus) = setup_runtime();
    cpu.gpr[1] = 0x0000_2000; // unmapped KUSEG address
    load_program(&mut bus, &[0x8C22_0000]); // LW v0, 0(at)
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 2);
    assert_eq!(cpu.cp0.bad_vaddr, 0x2000);
    assert_eq!(cpu.pc, REFILL_VECTOR);
    // EntryHi holds the failing VPN for the refill handler
    assert_eq!(cpu.cp0.entry_hi & 0xFFFF_E000, 0x2000 & 0xFFFF_E000);
}

#[test]
fn test_tlb_store_miss_code() {
    let (mut cpu, mut bus) = setup_runtime();
    cpu.gpr[1] = 0x0000_2000;
    load_program(&mut bus, &[0xAC22_0000]); // SW v0, 0(at)
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 3);
}

#[test]
fn test_mapped_kuseg_access_through_tlb() {
    let (mut cpu, mut bus) = setup_runtime();
    // Map virtual 0x2000/0x3000 to physical 0x42000/0x43000
    cpu.cp0.entry_hi = 0x2000;
    cpu.cp0.entry_lo0 = (0x42 << 6) | 0x2 | 1;
    cpu.cp0.entry_lo1 = (0x43 << 6) | 0x2 | 1;
    cpu.cp0.tlb_write(0);

    bus.rdram.write32(0x42008, 0x1234_5678);
    cpu.gpr[1] = 0x0000_2008;
    load_program(&mut bus, &[0x8C22_0000]); // LW v0, 0(at)
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.gpr[2], 0x1234_5678);
}

#[test]
fn test_address_error_on_unaligned_word() {
    let (mut cpu, mut bus) = setup_runtime();
    cpu.gpr[1] = 0xFFFF_FFFF_8000_2001;
    load_program(&mut bus, &[0x8C22_0000]); // LW v0, 0(at)
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 4);
    assert_eq!(cpu.cp0.bad_vaddr, 0xFFFF_FFFF_8000_2001);
}

#[test]
fn test_coprocessor_unusable_records_unit() {
    let (mut cpu, mut bus) = setup_runtime();
    // CU1 clear: any FPU op faults with CE=1
    let mtc1 = (0x11 << 26) | (0x04 << 21) | (1 << 16) | (2 << 11);
    load_program(&mut bus, &[mtc1]);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 11);
    assert_eq!((cpu.cp0.cause.raw() >> 28) & 3, 1);
}

#[test]
fn test_fpu_usable_after_enabling_cu1() {
    let (mut cpu, mut bus) = setup_runtime();
    cpu.cp0.status.set_cu(1, true);
    cpu.gpr[1] = 0x3F80_0000; // 1.0f
    let mtc1 = (0x11 << 26) | (0x04 << 21) | (1 << 16) | (2 << 11);
    let mfc1 = (0x11 << 26) | (2 << 16) | (2 << 11);
    load_program(&mut bus, &[mtc1 as u32, mfc1 as u32]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.gpr[2], 0x3F80_0000);
    assert!(!cpu.cp0.status.exl());
}

#[test]
fn test_trap_on_equal() {
    let (mut cpu, mut bus) = setup_runtime();
    cpu.gpr[1] = 7;
    cpu.gpr[2] = 7;
    load_program(&mut bus, &[0x0022_0034]); // TEQ at, v0
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.cp0.cause.exc_code(), 13);
}
