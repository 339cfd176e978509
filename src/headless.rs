//! Headless test-ROM runner
//!
//! Usage: `n64-test <rom>`
//!
//! Boots the ROM with the synthesized boot path and steps the core until
//! the ROM reports through GPR 30 (-1 pass, positive failure index), up to
//! the step budget. Exits zero on pass; prints the failing register state
//! otherwise.

use std::process::ExitCode;

use n64_core::{disasm, N64Error, N64System};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let rom_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: n64-test <rom>");
            return ExitCode::FAILURE;
        }
    };

    let mut sys = N64System::new();
    if let Err(e) = sys.load_rom(&rom_path) {
        eprintln!("failed to load {}: {}", rom_path, e);
        return ExitCode::FAILURE;
    }

    match sys.run_test() {
        Ok(steps) => {
            println!("SUCCESS: all tests passed! Took {} steps.", steps);
            ExitCode::SUCCESS
        }
        Err(N64Error::TestFailed(index)) => {
            eprintln!("Test #{} failed.", index);
            dump_fault_state(&mut sys);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e);
            dump_fault_state(&mut sys);
            ExitCode::FAILURE
        }
    }
}

/// Print the PC, the instruction under it and the register file
fn dump_fault_state(sys: &mut N64System) {
    let pc = sys.cpu.pc;
    eprintln!("PC: 0x{:016X}", pc);
    if let Ok(word) = sys.bus.read32(&sys.cpu.cp0, pc) {
        eprintln!("  {}", disasm::disassemble(pc as u32, word));
    }
    for chunk in 0..8 {
        let line: Vec<String> = (0..4)
            .map(|n| {
                let index = chunk * 4 + n;
                format!("r{:02}={:016X}", index, sys.cpu.gpr[index])
            })
            .collect();
        eprintln!("  {}", line.join(" "));
    }
}
