//! PIF: boot and controller-port command processing
//!
//! The PIF is the security/input microcontroller. Two of its jobs matter to
//! the core:
//!
//! 1. **Boot.** With a dumped PIF ROM the CPU fetches the real boot code
//!    from 0x1FC00000. Without one, `hle_boot` synthesizes the state the
//!    boot code leaves behind: the first 4KB of cartridge (header + boot
//!    segment) copied into DMEM, the well-known register values, and the PC
//!    at the boot segment's entry in DMEM.
//! 2. **Command processing.** PIF RAM holds a channel-oriented command list
//!    (the joybus protocol). Each SI transfer walks the list: controller
//!    info/state polls, Controller Pak reads/writes, EEPROM block access.
//!
//! Reference: n64brew wiki (https://n64brew.dev/wiki/PIF-NUS)

use log::{info, warn};

use crate::cpu::Cpu;
use crate::memory::{addr, Pif};
use crate::rom::Cartridge;
use crate::rsp::Rsp;
use crate::save::SaveData;

/// Joybus command codes
mod cmd {
    pub const INFO: u8 = 0x00;
    pub const CONTROLLER_STATE: u8 = 0x01;
    pub const PAK_READ: u8 = 0x02;
    pub const PAK_WRITE: u8 = 0x03;
    pub const EEPROM_READ: u8 = 0x04;
    pub const EEPROM_WRITE: u8 = 0x05;
    pub const RESET: u8 = 0xFF;
}

/// A controller port
#[derive(Debug, Clone, Copy, Default)]
pub struct Controller {
    pub plugged_in: bool,
    /// Button bits in joybus wire order
    pub buttons: u16,
    pub joy_x: i8,
    pub joy_y: i8,
}

/// Walk the PIF RAM command list and fill in responses in place.
///
/// Channels 0-3 are the controller ports; channel 4 is the cartridge
/// EEPROM. A device that is absent gets the error bit (0x80) set in its
/// rx-length byte.
pub fn process_commands(pif: &mut Pif, controllers: &[Controller; 4], save: &mut SaveData) {
    let mut i = 0usize;
    let mut channel = 0usize;

    while i < addr::PIF_RAM_SIZE - 1 {
        let t = pif.ram[i];
        match t {
            0x00 => {
                // Empty channel
                channel += 1;
                i += 1;
            }
            0xFD => {
                // Channel reset marker
                i += 1;
            }
            0xFE => break,
            0xFF => {
                // Alignment padding
                i += 1;
            }
            _ => {
                let tx = (t & 0x3F) as usize;
                let rx = (pif.ram[i + 1] & 0x3F) as usize;
                let tx_start = i + 2;
                let rx_start = tx_start + tx;
                if tx == 0 || rx_start + rx > addr::PIF_RAM_SIZE {
                    warn!("Malformed PIF command list at offset {}", i);
                    break;
                }

                run_command(pif, controllers, save, channel, i + 1, tx_start, tx, rx_start, rx);

                i = rx_start + rx;
                channel += 1;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_command(
    pif: &mut Pif,
    controllers: &[Controller; 4],
    save: &mut SaveData,
    channel: usize,
    rx_len_index: usize,
    tx_start: usize,
    tx: usize,
    rx_start: usize,
    rx: usize,
) {
    let command = pif.ram[tx_start];
    match command {
        cmd::INFO | cmd::RESET => {
            if channel < 4 {
                if controllers[channel].plugged_in {
                    // Standard controller, Controller Pak present
                    write_rx(pif, rx_start, rx, &[0x05, 0x00, 0x01]);
                } else {
                    pif.ram[rx_len_index] |= 0x80;
                }
            } else if channel == 4 && save.save_type().size() > 0 {
                // 16kbit parts report 0xC0, 4kbit parts 0x80
                let id = match save.save_type() {
                    crate::rom::SaveType::Eeprom16k => 0xC0,
                    _ => 0x80,
                };
                write_rx(pif, rx_start, rx, &[0x00, id, 0x00]);
            } else {
                pif.ram[rx_len_index] |= 0x80;
            }
        }
        cmd::CONTROLLER_STATE => {
            if channel < 4 && controllers[channel].plugged_in {
                let c = &controllers[channel];
                let response = [
                    (c.buttons >> 8) as u8,
                    c.buttons as u8,
                    c.joy_x as u8,
                    c.joy_y as u8,
                ];
                write_rx(pif, rx_start, rx, &response);
            } else {
                pif.ram[rx_len_index] |= 0x80;
            }
        }
        cmd::PAK_READ => {
            if channel < 4 && controllers[channel].plugged_in && tx >= 3 {
                let pak_addr =
                    (((pif.ram[tx_start + 1] as u32) << 8) | pif.ram[tx_start + 2] as u32) & 0xFFE0;
                let mut block = [0u8; 32];
                for (n, b) in block.iter_mut().enumerate() {
                    *b = save.mempack_read8(pak_addr + n as u32);
                }
                let n = rx.saturating_sub(1).min(32);
                for k in 0..n {
                    pif.ram[rx_start + k] = block[k];
                }
                if rx >= 33 {
                    pif.ram[rx_start + 32] = pak_data_crc(&block);
                }
            } else {
                pif.ram[rx_len_index] |= 0x80;
            }
        }
        cmd::PAK_WRITE => {
            if channel < 4 && controllers[channel].plugged_in && tx >= 35 {
                let pak_addr =
                    (((pif.ram[tx_start + 1] as u32) << 8) | pif.ram[tx_start + 2] as u32) & 0xFFE0;
                let mut block = [0u8; 32];
                block.copy_from_slice(&pif.ram[tx_start + 3..tx_start + 35]);
                for (n, b) in block.iter().enumerate() {
                    save.mempack_write8(pak_addr + n as u32, *b);
                }
                if rx >= 1 {
                    pif.ram[rx_start] = pak_data_crc(&block);
                }
            } else {
                pif.ram[rx_len_index] |= 0x80;
            }
        }
        cmd::EEPROM_READ => {
            if channel == 4 && save.save_type().size() > 0 && tx >= 2 {
                let mut block = [0u8; 8];
                save.eeprom_read_block(pif.ram[tx_start + 1], &mut block);
                write_rx(pif, rx_start, rx, &block);
            } else {
                pif.ram[rx_len_index] |= 0x80;
            }
        }
        cmd::EEPROM_WRITE => {
            if channel == 4 && save.save_type().size() > 0 && tx >= 10 {
                let mut block = [0u8; 8];
                block.copy_from_slice(&pif.ram[tx_start + 2..tx_start + 10]);
                save.eeprom_write_block(pif.ram[tx_start + 1], &block);
                // Write status byte
                write_rx(pif, rx_start, rx, &[0x00]);
            } else {
                pif.ram[rx_len_index] |= 0x80;
            }
        }
        other => {
            warn!("Unhandled PIF command 0x{:02X} on channel {}", other, channel);
            pif.ram[rx_len_index] |= 0x80;
        }
    }
}

fn write_rx(pif: &mut Pif, rx_start: usize, rx: usize, data: &[u8]) {
    for (n, b) in data.iter().take(rx).enumerate() {
        pif.ram[rx_start + n] = *b;
    }
}

/// Controller Pak data CRC (x^8 + x^5 + x^4 + 1). The pak protocol runs one
/// extra all-zero iteration after the data.
fn pak_data_crc(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for i in 0..=data.len() {
        for bit in (0..8).rev() {
            let xor_tap = if crc & 0x80 != 0 { 0x85 } else { 0 };
            crc <<= 1;
            if i < data.len() && data[i] & (1 << bit) != 0 {
                crc |= 1;
            }
            crc ^= xor_tap;
        }
    }
    crc
}

/// Synthesize the post-boot state the PIF ROM would leave behind.
///
/// Copies the cartridge header and boot segment (first 4KB) into DMEM, sets
/// the register values the CIC-NUS-6102 boot path produces, and points the
/// PC at the boot segment entry inside DMEM.
pub fn hle_boot(cpu: &mut Cpu, rsp: &mut Rsp, cart: &Cartridge) {
    // Header + boot segment land at the top of DMEM
    for i in 0..addr::SP_MEM_SIZE as u32 {
        rsp.dmem[i as usize] = cart.read8(i);
    }

    cpu.gpr[11] = 0xFFFF_FFFF_A400_0040; // t3: boot segment entry
    cpu.gpr[20] = 0x0000_0000_0000_0001; // s4: TV type (NTSC)
    cpu.gpr[22] = 0x0000_0000_0000_003F; // s6: CIC seed
    cpu.gpr[29] = 0xFFFF_FFFF_A400_1FF0; // sp: top of DMEM

    cpu.cp0.random = 0x1F;
    cpu.cp0.status.set_raw(0x3400_0000);
    cpu.set_pc(0xFFFF_FFFF_A400_0040);

    info!(
        "HLE boot: entry 0x{:08X}, title \"{}\"",
        cart.header.program_counter, cart.header.title
    );
}
