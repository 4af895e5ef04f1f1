// Copyright (C) 2019-2021  Pierre Krieger
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! ATA registers and command blocks.
//!
//! Bibliography:
//!
//! - https://wiki.osdev.org/ATA_PIO_Mode
//! - ATA/ATAPI-6, section 8.15 (IDENTIFY DEVICE)
//!

use crate::arch::PlatformSpecific;
use crate::error::HardwareFault;

use alloc::string::String;
use core::pin::Pin;
use redshirt_hd_interface::ffi::SECTOR_SIZE;

/// Size of a sector, as a `usize`.
pub const SECTOR_BYTES: usize = SECTOR_SIZE as usize;

// Offsets of the command block registers relative to the I/O base.
const REG_DATA: u32 = 0;
const REG_FEATURES: u32 = 1;
const REG_ERROR: u32 = 1;
const REG_NSECTOR: u32 = 2;
const REG_LBA_LOW: u32 = 3;
const REG_LBA_MID: u32 = 4;
const REG_LBA_HIGH: u32 = 5;
const REG_DEVICE: u32 = 6;
const REG_STATUS: u32 = 7;
const REG_CMD: u32 = 7;

pub const STATUS_BSY: u8 = 0x80;
pub const STATUS_DRDY: u8 = 0x40;
pub const STATUS_DF: u8 = 0x20;
pub const STATUS_DSC: u8 = 0x10;
pub const STATUS_DRQ: u8 = 0x08;
pub const STATUS_ERR: u8 = 0x01;

pub const ATA_IDENTIFY: u8 = 0xec;
pub const ATA_READ: u8 = 0x20;
pub const ATA_WRITE: u8 = 0x30;

/// Highest number of sectors a single command can transfer. Written as 0 in the register.
pub const MAX_SECTORS_PER_COMMAND: u32 = 256;

/// Number of sectors that can be addressed with a 28-bit LBA.
pub const LBA28_SECTORS: u64 = 1 << 28;

/// Builds the value of the device register.
///
/// Bits 7 and 5 are always set. Bit 6 selects LBA addressing, bit 4 the drive, and the low
/// nibble carries bits 24 to 27 of the LBA.
pub const fn make_device_reg(lba: bool, drive: u8, lba_highest: u8) -> u8 {
    ((lba as u8) << 6) | ((drive & 1) << 4) | (lba_highest & 0xf) | 0xa0
}

/// Ports of one ATA channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ports {
    io_base: u32,
    control: u32,
}

impl Ports {
    pub fn new(io_base: u32, control: u32) -> Self {
        Ports { io_base, control }
    }

    pub fn data(&self) -> u32 {
        self.io_base + REG_DATA
    }

    pub fn error(&self) -> u32 {
        self.io_base + REG_ERROR
    }

    pub fn status(&self) -> u32 {
        self.io_base + REG_STATUS
    }

    pub fn control(&self) -> u32 {
        self.control
    }
}

/// Command block, as written to the registers of the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AtaCommand {
    pub features: u8,
    pub count: u8,
    pub lba_low: u8,
    pub lba_mid: u8,
    pub lba_high: u8,
    pub device: u8,
    pub command: u8,
}

impl AtaCommand {
    /// Builds a 28-bit LBA command transferring `count` sectors starting at `sector`.
    ///
    /// A `count` of [`MAX_SECTORS_PER_COMMAND`] is encoded as 0.
    pub fn lba28(command: u8, drive: u8, sector: u32, count: u32) -> Self {
        debug_assert!(sector < (1 << 28));
        debug_assert!(count >= 1 && count <= MAX_SECTORS_PER_COMMAND);

        AtaCommand {
            features: 0,
            count: (count & 0xff) as u8,
            lba_low: (sector & 0xff) as u8,
            lba_mid: ((sector >> 8) & 0xff) as u8,
            lba_high: ((sector >> 16) & 0xff) as u8,
            device: make_device_reg(true, drive, ((sector >> 24) & 0xf) as u8),
            command,
        }
    }

    /// Builds an IDENTIFY DEVICE command for the given drive.
    pub fn identify(drive: u8) -> Self {
        AtaCommand {
            features: 0,
            count: 0,
            lba_low: 0,
            lba_mid: 0,
            lba_high: 0,
            device: make_device_reg(false, drive, 0),
            command: ATA_IDENTIFY,
        }
    }

    /// Returns the LBA encoded in the command.
    pub fn lba(&self) -> u32 {
        u32::from(self.lba_low)
            | (u32::from(self.lba_mid) << 8)
            | (u32::from(self.lba_high) << 16)
            | (u32::from(self.device & 0xf) << 24)
    }
}

/// Writes a command block to the registers of the controller.
///
/// Interrupts are enabled in the device control register before the command is sent. The
/// caller must make sure that the controller isn't busy.
pub fn write_command<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    ports: &Ports,
    cmd: &AtaCommand,
) -> Result<(), HardwareFault> {
    out_byte(platform, ports.control(), 0)?;
    out_byte(platform, ports.io_base + REG_FEATURES, cmd.features)?;
    out_byte(platform, ports.io_base + REG_NSECTOR, cmd.count)?;
    out_byte(platform, ports.io_base + REG_LBA_LOW, cmd.lba_low)?;
    out_byte(platform, ports.io_base + REG_LBA_MID, cmd.lba_mid)?;
    out_byte(platform, ports.io_base + REG_LBA_HIGH, cmd.lba_high)?;
    out_byte(platform, ports.io_base + REG_DEVICE, cmd.device)?;
    out_byte(platform, ports.io_base + REG_CMD, cmd.command)
}

pub fn read_status<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    ports: &Ports,
) -> Result<u8, HardwareFault> {
    in_byte(platform, ports.status())
}

pub fn read_error<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    ports: &Ports,
) -> Result<u8, HardwareFault> {
    in_byte(platform, ports.error())
}

/// Fills `buffer` with words read from the data port.
pub fn port_read<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    ports: &Ports,
    buffer: &mut [u8],
) -> Result<(), HardwareFault> {
    debug_assert_eq!(buffer.len() % 2, 0);
    let port = ports.data();
    for word in buffer.chunks_exact_mut(2) {
        let value = unsafe { platform.read_port_u16(port) }
            .map_err(|error| HardwareFault::Port { port, error })?;
        word.copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

/// Writes `buffer` to the data port, one word at a time.
pub fn port_write<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    ports: &Ports,
    buffer: &[u8],
) -> Result<(), HardwareFault> {
    debug_assert_eq!(buffer.len() % 2, 0);
    let port = ports.data();
    for word in buffer.chunks_exact(2) {
        let value = u16::from_le_bytes([word[0], word[1]]);
        unsafe { platform.write_port_u16(port, value) }
            .map_err(|error| HardwareFault::Port { port, error })?;
    }
    Ok(())
}

fn out_byte<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    port: u32,
    data: u8,
) -> Result<(), HardwareFault> {
    unsafe { platform.write_port_u8(port, data) }.map_err(|error| HardwareFault::Port { port, error })
}

fn in_byte<TPlat: PlatformSpecific>(platform: Pin<&TPlat>, port: u32) -> Result<u8, HardwareFault> {
    unsafe { platform.read_port_u8(port) }.map_err(|error| HardwareFault::Port { port, error })
}

/// Information reported by IDENTIFY DEVICE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveIdentity {
    pub serial: String,
    pub model: String,
    /// True if the drive supports LBA addressing.
    pub lba: bool,
    /// True if the drive supports the 48-bit address feature set.
    pub lba48: bool,
    /// Number of sectors addressable with 28-bit LBA.
    pub sectors: u32,
}

impl DriveIdentity {
    /// Parses the block of data returned by the IDENTIFY DEVICE command.
    pub fn parse(data: &[u8; SECTOR_BYTES]) -> Self {
        let word = |n: usize| u16::from_le_bytes([data[n * 2], data[n * 2 + 1]]);

        DriveIdentity {
            serial: ata_string(&data[10 * 2..20 * 2]),
            model: ata_string(&data[27 * 2..47 * 2]),
            lba: (word(49) & (1 << 9)) != 0,
            lba48: (word(83) & (1 << 10)) != 0,
            sectors: (u32::from(word(61)) << 16) | u32::from(word(60)),
        }
    }

    /// Capacity of the drive in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        u64::from(self.sectors) * u64::from(SECTOR_SIZE)
    }
}

/// Decodes a string of the identify block. Characters are stored in big-endian order within each
/// word, and the string is padded with spaces.
fn ata_string(words: &[u8]) -> String {
    let mut out = String::with_capacity(words.len());
    for pair in words.chunks_exact(2) {
        out.push(char::from(pair[1]));
        out.push(char::from(pair[0]));
    }
    let trimmed = out.trim_end_matches(|c: char| c == ' ' || c == '\0').len();
    out.truncate(trimmed);
    out
}
