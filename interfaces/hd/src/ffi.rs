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

use parity_scale_codec::{Decode, Encode};

/// Size, in bytes, of a sector.
pub const SECTOR_SIZE: u32 = 512;
/// `log2(SECTOR_SIZE)`.
pub const SECTOR_SIZE_SHIFT: u32 = 9;

/// Maximum number of drives a controller can expose.
pub const MAX_DRIVES: u32 = 2;
/// Number of entries in the partition table of a boot sector.
pub const NR_PART_PER_DRIVE: u32 = 4;
/// Number of logical partitions that can live in a single extended partition.
pub const NR_SUB_PER_PART: u32 = 16;
/// Number of logical partitions per drive.
pub const NR_SUB_PER_DRIVE: u32 = NR_SUB_PER_PART * NR_PART_PER_DRIVE;
/// Number of primary minors per drive. The first one designates the whole drive.
pub const NR_PRIM_PER_DRIVE: u32 = NR_PART_PER_DRIVE + 1;
/// Highest minor designating a whole drive or a primary partition.
pub const MAX_PRIM: u32 = MAX_DRIVES * NR_PRIM_PER_DRIVE - 1;
/// Minor of the first logical partition of the first drive.
pub const MINOR_HD1A: u32 = 0x10;

/// Message kinds understood by the driver.
pub mod kind {
    pub const DEV_OPEN: u32 = 1001;
    pub const DEV_CLOSE: u32 = 1002;
    pub const DEV_READ: u32 = 1003;
    pub const DEV_WRITE: u32 = 1004;
    pub const DEV_IOCTL: u32 = 1005;
    /// Kind of every message sent back by the driver.
    pub const REPLY: u32 = 2000;
}

/// Requests accepted by a `DEV_IOCTL` message.
pub mod ioctl {
    /// Copies the `{ base, size }` of the device into the buffer of the caller.
    pub const DIOCTL_GET_GEO: u32 = 1;
}

/// Request or reply exchanged with the disk driver.
///
/// The same layout is used in both directions. The driver answers a request by sending the
/// message back to its emitter with `kind` set to [`kind::REPLY`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    /// Process that emitted the message. Filled by the kernel.
    pub source: u32,
    /// One of the constants of the [`kind`] module.
    pub kind: u32,
    /// Minor number of the device.
    pub device: u32,
    /// Ioctl request, for `DEV_IOCTL` messages. One of the constants of the [`ioctl`] module.
    pub request: u32,
    /// Byte offset within the device. Must be a multiple of [`SECTOR_SIZE`].
    pub position: u64,
    /// Number of bytes to transfer.
    pub count: u32,
    /// Process whose address space contains `buffer`.
    pub proc_nr: u32,
    /// Address of the buffer in the address space of `proc_nr`.
    pub buffer: u64,
    /// Status set by the driver in replies. Always 0.
    pub status: i32,
}

/// Geometry of a device, as written by `DIOCTL_GET_GEO`.
///
/// Encoded as two little-endian `u32`s, `base` first.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// First sector of the device, relative to the start of the drive.
    pub base: u32,
    /// Number of sectors of the device.
    pub size: u32,
}

impl PartInfo {
    /// Number of bytes of the encoded form.
    pub const ENCODED_LEN: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0; Self::ENCODED_LEN];
        out[..4].copy_from_slice(&self.base.to_le_bytes());
        out[4..].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; Self::ENCODED_LEN]) -> Self {
        PartInfo {
            base: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}
