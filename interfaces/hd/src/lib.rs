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

//! Talking to the hard disk driver.
//!
//! The hard disk driver is a task that receives [`ffi::Message`]s, performs the requested
//! operation on the disk, and sends the same message back to its emitter as a reply.
//!
//! # Minor numbers
//!
//! Each message designates a device through its minor number:
//!
//! - Minors `0` to [`ffi::MAX_PRIM`] are split in groups of [`ffi::NR_PRIM_PER_DRIVE`], one
//!   group per drive. The first minor of a group is the whole drive, the four others are the
//!   four entries of the partition table found in the boot sector.
//! - Minors starting at [`ffi::MINOR_HD1A`] are logical partitions, in groups of
//!   [`ffi::NR_SUB_PER_DRIVE`] per drive.
//!
//! Use [`DeviceIndex::from_minor`] to decode a minor number.

#![no_std]

pub mod ffi;

pub use ffi::{Message, PartInfo};

/// What a minor number designates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeviceIndex {
    /// The entire drive.
    Whole { drive: u32 },
    /// Entry `index`, between 0 and 3, of the partition table of the drive's boot sector.
    Primary { drive: u32, index: u32 },
    /// The `index`th logical partition found in the extended partitions of the drive.
    Logical { drive: u32, index: u32 },
}

impl DeviceIndex {
    /// Decodes a minor number. Returns `None` if the minor doesn't designate anything.
    ///
    /// The result only depends on `minor`.
    pub fn from_minor(minor: u32) -> Option<Self> {
        if minor <= ffi::MAX_PRIM {
            let drive = minor / ffi::NR_PRIM_PER_DRIVE;
            match minor % ffi::NR_PRIM_PER_DRIVE {
                0 => Some(DeviceIndex::Whole { drive }),
                n => Some(DeviceIndex::Primary {
                    drive,
                    index: n - 1,
                }),
            }
        } else if minor >= ffi::MINOR_HD1A {
            let rel = minor - ffi::MINOR_HD1A;
            Some(DeviceIndex::Logical {
                drive: rel / ffi::NR_SUB_PER_DRIVE,
                index: rel % ffi::NR_SUB_PER_DRIVE,
            })
        } else {
            None
        }
    }

    /// Returns the drive the device belongs to.
    pub fn drive(&self) -> u32 {
        match *self {
            DeviceIndex::Whole { drive } => drive,
            DeviceIndex::Primary { drive, .. } => drive,
            DeviceIndex::Logical { drive, .. } => drive,
        }
    }
}

/// Returns the drive a minor number belongs to.
pub fn drive_of_device(minor: u32) -> Option<u32> {
    DeviceIndex::from_minor(minor).map(|d| d.drive())
}

impl Message {
    /// Builds a `DEV_OPEN` request.
    pub fn open(device: u32) -> Self {
        Message {
            kind: ffi::kind::DEV_OPEN,
            device,
            ..Default::default()
        }
    }

    /// Builds a `DEV_CLOSE` request.
    pub fn close(device: u32) -> Self {
        Message {
            kind: ffi::kind::DEV_CLOSE,
            device,
            ..Default::default()
        }
    }

    /// Builds a `DEV_READ` request. The data will be written at `buffer` in the address space
    /// of `proc_nr`.
    pub fn read(device: u32, position: u64, count: u32, proc_nr: u32, buffer: u64) -> Self {
        Message {
            kind: ffi::kind::DEV_READ,
            device,
            position,
            count,
            proc_nr,
            buffer,
            ..Default::default()
        }
    }

    /// Builds a `DEV_WRITE` request. The data is read from `buffer` in the address space of
    /// `proc_nr`.
    pub fn write(device: u32, position: u64, count: u32, proc_nr: u32, buffer: u64) -> Self {
        Message {
            kind: ffi::kind::DEV_WRITE,
            ..Message::read(device, position, count, proc_nr, buffer)
        }
    }

    /// Builds a `DIOCTL_GET_GEO` request. A [`PartInfo`] will be written at `buffer`.
    pub fn get_geometry(device: u32, proc_nr: u32, buffer: u64) -> Self {
        Message {
            kind: ffi::kind::DEV_IOCTL,
            device,
            request: ffi::ioctl::DIOCTL_GET_GEO,
            proc_nr,
            buffer,
            ..Default::default()
        }
    }
}
