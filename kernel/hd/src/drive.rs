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

//! State kept about each drive.

use crate::ata::DriveIdentity;
use crate::error::{FatalError, ProtocolViolation};

use alloc::vec::Vec;
use core::convert::TryFrom as _;
use redshirt_hd_interface::{ffi, DeviceIndex, PartInfo};

/// Number of drives the driver is capable of handling.
// TODO: handle the slave drive; requires selecting the drive before every command
pub const SUPPORTED_DRIVES: usize = 1;

/// Location of a partition on its drive, in sectors.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Partition {
    pub base: u32,
    pub size: u32,
}

impl From<Partition> for PartInfo {
    fn from(p: Partition) -> PartInfo {
        PartInfo {
            base: p.base,
            size: p.size,
        }
    }
}

/// State of a single drive.
#[derive(Debug, Default)]
pub struct Drive {
    /// Number of `open` minus number of `close` received for devices of this drive.
    pub open_count: u32,
    /// Filled on the first open.
    pub identity: Option<DriveIdentity>,
    /// True once the partition tables have been read. They are never read again afterwards.
    pub discovered: bool,
    /// Extent of the entire drive.
    pub whole: Partition,
    /// Entries of the partition table of the boot sector, in order.
    pub primary: [Partition; ffi::NR_PART_PER_DRIVE as usize],
    /// Partitions found in the extended partitions, in the order they were found.
    pub logical: Vec<Partition>,
}

impl Drive {
    /// Returns the extent of the given device, or `None` if it designates a logical partition
    /// that hasn't been found.
    ///
    /// The drive number of `index` isn't checked.
    pub fn partition(&self, index: DeviceIndex) -> Option<Partition> {
        match index {
            DeviceIndex::Whole { .. } => Some(self.whole),
            DeviceIndex::Primary { index, .. } => {
                self.primary.get(usize::try_from(index).ok()?).copied()
            }
            DeviceIndex::Logical { index, .. } => {
                self.logical.get(usize::try_from(index).ok()?).copied()
            }
        }
    }
}

/// All the drives of the controller. Lives as long as the driver.
#[derive(Debug, Default)]
pub struct DriveTable {
    drives: [Drive; SUPPORTED_DRIVES],
}

impl DriveTable {
    pub fn new() -> Self {
        DriveTable::default()
    }

    pub fn get(&self, drive: u32) -> Option<&Drive> {
        self.drives.get(usize::try_from(drive).ok()?)
    }

    /// Returns the given drive, or an error if the driver doesn't support it.
    pub fn get_mut(&mut self, drive: u32) -> Result<&mut Drive, FatalError> {
        usize::try_from(drive)
            .ok()
            .and_then(move |n| self.drives.get_mut(n))
            .ok_or_else(|| ProtocolViolation::UnsupportedDrive(drive).into())
    }

    /// Decodes `minor` and returns the extent of the device it designates.
    pub fn resolve(&self, minor: u32) -> Result<(DeviceIndex, Partition), FatalError> {
        let index = resolve_minor(minor)?;
        let drive = self
            .get(index.drive())
            .ok_or(ProtocolViolation::UnsupportedDrive(index.drive()))?;
        let partition = drive
            .partition(index)
            .ok_or(ProtocolViolation::NoSuchPartition(minor))?;
        Ok((index, partition))
    }
}

/// Decodes `minor`, or returns an error if it doesn't designate anything.
pub fn resolve_minor(minor: u32) -> Result<DeviceIndex, FatalError> {
    DeviceIndex::from_minor(minor).ok_or_else(|| ProtocolViolation::InvalidMinor(minor).into())
}
