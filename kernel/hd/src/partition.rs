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

//! Partition tables.
//!
//! The boot sector of a drive holds a table of four entries at offset `0x1be`. An entry whose
//! type is one of the extended types points to an extended partition, whose first sector holds
//! another table of the same layout:
//!
//! - The first entry describes a logical partition. Its start is relative to the sector holding
//!   the table.
//! - The second entry, if not empty, points to the next table of the chain. Its start is
//!   relative to the beginning of the extended partition.
//!
//! Bibliography:
//!
//! - https://wiki.osdev.org/MBR_(x86)
//! - https://en.wikipedia.org/wiki/Extended_boot_record
//!

use crate::arch::PlatformSpecific;
use crate::ata::{self, SECTOR_BYTES};
use crate::drive::{Drive, Partition};
use crate::error::FatalError;
use crate::memory::ProcessMemory;
use crate::transfer::Engine;

use alloc::vec::Vec;
use core::convert::TryFrom as _;
use redshirt_hd_interface::ffi;

/// Offset of the partition table within a boot sector.
pub const PARTITION_TABLE_OFFSET: usize = 0x1be;
/// Size of an entry of the partition table.
pub const PARTITION_ENTRY_SIZE: usize = 16;

/// Type of an unused entry.
pub const NO_PART: u8 = 0x00;
/// Types designating an extended partition: CHS, LBA, and Linux.
pub const EXT_PART_TYPES: [u8; 3] = [0x05, 0x0f, 0x85];

/// Maximum number of tables followed within one extended partition.
const MAX_CHAIN_LEN: u32 = ffi::NR_SUB_PER_PART;
/// Maximum number of logical partitions per drive.
const MAX_LOGICAL: usize = ffi::NR_SUB_PER_DRIVE as usize;

/// Entry of a partition table, as stored on the disk.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PartitionTableEntry {
    /// `0x80` if the partition is bootable.
    pub boot_ind: u8,
    pub start_head: u8,
    pub start_sector: u8,
    pub start_cyl: u8,
    /// Type of the partition.
    pub sys_id: u8,
    pub end_head: u8,
    pub end_sector: u8,
    pub end_cyl: u8,
    /// First sector, relative to a base that depends on the table.
    pub start_sect: u32,
    /// Number of sectors.
    pub nr_sects: u32,
}

impl PartitionTableEntry {
    pub fn from_bytes(bytes: &[u8; PARTITION_ENTRY_SIZE]) -> Self {
        PartitionTableEntry {
            boot_ind: bytes[0],
            start_head: bytes[1],
            start_sector: bytes[2],
            start_cyl: bytes[3],
            sys_id: bytes[4],
            end_head: bytes[5],
            end_sector: bytes[6],
            end_cyl: bytes[7],
            start_sect: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            nr_sects: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; PARTITION_ENTRY_SIZE] {
        let mut out = [0; PARTITION_ENTRY_SIZE];
        out[..8].copy_from_slice(&[
            self.boot_ind,
            self.start_head,
            self.start_sector,
            self.start_cyl,
            self.sys_id,
            self.end_head,
            self.end_sector,
            self.end_cyl,
        ]);
        out[8..12].copy_from_slice(&self.start_sect.to_le_bytes());
        out[12..].copy_from_slice(&self.nr_sects.to_le_bytes());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.sys_id == NO_PART
    }

    pub fn is_extended(&self) -> bool {
        EXT_PART_TYPES.contains(&self.sys_id)
    }
}

/// Extracts the four entries of the partition table of a boot sector.
///
/// The boot signature isn't checked.
pub fn parse_table(sector: &[u8; SECTOR_BYTES]) -> [PartitionTableEntry; 4] {
    let mut out = [PartitionTableEntry::default(); 4];
    for (n, entry) in out.iter_mut().enumerate() {
        let offset = PARTITION_TABLE_OFFSET + n * PARTITION_ENTRY_SIZE;
        // Can't fail, as the slice has the right length.
        if let Ok(bytes) =
            <&[u8; PARTITION_ENTRY_SIZE]>::try_from(&sector[offset..offset + PARTITION_ENTRY_SIZE])
        {
            *entry = PartitionTableEntry::from_bytes(bytes);
        }
    }
    out
}

/// Reads the partition tables of the drive and fills `target.primary` and `target.logical`.
///
/// `target.whole` must already contain the extent of the drive. A size of 0 disables the checks
/// against the end of the drive.
pub async fn discover<TPlat, TMem>(
    engine: &mut Engine<TPlat, TMem>,
    drive: u8,
    target: &mut Drive,
) -> Result<(), FatalError>
where
    TPlat: PlatformSpecific,
    TMem: ProcessMemory,
{
    let capacity = target.whole.size;
    let table = parse_table(engine.read_sector(drive, 0).await?);

    for (n, (slot, entry)) in target.primary.iter_mut().zip(table.iter()).enumerate() {
        *slot = Partition {
            base: entry.start_sect,
            size: entry.nr_sects,
        };
        if !entry.is_empty() {
            log::debug!(
                "drive {}: primary {} type {:#04x} base {} size {}",
                drive,
                n,
                entry.sys_id,
                slot.base,
                slot.size
            );
            check_extent(drive, *slot, capacity);
        }
    }

    if table.iter().all(|e| e.is_empty()) {
        log::warn!("drive {}: boot sector has no partition", drive);
    }

    target.logical.clear();
    for entry in table.iter().filter(|e| e.is_extended()) {
        walk_extended(engine, drive, entry.start_sect, capacity, &mut target.logical).await?;
    }

    log::info!(
        "drive {}: {} primary, {} logical partitions",
        drive,
        table.iter().filter(|e| !e.is_empty()).count(),
        target.logical.len()
    );
    Ok(())
}

/// Follows the chain of tables of the extended partition starting at `ext_start`, and appends
/// the logical partitions it finds to `out`.
async fn walk_extended<TPlat, TMem>(
    engine: &mut Engine<TPlat, TMem>,
    drive: u8,
    ext_start: u32,
    capacity: u32,
    out: &mut Vec<Partition>,
) -> Result<(), FatalError>
where
    TPlat: PlatformSpecific,
    TMem: ProcessMemory,
{
    let mut table_sector = ext_start;

    for _ in 0..MAX_CHAIN_LEN {
        if out.len() >= MAX_LOGICAL {
            log::warn!("drive {}: too many logical partitions; ignoring the rest", drive);
            return Ok(());
        }

        if u64::from(table_sector) >= ata::LBA28_SECTORS
            || (capacity != 0 && table_sector >= capacity)
        {
            log::warn!(
                "drive {}: extended partition table at sector {} is past the end",
                drive,
                table_sector
            );
            return Ok(());
        }

        let table = parse_table(engine.read_sector(drive, table_sector).await?);

        let base = match table_sector.checked_add(table[0].start_sect) {
            Some(b) => b,
            None => {
                log::warn!("drive {}: logical partition past sector 2^32", drive);
                return Ok(());
            }
        };

        let logical = Partition {
            base,
            size: table[0].nr_sects,
        };
        log::debug!(
            "drive {}: logical {} base {} size {}",
            drive,
            out.len(),
            logical.base,
            logical.size
        );
        check_extent(drive, logical, capacity);
        out.push(logical);

        if table[1].is_empty() {
            return Ok(());
        }

        table_sector = match ext_start.checked_add(table[1].start_sect) {
            Some(s) => s,
            None => {
                log::warn!("drive {}: extended partition chain points past sector 2^32", drive);
                return Ok(());
            }
        };
    }

    log::warn!(
        "drive {}: extended partition at sector {} truncated after {} tables",
        drive,
        ext_start,
        MAX_CHAIN_LEN
    );
    Ok(())
}

fn check_extent(drive: u8, partition: Partition, capacity: u32) {
    if capacity == 0 {
        return;
    }

    if u64::from(partition.base) + u64::from(partition.size) > u64::from(capacity) {
        log::warn!(
            "drive {}: partition at sector {} of size {} ends past the drive ({} sectors)",
            drive,
            partition.base,
            partition.size,
            capacity
        );
    }
}
