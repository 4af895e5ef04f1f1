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

//! Moving sectors between the controller and the memory of processes.
//!
//! The [`Engine`] owns the ports of the controller, the receiving end of the
//! [`InterruptSignal`], and a sector-sized scratch buffer that every transfer goes through.
//!
//! Each sector of a read is announced by an interrupt, after which the sector is read from the
//! data port and copied to the caller. For a write, the driver waits for the controller to set
//! DRQ, pushes the sector to the data port, then waits for the interrupt that acknowledges it.

use crate::arch::PlatformSpecific;
use crate::ata::{self, AtaCommand, DriveIdentity, Ports, SECTOR_BYTES};
use crate::config::DriverConfig;
use crate::error::{FatalError, HardwareFault, ProtocolViolation};
use crate::interrupt::{self, InterruptHandler, InterruptSignal};
use crate::memory::ProcessMemory;

use alloc::{boxed::Box, sync::Arc};
use core::{cmp, convert::TryFrom as _, pin::Pin, time::Duration};
use redshirt_hd_interface::ffi::{SECTOR_SIZE, SECTOR_SIZE_SHIFT};

/// Highest sector, relative to the start of a partition, that a request can start at.
const MAX_RELATIVE_SECTOR: u64 = (1 << 31) - 1;

/// Direction of a transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// From the disk to the caller.
    Read,
    /// From the caller to the disk.
    Write,
}

/// Transfer to perform, extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub drive: u8,
    /// First sector of the partition the request targets.
    pub base: u32,
    /// Byte offset within the partition.
    pub position: u64,
    /// Number of bytes.
    pub count: u32,
    pub proc_nr: u32,
    pub buffer: u64,
    pub direction: Direction,
}

/// Issues commands to the controller and moves data.
pub struct Engine<TPlat, TMem> {
    platform: Pin<Arc<TPlat>>,
    memory: TMem,
    ports: Ports,
    signal: Arc<InterruptSignal>,
    timeout: Duration,
    /// Every sector read or written goes through this buffer.
    scratch: Box<[u8; SECTOR_BYTES]>,
}

impl<TPlat, TMem> Engine<TPlat, TMem>
where
    TPlat: PlatformSpecific,
    TMem: ProcessMemory,
{
    pub fn new(config: &DriverConfig, platform: Pin<Arc<TPlat>>, memory: TMem) -> Self {
        Engine {
            platform,
            memory,
            ports: Ports::new(config.io_base, config.control_port),
            signal: Arc::new(InterruptSignal::new()),
            timeout: config.timeout,
            scratch: Box::new([0; SECTOR_BYTES]),
        }
    }

    pub fn platform(&self) -> Pin<&TPlat> {
        self.platform.as_ref()
    }

    pub fn memory(&self) -> &TMem {
        &self.memory
    }

    pub fn signal(&self) -> &Arc<InterruptSignal> {
        &self.signal
    }

    /// Builds the handler to install on the IRQ line of the controller.
    pub fn interrupt_handler(&self) -> InterruptHandler {
        InterruptHandler::for_controller(self.platform.clone(), self.ports, self.signal.clone())
    }

    /// Waits for the controller to be idle, then writes `cmd` to its registers.
    pub fn issue(&mut self, cmd: &AtaCommand) -> Result<(), FatalError> {
        if self.signal.discard() {
            log::warn!("discarding unconsumed interrupt before command {:#04x}", cmd.command);
        }

        if !interrupt::wait_for_status(
            self.platform.as_ref(),
            &self.ports,
            ata::STATUS_BSY,
            0,
            self.timeout,
        )? {
            return Err(HardwareFault::BusyTimeout.into());
        }

        log::trace!("issuing {:?}", cmd);
        ata::write_command(self.platform.as_ref(), &self.ports, cmd)?;
        Ok(())
    }

    /// Waits for the next interrupt of the controller. Returns an error if the status read by
    /// the interrupt handler reports a failure.
    pub async fn wait_interrupt(&mut self) -> Result<u8, FatalError> {
        let status = self.signal.wait().await;
        if (status & (ata::STATUS_ERR | ata::STATUS_DF)) != 0 {
            let error = ata::read_error(self.platform.as_ref(), &self.ports)?;
            return Err(HardwareFault::CommandFailed { status, error }.into());
        }
        Ok(status)
    }

    /// Sends IDENTIFY DEVICE to the given drive and parses the answer.
    pub async fn identify(&mut self, drive: u8) -> Result<DriveIdentity, FatalError> {
        self.issue(&AtaCommand::identify(drive))?;
        self.wait_interrupt().await?;
        ata::port_read(self.platform.as_ref(), &self.ports, &mut self.scratch[..])?;
        Ok(DriveIdentity::parse(&self.scratch))
    }

    /// Reads one sector of the drive into the scratch buffer and returns it.
    pub async fn read_sector(
        &mut self,
        drive: u8,
        sector: u32,
    ) -> Result<&[u8; SECTOR_BYTES], FatalError> {
        if u64::from(sector) >= ata::LBA28_SECTORS {
            return Err(ProtocolViolation::SectorOutOfRange(u64::from(sector)).into());
        }

        self.issue(&AtaCommand::lba28(ata::ATA_READ, drive, sector, 1))?;
        self.wait_interrupt().await?;
        ata::port_read(self.platform.as_ref(), &self.ports, &mut self.scratch[..])?;
        Ok(&*self.scratch)
    }

    /// Performs the transfer. Returns the number of bytes transferred, which is always
    /// `request.count`.
    pub async fn transfer(&mut self, request: &TransferRequest) -> Result<u32, FatalError> {
        if request.position % u64::from(SECTOR_SIZE) != 0 {
            return Err(ProtocolViolation::UnalignedPosition(request.position).into());
        }

        let relative = request.position >> SECTOR_SIZE_SHIFT;
        if relative > MAX_RELATIVE_SECTOR {
            return Err(ProtocolViolation::PositionOutOfRange(request.position).into());
        }

        if request.count == 0 {
            return Ok(0);
        }

        let num_sectors = sectors_spanned(request.count);
        let first = u64::from(request.base) + relative;
        let last = first + num_sectors - 1;
        if last >= ata::LBA28_SECTORS {
            return Err(ProtocolViolation::SectorOutOfRange(last).into());
        }

        let opcode = match request.direction {
            Direction::Read => ata::ATA_READ,
            Direction::Write => ata::ATA_WRITE,
        };

        log::debug!(
            "{:?} of {} bytes at sector {} of drive {}",
            request.direction,
            request.count,
            first,
            request.drive
        );

        // Both fit in 28 bits, as checked above.
        let mut sector = first as u32;
        let mut sectors_left = num_sectors as u32;
        let mut bytes_left = request.count as usize;
        let mut address = request.buffer;

        while sectors_left != 0 {
            let batch = cmp::min(sectors_left, ata::MAX_SECTORS_PER_COMMAND);
            self.issue(&AtaCommand::lba28(opcode, request.drive, sector, batch))?;

            for _ in 0..batch {
                let chunk = cmp::min(bytes_left, SECTOR_BYTES);
                match request.direction {
                    Direction::Read => self.read_one(request.proc_nr, address, chunk).await?,
                    Direction::Write => self.write_one(request.proc_nr, address, chunk).await?,
                }
                address = address.wrapping_add(chunk as u64);
                bytes_left -= chunk;
            }

            sector += batch;
            sectors_left -= batch;
        }

        debug_assert_eq!(bytes_left, 0);
        Ok(request.count)
    }

    /// Receives the next sector of a read and copies its first `len` bytes to the caller.
    async fn read_one(&mut self, proc_nr: u32, address: u64, len: usize) -> Result<(), FatalError> {
        self.wait_interrupt().await?;
        ata::port_read(self.platform.as_ref(), &self.ports, &mut self.scratch[..])?;
        self.memory
            .write_to(proc_nr, address, &self.scratch[..len])
            .map_err(|error| ProtocolViolation::BadBuffer {
                proc_nr,
                address,
                error,
            })?;
        Ok(())
    }

    /// Sends the next sector of a write, made of `len` bytes of the caller followed with zeroes.
    async fn write_one(
        &mut self,
        proc_nr: u32,
        address: u64,
        len: usize,
    ) -> Result<(), FatalError> {
        if !interrupt::wait_for_status(
            self.platform.as_ref(),
            &self.ports,
            ata::STATUS_DRQ,
            ata::STATUS_DRQ,
            self.timeout,
        )? {
            return Err(HardwareFault::DrqTimeout.into());
        }

        let (data, padding) = self.scratch.split_at_mut(len);
        self.memory
            .read_from(proc_nr, address, data)
            .map_err(|error| ProtocolViolation::BadBuffer {
                proc_nr,
                address,
                error,
            })?;
        for b in padding {
            *b = 0;
        }

        ata::port_write(self.platform.as_ref(), &self.ports, &self.scratch[..])?;
        self.wait_interrupt().await?;
        Ok(())
    }
}

/// Number of sectors needed to hold `bytes` bytes.
fn sectors_spanned(bytes: u32) -> u64 {
    (u64::from(bytes) + u64::from(SECTOR_SIZE) - 1) >> SECTOR_SIZE_SHIFT
}

/// Converts the drive number of a device into the value written in the device register.
pub fn drive_number(drive: u32) -> Result<u8, FatalError> {
    u8::try_from(drive).map_err(|_| ProtocolViolation::UnsupportedDrive(drive).into())
}
