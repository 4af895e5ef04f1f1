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

//! Main loop of the driver.
//!
//! The [`HdTask`] receives requests one by one through a [`Transport`], processes each request
//! entirely, then sends the reply before receiving the next one.

use crate::arch::PlatformSpecific;
use crate::config::DriverConfig;
use crate::drive::{self, Drive, DriveTable, Partition};
use crate::error::{FatalError, ProtocolViolation};
use crate::memory::ProcessMemory;
use crate::partition;
use crate::transfer::{self, Direction, Engine, TransferRequest};

use alloc::sync::Arc;
use core::pin::Pin;
use futures::future::BoxFuture;
use redshirt_hd_interface::{
    ffi::{self, ioctl, kind},
    Message, PartInfo,
};

/// Way for the driver to receive requests and send back replies.
pub trait Transport {
    /// Waits for the next request, from any process.
    fn receive(&mut self) -> BoxFuture<'_, Message>;

    /// Sends `message` to `destination`. Never blocks.
    fn reply(&mut self, destination: u32, message: Message);
}

/// Hard disk driver.
pub struct HdTask<TPlat, TMem> {
    config: DriverConfig,
    engine: Engine<TPlat, TMem>,
    drives: DriveTable,
}

impl<TPlat, TMem> HdTask<TPlat, TMem>
where
    TPlat: PlatformSpecific,
    TMem: ProcessMemory,
{
    /// Initializes the state of the driver. Doesn't touch the hardware.
    pub fn new(config: DriverConfig, platform: Pin<Arc<TPlat>>, memory: TMem) -> Self {
        HdTask {
            engine: Engine::new(&config, platform, memory),
            drives: DriveTable::new(),
            config,
        }
    }

    /// Installs the interrupt handler and unmasks the IRQ lines of the controller.
    ///
    /// Must be called before the first request is processed.
    pub fn init(&self) {
        let platform = self.engine.platform();
        platform.set_interrupt_handler(self.config.irq, self.engine.interrupt_handler());
        if let Some(cascade) = self.config.cascade_irq {
            platform.enable_irq(cascade);
        }
        platform.enable_irq(self.config.irq);

        log::info!(
            "hard disk driver on ports {:#x}/{:#x}, irq {}",
            self.config.io_base,
            self.config.control_port,
            self.config.irq
        );
    }

    /// Processes requests until one of them fails, then returns the error.
    pub async fn serve<T: Transport>(&mut self, transport: &mut T) -> FatalError {
        loop {
            let mut message = transport.receive().await;
            let source = message.source;

            if let Err(error) = self.handle(&mut message).await {
                log::error!("fatal error while processing {:?}: {}", message, error);
                return error;
            }

            transport.reply(source, message);
        }
    }

    /// Processes requests forever. Panics if one of them fails.
    pub async fn run<T: Transport>(mut self, mut transport: T) {
        let error = self.serve(&mut transport).await;
        panic!("hard disk driver stopped: {}", error);
    }

    /// Processes one request and turns `message` into its reply.
    pub async fn handle(&mut self, message: &mut Message) -> Result<(), FatalError> {
        match message.kind {
            kind::DEV_OPEN => self.open(message.device).await?,
            kind::DEV_CLOSE => self.close(message.device)?,
            kind::DEV_READ | kind::DEV_WRITE => {
                let transferred = self.read_write(message).await?;
                message.count = transferred;
            }
            kind::DEV_IOCTL => self.ioctl(message)?,
            other => return Err(ProtocolViolation::UnknownMessage(other).into()),
        }

        message.kind = kind::REPLY;
        message.status = 0;
        Ok(())
    }

    /// Returns the state of the given drive.
    pub fn drive(&self, drive: u32) -> Option<&Drive> {
        self.drives.get(drive)
    }

    pub fn engine(&self) -> &Engine<TPlat, TMem> {
        &self.engine
    }

    async fn open(&mut self, device: u32) -> Result<(), FatalError> {
        let drive_nr = drive::resolve_minor(device)?.drive();
        let drive = self.drives.get_mut(drive_nr)?;
        drive.open_count = drive.open_count.saturating_add(1);
        log::debug!("open device {} (drive {}, count {})", device, drive_nr, drive.open_count);

        if drive.discovered {
            return Ok(());
        }

        let ata_drive = transfer::drive_number(drive_nr)?;
        let identity = self.engine.identify(ata_drive).await?;
        log::info!(
            "drive {}: {} (serial {}), {} sectors, {} MiB, lba: {}, lba48: {}",
            drive_nr,
            identity.model,
            identity.serial,
            identity.sectors,
            identity.capacity_bytes() / (1024 * 1024),
            identity.lba,
            identity.lba48
        );

        drive.whole = Partition {
            base: 0,
            size: identity.sectors,
        };
        drive.identity = Some(identity);

        partition::discover(&mut self.engine, ata_drive, drive).await?;
        drive.discovered = true;
        Ok(())
    }

    fn close(&mut self, device: u32) -> Result<(), FatalError> {
        let drive_nr = drive::resolve_minor(device)?.drive();
        let drive = self.drives.get_mut(drive_nr)?;
        match drive.open_count.checked_sub(1) {
            Some(n) => drive.open_count = n,
            None => log::warn!("close of device {} that isn't open", device),
        }
        log::debug!("close device {} (drive {}, count {})", device, drive_nr, drive.open_count);
        Ok(())
    }

    async fn read_write(&mut self, message: &Message) -> Result<u32, FatalError> {
        let (index, partition) = self.drives.resolve(message.device)?;
        let request = TransferRequest {
            drive: transfer::drive_number(index.drive())?,
            base: partition.base,
            position: message.position,
            count: message.count,
            proc_nr: message.proc_nr,
            buffer: message.buffer,
            direction: if message.kind == kind::DEV_WRITE {
                Direction::Write
            } else {
                Direction::Read
            },
        };

        self.engine.transfer(&request).await
    }

    fn ioctl(&mut self, message: &Message) -> Result<(), FatalError> {
        if message.request != ioctl::DIOCTL_GET_GEO {
            return Err(ProtocolViolation::UnknownIoctl(message.request).into());
        }

        let (_, partition) = self.drives.resolve(message.device)?;
        let bytes = PartInfo::from(partition).to_bytes();
        self.engine
            .memory()
            .write_to(message.proc_nr, message.buffer, &bytes)
            .map_err(|error| ProtocolViolation::BadBuffer {
                proc_nr: message.proc_nr,
                address: message.buffer,
                error,
            })?;

        log::debug!(
            "geometry of device {}: base {} size {} ({} bytes)",
            message.device,
            partition.base,
            partition.size,
            u64::from(partition.size) * u64::from(ffi::SECTOR_SIZE)
        );
        Ok(())
    }
}
