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

//! Hard disk driver.
//!
//! This library implements a driver for the hard disk attached to the primary channel of an
//! ATA controller, in PIO mode. The driver runs as a task of the kernel. Other programs send it
//! requests in the form of [`Message`](redshirt_hd_interface::Message)s (see the
//! `redshirt-hd-interface` crate), and the driver sends back each message as a reply once the
//! request has been processed.
//!
//! # Overview
//!
//! - The [`HdTask`] is the entry point. It receives requests through a [`Transport`] and
//! processes them one at a time.
//! - On the first opening of a drive, the driver identifies it and reads its partition tables.
//! This information is then kept for the entire lifetime of the driver.
//! - Reads and writes are performed one sector at a time. The controller signals each sector
//! with an interrupt, which the driver waits for.
//!
//! # Kernel environment
//!
//! The driver doesn't access the hardware directly. The kernel must provide an implementation
//! of [`PlatformSpecific`] giving access to the I/O ports, a monotonic clock, and the interrupt
//! controller, and an implementation of [`ProcessMemory`] to copy data from and to the memory of
//! other processes.
//!
//! # Errors
//!
//! The driver never reports an error to the emitter of a request. Malformed requests and
//! misbehaving hardware are both fatal: [`HdTask::serve`] returns a [`FatalError`] and the task
//! isn't supposed to continue afterwards.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod ata;
pub mod config;
pub mod drive;
pub mod error;
pub mod interrupt;
pub mod memory;
pub mod partition;
pub mod task;
pub mod transfer;


pub use arch::{PlatformSpecific, PortErr};
pub use config::DriverConfig;
pub use error::{FatalError, HardwareFault, ProtocolViolation};
pub use interrupt::{InterruptHandler, InterruptSignal};
pub use memory::{MemoryErr, ProcessMemory};
pub use task::{HdTask, Transport};
