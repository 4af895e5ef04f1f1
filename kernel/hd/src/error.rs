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

//! Errors that stop the driver.
//!
//! The driver has no recoverable error path. Every problem it detects is reported as a
//! [`FatalError`], after which the task halts. The two families are kept apart so that the
//! system can, in the future, decide to restart the driver after a [`HardwareFault`] while still
//! treating a [`ProtocolViolation`] as a bug in the emitter of the request.

use crate::arch::PortErr;
use crate::memory::MemoryErr;

/// Error after which the driver can't continue.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::From)]
pub enum FatalError {
    /// The emitter of a request didn't respect the protocol.
    #[display("protocol violation: {_0}")]
    Protocol(ProtocolViolation),
    /// The controller misbehaved.
    #[display("hardware fault: {_0}")]
    Hardware(HardwareFault),
}

/// Request that the driver refuses to process.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ProtocolViolation {
    #[display("unknown message kind {_0}")]
    UnknownMessage(u32),
    #[display("unknown ioctl request {_0}")]
    UnknownIoctl(u32),
    #[display("minor {_0} doesn't designate any device")]
    InvalidMinor(u32),
    /// Only the first drive of the controller is supported.
    #[display("drive {_0} isn't supported")]
    UnsupportedDrive(u32),
    #[display("minor {_0} designates a logical partition that doesn't exist")]
    NoSuchPartition(u32),
    #[display("position {_0:#x} isn't a multiple of the sector size")]
    UnalignedPosition(u64),
    #[display("position {_0:#x} is beyond the addressable range")]
    PositionOutOfRange(u64),
    /// The sector can't be expressed with a 28-bit LBA.
    #[display("sector {_0} can't be addressed")]
    SectorOutOfRange(u64),
    #[display("buffer {address:#x} of process {proc_nr} is invalid: {error}")]
    BadBuffer {
        proc_nr: u32,
        address: u64,
        error: MemoryErr,
    },
}

/// Unexpected behaviour of the controller.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum HardwareFault {
    #[display("access to port {port:#x} refused: {error}")]
    Port { port: u32, error: PortErr },
    /// The BSY bit didn't clear before the timeout.
    #[display("controller still busy after timeout")]
    BusyTimeout,
    /// The DRQ bit didn't get set before the timeout.
    #[display("controller didn't request data before timeout")]
    DrqTimeout,
    #[display("command failed (status {status:#04x}, error {error:#04x})")]
    CommandFailed { status: u8, error: u8 },
}
