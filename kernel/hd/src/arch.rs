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

//! Platform-specific hooks needed by the driver.
//!
//! The driver never touches the hardware directly. Every port access, every clock read, and
//! every interaction with the interrupt controller goes through the [`PlatformSpecific`] trait,
//! which the kernel implements.

use crate::interrupt::InterruptHandler;

use core::pin::Pin;

/// Access to all the platform-specific functionalities the driver relies upon.
pub trait PlatformSpecific: Send + Sync + 'static {
    /// Returns the number of nanoseconds that happened since an undeterminate moment in time.
    ///
    /// > **Note**: The returned value is provided on a "best effort" basis and is not
    /// >           necessarily exact (it is, in fact, rarely exact).
    fn monotonic_clock(self: Pin<&Self>) -> u128;

    /// Writes a `u8` on a port. Returns an error if the operation is not supported or if the port
    /// is out of range.
    unsafe fn write_port_u8(self: Pin<&Self>, port: u32, data: u8) -> Result<(), PortErr>;
    /// Writes a `u16` on a port. Returns an error if the operation is not supported or if the
    /// port is out of range.
    unsafe fn write_port_u16(self: Pin<&Self>, port: u32, data: u16) -> Result<(), PortErr>;
    /// Reads a `u8` from a port. Returns an error if the operation is not supported or if the
    /// port is out of range.
    unsafe fn read_port_u8(self: Pin<&Self>, port: u32) -> Result<u8, PortErr>;
    /// Reads a `u16` from a port. Returns an error if the operation is not supported or if the
    /// port is out of range.
    unsafe fn read_port_u16(self: Pin<&Self>, port: u32) -> Result<u16, PortErr>;

    /// Installs the handler to invoke, in interrupt context, whenever the given IRQ line fires.
    ///
    /// Replaces any handler previously installed on the same line.
    fn set_interrupt_handler(self: Pin<&Self>, irq: u8, handler: InterruptHandler);

    /// Unmasks the given IRQ line in the interrupt controller.
    fn enable_irq(self: Pin<&Self>, irq: u8);
}

/// Error when requesting to read/write a hardware port.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum PortErr {
    /// Operation is not supported by the hardware.
    #[display("Operation is not supported by the hardware")]
    Unsupported,
    /// Port is out of range.
    #[display("Port is out of range")]
    OutOfRange,
}
