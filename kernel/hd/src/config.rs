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

use core::time::Duration;

/// Configuration of the driver.
///
/// The default values correspond to the primary channel of a PC-compatible ATA controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// First port of the command block. Registers are found at fixed offsets from it.
    pub io_base: u32,
    /// Port of the device control register.
    pub control_port: u32,
    /// IRQ line the controller raises.
    pub irq: u8,
    /// Line of the slave interrupt controller on the master one, if `irq` is behind it.
    pub cascade_irq: Option<u8>,
    /// Maximum time to wait for the controller to change its status.
    pub timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            io_base: 0x1f0,
            control_port: 0x3f6,
            irq: 14,
            cascade_irq: Some(2),
            timeout: Duration::from_millis(10_000),
        }
    }
}
