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

//! Copying data between the driver and the address space of other processes.

use alloc::sync::Arc;

/// Access to the memory of the processes that emit requests.
///
/// Implemented by the kernel. The driver's side of every copy is a slice of its own memory.
pub trait ProcessMemory {
    /// Copies `data` at `address` in the address space of `proc_nr`.
    fn write_to(&self, proc_nr: u32, address: u64, data: &[u8]) -> Result<(), MemoryErr>;

    /// Fills `out` with the bytes found at `address` in the address space of `proc_nr`.
    fn read_from(&self, proc_nr: u32, address: u64, out: &mut [u8]) -> Result<(), MemoryErr>;
}

impl<T: ?Sized + ProcessMemory> ProcessMemory for Arc<T> {
    fn write_to(&self, proc_nr: u32, address: u64, data: &[u8]) -> Result<(), MemoryErr> {
        (**self).write_to(proc_nr, address, data)
    }

    fn read_from(&self, proc_nr: u32, address: u64, out: &mut [u8]) -> Result<(), MemoryErr> {
        (**self).read_from(proc_nr, address, out)
    }
}

/// Error when copying from or to the memory of a process.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MemoryErr {
    #[display("no such process")]
    UnknownProcess,
    #[display("address range isn't mapped")]
    BadAddress,
}
