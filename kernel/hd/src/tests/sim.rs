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

//! Simulated ATA controller, address spaces, and transport.

use crate::arch::{PlatformSpecific, PortErr};
use crate::ata::{self, AtaCommand, SECTOR_BYTES};
use crate::interrupt::InterruptHandler;
use crate::memory::{MemoryErr, ProcessMemory};
use crate::partition::{PartitionTableEntry, PARTITION_ENTRY_SIZE, PARTITION_TABLE_OFFSET};
use crate::{DriverConfig, FatalError, HdTask, Transport};

use futures::{future::BoxFuture, prelude::*};
use redshirt_hd_interface::Message;
use std::{
    collections::{HashMap, VecDeque},
    convert::TryFrom as _,
    pin::Pin,
    sync::{atomic, Arc, Mutex},
    time::Duration,
};

pub const IO_BASE: u32 = 0x1f0;
pub const CONTROL: u32 = 0x3f6;
pub const IRQ: u8 = 14;
pub const CASCADE_IRQ: u8 = 2;

/// Process that emits the requests of the tests.
pub const CALLER: u32 = 7;
/// Size of the address space of [`CALLER`].
pub const CALLER_MEMORY: usize = 1024 * 1024;

/// Timeout passed to the driver.
pub const TIMEOUT: Duration = Duration::from_millis(100);

/// Every read of the status register advances the clock by this amount.
const NS_PER_STATUS_READ: u64 = 1_000_000;

/// "Sector not found" bit of the error register.
const ERROR_IDNF: u8 = 0x10;
/// "Command aborted" bit of the error register.
const ERROR_ABRT: u8 = 0x04;

pub type TestTask = HdTask<SimulatedController, Arc<SimulatedMemory>>;

/// Builds a driver connected to a controller holding `disk`.
pub fn setup(disk: DiskImage) -> (TestTask, Pin<Arc<SimulatedController>>, Arc<SimulatedMemory>) {
    let controller = SimulatedController::new(disk);
    let memory = SimulatedMemory::new();
    memory.add_process(CALLER, CALLER_MEMORY);

    let config = DriverConfig {
        timeout: TIMEOUT,
        ..Default::default()
    };
    let task = HdTask::new(config, controller.clone(), memory.clone());
    task.init();
    (task, controller, memory)
}

/// Processes `message` and returns the reply.
pub fn request(task: &mut TestTask, mut message: Message) -> Result<Message, FatalError> {
    futures::executor::block_on(task.handle(&mut message))?;
    Ok(message)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Op {
    Idle,
    Identify,
    Read { lba: u32, remaining: u32 },
    Write { lba: u32, remaining: u32 },
}

struct State {
    disk: Vec<u8>,
    identify: [u8; SECTOR_BYTES],
    /// Command block registers, indexed by offset from the I/O base.
    regs: [u8; 8],
    control: u8,
    status: u8,
    error: u8,
    op: Op,
    buffer: [u8; SECTOR_BYTES],
    buffer_pos: usize,
    never_drq: bool,
    commands: Vec<AtaCommand>,
    sectors_transferred: u32,
    enabled_irqs: Vec<u8>,
}

/// ATA controller backed by an in-memory disk image.
///
/// Interrupts are raised synchronously, from within the port access that causes them.
pub struct SimulatedController {
    state: Mutex<State>,
    handlers: Mutex<HashMap<u8, InterruptHandler>>,
    /// Nanoseconds.
    clock: atomic::AtomicU64,
}

impl SimulatedController {
    pub fn new(disk: DiskImage) -> Pin<Arc<Self>> {
        let identify = identify_block(disk.sectors());
        Arc::pin(SimulatedController {
            state: Mutex::new(State {
                disk: disk.data,
                identify,
                regs: [0; 8],
                control: 0,
                status: ata::STATUS_DRDY | ata::STATUS_DSC,
                error: 0,
                op: Op::Idle,
                buffer: [0; SECTOR_BYTES],
                buffer_pos: 0,
                never_drq: false,
                commands: Vec::new(),
                sectors_transferred: 0,
                enabled_irqs: Vec::new(),
            }),
            handlers: Mutex::new(HashMap::new()),
            clock: atomic::AtomicU64::new(0),
        })
    }

    /// If true, the controller never requests data after a WRITE command.
    pub fn set_never_drq(&self, never_drq: bool) {
        self.state.lock().unwrap().never_drq = never_drq;
    }

    /// Every command written to the controller so far.
    pub fn commands(&self) -> Vec<AtaCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of sectors that went through the data port.
    pub fn sectors_transferred(&self) -> u32 {
        self.state.lock().unwrap().sectors_transferred
    }

    pub fn sector(&self, lba: u32) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let start = lba as usize * SECTOR_BYTES;
        state.disk[start..start + SECTOR_BYTES].to_vec()
    }

    pub fn enabled_irqs(&self) -> Vec<u8> {
        self.state.lock().unwrap().enabled_irqs.clone()
    }

    pub fn has_handler(&self, irq: u8) -> bool {
        self.handlers.lock().unwrap().contains_key(&irq)
    }

    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.clock.load(atomic::Ordering::SeqCst))
    }

    fn raise_interrupt(&self) {
        let enabled = {
            let state = self.state.lock().unwrap();
            // Bit 1 of the device control register masks the interrupts of the device.
            state.enabled_irqs.contains(&IRQ) && (state.control & 0x02) == 0
        };
        if !enabled {
            return;
        }

        let handler = self.handlers.lock().unwrap().get(&IRQ).cloned();
        if let Some(handler) = handler {
            handler.on_interrupt();
        }
    }
}

impl State {
    /// Starts the command found in the registers. Returns true if an interrupt must be raised.
    fn start_command(&mut self) -> bool {
        let cmd = AtaCommand {
            features: self.regs[1],
            count: self.regs[2],
            lba_low: self.regs[3],
            lba_mid: self.regs[4],
            lba_high: self.regs[5],
            device: self.regs[6],
            command: self.regs[7],
        };
        self.commands.push(cmd);
        self.buffer_pos = 0;

        let count = if cmd.count == 0 {
            256
        } else {
            u32::from(cmd.count)
        };

        match cmd.command {
            ata::ATA_IDENTIFY => {
                self.buffer = self.identify;
                self.op = Op::Identify;
                self.status = ata::STATUS_DRDY | ata::STATUS_DRQ;
                true
            }
            ata::ATA_READ | ata::ATA_WRITE if !self.in_range(cmd.lba(), count) => {
                self.fail(ERROR_IDNF);
                true
            }
            ata::ATA_READ => {
                self.op = Op::Read {
                    lba: cmd.lba(),
                    remaining: count,
                };
                self.load_sector(cmd.lba());
                self.status = ata::STATUS_DRDY | ata::STATUS_DRQ;
                true
            }
            ata::ATA_WRITE => {
                self.op = Op::Write {
                    lba: cmd.lba(),
                    remaining: count,
                };
                self.status = if self.never_drq {
                    ata::STATUS_DRDY
                } else {
                    ata::STATUS_DRDY | ata::STATUS_DRQ
                };
                false
            }
            _ => {
                self.fail(ERROR_ABRT);
                true
            }
        }
    }

    fn in_range(&self, lba: u32, count: u32) -> bool {
        (u64::from(lba) + u64::from(count)) * SECTOR_BYTES as u64 <= self.disk.len() as u64
    }

    fn fail(&mut self, error: u8) {
        self.op = Op::Idle;
        self.error = error;
        self.status = ata::STATUS_DRDY | ata::STATUS_ERR;
    }

    fn finish(&mut self) {
        self.op = Op::Idle;
        self.buffer_pos = 0;
        self.status = ata::STATUS_DRDY | ata::STATUS_DSC;
    }

    fn load_sector(&mut self, lba: u32) {
        let start = lba as usize * SECTOR_BYTES;
        self.buffer
            .copy_from_slice(&self.disk[start..start + SECTOR_BYTES]);
        self.buffer_pos = 0;
    }

    /// Returns the next word of the data port, and whether an interrupt must be raised.
    fn read_data(&mut self) -> (u16, bool) {
        if (self.status & ata::STATUS_DRQ) == 0 {
            return (0xffff, false);
        }

        let pos = self.buffer_pos;
        let value = u16::from_le_bytes([self.buffer[pos], self.buffer[pos + 1]]);
        self.buffer_pos += 2;
        if self.buffer_pos < SECTOR_BYTES {
            return (value, false);
        }

        match self.op {
            Op::Identify => {
                self.finish();
                (value, false)
            }
            Op::Read { lba, remaining } => {
                self.sectors_transferred += 1;
                if remaining > 1 {
                    self.op = Op::Read {
                        lba: lba + 1,
                        remaining: remaining - 1,
                    };
                    self.load_sector(lba + 1);
                    (value, true)
                } else {
                    self.finish();
                    (value, false)
                }
            }
            Op::Write { .. } | Op::Idle => (value, false),
        }
    }

    /// Pushes a word to the data port. Returns whether an interrupt must be raised.
    fn write_data(&mut self, value: u16) -> bool {
        let (lba, remaining) = match self.op {
            Op::Write { lba, remaining } if (self.status & ata::STATUS_DRQ) != 0 => {
                (lba, remaining)
            }
            _ => return false,
        };

        let pos = self.buffer_pos;
        self.buffer[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
        self.buffer_pos += 2;
        if self.buffer_pos < SECTOR_BYTES {
            return false;
        }

        let start = lba as usize * SECTOR_BYTES;
        self.disk[start..start + SECTOR_BYTES].copy_from_slice(&self.buffer);
        self.sectors_transferred += 1;

        if remaining > 1 {
            self.op = Op::Write {
                lba: lba + 1,
                remaining: remaining - 1,
            };
            self.buffer_pos = 0;
        } else {
            self.finish();
        }
        true
    }
}

impl PlatformSpecific for SimulatedController {
    fn monotonic_clock(self: Pin<&Self>) -> u128 {
        u128::from(self.clock.load(atomic::Ordering::SeqCst))
    }

    unsafe fn write_port_u8(self: Pin<&Self>, port: u32, data: u8) -> Result<(), PortErr> {
        let raise = {
            let mut state = self.state.lock().unwrap();
            if port == CONTROL {
                state.control = data;
                false
            } else if port > IO_BASE && port < IO_BASE + 7 {
                state.regs[(port - IO_BASE) as usize] = data;
                false
            } else if port == IO_BASE + 7 {
                state.regs[7] = data;
                state.start_command()
            } else {
                return Err(PortErr::OutOfRange);
            }
        };

        if raise {
            self.raise_interrupt();
        }
        Ok(())
    }

    unsafe fn write_port_u16(self: Pin<&Self>, port: u32, data: u16) -> Result<(), PortErr> {
        if port != IO_BASE {
            return Err(PortErr::Unsupported);
        }

        let raise = self.state.lock().unwrap().write_data(data);
        if raise {
            self.raise_interrupt();
        }
        Ok(())
    }

    unsafe fn read_port_u8(self: Pin<&Self>, port: u32) -> Result<u8, PortErr> {
        let state = self.state.lock().unwrap();
        if port == IO_BASE + 7 || port == CONTROL {
            self.clock
                .fetch_add(NS_PER_STATUS_READ, atomic::Ordering::SeqCst);
            Ok(state.status)
        } else if port == IO_BASE + 1 {
            Ok(state.error)
        } else if port > IO_BASE && port < IO_BASE + 7 {
            Ok(state.regs[(port - IO_BASE) as usize])
        } else {
            Err(PortErr::OutOfRange)
        }
    }

    unsafe fn read_port_u16(self: Pin<&Self>, port: u32) -> Result<u16, PortErr> {
        if port != IO_BASE {
            return Err(PortErr::Unsupported);
        }

        let (value, raise) = self.state.lock().unwrap().read_data();
        if raise {
            self.raise_interrupt();
        }
        Ok(value)
    }

    fn set_interrupt_handler(self: Pin<&Self>, irq: u8, handler: InterruptHandler) {
        self.handlers.lock().unwrap().insert(irq, handler);
    }

    fn enable_irq(self: Pin<&Self>, irq: u8) {
        self.state.lock().unwrap().enabled_irqs.push(irq);
    }
}

/// Builds the block returned by IDENTIFY DEVICE.
fn identify_block(sectors: u32) -> [u8; SECTOR_BYTES] {
    let mut data = [0u8; SECTOR_BYTES];
    let mut put_str = |first_word: usize, num_words: usize, s: &str| {
        let mut padded = s.as_bytes().to_vec();
        padded.resize(num_words * 2, b' ');
        for (n, pair) in padded.chunks(2).enumerate() {
            data[(first_word + n) * 2] = pair[1];
            data[(first_word + n) * 2 + 1] = pair[0];
        }
    };
    put_str(10, 10, "SIM-0001");
    put_str(27, 20, "REDSHIRT SIMULATED DISK");

    // LBA supported.
    data[49 * 2 + 1] = 0x02;
    data[60 * 2..60 * 2 + 2].copy_from_slice(&(sectors as u16).to_le_bytes());
    data[61 * 2..61 * 2 + 2].copy_from_slice(&((sectors >> 16) as u16).to_le_bytes());
    data
}

/// Content of a simulated disk.
#[derive(Debug, Clone)]
pub struct DiskImage {
    data: Vec<u8>,
}

impl DiskImage {
    pub fn new(sectors: u32) -> Self {
        DiskImage {
            data: vec![0; sectors as usize * SECTOR_BYTES],
        }
    }

    pub fn sectors(&self) -> u32 {
        u32::try_from(self.data.len() / SECTOR_BYTES).unwrap()
    }

    /// Writes a partition table, and the boot signature, in the given sector.
    pub fn with_table(mut self, sector: u32, entries: &[PartitionTableEntry]) -> Self {
        assert!(entries.len() <= 4);
        let start = sector as usize * SECTOR_BYTES;
        for (n, entry) in entries.iter().enumerate() {
            let offset = start + PARTITION_TABLE_OFFSET + n * PARTITION_ENTRY_SIZE;
            self.data[offset..offset + PARTITION_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        }
        self.data[start + 510] = 0x55;
        self.data[start + 511] = 0xaa;
        self
    }

    /// Fills the given sectors with a pattern that depends on the sector number.
    pub fn with_pattern(mut self, first: u32, count: u32) -> Self {
        for lba in first..first + count {
            let start = lba as usize * SECTOR_BYTES;
            for (n, b) in self.data[start..start + SECTOR_BYTES].iter_mut().enumerate() {
                *b = pattern(lba, n);
            }
        }
        self
    }

    pub fn with_fill(mut self, first: u32, count: u32, byte: u8) -> Self {
        let start = first as usize * SECTOR_BYTES;
        let end = (first + count) as usize * SECTOR_BYTES;
        for b in &mut self.data[start..end] {
            *b = byte;
        }
        self
    }
}

/// Byte found at `offset` of sector `lba` after [`DiskImage::with_pattern`].
pub fn pattern(lba: u32, offset: usize) -> u8 {
    (lba as usize).wrapping_mul(31).wrapping_add(offset) as u8
}

pub fn entry(sys_id: u8, start_sect: u32, nr_sects: u32) -> PartitionTableEntry {
    PartitionTableEntry {
        sys_id,
        start_sect,
        nr_sects,
        ..Default::default()
    }
}

/// Address spaces of the simulated processes.
#[derive(Debug, Default)]
pub struct SimulatedMemory {
    processes: Mutex<HashMap<u32, Vec<u8>>>,
}

impl SimulatedMemory {
    pub fn new() -> Arc<Self> {
        Arc::new(SimulatedMemory::default())
    }

    pub fn add_process(&self, proc_nr: u32, size: usize) {
        self.processes
            .lock()
            .unwrap()
            .insert(proc_nr, vec![0; size]);
    }

    pub fn fill(&self, proc_nr: u32, address: u64, data: &[u8]) {
        self.write_to(proc_nr, address, data).unwrap();
    }

    pub fn read(&self, proc_nr: u32, address: u64, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        self.read_from(proc_nr, address, &mut out).unwrap();
        out
    }
}

impl ProcessMemory for SimulatedMemory {
    fn write_to(&self, proc_nr: u32, address: u64, data: &[u8]) -> Result<(), MemoryErr> {
        let mut processes = self.processes.lock().unwrap();
        let memory = processes
            .get_mut(&proc_nr)
            .ok_or(MemoryErr::UnknownProcess)?;
        let start = usize::try_from(address).map_err(|_| MemoryErr::BadAddress)?;
        let end = start
            .checked_add(data.len())
            .ok_or(MemoryErr::BadAddress)?;
        memory
            .get_mut(start..end)
            .ok_or(MemoryErr::BadAddress)?
            .copy_from_slice(data);
        Ok(())
    }

    fn read_from(&self, proc_nr: u32, address: u64, out: &mut [u8]) -> Result<(), MemoryErr> {
        let processes = self.processes.lock().unwrap();
        let memory = processes.get(&proc_nr).ok_or(MemoryErr::UnknownProcess)?;
        let start = usize::try_from(address).map_err(|_| MemoryErr::BadAddress)?;
        let end = start.checked_add(out.len()).ok_or(MemoryErr::BadAddress)?;
        out.copy_from_slice(memory.get(start..end).ok_or(MemoryErr::BadAddress)?);
        Ok(())
    }
}

/// Transport that delivers a fixed list of requests, then never delivers anything.
#[derive(Debug, Default)]
pub struct QueueTransport {
    pub incoming: VecDeque<Message>,
    pub replies: Vec<(u32, Message)>,
}

impl QueueTransport {
    pub fn new(requests: impl IntoIterator<Item = Message>) -> Self {
        QueueTransport {
            incoming: requests.into_iter().collect(),
            replies: Vec::new(),
        }
    }
}

impl Transport for QueueTransport {
    fn receive(&mut self) -> BoxFuture<'_, Message> {
        match self.incoming.pop_front() {
            Some(message) => future::ready(message).boxed(),
            None => future::pending().boxed(),
        }
    }

    fn reply(&mut self, destination: u32, message: Message) {
        self.replies.push((destination, message));
    }
}
