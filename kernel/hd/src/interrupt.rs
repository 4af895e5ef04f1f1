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

//! Synchronization between the interrupt handler and the driver.
//!
//! The controller raises an interrupt every time a sector is ready to be read, every time a
//! written sector has been accepted, and when an IDENTIFY command completes. The interrupt
//! handler runs outside of the driver task. It acknowledges the interrupt by reading the status
//! register, then fills the single slot of the [`InterruptSignal`] and wakes up the driver.
//!
//! The driver consumes the signal with [`InterruptSignal::wait`] before issuing anything else to
//! the controller. A notification that arrives while the slot is still full can't be told apart
//! from the previous one; it is counted in [`InterruptSignal::overruns`].

use crate::arch::PlatformSpecific;
use crate::ata::{self, Ports};
use crate::error::HardwareFault;

use alloc::sync::Arc;
use core::{fmt, pin::Pin, sync::atomic, task::Poll, time::Duration};
use futures::{prelude::*, task::AtomicWaker};

/// Single-slot notification from the interrupt handler to the driver.
pub struct InterruptSignal {
    /// True if an interrupt has happened and hasn't been consumed.
    pending: atomic::AtomicBool,
    /// Status register, as read by the handler during the latest interrupt.
    status: atomic::AtomicU8,
    /// Number of notifications that arrived while `pending` was already true.
    overruns: atomic::AtomicU32,
    waker: AtomicWaker,
}

impl InterruptSignal {
    pub fn new() -> Self {
        InterruptSignal {
            pending: atomic::AtomicBool::new(false),
            status: atomic::AtomicU8::new(0),
            overruns: atomic::AtomicU32::new(0),
            waker: AtomicWaker::new(),
        }
    }

    /// Fills the slot and wakes up the driver.
    ///
    /// Can be called from an interrupt handler. Never blocks and never allocates.
    pub fn notify(&self, status: u8) {
        self.status.store(status, atomic::Ordering::Relaxed);
        if self.pending.swap(true, atomic::Ordering::AcqRel) {
            self.overruns.fetch_add(1, atomic::Ordering::Relaxed);
        }
        self.waker.wake();
    }

    /// Waits until the slot is filled, then empties it. Returns the status register read by
    /// the handler.
    pub fn wait(&self) -> impl Future<Output = u8> + '_ {
        future::poll_fn(move |cx| {
            if let Some(status) = self.try_take() {
                return Poll::Ready(status);
            }

            self.waker.register(cx.waker());

            // The interrupt might have happened between the first check and the registration.
            if let Some(status) = self.try_take() {
                return Poll::Ready(status);
            }

            Poll::Pending
        })
    }

    /// Empties the slot. Returns `true` if it was filled.
    pub fn discard(&self) -> bool {
        self.try_take().is_some()
    }

    /// Returns `true` if an interrupt has happened and hasn't been consumed yet.
    pub fn is_pending(&self) -> bool {
        self.pending.load(atomic::Ordering::Acquire)
    }

    /// Returns the number of interrupts that were lost because the slot was full.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(atomic::Ordering::Relaxed)
    }

    fn try_take(&self) -> Option<u8> {
        if self.pending.swap(false, atomic::Ordering::AcqRel) {
            Some(self.status.load(atomic::Ordering::Relaxed))
        } else {
            None
        }
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        InterruptSignal::new()
    }
}

impl fmt::Debug for InterruptSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptSignal")
            .field("pending", &self.is_pending())
            .field("overruns", &self.overruns())
            .finish()
    }
}

/// Function that the kernel invokes when the IRQ line of the controller fires.
#[derive(Clone)]
pub struct InterruptHandler {
    inner: Arc<dyn Fn() + Send + Sync>,
}

impl InterruptHandler {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        InterruptHandler { inner: Arc::new(f) }
    }

    /// Builds the handler of an ATA channel: acknowledges the interrupt by reading the status
    /// register, then notifies `signal`.
    pub fn for_controller<TPlat: PlatformSpecific>(
        platform: Pin<Arc<TPlat>>,
        ports: Ports,
        signal: Arc<InterruptSignal>,
    ) -> Self {
        InterruptHandler::new(move || {
            // A refused port read can't be reported from here. The driver notices the missing
            // status bits afterwards.
            let status = ata::read_status(platform.as_ref(), &ports).unwrap_or(0);
            signal.notify(status);
        })
    }

    /// Must be called from the interrupt context.
    pub fn on_interrupt(&self) {
        (self.inner)()
    }
}

impl fmt::Debug for InterruptHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InterruptHandler").finish()
    }
}

/// Spins until `(status & mask) == value` or until `timeout` has elapsed.
///
/// Returns `Ok(false)` on timeout. The status register is read at least once.
pub fn wait_for_status<TPlat: PlatformSpecific>(
    platform: Pin<&TPlat>,
    ports: &Ports,
    mask: u8,
    value: u8,
    timeout: Duration,
) -> Result<bool, HardwareFault> {
    let timeout = timeout.as_nanos();
    let start = platform.monotonic_clock();

    loop {
        if (ata::read_status(platform, ports)? & mask) == value {
            return Ok(true);
        }

        if platform.monotonic_clock().saturating_sub(start) >= timeout {
            return Ok(false);
        }

        core::hint::spin_loop();
    }
}
