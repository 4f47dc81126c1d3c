// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! A single attached character device.
//!
//! Owns the FIFO buffer, its lifecycle state machine and the count of open
//! sessions. Sessions and detach coordinate through the lifecycle lock: a
//! session can only open while the device is `Active`, and detach only
//! starts once no session is open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::buffer::FifoBuffer;
use crate::error::{BufferError, ChardevResult, DeviceError};
use crate::session::Session;
use crate::state::{DeviceState, DeviceStateMachine};
use crate::stats::{DeviceCounters, DeviceStats};
use crate::transfer::Transfer;
use crate::types::{Capacity, DeviceName, DeviceNumber};

/// An attached device instance.
#[derive(Debug)]
pub struct Device {
    name: DeviceName,
    number: DeviceNumber,
    buffer: FifoBuffer,
    lifecycle: Mutex<DeviceStateMachine>,
    open_sessions: AtomicUsize,
    counters: DeviceCounters,
}

impl Device {
    /// Allocate the buffer and bring the device to `Active`.
    ///
    /// On allocation failure the device goes straight to `Detached` and is
    /// never handed out.
    pub fn attach(
        name: DeviceName,
        number: DeviceNumber,
        capacity: Capacity,
        transfer: Arc<dyn Transfer>,
    ) -> ChardevResult<Arc<Self>> {
        let mut lifecycle = DeviceStateMachine::new(name.clone());

        let buffer = match FifoBuffer::new(capacity, transfer) {
            Ok(buffer) => buffer,
            Err(e) => {
                lifecycle.transition_to(DeviceState::Detached)?;
                tracing::warn!(device = %name, capacity = capacity.bytes(), error = %e, "Attach failed");
                return Err(DeviceError::Buffer(e).into());
            }
        };

        lifecycle.transition_to(DeviceState::Active)?;

        Ok(Arc::new(Self {
            name,
            number,
            buffer,
            lifecycle: Mutex::new(lifecycle),
            open_sessions: AtomicUsize::new(0),
            counters: DeviceCounters::default(),
        }))
    }

    fn lifecycle(&self) -> MutexGuard<'_, DeviceStateMachine> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_active(&self) -> Result<(), DeviceError> {
        if self.lifecycle().is_active() {
            Ok(())
        } else {
            Err(DeviceError::Detached {
                name: self.name.clone(),
            })
        }
    }

    /// Open a new session. No buffer side effects.
    pub fn open(self: &Arc<Self>) -> Result<Session, DeviceError> {
        let lifecycle = self.lifecycle();
        if !lifecycle.is_active() {
            return Err(DeviceError::Detached {
                name: self.name.clone(),
            });
        }

        let sessions = self.open_sessions.fetch_add(1, Ordering::AcqRel) + 1;
        drop(lifecycle);

        tracing::debug!(device = %self.name, sessions, "Session opened");
        Ok(Session::new(Arc::clone(self)))
    }

    pub(crate) fn release_session(&self) {
        let sessions = self.open_sessions.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(device = %self.name, sessions, "Session closed");
    }

    /// Consume up to `dst.len()` bytes. Zero means no data available.
    pub(crate) fn read(&self, dst: &mut [u8]) -> Result<usize, DeviceError> {
        self.ensure_active()?;

        match self.buffer.read(dst) {
            Ok(n) => {
                self.counters.record_read(n);
                tracing::debug!(device = %self.name, requested = dst.len(), bytes = n, "Read");
                Ok(n)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    /// Append as much of `src` as fits; returns the bytes accepted.
    pub(crate) fn write(&self, src: &[u8]) -> Result<usize, DeviceError> {
        self.ensure_active()?;

        match self.buffer.write(src) {
            Ok(n) => {
                self.counters.record_write(n);
                tracing::debug!(device = %self.name, requested = src.len(), bytes = n, "Write");
                Ok(n)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn record_failure(&self, err: BufferError) -> DeviceError {
        match &err {
            BufferError::NoSpace { capacity } => {
                self.counters.record_no_space();
                tracing::debug!(device = %self.name, capacity, "Buffer full");
            }
            BufferError::Fault(fault) => {
                self.counters.record_fault();
                tracing::warn!(device = %self.name, %fault, "Transfer fault");
            }
            BufferError::AllocationFailed { .. } => {}
        }
        err.into()
    }

    /// Move to `Detaching` if no session is open.
    pub(crate) fn begin_detach(&self) -> ChardevResult<()> {
        let mut lifecycle = self.lifecycle();

        let sessions = self.open_sessions.load(Ordering::Acquire);
        if sessions > 0 {
            return Err(DeviceError::Busy {
                name: self.name.clone(),
                sessions,
            }
            .into());
        }

        lifecycle.transition_to(DeviceState::Detaching)?;
        Ok(())
    }

    pub(crate) fn finish_detach(&self) -> ChardevResult<()> {
        self.lifecycle().transition_to(DeviceState::Detached)?;
        Ok(())
    }

    pub fn name(&self) -> &DeviceName {
        &self.name
    }

    pub fn number(&self) -> DeviceNumber {
        self.number
    }

    pub fn capacity(&self) -> Capacity {
        self.buffer.capacity()
    }

    /// Bytes currently buffered.
    pub fn fill(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> DeviceState {
        self.lifecycle().state()
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::Acquire)
    }

    /// Snapshot of the device's counters and occupancy.
    pub fn stats(&self) -> DeviceStats {
        let (state, time_in_state) = {
            let lifecycle = self.lifecycle();
            (lifecycle.state(), lifecycle.time_in_current_state())
        };

        DeviceStats {
            name: self.name.to_string(),
            device_number: self.number.to_string(),
            state,
            time_in_state_ms: time_in_state.as_millis() as u64,
            capacity: self.capacity().bytes(),
            fill: self.fill(),
            open_sessions: self.open_sessions(),
            counters: self.counters.snapshot(),
        }
    }
}
