// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Open handle on a device.
//!
//! A session carries no cursor and no buffer of its own; it only names the
//! device its reads and writes go to. Dropping it closes it.

use std::sync::Arc;

use crate::buffer::read_to_vec;
use crate::device::Device;
use crate::error::DeviceError;

/// An open session on a [`Device`].
#[derive(Debug)]
pub struct Session {
    device: Arc<Device>,
}

impl Session {
    pub(crate) fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    /// The device this session refers to.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Consume up to `dst.len()` bytes. `Ok(0)` signals end of available data.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize, DeviceError> {
        self.device.read(dst)
    }

    /// Read up to `max_bytes` bytes into a new vector.
    pub fn read_vec(&self, max_bytes: usize) -> Result<Vec<u8>, DeviceError> {
        read_to_vec(max_bytes, self.device.capacity(), |dst| self.read(dst))
    }

    /// Append as much of `src` as fits; returns the bytes accepted.
    pub fn write(&self, src: &[u8]) -> Result<usize, DeviceError> {
        self.device.write(src)
    }

    /// Read in the file-operations convention: byte count or negative errno.
    pub fn read_raw(&self, dst: &mut [u8]) -> isize {
        to_raw(self.read(dst))
    }

    /// Write in the file-operations convention: byte count or negative errno.
    pub fn write_raw(&self, src: &[u8]) -> isize {
        to_raw(self.write(src))
    }

    /// Close the session. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.device.release_session();
    }
}

fn to_raw(result: Result<usize, DeviceError>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(e) => -(e.errno() as isize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{Direction, DirectTransfer, FaultingTransfer};
    use crate::types::{Capacity, DeviceName, DeviceNumber};

    fn open_session(capacity: usize, transfer: Arc<dyn crate::transfer::Transfer>) -> Session {
        Device::attach(
            DeviceName::new("chardev").unwrap(),
            DeviceNumber::new(240, 0),
            Capacity::new(capacity).unwrap(),
            transfer,
        )
        .unwrap()
        .open()
        .unwrap()
    }

    #[test]
    fn test_raw_counts() {
        let session = open_session(8, Arc::new(DirectTransfer));

        assert_eq!(session.write_raw(b"Hello"), 5);
        assert_eq!(session.write_raw(b"World"), 3);
        assert_eq!(session.write_raw(b"!"), -(libc::ENOSPC as isize));

        let mut dst = [0u8; 16];
        assert_eq!(session.read_raw(&mut dst), 8);
        assert_eq!(&dst[..8], b"HelloWor");
        assert_eq!(session.read_raw(&mut dst), 0);
    }

    #[test]
    fn test_raw_fault() {
        let session = open_session(8, Arc::new(FaultingTransfer::only(Direction::FromUser)));
        assert_eq!(session.write_raw(b"abc"), -(libc::EFAULT as isize));
        assert_eq!(session.device().fill(), 0);
    }

    #[test]
    fn test_close_preserves_data() {
        let session = open_session(16, Arc::new(DirectTransfer));
        let device = Arc::clone(session.device());

        session.write(b"persist").unwrap();
        session.close();
        assert_eq!(device.open_sessions(), 0);

        let next = device.open().unwrap();
        assert_eq!(next.read_vec(16).unwrap(), b"persist");
    }
}
