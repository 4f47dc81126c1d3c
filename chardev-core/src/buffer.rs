// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Bounded FIFO byte buffer.
//!
//! One fixed-capacity byte store and its fill length, guarded together by a
//! single mutex. Valid data always occupies `[0, offset)`. Writes append at
//! `offset`; reads consume from index 0 and shift the remainder down, so
//! space freed by a read is immediately available to the next write.
//!
//! Every copy to or from the caller runs through the injected
//! [`Transfer`] before the fill length is touched. A faulted transfer
//! therefore leaves the buffer exactly as it was.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::BufferError;
use crate::transfer::{Direction, Transfer};
use crate::types::Capacity;

/// Storage and fill length, only ever touched under the lock.
struct FifoState {
    data: Box<[u8]>,
    offset: usize,
}

/// Fixed-capacity FIFO shared by every session on a device.
pub struct FifoBuffer {
    capacity: Capacity,
    state: Mutex<FifoState>,
    transfer: Arc<dyn Transfer>,
}

impl FifoBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    ///
    /// Returns `BufferError::AllocationFailed` instead of aborting when the
    /// allocator cannot satisfy the request.
    pub fn new(capacity: Capacity, transfer: Arc<dyn Transfer>) -> Result<Self, BufferError> {
        let bytes = capacity.bytes();

        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|e| BufferError::AllocationFailed {
                requested: bytes,
                reason: e.to_string(),
            })?;
        data.resize(bytes, 0u8);

        Ok(Self {
            capacity,
            state: Mutex::new(FifoState {
                data: data.into_boxed_slice(),
                offset: 0,
            }),
            transfer,
        })
    }

    // Every mutation completes its transfer before touching the fill
    // length, so state behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, FifoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume up to `dst.len()` bytes from the front of the buffer.
    ///
    /// Returns the number of bytes copied into `dst`. Zero means no data is
    /// available (or `dst` is empty) and is not an error.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize, BufferError> {
        let mut state = self.lock();
        let offset = state.offset;
        let n = dst.len().min(offset);

        if n == 0 {
            return Ok(0);
        }

        self.transfer
            .copy(Direction::ToUser, &mut dst[..n], &state.data[..n])?;

        state.data.copy_within(n..offset, 0);
        state.offset = offset - n;

        tracing::trace!(bytes = n, fill = state.offset, "FIFO read");
        Ok(n)
    }

    /// Read up to `max_bytes` bytes into a new vector.
    pub fn read_vec(&self, max_bytes: usize) -> Result<Vec<u8>, BufferError> {
        read_to_vec(max_bytes, self.capacity, |dst| self.read(dst))
    }

    /// Append as much of `src` as fits.
    ///
    /// Returns the number of bytes accepted, which may be less than
    /// `src.len()`. Fails with `NoSpace` only when the buffer is already full.
    pub fn write(&self, src: &[u8]) -> Result<usize, BufferError> {
        let mut state = self.lock();
        let offset = state.offset;
        let free = self.capacity.bytes() - offset;

        if free == 0 {
            return Err(BufferError::NoSpace {
                capacity: self.capacity.bytes(),
            });
        }

        let n = src.len().min(free);
        self.transfer.copy(
            Direction::FromUser,
            &mut state.data[offset..offset + n],
            &src[..n],
        )?;

        state.offset = offset + n;

        tracing::trace!(bytes = n, fill = state.offset, "FIFO write");
        Ok(n)
    }

    /// Fixed capacity of the buffer.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Number of valid bytes currently buffered.
    pub fn len(&self) -> usize {
        self.lock().offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity.bytes()
    }

    /// Bytes a write could accept right now.
    pub fn free_space(&self) -> usize {
        self.capacity.bytes() - self.len()
    }
}

/// Run `read` over a scratch vector sized for `max_bytes` and keep only the
/// bytes it produced. Never allocates more than `capacity`, since no more
/// can be buffered.
pub(crate) fn read_to_vec<E>(
    max_bytes: usize,
    capacity: Capacity,
    read: impl FnOnce(&mut [u8]) -> Result<usize, E>,
) -> Result<Vec<u8>, E> {
    let mut out = vec![0u8; max_bytes.min(capacity.bytes())];
    let n = read(&mut out)?;
    out.truncate(n);
    Ok(out)
}

impl std::fmt::Debug for FifoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("transfer", &self.transfer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{DirectTransfer, FaultAfter, FaultingTransfer};

    fn make_buffer(capacity: usize) -> FifoBuffer {
        FifoBuffer::new(Capacity::new(capacity).unwrap(), Arc::new(DirectTransfer)).unwrap()
    }

    impl FifoBuffer {
        /// Copy of the valid region without consuming it.
        fn contents(&self) -> Vec<u8> {
            let state = self.lock();
            state.data[..state.offset].to_vec()
        }
    }

    #[test]
    fn test_hello_world() {
        let buffer = make_buffer(1024);

        assert_eq!(buffer.write(b"Hello").unwrap(), 5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.write(b"World").unwrap(), 5);
        assert_eq!(buffer.len(), 10);

        assert_eq!(buffer.read_vec(10).unwrap(), b"HelloWorld");
        assert_eq!(buffer.len(), 0);

        assert!(buffer.read_vec(10).unwrap().is_empty());
    }

    #[test]
    fn test_saturation_and_recovery() {
        let buffer = make_buffer(1024);

        assert_eq!(buffer.write(&[0xAB; 1024]).unwrap(), 1024);
        assert!(buffer.is_full());

        let err = buffer.write(&[1]).unwrap_err();
        assert!(matches!(err, BufferError::NoSpace { capacity: 1024 }));
        assert_eq!(buffer.len(), 1024);

        assert_eq!(buffer.read_vec(24).unwrap().len(), 24);
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.write(&[7; 24]).unwrap(), 24);
        assert!(buffer.is_full());
    }

    #[test]
    fn test_short_write() {
        let buffer = make_buffer(8);

        assert_eq!(buffer.write(b"abcde").unwrap(), 5);
        assert_eq!(buffer.write(b"fghij").unwrap(), 3);
        assert_eq!(buffer.contents(), b"abcdefgh");
    }

    #[test]
    fn test_empty_write_on_full_buffer() {
        let buffer = make_buffer(4);
        buffer.write(b"full").unwrap();

        assert!(matches!(
            buffer.write(&[]),
            Err(BufferError::NoSpace { capacity: 4 })
        ));
        assert_eq!(buffer.contents(), b"full");
    }

    #[test]
    fn test_empty_write_with_space() {
        let buffer = make_buffer(4);
        buffer.write(b"ab").unwrap();

        assert_eq!(buffer.write(&[]).unwrap(), 0);
        assert_eq!(buffer.contents(), b"ab");
    }

    #[test]
    fn test_read_vec_capped_at_capacity() {
        let buffer = make_buffer(4);
        buffer.write(b"abcd").unwrap();

        assert_eq!(buffer.read_vec(usize::MAX).unwrap(), b"abcd");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_zero_mutates_nothing() {
        let buffer = make_buffer(16);
        buffer.write(b"data").unwrap();

        assert_eq!(buffer.read(&mut []).unwrap(), 0);
        assert_eq!(buffer.contents(), b"data");
    }

    #[test]
    fn test_read_compacts_remainder() {
        let buffer = make_buffer(16);
        buffer.write(b"0123456789").unwrap();

        let mut dst = [0u8; 3];
        assert_eq!(buffer.read(&mut dst).unwrap(), 3);
        assert_eq!(&dst, b"012");
        assert_eq!(buffer.contents(), b"3456789");
        assert_eq!(buffer.free_space(), 9);
    }

    #[test]
    fn test_read_larger_than_available() {
        let buffer = make_buffer(16);
        buffer.write(b"abc").unwrap();

        let mut dst = [0u8; 10];
        assert_eq!(buffer.read(&mut dst).unwrap(), 3);
        assert_eq!(&dst[..3], b"abc");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_fault_leaves_offset() {
        let buffer = FifoBuffer::new(
            Capacity::new(16).unwrap(),
            Arc::new(FaultingTransfer::only(Direction::FromUser).with_partial(3)),
        )
        .unwrap();

        let err = buffer.write(b"Hello").unwrap_err();
        match err {
            BufferError::Fault(fault) => {
                assert_eq!(fault.direction, Direction::FromUser);
                assert_eq!(fault.requested, 5);
            }
            other => panic!("expected fault, got {other:?}"),
        }
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_read_fault_keeps_data() {
        let transfer = Arc::new(FaultAfter::new(1));
        let buffer = FifoBuffer::new(Capacity::new(16).unwrap(), transfer).unwrap();

        buffer.write(b"keep").unwrap();
        let mut dst = [0u8; 4];
        assert!(matches!(
            buffer.read(&mut dst),
            Err(BufferError::Fault(_))
        ));
        assert_eq!(buffer.contents(), b"keep");
    }

    #[test]
    fn test_allocation_failure() {
        let result = FifoBuffer::new(Capacity::new(usize::MAX).unwrap(), Arc::new(DirectTransfer));
        assert!(matches!(
            result,
            Err(BufferError::AllocationFailed { requested, .. }) if requested == usize::MAX
        ));
    }

    #[test]
    fn test_concurrent_producers_consumers() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::thread;

        const PER_PRODUCER: usize = 4096;
        const PRODUCERS: usize = 4;

        let buffer = Arc::new(make_buffer(64));
        let consumed = Arc::new(AtomicUsize::new(0));
        let total = PER_PRODUCER * PRODUCERS;

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let payload = vec![p as u8; PER_PRODUCER];
                    let mut sent = 0;
                    while sent < payload.len() {
                        match buffer.write(&payload[sent..]) {
                            Ok(n) => sent += n,
                            Err(BufferError::NoSpace { .. }) => thread::yield_now(),
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                let consumed = Arc::clone(&consumed);
                thread::spawn(move || {
                    let mut counts = [0usize; PRODUCERS];
                    let mut dst = [0u8; 48];
                    while consumed.load(Ordering::Acquire) < total {
                        let n = buffer.read(&mut dst).unwrap();
                        if n == 0 {
                            thread::yield_now();
                            continue;
                        }
                        consumed.fetch_add(n, Ordering::AcqRel);
                        for byte in &dst[..n] {
                            counts[*byte as usize] += 1;
                        }
                    }
                    counts
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }

        let mut counts = [0usize; PRODUCERS];
        for handle in consumers {
            for (acc, seen) in counts.iter_mut().zip(handle.join().unwrap()) {
                *acc += seen;
            }
        }

        assert_eq!(counts, [PER_PRODUCER; PRODUCERS]);
        assert!(buffer.is_empty());
    }
}
