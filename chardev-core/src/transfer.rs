// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Cross-domain byte transfer capability.
//!
//! The device buffer never touches caller memory directly. Every copy
//! between the buffer and a caller goes through a [`Transfer`], the
//! equivalent of `copy_to_user`/`copy_from_user`. A transfer either
//! completes or reports a [`TransferFault`]; it never hangs.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::TransferFault;

/// Which way bytes move relative to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device buffer to caller memory (read path).
    ToUser,
    /// Caller memory to device buffer (write path).
    FromUser,
}

impl Direction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ToUser => "to-user",
            Self::FromUser => "from-user",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Copy primitive injected into every device buffer.
///
/// `dst` and `src` have equal length; that length is the transfer size.
pub trait Transfer: Send + Sync + fmt::Debug {
    fn copy(&self, direction: Direction, dst: &mut [u8], src: &[u8]) -> Result<(), TransferFault>;
}

/// In-process transfer that never faults on well-formed descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTransfer;

impl Transfer for DirectTransfer {
    fn copy(&self, direction: Direction, dst: &mut [u8], src: &[u8]) -> Result<(), TransferFault> {
        if dst.len() != src.len() {
            return Err(TransferFault {
                direction,
                requested: src.len(),
                copied: 0,
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// Transfer that always faults.
///
/// Restricted to one direction with [`FaultingTransfer::only`]; copies in
/// the other direction succeed. With [`FaultingTransfer::with_partial`] the
/// first bytes land in the destination before the fault is reported, the
/// way a copy that hits an unmapped page part way through behaves.
#[derive(Debug, Default, Clone, Copy)]
pub struct FaultingTransfer {
    direction: Option<Direction>,
    partial: usize,
}

impl FaultingTransfer {
    /// Fault on every copy in both directions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault only on copies in `direction`.
    pub fn only(direction: Direction) -> Self {
        Self {
            direction: Some(direction),
            partial: 0,
        }
    }

    /// Land up to `bytes` bytes before faulting.
    pub fn with_partial(mut self, bytes: usize) -> Self {
        self.partial = bytes;
        self
    }

    fn faults(&self, direction: Direction) -> bool {
        self.direction.map_or(true, |d| d == direction)
    }
}

impl Transfer for FaultingTransfer {
    fn copy(&self, direction: Direction, dst: &mut [u8], src: &[u8]) -> Result<(), TransferFault> {
        if !self.faults(direction) {
            return DirectTransfer.copy(direction, dst, src);
        }

        let copied = self.partial.min(dst.len()).min(src.len());
        dst[..copied].copy_from_slice(&src[..copied]);
        Err(TransferFault {
            direction,
            requested: src.len(),
            copied,
        })
    }
}

/// Transfer that succeeds a fixed number of times, then faults forever.
#[derive(Debug)]
pub struct FaultAfter {
    remaining: AtomicUsize,
}

impl FaultAfter {
    pub fn new(successes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(successes),
        }
    }

    /// Copies still allowed to succeed.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

impl Transfer for FaultAfter {
    fn copy(&self, direction: Direction, dst: &mut [u8], src: &[u8]) -> Result<(), TransferFault> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();

        if allowed {
            DirectTransfer.copy(direction, dst, src)
        } else {
            Err(TransferFault {
                direction,
                requested: src.len(),
                copied: 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_copy() {
        let mut dst = [0u8; 5];
        DirectTransfer
            .copy(Direction::FromUser, &mut dst, b"Hello")
            .unwrap();
        assert_eq!(&dst, b"Hello");
    }

    #[test]
    fn test_direct_rejects_mismatched_lengths() {
        let mut dst = [0u8; 4];
        let fault = DirectTransfer
            .copy(Direction::ToUser, &mut dst, b"Hello")
            .unwrap_err();
        assert_eq!(fault.copied, 0);
        assert_eq!(fault.requested, 5);
    }

    #[test]
    fn test_faulting_partial() {
        let mut dst = [0u8; 5];
        let fault = FaultingTransfer::new()
            .with_partial(2)
            .copy(Direction::FromUser, &mut dst, b"Hello")
            .unwrap_err();
        assert_eq!(fault.copied, 2);
        assert_eq!(&dst, b"He\0\0\0");
    }

    #[test]
    fn test_faulting_one_direction() {
        let transfer = FaultingTransfer::only(Direction::ToUser);
        let mut dst = [0u8; 3];
        assert!(transfer.copy(Direction::FromUser, &mut dst, b"abc").is_ok());
        assert!(transfer.copy(Direction::ToUser, &mut dst, b"abc").is_err());
    }

    #[test]
    fn test_fault_after() {
        let transfer = FaultAfter::new(2);
        let mut dst = [0u8; 1];
        assert!(transfer.copy(Direction::FromUser, &mut dst, b"a").is_ok());
        assert!(transfer.copy(Direction::FromUser, &mut dst, b"b").is_ok());
        assert_eq!(transfer.remaining(), 0);
        assert!(transfer.copy(Direction::FromUser, &mut dst, b"c").is_err());
        assert_eq!(&dst, b"b");
    }
}
