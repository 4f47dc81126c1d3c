// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for chardev.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.
//! Buffer and device errors map onto the negative errno values a
//! file-operations table hands back to the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::transfer::Direction;
use crate::types::DeviceName;

/// Top-level error type for chardev.
#[derive(Debug, Error)]
pub enum ChardevError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Device Lifecycle Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ChardevError {
    /// Positive errno value reported to the registry for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Device(err) => err.errno(),
            Self::ConfigNotFound { .. } => libc::ENOENT,
            Self::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            Self::HardValidation(_)
            | Self::ConfigParse { .. }
            | Self::InvalidStateTransition(_) => libc::EINVAL,
        }
    }
}

impl From<BufferError> for ChardevError {
    fn from(err: BufferError) -> Self {
        Self::Device(DeviceError::Buffer(err))
    }
}

/// Hard validation errors reject a configuration before any device attaches.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Capacity out of bounds: {capacity} bytes (min: {min}, max: {max})")]
    CapacityOutOfBounds {
        capacity: usize,
        min: usize,
        max: usize,
    },

    #[error("Duplicate device name: {name}")]
    DuplicateDeviceName { name: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// Device lifecycle transition errors.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for device {device}")]
    InvalidTransition {
        device: DeviceName,
        from: &'static str,
        to: &'static str,
    },

    #[error("Device {device} is in terminal state: {state}")]
    TerminalState {
        device: DeviceName,
        state: &'static str,
    },
}

/// Failure reported by a [`Transfer`](crate::transfer::Transfer) capability.
///
/// Bytes up to `copied` may have landed in the destination; the caller
/// treats the whole transfer as failed regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{direction} transfer faulted after {copied} of {requested} bytes")]
pub struct TransferFault {
    pub direction: Direction,
    pub requested: usize,
    pub copied: usize,
}

/// Errors raised by the bounded FIFO buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Buffer saturated. The caller retries once a read frees space.
    #[error("No space left on device: {capacity}-byte buffer is full")]
    NoSpace { capacity: usize },

    /// The caller's memory could not be accessed. Buffer state is unchanged.
    #[error("Bad address: {0}")]
    Fault(#[from] TransferFault),

    #[error("Failed to allocate {requested}-byte device buffer: {reason}")]
    AllocationFailed { requested: usize, reason: String },
}

impl BufferError {
    /// Positive errno value for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NoSpace { .. } => libc::ENOSPC,
            Self::Fault(_) => libc::EFAULT,
            Self::AllocationFailed { .. } => libc::ENOMEM,
        }
    }
}

/// Errors raised by devices, sessions and the host registry.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device already registered: {name}")]
    AlreadyRegistered { name: DeviceName },

    #[error("No such device: {name}")]
    NotFound { name: DeviceName },

    #[error("Device {name} is busy: {sessions} open session(s)")]
    Busy { name: DeviceName, sessions: usize },

    #[error("Device {name} is not attached")]
    Detached { name: DeviceName },

    #[error("No free device numbers: all {max_minors} minors in use")]
    NumbersExhausted { max_minors: u32 },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl DeviceError {
    /// Positive errno value for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::AlreadyRegistered { .. } => libc::EEXIST,
            Self::NotFound { .. } | Self::Detached { .. } => libc::ENODEV,
            Self::Busy { .. } | Self::NumbersExhausted { .. } => libc::EBUSY,
            Self::Buffer(err) => err.errno(),
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::Buffer(BufferError::NoSpace { .. } | BufferError::Fault(_))
        )
    }
}

/// Result type alias using ChardevError.
pub type ChardevResult<T> = Result<T, ChardevError>;
