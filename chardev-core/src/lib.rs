// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! chardev Core Library
//!
//! A character device backed by a fixed-capacity FIFO byte buffer.
//! Provides the bounded buffer, the injected user-memory transfer,
//! device lifecycle, sessions, a host device registry and configuration
//! parsing.

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod registry;
pub mod session;
pub mod state;
pub mod stats;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use buffer::FifoBuffer;
pub use config::{Config, ConfigLoader, DeviceConfig, HostConfig};
pub use device::Device;
pub use error::{
    BufferError, ChardevError, ChardevResult, DeviceError, HardValidationError, TransferFault,
};
pub use registry::DeviceRegistry;
pub use session::Session;
pub use state::{DeviceState, DeviceStateMachine};
pub use stats::{CounterSnapshot, DeviceStats};
pub use transfer::{DirectTransfer, Direction, FaultAfter, FaultingTransfer, Transfer};
pub use types::{Capacity, DeviceName, DeviceNumber};
