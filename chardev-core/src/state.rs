// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Device lifecycle state machine with typed state transitions.
//!
//! Implements the device lifecycle: Attaching → Active → Detaching → Detached.
//! A failed attach goes straight from Attaching to Detached.
//! Invalid transitions result in StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::types::DeviceName;

/// Device lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Buffer allocation and registration in progress.
    Attaching,

    /// Registered and serving sessions.
    Active,

    /// Deregistration in progress; no new sessions.
    Detaching,

    /// Buffer released. Terminal.
    Detached,
}

impl DeviceState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Attaching => "Attaching",
            Self::Active => "Active",
            Self::Detaching => "Detaching",
            Self::Detached => "Detached",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: DeviceState) -> bool {
        matches!(
            (self, target),
            (Self::Attaching, Self::Active)
                | (Self::Attaching, Self::Detached)
                | (Self::Active, Self::Detaching)
                | (Self::Detaching, Self::Detached)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Detached)
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for a device's lifecycle.
#[derive(Debug)]
pub struct DeviceStateMachine {
    device: DeviceName,
    current_state: DeviceState,
    last_transition: Instant,
    transition_count: u64,
}

impl DeviceStateMachine {
    /// Create a new state machine in `Attaching`.
    pub fn new(device: DeviceName) -> Self {
        Self {
            device,
            current_state: DeviceState::Attaching,
            last_transition: Instant::now(),
            transition_count: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> DeviceState {
        self.current_state
    }

    pub fn device(&self) -> &DeviceName {
        &self.device
    }

    /// Get time since last transition.
    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: DeviceState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                device: self.device.clone(),
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                device: self.device.clone(),
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            device = %self.device,
            from = self.current_state.name(),
            to = target.name(),
            "State transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Whether sessions may open and perform I/O.
    pub fn is_active(&self) -> bool {
        matches!(self.current_state, DeviceState::Active)
    }
}
