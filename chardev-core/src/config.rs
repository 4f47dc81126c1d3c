// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Describes the host registry and the devices to attach at load time.
//! Any invalid field results in a HardValidationError that prevents attach.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ChardevError, ChardevResult, HardValidationError};
use crate::types::{Capacity, DeviceName};

/// Smallest configurable device buffer.
pub const MIN_CAPACITY: usize = 1;
/// Largest configurable device buffer (1 MB).
pub const MAX_CAPACITY: usize = 1024 * 1024;
/// Highest character-device major number the host accepts.
pub const MAX_MAJOR: u32 = 511;
/// Most device numbers a single registry hands out.
pub const MAX_MINORS: u32 = 256;

/// Raw host configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawHostConfig {
    #[serde(default)]
    major: u32,
    #[serde(default = "default_max_minors")]
    max_minors: u32,
}

fn default_max_minors() -> u32 {
    16
}

impl Default for RawHostConfig {
    fn default() -> Self {
        Self {
            major: 0,
            max_minors: default_max_minors(),
        }
    }
}

/// Raw device configuration.
#[derive(Debug, Deserialize)]
struct RawDeviceConfig {
    name: String,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    Capacity::DEFAULT.bytes()
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    host: RawHostConfig,
    devices: Vec<RawDeviceConfig>,
}

/// Validated host registry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Fixed major number, or 0 to let the registry pick one.
    pub major: u32,
    /// Number of minors available for devices.
    pub max_minors: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            major: 0,
            max_minors: default_max_minors(),
        }
    }
}

/// Validated device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: DeviceName,
    pub capacity: Capacity,
}

/// Complete validated configuration.
#[derive(Debug)]
pub struct Config {
    pub host: HostConfig,
    pub devices: Vec<DeviceConfig>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> ChardevResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ChardevError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ChardevError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> ChardevResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| ChardevError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> ChardevResult<Config> {
        let host = Self::validate_host(raw.host)?;

        if raw.devices.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "At least one device must be defined".to_string(),
            }
            .into());
        }

        if raw.devices.len() > host.max_minors as usize {
            return Err(HardValidationError::SchemaValidation {
                message: format!(
                    "{} devices configured but only {} minors available",
                    raw.devices.len(),
                    host.max_minors
                ),
            }
            .into());
        }

        let mut devices = Vec::with_capacity(raw.devices.len());
        let mut seen = HashSet::new();

        for raw_device in raw.devices {
            let device = Self::validate_device(raw_device)?;

            if !seen.insert(device.name.clone()) {
                return Err(HardValidationError::DuplicateDeviceName {
                    name: device.name.to_string(),
                }
                .into());
            }

            devices.push(device);
        }

        Ok(Config { host, devices })
    }

    fn validate_host(raw: RawHostConfig) -> ChardevResult<HostConfig> {
        if raw.major > MAX_MAJOR {
            return Err(HardValidationError::InvalidFieldValue {
                field: "major",
                value: raw.major.to_string(),
                reason: format!("Must be 0 (dynamic) or at most {}", MAX_MAJOR),
            }
            .into());
        }

        if raw.max_minors == 0 || raw.max_minors > MAX_MINORS {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_minors",
                value: raw.max_minors.to_string(),
                reason: format!("Must be between 1 and {}", MAX_MINORS),
            }
            .into());
        }

        Ok(HostConfig {
            major: raw.major,
            max_minors: raw.max_minors,
        })
    }

    fn validate_device(raw: RawDeviceConfig) -> ChardevResult<DeviceConfig> {
        let name = DeviceName::new(raw.name)?;

        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&raw.capacity) {
            return Err(HardValidationError::CapacityOutOfBounds {
                capacity: raw.capacity,
                min: MIN_CAPACITY,
                max: MAX_CAPACITY,
            }
            .into());
        }

        let capacity = Capacity::new(raw.capacity)?;

        Ok(DeviceConfig { name, capacity })
    }
}
