// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread-safe host device registry using DashMap.
//!
//! Stands in for the host's driver registry: hands out device numbers,
//! attaches devices under their names and routes session opens to them.
//! A device becomes reachable only after its buffer is allocated, and a
//! failed attach gives its device number back.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::{Config, HostConfig};
use crate::device::Device;
use crate::error::{ChardevResult, DeviceError};
use crate::session::Session;
use crate::stats::DeviceStats;
use crate::transfer::{DirectTransfer, Transfer};
use crate::types::{Capacity, DeviceName, DeviceNumber};

/// Major number used when the host configuration leaves it dynamic.
/// 240-254 are reserved for local use.
pub const DYNAMIC_MAJOR: u32 = 240;

/// Registry of attached devices.
#[derive(Debug)]
pub struct DeviceRegistry {
    major: u32,
    /// `true` at index `m` while minor `m` is taken.
    minors: Mutex<Vec<bool>>,
    devices: DashMap<DeviceName, Arc<Device>>,
    transfer: Arc<dyn Transfer>,
}

impl DeviceRegistry {
    /// Create an empty registry using the in-process transfer.
    pub fn new(host: HostConfig) -> Self {
        Self::with_transfer(host, Arc::new(DirectTransfer))
    }

    /// Create an empty registry whose devices copy through `transfer`.
    pub fn with_transfer(host: HostConfig, transfer: Arc<dyn Transfer>) -> Self {
        let major = if host.major == 0 {
            DYNAMIC_MAJOR
        } else {
            host.major
        };

        Self {
            major,
            minors: Mutex::new(vec![false; host.max_minors as usize]),
            devices: DashMap::new(),
            transfer,
        }
    }

    /// Create a registry wrapped in an Arc for sharing across threads.
    pub fn new_shared(host: HostConfig) -> Arc<Self> {
        Arc::new(Self::new(host))
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    fn allocate_minor(&self) -> Result<u32, DeviceError> {
        let mut minors = self.minors.lock().unwrap_or_else(PoisonError::into_inner);
        let max_minors = minors.len() as u32;

        let minor = minors
            .iter()
            .position(|taken| !taken)
            .ok_or(DeviceError::NumbersExhausted { max_minors })?;
        minors[minor] = true;

        Ok(minor as u32)
    }

    fn release_minor(&self, minor: u32) {
        let mut minors = self.minors.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = minors.get_mut(minor as usize) {
            *slot = false;
        }
    }

    /// Attach a device using the registry's transfer.
    pub fn attach(&self, name: DeviceName, capacity: Capacity) -> ChardevResult<Arc<Device>> {
        let transfer = Arc::clone(&self.transfer);
        self.attach_with(name, capacity, transfer)
    }

    /// Attach a device that copies through its own `transfer`.
    pub fn attach_with(
        &self,
        name: DeviceName,
        capacity: Capacity,
        transfer: Arc<dyn Transfer>,
    ) -> ChardevResult<Arc<Device>> {
        let vacant = match self.devices.entry(name.clone()) {
            Entry::Occupied(_) => return Err(DeviceError::AlreadyRegistered { name }.into()),
            Entry::Vacant(vacant) => vacant,
        };

        let minor = self.allocate_minor()?;
        let number = DeviceNumber::new(self.major, minor);

        let device = match Device::attach(name, number, capacity, transfer) {
            Ok(device) => device,
            Err(e) => {
                self.release_minor(minor);
                return Err(e);
            }
        };

        vacant.insert(Arc::clone(&device));

        tracing::info!(
            device = %device.name(),
            number = %number,
            capacity = capacity.bytes(),
            "Device attached"
        );

        Ok(device)
    }

    /// Attach every configured device.
    ///
    /// Devices attached before a failure are detached again, so either all
    /// of them become reachable or none do.
    pub fn attach_all(&self, config: &Config) -> ChardevResult<Vec<Arc<Device>>> {
        let mut attached = Vec::with_capacity(config.devices.len());

        for device_config in &config.devices {
            match self.attach(device_config.name.clone(), device_config.capacity) {
                Ok(device) => attached.push(device),
                Err(e) => {
                    for device in attached.iter().rev() {
                        if let Err(rollback) = self.detach(device.name()) {
                            tracing::error!(
                                device = %device.name(),
                                error = %rollback,
                                "Rollback detach failed"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(attached)
    }

    /// Deregister a device and release its device number.
    ///
    /// Fails with `Busy` while any session is open; the device stays
    /// attached in that case.
    pub fn detach(&self, name: &DeviceName) -> ChardevResult<()> {
        let device = self
            .devices
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DeviceError::NotFound { name: name.clone() })?;

        device.begin_detach()?;

        self.devices.remove(name);
        self.release_minor(device.number().minor);
        device.finish_detach()?;

        tracing::info!(device = %name, number = %device.number(), "Device detached");
        Ok(())
    }

    /// Detach every device. Stops at the first device that refuses.
    pub fn detach_all(&self) -> ChardevResult<()> {
        for name in self.device_names() {
            self.detach(&name)?;
        }
        Ok(())
    }

    /// Open a session on the named device.
    pub fn open(&self, name: &DeviceName) -> Result<Session, DeviceError> {
        let device = self
            .devices
            .get(name)
            .ok_or_else(|| DeviceError::NotFound { name: name.clone() })?;
        device.open()
    }

    /// Look up an attached device.
    pub fn lookup(&self, name: &DeviceName) -> Result<Arc<Device>, DeviceError> {
        self.devices
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DeviceError::NotFound { name: name.clone() })
    }

    pub fn contains(&self, name: &DeviceName) -> bool {
        self.devices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Names of all attached devices, sorted.
    pub fn device_names(&self) -> Vec<DeviceName> {
        let mut names: Vec<_> = self.devices.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Stats for every attached device, sorted by name.
    pub fn stats(&self) -> Vec<DeviceStats> {
        let mut stats: Vec<_> = self.devices.iter().map(|r| r.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChardevError;
    use crate::state::DeviceState;

    fn name(s: &str) -> DeviceName {
        DeviceName::new(s).unwrap()
    }

    fn small_host(max_minors: u32) -> HostConfig {
        HostConfig {
            major: 0,
            max_minors,
        }
    }

    #[test]
    fn test_attach_and_open() {
        let registry = DeviceRegistry::default();
        let device = registry.attach(name("chardev"), Capacity::DEFAULT).unwrap();

        assert_eq!(device.number(), DeviceNumber::new(DYNAMIC_MAJOR, 0));
        assert!(registry.contains(&name("chardev")));
        assert_eq!(registry.len(), 1);

        let session = registry.open(&name("chardev")).unwrap();
        assert_eq!(session.write(b"Hello").unwrap(), 5);
    }

    #[test]
    fn test_fixed_major() {
        let registry = DeviceRegistry::new(HostConfig {
            major: 42,
            max_minors: 2,
        });
        let device = registry.attach(name("chardev"), Capacity::DEFAULT).unwrap();
        assert_eq!(device.number().to_string(), "42:0");
    }

    #[test]
    fn test_duplicate_attach() {
        let registry = DeviceRegistry::default();
        registry.attach(name("chardev"), Capacity::DEFAULT).unwrap();

        let err = registry
            .attach(name("chardev"), Capacity::DEFAULT)
            .unwrap_err();
        assert!(matches!(
            err,
            ChardevError::Device(DeviceError::AlreadyRegistered { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_minor_exhaustion_and_reuse() {
        let registry = DeviceRegistry::new(small_host(2));
        registry.attach(name("a"), Capacity::DEFAULT).unwrap();
        registry.attach(name("b"), Capacity::DEFAULT).unwrap();

        assert!(matches!(
            registry.attach(name("c"), Capacity::DEFAULT),
            Err(ChardevError::Device(DeviceError::NumbersExhausted { max_minors: 2 }))
        ));

        registry.detach(&name("a")).unwrap();
        let c = registry.attach(name("c"), Capacity::DEFAULT).unwrap();
        assert_eq!(c.number().minor, 0);
    }

    #[test]
    fn test_failed_attach_not_reachable() {
        let registry = DeviceRegistry::new(small_host(1));

        let result = registry.attach(name("huge"), Capacity::new(usize::MAX).unwrap());
        assert!(result.is_err());
        assert!(!registry.contains(&name("huge")));
        assert!(registry.open(&name("huge")).is_err());

        // The minor was released, so a real device still fits.
        assert!(registry.attach(name("chardev"), Capacity::DEFAULT).is_ok());
    }

    #[test]
    fn test_detach_busy_then_ok() {
        let registry = DeviceRegistry::default();
        let device = registry.attach(name("chardev"), Capacity::DEFAULT).unwrap();
        let session = registry.open(&name("chardev")).unwrap();

        assert!(matches!(
            registry.detach(&name("chardev")),
            Err(ChardevError::Device(DeviceError::Busy { .. }))
        ));
        assert!(registry.contains(&name("chardev")));

        drop(session);
        registry.detach(&name("chardev")).unwrap();
        assert!(!registry.contains(&name("chardev")));
        assert_eq!(device.state(), DeviceState::Detached);

        assert!(matches!(
            registry.detach(&name("chardev")),
            Err(ChardevError::Device(DeviceError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_attach_all_rolls_back() {
        let registry = DeviceRegistry::new(small_host(2));
        registry.attach(name("taken"), Capacity::DEFAULT).unwrap();

        let config = Config {
            host: small_host(2),
            devices: vec![
                crate::config::DeviceConfig {
                    name: name("first"),
                    capacity: Capacity::DEFAULT,
                },
                crate::config::DeviceConfig {
                    name: name("second"),
                    capacity: Capacity::DEFAULT,
                },
            ],
        };

        assert!(registry.attach_all(&config).is_err());
        assert_eq!(registry.device_names(), vec![name("taken")]);
    }

    #[test]
    fn test_independent_devices() {
        let registry = DeviceRegistry::default();
        registry.attach(name("left"), Capacity::DEFAULT).unwrap();
        registry.attach(name("right"), Capacity::DEFAULT).unwrap();

        registry.open(&name("left")).unwrap().write(b"L").unwrap();

        let right = registry.open(&name("right")).unwrap();
        assert!(right.read_vec(8).unwrap().is_empty());
        let stats = registry.stats();
        assert_eq!(stats[0].name, "left");
        assert_eq!(stats[0].fill, 1);
        assert_eq!(stats[1].fill, 0);
    }

    #[test]
    fn test_concurrent_attach() {
        use std::thread;

        let registry = DeviceRegistry::new_shared(small_host(16));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    reg.attach(name(&format!("dev-{}", i)), Capacity::DEFAULT)
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 10);
        let mut minors: Vec<_> = registry
            .device_names()
            .iter()
            .map(|n| registry.lookup(n).unwrap().number().minor)
            .collect();
        minors.sort();
        assert_eq!(minors, (0..10u32).collect::<Vec<_>>());
    }
}
