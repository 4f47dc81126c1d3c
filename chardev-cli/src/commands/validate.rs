// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `chardev validate` command - Validate configuration file.

use chardev_core::registry::DYNAMIC_MAJOR;
use chardev_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let major = if config.host.major == 0 {
                format!("dynamic ({})", DYNAMIC_MAJOR)
            } else {
                config.host.major.to_string()
            };

            println!("✓ Configuration is valid");
            println!();
            println!("Host Settings:");
            println!("  Major:      {}", major);
            println!("  Max Minors: {}", config.host.max_minors);
            println!();
            println!("Devices ({}):", config.devices.len());
            for device in &config.devices {
                println!(
                    "  - {} (node: {}, capacity: {})",
                    device.name,
                    device.name.node_path(),
                    device.capacity
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
