// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `chardev stats` command - Attach configured devices and show statistics.

use chardev_core::{ConfigLoader, DeviceRegistry};

pub async fn execute(config_path: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;
    let registry = DeviceRegistry::new(config.host);
    registry.attach_all(&config)?;

    let stats = registry.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("╔═══════════════════╦══════════╦════════════╦════════════╦══════════╗");
        println!("║ Device            ║ Number   ║ Capacity   ║ Fill       ║ State    ║");
        println!("╠═══════════════════╬══════════╬════════════╬════════════╬══════════╣");

        for device in &stats {
            println!(
                "║ {:<17} ║ {:<8} ║ {:<10} ║ {:<10} ║ {:<8} ║",
                device.name,
                device.device_number,
                device.capacity,
                device.fill,
                device.state.name()
            );
        }

        println!("╚═══════════════════╩══════════╩════════════╩════════════╩══════════╝");
        println!();
        println!("Total: {} device(s)", stats.len());
    }

    registry.detach_all()?;
    Ok(())
}
