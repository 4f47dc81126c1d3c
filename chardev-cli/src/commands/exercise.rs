// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `chardev exercise` command - Scripted writes and reads on a fresh device.
//!
//! Every outcome is printed together with the value a file-operations
//! table would hand back: a byte count or a negative errno.

use chardev_core::{Capacity, DeviceName, DeviceRegistry};

pub async fn execute(
    capacity: usize,
    writes: &[String],
    reads: &[usize],
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = DeviceRegistry::default();
    let name = DeviceName::new("chardev")?;
    let device = registry.attach(name.clone(), Capacity::new(capacity)?)?;

    println!(
        "Attached {} ({}) with a {} buffer",
        name.node_path(),
        device.number(),
        device.capacity()
    );

    let session = registry.open(&name)?;

    for text in writes {
        match session.write(text.as_bytes()) {
            Ok(n) => println!("write {:?} -> {} (fill {})", text, n, device.fill()),
            Err(e) => println!(
                "write {:?} -> -{} {} (fill {})",
                text,
                e.errno(),
                e,
                device.fill()
            ),
        }
    }

    for &max_bytes in reads {
        match session.read_vec(max_bytes) {
            Ok(bytes) if bytes.is_empty() => {
                println!("read {} -> 0 end of data (fill {})", max_bytes, device.fill())
            }
            Ok(bytes) => println!(
                "read {} -> {} {:?} (fill {})",
                max_bytes,
                bytes.len(),
                String::from_utf8_lossy(&bytes),
                device.fill()
            ),
            Err(e) => println!(
                "read {} -> -{} {} (fill {})",
                max_bytes,
                e.errno(),
                e,
                device.fill()
            ),
        }
    }

    session.close();
    registry.detach(&name)?;
    Ok(())
}
