// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `chardev stress` command - Concurrent producers and consumers on one device.
//!
//! Each session runs on its own blocking task. The run passes when every
//! written byte was read exactly once: equal totals and an identical
//! per-value histogram. With one producer and one consumer the stream order
//! is also checked by comparing CRC32 checksums. A session that fails
//! raises a stop flag so the others wind down instead of waiting for bytes
//! that will never arrive; the first failure is reported.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chardev_core::{Capacity, DeviceName, DeviceRegistry};
use tokio::task::JoinHandle;

/// Largest single write or read a session issues.
const CHUNK: usize = 512;

/// What one side of the run saw.
struct StreamSummary {
    bytes: usize,
    histogram: [u64; 256],
    checksum: u32,
}

impl StreamSummary {
    fn new() -> Self {
        Self {
            bytes: 0,
            histogram: [0; 256],
            checksum: 0,
        }
    }

    fn merge(&mut self, other: &StreamSummary) {
        self.bytes += other.bytes;
        for (total, count) in self.histogram.iter_mut().zip(other.histogram.iter()) {
            *total += count;
        }
    }
}

/// Deterministic payload byte `i` for producer `producer`.
fn payload_byte(producer: usize, i: usize) -> u8 {
    (i.wrapping_mul(31).wrapping_add(producer * 7) % 251) as u8
}

/// Write `bytes` payload bytes as `producer`, retrying while the buffer is
/// full. Returns early with what was sent once `stop` is raised.
fn produce(
    registry: &DeviceRegistry,
    name: &DeviceName,
    producer: usize,
    bytes: usize,
    stop: &AtomicBool,
) -> Result<StreamSummary, String> {
    let session = registry.open(name).map_err(|e| e.to_string())?;
    let mut summary = StreamSummary::new();
    let mut hasher = crc32fast::Hasher::new();
    let mut chunk = Vec::with_capacity(CHUNK);
    let mut sent = 0;

    while sent < bytes {
        if stop.load(Ordering::Acquire) {
            break;
        }

        chunk.clear();
        let end = (sent + CHUNK).min(bytes);
        chunk.extend((sent..end).map(|i| payload_byte(producer, i)));

        match session.write(&chunk) {
            Ok(n) => {
                for byte in &chunk[..n] {
                    summary.histogram[*byte as usize] += 1;
                }
                hasher.update(&chunk[..n]);
                sent += n;
            }
            Err(e) if e.is_retryable() => std::thread::yield_now(),
            Err(e) => return Err(e.to_string()),
        }
    }

    summary.bytes = sent;
    summary.checksum = hasher.finalize();
    Ok(summary)
}

pub async fn execute(
    capacity: usize,
    producers: usize,
    consumers: usize,
    bytes: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if producers == 0 || consumers == 0 {
        return Err("stress needs at least one producer and one consumer".into());
    }

    let total = producers
        .checked_mul(bytes)
        .ok_or("producers x bytes overflows the total byte count")?;

    let registry = Arc::new(DeviceRegistry::default());
    let name = DeviceName::new("chardev")?;
    let device = registry.attach(name.clone(), Capacity::new(capacity)?)?;
    let consumed = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    tracing::info!(
        capacity,
        producers,
        consumers,
        bytes_per_producer = bytes,
        "Starting stress run"
    );
    let start = Instant::now();

    let producer_tasks: Vec<JoinHandle<Result<StreamSummary, String>>> = (0..producers)
        .map(|producer| {
            let registry = Arc::clone(&registry);
            let name = name.clone();
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || {
                let result = produce(&registry, &name, producer, bytes, &stop);
                if result.is_err() {
                    stop.store(true, Ordering::Release);
                }
                result
            })
        })
        .collect();

    let consumer_tasks: Vec<JoinHandle<Result<StreamSummary, String>>> = (0..consumers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let name = name.clone();
            let consumed = Arc::clone(&consumed);
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || {
                let session = registry.open(&name).map_err(|e| e.to_string())?;
                let mut summary = StreamSummary::new();
                let mut hasher = crc32fast::Hasher::new();
                let mut dst = [0u8; CHUNK];

                while consumed.load(Ordering::Acquire) < total {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }

                    let n = match session.read(&mut dst) {
                        Ok(0) => {
                            std::thread::yield_now();
                            continue;
                        }
                        Ok(n) => n,
                        Err(e) if e.is_retryable() => continue,
                        Err(e) => {
                            stop.store(true, Ordering::Release);
                            return Err(e.to_string());
                        }
                    };

                    consumed.fetch_add(n, Ordering::AcqRel);
                    for byte in &dst[..n] {
                        summary.histogram[*byte as usize] += 1;
                    }
                    hasher.update(&dst[..n]);
                    summary.bytes += n;
                }

                summary.checksum = hasher.finalize();
                Ok(summary)
            })
        })
        .collect();

    // Join every task before reporting so none outlives the device.
    let mut written = StreamSummary::new();
    let mut read = StreamSummary::new();
    let mut failure = None;

    for task in producer_tasks {
        match task.await? {
            Ok(summary) => {
                written.checksum = summary.checksum;
                written.merge(&summary);
            }
            Err(e) => failure = failure.or(Some(e)),
        }
    }

    for task in consumer_tasks {
        match task.await? {
            Ok(summary) => {
                read.checksum = summary.checksum;
                read.merge(&summary);
            }
            Err(e) => failure = failure.or(Some(e)),
        }
    }

    if let Some(e) = failure {
        registry.detach(&name)?;
        return Err(e.into());
    }

    let elapsed = start.elapsed();
    let stats = device.stats();

    let mut ok = written.bytes == read.bytes && written.histogram == read.histogram;
    if producers == 1 && consumers == 1 {
        ok &= written.checksum == read.checksum;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        let throughput = read.bytes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        println!("Stress run on {} ({})", name.node_path(), device.number());
        println!("  Written:      {} bytes", written.bytes);
        println!("  Read:         {} bytes", read.bytes);
        println!("  Writes:       {}", stats.counters.writes);
        println!("  Reads:        {}", stats.counters.reads);
        println!("  Full buffer:  {} rejected write(s)", stats.counters.no_space);
        println!("  Elapsed:      {:.2?}", elapsed);
        println!("  Throughput:   {:.1} MB/s", throughput / (1024.0 * 1024.0));
        if producers == 1 && consumers == 1 {
            println!(
                "  CRC32:        written {:#010x}, read {:#010x}",
                written.checksum, read.checksum
            );
        }
    }

    drop(device);
    registry.detach(&name)?;

    if ok {
        if !json {
            println!("✓ Every byte was read exactly once");
        }
        Ok(())
    } else {
        eprintln!("✗ Stream mismatch between producers and consumers");
        std::process::exit(1);
    }
}
