// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! chardev CLI
//!
//! Command-line interface for exercising chardev devices in-process.

use chardev_core::{ChardevError, DeviceError};
use clap::{Parser, Subcommand};

mod commands;

/// chardev - bounded FIFO character device
#[derive(Parser)]
#[command(name = "chardev")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "chardev.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Run a scripted sequence of writes and reads against a fresh device
    Exercise {
        /// Buffer capacity in bytes
        #[arg(long, default_value_t = 1024)]
        capacity: usize,

        /// Text to write (repeatable, runs in order before reads)
        #[arg(short, long = "write")]
        writes: Vec<String>,

        /// Bytes to read (repeatable, runs in order after writes)
        #[arg(short, long = "read")]
        reads: Vec<usize>,
    },

    /// Hammer one device with concurrent producers and consumers
    Stress {
        /// Buffer capacity in bytes
        #[arg(long, default_value_t = 1024)]
        capacity: usize,

        /// Number of producer sessions
        #[arg(short, long, default_value_t = 4)]
        producers: usize,

        /// Number of consumer sessions
        #[arg(short = 'q', long, default_value_t = 4)]
        consumers: usize,

        /// Bytes each producer writes
        #[arg(short, long, default_value_t = 1024 * 1024)]
        bytes: usize,

        /// Print the final device stats as JSON
        #[arg(long)]
        json: bool,
    },

    /// Attach the configured devices and show their statistics
    Stats {
        /// Print stats as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Process status for a failed command: the errno of a library error,
/// 1 for anything else.
fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    if let Some(err) = err.downcast_ref::<ChardevError>() {
        err.errno()
    } else if let Some(err) = err.downcast_ref::<DeviceError>() {
        err.errno()
    } else {
        1
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    let result = match cli.command {
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Exercise {
            capacity,
            writes,
            reads,
        } => commands::exercise::execute(capacity, &writes, &reads).await,
        Commands::Stress {
            capacity,
            producers,
            consumers,
            bytes,
            json,
        } => commands::stress::execute(capacity, producers, consumers, bytes, json).await,
        Commands::Stats { json } => commands::stats::execute(&cli.config, json).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(e.as_ref()));
    }
}
