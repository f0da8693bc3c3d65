//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::bluetooth::Channel;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging, overriding the configured level
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for the peripheral and save it
    Scan,
    /// Connect to the saved peripheral and start its notifications
    Connect,
    /// Write a command to the peripheral's command input
    Send {
        /// Command text
        command: String,
    },
    /// Read a telemetry channel, e.g. cpu-temperature or ip-address
    Read {
        channel: Channel,
    },
    /// Reboot the peripheral
    Reboot {
        /// Address to use instead of the saved peripheral
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Shut the peripheral down
    Shutdown {
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Connect and print notifications as they arrive
    Watch {
        /// Stop after this many seconds; runs until Ctrl-C when omitted
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}
