//! Pi Companion Bridge library
//! Drives a Raspberry Pi companion peripheral over Bluetooth Low Energy:
//! discovery, connection, telemetry reads, notifications and keyed commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
