//! The `pi` command-line client.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
