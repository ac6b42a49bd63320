//! Command-line driver for tabrun.
//!
//! Replays scripted batches through the real orchestrator, validates link
//! lists the way the extension does, and prints the effective configuration.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
