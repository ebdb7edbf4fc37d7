//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{ConfigError, MeetpointConfig};

/// meetpoint - relay signaling messages through a meeting point
#[derive(Debug, Parser)]
#[command(name = "meetpoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "MEETPOINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Meeting point URL, overriding the configuration file
    #[arg(long, global = true, env = "MEETPOINT_URL")]
    pub meeting_point_url: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true, env = "MEETPOINT_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a host id and print relayed messages until Ctrl+C
    Host { host_id: String },

    /// Join a host and send each stdin line to it
    Join { host_id: String },
}

impl Cli {
    /// Loads the configuration file when one is given, then applies the
    /// command-line (or environment) overrides.
    pub fn load_config(&self) -> Result<MeetpointConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => MeetpointConfig::load(path)?,
            None => MeetpointConfig::default(),
        };
        if let Some(url) = &self.meeting_point_url {
            config.meeting_point_url = Some(url.clone());
        }
        if self.debug {
            config.debug = true;
        }
        Ok(config)
    }
}
