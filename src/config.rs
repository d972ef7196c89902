//! Server configuration.
//!
//! Everything is set from command-line flags; there is no config file and
//! no environment variable besides `RUST_LOG` for log filtering.

use crate::storage::DEFAULT_SWEEP_INTERVAL;
use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PROMPT};
use std::time::Duration;
use thiserror::Error;

/// Errors from parsing command-line flags.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid sweep interval: {0}")]
    InvalidInterval(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Time between expiry sweeps
    pub sweep_interval: Duration,
    /// Prompt written before each command
    pub prompt: String,
}

/// What the binary should do after reading its flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    /// Start the server
    Serve(Config),
    /// Print usage and exit
    Help,
    /// Print the version and exit
    Version,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from the process arguments.
    pub fn from_args() -> Result<CliAction, ConfigError> {
        Self::parse_args(std::env::args().skip(1))
    }

    /// Parse configuration from an argument list (program name excluded).
    pub fn parse_args<I, S>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or(ConfigError::MissingValue("--host"))?;
                }
                "--port" | "-p" => {
                    let value = args.next().ok_or(ConfigError::MissingValue("--port"))?;
                    config.port = value.parse().map_err(|_| ConfigError::InvalidPort(value))?;
                }
                "--sweep-interval-ms" => {
                    let value = args
                        .next()
                        .ok_or(ConfigError::MissingValue("--sweep-interval-ms"))?;
                    config.sweep_interval = match value.parse::<u64>() {
                        Ok(ms) if ms > 0 => Duration::from_millis(ms),
                        _ => return Err(ConfigError::InvalidInterval(value)),
                    };
                }
                "--prompt" => {
                    config.prompt = args.next().ok_or(ConfigError::MissingValue("--prompt"))?;
                }
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Serve(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
