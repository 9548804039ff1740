//! Command-line interface.
//!
//! Two modes: the default service mode, which requires `--config` and
//! `--schema`, and the `healthcheck` subcommand used as a container
//! health probe.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-camera scene tracker service
#[derive(Parser, Debug)]
#[command(name = "scene-tracker")]
#[command(author, version, about = "Multi-camera object tracking over a message bus")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the JSON configuration file (required in service mode)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the JSON schema for the configuration (required in service mode)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Subcommand; absent means service mode
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query the service health endpoint
    Healthcheck {
        /// Port of the healthcheck server to query
        #[arg(long, default_value_t = 8080, value_parser = parse_probe_port)]
        port: u16,

        /// Health endpoint to query
        #[arg(long, default_value = "/readyz")]
        endpoint: String,
    },
}

fn parse_probe_port(value: &str) -> Result<u16, String> {
    let port: u16 = value.parse().map_err(|_| format!("invalid port: {value}"))?;
    if port < 1024 {
        return Err(format!("port out of range: {port} (must be 1024-65535)"));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_mode_args() {
        let cli = Cli::parse_from(["scene-tracker", "--config", "c.json", "--schema", "s.json"]);
        assert_eq!(cli.config.unwrap(), PathBuf::from("c.json"));
        assert_eq!(cli.schema.unwrap(), PathBuf::from("s.json"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_healthcheck_defaults() {
        let cli = Cli::parse_from(["scene-tracker", "healthcheck"]);
        match cli.command {
            Some(Commands::Healthcheck { port, endpoint }) => {
                assert_eq!(port, 8080);
                assert_eq!(endpoint, "/readyz");
            }
            other => panic!("expected healthcheck subcommand, got {other:?}"),
        }
    }

    #[test]
    fn test_healthcheck_custom_port() {
        let cli = Cli::parse_from(["scene-tracker", "healthcheck", "--port", "9090", "--endpoint", "/healthz"]);
        match cli.command {
            Some(Commands::Healthcheck { port, endpoint }) => {
                assert_eq!(port, 9090);
                assert_eq!(endpoint, "/healthz");
            }
            other => panic!("expected healthcheck subcommand, got {other:?}"),
        }
    }

    #[test]
    fn test_healthcheck_rejects_privileged_port() {
        let result = Cli::try_parse_from(["scene-tracker", "healthcheck", "--port", "80"]);
        assert!(result.is_err());
    }
}
