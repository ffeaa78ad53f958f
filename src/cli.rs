use clap::{Parser, Subcommand};
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
Locator Bridge - GPS locator fleet over a cloud MQTT relay

Listens to locator telemetry on the relay, keeps the last known state of
every configured locator in memory, and serves it over HTTP. Operators can
push a destination to a locator, which is published back on the relay.

HTTP API:
  GET  /messages           last raw message of every locator that reported
  GET  /coordenadas/{id}   last known coordinates
  GET  /localizadores      configured locator ids
  GET  /status             liveness and channel state
  GET  /destino/{id}       current destination and display code
  POST /destino/{id}       {"destino": {"lat", "lng"}, "codigo"}

Configuration:
  --config <file.json>, then LOCATOR_* environment variables
  (see `locator-bridge topics` to check what resolves)
"#;

#[derive(Parser, Clone)]
#[command(name = "locator-bridge")]
#[command(about = "Bridge GPS locators on an MQTT relay to an HTTP query/command API")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the bridge: MQTT channel plus HTTP API
    Serve {
        /// HTTP listen address (overrides config and LOCATOR_HTTP_BIND)
        #[arg(long)]
        bind: Option<String>,

        /// Also write logs to ~/.locator-bridge/logs (daily rotation)
        #[arg(long)]
        log_file: bool,
    },

    /// Print the resolved telemetry and command topics, then exit
    Topics {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_bind() {
        let cli = Cli::parse_from(["locator-bridge", "-v", "serve", "--bind", "0.0.0.0:9000"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Serve { bind, log_file } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
                assert!(!log_file);
            },
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_topics_with_global_config() {
        let cli = Cli::parse_from(["locator-bridge", "topics", "--config", "bridge.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("bridge.json")));
        assert!(matches!(cli.command, Commands::Topics { ref format } if format == "text"));
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
