use anyhow::Context;
use clap::Parser;
use locator_bridge::api::server::BridgeServer;
use locator_bridge::cli::{Cli, Commands};
use locator_bridge::config::BridgeConfig;
use locator_bridge::error::{BridgeError, ErrorResponse};
use locator_bridge::logging::{
    cleanup_old_logs, init_logging, log_dir, log_file_path, LoggingConfig,
};
use std::io::IsTerminal;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get logging configuration
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json);

    // A detached bridge (stdout redirected) logs to a rolling file instead.
    // LOCATOR_LOG_FILE forces this for testing.
    let serving = matches!(cli.command, Commands::Serve { .. });
    if let Commands::Serve { log_file, .. } = &cli.command {
        let force_file_log = *log_file || std::env::var("LOCATOR_LOG_FILE").is_ok();
        if force_file_log || !std::io::stdout().is_terminal() {
            match log_file_path() {
                Ok(path) => {
                    log_config = LoggingConfig::for_server();
                    log_config.json_format = cli.json;
                    log_config.file_output = Some(path);
                },
                Err(e) => eprintln!("Warning: file logging unavailable: {}", e),
            }
        }
    }

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if serving {
        if let Some(dir) = log_dir() {
            let retention_days = std::env::var("LOCATOR_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7);

            cleanup_old_logs(&dir, retention_days).ok();
        }
    }

    if let Err(e) = run(&cli).await {
        locator_bridge::log_error!(format!("{:#}", e), "locator-bridge");
        let error_response = match e.downcast_ref::<BridgeError>() {
            Some(bridge_error) => bridge_error.to_error_response(),
            None => ErrorResponse {
                error: format!("{:#}", e),
                code: "INTERNAL_ERROR".to_string(),
            },
        };
        let rendered = serde_json::to_string_pretty(&error_response)
            .unwrap_or_else(|_| error_response.error.clone());
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = BridgeConfig::load(cli.config.as_deref())?;

    match cli.command.clone() {
        Commands::Serve { bind, .. } => {
            if let Some(bind) = bind {
                config.http.bind = bind;
            }
            BridgeServer::new(&config)?.run().await?;
        },

        Commands::Topics { format } => print_topics(&config, &format)?,
    }

    Ok(())
}

fn print_topics(config: &BridgeConfig, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            let locators: Vec<_> = config
                .locators
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "id": l.id,
                        "topic": config.subscribe_topic(&l.channel_field),
                    })
                })
                .collect();
            let out = serde_json::json!({
                "broker": format!("{}:{}", config.broker.host, config.broker.port),
                "subscribe": locators,
                "command": config.command_topic(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&out).context("Failed to render topics")?
            );
        },
        "text" => {
            println!("Broker: {}:{}", config.broker.host, config.broker.port);
            for locator in &config.locators {
                println!(
                    "  locator {:<6} <- {}",
                    locator.id,
                    config.subscribe_topic(&locator.channel_field)
                );
            }
            println!("Command topic: {}", config.command_topic());
        },
        other => {
            return Err(BridgeError::Validation(format!(
                "unknown format {:?}, expected text or json",
                other
            ))
            .into())
        },
    }
    Ok(())
}
