use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use pi_companion_bridge_lib::cli::{Cli, Commands};
use pi_companion_bridge_lib::commands;
use pi_companion_bridge_lib::config::AppConfig;
use pi_companion_bridge_lib::core::bluetooth::{ConnectOutcome, SessionEvent, value_as_text};
use pi_companion_bridge_lib::logging::BridgeLogger;
use pi_companion_bridge_lib::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load_config(&config_path).await?;
    setup_logging(&config, cli.verbose);
    info!("Using configuration at {:?}", config_path);

    let app_state = AppState::new(config, &config_path)?;

    if let Err(e) = commands::activate(&app_state).await {
        error!("{}", e);
        return Err(anyhow!(e));
    }

    let outcome = run(&cli.command, &app_state).await;
    commands::teardown(&app_state).await;

    if let Err(e) = &outcome {
        error!("{}", e);
    }
    outcome
}

async fn run(command: &Commands, app_state: &AppState) -> Result<()> {
    match command {
        Commands::Scan => {
            let peer = commands::start_scan(app_state).await.map_err(|e| anyhow!(e))?;
            println!("{} {}", peer.address, peer.name);
        }
        Commands::Connect => match commands::connect_to_peer(app_state).await.map_err(|e| anyhow!(e))? {
            ConnectOutcome::Rescanned(peer) => {
                println!("No saved device, found {} at {}; connect again to use it", peer.name, peer.address);
            }
            ConnectOutcome::Connected { .. } => println!("Connected"),
        },
        Commands::Send { command } => {
            commands::send_command(app_state, command.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Sent");
        }
        Commands::Read { channel } => {
            let value = commands::read_channel(app_state, *channel)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("{}", value);
        }
        Commands::Reboot { address } => {
            commands::reboot(app_state, address.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Reboot requested");
        }
        Commands::Shutdown { address } => {
            commands::shutdown(app_state, address.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Shutdown requested");
        }
        Commands::Watch { seconds } => watch(app_state, seconds.map(Duration::from_secs)).await?,
    }
    Ok(())
}

/// Prints notifications until the deadline passes or Ctrl-C is pressed
async fn watch(app_state: &AppState, limit: Option<Duration>) -> Result<()> {
    let mut events = app_state.controller.subscribe_events();
    commands::connect_to_peer(app_state).await.map_err(|e| anyhow!(e))?;

    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::ValueChanged { channel, value }) => {
                    println!("{}: {}", channel, value_as_text(&value));
                }
                Ok(SessionEvent::ConnectionStateChanged { state }) => {
                    println!("connection: {:?}", state);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} event(s)", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let summary = commands::session_summary(app_state);
    info!("Session ended: {}", serde_json::to_string(&summary)?);
    Ok(())
}

fn setup_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        log::Level::Debug
    } else {
        config.logging.level()
    };

    if BridgeLogger::init(level).is_err() {
        // only fall back when the bridge logger could not be installed
        let _ = env_logger::builder()
            .filter_level(level.to_level_filter())
            .try_init();
    }
}
