//! CLI for the role sync Discord bot.
//!
//! Startup: load config -> connect gateway -> register guild commands -> serve
//! interactions until SIGINT/SIGTERM. Gateway reconnects are handled inside
//! the gateway task; only a fatal close (bad token, bad intents) ends `run`
//! early.

use clap::{Parser, Subcommand};
use rolesync_core::config::{DEFAULT_CONFIG_PATH, DEFAULT_LOG_PATH};
use rolesync_core::Config;
use rolesync_engine::{register_commands, CommandDispatcher};
use rolesync_provider::{CommandApi, DiscordRestClient, Gateway, GatewayEvent, GuildApi};
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rolesync", version, about = "Discord role permission sync bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to Discord and serve the role-sync and auto-role commands.
    Run {
        #[arg(short, long, env = "ROLESYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Appended to, never truncated.
        #[arg(long, default_value = DEFAULT_LOG_PATH)]
        log_file: PathBuf,

        /// Overrides `discord.token` from the config file.
        #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Load the config and check every auto-role condition.
    CheckConfig {
        #[arg(short, long, env = "ROLESYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stdout plus an append-mode log file.
fn init_logging(log_file: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            log_file,
            token,
        } => {
            init_logging(&log_file)?;
            run(&config, token).await
        }
        Commands::CheckConfig { config } => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
            check_config(&config)
        }
    }
}

async fn run(config_path: &Path, token: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load(config_path)?;
    if let Some(token) = token {
        config.discord.token = token;
    }
    config.validate()?;
    tracing::info!(
        config = %config_path.display(),
        configured_guilds = config.discord.auto_roles.len(),
        "configuration loaded"
    );

    let rest = Arc::new(DiscordRestClient::new(&config.discord)?);
    let application = rest.current_user().await?;
    tracing::info!(application_id = %application.id, name = %application.username, "authenticated");

    let gateway = Gateway::new(rest.gateway_url().await?, rest.bot_token());
    let mut events = gateway.connect().await?;

    let rules = Arc::new(config.discord.auto_roles);
    let summary = register_commands(rest.as_ref(), &application.id, &rules).await?;
    tracing::info!(
        guilds = summary.guilds,
        removed = summary.removed,
        created = summary.created,
        "commands registered"
    );

    let api: Arc<dyn GuildApi> = rest;
    let dispatcher = Arc::new(CommandDispatcher::new(api, rules));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(GatewayEvent::Ready { user, guild_count }) => {
                        tracing::info!(user = %user.username, guild_count, "gateway ready");
                    }
                    Some(GatewayEvent::InteractionCreate(interaction)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move {
                            dispatcher.handle(&interaction).await;
                        });
                    }
                    None => {
                        tracing::error!("gateway refused the session; check the token and intents");
                        return Err("gateway session ended with a fatal close code".into());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn check_config(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path)?;
    if let Err(e) = config.validate() {
        tracing::warn!(error = %e, "config is incomplete; a token can also come from DISCORD_TOKEN");
    }

    let mut guilds: Vec<_> = config.discord.auto_roles.guilds().collect();
    guilds.sort_by_key(|(guild_id, _)| *guild_id);

    let mut invalid = 0usize;
    println!("{} guild(s) with auto-role rules", guilds.len());
    for (guild_id, rules) in guilds {
        println!("guild {guild_id}: {} rule(s)", rules.len());
        for rule in rules {
            let condition = match rule.condition.min_tenure() {
                Ok(None) => "no condition".to_string(),
                Ok(Some(_)) => format!("age_on_server >= {}", rule.condition.age_on_server),
                Err(e) => {
                    invalid += 1;
                    format!("INVALID ({e})")
                }
            };
            println!("  {} ({}): {condition}", rule.name, rule.id);
        }
    }

    if invalid > 0 {
        return Err(format!("{invalid} invalid age_on_server value(s)").into());
    }
    println!("config OK");
    Ok(())
}
