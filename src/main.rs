use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use xonora::backend::Principal;
use xonora::config::{self, CONFIG_FILE_PATH};
use xonora::context::AppContext;
use xonora::errors::XonoraError;
use xonora::logger::{self, LogTag};
use xonora::validation::format_btc;

#[derive(Parser)]
#[command(name = "xonora")]
#[command(about = "Xonora staking client, running against an in-memory canister")]
#[command(
    after_help = "Logging flags: --debug-<tag>, --verbose, --verbose-<tag>, --quiet \
                  (tags: system, config, cache, rate-limit, validation, session, backend, monitor, service)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults apply when missing)
    #[arg(long, default_value = CONFIG_FILE_PATH)]
    config: String,

    /// Principal the offline session signs in as
    #[arg(long, default_value = "offline-principal-0001")]
    principal: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List staking pools
    Pools,

    /// Stake ckBTC into a pool
    Stake {
        /// Amount in ckBTC, up to 8 decimals
        #[arg(long)]
        amount: String,

        /// Pool id (stable, balanced, aggressive)
        #[arg(long)]
        pool: String,
    },

    /// Close a stake
    Unstake {
        #[arg(long)]
        id: String,
    },

    /// Show the signed-in user's portfolio
    Portfolio,

    /// Show session status
    Status,

    /// Show monitoring, cache, rate limit and service health
    Health,

    /// Print the effective configuration as TOML
    Config {
        /// Also write it to the --config path
        #[arg(long)]
        write: bool,
    },
}

/// Logger flags are read by the logger itself; keep them away from clap
fn is_logger_flag(arg: &str) -> bool {
    arg.starts_with("--debug-") || arg.starts_with("--verbose") || arg == "--quiet"
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args: Vec<String> = std::env::args().filter(|a| !is_logger_flag(a)).collect();
    let cli = Cli::parse_from(cli_args);

    let config = config::init_config(&cli.config)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    match &config.logging.file_path {
        Some(path) => logger::init_with_file(Path::new(path)),
        None => logger::init(),
    }

    if let Commands::Config { write } = cli.command {
        let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
        println!("{}", rendered);
        if write {
            config::save_config(&config, &cli.config).map_err(anyhow::Error::msg)?;
            logger::info(LogTag::Config, &format!("Configuration written to {}", cli.config));
        }
        return Ok(());
    }

    let (mut ctx, _canister) = AppContext::offline(config, Principal::new(cli.principal));
    ctx.start_services().await.map_err(anyhow::Error::msg)?;
    ctx.session.initialize().await;

    let outcome = run(&ctx, cli.command).await;
    ctx.shutdown().await;
    logger::flush();
    outcome
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Pools => print_json(&ctx.client.get_pools().await.map_err(user_facing)?),
        Commands::Stake { amount, pool } => {
            let stake_id = ctx.client.stake(&amount, &pool).await.map_err(user_facing)?;
            let portfolio = ctx.client.my_portfolio().await.map_err(user_facing)?;
            print_json(&json!({ "stakeId": stake_id, "portfolio": portfolio }))
        }
        Commands::Unstake { id } => {
            let paid = ctx.client.unstake(&id).await.map_err(user_facing)?;
            print_json(&json!({ "stakeId": id, "paidSats": paid, "paid": format_btc(paid) }))
        }
        Commands::Portfolio => print_json(&ctx.client.my_portfolio().await.map_err(user_facing)?),
        Commands::Status => print_json(&json!({
            "status": ctx.session.status_label(),
            "principal": ctx.session.principal_display(),
            "error": ctx.session.error(),
            "host": config::with_config(|c| c.network.host.clone()),
        })),
        Commands::Health => print_json(&json!({
            "monitoring": ctx.monitor.summary(),
            "services": ctx.service_health().await,
            "caches": ctx.caches.stats(),
            "rateLimits": ctx.limiters.stats(),
        })),
        Commands::Config { .. } => Ok(()),
    }
}

fn user_facing(error: XonoraError) -> anyhow::Error {
    anyhow::Error::msg(error.user_message())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
