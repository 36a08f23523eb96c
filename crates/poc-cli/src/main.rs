//! Proof of Contribution CLI

use clap::{Parser, Subcommand};
use poc_core::format_units;
use poc_node::config::LoggingConfig;
use poc_node::{NodeConfig, PocNode};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "poc")]
#[command(version)]
#[command(about = "Proof of Contribution - stake to learn, earn DataCoins, collect certificates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node and serve the HTTP API
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "poc.toml", env = "POC_CONFIG")]
        config: PathBuf,

        /// Data directory, overrides storage.data_dir
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Listen address, overrides server.address
        #[arg(short, long)]
        address: Option<String>,

        /// Keep all state in memory
        #[arg(long)]
        ephemeral: bool,
    },

    /// Write the default configuration file
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "poc.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Info {
        /// Configuration file path
        #[arg(short, long, default_value = "poc.toml", env = "POC_CONFIG")]
        config: PathBuf,
    },

    /// Version information
    Version,
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            data_dir,
            address,
            ephemeral,
        } => {
            let mut node_config = NodeConfig::load(Some(&config))?;
            if let Some(dir) = data_dir {
                node_config.storage.data_dir = dir;
            }
            if let Some(address) = address {
                node_config.server.address = address;
            }
            if ephemeral {
                node_config.storage.persist = false;
            }
            init_logging(&node_config.logging, cli.verbose);

            tracing::info!("Proof of Contribution node v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Config: {:?}", config);
            if node_config.storage.persist {
                tracing::info!("Data: {:?}", node_config.storage.data_dir);
            } else {
                tracing::info!("Data: in memory only");
            }

            let node = PocNode::new(node_config).await?;
            node.run().await?;
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
            }
            let text = NodeConfig::default().to_toml()?;
            std::fs::write(&output, text)?;
            println!("Configuration written to {}", output.display());
        }

        Commands::Info { config } => {
            let node_config = NodeConfig::load(Some(&config))?;
            let economics = &node_config.economics;

            println!("Proof of Contribution v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Listen address:  {}", node_config.server.address);
            println!("Owner:           {}", economics.owner);
            println!("Escrow:          {}", economics.escrow);
            println!(
                "Reward minter:   {}",
                economics.reward_minter.unwrap_or(economics.owner)
            );
            println!("Module reward:   {} DATA", format_units(economics.module_reward, 18));
            println!("Sequential:      {}", economics.sequential_modules);
            println!(
                "Persistence:     {}",
                if node_config.storage.persist {
                    node_config.storage.data_dir.display().to_string()
                } else {
                    "disabled".to_string()
                }
            );
            println!(
                "Network:         {} ({})",
                node_config.networks.stake_network, node_config.networks.stake_chain_id
            );
            println!();
            println!("Courses:");
            for course in &node_config.courses {
                let stake = course.stake_amount.unwrap_or_default();
                println!(
                    "  #{:<3} {:<32} stake {} ETH, {} modules",
                    course.id,
                    course.title,
                    format_units(stake, 18),
                    course.total_modules.unwrap_or(course.modules.len() as u32)
                );
            }
        }

        Commands::Version => {
            println!("poc {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
