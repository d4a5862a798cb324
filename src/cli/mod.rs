//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::app::{self, AppContext};
use crate::config::Config;
use crate::store::{SqlUserStore, UserStore};
use crate::telemetry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "usercache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        env = "USERCACHE_CONFIG",
        help = "Path to the TOML config file"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "serve", about = "Start the HTTP server")]
    Serve,

    #[command(name = "init-db", about = "Create the users table if absent")]
    InitDb,

    #[command(name = "status", about = "Check store and cache status")]
    Status(StatusArgs),

    #[command(name = "flush-cache", about = "Delete the cached user list")]
    FlushCache,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Show user count and metrics")]
    pub verbose: bool,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod flush;
mod status;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = telemetry::init_tracing("usercache", &config.logging)?;

    match &cli.command {
        Commands::Serve => {
            let ctx = AppContext::init(config).await?;
            app::serve(ctx).await
        }
        Commands::InitDb => {
            let store = SqlUserStore::connect(&config.database).await?;
            store.create_table_if_absent().await?;
            store.close().await?;
            println!("✅ Table users ready");
            Ok(())
        }
        Commands::Status(args) => {
            let ctx = AppContext::init(config).await?;
            let result = status::execute(&ctx, args).await;
            ctx.shutdown().await?;
            result
        }
        Commands::FlushCache => {
            let ctx = AppContext::init(config).await?;
            let result = flush::execute(&ctx).await;
            ctx.shutdown().await?;
            result
        }
    }
}
