pub mod app;
pub mod app_dirs;
pub mod calendar;
pub mod cli;
pub mod db;
pub mod error;
pub mod machines;
pub mod models;
pub mod planner;
pub mod settings;
pub mod sync;
pub mod timer;
pub mod utils;
pub mod vision;

use anyhow::Context;
use clap::Parser;

use app::App;
use cli::Cli;

pub fn run() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to info.
    utils::logging::init();

    let cli = Cli::parse();
    log::debug!("gymproof starting up: {cli:?}");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let app = App::open_default().await?;
        cli.execute(&app).await
    })
}
