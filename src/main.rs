mod app;
mod cache;
mod commands;
mod config;
mod db;
mod dismissal;
mod event;
mod hooks;
mod logging;
mod policy;
mod portal;
mod query;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "carelink")]
#[command(about = "Keeps a local, gated view of your care portal data in sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/carelink/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config)?;

  // Initialize and run the app
  let app = app::App::new(&config)?;
  app.run(args.command).await?;

  Ok(())
}
