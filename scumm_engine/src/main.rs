use anyhow::Result;
use clap::Parser;

use scumm_engine::cli::{self, Args};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    cli::run(args)
}
