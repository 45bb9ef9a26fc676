//! `halo config`: print the effective configuration after merging.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::infrastructure::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config file path (defaults to hierarchical .halo/ loading)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: ConfigArgs, json: bool) -> Result<()> {
    let config = match args.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    if json {
        println!("{}", serde_json::to_string(&config)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }
    Ok(())
}
