//! `halo run`: host the remediation loop until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use crate::application::HaloLoop;
use crate::domain::models::Config;
use crate::infrastructure::{logging, ConfigLoader, HttpSquadTarget};
use crate::services::triggers::{
    DeployTrigger, DispatchFailureTrigger, ErrorRateTrigger, ObservedIssueTrigger,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file path (defaults to hierarchical .halo/ loading)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

pub async fn execute(args: RunArgs, _json: bool) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let _guard = logging::init(&config.logging)?;

    let halo = HaloLoop::new(&config);
    halo.start().await;

    let registry = halo.triggers();
    registry
        .register(Arc::new(DeployTrigger::new(halo.bus())))
        .await;
    registry
        .register(Arc::new(ErrorRateTrigger::from_settings(
            halo.bus(),
            &config.triggers,
        )))
        .await;
    registry
        .register(Arc::new(ObservedIssueTrigger::new(halo.bus())))
        .await;
    registry
        .register(Arc::new(DispatchFailureTrigger::from_settings(
            halo.bus(),
            &config.triggers,
        )))
        .await;

    if let Some(url) = &config.dispatcher.squad_api_url {
        for target in &config.dispatcher.default_targets {
            halo.dispatcher()
                .register_target(target.clone(), Arc::new(HttpSquadTarget::new(url.clone())))
                .await;
        }
        tracing::info!(url = %url, "squad API destinations registered");
    }

    tracing::info!("halo loop running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    halo.stop().await;
    Ok(())
}
