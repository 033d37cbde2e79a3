//! `switchyard daemon`: the full runtime.

use std::time::Duration;

use switchyard_channels::ChannelManager;
use switchyard_workflow::SchedulerWorker;
use tracing::info;

use super::{CmdResult, Pipeline, load_config};

pub async fn run() -> CmdResult {
    let config = load_config()?;
    let pipeline = Pipeline::build(&config).await?;

    let channels = ChannelManager::new(
        pipeline.registry.clone(),
        pipeline.store.clone(),
        pipeline.bus.clone(),
        &config.telegram,
    );
    let scheduler = config.scheduler.enabled.then(|| {
        SchedulerWorker::new(
            pipeline.store.clone(),
            pipeline.runner.clone(),
            Duration::from_secs(config.scheduler.poll_interval_secs),
        )
    });

    println!("Switchyard daemon starting");
    println!("   Database:  {}", config.database_path);
    println!("   Model:     {}", config.model.model);
    println!("   Workers:   {}", pipeline.inbound.max_parallel());
    println!(
        "   Telegram:  {}",
        if config.telegram.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "   Scheduler: {}",
        if scheduler.is_some() { "enabled" } else { "disabled" }
    );

    pipeline.start().await;
    channels.start().await;
    if let Some(scheduler) = &scheduler {
        scheduler.start().await;
    }
    info!("Daemon running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Some(scheduler) = &scheduler {
        scheduler.stop().await;
    }
    channels.stop().await;
    pipeline.stop().await;

    info!("Daemon stopped");
    Ok(())
}
