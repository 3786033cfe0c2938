use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use judge_engine::config::Settings;
use judge_engine::judge::JudgeEngine;
use judge_engine::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("judge_engine=info".parse()?),
        )
        .init();

    let settings = Settings::load().context("Failed to load settings")?;
    info!(
        "Starting judge engine: pool_size={}, box_ids={}..{}, cgroups={}",
        settings.pool_size,
        settings.box_id_offset,
        settings.box_id_offset as usize + settings.pool_size,
        settings.use_cgroups
    );

    std::fs::create_dir_all(&settings.work_dir).with_context(|| {
        format!("Failed to create work directory {:?}", settings.work_dir)
    })?;

    let engine = Arc::new(JudgeEngine::from_settings(&settings));

    server::serve(&settings, engine).await?;

    info!("Judge engine stopped");
    Ok(())
}
