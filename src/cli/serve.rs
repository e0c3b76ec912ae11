use std::path::PathBuf;

use anyhow::Context;

use super::report;
use crate::config::AppConfig;
use crate::error::{ErrorCode, TaskhubError};
use crate::{logging, server};

pub fn run(host: Option<String>, port: Option<u16>, db: Option<PathBuf>, json_output: bool) -> i32 {
    let config = match configure(host, port, db) {
        Ok(config) => config,
        Err(e) => return report(&TaskhubError::config(format!("{e:#}")), json_output),
    };

    logging::init(&config.log_filter);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.bind_address(),
        database = %config.database_path.display(),
        "starting taskhub"
    );

    match start(config) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "taskhub stopped");
            let err = match e.downcast_ref::<TaskhubError>() {
                Some(inner) => TaskhubError::new(inner.code, format!("{e:#}")),
                None => TaskhubError::new(ErrorCode::ServerError, format!("{e:#}")),
            };
            report(&err, json_output)
        }
    }
}

/// Environment and `.env` first, then flags on top.
fn configure(host: Option<String>, port: Option<u16>, db: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(db) = db {
        config.database_path = db;
    }
    config.validate()?;
    Ok(config)
}

fn start(config: AppConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(server::serve(config))
}
