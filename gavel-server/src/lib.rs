#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod executor;
pub mod language;
pub mod storage;

use crate::config::Config;
use crate::storage::StorageEngine;

use gavel_judge::JudgeModule;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use tracing::info;

pub fn register(cfg: &mut web::ServiceConfig) {
    executor::register(cfg);
    language::register(cfg);
    storage::register(cfg);
}

pub async fn run(config: Config, judge: Arc<JudgeModule>, store: Arc<StorageEngine>) -> Result<()> {
    let port: u16 = config
        .server
        .port
        .parse()
        .with_context(|| format!("invalid server.port: {}", config.server.port))?;

    let config_data = web::Data::new(config);
    let judge_data = web::Data::from(judge);
    let store_data = web::Data::from(store);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(judge_data.clone())
            .app_data(store_data.clone())
            .configure(register)
    });

    let server = server.bind(("0.0.0.0", port))?;
    info!("server is listening 0.0.0.0:{}", port);

    server.run().await?;
    Ok(())
}
