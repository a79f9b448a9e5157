use gavel_server::config::Config;
use gavel_server::storage::StorageEngine;

use gavel_judge::lang::LanguageRegistry;
use gavel_judge::{JudgeModule, TestDataStore};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use structopt::StructOpt;
use tracing::info;

#[derive(Debug, StructOpt)]
#[structopt(name = "gavel-server", about = "online-judge evaluation backend")]
struct Opt {
    /// Path to the YAML configuration; defaults apply when absent.
    #[structopt(long, parse(from_os_str), default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the language table.
    #[structopt(long, parse(from_os_str), default_value = "lang.json")]
    languages: PathBuf,
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok();
    setup_tracing();

    let opt = Opt::from_args();

    let config = Config::load(&opt.config)?;
    info!("config loaded:\n{:#?}", config);

    let registry = Arc::new(LanguageRegistry::load(&opt.languages)?);
    info!("loaded {} languages", registry.all().len());

    let store = Arc::new(StorageEngine::new(&config.storage)?);
    let judge = Arc::new(JudgeModule::new(
        config.executor.clone(),
        registry,
        Some(store.clone() as Arc<dyn TestDataStore>),
    )?);

    gavel_server::run(config, judge, store).await
}
