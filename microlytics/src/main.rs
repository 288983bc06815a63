//! Service entrypoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::select;
use tokio::signal::ctrl_c;
use tracing::info;

use microlytics::cli::Cli;
use microlytics::database::cache::Diskache;
use microlytics::database::pool::{self, Pool};
use microlytics::database::Sharded;
use microlytics::enrich::Enricher;
use microlytics::web::{self, App};

/// How long in-flight shard work gets to finish on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    microlytics::logger();

    let config = Cli::parse().into_config();

    std::fs::create_dir_all(&config.root)?;
    let cache = Diskache::new(Path::new(&config.cache_directory))?;

    let pool = Pool::new(pool::Config::from(&config.pooling));
    pool.launch();

    let driver = Arc::new(Sharded::new(pool, cache, PathBuf::from(&config.root)));
    let app = Arc::new(App {
        driver: driver.clone(),
        auth: config.auth.clone(),
        enricher: Enricher::new(),
    });

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!("listening on http://{}", listener.local_addr()?);
    info!("serving databases from {}", config.root);

    select! {
        result = web::server::run(listener, app) => result?,
        _ = ctrl_c() => info!("shutting down"),
    }

    driver.shutdown(SHUTDOWN_DEADLINE).await;

    Ok(())
}
