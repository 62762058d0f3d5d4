use std::{path::PathBuf, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::info;

use tgf_core::{config::Config, supervisor::Supervisor, worker::AccountWorker};
use tgf_telegram::TelegramSource;

#[tokio::main]
async fn main() -> Result<(), tgf_core::Error> {
    tgf_core::logging::init("tgf")?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = Config::load(&config_path)?;

    // One HTTP client shared by every account's notification sink.
    let http = reqwest::Client::new();
    let workers: Vec<AccountWorker> = config
        .accounts
        .into_iter()
        .map(|account| {
            let source = Arc::new(TelegramSource::new(&account.token));
            AccountWorker::new(account, source, http.clone())
        })
        .collect();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted by user");
            signal.cancel();
        }
    });

    Supervisor::new(workers).run(shutdown).await;
    Ok(())
}
