use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, warn, Instrument};

use crate::worker::AccountWorker;

/// Owns the account workers: starts them all, runs them concurrently until
/// cancellation, then tears every one of them down.
pub struct Supervisor {
    workers: Vec<AccountWorker>,
}

impl Supervisor {
    pub fn new(workers: Vec<AccountWorker>) -> Self {
        Self { workers }
    }

    /// Run all workers to completion or cancellation.
    ///
    /// A worker that fails to start is dropped with a log line; its
    /// siblings are unaffected. Every worker whose startup completed before
    /// any loop begins gets a stop attempt on the way out, even when some
    /// stops fail.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut started = Vec::with_capacity(self.workers.len());
        for mut worker in self.workers {
            let span = info_span!("account", name = %worker.name());
            match worker.start().instrument(span).await {
                Ok(()) => started.push(worker),
                Err(e) => error!("account {}: startup failed: {e}", worker.name()),
            }
        }

        let mut tasks = JoinSet::new();
        for mut worker in started {
            let shutdown = shutdown.clone();
            let span = info_span!("account", name = %worker.name());
            tasks.spawn(
                async move {
                    worker.run(shutdown).await;
                    worker
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(worker) => {
                    if let Err(e) = worker.stop().await {
                        warn!("account {}: stop failed: {e}", worker.name());
                    }
                }
                Err(e) => error!("worker task failed: {e}"),
            }
        }
    }
}
