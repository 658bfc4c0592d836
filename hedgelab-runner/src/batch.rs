//! Batch runs — independent sessions on a bounded worker pool.
//!
//! Sessions share no mutable state: each owns its candle slice, ledger, and
//! strategy instance. Concurrency is bounded by a semaphore; results come
//! back through the join handles (message passing, no shared mutation).

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use hedgelab_core::domain::SessionConfig;
use hedgelab_core::engine::CancelToken;
use hedgelab_store::Store;

use crate::session::{SessionError, SessionOutcome, SessionService};

/// Run a set of session configs with at most `max_parallel` in flight.
///
/// Results are returned in input order. A failed session occupies its slot
/// in the output; it never aborts its siblings. The shared `cancel` token
/// cooperatively stops every still-running session.
pub async fn run_batch<S: Store + 'static>(
    service: Arc<SessionService<S>>,
    configs: Vec<SessionConfig>,
    max_parallel: usize,
    cancel: CancelToken,
) -> Vec<Result<SessionOutcome, SessionError>> {
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(configs.len());

    for config in configs {
        let service = Arc::clone(&service);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("batch semaphore is never closed");
            service.create_and_run(config, cancel).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => results.push(outcome),
            Err(err) => {
                warn!(%err, "batch worker panicked");
                results.push(Err(SessionError::WorkerPanicked));
            }
        }
    }
    results
}
