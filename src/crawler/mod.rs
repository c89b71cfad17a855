//! Crawl orchestration
//!
//! This module wires the scheduling core together: the shared frontier,
//! the worker pool driving the probe gateway, and the coordinator applying
//! admission control and persistence. [`run_crawl`] is the entry point
//! once configuration, store and seed set are prepared.

mod coordinator;
mod frontier;
mod scope;
mod worker;

pub use coordinator::{Coordinator, CrawlSummary};
pub use frontier::Frontier;
pub use scope::{adjust_requests, apply_scope, domain_matches, is_crawlable, SeedContext};
pub use worker::Worker;

use crate::config::{Options, OutputMode};
use crate::fetch;
use crate::model::Request;
use crate::probe::ProbeGateway;
use crate::storage::CrawlStore;
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Computes the start and done request sets for reopening an existing
/// store.
///
/// The user-supplied seed is saved (idempotently) and re-opened via the
/// store's crawlable reset, so it is dispatched again even when a previous
/// run finished it — without duplicating its row. Resume mode additionally
/// re-seeds every not-yet-crawled in-scope request; complete mode only
/// crawls what the caller supplies.
pub fn reopen_start_set(
    store: &CrawlStore,
    mode: OutputMode,
    seed: Request,
) -> Result<(Vec<Request>, Vec<Request>)> {
    let mut reopened = seed;
    let batch = store.batch()?;
    batch.save_request(&mut reopened)?;
    batch.make_crawlable(&reopened)?;
    batch.commit()?;

    let done_requests = store.get_crawled_requests()?;
    let mut start_requests = if mode == OutputMode::Resume {
        store.get_not_crawled_requests()?
    } else {
        Vec::new()
    };

    let known = start_requests.iter().any(|r| *r == reopened)
        || done_requests.iter().any(|r| *r == reopened);
    if !known {
        start_requests.push(reopened);
    }

    Ok((start_requests, done_requests))
}

/// Runs a complete crawl: seeds the frontier, starts the worker pool and
/// drives the coordinator until quiescence or interrupt.
///
/// `done_requests` pre-populates the dedup set without being dispatched
/// (resume/complete modes); `start_requests` are persisted and enqueued.
pub async fn run_crawl(
    options: Arc<Options>,
    store: &CrawlStore,
    seed_ctx: Arc<SeedContext>,
    start_requests: Vec<Request>,
    done_requests: Vec<Request>,
) -> Result<CrawlSummary> {
    let frontier = Arc::new(Frontier::new(options.num_workers));
    let gateway = Arc::new(ProbeGateway::new(Arc::clone(&options)));
    let fallback_client = fetch::build_client(&options, false)?;
    let (results_tx, results_rx) = mpsc::unbounded_channel();

    let mut coordinator = Coordinator::new(
        Arc::clone(&options),
        store,
        Arc::clone(&frontier),
        results_rx,
    );
    coordinator.preload_done(done_requests);
    coordinator.seed(start_requests)?;

    let mut handles = Vec::new();
    for id in 0..options.num_workers {
        let worker = Worker::new(
            id,
            Arc::clone(&options),
            Arc::clone(&frontier),
            Arc::clone(&gateway),
            Arc::clone(&seed_ctx),
            fallback_client.clone(),
            results_tx.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
    }
    drop(results_tx);

    let summary = coordinator.run().await?;

    for handle in handles {
        if summary.interrupted {
            // workers blocked in a long render are not worth waiting for;
            // kill-on-drop reaps their probe processes
            handle.abort();
        } else {
            let _ = handle.await;
        }
    }

    Ok(summary)
}
