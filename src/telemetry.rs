//! Logging setup and the structured events emitted by search and backfill.

use std::time::Duration;

use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::backfill::BackfillStats;
use crate::error::{BackfillItemError, EmbeddingError};
use crate::search::SearchMethod;

/// Installs the global subscriber. `RUST_LOG` wins unless `verbose` forces debug.
pub fn init_logging(verbose: bool) -> Result<(), TryInitError> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) fn search_completed(
    query: &str,
    took: Duration,
    results: usize,
    total: usize,
    method: SearchMethod,
) {
    info!(
        query,
        took_ms = millis(took),
        results,
        total,
        method = method.as_str(),
        "search completed"
    );
}

pub(crate) fn query_embedding_generated(duration: Duration, cached: bool) {
    debug!(duration_ms = millis(duration), cached, "query embedding generated");
}

pub(crate) fn query_embedding_failed(err: &EmbeddingError) {
    warn!(error = %err, retryable = err.is_retryable(), "query embedding failed");
}

pub(crate) fn query_embedding_timed_out(budget: Duration) {
    warn!(budget_ms = millis(budget), "query embedding failed: deadline exceeded");
}

pub(crate) fn semantic_ranking_failed(err: &dyn std::error::Error) {
    warn!(error = %err, "semantic ranking failed");
}

pub(crate) fn semantic_ranking_timed_out(budget: Duration) {
    warn!(budget_ms = millis(budget), "semantic ranking failed: deadline exceeded");
}

pub(crate) fn lexical_query_failed(err: &dyn std::error::Error) {
    tracing::error!(error = %err, "lexical query failed");
}

pub(crate) fn embedding_retry(provider: &str, attempt: usize, delay: Duration, err: &EmbeddingError) {
    warn!(
        provider,
        attempt,
        delay_ms = millis(delay),
        error = %err,
        "embedding retry"
    );
}

pub(crate) fn backfill_started(total: u64, dry_run: bool) {
    info!(total, dry_run, "backfill started");
}

pub(crate) fn backfill_progress(processed: u64, total: u64, stats: &BackfillStats) {
    let percent = if total == 0 {
        100.0
    } else {
        (processed as f64 / total as f64 * 100.0).min(100.0)
    };
    let percent = (percent * 10.0).round() / 10.0;
    info!(
        processed,
        total,
        percent,
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        "backfill progress"
    );
}

pub(crate) fn backfill_item_failed(err: &BackfillItemError) {
    warn!(
        kind = %err.kind,
        id = %err.id,
        retryable = err.source.is_retryable(),
        error = %err.source,
        "backfill item failed"
    );
}

pub(crate) fn backfill_finished(stats: &BackfillStats, cancelled: bool) {
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        batches = stats.batches,
        cancelled,
        "backfill finished"
    );
}
