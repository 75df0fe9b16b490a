//! Bulk embedding of items that have no valid embedding yet.
//!
//! Batches are selected oldest first with a keyset cursor, embedded with bounded
//! concurrency, and spaced so the item rate stays under the configured cap.
//! Stopping is checked between batches: the in-flight batch always completes.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::BackfillConfig;
use crate::error::{BackfillError, BackfillItemError, ConfigError, GenerateError};
use crate::generator::EmbeddingGenerator;
use crate::item::SearchableItem;
use crate::store::{BackfillCursor, EmbeddingStore};
use crate::telemetry;

/// Counters reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    /// Items embedded (and stored, unless dry run).
    pub succeeded: u64,
    /// Items whose embedding failed.
    pub failed: u64,
    /// Items handed over with no text to embed. Both bundled stores already
    /// leave such items out of selection.
    pub skipped: u64,
    /// Batches completed.
    pub batches: u64,
}

impl BackfillStats {
    /// Items looked at so far.
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed + self.skipped
    }
}

enum ItemOutcome {
    Succeeded,
    Skipped,
    Failed(BackfillItemError),
}

/// Batch processor for missing or stale embeddings.
#[derive(Clone)]
pub struct BackfillWorker {
    store: Arc<dyn EmbeddingStore>,
    generator: EmbeddingGenerator,
    config: BackfillConfig,
}

impl BackfillWorker {
    /// Validates `config` and builds a worker.
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        generator: EmbeddingGenerator,
        config: BackfillConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            generator,
            config,
        })
    }

    /// Runs until nothing is left to embed.
    pub async fn run(&self) -> Result<BackfillStats, BackfillError> {
        let (_stop_tx, stop_rx) = watch::channel(false);
        self.run_until_stopped(stop_rx).await
    }

    /// Spawns the run on the current runtime.
    pub fn start(self) -> BackfillHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run_until_stopped(stop_rx).await });
        BackfillHandle {
            stop: StopSignal(Arc::new(stop_tx)),
            task,
        }
    }

    async fn run_until_stopped(
        &self,
        mut stop_rx: watch::Receiver<bool>,
    ) -> Result<BackfillStats, BackfillError> {
        let dims = self.generator.dimensions();
        let kinds = &self.config.kinds;
        let total = self.store.count_missing(kinds, dims).await?;
        telemetry::backfill_started(total, self.config.dry_run);

        let mut stats = BackfillStats::default();
        let mut cursor: Option<BackfillCursor> = None;
        let mut cancelled = false;
        loop {
            if *stop_rx.borrow() {
                cancelled = true;
                break;
            }
            let batch_started = Instant::now();
            let batch = self
                .store
                .next_missing_batch(kinds, dims, cursor.as_ref(), self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            cursor = batch.last().map(BackfillCursor::after);
            let batch_len = batch.len();

            let outcomes: Vec<ItemOutcome> = stream::iter(batch)
                .map(|item| self.process(item))
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Succeeded => stats.succeeded += 1,
                    ItemOutcome::Skipped => stats.skipped += 1,
                    ItemOutcome::Failed(err) => {
                        stats.failed += 1;
                        telemetry::backfill_item_failed(&err);
                    }
                }
            }
            stats.batches += 1;
            telemetry::backfill_progress(stats.processed(), total, &stats);

            let min_duration = self.config.min_batch_duration(batch_len);
            let elapsed = batch_started.elapsed();
            if elapsed < min_duration {
                tokio::select! {
                    _ = tokio::time::sleep(min_duration - elapsed) => {}
                    _ = wait_for_stop(&mut stop_rx) => {}
                }
            }
        }

        telemetry::backfill_finished(&stats, cancelled);
        Ok(stats)
    }

    async fn process(&self, item: SearchableItem) -> ItemOutcome {
        if item.text_for_embedding().trim().is_empty() {
            return ItemOutcome::Skipped;
        }
        let (kind, id) = (item.kind(), item.id.clone());
        let result = if self.config.dry_run {
            self.generator
                .embed_item(&item)
                .await
                .map(|_| ())
                .map_err(GenerateError::from)
        } else {
            let mut item = item;
            self.generator
                .generate_and_store(&mut item, self.store.as_ref())
                .await
        };
        match result {
            Ok(()) => ItemOutcome::Succeeded,
            Err(source) => ItemOutcome::Failed(BackfillItemError { kind, id, source }),
        }
    }
}

async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            // Sender gone: nobody can ask us to stop any more.
            std::future::pending::<()>().await;
        }
    }
}

/// Cloneable trigger that asks a running backfill to stop after its current batch.
#[derive(Clone)]
pub struct StopSignal(Arc<watch::Sender<bool>>);

impl StopSignal {
    /// Requests a graceful stop.
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Running backfill.
pub struct BackfillHandle {
    stop: StopSignal,
    task: JoinHandle<Result<BackfillStats, BackfillError>>,
}

impl BackfillHandle {
    /// Trigger usable from another task, e.g. a Ctrl-C listener.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Requests a stop and waits for the in-flight batch to finish.
    pub async fn stop(self) -> Result<BackfillStats, BackfillError> {
        self.stop.stop();
        self.join().await
    }

    /// Waits for the run to end on its own (or via a [`StopSignal`]).
    pub async fn join(self) -> Result<BackfillStats, BackfillError> {
        self.task
            .await
            .map_err(|err| BackfillError::Join(err.to_string()))?
    }
}
