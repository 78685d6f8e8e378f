//! Stage chain wiring, termination accounting, and cancellation.
//!
//! The manager owns the ordered stage list, spawns one worker per stage,
//! and runs the sink loop that consumes `EndSeed` markers and forwards
//! everything else into the public results queue. Termination is counted,
//! not inferred: the poison sentinel is injected at the head exactly once,
//! when no request and no seed remains anywhere in the graph.

use crate::error::{FuzzError, Result};
use crate::queue::{Message, PauseGate, PriorityQueue};
use crate::result::{FuzzResult, ResultKind};
use crate::stages::{spawn_worker, Stage, StageCtx};
use crate::stats::FuzzStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-stage queue capacity; beyond this, producers wait. Keeps a fast
/// generator from ballooning memory ahead of the HTTP stage.
const STAGE_QUEUE_CAPACITY: usize = 512;

/// Decides when the pipeline is done and injects the poison sentinel.
///
/// Offspring registration happens upstream of every decrement site: a
/// recursion seed or backfeed is counted before its parent item can reach
/// the sink, so the zero-check can never fire early.
pub struct Terminator {
    head: Arc<PriorityQueue<FuzzResult>>,
    stats: Arc<FuzzStats>,
    poisoned: AtomicBool,
}

impl Terminator {
    pub fn new(head: Arc<PriorityQueue<FuzzResult>>, stats: Arc<FuzzStats>) -> Self {
        Self {
            head,
            stats,
            poisoned: AtomicBool::new(false),
        }
    }

    /// A seed entered the pipeline.
    pub fn seed_spawned(&self) {
        self.stats.seed_added();
    }

    /// A seed's `EndSeed` marker was consumed at the sink.
    pub fn seed_finished(&self) {
        if self.stats.seed_removed() {
            self.poison();
        }
    }

    /// A request left the pipeline: delivered at the sink, or dropped by a
    /// filter or by cancellation.
    pub fn fuzz_dropped(&self) {
        if self.stats.fuzz_removed() {
            self.poison();
        }
    }

    /// Inject the sentinel at the head, exactly once per run.
    pub fn poison(&self) {
        if !self.poisoned.swap(true, Ordering::SeqCst) {
            debug!("pipeline drained, poisoning head");
            self.head.put_poison();
        }
    }
}

struct StageEntry {
    stage: Arc<dyn Stage>,
    input: Arc<PriorityQueue<FuzzResult>>,
}

/// Owns the ordered stage chain and its workers.
pub struct QueueManager {
    stats: Arc<FuzzStats>,
    pause: Arc<PauseGate>,
    stages: Vec<StageEntry>,
    results: Arc<PriorityQueue<FuzzResult>>,
    term: Option<Arc<Terminator>>,
    handles: Vec<JoinHandle<()>>,
}

impl QueueManager {
    pub fn new(stats: Arc<FuzzStats>, pause: Arc<PauseGate>) -> Self {
        Self {
            stats,
            pause,
            stages: Vec::new(),
            results: Arc::new(PriorityQueue::bounded(STAGE_QUEUE_CAPACITY)),
            term: None,
            handles: Vec::new(),
        }
    }

    /// Append a stage; its output is rebound when the chain starts.
    pub fn add(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(StageEntry {
            stage,
            input: Arc::new(PriorityQueue::bounded(STAGE_QUEUE_CAPACITY)),
        });
    }

    /// The input queue of the named stage, for wiring back-edges.
    pub fn queue(&self, name: &str) -> Option<Arc<PriorityQueue<FuzzResult>>> {
        self.stages
            .iter()
            .find(|entry| entry.stage.name() == name)
            .map(|entry| Arc::clone(&entry.input))
    }

    /// The head stage's input queue.
    pub fn head(&self) -> Option<Arc<PriorityQueue<FuzzResult>>> {
        self.stages.first().map(|entry| Arc::clone(&entry.input))
    }

    /// The public results queue; ends with the poison sentinel.
    pub fn results(&self) -> Arc<PriorityQueue<FuzzResult>> {
        Arc::clone(&self.results)
    }

    /// Launch every stage worker and kick the pipeline with the initial
    /// seed item.
    pub async fn start(&mut self, kick: FuzzResult) -> Result<()> {
        let head = self.head().ok_or_else(|| {
            FuzzError::BadOptions("pipeline has no stages".to_string())
        })?;
        let term = Arc::new(Terminator::new(Arc::clone(&head), Arc::clone(&self.stats)));
        self.term = Some(Arc::clone(&term));

        let sink_input: Arc<PriorityQueue<FuzzResult>> =
            Arc::new(PriorityQueue::bounded(STAGE_QUEUE_CAPACITY));
        for i in 0..self.stages.len() {
            let out = match self.stages.get(i + 1) {
                Some(next) => Arc::clone(&next.input),
                None => Arc::clone(&sink_input),
            };
            let ctx = StageCtx {
                out,
                stats: Arc::clone(&self.stats),
                term: Arc::clone(&term),
            };
            self.handles.push(spawn_worker(
                Arc::clone(&self.stages[i].stage),
                Arc::clone(&self.stages[i].input),
                ctx,
            ));
        }
        self.handles.push(tokio::spawn(sink_loop(
            sink_input,
            Arc::clone(&self.results),
            Arc::clone(&self.stats),
            term,
        )));

        self.stats.mark_start();
        self.stats.seed_added();
        head.put(kick).await;
        Ok(())
    }

    /// Idempotent, eventually-effective shutdown: flag the run cancelled,
    /// release the pause gate, drop all queued work, and poison the head.
    pub fn cancel(&self) {
        if self.stats.cancelled() {
            return;
        }
        self.stats.set_cancelled();
        self.pause.resume();
        let mut dropped = 0;
        for entry in &self.stages {
            dropped += entry.input.drain();
        }
        debug!(dropped, "cancelled, queues drained");
        if let Some(term) = &self.term {
            term.poison();
        }
    }

    /// Wait for every worker to exit. Call after the results queue has
    /// yielded its poison.
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Final consumer of the stage chain: settles accounting, swallows
/// `EndSeed` markers, and republishes everything else to the public
/// results queue.
async fn sink_loop(
    input: Arc<PriorityQueue<FuzzResult>>,
    results: Arc<PriorityQueue<FuzzResult>>,
    stats: Arc<FuzzStats>,
    term: Arc<Terminator>,
) {
    loop {
        match input.get().await {
            Message::Poison => {
                stats.mark_end();
                results.put_poison();
                debug!("results stream closed");
                break;
            }
            Message::Item(item) => match item.kind {
                ResultKind::EndSeed => term.seed_finished(),
                ResultKind::Result | ResultKind::Error => {
                    results.put(item).await;
                    term.fuzz_dropped();
                }
                other => {
                    warn!(kind = ?other, "unrouted kind reached the sink");
                    results.put(item).await;
                }
            },
        }
    }
}
