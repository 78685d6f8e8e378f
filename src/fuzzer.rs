//! The top-level fuzzing facade.
//!
//! [`Fuzzer`] assembles the stage chain for a validated [`FuzzOptions`],
//! starts it, and exposes the result stream plus the run controls
//! (pause/resume, cancel, stats). The chain layout depends on the
//! configuration:
//!
//! ```text
//! seed|allvars → [slice] → http → receiver → [plugins] → [recursive → routing]
//!     → [filter] → [save] → [printer] → results
//! ```
//!
//! with `dryrun` replacing the HTTP pair, and the routing stage feeding
//! `Seed` items back to the head and `Backfeed` items back to the HTTP
//! stage.

use crate::error::{FuzzError, Result};
use crate::generator::RequestGenerator;
use crate::manager::QueueManager;
use crate::options::FuzzOptions;
use crate::queue::{Message, PauseGate, PriorityQueue};
use crate::result::{FuzzResult, ResultKind};
use crate::stages::{
    AllVarStage, DryRunStage, FilterStage, HttpReceiver, HttpStage, PluginStage, PrinterStage,
    RecursiveStage, RoutingStage, SaveStage, SeedStage,
};
use crate::stats::{FuzzSnapshot, FuzzStats};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A running fuzzing job.
///
/// Drive it by calling [`next`](Self::next) until it returns `None`; the
/// stream ends only after the pipeline has fully drained (or been
/// cancelled). Error-kind results surface as `Err` without ending the
/// stream.
///
/// # Example
///
/// ```no_run
/// use fuzz_pipeline::{FuzzOptions, FuzzRequest, Fuzzer};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let options = FuzzOptions::builder(FuzzRequest::get("http://target/FUZZ"))
///     .wordlist(["admin", "backup", "login"])
///     .concurrent(20)
///     .build()?;
///
/// let mut fuzzer = Fuzzer::new(options).await?;
/// while let Some(result) = fuzzer.next().await {
///     let result = result?;
///     println!("{} -> {:?}", result.request.url, result.response.map(|r| r.status));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Fuzzer {
    manager: QueueManager,
    results: Arc<PriorityQueue<FuzzResult>>,
    pause: Arc<PauseGate>,
    stats: Arc<FuzzStats>,
    finished: bool,
}

impl Fuzzer {
    /// Assemble the stage chain for `options` and start fuzzing.
    pub async fn new(options: FuzzOptions) -> Result<Self> {
        let options = Arc::new(options);
        let stats = Arc::new(FuzzStats::new());
        let pause = Arc::new(PauseGate::new());
        let generator = RequestGenerator::new(Arc::clone(&options), Arc::clone(&stats))?;

        let mut manager = QueueManager::new(Arc::clone(&stats), Arc::clone(&pause));

        if let Some(mode) = options.allvars {
            manager.add(Arc::new(AllVarStage::new(generator, mode)));
        } else {
            manager.add(Arc::new(SeedStage::new(generator)));
        }

        if let Some(prefilter) = &options.prefilter {
            if prefilter.is_active() {
                manager.add(Arc::new(FilterStage::prefilter(Arc::clone(prefilter))));
            }
        }

        if options.dryrun {
            manager.add(Arc::new(DryRunStage));
        } else {
            manager.add(Arc::new(HttpStage::new(
                Arc::clone(&options.dispatcher),
                options.concurrent,
                Arc::clone(&pause),
            )));
            manager.add(Arc::new(HttpReceiver));
        }

        if let Some(selector) = &options.scripts {
            let scripts = options.registry.scripts_matching(selector)?;
            manager.add(Arc::new(PluginStage::new(scripts)));
        }

        if options.scripts.is_some() || options.rlevel > 0 {
            manager.add(Arc::new(RecursiveStage::new(options.rlevel)));
            let mut routes = HashMap::new();
            if let Some(head) = manager.head() {
                routes.insert(ResultKind::Seed, head);
            }
            if let Some(http) = manager.queue("http").or_else(|| manager.queue("dryrun")) {
                routes.insert(ResultKind::Backfeed, http);
            }
            manager.add(Arc::new(RoutingStage::new(routes)));
        }

        if let Some(filter) = &options.filter {
            if filter.is_active() {
                manager.add(Arc::new(FilterStage::postfilter(Arc::clone(filter))));
            }
        }

        if let Some(path) = &options.save {
            manager.add(Arc::new(SaveStage::create(path)?));
        }

        if let Some(printer) = &options.printer {
            manager.add(Arc::new(PrinterStage::new(Arc::clone(printer))));
        }

        debug!(options = ?options, "starting fuzzing job");
        let kick = FuzzResult::seed(stats.next_id(), options.seed.clone(), 0, None);
        manager.start(kick).await?;

        Ok(Self {
            results: manager.results(),
            manager,
            pause,
            stats,
            finished: false,
        })
    }

    /// The next completed result.
    ///
    /// `None` means the run is over (poison observed); no item ever
    /// follows it. Error-kind results surface as `Err` and the stream
    /// continues; one refused connection never ends a long run.
    pub async fn next(&mut self) -> Option<Result<FuzzResult>> {
        if self.finished {
            return None;
        }
        match self.results.get().await {
            Message::Poison => {
                self.finished = true;
                None
            }
            Message::Item(item) if item.kind == ResultKind::Error => {
                let message = item
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                Some(Err(FuzzError::Other(message)))
            }
            Message::Item(item) => Some(Ok(item)),
        }
    }

    /// Hold new HTTP dispatches; in-flight requests complete normally.
    pub fn pause(&self) {
        self.pause.pause();
    }

    /// Release the pause gate.
    pub fn resume(&self) {
        self.pause.resume();
    }

    /// Request cooperative shutdown. Idempotent; keep calling
    /// [`next`](Self::next) until `None` to observe the clean drain.
    pub fn cancel(&self) {
        self.manager.cancel();
    }

    /// A snapshot of the run counters.
    pub fn stats(&self) -> FuzzSnapshot {
        self.stats.snapshot()
    }

    /// Wait for every pipeline worker to exit. Call after the stream has
    /// ended.
    pub async fn join(mut self) {
        self.manager.join().await;
    }
}
