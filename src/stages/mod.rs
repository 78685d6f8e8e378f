//! Pipeline stages.
//!
//! A stage consumes items from its input queue and pushes results to the
//! next stage's queue. Each stage runs on one dedicated worker task; the
//! HTTP stage is the exception and fans out bounded in-flight request
//! tasks (see [`http`]). Errors thrown by `process` are wrapped as
//! error-kind results and forwarded, never raised out of the worker.

pub mod http;
pub mod recursion;
pub mod seed;
pub mod transform;

pub use http::{HttpReceiver, HttpStage};
pub use recursion::{PluginStage, RecursiveStage, RoutingStage};
pub use seed::{AllVarStage, SeedStage};
pub use transform::{DryRunStage, FilterStage, PrinterStage, SaveStage};

use crate::manager::Terminator;
use crate::queue::{Message, PriorityQueue};
use crate::result::FuzzResult;
use crate::stats::FuzzStats;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Everything a stage sees of its surroundings: the next stage's queue,
/// the shared counters, and the termination accountant.
#[derive(Clone)]
pub struct StageCtx {
    /// Input queue of the next stage (or the sink).
    pub out: Arc<PriorityQueue<FuzzResult>>,
    /// Shared run counters.
    pub stats: Arc<FuzzStats>,
    /// Termination accounting; poisons the head when the run drains dry.
    pub term: Arc<Terminator>,
}

/// One stage of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name, used for wiring and logging.
    fn name(&self) -> &'static str;

    /// Handle one item, pushing any outputs to `ctx.out` (or, for routing
    /// stages, onto a back-edge queue).
    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()>;

    /// Called once before the first item.
    async fn on_start(&self, _ctx: &StageCtx) -> crate::error::Result<()> {
        Ok(())
    }

    /// Called when the poison sentinel arrives, before it is forwarded.
    async fn on_poison(&self, _ctx: &StageCtx) {}
}

/// A lightweight copy of an item's identity, kept so a failed `process`
/// can still emit an error-kind result downstream.
fn sketch(item: &FuzzResult) -> FuzzResult {
    FuzzResult {
        nres: item.nres,
        parent: item.parent,
        rlevel: item.rlevel,
        payloads: item.payloads.clone(),
        request: item.request.clone(),
        response: None,
        error: None,
        kind: item.kind,
        is_baseline: item.is_baseline,
        plugins: Vec::new(),
    }
}

/// Run a stage on its own worker task: get → process → forward, until the
/// poison sentinel passes through.
pub fn spawn_worker(
    stage: Arc<dyn Stage>,
    input: Arc<PriorityQueue<FuzzResult>>,
    ctx: StageCtx,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = stage.name();
        if let Err(e) = stage.on_start(&ctx).await {
            warn!(stage = name, error = %e, "stage start hook failed");
        }
        debug!(stage = name, "stage worker running");
        loop {
            match input.get().await {
                Message::Poison => {
                    stage.on_poison(&ctx).await;
                    ctx.out.put_poison();
                    debug!(stage = name, "stage worker finished");
                    break;
                }
                Message::Item(item) => {
                    let fallback = sketch(&item);
                    if let Err(e) = stage.process(item, &ctx).await {
                        warn!(stage = name, error = %e, "item failed in stage");
                        ctx.out.put(fallback.into_error(&e)).await;
                    }
                }
            }
        }
    })
}
