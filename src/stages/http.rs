//! The asynchronous HTTP stage and its companion receiver.
//!
//! The HTTP stage breaks the one-worker-per-stage rule: `process` returns
//! as soon as the request is handed to a spawned task, with at most
//! `concurrent` tasks in flight. Completions land on the receiver's input
//! queue in completion order, not issue order. On poison, the stage waits
//! until the in-flight count reaches zero so the sentinel can never
//! overtake a completion.

use super::{Stage, StageCtx};
use crate::dispatch::HttpDispatcher;
use crate::queue::PauseGate;
use crate::result::{FuzzResult, ResultKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::debug;

/// Dispatches generated requests through the configured dispatcher.
pub struct HttpStage {
    dispatcher: Arc<dyn HttpDispatcher>,
    slots: Arc<Semaphore>,
    pause: Arc<PauseGate>,
    inflight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl HttpStage {
    pub fn new(
        dispatcher: Arc<dyn HttpDispatcher>,
        concurrent: usize,
        pause: Arc<PauseGate>,
    ) -> Self {
        Self {
            dispatcher,
            slots: Arc::new(Semaphore::new(concurrent.max(1))),
            pause,
            inflight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Requests currently handed to the dispatcher.
    pub fn pending(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for HttpStage {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        let wants_dispatch = matches!(item.kind, ResultKind::Result | ResultKind::Backfeed)
            && item.response.is_none();
        if !wants_dispatch {
            ctx.out.put(item).await;
            return Ok(());
        }

        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("slot semaphore never closes");
        self.pause.wait_open().await;

        if ctx.stats.cancelled() {
            // Drop quietly; cancel already drained the queues around us.
            ctx.term.fuzz_dropped();
            return Ok(());
        }

        self.inflight.fetch_add(1, Ordering::SeqCst);
        let dispatcher = Arc::clone(&self.dispatcher);
        let out = Arc::clone(&ctx.out);
        let inflight = Arc::clone(&self.inflight);
        let idle = Arc::clone(&self.idle);

        tokio::spawn(async move {
            let outcome = dispatcher.execute(&item.request).await;
            let mut item = item;
            match outcome {
                Ok(response) => {
                    item.response = Some(response);
                    if item.kind == ResultKind::Backfeed {
                        item.kind = ResultKind::Result;
                    }
                }
                Err(e) => item = item.into_error(&e),
            }
            out.put(item).await;
            drop(permit);
            if inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });

        Ok(())
    }

    async fn on_poison(&self, _ctx: &StageCtx) {
        // Counted drainage: every accepted request must reach the receiver
        // before the sentinel does.
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking, or a completion landing in between
            // would be lost and the wait would never wake.
            notified.as_mut().enable();
            if self.inflight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
        debug!("http stage drained");
        self.dispatcher.close().await;
    }
}

/// Collects completions and keeps the exchange counters; downstream of
/// here the pipeline is strictly ordered again.
pub struct HttpReceiver;

#[async_trait]
impl Stage for HttpReceiver {
    fn name(&self) -> &'static str {
        "http-receiver"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        if matches!(item.kind, ResultKind::Result | ResultKind::Error) {
            ctx.stats.mark_processed();
        }
        ctx.out.put(item).await;
        Ok(())
    }
}
