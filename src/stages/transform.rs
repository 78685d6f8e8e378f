//! Linear stages: filtering, dry-run, persistence, and printing.

use super::{Stage, StageCtx};
use crate::error::Result;
use crate::filter::FilterPredicate;
use crate::plugins::Printer;
use crate::result::{FuzzResult, ResultKind};
use async_trait::async_trait;
use serde_json::json;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Drops non-matching results. Used twice in the chain: as the `slice`
/// prefilter ahead of the HTTP stage, and as the post-filter on completed
/// exchanges.
pub struct FilterStage {
    label: &'static str,
    predicate: Arc<dyn FilterPredicate>,
}

impl FilterStage {
    /// The prefilter position, ahead of HTTP dispatch.
    pub fn prefilter(predicate: Arc<dyn FilterPredicate>) -> Self {
        Self {
            label: "slice",
            predicate,
        }
    }

    /// The post-filter position, on completed exchanges.
    pub fn postfilter(predicate: Arc<dyn FilterPredicate>) -> Self {
        Self {
            label: "filter",
            predicate,
        }
    }
}

#[async_trait]
impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> Result<()> {
        if item.kind == ResultKind::Result && !self.predicate.is_visible(&item) {
            ctx.stats.mark_filtered();
            ctx.term.fuzz_dropped();
            return Ok(());
        }
        ctx.out.put(item).await;
        Ok(())
    }
}

/// Stands in for the HTTP stage when validating a run: forwards items
/// without performing any I/O.
pub struct DryRunStage;

#[async_trait]
impl Stage for DryRunStage {
    fn name(&self) -> &'static str {
        "dryrun"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> Result<()> {
        if item.kind == ResultKind::Result && item.response.is_none() {
            ctx.stats.mark_processed();
        }
        ctx.out.put(item).await;
        Ok(())
    }
}

/// Serialises completed results as JSON lines.
pub struct SaveStage {
    sink: Mutex<File>,
}

impl SaveStage {
    /// Create (truncate) the save file up front so path problems surface
    /// at build time, not mid-run.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            sink: Mutex::new(File::create(path)?),
        })
    }

    fn record(item: &FuzzResult) -> serde_json::Value {
        json!({
            "id": item.nres,
            "parent": item.parent,
            "rlevel": item.rlevel,
            "method": item.request.method,
            "url": item.request.url,
            "status": item.response.as_ref().map(|r| r.status),
            "payloads": item.payloads.iter().map(|p| p.value.render()).collect::<Vec<_>>(),
            "baseline": item.is_baseline,
            "error": item.error,
        })
    }
}

#[async_trait]
impl Stage for SaveStage {
    fn name(&self) -> &'static str {
        "save"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> Result<()> {
        if matches!(item.kind, ResultKind::Result | ResultKind::Error) {
            let mut sink = self.sink.lock().unwrap();
            writeln!(sink, "{}", Self::record(&item))?;
        }
        ctx.out.put(item).await;
        Ok(())
    }

    async fn on_poison(&self, _ctx: &StageCtx) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}

/// Terminal renderer; forwards everything into the results queue.
pub struct PrinterStage {
    printer: Arc<dyn Printer>,
}

impl PrinterStage {
    pub fn new(printer: Arc<dyn Printer>) -> Self {
        Self { printer }
    }
}

#[async_trait]
impl Stage for PrinterStage {
    fn name(&self) -> &'static str {
        "printer"
    }

    async fn on_start(&self, ctx: &StageCtx) -> Result<()> {
        self.printer.header(&ctx.stats.snapshot())
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> Result<()> {
        if matches!(item.kind, ResultKind::Result | ResultKind::Error) {
            self.printer.print(&item)?;
        }
        ctx.out.put(item).await;
        Ok(())
    }

    async fn on_poison(&self, ctx: &StageCtx) {
        if let Err(e) = self.printer.footer(&ctx.stats.snapshot()) {
            tracing::warn!(error = %e, "printer footer failed");
        }
    }
}
