//! Pipeline heads: the seed stage and its all-variables sibling.

use super::{Stage, StageCtx};
use crate::generator::RequestGenerator;
use crate::request::VarMode;
use crate::result::{FuzzResult, ResultKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Source of the pipeline. Expands each incoming `Seed` item through the
/// generator: the initial kick expands the configured seed, recursion
/// seeds restart the generator on their own template. Every pass ends
/// with one `EndSeed` marker.
pub struct SeedStage {
    generator: Mutex<RequestGenerator>,
    baseline_sent: AtomicBool,
}

impl SeedStage {
    pub fn new(generator: RequestGenerator) -> Self {
        Self {
            generator: Mutex::new(generator),
            baseline_sent: AtomicBool::new(false),
        }
    }

    async fn emit_error(
        &self,
        ctx: &StageCtx,
        result: FuzzResult,
        error: &crate::error::FuzzError,
    ) {
        // Balance the books: the error result will be drained like any
        // other request when it reaches the sink.
        ctx.stats.fuzz_added();
        ctx.out.put(result.into_error(error)).await;
    }
}

#[async_trait]
impl Stage for SeedStage {
    fn name(&self) -> &'static str {
        "seed"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        if item.kind != ResultKind::Seed {
            ctx.out.put(item).await;
            return Ok(());
        }

        let mut generator = self.generator.lock().await;
        let rlevel = item.rlevel;

        if rlevel > 0 {
            debug!(url = %item.request.url, rlevel, "recursing into new seed");
            if let Err(e) = generator.restart(&item) {
                let end = FuzzResult::end_seed(generator.next_id(), rlevel);
                self.emit_error(ctx, item, &e).await;
                ctx.out.put(end).await;
                return Ok(());
            }
        } else if !self.baseline_sent.swap(true, Ordering::Relaxed) {
            match generator.baseline() {
                Ok(Some(baseline)) => {
                    ctx.stats.fuzz_added();
                    ctx.out.put(baseline).await;
                }
                Ok(None) => {}
                Err(e) => self.emit_error(ctx, item.clone(), &e).await,
            }
        }

        while let Some(next) = generator.next_result() {
            match next {
                Ok(mut result) => {
                    if rlevel > 0 {
                        result.rlevel = rlevel;
                        result.parent = item.parent;
                    }
                    ctx.stats.fuzz_added();
                    ctx.out.put(result).await;
                }
                Err(e) => {
                    // Configuration errors are fatal for this pass; surface
                    // one error result and stop generating.
                    self.emit_error(ctx, item.clone(), &e).await;
                    break;
                }
            }
        }

        let end = FuzzResult::end_seed(generator.next_id(), rlevel);
        ctx.out.put(end).await;
        Ok(())
    }
}

/// Alternative head: instead of positional markers, re-runs the payload
/// stream once per request variable, binding the payload to that variable.
pub struct AllVarStage {
    generator: Mutex<RequestGenerator>,
    mode: VarMode,
}

impl AllVarStage {
    pub fn new(generator: RequestGenerator, mode: VarMode) -> Self {
        Self {
            generator: Mutex::new(generator),
            mode,
        }
    }
}

#[async_trait]
impl Stage for AllVarStage {
    fn name(&self) -> &'static str {
        "allvars"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        if item.kind != ResultKind::Seed {
            ctx.out.put(item).await;
            return Ok(());
        }

        let mut generator = self.generator.lock().await;
        let variables = generator.seed().variable_names(self.mode);
        if variables.is_empty() {
            let error = crate::error::FuzzError::BadOptions(
                "seed request has no variables to iterate".to_string(),
            );
            ctx.stats.fuzz_added();
            ctx.out.put(item.into_error(&error)).await;
            let end = FuzzResult::end_seed(generator.next_id(), 0);
            ctx.out.put(end).await;
            return Ok(());
        }

        'vars: for (i, var) in variables.iter().enumerate() {
            if i > 0 {
                if let Err(e) = generator.rewind() {
                    ctx.stats.fuzz_added();
                    ctx.out.put(item.clone().into_error(&e)).await;
                    break;
                }
            }
            while let Some(tuple) = generator.next_tuple() {
                if tuple.len() != 1 {
                    let error = crate::error::FuzzError::BadOptions(format!(
                        "variable iteration needs single payload values, got {}-tuples",
                        tuple.len()
                    ));
                    ctx.stats.fuzz_added();
                    ctx.out.put(item.clone().into_error(&error)).await;
                    break 'vars;
                }
                let value = tuple.into_iter().next().unwrap();
                match generator.bind_variable(var, value) {
                    Ok(result) => {
                        ctx.stats.fuzz_added();
                        ctx.out.put(result).await;
                    }
                    Err(e) => {
                        ctx.stats.fuzz_added();
                        ctx.out.put(item.clone().into_error(&e)).await;
                        break 'vars;
                    }
                }
            }
        }

        let end = FuzzResult::end_seed(generator.next_id(), 0);
        ctx.out.put(end).await;
        Ok(())
    }
}
