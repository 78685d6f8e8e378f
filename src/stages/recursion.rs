//! The refeed loop: plugin enrichment, recursion, and routing.
//!
//! These stages form the pipeline's two controlled back-edges. The
//! recursive stage synthesises `Seed` items from directory-looking
//! responses, plugins synthesise `Backfeed` items from anything they
//! discover, and the routing stage sends both back to their target queues
//! while plain results fall through.

use super::{Stage, StageCtx};
use crate::plugins::ScriptPlugin;
use crate::queue::PriorityQueue;
use crate::result::{FuzzResult, PluginReport, ResultKind};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fans each completed result out to the selected scripting plugins.
/// Plugins run on the blocking pool; the item waits for all of them
/// before moving on.
pub struct PluginStage {
    scripts: Vec<Arc<dyn ScriptPlugin>>,
}

impl PluginStage {
    pub fn new(scripts: Vec<Arc<dyn ScriptPlugin>>) -> Self {
        Self { scripts }
    }
}

#[async_trait]
impl Stage for PluginStage {
    fn name(&self) -> &'static str {
        "plugins"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        if item.kind != ResultKind::Result {
            ctx.out.put(item).await;
            return Ok(());
        }

        let shared = Arc::new(item);
        let tasks: Vec<_> = self
            .scripts
            .iter()
            .map(|script| {
                let script = Arc::clone(script);
                let result = Arc::clone(&shared);
                tokio::task::spawn_blocking(move || (script.name(), script.process(&result)))
            })
            .collect();
        let outcomes = join_all(tasks).await;

        let mut item = Arc::try_unwrap(shared).unwrap_or_else(|arc| (*arc).clone());
        for joined in outcomes {
            match joined {
                Ok((name, Ok(outcome))) => {
                    for message in outcome.reports {
                        item.plugins.push(PluginReport {
                            plugin: name.to_string(),
                            message,
                            is_warning: false,
                        });
                    }
                    for request in outcome.backfeeds {
                        debug!(url = %request.url, plugin = name, "backfeeding discovered request");
                        let backfeed =
                            FuzzResult::backfeed(ctx.stats.next_id(), &item, request);
                        ctx.stats.mark_backfeed();
                        ctx.stats.fuzz_added();
                        ctx.out.put(backfeed).await;
                    }
                }
                Ok((name, Err(e))) => {
                    warn!(plugin = name, error = %e, "plugin failed");
                    item.plugins.push(PluginReport {
                        plugin: name.to_string(),
                        message: e.to_string(),
                        is_warning: true,
                    });
                }
                Err(join_error) => {
                    warn!(error = %join_error, "plugin task panicked");
                    item.plugins.push(PluginReport {
                        plugin: "<unknown>".to_string(),
                        message: join_error.to_string(),
                        is_warning: true,
                    });
                }
            }
        }

        ctx.out.put(item).await;
        Ok(())
    }
}

/// Synthesises a deeper `Seed` from every directory-looking result below
/// the configured depth limit.
pub struct RecursiveStage {
    max_rlevel: u32,
}

impl RecursiveStage {
    pub fn new(max_rlevel: u32) -> Self {
        Self { max_rlevel }
    }
}

#[async_trait]
impl Stage for RecursiveStage {
    fn name(&self) -> &'static str {
        "recursive"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        let recurse = item.kind == ResultKind::Result
            && item.rlevel < self.max_rlevel
            && item
                .response
                .as_ref()
                .map(|r| r.is_directory(&item.request.url))
                .unwrap_or(false);

        if recurse {
            let seed = FuzzResult::seed(
                ctx.stats.next_id(),
                item.request.nested_seed(),
                item.rlevel + 1,
                Some(item.nres),
            );
            debug!(url = %seed.request.url, rlevel = seed.rlevel, "directory found, recursing");
            // Registered before the parent result can reach the sink, so
            // the run cannot terminate underneath the new seed.
            ctx.term.seed_spawned();
            ctx.out.put(seed).await;
        }

        ctx.out.put(item).await;
        Ok(())
    }
}

/// Terminal of the refeed loop: sends each kind to its configured target
/// queue; unrouted kinds fall through to the next linear stage.
pub struct RoutingStage {
    routes: HashMap<ResultKind, Arc<PriorityQueue<FuzzResult>>>,
}

impl RoutingStage {
    pub fn new(routes: HashMap<ResultKind, Arc<PriorityQueue<FuzzResult>>>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Stage for RoutingStage {
    fn name(&self) -> &'static str {
        "routing"
    }

    async fn process(&self, item: FuzzResult, ctx: &StageCtx) -> crate::error::Result<()> {
        match self.routes.get(&item.kind) {
            Some(target) => target.force_put(item),
            None => {
                if matches!(item.kind, ResultKind::Seed | ResultKind::Backfeed) {
                    warn!(kind = ?item.kind, "no route for kind, passing through");
                }
                ctx.out.put(item).await;
            }
        }
        Ok(())
    }
}
