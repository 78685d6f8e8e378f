//! # Fuzz Pipeline
//!
//! A web fuzzing engine: take a template HTTP request carrying `FUZZ`
//! markers, substitute payloads from one or more dictionaries, dispatch
//! the resulting requests concurrently, and stream back a filtered,
//! optionally enriched sequence of results.
//!
//! The crate provides the engine, not the frontend: CLI parsing, filter
//! expression languages, and terminal rendering live with the caller.
//!
//! ## Core Concepts
//!
//! - **[`FuzzRequest`]** — the seed template; markers `FUZZ`, `FUZ2Z`, …
//!   are replaced positionally by payload tuples.
//! - **[`FuzzOptions`]** — validated run configuration (payloads,
//!   encoders, iterator, filters, recursion depth, concurrency).
//! - **[`Fuzzer`]** — assembles the stage pipeline and exposes the result
//!   stream plus pause/resume/cancel controls.
//! - **[`FuzzResult`]** — one unit flowing through the pipeline, from
//!   generated request to completed exchange.
//! - **[`PluginRegistry`]** — payload sources, encoders, iterators,
//!   scripts, and printers, looked up by `(category, name)`.
//! - **[`HttpDispatcher`](dispatch::HttpDispatcher)** — the transport
//!   seam; [`dispatch::ReqwestDispatcher`] for real traffic,
//!   [`dispatch::MockDispatcher`] for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fuzz_pipeline::{FuzzOptions, FuzzRequest, Fuzzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = FuzzOptions::builder(FuzzRequest::get("http://target/FUZZ"))
//!         .wordlist(["admin", "backup", ".git", "login"])
//!         .concurrent(20)
//!         .rlevel(1)
//!         .build()?;
//!
//!     let mut fuzzer = Fuzzer::new(options).await?;
//!     while let Some(result) = fuzzer.next().await {
//!         match result {
//!             Ok(r) => {
//!                 let status = r.response.as_ref().map(|resp| resp.status).unwrap_or(0);
//!                 println!("{:>3}  {}", status, r.request.url);
//!             }
//!             Err(e) => eprintln!("error: {}", e),
//!         }
//!     }
//!     fuzzer.join().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline Shape
//!
//! ```text
//! seed → [slice] → http → receiver → [plugins] → [recursive → routing]
//!      → [filter] → [save] → [printer] → results
//! ```
//!
//! Stages hand items over through priority queues: deeper recursion
//! drains before new top-level work, and the poison sentinel that closes
//! the stream sorts after everything else. The routing stage closes the
//! two back-edges: recursion seeds return to the head, plugin-discovered
//! requests return to the HTTP stage.

pub mod dispatch;
pub mod error;
pub mod filter;
pub mod fuzzer;
pub mod generator;
pub mod manager;
pub mod options;
pub mod plugins;
pub mod queue;
pub mod request;
pub mod result;
pub mod stages;
pub mod stats;

pub use dispatch::{DispatchConfig, MockDispatcher, ReqwestDispatcher};
pub use error::{FuzzError, Result};
pub use filter::{FilterPredicate, FnFilter, FnSlice, SliceFilter};
pub use fuzzer::Fuzzer;
pub use generator::RequestGenerator;
pub use options::{FuzzOptions, FuzzOptionsBuilder, PayloadSpec};
pub use plugins::PluginRegistry;
pub use request::{FuzzRequest, FuzzResponse};
pub use result::{FuzzPayload, FuzzResult, PayloadValue, ResultKind};
pub use stats::{FuzzSnapshot, FuzzStats};
