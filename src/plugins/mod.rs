//! Plugin traits and the name-based registry.
//!
//! Plugins come in five categories: payload sources, encoders, iterators,
//! scripts, and printers. The registry is keyed by `(category, name)`;
//! encoders and scripts additionally carry tags so a single name can expand
//! to a whole family (`hashes` → every hash encoder, in registration order).
//!
//! [`PluginRegistry::with_defaults`] registers the built-ins from the
//! sibling modules; user plugins are added through the `register_*` methods.

pub mod encoders;
pub mod iterators;
pub mod payloads;
pub mod printers;
pub mod scripts;

use crate::error::{FuzzError, Result};
use crate::request::FuzzRequest;
use crate::result::{FuzzResult, PayloadValue};
use crate::stats::FuzzSnapshot;
use std::collections::HashMap;
use std::sync::Arc;

/// Free-form parameters for a payload source (`fn`, `values`, `range`, …).
pub type PayloadParams = HashMap<String, String>;

/// A lazy stream of payload values.
///
/// Implemented by the built-in sources and by every wrapper layer the
/// generator stacks on top of them, so iterator plugins can combine any of
/// them interchangeably.
pub trait PayloadSource: Send {
    /// Number of values this source will yield, when knowable up front.
    /// `None` means unknown or infinite.
    fn count(&self) -> Option<u64>;

    /// The next value, or `None` on exhaustion.
    fn next_value(&mut self) -> Option<PayloadValue>;
}

/// A payload transformation applied by the encoder layer.
pub trait Encoder: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Family tags this encoder also answers to (e.g. `hashes`).
    fn tags(&self) -> &'static [&'static str] {
        &[]
    }

    /// Encode one value.
    fn encode(&self, input: &str) -> String;
}

impl std::fmt::Debug for dyn Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder").field("name", &self.name()).finish()
    }
}

/// Combines N payload streams into one tuple stream.
pub trait PayloadIterator: Send {
    /// Number of tuples, when knowable.
    fn count(&self) -> Option<u64>;

    /// The next tuple, or `None` on exhaustion.
    fn next_tuple(&mut self) -> Option<Vec<PayloadValue>>;
}

/// What a scripting plugin produced for one result.
#[derive(Debug, Default)]
pub struct ScriptOutcome {
    /// Enrichment notes attached to the result.
    pub reports: Vec<String>,
    /// Newly discovered requests to feed back into the HTTP stage.
    pub backfeeds: Vec<FuzzRequest>,
}

/// A post-response enrichment plugin.
pub trait ScriptPlugin: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Selector tags (e.g. `active`, `passive`).
    fn tags(&self) -> &'static [&'static str] {
        &[]
    }

    /// Inspect a completed result; may emit enrichments and backfeeds.
    /// Failures become warnings on the result, never run-fatal errors.
    fn process(&self, result: &FuzzResult) -> anyhow::Result<ScriptOutcome>;
}

/// A result sink rendering human- or machine-readable output.
pub trait Printer: Send + Sync {
    fn header(&self, stats: &FuzzSnapshot) -> Result<()>;
    fn print(&self, result: &FuzzResult) -> Result<()>;
    fn footer(&self, stats: &FuzzSnapshot) -> Result<()>;
}

type PayloadFactory = Arc<dyn Fn(&PayloadParams) -> Result<Box<dyn PayloadSource>> + Send + Sync>;
type IteratorFactory =
    Arc<dyn Fn(Vec<Box<dyn PayloadSource>>) -> Result<Box<dyn PayloadIterator>> + Send + Sync>;
type PrinterFactory = Arc<dyn Fn() -> Box<dyn Printer> + Send + Sync>;

/// Lookup table for every plugin category.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    payloads: HashMap<String, PayloadFactory>,
    encoders: Vec<Arc<dyn Encoder>>,
    iterators: HashMap<String, IteratorFactory>,
    scripts: Vec<Arc<dyn ScriptPlugin>>,
    printers: HashMap<String, PrinterFactory>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("payloads", &self.payloads.len())
            .field("encoders", &self.encoders.len())
            .field("iterators", &self.iterators.len())
            .field("scripts", &self.scripts.len())
            .field("printers", &self.printers.len())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with every built-in plugin.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        payloads::register(&mut registry);
        encoders::register(&mut registry);
        iterators::register(&mut registry);
        scripts::register(&mut registry);
        printers::register(&mut registry);
        registry
    }

    pub fn register_payload(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&PayloadParams) -> Result<Box<dyn PayloadSource>> + Send + Sync + 'static,
    ) {
        self.payloads.insert(name.into(), Arc::new(factory));
    }

    /// Instantiate a payload source by name.
    pub fn payload(&self, name: &str, params: &PayloadParams) -> Result<Box<dyn PayloadSource>> {
        let factory = self.payloads.get(name).ok_or_else(|| FuzzError::NoPlugin {
            category: "payloads",
            name: name.to_string(),
        })?;
        factory(params)
    }

    pub fn register_encoder(&mut self, encoder: Arc<dyn Encoder>) {
        self.encoders.push(encoder);
    }

    /// Exact-name encoder lookup (used by `a@b` chains).
    pub fn encoder(&self, name: &str) -> Result<Arc<dyn Encoder>> {
        self.encoders
            .iter()
            .find(|e| e.name() == name)
            .cloned()
            .ok_or_else(|| FuzzError::NoPlugin {
                category: "encoders",
                name: name.to_string(),
            })
    }

    /// Every encoder answering to `name`: an exact match, or the whole
    /// family carrying it as a tag, in registration order.
    pub fn encoders_matching(&self, name: &str) -> Vec<Arc<dyn Encoder>> {
        self.encoders
            .iter()
            .filter(|e| e.name() == name || e.tags().contains(&name))
            .cloned()
            .collect()
    }

    pub fn register_iterator(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(Vec<Box<dyn PayloadSource>>) -> Result<Box<dyn PayloadIterator>>
            + Send
            + Sync
            + 'static,
    ) {
        self.iterators.insert(name.into(), Arc::new(factory));
    }

    /// Instantiate an iterator plugin over the given streams.
    pub fn iterator(
        &self,
        name: &str,
        dicts: Vec<Box<dyn PayloadSource>>,
    ) -> Result<Box<dyn PayloadIterator>> {
        let factory = self.iterators.get(name).ok_or_else(|| FuzzError::NoPlugin {
            category: "iterators",
            name: name.to_string(),
        })?;
        factory(dicts)
    }

    pub fn register_script(&mut self, script: Arc<dyn ScriptPlugin>) {
        self.scripts.push(script);
    }

    /// Scripts selected by a comma-separated list of names and tags.
    pub fn scripts_matching(&self, selector: &str) -> Result<Vec<Arc<dyn ScriptPlugin>>> {
        let mut selected = Vec::new();
        for part in selector.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let matches: Vec<_> = self
                .scripts
                .iter()
                .filter(|s| s.name() == part || s.tags().contains(&part))
                .cloned()
                .collect();
            if matches.is_empty() {
                return Err(FuzzError::NoPlugin {
                    category: "scripts",
                    name: part.to_string(),
                });
            }
            for script in matches {
                if !selected.iter().any(|s: &Arc<dyn ScriptPlugin>| s.name() == script.name()) {
                    selected.push(script);
                }
            }
        }
        Ok(selected)
    }

    pub fn register_printer(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Printer> + Send + Sync + 'static,
    ) {
        self.printers.insert(name.into(), Arc::new(factory));
    }

    /// Instantiate a printer by name.
    pub fn printer(&self, name: &str) -> Result<Box<dyn Printer>> {
        let factory = self.printers.get(name).ok_or_else(|| FuzzError::NoPlugin {
            category: "printers",
            name: name.to_string(),
        })?;
        Ok(factory())
    }
}

/// A payload stream over an in-memory list of raw strings; backs the
/// `dictio` configuration key.
pub struct RawDictionary {
    values: std::vec::IntoIter<String>,
    total: u64,
}

impl RawDictionary {
    pub fn new(values: Vec<String>) -> Self {
        let total = values.len() as u64;
        Self {
            values: values.into_iter(),
            total,
        }
    }
}

impl PayloadSource for RawDictionary {
    fn count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn next_value(&mut self) -> Option<PayloadValue> {
        self.values.next().map(PayloadValue::Text)
    }
}
