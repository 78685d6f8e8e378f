//! Request generation.
//!
//! The generator couples a seed template to a lazy payload tuple stream.
//! Each dictionary slot is a [`PayloadStream`]: a raw source, optionally
//! wrapped by an encoder layer and a slice filter. Multiple slots are
//! combined by an iterator plugin (`product` by default); a single slot
//! yields 1-tuples directly.

use crate::error::{FuzzError, Result};
use crate::filter::SliceFilter;
use crate::options::{FuzzOptions, PayloadSpec, SourceSpec};
use crate::plugins::{Encoder, PayloadIterator, PayloadSource, PluginRegistry};
use crate::request::FuzzRequest;
use crate::result::{index_payloads, FuzzResult, PayloadValue, ResultKind};
use crate::stats::FuzzStats;
use std::collections::VecDeque;
use std::sync::Arc;

/// A parsed encoder specification for one dictionary slot.
pub enum EncoderSpec {
    /// A plain name, expanded to every matching plugin; each input value
    /// yields one output per plugin.
    Expand(Vec<Arc<dyn Encoder>>),
    /// An `a@b@…` chain applied right-to-left; one output per input.
    Chain(Vec<Arc<dyn Encoder>>),
}

impl EncoderSpec {
    /// Parse one specification against the registry.
    pub fn parse(registry: &PluginRegistry, spec: &str) -> Result<Self> {
        if spec.contains('@') {
            let links = spec
                .split('@')
                .map(|name| registry.encoder(name))
                .collect::<Result<Vec<_>>>()?;
            Ok(EncoderSpec::Chain(links))
        } else {
            let expanded = registry.encoders_matching(spec);
            if expanded.is_empty() {
                return Err(FuzzError::NoPlugin {
                    category: "encoders",
                    name: spec.to_string(),
                });
            }
            Ok(EncoderSpec::Expand(expanded))
        }
    }

    /// How many outputs one input expands into.
    fn factor(&self) -> u64 {
        match self {
            EncoderSpec::Expand(list) => list.len() as u64,
            EncoderSpec::Chain(_) => 1,
        }
    }

    fn apply(&self, input: &str, out: &mut VecDeque<PayloadValue>) {
        match self {
            EncoderSpec::Expand(list) => {
                for encoder in list {
                    out.push_back(PayloadValue::Text(encoder.encode(input)));
                }
            }
            EncoderSpec::Chain(links) => {
                let mut value = input.to_string();
                for encoder in links.iter().rev() {
                    value = encoder.encode(&value);
                }
                out.push_back(PayloadValue::Text(value));
            }
        }
    }
}

/// One dictionary slot, with its wrapper layers collapsed into an enum.
pub enum PayloadStream {
    /// The bare source.
    Source(Box<dyn PayloadSource>),
    /// Encoder layer over an inner stream.
    Encoded {
        inner: Box<PayloadStream>,
        specs: Vec<EncoderSpec>,
        ready: VecDeque<PayloadValue>,
    },
    /// Slice layer: values failing the filter are skipped; count unknown.
    Sliced {
        inner: Box<PayloadStream>,
        filter: Arc<dyn SliceFilter>,
    },
}

impl PayloadStream {
    /// Build the stream for one payload specification.
    pub fn build(registry: &PluginRegistry, spec: &PayloadSpec) -> Result<Self> {
        let source = match &spec.source {
            SourceSpec::Plugin { name, params } => registry.payload(name, params)?,
            SourceSpec::Custom(factory) => factory(),
        };
        let mut stream = PayloadStream::Source(source);
        if !spec.encoders.is_empty() {
            let specs = spec
                .encoders
                .iter()
                .map(|s| EncoderSpec::parse(registry, s))
                .collect::<Result<Vec<_>>>()?;
            stream = PayloadStream::Encoded {
                inner: Box::new(stream),
                specs,
                ready: VecDeque::new(),
            };
        }
        if let Some(filter) = &spec.slice {
            stream = PayloadStream::Sliced {
                inner: Box::new(stream),
                filter: Arc::clone(filter),
            };
        }
        Ok(stream)
    }
}

impl PayloadSource for PayloadStream {
    fn count(&self) -> Option<u64> {
        match self {
            PayloadStream::Source(source) => source.count(),
            PayloadStream::Encoded { inner, specs, .. } => {
                let factor: u64 = specs.iter().map(EncoderSpec::factor).sum();
                inner.count().map(|c| c * factor)
            }
            PayloadStream::Sliced { .. } => None,
        }
    }

    fn next_value(&mut self) -> Option<PayloadValue> {
        match self {
            PayloadStream::Source(source) => source.next_value(),
            PayloadStream::Encoded { inner, specs, ready } => loop {
                if let Some(value) = ready.pop_front() {
                    return Some(value);
                }
                match inner.next_value()? {
                    PayloadValue::Text(text) => {
                        for spec in specs.iter() {
                            spec.apply(&text, ready);
                        }
                    }
                    // Prior results pass through the encoder layer untouched.
                    other @ PayloadValue::Result(_) => return Some(other),
                }
            },
            PayloadStream::Sliced { inner, filter } => loop {
                let value = inner.next_value()?;
                if filter.is_visible(&value) {
                    return Some(value);
                }
            },
        }
    }
}

/// The tuple layer: a single slot wrapped into 1-tuples, or N slots
/// combined by an iterator plugin.
enum Dictionary {
    Tupled(PayloadStream),
    Combined(Box<dyn PayloadIterator>),
}

impl Dictionary {
    fn count(&self) -> Option<u64> {
        match self {
            Dictionary::Tupled(stream) => stream.count(),
            Dictionary::Combined(iterator) => iterator.count(),
        }
    }

    fn next_tuple(&mut self) -> Option<Vec<PayloadValue>> {
        match self {
            Dictionary::Tupled(stream) => stream.next_value().map(|v| vec![v]),
            Dictionary::Combined(iterator) => iterator.next_tuple(),
        }
    }
}

fn build_dictio(options: &FuzzOptions) -> Result<Dictionary> {
    let streams = options
        .payloads
        .iter()
        .map(|spec| PayloadStream::build(&options.registry, spec))
        .collect::<Result<Vec<_>>>()?;

    if streams.is_empty() {
        return Err(FuzzError::BadOptions(
            "empty dictionary: configure at least one payload".to_string(),
        ));
    }

    if streams.len() == 1 {
        if options.iterator.is_some() {
            return Err(FuzzError::BadOptions(
                "an iterator requires several dictionaries".to_string(),
            ));
        }
        let stream = streams.into_iter().next().unwrap();
        return Ok(Dictionary::Tupled(stream));
    }

    let name = options.iterator.as_deref().unwrap_or("product");
    let dicts: Vec<Box<dyn PayloadSource>> = streams
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn PayloadSource>)
        .collect();
    Ok(Dictionary::Combined(options.registry.iterator(name, dicts)?))
}

/// Produces the lazy sequence of [`FuzzResult`] items for one seed.
pub struct RequestGenerator {
    options: Arc<FuzzOptions>,
    stats: Arc<FuzzStats>,
    seed: FuzzRequest,
    dictio: Dictionary,
    emitted: u64,
}

impl std::fmt::Debug for RequestGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGenerator")
            .field("options", &self.options)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl RequestGenerator {
    pub fn new(options: Arc<FuzzOptions>, stats: Arc<FuzzStats>) -> Result<Self> {
        let dictio = build_dictio(&options)?;
        let generator = Self {
            seed: options.seed.clone(),
            options,
            stats,
            dictio,
            emitted: 0,
        };
        generator.stats.set_total(generator.count());
        Ok(generator)
    }

    /// Expected number of emitted items:
    /// `dictio count × |variable set| (+1 for the baseline)`, when knowable.
    pub fn count(&self) -> Option<u64> {
        let mut count = self.dictio.count()?;
        if let Some(mode) = self.options.allvars {
            count *= self.seed.variable_names(mode).len() as u64;
        }
        if self.options.baseline.is_some() {
            count += 1;
        }
        Some(count)
    }

    /// The calibration baseline, built from the configured values.
    pub fn baseline(&self) -> Result<Option<FuzzResult>> {
        let Some(values) = &self.options.baseline else {
            return Ok(None);
        };
        let payloads = index_payloads(
            values
                .iter()
                .map(|v| PayloadValue::Text(v.clone()))
                .collect(),
        );
        let mut result = FuzzResult::from_seed(self.stats.next_id(), &self.seed, payloads, 1)?;
        result.is_baseline = true;
        Ok(Some(result))
    }

    /// The next generated request, `None` on exhaustion or cancellation.
    pub fn next_result(&mut self) -> Option<Result<FuzzResult>> {
        if self.stats.cancelled() {
            return None;
        }
        let tuple = self.dictio.next_tuple()?;
        Some(self.result_from_tuple(tuple))
    }

    fn result_from_tuple(&mut self, tuple: Vec<PayloadValue>) -> Result<FuzzResult> {
        if self.options.seed_payload {
            if let Some(prior) = tuple.first().and_then(PayloadValue::as_result) {
                let prior = Arc::clone(prior);
                return self.result_from_prior(prior, tuple);
            }
        }

        if self.emitted == 0 && tuple.len() != self.seed.marker_count() {
            return Err(FuzzError::BadOptions(format!(
                "seed has {} FUZZ markers but payloads produce {}-tuples",
                self.seed.marker_count(),
                tuple.len()
            )));
        }
        self.emitted += 1;
        FuzzResult::from_seed(
            self.stats.next_id(),
            &self.seed,
            index_payloads(tuple),
            1,
        )
    }

    /// `seed_payload` mode: the prior result's exchange is the template and
    /// the remaining tuple elements land on markers 2 and up. A template
    /// with fewer markers than the remaining arity is rejected.
    fn result_from_prior(
        &mut self,
        prior: Arc<FuzzResult>,
        tuple: Vec<PayloadValue>,
    ) -> Result<FuzzResult> {
        let template = prior.request.clone();
        let rendered: Vec<String> = tuple[1..].iter().map(PayloadValue::render).collect();
        let refs: Vec<&str> = rendered.iter().map(String::as_str).collect();
        let request = template.substitute(&refs, 2)?;

        self.emitted += 1;
        Ok(FuzzResult {
            nres: self.stats.next_id(),
            parent: Some(prior.nres),
            rlevel: prior.rlevel,
            payloads: index_payloads(tuple),
            request,
            response: None,
            error: None,
            kind: ResultKind::Result,
            is_baseline: false,
            plugins: Vec::new(),
        })
    }

    /// Raw tuples for the all-variables head, bypassing marker substitution.
    pub fn next_tuple(&mut self) -> Option<Vec<PayloadValue>> {
        if self.stats.cancelled() {
            return None;
        }
        self.dictio.next_tuple()
    }

    /// Rebuild the dictionary for a fresh pass over the same seed.
    pub fn rewind(&mut self) -> Result<()> {
        self.dictio = build_dictio(&self.options)?;
        Ok(())
    }

    /// Swap in a recursion seed and start a fresh dictionary pass.
    pub fn restart(&mut self, seed: &FuzzResult) -> Result<()> {
        self.seed = seed.request.clone();
        self.dictio = build_dictio(&self.options)?;
        self.emitted = 0;
        Ok(())
    }

    /// The current seed template.
    pub fn seed(&self) -> &FuzzRequest {
        &self.seed
    }

    /// Allocate an id from the shared allocator.
    pub fn next_id(&self) -> u64 {
        self.stats.next_id()
    }

    /// Build a concrete request for one variable binding (`allvars` mode).
    pub fn bind_variable(
        &self,
        var: &str,
        value: PayloadValue,
    ) -> Result<FuzzResult> {
        let mode = self.options.allvars.ok_or_else(|| {
            FuzzError::BadOptions("variable binding requires an allvars mode".to_string())
        })?;
        let request = self.seed.with_variable(var, &value.render(), mode)?;
        Ok(FuzzResult {
            nres: self.stats.next_id(),
            parent: None,
            rlevel: 0,
            payloads: index_payloads(vec![value]),
            request,
            response: None,
            error: None,
            kind: ResultKind::Result,
            is_baseline: false,
            plugins: Vec::new(),
        })
    }
}
