//! Run configuration.
//!
//! [`FuzzOptions`] collects everything a run needs: the seed template,
//! payload specifications, the iterator choice, filters, recursion depth,
//! and the dispatcher. Construction goes through [`FuzzOptionsBuilder`],
//! which validates the combination and reports `BadOptions` for the
//! configurations the pipeline cannot run.

use crate::dispatch::{HttpDispatcher, ReqwestDispatcher};
use crate::error::{FuzzError, Result};
use crate::filter::{FilterPredicate, SliceFilter};
use crate::plugins::{PayloadParams, PayloadSource, PluginRegistry, Printer, RawDictionary};
use crate::request::{FuzzRequest, VarMode};
use std::path::PathBuf;
use std::sync::Arc;

/// How one dictionary slot obtains its raw values.
#[derive(Clone)]
pub enum SourceSpec {
    /// A registered payload plugin instantiated from parameters.
    Plugin { name: String, params: PayloadParams },
    /// A user-supplied factory; rebuilt for every generator pass.
    Custom(Arc<dyn Fn() -> Box<dyn PayloadSource> + Send + Sync>),
}

/// One dictionary slot: a source plus its encoder and slice wrappers.
#[derive(Clone)]
pub struct PayloadSpec {
    pub source: SourceSpec,
    /// Encoder specifications, each a plain name or an `a@b` chain.
    pub encoders: Vec<String>,
    /// Optional prefilter over the produced values.
    pub slice: Option<Arc<dyn SliceFilter>>,
}

impl PayloadSpec {
    /// A slot backed by a registered payload plugin.
    pub fn plugin(name: impl Into<String>, params: PayloadParams) -> Self {
        Self {
            source: SourceSpec::Plugin {
                name: name.into(),
                params,
            },
            encoders: Vec::new(),
            slice: None,
        }
    }

    /// A slot backed by a factory closure.
    pub fn custom(
        factory: impl Fn() -> Box<dyn PayloadSource> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: SourceSpec::Custom(Arc::new(factory)),
            encoders: Vec::new(),
            slice: None,
        }
    }

    /// A slot over a fixed word list.
    pub fn words(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        Self::custom(move || Box::new(RawDictionary::new(words.clone())))
    }

    /// Attach encoder specifications (`"base64"`, `"sha256@base64"`, …).
    pub fn with_encoders(mut self, encoders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.encoders = encoders.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a slice filter.
    pub fn with_slice(mut self, slice: Arc<dyn SliceFilter>) -> Self {
        self.slice = Some(slice);
        self
    }
}

/// Validated configuration for one run.
#[derive(Clone)]
pub struct FuzzOptions {
    pub seed: FuzzRequest,
    pub payloads: Vec<PayloadSpec>,
    pub iterator: Option<String>,
    pub baseline: Option<Vec<String>>,
    pub prefilter: Option<Arc<dyn FilterPredicate>>,
    pub filter: Option<Arc<dyn FilterPredicate>>,
    pub printer: Option<Arc<dyn Printer>>,
    pub allvars: Option<VarMode>,
    pub scripts: Option<String>,
    pub rlevel: u32,
    pub dryrun: bool,
    pub save: Option<PathBuf>,
    pub concurrent: usize,
    pub seed_payload: bool,
    pub registry: Arc<PluginRegistry>,
    pub dispatcher: Arc<dyn HttpDispatcher>,
}

impl std::fmt::Debug for FuzzOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzOptions")
            .field("seed", &self.seed.url)
            .field("payloads", &self.payloads.len())
            .field("iterator", &self.iterator)
            .field("has_baseline", &self.baseline.is_some())
            .field("allvars", &self.allvars)
            .field("scripts", &self.scripts)
            .field("rlevel", &self.rlevel)
            .field("dryrun", &self.dryrun)
            .field("concurrent", &self.concurrent)
            .field("seed_payload", &self.seed_payload)
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}

impl FuzzOptions {
    /// Start building a configuration around a seed template.
    pub fn builder(seed: FuzzRequest) -> FuzzOptionsBuilder {
        FuzzOptionsBuilder {
            seed,
            payloads: Vec::new(),
            iterator: None,
            baseline: None,
            prefilter: None,
            filter: None,
            printer: None,
            allvars: None,
            scripts: None,
            rlevel: 0,
            dryrun: false,
            save: None,
            concurrent: 10,
            seed_payload: false,
            registry: None,
            dispatcher: None,
        }
    }
}

/// Builder for [`FuzzOptions`].
pub struct FuzzOptionsBuilder {
    seed: FuzzRequest,
    payloads: Vec<PayloadSpec>,
    iterator: Option<String>,
    baseline: Option<Vec<String>>,
    prefilter: Option<Arc<dyn FilterPredicate>>,
    filter: Option<Arc<dyn FilterPredicate>>,
    printer: Option<Arc<dyn Printer>>,
    allvars: Option<String>,
    scripts: Option<String>,
    rlevel: u32,
    dryrun: bool,
    save: Option<PathBuf>,
    concurrent: usize,
    seed_payload: bool,
    registry: Option<Arc<PluginRegistry>>,
    dispatcher: Option<Arc<dyn HttpDispatcher>>,
}

impl FuzzOptionsBuilder {
    /// Add one dictionary slot.
    pub fn payload(mut self, spec: PayloadSpec) -> Self {
        self.payloads.push(spec);
        self
    }

    /// Sugar: a fixed word list as the next dictionary slot.
    pub fn wordlist(self, words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.payload(PayloadSpec::words(words))
    }

    /// Raw-iterable alternative to payload plugins; each inner list becomes
    /// one dictionary slot.
    pub fn dictio(mut self, lists: Vec<Vec<String>>) -> Self {
        for list in lists {
            self.payloads.push(PayloadSpec::words(list));
        }
        self
    }

    /// Select the iterator plugin combining multiple dictionaries.
    pub fn iterator(mut self, name: impl Into<String>) -> Self {
        self.iterator = Some(name.into());
        self
    }

    /// Configure the calibration baseline, one value per marker.
    pub fn baseline(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.baseline = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Predicate applied before the HTTP stage.
    pub fn prefilter(mut self, predicate: Arc<dyn FilterPredicate>) -> Self {
        self.prefilter = Some(predicate);
        self
    }

    /// Predicate applied to completed results.
    pub fn filter(mut self, predicate: Arc<dyn FilterPredicate>) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Attach a result printer.
    pub fn printer(mut self, printer: Arc<dyn Printer>) -> Self {
        self.printer = Some(printer);
        self
    }

    /// Iterate every request variable instead of positional markers
    /// (`"allvars"` for query parameters, `"allpost"` for body parameters).
    pub fn allvars(mut self, mode: impl Into<String>) -> Self {
        self.allvars = Some(mode.into());
        self
    }

    /// Select scripting plugins by comma-separated names or tags.
    pub fn scripts(mut self, selector: impl Into<String>) -> Self {
        self.scripts = Some(selector.into());
        self
    }

    /// Maximum recursion depth; 0 disables recursion.
    pub fn rlevel(mut self, rlevel: u32) -> Self {
        self.rlevel = rlevel;
        self
    }

    /// Validate the run without performing any I/O.
    pub fn dryrun(mut self, enabled: bool) -> Self {
        self.dryrun = enabled;
        self
    }

    /// Persist results as JSON lines to the given path.
    pub fn save(mut self, path: impl Into<PathBuf>) -> Self {
        self.save = Some(path.into());
        self
    }

    /// Maximum in-flight HTTP requests. Default: 10.
    pub fn concurrent(mut self, concurrent: usize) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// First-tuple-is-seed mode: the leading tuple element is a prior
    /// result whose exchange becomes the template.
    pub fn seed_payload(mut self, enabled: bool) -> Self {
        self.seed_payload = enabled;
        self
    }

    /// Use a custom plugin registry. Default: [`PluginRegistry::with_defaults`].
    pub fn registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a custom dispatcher. Default: [`ReqwestDispatcher`].
    pub fn dispatcher(mut self, dispatcher: Arc<dyn HttpDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<FuzzOptions> {
        if self.payloads.is_empty() {
            return Err(FuzzError::BadOptions(
                "empty dictionary: configure at least one payload".to_string(),
            ));
        }
        if self.iterator.is_some() && self.payloads.len() < 2 {
            return Err(FuzzError::BadOptions(
                "an iterator requires several dictionaries".to_string(),
            ));
        }
        if self.concurrent == 0 {
            return Err(FuzzError::BadOptions(
                "concurrent must be at least 1".to_string(),
            ));
        }

        let allvars = self.allvars.as_deref().map(VarMode::from_name).transpose()?;
        if allvars.is_some() && self.rlevel > 0 {
            return Err(FuzzError::BadOptions(
                "recursion cannot be combined with variable iteration".to_string(),
            ));
        }
        let marker_count = self.seed.marker_count();
        if allvars.is_none() && marker_count == 0 {
            return Err(FuzzError::BadOptions(
                "seed template contains no FUZZ markers".to_string(),
            ));
        }
        if let Some(baseline) = &self.baseline {
            if baseline.len() != marker_count {
                return Err(FuzzError::BadOptions(format!(
                    "baseline carries {} values but the seed has {} markers",
                    baseline.len(),
                    marker_count
                )));
            }
        }

        Ok(FuzzOptions {
            seed: self.seed,
            payloads: self.payloads,
            iterator: self.iterator,
            baseline: self.baseline,
            prefilter: self.prefilter,
            filter: self.filter,
            printer: self.printer,
            allvars,
            scripts: self.scripts,
            rlevel: self.rlevel,
            dryrun: self.dryrun,
            save: self.save,
            concurrent: self.concurrent,
            seed_payload: self.seed_payload,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(PluginRegistry::with_defaults())),
            dispatcher: self
                .dispatcher
                .unwrap_or_else(|| Arc::new(ReqwestDispatcher::default())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MockDispatcher;

    fn base() -> FuzzOptionsBuilder {
        FuzzOptions::builder(FuzzRequest::get("http://t/FUZZ"))
            .dispatcher(Arc::new(MockDispatcher::ok()))
    }

    #[test]
    fn test_minimal_build() {
        let options = base().wordlist(["a", "b"]).build().unwrap();
        assert_eq!(options.payloads.len(), 1);
        assert_eq!(options.concurrent, 10);
        assert!(!options.dryrun);
    }

    #[test]
    fn test_empty_payloads_rejected() {
        let err = base().build().unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_iterator_with_single_dict_rejected() {
        let err = base().wordlist(["a"]).iterator("zip").build().unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_markerless_seed_rejected() {
        let err = FuzzOptions::builder(FuzzRequest::get("http://t/plain"))
            .dispatcher(Arc::new(MockDispatcher::ok()))
            .wordlist(["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_markerless_seed_allowed_with_allvars() {
        let options = FuzzOptions::builder(FuzzRequest::get("http://t/s?a=1&b=2"))
            .dispatcher(Arc::new(MockDispatcher::ok()))
            .wordlist(["x"])
            .allvars("allvars")
            .build()
            .unwrap();
        assert_eq!(options.allvars, Some(VarMode::Query));
    }

    #[test]
    fn test_allvars_with_recursion_rejected() {
        let err = FuzzOptions::builder(FuzzRequest::get("http://t/s?a=1"))
            .dispatcher(Arc::new(MockDispatcher::ok()))
            .wordlist(["x"])
            .allvars("allvars")
            .rlevel(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_baseline_arity_checked() {
        let err = base()
            .wordlist(["a"])
            .baseline(["x", "y"])
            .build()
            .unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = base().wordlist(["a"]).concurrent(0).build().unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }
}
