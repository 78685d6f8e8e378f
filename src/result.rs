//! The unit of work flowing through the pipeline.
//!
//! Every queue in the pipeline carries [`FuzzResult`] items: generated
//! requests before dispatch, completed exchanges after, plus the control
//! kinds that drive recursion (`Seed`, `Backfeed`) and per-seed termination
//! (`EndSeed`). Ids are monotonic per run and allocated by
//! [`FuzzStats`](crate::stats::FuzzStats).

use crate::error::{FuzzError, Result};
use crate::request::{FuzzRequest, FuzzResponse};
use std::sync::Arc;

/// A single substitution value: a literal string, or a prior result when
/// running in `seed_payload` mode.
#[derive(Debug, Clone)]
pub enum PayloadValue {
    /// A dictionary word.
    Text(String),
    /// A completed result from a previous pass, used as a seed.
    Result(Arc<FuzzResult>),
}

impl PayloadValue {
    /// The textual form substituted into the template.
    pub fn render(&self) -> String {
        match self {
            PayloadValue::Text(s) => s.clone(),
            PayloadValue::Result(r) => r.request.url.clone(),
        }
    }

    /// The prior result, if this value is one.
    pub fn as_result(&self) -> Option<&Arc<FuzzResult>> {
        match self {
            PayloadValue::Result(r) => Some(r),
            PayloadValue::Text(_) => None,
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Text(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Text(s)
    }
}

/// A substitution value together with its position among its peers.
#[derive(Debug, Clone)]
pub struct FuzzPayload {
    /// 0-based position in the payload tuple.
    pub index: usize,
    /// The value itself.
    pub value: PayloadValue,
}

/// What a [`FuzzResult`] represents at its current pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// A request to send, or a completed exchange once sent.
    Result,
    /// A new seed template synthesised by recursion; routed back to the head.
    Seed,
    /// A new request discovered by a plugin; routed back to the HTTP stage.
    Backfeed,
    /// A failed item carrying its error.
    Error,
    /// Marker emitted after a seed's generator is exhausted.
    EndSeed,
}

impl ResultKind {
    /// Drain order within one recursion level: live requests before control
    /// items, the end-of-seed marker after everything else.
    pub fn rank(self) -> u64 {
        match self {
            ResultKind::Result => 5,
            ResultKind::Backfeed => 4,
            ResultKind::Error => 3,
            ResultKind::Seed => 2,
            ResultKind::EndSeed => 1,
        }
    }
}

/// A note attached to a result by a scripting plugin: an enrichment, or a
/// warning when the plugin itself failed.
#[derive(Debug, Clone)]
pub struct PluginReport {
    /// Plugin name.
    pub plugin: String,
    /// Enrichment or warning text.
    pub message: String,
    /// Whether this report is a failure warning rather than an enrichment.
    pub is_warning: bool,
}

/// A unit flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct FuzzResult {
    /// Monotonic id, unique and strictly increasing per run.
    pub nres: u64,

    /// Id of the result this one was derived from, for recursion and backfeed.
    pub parent: Option<u64>,

    /// Recursion depth; 0 for top-level work.
    pub rlevel: u32,

    /// The payload tuple this request was built from.
    pub payloads: Vec<FuzzPayload>,

    /// The request: a concrete request once generated, a marker-bearing
    /// template for `Seed` items.
    pub request: FuzzRequest,

    /// The response, once the exchange has completed.
    pub response: Option<FuzzResponse>,

    /// The failure carried by an `Error`-kind result.
    pub error: Option<String>,

    /// Current kind.
    pub kind: ResultKind,

    /// Whether this is the calibration baseline.
    pub is_baseline: bool,

    /// Reports accumulated by scripting plugins.
    pub plugins: Vec<PluginReport>,
}

impl FuzzResult {
    fn blank(nres: u64, kind: ResultKind, request: FuzzRequest) -> Self {
        Self {
            nres,
            parent: None,
            rlevel: 0,
            payloads: Vec::new(),
            request,
            response: None,
            error: None,
            kind,
            is_baseline: false,
            plugins: Vec::new(),
        }
    }

    /// Build a concrete request by substituting `payloads` into `seed`,
    /// mapping the first tuple element onto marker `start_index`.
    pub fn from_seed(
        nres: u64,
        seed: &FuzzRequest,
        payloads: Vec<FuzzPayload>,
        start_index: usize,
    ) -> Result<Self> {
        let rendered: Vec<String> = payloads.iter().map(|p| p.value.render()).collect();
        let refs: Vec<&str> = rendered.iter().map(String::as_str).collect();
        let request = seed.substitute(&refs, start_index)?;
        Ok(Self {
            payloads,
            ..Self::blank(nres, ResultKind::Result, request)
        })
    }

    /// A `Seed`-kind item carrying a template; the pipeline head expands it.
    pub fn seed(nres: u64, request: FuzzRequest, rlevel: u32, parent: Option<u64>) -> Self {
        Self {
            rlevel,
            parent,
            ..Self::blank(nres, ResultKind::Seed, request)
        }
    }

    /// The marker trailing all items generated from one seed.
    pub fn end_seed(nres: u64, rlevel: u32) -> Self {
        Self {
            rlevel,
            ..Self::blank(nres, ResultKind::EndSeed, FuzzRequest::get(""))
        }
    }

    /// A plugin-discovered request, routed back into the HTTP stage.
    pub fn backfeed(nres: u64, parent: &FuzzResult, request: FuzzRequest) -> Self {
        Self {
            parent: Some(parent.nres),
            rlevel: parent.rlevel,
            ..Self::blank(nres, ResultKind::Backfeed, request)
        }
    }

    /// Convert this item into an `Error`-kind result carrying `err`.
    pub fn into_error(mut self, err: &FuzzError) -> Self {
        self.kind = ResultKind::Error;
        self.error = Some(err.to_string());
        self
    }

    /// Queue priority: deeper recursion outranks shallower, live requests
    /// outrank control items within a level.
    pub fn priority(&self) -> u64 {
        ((self.rlevel as u64) << 16) | self.kind.rank()
    }

    /// Human-readable payload summary (`v1 - v2 - …`).
    pub fn description(&self) -> String {
        self.payloads
            .iter()
            .map(|p| p.value.render())
            .collect::<Vec<_>>()
            .join(" - ")
    }
}

/// Wrap raw values into an indexed payload tuple.
pub fn index_payloads(values: Vec<PayloadValue>) -> Vec<FuzzPayload> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| FuzzPayload { index, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed_substitutes() {
        let seed = FuzzRequest::get("http://t/FUZZ");
        let res = FuzzResult::from_seed(
            1,
            &seed,
            index_payloads(vec!["admin".into()]),
            1,
        )
        .unwrap();
        assert_eq!(res.request.url, "http://t/admin");
        assert_eq!(res.kind, ResultKind::Result);
        assert_eq!(res.payloads[0].index, 0);
        assert_eq!(res.description(), "admin");
    }

    #[test]
    fn test_from_seed_arity_overflow() {
        let seed = FuzzRequest::get("http://t/FUZZ");
        let err = FuzzResult::from_seed(
            1,
            &seed,
            index_payloads(vec!["a".into(), "b".into()]),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_priority_orders_by_depth_then_kind() {
        let seed = FuzzRequest::get("http://t/FUZZ");
        let shallow =
            FuzzResult::from_seed(1, &seed, index_payloads(vec!["a".into()]), 1).unwrap();
        let mut deep =
            FuzzResult::from_seed(2, &seed, index_payloads(vec!["b".into()]), 1).unwrap();
        deep.rlevel = 1;
        assert!(deep.priority() > shallow.priority());

        let end = FuzzResult::end_seed(3, 0);
        assert!(shallow.priority() > end.priority());
    }

    #[test]
    fn test_into_error_keeps_identity() {
        let seed = FuzzRequest::get("http://t/FUZZ");
        let res =
            FuzzResult::from_seed(7, &seed, index_payloads(vec!["a".into()]), 1).unwrap();
        let err = res.into_error(&FuzzError::Network("boom".into()));
        assert_eq!(err.nres, 7);
        assert_eq!(err.kind, ResultKind::Error);
        assert!(err.error.as_deref().unwrap().contains("boom"));
    }

    #[test]
    fn test_payload_value_render() {
        let v: PayloadValue = "word".into();
        assert_eq!(v.render(), "word");
    }
}
