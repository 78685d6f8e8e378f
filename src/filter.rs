//! Filter seams.
//!
//! Filter expression parsing lives outside this crate; the pipeline consumes
//! *precompiled* predicates through these traits. [`FnFilter`] and
//! [`FnSlice`] adapt plain closures for the common case.

use crate::result::{FuzzResult, PayloadValue};

/// A compiled predicate over completed results (pre- and post-filters).
pub trait FilterPredicate: Send + Sync {
    /// Whether the result survives the filter.
    fn is_visible(&self, result: &FuzzResult) -> bool;

    /// Whether the filter does anything at all. Inactive filters keep their
    /// stage out of the pipeline entirely.
    fn is_active(&self) -> bool {
        true
    }
}

/// A compiled predicate over individual payload values (the slice layer).
pub trait SliceFilter: Send + Sync {
    /// Whether the payload value is kept.
    fn is_visible(&self, value: &PayloadValue) -> bool;
}

/// A [`FilterPredicate`] backed by a closure.
///
/// # Example
///
/// ```
/// use fuzz_pipeline::filter::{FilterPredicate, FnFilter};
///
/// let hide_404 = FnFilter(|r: &fuzz_pipeline::FuzzResult| {
///     r.response.as_ref().map(|resp| resp.status != 404).unwrap_or(true)
/// });
/// ```
pub struct FnFilter<F: Fn(&FuzzResult) -> bool + Send + Sync>(pub F);

impl<F: Fn(&FuzzResult) -> bool + Send + Sync> FilterPredicate for FnFilter<F> {
    fn is_visible(&self, result: &FuzzResult) -> bool {
        (self.0)(result)
    }
}

/// A [`SliceFilter`] backed by a closure over the rendered payload text.
pub struct FnSlice<F: Fn(&str) -> bool + Send + Sync>(pub F);

impl<F: Fn(&str) -> bool + Send + Sync> SliceFilter for FnSlice<F> {
    fn is_visible(&self, value: &PayloadValue) -> bool {
        (self.0)(&value.render())
    }
}

/// The always-on, never-dropping placeholder; reports itself inactive.
pub struct NoFilter;

impl FilterPredicate for NoFilter {
    fn is_visible(&self, _result: &FuzzResult) -> bool {
        true
    }

    fn is_active(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FuzzRequest, FuzzResponse};
    use crate::result::index_payloads;

    fn completed(status: u16) -> FuzzResult {
        let seed = FuzzRequest::get("http://t/FUZZ");
        let mut r =
            FuzzResult::from_seed(1, &seed, index_payloads(vec!["x".into()]), 1).unwrap();
        r.response = Some(FuzzResponse::with_status(status));
        r
    }

    #[test]
    fn test_fn_filter() {
        let f = FnFilter(|r: &FuzzResult| {
            r.response.as_ref().map(|resp| resp.status == 200).unwrap_or(false)
        });
        assert!(f.is_visible(&completed(200)));
        assert!(!f.is_visible(&completed(404)));
        assert!(f.is_active());
    }

    #[test]
    fn test_fn_slice() {
        let s = FnSlice(|v: &str| v.len() > 2);
        assert!(s.is_visible(&"abc".into()));
        assert!(!s.is_visible(&"ab".into()));
    }

    #[test]
    fn test_no_filter_is_inactive() {
        assert!(!NoFilter.is_active());
        assert!(NoFilter.is_visible(&completed(500)));
    }
}
