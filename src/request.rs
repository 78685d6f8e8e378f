//! Seed template and HTTP exchange models.
//!
//! A [`FuzzRequest`] is either a *seed template* carrying marker tokens
//! (`FUZZ`, `FUZ2Z`, …) in its URL, headers, or body, or a concrete request
//! produced by substituting payload values for those markers. Substitution
//! is positional: marker `FUZZ` is index 1, `FUZ2Z` is index 2, and so on.

use crate::error::{FuzzError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Highest marker index recognised in a template.
pub const MAX_MARKERS: usize = 16;

/// The literal token for marker index `n` (1-based): `FUZZ`, `FUZ2Z`, `FUZ3Z`, …
pub fn marker_token(index: usize) -> String {
    if index == 1 {
        "FUZZ".to_string()
    } else {
        format!("FUZ{}Z", index)
    }
}

/// Which request variables the `allvars` mode iterates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarMode {
    /// URL query parameters.
    Query,
    /// Form-encoded body parameters.
    Body,
}

impl VarMode {
    /// Parse the configured mode name (`allvars` / `allpost`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "allvars" => Ok(VarMode::Query),
            "allpost" => Ok(VarMode::Body),
            other => Err(FuzzError::BadOptions(format!(
                "unknown allvars mode '{}' (expected 'allvars' or 'allpost')",
                other
            ))),
        }
    }
}

/// An HTTP request template or concrete request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzRequest {
    /// HTTP method (`GET`, `POST`, …).
    pub method: String,

    /// Full request URL, possibly containing marker tokens.
    pub url: String,

    /// Request headers in order.
    pub headers: Vec<(String, String)>,

    /// Request body, if any.
    pub body: Option<String>,
}

impl FuzzRequest {
    /// Create a GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Create a request with the given method.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.url.as_str())
            .chain(
                self.headers
                    .iter()
                    .flat_map(|(k, v)| [k.as_str(), v.as_str()]),
            )
            .chain(self.body.as_deref())
    }

    fn map_texts(&self, f: impl Fn(&str) -> String) -> FuzzRequest {
        FuzzRequest {
            method: self.method.clone(),
            url: f(&self.url),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (f(k), f(v)))
                .collect(),
            body: self.body.as_deref().map(&f),
        }
    }

    /// The set of marker indices present anywhere in the template.
    pub fn marker_indices(&self) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();
        for index in 1..=MAX_MARKERS {
            let token = marker_token(index);
            if self.texts().any(|t| t.contains(&token)) {
                found.insert(index);
            }
        }
        found
    }

    /// Number of distinct markers in the template.
    pub fn marker_count(&self) -> usize {
        self.marker_indices().len()
    }

    /// Substitute `values` positionally, mapping `values[i]` onto marker
    /// index `start_index + i`.
    ///
    /// Every targeted marker must be present in the template; a value with
    /// no marker to land on is a configuration error.
    pub fn substitute(&self, values: &[&str], start_index: usize) -> Result<FuzzRequest> {
        let markers = self.marker_indices();
        for offset in 0..values.len() {
            let index = start_index + offset;
            if !markers.contains(&index) {
                return Err(FuzzError::BadOptions(format!(
                    "payload value has no {} marker to substitute",
                    marker_token(index)
                )));
            }
        }
        Ok(self.map_texts(|text| {
            let mut out = text.to_string();
            // Higher markers first, in case a substituted value spells out
            // a lower marker token.
            for offset in (0..values.len()).rev() {
                out = out.replace(&marker_token(start_index + offset), values[offset]);
            }
            out
        }))
    }

    /// Names of the request variables iterated by the given `allvars` mode.
    pub fn variable_names(&self, mode: VarMode) -> Vec<String> {
        match mode {
            VarMode::Query => url::Url::parse(&self.url)
                .map(|u| u.query_pairs().map(|(k, _)| k.into_owned()).collect())
                .unwrap_or_default(),
            VarMode::Body => self
                .body
                .as_deref()
                .map(form_keys)
                .unwrap_or_default(),
        }
    }

    /// A copy of the request with variable `name` set to `value`.
    pub fn with_variable(&self, name: &str, value: &str, mode: VarMode) -> Result<FuzzRequest> {
        let mut out = self.clone();
        match mode {
            VarMode::Query => {
                let mut parsed = url::Url::parse(&self.url)?;
                let pairs: Vec<(String, String)> = parsed
                    .query_pairs()
                    .map(|(k, v)| {
                        let v = if k == name { value.to_string() } else { v.into_owned() };
                        (k.into_owned(), v)
                    })
                    .collect();
                parsed
                    .query_pairs_mut()
                    .clear()
                    .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                out.url = parsed.to_string();
            }
            VarMode::Body => {
                let body = self.body.as_deref().unwrap_or("");
                let rebound = body
                    .split('&')
                    .map(|pair| match pair.split_once('=') {
                        Some((k, _)) if k == name => format!("{}={}", k, value),
                        _ => pair.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                out.body = Some(rebound);
            }
        }
        Ok(out)
    }

    /// Derive the seed template for one recursion level below this request:
    /// the (concrete) URL with a fresh `FUZZ` marker appended as a path segment.
    pub fn nested_seed(&self) -> FuzzRequest {
        let base = self.url.trim_end_matches('/');
        FuzzRequest {
            method: self.method.clone(),
            url: format!("{}/FUZZ", base),
            headers: self.headers.clone(),
            body: None,
        }
    }
}

fn form_keys(body: &str) -> Vec<String> {
    body.split('&')
        .filter_map(|pair| pair.split_once('=').map(|(k, _)| k.to_string()))
        .collect()
}

/// A completed HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: String,

    /// Wall-clock time for the exchange.
    pub elapsed: Duration,
}

impl FuzzResponse {
    /// An empty response with the given status. Handy for tests and mocks.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body line count, as reported by printers.
    pub fn lines(&self) -> usize {
        self.body.lines().count()
    }

    /// Body word count.
    pub fn words(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// Whether this exchange looks like a directory listing target: a
    /// redirect onto the same path with a trailing slash, or a successful
    /// response for a URL that already ends in one.
    pub fn is_directory(&self, request_url: &str) -> bool {
        if (300..400).contains(&self.status) {
            if let Some(location) = self.header("location") {
                let slashed = format!("{}/", request_url.trim_end_matches('/'));
                return location == slashed
                    || slashed.ends_with(location)
                    || location.ends_with('/');
            }
            return false;
        }
        matches!(self.status, 200..=299 | 401 | 403) && request_url.ends_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_tokens() {
        assert_eq!(marker_token(1), "FUZZ");
        assert_eq!(marker_token(2), "FUZ2Z");
        assert_eq!(marker_token(12), "FUZ12Z");
    }

    #[test]
    fn test_marker_indices_across_fields() {
        let req = FuzzRequest::new("POST", "http://t/FUZZ")
            .with_header("X-Probe", "FUZ3Z")
            .with_body("user=FUZ2Z");
        let indices: Vec<usize> = req.marker_indices().into_iter().collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(req.marker_count(), 3);
    }

    #[test]
    fn test_substitute_positional() {
        let req = FuzzRequest::new("POST", "http://t/FUZZ").with_body("user=FUZZ&pass=FUZ2Z");
        let out = req.substitute(&["admin", "secret"], 1).unwrap();
        assert_eq!(out.url, "http://t/admin");
        assert_eq!(out.body.as_deref(), Some("user=admin&pass=secret"));
    }

    #[test]
    fn test_substitute_from_second_marker() {
        let req = FuzzRequest::get("http://t/a?x=FUZ2Z&y=FUZ3Z");
        let out = req.substitute(&["1", "2"], 2).unwrap();
        assert_eq!(out.url, "http://t/a?x=1&y=2");
    }

    #[test]
    fn test_substitute_missing_marker_rejected() {
        let req = FuzzRequest::get("http://t/FUZZ");
        let err = req.substitute(&["a", "b"], 1).unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[test]
    fn test_substitute_does_not_clobber_higher_markers() {
        let req = FuzzRequest::get("http://t/FUZZ/FUZ2Z");
        let out = req.substitute(&["a", "b"], 1).unwrap();
        assert_eq!(out.url, "http://t/a/b");
    }

    #[test]
    fn test_variable_names_query() {
        let req = FuzzRequest::get("http://t/s?user=x&pass=y");
        assert_eq!(req.variable_names(VarMode::Query), vec!["user", "pass"]);
    }

    #[test]
    fn test_with_variable_query() {
        let req = FuzzRequest::get("http://t/s?user=x&pass=y");
        let out = req.with_variable("pass", "inj", VarMode::Query).unwrap();
        assert!(out.url.contains("pass=inj"));
        assert!(out.url.contains("user=x"));
    }

    #[test]
    fn test_with_variable_body() {
        let req = FuzzRequest::new("POST", "http://t/s").with_body("user=x&pass=y");
        let out = req.with_variable("user", "inj", VarMode::Body).unwrap();
        assert_eq!(out.body.as_deref(), Some("user=inj&pass=y"));
    }

    #[test]
    fn test_nested_seed() {
        let req = FuzzRequest::get("http://t/admin");
        assert_eq!(req.nested_seed().url, "http://t/admin/FUZZ");
        let req = FuzzRequest::get("http://t/admin/");
        assert_eq!(req.nested_seed().url, "http://t/admin/FUZZ");
    }

    #[test]
    fn test_response_header_lookup() {
        let mut resp = FuzzResponse::with_status(301);
        resp.headers.push(("Location".into(), "/admin/".into()));
        assert_eq!(resp.header("location"), Some("/admin/"));
        assert_eq!(resp.header("x-none"), None);
    }

    #[test]
    fn test_directory_heuristic_redirect() {
        let mut resp = FuzzResponse::with_status(301);
        resp.headers.push(("Location".into(), "http://t/admin/".into()));
        assert!(resp.is_directory("http://t/admin"));
    }

    #[test]
    fn test_directory_heuristic_plain_file() {
        let resp = FuzzResponse::with_status(200);
        assert!(!resp.is_directory("http://t/readme.txt"));
    }
}
