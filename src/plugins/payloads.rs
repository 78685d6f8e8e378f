//! Built-in payload sources: `list`, `file`, `range`, plus the
//! programmatic [`ResultsPayload`] used by `seed_payload` runs.

use super::{PayloadParams, PayloadSource, PluginRegistry};
use crate::error::{FuzzError, Result};
use crate::result::{FuzzResult, PayloadValue};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub(super) fn register(registry: &mut PluginRegistry) {
    registry.register_payload("list", |params: &PayloadParams| {
        let values = require(params, "list", "values")?;
        let words = values.split('-').map(str::to_string).collect();
        Ok(Box::new(WordlistPayload::new(words)) as Box<dyn PayloadSource>)
    });
    registry.register_payload("file", |params: &PayloadParams| {
        let path = require(params, "file", "fn")?;
        Ok(Box::new(FilePayload::open(path)?) as Box<dyn PayloadSource>)
    });
    registry.register_payload("range", |params: &PayloadParams| {
        let spec = require(params, "range", "range")?;
        RangePayload::parse(spec).map(|p| Box::new(p) as Box<dyn PayloadSource>)
    });
}

fn require<'a>(params: &'a PayloadParams, plugin: &str, key: &str) -> Result<&'a str> {
    params.get(key).map(String::as_str).ok_or_else(|| {
        FuzzError::BadOptions(format!("payload '{}' requires a '{}' parameter", plugin, key))
    })
}

/// An in-memory word list.
pub struct WordlistPayload {
    words: std::vec::IntoIter<String>,
    total: u64,
}

impl WordlistPayload {
    pub fn new(words: Vec<String>) -> Self {
        let total = words.len() as u64;
        Self {
            words: words.into_iter(),
            total,
        }
    }
}

impl PayloadSource for WordlistPayload {
    fn count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn next_value(&mut self) -> Option<PayloadValue> {
        self.words.next().map(PayloadValue::Text)
    }
}

/// One word per line from a dictionary file. The file is read up front so
/// the count is known before the run starts.
pub struct FilePayload {
    inner: WordlistPayload,
}

impl FilePayload {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let words = contents
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        Ok(Self {
            inner: WordlistPayload::new(words),
        })
    }
}

impl PayloadSource for FilePayload {
    fn count(&self) -> Option<u64> {
        self.inner.count()
    }

    fn next_value(&mut self) -> Option<PayloadValue> {
        self.inner.next_value()
    }
}

/// Integer range, inclusive on both ends; open-ended when no upper bound is
/// given (`"0-"`), in which case the count is unknown.
pub struct RangePayload {
    next: u64,
    end: Option<u64>,
}

impl RangePayload {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            next: start,
            end: Some(end),
        }
    }

    /// A range with no upper bound; yields forever until cancelled.
    pub fn unbounded(start: u64) -> Self {
        Self { next: start, end: None }
    }

    /// Parse a `start-end` or `start-` specification.
    pub fn parse(spec: &str) -> Result<Self> {
        let (lo, hi) = spec.split_once('-').ok_or_else(|| {
            FuzzError::BadOptions(format!("range '{}' is not of the form start-end", spec))
        })?;
        let start: u64 = lo
            .parse()
            .map_err(|_| FuzzError::BadOptions(format!("bad range start '{}'", lo)))?;
        if hi.is_empty() {
            return Ok(Self::unbounded(start));
        }
        let end: u64 = hi
            .parse()
            .map_err(|_| FuzzError::BadOptions(format!("bad range end '{}'", hi)))?;
        if end < start {
            return Err(FuzzError::BadOptions(format!(
                "range '{}' ends before it starts",
                spec
            )));
        }
        Ok(Self::new(start, end))
    }
}

impl PayloadSource for RangePayload {
    fn count(&self) -> Option<u64> {
        self.end.map(|end| end - self.next + 1)
    }

    fn next_value(&mut self) -> Option<PayloadValue> {
        if let Some(end) = self.end {
            if self.next > end {
                return None;
            }
        }
        let value = self.next;
        self.next += 1;
        Some(PayloadValue::Text(value.to_string()))
    }
}

/// Prior results used as payload values; the first tuple slot in
/// `seed_payload` runs.
pub struct ResultsPayload {
    results: std::vec::IntoIter<Arc<FuzzResult>>,
    total: u64,
}

impl ResultsPayload {
    pub fn new(results: Vec<Arc<FuzzResult>>) -> Self {
        let total = results.len() as u64;
        Self {
            results: results.into_iter(),
            total,
        }
    }
}

impl PayloadSource for ResultsPayload {
    fn count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn next_value(&mut self) -> Option<PayloadValue> {
        self.results.next().map(PayloadValue::Result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn drain(mut source: impl PayloadSource) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(v) = source.next_value() {
            out.push(v.render());
        }
        out
    }

    #[test]
    fn test_wordlist() {
        let source = WordlistPayload::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(source.count(), Some(3));
        assert_eq!(drain(source), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_file_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "admin\nimg\nlogin").unwrap();
        let source = FilePayload::open(file.path()).unwrap();
        assert_eq!(source.count(), Some(3));
        assert_eq!(drain(source), vec!["admin", "img", "login"]);
    }

    #[test]
    fn test_file_payload_missing() {
        assert!(matches!(
            FilePayload::open("/no/such/wordlist.txt"),
            Err(FuzzError::Io(_))
        ));
    }

    #[test]
    fn test_range_bounded() {
        let source = RangePayload::parse("3-6").unwrap();
        assert_eq!(source.count(), Some(4));
        assert_eq!(drain(source), vec!["3", "4", "5", "6"]);
    }

    #[test]
    fn test_range_unbounded_count_unknown() {
        let mut source = RangePayload::parse("0-").unwrap();
        assert_eq!(source.count(), None);
        assert_eq!(source.next_value().unwrap().render(), "0");
        assert_eq!(source.next_value().unwrap().render(), "1");
    }

    #[test]
    fn test_range_rejects_backwards() {
        assert!(RangePayload::parse("5-2").is_err());
        assert!(RangePayload::parse("x-2").is_err());
    }

    #[test]
    fn test_list_plugin_splits_on_hyphen() {
        let registry = PluginRegistry::with_defaults();
        let mut params = PayloadParams::new();
        params.insert("values".into(), "one-two-three".into());
        let source = registry.payload("list", &params).unwrap();
        assert_eq!(source.count(), Some(3));
    }
}
