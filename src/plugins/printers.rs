//! Built-in result printers: a wfuzz-style table (`raw`) and JSON lines
//! (`json`). Both write to any `Write` sink; the registry factories bind
//! them to stdout.

use super::{Printer, PluginRegistry};
use crate::error::Result;
use crate::result::{FuzzResult, ResultKind};
use crate::stats::FuzzSnapshot;
use serde_json::json;
use std::io::Write;
use std::sync::Mutex;

pub(super) fn register(registry: &mut PluginRegistry) {
    registry.register_printer("raw", || Box::new(RawPrinter::stdout()) as Box<dyn Printer>);
    registry.register_printer("json", || Box::new(JsonPrinter::stdout()) as Box<dyn Printer>);
}

/// Columnar, human-readable output.
pub struct RawPrinter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl RawPrinter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl Printer for RawPrinter {
    fn header(&self, stats: &FuzzSnapshot) -> Result<()> {
        let mut out = self.out.lock().unwrap();
        match stats.total {
            Some(total) => writeln!(out, "Total requests: {}", total)?,
            None => writeln!(out, "Total requests: <<unknown>>")?,
        }
        writeln!(out, "{:>9}   {:>8}   {:>6}   {:>6}   Payloads", "ID", "Response", "Lines", "Words")?;
        Ok(())
    }

    fn print(&self, result: &FuzzResult) -> Result<()> {
        let mut out = self.out.lock().unwrap();
        match result.kind {
            ResultKind::Error => {
                writeln!(
                    out,
                    "{:>9}   {:>8}   {:>6}   {:>6}   \"{}\"  ({})",
                    result.nres,
                    "XXX",
                    "-",
                    "-",
                    result.description(),
                    result.error.as_deref().unwrap_or("unknown error"),
                )?;
            }
            _ => {
                let (status, lines, words) = match &result.response {
                    Some(r) => (r.status.to_string(), r.lines().to_string(), r.words().to_string()),
                    None => ("-".into(), "-".into(), "-".into()),
                };
                let marker = if result.is_baseline { "  [baseline]" } else { "" };
                writeln!(
                    out,
                    "{:>9}   {:>8}   {:>6}   {:>6}   \"{}\"{}",
                    result.nres,
                    status,
                    lines,
                    words,
                    result.description(),
                    marker,
                )?;
            }
        }
        for report in result.plugins.iter().filter(|r| !r.is_warning) {
            writeln!(out, "          |_ {}: {}", report.plugin, report.message)?;
        }
        Ok(())
    }

    fn footer(&self, stats: &FuzzSnapshot) -> Result<()> {
        let mut out = self.out.lock().unwrap();
        writeln!(
            out,
            "\nProcessed: {}   Filtered: {}   Time: {:.3}s",
            stats.processed, stats.filtered, stats.totaltime
        )?;
        Ok(())
    }
}

/// One JSON object per result.
pub struct JsonPrinter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonPrinter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl Printer for JsonPrinter {
    fn header(&self, _stats: &FuzzSnapshot) -> Result<()> {
        Ok(())
    }

    fn print(&self, result: &FuzzResult) -> Result<()> {
        let record = json!({
            "id": result.nres,
            "parent": result.parent,
            "rlevel": result.rlevel,
            "url": result.request.url,
            "method": result.request.method,
            "status": result.response.as_ref().map(|r| r.status),
            "lines": result.response.as_ref().map(|r| r.lines()),
            "words": result.response.as_ref().map(|r| r.words()),
            "payloads": result.payloads.iter().map(|p| p.value.render()).collect::<Vec<_>>(),
            "baseline": result.is_baseline,
            "error": result.error,
            "plugins": result.plugins.iter().map(|p| json!({
                "name": p.plugin,
                "message": p.message,
                "warning": p.is_warning,
            })).collect::<Vec<_>>(),
        });
        let mut out = self.out.lock().unwrap();
        writeln!(out, "{}", record)?;
        Ok(())
    }

    fn footer(&self, stats: &FuzzSnapshot) -> Result<()> {
        let mut out = self.out.lock().unwrap();
        writeln!(out, "{}", serde_json::to_string(stats).map_err(|e| crate::error::FuzzError::Other(e.to_string()))?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FuzzRequest, FuzzResponse};
    use crate::result::index_payloads;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn completed() -> FuzzResult {
        let seed = FuzzRequest::get("http://t/FUZZ");
        let mut r =
            FuzzResult::from_seed(3, &seed, index_payloads(vec!["admin".into()]), 1).unwrap();
        let mut resp = FuzzResponse::with_status(200);
        resp.body = "one two\nthree".into();
        r.response = Some(resp);
        r
    }

    #[test]
    fn test_raw_printer_row() {
        let buf = SharedBuf::default();
        let printer = RawPrinter::new(Box::new(buf.clone()));
        printer.print(&completed()).unwrap();
        let text = buf.contents();
        assert!(text.contains("200"));
        assert!(text.contains("\"admin\""));
    }

    #[test]
    fn test_json_printer_record() {
        let buf = SharedBuf::default();
        let printer = JsonPrinter::new(Box::new(buf.clone()));
        printer.print(&completed()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(buf.contents().trim()).unwrap();
        assert_eq!(parsed["id"], 3);
        assert_eq!(parsed["status"], 200);
        assert_eq!(parsed["payloads"][0], "admin");
    }
}
