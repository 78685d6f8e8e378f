//! Built-in scripting plugins.
//!
//! Scripts inspect completed exchanges and may attach enrichment notes or
//! discover new requests to backfeed into the HTTP stage.

use super::{PluginRegistry, ScriptOutcome, ScriptPlugin};
use crate::request::FuzzRequest;
use crate::result::FuzzResult;
use anyhow::Context;
use std::sync::Arc;
use url::Url;

pub(super) fn register(registry: &mut PluginRegistry) {
    registry.register_script(Arc::new(LocationScript));
    registry.register_script(Arc::new(RobotsScript));
}

/// Follows redirects by hand: a `Location` header becomes a backfeed
/// request instead of being chased by the HTTP client.
pub struct LocationScript;

impl ScriptPlugin for LocationScript {
    fn name(&self) -> &'static str {
        "location"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["active"]
    }

    fn process(&self, result: &FuzzResult) -> anyhow::Result<ScriptOutcome> {
        let mut outcome = ScriptOutcome::default();
        let Some(response) = &result.response else {
            return Ok(outcome);
        };
        if !(300..400).contains(&response.status) {
            return Ok(outcome);
        }
        let Some(location) = response.header("location") else {
            return Ok(outcome);
        };

        let base = Url::parse(&result.request.url).context("request URL is not absolute")?;
        let target = base.join(location).context("unresolvable Location header")?;
        outcome.reports.push(format!("redirect to {}", target));
        // Avoid trivial self-loops (e.g. the trailing-slash redirect).
        if target.as_str() != result.request.url {
            outcome
                .backfeeds
                .push(FuzzRequest::get(target.to_string()));
        }
        Ok(outcome)
    }
}

/// Mines `robots.txt` responses for disallowed paths and feeds them back.
pub struct RobotsScript;

impl ScriptPlugin for RobotsScript {
    fn name(&self) -> &'static str {
        "robots"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["active"]
    }

    fn process(&self, result: &FuzzResult) -> anyhow::Result<ScriptOutcome> {
        let mut outcome = ScriptOutcome::default();
        let Some(response) = &result.response else {
            return Ok(outcome);
        };
        if response.status != 200 || !result.request.url.ends_with("robots.txt") {
            return Ok(outcome);
        }

        let base = Url::parse(&result.request.url).context("request URL is not absolute")?;
        for line in response.body.lines() {
            let Some(path) = line
                .strip_prefix("Disallow:")
                .or_else(|| line.strip_prefix("Allow:"))
            else {
                continue;
            };
            let path = path.trim();
            if path.is_empty() || path == "/" {
                continue;
            }
            if let Ok(target) = base.join(path) {
                outcome.reports.push(format!("robots entry {}", path));
                outcome.backfeeds.push(FuzzRequest::get(target.to_string()));
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FuzzRequest, FuzzResponse};
    use crate::result::index_payloads;

    fn completed(url: &str, status: u16) -> FuzzResult {
        let seed = FuzzRequest::get(format!("{}FUZZ", &url[..url.rfind('/').unwrap() + 1]));
        let name = &url[url.rfind('/').unwrap() + 1..];
        let mut r = FuzzResult::from_seed(
            1,
            &seed,
            index_payloads(vec![name.into()]),
            1,
        )
        .unwrap();
        r.response = Some(FuzzResponse::with_status(status));
        r
    }

    #[test]
    fn test_location_backfeeds_redirect() {
        let mut result = completed("http://t/admin", 301);
        result
            .response
            .as_mut()
            .unwrap()
            .headers
            .push(("Location".into(), "/login".into()));

        let outcome = LocationScript.process(&result).unwrap();
        assert_eq!(outcome.backfeeds.len(), 1);
        assert_eq!(outcome.backfeeds[0].url, "http://t/login");
    }

    #[test]
    fn test_location_ignores_non_redirects() {
        let result = completed("http://t/admin", 200);
        let outcome = LocationScript.process(&result).unwrap();
        assert!(outcome.backfeeds.is_empty());
        assert!(outcome.reports.is_empty());
    }

    #[test]
    fn test_robots_mines_disallow() {
        let mut result = completed("http://t/robots.txt", 200);
        result.response.as_mut().unwrap().body =
            "User-agent: *\nDisallow: /private\nDisallow: /\nAllow: /public\n".into();

        let outcome = RobotsScript.process(&result).unwrap();
        let urls: Vec<_> = outcome.backfeeds.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://t/private", "http://t/public"]);
    }
}
