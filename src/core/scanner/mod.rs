// src/core/scanner/mod.rs

// Per-URL scanning: the provider lookup, the local heuristics, and the
// pipeline that chains them for one URL.
pub mod heuristics;
pub mod threat_intel;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::aggregator::resolve_url;
use crate::core::knowledge_base::{get_verdict, VerdictCode};
use crate::core::models::{Evidence, ScanResult};
use self::heuristics::HeuristicAnalyzer;
use self::threat_intel::ThreatLookup;

/// Builds a `ScanResult` from a knowledge-base template.
///
/// `extra_details` is appended to the template's audit text, e.g. the error
/// message of a failed provider call.
pub(crate) fn build_result(
    url: &str,
    domain: &str,
    code: VerdictCode,
    evidence: Evidence,
    extra_details: Option<&str>,
    scanned_at: DateTime<Utc>,
) -> ScanResult {
    let template = get_verdict(code);
    debug!(url, code = ?template.code, risk = %template.risk_level, "Verdict assigned.");
    let details = match extra_details {
        Some(extra) => format!("{} ({extra})", template.description),
        None => template.description.to_string(),
    };
    ScanResult {
        url: url.to_string(),
        domain: domain.to_string(),
        is_safe: template.is_safe,
        risk_level: template.risk_level,
        categories: template.category.map(str::to_string).into_iter().collect::<BTreeSet<_>>(),
        confidence: template.confidence,
        evidence,
        details,
        scanned_at,
    }
}

/// Runs the full per-URL pipeline: provider first, heuristics only on "no verdict".
#[derive(Clone)]
pub struct UrlScanner {
    threat_intel: Arc<dyn ThreatLookup>,
    heuristics: HeuristicAnalyzer,
}

impl UrlScanner {
    pub fn new(threat_intel: Arc<dyn ThreatLookup>, heuristics: HeuristicAnalyzer) -> Self {
        Self { threat_intel, heuristics }
    }

    /// Produces the verdict for one URL: threat intelligence first, then the
    /// heuristics when the provider has nothing to say.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to judge, unmodified.
    ///
    /// # Returns
    ///
    /// A `ScanResult` in every case. Provider errors come back as a
    /// fail-closed result (unsafe, `high`, category `error`) and the
    /// heuristics are not consulted for that URL.
    pub async fn scan(&self, url: &str) -> ScanResult {
        let lookup = self.threat_intel.lookup(url).await;
        let result = resolve_url(url, lookup, || self.heuristics.evaluate(url));
        info!(
            url,
            provider = %result.provider(),
            is_safe = result.is_safe,
            risk = %result.risk_level,
            "URL scan finished."
        );
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::threat_intel::{ThreatIntelError, ThreatLookup, ThreatVerdict};

    /// Scripted provider response for one URL.
    #[derive(Clone)]
    pub enum Scripted {
        Threat(&'static str),
        Timeout,
    }

    /// A `ThreatLookup` that answers from a fixed table and counts calls.
    #[derive(Default)]
    pub struct StubLookup {
        responses: HashMap<String, Scripted>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubLookup {
        pub fn with(mut self, url: &str, response: Scripted) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl ThreatLookup for StubLookup {
        async fn lookup(&self, url: &str) -> Result<ThreatVerdict, ThreatIntelError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                None => Ok(ThreatVerdict::NoVerdict),
                Some(Scripted::Timeout) => Err(ThreatIntelError::Status {
                    status: 504,
                    body: "upstream request timeout".into(),
                }),
                Some(Scripted::Threat(threat_type)) => {
                    let raw = serde_json::json!({ "matches": [{ "threatType": threat_type }] });
                    let domain = url::Url::parse(url)
                        .ok()
                        .and_then(|u| u.host_str().map(str::to_string))
                        .unwrap_or_default();
                    super::threat_intel::map_response(url, &domain, raw)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Scripted, StubLookup};
    use super::*;
    use crate::core::models::{Provider, RiskLevel};

    fn scanner(stub: StubLookup) -> UrlScanner {
        UrlScanner::new(Arc::new(stub), HeuristicAnalyzer::default())
    }

    #[tokio::test]
    async fn provider_match_overrides_heuristics() {
        let lookup = StubLookup::default().with("https://example.com", Scripted::Threat("MALWARE"));
        let scanner = scanner(lookup);
        let result = scanner.scan("https://example.com").await;
        assert!(!result.is_safe);
        assert_eq!(result.provider(), Provider::ThreatIntel);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.confidence, 0.95);
    }

    #[tokio::test]
    async fn no_verdict_falls_back_to_heuristics() {
        let result = scanner(StubLookup::default()).scan("http://192.168.1.5/login").await;
        assert_eq!(result.provider(), Provider::Heuristic);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.categories.iter().collect::<Vec<_>>(), vec!["phishing"]);
        assert_eq!(result.confidence, 0.8);
    }

    #[tokio::test]
    async fn provider_error_fails_closed_even_for_clean_urls() {
        let lookup = StubLookup::default().with("https://flaky.example", Scripted::Timeout);
        let scanner = scanner(lookup);
        let result = scanner.scan("https://flaky.example").await;
        assert!(!result.is_safe);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.categories.iter().collect::<Vec<_>>(), vec!["error"]);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.provider(), Provider::Error);
        assert!(result.details.contains("504"));
    }

    #[test]
    fn build_result_appends_extra_details() {
        let result = build_result(
            "https://x.test",
            "x.test",
            VerdictCode::ProviderError,
            Evidence::Error { reason: "boom".into() },
            Some("boom"),
            Utc::now(),
        );
        assert!(result.details.ends_with("(boom)"));
        assert!(result.categories.contains("error"));
    }
}
