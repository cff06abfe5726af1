// src/core/aggregator.rs

//! Combines the two checks into one verdict per URL, and all per-URL verdicts
//! into one verdict per job.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::core::knowledge_base::VerdictCode;
use crate::core::models::{Evidence, Findings, JobStatus, ScanResult};
use crate::core::scanner::build_result;
use crate::core::scanner::threat_intel::{validate_url, ThreatIntelError, ThreatVerdict};

/// Picks the verdict for one URL.
///
/// A provider match wins outright. "No verdict" defers to the heuristics.
/// A provider error fails closed and never consults the heuristics.
pub fn resolve_url<F>(
    url: &str,
    lookup: Result<ThreatVerdict, ThreatIntelError>,
    heuristic: F,
) -> ScanResult
where
    F: FnOnce() -> ScanResult,
{
    match lookup {
        Ok(ThreatVerdict::Match(result)) => result,
        Ok(ThreatVerdict::NoVerdict) => heuristic(),
        Err(e) => {
            warn!(url, error = %e, "Threat intelligence lookup failed, failing closed.");
            provider_error_result(url, &e.to_string())
        }
    }
}

/// The fail-closed verdict for a URL that could not be verified.
pub fn provider_error_result(url: &str, reason: &str) -> ScanResult {
    let domain = validate_url(url)
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    build_result(
        url,
        &domain,
        VerdictCode::ProviderError,
        Evidence::Error { reason: reason.to_string() },
        Some(reason),
        Utc::now(),
    )
}

/// Strict OR: one unsafe URL makes the whole job unsafe.
pub fn job_status(results: &[ScanResult]) -> JobStatus {
    if results.iter().any(|r| !r.is_safe) {
        JobStatus::Unsafe
    } else {
        JobStatus::Safe
    }
}

/// Builds the findings summary and the terminal status for a finished pass.
pub fn summarize(results: Vec<ScanResult>, scanned_at: DateTime<Utc>) -> (JobStatus, Findings) {
    let status = job_status(&results);
    let (safe, unsafe_): (Vec<&ScanResult>, Vec<&ScanResult>) =
        results.iter().partition(|r| r.is_safe);
    let findings = Findings {
        safe_urls: safe.into_iter().map(|r| r.url.clone()).collect(),
        unsafe_urls: unsafe_.into_iter().map(|r| r.url.clone()).collect(),
        results,
        scanned_at: Some(scanned_at),
    };
    (status, findings)
}
