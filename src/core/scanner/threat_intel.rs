// src/core/scanner/threat_intel.rs

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::knowledge_base::VerdictCode;
use crate::core::models::{Evidence, RiskLevel, ScanResult};
use crate::core::scanner::build_result;

/// Threat categories requested from the provider.
pub const REQUESTED_THREAT_TYPES: &[&str] = &[
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];

/// Confidence attached to every provider match.
const MATCH_CONFIDENCE: f64 = 0.95;

#[derive(Error, Debug)]
pub enum ThreatIntelError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreatVerdict {
    /// The provider (or the pre-flight URL check) produced a verdict.
    Match(ScanResult),
    /// Nothing known about this URL. Not the same as "safe".
    NoVerdict,
}

/// The seam between the pipeline and a reputation service.
#[async_trait]
pub trait ThreatLookup: Send + Sync {
    async fn lookup(&self, url: &str) -> Result<ThreatVerdict, ThreatIntelError>;
}

#[derive(Debug, Clone)]
pub struct ThreatIntelConfig {
    /// Without a key the client never calls out and always answers `NoVerdict`.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub client_id: String,
    pub client_version: String,
    pub timeout: Duration,
}

impl Default for ThreatIntelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://safebrowsing.googleapis.com/v4/threatMatches:find".to_string(),
            client_id: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

// --- Wire Format ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo<'a> {
    client_id: &'a str,
    client_version: &'a str,
}

#[derive(Debug, Serialize)]
struct ThreatEntry<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatInfo<'a> {
    threat_types: &'a [&'a str],
    platform_types: [&'a str; 1],
    threat_entry_types: [&'a str; 1],
    threat_entries: [ThreatEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindThreatMatchesRequest<'a> {
    client: ClientInfo<'a>,
    threat_info: ThreatInfo<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatch {
    threat_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct FindThreatMatchesResponse {
    #[serde(default)]
    matches: Option<Vec<ThreatMatch>>,
}

/// HTTP client for a Safe-Browsing-style `threatMatches:find` endpoint.
#[derive(Debug, Clone)]
pub struct ThreatIntelClient {
    http: reqwest::Client,
    config: ThreatIntelConfig,
}

impl ThreatIntelClient {
    pub fn new(config: ThreatIntelConfig) -> Result<Self, ThreatIntelError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("LinkSentry/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(ThreatIntelError::Client)?;

        if config.api_key.is_none() {
            warn!("No threat intelligence API key configured; running heuristics-only.");
        }
        Ok(Self { http, config })
    }

    async fn query_provider(
        &self,
        api_key: &str,
        url: &str,
    ) -> Result<serde_json::Value, ThreatIntelError> {
        let body = FindThreatMatchesRequest {
            client: ClientInfo {
                client_id: &self.config.client_id,
                client_version: &self.config.client_version,
            },
            threat_info: ThreatInfo {
                threat_types: REQUESTED_THREAT_TYPES,
                platform_types: ["ANY_PLATFORM"],
                threat_entry_types: ["URL"],
                threat_entries: [ThreatEntry { url }],
            },
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Threat intelligence provider returned an error status.");
            return Err(ThreatIntelError::Status { status: status.as_u16(), body });
        }

        parse_body(&response.text().await?)
    }
}

/// A 2xx body must be a JSON document. An empty body is a decode failure,
/// never an implicit "no match".
fn parse_body(text: &str) -> Result<serde_json::Value, ThreatIntelError> {
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
impl ThreatLookup for ThreatIntelClient {
    /// Looks `url` up with the provider.
    ///
    /// Malformed URLs are answered locally without a network call, and a
    /// client without an API key never calls out.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL exactly as it appeared in the content.
    ///
    /// # Returns
    ///
    /// * `Ok(ThreatVerdict::Match(_))` - The provider listed the URL, or it is malformed.
    /// * `Ok(ThreatVerdict::NoVerdict)` - The provider has no entry, or no key is set.
    /// * `Err(_)` - Transport failure, non-2xx status, or a body that is not
    ///   a valid response document (including an empty one).
    async fn lookup(&self, url: &str) -> Result<ThreatVerdict, ThreatIntelError> {
        let Some(parsed) = validate_url(url) else {
            info!(url, "Malformed URL, skipping provider lookup.");
            return Ok(ThreatVerdict::Match(malformed_url_result(url)));
        };

        let Some(api_key) = self.config.api_key.as_deref() else {
            debug!(url, "No API key, provider lookup skipped.");
            return Ok(ThreatVerdict::NoVerdict);
        };

        debug!(url, "Querying threat intelligence provider.");
        let raw = self.query_provider(api_key, url).await?;
        let domain = parsed.host_str().unwrap_or_default();
        map_response(url, domain, raw)
    }
}

/// Only absolute http(s) URLs with a host are sent to the provider.
pub fn validate_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    let scheme_ok = matches!(parsed.scheme(), "http" | "https");
    let host_ok = parsed.host_str().is_some_and(|h| !h.is_empty());
    (scheme_ok && host_ok).then_some(parsed)
}

fn malformed_url_result(url: &str) -> ScanResult {
    build_result(
        url,
        "",
        VerdictCode::MalformedUrl,
        Evidence::ThreatIntel { threat_types: Vec::new(), raw_response: serde_json::Value::Null },
        None,
        Utc::now(),
    )
}

/// Risk level for one provider threat type.
pub fn risk_for_threat_type(threat_type: &str) -> RiskLevel {
    match threat_type {
        "MALWARE" | "SOCIAL_ENGINEERING" => RiskLevel::Critical,
        "UNWANTED_SOFTWARE" | "POTENTIALLY_HARMFUL_APPLICATION" => RiskLevel::High,
        _ => RiskLevel::Medium,
    }
}

/// Turns a raw provider response into a verdict. A missing or empty
/// `matches` array means the provider knows nothing about the URL.
pub(crate) fn map_response(
    url: &str,
    domain: &str,
    raw: serde_json::Value,
) -> Result<ThreatVerdict, ThreatIntelError> {
    let response: FindThreatMatchesResponse = serde_json::from_value(raw.clone())?;
    let matches = response.matches.unwrap_or_default();
    if matches.is_empty() {
        debug!(url, "Provider has no match.");
        return Ok(ThreatVerdict::NoVerdict);
    }

    let threat_types: Vec<String> = matches
        .iter()
        .map(|m| m.threat_type.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let risk_level = threat_types
        .iter()
        .map(|t| risk_for_threat_type(t))
        .max()
        .unwrap_or(RiskLevel::Medium);
    let categories: BTreeSet<String> =
        threat_types.iter().map(|t| t.to_ascii_lowercase()).collect();
    info!(url, threats = ?threat_types, risk = %risk_level, "Provider reported a threat match.");

    Ok(ThreatVerdict::Match(ScanResult {
        url: url.to_string(),
        domain: domain.to_string(),
        is_safe: false,
        risk_level,
        categories,
        confidence: MATCH_CONFIDENCE,
        details: format!("Threat intelligence match: {}", threat_types.join(", ")),
        evidence: Evidence::ThreatIntel { threat_types, raw_response: raw },
        scanned_at: Utc::now(),
    }))
}
