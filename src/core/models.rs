// src/core/models.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

// --- Verdict Types ---

/// How dangerous a URL is judged to be. Ordered from least to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Which stage of the pipeline produced a verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    ThreatIntel,
    Heuristic,
    Error,
}

/// The structural rules of the heuristic analyzer, in priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HeuristicRule {
    MalformedUrl,
    RawIpHost,
    SuspiciousTld,
    ExcessiveSubdomains,
    ExcessiveLength,
    NoRuleMatched,
}

/// Provider-specific evidence behind a verdict, keyed by `provider`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum Evidence {
    ThreatIntel {
        threat_types: Vec<String>,
        /// Untouched provider payload, kept for audit.
        #[serde(default)]
        raw_response: serde_json::Value,
    },
    Heuristic {
        rule: HeuristicRule,
    },
    Error {
        reason: String,
    },
}

impl Evidence {
    pub fn provider(&self) -> Provider {
        match self {
            Evidence::ThreatIntel { .. } => Provider::ThreatIntel,
            Evidence::Heuristic { .. } => Provider::Heuristic,
            Evidence::Error { .. } => Provider::Error,
        }
    }
}

/// The verdict for a single URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    pub url: String,
    /// Parsed host, empty when the URL could not be parsed.
    pub domain: String,
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    pub categories: BTreeSet<String>,
    pub confidence: f64,
    #[serde(flatten)]
    pub evidence: Evidence,
    pub details: String,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn provider(&self) -> Provider {
        self.evidence.provider()
    }

    /// The verdict fields only, used to compare two scans of the same URL.
    #[cfg(test)]
    pub fn verdict(&self) -> (bool, RiskLevel, &BTreeSet<String>) {
        (self.is_safe, self.risk_level, &self.categories)
    }
}

// --- Queue Models ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Safe,
    Unsafe,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Safe | JobStatus::Unsafe)
    }
}

/// Summary written alongside the terminal status of a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Findings {
    pub safe_urls: Vec<String>,
    pub unsafe_urls: Vec<String>,
    pub results: Vec<ScanResult>,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// A queued unit of work: every URL found in one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanJob {
    pub id: Uuid,
    pub target_table: String,
    pub target_id: String,
    pub urls: Vec<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub findings: Findings,
    /// Identifies the current owner while `processing`.
    #[serde(default)]
    pub claim_id: Option<Uuid>,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ScanJob {
    pub fn new(target_table: &str, target_id: &str, urls: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_table: target_table.to_string(),
            target_id: target_id.to_string(),
            urls,
            status: JobStatus::Pending,
            findings: Findings::default(),
            claim_id: None,
            attempts: 0,
            created_at: now,
            scanned_at: None,
            updated_at: now,
        }
    }
}

// --- Outbound Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationDetails {
    pub unsafe_urls: Vec<String>,
    pub scan_id: Uuid,
}

/// Sent to the moderation workflow when a job ends `unsafe`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Escalation {
    pub target_table: String,
    pub target_id: String,
    pub reason: String,
    pub details: EscalationDetails,
}

impl Escalation {
    pub const REASON_UNSAFE_URLS: &'static str = "unsafe_urls_detected";

    pub fn for_job(job: &ScanJob) -> Self {
        Self {
            target_table: job.target_table.clone(),
            target_id: job.target_id.clone(),
            reason: Self::REASON_UNSAFE_URLS.to_string(),
            details: EscalationDetails {
                unsafe_urls: job.findings.unsafe_urls.clone(),
                scan_id: job.id,
            },
        }
    }
}

/// What a single worker invocation reports back to its scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InvocationOutcome {
    Processed {
        success: bool,
        scan_id: Uuid,
        status: JobStatus,
        total_urls: usize,
        unsafe_count: usize,
        results: Vec<ScanResult>,
    },
    Idle {
        message: String,
    },
}

impl InvocationOutcome {
    pub fn idle() -> Self {
        InvocationOutcome::Idle { message: "no pending scans".to_string() }
    }

    pub fn from_job(job: &ScanJob) -> Self {
        InvocationOutcome::Processed {
            success: true,
            scan_id: job.id,
            status: job.status,
            total_urls: job.urls.len(),
            unsafe_count: job.findings.unsafe_urls.len(),
            results: job.findings.results.clone(),
        }
    }
}
