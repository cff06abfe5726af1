// src/core/scanner/heuristics.rs

use std::collections::HashSet;

use chrono::Utc;
use once_cell::sync::Lazy;
use tracing::debug;
use url::{Host, Url};

use crate::core::knowledge_base::VerdictCode;
use crate::core::models::{Evidence, HeuristicRule, ScanResult};
use crate::core::scanner::build_result;

/// Two-label public suffixes under which the registrable domain spans three labels.
static MULTI_LABEL_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "com.au", "net.au", "org.au", "co.nz",
        "co.jp", "ne.jp", "or.jp", "com.br", "com.cn", "com.mx", "co.in", "co.za", "com.tr",
        "com.sg", "co.kr",
    ]
    .into_iter()
    .collect()
});

/// Tunables for the structural rules.
#[derive(Debug, Clone)]
pub struct HeuristicConfig {
    /// Lower-case TLDs without the leading dot.
    pub suspicious_tlds: Vec<String>,
    pub max_subdomain_labels: usize,
    pub max_url_length: usize,
}

impl HeuristicConfig {
    pub const DEFAULT_SUSPICIOUS_TLDS: &'static [&'static str] = &[
        "tk", "ml", "ga", "cf", "gq", "xyz", "top", "work", "click", "link", "zip", "mov",
        "country", "kim", "loan", "men", "review",
    ];

    pub fn with_tlds<I, S>(tlds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suspicious_tlds = tlds
            .into_iter()
            .map(|t| t.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { suspicious_tlds, ..Self::default() }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            suspicious_tlds: Self::DEFAULT_SUSPICIOUS_TLDS.iter().map(|t| t.to_string()).collect(),
            max_subdomain_labels: 3,
            max_url_length: 200,
        }
    }
}

/// Local, deterministic rule engine. Makes no network calls.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAnalyzer {
    config: HeuristicConfig,
}

impl HeuristicAnalyzer {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Produces a verdict for `url` from its structure alone.
    pub fn evaluate(&self, url: &str) -> ScanResult {
        let parsed = Url::parse(url).ok();
        let domain = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or_default()
            .to_string();
        let rule = self.first_matching_rule(url, parsed.as_ref());
        debug!(url, rule = %rule, "Heuristic evaluation finished.");

        build_result(
            url,
            &domain,
            VerdictCode::Heuristic(rule),
            Evidence::Heuristic { rule },
            None,
            Utc::now(),
        )
    }

    /// Rules run in fixed priority order; the first one that fires wins.
    fn first_matching_rule(&self, raw: &str, parsed: Option<&Url>) -> HeuristicRule {
        let Some(parsed) = parsed else {
            return HeuristicRule::MalformedUrl;
        };

        match parsed.host() {
            Some(Host::Ipv4(_)) => return HeuristicRule::RawIpHost,
            Some(Host::Domain(host)) => {
                let host = host.trim_end_matches('.').to_ascii_lowercase();
                if self.has_suspicious_tld(&host) {
                    return HeuristicRule::SuspiciousTld;
                }
                if subdomain_label_count(&host) > self.config.max_subdomain_labels {
                    return HeuristicRule::ExcessiveSubdomains;
                }
            }
            Some(Host::Ipv6(_)) => {}
            None => return HeuristicRule::MalformedUrl,
        }

        if raw.chars().count() > self.config.max_url_length {
            return HeuristicRule::ExcessiveLength;
        }
        HeuristicRule::NoRuleMatched
    }

    fn has_suspicious_tld(&self, host: &str) -> bool {
        let Some(tld) = host.rsplit('.').next() else {
            return false;
        };
        self.config.suspicious_tlds.iter().any(|t| t == tld)
    }
}

/// Number of labels in `host` to the left of its registrable domain.
fn subdomain_label_count(host: &str) -> usize {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let registrable = match labels.as_slice() {
        [.., second, last]
            if MULTI_LABEL_SUFFIXES.contains(format!("{second}.{last}").as_str()) =>
        {
            3
        }
        _ => 2,
    };
    labels.len().saturating_sub(registrable)
}
