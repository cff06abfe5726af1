//! Static, read-only table of the fixed verdicts this pipeline can hand out.
//! Every heuristic rule and every fail-closed case maps to exactly one entry,
//! so the risk level, category, confidence and audit wording live in one place.

use crate::core::models::{HeuristicRule, RiskLevel};

/// Identifies an entry in the verdict table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictCode {
    /// A heuristic rule fired (or none did).
    Heuristic(HeuristicRule),
    /// The URL could not be parsed before calling the provider.
    MalformedUrl,
    /// The provider could not be reached or answered with an error.
    ProviderError,
}

/// Everything needed to turn a verdict code into a `ScanResult`.
pub struct VerdictTemplate {
    pub code: VerdictCode,
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    /// `None` for a clean verdict.
    pub category: Option<&'static str>,
    pub confidence: f64,
    /// Audit text stored in `ScanResult::details`.
    pub description: &'static str,
}

static VERDICTS: &[VerdictTemplate] = &[
    VerdictTemplate {
        code: VerdictCode::Heuristic(HeuristicRule::RawIpHost),
        is_safe: false,
        risk_level: RiskLevel::High,
        category: Some("phishing"),
        confidence: 0.8,
        description: "Host is a raw IPv4 address; legitimate sites almost always link by name.",
    },
    VerdictTemplate {
        code: VerdictCode::Heuristic(HeuristicRule::SuspiciousTld),
        is_safe: false,
        risk_level: RiskLevel::Medium,
        category: Some("suspicious"),
        confidence: 0.7,
        description: "Host uses a top-level domain on the low-reputation denylist.",
    },
    VerdictTemplate {
        code: VerdictCode::Heuristic(HeuristicRule::ExcessiveSubdomains),
        is_safe: false,
        risk_level: RiskLevel::Medium,
        category: Some("suspicious"),
        confidence: 0.6,
        description: "Host nests more than three subdomain labels under its registrable domain.",
    },
    VerdictTemplate {
        code: VerdictCode::Heuristic(HeuristicRule::ExcessiveLength),
        is_safe: false,
        risk_level: RiskLevel::Low,
        category: Some("suspicious"),
        confidence: 0.5,
        description: "URL is longer than 200 characters.",
    },
    VerdictTemplate {
        code: VerdictCode::Heuristic(HeuristicRule::NoRuleMatched),
        is_safe: true,
        risk_level: RiskLevel::Low,
        category: None,
        confidence: 0.3,
        description: "No structural red flags found; heuristics alone give a weak positive signal.",
    },
    VerdictTemplate {
        code: VerdictCode::MalformedUrl,
        is_safe: false,
        risk_level: RiskLevel::High,
        category: Some("malicious"),
        confidence: 0.9,
        description: "URL is not a well-formed http(s) address and was not sent to the provider.",
    },
    VerdictTemplate {
        code: VerdictCode::ProviderError,
        is_safe: false,
        risk_level: RiskLevel::High,
        category: Some("error"),
        confidence: 1.0,
        description: "Threat intelligence lookup failed; treating the URL as unsafe until it \
                      can be verified.",
    },
];

impl VerdictCode {
    /// Position of this code in `VERDICTS`.
    fn index(self) -> usize {
        match self {
            VerdictCode::Heuristic(HeuristicRule::RawIpHost) => 0,
            VerdictCode::Heuristic(HeuristicRule::SuspiciousTld) => 1,
            VerdictCode::Heuristic(HeuristicRule::ExcessiveSubdomains) => 2,
            VerdictCode::Heuristic(HeuristicRule::ExcessiveLength) => 3,
            VerdictCode::Heuristic(HeuristicRule::NoRuleMatched) => 4,
            VerdictCode::MalformedUrl
            | VerdictCode::Heuristic(HeuristicRule::MalformedUrl) => 5,
            VerdictCode::ProviderError => 6,
        }
    }
}

/// Retrieves the template for a verdict code.
pub fn get_verdict(code: VerdictCode) -> &'static VerdictTemplate {
    &VERDICTS[code.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_indexes_its_own_template() {
        let codes = [
            VerdictCode::Heuristic(HeuristicRule::RawIpHost),
            VerdictCode::Heuristic(HeuristicRule::SuspiciousTld),
            VerdictCode::Heuristic(HeuristicRule::ExcessiveSubdomains),
            VerdictCode::Heuristic(HeuristicRule::ExcessiveLength),
            VerdictCode::Heuristic(HeuristicRule::NoRuleMatched),
            VerdictCode::MalformedUrl,
            VerdictCode::ProviderError,
        ];
        for code in codes {
            assert_eq!(get_verdict(code).code, code);
        }
    }

    #[test]
    fn unparseable_url_shares_the_malformed_verdict() {
        let verdict = get_verdict(VerdictCode::Heuristic(HeuristicRule::MalformedUrl));
        assert_eq!(verdict.code, VerdictCode::MalformedUrl);
        assert_eq!(verdict.category, Some("malicious"));
    }

    #[test]
    fn only_the_fallthrough_rule_is_safe() {
        let safe: Vec<_> = VERDICTS.iter().filter(|v| v.is_safe).map(|v| v.code).collect();
        assert_eq!(safe, vec![VerdictCode::Heuristic(HeuristicRule::NoRuleMatched)]);
    }

    #[test]
    fn provider_error_is_fail_closed() {
        let verdict = get_verdict(VerdictCode::ProviderError);
        assert!(!verdict.is_safe);
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert_eq!(verdict.category, Some("error"));
        assert_eq!(verdict.confidence, 1.0);
    }
}
