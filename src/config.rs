// src/config.rs

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::core::orchestrator::OrchestratorConfig;
use crate::core::scanner::heuristics::HeuristicConfig;
use crate::core::scanner::threat_intel::ThreatIntelConfig;
use crate::logging::get_data_dir;

#[derive(Parser, Debug)]
#[command(name = "link-sentry", version, about = "Asynchronous URL safety scanning worker")]
pub struct Cli {
    /// Mirror file logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SQLite job-store database (defaults to the data directory)
    #[arg(long, env = "LINK_SENTRY_STORE", global = true)]
    pub store: Option<PathBuf>,

    #[command(flatten)]
    pub scan: ScanArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Claim and process at most one pending job, then print the outcome
    Run,
    /// Run the worker on a fixed period until interrupted
    Watch {
        #[arg(long, env = "LINK_SENTRY_POLL_INTERVAL_SECS", default_value_t = 30)]
        poll_interval_secs: u64,
    },
    /// Queue a scan job for a piece of content
    Enqueue {
        #[arg(long)]
        target_table: String,
        #[arg(long)]
        target_id: String,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print a stored scan job, including its findings
    Status { scan_id: Uuid },
    /// Scan a single URL without touching the queue
    Check { url: String },
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Threat intelligence API key; without it only heuristics run
    #[arg(
        long,
        env = "LINK_SENTRY_THREAT_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub threat_api_key: Option<String>,

    #[arg(
        long,
        env = "LINK_SENTRY_THREAT_API_URL",
        default_value = "https://safebrowsing.googleapis.com/v4/threatMatches:find",
        global = true
    )]
    pub threat_api_url: String,

    #[arg(long, env = "LINK_SENTRY_CLIENT_ID", default_value = "link-sentry", global = true)]
    pub client_id: String,

    #[arg(
        long,
        env = "LINK_SENTRY_REQUEST_TIMEOUT_SECS",
        default_value_t = 10,
        global = true
    )]
    pub request_timeout_secs: u64,

    /// Pause between provider calls within one job
    #[arg(long, env = "LINK_SENTRY_URL_DELAY_MS", default_value_t = 100, global = true)]
    pub url_delay_ms: u64,

    /// Age after which a `processing` job may be reclaimed
    #[arg(long, env = "LINK_SENTRY_STALE_AFTER_SECS", default_value_t = 300, global = true)]
    pub stale_after_secs: i64,

    /// Comma-separated TLD denylist for the heuristics
    #[arg(long, env = "LINK_SENTRY_SUSPICIOUS_TLDS", value_delimiter = ',', global = true)]
    pub suspicious_tlds: Vec<String>,

    /// Where escalations are POSTed; logged only when unset
    #[arg(long, env = "LINK_SENTRY_MODERATION_WEBHOOK", global = true)]
    pub moderation_webhook: Option<String>,
}

impl ScanArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn threat_intel_config(&self) -> ThreatIntelConfig {
        ThreatIntelConfig {
            api_key: self.threat_api_key.clone().filter(|k| !k.trim().is_empty()),
            endpoint: self.threat_api_url.clone(),
            client_id: self.client_id.clone(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: self.request_timeout(),
        }
    }

    pub fn heuristic_config(&self) -> HeuristicConfig {
        if self.suspicious_tlds.is_empty() {
            HeuristicConfig::default()
        } else {
            HeuristicConfig::with_tlds(&self.suspicious_tlds)
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            url_delay: Duration::from_millis(self.url_delay_ms),
            stale_after: chrono::Duration::seconds(self.stale_after_secs.max(0)),
        }
    }
}

impl Cli {
    pub fn store_path(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| get_data_dir().join("jobs.db"))
    }
}
