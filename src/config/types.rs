use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::metadata::client::CallPolicy;
use crate::metadata::fields::{GeneralPriority, IdentifierPriority};
use crate::metadata::provider::ProviderId;
use crate::reconcile::verify::UnlistedEpisodePolicy;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub priority: PriorityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file holding content units and merged records
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.local/share/tapedeck/tapedeck.db").as_ref())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileConfig {
    /// Maximum number of lookup groups processed at once
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Timeout for a single provider call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Base delay after a rate-limit response without Retry-After
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_ms: u64,

    /// Merge and verify, but commit nothing
    #[serde(default)]
    pub dry_run: bool,
}

fn default_fan_out() -> usize {
    4
}
fn default_call_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    500
}
fn default_rate_limit_backoff() -> u64 {
    5000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            call_timeout_secs: default_call_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            rate_limit_backoff_ms: default_rate_limit_backoff(),
            dry_run: false,
        }
    }
}

impl ReconcileConfig {
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.call_timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationConfig {
    /// What to do when local episodes are missing from the remote listing
    #[serde(default)]
    pub on_unlisted_local: UnlistedEpisodePolicy,

    /// Where the missing-episode report is written
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

fn default_report_path() -> PathBuf {
    PathBuf::from("missingepisodes.txt")
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            on_unlisted_local: UnlistedEpisodePolicy::default(),
            report_path: default_report_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub scrape: IngestConfig,

    #[serde(default)]
    pub probe: IngestConfig,

    #[serde(default)]
    pub tmdb: TmdbConfig,

    #[serde(default)]
    pub omdb: CatalogConfig,

    #[serde(default)]
    pub tvdb: CatalogConfig,

    #[serde(default)]
    pub tvmaze: TvmazeConfig,
}

/// A provider that reads collaborator output from a directory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// A keyed catalog API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub api_key: String,

    /// Override the API root (tests point this at a mock server)
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
}

fn default_rps() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: default_language(),
            base_url: None,
            requests_per_second: default_rps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TvmazeConfig {
    /// TVmaze needs no key, so it is switched on explicitly
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub base_url: Option<String>,

    /// TVmaze allows 20 calls per 10 seconds
    #[serde(default = "default_tvmaze_rps")]
    pub requests_per_second: u32,
}

fn default_true() -> bool {
    true
}
fn default_tvmaze_rps() -> u32 {
    2
}

impl Default for TvmazeConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: None,
            requests_per_second: default_tvmaze_rps(),
        }
    }
}

/// `[priority]`: source order per field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PriorityConfig {
    #[serde(default)]
    pub general: GeneralPriority,

    #[serde(default)]
    pub identifiers: IdentifierPriority,

    /// Per-field overrides, e.g. `genre = ["tmdb", "scrape"]`
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<ProviderId>>,
}
