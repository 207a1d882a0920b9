use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::purchase::{BackoffPolicy, OrchestratorConfig, PurchaseRequest};
use crate::storefront::StorefrontProfile;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
    #[serde(default)]
    pub storefront: StorefrontProfile,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    /// Request executed by `turnstile run`.
    #[serde(default)]
    pub purchase: Option<PurchaseRequest>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Purchase jobs allowed to run at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Status events kept per job for `GET /purchases/{id}`.
    #[serde(default = "default_job_event_history")]
    pub job_event_history: usize,
    /// Finished jobs kept for `GET /purchases`; the oldest are dropped first.
    #[serde(default = "default_max_finished_jobs")]
    pub max_finished_jobs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_event_history: default_job_event_history(),
            max_finished_jobs: default_max_finished_jobs(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_job_event_history() -> usize {
    200
}

fn default_max_finished_jobs() -> usize {
    100
}

/// WebDriver (chromedriver / geckodriver) connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebDriverConfig {
    /// Driver URL (e.g., "http://localhost:9515")
    #[serde(default = "default_webdriver_url")]
    pub url: String,
    /// "chrome" or "firefox"
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub incognito: bool,
    /// Extra browser arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u32,
    /// Poll interval for element waits in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub maximize: bool,
    /// Leave the browser open after success so payment can be finished by hand.
    #[serde(default = "default_true")]
    pub keep_open_on_success: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            browser: default_browser(),
            headless: false,
            incognito: true,
            args: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
            maximize: true,
            keep_open_on_success: true,
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u32 {
    60
}

fn default_poll_interval() -> u64 {
    250
}

/// Settings for hosted purchase jobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Delay between failed iterations of hosted jobs.
    #[serde(default = "default_service_backoff")]
    pub backoff: BackoffPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backoff: default_service_backoff(),
        }
    }
}

fn default_service_backoff() -> BackoffPolicy {
    BackoffPolicy::SERVICE_DEFAULT
}

impl Config {
    /// Orchestrator settings for hosted jobs: same timeouts, service backoff.
    pub fn service_orchestrator(&self) -> OrchestratorConfig {
        self.orchestrator.clone().with_backoff(self.service.backoff)
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub webdriver: WebDriverConfig,
    pub storefront: StorefrontProfile,
    pub orchestrator: OrchestratorConfig,
    pub service: ServiceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase: Option<SanitizedPurchaseConfig>,
}

/// Sanitized purchase request (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPurchaseConfig {
    pub url: String,
    pub sections: Vec<String>,
    pub number_of_tickets: u32,
    pub username: String,
    pub password_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    pub companion: bool,
    pub promo_code_configured: bool,
}

impl From<&PurchaseRequest> for SanitizedPurchaseConfig {
    fn from(request: &PurchaseRequest) -> Self {
        Self {
            url: request.entry_url.clone(),
            sections: request.categories.clone(),
            number_of_tickets: request.guest_count,
            username: request.credentials.identifier.clone(),
            password_configured: !request.credentials.secret.is_empty(),
            scheduled_start: request.scheduled_start,
            companion: request.companion,
            promo_code_configured: request.promo_code.is_some(),
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            webdriver: config.webdriver.clone(),
            storefront: config.storefront.clone(),
            orchestrator: config.orchestrator.clone(),
            service: config.service.clone(),
            purchase: config.purchase.as_ref().map(SanitizedPurchaseConfig::from),
        }
    }
}
