//! Types for the purchase loop.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::SurfaceError;

/// Storefront account credentials.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "username")]
    pub identifier: String,
    #[serde(alias = "password")]
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything needed for one purchase run. Immutable once validated.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    /// Storefront entry page.
    #[serde(alias = "url")]
    pub entry_url: String,
    /// Acceptable categories, most preferred first.
    #[serde(alias = "sections")]
    pub categories: Vec<String>,
    /// Tickets to add (companion tickets in companion mode).
    #[serde(alias = "number_of_tickets")]
    pub guest_count: u32,
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Do not start before this instant.
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Add one primary ticket before the companion tickets.
    #[serde(default)]
    pub companion: bool,
    /// Promo or document code entered before looking for categories.
    #[serde(default)]
    pub promo_code: Option<String>,
}

impl PurchaseRequest {
    /// Reject requests the loop can never complete.
    pub fn validate(&self) -> Result<(), PurchaseError> {
        let mut problems = Vec::new();

        let url = self.entry_url.trim();
        if url.is_empty() {
            problems.push("url is required".to_string());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            problems.push(format!("url must be http(s): {}", url));
        }
        if self.categories.is_empty() {
            problems.push("at least one category is required".to_string());
        } else if self.categories.iter().any(|c| c.trim().is_empty()) {
            problems.push("categories cannot be blank".to_string());
        }
        if self.guest_count == 0 {
            problems.push("guest count must be a positive integer".to_string());
        }
        if self.credentials.identifier.trim().is_empty() {
            problems.push("username is required".to_string());
        }
        if self.credentials.secret.is_empty() {
            problems.push("password is required".to_string());
        }
        if matches!(&self.promo_code, Some(code) if code.trim().is_empty()) {
            problems.push("promo code cannot be blank".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PurchaseError::Validation(problems.join("; ")))
        }
    }
}

/// Availability of one category at the moment it was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    SoldOut,
    NotPresent,
}

/// A category identifier with its freshly computed availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCandidate {
    pub id: String,
    pub availability: Availability,
}

impl CategoryCandidate {
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }
}

/// States of the purchase state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    Init,
    Gate,
    AcceptCookies,
    EnterPromoCode,
    ResolveSection,
    NavigateSection,
    BuildCart,
    Authenticate,
    Success,
    Retry,
    Abort,
}

impl PurchaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Gate => "gate",
            Self::AcceptCookies => "accept_cookies",
            Self::EnterPromoCode => "enter_promo_code",
            Self::ResolveSection => "resolve_section",
            Self::NavigateSection => "navigate_section",
            Self::BuildCart => "build_cart",
            Self::Authenticate => "authenticate",
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A control was not found or not interactable in time.
    ControlMissing,
    /// A fetched element handle went stale.
    StaleReference,
    /// A blocking dialog appeared before login.
    SessionInvalidated,
    /// None of the requested categories is purchasable right now.
    Unavailable,
    /// The category tab could not be reached in the category strip.
    CategoryUnreachable,
    /// Login finished somewhere other than the payment stage.
    LoginRejected,
    /// Any other surface fault.
    Unclassified,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlMissing => "control_missing",
            Self::StaleReference => "stale_reference",
            Self::SessionInvalidated => "session_invalidated",
            Self::Unavailable => "unavailable",
            Self::CategoryUnreachable => "category_unreachable",
            Self::LoginRejected => "login_rejected",
            Self::Unclassified => "unclassified",
        }
    }
}

impl From<&SurfaceError> for FailureKind {
    fn from(err: &SurfaceError) -> Self {
        if err.is_stale() {
            Self::StaleReference
        } else if err.is_missing() {
            Self::ControlMissing
        } else {
            Self::Unclassified
        }
    }
}

/// A stage's failure signal: which stage, what kind, and a readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{stage} failed ({}): {detail}", .kind.as_str())]
pub struct StageFailure {
    pub stage: PurchaseState,
    pub kind: FailureKind,
    pub detail: String,
}

impl StageFailure {
    pub fn new(stage: PurchaseState, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a surface fault raised inside `stage`.
    pub fn from_surface(stage: PurchaseState, err: &SurfaceError) -> Self {
        Self::new(stage, FailureKind::from(err), err.to_string())
    }
}

/// Result of one full pass through the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { category: String, location: String },
    Retry(StageFailure),
    Abort(StageFailure),
}

/// Which failures the loop keeps retrying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClassification {
    /// Every failure is retried.
    #[default]
    All,
    /// Unclassified surface faults abort the run; everything else retries.
    TransientOnly,
}

impl RetryClassification {
    pub fn classify(&self, failure: StageFailure) -> AttemptOutcome {
        match (self, failure.kind) {
            (Self::TransientOnly, FailureKind::Unclassified) => AttemptOutcome::Abort(failure),
            _ => AttemptOutcome::Retry(failure),
        }
    }
}

/// Mutable state of one purchase run, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Iterations started so far.
    pub iteration: u32,
    pub state: PurchaseState,
    /// Category targeted by the current iteration only.
    pub target: Option<String>,
    /// Last category any iteration resolved.
    pub last_category: Option<String>,
    pub last_failure: Option<StageFailure>,
    /// Whether the entry page has been loaded at least once.
    pub entry_loaded: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            state: PurchaseState::Init,
            target: None,
            last_category: None,
            last_failure: None,
            entry_loaded: false,
        }
    }

    /// Start a new iteration; nothing from the previous one is targeted.
    pub fn begin_iteration(&mut self) {
        self.iteration += 1;
        self.target = None;
        self.state = PurchaseState::AcceptCookies;
    }

    pub fn set_target(&mut self, category: &str) {
        self.target = Some(category.to_string());
        self.last_category = Some(category.to_string());
    }

    pub fn record_failure(&mut self, failure: &StageFailure) {
        self.target = None;
        self.last_failure = Some(failure.clone());
    }
}

/// Terminal success of a purchase run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReport {
    /// Iterations it took, including the successful one.
    pub attempts: u32,
    pub category: String,
    /// Location reached after login.
    pub location: String,
    pub completed_at: DateTime<Utc>,
}

/// Terminal failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// Malformed request; never retried.
    #[error("invalid purchase request: {0}")]
    Validation(String),

    /// The caller cancelled the run.
    #[error("purchase cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    /// The retry classification refused to retry a failure.
    #[error("purchase aborted after {attempts} attempts: {failure}")]
    Aborted { attempts: u32, failure: StageFailure },

    /// No surface could be created for the run.
    #[error("automation surface unavailable: {0}")]
    Surface(#[from] SurfaceError),
}
