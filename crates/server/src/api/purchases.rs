//! Purchase job API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use turnstile_core::{Credentials, PurchaseRequest};

use crate::jobs::{JobError, JobStatus, JobView};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a purchase.
///
/// Field names follow the `[purchase]` config section; the camelCase names
/// posted by the web form are accepted as aliases.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePurchaseBody {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "sectionsWithoutDiscount", alias = "categories")]
    pub sections: Option<Vec<String>>,
    #[serde(alias = "numberOfTickets", alias = "guest_count")]
    pub number_of_tickets: Option<TicketCount>,
    #[serde(default, alias = "scheduledStart")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub companion: bool,
    #[serde(default, alias = "promoCode", alias = "cpf")]
    pub promo_code: Option<String>,
}

/// Ticket count as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TicketCount {
    Number(i64),
    Text(String),
}

impl TicketCount {
    fn positive(&self) -> Result<u32, String> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("number_of_tickets is not a number: {:?}", s))?,
        };
        u32::try_from(value)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| "number_of_tickets must be a positive integer".to_string())
    }
}

impl CreatePurchaseBody {
    /// Check required fields and build the request.
    pub fn into_request(self) -> Result<PurchaseRequest, String> {
        let mut missing = Vec::new();
        if blank(&self.url) {
            missing.push("url");
        }
        if blank(&self.username) {
            missing.push("username");
        }
        if blank(&self.password) {
            missing.push("password");
        }
        if self.sections.as_ref().is_none_or(|s| s.is_empty()) {
            missing.push("sections");
        }
        if self.number_of_tickets.is_none() {
            missing.push("number_of_tickets");
        }
        if !missing.is_empty() {
            return Err(format!("missing required fields: {}", missing.join(", ")));
        }

        let guest_count = self
            .number_of_tickets
            .as_ref()
            .map_or(Ok(0), TicketCount::positive)?;

        Ok(PurchaseRequest {
            entry_url: self.url.unwrap_or_default(),
            categories: self.sections.unwrap_or_default(),
            guest_count,
            credentials: Credentials::new(
                self.username.unwrap_or_default(),
                self.password.unwrap_or_default(),
            ),
            scheduled_start: self.scheduled_start,
            companion: self.companion,
            promo_code: self.promo_code.filter(|code| !code.trim().is_empty()),
        })
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Query parameters for creating a purchase.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePurchaseParams {
    /// Answer only once the job reaches a terminal state.
    #[serde(default)]
    pub wait: bool,
}

/// Response for listing purchases.
#[derive(Debug, Serialize)]
pub struct ListPurchasesResponse {
    pub purchases: Vec<JobView>,
    pub active: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct PurchaseErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<PurchaseErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(PurchaseErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = match &err {
            JobError::Invalid(_) => StatusCode::BAD_REQUEST,
            JobError::AtCapacity { .. } => StatusCode::TOO_MANY_REQUESTS,
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::AlreadyFinished { .. } => StatusCode::CONFLICT,
        };
        api_error(status, err.to_string())
    }
}

fn terminal_status_code(status: JobStatus) -> StatusCode {
    match status {
        JobStatus::Running => StatusCode::ACCEPTED,
        JobStatus::Succeeded => StatusCode::OK,
        JobStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        JobStatus::Cancelled => StatusCode::CONFLICT,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a purchase job.
pub async fn create_purchase(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreatePurchaseParams>,
    body: Result<Json<CreatePurchaseBody>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(body) = body.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let request = body
        .into_request()
        .map_err(|msg| api_error(StatusCode::BAD_REQUEST, msg))?;

    let submitted = state.jobs().submit(request)?;
    if !params.wait {
        return Ok((StatusCode::ACCEPTED, Json(submitted.view)));
    }

    match submitted.handle.await {
        Ok(view) => Ok((terminal_status_code(view.status), Json(view))),
        Err(e) => {
            error!(job_id = %submitted.view.id, "Purchase job task failed: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("purchase job {} crashed", submitted.view.id),
            ))
        }
    }
}

/// List all purchase jobs.
pub async fn list_purchases(State(state): State<Arc<AppState>>) -> Json<ListPurchasesResponse> {
    let jobs = state.jobs();
    Json(ListPurchasesResponse {
        purchases: jobs.list(),
        active: jobs.active_count(),
    })
}

/// Get one purchase job with its recent events.
pub async fn get_purchase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .jobs()
        .get(&id)
        .map(Json)
        .ok_or_else(|| JobError::NotFound(id).into())
}

/// Cancel a running purchase job.
pub async fn cancel_purchase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let view = state.jobs().cancel(&id)?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}
