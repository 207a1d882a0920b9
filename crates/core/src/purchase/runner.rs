//! Purchase orchestrator.
//!
//! Drives one purchase request through the state machine:
//! Init → Gate → loop { AcceptCookies → [EnterPromoCode] → ResolveSection →
//! NavigateSection → BuildCart → Authenticate } until success, a policy
//! abort or cancellation. Stage failures never leave the loop as errors.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::status::{StatusEvent, StatusReporter};
use crate::storefront::StorefrontProfile;
use crate::surface::AutomationSurface;

use super::cart::CartBuilder;
use super::config::OrchestratorConfig;
use super::gate::{GateOutcome, ScheduleGate};
use super::login::Authenticator;
use super::navigator::CategoryNavigator;
use super::promo::PromoCodeStep;
use super::resolver::SectionResolver;
use super::types::{
    AttemptOutcome, PurchaseError, PurchaseReport, PurchaseRequest, PurchaseState, SessionState,
    StageFailure,
};

/// Sequences the purchase stages against one private automation surface.
pub struct PurchaseOrchestrator {
    config: OrchestratorConfig,
    profile: StorefrontProfile,
    surface: Arc<dyn AutomationSurface>,
    reporter: Arc<dyn StatusReporter>,
}

impl PurchaseOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        profile: StorefrontProfile,
        surface: Arc<dyn AutomationSurface>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            config,
            profile,
            surface,
            reporter,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run until success, abort or cancellation.
    ///
    /// Only a malformed request, a cancellation and an abort chosen by the
    /// retry classification are returned as errors.
    pub async fn run(
        &self,
        request: &PurchaseRequest,
        cancel: CancellationToken,
    ) -> Result<PurchaseReport, PurchaseError> {
        request.validate()?;

        let mut session = SessionState::new();
        self.reporter.report(StatusEvent::RunStarted {
            categories: request.categories.clone(),
            guest_count: request.guest_count,
        });

        self.load_entry(&mut session, request).await;

        session.state = PurchaseState::Gate;
        if let Some(until) = request.scheduled_start {
            if let Some(remaining) = ScheduleGate::remaining(Some(until), Utc::now()) {
                self.reporter.report(StatusEvent::ScheduledWait {
                    until,
                    wait_ms: remaining.as_millis() as u64,
                });
            }
        }
        match ScheduleGate::wait(request.scheduled_start, &cancel).await {
            GateOutcome::Immediate => {}
            GateOutcome::Waited => {
                // The page loaded before the wait shows outdated inventory.
                session.entry_loaded = false;
                if let Some(until) = request.scheduled_start {
                    self.reporter.report(StatusEvent::ScheduledStart { until });
                }
            }
            GateOutcome::Cancelled => return Err(self.cancelled(&session)),
        }

        let mut retries = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(&session));
            }

            session.begin_iteration();
            let attempt = session.iteration;
            self.reporter.report(StatusEvent::AttemptStarted { attempt });
            let started = Instant::now();

            let outcome = self.run_attempt(&mut session, request).await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                AttemptOutcome::Success { category, location } => {
                    record_attempt("success", elapsed);
                    metrics::PURCHASES_TOTAL
                        .with_label_values(&["succeeded"])
                        .inc();
                    session.state = PurchaseState::Success;
                    self.reporter.report(StatusEvent::Succeeded {
                        attempts: attempt,
                        category: category.clone(),
                        location: location.clone(),
                    });
                    return Ok(PurchaseReport {
                        attempts: attempt,
                        category,
                        location,
                        completed_at: Utc::now(),
                    });
                }
                AttemptOutcome::Retry(failure) => {
                    record_attempt("retry", elapsed);
                    session.record_failure(&failure);
                    session.state = PurchaseState::Retry;

                    let delay = self.config.backoff.delay_for_retry(retries);
                    retries = retries.saturating_add(1);
                    self.reporter.report(StatusEvent::Retry {
                        attempt,
                        failure,
                        delay_ms: delay.as_millis() as u64,
                    });

                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(self.cancelled(&session)),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                AttemptOutcome::Abort(failure) => {
                    record_attempt("abort", elapsed);
                    metrics::PURCHASES_TOTAL.with_label_values(&["aborted"]).inc();
                    session.record_failure(&failure);
                    session.state = PurchaseState::Abort;
                    self.reporter.report(StatusEvent::Aborted {
                        attempts: attempt,
                        failure: failure.clone(),
                    });
                    return Err(PurchaseError::Aborted {
                        attempts: attempt,
                        failure,
                    });
                }
            }
        }
    }

    /// One pass through the loop, from cookie acceptance to login.
    ///
    /// The caller is expected to have called [`SessionState::begin_iteration`].
    pub async fn run_attempt(
        &self,
        session: &mut SessionState,
        request: &PurchaseRequest,
    ) -> AttemptOutcome {
        let surface = self.surface.as_ref();
        let profile = &self.profile;
        let config = &self.config;

        if !session.entry_loaded {
            self.load_entry(session, request).await;
        }

        self.enter(session, PurchaseState::AcceptCookies);
        self.accept_cookies(session.iteration).await;

        if let Some(code) = &request.promo_code {
            self.enter(session, PurchaseState::EnterPromoCode);
            if let Err(failure) = PromoCodeStep::new(surface, profile, config).apply(code).await {
                return self.fail(failure);
            }
        }

        self.enter(session, PurchaseState::ResolveSection);
        let category = match SectionResolver::new(surface, profile, config)
            .resolve(&request.categories)
            .await
        {
            Ok(category) => category,
            Err(failure) => return self.fail(failure),
        };
        session.set_target(&category);
        self.reporter.report(StatusEvent::CategoryResolved {
            attempt: session.iteration,
            category: category.clone(),
        });

        self.enter(session, PurchaseState::NavigateSection);
        if let Err(failure) = CategoryNavigator::new(surface, profile, config)
            .navigate(&category)
            .await
        {
            return self.fail(failure);
        }

        self.enter(session, PurchaseState::BuildCart);
        if let Err(failure) = CartBuilder::new(surface, profile, config)
            .build(&category, request.guest_count, request.companion)
            .await
        {
            return self.fail(failure);
        }

        self.enter(session, PurchaseState::Authenticate);
        match Authenticator::new(surface, profile, config)
            .login(&request.credentials, &request.entry_url)
            .await
        {
            Ok(location) => AttemptOutcome::Success { category, location },
            Err(failure) => self.fail(failure),
        }
    }

    fn enter(&self, session: &mut SessionState, stage: PurchaseState) {
        session.state = stage;
        self.reporter.report(StatusEvent::StageEntered {
            attempt: session.iteration,
            stage,
        });
    }

    fn fail(&self, failure: StageFailure) -> AttemptOutcome {
        debug!("{}", failure);
        metrics::STAGE_FAILURES
            .with_label_values(&[failure.stage.as_str(), failure.kind.as_str()])
            .inc();
        self.config.retry_classification.classify(failure)
    }

    /// Best-effort: a missing banner never fails the iteration.
    async fn accept_cookies(&self, attempt: u32) {
        let accepted = match self
            .surface
            .wait_clickable(&self.profile.cookie_accept, self.config.short_timeout())
            .await
        {
            Ok(button) => self.surface.click(&button).await,
            Err(e) => Err(e),
        };

        match accepted {
            Ok(()) => self.reporter.report(StatusEvent::CookiesAccepted { attempt }),
            Err(e) => {
                metrics::COOKIE_BANNER_SKIPPED.inc();
                self.reporter.report(StatusEvent::CookiesSkipped {
                    attempt,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn load_entry(&self, session: &mut SessionState, request: &PurchaseRequest) {
        match self.surface.navigate(&request.entry_url).await {
            Ok(()) => {
                info!("Loaded {}", request.entry_url);
                session.entry_loaded = true;
            }
            Err(e) => warn!("Failed to load {}: {}", request.entry_url, e),
        }
    }

    fn cancelled(&self, session: &SessionState) -> PurchaseError {
        metrics::PURCHASES_TOTAL
            .with_label_values(&["cancelled"])
            .inc();
        self.reporter.report(StatusEvent::Cancelled {
            attempts: session.iteration,
        });
        PurchaseError::Cancelled {
            attempts: session.iteration,
        }
    }
}

fn record_attempt(outcome: &str, elapsed_secs: f64) {
    metrics::ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    metrics::ATTEMPT_DURATION
        .with_label_values(&[outcome])
        .observe(elapsed_secs);
}
