//! Hosted purchase jobs.
//!
//! Each job owns a private automation surface, orchestrator and cancellation
//! token. Status events flow through a [`ChannelReporter`] into a pump task
//! that keeps a bounded per-job history and forwards them to WebSocket
//! clients.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use turnstile_core::{
    ChannelReporter, FanoutReporter, OrchestratorConfig, PurchaseError, PurchaseOrchestrator,
    PurchaseRequest, StatusEnvelope, StatusEvent, StatusReporter, StorefrontProfile,
    SurfaceFactory, TracingReporter,
};

use crate::api::WsBroadcaster;
use crate::metrics::{ACTIVE_JOBS, JOBS_REJECTED_TOTAL, JOBS_SUBMITTED_TOTAL};

/// Status events buffered between a job's orchestrator and its pump.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of a hosted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        *self != Self::Running
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from job submission and control.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Invalid(String),

    #[error("too many active purchase jobs (limit {limit})")]
    AtCapacity { limit: usize },

    #[error("purchase job not found: {0}")]
    NotFound(String),

    #[error("purchase job {id} already {status}")]
    AlreadyFinished { id: String, status: JobStatus },
}

/// Snapshot of a job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub categories: Vec<String>,
    pub guest_count: u32,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<StatusEnvelope>,
}

struct JobRecord {
    status: JobStatus,
    categories: Vec<String>,
    guest_count: u32,
    attempts: u32,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    category: Option<String>,
    location: Option<String>,
    error: Option<String>,
    events: VecDeque<StatusEnvelope>,
    cancel: CancellationToken,
}

impl JobRecord {
    fn view(&self, id: &str, with_events: bool) -> JobView {
        JobView {
            id: id.to_string(),
            status: self.status,
            categories: self.categories.clone(),
            guest_count: self.guest_count,
            attempts: self.attempts,
            created_at: self.created_at,
            finished_at: self.finished_at,
            category: self.category.clone(),
            location: self.location.clone(),
            error: self.error.clone(),
            events: if with_events {
                self.events.iter().cloned().collect()
            } else {
                Vec::new()
            },
        }
    }
}

type JobMap = Arc<Mutex<HashMap<String, JobRecord>>>;

fn lock(jobs: &JobMap) -> MutexGuard<'_, HashMap<String, JobRecord>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settings shared by every job of a registry.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub orchestrator: OrchestratorConfig,
    pub profile: StorefrontProfile,
    pub max_concurrent: usize,
    pub event_history: usize,
    /// Finished jobs retained before the oldest are evicted.
    pub max_finished: usize,
    /// Leave the surface open after a successful purchase.
    pub keep_open_on_success: bool,
}

/// Registry of hosted purchase jobs.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: JobMap,
    factory: Arc<dyn SurfaceFactory>,
    settings: Arc<JobSettings>,
    broadcaster: WsBroadcaster,
}

/// A freshly submitted job and the handle resolving to its final view.
pub struct SubmittedJob {
    pub view: JobView,
    pub handle: JoinHandle<JobView>,
}

impl JobRegistry {
    pub fn new(
        factory: Arc<dyn SurfaceFactory>,
        settings: JobSettings,
        broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            factory,
            settings: Arc::new(settings),
            broadcaster,
        }
    }

    /// Validate `request`, register a job and spawn it.
    pub fn submit(&self, request: PurchaseRequest) -> Result<SubmittedJob, JobError> {
        request.validate().map_err(|e| match e {
            PurchaseError::Validation(msg) => JobError::Invalid(msg),
            other => JobError::Invalid(other.to_string()),
        })?;

        let id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let view = {
            let mut jobs = lock(&self.jobs);
            let running = jobs.values().filter(|j| !j.status.is_finished()).count();
            if running >= self.settings.max_concurrent {
                JOBS_REJECTED_TOTAL.inc();
                return Err(JobError::AtCapacity {
                    limit: self.settings.max_concurrent,
                });
            }

            let record = JobRecord {
                status: JobStatus::Running,
                categories: request.categories.clone(),
                guest_count: request.guest_count,
                attempts: 0,
                created_at: Utc::now(),
                finished_at: None,
                category: None,
                location: None,
                error: None,
                events: VecDeque::new(),
                cancel: cancel.clone(),
            };
            let view = record.view(&id, false);
            jobs.insert(id.clone(), record);
            view
        };

        JOBS_SUBMITTED_TOTAL.inc();
        ACTIVE_JOBS.inc();
        info!(job_id = %id, categories = ?request.categories, "Purchase job submitted");
        self.broadcaster.job_state(&id, JobStatus::Running, 0);

        let registry = self.clone();
        let job_id = id.clone();
        let handle = tokio::spawn(async move { registry.execute(job_id, request, cancel).await });

        Ok(SubmittedJob { view, handle })
    }

    async fn execute(
        &self,
        id: String,
        request: PurchaseRequest,
        cancel: CancellationToken,
    ) -> JobView {
        let (channel, rx) = ChannelReporter::channel(EVENT_CHANNEL_CAPACITY);
        let pump = tokio::spawn(pump_events(
            id.clone(),
            rx,
            self.jobs.clone(),
            self.settings.event_history,
            self.broadcaster.clone(),
        ));

        let outcome = self.drive(&id, &request, cancel, channel).await;

        // The orchestrator and its reporter are gone; drain what is left.
        if let Err(e) = pump.await {
            warn!(job_id = %id, "Event pump ended abnormally: {}", e);
        }
        self.finish(&id, outcome)
    }

    async fn drive(
        &self,
        id: &str,
        request: &PurchaseRequest,
        cancel: CancellationToken,
        channel: ChannelReporter,
    ) -> Result<turnstile_core::PurchaseReport, PurchaseError> {
        let surface = self.factory.create().await?;
        let surface: Arc<dyn turnstile_core::AutomationSurface> = Arc::from(surface);

        let reporter: Arc<dyn StatusReporter> = Arc::new(
            FanoutReporter::new()
                .with(Arc::new(TracingReporter::labeled(id)))
                .with(Arc::new(channel)),
        );
        let orchestrator = PurchaseOrchestrator::new(
            self.settings.orchestrator.clone(),
            self.settings.profile.clone(),
            Arc::clone(&surface),
            reporter,
        );

        let result = orchestrator.run(request, cancel).await;
        drop(orchestrator);

        if result.is_ok() && self.settings.keep_open_on_success {
            info!(job_id = %id, "Leaving browser session open for payment");
        } else if let Err(e) = surface.close().await {
            warn!(job_id = %id, "Failed to close automation surface: {}", e);
        }
        result
    }

    fn finish(
        &self,
        id: &str,
        outcome: Result<turnstile_core::PurchaseReport, PurchaseError>,
    ) -> JobView {
        ACTIVE_JOBS.dec();
        let mut jobs = lock(&self.jobs);
        let Some(record) = jobs.get_mut(id) else {
            error!(job_id = %id, "Finished job vanished from the registry");
            return JobView {
                id: id.to_string(),
                status: JobStatus::Failed,
                categories: Vec::new(),
                guest_count: 0,
                attempts: 0,
                created_at: Utc::now(),
                finished_at: Some(Utc::now()),
                category: None,
                location: None,
                error: Some("job record missing".to_string()),
                events: Vec::new(),
            };
        };

        match outcome {
            Ok(report) => {
                record.status = JobStatus::Succeeded;
                record.attempts = report.attempts;
                record.category = Some(report.category);
                record.location = Some(report.location);
            }
            Err(PurchaseError::Cancelled { attempts }) => {
                record.status = JobStatus::Cancelled;
                record.attempts = attempts;
            }
            Err(e) => {
                if let PurchaseError::Aborted { attempts, .. } = &e {
                    record.attempts = *attempts;
                }
                record.status = JobStatus::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.finished_at = Some(Utc::now());

        info!(job_id = %id, status = %record.status, attempts = record.attempts, "Purchase job finished");
        self.broadcaster
            .job_state(id, record.status, record.attempts);
        let view = record.view(id, true);

        evict_finished(&mut jobs, self.settings.max_finished);
        view
    }

    /// Request cancellation of a running job.
    pub fn cancel(&self, id: &str) -> Result<JobView, JobError> {
        let jobs = lock(&self.jobs);
        let record = jobs
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if record.status.is_finished() {
            return Err(JobError::AlreadyFinished {
                id: id.to_string(),
                status: record.status,
            });
        }
        record.cancel.cancel();
        info!(job_id = %id, "Purchase job cancellation requested");
        Ok(record.view(id, false))
    }

    /// Cancel every running job. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let jobs = lock(&self.jobs);
        let mut cancelled = 0;
        for record in jobs.values().filter(|j| !j.status.is_finished()) {
            record.cancel.cancel();
            cancelled += 1;
        }
        cancelled
    }

    pub fn get(&self, id: &str) -> Option<JobView> {
        lock(&self.jobs).get(id).map(|record| record.view(id, true))
    }

    /// All jobs, oldest first, without their event history.
    pub fn list(&self) -> Vec<JobView> {
        let mut views: Vec<JobView> = lock(&self.jobs)
            .iter()
            .map(|(id, record)| record.view(id, false))
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        views
    }

    pub fn active_count(&self) -> usize {
        lock(&self.jobs)
            .values()
            .filter(|j| !j.status.is_finished())
            .count()
    }
}

/// Drop the oldest finished jobs beyond `keep`. Running jobs are never evicted.
fn evict_finished(jobs: &mut HashMap<String, JobRecord>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = jobs
        .iter()
        .filter_map(|(id, record)| record.finished_at.map(|at| (at, id.clone())))
        .collect();
    if finished.len() <= keep {
        return;
    }

    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
        debug!(job_id = %id, "Evicted finished purchase job");
    }
}

/// Move a job's status events into its history and out to WebSocket clients.
async fn pump_events(
    id: String,
    mut rx: mpsc::Receiver<StatusEnvelope>,
    jobs: JobMap,
    history: usize,
    broadcaster: WsBroadcaster,
) {
    while let Some(envelope) = rx.recv().await {
        {
            let mut jobs = lock(&jobs);
            if let Some(record) = jobs.get_mut(&id) {
                if let StatusEvent::AttemptStarted { attempt } = envelope.event {
                    record.attempts = attempt;
                }
                record.events.push_back(envelope.clone());
                while record.events.len() > history {
                    record.events.pop_front();
                }
            }
        }
        broadcaster.purchase_event(&id, &envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use turnstile_core::testing::{fixtures, MockSurfaceFactory, StorefrontScript};
    use turnstile_core::{BackoffPolicy, SurfaceError};

    fn settings(max_concurrent: usize) -> JobSettings {
        JobSettings {
            orchestrator: OrchestratorConfig {
                reload_settle_ms: 0,
                backoff: BackoffPolicy::Fixed { delay_ms: 10 },
                ..Default::default()
            },
            profile: StorefrontProfile::default(),
            max_concurrent,
            event_history: 5,
            max_finished: 100,
            keep_open_on_success: false,
        }
    }

    fn registry(factory: MockSurfaceFactory, max_concurrent: usize) -> JobRegistry {
        JobRegistry::new(
            Arc::new(factory),
            settings(max_concurrent),
            WsBroadcaster::default(),
        )
    }

    fn buyable() -> StorefrontScript {
        StorefrontScript::new()
            .entry("Floor R$ 150")
            .login_redirect(fixtures::PAYMENT_URL)
    }

    #[tokio::test]
    async fn test_successful_job() {
        let factory = MockSurfaceFactory::new(buyable());
        let jobs = registry(factory.clone(), 2);

        let submitted = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        assert_eq!(submitted.view.status, JobStatus::Running);

        let view = submitted.handle.await.unwrap();
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.category.as_deref(), Some("Floor"));
        assert_eq!(view.location.as_deref(), Some(fixtures::PAYMENT_URL));
        assert_eq!(view.attempts, 1);

        // Bounded history keeps the newest events, ending with success.
        assert_eq!(view.events.len(), 5);
        assert!(matches!(
            view.events.last().unwrap().event,
            StatusEvent::Succeeded { .. }
        ));

        let created = factory.created().await;
        assert_eq!(created.len(), 1);
        assert!(created[0].is_closed().await);
        assert_eq!(jobs.active_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let jobs = registry(MockSurfaceFactory::new(buyable()), 2);
        let mut request = fixtures::purchase_request(&["Floor"]);
        request.guest_count = 0;

        let err = jobs.submit(request).err().unwrap();
        assert!(matches!(err, JobError::Invalid(msg) if msg.contains("guest count")));
        assert!(jobs.list().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let factory = MockSurfaceFactory::new(StorefrontScript::new().entry("Floor ESGOTADO"));
        let jobs = registry(factory, 1);

        let first = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        let err = jobs
            .submit(fixtures::purchase_request(&["Floor"]))
            .err()
            .unwrap();
        assert!(matches!(err, JobError::AtCapacity { limit: 1 }));

        jobs.cancel(&first.view.id).unwrap();
        let view = first.handle.await.unwrap();
        assert_eq!(view.status, JobStatus::Cancelled);

        // The slot is free again.
        let second = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        jobs.cancel_all();
        second.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_finished_job_conflicts() {
        let jobs = registry(MockSurfaceFactory::new(buyable()), 2);
        let submitted = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        let id = submitted.view.id.clone();
        submitted.handle.await.unwrap();

        let err = jobs.cancel(&id).err().unwrap();
        assert!(matches!(
            err,
            JobError::AlreadyFinished {
                status: JobStatus::Succeeded,
                ..
            }
        ));
        assert!(matches!(
            jobs.cancel("missing").err().unwrap(),
            JobError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_surface_creation_failure_fails_job() {
        let factory =
            MockSurfaceFactory::failing(SurfaceError::Transport("driver down".to_string()));
        let jobs = registry(factory, 2);

        let submitted = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        let view = tokio::time::timeout(Duration::from_secs(5), submitted.handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.unwrap().contains("driver down"));
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_are_evicted() {
        let jobs = JobRegistry::new(
            Arc::new(MockSurfaceFactory::new(buyable())),
            JobSettings {
                max_finished: 3,
                ..settings(1)
            },
            WsBroadcaster::default(),
        );

        let mut ids = Vec::new();
        for _ in 0..8 {
            let submitted = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
            ids.push(submitted.view.id.clone());
            let view = submitted.handle.await.unwrap();
            // The finishing job's own view is complete even when it triggers eviction.
            assert_eq!(view.status, JobStatus::Succeeded);
        }

        let kept: Vec<String> = jobs.list().into_iter().map(|v| v.id).collect();
        assert_eq!(kept, ids[5..].to_vec());
        assert!(jobs.get(&ids[0]).is_none());
        assert!(jobs.get(&ids[7]).is_some());
    }

    #[tokio::test]
    async fn test_running_jobs_survive_eviction() {
        let sold_out = MockSurfaceFactory::new(StorefrontScript::new().entry("Floor ESGOTADO"));
        let jobs = JobRegistry::new(
            Arc::new(sold_out),
            JobSettings {
                max_finished: 0,
                ..settings(2)
            },
            WsBroadcaster::default(),
        );

        let running = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        let finished = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        jobs.cancel(&finished.view.id).unwrap();
        let view = finished.handle.await.unwrap();
        assert_eq!(view.status, JobStatus::Cancelled);

        assert!(jobs.get(&finished.view.id).is_none());
        assert!(jobs.get(&running.view.id).is_some());

        jobs.cancel_all();
        running.handle.await.unwrap();
        assert!(jobs.list().is_empty());
    }

    #[tokio::test]
    async fn test_job_state_is_broadcast() {
        let broadcaster = WsBroadcaster::new(64);
        let mut rx = broadcaster.subscribe();
        let jobs = JobRegistry::new(
            Arc::new(MockSurfaceFactory::new(buyable())),
            settings(2),
            broadcaster,
        );

        let submitted = jobs.submit(fixtures::purchase_request(&["Floor"])).unwrap();
        submitted.handle.await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            crate::api::WsMessage::JobState {
                status: JobStatus::Running,
                ..
            }
        ));

        let mut last = first;
        while let Ok(msg) = rx.try_recv() {
            last = msg;
        }
        assert!(matches!(
            last,
            crate::api::WsMessage::JobState {
                status: JobStatus::Succeeded,
                attempts: 1,
                ..
            }
        ));
    }
}
