//! Recurring background backup
//!
//! `BackupScheduler` owns the scheduling policy and talks to a narrow
//! `JobScheduler` interface (register, cancel by tag, observe by tag).
//! `TokioJobScheduler` implements that interface in-process with tokio
//! timers, device constraint checks and exponential backoff.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transfer::BackupTransferService;
use crate::error::{BudgetError, BudgetResult};

/// Tag identifying the recurring backup job
pub const BACKUP_JOB_TAG: &str = "backuptag";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest delay the backoff curve can produce
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

/// How often unmet device constraints are checked again
pub const DEFAULT_CONSTRAINT_RECHECK: Duration = Duration::from_secs(15 * 60);

/// Device state a job may require before running
pub trait DeviceConditions: Send + Sync {
    fn is_charging(&self) -> bool;

    fn has_network(&self) -> bool;
}

/// Conditions that must hold before a run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobConstraints {
    pub requires_charging: bool,
    pub requires_network: bool,
}

impl JobConstraints {
    pub fn satisfied_by(&self, device: &dyn DeviceConditions) -> bool {
        (!self.requires_charging || device.is_charging())
            && (!self.requires_network || device.has_network())
    }
}

/// Delay curve applied between attempts of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// `initial * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`]
    Exponential { initial: Duration },
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential { initial } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(MAX_BACKOFF)
            }
        }
    }
}

/// Registration parameters of a recurring job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub tag: String,
    pub period: Duration,
    pub initial_delay: Duration,
    pub constraints: JobConstraints,
    pub backoff: BackoffPolicy,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            tag: BACKUP_JOB_TAG.to_string(),
            period: 7 * DAY,
            initial_delay: DAY,
            constraints: JobConstraints {
                requires_charging: true,
                requires_network: true,
            },
            backoff: BackoffPolicy::Exponential {
                initial: Duration::from_secs(5 * 60),
            },
        }
    }
}

impl SchedulePolicy {
    fn validate(&self) -> BudgetResult<()> {
        if self.tag.is_empty() {
            return Err(BudgetError::Schedule("job tag must not be empty".into()));
        }
        if self.period.is_zero() {
            return Err(BudgetError::Schedule("job period must be positive".into()));
        }
        Ok(())
    }
}

/// What a single run asks of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Try again after the backoff delay
    Retry,
    /// Give up until the next period
    Failure,
}

impl JobOutcome {
    pub fn from_result<T>(result: &BudgetResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) if e.is_retryable() => Self::Retry,
            Err(_) => Self::Failure,
        }
    }
}

/// Lifecycle state of a recurring job
///
/// A job reports the outcome of its last run until the next run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Enqueued,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        *self != Self::Cancelled
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enqueued => "queued",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Status record of one registered job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub tag: String,
    pub state: JobState,
    /// Attempts made in the current period
    pub run_attempt: u32,
}

/// Body of a recurring job
#[async_trait]
pub trait RecurringTask: Send + Sync {
    async fn run(&self) -> JobOutcome;
}

/// Recurring job primitive
pub trait JobScheduler: Send + Sync {
    /// Register a recurring job and start its timer
    fn register(&self, policy: &SchedulePolicy, task: Arc<dyn RecurringTask>)
        -> BudgetResult<Uuid>;

    /// Cancel every active job under `tag`; no-op when there are none
    fn cancel_by_tag(&self, tag: &str);

    /// Status of the jobs under `tag`, current value first and every change after
    fn observe_status_by_tag(&self, tag: &str) -> watch::Receiver<Vec<JobInfo>>;
}

/// Recurring task that runs a cloud backup
pub struct BackupTask {
    service: Arc<BackupTransferService>,
}

impl BackupTask {
    pub fn new(service: Arc<BackupTransferService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RecurringTask for BackupTask {
    async fn run(&self) -> JobOutcome {
        let result = self.service.backup().await;
        let outcome = JobOutcome::from_result(&result);
        debug!(?outcome, "scheduled backup finished");
        outcome
    }
}

/// Keeps exactly one recurring backup registered under [`BACKUP_JOB_TAG`]
pub struct BackupScheduler {
    jobs: Arc<dyn JobScheduler>,
    task: Arc<dyn RecurringTask>,
    policy: SchedulePolicy,
}

impl BackupScheduler {
    pub fn new(jobs: Arc<dyn JobScheduler>, service: Arc<BackupTransferService>) -> Self {
        Self::with_task(jobs, Arc::new(BackupTask::new(service)))
    }

    pub fn with_task(jobs: Arc<dyn JobScheduler>, task: Arc<dyn RecurringTask>) -> Self {
        Self {
            jobs,
            task,
            policy: SchedulePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Replace any existing recurring backup with a fresh registration
    pub fn schedule(&self) -> BudgetResult<Uuid> {
        self.jobs.cancel_by_tag(&self.policy.tag);
        let id = self.jobs.register(&self.policy, Arc::clone(&self.task))?;
        info!(job = %id, tag = %self.policy.tag, "recurring backup scheduled");
        Ok(id)
    }

    pub fn unschedule(&self) {
        self.jobs.cancel_by_tag(&self.policy.tag);
        info!(tag = %self.policy.tag, "recurring backup unscheduled");
    }

    pub fn observe_job_status(&self) -> watch::Receiver<Vec<JobInfo>> {
        self.jobs.observe_status_by_tag(&self.policy.tag)
    }

    /// Whether a scheduled run is executing right now
    pub fn is_running(&self) -> bool {
        self.observe_job_status()
            .borrow()
            .iter()
            .any(|job| job.state == JobState::Running)
    }
}

struct JobEntry {
    info: JobInfo,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct Registry {
    jobs: Vec<JobEntry>,
    channels: HashMap<String, watch::Sender<Vec<JobInfo>>>,
}

impl Registry {
    fn publish(&mut self, tag: &str) {
        let infos: Vec<JobInfo> = self
            .jobs
            .iter()
            .filter(|job| job.info.tag == tag)
            .map(|job| job.info.clone())
            .collect();
        self.channel(tag).send_replace(infos);
    }

    fn channel(&mut self, tag: &str) -> &watch::Sender<Vec<JobInfo>> {
        self.channels
            .entry(tag.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
    }
}

struct SchedulerInner {
    device: Arc<dyn DeviceConditions>,
    recheck_interval: Duration,
    registry: Mutex<Registry>,
}

impl SchedulerInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, id: Uuid, state: JobState, run_attempt: u32) {
        let mut registry = self.registry();
        let Some(job) = registry.jobs.iter_mut().find(|job| job.info.id == id) else {
            return;
        };
        if !job.info.state.is_active() {
            return;
        }
        job.info.state = state;
        job.info.run_attempt = run_attempt;
        let tag = job.info.tag.clone();
        registry.publish(&tag);
    }

    async fn wait_for_constraints(&self, constraints: &JobConstraints) {
        while !constraints.satisfied_by(self.device.as_ref()) {
            debug!("device constraints unmet, deferring run");
            sleep(self.recheck_interval).await;
        }
    }
}

/// In-process recurring job scheduler driven by tokio timers
///
/// Dropping the scheduler aborts every job it started.
pub struct TokioJobScheduler {
    inner: Arc<SchedulerInner>,
}

impl TokioJobScheduler {
    pub fn new(device: Arc<dyn DeviceConditions>) -> Self {
        Self::with_recheck_interval(device, DEFAULT_CONSTRAINT_RECHECK)
    }

    pub fn with_recheck_interval(device: Arc<dyn DeviceConditions>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                device,
                recheck_interval: interval,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Jobs under `tag` that have not been cancelled
    pub fn active_jobs(&self, tag: &str) -> usize {
        self.inner
            .registry()
            .jobs
            .iter()
            .filter(|job| job.info.tag == tag && job.info.state.is_active())
            .count()
    }
}

impl JobScheduler for TokioJobScheduler {
    fn register(
        &self,
        policy: &SchedulePolicy,
        task: Arc<dyn RecurringTask>,
    ) -> BudgetResult<Uuid> {
        policy.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| BudgetError::Schedule(format!("no async runtime: {}", e)))?;

        let id = Uuid::new_v4();
        let mut registry = self.inner.registry();
        registry
            .jobs
            .retain(|job| job.info.tag != policy.tag || job.info.state.is_active());

        let handle = runtime.spawn(run_job(
            Arc::clone(&self.inner),
            id,
            policy.clone(),
            task,
        ));
        registry.jobs.push(JobEntry {
            info: JobInfo {
                id,
                tag: policy.tag.clone(),
                state: JobState::Enqueued,
                run_attempt: 0,
            },
            abort: Some(handle.abort_handle()),
        });
        registry.publish(&policy.tag);
        debug!(job = %id, tag = %policy.tag, "job registered");
        Ok(id)
    }

    fn cancel_by_tag(&self, tag: &str) {
        let mut registry = self.inner.registry();
        let mut cancelled = 0;
        for job in registry
            .jobs
            .iter_mut()
            .filter(|job| job.info.tag == tag && job.info.state.is_active())
        {
            if let Some(abort) = job.abort.take() {
                abort.abort();
            }
            job.info.state = JobState::Cancelled;
            cancelled += 1;
        }
        if cancelled > 0 {
            registry.publish(tag);
            debug!(tag, cancelled, "jobs cancelled");
        }
    }

    fn observe_status_by_tag(&self, tag: &str) -> watch::Receiver<Vec<JobInfo>> {
        self.inner.registry().channel(tag).subscribe()
    }
}

impl Drop for TokioJobScheduler {
    fn drop(&mut self) {
        for job in self.inner.registry().jobs.iter_mut() {
            if let Some(abort) = job.abort.take() {
                abort.abort();
            }
        }
    }
}

async fn run_job(
    inner: Arc<SchedulerInner>,
    id: Uuid,
    policy: SchedulePolicy,
    task: Arc<dyn RecurringTask>,
) {
    let mut period_start = Instant::now() + policy.initial_delay;

    loop {
        sleep_until(period_start).await;
        let period_end = period_start + policy.period;
        let mut attempt = 0;

        loop {
            inner.wait_for_constraints(&policy.constraints).await;
            attempt += 1;
            inner.update(id, JobState::Running, attempt);

            match task.run().await {
                JobOutcome::Success => {
                    inner.update(id, JobState::Succeeded, attempt);
                    break;
                }
                JobOutcome::Failure => {
                    inner.update(id, JobState::Failed, attempt);
                    break;
                }
                JobOutcome::Retry => {
                    let delay = policy.backoff.delay_for_attempt(attempt);
                    if Instant::now() + delay >= period_end {
                        warn!(job = %id, attempt, "retries exhausted for this period");
                        inner.update(id, JobState::Failed, attempt);
                        break;
                    }
                    debug!(job = %id, attempt, ?delay, "run will be retried");
                    inner.update(id, JobState::Retrying, attempt);
                    sleep(delay).await;
                }
            }
        }

        period_start = period_end;
        let now = Instant::now();
        while period_start <= now {
            period_start += policy.period;
        }
    }
}
