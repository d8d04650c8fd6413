//! The cron service: a 1-second tick loop over `jobs.json`.
//!
//! Every tick re-reads the jobs file (the disk copy is authoritative, so
//! external writers become visible within a second), fires jobs whose
//! schedule matches the current minute, and enforces at-most-one in-flight
//! execution per job id. Job results are published on the bus when the job
//! carries a `reply_to`. Shutdown is graceful: in-flight jobs are joined,
//! never cancelled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use talon_config::CronConfig;
use talon_core::bus::{MessageBus, OutboundMessage};
use talon_core::engine::AgentEngine;
use talon_core::error::CronError;
use talon_core::session::{SessionKey, split_reply_to};
use talon_telemetry::RuntimeMetrics;

use crate::expr::CronExpr;
use crate::job::{CronJob, load_jobs, migrate_legacy_files, save_jobs};

/// Long-running service that fires due cron jobs against the engine.
pub struct CronService {
    cron_dir: PathBuf,
    engine: Arc<dyn AgentEngine>,
    config: CronConfig,
    bus: Option<Arc<dyn MessageBus>>,
    metrics: Arc<RuntimeMetrics>,

    jobs: Arc<Mutex<Vec<CronJob>>>,
    executing: Arc<Mutex<HashSet<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,

    stopped: AtomicBool,
    stop_notify: Notify,
}

impl CronService {
    /// Create a service over `<workspace>/cron`.
    ///
    /// Runs the legacy-file migration and loads the current job list.
    pub fn new(
        cron_dir: impl Into<PathBuf>,
        engine: Arc<dyn AgentEngine>,
        config: CronConfig,
        bus: Option<Arc<dyn MessageBus>>,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        let cron_dir = cron_dir.into();
        migrate_legacy_files(&cron_dir);
        let jobs = load_jobs(&cron_dir);
        Self {
            cron_dir,
            engine,
            config,
            bus,
            metrics,
            jobs: Arc::new(Mutex::new(jobs)),
            executing: Arc::new(Mutex::new(HashSet::new())),
            tasks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    // --- CRUD ---

    /// Register a new job and persist it.
    pub fn add_job(
        &self,
        name: &str,
        schedule: &str,
        prompt: &str,
        reply_to: &str,
    ) -> Result<CronJob, CronError> {
        CronExpr::parse(schedule).map_err(|reason| CronError::InvalidSchedule {
            schedule: schedule.to_string(),
            reason,
        })?;
        if !reply_to.is_empty() && split_reply_to(reply_to).is_none() {
            return Err(CronError::InvalidReplyTo(reply_to.to_string()));
        }

        let job = CronJob::new(name, schedule, prompt, reply_to);
        info!(job_id = %job.id, name = %job.name, schedule = %job.schedule, "Adding cron job");

        let mut jobs = self.jobs.lock().unwrap();
        jobs.push(job.clone());
        save_jobs(&self.cron_dir, &jobs)?;
        Ok(job)
    }

    /// Remove a job by id. Returns true iff a job was removed.
    pub fn remove_job(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return false;
        }
        if let Err(e) = save_jobs(&self.cron_dir, &jobs) {
            warn!(job_id = %id, error = %e, "Failed to persist job removal");
        }
        true
    }

    pub fn list_jobs(&self) -> Vec<CronJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn get_job(&self, id: &str) -> Option<CronJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    // --- Tick loop ---

    /// Run the tick loop until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        info!(cron_dir = %self.cron_dir.display(), "Cron service started");
        while !self.stopped.load(Ordering::SeqCst) {
            self.check_and_run_due_jobs().await;
            tokio::select! {
                _ = self.stop_notify.notified() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
        info!("Cron service tick loop exited");
    }

    /// Signal the loop to exit, then join every in-flight job task.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        if !handles.is_empty() {
            info!(in_flight = handles.len(), "Waiting for cron jobs to finish");
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cron job task panicked");
            }
        }
    }

    /// One tick: reload jobs from disk and fire everything that is due.
    pub async fn check_and_run_due_jobs(&self) {
        // The disk copy wins over in-memory state on every tick.
        {
            let mut jobs = self.jobs.lock().unwrap();
            *jobs = load_jobs(&self.cron_dir);
        }

        let now = Utc::now();
        let due: Vec<CronJob> = {
            let jobs = self.jobs.lock().unwrap();
            jobs.iter()
                .filter(|job| {
                    if !job.enabled {
                        return false;
                    }
                    let expr = match CronExpr::parse(&job.schedule) {
                        Ok(expr) => expr,
                        Err(e) => {
                            warn!(job_id = %job.id, error = %e, "Invalid cron schedule, skipping");
                            return false;
                        }
                    };
                    expr.matches(&now) && !fired_this_minute(job, &now)
                })
                .cloned()
                .collect()
        };

        for job in due {
            {
                let mut executing = self.executing.lock().unwrap();
                if executing.contains(&job.id) {
                    debug!(job_id = %job.id, "Job still executing, skipping this tick");
                    continue;
                }
                executing.insert(job.id.clone());
            }

            info!(job_id = %job.id, name = %job.name, "Cron job triggered");
            let handle = tokio::spawn(run_job(
                job,
                self.engine.clone(),
                self.bus.clone(),
                self.jobs.clone(),
                self.executing.clone(),
                self.cron_dir.clone(),
                self.config.exec_timeout_minutes,
                self.metrics.clone(),
            ));
            self.tasks.lock().unwrap().push(handle);
        }

        // Drop handles of tasks that already finished.
        self.tasks.lock().unwrap().retain(|h| !h.is_finished());
    }
}

/// Whether the job already fired in the current wall-clock minute.
///
/// Compares the full date, not just the day number: a day-of-month schedule
/// like `0 9 15 * *` lands on the same day/hour/minute every month and must
/// still fire each time.
fn fired_this_minute(job: &CronJob, now: &chrono::DateTime<Utc>) -> bool {
    job.last_run.is_some_and(|last| {
        last.date_naive() == now.date_naive()
            && last.hour() == now.hour()
            && last.minute() == now.minute()
    })
}

/// One job execution: engine call under a deadline, persist `last_run`,
/// publish the result, release the execution lock.
#[allow(clippy::too_many_arguments)]
async fn run_job(
    job: CronJob,
    engine: Arc<dyn AgentEngine>,
    bus: Option<Arc<dyn MessageBus>>,
    jobs: Arc<Mutex<Vec<CronJob>>>,
    executing: Arc<Mutex<HashSet<String>>>,
    cron_dir: PathBuf,
    exec_timeout_minutes: u64,
    metrics: Arc<RuntimeMetrics>,
) {
    let session_key = if split_reply_to(&job.reply_to).is_some() {
        job.reply_to.clone()
    } else {
        SessionKey::for_cron_job(&job.id).0
    };

    metrics.cron_runs.incr();
    let deadline = Duration::from_secs(exec_timeout_minutes * 60);
    let outcome = tokio::time::timeout(
        deadline,
        engine.run(&job.prompt, &session_key, "default"),
    )
    .await;

    let text = match outcome {
        Ok(Ok(run)) => {
            info!(job_id = %job.id, iterations = run.iterations, "Cron job completed");
            run.response
        }
        Ok(Err(e)) => {
            metrics.cron_failures.incr();
            warn!(job_id = %job.id, error = %e, "Cron job failed");
            format!("Cron job '{}' failed: {e}", job.name)
        }
        Err(_) => {
            metrics.cron_failures.incr();
            warn!(job_id = %job.id, timeout_minutes = exec_timeout_minutes, "Cron job timed out");
            format!(
                "Cron job '{}' timed out after {exec_timeout_minutes}m",
                job.name
            )
        }
    };

    persist_last_run(&cron_dir, &jobs, &job.id);

    if let Some((channel, chat_id)) = split_reply_to(&job.reply_to)
        && let Some(bus) = &bus
        && !text.is_empty()
    {
        bus.publish_outbound(OutboundMessage {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            text,
        })
        .await;
        debug!(job_id = %job.id, reply_to = %job.reply_to, "Cron result published");
    }

    executing.lock().unwrap().remove(&job.id);
}

fn persist_last_run(cron_dir: &Path, jobs: &Arc<Mutex<Vec<CronJob>>>, job_id: &str) {
    let mut jobs = jobs.lock().unwrap();
    if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
        job.last_run = Some(Utc::now());
    }
    if let Err(e) = save_jobs(cron_dir, &jobs) {
        warn!(job_id = %job_id, error = %e, "Failed to persist last_run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use talon_core::engine::RunResult;
    use talon_core::error::EngineError;

    struct FakeEngine {
        response: String,
        delay: Option<Duration>,
        run_count: AtomicU32,
    }

    impl FakeEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                response: "done".into(),
                delay: None,
                run_count: AtomicU32::new(0),
            })
        }

        fn sleeping(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: "done".into(),
                delay: Some(delay),
                run_count: AtomicU32::new(0),
            })
        }

        fn runs(&self) -> u32 {
            self.run_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgentEngine for FakeEngine {
        async fn run(
            &self,
            _prompt: &str,
            _session_key: &str,
            _profile: &str,
        ) -> Result<RunResult, EngineError> {
            self.run_count.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(RunResult {
                response: self.response.clone(),
                iterations: 1,
                total_tokens: 100,
            })
        }
    }

    struct RecordingBus {
        messages: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageBus for RecordingBus {
        async fn publish_outbound(&self, msg: OutboundMessage) {
            self.messages.lock().unwrap().push(msg);
        }
    }

    fn service(dir: &Path, engine: Arc<FakeEngine>) -> CronService {
        CronService::new(
            dir,
            engine,
            CronConfig {
                enabled: true,
                exec_timeout_minutes: 1,
            },
            None,
            Arc::new(RuntimeMetrics::new()),
        )
    }

    fn write_external_job(dir: &Path, id: &str, schedule: &str) {
        let job = serde_json::json!([{
            "id": id,
            "name": "External Job",
            "schedule": schedule,
            "prompt": "run external task",
            "enabled": true,
            "last_run": null,
            "created_at": "2020-01-01T00:00:00+00:00",
            "reply_to": ""
        }]);
        std::fs::write(dir.join("jobs.json"), job.to_string()).unwrap();
    }

    // --- CRUD / persistence ---

    #[test]
    fn add_and_list_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), FakeEngine::new());

        let job = svc.add_job("Test Job", "*/5 * * * *", "do something", "").unwrap();
        assert!(job.id.starts_with("cron_"));
        assert_eq!(svc.list_jobs().len(), 1);

        let data = load_jobs(dir.path());
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].schedule, "*/5 * * * *");
    }

    #[test]
    fn add_job_rejects_invalid_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), FakeEngine::new());
        let err = svc.add_job("Bad", "not a cron", "x", "").unwrap_err();
        assert!(matches!(err, CronError::InvalidSchedule { .. }));
        assert!(svc.list_jobs().is_empty());
    }

    #[test]
    fn add_job_rejects_malformed_reply_to() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), FakeEngine::new());
        let err = svc.add_job("Bad", "* * * * *", "x", "bad_format").unwrap_err();
        assert!(matches!(err, CronError::InvalidReplyTo(_)));
    }

    #[test]
    fn remove_job() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), FakeEngine::new());
        let job = svc.add_job("Remove Me", "0 * * * *", "bye", "").unwrap();

        assert!(svc.remove_job(&job.id));
        assert!(svc.list_jobs().is_empty());
        assert!(load_jobs(dir.path()).is_empty());

        assert!(!svc.remove_job(&job.id));
        assert!(!svc.remove_job("cron_nonexistent"));
    }

    #[test]
    fn legacy_files_migrated_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("old1.json"),
            serde_json::json!({
                "id": "old1",
                "name": "Old",
                "cron": "0 * * * *",
                "command": "legacy prompt"
            })
            .to_string(),
        )
        .unwrap();

        let svc = service(dir.path(), FakeEngine::new());
        let jobs = svc.list_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "cron_old1");
        assert_eq!(jobs[0].prompt, "legacy prompt");
    }

    // --- External reload ---

    #[tokio::test]
    async fn check_reloads_jobs_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let svc = service(dir.path(), engine.clone());
        assert!(svc.list_jobs().is_empty());

        write_external_job(dir.path(), "cron_ext001", "0 12 * * *");

        svc.check_and_run_due_jobs().await;
        assert_eq!(svc.list_jobs().len(), 1);
        assert_eq!(svc.get_job("cron_ext001").unwrap().name, "External Job");
    }

    #[tokio::test]
    async fn due_job_fires_once_and_persists_last_run() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let svc = service(dir.path(), engine.clone());

        write_external_job(dir.path(), "cron_reload1", "* * * * *");

        svc.check_and_run_due_jobs().await;
        svc.stop().await;

        assert_eq!(engine.runs(), 1);
        let on_disk = load_jobs(dir.path());
        assert!(on_disk[0].last_run.is_some());
    }

    #[tokio::test]
    async fn disabled_job_does_not_fire() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let svc = service(dir.path(), engine.clone());

        let mut jobs = vec![CronJob::new("Off", "* * * * *", "x", "")];
        jobs[0].enabled = false;
        save_jobs(dir.path(), &jobs).unwrap();

        svc.check_and_run_due_jobs().await;
        svc.stop().await;
        assert_eq!(engine.runs(), 0);
    }

    #[tokio::test]
    async fn corrupt_jobs_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let svc = service(dir.path(), engine.clone());
        std::fs::write(dir.path().join("jobs.json"), "][ definitely not json").unwrap();

        svc.check_and_run_due_jobs().await;
        assert!(svc.list_jobs().is_empty());
        assert_eq!(engine.runs(), 0);
    }

    #[test]
    fn dom_restricted_schedule_fires_again_next_month() {
        let mut job = CronJob::new("Monthly report", "0 9 15 * *", "generate report", "");
        let jan = chrono::NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
        let feb = chrono::NaiveDate::from_ymd_opt(2026, 2, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
        let next_jan = chrono::NaiveDate::from_ymd_opt(2027, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();

        // The expression is due at 09:00 on the 15th of every month.
        let expr = CronExpr::parse(&job.schedule).unwrap();
        assert!(expr.matches(&jan));
        assert!(expr.matches(&feb));

        job.last_run = Some(jan);
        // Within the same minute the guard holds...
        assert!(fired_this_minute(&job, &jan));
        // ...but the same day/hour/minute a month or a year later is a
        // fresh firing.
        assert!(!fired_this_minute(&job, &feb));
        assert!(!fired_this_minute(&job, &next_jan));
    }

    #[tokio::test]
    async fn job_does_not_refire_within_the_same_minute() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let svc = service(dir.path(), engine.clone());

        // A job that already fired this minute stays quiet until the next one.
        let mut job = CronJob::new("Fast", "* * * * *", "x", "");
        job.last_run = Some(Utc::now());
        save_jobs(dir.path(), &[job]).unwrap();

        svc.check_and_run_due_jobs().await;
        svc.stop().await;
        assert_eq!(engine.runs(), 0);
    }

    // --- Locking ---

    #[tokio::test]
    async fn executing_job_is_not_fired_twice() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::sleeping(Duration::from_millis(500));
        let svc = service(dir.path(), engine.clone());

        write_external_job(dir.path(), "cron_slow", "* * * * *");

        // First tick fires the job.
        svc.check_and_run_due_jobs().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(svc.executing.lock().unwrap().contains("cron_slow"));

        // Second tick while the first run is still in flight must skip.
        svc.check_and_run_due_jobs().await;
        assert_eq!(engine.runs(), 1);

        // After completion the id is released.
        svc.stop().await;
        assert!(!svc.executing.lock().unwrap().contains("cron_slow"));
    }

    // --- Delivery ---

    #[tokio::test]
    async fn result_published_when_reply_to_set() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let bus = Arc::new(RecordingBus {
            messages: Mutex::new(Vec::new()),
        });
        let svc = CronService::new(
            dir.path(),
            engine.clone(),
            CronConfig {
                enabled: true,
                exec_timeout_minutes: 1,
            },
            Some(bus.clone()),
            Arc::new(RuntimeMetrics::new()),
        );

        let job = serde_json::json!([{
            "id": "cron_notify",
            "name": "Notify",
            "schedule": "* * * * *",
            "prompt": "ping",
            "enabled": true,
            "last_run": null,
            "created_at": "2020-01-01T00:00:00+00:00",
            "reply_to": "telegram:4242"
        }]);
        std::fs::write(dir.path().join("jobs.json"), job.to_string()).unwrap();

        svc.check_and_run_due_jobs().await;
        svc.stop().await;

        let messages = bus.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, "telegram");
        assert_eq!(messages[0].chat_id, "4242");
        assert_eq!(messages[0].text, "done");
    }

    #[tokio::test]
    async fn no_publish_without_reply_to() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let bus = Arc::new(RecordingBus {
            messages: Mutex::new(Vec::new()),
        });
        let svc = CronService::new(
            dir.path(),
            engine.clone(),
            CronConfig {
                enabled: true,
                exec_timeout_minutes: 1,
            },
            Some(bus.clone()),
            Arc::new(RuntimeMetrics::new()),
        );

        write_external_job(dir.path(), "cron_quiet", "* * * * *");

        svc.check_and_run_due_jobs().await;
        svc.stop().await;

        assert_eq!(engine.runs(), 1);
        assert!(bus.messages.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn job_timeout_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::sleeping(Duration::from_secs(120));
        let bus = Arc::new(RecordingBus {
            messages: Mutex::new(Vec::new()),
        });
        let metrics = Arc::new(RuntimeMetrics::new());
        let svc = CronService::new(
            dir.path(),
            engine.clone(),
            CronConfig {
                enabled: true,
                exec_timeout_minutes: 1,
            },
            Some(bus.clone()),
            metrics.clone(),
        );

        let job = serde_json::json!([{
            "id": "cron_hang",
            "name": "Hang",
            "schedule": "* * * * *",
            "prompt": "never returns",
            "enabled": true,
            "last_run": null,
            "created_at": "2020-01-01T00:00:00+00:00",
            "reply_to": "discord:chan1"
        }]);
        std::fs::write(dir.path().join("jobs.json"), job.to_string()).unwrap();

        svc.check_and_run_due_jobs().await;
        svc.stop().await;

        assert_eq!(metrics.cron_failures.get(), 1);
        let messages = bus.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("timed out"));
        // The lock is released on the timeout path too.
        assert!(!svc.executing.lock().unwrap().contains("cron_hang"));
    }
}
