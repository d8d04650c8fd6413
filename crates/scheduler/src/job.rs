//! Cron job model and `jobs.json` persistence.
//!
//! All jobs live in one JSON array at `<workspace>/cron/jobs.json`. Writes
//! are atomic (`.tmp` + rename); a missing or corrupt file reads as the
//! empty list so a bad write can never take the service down. Legacy
//! per-job files (`<id>.json` with `cron`/`command` fields) are migrated
//! into the unified list at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use talon_core::error::CronError;

/// A scheduled agent prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    /// Unique id, `cron_` + 8 hex chars.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// 5-field cron expression.
    pub schedule: String,

    /// The prompt sent to the engine when the job fires.
    pub prompt: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// When this job last fired (null until the first run).
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Session key results are delivered to (`channel:chat_id`, or empty).
    #[serde(default)]
    pub reply_to: String,
}

fn default_enabled() -> bool {
    true
}

impl CronJob {
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        prompt: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            id: new_job_id(),
            name: name.into(),
            schedule: schedule.into(),
            prompt: prompt.into(),
            enabled: true,
            last_run: None,
            created_at: Utc::now(),
            reply_to: reply_to.into(),
        }
    }
}

fn new_job_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("cron_{}", &hex[..8])
}

fn jobs_file(cron_dir: &Path) -> std::path::PathBuf {
    cron_dir.join("jobs.json")
}

/// Load jobs from `jobs.json`. Missing or corrupt files yield the empty list.
pub fn load_jobs(cron_dir: &Path) -> Vec<CronJob> {
    let content = match std::fs::read_to_string(jobs_file(cron_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&content) {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "jobs.json is corrupt, treating as empty");
            Vec::new()
        }
    }
}

/// Persist the jobs list atomically.
pub fn save_jobs(cron_dir: &Path, jobs: &[CronJob]) -> Result<(), CronError> {
    std::fs::create_dir_all(cron_dir)
        .map_err(|e| CronError::Storage(format!("create {}: {e}", cron_dir.display())))?;

    let path = jobs_file(cron_dir);
    let tmp = cron_dir.join("jobs.json.tmp");
    let content = serde_json::to_string_pretty(jobs)
        .map_err(|e| CronError::Storage(format!("serialize jobs: {e}")))?;

    std::fs::write(&tmp, content)
        .map_err(|e| CronError::Storage(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, &path)
        .map_err(|e| CronError::Storage(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

/// One-shot migration of legacy per-job files into `jobs.json`.
///
/// Legacy entries use `cron` for the schedule and `command` for the prompt;
/// ids gain the `cron_` prefix. Entries whose id already exists under the
/// new schema are not overwritten; their legacy file is simply removed.
pub fn migrate_legacy_files(cron_dir: &Path) {
    let entries = match std::fs::read_dir(cron_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let legacy_files: Vec<_> = entries
        .flatten()
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.ends_with(".json") && name != "jobs.json"
        })
        .collect();
    if legacy_files.is_empty() {
        return;
    }

    let mut jobs = load_jobs(cron_dir);
    let existing_ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
    let mut migrated_count = 0;

    for file in legacy_files {
        let path = file.path();
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(entry) = serde_json::from_str::<serde_json::Value>(&content) else {
            continue;
        };

        let entry_id = entry["id"].as_str().unwrap_or("").to_string();
        if existing_ids.iter().any(|id| *id == entry_id) {
            let _ = std::fs::remove_file(&path);
            continue;
        }

        let id = if entry_id.starts_with("cron_") {
            entry_id
        } else {
            format!("cron_{entry_id}")
        };
        let schedule = entry["cron"]
            .as_str()
            .or(entry["schedule"].as_str())
            .unwrap_or("")
            .to_string();
        let prompt = entry["command"]
            .as_str()
            .or(entry["prompt"].as_str())
            .unwrap_or("")
            .to_string();
        let last_run = entry
            .get("last_run")
            .and_then(|v| serde_json::from_value::<Option<DateTime<Utc>>>(v.clone()).ok())
            .flatten();
        let created_at = entry
            .get("created_at")
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok())
            .unwrap_or_else(Utc::now);

        jobs.push(CronJob {
            id,
            name: entry["name"].as_str().unwrap_or("Unnamed task").to_string(),
            schedule,
            prompt,
            enabled: entry["enabled"].as_bool().unwrap_or(true),
            last_run,
            created_at,
            reply_to: entry["reply_to"].as_str().unwrap_or("").to_string(),
        });
        migrated_count += 1;
        let _ = std::fs::remove_file(&path);
    }

    if let Err(e) = save_jobs(cron_dir, &jobs) {
        warn!(error = %e, "Failed to persist migrated cron jobs");
    } else if migrated_count > 0 {
        debug!(count = migrated_count, "Migrated legacy cron job files");
    }
}
