//! Scheduled triggers for the Talon runtime: the cron service and the
//! heartbeat service.
//!
//! Both drive the same engine contract. Cron jobs live in
//! `<workspace>/cron/jobs.json` — the on-disk copy is authoritative and is
//! re-read on every tick, so external writers become visible within a
//! second. The heartbeat reads `HEARTBEAT.md` on a fixed interval.

pub mod expr;
pub mod heartbeat;
pub mod job;
pub mod phrase;
pub mod service;

pub use expr::CronExpr;
pub use heartbeat::HeartbeatService;
pub use job::{CronJob, load_jobs, migrate_legacy_files, save_jobs};
pub use phrase::parse_phrase;
pub use service::CronService;
