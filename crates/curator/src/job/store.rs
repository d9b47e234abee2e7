//! Job store: in-memory cache with optional SQLite persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{report_repo, Database, DatabaseError};
use crate::report::{Report, ReportItem};

use super::{Job, JobState, JobStats};

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn to_row(job: &Job) -> JobRow {
    JobRow {
        id: job.id.clone(),
        plugin_id: job.plugin_id.clone(),
        plugin_version: job.plugin_version.clone(),
        owner: job.owner.clone(),
        parameters: serde_json::to_string(&job.parameters).unwrap_or_else(|_| "{}".to_string()),
        source: serde_json::to_string(&job.source).unwrap_or_else(|_| "{}".to_string()),
        state: job.state.as_str().to_string(),
        total: job.stats.total,
        waiting: job.stats.waiting,
        processing: job.stats.processing,
        succeeded: job.stats.succeeded,
        failed: job.stats.failed,
        completion_percentage: job.stats.completion_percentage,
        created_at: job.created_at.to_rfc3339(),
        started_at: job.started_at.map(|t| t.to_rfc3339()),
        ended_at: job.ended_at.map(|t| t.to_rfc3339()),
        updated_at: Utc::now().to_rfc3339(),
        error: job.error.clone(),
    }
}

/// Rebuilds a job from its row. Returns `None` for rows this version can
/// no longer read.
fn from_row(row: &JobRow) -> Option<Job> {
    let source = match serde_json::from_str(&row.source) {
        Ok(source) => source,
        Err(e) => {
            log::warn!("Job {} has an unreadable source: {}", row.id, e);
            return None;
        }
    };
    let parameters: BTreeMap<String, String> =
        serde_json::from_str(&row.parameters).unwrap_or_default();
    let state = JobState::parse(&row.state).unwrap_or_else(|| {
        log::warn!(
            "Unknown job state '{}' for job {}, treating it as failed",
            row.state,
            row.id
        );
        JobState::FailedToComplete
    });

    Some(Job {
        id: row.id.clone(),
        plugin_id: row.plugin_id.clone(),
        plugin_version: row.plugin_version.clone(),
        owner: row.owner.clone(),
        parameters,
        source,
        state,
        stats: JobStats {
            total: row.total,
            waiting: row.waiting,
            processing: row.processing,
            succeeded: row.succeeded,
            failed: row.failed,
            completion_percentage: row.completion_percentage,
        },
        created_at: parse_timestamp(&row.created_at),
        started_at: row.started_at.as_deref().map(parse_timestamp),
        ended_at: row.ended_at.as_deref().map(parse_timestamp),
        error: row.error.clone(),
    })
}

/// Keeps the latest known state of every job.
///
/// With a database attached, jobs and report items are written through and
/// report items are not kept in memory. Persistence failures are logged and
/// never abort a run.
pub struct JobStore {
    db: RwLock<Option<Database>>,
    cache: RwLock<HashMap<String, Job>>,
    /// Report items of jobs, only used without a database.
    reports: RwLock<HashMap<String, Vec<ReportItem>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job store lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job store lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            db: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
            reports: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_database(db: Database) -> Self {
        let store = Self::new();
        store.set_database(db);
        store
    }

    pub fn set_database(&self, db: Database) {
        *write(&self.db) = Some(db);
    }

    pub fn get_database(&self) -> Option<Database> {
        read(&self.db).clone()
    }

    /// Stores the job's current state in the cache and the database.
    pub fn save(&self, job: &Job) {
        write(&self.cache).insert(job.id.clone(), job.clone());

        if let Some(db) = self.get_database() {
            if let Err(e) = job_repo::upsert(&db, &to_row(job)) {
                log::error!("Failed to persist job {}: {}", job.id, e);
            }
        }
    }

    /// Appends a block's report items to the job's report.
    pub fn append_report(&self, job_id: &str, items: &[ReportItem]) {
        match self.get_database() {
            Some(db) => {
                if let Err(e) = report_repo::append(&db, job_id, items) {
                    log::error!(
                        "Failed to persist {} report items of job {}: {}",
                        items.len(),
                        job_id,
                        e
                    );
                }
            }
            None => write(&self.reports)
                .entry(job_id.to_string())
                .or_default()
                .extend_from_slice(items),
        }
    }

    /// The job, from the cache or else from the database.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        if let Some(job) = read(&self.cache).get(job_id) {
            return Some(job.clone());
        }
        let db = self.get_database()?;
        match job_repo::find_by_id(&db, job_id) {
            Ok(row) => row.as_ref().and_then(from_row),
            Err(e) => {
                log::error!("Failed to load job {}: {}", job_id, e);
                None
            }
        }
    }

    pub fn report(&self, job_id: &str) -> Result<Report, DatabaseError> {
        match self.get_database() {
            Some(db) => Ok(report_repo::list(&db, job_id)?.into_iter().collect()),
            None => Ok(read(&self.reports)
                .get(job_id)
                .map(|items| items.iter().cloned().collect())
                .unwrap_or_default()),
        }
    }

    /// Jobs newest first, preferring the database when one is attached.
    pub fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, DatabaseError> {
        if let Some(db) = self.get_database() {
            let (rows, _) = job_repo::query(&db, filter)?;
            return Ok(rows.iter().filter_map(from_row).collect());
        }

        let mut jobs: Vec<Job> = read(&self.cache)
            .values()
            .filter(|job| {
                filter
                    .state
                    .as_deref()
                    .map_or(true, |state| job.state.as_str() == state)
                    && filter
                        .plugin_id
                        .as_deref()
                        .map_or(true, |id| job.plugin_id == id)
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(100) as usize;
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    /// Marks jobs that a previous process left running as failed.
    /// Returns how many were found.
    pub fn recover_unfinished(&self) -> usize {
        let db = match self.get_database() {
            Some(db) => db,
            None => return 0,
        };
        let rows = match job_repo::find_unfinished(&db) {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Failed to look up unfinished jobs: {}", e);
                return 0;
            }
        };

        let mut recovered = 0;
        for mut job in rows.iter().filter_map(from_row) {
            log::warn!("Job {} was interrupted, marking it failed", job.id);
            job.finish(
                JobState::FailedToComplete,
                Some("Interrupted before completion".to_string()),
            );
            self.save(&job);
            recovered += 1;
        }
        recovered
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
