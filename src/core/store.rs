// src/core/store.rs

//! The scan-job queue, kept in SQLite so several worker processes can share
//! one database file. Every mutation runs inside `BEGIN IMMEDIATE`, which
//! takes the write lock up front: a claim is a conditional `UPDATE` on
//! `status`, and writes after a claim are conditional on the `claim_id`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::models::{Findings, JobStatus, ScanJob, ScanResult};

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scan_jobs (
    id TEXT PRIMARY KEY,
    target_table TEXT NOT NULL,
    target_id TEXT NOT NULL,
    urls TEXT NOT NULL,
    status TEXT NOT NULL,
    findings TEXT NOT NULL,
    claim_id TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    scanned_at INTEGER,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scan_jobs_queue ON scan_jobs (status, created_at);
CREATE TABLE IF NOT EXISTS scan_results (
    job_id TEXT NOT NULL REFERENCES scan_jobs (id),
    claim_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    result TEXT NOT NULL,
    PRIMARY KEY (job_id, position)
);
"#;

const JOB_COLUMNS: &str = "id, target_table, target_id, urls, status, findings, claim_id, \
                           attempts, created_at, scanned_at, updated_at";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("job store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("job store query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job store data is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("job store row is corrupt: {0}")]
    Corrupt(String),

    #[error("scan job {0} not found")]
    NotFound(Uuid),

    #[error("scan job {0} is no longer claimed by this worker")]
    ClaimLost(Uuid),

    #[error("scan job {0} is already {1}")]
    AlreadyTerminal(Uuid, JobStatus),

    #[error("a scan job needs at least one URL")]
    EmptyJob,
}

/// Persistence consumed by the orchestrator.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue(
        &self,
        target_table: &str,
        target_id: &str,
        urls: Vec<String>,
    ) -> Result<ScanJob, StoreError>;

    /// Claims the oldest `pending` job, or a `processing` job whose owner has
    /// not touched it for longer than `stale_after`.
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Option<ScanJob>, StoreError>;

    /// Appends one URL verdict to a job the caller still owns.
    async fn record_result(
        &self,
        job_id: Uuid,
        claim_id: Uuid,
        result: &ScanResult,
    ) -> Result<(), StoreError>;

    /// Writes findings and the terminal status in one step.
    async fn complete(
        &self,
        job_id: Uuid,
        claim_id: Uuid,
        status: JobStatus,
        findings: Findings,
        now: DateTime<Utc>,
    ) -> Result<ScanJob, StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ScanJob>, StoreError>;
}

/// SQLite-backed queue. Any number of instances, in any number of processes,
/// may point at the same database file.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: Pool<Sqlite>,
}

impl SqliteJobStore {
    /// Opens (creating if needed) the database at `path` and its schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!(path = %path.display(), "Job store opened.");
        Ok(Self { pool })
    }

    /// Runs `BEGIN IMMEDIATE` on a pooled connection. The write lock is held
    /// from the first statement, so the reads that follow cannot go stale.
    async fn begin_immediate(
        &self,
    ) -> Result<sqlx::pool::PoolConnection<Sqlite>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }
}

/// Commits on success, rolls back otherwise. A failed rollback is logged and
/// the original error is kept.
async fn finish<T>(
    conn: &mut SqliteConnection,
    outcome: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match outcome {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback, "Failed to roll back job store transaction.");
            }
            Err(e)
        }
    }
}

// --- Row mapping ---

fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(value: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {value} out of range")))
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("uuid {value:?}: {e}")))
}

fn parse_status(value: &str) -> Result<JobStatus, StoreError> {
    JobStatus::from_str(value).map_err(|_| StoreError::Corrupt(format!("status {value:?}")))
}

fn job_from_row(row: &SqliteRow) -> Result<ScanJob, StoreError> {
    let attempts: i64 = row.try_get("attempts")?;
    Ok(ScanJob {
        id: parse_uuid(row.try_get("id")?)?,
        target_table: row.try_get("target_table")?,
        target_id: row.try_get("target_id")?,
        urls: serde_json::from_str(row.try_get("urls")?)?,
        status: parse_status(row.try_get("status")?)?,
        findings: serde_json::from_str(row.try_get("findings")?)?,
        claim_id: row
            .try_get::<Option<&str>, _>("claim_id")?
            .map(parse_uuid)
            .transpose()?,
        attempts: u32::try_from(attempts)
            .map_err(|_| StoreError::Corrupt(format!("attempts {attempts}")))?,
        created_at: from_micros(row.try_get("created_at")?)?,
        scanned_at: row
            .try_get::<Option<i64>, _>("scanned_at")?
            .map(from_micros)
            .transpose()?,
        updated_at: from_micros(row.try_get("updated_at")?)?,
    })
}

/// Loads a job. While it is `processing`, the verdicts recorded so far under
/// the current claim are surfaced in `findings.results`.
async fn fetch_job(
    conn: &mut SqliteConnection,
    job_id: Uuid,
) -> Result<Option<ScanJob>, StoreError> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM scan_jobs WHERE id = ?"))
        .bind(job_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut job = job_from_row(&row)?;

    if let (JobStatus::Processing, Some(claim_id)) = (job.status, job.claim_id) {
        let recorded: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT result FROM scan_results
            WHERE job_id = ? AND claim_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(job_id.to_string())
        .bind(claim_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
        job.findings.results = recorded
            .iter()
            .map(|r| serde_json::from_str(r))
            .collect::<Result<_, _>>()?;
    }
    Ok(Some(job))
}

/// Explains why a claim-guarded write touched no row.
async fn ownership_error(conn: &mut SqliteConnection, job_id: Uuid) -> StoreError {
    let status: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM scan_jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&mut *conn)
            .await;
    match status {
        Ok(None) => StoreError::NotFound(job_id),
        Ok(Some(status)) => match parse_status(&status) {
            Ok(status) if status.is_terminal() => StoreError::AlreadyTerminal(job_id, status),
            Ok(_) => StoreError::ClaimLost(job_id),
            Err(e) => e,
        },
        Err(e) => e.into(),
    }
}

async fn claim_in(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Result<Option<ScanJob>, StoreError> {
    let stale_before = micros(now - stale_after);
    let candidate: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT id, status FROM scan_jobs
        WHERE status = 'pending'
           OR (status = 'processing' AND updated_at < ?)
        ORDER BY created_at ASC, rowid ASC
        LIMIT 1
        "#,
    )
    .bind(stale_before)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((job_id, previous)) = candidate else {
        return Ok(None);
    };
    let job_id = parse_uuid(&job_id)?;

    let claim_id = Uuid::new_v4();
    let empty = serde_json::to_string(&Findings::default())?;
    let rows_affected = sqlx::query(
        r#"
        UPDATE scan_jobs
        SET status = 'processing',
            claim_id = ?,
            attempts = attempts + 1,
            findings = ?,
            updated_at = ?
        WHERE id = ?
          AND (status = 'pending' OR (status = 'processing' AND updated_at < ?))
        "#,
    )
    .bind(claim_id.to_string())
    .bind(&empty)
    .bind(micros(now))
    .bind(job_id.to_string())
    .bind(stale_before)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        debug!(scan_id = %job_id, "Scan job was claimed elsewhere.");
        return Ok(None);
    }
    if previous == JobStatus::Processing.to_string() {
        warn!(scan_id = %job_id, "Reclaiming stale scan job.");
    }

    // Partial verdicts of a dead attempt never leak into the new one.
    sqlx::query("DELETE FROM scan_results WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(&mut *conn)
        .await?;

    fetch_job(conn, job_id).await
}

async fn record_in(
    conn: &mut SqliteConnection,
    job_id: Uuid,
    claim_id: Uuid,
    result: &ScanResult,
) -> Result<(), StoreError> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE scan_jobs
        SET updated_at = ?
        WHERE id = ? AND status = 'processing' AND claim_id = ?
        "#,
    )
    .bind(micros(Utc::now()))
    .bind(job_id.to_string())
    .bind(claim_id.to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Err(ownership_error(conn, job_id).await);
    }

    sqlx::query(
        r#"
        INSERT INTO scan_results (job_id, claim_id, position, result)
        SELECT ?, ?, COUNT(*), ? FROM scan_results WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .bind(claim_id.to_string())
    .bind(serde_json::to_string(result)?)
    .bind(job_id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn complete_in(
    conn: &mut SqliteConnection,
    job_id: Uuid,
    claim_id: Uuid,
    status: JobStatus,
    findings: Findings,
    now: DateTime<Utc>,
) -> Result<ScanJob, StoreError> {
    debug_assert!(status.is_terminal());
    let scanned_at = findings.scanned_at.unwrap_or(now);
    let rows_affected = sqlx::query(
        r#"
        UPDATE scan_jobs
        SET status = ?,
            findings = ?,
            scanned_at = ?,
            claim_id = NULL,
            updated_at = ?
        WHERE id = ? AND status = 'processing' AND claim_id = ?
        "#,
    )
    .bind(status.to_string())
    .bind(serde_json::to_string(&findings)?)
    .bind(micros(scanned_at))
    .bind(micros(now))
    .bind(job_id.to_string())
    .bind(claim_id.to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Err(ownership_error(conn, job_id).await);
    }

    sqlx::query("DELETE FROM scan_results WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(&mut *conn)
        .await?;

    fetch_job(conn, job_id).await?.ok_or(StoreError::NotFound(job_id))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(
        &self,
        target_table: &str,
        target_id: &str,
        urls: Vec<String>,
    ) -> Result<ScanJob, StoreError> {
        if urls.is_empty() {
            return Err(StoreError::EmptyJob);
        }
        let job = ScanJob::new(target_table, target_id, urls, Utc::now());
        sqlx::query(&format!(
            "INSERT INTO scan_jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(job.id.to_string())
        .bind(&job.target_table)
        .bind(&job.target_id)
        .bind(serde_json::to_string(&job.urls)?)
        .bind(job.status.to_string())
        .bind(serde_json::to_string(&job.findings)?)
        .bind(job.claim_id.map(|c| c.to_string()))
        .bind(i64::from(job.attempts))
        .bind(micros(job.created_at))
        .bind(job.scanned_at.map(micros))
        .bind(micros(job.updated_at))
        .execute(&self.pool)
        .await?;

        info!(scan_id = %job.id, urls = job.urls.len(), "Scan job enqueued.");
        Ok(job)
    }

    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Option<ScanJob>, StoreError> {
        let mut conn = self.begin_immediate().await?;
        let outcome = claim_in(&mut conn, now, stale_after).await;
        finish(&mut conn, outcome).await
    }

    async fn record_result(
        &self,
        job_id: Uuid,
        claim_id: Uuid,
        result: &ScanResult,
    ) -> Result<(), StoreError> {
        let mut conn = self.begin_immediate().await?;
        let outcome = record_in(&mut conn, job_id, claim_id, result).await;
        finish(&mut conn, outcome).await
    }

    async fn complete(
        &self,
        job_id: Uuid,
        claim_id: Uuid,
        status: JobStatus,
        findings: Findings,
        now: DateTime<Utc>,
    ) -> Result<ScanJob, StoreError> {
        let mut conn = self.begin_immediate().await?;
        let outcome = complete_in(&mut conn, job_id, claim_id, status, findings, now).await;
        finish(&mut conn, outcome).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ScanJob>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_job(&mut conn, job_id).await
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::testing::temp_store;
    use super::*;
    use crate::core::aggregator::summarize;
    use crate::core::scanner::heuristics::HeuristicAnalyzer;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    fn stale() -> Duration {
        Duration::minutes(5)
    }

    #[tokio::test]
    async fn empty_queue_claims_nothing() {
        let (_dir, store) = temp_store().await;
        assert!(store.claim_next(Utc::now(), stale()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_rejects_empty_url_list() {
        let (_dir, store) = temp_store().await;
        let err = store.enqueue("posts", "1", Vec::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyJob));
    }

    #[tokio::test]
    async fn get_unknown_job_is_none() {
        let (_dir, store) = temp_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_are_fifo_and_exclusive() {
        let (_dir, store) = temp_store().await;
        let first = store.enqueue("posts", "1", urls(&["https://a.com"])).await.unwrap();
        let second = store.enqueue("posts", "2", urls(&["https://b.com"])).await.unwrap();

        let now = Utc::now();
        let claimed = store.claim_next(now, stale()).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.claim_id.is_some());

        let claimed = store.claim_next(now, stale()).await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert!(store.claim_next(now, stale()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pollers_never_share_a_job() {
        let (_dir, store) = temp_store().await;
        let store = Arc::new(store);
        for i in 0..8 {
            store.enqueue("posts", &i.to_string(), urls(&["https://a.com"])).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.claim_next(Utc::now(), stale()).await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                ids.push(job.id);
            }
        }
        assert_eq!(ids.len(), 8);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    /// Two independently opened stores stand in for two worker processes
    /// polling the same database file.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_store_instances_never_share_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared").join("jobs.db");
        let a = Arc::new(SqliteJobStore::open(&path).await.unwrap());
        let b = Arc::new(SqliteJobStore::open(&path).await.unwrap());

        let mut enqueued = HashSet::new();
        for i in 0..50 {
            let store = if i % 2 == 0 { &a } else { &b };
            let job = store
                .enqueue("posts", &i.to_string(), urls(&["https://a.com"]))
                .await
                .unwrap();
            enqueued.insert(job.id);
        }

        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = if worker % 2 == 0 { Arc::clone(&a) } else { Arc::clone(&b) };
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next(Utc::now(), stale()).await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            claimed.extend(handle.await.unwrap());
        }
        assert_eq!(claimed.len(), 50, "every job is claimed exactly once");
        let unique: HashSet<_> = claimed.into_iter().collect();
        assert_eq!(unique, enqueued);
    }

    #[tokio::test]
    async fn stale_processing_job_is_reclaimed() {
        let (_dir, store) = temp_store().await;
        let job = store.enqueue("posts", "1", urls(&["https://a.com"])).await.unwrap();
        let claimed_at = Utc::now();
        let first = store.claim_next(claimed_at, stale()).await.unwrap().unwrap();
        let first_claim = first.claim_id.unwrap();
        let partial = HeuristicAnalyzer::default().evaluate("https://a.com");
        store.record_result(job.id, first_claim, &partial).await.unwrap();

        let soon = claimed_at + Duration::minutes(1);
        assert!(store.claim_next(soon, stale()).await.unwrap().is_none());

        let second = store
            .claim_next(claimed_at + Duration::minutes(6), stale())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, job.id);
        assert_eq!(second.attempts, 2);
        assert_ne!(second.claim_id, first.claim_id);
        assert!(second.findings.results.is_empty());

        let err = store
            .complete(job.id, first_claim, JobStatus::Safe, Findings::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ClaimLost(_)));
        let err = store.record_result(job.id, first_claim, &partial).await.unwrap_err();
        assert!(matches!(err, StoreError::ClaimLost(_)));
    }

    #[tokio::test]
    async fn writes_to_unknown_job_are_not_found() {
        let (_dir, store) = temp_store().await;
        let result = HeuristicAnalyzer::default().evaluate("https://a.com");
        let err = store.record_result(Uuid::new_v4(), Uuid::new_v4(), &result).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn terminal_jobs_are_immutable() {
        let (_dir, store) = temp_store().await;
        let job = store.enqueue("posts", "1", urls(&["https://a.com"])).await.unwrap();
        let claimed = store.claim_next(Utc::now(), stale()).await.unwrap().unwrap();
        let claim_id = claimed.claim_id.unwrap();
        let result = HeuristicAnalyzer::default().evaluate("https://a.com");

        store.record_result(job.id, claim_id, &result).await.unwrap();
        let findings = Findings { results: vec![result.clone()], ..Findings::default() };
        let done = store
            .complete(job.id, claim_id, JobStatus::Safe, findings, Utc::now())
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Safe);
        assert!(done.scanned_at.is_some());
        assert!(done.claim_id.is_none());

        let err = store.record_result(job.id, claim_id, &result).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyTerminal(_, JobStatus::Safe)));
        let err = store
            .complete(job.id, claim_id, JobStatus::Unsafe, Findings::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyTerminal(..)));

        // Terminal jobs are never offered again, however old.
        let far_future = Utc::now() + Duration::days(1);
        assert!(store.claim_next(far_future, stale()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_lifecycle_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue").join("jobs.db");
        let list = urls(&["https://a.com", "http://bad.xyz", "http://192.168.1.5/login"]);

        let job = SqliteJobStore::open(&path)
            .await
            .unwrap()
            .enqueue("comments", "7", list.clone())
            .await
            .unwrap();

        let worker = SqliteJobStore::open(&path).await.unwrap();
        let claimed = worker.claim_next(Utc::now(), stale()).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        let claim_id = claimed.claim_id.unwrap();

        let analyzer = HeuristicAnalyzer::default();
        let mut results = Vec::new();
        for url in &list {
            let result = analyzer.evaluate(url);
            worker.record_result(job.id, claim_id, &result).await.unwrap();
            results.push(result);
        }

        // Progress is visible to other instances while the job is processing.
        let observer = SqliteJobStore::open(&path).await.unwrap();
        let in_flight = observer.get(job.id).await.unwrap().unwrap();
        assert_eq!(in_flight.status, JobStatus::Processing);
        assert_eq!(in_flight.findings.results, results);
        assert!(observer.claim_next(Utc::now(), stale()).await.unwrap().is_none());

        let scanned_at = Utc::now();
        let (status, findings) = summarize(results, scanned_at);
        let done = worker
            .complete(job.id, claim_id, status, findings.clone(), scanned_at)
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Unsafe);
        drop(worker);

        let reopened = SqliteJobStore::open(&path).await.unwrap();
        let stored = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Unsafe);
        assert_eq!(stored.urls, list);
        assert_eq!(stored.attempts, 1);
        assert!(stored.claim_id.is_none());
        assert_eq!(stored.findings.safe_urls, vec!["https://a.com"]);
        assert_eq!(
            stored.findings.unsafe_urls,
            vec!["http://bad.xyz", "http://192.168.1.5/login"]
        );
        assert_eq!(stored.findings.results, findings.results);
        assert_eq!(
            stored.scanned_at.map(|t| t.timestamp_micros()),
            Some(scanned_at.timestamp_micros())
        );

        let err = reopened
            .complete(job.id, claim_id, JobStatus::Safe, Findings::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyTerminal(_, JobStatus::Unsafe)));
    }
}
