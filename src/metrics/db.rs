//! Database operations for snapshot history
//!
//! Counts are stored as SQLite INTEGER (i64) and never exceed that range for
//! real activity, so the u64 <-> i64 conversions here are intentional.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::models::{MemberSnapshot, Snapshot, SnapshotMetrics, SnapshotType, StoredSnapshot};

/// Append-only snapshot history keyed by team and period
pub trait SnapshotStore {
    /// Persist a new snapshot. Fails rather than overwrite an existing period.
    fn append(&self, snapshot: &Snapshot) -> Result<StoredSnapshot>;

    /// Latest snapshot of the same team and type whose period ended at or
    /// before `before`. Ties go to the later `period_end`, then the later
    /// `created_at`.
    ///
    /// Periods are half-open `[start, end)`, so a snapshot ending exactly at
    /// `before` precedes one that starts there.
    fn most_recent_previous(
        &self,
        team_name: &str,
        snapshot_type: SnapshotType,
        before: DateTime<Utc>,
    ) -> Result<Option<StoredSnapshot>>;
}

const SNAPSHOT_COLUMNS: &str = "id, created_at, team_name, snapshot_type, period_start, period_end, \
     sprint_name, total_commits, total_prs, prs_merged, prs_open, total_additions, \
     total_deletions, total_reviews, avg_merge_time_h, jira_total, jira_completed, \
     jira_completion_pct";

const MEMBER_COLUMNS: &str = "snapshot_id, member, total_commits, total_prs, prs_merged, prs_open, \
     total_additions, total_deletions, total_reviews, avg_merge_time_h, jira_total, \
     jira_completed, jira_completion_pct";

/// SQLite-backed snapshot store
pub struct MetricsDb {
    conn: Mutex<Connection>,
}

impl MetricsDb {
    /// Open or create the metrics database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open metrics database at {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;

        debug!(path = %path.display(), "opened metrics database");
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Metrics database lock poisoned"))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r"
            -- One row per team, type and period; rows are never updated
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY,
                team_name TEXT NOT NULL,
                snapshot_type TEXT NOT NULL,
                period_start INTEGER NOT NULL,
                period_end INTEGER NOT NULL,
                sprint_name TEXT,
                total_commits INTEGER NOT NULL,
                total_prs INTEGER NOT NULL,
                prs_merged INTEGER NOT NULL,
                prs_open INTEGER NOT NULL,
                total_additions INTEGER NOT NULL,
                total_deletions INTEGER NOT NULL,
                total_reviews INTEGER NOT NULL,
                avg_merge_time_h REAL,
                jira_total INTEGER NOT NULL,
                jira_completed INTEGER NOT NULL,
                jira_completion_pct INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(team_name, snapshot_type, period_start, period_end)
            );

            -- Per-member breakdowns of a snapshot
            CREATE TABLE IF NOT EXISTS member_snapshots (
                id INTEGER PRIMARY KEY,
                snapshot_id INTEGER NOT NULL REFERENCES snapshots(id),
                member TEXT NOT NULL,
                total_commits INTEGER NOT NULL,
                total_prs INTEGER NOT NULL,
                prs_merged INTEGER NOT NULL,
                prs_open INTEGER NOT NULL,
                total_additions INTEGER NOT NULL,
                total_deletions INTEGER NOT NULL,
                total_reviews INTEGER NOT NULL,
                avg_merge_time_h REAL,
                jira_total INTEGER NOT NULL,
                jira_completed INTEGER NOT NULL,
                jira_completion_pct INTEGER NOT NULL,
                UNIQUE(snapshot_id, member)
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_team_type_end
                ON snapshots(team_name, snapshot_type, period_end);
            CREATE INDEX IF NOT EXISTS idx_member_snapshots_snapshot
                ON member_snapshots(snapshot_id);
            ",
        )?;

        Ok(())
    }

    /// Newest snapshot for a team and type
    pub fn latest(
        &self,
        team_name: &str,
        snapshot_type: SnapshotType,
    ) -> Result<Option<StoredSnapshot>> {
        Ok(self.history(team_name, snapshot_type, 1)?.into_iter().next())
    }

    /// Snapshots for a team and type, newest period first
    pub fn history(
        &self,
        team_name: &str,
        snapshot_type: SnapshotType,
        limit: u32,
    ) -> Result<Vec<StoredSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {SNAPSHOT_COLUMNS} FROM snapshots
            WHERE team_name = ?1 AND snapshot_type = ?2
            ORDER BY period_end DESC, created_at DESC, id DESC
            LIMIT ?3
            "
        ))?;

        let rows = stmt.query_map(
            params![team_name, snapshot_type.as_str(), i64::from(limit)],
            row_to_stored,
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Store the per-member breakdown of an already recorded snapshot
    pub fn append_members(&self, snapshot_id: i64, members: &[MemberSnapshot]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_members(&tx, snapshot_id, members)?;
        tx.commit()?;
        Ok(())
    }

    /// Record a snapshot and its member breakdown in one transaction.
    ///
    /// `build_members` receives the new snapshot id. If any member row fails
    /// to insert, the snapshot row is rolled back too.
    pub fn append_with_members<F>(
        &self,
        snapshot: &Snapshot,
        build_members: F,
    ) -> Result<(StoredSnapshot, Vec<MemberSnapshot>)>
    where
        F: FnOnce(i64) -> Vec<MemberSnapshot>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = insert_snapshot(&tx, snapshot)?;
        let members = build_members(stored.id);
        insert_members(&tx, stored.id, &members)?;
        tx.commit()?;

        info!(
            id = stored.id,
            team = %snapshot.team_name,
            snapshot_type = %snapshot.snapshot_type,
            members = members.len(),
            "recorded snapshot"
        );
        Ok((stored, members))
    }

    /// Per-member breakdown of a snapshot, sorted by member
    pub fn members(&self, snapshot_id: i64) -> Result<Vec<MemberSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {MEMBER_COLUMNS} FROM member_snapshots
            WHERE snapshot_id = ?1
            ORDER BY member
            "
        ))?;

        let rows = stmt.query_map(params![snapshot_id], |row| {
            Ok(MemberSnapshot {
                snapshot_id: row.get(0)?,
                member: row.get(1)?,
                metrics: metrics_from_row(row, 2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Get all teams that have recorded snapshots
    pub fn teams(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT team_name FROM snapshots ORDER BY team_name")?;

        let rows = stmt.query_map([], |row| row.get(0))?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl SnapshotStore for MetricsDb {
    fn append(&self, snapshot: &Snapshot) -> Result<StoredSnapshot> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = insert_snapshot(&tx, snapshot)?;
        tx.commit()?;

        info!(
            id = stored.id,
            team = %snapshot.team_name,
            snapshot_type = %snapshot.snapshot_type,
            "recorded snapshot"
        );
        Ok(stored)
    }

    fn most_recent_previous(
        &self,
        team_name: &str,
        snapshot_type: SnapshotType,
        before: DateTime<Utc>,
    ) -> Result<Option<StoredSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {SNAPSHOT_COLUMNS} FROM snapshots
            WHERE team_name = ?1 AND snapshot_type = ?2 AND period_end <= ?3
            ORDER BY period_end DESC, created_at DESC, id DESC
            LIMIT 1
            "
        ))?;

        let previous = stmt
            .query_row(
                params![team_name, snapshot_type.as_str(), before.timestamp_millis()],
                row_to_stored,
            )
            .optional()?;

        Ok(previous)
    }
}

/// Insert a snapshot row inside `tx`, refusing to overwrite an existing period
fn insert_snapshot(tx: &Transaction<'_>, snapshot: &Snapshot) -> Result<StoredSnapshot> {
    let created_at = Utc::now();
    let m = &snapshot.metrics;

    let existing: Option<i64> = tx
        .query_row(
            r"
            SELECT id FROM snapshots
            WHERE team_name = ?1 AND snapshot_type = ?2
                AND period_start = ?3 AND period_end = ?4
            ",
            params![
                snapshot.team_name,
                snapshot.snapshot_type.as_str(),
                snapshot.period_start.timestamp_millis(),
                snapshot.period_end.timestamp_millis(),
            ],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        anyhow::bail!(
            "Snapshot already recorded for {} ({}, {} to {}) as #{id}",
            snapshot.team_name,
            snapshot.snapshot_type,
            snapshot.period_start.to_rfc3339(),
            snapshot.period_end.to_rfc3339(),
        );
    }

    tx.execute(
        r"
        INSERT INTO snapshots
            (team_name, snapshot_type, period_start, period_end, sprint_name,
             total_commits, total_prs, prs_merged, prs_open, total_additions,
             total_deletions, total_reviews, avg_merge_time_h, jira_total,
             jira_completed, jira_completion_pct, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ",
        params![
            snapshot.team_name,
            snapshot.snapshot_type.as_str(),
            snapshot.period_start.timestamp_millis(),
            snapshot.period_end.timestamp_millis(),
            snapshot.sprint_name,
            m.total_commits as i64,
            m.total_prs as i64,
            m.prs_merged as i64,
            m.prs_open as i64,
            m.total_additions as i64,
            m.total_deletions as i64,
            m.total_reviews as i64,
            m.avg_merge_time_h,
            m.jira_total as i64,
            m.jira_completed as i64,
            m.jira_completion_pct,
            created_at.timestamp_millis(),
        ],
    )?;
    let id = tx.last_insert_rowid();
    Ok(StoredSnapshot {
        id,
        // Round-trip through millis so the returned value matches what a read gives back
        created_at: DateTime::from_timestamp_millis(created_at.timestamp_millis())
            .unwrap_or(created_at),
        snapshot: snapshot.clone(),
    })
}

fn insert_members(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    members: &[MemberSnapshot],
) -> Result<()> {
    for member in members {
        let m = &member.metrics;
        tx.execute(
            &format!(
                r"
                INSERT INTO member_snapshots ({MEMBER_COLUMNS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "
            ),
            params![
                snapshot_id,
                member.member,
                m.total_commits as i64,
                m.total_prs as i64,
                m.prs_merged as i64,
                m.prs_open as i64,
                m.total_additions as i64,
                m.total_deletions as i64,
                m.total_reviews as i64,
                m.avg_merge_time_h,
                m.jira_total as i64,
                m.jira_completed as i64,
                m.jira_completion_pct,
            ],
        )
        .with_context(|| {
            format!(
                "Failed to record member {} for snapshot {snapshot_id}",
                member.member
            )
        })?;
    }
    Ok(())
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredSnapshot> {
    let snapshot_type: String = row.get(3)?;
    let snapshot_type = snapshot_type
        .parse::<SnapshotType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

    Ok(StoredSnapshot {
        id: row.get(0)?,
        created_at: millis_to_datetime(row, 1)?,
        snapshot: Snapshot {
            team_name: row.get(2)?,
            snapshot_type,
            period_start: millis_to_datetime(row, 4)?,
            period_end: millis_to_datetime(row, 5)?,
            sprint_name: row.get(6)?,
            metrics: metrics_from_row(row, 7)?,
        },
    })
}

/// Read the eleven aggregate columns starting at `start`
fn metrics_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<SnapshotMetrics> {
    let count = |offset: usize| -> rusqlite::Result<u64> {
        Ok(row.get::<_, i64>(start + offset)?.max(0) as u64)
    };

    Ok(SnapshotMetrics {
        total_commits: count(0)?,
        total_prs: count(1)?,
        prs_merged: count(2)?,
        prs_open: count(3)?,
        total_additions: count(4)?,
        total_deletions: count(5)?,
        total_reviews: count(6)?,
        avg_merge_time_h: row.get(start + 7)?,
        jira_total: count(8)?,
        jira_completed: count(9)?,
        jira_completion_pct: row.get(start + 10)?,
    })
}

fn millis_to_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {millis} out of range").into(),
        )
    })
}
