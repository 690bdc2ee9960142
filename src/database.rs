use crate::error::{DebtError, Result};
use crate::model::{
    Commit, MajorChange, Metric, MetricDefinition, MetricInfo, MetricPoint, SCHEMA_VERSION,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Cap on rows returned by [`Database::major_changes`].
pub const MAJOR_CHANGES_LIMIT: i64 = 50;

const TABLES: &[&str] = &["metric_names", "metric_data", "metric_changes"];

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS metric_names (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL,
        has_data INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS metric_data (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        sha TEXT NOT NULL,
        metric_id INTEGER NOT NULL REFERENCES metric_names(id),
        timestamp INTEGER NOT NULL,
        running_value INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_metric_data_metric_ts ON metric_data(metric_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_metric_data_sha ON metric_data(sha);
    CREATE TABLE IF NOT EXISTS metric_changes (
        sha TEXT NOT NULL,
        metric_id INTEGER NOT NULL REFERENCES metric_names(id),
        value INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_metric_changes_metric_sha ON metric_changes(metric_id, sha);
    CREATE INDEX IF NOT EXISTS idx_metric_changes_sha ON metric_changes(sha);
";

/// Row counts, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub metrics: i64,
    pub metrics_with_data: i64,
    pub commits: i64,
    pub snapshots: i64,
    pub changes: i64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database at `path` and register `metrics` in it.
    pub fn create<P: AsRef<Path>>(path: P, metrics: &[MetricInfo]) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Self {
            conn: Connection::open(path)?,
        };
        db.create_schema()?;
        db.insert_metrics_info(metrics)?;
        info!(path = %path.display(), metrics = metrics.len(), "created database");
        Ok(db)
    }

    /// Open an existing database for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)
    }

    fn open_with_flags(path: &Path, flags: OpenFlags) -> Result<Self> {
        if !path.exists() {
            return Err(DebtError::Config(format!(
                "database not found {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
        let db = Self { conn };
        db.check_schema()?;
        Ok(db)
    }

    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        let set_stmt = format!("PRAGMA user_version = {SCHEMA_VERSION};");
        self.conn.execute_batch(&set_stmt)?;
        Ok(())
    }

    fn check_schema(&self) -> Result<()> {
        let user_version: i64 = self
            .conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| DebtError::Schema(format!("not a metrics database: {e}")))?;

        if user_version != SCHEMA_VERSION as i64 {
            return Err(DebtError::Schema(format!(
                "Schema version mismatch: expected {}, found {}",
                SCHEMA_VERSION, user_version
            )));
        }

        for table in TABLES {
            let found: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                    params![table],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_none() {
                return Err(DebtError::Schema(format!("missing table {table}")));
            }
        }
        Ok(())
    }

    pub fn insert_metrics_info(&self, metrics: &[MetricInfo]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("INSERT INTO metric_names (name, description) VALUES (?, ?)")?;
        for metric in metrics {
            stmt.execute(params![metric.name, metric.description])?;
        }
        Ok(())
    }

    /// Most recently inserted commit, by insertion order.
    pub fn latest_sha(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT sha FROM metric_data ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Sha of the latest snapshot at or before `timestamp`.
    pub fn sha_for_date(&self, timestamp: i64) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT sha FROM metric_data
                 WHERE timestamp <= ?
                 ORDER BY timestamp DESC, seq DESC
                 LIMIT 1",
                params![timestamp],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Running values by metric name at `sha`. Without a sha every metric reads 0.
    pub fn metrics_for_sha(&self, sha: Option<&str>) -> Result<HashMap<String, i64>> {
        let sha = match sha {
            Some(sha) if !sha.is_empty() => sha,
            _ => {
                return Ok(self
                    .metric_mapping()?
                    .into_keys()
                    .map(|name| (name, 0))
                    .collect())
            }
        };

        let mut stmt = self.conn.prepare(
            "SELECT metric_names.name, metric_data.running_value
             FROM metric_data
             INNER JOIN metric_names ON
                 metric_names.id = metric_data.metric_id AND
                 metric_names.has_data = 1
             WHERE metric_data.sha = ?",
        )?;
        let rows = stmt.query_map(params![sha], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    /// Step-function samples: for each timestamp, the last running value strictly before it.
    pub fn metrics_for_timestamps(
        &self,
        metric_id: i64,
        timestamps: &[i64],
    ) -> Result<Vec<MetricPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT running_value, timestamp
             FROM metric_data
             WHERE metric_id = ? AND timestamp < ?
             ORDER BY timestamp DESC, seq DESC
             LIMIT 1",
        )?;

        let mut points = Vec::with_capacity(timestamps.len());
        for &timestamp in timestamps {
            let point = stmt
                .query_row(params![metric_id, timestamp], |row| {
                    Ok(MetricPoint {
                        value: row.get(0)?,
                        date: row.get(1)?,
                    })
                })
                .optional()?
                .unwrap_or(MetricPoint {
                    value: 0,
                    date: timestamp,
                });
            points.push(point);
        }
        Ok(points)
    }

    /// Timestamp of the first snapshot row inserted for `metric_name`, 0 when there is none.
    pub fn first_data_timestamp(&self, metric_name: &str) -> Result<i64> {
        let first: Option<i64> = self
            .conn
            .query_row(
                "SELECT metric_data.timestamp
                 FROM metric_data
                 INNER JOIN metric_names ON metric_names.id = metric_data.metric_id
                 WHERE metric_names.name = ?
                 ORDER BY metric_data.seq ASC
                 LIMIT 1",
                params![metric_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(first.unwrap_or(0))
    }

    pub fn changes_for_sha(&self, sha: &str) -> Result<Vec<Metric>> {
        let mut stmt = self.conn.prepare(
            "SELECT metric_names.name, metric_changes.value
             FROM metric_changes
             INNER JOIN metric_names ON metric_changes.metric_id = metric_names.id
             WHERE metric_changes.sha = ?
             ORDER BY metric_names.name",
        )?;
        let rows = stmt.query_map(params![sha], |row| {
            Ok(Metric {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Largest swings of one metric within `[start, end)`, biggest first.
    pub fn major_changes(&self, start: i64, end: i64, metric_id: i64) -> Result<Vec<MajorChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT metric_data.timestamp, metric_data.sha, metric_changes.value
             FROM metric_changes
             INNER JOIN metric_data ON
                 metric_changes.sha = metric_data.sha AND
                 metric_changes.metric_id = metric_data.metric_id
             WHERE
                 metric_data.timestamp >= ? AND
                 metric_data.timestamp < ? AND
                 metric_changes.metric_id = ?
             ORDER BY ABS(metric_changes.value) DESC, metric_data.seq ASC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(
            params![start, end, metric_id, MAJOR_CHANGES_LIMIT],
            |row| {
                Ok(MajorChange {
                    timestamp: row.get(0)?,
                    sha: row.get(1)?,
                    value: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Metric name to id.
    pub fn metric_mapping(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT name, id FROM metric_names")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    /// Metric id to its `has_data` flag.
    pub fn metric_has_data(&self) -> Result<HashMap<i64, bool>> {
        let mut stmt = self.conn.prepare("SELECT id, has_data FROM metric_names")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    /// Raw running values by metric id at `sha`, used to seed a resumed run.
    pub fn metric_values(&self, sha: &str) -> Result<HashMap<i64, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT metric_id, running_value FROM metric_data WHERE sha = ?")?;
        let rows = stmt.query_map(params![sha], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    pub fn metric_names_with_data(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM metric_names WHERE has_data = 1 ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn metric_info(&self, metric_name: &str) -> Result<Option<MetricDefinition>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, description, has_data FROM metric_names WHERE name = ?",
                params![metric_name],
                |row| {
                    Ok(MetricDefinition {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        has_data: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn status(&self) -> Result<Status> {
        Ok(self.conn.query_row(
            "SELECT
                 (SELECT COUNT(*) FROM metric_names),
                 (SELECT COUNT(*) FROM metric_names WHERE has_data = 1),
                 (SELECT COUNT(DISTINCT sha) FROM metric_data),
                 (SELECT COUNT(*) FROM metric_data),
                 (SELECT COUNT(*) FROM metric_changes)",
            [],
            |row| {
                Ok(Status {
                    metrics: row.get(0)?,
                    metrics_with_data: row.get(1)?,
                    commits: row.get(2)?,
                    snapshots: row.get(3)?,
                    changes: row.get(4)?,
                })
            },
        )?)
    }

    pub fn update_has_data(
        &self,
        metrics: &[Metric],
        mapping: &HashMap<String, i64>,
        has_data: &mut HashMap<i64, bool>,
    ) -> Result<()> {
        update_has_data(&self.conn, metrics, mapping, has_data)
    }

    pub fn insert_metric_values(
        &self,
        values: &HashMap<i64, i64>,
        has_data: &HashMap<i64, bool>,
        commit: &Commit,
    ) -> Result<()> {
        insert_metric_values(&self.conn, values, has_data, commit)
    }

    pub fn insert_metric_changes(
        &self,
        metrics: &[Metric],
        mapping: &HashMap<String, i64>,
        commit: &Commit,
    ) -> Result<()> {
        insert_metric_changes(&self.conn, metrics, mapping, commit)
    }

    /// Persist one commit atomically: `has_data` flips, then snapshot rows at
    /// `values`, then the commit's non-zero deltas.
    pub fn write_commit(
        &mut self,
        commit: &Commit,
        metrics: &[Metric],
        mapping: &HashMap<String, i64>,
        has_data: &mut HashMap<i64, bool>,
        values: &HashMap<i64, i64>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        update_has_data(&tx, metrics, mapping, has_data)?;
        insert_metric_values(&tx, values, has_data, commit)?;
        insert_metric_changes(&tx, metrics, mapping, commit)?;
        tx.commit()?;
        debug!(commit = commit.short_sha(), "wrote commit");
        Ok(())
    }
}

fn metric_id(mapping: &HashMap<String, i64>, name: &str) -> Result<i64> {
    mapping
        .get(name)
        .copied()
        .ok_or_else(|| DebtError::UnknownMetric(name.to_string()))
}

fn update_has_data(
    conn: &Connection,
    metrics: &[Metric],
    mapping: &HashMap<String, i64>,
    has_data: &mut HashMap<i64, bool>,
) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE metric_names SET has_data = 1 WHERE id = ?")?;
    for metric in metrics.iter().filter(|m| m.value != 0) {
        let id = metric_id(mapping, &metric.name)?;
        let flag = has_data.entry(id).or_insert(false);
        if !*flag {
            *flag = true;
            stmt.execute(params![id])?;
            debug!(metric = %metric.name, "metric has data");
        }
    }
    Ok(())
}

fn insert_metric_values(
    conn: &Connection,
    values: &HashMap<i64, i64>,
    has_data: &HashMap<i64, bool>,
    commit: &Commit,
) -> Result<()> {
    let mut ids: Vec<i64> = has_data
        .iter()
        .filter(|(_, has)| **has)
        .map(|(id, _)| *id)
        .collect();
    ids.sort_unstable();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO metric_data (sha, metric_id, timestamp, running_value)
         VALUES (?, ?, ?, ?)",
    )?;
    for id in ids {
        let value = values.get(&id).copied().unwrap_or(0);
        stmt.execute(params![commit.sha, id, commit.timestamp, value])?;
    }
    Ok(())
}

fn insert_metric_changes(
    conn: &Connection,
    metrics: &[Metric],
    mapping: &HashMap<String, i64>,
    commit: &Commit,
) -> Result<()> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO metric_changes (sha, metric_id, value) VALUES (?, ?, ?)")?;
    for metric in metrics.iter().filter(|m| m.value != 0) {
        let id = metric_id(mapping, &metric.name)?;
        stmt.execute(params![commit.sha, id, metric.value])?;
    }
    Ok(())
}
