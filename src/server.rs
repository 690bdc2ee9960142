//! Read-only JSON view over a metrics database.
//!
//! Routing is a pure function of the database, the request and the current
//! time ([`route`]); [`serve`] only moves bytes between it and `tiny_http`.

use crate::database::Database;
use crate::error::Result;
use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tiny_http::{Header, Response, Server};
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_PORT: u16 = 5000;

/// Samples per graph.
pub const DATA_POINTS: i64 = 250;

const DAY: i64 = 24 * 60 * 60;

/// Look-back windows reported by the index route.
const OFFSETS: &[(&str, i64)] = &[
    ("day", DAY),
    ("week", 7 * DAY),
    ("month", 30 * DAY),
    ("quarter", 91 * DAY),
    ("half_year", 182 * DAY),
    ("year", 365 * DAY),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    /// Redirect target for 3xx responses.
    pub location: Option<String>,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            location: None,
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
            location: None,
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 302,
            body: json!({ "location": location }),
            location: Some(location),
        }
    }
}

#[derive(Debug, Serialize)]
struct IndexEntry {
    name: String,
    description: String,
    value: i64,
    changes: BTreeMap<&'static str, i64>,
}

/// Timestamps from `start` stepping by `(end - start) / data_points` (at least 1)
/// until one step past `end`. `None` when the range is inverted or does not fit in an `i64`.
pub fn data_points_for_time_range(start: i64, end: i64, data_points: i64) -> Option<Vec<i64>> {
    let span = end.checked_sub(start).filter(|span| *span >= 0)?;
    let step = (span / data_points.max(1)).max(1);
    let stop = end.checked_add(step)?;
    let mut points = Vec::new();
    let mut ts = start;
    while ts < stop {
        points.push(ts);
        ts = ts.checked_add(step)?;
    }
    Some(points)
}

/// Dispatch one request. `url` is the request target, path plus query.
pub fn route(db: &Database, method: &str, url: &str, now: i64) -> Result<ApiResponse> {
    let Ok(parsed) = Url::parse("http://localhost").and_then(|base| base.join(url)) else {
        return Ok(ApiResponse::error(400, format!("malformed url {url}")));
    };
    if method != "GET" {
        return Ok(ApiResponse::error(405, format!("method {method} not allowed")));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let query: BTreeMap<String, String> = parsed.query_pairs().into_owned().collect();

    match segments.as_slice() {
        [] => index(db, now),
        ["status"] => Ok(ApiResponse::ok(serde_json::to_value(db.status()?)?)),
        ["graph", metric] => {
            let (Some(start), Some(end)) = (
                query.get("start").and_then(|v| v.parse::<i64>().ok()),
                query.get("end").and_then(|v| v.parse::<i64>().ok()),
            ) else {
                return Ok(ApiResponse::error(400, "start and end must be integer timestamps"));
            };
            graph(db, metric, start, end)
        }
        ["graph", metric, "all_data"] => all_data(db, metric, now),
        ["changes", metric, start, end] => {
            let (Ok(start), Ok(end)) = (start.parse::<i64>(), end.parse::<i64>()) else {
                return Ok(ApiResponse::error(400, "start and end must be integer timestamps"));
            };
            changes(db, metric, start, end)
        }
        ["commit", sha] => commit(db, sha),
        _ => Ok(ApiResponse::error(404, format!("no route for {}", parsed.path()))),
    }
}

fn value_at(db: &Database, timestamp: i64) -> Result<BTreeMap<String, i64>> {
    let sha = db.sha_for_date(timestamp)?;
    Ok(db.metrics_for_sha(sha.as_deref())?.into_iter().collect())
}

fn index(db: &Database, now: i64) -> Result<ApiResponse> {
    let latest = db.latest_sha()?;
    let current: BTreeMap<String, i64> = db.metrics_for_sha(latest.as_deref())?.into_iter().collect();
    let mut past = Vec::with_capacity(OFFSETS.len());
    for (label, offset) in OFFSETS {
        past.push((*label, value_at(db, now - offset)?));
    }

    let mut metrics = Vec::new();
    for name in db.metric_names_with_data()? {
        let Some(info) = db.metric_info(&name)? else {
            continue;
        };
        let value = current.get(&name).copied().unwrap_or(0);
        let changes = past
            .iter()
            .map(|(label, values)| (*label, value - values.get(&name).copied().unwrap_or(0)))
            .collect();
        metrics.push(IndexEntry {
            name,
            description: info.description,
            value,
            changes,
        });
    }

    Ok(ApiResponse::ok(json!({
        "latest_sha": latest,
        "metrics": metrics,
    })))
}

fn graph(db: &Database, metric: &str, start: i64, end: i64) -> Result<ApiResponse> {
    let Some(info) = db.metric_info(metric)? else {
        return Ok(ApiResponse::error(404, format!("unknown metric {metric}")));
    };

    let Some(timestamps) = data_points_for_time_range(start, end, DATA_POINTS) else {
        return Ok(ApiResponse::error(400, format!("invalid time range {start}..{end}")));
    };
    let Some(points) = db
        .metrics_for_timestamps(info.id, &timestamps)?
        .into_iter()
        .map(|point| Some((point.date.checked_mul(1000)?, point.value)))
        .collect::<Option<BTreeSet<(i64, i64)>>>()
    else {
        return Ok(ApiResponse::error(400, format!("invalid time range {start}..{end}")));
    };
    let data: Vec<[i64; 2]> = points.into_iter().map(|(ms, value)| [ms, value]).collect();

    Ok(ApiResponse::ok(json!({
        "metric": info.name,
        "description": info.description,
        "start": start,
        "end": end,
        "data": data,
        "changes_url": format!("/changes/{metric}/{start}/{end}"),
    })))
}

fn all_data(db: &Database, metric: &str, now: i64) -> Result<ApiResponse> {
    if db.metric_info(metric)?.is_none() {
        return Ok(ApiResponse::error(404, format!("unknown metric {metric}")));
    }
    let start = db.first_data_timestamp(metric)?;
    Ok(ApiResponse::redirect(format!(
        "/graph/{metric}?start={start}&end={now}"
    )))
}

fn changes(db: &Database, metric: &str, start: i64, end: i64) -> Result<ApiResponse> {
    let Some(info) = db.metric_info(metric)? else {
        return Ok(ApiResponse::error(404, format!("unknown metric {metric}")));
    };
    let changes = db.major_changes(start, end, info.id)?;
    Ok(ApiResponse::ok(json!({
        "metric": info.name,
        "start": start,
        "end": end,
        "changes": changes,
    })))
}

fn commit(db: &Database, sha: &str) -> Result<ApiResponse> {
    let changes = db.changes_for_sha(sha)?;
    Ok(ApiResponse::ok(json!({
        "sha": sha,
        "changes": changes,
    })))
}

/// Serve `database` on `0.0.0.0:port` until the process is stopped.
pub fn serve(database: &Path, port: u16) -> anyhow::Result<()> {
    let db = Database::open_read_only(database).context("Failed to open database")?;
    let server = Server::http(("0.0.0.0", port))
        .map_err(|e| anyhow::anyhow!("Failed to listen on port {port}: {e}"))?;
    info!(port, database = %database.display(), "serving metrics");
    eprintln!("Listening on http://0.0.0.0:{port}");

    for request in server.incoming_requests() {
        let now = chrono::Utc::now().timestamp();
        let method = request.method().as_str().to_string();
        let url = request.url().to_string();

        let api = route(&db, &method, &url, now).unwrap_or_else(|e| {
            error!(%url, error = %e, "request failed");
            ApiResponse::error(500, e.to_string())
        });
        debug!(%method, %url, status = api.status, "handled request");

        let mut response = Response::from_string(api.body.to_string()).with_status_code(api.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response.add_header(header);
        }
        if let Some(location) = &api.location {
            if let Ok(header) = Header::from_bytes(&b"Location"[..], location.as_bytes()) {
                response.add_header(header);
            }
        }
        if let Err(e) = request.respond(response) {
            warn!(%url, error = %e, "failed to send response");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Commit, Metric, MetricInfo};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    fn sandbox() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(
            dir.path().join("db.db"),
            &[
                MetricInfo::new("TODOCount", "Number of TODOs"),
                MetricInfo::new("Unused", "Never changes"),
            ],
        )
        .unwrap();
        (dir, db)
    }

    fn record(db: &mut Database, sha: &str, timestamp: i64, deltas: &[(&str, i64)], running: &mut i64) {
        let mapping = db.metric_mapping().unwrap();
        let mut has_data = db.metric_has_data().unwrap();
        let metrics: Vec<Metric> = deltas.iter().map(|(n, v)| Metric::new(*n, *v)).collect();
        *running += deltas.iter().map(|(_, v)| v).sum::<i64>();
        let values: HashMap<i64, i64> = HashMap::from([(mapping["TODOCount"], *running)]);
        db.write_commit(&Commit::new(sha, timestamp), &metrics, &mapping, &mut has_data, &values)
            .unwrap();
    }

    fn populated() -> (TempDir, Database) {
        let (dir, mut db) = sandbox();
        let mut running = 0;
        record(&mut db, &"a".repeat(40), NOW - 10 * DAY, &[("TODOCount", 5)], &mut running);
        record(&mut db, &"b".repeat(40), NOW - 3600, &[("TODOCount", 2)], &mut running);
        (dir, db)
    }

    fn get(db: &Database, url: &str) -> ApiResponse {
        route(db, "GET", url, NOW).unwrap()
    }

    #[test]
    fn data_points_step_past_end() {
        assert_eq!(data_points_for_time_range(0, 10, 5), Some(vec![0, 2, 4, 6, 8, 10]));
        assert_eq!(data_points_for_time_range(0, 10, 3), Some(vec![0, 3, 6, 9, 12]));
        assert_eq!(data_points_for_time_range(5, 5, 250), Some(vec![5]));
        assert_eq!(data_points_for_time_range(0, 1000, 250).map(|p| p.len()), Some(251));
    }

    #[test]
    fn data_points_reject_overflowing_and_inverted_ranges() {
        assert_eq!(data_points_for_time_range(i64::MIN, i64::MAX, 250), None);
        assert_eq!(data_points_for_time_range(0, i64::MAX, 250), None);
        assert_eq!(data_points_for_time_range(i64::MAX - 1, i64::MAX, 250), None);
        assert_eq!(data_points_for_time_range(10, 0, 250), None);
    }

    #[test]
    fn index_reports_current_values_and_deltas() {
        let (_dir, db) = populated();
        let res = get(&db, "/");
        assert_eq!(res.status, 200);
        assert_eq!(res.body["latest_sha"], json!("b".repeat(40)));

        let metrics = res.body["metrics"].as_array().unwrap();
        assert_eq!(metrics.len(), 1);
        let todo = &metrics[0];
        assert_eq!(todo["name"], "TODOCount");
        assert_eq!(todo["value"], 7);
        assert_eq!(todo["changes"]["day"], 2);
        assert_eq!(todo["changes"]["week"], 2);
        assert_eq!(todo["changes"]["month"], 7);
    }

    #[test]
    fn graph_samples_are_sorted_and_unique() {
        let (_dir, db) = populated();
        let start = NOW - 20 * DAY;
        let res = get(&db, &format!("/graph/TODOCount?start={start}&end={NOW}"));
        assert_eq!(res.status, 200);
        assert_eq!(res.body["description"], "Number of TODOs");

        let data: Vec<(i64, i64)> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| (p[0].as_i64().unwrap(), p[1].as_i64().unwrap()))
            .collect();
        let values: Vec<i64> = data.iter().map(|(_, v)| *v).collect();
        assert!(data.windows(2).all(|w| w[0] < w[1]));
        assert!(values.contains(&0));
        assert!(values.contains(&5));
        assert!(values.contains(&7));
        assert!(data.iter().any(|(ms, v)| *ms == (NOW - 10 * DAY) * 1000 && *v == 5));
    }

    #[test]
    fn graph_rejects_bad_requests() {
        let (_dir, db) = populated();
        assert_eq!(get(&db, "/graph/TODOCount").status, 400);
        assert_eq!(get(&db, "/graph/TODOCount?start=x&end=1").status, 400);
        assert_eq!(get(&db, "/graph/Nope?start=0&end=1").status, 404);
    }

    #[test]
    fn graph_rejects_ranges_that_overflow() {
        let (_dir, db) = populated();
        for query in [
            "start=-9000000000000000000&end=9000000000000000000",
            "start=0&end=9223372036854775807",
            "start=9223372036854775800&end=9223372036854775807",
            "start=100&end=10",
        ] {
            let res = get(&db, &format!("/graph/TODOCount?{query}"));
            assert_eq!(res.status, 400, "{query}");
        }
    }

    #[test]
    fn graph_rejects_timestamps_too_large_for_milliseconds() {
        let (_dir, db) = sandbox();
        let far = i64::MAX / 1000 + 1;
        let res = get(&db, &format!("/graph/TODOCount?start={far}&end={}", far + 250));
        assert_eq!(res.status, 400);

        let near = i64::MAX / 1000 - 500;
        let res = get(&db, &format!("/graph/TODOCount?start={near}&end={}", near + 250));
        assert_eq!(res.status, 200);
    }

    #[test]
    fn all_data_redirects_from_first_data() {
        let (_dir, db) = populated();
        let res = get(&db, "/graph/TODOCount/all_data");
        assert_eq!(res.status, 302);
        let expected = format!("/graph/TODOCount?start={}&end={NOW}", NOW - 10 * DAY);
        assert_eq!(res.location.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn changes_and_commit_routes() {
        let (_dir, db) = populated();
        let res = get(&db, &format!("/changes/TODOCount/0/{NOW}"));
        assert_eq!(res.status, 200);
        let values: Vec<i64> = res.body["changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["value"].as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![5, 2]);
        assert_eq!(get(&db, "/changes/TODOCount/zero/1").status, 400);

        let res = get(&db, &format!("/commit/{}", "b".repeat(40)));
        assert_eq!(res.body["changes"], json!([{ "name": "TODOCount", "value": 2 }]));
        let res = get(&db, "/commit/unknown");
        assert_eq!(res.body["changes"], json!([]));
    }

    #[test]
    fn status_counts_rows() {
        let (_dir, db) = populated();
        let res = get(&db, "/status");
        assert_eq!(res.body["commits"], 2);
        assert_eq!(res.body["metrics"], 2);
        assert_eq!(res.body["metrics_with_data"], 1);
    }

    #[test]
    fn unknown_routes_and_methods() {
        let (_dir, db) = sandbox();
        assert_eq!(get(&db, "/nope").status, 404);
        assert_eq!(route(&db, "POST", "/", NOW).unwrap().status, 405);
    }
}
