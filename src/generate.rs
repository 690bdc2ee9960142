//! The `generate` command: walk history and record metric deltas and running values.

use crate::accumulator::RunningValues;
use crate::config::GenerateConfig;
use crate::database::Database;
use crate::error::{DebtError, Result};
use crate::git::{CommitSource, GitRepo};
use crate::metrics::{MetricEngine, ParserRegistry, ParserSelection};
use crate::model::{Commit, Metric};
use crate::pool;
use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of one [`load_data`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSummary {
    pub commits_processed: usize,
    /// Commit the run resumed from, if the database already had data.
    pub baseline: Option<String>,
    pub latest_sha: Option<String>,
    pub elapsed: Duration,
}

/// Create a fresh database holding every metric the engine declares.
pub fn create_database(path: &Path, engine: &MetricEngine) -> Result<Database> {
    Database::create(path, engine.metrics_info())
}

/// Every metric the engine can emit must already have a row in `metric_names`.
pub fn ensure_metrics_registered(db: &Database, engine: &MetricEngine) -> Result<()> {
    let mapping = db.metric_mapping()?;
    if let Some(missing) = engine
        .metrics_info()
        .iter()
        .find(|info| !mapping.contains_key(&info.name))
    {
        return Err(DebtError::Config(format!(
            "metric {} is not present in the existing database; regenerate it from scratch",
            missing.name
        )));
    }
    Ok(())
}

/// Process every commit after the database's latest one, in order.
///
/// Diffing and metric computation run on `jobs` workers; running values and
/// rows are written on the calling thread, one transaction per commit.
pub fn load_data<S>(
    db: &mut Database,
    source: &S,
    engine: &MetricEngine,
    jobs: usize,
    show_progress: bool,
) -> Result<GenerateSummary>
where
    S: CommitSource + ?Sized,
{
    let started = Instant::now();
    let baseline = db.latest_sha()?;
    let mut commits = source.list_commits(baseline.as_deref())?;

    if let Some(sha) = &baseline {
        if commits.len() <= 1 {
            info!(latest = %sha, "database is up to date");
            return Ok(GenerateSummary {
                commits_processed: 0,
                baseline: baseline.clone(),
                latest_sha: baseline,
                elapsed: started.elapsed(),
            });
        }
        // Already recorded; only used as the first comparison point.
        commits.remove(0);
    }

    let mapping = db.metric_mapping()?;
    let mut has_data = db.metric_has_data()?;
    let mut running = match &baseline {
        Some(sha) => RunningValues::seeded(db.metric_values(sha)?),
        None => RunningValues::new(),
    };

    info!(
        commits = commits.len(),
        baseline = baseline.as_deref().unwrap_or("none"),
        jobs,
        "processing commits"
    );

    let pb = progress_bar(commits.len() as u64, show_progress);

    let mut compare = baseline.clone();
    let tasks: Vec<(Option<String>, Commit)> = commits
        .into_iter()
        .map(|commit| (compare.replace(commit.sha.clone()), commit))
        .collect();

    let work = |(compare, commit): &(Option<String>, Commit)| -> Result<Vec<Metric>> {
        let diff = match compare {
            Some(prev) => source.diff_between(prev, &commit.sha)?,
            None => source.initial_import_diff(&commit.sha)?,
        };
        engine.compute(commit, &diff)
    };

    let mut processed = 0usize;
    let mut latest_sha = baseline.clone();
    let outcome = pool::for_each_ordered(jobs, tasks, work, |(_, commit), metrics| {
        running.increment(&metrics, &mapping)?;
        db.write_commit(&commit, &metrics, &mapping, &mut has_data, running.as_map())?;
        debug!(commit = commit.short_sha(), changes = metrics.len(), "recorded commit");

        processed += 1;
        pb.set_message(commit.short_sha().to_string());
        pb.inc(1);
        latest_sha = Some(commit.sha);
        Ok(())
    });

    match &outcome {
        Ok(()) => pb.finish_with_message("Metrics recorded"),
        Err(_) => pb.abandon_with_message("Aborted"),
    }
    outcome?;

    let summary = GenerateSummary {
        commits_processed: processed,
        baseline,
        latest_sha,
        elapsed: started.elapsed(),
    };
    info!(
        commits = summary.commits_processed,
        elapsed = %humantime::format_duration(round_ms(summary.elapsed)),
        "generate finished"
    );
    Ok(summary)
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn round_ms(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}

pub fn exec(config_path: &Path, jobs: Option<usize>) -> anyhow::Result<()> {
    let config = GenerateConfig::load(config_path).context("Failed to load generate config")?;

    let selection = ParserSelection {
        extra: config.metric_parsers.clone(),
        skip_defaults: config.skip_default_metrics,
    };
    let parsers = ParserRegistry::with_builtins()
        .build(&selection)
        .context("Failed to build metric parsers")?;
    let engine =
        MetricEngine::new(parsers, config.exclude.clone()).context("Invalid metric parser set")?;
    debug!(parsers = ?engine.parser_names(), "metric parsers ready");

    let repo = GitRepo::open(Some(&config.repo)).context("Failed to open git repository")?;

    let mut db = if config.database.exists() {
        let db = Database::open(&config.database).context("Failed to open database")?;
        ensure_metrics_registered(&db, &engine)?;
        db
    } else {
        create_database(&config.database, &engine).context("Failed to create database")?
    };

    let jobs = jobs.unwrap_or_else(pool::default_jobs);
    let show_progress = console::Term::stderr().is_term();
    let summary = load_data(&mut db, &repo, &engine, jobs, show_progress)
        .context("Failed to generate metrics")?;

    output_summary(&summary, &config.database);
    Ok(())
}

fn output_summary(summary: &GenerateSummary, database: &Path) {
    println!("{}", style("Generate Summary").bold());
    println!("Database: {}", style(database.display()).dim());
    println!(
        "Commits processed: {}",
        style(summary.commits_processed).cyan()
    );
    match &summary.baseline {
        Some(sha) => println!("Resumed from: {}", style(short(sha)).yellow()),
        None => println!("Resumed from: {}", style("fresh database").yellow()),
    }
    if let Some(sha) = &summary.latest_sha {
        println!("Latest commit: {}", style(short(sha)).green());
    }
    println!(
        "Elapsed: {}",
        humantime::format_duration(round_ms(summary.elapsed))
    );
}

fn short(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}
