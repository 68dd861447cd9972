use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info};

use hoops_points::config::IngestConfig;
use hoops_points::ingest::{IngestContext, IngestSummary};
use hoops_points::logging::init_logging;
use hoops_points::records::parse_seasons;
use hoops_points::stats_source::NbaStatsClient;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let mut config = IngestConfig::from_env();
    if let Some(path) = parse_value_arg("--db") {
        config.db_path = PathBuf::from(path);
    }
    if let Some(raw) = parse_value_arg("--seasons") {
        config.seasons = parse_seasons(Some(&raw));
    }
    if has_flag("--refresh-meta") {
        config.refresh_player_meta = true;
    }
    let interval = parse_value_arg("--interval-secs")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let client = NbaStatsClient::new().context("build stats client")?;
    let mut ctx = IngestContext::open(client, config).context("open ingest store")?;

    let Some(interval) = interval else {
        let summary = ctx.run()?;
        print_summary(&ctx.config().db_path, &summary);
        ctx.close()?;
        return Ok(());
    };

    info!(secs = interval.as_secs(), "polling mode; stop with Ctrl-C");
    loop {
        let started = Instant::now();
        match ctx.run() {
            Ok(summary) => print_summary(&ctx.config().db_path, &summary),
            Err(err) => error!(error = %err, "ingest run failed; retrying next interval"),
        }
        let elapsed = started.elapsed();
        if let Some(wait) = interval.checked_sub(elapsed) {
            std::thread::sleep(wait);
        }
    }
}

fn print_summary(db_path: &std::path::Path, summary: &IngestSummary) {
    println!("Ingest complete");
    println!("DB: {}", db_path.display());
    println!("Seasons: {:?}", summary.seasons);
    for stage in &summary.stages {
        println!(
            "{}: {}/{} ok, {} skipped, {} rows",
            stage.stage,
            stage.units_succeeded,
            stage.units_total,
            stage.units_skipped,
            stage.rows_written
        );
        if !stage.errors.is_empty() {
            println!("  errors: {}", stage.errors.len());
            for err in stage.errors.iter().take(6) {
                println!("   - {err}");
            }
        }
    }
}

fn parse_value_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
