use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use hoops_points::config::IngestConfig;
use hoops_points::export::export_feature_frame;
use hoops_points::features::{FEATURE_NAMES, build_features};
use hoops_points::logging::init_logging;
use hoops_points::store;
use hoops_points::training::{
    DEFAULT_L2, DEFAULT_TEST_SIZE, LinearPointsModel, ModelArtifact, TrainingSet, time_based_split,
};

const DEFAULT_OUT: &str = "player_points_model.json";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let config = IngestConfig::from_env();
    let db_path = parse_value_arg("--db")
        .map(PathBuf::from)
        .unwrap_or(config.db_path);
    let out_path = parse_value_arg("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));
    let l2 = parse_value_arg("--l2")
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(DEFAULT_L2);

    let conn = store::open_db(&db_path).context("open sqlite db")?;
    let rows = store::load_training_rows(&conn)?;
    if rows.is_empty() {
        return Err(anyhow!(
            "no player box scores in {}; run ingest first",
            db_path.display()
        ));
    }
    info!(rows = rows.len(), "training rows loaded");

    let frame = build_features(rows);
    if let Some(path) = parse_value_arg("--export").map(PathBuf::from) {
        let report = export_feature_frame(&path, &frame)?;
        println!("features exported: {} ({} rows)", path.display(), report.rows);
    }

    let set = TrainingSet::from_frame(&frame);
    let dropped = set.dropped;
    let (train, test) = time_based_split(set.samples, DEFAULT_TEST_SIZE);
    println!(
        "samples: train={} test={} dropped={}",
        train.len(),
        test.len(),
        dropped
    );

    let model = LinearPointsModel::fit(&train, l2)?;
    let artifact = ModelArtifact::from_model(&model, &train, &test, dropped);
    println!("train MAE: {:.2}", artifact.train_mae);
    println!(
        "test MAE: {:.2} (baseline {:.2})",
        artifact.test_mae, artifact.baseline_test_mae
    );
    for (name, coeff) in FEATURE_NAMES.iter().zip(&artifact.coeffs) {
        println!("  {name:<40} {coeff:+.4}");
    }

    if out_path.exists() {
        match ModelArtifact::load(&out_path) {
            Ok(previous) => println!(
                "previous artifact ({}): test MAE {:.2}",
                previous.generated_at, previous.test_mae
            ),
            Err(err) => warn!(path = %out_path.display(), error = %err, "previous artifact unreadable"),
        }
    }

    artifact.save(&out_path)?;
    println!();
    println!("artifact written: {}", out_path.display());
    Ok(())
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
