//! Replay command - score the forecast against a stored session's pit stops.

use std::sync::Arc;

use tirecast::physics::PhysicsModel;
use tirecast::predictor::{replay_session, PredictionCoordinator};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the replay command.
pub fn run(session_id: &str, json: bool, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("replay");
    let engine = runner.engine_config();

    let store = runner.store();
    let stored = store
        .find(session_id)?
        .ok_or_else(|| CliError::SessionNotFound(session_id.to_string()))?;
    let record = store.load(&stored)?;

    let mut coordinator = PredictionCoordinator::new(
        engine.coordinator.clone(),
        PhysicsModel::new(engine.physics.clone()),
        Arc::new(runner.learner()),
        Arc::new(runner.registry()),
    );
    let report = replay_session(&mut coordinator, &record);

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::Storage(format!("failed to encode report: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    println!(
        "Session {} ({} on {})",
        record.info.session_id, record.info.car_id, record.info.track_id
    );
    println!(
        "  Samples: {} ({} rejected)",
        report.samples, report.rejected
    );
    println!();

    if report.points.is_empty() {
        println!("No pit-stop measurements to score against.");
        return Ok(());
    }

    println!("  {:>4}  {:>8}  {:>10}  {:>8}  {:>8}", "Lap", "Stint", "Confidence", "MAE", "Max");
    for point in &report.points {
        println!(
            "  {:>4}  {:>7.0}s  {:>10.2}  {:>6.1}°F  {:>6.1}°F",
            point.lap, point.stint_time, point.confidence, point.mae, point.max_error
        );
    }
    if let Some(mean) = report.mean_mae() {
        println!();
        println!("  Mean MAE: {:.1}°F", mean);
    }

    Ok(())
}
