//! Stats command - summarize what the engine has stored and learned.

use tirecast::patterns::PatternSummary;
use tirecast::storage::{format_size, StorageManager};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the stats command.
pub fn run(verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("stats");
    let engine = runner.engine_config();

    let store = runner.store();
    let storage = StorageManager::new(engine.budget, store.clone(), engine.models_dir());
    let usage = storage.usage()?;
    let budget = storage.budget();

    println!("tirecast v{}", tirecast::VERSION);
    println!("Data directory: {}", engine.data_dir.display());
    println!();

    println!("Storage");
    println!("=======");
    println!(
        "  Used:      {} of {}",
        format_size(usage.total()),
        format_size(budget.ceiling_bytes)
    );
    println!(
        "  Sessions:  {} ({})",
        usage.sessions,
        format_size(usage.session_bytes)
    );
    println!(
        "  Models:    {} ({})",
        usage.models,
        format_size(usage.model_bytes)
    );
    println!("  Retention: {} most recent sessions", budget.retention_count);
    println!();

    let sessions = store.list()?;
    if !sessions.is_empty() {
        println!("Stored Sessions");
        println!("===============");
        for stored in &sessions {
            println!(
                "  {:<24} {:<20} {:<16} {:>3} segment(s) {:>10}",
                stored.key.session,
                stored.key.car,
                stored.key.track,
                stored.segments.len(),
                format_size(stored.bytes)
            );
        }
        println!();
    }

    let stats = runner.learner().stats();
    println!("Patterns");
    println!("========");
    println!("  Folded segments: {}", stats.folded_segments);
    println!("  Tracked sessions: {}", stats.tracked_sessions);
    print_summaries("Car classes", &stats.car_classes);
    print_summaries("Tracks", &stats.tracks);
    println!();

    let synthetic = runner.synthetic().sets();
    if !synthetic.is_empty() {
        println!("Synthesized Training Samples");
        println!("============================");
        for set in &synthetic {
            println!(
                "  {:<20} {:<16} {:>3} samples  {:>3} pit stops  from {} deleted session(s)",
                set.car_id,
                set.track_id,
                set.samples.len(),
                set.stop_count(),
                set.source_sessions
            );
        }
        println!();
    }

    let registry = runner.registry();
    println!("Models");
    println!("======");
    if registry.is_empty() {
        println!("  (none trained yet)");
    }
    for car in registry.cars() {
        let Some(model) = registry.get(&car) else {
            continue;
        };
        let meta = model.metadata();
        let trained = meta
            .trained_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {:<20} MAE {:>5.1}°F  {:>3} pit stops  {:>6} rows  trained {}",
            car, meta.mean_validation_mae, meta.ground_truth_count, meta.training_rows, trained
        );
    }

    Ok(())
}

fn print_summaries(title: &str, summaries: &[PatternSummary]) {
    println!("  {}:", title);
    if summaries.is_empty() {
        println!("    (none)");
    }
    for summary in summaries {
        println!(
            "    {:<20} {:>3} sessions  {:>3} with pit data  confidence {:.2}",
            summary.key, summary.sessions, summary.ground_truth_sessions, summary.confidence
        );
    }
}
