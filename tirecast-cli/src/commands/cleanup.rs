//! Cleanup command - run a storage pass now.

use tirecast::storage::{format_size, StorageManager};
use tirecast::trainer::ModelTrainer;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the cleanup command.
pub fn run(verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("cleanup");
    let engine = runner.engine_config();

    let learner = runner.learner();
    let synthetic = runner.synthetic();
    let storage = StorageManager::new(engine.budget, runner.store(), engine.models_dir())
        .with_trainer(ModelTrainer::new(engine.trainer.clone()));
    let report = storage.run_pass(&learner, &synthetic)?;

    println!(
        "Storage: {} -> {} (budget {})",
        format_size(report.before.total()),
        format_size(report.after.total()),
        format_size(report.ceiling_bytes)
    );

    if report.freed_bytes() == 0 && report.corrupt_segments == 0 && report.skipped.is_empty() {
        println!("Nothing to clean up.");
        return Ok(());
    }

    println!("  Freed:               {}", format_size(report.freed_bytes()));
    println!("  Sessions synthesized: {}", report.synthesized.len());
    for session in &report.synthesized {
        println!("    {}", session);
    }
    println!("  Segments deleted:    {}", report.segments_deleted);
    println!("  Samples kept:        {}", report.synthetic_samples);
    if !report.skipped.is_empty() {
        println!("  Sessions kept after errors: {}", report.skipped.len());
        for session in &report.skipped {
            println!("    {}", session);
        }
    }
    if report.corrupt_segments > 0 {
        println!("  Corrupt segments:    {}", report.corrupt_segments);
    }
    if !report.models_deleted.is_empty() {
        println!("  Models deleted:      {}", report.models_deleted.len());
        for path in &report.models_deleted {
            println!("    {}", path.display());
        }
    }
    if !report.within_budget {
        println!("Warning: still over budget after cleanup.");
    }

    Ok(())
}
