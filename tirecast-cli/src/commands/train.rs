//! Train command - run a training pass for one car.

use tirecast::trainer::{ModelTrainer, TrainingOutcome};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the train command. `force` installs the result even if the current
/// model validates better.
pub fn run(car: &str, force: bool, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("train");

    let records = runner.store().load_car(car)?;
    let synthetic = runner.synthetic().samples_for_car(car);
    let registry = runner.registry();
    let trainer =
        ModelTrainer::new(runner.engine_config().trainer.clone().with_force(force));

    println!(
        "Training {} from {} stored session(s) and {} synthesized sample(s)...",
        car,
        records.len(),
        synthetic.len()
    );

    match trainer.train_car(car, &records, &synthetic, &registry) {
        TrainingOutcome::Trained(meta) => {
            println!("Model installed.");
            println!("  Pit stops:        {}", meta.ground_truth_count);
            println!("  Training rows:    {}", meta.training_rows);
            println!("  Validation rows:  {}", meta.validation_rows);
            println!("  Validation MAE:   {:.1}°F", meta.mean_validation_mae);
            let max_mae = runner.config().training.max_validation_mae;
            if meta.mean_validation_mae > max_mae {
                println!(
                    "  Note: above max_validation_mae ({:.1}°F); the forecast will not use it.",
                    max_mae
                );
            }
            Ok(())
        }
        TrainingOutcome::Skipped(reason) => {
            println!("Skipped: {}", reason);
            Ok(())
        }
        TrainingOutcome::Failed(e) => Err(e.into()),
    }
}
