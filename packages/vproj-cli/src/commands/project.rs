use crate::cli::ProjectArgs;
use crate::exit_codes;
use crate::output;
use vproj_rs::{run_projection, ProjectRunConfig};

pub fn build_config(args: &ProjectArgs) -> ProjectRunConfig {
    ProjectRunConfig {
        dataset: args.dataset.clone(),
        interchange: args.interchange.clone(),
        weights: args.weights.clone(),
        output: args.projections.clone(),
        dual: args.dual,
    }
}

pub fn execute(args: ProjectArgs) -> i32 {
    let config = build_config(&args);
    log::debug!("Run configuration: {:?}", config);

    match run_projection(&config) {
        Ok(summary) => {
            let line = format!(
                "Projected {} segments × {} samples onto {} voxels{} to {}",
                summary.segments,
                summary.seg_len,
                summary.voxels,
                if config.dual { " (dual basis)" } else { "" },
                summary.output.display()
            );
            if let Err(e) = output::report(&summary, args.json, &line) {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
            exit_codes::SUCCESS
        }
        Err(e) => super::fail(&e),
    }
}
