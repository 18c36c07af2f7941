use crate::cli::FilterArgs;
use crate::exit_codes;
use crate::output;
use clap::CommandFactory;
use vproj_rs::cache::DEFAULT_CACHE_TRIALS;
use vproj_rs::filter::DEFAULT_TRANSITION_HZ;
use vproj_rs::params::ParamFile;
use vproj_rs::{run_filter, FilterRunConfig};

/// Build the run configuration: flags first, then the parameter file.
pub fn build_config(args: &FilterArgs) -> Result<FilterRunConfig, String> {
    let params = match &args.params {
        Some(path) => ParamFile::load(path)
            .map_err(|e| format!("Cannot read parameters from {}: {}", path.display(), e))?,
        None => ParamFile::default(),
    };

    let band = match args.band {
        Some(band) => band,
        None => params
            .band()
            .map_err(|e| e.to_string())?
            .ok_or("A pass band is required (-b \"lo hi\" or 'band' in --params)")?,
    };
    let time = match args.time {
        Some(time) => time,
        None => params
            .time()
            .map_err(|e| e.to_string())?
            .ok_or("A time window is required (-t \"t0 t1\" or 'time' in --params)")?,
    };

    let mut marks: Vec<String> = args
        .marks
        .iter()
        .flat_map(|m| m.split_whitespace().map(String::from))
        .collect();
    if marks.is_empty() {
        marks = params.strings("marks").unwrap_or_default();
    }
    if marks.is_empty() {
        log::warn!("No markers given; the interchange file will hold no segments");
    }

    let transition = match args.transition {
        Some(t) => t,
        None => params
            .number("transition")
            .map_err(|e| e.to_string())?
            .unwrap_or(DEFAULT_TRANSITION_HZ),
    };
    let cache_trials = match args.cache_trials {
        Some(k) => k,
        None => match params.number("cache_trials").map_err(|e| e.to_string())? {
            Some(k) => whole_number(k, "cache_trials")? as usize,
            None => DEFAULT_CACHE_TRIALS,
        },
    };
    if cache_trials == 0 {
        return Err("cache_trials must be at least 1".to_string());
    }
    let seed = match args.seed {
        Some(seed) => Some(seed),
        None => params
            .number("seed")
            .map_err(|e| e.to_string())?
            .map(|s| whole_number(s, "seed"))
            .transpose()?,
    };

    Ok(FilterRunConfig {
        dataset: args.dataset.clone(),
        output: args.output.clone(),
        marks,
        band,
        time,
        noise: args.noise,
        hilbert: args.hilbert,
        transition,
        cache_trials,
        seed,
    })
}

fn whole_number(value: f64, key: &str) -> Result<u64, String> {
    if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(format!("{} must be a non-negative integer, got {}", key, value));
    }
    Ok(value as u64)
}

pub fn execute(args: FilterArgs) -> i32 {
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Error: {}\n\n{}", msg, FilterArgs::command().render_usage());
            return exit_codes::USAGE_ERROR;
        }
    };
    log::debug!("Run configuration: {:?}", config);

    match run_filter(&config) {
        Ok(summary) => {
            let line = format!(
                "Wrote {} segments ({} channels × {} samples, {} trials filtered) to {}",
                summary.segments,
                summary.channels,
                summary.seg_len,
                summary.trials_filtered,
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
