use clap::{ArgAction, Parser};
use std::path::PathBuf;
use vproj_rs::{Band, TimeWindow};

fn parse_band(s: &str) -> Result<Band, String> {
    Band::parse(s).map_err(|e| e.to_string())
}

fn parse_time(s: &str) -> Result<TimeWindow, String> {
    TimeWindow::parse(s).map_err(|e| e.to_string())
}

// `-h` belongs to the pipeline options, so help is long-only.

#[derive(Parser, Debug)]
#[command(
    name = "filterds",
    version,
    about = "Extract marked segments from a MEG dataset and band-pass filter them",
    long_about = "Cut a fixed window around every occurrence of the given markers,\n\
                  band-pass filter each trial (optionally replacing it with matched\n\
                  pink noise, optionally taking the Hilbert analytic signal) and write\n\
                  the segments to an interchange file for projds.",
    disable_help_flag = true
)]
pub struct FilterArgs {
    /// Dataset directory
    #[arg(short = 'd', long)]
    pub dataset: PathBuf,

    /// Interchange file to write
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Replace each channel with pink noise of the same standard deviation
    #[arg(short = 'n', long, default_value_t = false)]
    pub noise: bool,

    /// Store the analytic signal (complex) instead of the filtered signal
    #[arg(short = 'h', long, default_value_t = false)]
    pub hilbert: bool,

    /// Marker name(s); repeatable, each value may hold several names
    #[arg(short = 'm', long = "mark")]
    pub marks: Vec<String>,

    /// Pass band in Hz, as "lo hi"
    #[arg(short = 'b', long, value_parser = parse_band, allow_hyphen_values = true)]
    pub band: Option<Band>,

    /// Window around each marker in seconds, as "t0 t1"
    #[arg(short = 't', long, value_parser = parse_time, allow_hyphen_values = true)]
    pub time: Option<TimeWindow>,

    /// Parameter file supplying band, time, marks and tuning keys
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Width of the band-pass transition bands in Hz
    #[arg(long)]
    pub transition: Option<f64>,

    /// Number of filtered trials kept in memory
    #[arg(long)]
    pub cache_trials: Option<usize>,

    /// Seed for the noise generator
    #[arg(long, env = "VPROJ_SEED")]
    pub seed: Option<u64>,

    /// Print the run summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "projds",
    version,
    about = "Project filtered MEG segments through beamformer weights",
    long_about = "Read an interchange file written by filterds and project every\n\
                  segment onto each active voxel of a weights file. Hilbert runs\n\
                  yield the envelope (magnitude) of the projected signal.",
    disable_help_flag = true
)]
pub struct ProjectArgs {
    /// Use the dual basis of the weights
    #[arg(short = 'D', long, default_value_t = false)]
    pub dual: bool,

    /// Dataset directory; weights are also looked up in its SAM/ folder
    #[arg(short = 'd', long)]
    pub dataset: PathBuf,

    /// Interchange file written by filterds
    #[arg(short = 'h', long)]
    pub interchange: PathBuf,

    /// Weights file (.nii, .nii.gz or SAM coefficients)
    #[arg(short = 'w', long)]
    pub weights: PathBuf,

    /// Projection file to write
    #[arg(short = 'p', long)]
    pub projections: PathBuf,

    /// Print the run summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}
