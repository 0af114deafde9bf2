use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Flux averaging and quasilinear scaling drivers for gyrokinetic runs.
#[derive(Parser, Debug)]
#[command(author, version, about = "Gyrokinetic diagnostic post-processing", long_about = None)]
pub struct Cli {
    /// JSON file with output settings (`emit_to_console`, `emit_to_file`)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Print the resulting tables to stdout
    #[arg(short, long, global = true)]
    pub print: bool,

    /// Directory receiving the resulting tables
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Time-average the nrg fluxes of a list of runs
    AvgFlux(AvgFluxArgs),
    /// Ratio of nonlinear to quasilinear heat-flux spectra
    QlShape(QlShapeArgs),
    /// Write QL scaling coefficients into the quasilinear parameter files
    QlCoefs(QlCoefsArgs),
    /// Collect the time-averaged fluxes of quasilinear runs into ky spectra
    QlSpectrum(QlSpectrumArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct WindowArgs {
    /// Start of the averaging window
    #[arg(short, long, default_value_t = 0.0)]
    pub start: f64,

    /// End of the averaging window
    #[arg(short, long, default_value_t = 999_999.0)]
    pub end: f64,
}

#[derive(Args, Debug)]
pub struct AvgFluxArgs {
    /// Run numbers (`1`, `0003`) or `dat`
    #[arg(required = true)]
    pub runs: Vec<String>,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Number of species in the nrg files
    #[arg(short = 'n', long, default_value_t = 2)]
    pub nspec: usize,

    /// Also average over the runs
    #[arg(short, long)]
    pub average: bool,

    /// Directory holding the nrg files
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// nrg columns to keep, zero-based
    #[arg(short = 'C', long, value_delimiter = ',', default_values_t = [4, 5, 6, 7])]
    pub columns: Vec<usize>,
}

#[derive(Args, Debug)]
pub struct QlShapeArgs {
    /// Nonlinear flux spectrum file
    pub nl_flux: PathBuf,

    /// Quasilinear flux spectrum file
    pub ql_flux: PathBuf,
}

#[derive(Args, Debug)]
pub struct QlCoefsArgs {
    /// Nonlinear flux spectrum file
    pub nl_flux: PathBuf,

    /// Parameter files of the quasilinear runs, one per ky
    #[arg(required = true)]
    pub ql_params: Vec<PathBuf>,

    #[command(flatten)]
    pub window: WindowArgs,

    /// nrg columns used for the coefficients, zero-based
    #[arg(short = 'C', long, value_delimiter = ',', default_values_t = [4, 6, 5, 7])]
    pub columns: Vec<usize>,

    /// Appended to each parameter file name for the updated copy
    #[arg(long, default_value = "_new")]
    pub output_suffix: String,
}

#[derive(Args, Debug)]
pub struct QlSpectrumArgs {
    /// Parameter files of the quasilinear runs, one per ky
    #[arg(required = true)]
    pub ql_params: Vec<PathBuf>,

    #[command(flatten)]
    pub window: WindowArgs,

    /// nrg columns in the spectrum, zero-based
    #[arg(short = 'C', long, value_delimiter = ',', default_values_t = [4, 6, 5, 7])]
    pub columns: Vec<usize>,

    /// File name prefix of the per-species spectra
    #[arg(long, default_value = "spectra_ql")]
    pub name: String,
}
