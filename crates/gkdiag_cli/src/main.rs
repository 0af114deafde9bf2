mod args;
mod logging;

use anyhow::{bail, Context, Result};
use args::{AvgFluxArgs, Cli, Command, QlCoefsArgs, QlShapeArgs, QlSpectrumArgs, WindowArgs};
use clap::Parser;
use gkdiag_core::flux::{
    apply_coefficients, assemble_ql_spectrum, create_shape, ky_spectra, read_flux_spectra,
    run_average, select_columns, time_average, CoefficientTable, QlRun, TimeAverage,
};
use gkdiag_core::io::nrg::NrgDirectory;
use gkdiag_core::io::params::ParameterFile;
use gkdiag_core::io::table::Table;
use gkdiag_core::quantity::NrgColumn;
use gkdiag_core::settings::{OutputSettings, TimeWindow};
use ndarray::{Array2, Array3, ArrayView2, Axis, Ix2};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let output = output_settings(&cli)?;
    match cli.command {
        Command::AvgFlux(args) => avg_flux(&args, &output),
        Command::QlShape(args) => ql_shape(&args, &output),
        Command::QlCoefs(args) => ql_coefs(&args),
        Command::QlSpectrum(args) => ql_spectrum(&args, &output),
    }
}

fn output_settings(cli: &Cli) -> Result<OutputSettings> {
    let mut output = match &cli.settings {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open settings {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse settings {}", path.display()))?
        }
        None => OutputSettings::default(),
    };
    if cli.print {
        output.emit_to_console = true;
    }
    if let Some(dir) = &cli.output {
        output.emit_to_file = Some(dir.clone());
    }
    Ok(output)
}

fn emit(output: &OutputSettings, file_name: &str, blocks: &[Table]) -> Result<()> {
    if !output.emit_to_console && output.emit_to_file.is_none() {
        tracing::warn!(file_name, "no output destination, pass --print or --output");
        return Ok(());
    }
    output.emit(file_name, blocks)?;
    Ok(())
}

fn columns_from(indices: &[usize]) -> Result<Vec<NrgColumn>> {
    indices
        .iter()
        .map(|&i| Ok(NrgColumn::from_index(i)?))
        .collect()
}

fn window_from(args: &WindowArgs) -> Result<TimeWindow> {
    TimeWindow::new(args.start, args.end)
}

fn header(lead: &str, columns: &[NrgColumn]) -> String {
    let labels: Vec<&str> = columns.iter().map(|c| c.label()).collect();
    format!("{lead} {}", labels.join(" "))
}

/// Rows of `(species, values...)` with species numbered from 1.
fn species_rows(values: ArrayView2<'_, f64>) -> Array2<f64> {
    let (nspec, ncols) = values.dim();
    Array2::from_shape_fn((nspec, ncols + 1), |(sp, c)| {
        if c == 0 {
            (sp + 1) as f64
        } else {
            values[[sp, c - 1]]
        }
    })
}

fn avg_flux(args: &AvgFluxArgs, output: &OutputSettings) -> Result<()> {
    let window = window_from(&args.window)?;
    let columns = columns_from(&args.columns)?;
    let source = NrgDirectory::new(&args.dir);
    let average = time_average(&args.runs, &window, args.nspec, &source)?;
    if average.kept.is_empty() {
        bail!("No run has samples inside ({}, {}).", window.start, window.end);
    }
    let selected = select_columns(&average.records, &columns);

    let blocks = if args.average {
        let mean = run_average(&selected.into_dyn())?.into_dimensionality::<Ix2>()?;
        vec![Table::new(header("species", &columns), species_rows(mean.view()))]
    } else {
        average
            .kept
            .iter()
            .enumerate()
            .map(|(i, &irun)| {
                let lead = format!("run {} species", args.runs[irun]);
                Table::new(
                    header(&lead, &columns),
                    species_rows(selected.index_axis(Axis(0), i)),
                )
            })
            .collect()
    };
    emit(output, "avg_nrg.dat", &blocks)
}

fn read_spectra(path: &Path) -> Result<Vec<Array2<f64>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open flux spectrum {}", path.display()))?;
    read_flux_spectra(BufReader::new(file))
        .with_context(|| format!("Failed to parse flux spectrum {}", path.display()))
}

fn ql_shape(args: &QlShapeArgs, output: &OutputSettings) -> Result<()> {
    let nl = ky_spectra(&read_spectra(&args.nl_flux)?);
    let ql = ky_spectra(&read_spectra(&args.ql_flux)?);
    let (Some(nl), Some(ql)) = (nl.first(), ql.first()) else {
        bail!("Both spectra need at least one ky block.");
    };
    let shape = create_shape(nl, ql)?;
    emit(output, "ql_shape.dat", &[shape.to_table()?])
}

/// Loads the quasilinear runs and time-averages them, dropping runs with no
/// sample in the window.
fn load_ql_runs(paths: &[PathBuf], window: &WindowArgs) -> Result<(Vec<(PathBuf, QlRun)>, TimeAverage)> {
    let window = window_from(window)?;
    let mut runs = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid parameter file name {}", path.display()))?;
        let params = ParameterFile::from_path(path)?;
        runs.push((path.clone(), QlRun::from_parameters(file_name, params)?));
    }
    let Some((first_path, first)) = runs.first() else {
        bail!("At least one quasilinear parameter file is required.");
    };
    let dir = first_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let nspec = first.species.len();
    let names: Vec<String> = runs.iter().map(|(_, run)| run.name.clone()).collect();
    let average = time_average(&names, &window, nspec, &NrgDirectory::new(dir))?;
    let kept = runs
        .into_iter()
        .enumerate()
        .filter(|(i, _)| average.kept.contains(i))
        .map(|(_, run)| run)
        .collect::<Vec<_>>();
    if kept.is_empty() {
        bail!("No quasilinear run has samples inside the window.");
    }
    Ok((kept, average))
}

fn ql_coefs(args: &QlCoefsArgs) -> Result<()> {
    let columns = columns_from(&args.columns)?;
    let (runs, average) = load_ql_runs(&args.ql_params, &args.window)?;
    let ql_fluxes: Array3<f64> = select_columns(&average.records, &columns);
    let nl_spectra = ky_spectra(&read_spectra(&args.nl_flux)?);

    let species = runs[0].1.species.clone();
    let ky = runs.iter().map(|(_, run)| run.kymin).collect();
    let table = CoefficientTable::build(species, &nl_spectra, &ql_fluxes, ky, columns)?;

    let (paths, mut ql_runs): (Vec<PathBuf>, Vec<QlRun>) = runs.into_iter().unzip();
    apply_coefficients(&table, &mut ql_runs)?;
    for (path, run) in paths.iter().zip(&ql_runs) {
        let mut target = path.clone().into_os_string();
        target.push(&args.output_suffix);
        let target = PathBuf::from(target);
        let file = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let mut writer = BufWriter::new(file);
        run.params.write_to(&mut writer)?;
        writer.flush()?;
        tracing::info!(path = %target.display(), "wrote parameters");
    }
    Ok(())
}

fn ql_spectrum(args: &QlSpectrumArgs, output: &OutputSettings) -> Result<()> {
    let columns = columns_from(&args.columns)?;
    let (runs, average) = load_ql_runs(&args.ql_params, &args.window)?;
    let averages = select_columns(&average.records, &columns);
    let ql_runs: Vec<QlRun> = runs.into_iter().map(|(_, run)| run).collect();
    for spectrum in assemble_ql_spectrum(&ql_runs, &averages, &columns)? {
        let file_name = format!("{}_{}.dat", args.name, spectrum.species);
        emit(output, &file_name, &[spectrum.table])?;
    }
    Ok(())
}
