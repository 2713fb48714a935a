//! The module responsible for writing output data to disk.
use crate::model::ModelVariant;
use crate::optimisation::Solution;
use crate::report::{
    HourlyInjection, StationHourRecord, create_hourly_injections, create_station_hour_records,
};
use anyhow::{Context, Result, ensure};
use serde::Serialize;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;
use metadata::write_metadata;

/// The output file name for per-station, per-hour results
const STATION_HOURS_FILE_NAME: &str = "station_hours.csv";

/// The output file name for hourly reserve usage
const HOURLY_INJECTIONS_FILE_NAME: &str = "hourly_injections.csv";

/// The output file name for the run summary
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// Get the default output directory for the model specified at `model_dir`.
///
/// This is a subdirectory of `results_root` with the same name as the model directory.
pub fn get_output_dir(model_dir: &Path, results_root: PathBuf) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let model_dir = model_dir
        .canonicalize()
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([results_root, model_name.into()].iter().collect())
}

/// Create a new output directory for the model, optionally overwriting existing data
///
/// # Arguments
///
/// * `output_dir` - The output directory to create/overwrite
/// * `allow_overwrite` - Whether to delete and recreate the folder if it is non-empty
///
/// # Returns
///
/// `true` if an existing non-empty folder was deleted, `false` otherwise.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. \
            Please delete the folder or pass the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Headline figures for a solved model
#[derive(Debug, PartialEq, Serialize)]
struct Summary {
    variant: ModelVariant,
    reserve_size: f64,
    objective_value: f64,
    total_loss: f64,
    total_transfers: u32,
}

impl Summary {
    fn new(solution: &Solution) -> Self {
        Self {
            variant: solution.variant(),
            reserve_size: solution.reserve_size(),
            objective_value: solution.objective_value(),
            total_loss: solution.total_loss(),
            total_transfers: solution.total_transfers(),
        }
    }
}

/// An object for writing the results of a run to file
pub struct DataWriter {
    output_path: PathBuf,
    station_hours_writer: csv::Writer<File>,
    hourly_injections_writer: csv::Writer<File>,
}

impl DataWriter {
    /// Open CSV files to write output data to and write run metadata
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `model_path` - Path to input model
    pub fn create(output_path: &Path, model_path: &Path) -> Result<Self> {
        write_metadata(output_path, model_path).context("Failed to save metadata")?;

        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(&file_path)
                .with_context(|| format!("Could not create {}", file_path.display()))
        };

        Ok(Self {
            output_path: output_path.to_path_buf(),
            station_hours_writer: new_writer(STATION_HOURS_FILE_NAME)?,
            hourly_injections_writer: new_writer(HOURLY_INJECTIONS_FILE_NAME)?,
        })
    }

    /// Write all results for the given solution
    pub fn write_solution(&mut self, solution: &Solution) -> Result<()> {
        self.write_station_hours(&create_station_hour_records(solution))?;
        self.write_hourly_injections(&create_hourly_injections(solution))?;
        self.write_summary(&Summary::new(solution))
    }

    /// Write per-station, per-hour records to file
    pub fn write_station_hours(&mut self, records: &[StationHourRecord]) -> Result<()> {
        for record in records {
            self.station_hours_writer.serialize(record)?;
        }

        Ok(())
    }

    /// Write hourly reserve usage to file
    pub fn write_hourly_injections(&mut self, injections: &[HourlyInjection]) -> Result<()> {
        for injection in injections {
            self.hourly_injections_writer.serialize(injection)?;
        }

        Ok(())
    }

    fn write_summary(&self, summary: &Summary) -> Result<()> {
        let file_path = self.output_path.join(SUMMARY_FILE_NAME);
        fs::write(&file_path, toml::to_string(summary)?)
            .with_context(|| format!("Could not write {}", file_path.display()))
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.station_hours_writer.flush()?;
        self.hourly_injections_writer.flush()?;

        Ok(())
    }
}
