//! Code for reading [`Station`]s from a CSV file.
use super::{input_err_msg, read_csv};
use crate::station::{Station, StationMap};
use anyhow::{Context, Result, ensure};
use std::path::Path;

const STATIONS_FILE_NAME: &str = "stations.csv";

/// Read stations CSV file from model directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A [`StationMap`] or an error.
pub fn read_stations(model_dir: &Path) -> Result<StationMap> {
    let file_path = model_dir.join(STATIONS_FILE_NAME);
    let stations_csv = read_csv(&file_path)?;
    read_stations_from_iter(stations_csv).with_context(|| input_err_msg(&file_path))
}

fn read_stations_from_iter<I>(iter: I) -> Result<StationMap>
where
    I: Iterator<Item = Station>,
{
    let mut stations = StationMap::new();
    for station in iter {
        check_capacity(&station)?;
        let id = station.id.clone();
        ensure!(
            stations.insert(id.clone(), station).is_none(),
            "Duplicate station ID found: {id}"
        );
    }

    Ok(stations)
}

/// Check that a station's capacity is a finite, non-negative number
pub fn check_capacity(station: &Station) -> Result<()> {
    ensure!(
        station.capacity.is_finite() && station.capacity >= 0.0,
        "Invalid capacity for station {} ({}). Must be a finite number >= 0.",
        station.id,
        station.capacity
    );

    Ok(())
}
