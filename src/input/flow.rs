//! Code for reading predicted station flows from a CSV file.
use super::{format_items_with_cap, input_err_msg, read_csv};
use crate::flow::{FlowMap, FlowObservation};
use crate::id::IDCollection;
use crate::station::StationMap;
use crate::window::PlanningWindow;
use anyhow::{Context, Result, ensure};
use itertools::iproduct;
use serde::Deserialize;
use std::path::Path;

const FLOWS_FILE_NAME: &str = "flows.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct FlowRaw {
    station_id: String,
    hour: u32,
    demand: f64,
    supply: f64,
}

impl FlowRaw {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.demand.is_finite() && self.demand >= 0.0,
            "Invalid value for demand ({}) at station {}, hour {}. Must be a finite number >= 0.",
            self.demand,
            self.station_id,
            self.hour
        );
        ensure!(
            self.supply.is_finite() && self.supply >= 0.0,
            "Invalid value for supply ({}) at station {}, hour {}. Must be a finite number >= 0.",
            self.supply,
            self.station_id,
            self.hour
        );

        Ok(())
    }
}

/// Read predicted flows from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `stations` - The known stations
/// * `window` - The planning window
///
/// # Returns
///
/// A [`FlowMap`] with an entry for every combination of station and hour, or an error.
pub fn read_flows(
    model_dir: &Path,
    stations: &StationMap,
    window: &PlanningWindow,
) -> Result<FlowMap> {
    let file_path = model_dir.join(FLOWS_FILE_NAME);
    let flows_csv = read_csv(&file_path)?;
    read_flows_from_iter(flows_csv, stations, window).with_context(|| input_err_msg(&file_path))
}

fn read_flows_from_iter<I>(
    iter: I,
    stations: &StationMap,
    window: &PlanningWindow,
) -> Result<FlowMap>
where
    I: Iterator<Item = FlowRaw>,
{
    let mut flows = FlowMap::new();
    for raw in iter {
        raw.validate()?;
        let station_id = stations.get_id(&raw.station_id)?;
        ensure!(
            window.contains(raw.hour),
            "Hour {} for station {} is not in the planning window",
            raw.hour,
            raw.station_id
        );

        let key = (station_id.clone(), raw.hour);
        ensure!(
            flows
                .insert(key, FlowObservation::new(raw.demand, raw.supply))
                .is_none(),
            "Duplicate flow entry for station {}, hour {}",
            raw.station_id,
            raw.hour
        );
    }

    check_flows_cover_window(&flows, stations, window)?;

    Ok(flows)
}

/// Check that there is a flow entry for every combination of station and hour.
///
/// Missing entries are an error rather than being treated as zero.
pub fn check_flows_cover_window(
    flows: &FlowMap,
    stations: &StationMap,
    window: &PlanningWindow,
) -> Result<()> {
    let missing: Vec<_> = iproduct!(stations.keys(), window.iter())
        .filter(|(station_id, hour)| !flows.contains_key(&((*station_id).clone(), *hour)))
        .map(|(station_id, hour)| format!("{station_id}@{hour}"))
        .collect();
    ensure!(
        missing.is_empty(),
        "Missing flow entries for the following station/hour combinations: {}",
        format_items_with_cap(missing)
    );

    Ok(())
}
