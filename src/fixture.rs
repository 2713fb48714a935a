//! Fixtures for tests
use crate::flow::{FlowMap, FlowObservation};
use crate::model::{Model, ModelParameters};
use crate::station::{Station, StationID, StationMap};
use crate::window::PlanningWindow;
use rstest::fixture;
use std::fs;
use std::path::Path;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Demand and supply for stations A and B at hours 7, 8 and 9
const FLOWS: [(&str, u32, f64, f64); 6] = [
    ("A", 7, 8.0, 2.0),
    ("A", 8, 10.0, 3.0),
    ("A", 9, 4.0, 6.0),
    ("B", 7, 1.0, 12.0),
    ("B", 8, 2.0, 9.0),
    ("B", 9, 6.0, 1.0),
];

#[fixture]
pub fn stations() -> StationMap {
    [Station::new("A", 15.0), Station::new("B", 20.0)]
        .into_iter()
        .map(|station| (station.id.clone(), station))
        .collect()
}

#[fixture]
pub fn window() -> PlanningWindow {
    PlanningWindow::new(vec![7, 8, 9]).unwrap()
}

#[fixture]
pub fn parameters() -> ModelParameters {
    ModelParameters {
        reserve_size: 5.0,
        ..ModelParameters::new(vec![7, 8, 9])
    }
}

#[fixture]
pub fn flows() -> FlowMap {
    FLOWS
        .iter()
        .map(|&(station_id, hour, demand, supply)| {
            ((station_id.into(), hour), FlowObservation::new(demand, supply))
        })
        .collect()
}

#[fixture]
pub fn model(parameters: ModelParameters, stations: StationMap, flows: FlowMap) -> Model {
    Model::new(parameters, stations, flows).unwrap()
}

/// A model with a single station, with the given flows for each hour
pub fn single_station_model(
    capacity: f64,
    hourly_flows: &[(f64, f64)],
    parameters: ModelParameters,
) -> Model {
    let hours = (7..).take(hourly_flows.len()).collect();
    let stations: StationMap = [(StationID::new("S"), Station::new("S", capacity))]
        .into_iter()
        .collect();
    let flows: FlowMap = (7..)
        .zip(hourly_flows)
        .map(|(hour, &(demand, supply))| {
            ((StationID::new("S"), hour), FlowObservation::new(demand, supply))
        })
        .collect();

    Model::new(
        ModelParameters {
            hours,
            ..parameters
        },
        stations,
        flows,
    )
    .unwrap()
}

/// Write the input files for the model returned by the [`model`] fixture into `dir`
pub fn write_model_files(dir: &Path) {
    fs::write(dir.join("model.toml"), "hours = [7, 8, 9]\nreserve_size = 5\n").unwrap();
    fs::write(
        dir.join("stations.csv"),
        "station_id,capacity\nA,15\nB,20\n",
    )
    .unwrap();

    let mut flows = String::from("station_id,hour,demand,supply\n");
    for (station_id, hour, demand, supply) in FLOWS {
        flows.push_str(&format!("{station_id},{hour},{demand},{supply}\n"));
    }
    fs::write(dir.join("flows.csv"), flows).unwrap();
}
