//! The model represents the static input data for a single planning run.
use crate::flow::{FlowMap, FlowObservation};
use crate::input::flow::check_flows_cover_window;
use crate::input::station::check_capacity;
use crate::station::{Station, StationID, StationMap};
use crate::window::PlanningWindow;
use anyhow::{Result, ensure};
use itertools::iproduct;
use log::warn;

pub mod parameters;
pub use parameters::{ModelParameters, ModelVariant};

/// Model definition.
///
/// This is the immutable parameter set consumed by the optimisation. It is validated on
/// construction, so that a [`Model`] can always be turned into a well-formed optimisation problem.
#[derive(Debug, Clone)]
pub struct Model {
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// Stations in the network
    pub stations: StationMap,
    /// The hours covered by the planning run
    pub window: PlanningWindow,
    /// Predicted demand and supply for every station and hour
    pub flows: FlowMap,
}

impl Model {
    /// Create a new [`Model`], validating the inputs.
    ///
    /// # Arguments
    ///
    /// * `parameters` - Scalar parameters, including the hours of the planning window
    /// * `stations` - The stations in the network
    /// * `flows` - Predicted flows, which must cover every combination of station and hour
    pub fn new(parameters: ModelParameters, stations: StationMap, flows: FlowMap) -> Result<Self> {
        parameters.validate()?;
        let window = parameters.planning_window()?;

        ensure!(!stations.is_empty(), "The model must contain at least one station");
        for (station_id, station) in &stations {
            ensure!(
                station_id == &station.id,
                "Station stored under ID {station_id} has a different ID ({})",
                station.id
            );
            check_capacity(station)?;
        }

        for ((station_id, hour), flow) in &flows {
            ensure!(
                stations.contains_key(station_id) && window.contains(*hour),
                "Flow entry for station {station_id}, hour {hour} does not correspond to a \
                 station and hour in the model"
            );
            ensure!(
                flow.demand.is_finite()
                    && flow.demand >= 0.0
                    && flow.supply.is_finite()
                    && flow.supply >= 0.0,
                "Flows for station {station_id}, hour {hour} must be finite numbers >= 0"
            );
        }
        check_flows_cover_window(&flows, &stations, &window)?;

        let model = Self {
            parameters,
            stations,
            window,
            flows,
        };
        model.check_big_m();

        Ok(model)
    }

    /// Warn if the user-supplied big-M value might cut off feasible solutions
    fn check_big_m(&self) {
        if self.parameters.variant != ModelVariant::Enhanced {
            return;
        }

        if let Some(big_m) = self.parameters.big_m {
            let safe = self.safe_big_m();
            if big_m < safe {
                warn!(
                    "big_m ({big_m}) is smaller than the largest possible adjustment ({safe}). \
                    This may exclude feasible solutions or make the model infeasible."
                );
            }
        }
    }

    /// The smallest big-M value which can never bind artificially.
    ///
    /// An adjustment can never exceed a station's capacity plus its arrivals in any hour.
    pub fn safe_big_m(&self) -> f64 {
        self.stations
            .values()
            .map(|station| {
                let max_supply = self
                    .window
                    .iter()
                    .map(|hour| self.flow(&station.id, hour).supply)
                    .fold(0.0, f64::max);
                station.capacity + max_supply
            })
            .fold(0.0, f64::max)
    }

    /// The big-M value to use for linking constraints
    pub fn big_m(&self) -> f64 {
        self.parameters.big_m.unwrap_or_else(|| self.safe_big_m())
    }

    /// Get the predicted flow for a given station and hour.
    ///
    /// # Panics
    ///
    /// If the station or hour is not part of the model.
    pub fn flow(&self, station_id: &StationID, hour: u32) -> FlowObservation {
        *self
            .flows
            .get(&(station_id.clone(), hour))
            .expect("No flow entry for given station and hour")
    }

    /// Iterate over every combination of station and hour, in station-major order
    pub fn iter_station_hours(&self) -> impl Iterator<Item = (&Station, u32)> + Clone + '_ {
        iproduct!(self.stations.values(), self.window.iter())
    }
}
