//! Predicted rider flows for each station and hour.
use crate::station::StationID;
use indexmap::IndexMap;

/// A map of [`FlowObservation`]s, keyed by station ID and hour
pub type FlowMap = IndexMap<(StationID, u32), FlowObservation>;

/// Predicted flows at a station for a single hour.
///
/// These are produced by an upstream forecasting model and are read-only inputs to the
/// optimisation.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct FlowObservation {
    /// Bikes starting trips at the station (outflow)
    pub demand: f64,
    /// Bikes ending trips at the station (inflow)
    pub supply: f64,
}

impl FlowObservation {
    /// Create a new [`FlowObservation`]
    pub fn new(demand: f64, supply: f64) -> Self {
        Self { demand, supply }
    }

    /// Demand which cannot be served by this hour's arrivals alone
    pub fn net_outflow(&self) -> f64 {
        self.demand - self.supply
    }
}
