//! Stations are the docking locations between which riders move bikes.
use crate::id::define_id_type;
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {StationID}

/// A map of [`Station`]s, keyed by station ID
pub type StationMap = IndexMap<StationID, Station>;

/// A bike-docking station.
///
/// Stations are immutable for the planning horizon.
#[derive(PartialEq, Debug, Deserialize, Clone)]
pub struct Station {
    /// Unique identifier for the station
    #[serde(rename = "station_id")]
    pub id: StationID,
    /// The maximum number of bikes the station can physically hold
    pub capacity: f64,
}

impl Station {
    /// Create a new [`Station`]
    pub fn new(id: impl Into<StationID>, capacity: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
        }
    }
}
