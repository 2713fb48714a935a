//! Reporting structures built from an optimal solution.
//!
//! The solution's variable values are joined with the input flows to give one record per station
//! and hour, along with hourly totals used to check that the reserve budget was respected.
use crate::optimisation::Solution;
use crate::station::StationID;
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

/// Tolerance used when checking whether the reserve budget has been exceeded
const RESERVE_TOLERANCE: f64 = 1e-6;

/// The plan and its consequences for a single station and hour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationHourRecord {
    /// The station
    pub station_id: StationID,
    /// The hour
    pub hour: u32,
    /// Predicted outflow
    pub demand: f64,
    /// Predicted inflow
    pub supply: f64,
    /// Inventory carried into the hour, before that hour's adjustment
    pub beginning_inventory: f64,
    /// Bikes added (positive) or removed (negative) by the operator
    pub bikes_added_or_removed: f64,
    /// Demand which could not be served
    pub loss_sale: f64,
    /// Whether the station was visited to add bikes (enhanced variant only)
    pub bike_added: Option<bool>,
    /// Whether the station was visited to remove bikes (enhanced variant only)
    pub bike_removed: Option<bool>,
}

/// Reserve usage for a single hour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyInjection {
    /// The hour
    pub hour: u32,
    /// Total bikes added across all stations (removals are not netted off)
    pub bikes_added: f64,
    /// The number of reserve bikes available
    pub reserve_size: f64,
    /// Reduction in the objective from one more reserve bike, net of handling it (base variant
    /// only)
    pub marginal_value: Option<f64>,
}

/// Create a record for every station and hour in the solution
pub fn create_station_hour_records(solution: &Solution) -> Vec<StationHourRecord> {
    let model = solution.model();
    let added: IndexMap<_, _> = solution
        .iter_added()
        .map(|(station_id, hour, flag)| ((station_id.clone(), hour), flag))
        .collect();
    let removed: IndexMap<_, _> = solution
        .iter_removed()
        .map(|(station_id, hour, flag)| ((station_id.clone(), hour), flag))
        .collect();

    // All variable groups share the same station-major ordering
    solution
        .iter_adjustment()
        .zip(solution.iter_inventory())
        .zip(solution.iter_loss())
        .map(|(((station_id, hour, adjustment), (_, _, inventory)), (_, _, loss))| {
            let flow = model.flow(station_id, hour);
            let key = (station_id.clone(), hour);
            StationHourRecord {
                station_id: station_id.clone(),
                hour,
                demand: flow.demand,
                supply: flow.supply,
                beginning_inventory: inventory,
                bikes_added_or_removed: adjustment,
                loss_sale: loss,
                bike_added: added.get(&key).copied(),
                bike_removed: removed.get(&key).copied(),
            }
        })
        .collect()
}

/// Total the bikes added in each hour.
///
/// A warning is logged for any hour in which the reserve budget was exceeded.
pub fn create_hourly_injections(solution: &Solution) -> Vec<HourlyInjection> {
    let mut bikes_added: IndexMap<u32, f64> =
        solution.model().window.iter().map(|hour| (hour, 0.0)).collect();
    for (_, hour, adjustment) in solution.iter_adjustment() {
        *bikes_added
            .get_mut(&hour)
            .expect("Adjustment for hour outside planning window") += adjustment.max(0.0);
    }

    let marginal_values: Option<IndexMap<u32, f64>> = solution
        .iter_reserve_marginal_values()
        .map(|iter| iter.collect());

    bikes_added
        .into_iter()
        .map(|(hour, bikes_added)| {
            if bikes_added > solution.reserve_size() + RESERVE_TOLERANCE {
                warn!(
                    "Reserve budget exceeded in hour {hour}: {bikes_added} bikes added, \
                    but only {} available",
                    solution.reserve_size()
                );
            }

            HourlyInjection {
                hour,
                bikes_added,
                reserve_size: solution.reserve_size(),
                marginal_value: marginal_values
                    .as_ref()
                    .map(|values| values[&hour]),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model;
    use crate::model::{Model, ModelVariant};
    use crate::optimisation::RebalanceRun;
    use float_cmp::approx_eq;
    use itertools::Itertools;
    use rstest::rstest;

    #[rstest]
    fn station_hour_records_base(model: Model) {
        let solution = RebalanceRun::new(&model)
            .run()
            .unwrap()
            .into_optimal()
            .unwrap();
        let records = create_station_hour_records(&solution);
        assert_eq!(records.len(), 6);

        let first = &records[0];
        assert_eq!(first.station_id, StationID::new("A"));
        assert_eq!(first.hour, 7);
        assert_eq!(first.demand, 8.0);
        assert_eq!(first.supply, 2.0);
        assert!(approx_eq!(f64, first.beginning_inventory, 0.0, epsilon = 1e-6));
        assert!(approx_eq!(f64, first.bikes_added_or_removed, 5.0, epsilon = 1e-6));
        assert!(approx_eq!(f64, first.loss_sale, 1.0, epsilon = 1e-6));
        assert!(records.iter().all(|r| r.bike_added.is_none() && r.bike_removed.is_none()));
    }

    #[rstest]
    fn beginning_inventory_excludes_adjustment(model: Model) {
        let solution = RebalanceRun::new(&model)
            .run()
            .unwrap()
            .into_optimal()
            .unwrap();
        let records = create_station_hour_records(&solution);

        // Each hour starts with what the previous hour left behind, before its own adjustment
        for (prev, next) in records.iter().tuple_windows() {
            if prev.station_id != next.station_id {
                assert!(approx_eq!(f64, next.beginning_inventory, 0.0, epsilon = 1e-6));
                continue;
            }

            let carried = prev.beginning_inventory + prev.bikes_added_or_removed + prev.supply
                - (prev.demand - prev.loss_sale);
            assert!(
                approx_eq!(f64, next.beginning_inventory, carried, epsilon = 1e-6),
                "{}@{}: {} != {carried}",
                next.station_id,
                next.hour,
                next.beginning_inventory
            );
        }
    }

    #[rstest]
    fn station_hour_records_enhanced(model: Model) {
        let solution = RebalanceRun::new(&model)
            .with_variant(ModelVariant::Enhanced)
            .run()
            .unwrap()
            .into_optimal()
            .unwrap();
        let records = create_station_hour_records(&solution);
        let visits = records
            .iter()
            .filter(|r| r.bike_added == Some(true))
            .map(|r| (r.station_id.to_string(), r.hour))
            .collect::<Vec<_>>();
        assert_eq!(visits, [("A".to_string(), 7), ("A".to_string(), 8)]);
    }

    #[rstest]
    fn hourly_injections_respect_reserve(model: Model) {
        let solution = RebalanceRun::new(&model)
            .with_variant(ModelVariant::Enhanced)
            .run()
            .unwrap()
            .into_optimal()
            .unwrap();
        let injections = create_hourly_injections(&solution);
        assert_eq!(
            injections.iter().map(|i| i.hour).collect::<Vec<_>>(),
            [7, 8, 9]
        );
        for injection in &injections {
            assert!(injection.bikes_added <= injection.reserve_size + RESERVE_TOLERANCE);
            assert!(injection.marginal_value.is_none());
        }
        assert!(approx_eq!(f64, injections[0].bikes_added, 5.0, epsilon = 1e-6));
    }

    #[rstest]
    fn hourly_injections_include_marginal_values(model: Model) {
        let solution = RebalanceRun::new(&model)
            .run()
            .unwrap()
            .into_optimal()
            .unwrap();
        let injections = create_hourly_injections(&solution);
        assert!(injections.iter().all(|i| i.marginal_value.is_some()));
    }
}
