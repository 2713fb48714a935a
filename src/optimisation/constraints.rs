//! Code for adding constraints to the rebalancing optimisation problem.
use super::VariableMap;
use crate::model::Model;
use highs::RowProblem as Problem;

/// Corresponding keys for a set of constraints along with the row offset in the solution
pub struct KeysWithOffset<T> {
    offset: usize,
    keys: Vec<T>,
}

impl<T> KeysWithOffset<T> {
    /// Zip the keys with the corresponding dual values in the solution, accounting for the offset
    pub fn zip_duals<'a>(&'a self, duals: &'a [f64]) -> impl Iterator<Item = (&'a T, f64)> {
        assert!(
            self.offset + self.keys.len() <= duals.len(),
            "Bad constraint keys: dual rows out of range"
        );

        self.keys.iter().zip(duals[self.offset..].iter().copied())
    }
}

/// Indicates the hour covered by each reserve budget constraint
pub type ReserveBudgetKeys = KeysWithOffset<u32>;

/// The keys for different constraints
pub struct ConstraintKeys {
    /// Keys for reserve budget constraints
    pub reserve_budget_keys: ReserveBudgetKeys,
}

/// Add constraints for the rebalancing model.
///
/// # Arguments
///
/// * `problem` - The optimisation problem
/// * `variables` - The variables in the problem
/// * `model` - The model
/// * `reserve_size` - Number of reserve bikes which can be injected in each hour
/// * `big_m` - Constant for the transfer linking constraints; `None` if there are no transfer
///   variables
///
/// # Returns
///
/// Keys for the different constraints.
pub fn add_model_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    model: &Model,
    reserve_size: f64,
    big_m: Option<f64>,
) -> ConstraintKeys {
    add_initial_inventory_constraints(problem, variables, model);
    add_inventory_balance_constraints(problem, variables, model);
    add_loss_constraints(problem, variables, model);
    add_adjustment_limit_constraints(problem, variables, model);
    add_injection_constraints(problem, variables, model);
    let reserve_budget_keys = add_reserve_budget_constraints(problem, variables, model, reserve_size);

    if let Some(big_m) = big_m {
        add_transfer_linking_constraints(problem, variables, model, big_m);
    }

    ConstraintKeys {
        reserve_budget_keys,
    }
}

/// Every station starts the planning window empty
fn add_initial_inventory_constraints(problem: &mut Problem, variables: &VariableMap, model: &Model) {
    let first_hour = model.window.first();
    for station_id in model.stations.keys() {
        let inventory = variables.inventory.get(station_id, first_hour);
        problem.add_row(0.0..=0.0, [(inventory, 1.0)]);
    }
}

/// Carry inventory from one hour to the next.
///
/// The inventory at the start of an hour is the previous inventory plus arrivals and adjustment,
/// minus the demand which was actually served (i.e. demand less lost sales):
///
/// q[t] - q[t-1] - b[t-1] - l[t-1] = e[t-1] - s[t-1]
fn add_inventory_balance_constraints(problem: &mut Problem, variables: &VariableMap, model: &Model) {
    for station_id in model.stations.keys() {
        for (prev, next) in model.window.iter_transitions() {
            let flow = model.flow(station_id, prev);
            let rhs = -flow.net_outflow();
            problem.add_row(
                rhs..=rhs,
                [
                    (variables.inventory.get(station_id, next), 1.0),
                    (variables.inventory.get(station_id, prev), -1.0),
                    (variables.adjustment.get(station_id, prev), -1.0),
                    (variables.loss.get(station_id, prev), -1.0),
                ],
            );
        }
    }
}

/// Lost sales are at least the demand not covered by arrivals, inventory and adjustment:
///
/// l + q + b >= s - e
fn add_loss_constraints(problem: &mut Problem, variables: &VariableMap, model: &Model) {
    for (station, hour) in model.iter_station_hours() {
        let flow = model.flow(&station.id, hour);
        problem.add_row(
            flow.net_outflow()..,
            [
                (variables.loss.get(&station.id, hour), 1.0),
                (variables.inventory.get(&station.id, hour), 1.0),
                (variables.adjustment.get(&station.id, hour), 1.0),
            ],
        );
    }
}

/// Bound adjustments by what the station physically holds.
///
/// No more bikes can be removed than are present once the hour's arrivals are counted, and the
/// station cannot be filled beyond its capacity:
///
/// -e <= q + b <= capacity - e
///
/// If arrivals alone would overflow the station, this forces bikes to be removed.
fn add_adjustment_limit_constraints(problem: &mut Problem, variables: &VariableMap, model: &Model) {
    for (station, hour) in model.iter_station_hours() {
        let supply = model.flow(&station.id, hour).supply;
        problem.add_row(
            -supply..=station.capacity - supply,
            [
                (variables.adjustment.get(&station.id, hour), 1.0),
                (variables.inventory.get(&station.id, hour), 1.0),
            ],
        );
    }
}

/// Injection is at least the adjustment, so that it bounds the positive part of the adjustment:
///
/// a - b >= 0
fn add_injection_constraints(problem: &mut Problem, variables: &VariableMap, model: &Model) {
    for (station, hour) in model.iter_station_hours() {
        problem.add_row(
            0.0..,
            [
                (variables.injection.get(&station.id, hour), 1.0),
                (variables.adjustment.get(&station.id, hour), -1.0),
            ],
        );
    }
}

/// The bikes injected across all stations in an hour cannot exceed the reserve.
///
/// Only additions count towards the budget; bikes removed from one station are not available to
/// another within the same hour.
fn add_reserve_budget_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    model: &Model,
    reserve_size: f64,
) -> ReserveBudgetKeys {
    // Row offset in problem. This line **must** come before we add more constraints.
    let offset = problem.num_rows();

    let mut keys = Vec::new();
    let mut terms = Vec::new();
    for hour in model.window.iter() {
        for station_id in model.stations.keys() {
            terms.push((variables.injection.get(station_id, hour), 1.0));
        }

        problem.add_row(..=reserve_size, terms.drain(..));
        keys.push(hour);
    }

    ReserveBudgetKeys { offset, keys }
}

/// Link adjustments to the transfer indicators.
///
/// b <= M * x and -b <= M * w
///
/// These only force an indicator to one when bikes are moved; indicators are driven to zero
/// otherwise by their cost in the objective.
fn add_transfer_linking_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    model: &Model,
    big_m: f64,
) {
    for (station, hour) in model.iter_station_hours() {
        let adjustment = variables.adjustment.get(&station.id, hour);
        let added = variables.added.get(&station.id, hour);
        let removed = variables.removed.get(&station.id, hour);

        problem.add_row(..=0.0, [(adjustment, 1.0), (added, -big_m)]);
        problem.add_row(..=0.0, [(adjustment, -1.0), (removed, -big_m)]);
    }
}
