//! Code for building and solving the rebalancing optimisation.
//!
//! For every station `i` and hour `t` the problem has an adjustment variable `b` (bikes injected,
//! or removed if negative), the inventory `q` carried into the hour, the lost sales `l` and the
//! gross injection `a >= max(b, 0)`. The enhanced variant adds binary indicators `x` and `w` which
//! flag whether bikes were added to or removed from a station, so that transfers can be counted.
//!
//! `q` is counted before the hour's adjustment: the bikes on hand after the adjustment are `q + b`,
//! and together with the hour's arrivals `e` these must lie between zero and the capacity.
use crate::model::{Model, ModelVariant};
use crate::station::{Station, StationID};
use highs::{HighsModelStatus, HighsStatus, RowProblem as Problem, Sense};
use indexmap::IndexMap;
use itertools::iproduct;
use log::{debug, info};
use std::error::Error;
use std::fmt;
use std::ops::Range;

mod constraints;
use constraints::{ConstraintKeys, add_model_constraints};

/// A decision variable in the optimisation
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
type Variable = highs::Col;

/// A map of variables keyed by station ID and hour
type StationHourVariableMap = IndexMap<(StationID, u32), Variable>;

/// A set of variables with one entry for every combination of station and hour.
///
/// The variables of a group occupy a contiguous range of columns in the problem, which is how
/// their values are read back from the solution.
#[derive(Default)]
struct VariableGroup {
    vars: StationHourVariableMap,
    idx: Range<usize>,
}

impl VariableGroup {
    /// Add a variable for each station and hour to the problem.
    ///
    /// The `add_column` closure is passed the station, the hour and the hour's position in the
    /// planning window.
    fn add_to_problem<F>(problem: &mut Problem, model: &Model, mut add_column: F) -> Self
    where
        F: FnMut(&mut Problem, &Station, u32, usize) -> Variable,
    {
        // This line **must** come before we add more variables
        let start = problem.num_cols();

        let mut vars = StationHourVariableMap::new();
        for (station, (hour_idx, hour)) in
            iproduct!(model.stations.values(), model.window.iter().enumerate())
        {
            let var = add_column(problem, station, hour, hour_idx);
            let existing = vars.insert((station.id.clone(), hour), var).is_some();
            assert!(!existing, "Duplicate entry for var");
        }

        Self {
            vars,
            idx: start..problem.num_cols(),
        }
    }

    /// Get the [`Variable`] corresponding to the given parameters.
    fn get(&self, station_id: &StationID, hour: u32) -> Variable {
        *self
            .vars
            .get(&(station_id.clone(), hour))
            .expect("No variable found for given params")
    }

    /// Zip the keys of the group with the corresponding values in the solution
    fn iter_values<'a>(
        &'a self,
        columns: &'a [f64],
    ) -> impl Iterator<Item = (&'a StationID, u32, f64)> + 'a {
        self.vars
            .keys()
            .zip(columns[self.idx.clone()].iter())
            .map(|((station_id, hour), value)| (station_id, *hour, *value))
    }
}

/// A map for easy lookup of variables in the problem.
///
/// We use this data structure for two things:
///
/// 1. In order define constraints for the optimisation
/// 2. To keep track of the combination of parameters that each variable corresponds to, for when we
///    are reading the results of the optimisation.
pub struct VariableMap {
    adjustment: VariableGroup,
    inventory: VariableGroup,
    loss: VariableGroup,
    injection: VariableGroup,
    /// Transfer indicators for added bikes. Empty for the base variant.
    added: VariableGroup,
    /// Transfer indicators for removed bikes. Empty for the base variant.
    removed: VariableGroup,
}

impl VariableMap {
    /// Create a new [`VariableMap`] and add the variables common to both variants to the problem
    ///
    /// # Arguments
    ///
    /// * `problem` - The optimisation problem
    /// * `model` - The model
    fn new_with_core_vars(problem: &mut Problem, model: &Model) -> Self {
        let params = &model.parameters;
        let num_hours = model.window.len();

        // Every bike added or removed costs `handling` in total, split between `b` and `a` so that
        // the objective contribution is `handling * |b|` once `a = max(b, 0)`
        let handling = handling_cost(params.loss_weight, params.loss_tiebreak);

        // Adjustments are free in sign; their bounds depend on inventory so are added as rows
        let adjustment = VariableGroup::add_to_problem(problem, model, |problem, _, _, _| {
            if params.integer_adjustments {
                problem.add_integer_column(-handling, f64::NEG_INFINITY..)
            } else {
                problem.add_column(-handling, f64::NEG_INFINITY..)
            }
        });

        let inventory = VariableGroup::add_to_problem(problem, model, |problem, station, _, _| {
            problem.add_column(0.0, 0.0..=station.capacity)
        });

        let loss = VariableGroup::add_to_problem(problem, model, |problem, station, hour, idx| {
            let demand = model.flow(&station.id, hour).demand;
            let coeff = loss_coefficient(params.loss_weight, params.loss_tiebreak, idx, num_hours);
            problem.add_column(coeff, 0.0..=demand)
        });

        let injection = VariableGroup::add_to_problem(problem, model, |problem, _, _, _| {
            problem.add_column(2.0 * handling, 0.0..)
        });

        Self {
            adjustment,
            inventory,
            loss,
            injection,
            added: VariableGroup::default(),
            removed: VariableGroup::default(),
        }
    }

    /// Add binary transfer indicators to the map and the problem
    ///
    /// # Arguments
    ///
    /// * `problem` - The optimisation problem
    /// * `model` - The model
    /// * `transfer_weight` - Objective weight for each transfer
    fn add_transfer_variables(&mut self, problem: &mut Problem, model: &Model, transfer_weight: f64) {
        self.added = VariableGroup::add_to_problem(problem, model, |problem, _, _, _| {
            problem.add_integer_column(transfer_weight, 0.0..=1.0)
        });
        self.removed = VariableGroup::add_to_problem(problem, model, |problem, _, _, _| {
            problem.add_integer_column(transfer_weight, 0.0..=1.0)
        });
    }

    fn has_transfer_vars(&self) -> bool {
        !self.added.vars.is_empty()
    }
}

/// Objective coefficient for lost sales in the hour at position `hour_idx` of `num_hours`.
///
/// Lost sales in earlier hours are weighted slightly more heavily. Declaring demand lost while
/// bikes are available moves those bikes into later hours, which can at best save the same amount
/// of lost sales later on; with this weighting doing so is always strictly worse.
fn loss_coefficient(loss_weight: f64, tiebreak: f64, hour_idx: usize, num_hours: usize) -> f64 {
    let hours_remaining = (num_hours - 1 - hour_idx) as f64;
    loss_weight * (1.0 + tiebreak * hours_remaining)
}

/// Objective cost of adding or removing a single bike.
///
/// This is far smaller than the cost of a lost sale, so it never changes how much demand is
/// served, but it leaves stations with nothing at stake untouched.
fn handling_cost(loss_weight: f64, tiebreak: f64) -> f64 {
    loss_weight * tiebreak
}

/// The solution to the rebalancing problem
pub struct Solution<'a> {
    solution: highs::Solution,
    variables: VariableMap,
    constraint_keys: ConstraintKeys,
    model: &'a Model,
    variant: ModelVariant,
    reserve_size: f64,
    transfer_weight: f64,
    /// The objective value reported by the solver, including the small weighting applied to lost
    /// sales in earlier hours
    pub solver_objective_value: f64,
}

impl<'a> Solution<'a> {
    /// The model this is a solution for
    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// The formulation which was solved
    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// The reserve size used for this solve
    pub fn reserve_size(&self) -> f64 {
        self.reserve_size
    }

    /// Adjustment (bikes added, or removed if negative) for each station and hour
    pub fn iter_adjustment(&self) -> impl Iterator<Item = (&StationID, u32, f64)> {
        self.variables.adjustment.iter_values(self.solution.columns())
    }

    /// Inventory carried into each hour, before that hour's adjustment
    pub fn iter_inventory(&self) -> impl Iterator<Item = (&StationID, u32, f64)> {
        self.variables.inventory.iter_values(self.solution.columns())
    }

    /// Lost sales for each station and hour
    pub fn iter_loss(&self) -> impl Iterator<Item = (&StationID, u32, f64)> {
        self.variables.loss.iter_values(self.solution.columns())
    }

    /// Indicators for bikes added to each station in each hour. Empty for the base variant.
    pub fn iter_added(&self) -> impl Iterator<Item = (&StationID, u32, bool)> {
        self.variables
            .added
            .iter_values(self.solution.columns())
            .map(|(station_id, hour, value)| (station_id, hour, value > 0.5))
    }

    /// Indicators for bikes removed from each station in each hour. Empty for the base variant.
    pub fn iter_removed(&self) -> impl Iterator<Item = (&StationID, u32, bool)> {
        self.variables
            .removed
            .iter_values(self.solution.columns())
            .map(|(station_id, hour, value)| (station_id, hour, value > 0.5))
    }

    /// Whether transfer indicators are part of the solution
    pub fn has_transfers(&self) -> bool {
        self.variables.has_transfer_vars()
    }

    /// Total lost sales across all stations and hours
    pub fn total_loss(&self) -> f64 {
        self.iter_loss().map(|(_, _, loss)| loss).sum()
    }

    /// Total number of transfers (visits to add or remove bikes). Zero for the base variant.
    pub fn total_transfers(&self) -> u32 {
        let count = self
            .iter_added()
            .chain(self.iter_removed())
            .filter(|(_, _, flag)| *flag)
            .count();
        u32::try_from(count).expect("Number of transfers overflowed u32")
    }

    /// The objective value: weighted lost sales plus, for the enhanced variant, weighted transfers
    pub fn objective_value(&self) -> f64 {
        let loss_term = self.model.parameters.loss_weight * self.total_loss();
        if self.has_transfers() {
            loss_term + self.transfer_weight * f64::from(self.total_transfers())
        } else {
            loss_term
        }
    }

    /// Marginal reduction in (weighted) lost sales from one more reserve bike in each hour.
    ///
    /// These are derived from the duals of the reserve budget constraints, so are only available
    /// for the base variant, which is a pure linear programme.
    pub fn iter_reserve_marginal_values(&self) -> Option<impl Iterator<Item = (u32, f64)>> {
        if self.has_transfers() {
            return None;
        }

        Some(
            self.constraint_keys
                .reserve_budget_keys
                .zip_duals(self.solution.dual_rows())
                .map(|(hour, dual)| (*hour, -dual)),
        )
    }
}

/// Defines the possible errors that can occur when running the solver
#[derive(Debug, Clone)]
pub enum ModelError {
    /// The solver failed to process the model.
    ///
    /// Users should not be able to trigger this error.
    Incoherent(HighsStatus),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Incoherent(status) => write!(f, "Incoherent model: {status:?}"),
        }
    }
}

impl Error for ModelError {}

/// The terminal state of a solve
pub enum SolveOutcome<'a> {
    /// An optimal solution was found
    Optimal(Solution<'a>),
    /// The solver proved that no feasible solution exists
    Infeasible,
    /// The solver stopped for another reason (e.g. it reached its time limit)
    OtherTerminal(HighsModelStatus),
}

impl<'a> SolveOutcome<'a> {
    /// Get the optimal solution, or an error describing why there isn't one
    pub fn into_optimal(self) -> anyhow::Result<Solution<'a>> {
        match self {
            SolveOutcome::Optimal(solution) => Ok(solution),
            SolveOutcome::Infeasible => {
                anyhow::bail!("No feasible solution: the solver reported that the model is infeasible")
            }
            SolveOutcome::OtherTerminal(status) => {
                anyhow::bail!("No feasible solution: the solver terminated with status {status:?}")
            }
        }
    }
}

impl fmt::Debug for SolveOutcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveOutcome::Optimal(solution) => {
                write!(f, "Optimal({})", solution.objective_value())
            }
            SolveOutcome::Infeasible => write!(f, "Infeasible"),
            SolveOutcome::OtherTerminal(status) => write!(f, "OtherTerminal({status:?})"),
        }
    }
}

/// A fully-specified optimisation problem, ready to be solved.
///
/// Building is separated from solving so that a problem can be inspected before it is handed to
/// the solver.
pub struct RebalanceProblem<'a> {
    problem: Problem,
    variables: VariableMap,
    constraint_keys: ConstraintKeys,
    model: &'a Model,
    variant: ModelVariant,
    reserve_size: f64,
    transfer_weight: f64,
}

impl<'a> RebalanceProblem<'a> {
    /// Number of variables in the problem
    pub fn num_cols(&self) -> usize {
        self.problem.num_cols()
    }

    /// Number of constraints in the problem
    pub fn num_rows(&self) -> usize {
        self.problem.num_rows()
    }

    /// Solve the problem, blocking until the solver terminates.
    ///
    /// # Arguments
    ///
    /// * `time_limit` - Optional wall-clock limit for the solver, in seconds
    pub fn solve(self, time_limit: Option<f64>) -> Result<SolveOutcome<'a>, ModelError> {
        let mut highs_model = self.problem.optimise(Sense::Minimise);
        highs_model.make_quiet();
        if let Some(time_limit) = time_limit {
            highs_model.set_option("time_limit", time_limit);
        }

        let solved = highs_model.try_solve().map_err(ModelError::Incoherent)?;
        let status = solved.status();
        debug!("Solver terminated with status {status:?}");

        let outcome = match status {
            HighsModelStatus::Optimal => SolveOutcome::Optimal(Solution {
                solution: solved.get_solution(),
                variables: self.variables,
                constraint_keys: self.constraint_keys,
                model: self.model,
                variant: self.variant,
                reserve_size: self.reserve_size,
                transfer_weight: self.transfer_weight,
                solver_objective_value: solved.objective_value(),
            }),
            // Every column is bounded through the rows and the objective is at least zero once
            // `a = max(b, 0)`, so the problem cannot be unbounded
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                SolveOutcome::Infeasible
            }
            status => SolveOutcome::OtherTerminal(status),
        };

        Ok(outcome)
    }
}

/// Provides the interface for running the rebalancing optimisation.
///
/// By default the parameters from the model are used; these can be overridden for a single run
/// with the `with_*` methods, e.g. to compare different reserve sizes.
pub struct RebalanceRun<'model> {
    model: &'model Model,
    variant: ModelVariant,
    reserve_size: f64,
    transfer_weight: f64,
    time_limit: Option<f64>,
}

impl<'model> RebalanceRun<'model> {
    /// Create a new [`RebalanceRun`] for the specified model
    pub fn new(model: &'model Model) -> Self {
        let params = &model.parameters;
        Self {
            model,
            variant: params.variant,
            reserve_size: params.reserve_size,
            transfer_weight: params.transfer_weight,
            time_limit: params.time_limit,
        }
    }

    /// Use the specified formulation
    pub fn with_variant(self, variant: ModelVariant) -> Self {
        Self { variant, ..self }
    }

    /// Use the specified number of reserve bikes per hour
    pub fn with_reserve_size(self, reserve_size: f64) -> Self {
        assert!(
            reserve_size.is_finite() && reserve_size >= 0.0,
            "Reserve size must be a finite number >= 0"
        );

        Self {
            reserve_size,
            ..self
        }
    }

    /// Use the specified objective weight for transfers (enhanced variant only)
    pub fn with_transfer_weight(self, transfer_weight: f64) -> Self {
        assert!(
            transfer_weight.is_finite() && transfer_weight >= 0.0,
            "Transfer weight must be a finite number >= 0"
        );

        Self {
            transfer_weight,
            ..self
        }
    }

    /// Limit the solver's wall-clock time
    pub fn with_time_limit(self, time_limit: f64) -> Self {
        assert!(
            time_limit.is_finite() && time_limit > 0.0,
            "Time limit must be a finite number > 0"
        );

        Self {
            time_limit: Some(time_limit),
            ..self
        }
    }

    /// Build the optimisation problem without solving it
    pub fn build(&self) -> RebalanceProblem<'model> {
        let mut problem = Problem::default();
        let mut variables = VariableMap::new_with_core_vars(&mut problem, self.model);

        let big_m = if self.variant == ModelVariant::Enhanced {
            variables.add_transfer_variables(&mut problem, self.model, self.transfer_weight);
            Some(self.model.big_m())
        } else {
            None
        };

        let constraint_keys =
            add_model_constraints(&mut problem, &variables, self.model, self.reserve_size, big_m);

        debug!(
            "Built {} model with {} variables and {} constraints",
            self.variant,
            problem.num_cols(),
            problem.num_rows()
        );

        RebalanceProblem {
            problem,
            variables,
            constraint_keys,
            model: self.model,
            variant: self.variant,
            reserve_size: self.reserve_size,
            transfer_weight: self.transfer_weight,
        }
    }

    /// Build and solve the optimisation problem.
    ///
    /// # Returns
    ///
    /// The terminal state of the solver, or an error if the solver could not process the model.
    pub fn run(&self) -> Result<SolveOutcome<'model>, ModelError> {
        info!(
            "Solving {} model for {} stations over {} hours (reserve size: {})",
            self.variant,
            self.model.stations.len(),
            self.model.window.len(),
            self.reserve_size
        );

        let outcome = self.build().solve(self.time_limit)?;
        if let SolveOutcome::Optimal(solution) = &outcome {
            debug!(
                "Solver objective {}: total lost sales {:.3}, transfers {}",
                solution.solver_objective_value,
                solution.total_loss(),
                solution.total_transfers()
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{model, parameters, single_station_model};
    use crate::flow::{FlowMap, FlowObservation};
    use crate::model::ModelParameters;
    use crate::station::StationMap;
    use float_cmp::approx_eq;
    use itertools::Itertools;
    use rstest::rstest;
    use std::collections::HashMap;

    /// Tolerance for checking properties of solutions
    const TOL: f64 = 1e-6;

    fn solve(run: RebalanceRun<'_>) -> Solution<'_> {
        run.run().unwrap().into_optimal().unwrap()
    }

    fn to_map<'a>(
        iter: impl Iterator<Item = (&'a StationID, u32, f64)>,
    ) -> HashMap<(StationID, u32), f64> {
        iter.map(|(station_id, hour, value)| ((station_id.clone(), hour), value))
            .collect()
    }

    /// Check the properties every optimal solution must satisfy
    fn check_solution_properties(solution: &Solution) {
        let model = solution.model();
        let adjustment = to_map(solution.iter_adjustment());
        let inventory = to_map(solution.iter_inventory());
        let loss = to_map(solution.iter_loss());

        for (station, hour) in model.iter_station_hours() {
            let key = (station.id.clone(), hour);
            let (b, q, l) = (adjustment[&key], inventory[&key], loss[&key]);
            let flow = model.flow(&station.id, hour);

            assert!(q >= -TOL && q <= station.capacity + TOL, "{key:?}: bad inventory {q}");
            if hour == model.window.first() {
                assert!(q.abs() < TOL, "{key:?}: station does not start empty");
            }
            assert!(l >= -TOL, "{key:?}: negative loss {l}");

            let shortfall = (flow.demand - flow.supply - q - b).max(0.0);
            assert!(
                approx_eq!(f64, l, shortfall, epsilon = 1e-5),
                "{key:?}: loss {l} is not equal to shortfall {shortfall}"
            );
        }

        for (hour, injected) in hourly_positive_adjustment(&adjustment) {
            assert!(
                injected <= solution.reserve_size() + TOL,
                "Reserve exceeded in hour {hour}: {injected}"
            );
        }
    }

    fn hourly_positive_adjustment(adjustment: &HashMap<(StationID, u32), f64>) -> Vec<(u32, f64)> {
        adjustment
            .iter()
            .map(|((_, hour), b)| (*hour, b.max(0.0)))
            .into_grouping_map()
            .sum()
            .into_iter()
            .collect()
    }

    #[rstest]
    #[case(ModelVariant::Base)]
    #[case(ModelVariant::Enhanced)]
    fn solution_properties_hold(model: Model, #[case] variant: ModelVariant) {
        let solution = solve(RebalanceRun::new(&model).with_variant(variant));
        check_solution_properties(&solution);

        // Station A is short by 6 bikes at 7am and 7 bikes at 8am, but only 5 reserve bikes are
        // available each hour
        assert!(approx_eq!(f64, solution.total_loss(), 3.0, epsilon = TOL));
    }

    #[rstest]
    fn base_variant_has_no_transfers(model: Model) {
        let solution = solve(RebalanceRun::new(&model));
        assert!(!solution.has_transfers());
        assert_eq!(solution.total_transfers(), 0);
        assert_eq!(solution.iter_added().count(), 0);
        assert!(approx_eq!(
            f64,
            solution.objective_value(),
            solution.total_loss(),
            epsilon = TOL
        ));
    }

    #[rstest]
    fn enhanced_indicators_match_adjustments(model: Model) {
        let solution = solve(RebalanceRun::new(&model).with_variant(ModelVariant::Enhanced));
        let adjustment = to_map(solution.iter_adjustment());
        for ((station_id, hour, added), (_, _, removed)) in
            solution.iter_added().zip(solution.iter_removed())
        {
            let b = adjustment[&(station_id.clone(), hour)];
            assert_eq!(added, b > TOL, "{station_id}@{hour}: b = {b}");
            assert_eq!(removed, b < -TOL, "{station_id}@{hour}: b = {b}");
        }

        // Only station A needs visiting, at 7am and 8am
        assert_eq!(solution.total_transfers(), 2);
        assert!(approx_eq!(f64, solution.objective_value(), 5.0, epsilon = TOL));
    }

    #[rstest]
    #[case(5.0, 0.0, 10.0)] // no reserve: all demand is lost
    #[case(20.0, 10.0, 0.0)] // reserve closes the gap
    #[case(20.0, 4.0, 6.0)] // reserve partly closes the gap
    #[case(5.0, 10.0, 5.0)] // capacity limits the injection
    fn single_station_single_hour(
        parameters: ModelParameters,
        #[case] capacity: f64,
        #[case] reserve_size: f64,
        #[case] expected_loss: f64,
    ) {
        let model = single_station_model(
            capacity,
            &[(10.0, 0.0)],
            ModelParameters {
                reserve_size,
                ..parameters
            },
        );
        let solution = solve(RebalanceRun::new(&model));
        check_solution_properties(&solution);

        let (_, _, b) = solution.iter_adjustment().exactly_one().ok().unwrap();
        let (_, _, l) = solution.iter_loss().exactly_one().ok().unwrap();
        assert!(approx_eq!(f64, l, expected_loss, epsilon = TOL));
        assert!(approx_eq!(f64, b, 10.0 - expected_loss, epsilon = TOL));
    }

    #[rstest]
    fn zero_reserve_still_solves(model: Model) {
        let solution = solve(RebalanceRun::new(&model).with_reserve_size(0.0));
        check_solution_properties(&solution);
        assert!(solution.total_loss().is_finite());
        assert!(approx_eq!(f64, solution.total_loss(), 13.0, epsilon = TOL));
    }

    #[rstest]
    fn increasing_reserve_never_increases_loss(model: Model) {
        let losses = [0.0, 1.0, 2.5, 5.0, 7.0, 10.0, 20.0]
            .into_iter()
            .map(|reserve_size| {
                solve(RebalanceRun::new(&model).with_reserve_size(reserve_size)).total_loss()
            })
            .collect_vec();

        for (before, after) in losses.iter().tuple_windows() {
            assert!(after <= &(before + 1e-4), "Loss increased: {losses:?}");
        }
        assert!(approx_eq!(f64, *losses.last().unwrap(), 0.0, epsilon = TOL));
    }

    #[rstest]
    fn stations_are_not_linked(parameters: ModelParameters) {
        // One station is short of bikes and the other has a surplus, but bikes cannot be moved
        // between them
        let stations: StationMap = ["short", "surplus"]
            .into_iter()
            .map(|id| (StationID::new(id), Station::new(id, 30.0)))
            .collect();
        let flows: FlowMap = [
            ((StationID::new("short"), 7), FlowObservation::new(20.0, 0.0)),
            ((StationID::new("surplus"), 7), FlowObservation::new(0.0, 20.0)),
        ]
        .into_iter()
        .collect();
        let model = Model::new(
            ModelParameters {
                hours: vec![7],
                reserve_size: 0.0,
                ..parameters
            },
            stations,
            flows,
        )
        .unwrap();

        let solution = solve(RebalanceRun::new(&model));
        check_solution_properties(&solution);
        let loss = to_map(solution.iter_loss());
        assert!(approx_eq!(f64, loss[&(StationID::new("short"), 7)], 20.0, epsilon = TOL));
        assert!(approx_eq!(f64, loss[&(StationID::new("surplus"), 7)], 0.0, epsilon = TOL));
    }

    #[rstest]
    fn enhanced_without_transfer_cost_matches_base(model: Model) {
        let base = solve(RebalanceRun::new(&model));
        let enhanced = solve(
            RebalanceRun::new(&model)
                .with_variant(ModelVariant::Enhanced)
                .with_transfer_weight(0.0),
        );
        assert!(model.big_m() >= model.stations.values().map(|s| s.capacity).fold(0.0, f64::max));
        assert!(approx_eq!(
            f64,
            base.total_loss(),
            enhanced.total_loss(),
            epsilon = 1e-5
        ));
    }

    #[rstest]
    #[case(ModelVariant::Base)]
    #[case(ModelVariant::Enhanced)]
    fn idle_station_is_not_visited(parameters: ModelParameters, #[case] variant: ModelVariant) {
        let model = single_station_model(
            10.0,
            &[(0.0, 2.0), (0.0, 2.0), (0.0, 2.0)],
            ModelParameters {
                variant,
                reserve_size: 5.0,
                ..parameters
            },
        );
        let solution = solve(RebalanceRun::new(&model));
        check_solution_properties(&solution);
        assert_eq!(solution.total_transfers(), 0);
        assert!(solution.iter_adjustment().all(|(_, _, b)| b.abs() < TOL));
        assert!(approx_eq!(f64, solution.total_loss(), 0.0, epsilon = TOL));
    }

    #[rstest]
    fn stations_without_shortfall_are_left_alone(model: Model) {
        // Station B never runs short, so reserve bikes should only go to station A
        let solution = solve(RebalanceRun::new(&model));
        for (station_id, hour, b) in solution.iter_adjustment() {
            if station_id == &StationID::new("B") {
                assert!(b.abs() < TOL, "B@{hour}: b = {b}");
            }
        }
        let injected: f64 = solution.iter_adjustment().map(|(_, _, b)| b.max(0.0)).sum();
        assert!(approx_eq!(f64, injected, 10.0, epsilon = TOL));
    }

    #[rstest]
    fn overflowing_station_forces_removal(parameters: ModelParameters) {
        let model = single_station_model(
            5.0,
            &[(0.0, 10.0)],
            ModelParameters {
                variant: ModelVariant::Enhanced,
                ..parameters
            },
        );
        let solution = solve(RebalanceRun::new(&model));
        let (_, _, b) = solution.iter_adjustment().exactly_one().ok().unwrap();
        assert!(b <= -5.0 + TOL, "Expected at least 5 bikes to be removed, got {b}");
        assert_eq!(solution.total_transfers(), 1);
    }

    #[rstest]
    fn small_big_m_is_infeasible(parameters: ModelParameters) {
        // Five bikes must be removed, but big-M only allows one
        let model = single_station_model(
            5.0,
            &[(0.0, 10.0)],
            ModelParameters {
                variant: ModelVariant::Enhanced,
                big_m: Some(1.0),
                ..parameters
            },
        );
        let outcome = RebalanceRun::new(&model).run().unwrap();
        assert!(matches!(outcome, SolveOutcome::Infeasible), "{outcome:?}");
        assert!(outcome.into_optimal().is_err());
    }

    #[rstest]
    #[case(5.0, 1.0)] // binding reserve: each extra bike saves one lost sale
    #[case(20.0, 0.0)] // slack reserve
    fn reserve_marginal_values(
        parameters: ModelParameters,
        #[case] reserve_size: f64,
        #[case] expected: f64,
    ) {
        let model = single_station_model(
            20.0,
            &[(10.0, 0.0)],
            ModelParameters {
                reserve_size,
                ..parameters
            },
        );
        let solution = solve(RebalanceRun::new(&model));
        let (hour, value) = solution
            .iter_reserve_marginal_values()
            .unwrap()
            .exactly_one()
            .ok()
            .unwrap();
        assert_eq!(hour, 7);

        // Net of the (tiny) cost of handling the extra bike
        assert!(approx_eq!(f64, value, expected, epsilon = 1e-5), "{value}");
    }

    #[rstest]
    fn reserve_marginal_values_unavailable_for_enhanced(model: Model) {
        let solution = solve(RebalanceRun::new(&model).with_variant(ModelVariant::Enhanced));
        assert!(solution.iter_reserve_marginal_values().is_none());
    }

    #[rstest]
    fn integer_adjustments(parameters: ModelParameters) {
        let model = single_station_model(
            20.0,
            &[(10.0, 0.0), (7.5, 0.0)],
            ModelParameters {
                reserve_size: 4.5,
                integer_adjustments: true,
                ..parameters
            },
        );
        let solution = solve(RebalanceRun::new(&model));
        for (_, _, b) in solution.iter_adjustment() {
            assert!(approx_eq!(f64, b, b.round(), epsilon = TOL), "{b}");
        }
        // Only 4 whole bikes can be injected each hour
        assert!(approx_eq!(f64, solution.total_loss(), 6.0 + 3.5, epsilon = TOL));
    }

    #[rstest]
    #[case(ModelVariant::Base, 24, 27)]
    #[case(ModelVariant::Enhanced, 36, 39)]
    fn problem_size(
        model: Model,
        #[case] variant: ModelVariant,
        #[case] num_cols: usize,
        #[case] num_rows: usize,
    ) {
        let problem = RebalanceRun::new(&model).with_variant(variant).build();
        assert_eq!(problem.num_cols(), num_cols);
        assert_eq!(problem.num_rows(), num_rows);
    }

    #[rstest]
    fn time_limit_is_accepted(model: Model) {
        let outcome = RebalanceRun::new(&model)
            .with_variant(ModelVariant::Enhanced)
            .with_time_limit(60.0)
            .run()
            .unwrap();
        assert!(matches!(outcome, SolveOutcome::Optimal(_)));
    }

    #[test]
    fn handling_cost_is_below_any_loss_coefficient() {
        let handling = handling_cost(2.0, 1e-3);
        assert_eq!(handling, 2e-3);
        assert!(handling < loss_coefficient(2.0, 1e-3, 9, 10));
    }

    #[test]
    fn loss_coefficient_decreases_over_time() {
        assert_eq!(loss_coefficient(2.0, 0.0, 0, 3), 2.0);
        assert!(loss_coefficient(1.0, 1e-6, 0, 3) > loss_coefficient(1.0, 1e-6, 1, 3));
        assert_eq!(loss_coefficient(1.0, 1e-6, 2, 3), 1.0);
    }
}
