//! The planning window: the ordered hours covered by a single solve.
use crate::input::is_sorted_and_unique;
use anyhow::{Result, ensure};

/// The ordered hours of a planning run.
///
/// Hours are strictly increasing; the first of them is `t0`, at which every station starts empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningWindow(Vec<u32>);

impl PlanningWindow {
    /// Create a new [`PlanningWindow`], checking that the hours are non-empty and strictly
    /// increasing.
    pub fn new(hours: Vec<u32>) -> Result<Self> {
        ensure!(!hours.is_empty(), "The planning window must contain at least one hour");
        ensure!(
            is_sorted_and_unique(&hours),
            "Hours in the planning window must be composed of unique values in order"
        );

        Ok(Self(hours))
    }

    /// The first hour of the window (`t0`)
    pub fn first(&self) -> u32 {
        // NB: non-empty is checked on construction
        self.0[0]
    }

    /// Number of hours in the window
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, since a window holds at least one hour
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `hour` belongs to the window
    pub fn contains(&self, hour: u32) -> bool {
        self.0.binary_search(&hour).is_ok()
    }

    /// Position of `hour` within the window, if present
    pub fn index_of(&self, hour: u32) -> Option<usize> {
        self.0.binary_search(&hour).ok()
    }

    /// Iterate over the hours in order
    pub fn iter(&self) -> impl Iterator<Item = u32> + Clone + '_ {
        self.0.iter().copied()
    }

    /// Iterate over pairs of consecutive hours, as `(previous, next)`
    pub fn iter_transitions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.0.windows(2).map(|pair| (pair[0], pair[1]))
    }
}
