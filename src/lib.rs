//! Hourly bike-share rebalancing optimisation.
//!
//! Given predicted outflow (demand) and inflow (supply) for every station and hour of a planning
//! window, this crate builds a linear (or mixed-integer) model deciding how many reserve bikes to
//! inject into or remove from each station so that the total lost sales across the network are
//! minimised. An enhanced variant also minimises the number of physical visits to stations.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod example;
pub mod flow;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod optimisation;
pub mod output;
pub mod report;
pub mod settings;
pub mod station;
pub mod window;

#[cfg(test)]
mod fixture;

/// The URL of the project's issue tracker
pub const ISSUES_URL: &str = "https://github.com/bikeshare-ops/rebalance/issues";

/// Environment variable used to override the directory in which the settings file is looked for
const CONFIG_DIR_ENV_VAR: &str = "REBALANCE_CONFIG_DIR";

/// Get the directory in which program configuration files are stored.
///
/// This is taken from the `REBALANCE_CONFIG_DIR` environment variable if set, otherwise the
/// current working directory is used.
pub fn get_config_dir() -> PathBuf {
    std::env::var_os(CONFIG_DIR_ENV_VAR).map_or_else(|| PathBuf::from("."), PathBuf::from)
}
