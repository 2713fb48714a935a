//! Read and validate model parameters from `model.toml`.
//!
//! This module defines the `ModelParameters` struct and helpers for loading and
//! validating the `model.toml` configuration for a planning run. Validation
//! functions ensure sensible numeric ranges before any solver object is created.
use crate::input::{input_err_msg, read_toml};
use crate::window::PlanningWindow;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

/// The largest permitted value for `loss_tiebreak`
const MAX_LOSS_TIEBREAK: f64 = 1e-3;

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_loss_weight, f64, 1.0);
define_param_default!(default_transfer_weight, f64, 1.0);
define_param_default!(default_loss_tiebreak, f64, 1e-6);

/// Which formulation of the rebalancing model to build
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Continuous model minimising lost sales only
    #[default]
    Base,
    /// Mixed-integer model which also minimises the number of transfers
    Enhanced,
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::Base => write!(f, "base"),
            ModelVariant::Enhanced => write!(f, "enhanced"),
        }
    }
}

/// Model parameters as defined in the `model.toml` file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// The ordered hours of the planning window. The first is the hour at which stations start
    /// empty.
    pub hours: Vec<u32>,
    /// Which formulation to solve
    #[serde(default)]
    pub variant: ModelVariant,
    /// Number of reserve bikes which can be injected across all stations in each hour
    #[serde(default)]
    pub reserve_size: f64,
    /// Constant used to link adjustments to transfer indicators (enhanced variant only).
    ///
    /// If omitted, the smallest value which can never cut off a feasible solution is used.
    #[serde(default)]
    pub big_m: Option<f64>,
    /// Objective weight applied to each bike of lost sales
    #[serde(default = "default_loss_weight")]
    pub loss_weight: f64,
    /// Objective weight applied to each transfer (enhanced variant only)
    #[serde(default = "default_transfer_weight")]
    pub transfer_weight: f64,
    /// Relative extra weight given to lost sales in earlier hours. Also sets the cost of handling
    /// a single bike, as a fraction of `loss_weight`.
    ///
    /// Don't change unless you know what you're doing. Without it, the solver may report lost
    /// sales at a station even though bikes were available, or move bikes at stations where
    /// nothing is at stake, as both can be free in terms of the objective.
    #[serde(default = "default_loss_tiebreak")]
    pub loss_tiebreak: f64,
    /// Whether adjustments must be whole numbers of bikes
    #[serde(default)]
    pub integer_adjustments: bool,
    /// Wall-clock limit for the solver, in seconds
    #[serde(default)]
    pub time_limit: Option<f64>,
}

/// Check that the `reserve_size` parameter is valid
fn check_reserve_size(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "reserve_size must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check that the `big_m` parameter is valid
fn check_big_m(value: Option<f64>) -> Result<()> {
    if let Some(value) = value {
        ensure!(
            value.is_finite() && value > 0.0,
            "big_m must be a finite number greater than zero"
        );
    }

    Ok(())
}

/// Check that the `loss_weight` parameter is valid
fn check_loss_weight(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "loss_weight must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the `transfer_weight` parameter is valid
fn check_transfer_weight(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "transfer_weight must be a finite number greater than or equal to zero"
    );

    Ok(())
}

fn check_loss_tiebreak(value: f64) -> Result<()> {
    ensure!(
        (0.0..=MAX_LOSS_TIEBREAK).contains(&value),
        "loss_tiebreak must be between 0 and {MAX_LOSS_TIEBREAK}"
    );

    Ok(())
}

/// Check that the `time_limit` parameter is valid
fn check_time_limit(value: Option<f64>) -> Result<()> {
    if let Some(value) = value {
        ensure!(
            value.is_finite() && value > 0.0,
            "time_limit must be a finite number of seconds greater than zero"
        );
    }

    Ok(())
}

impl ModelParameters {
    /// Create parameters for the given hours, with default values for everything else
    pub fn new(hours: Vec<u32>) -> Self {
        Self {
            hours,
            variant: ModelVariant::default(),
            reserve_size: 0.0,
            big_m: None,
            loss_weight: default_loss_weight(),
            transfer_weight: default_transfer_weight(),
            loss_tiebreak: default_loss_tiebreak(),
            integer_adjustments: false,
            time_limit: None,
        }
    }

    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// The planning window described by the `hours` parameter
    pub fn planning_window(&self) -> Result<PlanningWindow> {
        PlanningWindow::new(self.hours.clone())
    }

    /// Validate parameters after reading in file
    pub fn validate(&self) -> Result<()> {
        // hours
        self.planning_window()?;

        // reserve_size
        check_reserve_size(self.reserve_size)?;

        // big_m
        check_big_m(self.big_m)?;

        // loss_weight
        check_loss_weight(self.loss_weight)?;

        // transfer_weight
        check_transfer_weight(self.transfer_weight)?;

        // loss_tiebreak
        check_loss_tiebreak(self.loss_tiebreak)?;

        // time_limit
        check_time_limit(self.time_limit)?;

        Ok(())
    }
}
