//! Hand-off to rainfall-runoff models
//!
//! The engine stops at watershed geometry and statistics. Turning those
//! into a hydrograph belongs to a [`RunoffModel`] implemented elsewhere;
//! this module only fixes what such a model receives.

use crate::error::QueryError;
use crate::query::WatershedResult;
use serde::{Deserialize, Serialize};

/// Watershed properties a runoff model consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunoffInputs {
    /// CRS units squared
    pub area: f64,
    pub mean_slope_percent: f64,
    pub main_stem_length: f64,
    /// Drop per unit length
    pub main_stem_slope: f64,
    pub mean_elevation: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Supplied by the caller, in [0, 1]
    pub runoff_coefficient: f64,
}

impl RunoffInputs {
    pub fn from_result(result: &WatershedResult, runoff_coefficient: f64) -> Result<Self, QueryError> {
        if !(0.0..=1.0).contains(&runoff_coefficient) {
            return Err(catchflow_core::Error::InvalidParameter {
                name: "runoff_coefficient",
                value: runoff_coefficient.to_string(),
                reason: "must lie in [0, 1]".into(),
            }
            .into());
        }
        Ok(Self {
            area: result.area,
            mean_slope_percent: result.mean_slope_percent,
            main_stem_length: result.main_stem_length,
            main_stem_slope: result.main_stem_slope,
            mean_elevation: result.mean_elevation,
            min_elevation: result.min_elevation,
            max_elevation: result.max_elevation,
            runoff_coefficient,
        })
    }
}

/// External rainfall-runoff transformation
pub trait RunoffModel {
    type Hydrograph;
    type Error: std::error::Error;

    fn hydrograph(&self, inputs: &RunoffInputs) -> Result<Self::Hydrograph, Self::Error>;
}
