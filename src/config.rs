use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::error::{ModelError, ModelResult};
use crate::interfaces::BatterySpecs;
use crate::model::{
    EvParams, FleetParams, ForecastErrorMargins, PeakWindow, PlainBatteryParams, PortfolioParams,
    TimeBase,
};
use crate::optimizer::{GoodLpSolver, SolverBackend};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "EPLAN__";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub solver: SolverConfig,
    pub fleet: FleetStudyConfig,
    pub portfolio: PortfolioStudyConfig,
    pub demand_charge: DemandChargeStudyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    pub time_limit_seconds: u64,
}

impl SolverConfig {
    pub fn build(&self) -> GoodLpSolver {
        GoodLpSolver::new(self.backend, Duration::from_secs(self.time_limit_seconds))
    }
}

/// Horizon of `steps` equal intervals.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HorizonConfig {
    pub steps: usize,
    pub step_minutes: u32,
}

impl HorizonConfig {
    pub fn time_base(&self) -> ModelResult<Arc<TimeBase>> {
        if self.steps == 0 || self.step_minutes == 0 {
            return Err(ModelError::Configuration(format!(
                "horizon of {} steps x {} min is empty",
                self.steps, self.step_minutes
            )));
        }
        Ok(Arc::new(TimeBase::uniform(self.steps, f64::from(self.step_minutes) * 60.0)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetStudyConfig {
    pub enabled: bool,
    pub horizon: HorizonConfig,
    pub ev_capacity: usize,
    /// Random per-vehicle SoCs are drawn when omitted
    pub initial_soc_list: Option<Vec<f64>>,
    pub peak_demand_cost: f64,
    pub peak_energy_cost: f64,
    pub normal_energy_cost: f64,
    pub slow_charge_cost: f64,
    pub peak_window: PeakWindow,
    pub ev: EvParams,
}

impl FleetStudyConfig {
    pub fn fleet_params(&self, initial_soc_list: Vec<f64>) -> FleetParams {
        FleetParams {
            name: "fleet".to_string(),
            ev_capacity: self.ev_capacity,
            peak_demand_cost: self.peak_demand_cost,
            peak_energy_cost: self.peak_energy_cost,
            normal_energy_cost: self.normal_energy_cost,
            slow_charge_cost: self.slow_charge_cost,
            peak_window: self.peak_window,
            initial_soc_list,
            ev: self.ev.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioStudyConfig {
    pub enabled: bool,
    pub horizon: HorizonConfig,
    pub final_soe_list: Vec<f64>,
    pub pv_forecast: f64,
    pub load_forecast: f64,
    pub baseline_da: f64,
    pub error_margins: ForecastErrorMargins,
    pub battery: PlainBatteryParams,
}

impl PortfolioStudyConfig {
    pub fn portfolio_params(&self) -> PortfolioParams {
        PortfolioParams {
            name: "portfolio".to_string(),
            sites_capacity: self.final_soe_list.len(),
            final_soe_list: self.final_soe_list.clone(),
            pv_forecast: self.pv_forecast,
            load_forecast: self.load_forecast,
            baseline_da: self.baseline_da,
            battery: self.battery.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemandChargeStudyConfig {
    pub enabled: bool,
    pub horizon: HorizonConfig,
    /// Index of the first load sample of the optimized slice
    pub load_offset: usize,
    pub initial_soc: f64,
    pub peak_demand_cost: f64,
    /// Flat synthetic load level (kW) used when no series is supplied
    pub load_kw: f64,
    pub battery: BatterySpecs,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment
            .extract()
            .with_context(|| format!("loading configuration from {}", path.display()))
    }
}
