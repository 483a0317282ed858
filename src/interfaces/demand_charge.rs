//! Demand charge management for a single [`EnhancedBattery`].
//!
//! Minimizes `max(load - battery_power) * peak_demand_rate` over one slice of
//! an actual-load series: the battery discharges to shave the net peak.

use std::sync::Arc;

use good_lp::Expression;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::model::{
    AssetModel, DischargeAccounting, EnhancedBattery, EnhancedBatteryParams, TimeBase,
};
use crate::optimizer::{ExternalSolver, Objective, ProblemBuilder, SolveStatus};

pub const DEFAULT_PEAK_DEMAND_COST: f64 = 15.0;

/// Result of a peak-shaving solve.
pub struct PeakDemandOutcome {
    pub status: SolveStatus,
    pub battery: EnhancedBattery,
}

/// Minimizes the peak of `load - battery.power_state` weighted by `peak_demand_rate`.
///
/// `load` must hold exactly one value per step of `time_base`.
pub async fn solve_peak_demand(
    time_base: Arc<TimeBase>,
    params: EnhancedBatteryParams,
    load: &[f64],
    peak_demand_rate: f64,
    solver: &dyn ExternalSolver,
) -> ModelResult<PeakDemandOutcome> {
    time_base.expect_steps("load slice", load.len())?;
    if !(peak_demand_rate.is_finite() && peak_demand_rate >= 0.0) {
        return Err(ModelError::InvalidParameter(format!(
            "peak demand rate {peak_demand_rate} must be a nonnegative number"
        )));
    }

    let mut builder = ProblemBuilder::new();
    let mut battery = EnhancedBattery::new(&mut builder, time_base, "battery", params)?;
    let mut constraints = battery.constraints();

    let net_demand: Vec<Expression> = load
        .iter()
        .zip(&battery.power_state)
        .map(|(l, p)| *p * -1.0 + *l)
        .collect();
    let (peak, peak_rows) = builder.max_of("net_demand_peak", &net_demand)?;
    constraints.extend(peak_rows);

    let problem = builder.finish(Objective::minimize(peak * peak_demand_rate), constraints);
    let outcome = solver.solve(problem).await;
    if let Some(values) = &outcome.values {
        battery.apply_solution(values);
    }

    Ok(PeakDemandOutcome {
        status: outcome.status,
        battery,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatterySpecs {
    #[validate(range(exclusive_min = 0.0))]
    pub rated_energy: f64,
    #[validate(range(min = 0.0))]
    pub p_max_charge: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub charging_efficiency: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub discharging_efficiency: f64,
    #[serde(default)]
    pub discharge_accounting: DischargeAccounting,
}

/// Planned schedules; empty until a successful `optimize`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatteryPlan {
    pub soc_schedule: Vec<f64>,
    pub power_schedule: Vec<f64>,
}

/// Stateful front end: collect load data and battery specs, then optimize.
pub struct DemandChargeOptimizer {
    time_base: Arc<TimeBase>,
    /// First load sample of the optimized slice
    load_offset: usize,
    battery_specs: Option<BatterySpecs>,
    load: Option<Vec<f64>>,
    initial_soc: f64,
    plan: BatteryPlan,
}

impl DemandChargeOptimizer {
    /// One day of 15 minute steps, optimizing the second day of the load series.
    pub fn new() -> ModelResult<Self> {
        Ok(Self::with_window(Arc::new(TimeBase::uniform(96, 900.0)?), 96))
    }

    pub fn with_window(time_base: Arc<TimeBase>, load_offset: usize) -> Self {
        Self {
            time_base,
            load_offset,
            battery_specs: None,
            load: None,
            initial_soc: 0.5,
            plan: BatteryPlan::default(),
        }
    }

    /// Actual load per step (kW), as read from the `actual_kwh` column.
    pub fn set_load_data(&mut self, load: Vec<f64>) {
        self.load = Some(load);
    }

    pub fn set_battery_specs(&mut self, specs: BatterySpecs) {
        self.battery_specs = Some(specs);
    }

    pub fn set_initial_soc(&mut self, initial_soc: f64) {
        self.initial_soc = initial_soc;
    }

    /// Step length in seconds.
    pub fn granularity(&self) -> f64 {
        self.time_base.dt()[0]
    }

    pub fn battery_plan(&self) -> &BatteryPlan {
        &self.plan
    }

    /// Runs the peak-shaving solve. Returns `Ok(None)` without solving when
    /// load data or battery specs are missing.
    pub async fn optimize(
        &mut self,
        solver: &dyn ExternalSolver,
        peak_demand_cost: f64,
    ) -> ModelResult<Option<SolveStatus>> {
        let (Some(load), Some(specs)) = (&self.load, &self.battery_specs) else {
            warn!(
                has_load = self.load.is_some(),
                has_battery = self.battery_specs.is_some(),
                "demand charge optimization skipped: missing inputs"
            );
            return Ok(None);
        };
        specs.validate()?;

        let n = self.time_base.n();
        let end = self.load_offset + n;
        let slice = load
            .get(self.load_offset..end)
            .ok_or_else(|| ModelError::dimension("load series", end, load.len()))?;

        let params = EnhancedBatteryParams {
            rated_energy: specs.rated_energy,
            p_max_charge_discharge: specs.p_max_charge,
            initial_soc: self.initial_soc,
            charging_efficiency: specs.charging_efficiency,
            discharging_efficiency: specs.discharging_efficiency,
            discharge_accounting: specs.discharge_accounting,
        };
        let time_base = self.time_base.clone();
        let outcome =
            solve_peak_demand(time_base, params, slice, peak_demand_cost, solver).await?;

        self.plan = match outcome.battery.schedule() {
            Some(schedule) => BatteryPlan {
                soc_schedule: schedule.soc.clone(),
                power_schedule: schedule.power_state.clone(),
            },
            None => BatteryPlan::default(),
        };
        info!(status = %outcome.status, "demand charge optimization complete");
        Ok(Some(outcome.status))
    }
}
