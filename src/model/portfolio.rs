//! Multi-site portfolio orchestrator.
//!
//! Estimates the flexibility energy a portfolio of [`PlainBattery`] sites can
//! offer against a day-ahead baseline:
//!
//! ```text
//! baseline_da
//!     - load_forecast * (1 + load_error)
//!     + pv_forecast * (1 - solar_error)
//!     + sum(total_energy_flow)
//! ```

use std::sync::Arc;

use good_lp::{constraint, Constraint, Expression, Variable};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{AssetModel, PlainBattery, PlainBatteryParams, PlainBatterySchedule, TimeBase};
use crate::error::{ModelError, ModelResult};
use crate::optimizer::{Bounds, ExternalSolver, Objective, ProblemBuilder, SolveStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PortfolioParams {
    pub name: String,
    #[validate(range(min = 1))]
    pub sites_capacity: usize,
    /// Terminal energy target per site (kWh)
    pub final_soe_list: Vec<f64>,
    pub pv_forecast: f64,
    pub load_forecast: f64,
    pub baseline_da: f64,
    /// Template for every site; `final_energy_state` comes from `final_soe_list`
    pub battery: PlainBatteryParams,
}

impl Default for PortfolioParams {
    fn default() -> Self {
        Self {
            name: "portfolio".to_string(),
            sites_capacity: 1,
            final_soe_list: vec![0.0],
            pv_forecast: 0.0,
            load_forecast: 0.0,
            baseline_da: 0.0,
            battery: PlainBatteryParams::default(),
        }
    }
}

/// Fractional forecast margins used to stress the estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ForecastErrorMargins {
    #[validate(range(min = 0.0))]
    pub load: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub solar: f64,
}

impl PortfolioParams {
    /// Forecast part of the estimate, constant for the solver.
    pub fn forecast_energy(&self, margins: ForecastErrorMargins) -> f64 {
        self.baseline_da - self.load_forecast * (1.0 + margins.load)
            + self.pv_forecast * (1.0 - margins.solar)
    }
}

pub struct Portfolio {
    builder: ProblemBuilder,
    params: PortfolioParams,
    batteries: Vec<PlainBattery>,
    total_energy_flow: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlexEstimate {
    pub status: SolveStatus,
    /// Present only for an optimal solve
    pub flex_energy: Option<f64>,
    pub total_energy_flow: Option<Vec<f64>>,
    /// Per-site schedules in `final_soe_list` order
    pub site_schedules: Option<Vec<PlainBatterySchedule>>,
}

impl Portfolio {
    pub fn new(time_base: Arc<TimeBase>, params: PortfolioParams) -> ModelResult<Self> {
        params.validate()?;
        if params.final_soe_list.len() != params.sites_capacity {
            return Err(ModelError::dimension(
                "final_soe_list",
                params.sites_capacity,
                params.final_soe_list.len(),
            ));
        }

        let mut builder = ProblemBuilder::new();
        let batteries = params
            .final_soe_list
            .iter()
            .enumerate()
            .map(|(i, soe)| {
                let battery_params = PlainBatteryParams {
                    final_energy_state: *soe,
                    ..params.battery.clone()
                };
                PlainBattery::new(
                    &mut builder,
                    time_base.clone(),
                    format!("battery_{i}"),
                    battery_params,
                )
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let total_energy_flow = builder.continuous(
            &format!("{}_total_energy_state", params.name),
            time_base.n(),
            Bounds::NonNegative,
        )?;

        info!(
            portfolio = %params.name,
            sites = batteries.len(),
            n = time_base.n(),
            "portfolio model initialized"
        );
        Ok(Self {
            builder,
            params,
            batteries,
            total_energy_flow,
        })
    }

    pub fn batteries(&self) -> &[PlainBattery] {
        &self.batteries
    }

    /// Maximizes the flex estimate. The returned value is recomputed from the
    /// solved flows so the forecast terms are reported alongside them.
    pub async fn solve(
        mut self,
        solver: &dyn ExternalSolver,
        margins: ForecastErrorMargins,
    ) -> ModelResult<FlexEstimate> {
        margins.validate()?;
        let mut constraints: Vec<Constraint> = Vec::new();
        for battery in &self.batteries {
            constraints.extend(battery.constraints());
        }

        let members: Vec<&PlainBattery> = self.batteries.iter().collect();
        let aggregate = PlainBattery::combine(&members)?;
        let summed_flow = aggregate.energy_flow.expressions();
        for (total, summed) in self.total_energy_flow.iter().zip(summed_flow) {
            constraints.push(constraint!(*total == summed));
        }

        let forecast_energy = self.params.forecast_energy(margins);
        let flow: Expression = self.total_energy_flow.iter().map(|v| Expression::from(*v)).sum();
        let objective = Objective::maximize(flow + forecast_energy);

        let problem = self.builder.finish(objective, constraints);
        let outcome = solver.solve(problem).await;

        let total_energy_flow = outcome.values.as_ref().map(|values| {
            for battery in &mut self.batteries {
                battery.apply_solution(values);
            }
            values.vector(&self.total_energy_flow)
        });
        let site_schedules = total_energy_flow.as_ref().map(|_| {
            self.batteries
                .iter()
                .filter_map(|b| b.schedule().cloned())
                .collect::<Vec<_>>()
        });
        let flex_energy = total_energy_flow
            .as_ref()
            .map(|flow| forecast_energy + flow.iter().sum::<f64>());

        info!(
            portfolio = %self.params.name,
            status = %outcome.status,
            flex_energy = ?flex_energy,
            "flex estimate complete"
        );
        Ok(FlexEstimate {
            status: outcome.status,
            flex_energy,
            total_energy_flow,
            site_schedules,
        })
    }
}
