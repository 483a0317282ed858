//! EV fleet orchestrator.
//!
//! Owns `ev_capacity` vehicles on one time base, prices every step with a
//! time-of-use tariff and solves a three-term objective:
//! - maximize price-weighted charging energy (minimize its negation)
//! - minimize the peak of total fleet power times the demand charge
//! - maximize the minimum total fleet power times the slow-charge penalty

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Timelike};
use good_lp::{constraint, Constraint, Expression, Variable};
use itertools::izip;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError};

use super::{AssetModel, Ev, EvParams, TimeBase};
use crate::error::{ModelError, ModelResult};
use crate::optimizer::{Bounds, ExternalSolver, Objective, ProblemBuilder, SolveStatus};

/// Inclusive range of hours of day billed at the peak energy rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_peak_window"))]
pub struct PeakWindow {
    pub first_hour: u32,
    pub last_hour: u32,
}

impl Default for PeakWindow {
    fn default() -> Self {
        Self {
            first_hour: 15,
            last_hour: 19,
        }
    }
}

impl PeakWindow {
    pub fn contains(&self, hour: u32) -> bool {
        (self.first_hour..=self.last_hour).contains(&hour)
    }
}

fn validate_peak_window(window: &PeakWindow) -> Result<(), ValidationError> {
    if window.first_hour > window.last_hour || window.last_hour > 23 {
        return Err(ValidationError::new("peak_window_out_of_range"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FleetParams {
    pub name: String,
    #[validate(range(min = 1))]
    pub ev_capacity: usize,
    /// Demand charge per kW of fleet peak
    #[validate(range(min = 0.0))]
    pub peak_demand_cost: f64,
    #[validate(range(min = 0.0))]
    pub peak_energy_cost: f64,
    #[validate(range(min = 0.0))]
    pub normal_energy_cost: f64,
    /// Penalty per kW on the lowest total fleet power
    #[validate(range(min = 0.0))]
    pub slow_charge_cost: f64,
    #[validate(nested)]
    pub peak_window: PeakWindow,
    /// One entry per vehicle
    pub initial_soc_list: Vec<f64>,
    /// Template for every vehicle; `initial_soc` is taken from `initial_soc_list`
    pub ev: EvParams,
}

impl Default for FleetParams {
    fn default() -> Self {
        Self {
            name: "fleet".to_string(),
            ev_capacity: 1,
            peak_demand_cost: 15.0,
            peak_energy_cost: 0.5,
            normal_energy_cost: 0.35,
            slow_charge_cost: 100.0,
            peak_window: PeakWindow::default(),
            initial_soc_list: vec![0.0],
            ev: EvParams::default(),
        }
    }
}

/// Time-of-use price for each step, by the hour of day at which the step starts.
pub fn create_energy_price_vector(
    time_base: &TimeBase,
    start: NaiveDateTime,
    params: &FleetParams,
) -> Vec<f64> {
    time_base
        .step_offsets()
        .into_iter()
        .map(|offset| {
            let at = start + Duration::milliseconds((offset * 1000.0).round() as i64);
            if params.peak_window.contains(at.hour()) {
                params.peak_energy_cost
            } else {
                params.normal_energy_cost
            }
        })
        .collect()
}

pub struct Fleet {
    builder: ProblemBuilder,
    params: FleetParams,
    evs: Vec<Ev>,
    total_energy_in: Vec<Variable>,
    total_power_state: Vec<Variable>,
    energy_price_vector: Vec<f64>,
}

/// Result of one fleet solve.
pub struct FleetOutcome {
    pub status: SolveStatus,
    /// Vehicles in creation order; schedules are set when `status` is optimal
    pub evs: Vec<Ev>,
    pub energy_price_vector: Vec<f64>,
    pub total_power_state: Option<Vec<f64>>,
    pub total_energy_in: Option<Vec<f64>>,
}

impl Fleet {
    pub fn new(
        time_base: Arc<TimeBase>,
        start: NaiveDateTime,
        params: FleetParams,
    ) -> ModelResult<Self> {
        params.validate()?;
        if params.initial_soc_list.len() != params.ev_capacity {
            return Err(ModelError::dimension(
                "initial_soc_list",
                params.ev_capacity,
                params.initial_soc_list.len(),
            ));
        }

        let mut builder = ProblemBuilder::new();
        let evs = params
            .initial_soc_list
            .iter()
            .enumerate()
            .map(|(i, soc)| {
                let ev_params = EvParams {
                    initial_soc: *soc,
                    ..params.ev.clone()
                };
                Ev::new(&mut builder, time_base.clone(), format!("ev_{i}"), ev_params)
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let n = time_base.n();
        let total_energy_in = builder.continuous(
            &format!("{}_total_energy_state", params.name),
            n,
            Bounds::NonNegative,
        )?;
        let total_power_state = builder.continuous(
            &format!("{}_total_power_state", params.name),
            n,
            Bounds::NonNegative,
        )?;
        let energy_price_vector = create_energy_price_vector(&time_base, start, &params);

        info!(fleet = %params.name, evs = evs.len(), n, "fleet model initialized");
        Ok(Self {
            builder,
            params,
            evs,
            total_energy_in,
            total_power_state,
            energy_price_vector,
        })
    }

    pub fn evs(&self) -> &[Ev] {
        &self.evs
    }

    pub fn energy_price_vector(&self) -> &[f64] {
        &self.energy_price_vector
    }

    /// Assembles and solves the fleet problem. Consumes the fleet: models are
    /// never reused across runs.
    pub async fn solve(mut self, solver: &dyn ExternalSolver) -> ModelResult<FleetOutcome> {
        let mut constraints: Vec<Constraint> = Vec::new();
        for ev in &self.evs {
            constraints.extend(ev.constraints());
        }

        let members: Vec<&Ev> = self.evs.iter().collect();
        let aggregate = Ev::combine(&members)?;
        let energy_in = aggregate.energy_in.expressions();
        let power = aggregate.power_state.expressions();

        let totals = izip!(&self.total_energy_in, &self.total_power_state, &energy_in, &power);
        for (total_e, total_p, e, p) in totals {
            constraints.push(constraint!(*total_e == e.clone()));
            constraints.push(constraint!(*total_p == p.clone()));
        }

        let total_power: Vec<Expression> = self
            .total_power_state
            .iter()
            .map(|v| Expression::from(*v))
            .collect();
        let name = &self.params.name;
        let (peak, peak_rows) = self.builder.max_of(&format!("{name}_peak_power"), &total_power)?;
        let (floor, floor_rows) = self.builder.min_of(&format!("{name}_min_power"), &total_power)?;
        constraints.extend(peak_rows);
        constraints.extend(floor_rows);

        let priced_energy: Expression = energy_in
            .into_iter()
            .zip(&self.energy_price_vector)
            .map(|(e, price)| e * *price)
            .sum();

        let objective = Objective::minimize(priced_energy * -1.0)
            .then_minimize(peak * self.params.peak_demand_cost)
            .then_minimize(floor * -self.params.slow_charge_cost);

        let problem = self.builder.finish(objective, constraints);
        let outcome = solver.solve(problem).await;

        let mut totals = None;
        if let Some(values) = &outcome.values {
            for ev in &mut self.evs {
                ev.apply_solution(values);
            }
            totals = Some((
                values.vector(&self.total_power_state),
                values.vector(&self.total_energy_in),
            ));
        }
        let (total_power_state, total_energy_in) = totals.unzip();

        info!(fleet = %self.params.name, status = %outcome.status, "fleet solve complete");
        Ok(FleetOutcome {
            status: outcome.status,
            evs: self.evs,
            energy_price_vector: self.energy_price_vector,
            total_power_state,
            total_energy_in,
        })
    }
}
