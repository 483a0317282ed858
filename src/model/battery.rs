//! Lossless storage model pinned at the end of the horizon.
//!
//! The energy trajectory is reconstructed backward from `final_energy_state`:
//! `energy_state[0..n] == cumsum(energy_flow) + energy_state[n]`.
//!
//! `energy_flow` is declared nonnegative and tied to `power_state * dt/3600`,
//! which in practice restricts `power_state` to charging even though its own
//! bounds allow discharge. The relations are kept exactly as formulated.

use std::sync::Arc;

use good_lp::{constraint, Constraint, Expression, Variable};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use super::{cumulative_sum, ensure_shared_time_base, AssetModel, SummedFlow, TimeBase};
use crate::error::ModelResult;
use crate::optimizer::{Bounds, ProblemBuilder, SolvedValues};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlainBatteryParams {
    /// Usable capacity (kWh)
    #[validate(range(exclusive_min = 0.0))]
    pub rated_energy: f64,
    /// Symmetric charge/discharge limit (kW)
    #[validate(range(min = 0.0))]
    pub p_max_charge_discharge: f64,
    /// Energy held after the last step (kWh)
    #[validate(range(min = 0.0))]
    pub final_energy_state: f64,
}

impl Default for PlainBatteryParams {
    fn default() -> Self {
        Self {
            rated_energy: 100.0,
            p_max_charge_discharge: 50.0,
            final_energy_state: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlainBatterySchedule {
    pub energy_state: Vec<f64>,
    pub power_state: Vec<f64>,
    pub energy_flow: Vec<f64>,
    pub soc: Vec<f64>,
}

#[derive(Debug)]
pub struct PlainBattery {
    name: String,
    time_base: Arc<TimeBase>,
    params: PlainBatteryParams,
    pub energy_state: Vec<Variable>,
    pub power_state: Vec<Variable>,
    pub energy_flow: Vec<Variable>,
    solved: Option<PlainBatterySchedule>,
}

impl PlainBattery {
    pub fn new(
        builder: &mut ProblemBuilder,
        time_base: Arc<TimeBase>,
        name: impl Into<String>,
        params: PlainBatteryParams,
    ) -> ModelResult<Self> {
        params.validate()?;
        let name = name.into();
        let n = time_base.n();

        let energy_state =
            builder.continuous(&format!("{name}_energy_state"), n + 1, Bounds::NonNegative)?;
        let power_state = builder.continuous(&format!("{name}_power_state"), n, Bounds::Free)?;
        let energy_flow =
            builder.continuous(&format!("{name}_energy_in_out"), n, Bounds::NonNegative)?;

        debug!(battery = %name, n, "plain battery declared");
        Ok(Self {
            name,
            time_base,
            params,
            energy_state,
            power_state,
            energy_flow,
            solved: None,
        })
    }

    pub fn params(&self) -> &PlainBatteryParams {
        &self.params
    }

    /// Solved schedule; `None` until a successful solve has been applied.
    pub fn schedule(&self) -> Option<&PlainBatterySchedule> {
        self.solved.as_ref()
    }

    /// Folds several batteries into one summed `energy_flow` view.
    pub fn combine(members: &[&PlainBattery]) -> ModelResult<BatteryAggregate> {
        ensure_shared_time_base(members.iter().copied())?;
        let flows: Vec<&[Variable]> = members.iter().map(|b| b.energy_flow.as_slice()).collect();
        Ok(BatteryAggregate {
            energy_flow: SummedFlow::from_members("energy_flow", &flows)?,
        })
    }
}

impl AssetModel for PlainBattery {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    fn constraints(&self) -> Vec<Constraint> {
        let mut constraints = self.base_constraints();
        let n = self.time_base.n();
        let hours = self.time_base.hours();
        let p = &self.params;

        constraints.push(constraint!(self.energy_state[n] == p.final_energy_state));

        for e in &self.energy_state {
            constraints.push(constraint!(*e >= 0.0));
            constraints.push(constraint!(*e <= p.rated_energy));
        }

        for (t, power) in self.power_state.iter().enumerate() {
            constraints.push(constraint!(*power <= p.p_max_charge_discharge));
            constraints.push(constraint!(*power >= -p.p_max_charge_discharge));
            constraints.push(constraint!(self.energy_flow[t] == *power * hours[t]));
        }

        let flows: Vec<Expression> =
            self.energy_flow.iter().map(|v| Expression::from(*v)).collect();
        for (t, running) in cumulative_sum(&flows).into_iter().enumerate() {
            constraints.push(constraint!(self.energy_state[t] == running + self.energy_state[n]));
        }

        constraints
    }

    fn apply_solution(&mut self, values: &SolvedValues) {
        let energy_state = values.vector(&self.energy_state);
        let soc = energy_state.iter().map(|e| e / self.params.rated_energy).collect();
        self.solved = Some(PlainBatterySchedule {
            energy_state,
            power_state: values.vector(&self.power_state),
            energy_flow: values.vector(&self.energy_flow),
            soc,
        });
    }
}

/// Sum of several [`PlainBattery`] flows. Carries no physical bounds of its own.
#[derive(Debug, Clone)]
pub struct BatteryAggregate {
    pub energy_flow: SummedFlow,
}
