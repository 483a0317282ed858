//! Storage model with charge/discharge efficiency, pinned at the start of the
//! horizon via `initial_soc`.
//!
//! No aggregation is provided for this variant.

use std::sync::Arc;

use good_lp::{constraint, Constraint, Expression, Variable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

use super::{cumulative_sum, AssetModel, TimeBase};
use crate::error::ModelResult;
use crate::optimizer::{Bounds, ProblemBuilder, SolvedValues};

/// Which flow drains the energy state through `energy_out`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DischargeAccounting {
    /// `energy_out = charge * dt/3600 / discharging_efficiency`.
    ///
    /// Discharge never depletes the state under this rule; `discharge` only
    /// reaches the model through `power_state = discharge - charge`.
    #[default]
    AsFormulated,
    /// `energy_out = discharge * dt/3600 / discharging_efficiency`. Opt-in.
    Discharge,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnhancedBatteryParams {
    #[validate(range(exclusive_min = 0.0))]
    pub rated_energy: f64,
    #[validate(range(min = 0.0))]
    pub p_max_charge_discharge: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub charging_efficiency: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub discharging_efficiency: f64,
    #[serde(default)]
    pub discharge_accounting: DischargeAccounting,
}

impl Default for EnhancedBatteryParams {
    fn default() -> Self {
        Self {
            rated_energy: 100.0,
            p_max_charge_discharge: 50.0,
            initial_soc: 0.5,
            charging_efficiency: 1.0,
            discharging_efficiency: 1.0,
            discharge_accounting: DischargeAccounting::AsFormulated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancedBatterySchedule {
    pub energy_state: Vec<f64>,
    pub soc: Vec<f64>,
    /// Positive when discharging
    pub power_state: Vec<f64>,
    pub charge: Vec<f64>,
    pub discharge: Vec<f64>,
}

#[derive(Debug)]
pub struct EnhancedBattery {
    name: String,
    time_base: Arc<TimeBase>,
    params: EnhancedBatteryParams,
    pub energy_state: Vec<Variable>,
    pub soc: Vec<Variable>,
    pub power_state: Vec<Variable>,
    pub charge: Vec<Variable>,
    pub discharge: Vec<Variable>,
    pub energy_in: Vec<Variable>,
    pub energy_out: Vec<Variable>,
    solved: Option<EnhancedBatterySchedule>,
}

impl EnhancedBattery {
    pub fn new(
        builder: &mut ProblemBuilder,
        time_base: Arc<TimeBase>,
        name: impl Into<String>,
        params: EnhancedBatteryParams,
    ) -> ModelResult<Self> {
        params.validate()?;
        let name = name.into();
        let n = time_base.n();

        if params.discharge_accounting == DischargeAccounting::Discharge {
            warn!(battery = %name, "energy_out accounted from discharge instead of charge");
        }

        let energy_state =
            builder.continuous(&format!("{name}_energy_state"), n + 1, Bounds::NonNegative)?;
        let soc = builder.continuous(&format!("{name}_soc"), n + 1, Bounds::NonNegative)?;
        let power_state = builder.continuous(&format!("{name}_power_state"), n, Bounds::Free)?;
        let charge = builder.continuous(&format!("{name}_charge"), n, Bounds::Free)?;
        let discharge = builder.continuous(&format!("{name}_discharge"), n, Bounds::Free)?;
        let energy_in = builder.continuous(&format!("{name}_energy_in"), n, Bounds::Free)?;
        let energy_out = builder.continuous(&format!("{name}_energy_out"), n, Bounds::Free)?;

        debug!(battery = %name, n, "enhanced battery declared");
        Ok(Self {
            name,
            time_base,
            params,
            energy_state,
            soc,
            power_state,
            charge,
            discharge,
            energy_in,
            energy_out,
            solved: None,
        })
    }

    pub fn params(&self) -> &EnhancedBatteryParams {
        &self.params
    }

    pub fn schedule(&self) -> Option<&EnhancedBatterySchedule> {
        self.solved.as_ref()
    }
}

impl AssetModel for EnhancedBattery {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    fn constraints(&self) -> Vec<Constraint> {
        let mut constraints = self.base_constraints();
        let hours = self.time_base.hours();
        let p = &self.params;

        constraints.push(constraint!(self.energy_state[0] == p.initial_soc * p.rated_energy));

        for (e, s) in self.energy_state.iter().zip(&self.soc) {
            constraints.push(constraint!(*e >= 0.0));
            constraints.push(constraint!(*e <= p.rated_energy));
            constraints.push(constraint!(*s == *e * (1.0 / p.rated_energy)));
        }

        for t in 0..self.time_base.n() {
            let (charge, discharge) = (self.charge[t], self.discharge[t]);
            constraints.push(constraint!(charge >= 0.0));
            constraints.push(constraint!(charge <= p.p_max_charge_discharge));
            constraints.push(constraint!(discharge >= 0.0));
            constraints.push(constraint!(discharge <= p.p_max_charge_discharge));
            constraints.push(constraint!(self.power_state[t] == discharge - charge));

            constraints.push(constraint!(
                self.energy_in[t] == charge * (hours[t] * p.charging_efficiency)
            ));
            let drained = match p.discharge_accounting {
                DischargeAccounting::AsFormulated => charge,
                DischargeAccounting::Discharge => discharge,
            };
            constraints.push(constraint!(
                self.energy_out[t] == drained * (hours[t] / p.discharging_efficiency)
            ));
        }

        let net: Vec<Expression> = self
            .energy_in
            .iter()
            .zip(&self.energy_out)
            .map(|(i, o)| *i - *o)
            .collect();
        for (t, running) in cumulative_sum(&net).into_iter().enumerate() {
            constraints.push(constraint!(
                self.energy_state[t + 1] == running + self.energy_state[0]
            ));
        }

        constraints
    }

    fn apply_solution(&mut self, values: &SolvedValues) {
        self.solved = Some(EnhancedBatterySchedule {
            energy_state: values.vector(&self.energy_state),
            soc: values.vector(&self.soc),
            power_state: values.vector(&self.power_state),
            charge: values.vector(&self.charge),
            discharge: values.vector(&self.discharge),
        });
    }
}
