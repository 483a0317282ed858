//! Unidirectional EV charging model.

use std::sync::Arc;

use good_lp::{constraint, Constraint, Expression, Variable};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use super::{cumulative_sum, ensure_shared_time_base, AssetModel, SummedFlow, TimeBase};
use crate::error::{ModelError, ModelResult};
use crate::optimizer::{Bounds, ProblemBuilder, SolvedValues};

/// Minimum state of charge the vehicle must hold at a given boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct SocCheckpoint {
    /// Boundary index into `soc` (0..=n)
    pub step: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_soc: f64,
}

impl Default for SocCheckpoint {
    /// Hour 12 of a 15 minute horizon, 80 %.
    fn default() -> Self {
        Self {
            step: 48,
            min_soc: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvParams {
    #[validate(range(exclusive_min = 0.0))]
    pub rated_energy: f64,
    #[validate(range(min = 0.0))]
    pub p_max_charge: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub efficiency: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc: f64,
    /// SoC above which charging power is halved in derating mode
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub max_soc_derating: f64,
    /// Turns on the boolean derating linkage (problem becomes mixed-integer)
    #[serde(default)]
    pub derating: bool,
    #[validate(nested)]
    pub checkpoint: Option<SocCheckpoint>,
}

impl Default for EvParams {
    fn default() -> Self {
        Self {
            rated_energy: 100.0,
            p_max_charge: 50.0,
            efficiency: 0.9,
            initial_soc: 0.0,
            max_soc_derating: 0.8,
            derating: false,
            checkpoint: Some(SocCheckpoint::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvSchedule {
    pub energy_state: Vec<f64>,
    pub soc: Vec<f64>,
    pub power_state: Vec<f64>,
    pub energy_in: Vec<f64>,
}

#[derive(Debug)]
pub struct Ev {
    name: String,
    time_base: Arc<TimeBase>,
    params: EvParams,
    pub energy_state: Vec<Variable>,
    pub soc: Vec<Variable>,
    pub power_state: Vec<Variable>,
    pub energy_in: Vec<Variable>,
    /// Declared only in derating mode
    pub above_max_soc_derating: Vec<Variable>,
    solved: Option<EvSchedule>,
}

impl Ev {
    pub fn new(
        builder: &mut ProblemBuilder,
        time_base: Arc<TimeBase>,
        name: impl Into<String>,
        params: EvParams,
    ) -> ModelResult<Self> {
        params.validate()?;
        let name = name.into();
        let n = time_base.n();

        if let Some(checkpoint) = params.checkpoint {
            if checkpoint.step > n {
                return Err(ModelError::dimension(
                    format!("{name} soc checkpoint step {}", checkpoint.step),
                    n + 1,
                    checkpoint.step + 1,
                ));
            }
        }

        let energy_state =
            builder.continuous(&format!("{name}_energy_state"), n + 1, Bounds::NonNegative)?;
        let soc = builder.continuous(&format!("{name}_soc"), n + 1, Bounds::NonNegative)?;
        let power_state =
            builder.continuous(&format!("{name}_power_state"), n, Bounds::NonNegative)?;
        let energy_in = builder.continuous(&format!("{name}_energy_in"), n, Bounds::NonNegative)?;
        let above_max_soc_derating = if params.derating {
            builder.boolean(&format!("{name}_above_max_soc_derating"), n)?
        } else {
            Vec::new()
        };

        debug!(ev = %name, n, derating = params.derating, "ev declared");
        Ok(Self {
            name,
            time_base,
            params,
            energy_state,
            soc,
            power_state,
            energy_in,
            above_max_soc_derating,
            solved: None,
        })
    }

    pub fn params(&self) -> &EvParams {
        &self.params
    }

    pub fn schedule(&self) -> Option<&EvSchedule> {
        self.solved.as_ref()
    }

    /// Folds several vehicles into summed `power_state` and `energy_in` views.
    pub fn combine(members: &[&Ev]) -> ModelResult<EvAggregate> {
        ensure_shared_time_base(members.iter().copied())?;
        let power: Vec<&[Variable]> = members.iter().map(|ev| ev.power_state.as_slice()).collect();
        let energy: Vec<&[Variable]> = members.iter().map(|ev| ev.energy_in.as_slice()).collect();
        Ok(EvAggregate {
            power_state: SummedFlow::from_members("power_state", &power)?,
            energy_in: SummedFlow::from_members("energy_in", &energy)?,
        })
    }

    fn derating_constraints(&self) -> Vec<Constraint> {
        let p = &self.params;
        let headroom = 1.0 - p.max_soc_derating;
        self.above_max_soc_derating
            .iter()
            .enumerate()
            .flat_map(|(t, above)| {
                let soc_after = self.soc[t + 1];
                [
                    constraint!(soc_after <= *above * headroom + p.max_soc_derating),
                    constraint!(
                        self.power_state[t] + *above * (p.p_max_charge / 2.0) <= p.p_max_charge
                    ),
                ]
            })
            .collect()
    }
}

impl AssetModel for Ev {
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

        for (t, power) in self.power_state.iter().enumerate() {
            constraints.push(constraint!(*power >= 0.0));
            constraints.push(constraint!(*power <= p.p_max_charge));
            constraints.push(constraint!(self.energy_in[t] == *power * (hours[t] * p.efficiency)));
        }

        let inflow: Vec<Expression> = self.energy_in.iter().map(|v| Expression::from(*v)).collect();
        for (t, running) in cumulative_sum(&inflow).into_iter().enumerate() {
            constraints.push(constraint!(
                self.energy_state[t + 1] == running + self.energy_state[0]
            ));
        }

        if let Some(checkpoint) = p.checkpoint {
            constraints.push(constraint!(self.soc[checkpoint.step] >= checkpoint.min_soc));
        }

        if p.derating {
            constraints.extend(self.derating_constraints());
        }

        constraints
    }

    fn apply_solution(&mut self, values: &SolvedValues) {
        self.solved = Some(EvSchedule {
            energy_state: values.vector(&self.energy_state),
            soc: values.vector(&self.soc),
            power_state: values.vector(&self.power_state),
            energy_in: values.vector(&self.energy_in),
        });
    }
}

/// Sum of several [`Ev`] flows. Carries no physical bounds of its own.
#[derive(Debug, Clone)]
pub struct EvAggregate {
    pub power_state: SummedFlow,
    pub energy_in: SummedFlow,
}
