//! Day-ahead flex energy estimate over a 24 x 1 h horizon.

use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::model::{FlexEstimate, ForecastErrorMargins, Portfolio, PortfolioParams, TimeBase};
use crate::optimizer::ExternalSolver;

pub struct FlexEnergyInterface {
    time_base: Arc<TimeBase>,
    params: PortfolioParams,
}

impl FlexEnergyInterface {
    pub fn new(
        pv_forecast: f64,
        load_forecast: f64,
        baseline_da: f64,
        final_soe_list: Vec<f64>,
        num_sites: usize,
    ) -> ModelResult<Self> {
        if final_soe_list.len() != num_sites {
            return Err(ModelError::dimension("final_soe_list", num_sites, final_soe_list.len()));
        }
        let params = PortfolioParams {
            sites_capacity: num_sites,
            final_soe_list,
            pv_forecast,
            load_forecast,
            baseline_da,
            ..Default::default()
        };
        Ok(Self::with_params(Arc::new(TimeBase::uniform(24, 3600.0)?), params))
    }

    pub fn with_params(time_base: Arc<TimeBase>, params: PortfolioParams) -> Self {
        Self { time_base, params }
    }

    pub fn params(&self) -> &PortfolioParams {
        &self.params
    }

    pub async fn max_flex_energy(&self, solver: &dyn ExternalSolver) -> ModelResult<FlexEstimate> {
        self.max_flex_energy_with_error(solver, 0.0, 0.0).await
    }

    /// Each call solves a freshly built portfolio.
    pub async fn max_flex_energy_with_error(
        &self,
        solver: &dyn ExternalSolver,
        error_margin_load_forecast: f64,
        error_margin_solar_forecast: f64,
    ) -> ModelResult<FlexEstimate> {
        let portfolio = Portfolio::new(self.time_base.clone(), self.params.clone())?;
        let margins = ForecastErrorMargins {
            load: error_margin_load_forecast,
            solar: error_margin_solar_forecast,
        };
        portfolio.solve(solver, margins).await
    }
}
