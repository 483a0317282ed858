use anyhow::Result;
use chrono::Local;
use open_energy_planner::{config, interfaces, model, optimizer, runtime, telemetry};
use config::{Config, DemandChargeStudyConfig, FleetStudyConfig, PortfolioStudyConfig};
use interfaces::{DemandChargeOptimizer, FlexEnergyInterface};
use model::{AssetModel, Fleet};
use optimizer::ExternalSolver;
use rand::Rng;
use runtime::{block_on_with_grace, build_runtime, SHUTDOWN_GRACE};
use serde_json::json;
use telemetry::init_tracing;
use tracing::{info, warn};

fn main() -> Result<()> {
    init_tracing();
    let rt = build_runtime()?;
    block_on_with_grace(rt, run(), SHUTDOWN_GRACE)
}

async fn run() -> Result<()> {
    let cfg = Config::load()?;
    let solver = cfg.solver.build();
    info!(
        backend = %solver.backend(),
        time_limit_s = solver.time_limit().as_secs(),
        "starting Open Energy Planner"
    );

    if cfg.fleet.enabled {
        run_fleet(&cfg.fleet, &solver).await?;
    }
    if cfg.portfolio.enabled {
        run_portfolio(&cfg.portfolio, &solver).await?;
    }
    if cfg.demand_charge.enabled {
        run_demand_charge(&cfg.demand_charge, &solver).await?;
    }

    info!("all studies finished");
    Ok(())
}

async fn run_fleet(study: &FleetStudyConfig, solver: &dyn ExternalSolver) -> Result<()> {
    let initial_soc_list = match &study.initial_soc_list {
        Some(list) => list.clone(),
        None => {
            let mut rng = rand::thread_rng();
            (0..study.ev_capacity).map(|_| rng.gen_range(0.0..1.0)).collect()
        }
    };

    let start = Local::now().naive_local();
    let params = study.fleet_params(initial_soc_list);
    let fleet = Fleet::new(study.horizon.time_base()?, start, params)?;
    let outcome = fleet.solve(solver).await?;

    if !outcome.status.is_optimal() {
        warn!(status = %outcome.status, "fleet: no optimal charging plan found");
        return Ok(());
    }

    let plans: Vec<_> = outcome
        .evs
        .iter()
        .filter_map(|ev| {
            ev.schedule()
                .map(|s| json!({ "ev": ev.name(), "power_state": s.power_state, "soc": s.soc }))
        })
        .collect();
    info!(
        evs = plans.len(),
        prices = %serde_json::to_string(&outcome.energy_price_vector)?,
        plans = %serde_json::to_string(&plans)?,
        "fleet: optimal charging plan found"
    );
    Ok(())
}

async fn run_portfolio(study: &PortfolioStudyConfig, solver: &dyn ExternalSolver) -> Result<()> {
    let interface =
        FlexEnergyInterface::with_params(study.horizon.time_base()?, study.portfolio_params());

    let plain = interface.max_flex_energy(solver).await?;
    info!(
        status = %plain.status,
        flex_energy = ?plain.flex_energy,
        "portfolio: max flex energy, no forecast error"
    );

    let margins = study.error_margins;
    let stressed = interface
        .max_flex_energy_with_error(solver, margins.load, margins.solar)
        .await?;
    info!(
        status = %stressed.status,
        flex_energy = ?stressed.flex_energy,
        load_margin = margins.load,
        solar_margin = margins.solar,
        "portfolio: max flex energy with forecast error"
    );
    Ok(())
}

async fn run_demand_charge(
    study: &DemandChargeStudyConfig,
    solver: &dyn ExternalSolver,
) -> Result<()> {
    let time_base = study.horizon.time_base()?;
    let samples = study.load_offset + time_base.n();

    let mut optimizer = DemandChargeOptimizer::with_window(time_base, study.load_offset);
    optimizer.set_load_data(vec![study.load_kw; samples]);
    optimizer.set_battery_specs(study.battery.clone());
    optimizer.set_initial_soc(study.initial_soc);

    match optimizer.optimize(solver, study.peak_demand_cost).await? {
        Some(status) => {
            let plan = optimizer.battery_plan();
            info!(
                status = %status,
                granularity_s = optimizer.granularity(),
                plan = %serde_json::to_string(plan)?,
                "demand charge: battery plan"
            );
        }
        None => warn!("demand charge: optimizer declined to run"),
    }
    Ok(())
}
