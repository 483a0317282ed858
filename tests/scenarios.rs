//! End-to-end solves through the default `microlp` backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use good_lp::Expression;
use open_energy_planner::interfaces::solve_peak_demand;
use open_energy_planner::model::{
    AssetModel, DischargeAccounting, EnhancedBatteryParams, Ev, EvParams, Fleet, FleetParams,
    ForecastErrorMargins, Portfolio, PortfolioParams, SocCheckpoint, TimeBase,
};
use open_energy_planner::optimizer::{
    ExternalSolver, GoodLpSolver, Objective, ProblemBuilder, SolveStatus, SolverBackend,
};
use open_energy_planner::runtime::{block_on_with_grace, build_runtime};

const TOL: f64 = 1e-6;

fn quarter_hourly_day() -> Arc<TimeBase> {
    Arc::new(TimeBase::uniform(96, 900.0).unwrap())
}

fn midnight() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn single_ev_fleet(rated_energy: f64, p_max_charge: f64) -> FleetParams {
    FleetParams {
        ev_capacity: 1,
        initial_soc_list: vec![0.0],
        ev: EvParams {
            rated_energy,
            p_max_charge,
            efficiency: 1.0,
            checkpoint: Some(SocCheckpoint { step: 48, min_soc: 0.8 }),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_peak_shaving_with_flat_load() {
    let params = EnhancedBatteryParams {
        rated_energy: 100.0,
        p_max_charge_discharge: 50.0,
        initial_soc: 0.5,
        charging_efficiency: 1.0,
        discharging_efficiency: 1.0,
        ..Default::default()
    };
    let load = vec![10.0; 96];

    let solver = GoodLpSolver::default();
    let outcome = solve_peak_demand(quarter_hourly_day(), params, &load, 15.0, &solver)
        .await
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let schedule = outcome.battery.schedule().expect("solved schedule");
    assert_eq!(schedule.power_state.len(), 96);
    assert!((schedule.energy_state[0] - 50.0).abs() < TOL);
    for p in &schedule.power_state {
        assert!(*p >= -50.0 - TOL && *p <= 50.0 + TOL, "power {p} out of bounds");
    }
    // every step discharges at the limit to push the net peak down to -40
    let max_net = schedule
        .power_state
        .iter()
        .map(|p| 10.0 - p)
        .fold(f64::NEG_INFINITY, f64::max);
    assert!((max_net + 40.0).abs() < 1e-4, "net peak {max_net}");
    for s in &schedule.soc {
        assert!(*s >= -TOL && *s <= 1.0 + TOL);
    }
    for e in &schedule.energy_state {
        assert!(*e >= -TOL && *e <= 100.0 + TOL);
    }
}

#[tokio::test]
async fn test_discharge_accounting_spreads_stored_energy() {
    let params = EnhancedBatteryParams {
        initial_soc: 0.5,
        charging_efficiency: 1.0,
        discharging_efficiency: 1.0,
        discharge_accounting: DischargeAccounting::Discharge,
        ..Default::default()
    };
    let load = vec![10.0; 96];
    let solver = GoodLpSolver::default();

    let outcome = solve_peak_demand(quarter_hourly_day(), params, &load, 15.0, &solver)
        .await
        .unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    // 50 kWh spread evenly over 24 h lowers every step by 50/24 kW
    let schedule = outcome.battery.schedule().expect("solved schedule");
    let max_net = schedule
        .power_state
        .iter()
        .map(|p| 10.0 - p)
        .fold(f64::NEG_INFINITY, f64::max);
    assert!((max_net - (10.0 - 50.0 / 24.0)).abs() < 1e-4, "net peak {max_net}");
    assert!(schedule.energy_state[96].abs() < 1e-4);
    for e in &schedule.energy_state {
        assert!(*e >= -TOL && *e <= 100.0 + TOL);
    }
}

#[tokio::test]
async fn test_single_site_flex_estimate() {
    let time_base = Arc::new(TimeBase::uniform(24, 3600.0).unwrap());
    let params = PortfolioParams {
        sites_capacity: 1,
        final_soe_list: vec![50.0],
        pv_forecast: 1000.0,
        load_forecast: 700.0,
        baseline_da: 2000.0,
        ..Default::default()
    };
    let portfolio = Portfolio::new(time_base, params).unwrap();
    let estimate = portfolio
        .solve(&GoodLpSolver::default(), ForecastErrorMargins::default())
        .await
        .unwrap();

    assert_eq!(estimate.status, SolveStatus::Optimal);
    let flex = estimate.flex_energy.unwrap();
    assert!(flex >= 2300.0 - TOL);
    // the site can take up to rated - final = 50 kWh above its terminal target
    assert!((flex - 2350.0).abs() < 1e-4, "flex {flex}");
    let total: f64 = estimate.total_energy_flow.unwrap().iter().sum();
    assert!((flex - (2300.0 + total)).abs() < TOL);
}

#[tokio::test]
async fn test_portfolio_pins_terminal_energy() {
    let time_base = Arc::new(TimeBase::uniform(24, 3600.0).unwrap());
    let params = PortfolioParams {
        sites_capacity: 2,
        final_soe_list: vec![50.0, 80.0],
        ..Default::default()
    };
    let portfolio = Portfolio::new(time_base, params).unwrap();
    let estimate = portfolio
        .solve(&GoodLpSolver::default(), ForecastErrorMargins::default())
        .await
        .unwrap();
    assert_eq!(estimate.status, SolveStatus::Optimal);

    let total: f64 = estimate.total_energy_flow.unwrap().iter().sum();
    assert!((total - (50.0 + 20.0)).abs() < 1e-4, "total flow {total}");

    let sites = estimate.site_schedules.unwrap();
    for (schedule, target) in sites.iter().zip([50.0, 80.0]) {
        assert_eq!(schedule.energy_state.len(), 25);
        assert!((schedule.energy_state[24] - target).abs() < TOL);
        for e in &schedule.energy_state {
            assert!(*e >= -TOL && *e <= 100.0 + TOL);
        }
    }
}

#[tokio::test]
async fn test_ev_reaches_checkpoint() {
    let fleet = Fleet::new(quarter_hourly_day(), midnight(), single_ev_fleet(60.0, 30.0)).unwrap();
    let outcome = fleet.solve(&GoodLpSolver::default()).await.unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let ev = &outcome.evs[0];
    let schedule = ev.schedule().expect("solved schedule");
    assert!(schedule.energy_state[0].abs() < TOL);
    assert!(schedule.soc[48] >= 0.8 - TOL, "soc at checkpoint {}", schedule.soc[48]);
    for e in &schedule.energy_state {
        assert!(*e >= -TOL && *e <= 60.0 + TOL);
    }
    for p in &schedule.power_state {
        assert!(*p >= -TOL && *p <= 30.0 + TOL);
    }
}

#[tokio::test]
async fn test_unreachable_checkpoint_reports_infeasible() {
    // 1 kW for 12 h cannot put 48 kWh into the vehicle
    let fleet = Fleet::new(quarter_hourly_day(), midnight(), single_ev_fleet(60.0, 1.0)).unwrap();
    let outcome = fleet.solve(&GoodLpSolver::default()).await.unwrap();
    assert_eq!(outcome.status, SolveStatus::Infeasible);
    assert!(outcome.evs[0].schedule().is_none());
    assert!(outcome.total_power_state.is_none());
}

#[tokio::test]
async fn test_fleet_totals_are_sum_of_vehicles() {
    let time_base = Arc::new(TimeBase::uniform(24, 3600.0).unwrap());
    let params = FleetParams {
        ev_capacity: 3,
        initial_soc_list: vec![0.1, 0.4, 0.7],
        ev: EvParams {
            checkpoint: Some(SocCheckpoint { step: 12, min_soc: 0.8 }),
            ..Default::default()
        },
        ..Default::default()
    };
    let fleet = Fleet::new(time_base, midnight(), params).unwrap();
    let outcome = fleet.solve(&GoodLpSolver::default()).await.unwrap();
    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert_eq!(outcome.energy_price_vector.iter().filter(|p| **p == 0.5).count(), 5);

    let total_power = outcome.total_power_state.unwrap();
    let total_energy = outcome.total_energy_in.unwrap();
    for t in 0..24 {
        let power: f64 = outcome.evs.iter().map(|ev| ev.schedule().unwrap().power_state[t]).sum();
        let energy: f64 = outcome.evs.iter().map(|ev| ev.schedule().unwrap().energy_in[t]).sum();
        assert!((total_power[t] - power).abs() < 1e-5);
        assert!((total_energy[t] - energy).abs() < 1e-5);
    }
    for ev in &outcome.evs {
        let schedule = ev.schedule().unwrap();
        assert!((schedule.soc[0] - ev.params().initial_soc).abs() < TOL);
        assert!(schedule.soc[12] >= 0.8 - TOL);
    }
}

#[tokio::test]
async fn test_derating_halves_power_above_threshold() {
    let time_base = Arc::new(TimeBase::uniform(8, 3600.0).unwrap());
    let mut builder = ProblemBuilder::new();
    let params = EvParams {
        rated_energy: 10.0,
        p_max_charge: 10.0,
        efficiency: 1.0,
        initial_soc: 0.0,
        max_soc_derating: 0.5,
        derating: true,
        checkpoint: None,
    };
    let mut ev = Ev::new(&mut builder, time_base, "ev_mip", params).unwrap();
    let constraints = ev.constraints();
    let charged: Expression = ev.energy_in.iter().map(|v| Expression::from(*v)).sum();
    let problem = builder.finish(Objective::maximize(charged), constraints);
    assert!(problem.is_mixed_integer());

    let outcome = GoodLpSolver::default().solve(problem).await;
    assert_eq!(outcome.status, SolveStatus::Optimal);
    ev.apply_solution(outcome.values.as_ref().unwrap());

    let schedule = ev.schedule().unwrap();
    assert!((schedule.soc[8] - 1.0).abs() < 1e-5);
    for p in &schedule.power_state {
        assert!(*p <= 5.0 + 1e-5, "derated power {p}");
    }
}

#[tokio::test]
async fn test_exhausted_time_budget_reports_timed_out() {
    let params = FleetParams {
        ev_capacity: 5,
        initial_soc_list: vec![0.0, 0.1, 0.2, 0.3, 0.4],
        ..Default::default()
    };
    let fleet = Fleet::new(quarter_hourly_day(), midnight(), params).unwrap();
    let solver = GoodLpSolver::new(SolverBackend::Microlp, Duration::ZERO);
    let outcome = fleet.solve(&solver).await.unwrap();
    assert_eq!(outcome.status, SolveStatus::TimedOut);
    assert!(outcome.evs.iter().all(|ev| ev.schedule().is_none()));
}

#[test]
fn test_runner_exits_promptly_after_a_timed_out_solve() {
    let params = FleetParams {
        ev_capacity: 40,
        initial_soc_list: vec![0.1; 40],
        ..Default::default()
    };
    let fleet = Fleet::new(quarter_hourly_day(), midnight(), params).unwrap();
    let solver = GoodLpSolver::new(SolverBackend::Microlp, Duration::from_millis(20));

    let started = Instant::now();
    let status = block_on_with_grace(
        build_runtime().unwrap(),
        async move { fleet.solve(&solver).await.unwrap().status },
        Duration::from_millis(100),
    );
    assert_eq!(status, SolveStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
}
