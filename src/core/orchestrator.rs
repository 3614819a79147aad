use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, warn};

use super::engine::{self, TrialOutcome};
use super::models;
use super::sampler::ReturnSampler;
use super::types::{
    AccountSnapshot, AgeBands, BucketBalances, PercentileBand, QuickInputs, QuickResult,
    ReturnAssumption, Scenario, SimulationError, SimulationResult,
};

pub const DEFAULT_SIMULATIONS: u32 = 1_000;
const QUICK_SIMULATIONS: u32 = 500;
const DEFAULT_BUDGET_MS: u64 = 5_000;

// Trials between cancellation/deadline checks; a chunk in flight always
// completes so aggregates never see a half-finished trial.
const TRIAL_CHUNK: u32 = 64;

/// Wall-clock budget and cooperative cancellation for one orchestrator run.
#[derive(Clone, Debug)]
pub struct RunControls {
    pub budget: Duration,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for RunControls {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(DEFAULT_BUDGET_MS),
            cancel: None,
        }
    }
}

/// Runs `num_simulations` independent path trials and aggregates them into a
/// `SimulationResult`. A fixed seed reproduces the result bit for bit; pass
/// `None` to draw a fresh seed.
pub fn run_simulation(
    scenario: &Scenario,
    snapshot: &AccountSnapshot,
    num_simulations: u32,
    seed: Option<u64>,
) -> Result<SimulationResult, SimulationError> {
    run_simulation_with_controls(scenario, snapshot, num_simulations, seed, &RunControls::default())
}

pub fn run_simulation_with_controls(
    scenario: &Scenario,
    snapshot: &AccountSnapshot,
    num_simulations: u32,
    seed: Option<u64>,
    controls: &RunControls,
) -> Result<SimulationResult, SimulationError> {
    scenario.validate()?;
    snapshot.validate()?;
    if num_simulations == 0 {
        return Err(SimulationError::InvalidScenario(
            "num_simulations must be > 0".to_string(),
        ));
    }

    let seed = seed.unwrap_or_else(rand::random);
    let deadline = Instant::now() + controls.budget;
    info!(
        num_simulations,
        seed,
        strategy = ?scenario.strategy,
        "starting retirement simulation"
    );

    let mut outcomes: Vec<TrialOutcome> = Vec::with_capacity(num_simulations as usize);
    let mut next_trial = 0u32;
    while next_trial < num_simulations {
        if let Some(flag) = &controls.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(SimulationError::Cancelled {
                    completed: outcomes.len() as u32,
                });
            }
        }
        if Instant::now() >= deadline {
            warn!(
                completed = outcomes.len(),
                requested = num_simulations,
                "simulation wall-clock budget exhausted"
            );
            return Err(SimulationError::ConvergenceTimeout {
                budget_ms: controls.budget.as_millis() as u64,
                completed: outcomes.len() as u32,
                requested: num_simulations,
            });
        }

        let chunk_end = (next_trial + TRIAL_CHUNK).min(num_simulations);
        let mut chunk: Vec<TrialOutcome> = (next_trial..chunk_end)
            .into_par_iter()
            .map(|trial| {
                let mut sampler = ReturnSampler::for_trial(seed, trial);
                engine::simulate_path(scenario, snapshot, &mut sampler, None)
            })
            .collect();
        outcomes.append(&mut chunk);
        next_trial = chunk_end;
    }

    let result = aggregate(scenario, seed, num_simulations, outcomes);
    debug!(
        success_rate = result.success_rate,
        readiness_score = result.readiness_score,
        "simulation complete"
    );
    Ok(result)
}

/// Reduced-input what-if projection for callers without a saved Scenario.
pub fn quick_simulate(inputs: &QuickInputs) -> Result<QuickResult, SimulationError> {
    let assumption = ReturnAssumption {
        mean: inputs.expected_return,
        vol: inputs.return_volatility,
    };
    let scenario = Scenario {
        current_age: inputs.current_age,
        retirement_age: inputs.retirement_age,
        life_expectancy: inputs.life_expectancy,
        annual_spending: inputs.annual_spending,
        pre_retirement_return: assumption,
        post_retirement_return: assumption,
        ..Scenario::default()
    };
    let snapshot = AccountSnapshot {
        balances: BucketBalances {
            pre_tax: inputs.pre_tax,
            roth: inputs.roth,
            taxable: inputs.taxable,
            ..BucketBalances::default()
        },
        annual_contribution: inputs.annual_contribution,
        ..AccountSnapshot::default()
    };

    let result = run_simulation(&scenario, &snapshot, QUICK_SIMULATIONS, inputs.seed)?;
    Ok(QuickResult {
        success_rate: result.success_rate,
        readiness_score: result.readiness_score,
        projections: result.bands,
    })
}

fn aggregate(
    scenario: &Scenario,
    seed: u64,
    num_simulations: u32,
    outcomes: Vec<TrialOutcome>,
) -> SimulationResult {
    let years = (scenario.life_expectancy - scenario.current_age) as usize;
    let n = outcomes.len();

    let mut samples: Vec<Vec<f64>> = (0..years).map(|_| Vec::with_capacity(n)).collect();
    for outcome in &outcomes {
        for (idx, balance) in outcome.ending_balances.iter().enumerate() {
            samples[idx].push(*balance);
        }
    }

    let mut bands = Vec::with_capacity(years);
    for (idx, column) in samples.iter_mut().enumerate() {
        let nominal = band(column);
        let deflator = (1.0 + scenario.inflation_rate)
            .powi(idx as i32 + 1)
            .max(1e-9);
        bands.push(AgeBands {
            age: scenario.current_age + idx as u32,
            nominal,
            real: PercentileBand {
                p10: nominal.p10 / deflator,
                p25: nominal.p25 / deflator,
                p50: nominal.p50 / deflator,
                p75: nominal.p75 / deflator,
                p90: nominal.p90 / deflator,
            },
        });
    }

    let successes = outcomes
        .iter()
        .filter(|outcome| outcome.depletion_age.is_none())
        .count();
    let success_rate = successes as f64 / n as f64;

    let mut depletion_ages: Vec<u32> =
        outcomes.iter().filter_map(|o| o.depletion_age).collect();
    depletion_ages.sort_unstable();
    let median_depletion_age = if depletion_ages.len() * 2 < n {
        None
    } else {
        Some(depletion_ages[depletion_ages.len() / 2])
    };

    let retirement_years = scenario
        .life_expectancy
        .saturating_sub(scenario.retirement_age)
        .max(1) as f64;
    let coverage_sum: f64 = outcomes
        .iter()
        .map(|outcome| match outcome.depletion_age {
            None => 1.0,
            Some(age) => {
                ((age.saturating_sub(scenario.retirement_age)) as f64 / retirement_years)
                    .clamp(0.0, 1.0)
            }
        })
        .sum();
    let readiness_score =
        (100.0 * (0.85 * success_rate + 0.15 * coverage_sum / n as f64)).clamp(0.0, 100.0);

    let final_deflator = (1.0 + scenario.inflation_rate).powi(years as i32).max(1e-9);
    let mut total_taxes: Vec<f64> = outcomes.iter().map(|o| o.total_taxes).collect();
    let mut final_balances: Vec<f64> = outcomes
        .iter()
        .map(|o| o.final_balance / final_deflator)
        .collect();

    SimulationResult {
        num_simulations,
        seed,
        success_rate,
        readiness_score,
        median_depletion_age,
        estimated_pia_monthly: models::self_pia(&scenario.social_security),
        median_total_taxes: percentile(&mut total_taxes, 50.0),
        median_final_balance: percentile(&mut final_balances, 50.0),
        bands,
    }
}

fn band(values: &mut [f64]) -> PercentileBand {
    PercentileBand {
        p10: percentile(values, 10.0),
        p25: percentile(values, 25.0),
        p50: percentile(values, 50.0),
        p75: percentile(values, 75.0),
        p90: percentile(values, 90.0),
    }
}

pub(crate) fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
