use tracing::info;

use super::orchestrator::{RunControls, run_simulation_with_controls};
use super::types::{
    AccountSnapshot, Scenario, SimulationError, StrategyOutcome, WithdrawalComparison,
    WithdrawalStrategy,
};

const COMPARE_SIMULATIONS: u32 = 400;

/// Runs the orchestrator once per withdrawal strategy against the same
/// return-draw seed sequence and ranks the outcomes.
pub fn compare_strategies(
    scenario: &Scenario,
    snapshot: &AccountSnapshot,
) -> Result<WithdrawalComparison, SimulationError> {
    compare_strategies_with(
        scenario,
        snapshot,
        COMPARE_SIMULATIONS,
        None,
        &RunControls::default(),
    )
}

pub fn compare_strategies_with(
    scenario: &Scenario,
    snapshot: &AccountSnapshot,
    num_simulations: u32,
    seed: Option<u64>,
    controls: &RunControls,
) -> Result<WithdrawalComparison, SimulationError> {
    scenario.validate()?;
    snapshot.validate()?;

    // One shared seed keeps the draw sequences identical across strategies,
    // so the comparison is over strategy behavior alone.
    let seed = seed.unwrap_or_else(rand::random);

    let mut rows = Vec::with_capacity(WithdrawalStrategy::ALL.len());
    for strategy in WithdrawalStrategy::ALL {
        let mut candidate = scenario.clone();
        candidate.strategy = strategy;
        let result =
            run_simulation_with_controls(&candidate, snapshot, num_simulations, Some(seed), controls)?;
        rows.push(StrategyOutcome {
            strategy,
            success_rate: result.success_rate,
            final_portfolio: result.median_final_balance,
            total_taxes_paid: result.median_total_taxes,
            depleted_age: result.median_depletion_age,
        });
    }

    let recommended = recommend(&rows);
    info!(?recommended, "strategy comparison complete");
    Ok(WithdrawalComparison { rows, recommended })
}

fn recommend(rows: &[StrategyOutcome]) -> WithdrawalStrategy {
    // Rows are ordered with tax_optimized first and `better` is strict, so
    // exact ties resolve toward tax_optimized.
    let mut best = &rows[0];
    for row in &rows[1..] {
        if better(row, best) {
            best = row;
        }
    }
    best.strategy
}

/// Higher success rate wins, then later (or no) depletion, then lower
/// lifetime taxes.
fn better(a: &StrategyOutcome, b: &StrategyOutcome) -> bool {
    if a.success_rate != b.success_rate {
        return a.success_rate > b.success_rate;
    }
    let depletion_rank = |row: &StrategyOutcome| {
        row.depleted_age.map(i64::from).unwrap_or(i64::MAX)
    };
    if depletion_rank(a) != depletion_rank(b) {
        return depletion_rank(a) > depletion_rank(b);
    }
    a.total_taxes_paid < b.total_taxes_paid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        BucketBalances, HealthcarePolicy, ReturnAssumption, SocialSecurityParams, TaxPolicy,
    };

    fn canonical_scenario() -> Scenario {
        Scenario {
            current_age: 62,
            retirement_age: 62,
            life_expectancy: 87,
            annual_spending: 30_000.0,
            pre_retirement_return: ReturnAssumption {
                mean: 0.05,
                vol: 0.0,
            },
            post_retirement_return: ReturnAssumption {
                mean: 0.05,
                vol: 0.0,
            },
            inflation_rate: 0.0,
            medical_inflation_rate: 0.0,
            strategy: WithdrawalStrategy::TaxOptimized,
            withdrawal_rate: 0.04,
            tax: TaxPolicy {
                federal_rate: 0.22,
                state_rate: 0.05,
                capital_gains_rate: 0.15,
                ss_taxable_share: 0.0,
                pretax_bracket_ceiling: 400_000.0,
            },
            social_security: SocialSecurityParams {
                pia_monthly: None,
                estimate_from_income: false,
                annual_income: None,
                claiming_age: 67,
                spouse: None,
            },
            healthcare: HealthcarePolicy {
                pre65_annual: 0.0,
                pre65_override: None,
                part_b_monthly: 0.0,
                part_d_monthly: 0.0,
                medigap_monthly: 0.0,
                irmaa_brackets: Vec::new(),
                ltc_onset_age: 200,
                ltc_annual: 0.0,
            },
            rmd_enabled: false,
            life_events: Vec::new(),
        }
    }

    fn pretax_snapshot(amount: f64) -> AccountSnapshot {
        AccountSnapshot {
            balances: BucketBalances {
                pre_tax: amount,
                ..BucketBalances::default()
            },
            taxable_cost_basis_fraction: 1.0,
            ..AccountSnapshot::default()
        }
    }

    fn row(
        comparison: &WithdrawalComparison,
        strategy: WithdrawalStrategy,
    ) -> &StrategyOutcome {
        comparison
            .rows
            .iter()
            .find(|row| row.strategy == strategy)
            .expect("row for every strategy")
    }

    #[test]
    fn tax_optimized_pays_no_more_tax_than_simple_rate_when_both_succeed() {
        let scenario = canonical_scenario();
        let snapshot = pretax_snapshot(2_000_000.0);
        let comparison = compare_strategies_with(
            &scenario,
            &snapshot,
            50,
            Some(9),
            &RunControls::default(),
        )
        .expect("runs");

        let optimized = row(&comparison, WithdrawalStrategy::TaxOptimized);
        let simple = row(&comparison, WithdrawalStrategy::SimpleRate);
        assert_eq!(optimized.success_rate, 1.0);
        assert_eq!(simple.success_rate, 1.0);
        assert!(optimized.total_taxes_paid <= simple.total_taxes_paid);
    }

    #[test]
    fn comparison_covers_every_strategy_once() {
        let scenario = canonical_scenario();
        let comparison = compare_strategies_with(
            &scenario,
            &pretax_snapshot(1_000_000.0),
            20,
            Some(4),
            &RunControls::default(),
        )
        .expect("runs");
        assert_eq!(comparison.rows.len(), 3);
        for strategy in WithdrawalStrategy::ALL {
            row(&comparison, strategy);
        }
    }

    #[test]
    fn exact_ties_recommend_tax_optimized() {
        let mut scenario = canonical_scenario();
        scenario.tax.federal_rate = 0.0;
        scenario.tax.state_rate = 0.0;
        scenario.tax.capital_gains_rate = 0.0;
        scenario.post_retirement_return = ReturnAssumption {
            mean: 0.0,
            vol: 0.0,
        };
        scenario.pre_retirement_return = scenario.post_retirement_return;

        let comparison = compare_strategies_with(
            &scenario,
            &pretax_snapshot(2_000_000.0),
            20,
            Some(4),
            &RunControls::default(),
        )
        .expect("runs");
        assert_eq!(comparison.recommended, WithdrawalStrategy::TaxOptimized);
    }

    #[test]
    fn same_seed_comparisons_are_reproducible() {
        let scenario = Scenario {
            current_age: 55,
            retirement_age: 65,
            life_expectancy: 90,
            ..Scenario::default()
        };
        let snapshot = AccountSnapshot {
            balances: BucketBalances {
                pre_tax: 600_000.0,
                roth: 150_000.0,
                taxable: 100_000.0,
                ..BucketBalances::default()
            },
            ..AccountSnapshot::default()
        };
        let controls = RunControls::default();
        let a = compare_strategies_with(&scenario, &snapshot, 64, Some(21), &controls)
            .expect("runs");
        let b = compare_strategies_with(&scenario, &snapshot, 64, Some(21), &controls)
            .expect("runs");
        assert_eq!(a, b);
    }

    #[test]
    fn ranking_prefers_success_then_later_depletion_then_lower_taxes() {
        let survivor = StrategyOutcome {
            strategy: WithdrawalStrategy::ProRata,
            success_rate: 0.9,
            final_portfolio: 100_000.0,
            total_taxes_paid: 250_000.0,
            depleted_age: None,
        };
        let depleter = StrategyOutcome {
            strategy: WithdrawalStrategy::SimpleRate,
            success_rate: 0.4,
            final_portfolio: 0.0,
            total_taxes_paid: 10_000.0,
            depleted_age: Some(80),
        };
        assert!(better(&survivor, &depleter));
        assert!(!better(&depleter, &survivor));

        let later = StrategyOutcome {
            depleted_age: Some(84),
            ..depleter.clone()
        };
        assert!(better(&later, &depleter));

        let cheaper = StrategyOutcome {
            total_taxes_paid: 200_000.0,
            ..survivor.clone()
        };
        assert!(better(&cheaper, &survivor));
    }

    #[test]
    fn invalid_scenario_fails_before_any_strategy_runs() {
        let mut scenario = canonical_scenario();
        scenario.annual_spending = f64::NAN;
        let err = compare_strategies(&scenario, &pretax_snapshot(100_000.0))
            .expect_err("must reject");
        assert!(matches!(err, SimulationError::InvalidScenario(_)));
    }
}
