use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStrategy {
    TaxOptimized,
    SimpleRate,
    ProRata,
}

impl WithdrawalStrategy {
    pub const ALL: [WithdrawalStrategy; 3] = [
        WithdrawalStrategy::TaxOptimized,
        WithdrawalStrategy::SimpleRate,
        WithdrawalStrategy::ProRata,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnAssumption {
    pub mean: f64,
    pub vol: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeEventCategory {
    Housing,
    Healthcare,
    Education,
    Family,
    Travel,
    Income,
    Other,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventInflation {
    General,
    Medical,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeEvent {
    pub category: LifeEventCategory,
    pub start_age: u32,
    #[serde(default)]
    pub end_age: Option<u32>,
    #[serde(default)]
    pub annual_cost: Option<f64>,
    #[serde(default)]
    pub one_time_cost: Option<f64>,
    #[serde(default)]
    pub income_change: f64,
    pub inflation: EventInflation,
    #[serde(default)]
    pub custom_rate: Option<f64>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketBalances {
    pub pre_tax: f64,
    pub roth: f64,
    pub taxable: f64,
    pub hsa: f64,
    pub cash: f64,
}

impl BucketBalances {
    pub fn total(&self) -> f64 {
        self.pre_tax + self.roth + self.taxable + self.hsa + self.cash
    }
}

/// Starting state supplied by the accounts subsystem. Read-only during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountSnapshot {
    pub balances: BucketBalances,
    /// Fraction of the taxable bucket that is cost basis; per-lot tracking is
    /// out of scope.
    pub taxable_cost_basis_fraction: f64,
    pub annual_contribution: f64,
    pub employer_match: f64,
    pub pension_monthly_income: f64,
}

impl Default for AccountSnapshot {
    fn default() -> Self {
        Self {
            balances: BucketBalances::default(),
            taxable_cost_basis_fraction: 0.5,
            annual_contribution: 0.0,
            employer_match: 0.0,
            pension_monthly_income: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpouseParams {
    pub pia_monthly: Option<f64>,
    pub annual_income: Option<f64>,
    pub claiming_age: u32,
}

impl Default for SpouseParams {
    fn default() -> Self {
        Self {
            pia_monthly: None,
            annual_income: None,
            claiming_age: 67,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialSecurityParams {
    /// Manual PIA override in today's dollars per month. When absent and
    /// `estimate_from_income` is set, the PIA is estimated from income.
    pub pia_monthly: Option<f64>,
    pub estimate_from_income: bool,
    pub annual_income: Option<f64>,
    pub claiming_age: u32,
    pub spouse: Option<SpouseParams>,
}

impl Default for SocialSecurityParams {
    fn default() -> Self {
        Self {
            pia_monthly: None,
            estimate_from_income: true,
            annual_income: None,
            claiming_age: 67,
            spouse: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxPolicy {
    pub federal_rate: f64,
    pub state_rate: f64,
    pub capital_gains_rate: f64,
    /// Taxable share of Social Security benefits (statutory maximum 0.85).
    pub ss_taxable_share: f64,
    /// Ordinary-income level (today's dollars) the tax-optimized strategy
    /// fills with pre-tax withdrawals before spending Roth.
    pub pretax_bracket_ceiling: f64,
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            federal_rate: 0.22,
            state_rate: 0.05,
            capital_gains_rate: 0.15,
            ss_taxable_share: 0.85,
            pretax_bracket_ceiling: 94_300.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrmaaBracket {
    pub income_threshold: f64,
    pub part_b_monthly: f64,
    pub part_d_monthly: f64,
}

/// Jurisdiction/year-dependent healthcare figures, carried as data so callers
/// can refresh them without code changes. All components are today's dollars
/// and inflate at the medical inflation rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthcarePolicy {
    pub pre65_annual: f64,
    /// Replaces the entire pre-65 annual figure when set.
    pub pre65_override: Option<f64>,
    pub part_b_monthly: f64,
    pub part_d_monthly: f64,
    pub medigap_monthly: f64,
    pub irmaa_brackets: Vec<IrmaaBracket>,
    pub ltc_onset_age: u32,
    pub ltc_annual: f64,
}

impl Default for HealthcarePolicy {
    fn default() -> Self {
        Self {
            pre65_annual: 11_400.0,
            pre65_override: None,
            part_b_monthly: 174.70,
            part_d_monthly: 55.50,
            medigap_monthly: 165.0,
            irmaa_brackets: vec![
                IrmaaBracket {
                    income_threshold: 103_000.0,
                    part_b_monthly: 69.90,
                    part_d_monthly: 12.90,
                },
                IrmaaBracket {
                    income_threshold: 129_000.0,
                    part_b_monthly: 174.70,
                    part_d_monthly: 33.30,
                },
                IrmaaBracket {
                    income_threshold: 161_000.0,
                    part_b_monthly: 279.50,
                    part_d_monthly: 53.80,
                },
                IrmaaBracket {
                    income_threshold: 193_000.0,
                    part_b_monthly: 384.30,
                    part_d_monthly: 74.20,
                },
                IrmaaBracket {
                    income_threshold: 500_000.0,
                    part_b_monthly: 419.30,
                    part_d_monthly: 81.00,
                },
            ],
            ltc_onset_age: 82,
            ltc_annual: 63_000.0,
        }
    }
}

/// Immutable simulation input. Edits in the planning UI produce a new
/// Scenario state; nothing mutates during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scenario {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    /// Retirement spending target in today's dollars per year.
    pub annual_spending: f64,
    pub pre_retirement_return: ReturnAssumption,
    pub post_retirement_return: ReturnAssumption,
    pub inflation_rate: f64,
    pub medical_inflation_rate: f64,
    pub strategy: WithdrawalStrategy,
    /// Fixed portfolio fraction drawn each year by the simple_rate strategy.
    pub withdrawal_rate: f64,
    pub tax: TaxPolicy,
    pub social_security: SocialSecurityParams,
    pub healthcare: HealthcarePolicy,
    pub rmd_enabled: bool,
    pub life_events: Vec<LifeEvent>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            current_age: 35,
            retirement_age: 65,
            life_expectancy: 90,
            annual_spending: 60_000.0,
            pre_retirement_return: ReturnAssumption {
                mean: 0.08,
                vol: 0.15,
            },
            post_retirement_return: ReturnAssumption {
                mean: 0.05,
                vol: 0.10,
            },
            inflation_rate: 0.025,
            medical_inflation_rate: 0.045,
            strategy: WithdrawalStrategy::TaxOptimized,
            withdrawal_rate: 0.04,
            tax: TaxPolicy::default(),
            social_security: SocialSecurityParams::default(),
            healthcare: HealthcarePolicy::default(),
            rmd_enabled: true,
            life_events: Vec::new(),
        }
    }
}

impl Scenario {
    /// Structural validation, rejected before any simulation starts. The
    /// message names the violated constraint.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.life_expectancy <= self.current_age {
            return Err(invalid("life_expectancy must be > current_age"));
        }
        if self.retirement_age < self.current_age {
            return Err(invalid("retirement_age must be >= current_age"));
        }
        if self.retirement_age > self.life_expectancy {
            return Err(invalid("retirement_age must be <= life_expectancy"));
        }
        if !self.annual_spending.is_finite() || self.annual_spending < 0.0 {
            return Err(invalid("annual_spending must be >= 0"));
        }
        for (name, assumption) in [
            ("pre_retirement_return", self.pre_retirement_return),
            ("post_retirement_return", self.post_retirement_return),
        ] {
            if !assumption.mean.is_finite() || assumption.mean <= -1.0 {
                return Err(invalid(&format!("{name}.mean must be > -100%")));
            }
            if !assumption.vol.is_finite() || assumption.vol < 0.0 {
                return Err(invalid(&format!("{name}.vol must be >= 0")));
            }
        }
        for (name, rate) in [
            ("inflation_rate", self.inflation_rate),
            ("medical_inflation_rate", self.medical_inflation_rate),
        ] {
            if !rate.is_finite() || rate <= -1.0 {
                return Err(invalid(&format!("{name} must be > -100%")));
            }
        }
        if !self.withdrawal_rate.is_finite() || !(0.0..=1.0).contains(&self.withdrawal_rate) {
            return Err(invalid("withdrawal_rate must be between 0 and 1"));
        }
        for (name, rate) in [
            ("tax.federal_rate", self.tax.federal_rate),
            ("tax.state_rate", self.tax.state_rate),
            ("tax.capital_gains_rate", self.tax.capital_gains_rate),
            ("tax.ss_taxable_share", self.tax.ss_taxable_share),
        ] {
            if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
                return Err(invalid(&format!("{name} must be in [0, 1)")));
            }
        }
        if self.tax.federal_rate + self.tax.state_rate >= 1.0 {
            return Err(invalid("combined ordinary tax rate must be < 100%"));
        }
        if !(62..=70).contains(&self.social_security.claiming_age) {
            return Err(invalid(
                "social_security.claiming_age must be between 62 and 70",
            ));
        }
        if let Some(spouse) = &self.social_security.spouse {
            if !(62..=70).contains(&spouse.claiming_age) {
                return Err(invalid(
                    "social_security.spouse.claiming_age must be between 62 and 70",
                ));
            }
        }
        for (idx, event) in self.life_events.iter().enumerate() {
            if let Some(end_age) = event.end_age {
                if end_age < event.start_age {
                    return Err(invalid(&format!(
                        "life_events[{idx}]: start_age must be <= end_age"
                    )));
                }
            }
            if event.annual_cost.is_some() && event.one_time_cost.is_some() {
                return Err(invalid(&format!(
                    "life_events[{idx}]: annual_cost and one_time_cost are mutually exclusive"
                )));
            }
            for (name, value) in [
                ("annual_cost", event.annual_cost.unwrap_or(0.0)),
                ("one_time_cost", event.one_time_cost.unwrap_or(0.0)),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(invalid(&format!(
                        "life_events[{idx}].{name} must be >= 0"
                    )));
                }
            }
            if !event.income_change.is_finite() {
                return Err(invalid(&format!(
                    "life_events[{idx}].income_change must be finite"
                )));
            }
            if event.inflation == EventInflation::Custom {
                let Some(rate) = event.custom_rate else {
                    return Err(invalid(&format!(
                        "life_events[{idx}]: custom inflation requires custom_rate"
                    )));
                };
                if !rate.is_finite() || rate <= -1.0 {
                    return Err(invalid(&format!(
                        "life_events[{idx}].custom_rate must be > -100%"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl AccountSnapshot {
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (name, value) in [
            ("balances.pre_tax", self.balances.pre_tax),
            ("balances.roth", self.balances.roth),
            ("balances.taxable", self.balances.taxable),
            ("balances.hsa", self.balances.hsa),
            ("balances.cash", self.balances.cash),
            ("annual_contribution", self.annual_contribution),
            ("employer_match", self.employer_match),
            ("pension_monthly_income", self.pension_monthly_income),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(&format!("{name} must be >= 0")));
            }
        }
        if !self.taxable_cost_basis_fraction.is_finite()
            || !(0.0..=1.0).contains(&self.taxable_cost_basis_fraction)
        {
            return Err(invalid(
                "taxable_cost_basis_fraction must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

fn invalid(constraint: &str) -> SimulationError {
    SimulationError::InvalidScenario(constraint.to_string())
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
    /// Missing account data at the service boundary. The engine itself runs
    /// hypothetical zero-balance scenarios normally.
    #[error("insufficient account data: {0}")]
    InsufficientData(String),
    #[error(
        "simulation did not converge within {budget_ms} ms ({completed}/{requested} trials); retry with fewer trials"
    )]
    ConvergenceTimeout {
        budget_ms: u64,
        completed: u32,
        requested: u32,
    },
    #[error("simulation cancelled after {completed} trials")]
    Cancelled { completed: u32 },
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeBands {
    pub age: u32,
    pub nominal: PercentileBand,
    pub real: PercentileBand,
}

/// Aggregate output of one orchestrator run. Immutable; cacheable against the
/// triggering Scenario state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub num_simulations: u32,
    pub seed: u64,
    pub success_rate: f64,
    pub readiness_score: f64,
    pub median_depletion_age: Option<u32>,
    pub estimated_pia_monthly: f64,
    pub median_total_taxes: f64,
    pub median_final_balance: f64,
    pub bands: Vec<AgeBands>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutcome {
    pub strategy: WithdrawalStrategy,
    pub success_rate: f64,
    pub final_portfolio: f64,
    pub total_taxes_paid: f64,
    pub depleted_age: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalComparison {
    pub rows: Vec<StrategyOutcome>,
    pub recommended: WithdrawalStrategy,
}

/// Reduced inputs for the exploratory what-if calculator; no saved Scenario
/// required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuickInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub annual_spending: f64,
    pub pre_tax: f64,
    pub roth: f64,
    pub taxable: f64,
    pub annual_contribution: f64,
    pub expected_return: f64,
    pub return_volatility: f64,
    pub seed: Option<u64>,
}

impl Default for QuickInputs {
    fn default() -> Self {
        Self {
            current_age: 35,
            retirement_age: 65,
            life_expectancy: 90,
            annual_spending: 60_000.0,
            pre_tax: 0.0,
            roth: 0.0,
            taxable: 0.0,
            annual_contribution: 0.0,
            expected_return: 0.06,
            return_volatility: 0.12,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickResult {
    pub success_rate: f64,
    pub readiness_score: f64,
    pub projections: Vec<AgeBands>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_scenario() -> Scenario {
        Scenario::default()
    }

    #[test]
    fn default_scenario_is_valid() {
        base_scenario().validate().expect("default must validate");
        AccountSnapshot::default()
            .validate()
            .expect("default snapshot must validate");
    }

    #[test]
    fn rejects_retirement_after_life_expectancy() {
        let mut scenario = base_scenario();
        scenario.retirement_age = 95;
        let err = scenario.validate().expect_err("must reject");
        assert!(err.to_string().contains("retirement_age"));
    }

    #[test]
    fn rejects_life_expectancy_at_or_below_current_age() {
        let mut scenario = base_scenario();
        scenario.life_expectancy = scenario.current_age;
        let err = scenario.validate().expect_err("must reject");
        assert!(err.to_string().contains("life_expectancy"));
    }

    #[test]
    fn rejects_negative_spending() {
        let mut scenario = base_scenario();
        scenario.annual_spending = -1.0;
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn rejects_claiming_age_outside_program_bounds() {
        let mut scenario = base_scenario();
        scenario.social_security.claiming_age = 71;
        let err = scenario.validate().expect_err("must reject");
        assert!(err.to_string().contains("claiming_age"));
    }

    #[test]
    fn rejects_life_event_with_inverted_age_range() {
        let mut scenario = base_scenario();
        scenario.life_events.push(LifeEvent {
            category: LifeEventCategory::Travel,
            start_age: 70,
            end_age: Some(68),
            annual_cost: Some(5_000.0),
            one_time_cost: None,
            income_change: 0.0,
            inflation: EventInflation::General,
            custom_rate: None,
        });
        let err = scenario.validate().expect_err("must reject");
        assert!(err.to_string().contains("start_age must be <= end_age"));
    }

    #[test]
    fn rejects_life_event_with_both_cost_kinds() {
        let mut scenario = base_scenario();
        scenario.life_events.push(LifeEvent {
            category: LifeEventCategory::Housing,
            start_age: 70,
            end_age: None,
            annual_cost: Some(5_000.0),
            one_time_cost: Some(50_000.0),
            income_change: 0.0,
            inflation: EventInflation::General,
            custom_rate: None,
        });
        let err = scenario.validate().expect_err("must reject");
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn income_only_life_event_is_valid() {
        let mut scenario = base_scenario();
        scenario.life_events.push(LifeEvent {
            category: LifeEventCategory::Income,
            start_age: 66,
            end_age: Some(70),
            annual_cost: None,
            one_time_cost: None,
            income_change: 12_000.0,
            inflation: EventInflation::General,
            custom_rate: None,
        });
        scenario.validate().expect("income-only event is fine");
    }

    #[test]
    fn rejects_custom_inflation_without_rate() {
        let mut scenario = base_scenario();
        scenario.life_events.push(LifeEvent {
            category: LifeEventCategory::Other,
            start_age: 70,
            end_age: None,
            annual_cost: Some(1_000.0),
            one_time_cost: None,
            income_change: 0.0,
            inflation: EventInflation::Custom,
            custom_rate: None,
        });
        let err = scenario.validate().expect_err("must reject");
        assert!(err.to_string().contains("custom_rate"));
    }

    #[test]
    fn rejects_negative_snapshot_balance() {
        let mut snapshot = AccountSnapshot::default();
        snapshot.balances.roth = -100.0;
        let err = snapshot.validate().expect_err("must reject");
        assert!(err.to_string().contains("balances.roth"));
    }
}
