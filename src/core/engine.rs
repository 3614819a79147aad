use super::models;
use super::sampler::ReturnSampler;
use super::tax::{self, TaxYearState};
use super::types::{AccountSnapshot, BucketBalances, Scenario, TaxPolicy, WithdrawalStrategy};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Portfolio {
    pub pre_tax: f64,
    pub roth: f64,
    pub taxable: f64,
    pub taxable_basis: f64,
    pub hsa: f64,
    pub cash: f64,
}

impl Portfolio {
    pub(crate) fn from_snapshot(snapshot: &AccountSnapshot) -> Self {
        let taxable = snapshot.balances.taxable.max(0.0);
        Self {
            pre_tax: snapshot.balances.pre_tax.max(0.0),
            roth: snapshot.balances.roth.max(0.0),
            taxable,
            taxable_basis: (taxable * snapshot.taxable_cost_basis_fraction.clamp(0.0, 1.0))
                .min(taxable),
            hsa: snapshot.balances.hsa.max(0.0),
            cash: snapshot.balances.cash.max(0.0),
        }
    }

    pub(crate) fn total(&self) -> f64 {
        self.pre_tax + self.roth + self.taxable + self.hsa + self.cash
    }

    fn balances(&self) -> BucketBalances {
        BucketBalances {
            pre_tax: self.pre_tax,
            roth: self.roth,
            taxable: self.taxable,
            hsa: self.hsa,
            cash: self.cash,
        }
    }

    fn zero(&mut self) {
        *self = Self {
            pre_tax: 0.0,
            roth: 0.0,
            taxable: 0.0,
            taxable_basis: 0.0,
            hsa: 0.0,
            cash: 0.0,
        };
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Bucket {
    Cash,
    Taxable,
    PreTax,
    Roth,
    Hsa,
}

#[derive(Copy, Clone, Debug, Default)]
struct Draw {
    net: f64,
    gross: f64,
}

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct WithdrawalOutcome {
    pub net_funded: f64,
    pub gross_withdrawn: f64,
    pub pretax_gross: f64,
}

fn withdraw_gross_from(
    portfolio: &mut Portfolio,
    tax_year: &mut TaxYearState,
    policy: &TaxPolicy,
    bucket: Bucket,
    target_gross: f64,
) -> Draw {
    if target_gross <= 0.0 {
        return Draw::default();
    }

    match bucket {
        Bucket::Cash => {
            let gross = portfolio.cash.min(target_gross);
            portfolio.cash -= gross;
            Draw { net: gross, gross }
        }
        Bucket::Roth => {
            let gross = portfolio.roth.min(target_gross);
            portfolio.roth -= gross;
            Draw { net: gross, gross }
        }
        Bucket::PreTax => {
            let gross = portfolio.pre_tax.min(target_gross);
            portfolio.pre_tax -= gross;
            tax_year.ordinary_income += gross;
            Draw {
                net: tax::net_from_pretax_gross(gross, policy),
                gross,
            }
        }
        // Non-qualified HSA draws are ordinary income (post-65 rule; the
        // penalty before 65 is not modeled).
        Bucket::Hsa => {
            let gross = portfolio.hsa.min(target_gross);
            portfolio.hsa -= gross;
            tax_year.ordinary_income += gross;
            Draw {
                net: tax::net_from_pretax_gross(gross, policy),
                gross,
            }
        }
        Bucket::Taxable => {
            let value_before = portfolio.taxable;
            if value_before <= 0.0 {
                return Draw::default();
            }
            let gross = value_before.min(target_gross);
            let basis_portion =
                (portfolio.taxable_basis * (gross / value_before)).min(portfolio.taxable_basis);
            let gain = (gross - basis_portion).max(0.0);
            portfolio.taxable -= gross;
            portfolio.taxable_basis = (portfolio.taxable_basis - basis_portion)
                .max(0.0)
                .min(portfolio.taxable);
            tax_year.realized_gains += gain;
            Draw {
                net: gross - gain * policy.capital_gains_rate.max(0.0),
                gross,
            }
        }
    }
}

fn withdraw_net_from(
    portfolio: &mut Portfolio,
    tax_year: &mut TaxYearState,
    policy: &TaxPolicy,
    bucket: Bucket,
    target_net: f64,
    max_gross: f64,
) -> Draw {
    if target_net <= 0.0 || max_gross <= 0.0 {
        return Draw::default();
    }

    let wanted_gross = match bucket {
        Bucket::Cash | Bucket::Roth => target_net,
        Bucket::PreTax | Bucket::Hsa => tax::pretax_gross_for_net(target_net, policy),
        Bucket::Taxable => tax::taxable_gross_for_net(
            target_net,
            portfolio.taxable,
            portfolio.taxable_basis,
            policy,
        ),
    };

    withdraw_gross_from(
        portfolio,
        tax_year,
        policy,
        bucket,
        wanted_gross.min(max_gross),
    )
}

fn net_capacity(portfolio: &Portfolio, policy: &TaxPolicy, bucket: Bucket) -> f64 {
    match bucket {
        Bucket::Cash => portfolio.cash.max(0.0),
        Bucket::Roth => portfolio.roth.max(0.0),
        Bucket::PreTax => tax::net_from_pretax_gross(portfolio.pre_tax, policy),
        Bucket::Hsa => tax::net_from_pretax_gross(portfolio.hsa, policy),
        Bucket::Taxable => tax::net_from_taxable_gross(
            portfolio.taxable,
            portfolio.taxable,
            portfolio.taxable_basis,
            policy,
        ),
    }
}

const PRO_RATA_BUCKETS: [Bucket; 5] = [
    Bucket::Cash,
    Bucket::Taxable,
    Bucket::PreTax,
    Bucket::Roth,
    Bucket::Hsa,
];

/// Proportional withdrawal across every bucket with remaining capacity.
/// Gross-up rounding leaves a residual, so a few proportional rounds run
/// before a sequential fallback drains whatever is left.
fn withdraw_pro_rata(
    portfolio: &mut Portfolio,
    tax_year: &mut TaxYearState,
    policy: &TaxPolicy,
    target_net: f64,
    outcome: &mut WithdrawalOutcome,
) -> f64 {
    let mut realized = 0.0;
    let mut remaining = target_net;

    for _ in 0..4 {
        if remaining <= 1e-9 {
            break;
        }

        let capacities = PRO_RATA_BUCKETS.map(|bucket| net_capacity(portfolio, policy, bucket));
        let total_capacity: f64 = capacities.iter().sum();
        if total_capacity <= 1e-9 {
            break;
        }

        let mut round_realized = 0.0;
        for (bucket, capacity) in PRO_RATA_BUCKETS.into_iter().zip(capacities) {
            let target = remaining * (capacity / total_capacity);
            let draw =
                withdraw_net_from(portfolio, tax_year, policy, bucket, target, f64::INFINITY);
            round_realized += draw.net;
            record_draw(outcome, bucket, draw);
        }

        realized += round_realized;
        remaining = target_net - realized;

        if round_realized <= 1e-9 {
            break;
        }
    }

    for bucket in PRO_RATA_BUCKETS {
        if remaining <= 1e-9 {
            break;
        }
        let draw = withdraw_net_from(portfolio, tax_year, policy, bucket, remaining, f64::INFINITY);
        realized += draw.net;
        remaining -= draw.net;
        record_draw(outcome, bucket, draw);
    }

    realized
}

fn record_draw(outcome: &mut WithdrawalOutcome, bucket: Bucket, draw: Draw) {
    outcome.gross_withdrawn += draw.gross;
    if bucket == Bucket::PreTax {
        outcome.pretax_gross += draw.gross;
    }
}

/// Funds the year's net spending need from the tax buckets under the
/// scenario's strategy. The RMD gross is always taken from pre-tax first;
/// net proceeds beyond the need are reinvested into the taxable bucket and
/// the gross is ordinary income either way. Depleted buckets zero out and the
/// shortfall cascades to the remaining buckets.
pub(crate) fn resolve_withdrawals(
    scenario: &Scenario,
    net_need: f64,
    rmd_gross_floor: f64,
    price_index: f64,
    portfolio: &mut Portfolio,
    tax_year: &mut TaxYearState,
) -> WithdrawalOutcome {
    let policy = &scenario.tax;
    let mut outcome = WithdrawalOutcome::default();
    let mut remaining = net_need.max(0.0);

    let rmd_gross = rmd_gross_floor.max(0.0).min(portfolio.pre_tax);
    if rmd_gross > 0.0 {
        let draw = withdraw_gross_from(portfolio, tax_year, policy, Bucket::PreTax, rmd_gross);
        record_draw(&mut outcome, Bucket::PreTax, draw);
        let applied = draw.net.min(remaining);
        remaining -= applied;
        outcome.net_funded += applied;
        let reinvested = draw.net - applied;
        if reinvested > 0.0 {
            portfolio.taxable += reinvested;
            portfolio.taxable_basis += reinvested;
        }
    }

    match scenario.strategy {
        WithdrawalStrategy::TaxOptimized => {
            let steps: [(Bucket, bool); 6] = [
                (Bucket::Cash, false),
                (Bucket::Taxable, false),
                (Bucket::PreTax, true),
                (Bucket::Roth, false),
                (Bucket::PreTax, false),
                (Bucket::Hsa, false),
            ];
            for (bucket, bracket_limited) in steps {
                if remaining <= 1e-9 {
                    break;
                }
                let max_gross = if bracket_limited {
                    tax::pretax_bracket_headroom(tax_year, policy, price_index)
                } else {
                    f64::INFINITY
                };
                let draw =
                    withdraw_net_from(portfolio, tax_year, policy, bucket, remaining, max_gross);
                remaining -= draw.net;
                outcome.net_funded += draw.net;
                record_draw(&mut outcome, bucket, draw);
            }
        }
        WithdrawalStrategy::ProRata => {
            let realized =
                withdraw_pro_rata(portfolio, tax_year, policy, remaining, &mut outcome);
            outcome.net_funded += realized;
        }
        WithdrawalStrategy::SimpleRate => {
            // The fixed-rate draw is a floor: when it nets less than the
            // year's need, the shortfall cascades pro-rata below. Surplus net
            // proceeds are banked as cash.
            let total = portfolio.total();
            let rate_gross = (scenario.withdrawal_rate * total).max(0.0);
            if total > 1e-9 && rate_gross > 0.0 {
                let shares = PRO_RATA_BUCKETS.map(|bucket| match bucket {
                    Bucket::Cash => portfolio.cash / total,
                    Bucket::Taxable => portfolio.taxable / total,
                    Bucket::PreTax => portfolio.pre_tax / total,
                    Bucket::Roth => portfolio.roth / total,
                    Bucket::Hsa => portfolio.hsa / total,
                });
                let mut rate_net = 0.0;
                for (bucket, share) in PRO_RATA_BUCKETS.into_iter().zip(shares) {
                    let draw = withdraw_gross_from(
                        portfolio,
                        tax_year,
                        policy,
                        bucket,
                        rate_gross * share,
                    );
                    rate_net += draw.net;
                    record_draw(&mut outcome, bucket, draw);
                }
                let applied = rate_net.min(remaining);
                remaining -= applied;
                outcome.net_funded += applied;
                portfolio.cash += rate_net - applied;
            }
            if remaining > 1e-9 {
                let realized =
                    withdraw_pro_rata(portfolio, tax_year, policy, remaining, &mut outcome);
                outcome.net_funded += realized;
            }
        }
    }

    outcome
}

/// One recorded year of a simulated lifetime.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathYear {
    pub age: u32,
    pub balances: BucketBalances,
    pub withdrawal: f64,
    pub pretax_withdrawal: f64,
    pub taxes_paid: f64,
    pub is_depleted: bool,
}

/// Compact per-trial output kept by the orchestrator; the full per-year rows
/// are only materialized when a trace is requested, so memory stays bounded
/// for large trial counts.
#[derive(Debug, Clone)]
pub(crate) struct TrialOutcome {
    pub ending_balances: Vec<f64>,
    pub depletion_age: Option<u32>,
    pub total_taxes: f64,
    pub final_balance: f64,
}

/// Advances one simulated lifetime year by year. Exactly one market draw is
/// consumed per simulated year, before any branching, so every strategy sees
/// the identical draw sequence for a given trial seed.
pub(crate) fn simulate_path(
    scenario: &Scenario,
    snapshot: &AccountSnapshot,
    sampler: &mut ReturnSampler,
    mut trace: Option<&mut Vec<PathYear>>,
) -> TrialOutcome {
    let years = (scenario.life_expectancy - scenario.current_age) as usize;
    let mut portfolio = Portfolio::from_snapshot(snapshot);
    let mut ending_balances = Vec::with_capacity(years);
    let mut depletion_age = None;
    let mut total_taxes = 0.0;
    let mut prior_ordinary_income = 0.0;

    for age in scenario.current_age..scenario.life_expectancy {
        let years_elapsed = (age - scenario.current_age) as i32;
        let general_index = (1.0 + scenario.inflation_rate).powi(years_elapsed);
        let medical_index = (1.0 + scenario.medical_inflation_rate).powi(years_elapsed);

        let assumption = if age < scenario.retirement_age {
            scenario.pre_retirement_return
        } else {
            scenario.post_retirement_return
        };
        let market_return = sampler.annual_return(assumption);

        if depletion_age.is_some() {
            ending_balances.push(0.0);
            if let Some(rows) = trace.as_deref_mut() {
                rows.push(PathYear {
                    age,
                    balances: BucketBalances::default(),
                    withdrawal: 0.0,
                    pretax_withdrawal: 0.0,
                    taxes_paid: 0.0,
                    is_depleted: true,
                });
            }
            continue;
        }

        if age < scenario.retirement_age {
            apply_growth(&mut portfolio, market_return);
            let contribution = (snapshot.annual_contribution + snapshot.employer_match).max(0.0)
                * general_index;
            portfolio.pre_tax += contribution;
            ending_balances.push(portfolio.total());
            if let Some(rows) = trace.as_deref_mut() {
                rows.push(PathYear {
                    age,
                    balances: portfolio.balances(),
                    withdrawal: 0.0,
                    pretax_withdrawal: 0.0,
                    taxes_paid: 0.0,
                    is_depleted: false,
                });
            }
            continue;
        }

        let mut tax_year = TaxYearState::default();

        let ss_annual =
            models::social_security_annual(&scenario.social_security, age) * general_index;
        let pension_annual = snapshot.pension_monthly_income.max(0.0) * 12.0;
        tax_year.ordinary_income +=
            ss_annual * scenario.tax.ss_taxable_share.clamp(0.0, 1.0) + pension_annual;
        let fixed_net = tax::net_fixed_income(ss_annual, pension_annual, &scenario.tax);

        let events = models::life_event_delta(
            age,
            years_elapsed as u32,
            &scenario.life_events,
            scenario.inflation_rate,
            scenario.medical_inflation_rate,
        );
        let healthcare = models::healthcare_cost(
            age,
            &scenario.healthcare,
            medical_index,
            general_index,
            prior_ordinary_income,
        );

        let mut spending =
            scenario.annual_spending * general_index + events.cost + healthcare.total;

        // Qualified HSA spending covers this year's medical costs tax-free.
        let hsa_qualified = portfolio.hsa.min(healthcare.total);
        portfolio.hsa -= hsa_qualified;
        spending -= hsa_qualified;

        let income_net = fixed_net + events.income;
        let net_need = (spending - income_net).max(0.0);
        portfolio.cash += (income_net - spending).max(0.0);

        let rmd_gross = models::rmd_amount(age, portfolio.pre_tax, scenario.rmd_enabled);
        let outcome = resolve_withdrawals(
            scenario,
            net_need,
            rmd_gross,
            general_index,
            &mut portfolio,
            &mut tax_year,
        );

        let taxes_paid = tax_year.liability(&scenario.tax);
        total_taxes += taxes_paid;
        prior_ordinary_income = tax_year.ordinary_income;

        if outcome.net_funded + 1e-6 < net_need {
            depletion_age = Some(age);
            portfolio.zero();
            ending_balances.push(0.0);
            if let Some(rows) = trace.as_deref_mut() {
                rows.push(PathYear {
                    age,
                    balances: BucketBalances::default(),
                    withdrawal: outcome.gross_withdrawn,
                    pretax_withdrawal: outcome.pretax_gross,
                    taxes_paid,
                    is_depleted: true,
                });
            }
            continue;
        }

        apply_growth(&mut portfolio, market_return);
        ending_balances.push(portfolio.total());
        if let Some(rows) = trace.as_deref_mut() {
            rows.push(PathYear {
                age,
                balances: portfolio.balances(),
                withdrawal: outcome.gross_withdrawn,
                pretax_withdrawal: outcome.pretax_gross,
                taxes_paid,
                is_depleted: false,
            });
        }
    }

    let final_balance = ending_balances.last().copied().unwrap_or(0.0);
    TrialOutcome {
        ending_balances,
        depletion_age,
        total_taxes,
        final_balance,
    }
}

fn apply_growth(portfolio: &mut Portfolio, market_return: f64) {
    portfolio.pre_tax = (portfolio.pre_tax * (1.0 + market_return)).max(0.0);
    portfolio.roth = (portfolio.roth * (1.0 + market_return)).max(0.0);
    portfolio.taxable = (portfolio.taxable * (1.0 + market_return)).max(0.0);
    portfolio.hsa = (portfolio.hsa * (1.0 + market_return)).max(0.0);
    portfolio.taxable_basis = portfolio.taxable_basis.min(portfolio.taxable);
}
