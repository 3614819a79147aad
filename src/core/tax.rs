use super::types::TaxPolicy;

/// Running cash-flow totals for one simulated year. Ordinary income covers
/// pre-tax withdrawals (RMD included), pension income, the taxable share of
/// Social Security, and non-qualified HSA draws; realized gains come from
/// taxable-bucket sales.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TaxYearState {
    pub ordinary_income: f64,
    pub realized_gains: f64,
}

impl TaxYearState {
    /// The year's single tax liability figure.
    pub fn liability(&self, policy: &TaxPolicy) -> f64 {
        self.ordinary_income.max(0.0) * ordinary_rate(policy)
            + self.realized_gains.max(0.0) * policy.capital_gains_rate.max(0.0)
    }
}

pub fn ordinary_rate(policy: &TaxPolicy) -> f64 {
    (policy.federal_rate + policy.state_rate).clamp(0.0, 0.999)
}

pub fn net_from_pretax_gross(gross: f64, policy: &TaxPolicy) -> f64 {
    gross.max(0.0) * (1.0 - ordinary_rate(policy))
}

/// Gross pre-tax withdrawal required to net a spending amount after ordinary
/// tax. Flat marginal rates keep the inversion closed-form.
pub fn pretax_gross_for_net(net: f64, policy: &TaxPolicy) -> f64 {
    net.max(0.0) / (1.0 - ordinary_rate(policy))
}

/// Realized-gain share of a taxable sale under proportional basis
/// consumption; per-lot tracking is out of scope.
pub fn taxable_gain_fraction(value: f64, basis: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    (1.0 - basis.max(0.0) / value).clamp(0.0, 1.0)
}

pub fn net_from_taxable_gross(gross: f64, value: f64, basis: f64, policy: &TaxPolicy) -> f64 {
    let gain_share = taxable_gain_fraction(value, basis);
    gross.max(0.0) * (1.0 - gain_share * policy.capital_gains_rate.max(0.0))
}

pub fn taxable_gross_for_net(net: f64, value: f64, basis: f64, policy: &TaxPolicy) -> f64 {
    let gain_share = taxable_gain_fraction(value, basis);
    let keep = 1.0 - gain_share * policy.capital_gains_rate.max(0.0);
    if keep <= 1e-9 {
        return 0.0;
    }
    net.max(0.0) / keep
}

/// After-tax value of the year's fixed income streams (Social Security at its
/// taxable share, pension fully ordinary).
pub fn net_fixed_income(ss_annual: f64, pension_annual: f64, policy: &TaxPolicy) -> f64 {
    let rate = ordinary_rate(policy);
    let ss_net = ss_annual.max(0.0) * (1.0 - policy.ss_taxable_share.clamp(0.0, 1.0) * rate);
    let pension_net = pension_annual.max(0.0) * (1.0 - rate);
    ss_net + pension_net
}

/// Ordinary income the tax-optimized strategy can still add from pre-tax
/// withdrawals before crossing the target bracket ceiling.
pub fn pretax_bracket_headroom(
    state: &TaxYearState,
    policy: &TaxPolicy,
    price_index: f64,
) -> f64 {
    (policy.pretax_bracket_ceiling.max(0.0) * price_index - state.ordinary_income.max(0.0))
        .max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn policy() -> TaxPolicy {
        TaxPolicy {
            federal_rate: 0.22,
            state_rate: 0.05,
            capital_gains_rate: 0.15,
            ss_taxable_share: 0.85,
            pretax_bracket_ceiling: 94_300.0,
        }
    }

    #[test]
    fn pretax_gross_up_round_trips() {
        let policy = policy();
        let gross = pretax_gross_for_net(10_000.0, &policy);
        assert_approx(net_from_pretax_gross(gross, &policy), 10_000.0);
        assert_approx(gross, 10_000.0 / 0.73);
    }

    #[test]
    fn taxable_gross_up_round_trips_with_partial_basis() {
        let policy = policy();
        let value = 100_000.0;
        let basis = 40_000.0;
        let gross = taxable_gross_for_net(10_000.0, value, basis, &policy);
        assert_approx(net_from_taxable_gross(gross, value, basis, &policy), 10_000.0);
        assert!(gross > 10_000.0);
    }

    #[test]
    fn full_basis_sale_is_untaxed() {
        let policy = policy();
        assert_approx(taxable_gain_fraction(50_000.0, 50_000.0), 0.0);
        assert_approx(
            net_from_taxable_gross(5_000.0, 50_000.0, 50_000.0, &policy),
            5_000.0,
        );
    }

    #[test]
    fn gain_fraction_clamps_when_basis_exceeds_value() {
        assert_approx(taxable_gain_fraction(40_000.0, 60_000.0), 0.0);
        assert_approx(taxable_gain_fraction(40_000.0, 0.0), 1.0);
        assert_approx(taxable_gain_fraction(0.0, 0.0), 0.0);
    }

    #[test]
    fn liability_combines_ordinary_and_gains_components() {
        let policy = policy();
        let state = TaxYearState {
            ordinary_income: 50_000.0,
            realized_gains: 10_000.0,
        };
        assert_approx(state.liability(&policy), 50_000.0 * 0.27 + 10_000.0 * 0.15);
    }

    #[test]
    fn fixed_income_taxes_ss_at_its_taxable_share_only() {
        let policy = policy();
        let net = net_fixed_income(20_000.0, 12_000.0, &policy);
        let expected = 20_000.0 * (1.0 - 0.85 * 0.27) + 12_000.0 * 0.73;
        assert_approx(net, expected);
    }

    #[test]
    fn bracket_headroom_shrinks_with_income_and_scales_with_prices() {
        let policy = policy();
        let mut state = TaxYearState::default();
        assert_approx(pretax_bracket_headroom(&state, &policy, 1.0), 94_300.0);

        state.ordinary_income = 90_000.0;
        assert_approx(pretax_bracket_headroom(&state, &policy, 1.0), 4_300.0);

        state.ordinary_income = 100_000.0;
        assert_approx(pretax_bracket_headroom(&state, &policy, 1.0), 0.0);
        assert!(pretax_bracket_headroom(&state, &policy, 2.0) > 0.0);
    }
}
