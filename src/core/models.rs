use super::types::{
    EventInflation, HealthcarePolicy, IrmaaBracket, LifeEvent, SocialSecurityParams, SpouseParams,
};

pub const RMD_START_AGE: u32 = 73;
pub const MEDICARE_AGE: u32 = 65;
pub const FULL_RETIREMENT_AGE: u32 = 67;
pub const MAX_CLAIMING_AGE: u32 = 70;

// IRS Uniform Lifetime Table (2022 revision), ages 73 through 110. The last
// factor is reused for older ages.
const UNIFORM_LIFETIME: [f64; 38] = [
    26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, 18.5, 17.7, 16.8, 16.0, 15.2, 14.4,
    13.7, 12.9, 12.2, 11.5, 10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4, 6.0, 5.6, 5.2, 4.9,
    4.6, 4.3, 4.1, 3.9, 3.7, 3.5,
];

pub fn uniform_lifetime_factor(age: u32) -> f64 {
    let idx = age.saturating_sub(RMD_START_AGE) as usize;
    UNIFORM_LIFETIME[idx.min(UNIFORM_LIFETIME.len() - 1)]
}

/// Mandatory pre-tax withdrawal for the year; zero before the threshold age.
/// This is a floor for the withdrawal resolver, not a cap.
pub fn rmd_amount(age: u32, pre_tax_balance: f64, enabled: bool) -> f64 {
    if !enabled || age < RMD_START_AGE || pre_tax_balance <= 0.0 {
        return 0.0;
    }
    pre_tax_balance / uniform_lifetime_factor(age)
}

// 2024 PIA bend points and wage cap.
const AIME_BEND_1: f64 = 1_174.0;
const AIME_BEND_2: f64 = 7_078.0;
const SSA_WAGE_CAP: f64 = 168_600.0;
const CONSERVATIVE_DEFAULT_PIA: f64 = 1_500.0;

/// Claiming-age multiplier on the PIA: 5/9% per month for the first 36 months
/// before FRA and 5/12% per month beyond, 2/3% per month (8%/yr) of delayed
/// credit through age 70.
pub fn claiming_adjustment(claiming_age: u32) -> f64 {
    let months = claiming_age as i64 * 12 - FULL_RETIREMENT_AGE as i64 * 12;
    if months < 0 {
        let early = (-months) as f64;
        let first = early.min(36.0);
        let rest = (early - 36.0).max(0.0);
        1.0 - first * (5.0 / 9.0 / 100.0) - rest * (5.0 / 12.0 / 100.0)
    } else {
        let capped = months.min(((MAX_CLAIMING_AGE - FULL_RETIREMENT_AGE) * 12) as i64) as f64;
        1.0 + capped * (2.0 / 3.0 / 100.0)
    }
}

/// PIA estimated from capped annual income through the bend-point formula.
/// Degrades to a conservative default when no income data is available.
pub fn estimate_pia(annual_income: Option<f64>) -> f64 {
    let Some(income) = annual_income.filter(|v| v.is_finite() && *v > 0.0) else {
        return CONSERVATIVE_DEFAULT_PIA;
    };
    let aime = income.min(SSA_WAGE_CAP) / 12.0;
    0.90 * aime.min(AIME_BEND_1)
        + 0.32 * (aime - AIME_BEND_1).clamp(0.0, AIME_BEND_2 - AIME_BEND_1)
        + 0.15 * (aime - AIME_BEND_2).max(0.0)
}

pub fn self_pia(params: &SocialSecurityParams) -> f64 {
    match params.pia_monthly {
        Some(pia) => pia.max(0.0),
        None if params.estimate_from_income => estimate_pia(params.annual_income),
        None => 0.0,
    }
}

pub fn self_monthly_benefit(params: &SocialSecurityParams) -> f64 {
    self_pia(params) * claiming_adjustment(params.claiming_age)
}

fn spouse_pia(spouse: &SpouseParams) -> f64 {
    match spouse.pia_monthly {
        Some(pia) => pia.max(0.0),
        None => spouse.annual_income.map(|v| estimate_pia(Some(v))).unwrap_or(0.0),
    }
}

pub fn spouse_monthly_benefit(spouse: &SpouseParams) -> f64 {
    spouse_pia(spouse) * claiming_adjustment(spouse.claiming_age)
}

/// Household Social Security income for one simulated year, in today's
/// dollars. Each benefit starts at its own claiming age.
pub fn social_security_annual(params: &SocialSecurityParams, age: u32) -> f64 {
    let mut annual = 0.0;
    if age >= params.claiming_age {
        annual += self_monthly_benefit(params) * 12.0;
    }
    if let Some(spouse) = &params.spouse {
        if age >= spouse.claiming_age {
            annual += spouse_monthly_benefit(spouse) * 12.0;
        }
    }
    annual
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HealthcareCost {
    pub pre65: f64,
    pub medicare: f64,
    pub ltc: f64,
    pub irmaa_surcharge: f64,
    pub total: f64,
}

/// Age-indexed healthcare cost for one simulated year, nominal dollars.
///
/// Below 65 the ACA-equivalent figure applies (an override replaces the whole
/// figure). From 65, Part B + Part D + Medigap plus the IRMAA surcharge tier
/// selected by the prior simulated year's ordinary income (the program's
/// income lookback), plus a flat LTC cost from the configured onset age.
/// Every component inflates at the medical rate; IRMAA thresholds are indexed
/// by general inflation.
pub fn healthcare_cost(
    age: u32,
    policy: &HealthcarePolicy,
    medical_index: f64,
    general_index: f64,
    prior_year_ordinary_income: f64,
) -> HealthcareCost {
    if age < MEDICARE_AGE {
        let base = policy.pre65_override.unwrap_or(policy.pre65_annual).max(0.0);
        let pre65 = base * medical_index;
        return HealthcareCost {
            pre65,
            total: pre65,
            ..HealthcareCost::default()
        };
    }

    let medicare =
        (policy.part_b_monthly + policy.part_d_monthly + policy.medigap_monthly) * 12.0
            * medical_index;
    let irmaa_surcharge = irmaa_monthly_surcharge(
        &policy.irmaa_brackets,
        prior_year_ordinary_income,
        general_index,
    ) * 12.0
        * medical_index;
    let ltc = if age >= policy.ltc_onset_age {
        policy.ltc_annual.max(0.0) * medical_index
    } else {
        0.0
    };

    HealthcareCost {
        pre65: 0.0,
        medicare,
        ltc,
        irmaa_surcharge,
        total: medicare + irmaa_surcharge + ltc,
    }
}

fn irmaa_monthly_surcharge(brackets: &[IrmaaBracket], income: f64, general_index: f64) -> f64 {
    let mut monthly = 0.0;
    for bracket in brackets {
        if income >= bracket.income_threshold * general_index {
            monthly = bracket.part_b_monthly + bracket.part_d_monthly;
        }
    }
    monthly
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EventDelta {
    pub cost: f64,
    pub income: f64,
}

/// Net life-event adjustment for one simulated year, nominal dollars.
/// Recurring costs apply over [start_age, end_age] (open-ended when end_age
/// is absent); a one-time cost fires only in the year `start_age` equals the
/// simulated age, so it cannot recur and never fires when start_age falls
/// outside the simulated range.
pub fn life_event_delta(
    age: u32,
    years_elapsed: u32,
    events: &[LifeEvent],
    inflation_rate: f64,
    medical_inflation_rate: f64,
) -> EventDelta {
    let general_index = (1.0 + inflation_rate).powi(years_elapsed as i32);
    let mut delta = EventDelta::default();

    for event in events {
        let index = match event.inflation {
            EventInflation::General => general_index,
            EventInflation::Medical => (1.0 + medical_inflation_rate).powi(years_elapsed as i32),
            EventInflation::Custom => {
                (1.0 + event.custom_rate.unwrap_or(inflation_rate)).powi(years_elapsed as i32)
            }
        };

        let active = age >= event.start_age && event.end_age.is_none_or(|end| age <= end);
        if active {
            delta.cost += event.annual_cost.unwrap_or(0.0).max(0.0) * index;
            delta.income += event.income_change * general_index;
        }
        if age == event.start_age {
            delta.cost += event.one_time_cost.unwrap_or(0.0).max(0.0) * index;
        }
    }

    delta
}
