mod compare;
mod engine;
mod models;
mod orchestrator;
mod sampler;
mod tax;
mod types;

pub use compare::{compare_strategies, compare_strategies_with};
pub use orchestrator::{
    DEFAULT_SIMULATIONS, RunControls, quick_simulate, run_simulation,
    run_simulation_with_controls,
};
pub use types::{
    AccountSnapshot, AgeBands, BucketBalances, EventInflation, HealthcarePolicy, IrmaaBracket,
    LifeEvent, LifeEventCategory, PercentileBand, QuickInputs, QuickResult, ReturnAssumption,
    Scenario, SimulationError, SimulationResult, SocialSecurityParams, SpouseParams,
    StrategyOutcome, TaxPolicy, WithdrawalComparison, WithdrawalStrategy,
};
