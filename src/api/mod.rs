use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AccountSnapshot, DEFAULT_SIMULATIONS, QuickInputs, QuickResult, RunControls, Scenario,
    SimulationError, SimulationResult, WithdrawalComparison, compare_strategies_with,
    quick_simulate, run_simulation_with_controls,
};

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub budget_ms: u64,
    pub default_simulations: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            budget_ms: 5_000,
            default_simulations: DEFAULT_SIMULATIONS,
        }
    }
}

impl ApiConfig {
    fn controls(&self) -> RunControls {
        RunControls {
            budget: Duration::from_millis(self.budget_ms),
            cancel: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    scenario: Scenario,
    snapshot: Option<AccountSnapshot>,
    num_simulations: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComparePayload {
    scenario: Scenario,
    snapshot: Option<AccountSnapshot>,
    num_simulations: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16, config: ApiConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::new(config));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement simulation API listening");
    axum::serve(listener, app).await
}

fn router(config: Arc<ApiConfig>) -> Router {
    Router::new()
        .route("/api/simulate", post(simulate_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/quick", post(quick_handler))
        .fallback(not_found_handler)
        .with_state(config)
}

async fn simulate_handler(
    State(config): State<Arc<ApiConfig>>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    match simulate_from_payload(payload, &config) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => error_response(err),
    }
}

async fn compare_handler(
    State(config): State<Arc<ApiConfig>>,
    Json(payload): Json<ComparePayload>,
) -> Response {
    match compare_from_payload(payload, &config) {
        Ok(comparison) => json_response(StatusCode::OK, comparison),
        Err(err) => error_response(err),
    }
}

async fn quick_handler(Json(inputs): Json<QuickInputs>) -> Response {
    match quick_from_inputs(&inputs) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => error_response(err),
    }
}

async fn not_found_handler() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        ErrorResponse {
            error: "Not found".to_string(),
        },
    )
}

fn simulate_from_payload(
    payload: SimulatePayload,
    config: &ApiConfig,
) -> Result<SimulationResult, SimulationError> {
    // A missing snapshot is the hypothetical mode: the run proceeds with
    // zero balances rather than failing.
    let snapshot = payload.snapshot.unwrap_or_default();
    run_simulation_with_controls(
        &payload.scenario,
        &snapshot,
        payload.num_simulations.unwrap_or(config.default_simulations),
        payload.seed,
        &config.controls(),
    )
}

fn compare_from_payload(
    payload: ComparePayload,
    config: &ApiConfig,
) -> Result<WithdrawalComparison, SimulationError> {
    // A comparison over no balances at all is vacuous; require a snapshot.
    let Some(snapshot) = payload.snapshot else {
        return Err(SimulationError::InsufficientData(
            "no account snapshot supplied; link accounts or provide hypothetical balances"
                .to_string(),
        ));
    };
    compare_strategies_with(
        &payload.scenario,
        &snapshot,
        payload.num_simulations.unwrap_or(config.default_simulations),
        payload.seed,
        &config.controls(),
    )
}

fn quick_from_inputs(inputs: &QuickInputs) -> Result<QuickResult, SimulationError> {
    quick_simulate(inputs)
}

fn status_for(err: &SimulationError) -> StatusCode {
    match err {
        SimulationError::InvalidScenario(_) => StatusCode::BAD_REQUEST,
        SimulationError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SimulationError::ConvergenceTimeout { .. } | SimulationError::Cancelled { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn error_response(err: SimulationError) -> Response {
    json_response(
        status_for(&err),
        ErrorResponse {
            error: err.to_string(),
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}
