//! HTTP simulation engine for qkdlab.
//!
//! Serves the engine contract the session controller talks to: continuous
//! runs (start, stop, poll) and single-shot runs, backed by the reference
//! engine in [`qkdlab_core::engine`].

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use qkdlab_core::engine::{self, continuous::ContinuousRun};
use qkdlab_core::transport::{POLL_PATH, RUN_ONCE_PATH, START_PATH, STOP_PATH};
use qkdlab_core::{Envelope, RunConfig, RunStatus, SimulationResult, SimulationSnapshot, StartAck};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// The continuous run currently being served, if any.
struct ActiveRun {
    id: String,
    run: ContinuousRun,
    started: Instant,
    polls: u64,
}

struct Engine {
    rng: StdRng,
    active: Option<ActiveRun>,
    runs_started: u64,
    single_shots: u64,
}

/// Shared server state.
struct AppState {
    engine: Mutex<Engine>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    running: bool,
    simulation_id: Option<String>,
    polls: u64,
    runs_started: u64,
    single_shots: u64,
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

async fn handle_start(
    State(state): State<Arc<AppState>>,
    Json(config): Json<RunConfig>,
) -> Json<StartAck> {
    let mut engine = state.engine.lock().await;
    if let Some(previous) = engine.active.take() {
        log::info!("replacing continuous run {}", previous.id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    log::info!(
        "continuous run {id} started: distance={} noise={} rate={}",
        config.distance,
        config.channel_noise,
        config.photon_rate
    );
    let photon_rate = config.photon_rate;
    engine.active = Some(ActiveRun {
        id: id.clone(),
        run: ContinuousRun::new(config),
        started: Instant::now(),
        polls: 0,
    });
    engine.runs_started += 1;

    Json(StartAck {
        status: RunStatus::Success,
        message: Some("Continuous simulation started".to_string()),
        simulation_id: Some(id),
        photon_rate: Some(photon_rate),
    })
}

async fn handle_stop(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    let mut engine = state.engine.lock().await;
    match engine.active.take() {
        Some(run) => {
            log::info!("continuous run {} stopped after {} polls", run.id, run.polls);
            Json(Envelope {
                status: RunStatus::Success,
                message: Some("Continuous simulation stopped".to_string()),
            })
        }
        None => Json(Envelope {
            status: RunStatus::Info,
            message: Some("No continuous simulation running".to_string()),
        }),
    }
}

async fn handle_poll(State(state): State<Arc<AppState>>) -> Json<SimulationSnapshot> {
    let mut engine = state.engine.lock().await;
    let Engine { rng, active, .. } = &mut *engine;
    let Some(active) = active.as_mut() else {
        return Json(SimulationSnapshot::with_status(
            RunStatus::Info,
            "No continuous simulation running",
        ));
    };
    active.polls += 1;
    let elapsed = active.started.elapsed().as_secs_f64();
    Json(active.run.tick(rng, elapsed, unix_now()))
}

async fn handle_run_once(
    State(state): State<Arc<AppState>>,
    Json(config): Json<RunConfig>,
) -> Result<Json<SimulationResult>, (StatusCode, Json<Envelope>)> {
    let mut engine = state.engine.lock().await;
    engine.single_shots += 1;
    match engine::run_once(&mut engine.rng, &config) {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            log::warn!("rejected single-shot run: {e}");
            Err((
                StatusCode::BAD_REQUEST,
                Json(Envelope {
                    status: RunStatus::Error,
                    message: Some(e.to_string()),
                }),
            ))
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let engine = state.engine.lock().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        running: engine.active.is_some(),
        simulation_id: engine.active.as_ref().map(|a| a.id.clone()),
        polls: engine.active.as_ref().map_or(0, |a| a.polls),
        runs_started: engine.runs_started,
        single_shots: engine.single_shots,
    })
}

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "qkdlab engine",
        "version": qkdlab_core::VERSION,
        "endpoints": {
            "/": "This API index",
            START_PATH: {
                "method": "POST",
                "description": "Start a continuous run, replacing any active one",
                "body": "distance, channel_noise, eve_attack, error_correction, privacy_amplification, photon_rate",
            },
            STOP_PATH: {
                "method": "POST",
                "description": "Stop the active continuous run",
            },
            POLL_PATH: {
                "method": "GET",
                "description": "Latest metrics, history windows and qubit batch of the active run",
            },
            RUN_ONCE_PATH: {
                "method": "POST",
                "description": "Run one BB84 exchange",
                "body": "num_qubits or alice_bits + alice_bases, plus channel parameters",
            },
            "/health": "Health check",
        },
    }))
}

/// Build the axum router. `seed` fixes the engine's randomness.
pub fn build_router(seed: Option<u64>) -> Router {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let state = Arc::new(AppState {
        engine: Mutex::new(Engine {
            rng,
            active: None,
            runs_started: 0,
            single_shots: 0,
        }),
    });

    Router::new()
        .route("/", get(handle_index))
        .route(START_PATH, post(handle_start))
        .route(STOP_PATH, post(handle_stop))
        .route(POLL_PATH, get(handle_poll))
        .route(RUN_ONCE_PATH, post(handle_run_once))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve on an already-bound listener until the future is dropped.
pub async fn serve(listener: TcpListener, seed: Option<u64>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("qkdlab engine listening on http://{addr}");
    }
    axum::serve(listener, build_router(seed)).await
}

/// Run the HTTP simulation engine.
pub async fn run_server(host: &str, port: u16, seed: Option<u64>) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, seed).await
}
