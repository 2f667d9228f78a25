//! Live session controller.
//!
//! The single authority for "is a continuous run active". It issues start
//! and stop requests through a [`SimulationTransport`], owns the one polling
//! timer, and routes every accepted snapshot to the [`ChartRegistry`] and the
//! visualization adapter.
//!
//! # Phases
//!
//! ```text
//! Idle --start--> Starting --ack ok--> Running --stop / terminal--> Stopping --> Idle
//!                    |
//!                    +--ack failed--> (forced stop) --> Idle
//! ```
//!
//! # Ownership of the timer
//!
//! The poll task lives in a [`PollHandle`] stored as an `Option` inside the
//! controller state, so at most one can exist. Dropping the handle aborts
//! the task. A new handle is only created after the previous one has been
//! taken out and dropped.
//!
//! Polls are timer driven: each tick fires a detached request, so a request
//! that never resolves costs one missing sample and does not delay the next
//! tick. Because responses can complete out of order, every result carries
//! the generation it was issued under. Start and stop both bump the
//! generation, and results from an older generation are discarded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::adapter::{self, QubitView};
use crate::charts::{ChartKind, ChartRegistry, ChartSnapshot, ChartSpec, SurfaceBoard};
use crate::config::ClientConfig;
use crate::error::CallError;
use crate::notify::{Level, Notifier};
use crate::protocol::{Metrics, RunConfig, RunStatus, SimulationResult, SimulationSnapshot, StartAck};
use crate::transport::SimulationTransport;

// ---------------------------------------------------------------------------
// Chart set
// ---------------------------------------------------------------------------

pub const QBER_CHART: &str = "qber";
pub const KEY_RATE_CHART: &str = "key_rate";
pub const QBER_SCATTER_CHART: &str = "qber_scatter";
pub const PHOTONS_CHART: &str = "photons";
pub const SECURITY_CHART: &str = "security";

/// QBER above which a run is considered insecure, as a fraction.
pub const SECURITY_QBER_LIMIT: f64 = 0.11;

/// Shortest poll period; a zero interval cannot drive a timer.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Every surface the continuous-run chart set draws to.
pub const CHART_SURFACES: [&str; 5] = [
    QBER_CHART,
    KEY_RATE_CHART,
    QBER_SCATTER_CHART,
    PHOTONS_CHART,
    SECURITY_CHART,
];

/// Logical chart name and its spec; each chart draws to the surface of the same name.
pub fn chart_set() -> Vec<(&'static str, ChartSpec)> {
    vec![
        (
            QBER_CHART,
            ChartSpec::new(ChartKind::Line, QBER_CHART, "QBER (%)").y_bounds(0.0, 25.0),
        ),
        (
            KEY_RATE_CHART,
            ChartSpec::new(ChartKind::Line, KEY_RATE_CHART, "Key rate (bits/s)"),
        ),
        (
            QBER_SCATTER_CHART,
            ChartSpec::new(ChartKind::Scatter, QBER_SCATTER_CHART, "QBER vs time")
                .y_bounds(0.0, 25.0),
        ),
        (
            PHOTONS_CHART,
            ChartSpec::new(ChartKind::Bar, PHOTONS_CHART, "Photons").labels(["sent", "received"]),
        ),
        (
            SECURITY_CHART,
            ChartSpec::new(ChartKind::Doughnut, SECURITY_CHART, "Security")
                .y_bounds(0.0, 100.0)
                .labels(["secure", "margin"]),
        ),
    ]
}

fn ensure_chart_set(charts: &mut ChartRegistry) {
    for (name, spec) in chart_set() {
        charts.ensure(name, &spec);
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(StartAck),
    /// A run is already starting, running or stopping; nothing was sent.
    AlreadyActive(SessionPhase),
    /// The engine did not acknowledge; the controller was forced back to idle.
    Failed(CallError),
    /// A stop arrived while the start request was in flight.
    Superseded,
}

/// Exclusive ownership of the polling task. Dropping it cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owned copy of everything a renderer needs.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub generation: u64,
    pub polling: bool,
    pub simulation_id: Option<String>,
    pub metrics: Option<Metrics>,
    pub elapsed_time: Option<f64>,
    pub charts: BTreeMap<String, ChartSnapshot>,
    pub qubits: Option<QubitView>,
    pub snapshots_applied: u64,
    pub consecutive_failures: u32,
}

impl SessionView {
    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn series(&self, chart: &str) -> Option<Vec<f64>> {
        self.charts.get(chart).map(ChartSnapshot::values)
    }
}

/// A single-shot run and its normalized per-qubit view.
#[derive(Debug, Clone)]
pub struct RunOnceReport {
    pub result: SimulationResult,
    pub view: QubitView,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct State {
    phase: SessionPhase,
    generation: u64,
    poll: Option<PollHandle>,
    charts: ChartRegistry,
    metrics: Option<Metrics>,
    elapsed_time: Option<f64>,
    qubits: Option<QubitView>,
    simulation_id: Option<String>,
    snapshots_applied: u64,
    consecutive_failures: u32,
}

struct Inner {
    transport: Arc<dyn SimulationTransport>,
    notifier: Arc<dyn Notifier>,
    config: ClientConfig,
    state: Mutex<State>,
    polls_issued: AtomicU64,
    live_timers: Arc<AtomicUsize>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state();
        state.generation == generation && state.phase == SessionPhase::Running
    }
}

/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase())
            .field("engine", &self.inner.config.engine_url)
            .finish()
    }
}

impl SessionController {
    /// Controller with every chart surface mounted.
    pub fn new(
        transport: Arc<dyn SimulationTransport>,
        notifier: Arc<dyn Notifier>,
        config: ClientConfig,
    ) -> Self {
        let mut board = SurfaceBoard::new();
        for surface in CHART_SURFACES {
            board.mount(surface);
        }
        Self::with_board(transport, notifier, config, board)
    }

    pub fn with_board(
        transport: Arc<dyn SimulationTransport>,
        notifier: Arc<dyn Notifier>,
        config: ClientConfig,
        board: SurfaceBoard,
    ) -> Self {
        let charts = ChartRegistry::new(board, config.poll_interval);
        let state = State {
            phase: SessionPhase::Idle,
            generation: 0,
            poll: None,
            charts,
            metrics: None,
            elapsed_time: None,
            qubits: None,
            simulation_id: None,
            snapshots_applied: 0,
            consecutive_failures: 0,
        };
        Self {
            inner: Arc::new(Inner {
                transport,
                notifier,
                config,
                state: Mutex::new(state),
                polls_issued: AtomicU64::new(0),
                live_timers: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == SessionPhase::Running
    }

    /// Poll requests issued since construction.
    pub fn polls_issued(&self) -> u64 {
        self.inner.polls_issued.load(Ordering::SeqCst)
    }

    /// Poll timers currently alive.
    pub fn live_timers(&self) -> usize {
        self.inner.live_timers.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> SessionView {
        let state = self.inner.state();
        SessionView {
            phase: state.phase,
            generation: state.generation,
            polling: state.poll.is_some(),
            simulation_id: state.simulation_id.clone(),
            metrics: state.metrics.clone(),
            elapsed_time: state.elapsed_time,
            charts: state.charts.snapshot(),
            qubits: state.qubits.clone(),
            snapshots_applied: state.snapshots_applied,
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Mount or unmount drawing surfaces as the view changes.
    pub fn with_surfaces<R>(&self, f: impl FnOnce(&mut SurfaceBoard) -> R) -> R {
        let mut state = self.inner.state();
        f(state.charts.board_mut())
    }

    fn notify(&self, level: Level, message: &str) {
        self.inner.notifier.notify(level, message);
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    pub async fn start(&self, config: RunConfig) -> StartOutcome {
        let generation = {
            let mut state = self.inner.state();
            if state.phase != SessionPhase::Idle {
                let phase = state.phase;
                drop(state);
                self.notify(
                    Level::Warning,
                    &format!("Simulation already {}; stop it first", phase.as_str()),
                );
                return StartOutcome::AlreadyActive(phase);
            }
            state.phase = SessionPhase::Starting;
            state.generation += 1;
            state.generation
        };

        log::info!(
            "starting continuous run: distance={} km noise={} rate={} eve={}",
            config.distance,
            config.channel_noise,
            config.photon_rate,
            config.eve_attack.as_str()
        );

        let ack = match self.inner.transport.start(&config).await {
            Ok(ack) => ack,
            Err(e) => {
                self.notify(Level::Error, &format!("Failed to start simulation: {e}"));
                self.stop_generation(Some(generation)).await;
                return StartOutcome::Failed(e);
            }
        };

        let accepted = {
            let mut state = self.inner.state();
            if state.generation != generation || state.phase != SessionPhase::Starting {
                false
            } else {
                // Release the previous timer before creating a new one.
                drop(state.poll.take());
                state.charts.destroy_all();
                ensure_chart_set(&mut state.charts);
                state.metrics = None;
                state.elapsed_time = None;
                state.qubits = None;
                state.snapshots_applied = 0;
                state.consecutive_failures = 0;
                state.simulation_id = ack.simulation_id.clone();
                state.phase = SessionPhase::Running;
                state.poll = Some(self.spawn_poll_loop(generation));
                true
            }
        };

        if !accepted {
            log::info!("start acknowledged after a stop; asking engine to stop again");
            if let Err(e) = self.inner.transport.stop().await {
                log::warn!("best-effort engine stop failed: {e}");
            }
            return StartOutcome::Superseded;
        }

        self.notify(
            Level::Success,
            ack.message
                .as_deref()
                .unwrap_or("Continuous simulation started"),
        );
        StartOutcome::Started(ack)
    }

    fn spawn_poll_loop(&self, generation: u64) -> PollHandle {
        let task = tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.live_timers),
            generation,
            self.inner.config.poll_interval.max(MIN_POLL_INTERVAL),
        ));
        PollHandle { generation, task }
    }

    // -----------------------------------------------------------------------
    // stop
    // -----------------------------------------------------------------------

    /// Stop from any phase. Always ends in `Idle`.
    pub async fn stop(&self) {
        self.stop_generation(None).await;
    }

    /// Stop, but only if the session is still on `only` when given.
    ///
    /// Guarded stops are forced by a failed start or a terminal poll result,
    /// which has already been reported, so a failed engine stop is only logged.
    async fn stop_generation(&self, only: Option<u64>) -> bool {
        let previous = {
            let mut state = self.inner.state();
            if only.is_some_and(|g| g != state.generation) {
                return false;
            }
            let previous = state.phase;
            state.generation += 1;
            drop(state.poll.take());
            state.charts.destroy_all();
            state.consecutive_failures = 0;
            if previous != SessionPhase::Idle {
                state.phase = SessionPhase::Stopping;
            }
            previous
        };

        if previous == SessionPhase::Idle {
            return true;
        }

        log::info!("stopping continuous run (was {})", previous.as_str());
        if let Err(e) = self.inner.transport.stop().await {
            if only.is_some() {
                log::warn!("best-effort engine stop failed: {e}");
            } else {
                self.notify(Level::Warning, &format!("Engine stop request failed: {e}"));
            }
        }

        let mut state = self.inner.state();
        if state.phase == SessionPhase::Stopping {
            state.phase = SessionPhase::Idle;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Poll results
    // -----------------------------------------------------------------------

    /// Apply one poll result issued under `generation`, or discard it.
    async fn deliver(&self, generation: u64, result: Result<SimulationSnapshot, CallError>) {
        let mut notes: Vec<(Level, String)> = Vec::new();
        let terminal = {
            let mut state = self.inner.state();
            if state.generation != generation || state.phase != SessionPhase::Running {
                log::debug!(
                    "discarding stale poll result (generation {generation}, current {})",
                    state.generation
                );
                return;
            }
            match result {
                Ok(snapshot) => {
                    let window = self.inner.config.chart_window;
                    apply_snapshot(&mut state, snapshot, window, &mut notes)
                }
                Err(CallError::Transport(e)) => {
                    state.consecutive_failures += 1;
                    if e.is_session_gone() {
                        Some((Level::Warning, format!("Engine has no active run: {e}")))
                    } else if state.consecutive_failures >= self.inner.config.max_poll_failures {
                        Some((
                            Level::Error,
                            format!(
                                "Giving up after {} failed polls: {e}",
                                state.consecutive_failures
                            ),
                        ))
                    } else {
                        notes.push((Level::Error, format!("Poll failed: {e}")));
                        None
                    }
                }
                Err(CallError::Application { status, message }) => Some((
                    Level::Error,
                    format!("Engine reported {status}: {message}"),
                )),
            }
        };

        for (level, message) in &notes {
            self.notify(*level, message);
        }
        if let Some((level, reason)) = terminal {
            self.notify(level, &format!("Continuous simulation ended: {reason}"));
            self.stop_generation(Some(generation)).await;
        }
    }

    // -----------------------------------------------------------------------
    // Single-shot
    // -----------------------------------------------------------------------

    /// Run one discrete simulation. Does not touch the continuous session.
    pub async fn run_once(&self, config: &RunConfig) -> Result<RunOnceReport, CallError> {
        let result = match self.inner.transport.run_once(config).await {
            Ok(result) => result,
            Err(e) => {
                self.notify(Level::Error, &format!("Simulation failed: {e}"));
                return Err(e);
            }
        };
        let (view, report) = adapter::view_for(&result.qubits);
        if let Some(report) = report {
            self.notify(
                Level::Warning,
                &format!("Per-qubit detail unavailable: {report}"),
            );
        }
        Ok(RunOnceReport { result, view })
    }
}

/// Route one snapshot into state. Returns a terminal reason when the run must end.
fn apply_snapshot(
    state: &mut State,
    snapshot: SimulationSnapshot,
    window: usize,
    notes: &mut Vec<(Level, String)>,
) -> Option<(Level, String)> {
    if snapshot.status != RunStatus::Success {
        let message = snapshot.message.unwrap_or_default();
        let level = match snapshot.status {
            RunStatus::Error => Level::Error,
            _ => Level::Warning,
        };
        return Some((level, format!("engine status {} {message}", snapshot.status)));
    }
    let Some(metrics) = snapshot.metrics else {
        return Some((Level::Error, "snapshot is missing metrics".to_string()));
    };

    state.consecutive_failures = 0;
    state.snapshots_applied += 1;
    let x = snapshot
        .elapsed_time
        .unwrap_or(state.snapshots_applied as f64);

    // Charts may have been torn down with their surfaces; recreate if so.
    let charts = &mut state.charts;
    ensure_chart_set(charts);

    let qber_pct: Vec<f64> = snapshot.qber_history.iter().map(|q| q * 100.0).collect();
    let updates = [
        charts.set_series(QBER_CHART, &qber_pct, window),
        charts.set_series(KEY_RATE_CHART, &snapshot.key_rate_history, window),
    ];
    let mut skipped: Vec<String> = updates
        .into_iter()
        .filter_map(Result::err)
        .map(|e| e.to_string())
        .collect();

    if let Some(q) = metrics.qber {
        if let Err(e) = charts.push_point(QBER_SCATTER_CHART, x, q * 100.0, window) {
            skipped.push(e.to_string());
        }
        let secure = ((1.0 - q / SECURITY_QBER_LIMIT).clamp(0.0, 1.0)) * 100.0;
        if let Err(e) = charts.set_series(SECURITY_CHART, &[secure, 100.0 - secure], 2) {
            skipped.push(e.to_string());
        }
    }
    if let (Some(sent), Some(received)) = (metrics.photons_sent, metrics.photons_received) {
        if let Err(e) = charts.set_series(PHOTONS_CHART, &[sent as f64, received as f64], 2) {
            skipped.push(e.to_string());
        }
    }
    for reason in skipped {
        log::debug!("chart update skipped: {reason}");
    }

    if let Some(payload) = &snapshot.qubits {
        let (view, report) = adapter::view_for(payload);
        if let Some(report) = report {
            notes.push((
                Level::Warning,
                format!("Per-qubit detail unavailable: {report}"),
            ));
        }
        state.qubits = Some(view);
    }

    state.metrics = Some(metrics);
    state.elapsed_time = snapshot.elapsed_time.or(state.elapsed_time);
    None
}

/// Counts a poll loop as live for as long as it exists.
struct TimerGuard(Arc<AtomicUsize>);

impl TimerGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn poll_loop(
    inner: Weak<Inner>,
    live_timers: Arc<AtomicUsize>,
    generation: u64,
    period: Duration,
) {
    let _guard = TimerGuard::new(live_timers);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_current(generation) {
            break;
        }
        inner.polls_issued.fetch_add(1, Ordering::SeqCst);
        let controller = SessionController { inner };
        tokio::spawn(async move {
            let result = controller.inner.transport.poll().await;
            controller.deliver(generation, result).await;
        });
    }
}
