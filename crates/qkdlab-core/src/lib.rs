//! # qkdlab-core
//!
//! **Live BB84 key distribution, from photons to charts.**
//!
//! `qkdlab-core` holds everything a client needs to drive a BB84 simulation
//! engine and keep a multi-chart view consistent with its live stream, plus a
//! reference engine that speaks the same contract.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use qkdlab_core::{ClientConfig, HttpTransport, LogNotifier, RunConfig, SessionController};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(config.clone())?);
//! let controller = SessionController::new(transport, Arc::new(LogNotifier), config);
//!
//! controller.start(RunConfig::default()).await;
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! println!("{:?}", controller.view().series(qkdlab_core::controller::QBER_CHART));
//! controller.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! User action → [`SessionController`] → [`SimulationTransport`] → engine
//!
//! Each accepted snapshot fans out to the [`ChartRegistry`] and the
//! visualization [`adapter`]. Terminal or failed snapshots drive the
//! controller back to idle.
//!
//! - [`notify`]: fire-and-forget user notifications.
//! - [`charts`]: named charts, surface binding, windowed series.
//! - [`adapter`]: one canonical [`PerQubitRecord`] sequence from either wire shape.
//! - [`controller`]: the run state machine and the single polling timer.
//! - [`transport`]: the engine boundary with a three-way call outcome.
//! - [`engine`]: reference BB84 engine backing `qkdlab-server`.

pub mod adapter;
pub mod charts;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod qubit;
pub mod transport;

pub use adapter::{
    NormalizedQubits, QubitView, ShapeKind, ValidationError, ValidationReport,
    derive_eve_intercepted, normalize, view_for,
};
pub use charts::{
    ChartError, ChartKind, ChartRegistry, ChartSnapshot, ChartSpec, RedrawMode, SurfaceBoard,
};
pub use config::ClientConfig;
pub use controller::{
    PollHandle, RunOnceReport, SessionController, SessionPhase, SessionView, StartOutcome,
};
pub use error::{CallError, ConfigError, EngineError, TransportError};
pub use notify::{Level, LogNotifier, NotificationBoard, Notifier};
pub use protocol::{
    Envelope, ErrorCorrection, EveAttack, Metrics, PrivacyAmplification, QubitPayload, RunConfig,
    RunStatus, SecurityLevel, SimulationResult, SimulationSnapshot, StartAck,
};
pub use qubit::{Basis, Bit, PerQubitRecord, QubitFate};
pub use transport::{HttpTransport, SimulationTransport};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
