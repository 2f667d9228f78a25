//! Wire types for the simulation-engine HTTP contract.
//!
//! These mirror the JSON the engine speaks: run configuration, start/stop
//! acknowledgements, live snapshots of a continuous run, and single-shot
//! results. Per-qubit detail travels as a raw [`QubitPayload`] and is only
//! turned into typed records by [`adapter::normalize`](crate::adapter::normalize).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Stopped,
    Error,
    Info,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal shape every engine response shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EveAttack {
    #[default]
    None,
    InterceptResend,
}

impl EveAttack {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InterceptResend => "intercept_resend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCorrection {
    #[default]
    None,
    #[serde(alias = "winnow", alias = "ldpc")]
    Cascade,
}

impl ErrorCorrection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Cascade => "cascade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyAmplification {
    #[default]
    None,
    Standard,
    Universal,
    Toeplitz,
}

impl PrivacyAmplification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Standard => "standard",
            Self::Universal => "universal",
            Self::Toeplitz => "toeplitz",
        }
    }
}

/// Parameters for a continuous run or a single-shot run.
///
/// Single-shot runs use `alice_bits`/`alice_bases` when both are present
/// (manual input) and otherwise generate `num_qubits` random qubits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub distance: f64,
    #[serde(alias = "noise")]
    pub channel_noise: f64,
    pub eve_attack: EveAttack,
    pub error_correction: ErrorCorrection,
    pub privacy_amplification: PrivacyAmplification,
    pub photon_rate: f64,
    pub num_qubits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alice_bits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alice_bases: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            distance: 10.0,
            channel_noise: 0.1,
            eve_attack: EveAttack::None,
            error_correction: ErrorCorrection::None,
            privacy_amplification: PrivacyAmplification::None,
            photon_rate: 1000.0,
            num_qubits: 8,
            alice_bits: None,
            alice_bases: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Acknowledgements
// ---------------------------------------------------------------------------

/// Response to a start request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAck {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photon_rate: Option<f64>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Security verdict reported by a continuous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecurityLevel {
    High,
    Compromised,
    Other(String),
}

impl From<String> for SecurityLevel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "High" => Self::High,
            "Compromised" => Self::Compromised,
            _ => Self::Other(s),
        }
    }
}

impl From<SecurityLevel> for String {
    fn from(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::High => "High".to_string(),
            SecurityLevel::Compromised => "Compromised".to_string(),
            SecurityLevel::Other(s) => s,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("High"),
            Self::Compromised => f.write_str("Compromised"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Named scalar measurements of a live run. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qber: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generation_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photons_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photons_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum_fidelity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<SecurityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum_advantage: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One polled update from a continuous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    /// Oldest first.
    #[serde(default)]
    pub qber_history: Vec<f64>,
    /// Oldest first.
    #[serde(default)]
    pub key_rate_history: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Per-tick qubit batch, when the engine sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qubits: Option<QubitPayload>,
}

impl SimulationSnapshot {
    /// A non-success snapshot with a message, as the engine sends when idle.
    pub fn with_status(status: RunStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            metrics: None,
            qber_history: Vec::new(),
            key_rate_history: Vec::new(),
            elapsed_time: None,
            timestamp: None,
            qubits: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-qubit payload (pre-normalization)
// ---------------------------------------------------------------------------

/// One entry of a per-qubit record array as it arrives on the wire.
///
/// Fields are loose JSON values: engines send single-character strings,
/// but numbers for bits are tolerated by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawQubitRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_bit: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_base: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_bit: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_base: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eve_base: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eve_intercepted: Option<bool>,
}

/// Per-qubit detail in either of the engine's two encodings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QubitPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_data: Option<Vec<RawQubitRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_bits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_bases: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_bits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_bases: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eve_bases: Option<String>,
}

impl QubitPayload {
    /// Literal `(field, value)` dump of whatever raw fields are present.
    pub fn literal_fields(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(records) = &self.transmission_data {
            out.push((
                "transmission_data".to_string(),
                serde_json::to_string(records).unwrap_or_else(|_| format!("{records:?}")),
            ));
        }
        let strings = [
            ("alice_bits", &self.alice_bits),
            ("alice_bases", &self.alice_bases),
            ("bob_bits", &self.bob_bits),
            ("bob_bases", &self.bob_bases),
            ("eve_bases", &self.eve_bases),
        ];
        for (name, value) in strings {
            if let Some(v) = value {
                out.push((name.to_string(), v.clone()));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Single-shot result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

/// Result of one single-shot run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub qubits: QubitPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alice_sifted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bob_sifted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qber: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generation_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum_fidelity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors_corrected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity_bits_disclosed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eve_detection_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_error_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classical_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}
