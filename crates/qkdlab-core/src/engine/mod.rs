//! Reference BB84 simulation engine.
//!
//! Backs the engine HTTP service. Client code never calls into this module
//! directly; it goes through a [`SimulationTransport`](crate::transport::SimulationTransport).
//!
//! A single-shot run walks the whole protocol:
//!
//! 1. Alice prepares bits in random (or user supplied) bases.
//! 2. Eve optionally intercepts and resends in her own random bases.
//! 3. The fiber loses and flips photons ([`channel`]).
//! 4. Bob measures in random bases.
//! 5. Sifting, QBER estimation, error correction and privacy
//!    amplification ([`reconcile`]).
//!
//! Continuous runs are modelled separately by [`continuous::ContinuousRun`].

pub mod channel;
pub mod continuous;
pub mod reconcile;

use rand::Rng;

use crate::error::EngineError;
use crate::protocol::{
    EveAttack, LogEntry, QubitPayload, RawQubitRecord, RunConfig, RunStatus, SimulationResult,
};
use crate::qubit::{Basis, Bit, NO_INTERCEPT, NOT_DETECTED, bases_to_string, bits_to_string};

use channel::Photon;

/// QBER below which a sifted key is accepted as secure.
pub const QBER_THRESHOLD: f64 = 0.085;

/// Largest single-shot run the engine accepts, random or manual.
pub const MAX_QUBITS: usize = 100_000;

fn check_size(field: &'static str, len: usize) -> Result<(), EngineError> {
    if len > MAX_QUBITS {
        return Err(EngineError::TooLarge {
            field,
            max: MAX_QUBITS,
        });
    }
    Ok(())
}

pub fn random_bits<R: Rng>(rng: &mut R, n: usize) -> Vec<Bit> {
    (0..n).map(|_| Bit::from_bool(rng.random())).collect()
}

pub fn random_bases<R: Rng>(rng: &mut R, n: usize) -> Vec<Basis> {
    (0..n)
        .map(|_| {
            if rng.random() {
                Basis::Diagonal
            } else {
                Basis::Rectilinear
            }
        })
        .collect()
}

pub fn parse_bits(s: &str) -> Result<Vec<Bit>, EngineError> {
    s.trim()
        .chars()
        .enumerate()
        .map(|(index, symbol)| {
            Bit::from_symbol(symbol).ok_or(EngineError::InvalidSymbol {
                field: "alice_bits",
                symbol,
                index,
            })
        })
        .collect()
}

pub fn parse_bases(s: &str) -> Result<Vec<Basis>, EngineError> {
    s.trim()
        .chars()
        .enumerate()
        .map(|(index, symbol)| {
            Basis::from_symbol(symbol).ok_or(EngineError::InvalidSymbol {
                field: "alice_bases",
                symbol,
                index,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Quantum phase
// ---------------------------------------------------------------------------

/// Outcome of the quantum phase for one batch of qubits.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub alice_bits: Vec<Bit>,
    pub alice_bases: Vec<Basis>,
    /// `None` where the photon was lost.
    pub bob_bits: Vec<Option<Bit>>,
    pub bob_bases: Vec<Basis>,
    /// Present only under attack.
    pub eve_bases: Option<Vec<Basis>>,
    pub channel_error_rate: f64,
    pub eve_detection_probability: f64,
}

impl Transmission {
    /// Parallel-string encoding.
    pub fn to_strings(&self) -> QubitPayload {
        QubitPayload {
            transmission_data: None,
            alice_bits: Some(bits_to_string(&self.alice_bits)),
            alice_bases: Some(bases_to_string(&self.alice_bases)),
            bob_bits: Some(
                self.bob_bits
                    .iter()
                    .map(|b| b.map_or(NOT_DETECTED, Bit::symbol))
                    .collect(),
            ),
            bob_bases: Some(bases_to_string(&self.bob_bases)),
            eve_bases: Some(
                self.eve_bases
                    .as_deref()
                    .map(bases_to_string)
                    .unwrap_or_default(),
            ),
        }
    }

    /// Per-qubit record array encoding.
    pub fn to_records(&self) -> Vec<RawQubitRecord> {
        (0..self.alice_bits.len())
            .map(|i| {
                let eve = self
                    .eve_bases
                    .as_ref()
                    .and_then(|e| e.get(i))
                    .map(|b| b.symbol().to_string());
                let eve_intercepted = eve.is_some();
                let bob_bit = self.bob_bits[i].map_or(NOT_DETECTED, Bit::symbol);
                RawQubitRecord {
                    alice_bit: Some(self.alice_bits[i].symbol().to_string().into()),
                    alice_base: Some(self.alice_bases[i].symbol().to_string().into()),
                    bob_bit: Some(bob_bit.to_string().into()),
                    bob_base: Some(self.bob_bases[i].symbol().to_string().into()),
                    eve_base: Some(eve.unwrap_or_else(|| NO_INTERCEPT.to_string()).into()),
                    eve_intercepted: Some(eve_intercepted),
                }
            })
            .collect()
    }
}

/// Prepare, (optionally) intercept, transmit and measure one batch.
pub fn transmit_qubits<R: Rng>(
    rng: &mut R,
    alice_bits: Vec<Bit>,
    alice_bases: Vec<Basis>,
    config: &RunConfig,
) -> Transmission {
    let prepared: Vec<Photon> = alice_bits
        .iter()
        .zip(&alice_bases)
        .map(|(&bit, &basis)| Photon { bit, basis })
        .collect();

    let (photons, eve_bases, eve_detection_probability) = match config.eve_attack {
        EveAttack::None => (prepared, None, 0.0),
        EveAttack::InterceptResend => {
            let (resent, bases) = channel::intercept_resend(rng, &prepared);
            (resent, Some(bases), channel::INTERCEPT_RESEND_DETECTION)
        }
    };

    let (received, flips) =
        channel::transmit(rng, &photons, config.distance, config.channel_noise);
    let bob_bases = random_bases(rng, received.len());
    let bob_bits = received
        .iter()
        .zip(&bob_bases)
        .map(|(photon, &basis)| photon.map(|p| channel::measure(&mut *rng, p, basis)))
        .collect();

    let channel_error_rate = if photons.is_empty() {
        0.0
    } else {
        flips as f64 / photons.len() as f64
    };

    Transmission {
        alice_bits,
        alice_bases,
        bob_bits,
        bob_bases,
        eve_bases,
        channel_error_rate,
        eve_detection_probability,
    }
}

// ---------------------------------------------------------------------------
// Single-shot run
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StepLog(Vec<LogEntry>);

impl StepLog {
    fn push(&mut self, level: &str, message: String) {
        log::debug!("{message}");
        self.0.push(LogEntry {
            level: level.to_string(),
            message,
        });
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Run the full protocol once.
///
/// Uses `alice_bits`/`alice_bases` when both are given, otherwise
/// `num_qubits` random qubits.
pub fn run_once<R: Rng>(rng: &mut R, config: &RunConfig) -> Result<SimulationResult, EngineError> {
    let mut steps = StepLog::default();

    let (alice_bits, alice_bases) = match (&config.alice_bits, &config.alice_bases) {
        (Some(bits), Some(bases)) => {
            check_size("alice_bits", bits.trim().chars().count())?;
            check_size("alice_bases", bases.trim().chars().count())?;
            let bits = parse_bits(bits)?;
            let bases = parse_bases(bases)?;
            if bits.len() != bases.len() {
                return Err(EngineError::LengthMismatch {
                    bits: bits.len(),
                    bases: bases.len(),
                });
            }
            if bits.is_empty() {
                return Err(EngineError::Empty("alice_bits"));
            }
            steps.push("info", format!("Alice prepares {} manual qubits", bits.len()));
            (bits, bases)
        }
        _ => {
            if config.num_qubits == 0 {
                return Err(EngineError::Empty("num_qubits"));
            }
            check_size("num_qubits", config.num_qubits)?;
            steps.push(
                "info",
                format!("Alice prepares {} random qubits", config.num_qubits),
            );
            (
                random_bits(rng, config.num_qubits),
                random_bases(rng, config.num_qubits),
            )
        }
    };

    let n = alice_bits.len();
    let tx = transmit_qubits(rng, alice_bits, alice_bases, config);
    if tx.eve_bases.is_some() {
        steps.push(
            "warning",
            format!("Eve intercepts with {} attack", config.eve_attack.as_str()),
        );
    }
    let detected = tx.bob_bits.iter().filter(|b| b.is_some()).count();
    steps.push(
        "info",
        format!("Bob measures in random bases: {detected}/{n} photons detected"),
    );

    let (alice_sifted, bob_sifted) =
        channel::sift(&tx.alice_bits, &tx.alice_bases, &tx.bob_bits, &tx.bob_bases);
    steps.push(
        "info",
        format!("Key sifting: {} bits retained", alice_sifted.len()),
    );

    let qber = channel::qber(&alice_sifted, &bob_sifted);
    let is_secure = qber < QBER_THRESHOLD;
    if is_secure {
        steps.push(
            "success",
            format!("QBER {qber:.3} < threshold {QBER_THRESHOLD}: secure"),
        );
    } else {
        steps.push(
            "error",
            format!("QBER {qber:.3} >= threshold {QBER_THRESHOLD}: not secure"),
        );
    }

    let reconciled = reconcile::reconcile(
        rng,
        config.error_correction,
        &alice_sifted,
        &bob_sifted,
        qber,
    );
    steps.push(
        "info",
        format!(
            "Error correction ({}): {} errors corrected, {} parity bits disclosed",
            config.error_correction.as_str(),
            reconciled.errors_corrected,
            reconciled.parity_bits_disclosed
        ),
    );

    let final_key = reconcile::amplify(rng, config.privacy_amplification, &reconciled.corrected);
    steps.push(
        "info",
        format!(
            "Privacy amplification ({}): {} -> {} bits",
            config.privacy_amplification.as_str(),
            reconciled.corrected.len(),
            final_key.len()
        ),
    );

    let key_generation_rate = final_key.len() as f64 * config.photon_rate / 1000.0;
    let mut qubits = tx.to_strings();
    qubits.transmission_data = Some(tx.to_records());

    Ok(SimulationResult {
        status: RunStatus::Success,
        message: None,
        qubits,
        alice_sifted: Some(bits_to_string(&alice_sifted)),
        bob_sifted: Some(bits_to_string(&bob_sifted)),
        final_key: Some(bits_to_string(&final_key)),
        qber: Some(qber),
        is_secure: Some(is_secure),
        key_generation_rate: Some(key_generation_rate),
        channel_efficiency: Some(round_to(final_key.len() as f64 / n as f64, 3)),
        quantum_fidelity: Some(round_to((1.0 - 2.0 * qber).max(0.5), 3)),
        errors_corrected: Some(reconciled.errors_corrected as u64),
        parity_bits_disclosed: Some(reconciled.parity_bits_disclosed as u64),
        eve_detection_probability: Some(tx.eve_detection_probability),
        channel_error_rate: Some(tx.channel_error_rate),
        quantum_score: Some(round_to((100.0 - 10.0 * qber).clamp(0.0, 100.0), 1)),
        classical_score: Some(round_to((85.0 - 5.0 * qber).clamp(0.0, 100.0), 1)),
        security_score: Some(round_to(((1.0 - qber / 0.11) * 100.0).clamp(0.0, 100.0), 1)),
        error_rate: Some(round_to(qber * 100.0, 2)),
        logs: steps.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter;
    use crate::protocol::{ErrorCorrection, PrivacyAmplification};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ideal() -> RunConfig {
        RunConfig {
            distance: 0.0,
            channel_noise: 0.0,
            ..RunConfig::default()
        }
    }

    #[test]
    fn ideal_channel_has_zero_qber() {
        let mut rng = StdRng::seed_from_u64(21);
        let config = RunConfig {
            num_qubits: 256,
            ..ideal()
        };
        let result = run_once(&mut rng, &config).unwrap();
        assert_eq!(result.qber, Some(0.0));
        assert_eq!(result.is_secure, Some(true));
        assert_eq!(result.alice_sifted, result.bob_sifted);
        assert_eq!(result.qubits.bob_bits.as_deref().map(|s| s.contains('?')), Some(false));
    }

    #[test]
    fn eavesdropper_pushes_qber_over_threshold() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = RunConfig {
            num_qubits: 2000,
            eve_attack: EveAttack::InterceptResend,
            ..ideal()
        };
        let result = run_once(&mut rng, &config).unwrap();
        let qber = result.qber.unwrap();
        assert!((0.18..0.32).contains(&qber), "qber = {qber}");
        assert_eq!(result.is_secure, Some(false));
        assert_eq!(result.eve_detection_probability, Some(0.25));
    }

    #[test]
    fn both_encodings_normalize_to_the_same_records() {
        let mut rng = StdRng::seed_from_u64(8);
        let config = RunConfig {
            num_qubits: 64,
            eve_attack: EveAttack::InterceptResend,
            channel_noise: 0.2,
            ..RunConfig::default()
        };
        let result = run_once(&mut rng, &config).unwrap();

        let from_records = adapter::normalize(&result.qubits).unwrap();
        let strings_only = QubitPayload {
            transmission_data: None,
            ..result.qubits.clone()
        };
        let from_strings = adapter::normalize(&strings_only).unwrap();
        assert_eq!(from_records.records, from_strings.records);
        assert_eq!(from_records.records.len(), 64);
    }

    #[test]
    fn manual_input_is_validated() {
        let mut rng = StdRng::seed_from_u64(0);
        let mismatch = RunConfig {
            alice_bits: Some("0101".to_string()),
            alice_bases: Some("+x".to_string()),
            ..RunConfig::default()
        };
        assert_eq!(
            run_once(&mut rng, &mismatch).unwrap_err(),
            EngineError::LengthMismatch { bits: 4, bases: 2 }
        );

        let bad_symbol = RunConfig {
            alice_bits: Some("01a".to_string()),
            alice_bases: Some("+x+".to_string()),
            ..RunConfig::default()
        };
        assert!(matches!(
            run_once(&mut rng, &bad_symbol),
            Err(EngineError::InvalidSymbol { symbol: 'a', index: 2, .. })
        ));

        let empty = RunConfig {
            num_qubits: 0,
            ..RunConfig::default()
        };
        assert_eq!(
            run_once(&mut rng, &empty).unwrap_err(),
            EngineError::Empty("num_qubits")
        );
    }

    #[test]
    fn oversized_runs_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let too_large = EngineError::TooLarge {
            field: "num_qubits",
            max: MAX_QUBITS,
        };
        for num_qubits in [MAX_QUBITS + 1, usize::MAX] {
            let config = RunConfig {
                num_qubits,
                ..RunConfig::default()
            };
            assert_eq!(run_once(&mut rng, &config).unwrap_err(), too_large);
        }

        let manual = RunConfig {
            alice_bits: Some("0".repeat(MAX_QUBITS + 1)),
            alice_bases: Some("+".repeat(MAX_QUBITS + 1)),
            ..RunConfig::default()
        };
        assert!(matches!(
            run_once(&mut rng, &manual),
            Err(EngineError::TooLarge { field: "alice_bits", .. })
        ));

        let small = RunConfig {
            num_qubits: 64,
            ..RunConfig::default()
        };
        assert!(run_once(&mut rng, &small).is_ok());
    }

    #[test]
    fn manual_input_is_used_verbatim() {
        let mut rng = StdRng::seed_from_u64(2);
        let config = RunConfig {
            alice_bits: Some("01101".to_string()),
            alice_bases: Some("+x+xx".to_string()),
            ..ideal()
        };
        let result = run_once(&mut rng, &config).unwrap();
        assert_eq!(result.qubits.alice_bits.as_deref(), Some("01101"));
        assert_eq!(result.qubits.alice_bases.as_deref(), Some("+x+xx"));
        assert_eq!(result.qubits.transmission_data.as_ref().map(Vec::len), Some(5));
    }

    #[test]
    fn post_processing_shrinks_key_and_reports_metrics() {
        let mut rng = StdRng::seed_from_u64(13);
        let config = RunConfig {
            num_qubits: 512,
            channel_noise: 0.03,
            distance: 0.0,
            error_correction: ErrorCorrection::Cascade,
            privacy_amplification: PrivacyAmplification::Standard,
            ..RunConfig::default()
        };
        let result = run_once(&mut rng, &config).unwrap();
        let sifted = result.alice_sifted.as_ref().unwrap().len();
        let final_len = result.final_key.as_ref().unwrap().len();
        assert_eq!(final_len, (sifted / 2).max(1));
        assert_eq!(
            result.key_generation_rate,
            Some(final_len as f64 * config.photon_rate / 1000.0)
        );
        assert!(result.parity_bits_disclosed.unwrap() > 0);
        assert!(result.logs.len() >= 6);
    }
}
