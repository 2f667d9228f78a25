//! Continuous photon-rate run.
//!
//! Metrics are a function of elapsed time and the run configuration; every
//! poll computes a fresh point, appends it to a bounded history, and returns
//! the trailing part of that history with a small per-tick qubit batch.

use std::collections::VecDeque;

use rand::Rng;

use crate::protocol::{Metrics, RunConfig, RunStatus, SecurityLevel, SimulationSnapshot};

use super::{random_bases, random_bits, transmit_qubits};

/// Points kept on the engine side.
pub const HISTORY_CAPACITY: usize = 100;
/// Points returned with each snapshot.
pub const HISTORY_REPORTED: usize = 20;
pub const QUBIT_BATCH_MAX: usize = 100;
/// QBER at or above which a continuous run reports itself compromised.
pub const COMPROMISED_QBER: f64 = 0.11;

#[derive(Debug, Clone)]
pub struct ContinuousRun {
    config: RunConfig,
    qber_history: VecDeque<f64>,
    key_rate_history: VecDeque<f64>,
}

impl ContinuousRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            qber_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            key_rate_history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn history_len(&self) -> usize {
        self.qber_history.len()
    }

    /// Compute one live snapshot at `elapsed` seconds into the run.
    pub fn tick<R: Rng>(&mut self, rng: &mut R, elapsed: f64, timestamp: f64) -> SimulationSnapshot {
        let RunConfig {
            distance,
            channel_noise: noise,
            photon_rate,
            ..
        } = self.config;
        let elapsed = elapsed.max(0.0);

        let photons_sent = (photon_rate * elapsed).max(0.0) as u64;
        let survival = (1.0 - distance * 0.01).max(0.0) * (1.0 - noise).max(0.0);
        let photons_received = (photons_sent as f64 * survival) as u64;

        let base_qber = noise * 0.5 + distance * 0.001;
        let fluctuation = rng.random_range(-0.01..=0.01) * (elapsed * 0.5).sin();
        let qber = (base_qber + fluctuation).max(0.0);

        let key_rate = if elapsed > 0.0 {
            (photons_received as f64 * 0.5 * (1.0 - qber * 2.0) / elapsed).max(0.0)
        } else {
            0.0
        };

        push_bounded(&mut self.qber_history, qber);
        push_bounded(&mut self.key_rate_history, key_rate);

        let security_level = if qber < COMPROMISED_QBER {
            SecurityLevel::High
        } else {
            SecurityLevel::Compromised
        };

        let metrics = Metrics {
            qber: Some(qber),
            key_generation_rate: Some(key_rate),
            photons_sent: Some(photons_sent),
            photons_received: Some(photons_received),
            channel_efficiency: Some((1.0 - distance * 0.02 - noise).max(0.1)),
            quantum_fidelity: Some((1.0 - qber * 2.0).max(0.85)),
            security_level: Some(security_level),
            quantum_advantage: Some((100.0 - qber * 1000.0).max(20.0)),
            extra: Default::default(),
        };

        let batch = ((photon_rate * 0.1) as usize).clamp(1, QUBIT_BATCH_MAX);
        let bits = random_bits(rng, batch);
        let bases = random_bases(rng, batch);
        let qubits = transmit_qubits(rng, bits, bases, &self.config).to_strings();

        SimulationSnapshot {
            status: RunStatus::Success,
            message: None,
            metrics: Some(metrics),
            qber_history: tail(&self.qber_history),
            key_rate_history: tail(&self.key_rate_history),
            elapsed_time: Some(elapsed),
            timestamp: Some(timestamp),
            qubits: Some(qubits),
        }
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64) {
    history.push_back(value);
    while history.len() > HISTORY_CAPACITY {
        history.pop_front();
    }
}

fn tail(history: &VecDeque<f64>) -> Vec<f64> {
    let skip = history.len().saturating_sub(HISTORY_REPORTED);
    history.iter().skip(skip).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn metrics_follow_the_photon_rate_model() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut run = ContinuousRun::new(RunConfig::default());
        let snap = run.tick(&mut rng, 2.0, 1_700_000_000.0);
        let m = snap.metrics.unwrap();

        assert_eq!(m.photons_sent, Some(2000));
        // 2000 * (1 - 0.1) * (1 - 0.1)
        assert_eq!(m.photons_received, Some(1620));
        let qber = m.qber.unwrap();
        assert!((qber - 0.06).abs() <= 0.01 + 1e-12, "qber = {qber}");
        assert_eq!(m.security_level, Some(SecurityLevel::High));
        assert!((m.channel_efficiency.unwrap() - 0.7).abs() < 1e-12);
        assert!(m.quantum_fidelity.unwrap() >= 0.85);
        assert!(m.quantum_advantage.unwrap() >= 20.0);
        assert_eq!(snap.elapsed_time, Some(2.0));
    }

    #[test]
    fn history_is_bounded_and_reports_trailing_window() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut run = ContinuousRun::new(RunConfig::default());
        let mut last = None;
        for i in 1..=130 {
            last = Some(run.tick(&mut rng, i as f64, i as f64));
        }
        assert_eq!(run.history_len(), HISTORY_CAPACITY);
        let snap = last.unwrap();
        assert_eq!(snap.qber_history.len(), HISTORY_REPORTED);
        assert_eq!(snap.key_rate_history.len(), HISTORY_REPORTED);
    }

    #[test]
    fn noisy_long_link_is_compromised() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut run = ContinuousRun::new(RunConfig {
            distance: 50.0,
            channel_noise: 0.3,
            ..RunConfig::default()
        });
        let m = run.tick(&mut rng, 1.0, 0.0).metrics.unwrap();
        assert_eq!(m.security_level, Some(SecurityLevel::Compromised));
        let received = m.photons_received.unwrap();
        assert!((349..=350).contains(&received), "received = {received}");
        assert_eq!(m.channel_efficiency, Some(0.1));
    }

    #[test]
    fn tick_carries_a_normalizable_qubit_batch() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut run = ContinuousRun::new(RunConfig::default());
        let snap = run.tick(&mut rng, 0.5, 0.0);
        let payload = snap.qubits.unwrap();
        assert!(payload.transmission_data.is_none());
        let normalized = adapter::normalize(&payload).unwrap();
        assert_eq!(normalized.records.len(), QUBIT_BATCH_MAX);
        assert!(normalized.records.iter().all(|r| !r.eve_intercepted()));
    }

    #[test]
    fn zero_elapsed_has_zero_key_rate() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut run = ContinuousRun::new(RunConfig::default());
        let m = run.tick(&mut rng, 0.0, 0.0).metrics.unwrap();
        assert_eq!(m.key_generation_rate, Some(0.0));
        assert_eq!(m.photons_sent, Some(0));
    }
}
