//! Quantum channel: fiber loss, depolarizing noise, intercept-resend, measurement.

use rand::Rng;

use crate::qubit::{Basis, Bit};

/// Fiber attenuation in dB per kilometre (ITU-T G.652.D).
pub const FIBER_LOSS_DB_PER_KM: f64 = 0.184;
/// Share of channel noise that shows up as coupling/atmospheric loss.
pub const NOISE_LOSS_FACTOR: f64 = 0.5;
pub const MAX_LOSS_PROBABILITY: f64 = 0.85;
/// Theoretical detection probability of intercept-resend per sifted bit.
pub const INTERCEPT_RESEND_DETECTION: f64 = 0.25;

/// A prepared photon: the bit it carries and the basis it was encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Photon {
    pub bit: Bit,
    pub basis: Basis,
}

/// Probability that a photon never reaches Bob. `distance` is in metres.
pub fn loss_probability(distance: f64, noise: f64) -> f64 {
    let total_db = FIBER_LOSS_DB_PER_KM * distance / 1000.0 + NOISE_LOSS_FACTOR * noise;
    (1.0 - 10f64.powf(-total_db / 10.0)).clamp(0.0, MAX_LOSS_PROBABILITY)
}

/// Send photons through the fiber. Lost photons are `None`; survivors flip
/// with probability `noise`. Returns the received photons and the flip count.
pub fn transmit<R: Rng>(
    rng: &mut R,
    photons: &[Photon],
    distance: f64,
    noise: f64,
) -> (Vec<Option<Photon>>, usize) {
    let loss = loss_probability(distance, noise);
    let noise = noise.clamp(0.0, 1.0);
    let mut flips = 0;
    let received = photons
        .iter()
        .map(|p| {
            if rng.random_bool(loss) {
                None
            } else if rng.random_bool(noise) {
                flips += 1;
                Some(Photon {
                    bit: p.bit.flipped(),
                    basis: p.basis,
                })
            } else {
                Some(*p)
            }
        })
        .collect();
    (received, flips)
}

/// Measure a photon in `basis`. A mismatched basis yields a uniformly random bit.
pub fn measure<R: Rng>(rng: &mut R, photon: Photon, basis: Basis) -> Bit {
    if photon.basis == basis {
        photon.bit
    } else {
        Bit::from_bool(rng.random())
    }
}

/// Eve measures every photon in a random basis and resends what she saw.
pub fn intercept_resend<R: Rng>(rng: &mut R, photons: &[Photon]) -> (Vec<Photon>, Vec<Basis>) {
    let eve_bases = super::random_bases(rng, photons.len());
    let resent = photons
        .iter()
        .zip(&eve_bases)
        .map(|(p, &basis)| Photon {
            bit: measure(&mut *rng, *p, basis),
            basis,
        })
        .collect();
    (resent, eve_bases)
}

/// Keep the bits where bases match and Bob detected the photon.
pub fn sift(
    alice_bits: &[Bit],
    alice_bases: &[Basis],
    bob_bits: &[Option<Bit>],
    bob_bases: &[Basis],
) -> (Vec<Bit>, Vec<Bit>) {
    alice_bits
        .iter()
        .zip(alice_bases)
        .zip(bob_bits.iter().zip(bob_bases))
        .filter_map(|((&a, ab), (b, bb))| match b {
            Some(b) if ab == bb => Some((a, *b)),
            _ => None,
        })
        .unzip()
}

/// Fraction of disagreeing positions. An empty key counts as fully insecure.
pub fn qber(alice: &[Bit], bob: &[Bit]) -> f64 {
    if alice.is_empty() || bob.is_empty() {
        return 1.0;
    }
    let errors = alice.iter().zip(bob).filter(|(a, b)| a != b).count();
    errors as f64 / alice.len() as f64
}
