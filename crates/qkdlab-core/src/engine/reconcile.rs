//! Classical post-processing: Cascade error correction and privacy amplification.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::protocol::{ErrorCorrection, PrivacyAmplification};
use crate::qubit::Bit;

pub const CASCADE_PASSES: usize = 4;
pub const STANDARD_RATIO: f64 = 0.5;
pub const UNIVERSAL_RATIO: f64 = 0.6;
pub const TOEPLITZ_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Bob's key after correction.
    pub corrected: Vec<Bit>,
    pub errors_corrected: usize,
    pub parity_bits_disclosed: usize,
}

pub fn reconcile<R: Rng>(
    rng: &mut R,
    method: ErrorCorrection,
    alice: &[Bit],
    bob: &[Bit],
    qber: f64,
) -> Reconciliation {
    match method {
        ErrorCorrection::None => Reconciliation {
            corrected: bob.to_vec(),
            errors_corrected: 0,
            parity_bits_disclosed: 0,
        },
        ErrorCorrection::Cascade => cascade(rng, alice, bob, qber),
    }
}

fn parity(key: &[Bit], indices: &[usize]) -> u8 {
    indices.iter().fold(0, |acc, &i| acc ^ key[i].as_u8())
}

/// First-pass block size from the estimated error rate.
fn initial_block_size(len: usize, qber: f64) -> usize {
    if qber <= 0.0 {
        return len.max(1);
    }
    ((0.73 / qber).ceil() as usize).clamp(2, len.max(2))
}

/// Locate one error in a block with odd parity mismatch by bisection.
fn bisect(alice: &[Bit], bob: &[Bit], block: &[usize], disclosed: &mut usize) -> usize {
    let (mut lo, mut hi) = (0, block.len());
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        *disclosed += 1;
        if parity(alice, &block[lo..mid]) != parity(bob, &block[lo..mid]) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    block[lo]
}

/// Simplified Cascade: per pass, shuffle, split into blocks, compare block
/// parities and bisect mismatching blocks. Block size doubles every pass.
pub fn cascade<R: Rng>(rng: &mut R, alice: &[Bit], bob: &[Bit], qber: f64) -> Reconciliation {
    let len = alice.len().min(bob.len());
    let mut corrected = bob[..len].to_vec();
    let mut errors_corrected = 0;
    let mut disclosed = 0;
    if len == 0 {
        return Reconciliation {
            corrected,
            errors_corrected,
            parity_bits_disclosed: disclosed,
        };
    }

    let mut order: Vec<usize> = (0..len).collect();
    let mut block_size = initial_block_size(len, qber);

    for pass in 0..CASCADE_PASSES {
        if pass > 0 {
            order.shuffle(rng);
        }
        for block in order.chunks(block_size) {
            disclosed += 1;
            if parity(alice, block) != parity(&corrected, block) {
                let index = bisect(alice, &corrected, block, &mut disclosed);
                corrected[index] = corrected[index].flipped();
                errors_corrected += 1;
            }
        }
        block_size = (block_size * 2).min(len);
    }

    log::debug!(
        "cascade: {errors_corrected} errors corrected, {disclosed} parity bits disclosed over {len} bits"
    );
    Reconciliation {
        corrected,
        errors_corrected,
        parity_bits_disclosed: disclosed,
    }
}

fn target_len(len: usize, ratio: f64) -> usize {
    ((len as f64 * ratio).floor() as usize).max(1)
}

/// Compress a reconciled key to remove what Eve may have learned.
pub fn amplify<R: Rng>(rng: &mut R, method: PrivacyAmplification, key: &[Bit]) -> Vec<Bit> {
    if key.is_empty() {
        return Vec::new();
    }
    match method {
        PrivacyAmplification::None => key.to_vec(),
        PrivacyAmplification::Standard => key[..target_len(key.len(), STANDARD_RATIO)].to_vec(),
        PrivacyAmplification::Universal => {
            let hashed: Vec<Bit> = key
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => Bit::from_bool(a != b),
                    [a] => *a,
                    _ => Bit::Zero,
                })
                .collect();
            let keep = target_len(key.len(), UNIVERSAL_RATIO).min(hashed.len());
            hashed[..keep].to_vec()
        }
        PrivacyAmplification::Toeplitz => toeplitz(rng, key, target_len(key.len(), TOEPLITZ_RATIO)),
    }
}

/// Multiply `key` by a random `out_len x n` binary Toeplitz matrix over GF(2).
fn toeplitz<R: Rng>(rng: &mut R, key: &[Bit], out_len: usize) -> Vec<Bit> {
    let n = key.len();
    // T[i][j] = diagonal[i - j + n - 1]
    let diagonal: Vec<bool> = (0..n + out_len - 1).map(|_| rng.random()).collect();
    (0..out_len)
        .map(|i| {
            let bit = (0..n).fold(false, |acc, j| {
                acc ^ (diagonal[i + n - 1 - j] && key[j] == Bit::One)
            });
            Bit::from_bool(bit)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn key(s: &str) -> Vec<Bit> {
        s.chars().filter_map(Bit::from_symbol).collect()
    }

    #[test]
    fn cascade_fixes_sparse_errors() {
        let mut rng = StdRng::seed_from_u64(3);
        let alice: Vec<Bit> = (0..256).map(|i| Bit::from_bool(i * 7 % 5 < 2)).collect();
        let mut bob = alice.clone();
        for i in [5, 80, 170, 250] {
            bob[i] = bob[i].flipped();
        }
        let out = cascade(&mut rng, &alice, &bob, 4.0 / 256.0);
        assert_eq!(out.corrected, alice);
        assert_eq!(out.errors_corrected, 4);
        assert!(out.parity_bits_disclosed > 0);
    }

    #[test]
    fn cascade_on_identical_keys_changes_nothing() {
        let mut rng = StdRng::seed_from_u64(9);
        let alice = key("0110100111010010");
        let out = cascade(&mut rng, &alice, &alice, 0.0);
        assert_eq!(out.corrected, alice);
        assert_eq!(out.errors_corrected, 0);
    }

    #[test]
    fn no_correction_passes_key_through() {
        let mut rng = StdRng::seed_from_u64(0);
        let out = reconcile(&mut rng, ErrorCorrection::None, &key("01"), &key("11"), 0.5);
        assert_eq!(out.corrected, key("11"));
        assert_eq!(out.parity_bits_disclosed, 0);
    }

    #[test]
    fn amplification_lengths() {
        let mut rng = StdRng::seed_from_u64(5);
        let k = key("0110100111");
        assert_eq!(amplify(&mut rng, PrivacyAmplification::None, &k), k);
        assert_eq!(amplify(&mut rng, PrivacyAmplification::Standard, &k), key("01101"));
        assert_eq!(amplify(&mut rng, PrivacyAmplification::Universal, &k), key("11110"));
        assert_eq!(amplify(&mut rng, PrivacyAmplification::Toeplitz, &k).len(), 5);
        assert_eq!(amplify(&mut rng, PrivacyAmplification::Standard, &key("1")).len(), 1);
        assert!(amplify(&mut rng, PrivacyAmplification::Toeplitz, &[]).is_empty());
    }

    #[test]
    fn toeplitz_maps_zero_key_to_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        let zeros = vec![Bit::Zero; 16];
        let out = toeplitz(&mut rng, &zeros, 8);
        assert_eq!(out, vec![Bit::Zero; 8]);
        let ones = vec![Bit::One; 16];
        assert_eq!(toeplitz(&mut rng, &ones, 8).len(), 8);
    }
}
