//! Per-qubit lifecycle records.
//!
//! A [`PerQubitRecord`] describes one transmitted photon: what Alice
//! prepared, what Bob measured, and which basis Eve used if she
//! intercepted it. Records are produced by the engine, normalized once by
//! the [`adapter`](crate::adapter), and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire symbol meaning "Eve did not touch this photon".
pub const NO_INTERCEPT: &str = "N/A";

/// Wire symbol for a photon Bob never detected.
pub const NOT_DETECTED: char = '?';

// ---------------------------------------------------------------------------
// Bit / Basis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bit {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
}

impl Bit {
    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Zero),
            '1' => Some(Self::One),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Zero => '0',
            Self::One => '1',
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    pub fn from_bool(b: bool) -> Self {
        if b { Self::One } else { Self::Zero }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Polarization basis: rectilinear (`+`) or diagonal (`x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    #[serde(rename = "+")]
    Rectilinear,
    #[serde(rename = "x")]
    Diagonal,
}

impl Basis {
    /// First symbol of the basis alphabet; the default for padded positions.
    pub const FIRST: Basis = Basis::Rectilinear;

    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Rectilinear),
            'x' | 'X' | '×' => Some(Self::Diagonal),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Rectilinear => '+',
            Self::Diagonal => 'x',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rectilinear => "rectilinear",
            Self::Diagonal => "diagonal",
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Render a bit slice in the engine's wire alphabet.
pub fn bits_to_string(bits: &[Bit]) -> String {
    bits.iter().map(|b| b.symbol()).collect()
}

/// Render a basis slice in the engine's wire alphabet.
pub fn bases_to_string(bases: &[Basis]) -> String {
    bases.iter().map(|b| b.symbol()).collect()
}

// ---------------------------------------------------------------------------
// PerQubitRecord
// ---------------------------------------------------------------------------

/// How a record contributes to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QubitFate {
    /// Bases matched, photon detected, bits agree.
    Sifted,
    /// Bases matched and bits disagree without interception: channel noise.
    ChannelError,
    /// Bases matched, bits disagree, and Eve touched the photon.
    Intercepted,
    /// Bases differ; dropped during reconciliation.
    Discarded,
    /// Bob never detected the photon.
    Lost,
}

/// One transmitted quantum bit's full record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerQubitRecord {
    pub alice_bit: Bit,
    pub alice_base: Basis,
    /// `None` when the photon was lost in the channel.
    pub bob_bit: Option<Bit>,
    pub bob_base: Basis,
    /// `None` when Eve did not intercept this photon.
    pub eve_base: Option<Basis>,
}

impl PerQubitRecord {
    pub fn eve_intercepted(&self) -> bool {
        self.eve_base.is_some()
    }

    pub fn bases_match(&self) -> bool {
        self.alice_base == self.bob_base
    }

    /// Eligible for the sifted key: matching bases and a detected photon.
    pub fn is_sifted(&self) -> bool {
        self.bases_match() && self.bob_bit.is_some()
    }

    pub fn fate(&self) -> QubitFate {
        let Some(bob_bit) = self.bob_bit else {
            return QubitFate::Lost;
        };
        if !self.bases_match() {
            return QubitFate::Discarded;
        }
        if bob_bit == self.alice_bit {
            QubitFate::Sifted
        } else if self.eve_intercepted() {
            QubitFate::Intercepted
        } else {
            QubitFate::ChannelError
        }
    }
}

/// Sifted-key QBER over a record sequence; `None` when nothing survives sifting.
pub fn sifted_error_rate(records: &[PerQubitRecord]) -> Option<f64> {
    let sifted: Vec<&PerQubitRecord> = records.iter().filter(|r| r.is_sifted()).collect();
    if sifted.is_empty() {
        return None;
    }
    let errors = sifted
        .iter()
        .filter(|r| r.bob_bit != Some(r.alice_bit))
        .count();
    Some(errors as f64 / sifted.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(a: char, ab: char, b: Option<char>, bb: char, eve: Option<char>) -> PerQubitRecord {
        PerQubitRecord {
            alice_bit: Bit::from_symbol(a).unwrap(),
            alice_base: Basis::from_symbol(ab).unwrap(),
            bob_bit: b.map(|c| Bit::from_symbol(c).unwrap()),
            bob_base: Basis::from_symbol(bb).unwrap(),
            eve_base: eve.map(|c| Basis::from_symbol(c).unwrap()),
        }
    }

    #[test]
    fn symbols_round_trip_through_alphabet() {
        assert_eq!(Bit::from_symbol('0'), Some(Bit::Zero));
        assert_eq!(Bit::from_symbol('2'), None);
        assert_eq!(Basis::from_symbol('X'), Some(Basis::Diagonal));
        assert_eq!(Basis::from_symbol('?'), None);
        assert_eq!(bits_to_string(&[Bit::One, Bit::Zero]), "10");
        assert_eq!(
            bases_to_string(&[Basis::Diagonal, Basis::Rectilinear]),
            "x+"
        );
    }

    #[test]
    fn fate_classification() {
        assert_eq!(record('1', '+', Some('1'), '+', None).fate(), QubitFate::Sifted);
        assert_eq!(
            record('1', '+', Some('0'), '+', None).fate(),
            QubitFate::ChannelError
        );
        assert_eq!(
            record('1', '+', Some('0'), '+', Some('x')).fate(),
            QubitFate::Intercepted
        );
        assert_eq!(
            record('1', '+', Some('1'), 'x', None).fate(),
            QubitFate::Discarded
        );
        assert_eq!(record('1', '+', None, '+', None).fate(), QubitFate::Lost);
    }

    #[test]
    fn lost_photon_is_not_sifted() {
        let r = record('0', 'x', None, 'x', None);
        assert!(r.bases_match());
        assert!(!r.is_sifted());
    }

    #[test]
    fn sifted_error_rate_counts_only_matching_bases() {
        let records = vec![
            record('0', '+', Some('0'), '+', None),
            record('1', '+', Some('0'), '+', None),
            record('1', 'x', Some('0'), '+', None),
            record('1', 'x', None, 'x', None),
        ];
        assert_eq!(sifted_error_rate(&records), Some(0.5));
        assert_eq!(sifted_error_rate(&records[2..]), None);
    }
}
