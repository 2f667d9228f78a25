//! Visualization adapter: one canonical per-qubit sequence from either wire shape.
//!
//! The engine encodes per-qubit detail two ways. Discrete runs send an
//! explicit record array (`transmission_data`); continuous ticks send
//! parallel fixed-alphabet strings (`alice_bits`, `alice_bases`, `bob_bits`,
//! `bob_bases`, optional `eve_bases`). [`normalize`] resolves the payload
//! into a [`WireShape`] once and returns typed [`PerQubitRecord`]s, so
//! renderers never branch on the encoding.
//!
//! When both encodings are present the record array wins.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{QubitPayload, RawQubitRecord};
use crate::qubit::{Basis, Bit, NO_INTERCEPT, NOT_DETECTED, PerQubitRecord};

// ---------------------------------------------------------------------------
// Validation reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("{field} has invalid value {value} at index {index}")]
    InvalidValue {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("parallel strings incomplete, missing: {}", .0.join(", "))]
    IncompleteStrings(Vec<&'static str>),

    #[error("payload carries neither a record array nor parallel bit/basis strings")]
    NoRecognizedShape,
}

/// Every issue found while normalizing one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationError>,
}

impl ValidationReport {
    fn single(issue: ValidationError) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issues.as_slice() {
            [] => f.write_str("no validation issues"),
            [only] => write!(f, "{only}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

impl std::error::Error for ValidationReport {}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// The resolved wire encoding of one payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireShape<'a> {
    Records(&'a [RawQubitRecord]),
    Strings(ParallelStrings<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParallelStrings<'a> {
    pub alice_bits: &'a str,
    pub alice_bases: &'a str,
    pub bob_bits: &'a str,
    pub bob_bases: &'a str,
    pub eve_bases: Option<&'a str>,
}

/// Which encoding was accepted; reported alongside the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    RecordArray,
    ParallelStrings,
}

/// Resolve the payload's encoding. Record array first, then parallel strings.
pub fn resolve_shape(payload: &QubitPayload) -> Result<WireShape<'_>, ValidationReport> {
    if let Some(records) = &payload.transmission_data {
        return Ok(WireShape::Records(records));
    }

    let mandatory = [
        ("alice_bits", payload.alice_bits.as_deref()),
        ("alice_bases", payload.alice_bases.as_deref()),
        ("bob_bits", payload.bob_bits.as_deref()),
        ("bob_bases", payload.bob_bases.as_deref()),
    ];
    let missing: Vec<&'static str> = mandatory
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| *name)
        .collect();

    match missing.len() {
        0 => Ok(WireShape::Strings(ParallelStrings {
            alice_bits: payload.alice_bits.as_deref().unwrap_or_default(),
            alice_bases: payload.alice_bases.as_deref().unwrap_or_default(),
            bob_bits: payload.bob_bits.as_deref().unwrap_or_default(),
            bob_bases: payload.bob_bases.as_deref().unwrap_or_default(),
            eve_bases: payload.eve_bases.as_deref(),
        })),
        4 => Err(ValidationReport::single(ValidationError::NoRecognizedShape)),
        _ => Err(ValidationReport::single(ValidationError::IncompleteStrings(
            missing,
        ))),
    }
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Canonical records plus the encoding they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedQubits {
    pub shape: ShapeKind,
    pub records: Vec<PerQubitRecord>,
}

/// Normalize one payload into canonical per-qubit records.
pub fn normalize(payload: &QubitPayload) -> Result<NormalizedQubits, ValidationReport> {
    match resolve_shape(payload)? {
        WireShape::Records(raw) => Ok(NormalizedQubits {
            shape: ShapeKind::RecordArray,
            records: from_records(raw)?,
        }),
        WireShape::Strings(strings) => Ok(NormalizedQubits {
            shape: ShapeKind::ParallelStrings,
            records: from_strings(&strings)?,
        }),
    }
}

fn from_records(raw: &[RawQubitRecord]) -> Result<Vec<PerQubitRecord>, ValidationReport> {
    let mut issues = Vec::new();
    let mut records = Vec::with_capacity(raw.len());

    for (index, r) in raw.iter().enumerate() {
        let alice_bit = required(index, "alice_bit", &r.alice_bit, &mut issues)
            .and_then(|v| parse_bit_value(index, "alice_bit", v, &mut issues));
        let alice_base = required(index, "alice_base", &r.alice_base, &mut issues)
            .and_then(|v| parse_basis_value(index, "alice_base", v, &mut issues));
        let bob_bit = required(index, "bob_bit", &r.bob_bit, &mut issues)
            .and_then(|v| parse_detection_value(index, v, &mut issues));
        let bob_base = required(index, "bob_base", &r.bob_base, &mut issues)
            .and_then(|v| parse_basis_value(index, "bob_base", v, &mut issues));
        let eve_base = parse_eve_value(index, r.eve_base.as_ref(), &mut issues);

        if let (Some(alice_bit), Some(alice_base), Some(bob_bit), Some(bob_base), Some(eve_base)) =
            (alice_bit, alice_base, bob_bit, bob_base, eve_base)
        {
            records.push(PerQubitRecord {
                alice_bit,
                alice_base,
                bob_bit,
                bob_base,
                eve_base,
            });
        }
    }

    if issues.is_empty() {
        Ok(records)
    } else {
        Err(ValidationReport { issues })
    }
}

fn from_strings(s: &ParallelStrings<'_>) -> Result<Vec<PerQubitRecord>, ValidationReport> {
    let alice_bits: Vec<char> = s.alice_bits.chars().collect();
    let alice_bases: Vec<char> = s.alice_bases.chars().collect();
    let bob_bits: Vec<char> = s.bob_bits.chars().collect();
    let bob_bases: Vec<char> = s.bob_bases.chars().collect();
    let eve_bases: Vec<char> = s.eve_bases.map(|e| e.chars().collect()).unwrap_or_default();

    let len = alice_bits
        .len()
        .max(alice_bases.len())
        .max(bob_bits.len())
        .max(bob_bases.len());

    let mut issues = Vec::new();
    let mut records = Vec::with_capacity(len);

    for index in 0..len {
        let alice_bit = bit_at(&alice_bits, index, "alice_bits", &mut issues);
        let alice_base = basis_at(&alice_bases, index, "alice_bases", &mut issues);
        let bob_bit = match bob_bits.get(index) {
            Some(&NOT_DETECTED) => Some(None),
            Some(&c) => match Bit::from_symbol(c) {
                Some(bit) => Some(Some(bit)),
                None => {
                    issues.push(invalid(index, "bob_bits", c));
                    None
                }
            },
            None => Some(Some(Bit::Zero)),
        };
        let bob_base = basis_at(&bob_bases, index, "bob_bases", &mut issues);
        let eve_base = match eve_bases.get(index) {
            None => Some(None),
            Some(&c) => match Basis::from_symbol(c) {
                Some(b) => Some(Some(b)),
                None if c == '-' || c == ' ' => Some(None),
                None => {
                    issues.push(invalid(index, "eve_bases", c));
                    None
                }
            },
        };

        if let (Some(alice_bit), Some(alice_base), Some(bob_bit), Some(bob_base), Some(eve_base)) =
            (alice_bit, alice_base, bob_bit, bob_base, eve_base)
        {
            records.push(PerQubitRecord {
                alice_bit,
                alice_base,
                bob_bit,
                bob_base,
                eve_base,
            });
        }
    }

    if issues.is_empty() {
        Ok(records)
    } else {
        Err(ValidationReport { issues })
    }
}

/// True iff `eve_base` is present, non-empty, and not the no-intercept sentinel.
pub fn derive_eve_intercepted(eve_base: Option<&str>) -> bool {
    match eve_base.map(str::trim) {
        Some(s) => !s.is_empty() && s != NO_INTERCEPT,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Degraded fallback
// ---------------------------------------------------------------------------

/// What a renderer should draw for one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QubitView {
    Records(NormalizedQubits),
    /// Literal dump of the raw fields; used when validation fails.
    Degraded(Vec<(String, String)>),
}

/// Normalize, or fall back to a literal dump. The report is returned so the
/// caller can raise one warning for the whole payload.
pub fn view_for(payload: &QubitPayload) -> (QubitView, Option<ValidationReport>) {
    match normalize(payload) {
        Ok(normalized) => (QubitView::Records(normalized), None),
        Err(report) => (QubitView::Degraded(payload.literal_fields()), Some(report)),
    }
}

// ---------------------------------------------------------------------------
// Value parsing helpers
// ---------------------------------------------------------------------------

fn invalid(index: usize, field: &'static str, c: char) -> ValidationError {
    ValidationError::InvalidValue {
        index,
        field,
        value: format!("{c:?}"),
    }
}

fn bit_at(
    chars: &[char],
    index: usize,
    field: &'static str,
    issues: &mut Vec<ValidationError>,
) -> Option<Bit> {
    match chars.get(index) {
        None => Some(Bit::Zero),
        Some(&c) => {
            let bit = Bit::from_symbol(c);
            if bit.is_none() {
                issues.push(invalid(index, field, c));
            }
            bit
        }
    }
}

fn basis_at(
    chars: &[char],
    index: usize,
    field: &'static str,
    issues: &mut Vec<ValidationError>,
) -> Option<Basis> {
    match chars.get(index) {
        None => Some(Basis::FIRST),
        Some(&c) => {
            let basis = Basis::from_symbol(c);
            if basis.is_none() {
                issues.push(invalid(index, field, c));
            }
            basis
        }
    }
}

fn required<'v>(
    index: usize,
    field: &'static str,
    value: &'v Option<Value>,
    issues: &mut Vec<ValidationError>,
) -> Option<&'v Value> {
    match value {
        Some(Value::Null) | None => {
            issues.push(ValidationError::MissingField { index, field });
            None
        }
        Some(v) => Some(v),
    }
}

fn value_symbol(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn invalid_value(index: usize, field: &'static str, v: &Value) -> ValidationError {
    ValidationError::InvalidValue {
        index,
        field,
        value: v.to_string(),
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn parse_bit_value(
    index: usize,
    field: &'static str,
    v: &Value,
    issues: &mut Vec<ValidationError>,
) -> Option<Bit> {
    let bit = value_symbol(v)
        .as_deref()
        .and_then(single_char)
        .and_then(Bit::from_symbol);
    if bit.is_none() {
        issues.push(invalid_value(index, field, v));
    }
    bit
}

fn parse_detection_value(
    index: usize,
    v: &Value,
    issues: &mut Vec<ValidationError>,
) -> Option<Option<Bit>> {
    let symbol = value_symbol(v).as_deref().and_then(single_char);
    match symbol {
        Some(NOT_DETECTED) => Some(None),
        Some(c) => match Bit::from_symbol(c) {
            Some(bit) => Some(Some(bit)),
            None => {
                issues.push(invalid_value(index, "bob_bit", v));
                None
            }
        },
        None => {
            issues.push(invalid_value(index, "bob_bit", v));
            None
        }
    }
}

fn parse_basis_value(
    index: usize,
    field: &'static str,
    v: &Value,
    issues: &mut Vec<ValidationError>,
) -> Option<Basis> {
    let basis = value_symbol(v).and_then(|s| match s.as_str() {
        "rectilinear" => Some(Basis::Rectilinear),
        "diagonal" => Some(Basis::Diagonal),
        other => single_char(other).and_then(Basis::from_symbol),
    });
    if basis.is_none() {
        issues.push(invalid_value(index, field, v));
    }
    basis
}

fn parse_eve_value(
    index: usize,
    v: Option<&Value>,
    issues: &mut Vec<ValidationError>,
) -> Option<Option<Basis>> {
    let text = match v {
        None | Some(Value::Null) => return Some(None),
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            issues.push(invalid_value(index, "eve_base", other));
            return None;
        }
    };
    if !derive_eve_intercepted(Some(text)) {
        return Some(None);
    }
    match single_char(text.trim()).and_then(Basis::from_symbol) {
        Some(b) => Some(Some(b)),
        None => {
            issues.push(ValidationError::InvalidValue {
                index,
                field: "eve_base",
                value: format!("{text:?}"),
            });
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
