//! Resource quantity parsing.
//!
//! Cluster objects express quantities as strings (`"200m"`, `"256Mi"`,
//! `"8Gi"`, `"1"`). Internally everything is canonical: CPU in cores,
//! memory in MiB, GPU as a plain count.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extended resource key used by GPU nodes and pods.
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error, PartialEq)]
pub enum UnitError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid cpu quantity: {0}")]
    InvalidCpu(String),
    #[error("invalid memory quantity: {0}")]
    InvalidMemory(String),
}

/// A quantity as it appears on the wire: either a bare number or a
/// suffixed string.
///
/// Bare numbers follow template conventions (cores / MiB). Bare digit
/// strings follow cluster conventions, where memory without a suffix is
/// a byte count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Quantity {
    pub fn cores(&self) -> Result<f64, UnitError> {
        match self {
            Quantity::Number(n) => Ok(*n),
            Quantity::Text(s) => parse_cpu(s),
        }
    }

    pub fn mebibytes(&self) -> Result<f64, UnitError> {
        match self {
            Quantity::Number(n) => Ok(*n),
            Quantity::Text(s) => parse_memory_mib(s),
        }
    }

    pub fn count(&self) -> Result<f64, UnitError> {
        match self {
            Quantity::Number(n) => Ok(*n),
            Quantity::Text(s) => parse_cpu(s),
        }
    }
}

impl From<f64> for Quantity {
    fn from(n: f64) -> Self {
        Quantity::Number(n)
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

/// Parse a CPU quantity into cores. `"200m"` is 0.2, `"2"` is 2.0.
pub fn parse_cpu(raw: &str) -> Result<f64, UnitError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(UnitError::Empty);
    }
    let invalid = || UnitError::InvalidCpu(raw.to_string());
    if let Some(milli) = s.strip_suffix('m') {
        let value: f64 = milli.parse().map_err(|_| invalid())?;
        return Ok(value / 1000.0);
    }
    s.parse().map_err(|_| invalid())
}

/// Parse a memory quantity into MiB.
///
/// Binary (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`) and decimal (`K`/`k`, `M`,
/// `G`, `T`, `P`, `E`) suffixes are supported; no suffix means bytes.
pub fn parse_memory_mib(raw: &str) -> Result<f64, UnitError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(UnitError::Empty);
    }
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| UnitError::InvalidMemory(raw.to_string()))?;

    let bytes_per_unit = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => MIB,
        "Gi" => MIB * 1024.0,
        "Ti" => MIB * 1024.0 * 1024.0,
        "Pi" => MIB * 1024.0 * 1024.0 * 1024.0,
        "Ei" => MIB * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => return Err(UnitError::InvalidMemory(raw.to_string())),
    };
    Ok(value * bytes_per_unit / MIB)
}

/// Format MiB the way cluster objects expect it.
pub fn format_mib(mib: f64) -> String {
    format!("{}Mi", trim_float(mib))
}

/// Format cores without trailing noise (`0.5`, `2`).
pub fn format_cores(cores: f64) -> String {
    trim_float(cores)
}

fn trim_float(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

/// Round to two decimals, used for diagnostic shortfall figures.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
