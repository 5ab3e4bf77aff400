use crate::errors::{EngineError, EngineResult};
use portable_atomic::{AtomicU64, Ordering};
use std::str::FromStr;

// ── Instrument tags ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

impl FromStr for OptionType {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "call" => Ok(Self::Call),
            "p" | "put" => Ok(Self::Put),
            other => Err(EngineError::InvalidDispatch(format!("unknown option type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseStyle {
    European,
    American,
}

impl std::fmt::Display for ExerciseStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::European => write!(f, "european"),
            Self::American => write!(f, "american"),
        }
    }
}

impl FromStr for ExerciseStyle {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e" | "european" => Ok(Self::European),
            "a" | "american" => Ok(Self::American),
            other => Err(EngineError::InvalidDispatch(format!("unknown exercise style: {other}"))),
        }
    }
}

// ── Single instrument (array-of-structs form) ──

/// One vanilla option with its market inputs.
///
/// Engines assume `sigma > 0` and `ttl_years > 0`; they divide by
/// `sigma * sqrt(T)` and return non-finite values otherwise. Records are
/// checked once, by [`OptionContract::validate`], when they enter the store.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[repr(C)]
pub struct OptionContract {
    pub spot: f64,
    pub strike: f64,
    pub rate: f64,
    pub sigma: f64,
    pub ttl_years: f64,
    pub div_yield: f64,
    pub option_type: OptionType,
    pub style: ExerciseStyle,
}

impl OptionContract {
    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub fn new(
        spot: f64,
        strike: f64,
        rate: f64,
        sigma: f64,
        ttl_years: f64,
        div_yield: f64,
        option_type: OptionType,
        style: ExerciseStyle,
    ) -> Self {
        Self {
            spot,
            strike,
            rate,
            sigma,
            ttl_years,
            div_yield,
            option_type,
            style,
        }
    }

    /// Exercise value at an arbitrary underlying level.
    #[inline]
    pub fn payoff(&self, spot: f64) -> f64 {
        payoff(self.option_type, spot, self.strike)
    }

    #[inline]
    pub fn intrinsic(&self) -> f64 {
        self.payoff(self.spot)
    }

    /// Same instrument with the other exercise style.
    #[inline]
    pub fn with_style(mut self, style: ExerciseStyle) -> Self {
        self.style = style;
        self
    }

    pub fn validate(&self, name: &str) -> EngineResult<()> {
        let invalid = |reason: String| EngineError::InvalidInstrument {
            name: name.to_string(),
            reason,
        };

        let positive = [
            ("spot", self.spot),
            ("strike", self.strike),
            ("sigma", self.sigma),
            ("ttl_years", self.ttl_years),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{field} must be finite and > 0, got {value}")));
            }
        }
        if !self.rate.is_finite() {
            return Err(invalid(format!("rate must be finite, got {}", self.rate)));
        }
        if !self.div_yield.is_finite() || self.div_yield < 0.0 {
            return Err(invalid(format!(
                "div_yield must be finite and >= 0, got {}",
                self.div_yield
            )));
        }
        Ok(())
    }
}

#[inline]
pub fn payoff(option_type: OptionType, spot: f64, strike: f64) -> f64 {
    match option_type {
        OptionType::Call => (spot - strike).max(0.0),
        OptionType::Put => (strike - spot).max(0.0),
    }
}

// ── Pricing output ──

/// Sensitivities in desk units: theta per calendar day, vega per vol
/// point, rho per rate point.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
}

/// Price plus the full Greek set for one instrument. Always fully populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct GreekResult {
    pub price: f64,
    #[serde(flatten)]
    pub greeks: Greeks,
}

// ── Market tick (already decoded from the wire) ──

/// Field update for one instrument. Absent fields leave the stored value alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tick {
    pub instrument_name: String,
    /// Option mark (or last trade) price.
    pub mark_price: Option<f64>,
    /// Underlying spot, written into the record's `spot`.
    pub underlying_price: Option<f64>,
    /// Implied volatility as a fraction (0.65 = 65%).
    pub implied_vol: Option<f64>,
    pub timestamp_ms: Option<i64>,
}

impl Tick {
    #[inline]
    pub fn carries_fields(&self) -> bool {
        self.mark_price.is_some() || self.underlying_price.is_some() || self.implied_vol.is_some()
    }
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub ticks_received: AtomicU64,
    pub ticks_applied: AtomicU64,
    pub ticks_unknown: AtomicU64,
    pub ticks_rejected: AtomicU64,
    pub ticks_malformed: AtomicU64,
    pub snapshots_taken: AtomicU64,
    pub instruments_registered: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            ticks_received: AtomicU64::new(0),
            ticks_applied: AtomicU64::new(0),
            ticks_unknown: AtomicU64::new(0),
            ticks_rejected: AtomicU64::new(0),
            ticks_malformed: AtomicU64::new(0),
            snapshots_taken: AtomicU64::new(0),
            instruments_registered: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            ticks_received: self.ticks_received.load(Ordering::Relaxed),
            ticks_applied: self.ticks_applied.load(Ordering::Relaxed),
            ticks_unknown: self.ticks_unknown.load(Ordering::Relaxed),
            ticks_rejected: self.ticks_rejected.load(Ordering::Relaxed),
            ticks_malformed: self.ticks_malformed.load(Ordering::Relaxed),
            snapshots_taken: self.snapshots_taken.load(Ordering::Relaxed),
            instruments_registered: self.instruments_registered.load(Ordering::Relaxed),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CounterSnapshot {
    pub ticks_received: u64,
    pub ticks_applied: u64,
    pub ticks_unknown: u64,
    pub ticks_rejected: u64,
    pub ticks_malformed: u64,
    pub snapshots_taken: u64,
    pub instruments_registered: u64,
}
