use crate::batch::OptionBatch;
use crate::errors::{EngineError, EngineResult};
use crate::feeds::deribit;
use crate::state::{CounterSnapshot, OptionContract, PerfCounters, Tick};
use portable_atomic::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// What happened to one incoming tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Written at this batch index.
    Applied(usize),
    /// Instrument not registered. Dropped.
    Unknown,
    /// Registered, but a carried field failed validation. Nothing written.
    Rejected(&'static str),
    /// Could not be decoded.
    Malformed,
}

struct Inner {
    batch: OptionBatch,
    index: HashMap<String, usize>,
    /// Last observed option mark per row, NaN until a tick carries one.
    marks: Vec<f64>,
}

impl Inner {
    fn push(&mut self, name: String, opt: &OptionContract) -> usize {
        let idx = self.batch.push(opt);
        self.marks.push(f64::NAN);
        self.index.insert(name, idx);
        debug_assert_eq!(self.index.len(), self.batch.len());
        idx
    }
}

/// Live market data shared between ingestion and pricing.
///
/// Every read or write of the batch goes through one mutex. The pricing side
/// only ever sees copies taken by [`MarketStore::snapshot`], so it runs
/// without holding the lock while ticks keep landing.
pub struct MarketStore {
    inner: Mutex<Inner>,
    counters: PerfCounters,
}

impl MarketStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                batch: OptionBatch::new(),
                index: HashMap::new(),
                marks: Vec::new(),
            }),
            counters: PerfCounters::new(),
        }
    }

    /// Recovers from poisoning: every write under the lock is a single f64 store.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Append an instrument and return its batch index.
    pub fn register(&self, name: impl Into<String>, opt: OptionContract) -> EngineResult<usize> {
        let name = name.into();
        opt.validate(&name)?;

        let mut inner = self.lock();
        if inner.index.contains_key(&name) {
            return Err(EngineError::DuplicateInstrument(name));
        }
        let idx = inner.push(name, &opt);
        drop(inner);

        self.counters.instruments_registered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(idx, "instrument registered");
        Ok(idx)
    }

    /// Register a whole chain or nothing.
    pub fn register_chain(&self, chain: Vec<(String, OptionContract)>) -> EngineResult<std::ops::Range<usize>> {
        for (name, opt) in &chain {
            opt.validate(name)?;
        }

        let mut inner = self.lock();
        let mut seen = std::collections::HashSet::with_capacity(chain.len());
        for (name, _) in &chain {
            if inner.index.contains_key(name) || !seen.insert(name.as_str()) {
                return Err(EngineError::DuplicateInstrument(name.clone()));
            }
        }

        let start = inner.batch.len();
        inner.batch.reserve(chain.len());
        let count = chain.len();
        for (name, opt) in chain {
            inner.push(name, &opt);
        }
        let end = inner.batch.len();
        drop(inner);

        self.counters
            .instruments_registered
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::info!(instruments = count, first = start, "chain registered");
        Ok(start..end)
    }

    /// Overwrite the fields a tick carries. Unknown names are dropped.
    pub fn apply_tick(&self, tick: &Tick) -> TickOutcome {
        self.counters.ticks_received.fetch_add(1, Ordering::Relaxed);

        let outcome = self.write_tick(tick);
        match outcome {
            TickOutcome::Applied(_) => {
                self.counters.ticks_applied.fetch_add(1, Ordering::Relaxed);
            }
            TickOutcome::Unknown => {
                self.counters.ticks_unknown.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(instrument = %tick.instrument_name, "tick for untracked instrument");
            }
            TickOutcome::Rejected(reason) => {
                self.counters.ticks_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(instrument = %tick.instrument_name, reason, "tick rejected");
            }
            TickOutcome::Malformed => {
                self.counters.ticks_malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }

    fn write_tick(&self, tick: &Tick) -> TickOutcome {
        let mut inner = self.lock();
        let Some(&idx) = inner.index.get(&tick.instrument_name) else {
            return TickOutcome::Unknown;
        };

        if !tick.carries_fields() {
            return TickOutcome::Rejected("no tracked fields");
        }
        // Check everything before touching the batch so a bad field never
        // leaves a half-applied update behind.
        if let Some(spot) = tick.underlying_price {
            if !spot.is_finite() || spot <= 0.0 {
                return TickOutcome::Rejected("underlying price must be finite and > 0");
            }
        }
        if let Some(iv) = tick.implied_vol {
            if !iv.is_finite() || iv <= 0.0 {
                return TickOutcome::Rejected("implied vol must be finite and > 0");
            }
        }
        if let Some(mark) = tick.mark_price {
            if !mark.is_finite() || mark < 0.0 {
                return TickOutcome::Rejected("mark price must be finite and >= 0");
            }
        }

        if let Some(spot) = tick.underlying_price {
            inner.batch.set_spot(idx, spot);
        }
        if let Some(iv) = tick.implied_vol {
            inner.batch.set_sigma(idx, iv);
        }
        if let Some(mark) = tick.mark_price {
            inner.marks[idx] = mark;
        }
        TickOutcome::Applied(idx)
    }

    /// Decode a raw ticker notification and apply it. Never fails; the
    /// outcome says what happened.
    pub fn ingest_json(&self, raw: &str) -> TickOutcome {
        match deribit::parse_ticker(raw) {
            Ok(tick) => self.apply_tick(&tick),
            Err(e) => {
                self.counters.ticks_received.fetch_add(1, Ordering::Relaxed);
                self.counters.ticks_malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, bytes = raw.len(), "malformed tick dropped");
                TickOutcome::Malformed
            }
        }
    }

    /// Point-in-time copy of the live batch. The lock is held only for the copy.
    pub fn snapshot(&self) -> OptionBatch {
        let copy = self.lock().batch.clone();
        self.counters.snapshots_taken.fetch_add(1, Ordering::Relaxed);
        copy
    }

    /// Last option mark seen for `name`, if any tick has carried one.
    pub fn mark(&self, name: &str) -> Option<f64> {
        let inner = self.lock();
        let idx = *inner.index.get(name)?;
        let mark = inner.marks[idx];
        (!mark.is_nan()).then_some(mark)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lock().index.get(name).copied()
    }

    /// Current record for `name`.
    pub fn get(&self, name: &str) -> Option<OptionContract> {
        let inner = self.lock();
        let idx = *inner.index.get(name)?;
        inner.batch.get(idx)
    }

    pub fn len(&self) -> usize {
        self.lock().batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}
