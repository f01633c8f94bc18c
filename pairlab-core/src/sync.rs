//! Stream synchronizer: joins independently clocked candle feeds by open time.
//!
//! Each feed pushes finished candles as they arrive. A combined event is
//! emitted exactly once per open time, as soon as every required role has a
//! candle for it. Pending keys are bounded: only the `ttl_bars` newest open
//! times are kept, older ones are dropped and logged, so a feed gap cannot grow
//! the buffer without limit.

use crate::domain::{CandleSample, CombinedCandle, InstrumentRole};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
struct PendingSlot {
    base: Option<CandleSample>,
    second: Option<CandleSample>,
    cross: Option<CandleSample>,
}

impl PendingSlot {
    fn set(&mut self, role: InstrumentRole, sample: CandleSample) {
        match role {
            InstrumentRole::Base => self.base = Some(sample),
            InstrumentRole::Second => self.second = Some(sample),
            InstrumentRole::Cross => self.cross = Some(sample),
        }
    }

    fn missing(&self, with_cross: bool) -> Vec<InstrumentRole> {
        let mut missing = Vec::new();
        if self.base.is_none() {
            missing.push(InstrumentRole::Base);
        }
        if self.second.is_none() {
            missing.push(InstrumentRole::Second);
        }
        if with_cross && self.cross.is_none() {
            missing.push(InstrumentRole::Cross);
        }
        missing
    }

    fn combine(&self, time: DateTime<Utc>, with_cross: bool) -> Option<CombinedCandle> {
        let base = self.base?;
        let second = self.second?;
        let cross = if with_cross { Some(self.cross?) } else { None };
        Some(CombinedCandle { time, base, second, cross })
    }
}

/// Joins two (or three) candle feeds into [`CombinedCandle`] events.
#[derive(Debug)]
pub struct StreamSynchronizer {
    with_cross: bool,
    ttl_bars: usize,
    pending: BTreeMap<DateTime<Utc>, PendingSlot>,
    last_emitted: Option<DateTime<Utc>>,
    dropped_keys: usize,
}

impl StreamSynchronizer {
    /// `ttl_bars` is the number of distinct pending open times kept before the
    /// oldest is dropped. Values below 1 are treated as 1.
    pub fn new(with_cross: bool, ttl_bars: usize) -> Self {
        Self {
            with_cross,
            ttl_bars: ttl_bars.max(1),
            pending: BTreeMap::new(),
            last_emitted: None,
            dropped_keys: 0,
        }
    }

    /// Buffer a candle; returns the combined event if this completed its open time.
    pub fn push(&mut self, role: InstrumentRole, sample: CandleSample) -> Option<CombinedCandle> {
        if role == InstrumentRole::Cross && !self.with_cross {
            debug!(time = %sample.time, "ignoring cross candle: no cross instrument configured");
            return None;
        }
        if self.last_emitted.is_some_and(|last| sample.time <= last) {
            debug!(%role, time = %sample.time, "ignoring candle at or before last emitted time");
            return None;
        }

        let slot = self.pending.entry(sample.time).or_default();
        slot.set(role, sample);

        let combined = slot.combine(sample.time, self.with_cross);
        match combined {
            Some(event) => {
                self.pending.remove(&event.time);
                self.last_emitted = Some(event.time);
                self.drop_before(event.time);
                Some(event)
            }
            None => {
                self.enforce_ttl();
                None
            }
        }
    }

    /// Number of open times still waiting for a counterpart.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total open times dropped without ever completing.
    pub fn dropped_keys(&self) -> usize {
        self.dropped_keys
    }

    pub fn last_emitted(&self) -> Option<DateTime<Utc>> {
        self.last_emitted
    }

    /// Keys older than an emitted time can never be emitted again.
    fn drop_before(&mut self, time: DateTime<Utc>) {
        let newer = self.pending.split_off(&time);
        let stale = std::mem::replace(&mut self.pending, newer);
        for (key, slot) in stale {
            self.log_drop(key, &slot);
        }
    }

    fn enforce_ttl(&mut self) {
        while self.pending.len() > self.ttl_bars {
            match self.pending.pop_first() {
                Some((key, slot)) => self.log_drop(key, &slot),
                None => break,
            }
        }
    }

    fn log_drop(&mut self, key: DateTime<Utc>, slot: &PendingSlot) {
        self.dropped_keys += 1;
        warn!(
            time = %key,
            missing = ?slot.missing(self.with_cross),
            "dropping unmatched candle: counterpart never arrived"
        );
    }
}
