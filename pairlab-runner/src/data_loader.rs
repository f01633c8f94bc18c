//! Candle loading with synthetic fallback.
//!
//! CSV layout (one file per instrument):
//!
//! ```text
//! time,high,low,close,is_final
//! 2024-01-02T00:00:00Z,1.10450,1.10210,1.10390,true
//! ```
//!
//! `is_final` is optional and defaults to true. Rows must be strictly
//! increasing in time.

use chrono::{DateTime, Utc};
use pairlab_core::domain::{CandleSample, InstrumentRole};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::synthetic::generate_pair;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} contains no candles")]
    Empty { path: PathBuf },

    #[error("{path}: row {row} at {time} is not after the previous row")]
    Unsorted {
        path: PathBuf,
        row: usize,
        time: DateTime<Utc>,
    },

    #[error("cross instrument configured but no cross data available")]
    MissingCross,
}

/// Candles for every configured role, each sorted by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairData {
    pub base: Vec<CandleSample>,
    pub second: Vec<CandleSample>,
    pub cross: Option<Vec<CandleSample>>,
}

impl PairData {
    /// All candles merged into one stream ordered by open time, then role.
    pub fn merged(&self) -> Vec<(InstrumentRole, CandleSample)> {
        let mut events: Vec<(InstrumentRole, CandleSample)> = self
            .base
            .iter()
            .map(|c| (InstrumentRole::Base, *c))
            .chain(self.second.iter().map(|c| (InstrumentRole::Second, *c)))
            .chain(
                self.cross
                    .iter()
                    .flatten()
                    .map(|c| (InstrumentRole::Cross, *c)),
            )
            .collect();
        events.sort_by(|a, b| a.1.time.cmp(&b.1.time).then(a.0.cmp(&b.0)));
        events
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CandleRecord {
    time: DateTime<Utc>,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default = "default_final")]
    is_final: bool,
}

fn default_final() -> bool {
    true
}

/// Load candles for the configured source.
pub fn load_pair(data: &DataConfig, with_cross: bool) -> Result<PairData, LoadError> {
    match data {
        DataConfig::Csv { base, second, cross } => {
            let cross = match (with_cross, cross) {
                (true, Some(path)) => Some(load_candles(path)?),
                (true, None) => return Err(LoadError::MissingCross),
                (false, _) => None,
            };
            let pair = PairData {
                base: load_candles(base)?,
                second: load_candles(second)?,
                cross,
            };
            info!(
                base = pair.base.len(),
                second = pair.second.len(),
                cross = pair.cross.as_ref().map_or(0, Vec::len),
                "loaded candles from CSV"
            );
            Ok(pair)
        }
        DataConfig::Synthetic(config) => {
            let pair = generate_pair(config, with_cross);
            info!(bars = pair.len(), seed = config.seed, "generated synthetic pair");
            Ok(pair)
        }
    }
}

/// Read one instrument's candles from a CSV file.
pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<CandleSample>, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut candles: Vec<CandleSample> = Vec::new();
    for (row, record) in reader.deserialize::<CandleRecord>().enumerate() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if candles.last().is_some_and(|prev| record.time <= prev.time) {
            return Err(LoadError::Unsorted {
                path: path.to_path_buf(),
                row: row + 1,
                time: record.time,
            });
        }
        let candle = CandleSample {
            time: record.time,
            high: record.high,
            low: record.low,
            close: record.close,
            is_final: record.is_final,
        };
        if !candle.is_sane() {
            warn!(path = %path.display(), row = row + 1, "candle fails high/low/close sanity check");
        }
        candles.push(candle);
    }

    if candles.is_empty() {
        return Err(LoadError::Empty { path: path.to_path_buf() });
    }
    Ok(candles)
}

/// Write candles in the layout [`load_candles`] reads.
pub fn write_candles(path: impl AsRef<Path>, candles: &[CandleSample]) -> Result<(), LoadError> {
    let path = path.as_ref();
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for c in candles {
        writer
            .serialize(CandleRecord {
                time: c.time,
                high: c.high,
                low: c.low,
                close: c.close,
                is_final: c.is_final,
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
