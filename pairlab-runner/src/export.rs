//! Artifact export: JSON manifest plus CSV equity curve and order tape.
//!
//! The manifest carries a `schema_version`; unknown versions are rejected on
//! load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::metrics::RoundTrip;
use crate::paper::OrderRecord;
use crate::runner::{BacktestResult, EquityPoint, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: time, equity
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "equity"])?;
    for p in equity_curve {
        wtr.write_record([p.time.to_rfc3339(), format!("{:.2}", p.equity)])?;
    }
    finish_csv(wtr)
}

/// Columns: time, role, symbol, side, volume, price, commission, realized
pub fn export_orders_csv(orders: &[OrderRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "time",
        "role",
        "symbol",
        "side",
        "volume",
        "price",
        "commission",
        "realized",
    ])?;
    for o in orders {
        wtr.write_record([
            o.time.to_rfc3339(),
            o.role.to_string(),
            o.symbol.clone(),
            o.side.to_string(),
            format!("{:.4}", o.volume),
            format!("{:.6}", o.price),
            format!("{:.2}", o.commission),
            format!("{:.2}", o.realized),
        ])?;
    }
    finish_csv(wtr)
}

/// Columns: entry_time, exit_time, direction, exit_reason, pnl
pub fn export_round_trips_csv(trips: &[RoundTrip]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["entry_time", "exit_time", "direction", "exit_reason", "pnl"])?;
    for t in trips {
        wtr.write_record([
            t.entry_time.to_rfc3339(),
            t.exit_time.to_rfc3339(),
            t.direction.to_string(),
            t.exit_reason.to_string(),
            format!("{:.2}", t.pnl),
        ])?;
    }
    finish_csv(wtr)
}

fn finish_csv(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().context("CSV writer flush failed")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{output_dir}/{run_id}/` containing:
/// - `manifest.json`: the full `BacktestResult`
/// - `equity.csv`: equity after every combined candle
/// - `orders.csv`: every paper fill
/// - `round_trips.csv`: closed Flat → Positioned → Flat cycles
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("manifest.json", export_json(result)?),
        ("equity.csv", export_equity_csv(&result.equity_curve)?),
        ("orders.csv", export_orders_csv(&result.orders)?),
        ("round_trips.csv", export_round_trips_csv(&result.round_trips)?),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}
