//! CSV time and sales adapter.
//!
//! Each security has its own file, `<symbol>_<market>.csv`, with the header
//! `timestamp,price,size,market_center`.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::debug;

use crate::domain::error::CanvasError;
use crate::domain::order::{Security, TimeAndSale};
use crate::ports::market_data_port::MarketDataPort;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct Row {
    timestamp: String,
    price: f64,
    size: i64,
    #[serde(default)]
    market_center: String,
}

pub struct CsvMarketDataAdapter {
    base_path: PathBuf,
}

impl CsvMarketDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, security: &Security) -> PathBuf {
        if security.market.is_empty() {
            self.base_path.join(format!("{}.csv", security.symbol))
        } else {
            self.base_path
                .join(format!("{}_{}.csv", security.symbol, security.market))
        }
    }

    /// Securities with a file in the base directory, sorted.
    pub fn list_securities(&self) -> Result<Vec<Security>, CanvasError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| CanvasError::MarketData {
            reason: format!("failed to read directory {}: {e}", self.base_path.display()),
        })?;
        let mut securities = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_string_lossy().strip_suffix(".csv").map(str::to_string) else {
                continue;
            };
            let security = match stem.rsplit_once('_') {
                Some((symbol, market)) => Security::new(symbol, market),
                None => Security::new(stem, ""),
            };
            securities.push(security);
        }
        securities.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        Ok(securities)
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, CanvasError> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text.trim(), format).ok())
        .ok_or_else(|| CanvasError::MarketData {
            reason: format!("invalid timestamp: {text}"),
        })
}

impl MarketDataPort for CsvMarketDataAdapter {
    fn load_time_and_sales(&self, security: &Security) -> Result<Vec<TimeAndSale>, CanvasError> {
        let path = self.csv_path(security);
        if !path.is_file() {
            return Err(CanvasError::NoMarketData {
                security: security.to_string(),
            });
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| CanvasError::MarketData {
                reason: format!("failed to read {}: {e}", path.display()),
            })?;
        let mut prints = Vec::new();
        for row in reader.deserialize::<Row>() {
            let row = row.map_err(|e| CanvasError::MarketData {
                reason: format!("CSV parse error in {}: {e}", path.display()),
            })?;
            prints.push(TimeAndSale {
                timestamp: parse_timestamp(&row.timestamp)?,
                price: row.price,
                size: row.size,
                market_center: row.market_center,
            });
        }
        prints.sort_by_key(|p| p.timestamp);
        debug!(%security, prints = prints.len(), "loaded time and sales");
        Ok(prints)
    }
}
