//! Reading price histories and period returns from CSV.
//!
//! Both file layouts share the same shape: a header `Date,<ticker>,<ticker>,...`
//! followed by one row per period. The date column is carried along as text and
//! never parsed.
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::matrix::{Matrix, MatrixError};

#[derive(Error, Debug)]
pub enum ReturnsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("No valid data in {0}")]
    NoData(String),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Log returns `ln(P_t / P_{t-1})` per asset.
///
/// The first period has no predecessor and gets a return of `0.0` for every
/// asset, as does any period where either price is not strictly positive.
pub fn log_returns(prices: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = prices.first() else {
        return Vec::new();
    };

    let mut returns = Vec::with_capacity(prices.len());
    returns.push(vec![0.0; first.len()]);

    for window in prices.windows(2) {
        let (previous, current) = (&window[0], &window[1]);
        let row = current
            .iter()
            .enumerate()
            .map(|(i, &price)| match previous.get(i) {
                Some(&prev) if prev > 0.0 && price > 0.0 => (price / prev).ln(),
                _ => 0.0,
            })
            .collect();
        returns.push(row);
    }
    returns
}

fn parse_cell(cell: &str, line: u64, column: &str) -> f64 {
    match cell.trim().parse::<f64>() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                "Malformed value {:?} for {} on line {}, defaulting to 0.0",
                cell, column, line
            );
            0.0
        }
    }
}

struct DatedRows {
    tickers: Vec<String>,
    dates: Vec<String>,
    rows: Vec<Vec<f64>>,
}

fn read_dated_rows<P: AsRef<Path>>(path: P) -> Result<DatedRows, ReturnsError> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let tickers: Vec<String> = reader.headers()?.iter().skip(1).map(String::from).collect();

    let mut dates = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());

        let row: Vec<f64> = record
            .iter()
            .skip(1)
            .enumerate()
            .map(|(i, cell)| {
                let column = tickers.get(i).map_or("unnamed column", String::as_str);
                parse_cell(cell, line, column)
            })
            .collect();

        if row.is_empty() {
            continue;
        }
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                warn!(
                    "Skipping line {}: expected {} values, found {}",
                    line,
                    first.len(),
                    row.len()
                );
                continue;
            }
        }

        dates.push(record.get(0).unwrap_or_default().to_string());
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ReturnsError::NoData(path.display().to_string()));
    }
    Ok(DatedRows {
        tickers,
        dates,
        rows,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub tickers: Vec<String>,
    pub dates: Vec<String>,
    pub prices: Vec<Vec<f64>>,
}

impl PriceTable {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, ReturnsError> {
        let DatedRows {
            tickers,
            dates,
            rows,
        } = read_dated_rows(path)?;
        Ok(PriceTable {
            tickers,
            dates,
            prices: rows,
        })
    }

    pub fn log_returns(&self) -> ReturnsTable {
        ReturnsTable {
            tickers: self.tickers.clone(),
            dates: self.dates.clone(),
            returns: log_returns(&self.prices),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsTable {
    pub tickers: Vec<String>,
    pub dates: Vec<String>,
    pub returns: Vec<Vec<f64>>,
}

impl ReturnsTable {
    pub fn to_matrix(&self) -> Result<Matrix, MatrixError> {
        Matrix::from_rows(self.returns.clone())
    }

    /// Writes the table back out in the same `Date,<tickers>` layout it is read from.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ReturnsError> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)?;

        let header = std::iter::once("Date").chain(self.tickers.iter().map(String::as_str));
        writer.write_record(header)?;
        for (date, row) in self.dates.iter().zip(&self.returns) {
            let record = std::iter::once(date.clone()).chain(row.iter().map(|r| r.to_string()));
            writer.write_record(record)?;
        }
        writer.flush()?;

        info!("Saved {} periods of returns to {}", self.returns.len(), path.display());
        Ok(())
    }
}

/// Loads a file of already computed per-period returns.
///
/// Malformed cells count as `0.0`; rows whose width differs from the first data
/// row are dropped.
pub fn load_returns_csv<P: AsRef<Path>>(path: P) -> Result<ReturnsTable, ReturnsError> {
    let DatedRows {
        tickers,
        dates,
        rows,
    } = read_dated_rows(path)?;
    Ok(ReturnsTable {
        tickers,
        dates,
        returns: rows,
    })
}
