use std::path::{Path, PathBuf};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{info, warn};

use crate::errors::CsvError;
use crate::models::{DailyPriceRow, TickerRecord};

const HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// `<symbol>_daily.csv` inside `dir`, symbol lowercased.
pub fn default_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(format!("{}_daily.csv", symbol.trim().to_lowercase()))
}

/// Writes rows in the given order. Undated rows are written with an empty date.
pub fn write_daily_csv(path: &Path, rows: &[DailyPriceRow]) -> Result<(), CsvError> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(HEADER)?;

    for row in rows {
        writer.write_record([
            row.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
            row.open.to_string(),
            row.high.to_string(),
            row.low.to_string(),
            row.close.to_string(),
            row.volume.to_string(),
        ])?;
    }

    writer.flush()?;
    info!("Saved {} with {} rows", path.display(), rows.len());
    Ok(())
}

/// Reads a daily CSV for `record`'s ticker.
///
/// Column names are matched case-insensitively, and the provider's
/// `"1. open"`-style names are accepted. A date that cannot be parsed is
/// kept as `None`; a bad number is an error.
pub fn read_daily_csv(path: &Path, record: &TickerRecord) -> Result<Vec<DailyPriceRow>, CsvError> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let columns = Columns::locate(reader.headers()?)?;
    let ticker = record.ticker.trim().to_uppercase();

    let mut rows = Vec::new();
    let mut undated = 0usize;
    for result in reader.records() {
        let line = result?;
        let line_no = line.position().map(|p| p.line()).unwrap_or_default();
        let field = |index: usize| line.get(index).unwrap_or_default();

        let date = parse_date(field(columns.date));
        if date.is_none() {
            undated += 1;
        }

        rows.push(DailyPriceRow {
            ticker: ticker.clone(),
            date,
            exchange: record.exchange.clone(),
            name: record.name.clone(),
            open: decimal(field(columns.open), "open", line_no)?,
            high: decimal(field(columns.high), "high", line_no)?,
            low: decimal(field(columns.low), "low", line_no)?,
            close: decimal(field(columns.close), "close", line_no)?,
            volume: field(columns.volume)
                .parse::<u64>()
                .map_err(|_| CsvError::Field {
                    line: line_no,
                    field: "volume",
                    value: field(columns.volume).to_string(),
                })?,
        });
    }

    if undated > 0 {
        warn!("{}: {} row(s) with unparseable dates", path.display(), undated);
    }
    info!("Read {} rows for {} from {}", rows.len(), ticker, path.display());
    Ok(rows)
}

struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, CsvError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |wanted: &'static str, alias: &str| {
            names
                .iter()
                .position(|n| n == wanted || n == alias)
                .ok_or(CsvError::MissingColumn(wanted))
        };

        Ok(Self {
            date: find("date", "timestamp")?,
            open: find("open", "1. open")?,
            high: find("high", "2. high")?,
            low: find("low", "3. low")?,
            close: find("close", "4. close")?,
            volume: find("volume", "5. volume")?,
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn decimal(raw: &str, field: &'static str, line: u64) -> Result<BigDecimal, CsvError> {
    BigDecimal::from_str(raw).map_err(|_| CsvError::Field {
        line,
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn amd() -> TickerRecord {
        TickerRecord {
            cik: "0000002488".into(),
            ticker: "amd".into(),
            exchange: "Nasdaq".into(),
            name: "ADVANCED MICRO DEVICES INC".into(),
        }
    }

    #[test]
    fn test_default_path_lowercases_symbol() {
        let path = default_path(Path::new("/tmp"), "AMD");
        assert_eq!(path, PathBuf::from("/tmp/amd_daily.csv"));
    }

    #[test]
    fn test_reads_provider_style_columns_and_coerces_bad_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amd_daily.csv");
        fs::write(
            &path,
            "date,1. open,2. high,3. low,4. close,5. volume\n\
             2024-03-04,205.1000,211.3800,203.7000,210.3000,71305426\n\
             yesterday,200.0000,201.0000,199.0000,200.5000,100\n\
             2024-03-01 00:00:00,199.0000,204.0000,198.0000,202.6400,50000\n",
        )
        .unwrap();

        let rows = read_daily_csv(&path, &amd()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].ticker, "AMD");
        assert_eq!(rows[0].name, "ADVANCED MICRO DEVICES INC");
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(rows[1].date, None);
        assert_eq!(rows[2].date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(rows[0].close.to_string(), "210.3000");
        assert_eq!(rows[0].volume, 71_305_426);
    }

    #[test]
    fn test_written_file_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_path(dir.path(), "AMD");
        let original = vec![DailyPriceRow {
            ticker: "AMD".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4),
            exchange: "Nasdaq".into(),
            name: "ADVANCED MICRO DEVICES INC".into(),
            open: BigDecimal::from_str("205.1000").unwrap(),
            high: BigDecimal::from_str("211.3800").unwrap(),
            low: BigDecimal::from_str("203.7000").unwrap(),
            close: BigDecimal::from_str("210.3000").unwrap(),
            volume: 71_305_426,
        }];

        write_daily_csv(&path, &original).unwrap();
        let read = read_daily_csv(&path, &amd()).unwrap();

        assert_eq!(read, original);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.csv");
        fs::write(&path, "date,open,high,low,close\n2024-03-04,1,1,1,1\n").unwrap();

        let err = read_daily_csv(&path, &amd()).unwrap_err();
        assert!(matches!(err, CsvError::MissingColumn("volume")));
    }

    #[test]
    fn test_bad_price_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.csv");
        fs::write(
            &path,
            "date,open,high,low,close,volume\n2024-03-04,n/a,1,1,1,10\n",
        )
        .unwrap();

        let err = read_daily_csv(&path, &amd()).unwrap_err();
        assert!(matches!(err, CsvError::Field { field: "open", line: 2, .. }));
    }
}
