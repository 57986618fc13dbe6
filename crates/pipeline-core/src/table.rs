use crate::PipelineError;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Date-indexed table of daily closing prices, one row per trading day,
/// one column per tracked series.
///
/// Invariants: the date index is sorted, strictly increasing, with no
/// duplicates, and no cell is missing after the fill step at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl PriceTable {
    /// Build a table from pre-validated parts.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        if rows.len() != dates.len() {
            return Err(PipelineError::InvalidData(format!(
                "{} rows for {} dates",
                rows.len(),
                dates.len()
            )));
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(PipelineError::InvalidData(format!(
                    "row width {} does not match {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(PipelineError::InvalidData(format!(
                    "date index not strictly increasing at {}",
                    pair[1]
                )));
            }
        }
        Ok(Self {
            dates,
            columns,
            rows,
        })
    }

    /// Merge per-symbol close series into one table keyed by date.
    ///
    /// Columns keep the insertion order of `series`. Dates are the union of
    /// all series' dates; gaps are forward-filled, then backward-filled for
    /// any leading holes. Series with no points are skipped entirely.
    pub fn from_series(series: &[(String, Vec<(NaiveDate, f64)>)]) -> Result<Self, PipelineError> {
        let populated: Vec<&(String, Vec<(NaiveDate, f64)>)> =
            series.iter().filter(|(_, points)| !points.is_empty()).collect();

        if populated.is_empty() {
            return Err(PipelineError::NoData(
                "no symbol produced any data points".to_string(),
            ));
        }

        let mut all_dates = BTreeSet::new();
        for (_, points) in &populated {
            for (date, _) in points {
                all_dates.insert(*date);
            }
        }
        let dates: Vec<NaiveDate> = all_dates.into_iter().collect();

        let mut columns = Vec::with_capacity(populated.len());
        let mut by_column: Vec<HashMap<NaiveDate, f64>> = Vec::with_capacity(populated.len());
        for (name, points) in &populated {
            columns.push(name.clone());
            by_column.push(points.iter().copied().collect());
        }

        let rows: Vec<Vec<f64>> = dates
            .iter()
            .map(|date| {
                by_column
                    .iter()
                    .map(|lookup| lookup.get(date).copied().unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();

        let mut table = Self {
            dates,
            columns,
            rows,
        };
        table.fill_gaps();
        Ok(table)
    }

    /// Forward-fill each column, then backward-fill remaining leading gaps.
    fn fill_gaps(&mut self) {
        for col in 0..self.columns.len() {
            let mut last = f64::NAN;
            for row in self.rows.iter_mut() {
                if row[col].is_nan() {
                    row[col] = last;
                } else {
                    last = row[col];
                }
            }
            let mut next = f64::NAN;
            for row in self.rows.iter_mut().rev() {
                if row[col].is_nan() {
                    row[col] = next;
                } else {
                    next = row[col];
                }
            }
        }
    }

    /// Keep only rows within `[start, end]` inclusive.
    pub fn filter_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for (date, row) in self.dates.iter().zip(self.rows.iter()) {
            if *date >= start && *date <= end {
                dates.push(*date);
                rows.push(row.clone());
            }
        }
        Self {
            dates,
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Day-over-day percentage change per column. The first row has no
    /// prior day and is dropped; columns are renamed `{name}_change`.
    pub fn pct_change(&self) -> ChangeTable {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|name| format!("{}_change", name))
            .collect();
        let dates: Vec<NaiveDate> = self.dates.iter().skip(1).copied().collect();
        let rows: Vec<Vec<f64>> = self
            .rows
            .windows(2)
            .map(|pair| {
                pair[0]
                    .iter()
                    .zip(pair[1].iter())
                    .map(|(prev, curr)| (curr - prev) / prev)
                    .collect()
            })
            .collect();
        ChangeTable {
            dates,
            columns,
            rows,
        }
    }

    /// Last `n` rows as a new table.
    pub fn tail(&self, n: usize) -> Self {
        let skip = self.dates.len().saturating_sub(n);
        Self {
            dates: self.dates[skip..].to_vec(),
            columns: self.columns.clone(),
            rows: self.rows[skip..].to_vec(),
        }
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn has_missing(&self) -> bool {
        self.rows.iter().any(|row| row.iter().any(|v| v.is_nan()))
    }

    /// Write the table wholesale as CSV: first column ISO date, header row =
    /// series names. Writes to a temp file and renames so a failed refresh
    /// never clobbers a previously good cache.
    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::CacheError(e.to_string()))?;
            }
        }

        let tmp = path.with_extension("tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)
                .map_err(|e| PipelineError::CacheError(e.to_string()))?;

            let mut header = vec!["date".to_string()];
            header.extend(self.columns.iter().cloned());
            writer
                .write_record(&header)
                .map_err(|e| PipelineError::CacheError(e.to_string()))?;

            for (date, row) in self.dates.iter().zip(self.rows.iter()) {
                let mut record = vec![date.format("%Y-%m-%d").to_string()];
                record.extend(row.iter().map(|v| v.to_string()));
                writer
                    .write_record(&record)
                    .map_err(|e| PipelineError::CacheError(e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| PipelineError::CacheError(e.to_string()))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| PipelineError::CacheError(e.to_string()))
    }

    /// Read a table wholesale from a CSV written by [`PriceTable::write_csv`].
    pub fn read_csv(path: &Path) -> Result<Self, PipelineError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PipelineError::CacheError(e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::CacheError(e.to_string()))?
            .clone();
        if headers.is_empty() {
            return Err(PipelineError::CacheError(format!(
                "{}: empty header row",
                path.display()
            )));
        }
        let columns: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PipelineError::CacheError(e.to_string()))?;
            let date_field = record.get(0).unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d")
                .map_err(|e| PipelineError::CacheError(format!("bad date '{date_field}': {e}")))?;
            let row: Result<Vec<f64>, _> = record
                .iter()
                .skip(1)
                .map(|field| field.parse::<f64>())
                .collect();
            let row =
                row.map_err(|e| PipelineError::CacheError(format!("bad value in CSV: {e}")))?;
            dates.push(date);
            rows.push(row);
        }

        Self::new(dates, columns, rows)
    }
}

/// Per-column day-over-day percentage changes, same date discipline as
/// [`PriceTable`] but one fewer row. Also carries lag-augmented feature
/// columns once the feature builder has run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeTable {
    pub(crate) dates: Vec<NaiveDate>,
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<f64>>,
}

impl ChangeTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        if rows.len() != dates.len() {
            return Err(PipelineError::InvalidData(format!(
                "{} rows for {} dates",
                rows.len(),
                dates.len()
            )));
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(PipelineError::InvalidData(format!(
                    "row width {} does not match {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self {
            dates,
            columns,
            rows,
        })
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn has_missing(&self) -> bool {
        self.rows.iter().any(|row| row.iter().any(|v| v.is_nan()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table() -> PriceTable {
        let dates: Vec<NaiveDate> = (1..=5).map(|d| date(2024, 1, d)).collect();
        let rows = vec![
            vec![100.0, 50.0],
            vec![102.0, 49.0],
            vec![101.0, 51.0],
            vec![105.0, 52.0],
            vec![104.0, 50.0],
        ];
        PriceTable::new(dates, vec!["BIST100".into(), "Gold".into()], rows).unwrap()
    }

    #[test]
    fn test_pct_change_drops_first_row() {
        let table = sample_table();
        let changes = table.pct_change();

        assert_eq!(changes.len(), table.len() - 1);
        assert!(!changes.has_missing());
        assert_eq!(changes.columns(), &["BIST100_change", "Gold_change"]);

        let bist = changes.column_values("BIST100_change").unwrap();
        assert!((bist[0] - 0.02).abs() < 1e-12);
        assert!((bist[1] - (101.0 - 102.0) / 102.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_series_fills_gaps() {
        let series = vec![
            (
                "A".to_string(),
                vec![(date(2024, 1, 1), 10.0), (date(2024, 1, 3), 12.0)],
            ),
            (
                "B".to_string(),
                vec![(date(2024, 1, 2), 5.0), (date(2024, 1, 3), 6.0)],
            ),
        ];
        let table = PriceTable::from_series(&series).unwrap();

        assert_eq!(table.len(), 3);
        assert!(!table.has_missing());
        // A forward-fills Jan 2, B backward-fills Jan 1.
        assert_eq!(table.column_values("A").unwrap(), vec![10.0, 10.0, 12.0]);
        assert_eq!(table.column_values("B").unwrap(), vec![5.0, 5.0, 6.0]);
    }

    #[test]
    fn test_from_series_skips_empty_and_fails_when_all_empty() {
        let series = vec![
            ("A".to_string(), vec![(date(2024, 1, 1), 10.0)]),
            ("B".to_string(), vec![]),
        ];
        let table = PriceTable::from_series(&series).unwrap();
        assert_eq!(table.columns(), &["A"]);

        let empty: Vec<(String, Vec<(NaiveDate, f64)>)> =
            vec![("A".to_string(), vec![]), ("B".to_string(), vec![])];
        assert!(matches!(
            PriceTable::from_series(&empty),
            Err(PipelineError::NoData(_))
        ));
    }

    #[test]
    fn test_rejects_unsorted_dates() {
        let dates = vec![date(2024, 1, 2), date(2024, 1, 1)];
        let rows = vec![vec![1.0], vec![2.0]];
        assert!(PriceTable::new(dates, vec!["A".into()], rows).is_err());
    }

    #[test]
    fn test_filter_range_inclusive() {
        let table = sample_table();
        let filtered = table.filter_range(date(2024, 1, 2), date(2024, 1, 4));
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.dates()[0], date(2024, 1, 2));
        assert_eq!(filtered.dates()[2], date(2024, 1, 4));
    }

    #[test]
    fn test_csv_round_trip() {
        let table = sample_table();
        let path = std::env::temp_dir().join(format!(
            "price_table_rt_{}_{}.csv",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        table.write_csv(&path).unwrap();
        let reloaded = PriceTable::read_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(reloaded.dates(), table.dates());
        assert_eq!(reloaded.columns(), table.columns());
        for (a, b) in reloaded.rows().iter().zip(table.rows().iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).abs() < 1e-9);
            }
        }

        // Filtering to the same range is a no-op.
        let refiltered =
            reloaded.filter_range(*table.dates().first().unwrap(), *table.dates().last().unwrap());
        assert_eq!(refiltered.dates(), table.dates());
    }
}
