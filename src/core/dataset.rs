use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// One published row: column name to value
pub type ColumnValueMap = HashMap<String, f64>;

/// Precomputed simulation trace: strictly increasing timepoints, one value per
/// column per timepoint. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct TimeSeriesDataset {
    columns: Vec<String>,
    timepoints: Vec<f64>,
    /// Row-major values, `rows[i][c]` is column `c` at timepoint `i`
    rows: Vec<Vec<f64>>,
}

/// Wire form, checked by `TimeSeriesDataset::new` on the way in
#[derive(Deserialize)]
struct RawDataset {
    columns: Vec<String>,
    timepoints: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl TryFrom<RawDataset> for TimeSeriesDataset {
    type Error = anyhow::Error;

    fn try_from(raw: RawDataset) -> Result<Self> {
        if raw.timepoints.len() != raw.rows.len() {
            bail!(
                "{} timepoints but {} rows",
                raw.timepoints.len(),
                raw.rows.len()
            );
        }
        Self::new(raw.columns, raw.timepoints.into_iter().zip(raw.rows).collect())
    }
}

impl TimeSeriesDataset {
    /// Build a dataset from `(time, values)` rows
    pub fn new(columns: Vec<String>, rows: Vec<(f64, Vec<f64>)>) -> Result<Self> {
        if rows.is_empty() {
            bail!("Dataset needs at least one timepoint");
        }

        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                bail!("Duplicate column name: {}", name);
            }
        }

        let mut timepoints = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());

        for (row_idx, (time, row)) in rows.into_iter().enumerate() {
            if !time.is_finite() {
                bail!("Row {} has a non-finite timepoint", row_idx);
            }
            if row.len() != columns.len() {
                bail!(
                    "Row {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    columns.len()
                );
            }
            if let Some(&prev) = timepoints.last() {
                if time <= prev {
                    bail!(
                        "Timepoints must be strictly increasing ({} follows {} at row {})",
                        time,
                        prev,
                        row_idx
                    );
                }
            }
            timepoints.push(time);
            values.push(row);
        }

        Ok(Self {
            columns,
            timepoints,
            rows: values,
        })
    }

    /// Parse a CSV trace. The first column is time, every other header names a
    /// value column.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        if headers.is_empty() {
            bail!("CSV trace has no header");
        }
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let time: f64 = fields
                .next()
                .ok_or(anyhow!("Record {} is empty", line))?
                .parse()
                .map_err(|e| anyhow!("Record {} has a bad timepoint: {}", line, e))?;
            let values = fields
                .map(|f| {
                    f.parse::<f64>()
                        .map_err(|e| anyhow!("Record {} has a bad value '{}': {}", line, f, e))
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push((time, values));
        }

        Self::new(columns, rows)
    }

    pub fn len(&self) -> usize {
        self.timepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timepoints.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.timepoints.len() - 1
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn timepoints(&self) -> &[f64] {
        &self.timepoints
    }

    pub fn timepoint(&self, index: usize) -> f64 {
        self.timepoints[index]
    }

    pub fn min_time(&self) -> f64 {
        self.timepoints[0]
    }

    pub fn max_time(&self) -> f64 {
        self.timepoints[self.last_index()]
    }

    /// Simulated time covered by the trace
    pub fn duration(&self) -> f64 {
        self.max_time() - self.min_time()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let c = self.column_index(column)?;
        self.rows.get(row).map(|r| r[c])
    }

    pub(crate) fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    /// Values of a single row keyed by column name
    pub fn row_slice(&self, index: usize) -> ColumnValueMap {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[index].iter().copied())
            .collect()
    }

    /// Index of the last timepoint `<= t`, `None` if `t` precedes the trace
    pub fn index_at_or_before(&self, t: f64) -> Option<usize> {
        let after = self.timepoints.partition_point(|&tp| tp <= t);
        after.checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> TimeSeriesDataset {
        TimeSeriesDataset::new(
            vec!["A".into(), "B".into()],
            vec![(0.0, vec![1.0, 2.0]), (0.5, vec![3.0, 4.0]), (1.0, vec![5.0, 6.0])],
        )
        .unwrap()
    }

    #[test]
    fn test_bounds() {
        let ds = small();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.min_time(), 0.0);
        assert_eq!(ds.max_time(), 1.0);
        assert_eq!(ds.duration(), 1.0);
    }

    #[test]
    fn test_rejects_non_increasing_times() {
        let result = TimeSeriesDataset::new(
            vec!["A".into()],
            vec![(0.0, vec![1.0]), (0.0, vec![2.0])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = TimeSeriesDataset::new(
            vec!["A".into(), "B".into()],
            vec![(0.0, vec![1.0])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_index_at_or_before() {
        let ds = small();
        assert_eq!(ds.index_at_or_before(-0.1), None);
        assert_eq!(ds.index_at_or_before(0.0), Some(0));
        assert_eq!(ds.index_at_or_before(0.7), Some(1));
        assert_eq!(ds.index_at_or_before(1.0), Some(2));
    }

    #[test]
    fn test_row_slice() {
        let ds = small();
        let row = ds.row_slice(1);
        assert_eq!(row.get("A"), Some(&3.0));
        assert_eq!(row.get("B"), Some(&4.0));
    }

    #[test]
    fn test_deserialize_validates() {
        let ds: TimeSeriesDataset = serde_json::from_str(
            r#"{"columns":["x"],"timepoints":[0.0,1.0],"rows":[[1.0],[2.0]]}"#,
        )
        .unwrap();
        assert_eq!(ds.max_time(), 1.0);

        let bad = [
            r#"{"columns":["x"],"timepoints":[],"rows":[]}"#,
            r#"{"columns":["x"],"timepoints":[2.0,1.0],"rows":[[1.0],[2.0]]}"#,
            r#"{"columns":["x","y"],"timepoints":[0.0,1.0],"rows":[[1.0,2.0],[3.0]]}"#,
            r#"{"columns":["x"],"timepoints":[0.0,1.0],"rows":[[1.0]]}"#,
            r#"{"columns":["x","x"],"timepoints":[0.0],"rows":[[1.0,2.0]]}"#,
        ];
        for json in bad {
            assert!(
                serde_json::from_str::<TimeSeriesDataset>(json).is_err(),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_from_csv() {
        let csv = "time, S1, S2\n0, 1.0, 10\n1, 2.5, 11\n2, 0.5, 12\n";
        let ds = TimeSeriesDataset::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["S1".to_string(), "S2".to_string()]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.value(1, "S1"), Some(2.5));
    }
}
