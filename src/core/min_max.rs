use super::TimeSeriesDataset;
use std::collections::{HashMap, HashSet};

/// Which dataset columns are entities of interest (drawn and normalized)
#[derive(Debug, Clone, Default)]
pub struct EntityClassification {
    entities: HashSet<String>,
}

impl EntityClassification {
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entities: entities.into_iter().map(Into::into).collect(),
        }
    }

    /// Every column of the dataset is an entity
    pub fn all(dataset: &TimeSeriesDataset) -> Self {
        Self::new(dataset.columns().iter().cloned())
    }

    pub fn is_entity(&self, column: &str) -> bool {
        self.entities.contains(column)
    }
}

/// Per-column (min, max) over the whole trace. Built in one scan, never
/// updated afterwards.
#[derive(Debug, Clone)]
pub struct MinMaxIndex {
    ranges: HashMap<String, (f64, f64)>,
}

impl MinMaxIndex {
    pub fn build(dataset: &TimeSeriesDataset, classification: &EntityClassification) -> Self {
        let tracked: Vec<(usize, &String)> = dataset
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| classification.is_entity(name))
            .collect();

        let mut bounds = vec![(f64::INFINITY, f64::NEG_INFINITY); tracked.len()];

        for row_idx in 0..dataset.len() {
            let row = dataset.row(row_idx);
            for (slot, (col_idx, _)) in tracked.iter().enumerate() {
                let v = row[*col_idx];
                if v.is_nan() {
                    continue;
                }
                let (lo, hi) = &mut bounds[slot];
                *lo = lo.min(v);
                *hi = hi.max(v);
            }
        }

        let ranges = tracked
            .into_iter()
            .zip(bounds)
            // all-NaN columns have no range
            .filter(|(_, (lo, hi))| lo <= hi)
            .map(|((_, name), range)| (name.clone(), range))
            .collect();

        Self { ranges }
    }

    pub fn get(&self, column: &str) -> Option<(f64, f64)> {
        self.ranges.get(column).copied()
    }

    /// Map `value` into [0, 1] relative to the column's range. A flat column
    /// maps everything to 0.
    pub fn normalize(&self, column: &str, value: f64) -> Option<f64> {
        let (lo, hi) = self.get(column)?;
        if hi - lo <= f64::EPSILON {
            return Some(0.0);
        }
        Some(((value - lo) / (hi - lo)).clamp(0.0, 1.0))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> TimeSeriesDataset {
        TimeSeriesDataset::new(
            vec!["glucose".into(), "atp".into(), "flux".into()],
            vec![
                (0.0, vec![5.0, 1.0, -2.0]),
                (1.0, vec![3.0, 1.0, 4.0]),
                (2.0, vec![9.0, 1.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_only_entities_indexed() {
        let ds = dataset();
        let index = MinMaxIndex::build(&ds, &EntityClassification::new(["glucose", "atp"]));

        assert_eq!(index.get("glucose"), Some((3.0, 9.0)));
        assert_eq!(index.get("atp"), Some((1.0, 1.0)));
        assert_eq!(index.get("flux"), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_normalize() {
        let ds = dataset();
        let index = MinMaxIndex::build(&ds, &EntityClassification::all(&ds));

        assert_eq!(index.normalize("glucose", 6.0), Some(0.5));
        assert_eq!(index.normalize("atp", 1.0), Some(0.0));
        assert_eq!(index.normalize("missing", 1.0), None);
    }
}
