pub mod dataset;
pub mod min_max;

pub use dataset::{ColumnValueMap, TimeSeriesDataset};
pub use min_max::{EntityClassification, MinMaxIndex};
