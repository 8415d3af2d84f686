//! Semantic Table: global properties plus one or more aligned per-sensor
//! datasets, and the row-tagged CSV codec that persists them.

pub mod codec;
pub mod column;
pub mod model;
pub mod session;

pub use codec::{parse_str, parse_table, read_table, serialize_table, to_string, write_table};
pub use column::{column_code, column_index, ColumnRange};
pub use model::{Dataset, Property, Samples, Table, TableBuilder, Variable};
pub use session::{AcquisitionSession, CancelToken, SensorCapture};
