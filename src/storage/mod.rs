//! Durable node records and the store they are read from.
//!
//! Node rows are kept encoded; the label field is inlined into the row when
//! it fits and spilled behind it otherwise. Everything above this module only
//! sees decoded [`NodeRecord`]s and [`LabelSet`]s.

mod labels;
mod metrics;
mod options;
mod store;
mod types;

/// Node row encoding and decoding.
pub mod node;

pub use labels::LabelSet;
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, ViewMetrics};
pub use node::NodeRecord;
pub use options::{GraphOptions, DEFAULT_CURSOR_POOL_SIZE};
pub use store::{MemNodeStore, NodeStore, PropertyMap, RecordWrite};
pub use types::PropValue;
