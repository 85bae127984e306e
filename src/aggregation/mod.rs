//! Group-by aggregation building blocks
//!
//! The pieces SAMPLE BY is assembled from:
//!
//! - [`layout`]: fixed-width state records shared by every aggregate of a group
//! - [`functions`]: aggregate functions and the interpolation protocol
//! - [`key`]: group keys copied from grouping columns
//! - [`group_table`]: key to state record maps
//! - [`sampler`]: bucket boundaries for fixed and calendar intervals
//!
//! ```text
//!   row ──► KeySink ──► GroupKey ──► GroupTable ──► RecordValue
//!                                                     │
//!                      BoundAggregate (slot) ◄────────┘
//!                        init / accumulate / extract
//!                        interpolate_gap / interpolate_boundary
//! ```

pub mod functions;
pub mod group_table;
pub mod key;
pub mod layout;
pub mod sampler;

pub use functions::{
    create_function, BoundAggregate, BoundarySide, GroupByFunction, Interpolate,
};
pub use group_table::{create_group_table, GroupRecord, GroupTable, GroupTableError, GroupTableKind};
pub use key::{GroupKey, KeySchema, KeySink, KeyValue};
pub use layout::{RecordValue, ValueSchema, ValueSchemaBuilder, ValueType};
pub use sampler::{IntervalUnit, SamplingInterval, TimestampSampler};
