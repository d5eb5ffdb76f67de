#![forbid(unsafe_code)]

//! Shared primitives for the agg80211 workspace: peer addresses, access
//! categories, configuration loading and the statistics sink consumed by the
//! link-layer engine.

pub mod address;
pub mod category;
pub mod config;
pub mod error;
pub mod stats;

pub use address::MacAddress;
pub use category::AccessCategory;
pub use config::{AggConfig, AggregationConfig, BlockAckConfig, QueueConfig};
pub use error::{CoreError, CoreResult};
pub use stats::{NoopStats, StatsSink};
