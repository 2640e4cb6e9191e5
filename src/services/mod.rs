//! Services for loading, normalizing and aggregating dashboard data

pub mod aggregator;
pub mod cache;
pub mod chart_data;
pub mod data_loader;
pub mod normalizer;

pub use aggregator::Aggregator;
pub use cache::LoadCache;
pub use data_loader::{DataLoaderService, LoadResult};
pub use normalizer::{parse_count, parse_money, parse_period};
