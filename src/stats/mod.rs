//! Statistics

pub mod metrics;

pub use metrics::ConnectionStats;
