pub mod api;
pub mod envelope;
pub mod log;
pub mod metrics;
pub mod query;
