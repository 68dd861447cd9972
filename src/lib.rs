pub mod config;
pub mod error;
pub mod executor;
pub mod export;
pub mod features;
pub mod ingest;
pub mod logging;
pub mod records;
pub mod stats_source;
pub mod store;
pub mod teams;
pub mod training;
