pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod storage;
pub mod transform;
