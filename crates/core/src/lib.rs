pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod ingest;
pub mod llm;
pub mod model;
pub mod news;
pub mod pipeline;
pub mod segment;
pub mod signal;
pub mod storage;

pub use error::SignalError;
