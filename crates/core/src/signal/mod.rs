pub mod combiner;
pub mod sentiment;
pub mod technical;

pub use combiner::{combine, decide, recommend};
pub use technical::{classify, technical_score};
