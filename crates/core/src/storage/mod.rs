pub mod history;

pub use history::{HistoryLog, HistoryQuery, HistoryRecord};
