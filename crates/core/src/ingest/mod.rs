pub mod csv_file;
pub mod provider;
pub mod types;

pub use csv_file::CsvPriceProvider;
pub use provider::{HttpJsonPriceProvider, PriceHistoryProvider};
