pub mod contract;
pub mod price;
pub mod recommendation;
pub mod sentiment;
pub mod signal;
