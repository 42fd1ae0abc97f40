//! Feature engineering: indicator math over one symbol's series, and the schema-ordered
//! feature matrix built from it.

pub mod builder;
pub mod indicators;
pub mod schema;

pub use builder::{build_features, FeatureMatrix, FeatureVector};
pub use schema::FeatureSchema;
