pub mod exporter;
pub mod stats;
