//! Manifest and chart generation
//!
//! `spec` resolves defaults once; `raw` and `chart` render the result.

pub mod chart;
pub mod raw;
pub mod spec;
pub mod templates;

pub use chart::{ChartBuilder, ChartMetadata, ChartPackage, ChartTemplate};
pub use raw::ManifestGenerator;
pub use spec::WorkloadSpec;
