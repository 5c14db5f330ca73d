//! Student performance prediction: a heuristic or model-backed prediction
//! engine, fixed-rule recommendations, and the JSON API around them.

pub mod analytics;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod model;
pub mod profiles;
pub mod recommendations;
pub mod store;

pub use error::{EngineError, Result};
pub use features::StudentFeatures;
pub use model::{PerformanceCategory, PredictionEngine, PredictionResult, Strategy};
pub use recommendations::{generate, Priority, Recommendation};
