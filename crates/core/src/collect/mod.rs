pub mod recommendations;

pub use recommendations::{RecommendationCollector, RecommendationKind};
