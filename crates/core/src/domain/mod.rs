pub mod metadata;
pub mod recommendation;
pub mod stock;
