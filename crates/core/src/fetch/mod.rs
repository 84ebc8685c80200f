pub mod client;
pub mod error;
pub mod pacer;

pub use client::{FetchOutcome, HttpJsonSource, JsonSource};
pub use error::FetchError;
pub use pacer::Pacer;
