pub mod error;
pub mod history;
pub mod lock;
pub mod orchestrator;
pub mod schedule;
pub mod sources;

pub use error::PipelineError;
pub use lock::{RunLock, RunPermit};
pub use orchestrator::{Pipeline, PipelineOptions, RunReport};
pub use schedule::RefreshScheduler;
