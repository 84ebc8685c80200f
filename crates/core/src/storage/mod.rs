pub mod json_store;
pub mod publish;

pub use json_store::OutputStore;
