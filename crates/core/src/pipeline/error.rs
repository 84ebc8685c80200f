use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Stage 1 produced no usable stock list; the run cannot continue.
    StockListUnavailable { reason: String },
    /// Another run holds the run lock.
    AlreadyRunning,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::StockListUnavailable { reason } => {
                write!(f, "stock list unavailable: {reason}")
            }
            PipelineError::AlreadyRunning => f.write_str("a data collection run is already in progress"),
        }
    }
}

impl std::error::Error for PipelineError {}
