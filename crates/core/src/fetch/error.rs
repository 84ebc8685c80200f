use std::fmt;

/// Why a single upstream call produced no usable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Non-2xx response other than 404.
    Status { path: String, status: u16 },
    /// DNS, connect, timeout or other transport failure.
    Network { path: String, detail: String },
    /// 2xx response whose body was not JSON.
    Decode { path: String, detail: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status { path, status } => write!(f, "HTTP {status} for {path}"),
            FetchError::Network { path, detail } => {
                write!(f, "request to {path} failed: {detail}")
            }
            FetchError::Decode { path, detail } => {
                write!(f, "response from {path} is not valid JSON: {detail}")
            }
        }
    }
}

impl std::error::Error for FetchError {}
