use thiserror::Error;

/// Errors produced by the fuzzer and its components.
#[derive(Error, Debug)]
pub enum FuzzError {
    /// Invalid configuration: empty dictionary, marker/arity mismatch,
    /// iterator with a single dictionary, and similar. Fatal.
    #[error("bad options: {0}")]
    BadOptions(String),

    /// A referenced plugin does not exist in the registry. Fatal.
    #[error("no {category} plugin named '{name}'")]
    NoPlugin { category: &'static str, name: String },

    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    /// Non-fatal; surfaced as an error-kind result and the run continues.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Network failure reported by a dispatcher that does not go through
    /// reqwest (mocks, custom transports).
    #[error("network error: {0}")]
    Network(String),

    /// I/O failure on a payload file or the save sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A scripting plugin failed while enriching a result. Attached to the
    /// result as a warning; the result is still forwarded.
    #[error("plugin '{plugin}' failed: {message}")]
    PluginRuntime { plugin: String, message: String },

    /// Cooperative shutdown; terminates the result stream after drain.
    #[error("fuzzing was cancelled")]
    Cancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for FuzzError {
    fn from(err: anyhow::Error) -> Self {
        FuzzError::Other(err.to_string())
    }
}

impl From<url::ParseError> for FuzzError {
    fn from(err: url::ParseError) -> Self {
        FuzzError::BadOptions(format!("invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, FuzzError>;
