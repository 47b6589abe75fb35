use orchestrator_core::{AnalysisType, ParseAnalysisTypeError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("stream frame error: {0}")]
    Frame(String),
}

/// Caller mistakes. Expected request failures are reported through
/// `AnalysisError` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    UnknownType(#[from] ParseAnalysisTypeError),
    #[error("{0} has no single endpoint; run it as a comprehensive analysis")]
    Composite(AnalysisType),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream kind: {0}")]
pub struct ParseStreamKindError(pub String);
