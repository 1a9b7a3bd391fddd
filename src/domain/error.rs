//! Domain error types.

use crate::domain::canvas_type::CanvasType;
use crate::domain::path::CanvasPath;

/// A parse error with position information for paths and reference strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Raised by node setters and the builder when an edit cannot be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanvasOperationError {
    #[error("no node found at {path}")]
    NodeNotFound { path: CanvasPath },

    #[error("no child named {name}")]
    ChildNotFound { name: String },

    #[error("cannot convert {from} to {to}")]
    IncompatibleType { from: CanvasType, to: CanvasType },

    #[error("invalid operation: {reason}")]
    Invalid { reason: String },
}

/// Raised by a reactor when a commit cannot produce an update.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReactorError {
    #[error("reactor committed re-entrantly")]
    ReentrantCommit,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("arithmetic error: {reason}")]
    Arithmetic { reason: String },

    #[error("order error: {reason}")]
    Order { reason: String },

    #[error("market data error: {reason}")]
    MarketData { reason: String },

    #[error("file error: {reason}")]
    File { reason: String },

    #[error("translation error: {reason}")]
    Translation { reason: String },
}

/// Top-level error type for tradecanvas.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    PathParse(#[from] ParseError),

    #[error(transparent)]
    Operation(#[from] CanvasOperationError),

    #[error("program has {count} validation error(s)")]
    Validation { count: usize },

    #[error("translation failed at {path}: {reason}")]
    Translation { path: CanvasPath, reason: String },

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error("order execution error: {reason}")]
    OrderExecution { reason: String },

    #[error("no market data for {security}")]
    NoMarketData { security: String },

    #[error("market data error: {reason}")]
    MarketData { reason: String },

    #[error("catalog entry error: {reason}")]
    Catalog { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CanvasError {
    pub(crate) fn translation(path: &CanvasPath, reason: impl Into<String>) -> Self {
        CanvasError::Translation {
            path: path.clone(),
            reason: reason.into(),
        }
    }
}

impl From<&CanvasError> for std::process::ExitCode {
    fn from(err: &CanvasError) -> Self {
        let code: u8 = match err {
            CanvasError::Io(_) => 1,
            CanvasError::ConfigParse { .. }
            | CanvasError::ConfigMissing { .. }
            | CanvasError::ConfigInvalid { .. } => 2,
            CanvasError::Json(_) | CanvasError::Catalog { .. } => 3,
            CanvasError::PathParse(_)
            | CanvasError::Operation(_)
            | CanvasError::Validation { .. } => 4,
            CanvasError::Translation { .. } | CanvasError::Reactor(_) => 5,
            CanvasError::OrderExecution { .. }
            | CanvasError::NoMarketData { .. }
            | CanvasError::MarketData { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
