//! Error types for the Lum toolchain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LumError {
    #[error("Lexer error at {file}:{line}:{col}: {message}")]
    Lexer {
        message: String,
        file: String,
        line: usize,
        col: usize,
    },

    #[error("Parse error: {message} at {file}:{line}:{col}")]
    Parser {
        message: String,
        file: String,
        line: usize,
        col: usize,
    },

    #[error("Module error: {message}")]
    Module { message: String },

    #[error("Type error: {message}")]
    Type { message: String },

    #[error("Runtime error: {message}")]
    Runtime { message: String },

    #[error("Lump error: {message}")]
    Codec { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LumError {
    pub fn lexer(message: impl Into<String>, file: impl Into<String>, line: usize, col: usize) -> Self {
        LumError::Lexer {
            message: message.into(),
            file: file.into(),
            line,
            col,
        }
    }

    pub fn parser(message: impl Into<String>, file: impl Into<String>, line: usize, col: usize) -> Self {
        LumError::Parser {
            message: message.into(),
            file: file.into(),
            line,
            col,
        }
    }

    pub fn module(message: impl Into<String>) -> Self {
        LumError::Module {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        LumError::Type {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        LumError::Runtime {
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        LumError::Codec {
            message: message.into(),
        }
    }
}

/// Result type for Lum operations.
pub type LumResult<T> = Result<T, LumError>;
