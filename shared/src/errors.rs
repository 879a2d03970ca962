//! Shared error types for the suite orchestration workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Invalid identifier: {input}")]
    InvalidId { input: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
