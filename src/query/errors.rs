use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid query '{input}' at offset {offset}: {message}")]
    Syntax {
        input: String,
        offset: usize,
        message: String,
    },

    #[error("empty query")]
    Empty,
}
