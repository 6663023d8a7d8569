use thiserror::Error;

#[derive(Debug, Error)]
pub enum EscoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing column {column} in {input}")]
    MissingColumn { input: String, column: String },

    #[error("{count} duplicated variant id(s) in {input}; variant ids must be unique per result set")]
    DuplicateVariant { input: String, count: usize },

    #[error("invalid p-value in {input}: {detail}")]
    InvalidPValue { input: String, detail: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EscoreError>;
