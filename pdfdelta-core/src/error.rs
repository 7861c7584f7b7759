use thiserror::Error;

/// Crate-level error for reading and writing documents
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] crate::parser::ParseError),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;
