//! PDF parsing module
//!
//! Implements the lexical, object, and cross-reference layers for reading
//! PDF files according to ISO 32000-1 (PDF 1.7).

pub mod document;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod repair;
#[cfg(test)]
pub(crate) mod test_helpers;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

pub use self::document::PdfDocument;
pub use self::header::{PdfHeader, PdfVersion};
pub use self::lexer::{Lexer, Token};
pub use self::objects::{PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::page_tree::ParsedPage;
pub use self::trailer::PdfTrailer;
pub use self::xref::{XRefEntry, XRefSection, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF parser errors
///
/// Every parse failure reports the byte offset at which it occurred where
/// one is available; offsets refer to the original file buffer.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Lex error at offset {position}: {message}")]
    Lex { position: usize, message: String },

    #[error("Unexpected token at offset {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Unexpected end of file at offset {position}")]
    UnexpectedEof { position: usize },

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Invalid xref: {0}")]
    InvalidXref(String),

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Circular reference detected: {0} {1} R")]
    CircularReference(u32, u16),

    #[error("Missing required key: /{0}")]
    MissingKey(String),

    #[error("Empty file")]
    EmptyFile,
}

impl ParseError {
    /// Shorthand for a lex error at a known offset
    pub(crate) fn lex(position: usize, message: impl Into<String>) -> Self {
        ParseError::Lex {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn unexpected(
        expected: impl Into<String>,
        found: impl Into<String>,
        position: usize,
    ) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            position,
        }
    }
}

/// Maximum recursion depth for reference resolution and nested containers
pub const MAX_RECURSION_DEPTH: usize = 1000;

/// Parsing options
///
/// The defaults parse strictly: malformed structure surfaces immediately as
/// an error. Repair mode must be requested explicitly and only engages when
/// the declared cross-reference data is unusable.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Rebuild the xref table by a linear object scan when the declared
    /// xref chain cannot be parsed
    pub repair_xref: bool,
    /// Tolerate a stream whose scanned payload disagrees with a later
    /// resolved /Length by trailing whitespace only
    pub lenient_streams: bool,
    /// Recursion limit for reference resolution
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            repair_xref: false,
            lenient_streams: true,
            max_depth: MAX_RECURSION_DEPTH,
        }
    }
}

impl ParseOptions {
    /// Strict parsing: no tolerance for malformed structure
    pub fn strict() -> Self {
        Self {
            repair_xref: false,
            lenient_streams: false,
            max_depth: MAX_RECURSION_DEPTH,
        }
    }

    /// Default options plus the linear-scan xref fallback
    pub fn repair() -> Self {
        Self {
            repair_xref: true,
            ..Self::default()
        }
    }
}
