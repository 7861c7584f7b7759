//! # pdfdelta
//!
//! A Rust library for reading PDF files and modifying them through
//! append-only incremental updates.
//!
//! The crate covers the layer every higher-level PDF feature sits on: the
//! object model, the parser, cross-reference resolution across any number
//! of prior saves, and an incremental-update writer that appends changes
//! without touching existing bytes. That append-only discipline is what
//! keeps previously signed byte ranges hash-stable, so sequentially signed
//! documents stay verifiable as more parties sign.
//!
//! ## Reading
//!
//! ```rust,no_run
//! use pdfdelta::{ParseOptions, PdfDocument};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = PdfDocument::open("document.pdf")?;
//! println!("version: {}", doc.version());
//! println!("pages: {}", doc.page_count()?);
//!
//! let page = doc.get_page(0)?;
//! println!("first page: {}x{} points", page.width(), page.height());
//!
//! // Files with a broken xref chain can opt into a scan-based rebuild
//! let salvaged = PdfDocument::open_with_options("damaged.pdf", ParseOptions::repair())?;
//! # let _ = salvaged;
//! # Ok(())
//! # }
//! ```
//!
//! ## Updating
//!
//! ```rust,no_run
//! use pdfdelta::{IncrementalUpdate, PdfDocument, PdfObject, PdfString};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = PdfDocument::open("document.pdf")?;
//!
//! let mut update = IncrementalUpdate::new(&doc);
//! update.set_object(7, &PdfObject::String(PdfString::new(b"new value".to_vec())));
//! let updated = update.write_to_vec()?;
//!
//! // The original file's bytes form an untouched prefix of the output
//! assert_eq!(&updated[..doc.buffer().len()], doc.buffer());
//! std::fs::write("document-updated.pdf", updated)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - lexer, object model, filters, xref resolution, document facade
//! - [`writer`] - object serialization and the incremental-update writer
//! - [`error`] - crate-level error type

pub mod error;
pub mod parser;
pub mod writer;

pub use error::{PdfError, Result};
pub use parser::{
    ParseError, ParseOptions, ParsedPage, PdfArray, PdfDictionary, PdfDocument, PdfName,
    PdfObject, PdfStream, PdfString, PdfTrailer, PdfVersion, XRefEntry, XRefTable,
};
pub use writer::{format_pdf_date, serialize_object, IncrementalUpdate};

/// Current version of pdfdelta
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }
}
