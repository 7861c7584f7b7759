//! PDF header parsing
//!
//! The file must open with `%PDF-<major>.<minor>` per ISO 32000-1
//! Section 7.5.2; an optional binary-marker comment line follows it.

use super::{ParseError, ParseResult};
use std::fmt;

/// PDF version from the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfHeader {
    pub version: PdfVersion,
}

impl PdfHeader {
    /// Parse the header at the start of the buffer
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        const MAGIC: &[u8] = b"%PDF-";

        if data.len() < MAGIC.len() + 3 || !data.starts_with(MAGIC) {
            return Err(ParseError::InvalidHeader);
        }

        let rest = &data[MAGIC.len()..];
        let major = match rest.first() {
            Some(d @ b'0'..=b'9') => d - b'0',
            _ => return Err(ParseError::InvalidHeader),
        };
        if rest.get(1) != Some(&b'.') {
            return Err(ParseError::InvalidHeader);
        }
        let minor = match rest.get(2) {
            Some(d @ b'0'..=b'9') => d - b'0',
            _ => return Err(ParseError::InvalidHeader),
        };

        Ok(Self {
            version: PdfVersion { major, minor },
        })
    }
}
