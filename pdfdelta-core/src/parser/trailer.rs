//! PDF trailer dictionaries
//!
//! Each cross-reference section carries a trailer per ISO 32000-1 Section
//! 7.5.5; in cross-reference streams the stream dictionary doubles as the
//! trailer.

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

/// A trailer dictionary together with the byte offset of the xref section
/// it terminates
#[derive(Debug, Clone)]
pub struct PdfTrailer {
    pub dict: PdfDictionary,
    /// Byte offset of this trailer's xref section
    pub xref_offset: u64,
}

impl PdfTrailer {
    pub fn new(dict: PdfDictionary, xref_offset: u64) -> Self {
        Self { dict, xref_offset }
    }

    /// Number of entries the xref table claims (`/Size`)
    pub fn size(&self) -> ParseResult<i64> {
        self.dict
            .get("Size")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| ParseError::MissingKey("Size".to_string()))
    }

    /// Reference to the document catalog (`/Root`)
    pub fn root(&self) -> ParseResult<(u32, u16)> {
        self.dict
            .get("Root")
            .and_then(PdfObject::as_reference)
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    /// Reference to the document information dictionary, if any
    pub fn info(&self) -> Option<(u32, u16)> {
        self.dict.get("Info").and_then(PdfObject::as_reference)
    }

    /// Byte offset of the next-older xref section, if any
    pub fn prev(&self) -> Option<u64> {
        self.dict
            .get("Prev")
            .and_then(PdfObject::as_integer)
            .and_then(|i| u64::try_from(i).ok())
    }

    /// Offset of the supplementary cross-reference stream in hybrid files
    pub fn xref_stm(&self) -> Option<u64> {
        self.dict
            .get("XRefStm")
            .and_then(PdfObject::as_integer)
            .and_then(|i| u64::try_from(i).ok())
    }

    /// Whether the document declares encryption
    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// The /ID array, if present
    pub fn id(&self) -> Option<&PdfObject> {
        self.dict.get("ID")
    }

    /// Validate the keys every usable trailer needs
    pub fn validate(&self) -> ParseResult<()> {
        self.size()?;
        self.root()?;
        Ok(())
    }

    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::PdfString;

    fn base_dict() -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Size", PdfObject::Integer(100));
        dict.insert("Root", PdfObject::Reference(1, 0));
        dict
    }

    #[test]
    fn test_trailer_required_keys() {
        let trailer = PdfTrailer::new(base_dict(), 1234);
        assert_eq!(trailer.size().unwrap(), 100);
        assert_eq!(trailer.root().unwrap(), (1, 0));
        assert!(trailer.validate().is_ok());
        assert!(trailer.info().is_none());
        assert!(trailer.prev().is_none());
        assert!(!trailer.is_encrypted());
    }

    #[test]
    fn test_trailer_missing_root() {
        let mut dict = PdfDictionary::new();
        dict.insert("Size", PdfObject::Integer(10));
        let trailer = PdfTrailer::new(dict, 0);
        match trailer.root() {
            Err(ParseError::MissingKey(key)) => assert_eq!(key, "Root"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
        assert!(trailer.validate().is_err());
    }

    #[test]
    fn test_trailer_chain_keys() {
        let mut dict = base_dict();
        dict.insert("Prev", PdfObject::Integer(5000));
        dict.insert("XRefStm", PdfObject::Integer(4200));
        dict.insert("Info", PdfObject::Reference(2, 0));
        let trailer = PdfTrailer::new(dict, 9999);

        assert_eq!(trailer.prev(), Some(5000));
        assert_eq!(trailer.xref_stm(), Some(4200));
        assert_eq!(trailer.info(), Some((2, 0)));
        assert_eq!(trailer.xref_offset, 9999);
    }

    #[test]
    fn test_trailer_prev_must_be_integer() {
        let mut dict = base_dict();
        dict.insert("Prev", PdfObject::Real(5000.0));
        let trailer = PdfTrailer::new(dict, 0);
        assert_eq!(trailer.prev(), None);
    }

    #[test]
    fn test_trailer_encryption_flag() {
        let mut dict = base_dict();
        dict.insert("Encrypt", PdfObject::Reference(9, 0));
        dict.insert(
            "ID",
            PdfObject::String(PdfString::new(b"first".to_vec())),
        );
        let trailer = PdfTrailer::new(dict, 0);
        assert!(trailer.is_encrypted());
        assert!(trailer.id().is_some());
    }
}
