//! Object streams (ObjStm)
//!
//! An object stream packs N indirect objects into one compressed stream
//! (ISO 32000-1 Section 7.5.7). The decoded body opens with N pairs of
//! `<object number> <relative offset>`, followed at /First by the packed
//! objects themselves, written as bare values without obj/endobj wrappers.

use super::lexer::{Lexer, Token};
use super::objects::{PdfObject, PdfStream};
use super::{ParseError, ParseOptions, ParseResult};

/// A parsed object-stream container
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Decoded body bytes
    data: Vec<u8>,
    /// Byte offset of the first packed object within the body
    first: usize,
    /// (object number, offset relative to /First), in pack order
    offsets: Vec<(u32, usize)>,
}

impl ObjectStream {
    /// Parse the header pairs of an object stream
    pub fn parse(stream: &PdfStream) -> ParseResult<Self> {
        if stream.dict.get_type() != Some("ObjStm") {
            return Err(ParseError::InvalidObject(
                "container stream is not /Type /ObjStm".to_string(),
            ));
        }

        let n = stream
            .dict
            .get("N")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;
        let first = stream
            .dict
            .get("First")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;

        let n = usize::try_from(n)
            .map_err(|_| ParseError::InvalidObject(format!("object stream /N {n}")))?;
        let first = usize::try_from(first)
            .map_err(|_| ParseError::InvalidObject(format!("object stream /First {first}")))?;

        let data = stream.decode()?.to_vec();
        if first > data.len() {
            return Err(ParseError::CorruptedFile(format!(
                "object stream /First {first} beyond body of {} bytes",
                data.len()
            )));
        }

        let mut lexer = Lexer::new(&data[..first]);
        let mut offsets = Vec::with_capacity(n);
        for _ in 0..n {
            let num = match lexer.next_token()? {
                Token::Integer(v) if v >= 0 => v as u32,
                other => {
                    return Err(ParseError::InvalidObject(format!(
                        "object stream header: expected object number, found {}",
                        other.kind()
                    )))
                }
            };
            let offset = match lexer.next_token()? {
                Token::Integer(v) if v >= 0 => v as usize,
                other => {
                    return Err(ParseError::InvalidObject(format!(
                        "object stream header: expected offset, found {}",
                        other.kind()
                    )))
                }
            };
            offsets.push((num, offset));
        }

        Ok(Self {
            data,
            first,
            offsets,
        })
    }

    /// Number of packed objects
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Object numbers in pack order
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.iter().map(|&(num, _)| num)
    }

    /// Parse the packed object at `index` (zero-based), returning its
    /// recorded object number and value
    pub fn get(&self, index: u32, options: &ParseOptions) -> ParseResult<(u32, PdfObject)> {
        let &(num, rel_offset) = self.offsets.get(index as usize).ok_or_else(|| {
            ParseError::InvalidObject(format!(
                "object stream holds {} objects, index {index} requested",
                self.offsets.len()
            ))
        })?;

        let at = self.first + rel_offset;
        if at >= self.data.len() {
            return Err(ParseError::CorruptedFile(format!(
                "packed object {num} at offset {at} beyond body"
            )));
        }

        let mut lexer = Lexer::new_at(&self.data, at);
        let obj = PdfObject::parse_with_options(&mut lexer, options)?;
        Ok((num, obj))
    }
}
