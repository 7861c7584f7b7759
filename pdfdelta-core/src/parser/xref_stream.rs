//! Cross-reference streams (PDF 1.5+)
//!
//! A cross-reference stream is an indirect stream object with /Type /XRef
//! whose decoded body is a run of fixed-width binary records described by
//! /W, covering the object-number ranges listed in /Index
//! (ISO 32000-1 Section 7.5.8). Record types: 0 = free, 1 = in file,
//! 2 = compressed into an object stream.

use super::lexer::Lexer;
use super::objects::PdfObject;
use super::trailer::PdfTrailer;
use super::xref::{SectionKind, XRefEntry, XRefSection};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Parse the cross-reference stream section at `offset`
pub fn parse_stream_section(
    data: &[u8],
    offset: u64,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&o| o < data.len())
        .ok_or_else(|| {
            ParseError::InvalidXref(format!("xref stream offset {offset} outside buffer"))
        })?;

    let mut lexer = Lexer::new_at(data, start);
    let ((num, gen), obj) = PdfObject::parse_indirect(&mut lexer, options)
        .map_err(|e| ParseError::InvalidXref(format!("xref stream object: {e}")))?;

    let stream = match obj.as_stream() {
        Some(s) => s,
        None => {
            return Err(ParseError::InvalidXref(format!(
                "object {num} {gen} at offset {offset} is not a stream"
            )))
        }
    };
    if stream.dict.get_type() != Some("XRef") {
        return Err(ParseError::InvalidXref(format!(
            "stream at offset {offset} is not /Type /XRef"
        )));
    }

    let entries = decode_entries(stream)?;
    debug!(
        "xref stream {num} {gen} at {offset} with {} entries",
        entries.len()
    );

    Ok(XRefSection {
        entries,
        trailer: PdfTrailer::new(stream.dict.clone(), offset),
        offset,
        kind: SectionKind::Stream,
    })
}

/// Decode the fixed-width records of an xref stream body
pub fn decode_entries(
    stream: &super::objects::PdfStream,
) -> ParseResult<HashMap<u32, XRefEntry>> {
    let dict = &stream.dict;

    let widths = field_widths(dict)?;
    let index = index_ranges(dict)?;
    let body = stream.decode()?;

    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(ParseError::InvalidXref("/W declares zero-width records".to_string()));
    }
    let expected: usize = index.iter().map(|&(_, count)| count as usize).sum();
    if body.len() < expected * record_len {
        return Err(ParseError::InvalidXref(format!(
            "xref stream body holds {} bytes, {} records of {} bytes declared",
            body.len(),
            expected,
            record_len
        )));
    }

    let mut entries = HashMap::with_capacity(expected);
    let mut cursor = 0usize;

    for (first, count) in index {
        for i in 0..count {
            let num = first + i;
            let record = &body[cursor..cursor + record_len];
            cursor += record_len;

            let mut fields = [0u64; 3];
            let mut at = 0usize;
            for (slot, &width) in fields.iter_mut().zip(&widths) {
                *slot = read_field(&record[at..at + width]);
                at += width;
            }

            // A zero-width first field defaults the record type to 1
            let entry_type = if widths[0] == 0 { 1 } else { fields[0] };
            let entry = match entry_type {
                0 => XRefEntry::Free {
                    next_free_object: fields[1] as u32,
                    generation: fields[2] as u16,
                },
                1 => XRefEntry::InUse {
                    offset: fields[1],
                    generation: fields[2] as u16,
                },
                2 => XRefEntry::Compressed {
                    stream_object_number: fields[1] as u32,
                    index_within_stream: fields[2] as u32,
                },
                other => {
                    // ISO 32000 reserves other types; readers treat them as free
                    warn!("unknown xref record type {other} for object {num}");
                    XRefEntry::Free {
                        next_free_object: 0,
                        generation: 0,
                    }
                }
            };
            entries.insert(num, entry);
        }
    }

    Ok(entries)
}

/// /W: three field byte-widths
fn field_widths(dict: &super::objects::PdfDictionary) -> ParseResult<Vec<usize>> {
    let array = dict
        .get("W")
        .and_then(PdfObject::as_array)
        .ok_or_else(|| ParseError::MissingKey("W".to_string()))?;

    if array.len() != 3 {
        return Err(ParseError::InvalidXref(format!(
            "/W must have 3 elements, found {}",
            array.len()
        )));
    }

    array
        .iter()
        .map(|obj| {
            obj.as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|&w| w <= 8)
                .ok_or_else(|| {
                    ParseError::InvalidXref("/W entries must be small non-negative integers".to_string())
                })
        })
        .collect()
}

/// /Index: pairs of [first object number, count]; defaults to [0 /Size]
fn index_ranges(dict: &super::objects::PdfDictionary) -> ParseResult<Vec<(u32, u32)>> {
    match dict.get("Index") {
        Some(obj) => {
            let array = obj.as_array().ok_or_else(|| {
                ParseError::InvalidXref("/Index must be an array".to_string())
            })?;
            if array.len() % 2 != 0 {
                return Err(ParseError::InvalidXref(
                    "/Index must hold an even number of integers".to_string(),
                ));
            }
            let mut ranges = Vec::with_capacity(array.len() / 2);
            for pair in array.0.chunks(2) {
                let first = pair[0].as_integer().and_then(|i| u32::try_from(i).ok());
                let count = pair[1].as_integer().and_then(|i| u32::try_from(i).ok());
                match (first, count) {
                    (Some(first), Some(count)) => ranges.push((first, count)),
                    _ => {
                        return Err(ParseError::InvalidXref(
                            "/Index entries must be non-negative integers".to_string(),
                        ))
                    }
                }
            }
            Ok(ranges)
        }
        None => {
            let size = dict
                .get("Size")
                .and_then(PdfObject::as_integer)
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
            Ok(vec![(0, size)])
        }
    }
}

/// Big-endian field of `width` bytes; zero width means value 0
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
