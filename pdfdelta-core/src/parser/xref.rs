//! Cross-reference resolution
//!
//! Locates, parses, and chains every cross-reference section of a file into
//! one merged offset table, per ISO 32000-1 Sections 7.5.4 and 7.5.8.
//! Sections come in two on-disk encodings (classic tables and compressed
//! streams); both fold into the same entry type. A file saved N times
//! carries N+1 sections linked newest-to-oldest through /Prev, and a newer
//! section's entry for an object number permanently shadows older ones.

use super::lexer::{is_whitespace, Lexer, Token};
use super::objects::PdfObject;
use super::trailer::PdfTrailer;
use super::xref_stream;
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// One cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object entry
    Free {
        /// Object number of the next free object
        next_free_object: u32,
        /// Generation to use if this number is reused
        generation: u16,
    },
    /// Object stored directly in the file
    InUse {
        /// Byte offset of the object header
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object packed inside an object stream (PDF 1.5+)
    Compressed {
        /// Object number of the containing object stream
        stream_object_number: u32,
        /// Zero-based index within the container
        index_within_stream: u32,
    },
}

impl XRefEntry {
    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }
}

/// On-disk encoding of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Classic `xref` table
    Table,
    /// Cross-reference stream (/Type /XRef)
    Stream,
    /// Classic table with its /XRefStm supplement already merged in
    Hybrid,
    /// Rebuilt by the repair scan; offsets come from the sweep, not a
    /// declared section
    Rebuilt,
}

/// One cross-reference section: the entries of a single save, its trailer,
/// and where it sits in the file
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub entries: HashMap<u32, XRefEntry>,
    pub trailer: PdfTrailer,
    pub offset: u64,
    pub kind: SectionKind,
}

/// The merged cross-reference view of a document
#[derive(Debug, Clone)]
pub struct XRefTable {
    /// Merged entries, newest section winning per object number
    entries: HashMap<u32, XRefEntry>,
    /// All sections, newest first
    sections: Vec<XRefSection>,
}

impl XRefTable {
    /// Locate the last startxref and parse the whole section chain
    pub fn parse(data: &[u8], options: &ParseOptions) -> ParseResult<Self> {
        let (_, first_offset) = locate_startxref(data, data.len())?;
        Self::parse_at(data, first_offset, options)
    }

    /// Parse the section chain starting at a known section offset
    pub fn parse_at(data: &[u8], first_offset: u64, options: &ParseOptions) -> ParseResult<Self> {
        let mut sections = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();
        let mut next = Some(first_offset);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                return Err(ParseError::InvalidXref(format!(
                    "/Prev chain revisits offset {offset}"
                )));
            }
            let mut section = parse_section(data, offset, options)?;

            // Hybrid files: the table's /XRefStm supplement is merged before
            // the /Prev chain continues. Stream entries fill numbers the
            // table leaves free (the objects hidden from pre-1.5 readers).
            if let Some(stm_offset) = section.trailer.xref_stm() {
                if visited.insert(stm_offset) {
                    debug!("merging /XRefStm supplement at offset {stm_offset}");
                    let supplement =
                        xref_stream::parse_stream_section(data, stm_offset, options)?;
                    for (num, entry) in supplement.entries {
                        match section.entries.get(&num) {
                            Some(existing) if existing.is_in_use() => {}
                            _ => {
                                section.entries.insert(num, entry);
                            }
                        }
                    }
                    section.kind = SectionKind::Hybrid;
                } else {
                    warn!("/XRefStm at {stm_offset} already visited, skipping");
                }
            }

            next = section.trailer.prev();
            sections.push(section);
        }

        Ok(Self::from_sections(sections))
    }

    /// Fold sections (ordered newest first) into the merged view;
    /// the first assignment for an object number wins
    pub fn from_sections(sections: Vec<XRefSection>) -> Self {
        let mut entries = HashMap::new();
        for section in &sections {
            for (&num, &entry) in &section.entries {
                entries.entry(num).or_insert(entry);
            }
        }
        debug!(
            "merged {} xref section(s) into {} entries",
            sections.len(),
            entries.len()
        );
        Self { entries, sections }
    }

    /// Entry for an object number in the merged view
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// The newest section's trailer
    pub fn trailer(&self) -> ParseResult<&PdfTrailer> {
        self.sections
            .first()
            .map(|s| &s.trailer)
            .ok_or_else(|| ParseError::InvalidXref("no xref section".to_string()))
    }

    /// All sections, newest first
    pub fn sections(&self) -> &[XRefSection] {
        &self.sections
    }

    /// One past the highest object number in the merged table
    pub fn next_object_id(&self) -> u32 {
        self.entries.keys().max().map_or(1, |max| max + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }
}

/// Find the last `startxref` keyword before `before`, returning the keyword
/// offset and the section offset it announces
pub fn locate_startxref(data: &[u8], before: usize) -> ParseResult<(usize, u64)> {
    const KEYWORD: &[u8] = b"startxref";
    let window = &data[..before.min(data.len())];

    let keyword_offset = window
        .windows(KEYWORD.len())
        .rposition(|w| w == KEYWORD)
        .ok_or_else(|| ParseError::InvalidXref("startxref not found".to_string()))?;

    let mut lexer = Lexer::new_at(data, keyword_offset);
    lexer.expect(&Token::StartXref)?;
    match lexer.next_token()? {
        Token::Integer(offset) if offset >= 0 => Ok((keyword_offset, offset as u64)),
        other => Err(ParseError::InvalidXref(format!(
            "startxref followed by {}, expected integer",
            other.kind()
        ))),
    }
}

/// Parse the section at `offset`, detecting its encoding by the first token
pub fn parse_section(data: &[u8], offset: u64, options: &ParseOptions) -> ParseResult<XRefSection> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&o| o < data.len())
        .ok_or_else(|| {
            ParseError::InvalidXref(format!("section offset {offset} outside buffer"))
        })?;

    let mut lexer = Lexer::new_at(data, start);
    match lexer.peek_token() {
        Ok(Token::Xref) => parse_table_section(data, offset, options),
        _ => xref_stream::parse_stream_section(data, offset, options),
    }
}

/// Parse a classic `xref` table section and its trailer
fn parse_table_section(
    data: &[u8],
    offset: u64,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::new_at(data, offset as usize);
    lexer.expect(&Token::Xref)?;

    let mut entries = HashMap::new();

    loop {
        match lexer.peek_token()? {
            Token::Integer(_) => {
                let (first, count) = parse_subsection_header(&mut lexer)?;
                let mut pos = lexer.pos();
                for i in 0..count {
                    let (field1, field2, flag) = parse_table_entry(data, &mut pos)?;
                    let num = first + i;
                    let entry = match flag {
                        b'n' => XRefEntry::InUse {
                            offset: field1,
                            generation: field2,
                        },
                        b'f' => XRefEntry::Free {
                            next_free_object: field1 as u32,
                            generation: field2,
                        },
                        other => {
                            return Err(ParseError::InvalidXref(format!(
                                "entry flag '{}' for object {num}",
                                other as char
                            )))
                        }
                    };
                    entries.insert(num, entry);
                }
                lexer.seek(pos);
            }
            Token::Trailer => {
                lexer.next_token()?;
                break;
            }
            other => {
                return Err(ParseError::InvalidXref(format!(
                    "expected subsection header or trailer, found {}",
                    other.kind()
                )))
            }
        }
    }

    let trailer_obj = PdfObject::parse_with_options(&mut lexer, options)?;
    let trailer_dict = match trailer_obj {
        PdfObject::Dictionary(d) => d,
        other => {
            return Err(ParseError::InvalidXref(format!(
                "trailer is {}, expected dictionary",
                super::objects::type_name(&other)
            )))
        }
    };

    debug!(
        "classic xref section at {offset} with {} entries",
        entries.len()
    );
    Ok(XRefSection {
        entries,
        trailer: PdfTrailer::new(trailer_dict, offset),
        offset,
        kind: SectionKind::Table,
    })
}

/// `<first-num> <count>` header line of a subsection
fn parse_subsection_header(lexer: &mut Lexer<'_>) -> ParseResult<(u32, u32)> {
    let first = match lexer.next_token()? {
        Token::Integer(n) if n >= 0 => n as u32,
        other => {
            return Err(ParseError::InvalidXref(format!(
                "subsection first-number is {}",
                other.kind()
            )))
        }
    };
    let count = match lexer.next_token()? {
        Token::Integer(n) if n >= 0 => n as u32,
        other => {
            return Err(ParseError::InvalidXref(format!(
                "subsection count is {}",
                other.kind()
            )))
        }
    };
    Ok((first, count))
}

/// One fixed-width entry: ten offset digits, space, five generation digits,
/// space, `n`/`f` flag, two EOL bytes (EOL variants tolerated)
fn parse_table_entry(data: &[u8], pos: &mut usize) -> ParseResult<(u64, u16, u8)> {
    while data.get(*pos).copied().is_some_and(is_whitespace) {
        *pos += 1;
    }

    let field1 = parse_fixed_digits(data, pos, 10)?;
    expect_entry_space(data, pos)?;
    let field2 = parse_fixed_digits(data, pos, 5)?;
    expect_entry_space(data, pos)?;

    let flag = *data
        .get(*pos)
        .ok_or(ParseError::UnexpectedEof { position: *pos })?;
    *pos += 1;

    let generation = u16::try_from(field2)
        .map_err(|_| ParseError::InvalidXref(format!("generation {field2} out of range")))?;
    Ok((field1, generation, flag))
}

fn parse_fixed_digits(data: &[u8], pos: &mut usize, count: usize) -> ParseResult<u64> {
    let end = *pos + count;
    let slice = data
        .get(*pos..end)
        .ok_or(ParseError::UnexpectedEof { position: *pos })?;

    let mut value = 0u64;
    for &b in slice {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidXref(format!(
                "malformed xref entry at offset {}",
                *pos
            )));
        }
        value = value * 10 + u64::from(b - b'0');
    }
    *pos = end;
    Ok(value)
}

fn expect_entry_space(data: &[u8], pos: &mut usize) -> ParseResult<()> {
    match data.get(*pos) {
        Some(b' ') => {
            *pos += 1;
            Ok(())
        }
        Some(_) | None => Err(ParseError::InvalidXref(format!(
            "malformed xref entry at offset {}",
            *pos
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_bytes() -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\nsome body bytes\n".to_vec();
        let xref_offset = pdf.len();
        pdf.extend_from_slice(
            b"xref\n0 3\n0000000000 65535 f \n0000000009 00000 n \n0000000100 00002 n \n\
              trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n",
        );
        pdf.extend_from_slice(xref_offset.to_string().as_bytes());
        pdf.extend_from_slice(b"\n%%EOF\n");
        pdf
    }

    #[test]
    fn test_locate_startxref() {
        let pdf = table_bytes();
        let (_, offset) = locate_startxref(&pdf, pdf.len()).unwrap();
        assert_eq!(offset, 25);
    }

    #[test]
    fn test_parse_classic_table() {
        let pdf = table_bytes();
        let table = XRefTable::parse(&pdf, &ParseOptions::default()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get_entry(0),
            Some(&XRefEntry::Free {
                next_free_object: 0,
                generation: 65535
            })
        );
        assert_eq!(
            table.get_entry(1),
            Some(&XRefEntry::InUse {
                offset: 9,
                generation: 0
            })
        );
        assert_eq!(
            table.get_entry(2),
            Some(&XRefEntry::InUse {
                offset: 100,
                generation: 2
            })
        );
        assert_eq!(table.trailer().unwrap().root().unwrap(), (1, 0));
        assert_eq!(table.next_object_id(), 3);
    }

    #[test]
    fn test_malformed_entry_is_invalid_xref() {
        let pdf = b"xref\n0 1\n00000000xx 65535 f \ntrailer\n<< /Size 1 >>\n";
        let result = parse_section(pdf, 0, &ParseOptions::default());
        assert!(matches!(result, Err(ParseError::InvalidXref(_))));
    }

    #[test]
    fn test_malformed_subsection_header_is_invalid_xref() {
        let pdf = b"xref\n/Name 2\ntrailer\n<< /Size 1 >>\n";
        let result = parse_section(pdf, 0, &ParseOptions::default());
        assert!(matches!(result, Err(ParseError::InvalidXref(_))));
    }

    #[test]
    fn test_prev_cycle_fails() {
        // Two sections whose /Prev entries point at each other
        let mut pdf = Vec::new();
        let a = pdf.len();
        pdf.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev ");
        let b_placeholder = pdf.len();
        pdf.extend_from_slice(b"AAAA >>\n");
        let b = pdf.len();
        pdf.extend_from_slice(
            format!(
                "xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev {a} >>\n"
            )
            .as_bytes(),
        );
        let b_text = format!("{b:04}");
        pdf[b_placeholder..b_placeholder + 4].copy_from_slice(b_text.as_bytes());

        let result = XRefTable::parse_at(&pdf, a as u64, &ParseOptions::default());
        assert!(matches!(result, Err(ParseError::InvalidXref(_))));
    }

    #[test]
    fn test_newer_section_shadows_older() {
        let newer = XRefSection {
            entries: HashMap::from([(
                5,
                XRefEntry::InUse {
                    offset: 900,
                    generation: 0,
                },
            )]),
            trailer: PdfTrailer::new(super::super::PdfDictionary::new(), 1000),
            offset: 1000,
            kind: SectionKind::Table,
        };
        let older = XRefSection {
            entries: HashMap::from([
                (
                    5,
                    XRefEntry::InUse {
                        offset: 100,
                        generation: 0,
                    },
                ),
                (
                    6,
                    XRefEntry::InUse {
                        offset: 200,
                        generation: 0,
                    },
                ),
            ]),
            trailer: PdfTrailer::new(super::super::PdfDictionary::new(), 10),
            offset: 10,
            kind: SectionKind::Table,
        };

        let table = XRefTable::from_sections(vec![newer, older]);
        assert_eq!(
            table.get_entry(5),
            Some(&XRefEntry::InUse {
                offset: 900,
                generation: 0
            })
        );
        assert_eq!(
            table.get_entry(6),
            Some(&XRefEntry::InUse {
                offset: 200,
                generation: 0
            })
        );
        assert_eq!(table.next_object_id(), 7);
    }

    #[test]
    fn test_multiple_subsections() {
        let pdf = b"xref\n0 1\n0000000000 65535 f \n10 2\n0000000111 00000 n \n\
                    0000000222 00000 n \ntrailer\n<< /Size 12 /Root 1 0 R >>\n";
        let section = parse_section(pdf, 0, &ParseOptions::default()).unwrap();
        assert_eq!(section.entries.len(), 3);
        assert!(section.entries.contains_key(&0));
        assert!(section.entries.contains_key(&10));
        assert!(section.entries.contains_key(&11));
        assert_eq!(section.kind, SectionKind::Table);
    }
}
