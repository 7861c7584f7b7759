//! Xref rebuild by linear scan
//!
//! A best-effort fallback for files whose declared cross-reference chain is
//! unusable: sweep the buffer for `<num> <gen> obj` headers, keep the last
//! definition of each object number, and recover a trailer either from a
//! surviving `trailer` dictionary or by locating the catalog. Engaged only
//! when explicitly requested through `ParseOptions::repair()`.

use super::lexer::{is_whitespace, Lexer, Token};
use super::object_stream::ObjectStream;
use super::objects::PdfObject;
use super::trailer::PdfTrailer;
use super::xref::{SectionKind, XRefEntry, XRefSection, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Rebuild a merged xref table by scanning the whole buffer
pub fn rebuild_xref(data: &[u8], options: &ParseOptions) -> ParseResult<XRefTable> {
    let mut entries: HashMap<u32, XRefEntry> = HashMap::new();
    let mut catalog_ref: Option<(u32, u16)> = None;
    let mut containers: Vec<(u32, ObjectStream)> = Vec::new();

    let mut lenient = options.clone();
    lenient.lenient_streams = true;

    let mut pos = 0usize;
    while pos + 3 <= data.len() {
        if &data[pos..pos + 3] != b"obj" || !is_boundary(data, pos + 3) {
            pos += 1;
            continue;
        }
        let Some((num, gen, header_start)) = backtrack_header(data, pos) else {
            pos += 1;
            continue;
        };

        // The header only counts if a parsable value follows it
        let mut lexer = Lexer::new_at(data, pos + 3);
        match PdfObject::parse_with_options(&mut lexer, &lenient) {
            Ok(obj) => {
                debug!("scan found object {num} {gen} at offset {header_start}");
                // Later definitions shadow earlier ones
                entries.insert(
                    num,
                    XRefEntry::InUse {
                        offset: header_start as u64,
                        generation: gen,
                    },
                );

                if obj.as_dict().and_then(|d| d.get_type()) == Some("Catalog") {
                    catalog_ref = Some((num, gen));
                }
                if let Some(stream) = obj.as_stream() {
                    if stream.dict.get_type() == Some("ObjStm") {
                        match ObjectStream::parse(stream) {
                            Ok(container) => containers.push((num, container)),
                            Err(err) => {
                                warn!("scan skips object stream {num}: {err}");
                            }
                        }
                    }
                }
                pos = lexer.pos();
            }
            Err(_) => pos += 3,
        }
    }

    if entries.is_empty() {
        return Err(ParseError::InvalidXref(
            "scan found no indirect objects".to_string(),
        ));
    }

    // Objects packed in recovered containers, unless a direct definition won
    for (container_num, container) in &containers {
        for (index, packed_num) in container.object_numbers().enumerate() {
            entries.entry(packed_num).or_insert(XRefEntry::Compressed {
                stream_object_number: *container_num,
                index_within_stream: index as u32,
            });
        }
    }

    let trailer_dict = recover_trailer(data, options)
        .or_else(|| synthesize_trailer(&entries, catalog_ref))
        .ok_or_else(|| {
            ParseError::InvalidXref(
                "scan recovered objects but neither a trailer nor a catalog".to_string(),
            )
        })?;

    warn!("rebuilt xref table with {} entries", entries.len());
    let section = XRefSection {
        entries,
        trailer: PdfTrailer::new(trailer_dict, 0),
        offset: 0,
        kind: SectionKind::Rebuilt,
    };
    Ok(XRefTable::from_sections(vec![section]))
}

/// True when the byte at `at` separates a keyword from what follows
fn is_boundary(data: &[u8], at: usize) -> bool {
    match data.get(at) {
        None => true,
        Some(&b) => is_whitespace(b) || super::lexer::is_delimiter(b),
    }
}

/// Walk backwards from an `obj` keyword over `<num> <gen> `, returning the
/// numbers and the offset where the header starts
fn backtrack_header(data: &[u8], obj_pos: usize) -> Option<(u32, u16, usize)> {
    let mut i = obj_pos;

    let skip_ws_back = |i: &mut usize| {
        let mut seen = false;
        while *i > 0 && is_whitespace(data[*i - 1]) {
            *i -= 1;
            seen = true;
        }
        seen
    };
    let digits_back = |i: &mut usize| -> Option<u64> {
        let end = *i;
        while *i > 0 && data[*i - 1].is_ascii_digit() {
            *i -= 1;
        }
        if *i == end {
            return None;
        }
        std::str::from_utf8(&data[*i..end]).ok()?.parse().ok()
    };

    if !skip_ws_back(&mut i) {
        return None;
    }
    let gen = digits_back(&mut i)?;
    if !skip_ws_back(&mut i) {
        return None;
    }
    let num = digits_back(&mut i)?;
    // The header must not continue a longer number
    if i > 0 && data[i - 1].is_ascii_digit() {
        return None;
    }

    let num = u32::try_from(num).ok()?;
    let gen = u16::try_from(gen).ok()?;
    Some((num, gen, i))
}

/// The last `trailer` dictionary in the buffer that parses and names a root
fn recover_trailer(data: &[u8], options: &ParseOptions) -> Option<super::PdfDictionary> {
    const KEYWORD: &[u8] = b"trailer";
    let mut search_end = data.len();

    while let Some(found) = data[..search_end]
        .windows(KEYWORD.len())
        .rposition(|w| w == KEYWORD)
    {
        search_end = found;

        let mut lexer = Lexer::new_at(data, found);
        if lexer.next_token().ok()? != Token::Trailer {
            continue;
        }
        if let Ok(PdfObject::Dictionary(dict)) = PdfObject::parse_with_options(&mut lexer, options)
        {
            if dict.contains_key("Root") {
                return Some(dict);
            }
        }
        if found == 0 {
            break;
        }
    }
    None
}

/// Build a minimal trailer around a located catalog
fn synthesize_trailer(
    entries: &HashMap<u32, XRefEntry>,
    catalog_ref: Option<(u32, u16)>,
) -> Option<super::PdfDictionary> {
    let (num, gen) = catalog_ref?;
    let size = entries.keys().max().map_or(1, |max| max + 1);

    let mut dict = super::PdfDictionary::new();
    dict.insert("Size", PdfObject::Integer(i64::from(size)));
    dict.insert("Root", PdfObject::Reference(num, gen));
    Some(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document::PdfDocument;

    /// A one-page file whose startxref points nowhere useful
    fn broken_pdf() -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");
        pdf.extend_from_slice(
            b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n",
        );
        pdf.extend_from_slice(b"startxref\n999999\n%%EOF\n");
        pdf
    }

    #[test]
    fn test_rebuild_from_scan() {
        let table = rebuild_xref(&broken_pdf(), &ParseOptions::repair()).unwrap();
        assert_eq!(table.len(), 3);
        assert!(matches!(
            table.get_entry(1),
            Some(XRefEntry::InUse { .. })
        ));
        assert_eq!(table.trailer().unwrap().root().unwrap(), (1, 0));
        assert_eq!(table.sections()[0].kind, SectionKind::Rebuilt);
    }

    #[test]
    fn test_repair_must_be_requested() {
        let result = PdfDocument::from_bytes(broken_pdf());
        assert!(result.is_err());

        let doc =
            PdfDocument::from_bytes_with_options(broken_pdf(), ParseOptions::repair()).unwrap();
        assert_eq!(doc.page_count().unwrap(), 1);
    }

    #[test]
    fn test_later_definition_shadows_earlier() {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        pdf.extend_from_slice(b"4 0 obj\n(old value)\nendobj\n");
        let newer_offset = pdf.len();
        pdf.extend_from_slice(b"4 0 obj\n(new value)\nendobj\n");

        let table = rebuild_xref(&pdf, &ParseOptions::repair()).unwrap();
        assert_eq!(
            table.get_entry(4),
            Some(&XRefEntry::InUse {
                offset: newer_offset as u64,
                generation: 0
            })
        );
    }

    #[test]
    fn test_scan_without_objects_fails() {
        let result = rebuild_xref(b"%PDF-1.4\nnothing here\n", &ParseOptions::repair());
        assert!(matches!(result, Err(ParseError::InvalidXref(_))));
    }

    #[test]
    fn test_backtrack_header() {
        let data = b"xx 12 0 obj";
        assert_eq!(backtrack_header(data, 8), Some((12, 0, 3)));
        // No generation number before obj
        assert_eq!(backtrack_header(b"obj", 0), None);
    }
}
