//! PDF stream filters
//!
//! Decodes stream payloads according to ISO 32000-1 Section 7.4. The
//! pipeline is purely functional: bytes in, bytes out, no state carried
//! between calls. Encoding counterparts exist for the filters writing
//! collaborators use.

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::warn;
use weezl::{decode as lzw_decode, BitOrder};

/// Filters this pipeline can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    FlateDecode,
    LZWDecode,
    ASCIIHexDecode,
    ASCII85Decode,
    RunLengthDecode,
}

impl Filter {
    /// Map a /Filter name to a filter, or an unsupported-feature error
    pub fn from_name(name: &str) -> ParseResult<Self> {
        match name {
            "FlateDecode" | "Fl" => Ok(Filter::FlateDecode),
            "LZWDecode" | "LZW" => Ok(Filter::LZWDecode),
            "ASCIIHexDecode" | "AHx" => Ok(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Ok(Filter::ASCII85Decode),
            "RunLengthDecode" | "RL" => Ok(Filter::RunLengthDecode),
            other => Err(ParseError::UnsupportedFeature(format!(
                "filter /{other}"
            ))),
        }
    }
}

/// Sample layout parameters for predictor reversal
#[derive(Debug, Clone)]
struct PredictorParams {
    predictor: i64,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
}

impl PredictorParams {
    fn from_parms(parms: Option<&PdfDictionary>) -> Self {
        let int = |key: &str, default: i64| {
            parms
                .and_then(|d| d.get(key))
                .and_then(PdfObject::as_integer)
                .unwrap_or(default)
        };
        Self {
            predictor: int("Predictor", 1),
            colors: int("Colors", 1).max(1) as usize,
            bits_per_component: int("BitsPerComponent", 8).max(1) as usize,
            columns: int("Columns", 1).max(1) as usize,
        }
    }

    /// Bytes of sample data per row, excluding any tag byte
    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per sample, at least one
    fn sample_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Decode a stream payload through its declared filter chain
///
/// `/Filter` may be a single name or an array of names applied left to
/// right; `/DecodeParms` matches it element-wise.
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None => return Ok(data.to_vec()),
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => {
            let mut names = Vec::with_capacity(array.len());
            for obj in array.iter() {
                match obj.as_name() {
                    Some(name) => names.push(name.as_str()),
                    None => {
                        return Err(ParseError::InvalidObject(
                            "non-name entry in /Filter array".to_string(),
                        ))
                    }
                }
            }
            names
        }
        Some(other) => {
            return Err(ParseError::InvalidObject(format!(
                "/Filter must be a name or array, found {}",
                super::objects::type_name(other)
            )))
        }
    };

    let parms: Vec<Option<&PdfDictionary>> = match dict.get("DecodeParms") {
        None => vec![None; filters.len()],
        Some(PdfObject::Dictionary(d)) => {
            let mut v = vec![None; filters.len()];
            if !v.is_empty() {
                v[0] = Some(d);
            }
            v
        }
        Some(PdfObject::Array(array)) => {
            let mut v = Vec::with_capacity(filters.len());
            for i in 0..filters.len() {
                v.push(match array.get(i) {
                    Some(PdfObject::Dictionary(d)) => Some(d),
                    _ => None,
                });
            }
            v
        }
        Some(other) => {
            warn!(
                "/DecodeParms has unusable type {}, ignoring",
                super::objects::type_name(other)
            );
            vec![None; filters.len()]
        }
    };

    let mut result = data.to_vec();
    for (name, parms) in filters.iter().zip(parms) {
        let filter = Filter::from_name(name)?;
        result = apply_filter(&result, filter, parms)?;
    }
    Ok(result)
}

/// Apply one filter, including any declared predictor reversal
pub fn apply_filter(
    data: &[u8],
    filter: Filter,
    parms: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    let decoded = match filter {
        Filter::FlateDecode => decode_flate(data)?,
        Filter::LZWDecode => decode_lzw(data, parms)?,
        Filter::ASCIIHexDecode => decode_ascii_hex(data)?,
        Filter::ASCII85Decode => decode_ascii85(data)?,
        Filter::RunLengthDecode => decode_run_length(data)?,
    };

    // Predictors apply to the compression filters only
    if matches!(filter, Filter::FlateDecode | Filter::LZWDecode) {
        let params = PredictorParams::from_parms(parms);
        if params.predictor != 1 {
            return undo_predictor(&decoded, &params);
        }
    }
    Ok(decoded)
}

/// FlateDecode: zlib inflate
pub fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| ParseError::CorruptedFile(format!("flate stream: {e}")))?;
    Ok(result)
}

/// FlateDecode encoding counterpart
pub fn encode_flate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail
    encoder.write_all(data).expect("in-memory deflate");
    encoder.finish().expect("in-memory deflate")
}

/// LZWDecode, PDF variant: MSB-first 8-bit codes, /EarlyChange default 1
fn decode_lzw(data: &[u8], parms: Option<&PdfDictionary>) -> ParseResult<Vec<u8>> {
    let early_change = parms
        .and_then(|d| d.get("EarlyChange"))
        .and_then(PdfObject::as_integer)
        .unwrap_or(1);

    let mut decoder = if early_change != 0 {
        lzw_decode::Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        lzw_decode::Decoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| ParseError::CorruptedFile(format!("LZW stream: {e}")))
}

/// ASCIIHexDecode: hex pairs, whitespace ignored, `>` terminates, an odd
/// trailing digit is padded with 0
pub fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &b in data {
        if b == b'>' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        let value = match b {
            b'0'..=b'9' => b - b'0',
            b'A'..=b'F' => b - b'A' + 10,
            b'a'..=b'f' => b - b'a' + 10,
            _ => {
                return Err(ParseError::CorruptedFile(format!(
                    "invalid hex digit 0x{b:02X} in ASCIIHex stream"
                )))
            }
        };
        match high.take() {
            None => high = Some(value),
            Some(h) => result.push((h << 4) | value),
        }
    }
    if let Some(h) = high {
        result.push(h << 4);
    }
    Ok(result)
}

/// ASCIIHexDecode encoding counterpart
pub fn encode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for b in data {
        out.extend_from_slice(format!("{b:02X}").as_bytes());
    }
    out.push(b'>');
    out
}

/// ASCII85Decode: groups of five characters `!`..`u` encode four bytes,
/// `z` encodes four zero bytes, `~>` terminates
pub fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut group = [0u8; 5];
    let mut group_len = 0usize;

    let filtered: Vec<u8> = data
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .copied()
        .collect();
    // Optional <~ prefix
    let stripped = filtered.strip_prefix(b"<~".as_slice()).unwrap_or(&filtered);
    let mut bytes = stripped.iter().copied();

    while let Some(b) = bytes.next() {
        match b {
            b'~' => {
                if bytes.next() != Some(b'>') {
                    return Err(ParseError::CorruptedFile(
                        "ASCII85 stream: bad end marker".to_string(),
                    ));
                }
                break;
            }
            b'z' if group_len == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[group_len] = b - b'!';
                group_len += 1;
                if group_len == 5 {
                    push_base85_group(&group, 5, &mut result);
                    group_len = 0;
                }
            }
            _ => {
                return Err(ParseError::CorruptedFile(format!(
                    "ASCII85 stream: invalid byte 0x{b:02X}"
                )))
            }
        }
    }

    if group_len == 1 {
        return Err(ParseError::CorruptedFile(
            "ASCII85 stream: dangling single character".to_string(),
        ));
    }
    if group_len > 1 {
        // Pad with 'u' and keep one byte fewer than characters present
        for slot in group.iter_mut().skip(group_len) {
            *slot = 84;
        }
        push_base85_group(&group, group_len, &mut result);
    }
    Ok(result)
}

fn push_base85_group(group: &[u8; 5], chars: usize, out: &mut Vec<u8>) {
    let mut value = 0u32;
    for &digit in group {
        value = value.wrapping_mul(85).wrapping_add(u32::from(digit));
    }
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[..chars - 1]);
}

/// ASCII85Decode encoding counterpart
pub fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 2);
    for chunk in data.chunks(4) {
        let mut quad = [0u8; 4];
        quad[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(quad);

        if chunk.len() == 4 && value == 0 {
            out.push(b'z');
            continue;
        }
        let mut digits = [0u8; 5];
        for d in digits.iter_mut().rev() {
            *d = (value % 85) as u8 + b'!';
            value /= 85;
        }
        out.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

/// RunLengthDecode: length byte < 128 copies the next length+1 bytes,
/// length byte > 128 repeats the next byte 257-length times, 128 ends
pub fn decode_run_length(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        let control = data[i];
        i += 1;
        match control {
            128 => return Ok(result),
            0..=127 => {
                let count = usize::from(control) + 1;
                if i + count > data.len() {
                    return Err(ParseError::CorruptedFile(
                        "run-length stream truncated in literal run".to_string(),
                    ));
                }
                result.extend_from_slice(&data[i..i + count]);
                i += count;
            }
            129..=255 => {
                let count = 257 - usize::from(control);
                let byte = *data.get(i).ok_or_else(|| {
                    ParseError::CorruptedFile(
                        "run-length stream truncated in repeat run".to_string(),
                    )
                })?;
                i += 1;
                result.extend(std::iter::repeat(byte).take(count));
            }
        }
    }
    // Missing EOD is tolerated at end of data
    Ok(result)
}

/// RunLengthDecode encoding counterpart
pub fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        // Length of the run of identical bytes starting here
        let mut run = 1usize;
        while run < 128 && i + run < data.len() && data[i + run] == data[i] {
            run += 1;
        }
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }
        // Literal run up to the next repeat of length >= 2
        let start = i;
        i += 1;
        while i - start < 128
            && i < data.len()
            && !(i + 1 < data.len() && data[i + 1] == data[i])
        {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out.push(128);
    out
}

/// Reverse a /Predictor transform (TIFF 2 or PNG 10-15)
fn undo_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    match params.predictor {
        2 => undo_tiff_predictor(data, params),
        10..=15 => undo_png_predictor(data, params),
        other => Err(ParseError::UnsupportedFeature(format!(
            "predictor {other}"
        ))),
    }
}

fn undo_tiff_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(ParseError::UnsupportedFeature(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_bytes = params.row_bytes();
    if row_bytes == 0 || data.len() % row_bytes != 0 {
        return Err(ParseError::CorruptedFile(format!(
            "predictor data length {} not a multiple of row size {row_bytes}",
            data.len()
        )));
    }

    let colors = params.colors;
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks(row_bytes) {
        let row_start = out.len();
        for (i, &b) in row.iter().enumerate() {
            let left = if i >= colors { out[row_start + i - colors] } else { 0 };
            out.push(b.wrapping_add(left));
        }
    }
    Ok(out)
}

/// PNG predictors: every row carries a tag byte selecting None/Sub/Up/
/// Average/Paeth, applied against the previous decoded row
fn undo_png_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    let pixel_bytes = params.row_bytes();
    let row_bytes = pixel_bytes + 1;
    if data.len() % row_bytes != 0 {
        return Err(ParseError::CorruptedFile(format!(
            "predictor data length {} not a multiple of row size {row_bytes}",
            data.len()
        )));
    }

    let bpp = params.sample_bytes();
    let row_count = data.len() / row_bytes;
    let mut out: Vec<u8> = Vec::with_capacity(row_count * pixel_bytes);

    for row_idx in 0..row_count {
        let row = &data[row_idx * row_bytes..(row_idx + 1) * row_bytes];
        let tag = row[0];
        let encoded = &row[1..];
        let row_start = out.len();

        for (i, &b) in encoded.iter().enumerate() {
            let left = if i >= bpp { out[row_start + i - bpp] } else { 0 };
            let up = if row_idx > 0 {
                out[row_start - pixel_bytes + i]
            } else {
                0
            };
            let up_left = if row_idx > 0 && i >= bpp {
                out[row_start - pixel_bytes + i - bpp]
            } else {
                0
            };

            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => (((u16::from(left)) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(ParseError::CorruptedFile(format!(
                        "invalid PNG predictor tag {other}"
                    )))
                }
            };
            out.push(b.wrapping_add(predicted));
        }
    }
    Ok(out)
}

/// Paeth selection function from the PNG specification
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (i16::from(a), i16::from(b), i16::from(c));
    let p = a + b - c;
    let (pa, pb, pc) = ((p - a).abs(), (p - b).abs(), (p - c).abs());
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::PdfArray;

    fn dict_with_filter(name: &str) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(super::super::PdfName::new(name)));
        dict
    }

    #[test]
    fn test_no_filter_passthrough() {
        let dict = PdfDictionary::new();
        assert_eq!(decode_stream(b"plain", &dict).unwrap(), b"plain");
    }

    #[test]
    fn test_unknown_filter_is_unsupported() {
        let dict = dict_with_filter("JPXDecode");
        assert!(matches!(
            decode_stream(b"x", &dict),
            Err(ParseError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_flate_round_trip() {
        for input in [&b""[..], b"a", b"Hello, compressed world!"] {
            let encoded = encode_flate(input);
            assert_eq!(decode_flate(&encoded).unwrap(), input);
        }
    }

    #[test]
    fn test_flate_garbage_is_corrupted_file() {
        assert!(matches!(
            decode_flate(b"not zlib data"),
            Err(ParseError::CorruptedFile(_))
        ));
    }

    #[test]
    fn test_ascii_hex_round_trip() {
        for input in [&b""[..], b"\x00", b"Hello", &[0u8, 255, 17, 34]] {
            let encoded = encode_ascii_hex(input);
            assert_eq!(decode_ascii_hex(&encoded).unwrap(), input);
        }
    }

    #[test]
    fn test_ascii_hex_odd_digit_padding() {
        assert_eq!(decode_ascii_hex(b"48656C6C6F7>").unwrap(), b"Hello\x70");
        assert_eq!(decode_ascii_hex(b"48 65 6C>").unwrap(), b"Hel");
    }

    #[test]
    fn test_ascii85_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            b"M".to_vec(),
            b"Ma".to_vec(),
            b"Man".to_vec(),
            b"Hello world!".to_vec(),
            vec![0, 0, 0, 0, 1],
            (0u8..=255).collect(),
        ];
        for input in cases {
            let encoded = encode_ascii85(&input);
            assert_eq!(decode_ascii85(&encoded).unwrap(), input, "input {input:?}");
        }
    }

    #[test]
    fn test_ascii85_known_vector() {
        assert_eq!(decode_ascii85(b"87cURD]j7BEbo80~>").unwrap(), b"Hello world!");
        assert_eq!(decode_ascii85(b"z~>").unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_run_length_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            b"a".to_vec(),
            b"aaaaaaa".to_vec(),
            b"abcabcabc".to_vec(),
            vec![7u8; 300],
            (0u8..=255).collect(),
        ];
        for input in cases {
            let encoded = encode_run_length(&input);
            assert_eq!(decode_run_length(&encoded).unwrap(), input, "input {input:?}");
        }
    }

    #[test]
    fn test_run_length_truncated() {
        // Control byte promises 4 literals, only 2 present
        assert!(matches!(
            decode_run_length(&[3, 1, 2]),
            Err(ParseError::CorruptedFile(_))
        ));
    }

    #[test]
    fn test_filter_chain_applied_left_to_right() {
        let payload = b"chained payload";
        let encoded = encode_ascii_hex(&encode_flate(payload));

        let mut dict = PdfDictionary::new();
        let mut filters = PdfArray::new();
        filters.push(PdfObject::Name(super::super::PdfName::new("ASCIIHexDecode")));
        filters.push(PdfObject::Name(super::super::PdfName::new("FlateDecode")));
        dict.insert("Filter", PdfObject::Array(filters));

        assert_eq!(decode_stream(&encoded, &dict).unwrap(), payload);
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of five columns, tag 2 (Up) on both
        let encoded = vec![2, 10, 20, 30, 40, 50, 2, 5, 5, 5, 5, 5];
        let params = PredictorParams {
            predictor: 12,
            colors: 1,
            bits_per_component: 8,
            columns: 5,
        };
        let decoded = undo_png_predictor(&encoded, &params).unwrap();
        assert_eq!(decoded, vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]);
    }

    #[test]
    fn test_png_predictor_through_flate() {
        // The common xref-stream encoding: flate over PNG-Up rows
        let rows = vec![2u8, 1, 0, 0, 16, 2, 0, 0, 0, 10];
        let compressed = encode_flate(&rows);

        let mut dict = dict_with_filter("FlateDecode");
        let mut parms = PdfDictionary::new();
        parms.insert("Predictor", PdfObject::Integer(12));
        parms.insert("Columns", PdfObject::Integer(4));
        dict.insert("DecodeParms", PdfObject::Dictionary(parms));

        let decoded = decode_stream(&compressed, &dict).unwrap();
        assert_eq!(decoded, vec![1, 0, 0, 16, 1, 0, 0, 26]);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = PredictorParams {
            predictor: 2,
            colors: 1,
            bits_per_component: 8,
            columns: 4,
        };
        // Deltas 10, +1, +1, +1 per row
        let decoded = undo_tiff_predictor(&[10, 1, 1, 1], &params).unwrap();
        assert_eq!(decoded, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_predictor_bad_row_size() {
        let params = PredictorParams {
            predictor: 12,
            colors: 1,
            bits_per_component: 8,
            columns: 4,
        };
        assert!(matches!(
            undo_png_predictor(&[2, 1, 2], &params),
            Err(ParseError::CorruptedFile(_))
        ));
    }
}
