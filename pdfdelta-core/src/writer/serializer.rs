//! Object serialization
//!
//! Writes `PdfObject` values back into PDF syntax. Serialized output
//! re-parses to an equal object graph, which is what the incremental
//! writer and its callers rely on.

use crate::parser::objects::{PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
use chrono::{DateTime, Utc};

/// Serialize one object value
pub fn serialize_object(obj: &PdfObject) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(obj, &mut out);
    out
}

fn write_object(obj: &PdfObject, out: &mut Vec<u8>) {
    match obj {
        PdfObject::Null => out.extend_from_slice(b"null"),
        PdfObject::Boolean(true) => out.extend_from_slice(b"true"),
        PdfObject::Boolean(false) => out.extend_from_slice(b"false"),
        PdfObject::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        PdfObject::Real(r) => write_real(*r, out),
        PdfObject::String(s) => write_string(s, out),
        PdfObject::Name(n) => write_name(n, out),
        PdfObject::Array(array) => {
            out.push(b'[');
            for (i, element) in array.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(element, out);
            }
            out.push(b']');
        }
        PdfObject::Dictionary(dict) => write_dictionary(dict, out),
        PdfObject::Stream(stream) => write_stream(stream, out),
        PdfObject::Reference(num, gen) => {
            out.extend_from_slice(format!("{num} {gen} R").as_bytes());
        }
    }
}

/// Reals print with up to six fractional digits, trailing zeros trimmed.
/// Whole values keep one fractional digit so they re-parse as reals.
fn write_real(value: f64, out: &mut Vec<u8>) {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        out.extend_from_slice(format!("{value:.1}").as_bytes());
        return;
    }
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    out.extend_from_slice(text.as_bytes());
}

/// Literal string form with delimiters and control bytes escaped
fn write_string(s: &PdfString, out: &mut Vec<u8>) {
    out.push(b'(');
    for &b in s.as_bytes() {
        match b {
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            0x00..=0x1F => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

/// Names escape whitespace, delimiters, `#`, and non-printable bytes as #xx
fn write_name(name: &PdfName, out: &mut Vec<u8>) {
    out.push(b'/');
    for &b in name.as_str().as_bytes() {
        let needs_escape = b == b'#'
            || !(0x21..=0x7E).contains(&b)
            || matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%');
        if needs_escape {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        } else {
            out.push(b);
        }
    }
}

fn write_dictionary(dict: &PdfDictionary, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(key, out);
        out.push(b' ');
        write_object(value, out);
    }
    out.extend_from_slice(b" >>");
}

/// Streams serialize with /Length forced to the actual payload size
fn write_stream(stream: &PdfStream, out: &mut Vec<u8>) {
    let mut dict = stream.dict.clone();
    dict.insert("Length", PdfObject::Integer(stream.data.len() as i64));

    write_dictionary(&dict, out);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(&stream.data);
    out.extend_from_slice(b"\nendstream");
}

/// Format a timestamp as a PDF date string: D:YYYYMMDDHHmmSS+00'00
pub fn format_pdf_date(date: DateTime<Utc>) -> String {
    format!("{}+00'00", date.format("D:%Y%m%d%H%M%S"))
}
