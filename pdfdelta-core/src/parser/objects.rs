//! PDF object model and object parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3.
//! Objects form a closed set of variants; indirect references are plain
//! (object number, generation) keys resolved only through a document.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use indexmap::IndexMap;
use std::borrow::Borrow;
use std::cell::OnceCell;
use tracing::warn;

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PdfName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// PDF String object: raw bytes, literal or hex form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        PdfString(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get as UTF-8 text if possible
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.0)
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF Dictionary object
///
/// Keys are unique names; insertion order is preserved so that written
/// output keeps the order in which entries were set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub IndexMap<PdfName, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        PdfDictionary(IndexMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName(key.into()), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, PdfName, PdfObject> {
        self.0.iter()
    }

    /// Value of the /Type key, when present and a name
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name()).map(PdfName::as_str)
    }
}

/// PDF Stream object: dictionary plus raw encoded payload
///
/// Decoded bytes are computed on first access and cached.
#[derive(Debug, Clone)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
    decoded: OnceCell<Vec<u8>>,
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.data == other.data
    }
}

impl PdfStream {
    pub fn new(dict: PdfDictionary, data: Vec<u8>) -> Self {
        Self {
            dict,
            data,
            decoded: OnceCell::new(),
        }
    }

    /// Raw (still encoded) payload bytes
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Decode the payload through the declared filter chain, caching the
    /// result for subsequent calls
    pub fn decode(&self) -> ParseResult<&[u8]> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded);
        }
        let decoded = super::filters::decode_stream(&self.data, &self.dict)?;
        Ok(self.decoded.get_or_init(|| decoded))
    }
}

/// PDF object variants
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    /// Object number, generation number
    Reference(u32, u16),
}

impl PdfObject {
    /// Parse one object from the lexer with default options
    pub fn parse(lexer: &mut Lexer<'_>) -> ParseResult<Self> {
        Self::parse_with_options(lexer, &ParseOptions::default())
    }

    /// Parse one object from the lexer
    pub fn parse_with_options(lexer: &mut Lexer<'_>, options: &ParseOptions) -> ParseResult<Self> {
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token, options, 0)
    }

    fn parse_from_token(
        lexer: &mut Lexer<'_>,
        token: Token,
        options: &ParseOptions,
        depth: usize,
    ) -> ParseResult<Self> {
        if depth > options.max_depth {
            return Err(ParseError::InvalidObject(format!(
                "container nesting exceeds {} levels",
                options.max_depth
            )));
        }

        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::LiteralString(s) | Token::HexString(s) => {
                Ok(PdfObject::String(PdfString(s)))
            }
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::Integer(i) => Self::parse_integer_or_reference(lexer, i),
            Token::ArrayStart => Self::parse_array(lexer, options, depth),
            Token::DictStart => Self::parse_dictionary_or_stream(lexer, options, depth),
            Token::Eof => Err(ParseError::UnexpectedEof {
                position: lexer.token_offset(),
            }),
            other => Err(ParseError::unexpected(
                "object",
                other.kind(),
                lexer.token_offset(),
            )),
        }
    }

    /// A leading integer needs two-token lookahead: `<int> <int> R` is an
    /// indirect reference, anything else leaves a plain number
    fn parse_integer_or_reference(lexer: &mut Lexer<'_>, value: i64) -> ParseResult<Self> {
        let second = lexer.next_token()?;
        let second_offset = lexer.token_offset();

        if let Token::Integer(gen) = second {
            let third = lexer.next_token()?;
            let third_offset = lexer.token_offset();

            if third == Token::RefMarker {
                if value < 0 || gen < 0 {
                    return Err(ParseError::InvalidObject(format!(
                        "negative numbers in reference {value} {gen} R"
                    )));
                }
                return Ok(PdfObject::Reference(value as u32, gen as u16));
            }
            lexer.push_token(third, third_offset);
            lexer.push_token(Token::Integer(gen), second_offset);
        } else {
            lexer.push_token(second, second_offset);
        }

        Ok(PdfObject::Integer(value))
    }

    fn parse_array(
        lexer: &mut Lexer<'_>,
        options: &ParseOptions,
        depth: usize,
    ) -> ParseResult<Self> {
        let mut elements = Vec::new();
        loop {
            let token = lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        position: lexer.token_offset(),
                    })
                }
                other => {
                    elements.push(Self::parse_from_token(lexer, other, options, depth + 1)?);
                }
            }
        }
        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse a dictionary, then check whether a `stream` keyword follows
    /// and promote to a Stream if so
    fn parse_dictionary_or_stream(
        lexer: &mut Lexer<'_>,
        options: &ParseOptions,
        depth: usize,
    ) -> ParseResult<Self> {
        let dict = Self::parse_dictionary_body(lexer, options, depth)?;

        if lexer.peek_token()? == Token::Stream {
            lexer.next_token()?;
            let data = Self::parse_stream_data(lexer, &dict, options)?;
            return Ok(PdfObject::Stream(PdfStream::new(dict, data)));
        }

        Ok(PdfObject::Dictionary(dict))
    }

    fn parse_dictionary_body(
        lexer: &mut Lexer<'_>,
        options: &ParseOptions,
        depth: usize,
    ) -> ParseResult<PdfDictionary> {
        let mut dict = PdfDictionary::new();
        loop {
            let token = lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = {
                        let token = lexer.next_token()?;
                        Self::parse_from_token(lexer, token, options, depth + 1)?
                    };
                    dict.insert(key, value);
                }
                Token::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        position: lexer.token_offset(),
                    })
                }
                other => {
                    return Err(ParseError::unexpected(
                        "name or >>",
                        other.kind(),
                        lexer.token_offset(),
                    ))
                }
            }
        }
        Ok(dict)
    }

    /// Read a stream payload. A direct /Length drives an exact read; an
    /// indirect /Length cannot be resolved at this layer, so the payload is
    /// delimited by scanning for `endstream` and the document re-validates
    /// the length once the xref table is available.
    fn parse_stream_data(
        lexer: &mut Lexer<'_>,
        dict: &PdfDictionary,
        options: &ParseOptions,
    ) -> ParseResult<Vec<u8>> {
        lexer.skip_stream_eol()?;

        match dict.get("Length") {
            Some(PdfObject::Integer(len)) => {
                let len = usize::try_from(*len).map_err(|_| {
                    ParseError::InvalidObject(format!("negative stream /Length {len}"))
                })?;
                let data = lexer.read_bytes(len)?.to_vec();
                lexer.expect(&Token::EndStream)?;
                Ok(data)
            }
            Some(PdfObject::Reference(num, gen)) => {
                warn!(
                    "stream /Length is {} {} R, delimiting payload by endstream scan",
                    num, gen
                );
                Self::scan_stream_data(lexer)
            }
            None if options.lenient_streams => {
                warn!("stream dictionary lacks /Length, delimiting payload by endstream scan");
                Self::scan_stream_data(lexer)
            }
            None => Err(ParseError::InvalidObject(
                "stream dictionary lacks /Length".to_string(),
            )),
            Some(other) => Err(ParseError::InvalidObject(format!(
                "stream /Length must be an integer or reference, found {}",
                type_name(other)
            ))),
        }
    }

    /// Best-effort payload delimiting: everything up to the next literal
    /// `endstream`, with the final EOL treated as a separator
    fn scan_stream_data(lexer: &mut Lexer<'_>) -> ParseResult<Vec<u8>> {
        let start = lexer.pos();
        let end = lexer
            .find_keyword(b"endstream")
            .ok_or(ParseError::UnexpectedEof { position: start })?;

        let mut payload = &lexer.data()[start..end];
        if payload.ends_with(b"\r\n") {
            payload = &payload[..payload.len() - 2];
        } else if payload.ends_with(b"\n") || payload.ends_with(b"\r") {
            payload = &payload[..payload.len() - 1];
        }

        let data = payload.to_vec();
        lexer.seek(end);
        lexer.expect(&Token::EndStream)?;
        Ok(data)
    }

    /// Parse an indirect object (`<num> <gen> obj ... endobj`) positioned
    /// at its header, returning the identity pair and the value
    pub fn parse_indirect(
        lexer: &mut Lexer<'_>,
        options: &ParseOptions,
    ) -> ParseResult<((u32, u16), Self)> {
        let num = match lexer.next_token()? {
            Token::Integer(n) if n >= 0 => n as u32,
            other => {
                return Err(ParseError::unexpected(
                    "object number",
                    other.kind(),
                    lexer.token_offset(),
                ))
            }
        };
        let gen = match lexer.next_token()? {
            Token::Integer(g) if g >= 0 => g as u16,
            other => {
                return Err(ParseError::unexpected(
                    "generation number",
                    other.kind(),
                    lexer.token_offset(),
                ))
            }
        };
        lexer.expect(&Token::Obj)?;

        let token = lexer.next_token()?;
        let value = Self::parse_from_token(lexer, token, options, 0)?;

        // endobj may be preceded by stray whitespace only
        match lexer.next_token()? {
            Token::EndObj => {}
            Token::Eof => {
                return Err(ParseError::UnexpectedEof {
                    position: lexer.token_offset(),
                })
            }
            other => {
                return Err(ParseError::unexpected(
                    "endobj",
                    other.kind(),
                    lexer.token_offset(),
                ))
            }
        }

        Ok(((num, gen), value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary view: a Stream exposes its dictionary here too
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<(u32, u16)> {
        match self {
            PdfObject::Reference(num, gen) => Some((*num, *gen)),
            _ => None,
        }
    }
}

/// Variant name for error messages
pub(crate) fn type_name(obj: &PdfObject) -> &'static str {
    match obj {
        PdfObject::Null => "null",
        PdfObject::Boolean(_) => "boolean",
        PdfObject::Integer(_) => "integer",
        PdfObject::Real(_) => "real",
        PdfObject::String(_) => "string",
        PdfObject::Name(_) => "name",
        PdfObject::Array(_) => "array",
        PdfObject::Dictionary(_) => "dictionary",
        PdfObject::Stream(_) => "stream",
        PdfObject::Reference(_, _) => "reference",
    }
}
