//! Document facade
//!
//! Owns the immutable file buffer, the merged cross-reference table, and a
//! cache of parsed objects keyed by (object number, generation). Objects are
//! parsed on first access and never mutated in place; producing a modified
//! file goes through the incremental writer, which appends to a copy of the
//! buffer and leaves this one untouched.

use super::header::{PdfHeader, PdfVersion};
use super::object_stream::ObjectStream;
use super::objects::{PdfDictionary, PdfObject};
use super::page_tree::{self, ParsedPage};
use super::repair;
use super::trailer::PdfTrailer;
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// A parsed PDF document
///
/// Interior mutability confines an instance to one thread; distinct
/// instances over distinct buffers are fully independent.
pub struct PdfDocument {
    buffer: Vec<u8>,
    header: PdfHeader,
    xref: XRefTable,
    options: ParseOptions,
    /// Parsed objects by identity
    cache: RefCell<HashMap<(u32, u16), PdfObject>>,
    /// Parsed object-stream containers by object number
    containers: RefCell<HashMap<u32, Arc<ObjectStream>>>,
    /// Resolutions currently on the stack, for cycle detection
    in_progress: RefCell<HashSet<(u32, u16)>>,
}

impl PdfDocument {
    /// Parse a document from a byte buffer
    pub fn from_bytes(buffer: Vec<u8>) -> ParseResult<Self> {
        Self::from_bytes_with_options(buffer, ParseOptions::default())
    }

    /// Parse a document from a byte buffer with custom options
    pub fn from_bytes_with_options(buffer: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        if buffer.is_empty() {
            return Err(ParseError::EmptyFile);
        }
        let header = PdfHeader::parse(&buffer)?;

        let xref = match XRefTable::parse(&buffer, &options) {
            Ok(xref) => match xref.trailer().and_then(|t| t.validate()) {
                Ok(()) => xref,
                Err(err) if options.repair_xref => {
                    warn!("declared trailer unusable ({err}), rebuilding xref by scan");
                    repair::rebuild_xref(&buffer, &options)?
                }
                Err(err) => return Err(err),
            },
            Err(err) if options.repair_xref => {
                warn!("declared xref chain unusable ({err}), rebuilding by scan");
                repair::rebuild_xref(&buffer, &options)?
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            buffer,
            header,
            xref,
            options,
            cache: RefCell::new(HashMap::new()),
            containers: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        })
    }

    /// Open and parse a document from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Open with custom options
    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: ParseOptions,
    ) -> ParseResult<Self> {
        Self::from_bytes_with_options(std::fs::read(path)?, options)
    }

    /// The file version from the header
    pub fn version(&self) -> PdfVersion {
        self.header.version
    }

    /// The original file bytes
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The merged cross-reference table
    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// The newest section's trailer
    pub fn trailer(&self) -> ParseResult<&PdfTrailer> {
        self.xref.trailer()
    }

    /// The /Root reference from the newest trailer
    pub fn root_reference(&self) -> ParseResult<(u32, u16)> {
        self.trailer()?.root()
    }

    /// One past the highest object number in the merged table; mutating
    /// collaborators allocate fresh numbers from here
    pub fn next_object_id(&self) -> u32 {
        self.xref.next_object_id()
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Fetch an object by identity, parsing and caching it on first access
    pub fn get_object(&self, num: u32, gen: u16) -> ParseResult<PdfObject> {
        if let Some(obj) = self.cache.borrow().get(&(num, gen)) {
            return Ok(obj.clone());
        }

        if !self.in_progress.borrow_mut().insert((num, gen)) {
            return Err(ParseError::CircularReference(num, gen));
        }
        if self.in_progress.borrow().len() > self.options.max_depth {
            self.in_progress.borrow_mut().remove(&(num, gen));
            return Err(ParseError::InvalidObject(format!(
                "reference resolution deeper than {} levels",
                self.options.max_depth
            )));
        }

        let result = self.load_object(num, gen);
        self.in_progress.borrow_mut().remove(&(num, gen));

        let obj = result?;
        self.cache
            .borrow_mut()
            .insert((num, gen), obj.clone());
        Ok(obj)
    }

    /// Chase a Reference to its target; other variants pass through
    pub fn resolve(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        match obj {
            PdfObject::Reference(num, gen) => self.get_object(*num, *gen),
            other => Ok(other.clone()),
        }
    }

    /// Resolve every reference reachable from `obj`, materializing the
    /// subgraph. The visited set lives for this one top-level call; a cycle
    /// back into an object still being resolved fails instead of recursing
    /// forever.
    pub fn resolve_deep(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        let mut visiting = HashSet::new();
        self.resolve_deep_inner(obj, &mut visiting)
    }

    fn resolve_deep_inner(
        &self,
        obj: &PdfObject,
        visiting: &mut HashSet<(u32, u16)>,
    ) -> ParseResult<PdfObject> {
        match obj {
            PdfObject::Reference(num, gen) => {
                let (num, gen) = (*num, *gen);
                if !visiting.insert((num, gen)) {
                    return Err(ParseError::CircularReference(num, gen));
                }
                let result = self
                    .get_object(num, gen)
                    .and_then(|target| self.resolve_deep_inner(&target, visiting));
                visiting.remove(&(num, gen));
                result
            }
            PdfObject::Array(array) => {
                let mut resolved = Vec::with_capacity(array.len());
                for element in array.iter() {
                    resolved.push(self.resolve_deep_inner(element, visiting)?);
                }
                Ok(PdfObject::Array(super::objects::PdfArray(resolved)))
            }
            PdfObject::Dictionary(dict) => {
                let mut resolved = PdfDictionary::new();
                for (key, value) in dict.iter() {
                    resolved
                        .0
                        .insert(key.clone(), self.resolve_deep_inner(value, visiting)?);
                }
                Ok(PdfObject::Dictionary(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// The document catalog (trailer /Root resolved)
    pub fn catalog(&self) -> ParseResult<PdfDictionary> {
        let (num, gen) = self.root_reference()?;
        match self.get_object(num, gen)? {
            PdfObject::Dictionary(dict) => Ok(dict),
            other => Err(ParseError::InvalidObject(format!(
                "catalog {num} {gen} R is {}, expected dictionary",
                super::objects::type_name(&other)
            ))),
        }
    }

    /// The document information dictionary, if the trailer names one
    pub fn info(&self) -> ParseResult<Option<PdfDictionary>> {
        let Some((num, gen)) = self.trailer()?.info() else {
            return Ok(None);
        };
        match self.get_object(num, gen)? {
            PdfObject::Dictionary(dict) => Ok(Some(dict)),
            PdfObject::Null => Ok(None),
            other => Err(ParseError::InvalidObject(format!(
                "info {num} {gen} R is {}, expected dictionary",
                super::objects::type_name(&other)
            ))),
        }
    }

    /// Number of pages in the page tree
    pub fn page_count(&self) -> ParseResult<u32> {
        page_tree::page_count(self)
    }

    /// Fetch a page by zero-based index, with inherited attributes applied
    pub fn get_page(&self, index: u32) -> ParseResult<ParsedPage> {
        page_tree::get_page(self, index)
    }

    /// Parse the object for an xref entry
    fn load_object(&self, num: u32, gen: u16) -> ParseResult<PdfObject> {
        let entry = match self.xref.get_entry(num) {
            Some(entry) => *entry,
            None => {
                // A reference to an undescribed object denotes null
                debug!("object {num} {gen} R has no xref entry, resolving to null");
                return Ok(PdfObject::Null);
            }
        };

        match entry {
            XRefEntry::Free { .. } => Ok(PdfObject::Null),
            XRefEntry::InUse {
                offset,
                generation,
            } => {
                if generation != gen {
                    warn!(
                        "object {num}: requested generation {gen}, xref records {generation}"
                    );
                }
                self.load_in_file(num, offset)
            }
            XRefEntry::Compressed {
                stream_object_number,
                index_within_stream,
            } => self.load_compressed(num, stream_object_number, index_within_stream),
        }
    }

    fn load_in_file(&self, num: u32, offset: u64) -> ParseResult<PdfObject> {
        let at = usize::try_from(offset)
            .ok()
            .filter(|&o| o < self.buffer.len())
            .ok_or_else(|| {
                ParseError::InvalidObject(format!(
                    "object {num}: xref offset {offset} outside buffer"
                ))
            })?;

        let mut lexer = super::lexer::Lexer::new_at(&self.buffer, at);
        let ((header_num, header_gen), obj) =
            PdfObject::parse_indirect(&mut lexer, &self.options)?;

        if header_num != num {
            return Err(ParseError::InvalidObject(format!(
                "xref points object {num} at offset {offset}, found header {header_num} {header_gen}"
            )));
        }

        self.revalidate_stream_length(obj)
    }

    /// A stream parsed with an indirect /Length was delimited by scanning
    /// for `endstream`; check the scan against the now-resolvable length
    fn revalidate_stream_length(&self, obj: PdfObject) -> ParseResult<PdfObject> {
        let mut stream = match obj {
            PdfObject::Stream(stream) => stream,
            other => return Ok(other),
        };
        let Some((len_num, len_gen)) = stream.dict.get("Length").and_then(PdfObject::as_reference)
        else {
            return Ok(PdfObject::Stream(stream));
        };

        let declared = match self.get_object(len_num, len_gen)? {
            PdfObject::Integer(len) if len >= 0 => len as usize,
            other => {
                return Err(ParseError::InvalidObject(format!(
                    "stream /Length {len_num} {len_gen} R resolves to {}",
                    super::objects::type_name(&other)
                )))
            }
        };

        if declared == stream.data.len() {
            stream
                .dict
                .insert("Length", PdfObject::Integer(declared as i64));
            return Ok(PdfObject::Stream(stream));
        }
        if declared < stream.data.len()
            && stream.data[declared..]
                .iter()
                .all(|&b| super::lexer::is_whitespace(b))
        {
            // The scan kept separator whitespace; the declared length wins
            stream.data.truncate(declared);
            stream.dict.insert("Length", PdfObject::Integer(declared as i64));
            return Ok(PdfObject::Stream(stream));
        }

        Err(ParseError::CorruptedFile(format!(
            "stream payload scanned as {} bytes but /Length resolves to {declared}",
            stream.data.len()
        )))
    }

    fn load_compressed(&self, num: u32, container_num: u32, index: u32) -> ParseResult<PdfObject> {
        let container = self.container(container_num)?;
        let (packed_num, obj) = container.get(index, &self.options)?;
        if packed_num != num {
            return Err(ParseError::InvalidObject(format!(
                "object stream {container_num} records object {packed_num} at index {index}, xref expected {num}"
            )));
        }
        Ok(obj)
    }

    /// Resolve and cache an object-stream container
    fn container(&self, container_num: u32) -> ParseResult<Arc<ObjectStream>> {
        if let Some(container) = self.containers.borrow().get(&container_num) {
            return Ok(Arc::clone(container));
        }

        let obj = self.get_object(container_num, 0)?;
        let stream = obj.as_stream().ok_or_else(|| {
            ParseError::InvalidObject(format!(
                "container {container_num} 0 R is not a stream"
            ))
        })?;
        let container = Arc::new(ObjectStream::parse(stream)?);
        self.containers
            .borrow_mut()
            .insert(container_num, Arc::clone(&container));
        Ok(container)
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.header.version)
            .field("buffer_len", &self.buffer.len())
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.cache.borrow().len())
            .finish()
    }
}
