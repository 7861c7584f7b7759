//! Incremental updates
//!
//! Appends changed objects plus a delta cross-reference section to an
//! existing file. No byte of the original buffer is ever rewritten: a
//! signature's /ByteRange hashes a span of the file as it existed at
//! signing time, and later updates land strictly after that span, so
//! earlier signatures keep validating as further changes accumulate.
//!
//! Every mutating collaborator (form values, flattening, signing) goes
//! through this one writer rather than growing its own offset and
//! subsection bookkeeping.

use super::serializer::serialize_object;
use crate::error::{PdfError, Result};
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::xref::locate_startxref;
use crate::parser::PdfDocument;
use std::collections::BTreeMap;
use tracing::debug;

/// Collects full-object additions and replacements for one update pass
///
/// Objects are keyed by object number; an update never partially edits an
/// object, it re-emits the whole value under generation 0.
pub struct IncrementalUpdate<'a> {
    document: &'a PdfDocument,
    /// Serialized object values, ordered by object number
    changes: BTreeMap<u32, Vec<u8>>,
    next_id: u32,
    /// Overrides the /Info carried into the delta trailer
    info_ref: Option<(u32, u16)>,
}

impl<'a> IncrementalUpdate<'a> {
    /// Start an update against a parsed document
    pub fn new(document: &'a PdfDocument) -> Self {
        Self {
            document,
            changes: BTreeMap::new(),
            next_id: document.next_object_id(),
            info_ref: None,
        }
    }

    /// Point the delta trailer's /Info at this object instead of carrying
    /// the prior trailer's value forward
    pub fn set_info_reference(&mut self, num: u32, gen: u16) {
        self.info_ref = Some((num, gen));
    }

    /// Replace (or introduce) the object with this number
    pub fn set_object(&mut self, num: u32, obj: &PdfObject) {
        self.changes.insert(num, serialize_object(obj));
        self.next_id = self.next_id.max(num + 1);
    }

    /// Replace an object with already-serialized value bytes
    pub fn set_raw_object(&mut self, num: u32, bytes: Vec<u8>) {
        self.changes.insert(num, bytes);
        self.next_id = self.next_id.max(num + 1);
    }

    /// Add a new object under a freshly allocated number, returning it
    pub fn add_object(&mut self, obj: &PdfObject) -> u32 {
        let num = self.next_id;
        self.set_object(num, obj);
        num
    }

    /// The number the next `add_object` call will use
    pub fn next_object_id(&self) -> u32 {
        self.next_id
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Produce the updated file: the original buffer with the delta
    /// appended. An empty change set returns the original unchanged.
    ///
    /// The whole delta is staged in memory before anything is emitted, so
    /// a failure can never yield a partially-written file.
    pub fn write_to_vec(self) -> Result<Vec<u8>> {
        let original = self.document.buffer();
        if self.changes.is_empty() {
            return Ok(original.to_vec());
        }
        if self.changes.contains_key(&0) {
            return Err(PdfError::InvalidUpdate(
                "object number 0 is reserved for the free list head".to_string(),
            ));
        }

        let prior_trailer = self.document.trailer()?;
        if prior_trailer.is_encrypted() {
            // Whether /Encrypt and /ID must carry into rebuilt trailers is
            // unsettled; refusing beats emitting files readers decrypt
            // incorrectly.
            return Err(PdfError::UnsupportedFeature(
                "incremental update of an encrypted document".to_string(),
            ));
        }
        let root = prior_trailer.root()?;
        let info = self.info_ref.or_else(|| prior_trailer.info());
        let (_, prev_offset) = locate_startxref(original, original.len())
            .map_err(PdfError::Parse)?;

        let mut delta = Vec::new();
        let base = original.len();

        // The appended body must start on its own line
        if original.last() != Some(&b'\n') {
            delta.push(b'\n');
        }

        let mut offsets: BTreeMap<u32, u64> = BTreeMap::new();
        for (num, bytes) in &self.changes {
            offsets.insert(*num, (base + delta.len()) as u64);
            delta.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
            delta.extend_from_slice(bytes);
            delta.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = base + delta.len();
        delta.extend_from_slice(b"xref\n");
        for run in contiguous_runs(&offsets) {
            delta.extend_from_slice(
                format!("{} {}\n", run[0].0, run.len()).as_bytes(),
            );
            for (_, offset) in run {
                delta.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
            }
        }

        let highest = *self.changes.keys().next_back().expect("nonempty");
        let size = self.document.next_object_id().max(highest + 1);

        let mut trailer = PdfDictionary::new();
        trailer.insert("Size", PdfObject::Integer(i64::from(size)));
        trailer.insert("Root", PdfObject::Reference(root.0, root.1));
        if let Some((num, gen)) = info {
            trailer.insert("Info", PdfObject::Reference(num, gen));
        }
        trailer.insert("Prev", PdfObject::Integer(prev_offset as i64));

        delta.extend_from_slice(b"trailer\n");
        delta.extend_from_slice(&serialize_object(&PdfObject::Dictionary(trailer)));
        delta.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());

        debug!(
            "incremental update: {} object(s), delta xref at {xref_offset}, /Prev {prev_offset}",
            self.changes.len()
        );

        let mut result = Vec::with_capacity(original.len() + delta.len());
        result.extend_from_slice(original);
        result.extend_from_slice(&delta);
        Ok(result)
    }
}

/// Split ascending (number, offset) pairs into maximal contiguous runs
fn contiguous_runs(offsets: &BTreeMap<u32, u64>) -> Vec<Vec<(u32, u64)>> {
    let mut runs: Vec<Vec<(u32, u64)>> = Vec::new();
    for (&num, &offset) in offsets {
        match runs.last_mut() {
            Some(run) if run.last().map(|&(n, _)| n + 1) == Some(num) => {
                run.push((num, offset));
            }
            _ => runs.push(vec![(num, offset)]),
        }
    }
    runs
}
