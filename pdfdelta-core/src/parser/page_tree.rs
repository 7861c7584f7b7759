//! Page tree navigation
//!
//! The catalog's /Pages entry roots a tree of /Type /Pages nodes whose
//! /Kids arrays end in /Type /Page leaves (ISO 32000-1 Section 7.7.3).
//! /Resources, /MediaBox, and /Rotate are inheritable: a leaf lacking one
//! takes the value of its nearest ancestor that has it.

use super::document::PdfDocument;
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};
use std::collections::HashSet;
use tracing::warn;

/// US Letter, the fallback when no /MediaBox exists anywhere on the path
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// One page with its inherited attributes applied
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// Identity of the page object
    pub obj_ref: (u32, u16),
    /// The page dictionary as stored
    pub dict: PdfDictionary,
    /// Effective /MediaBox: [llx, lly, urx, ury]
    pub media_box: [f64; 4],
    /// Effective /Rotate, normalized to 0, 90, 180, or 270
    pub rotation: i32,
    /// Effective /Resources, own or inherited
    pub resources: Option<PdfDictionary>,
}

impl ParsedPage {
    pub fn width(&self) -> f64 {
        self.media_box[2] - self.media_box[0]
    }

    pub fn height(&self) -> f64 {
        self.media_box[3] - self.media_box[1]
    }
}

/// Attributes inherited down the tree
#[derive(Debug, Clone, Default)]
struct Inherited {
    resources: Option<PdfDictionary>,
    media_box: Option<[f64; 4]>,
    rotate: Option<i32>,
}

impl Inherited {
    /// Overlay a node's own attributes over what its ancestors provide
    fn overlay(&self, doc: &PdfDocument, node: &PdfDictionary) -> ParseResult<Self> {
        let mut next = self.clone();
        if let Some(obj) = node.get("Resources") {
            if let PdfObject::Dictionary(dict) = doc.resolve(obj)? {
                next.resources = Some(dict);
            }
        }
        if let Some(obj) = node.get("MediaBox") {
            if let Some(media_box) = media_box_from(&doc.resolve(obj)?) {
                next.media_box = Some(media_box);
            }
        }
        if let Some(obj) = node.get("Rotate") {
            if let Some(rotate) = doc.resolve(obj)?.as_integer() {
                next.rotate = Some(normalize_rotation(rotate));
            }
        }
        Ok(next)
    }
}

/// Number of pages under the catalog
pub fn page_count(doc: &PdfDocument) -> ParseResult<u32> {
    let (root_ref, root) = pages_root(doc)?;

    if let Some(count) = root.get("Count").and_then(PdfObject::as_integer) {
        if let Ok(count) = u32::try_from(count) {
            return Ok(count);
        }
    }

    // No usable /Count: walk and count the leaves
    warn!("/Pages node lacks a usable /Count, walking the tree");
    let mut visited = HashSet::new();
    count_leaves(doc, root_ref, &root, &mut visited)
}

/// Fetch page `index` (zero-based), resolving inherited attributes
pub fn get_page(doc: &PdfDocument, index: u32) -> ParseResult<ParsedPage> {
    let (root_ref, root) = pages_root(doc)?;
    let mut visited = HashSet::new();
    let mut cursor = 0u32;

    let found = find_page(
        doc,
        root_ref,
        &root,
        index,
        &mut cursor,
        &Inherited::default(),
        &mut visited,
    )?;

    found.ok_or_else(|| {
        ParseError::InvalidObject(format!(
            "page index {index} out of range, tree holds {cursor} page(s)"
        ))
    })
}

/// Resolve the catalog's /Pages entry
fn pages_root(doc: &PdfDocument) -> ParseResult<((u32, u16), PdfDictionary)> {
    let catalog = doc.catalog()?;
    let pages_obj = catalog
        .get("Pages")
        .ok_or_else(|| ParseError::MissingKey("Pages".to_string()))?;

    let root_ref = pages_obj.as_reference().ok_or_else(|| {
        ParseError::InvalidObject("catalog /Pages must be an indirect reference".to_string())
    })?;

    match doc.get_object(root_ref.0, root_ref.1)? {
        PdfObject::Dictionary(dict) => Ok((root_ref, dict)),
        other => Err(ParseError::InvalidObject(format!(
            "page tree root is {}, expected dictionary",
            super::objects::type_name(&other)
        ))),
    }
}

fn count_leaves(
    doc: &PdfDocument,
    node_ref: (u32, u16),
    node: &PdfDictionary,
    visited: &mut HashSet<(u32, u16)>,
) -> ParseResult<u32> {
    if !visited.insert(node_ref) {
        return Err(ParseError::InvalidObject(format!(
            "page tree cycles through {} {} R",
            node_ref.0, node_ref.1
        )));
    }

    let mut total = 0u32;
    match node_kind(node) {
        NodeKind::Page => total = 1,
        NodeKind::Pages => {
            for kid_ref in kid_references(node)? {
                let kid = match doc.get_object(kid_ref.0, kid_ref.1)? {
                    PdfObject::Dictionary(dict) => dict,
                    other => {
                        return Err(ParseError::InvalidObject(format!(
                            "page tree kid is {}",
                            super::objects::type_name(&other)
                        )))
                    }
                };
                total += count_leaves(doc, kid_ref, &kid, visited)?;
            }
        }
    }

    visited.remove(&node_ref);
    Ok(total)
}

fn find_page(
    doc: &PdfDocument,
    node_ref: (u32, u16),
    node: &PdfDictionary,
    target: u32,
    cursor: &mut u32,
    inherited: &Inherited,
    visited: &mut HashSet<(u32, u16)>,
) -> ParseResult<Option<ParsedPage>> {
    if !visited.insert(node_ref) {
        return Err(ParseError::InvalidObject(format!(
            "page tree cycles through {} {} R",
            node_ref.0, node_ref.1
        )));
    }

    let result = match node_kind(node) {
        NodeKind::Page => {
            if *cursor == target {
                let effective = inherited.overlay(doc, node)?;
                Some(build_page(node_ref, node.clone(), effective))
            } else {
                *cursor += 1;
                None
            }
        }
        NodeKind::Pages => {
            // A trustworthy /Count lets a whole subtree be skipped
            if let Some(count) = node
                .get("Count")
                .and_then(PdfObject::as_integer)
                .and_then(|c| u32::try_from(c).ok())
            {
                if *cursor + count <= target {
                    *cursor += count;
                    visited.remove(&node_ref);
                    return Ok(None);
                }
            }

            let effective = inherited.overlay(doc, node)?;
            let mut found = None;
            for kid_ref in kid_references(node)? {
                let kid = match doc.get_object(kid_ref.0, kid_ref.1)? {
                    PdfObject::Dictionary(dict) => dict,
                    other => {
                        return Err(ParseError::InvalidObject(format!(
                            "page tree kid is {}",
                            super::objects::type_name(&other)
                        )))
                    }
                };
                found = find_page(doc, kid_ref, &kid, target, cursor, &effective, visited)?;
                if found.is_some() {
                    break;
                }
            }
            found
        }
    };

    visited.remove(&node_ref);
    Ok(result)
}

fn build_page(obj_ref: (u32, u16), dict: PdfDictionary, effective: Inherited) -> ParsedPage {
    let media_box = effective.media_box.unwrap_or_else(|| {
        warn!(
            "page {} {} R has no /MediaBox on its path, defaulting to letter",
            obj_ref.0, obj_ref.1
        );
        DEFAULT_MEDIA_BOX
    });

    ParsedPage {
        obj_ref,
        dict,
        media_box,
        rotation: effective.rotate.unwrap_or(0),
        resources: effective.resources,
    }
}

enum NodeKind {
    Pages,
    Page,
}

/// Classify a node, inferring from structure when /Type is absent
fn node_kind(node: &PdfDictionary) -> NodeKind {
    match node.get_type() {
        Some("Pages") => NodeKind::Pages,
        Some("Page") => NodeKind::Page,
        _ if node.contains_key("Kids") => NodeKind::Pages,
        _ => NodeKind::Page,
    }
}

/// The /Kids array as references
fn kid_references(node: &PdfDictionary) -> ParseResult<Vec<(u32, u16)>> {
    let kids = node
        .get("Kids")
        .and_then(PdfObject::as_array)
        .ok_or_else(|| ParseError::MissingKey("Kids".to_string()))?;

    kids.iter()
        .map(|kid| {
            kid.as_reference().ok_or_else(|| {
                ParseError::InvalidObject(format!(
                    "/Kids entry is {}, expected reference",
                    super::objects::type_name(kid)
                ))
            })
        })
        .collect()
}

fn media_box_from(obj: &PdfObject) -> Option<[f64; 4]> {
    let array = obj.as_array()?;
    if array.len() != 4 {
        return None;
    }
    let mut rect = [0.0f64; 4];
    for (slot, value) in rect.iter_mut().zip(array.iter()) {
        *slot = value.as_real()?;
    }
    Some(rect)
}

fn normalize_rotation(raw: i64) -> i32 {
    let normalized = ((raw % 360) + 360) % 360;
    // Round odd values to the nearest multiple of 90
    ((normalized as i32) / 90) * 90
}
