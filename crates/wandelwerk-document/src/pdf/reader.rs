// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open existing PDF documents and apply in-place edits with the
// `lopdf` crate: merge, text stamping, annotations, structural compression and
// text-layer extraction.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument, warn};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::{Annotation, Color, Rect};

/// Resource name under which the stamping font is registered on a page.
const STAMP_FONT: &[u8] = b"WwF1";

/// Edge length, in points, of the icon box for sticky-note annotations.
const NOTE_ICON_SIZE: f32 = 24.0;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Text to draw onto a page. Coordinates are PDF user space (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextStamp {
    /// 0-based page index.
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: Color,
    pub text: String,
}

/// Reads and edits existing PDF files.
///
/// Every editing operation works on a copy of the loaded document and returns
/// the serialised result, so one reader can serve several edits.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            WandelwerkError::PdfError(format!("failed to load PDF from memory: {err}"))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Text layer of every page, concatenated in page order.
    ///
    /// Scanned documents without a text layer yield an empty string.
    #[instrument(skip(self), fields(pages = self.page_count()))]
    pub fn extract_text(&self) -> Result<String> {
        let pages: Vec<u32> = self.document.get_pages().keys().copied().collect();
        let text = self
            .document
            .extract_text(&pages)
            .map_err(|err| WandelwerkError::PdfError(format!("text extraction failed: {err}")))?;
        debug!(chars = text.len(), "Text layer extracted");
        Ok(text)
    }

    // -- Combination ----------------------------------------------------------

    /// Concatenate whole documents in the given order.
    ///
    /// The first document is the base; pages of the others are deep-copied
    /// onto the end of its page tree.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn merge(documents: &[&[u8]]) -> Result<Vec<u8>> {
        let (first, rest) = documents.split_first().ok_or_else(|| {
            WandelwerkError::PdfError("merge needs at least one document".into())
        })?;

        let mut merged = Self::from_bytes(first)?.document;
        let pages_id = page_tree_root(&merged)?;

        for (index, bytes) in rest.iter().enumerate() {
            let other = Document::load_mem(bytes).map_err(|err| {
                WandelwerkError::PdfError(format!(
                    "failed to load PDF #{} for merge: {err}",
                    index + 2
                ))
            })?;

            // get_pages is keyed by 1-indexed page number, already in order.
            for page_id in other.get_pages().into_values() {
                append_page(&other, &mut merged, pages_id, page_id)?;
            }
        }

        info!(pages = merged.get_pages().len(), "PDFs merged");
        save(&mut merged, "merged PDF")
    }

    // -- Editing --------------------------------------------------------------

    /// Draw a single line of Helvetica text on one page.
    #[instrument(skip(self, stamp), fields(page = stamp.page, text_len = stamp.text.len()))]
    pub fn add_text(&self, stamp: &TextStamp) -> Result<Vec<u8>> {
        let mut doc = self.document.clone();
        let page_id = page_object_id(&doc, stamp.page)?;

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut resources = effective_dictionary(&doc, page_id, b"Resources")?.unwrap_or_default();
        let mut fonts = match resources.get(b"Font") {
            Ok(fonts) => resolve_dictionary(&doc, fonts)?,
            Err(_) => Dictionary::new(),
        };
        fonts.set(STAMP_FONT.to_vec(), Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        // Wrap the existing content in q/Q so its graphics state can't leak
        // into the stamp.
        let [r, g, b] = stamp.color.to_unit();
        let overlay = Content {
            operations: vec![
                Operation::new("Q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(STAMP_FONT.to_vec()), Object::Real(stamp.font_size)],
                ),
                Operation::new("Td", vec![Object::Real(stamp.x), Object::Real(stamp.y)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(&stamp.text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let overlay = overlay
            .encode()
            .map_err(|err| WandelwerkError::PdfError(format!("cannot encode text stamp: {err}")))?;

        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

        let mut contents = vec![Object::Reference(open_id)];
        contents.extend(page_contents(&doc, page_id)?);
        contents.push(Object::Reference(overlay_id));

        let page = doc
            .get_dictionary_mut(page_id)
            .map_err(|err| WandelwerkError::PdfError(format!("page dictionary unavailable: {err}")))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));

        info!(page = stamp.page, x = stamp.x, y = stamp.y, "Text stamped");
        save(&mut doc, "stamped PDF")
    }

    /// Attach annotations (notes, highlights, links) to their pages.
    #[instrument(skip_all, fields(count = annotations.len()))]
    pub fn annotate(&self, annotations: &[Annotation]) -> Result<Vec<u8>> {
        let mut doc = self.document.clone();

        for annotation in annotations {
            let page_id = page_object_id(&doc, annotation.page())?;
            let mut annot = annotation_dictionary(annotation);
            annot.set("P", Object::Reference(page_id));
            let annot_id = doc.add_object(annot);

            let mut annots = match doc.get_dictionary(page_id).and_then(|p| p.get(b"Annots")) {
                Ok(existing) => resolve_array(&doc, existing)?,
                Err(_) => Vec::new(),
            };
            annots.push(Object::Reference(annot_id));

            doc.get_dictionary_mut(page_id)
                .map_err(|err| {
                    WandelwerkError::PdfError(format!("page dictionary unavailable: {err}"))
                })?
                .set("Annots", Object::Array(annots));
        }

        info!(count = annotations.len(), "Annotations added");
        save(&mut doc, "annotated PDF")
    }

    /// Structural compression: drop unreachable objects and empty streams,
    /// then Flate-compress every remaining stream.
    #[instrument(skip(self))]
    pub fn compress(&self) -> Result<Vec<u8>> {
        let mut doc = self.document.clone();
        let pruned = doc.prune_objects();
        let emptied = doc.delete_zero_length_streams();
        doc.compress();
        doc.renumber_objects();
        info!(
            pruned = pruned.len(),
            emptied = emptied.len(),
            "PDF compressed"
        );
        save(&mut doc, "compressed PDF")
    }
}

// -- Page helpers -------------------------------------------------------------

fn save(doc: &mut Document, what: &str) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| WandelwerkError::PdfError(format!("failed to serialise {what}: {err}")))?;
    debug!(output_bytes = output.len(), "{what} serialised");
    Ok(output)
}

/// Object id of the page at 0-based `index`.
fn page_object_id(doc: &Document, index: u32) -> Result<ObjectId> {
    let pages = doc.get_pages();
    pages.get(&(index + 1)).copied().ok_or_else(|| {
        WandelwerkError::PdfError(format!(
            "page {index} out of range (document has {} pages)",
            pages.len()
        ))
    })
}

fn page_tree_root(doc: &Document) -> Result<ObjectId> {
    doc.catalog()
        .map_err(|err| WandelwerkError::PdfError(format!("no catalog: {err}")))?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|err| WandelwerkError::PdfError(format!("no /Pages reference: {err}")))
}

/// A page attribute, falling back to the nearest ancestor that defines it.
/// References are resolved so the result can be edited and stored inline.
fn effective_dictionary(doc: &Document, page_id: ObjectId, key: &[u8]) -> Result<Option<Dictionary>> {
    match inherited_attribute(doc, page_id, key) {
        Some(value) => resolve_dictionary(doc, value).map(Some),
        None => Ok(None),
    }
}

fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Bounded walk; malformed files can contain /Parent cycles.
    for _ in 0..64 {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve_dictionary(doc: &Document, object: &Object) -> Result<Dictionary> {
    match object {
        Object::Dictionary(dict) => Ok(dict.clone()),
        Object::Reference(id) => doc
            .get_dictionary(*id)
            .cloned()
            .map_err(|err| WandelwerkError::PdfError(format!("bad dictionary reference: {err}"))),
        other => Err(WandelwerkError::PdfError(format!(
            "expected a dictionary, found {}",
            other.enum_variant()
        ))),
    }
}

fn resolve_array(doc: &Document, object: &Object) -> Result<Vec<Object>> {
    match object {
        Object::Array(items) => Ok(items.clone()),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => Ok(items.clone()),
            // A lone reference to a stream: keep it as the only entry.
            Ok(_) => Ok(vec![Object::Reference(*id)]),
            Err(err) => Err(WandelwerkError::PdfError(format!("bad array reference: {err}"))),
        },
        other => Err(WandelwerkError::PdfError(format!(
            "expected an array, found {}",
            other.enum_variant()
        ))),
    }
}

/// Existing content stream references of a page, as a flat list.
fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| WandelwerkError::PdfError(format!("page dictionary unavailable: {err}")))?;
    match page.get(b"Contents") {
        Ok(contents) => resolve_array(doc, contents),
        Err(_) => Ok(Vec::new()),
    }
}

/// Encode text for a WinAnsi simple font. Characters outside Latin-1 become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn rect_array(rect: &Rect) -> Object {
    Object::Array(vec![
        Object::Real(rect.x),
        Object::Real(rect.y),
        Object::Real(rect.x + rect.width),
        Object::Real(rect.y + rect.height),
    ])
}

fn color_array(color: Color) -> Object {
    Object::Array(color.to_unit().into_iter().map(Object::Real).collect())
}

fn annotation_dictionary(annotation: &Annotation) -> Dictionary {
    match annotation {
        Annotation::Note { x, y, contents, .. } => dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => rect_array(&Rect { x: *x, y: *y, width: NOTE_ICON_SIZE, height: NOTE_ICON_SIZE }),
            "Contents" => Object::String(win_ansi(contents), StringFormat::Literal),
            "Open" => false,
        },
        Annotation::Highlight { rect, color, .. } => {
            let (x1, y1) = (rect.x, rect.y);
            let (x2, y2) = (rect.x + rect.width, rect.y + rect.height);
            dictionary! {
                "Type" => "Annot",
                "Subtype" => "Highlight",
                "Rect" => rect_array(rect),
                "QuadPoints" => Object::Array(
                    [x1, y2, x2, y2, x1, y1, x2, y1].into_iter().map(Object::Real).collect(),
                ),
                "C" => color_array(color.unwrap_or(Color::YELLOW)),
            }
        }
        Annotation::Link { rect, uri, .. } => dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => rect_array(rect),
            "Border" => Object::Array(vec![0.into(), 0.into(), 0.into()]),
            "A" => dictionary! {
                "S" => "URI",
                "URI" => Object::String(uri.as_bytes().to_vec(), StringFormat::Literal),
            },
        },
    }
}

// -- Deep copy ----------------------------------------------------------------

/// Copy one page (and everything it references) from `source` to the end of
/// the page tree rooted at `pages_id` in `target`.
fn append_page(
    source: &Document,
    target: &mut Document,
    pages_id: ObjectId,
    page_id: ObjectId,
) -> Result<()> {
    let mut page = source
        .get_dictionary(page_id)
        .cloned()
        .map_err(|err| WandelwerkError::PdfError(format!("cannot read page {page_id:?}: {err}")))?;

    // Attributes inherited from the source page tree would be lost once the
    // page is re-parented, so pin them on the page itself.
    for key in INHERITABLE {
        if !page.has(key)
            && let Some(value) = inherited_attribute(source, page_id, key)
        {
            page.set(key.to_vec(), value.clone());
        }
    }
    page.remove(b"Parent");

    let mut copied = BTreeMap::new();
    copied.insert(page_id, (0, 0));
    let cloned = deep_copy(source, target, &Object::Dictionary(page), &mut copied)?;
    let cloned_id = target.add_object(cloned);

    if let Ok(Object::Dictionary(page_dict)) = target.get_object_mut(cloned_id) {
        page_dict.set("Parent", Object::Reference(pages_id));
    }

    let pages = target
        .get_dictionary_mut(pages_id)
        .map_err(|err| WandelwerkError::PdfError(format!("page tree root unavailable: {err}")))?;
    if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
        kids.push(Object::Reference(cloned_id));
    }
    if let Ok(Object::Integer(count)) = pages.get_mut(b"Count") {
        *count += 1;
    }
    Ok(())
}

/// Recursively copy `object`, translating references from `source` ids to
/// freshly allocated `target` ids. `copied` memoises the translation so shared
/// objects are copied once and reference cycles terminate.
fn deep_copy(
    source: &Document,
    target: &mut Document,
    object: &Object,
    copied: &mut BTreeMap<ObjectId, ObjectId>,
) -> Result<Object> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(
            source, target, dict, copied,
        )?)),
        Object::Array(items) => items
            .iter()
            .map(|item| deep_copy(source, target, item, copied))
            .collect::<Result<Vec<_>>>()
            .map(Object::Array),
        Object::Stream(stream) => {
            let dict = copy_dictionary(source, target, &stream.dict, copied)?;
            Ok(Object::Stream(Stream::new(dict, stream.content.clone())))
        }
        Object::Reference(ref_id) => {
            if let Some(&new_id) = copied.get(ref_id) {
                // The page being copied maps to a placeholder; /P back-references
                // from its annotations are dropped rather than dangling.
                return Ok(if new_id == (0, 0) {
                    Object::Null
                } else {
                    Object::Reference(new_id)
                });
            }
            match source.get_object(*ref_id) {
                Ok(referenced) => {
                    let new_id = target.new_object_id();
                    copied.insert(*ref_id, new_id);
                    let cloned = deep_copy(source, target, referenced, copied)?;
                    target.objects.insert(new_id, cloned);
                    Ok(Object::Reference(new_id))
                }
                Err(err) => {
                    warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                    Ok(Object::Null)
                }
            }
        }
        other => Ok(other.clone()),
    }
}

fn copy_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    copied: &mut BTreeMap<ObjectId, ObjectId>,
) -> Result<Dictionary> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        // Page tree links are rebuilt by the caller.
        if key == b"Parent" {
            continue;
        }
        new_dict.set(key.clone(), deep_copy(source, target, value, copied)?);
    }
    Ok(new_dict)
}
