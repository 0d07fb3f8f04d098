//! Page tree traversal with inherited attributes.

use super::reader::PdfReader;
use crate::error::{PdfError, Result};
use crate::model::{ObjRef, PdfDictionary, PdfObject};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::warn;

/// US Letter, used when no `/MediaBox` is found.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Attributes a `Pages` node passes down to its kids.
const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// A leaf of the page tree.
///
/// `dict` is the page's own dictionary with inherited attributes filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfPage {
    pub obj_ref: ObjRef,
    pub dict: PdfDictionary,
}

impl PdfPage {
    pub fn media_box(&self) -> [f64; 4] {
        self.dict
            .get("MediaBox")
            .and_then(|b| b.as_rect().ok())
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    /// Visible region; falls back to the media box.
    pub fn crop_box(&self) -> [f64; 4] {
        self.dict
            .get("CropBox")
            .and_then(|b| b.as_rect().ok())
            .unwrap_or_else(|| self.media_box())
    }

    /// Rotation in degrees, one of 0, 90, 180, 270.
    pub fn rotate(&self) -> i64 {
        let raw = self.dict.get_i64("Rotate").unwrap_or(0);
        (raw.rem_euclid(360) / 90) * 90
    }

    pub fn resources(&self) -> Option<&PdfObject> {
        self.dict.get("Resources")
    }

    pub fn contents(&self) -> Option<&PdfObject> {
        self.dict.get("Contents")
    }
}

impl PdfReader {
    /// Number of leaf pages.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// Page at zero-based `index`.
    pub fn get_page(&self, index: usize) -> Result<PdfPage> {
        self.pages()?
            .get(index)
            .cloned()
            .ok_or(PdfError::PageNotFound(index))
    }

    /// All pages in document order, walked once and cached.
    pub fn pages(&self) -> Result<Arc<[PdfPage]>> {
        if let Some(pages) = self.pages.borrow().as_ref() {
            return Ok(pages.clone());
        }
        let pages: Arc<[PdfPage]> = self.walk_page_tree()?.into();
        *self.pages.borrow_mut() = Some(pages.clone());
        Ok(pages)
    }

    fn walk_page_tree(&self) -> Result<Vec<PdfPage>> {
        let catalog = self.catalog()?;
        let root = catalog
            .as_dict()?
            .get("Pages")
            .and_then(|p| p.as_reference().ok())
            .ok_or(PdfError::MissingRoot)?;

        let mut pages = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack: Vec<(ObjRef, Arc<PdfDictionary>)> =
            vec![(root, Arc::new(PdfDictionary::new()))];

        while let Some((node_ref, inherited)) = stack.pop() {
            if !visited.insert(node_ref.num) {
                return Err(PdfError::PageTreeCycle(node_ref.num));
            }
            let Some(node) = self.get(node_ref.num)? else {
                warn!(obj = node_ref.num, "page tree node missing");
                continue;
            };
            let Ok(dict) = node.as_dict() else {
                warn!(obj = node_ref.num, "page tree node is not a dictionary");
                continue;
            };

            let kids = match dict.get("Kids") {
                Some(kids) if dict.type_name() != Some("Page") => Some(self.resolve(kids)?),
                _ => None,
            };

            match kids {
                Some(kids) => {
                    let mut attrs = (*inherited).clone();
                    for key in INHERITABLE {
                        if let Some(value) = dict.get(key) {
                            attrs.insert(key, self.inheritable_value(key, value)?);
                        }
                    }
                    let attrs = Arc::new(attrs);
                    let kids = kids.as_array().map(Vec::as_slice).unwrap_or_default();
                    for kid in kids.iter().rev() {
                        match kid.as_reference() {
                            Ok(r) => stack.push((r, attrs.clone())),
                            Err(_) => warn!(obj = node_ref.num, "skipping direct /Kids entry"),
                        }
                    }
                }
                None => {
                    let mut page = dict.clone();
                    for (key, value) in inherited.iter() {
                        if !page.contains_key(key.as_str()) {
                            page.insert(key.clone(), value.clone());
                        }
                    }
                    for key in ["MediaBox", "CropBox", "Rotate"] {
                        if let Some(value) = page.get(key).cloned() {
                            page.insert(key, self.inheritable_value(key, &value)?);
                        }
                    }
                    pages.push(PdfPage {
                        obj_ref: node_ref,
                        dict: page,
                    });
                }
            }
        }
        Ok(pages)
    }

    /// Boxes and rotation are stored direct; resources keep their references.
    fn inheritable_value(&self, key: &str, value: &PdfObject) -> Result<PdfObject> {
        if key == "Resources" {
            return Ok(value.clone());
        }
        Ok((*self.resolve(value)?).clone())
    }
}
