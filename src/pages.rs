use std::collections::HashSet;

use crate::geometry::RectF;
use crate::model::{Dict, ObjRef, Object};
use crate::parser::{PdfDoc, flate_encode};

const US_LETTER: RectF = RectF {
    min_x: 0.0,
    min_y: 0.0,
    max_x: 612.0,
    max_y: 792.0,
};

/// A leaf of the page tree with its inheritable attributes resolved.
#[derive(Debug, Clone)]
pub struct PageInfo {
    /// `None` only for a page dictionary stored directly inside `/Kids`.
    pub object: Option<ObjRef>,
    pub media_box: RectF,
    pub crop_box: Option<RectF>,
    pub rotate: i32,
    pub resources: Option<Object>,
    /// Whether `resources` came from an ancestor node rather than the page itself.
    pub resources_inherited: bool,
    pub dict: Dict,
}

impl PageInfo {
    pub fn width(&self) -> f64 {
        self.media_box.width()
    }

    pub fn height(&self) -> f64 {
        self.media_box.height()
    }

    pub fn resources_dict<'a>(&'a self, doc: &'a PdfDoc) -> Option<&'a Dict> {
        self.resources.as_ref().and_then(|r| doc.resolve(r).as_dict())
    }

    /// Content stream objects in paint order.
    pub fn contents<'a>(&'a self, doc: &'a PdfDoc) -> Vec<&'a Object> {
        match self.dict.get("Contents").map(|c| doc.resolve(c)) {
            Some(Object::Array(items)) => items.iter().map(|item| doc.resolve(item)).collect(),
            Some(Object::Null) | None => Vec::new(),
            Some(single) => vec![single],
        }
    }

    /// Concatenated, decoded content of every stream, each followed by a newline.
    pub fn content_bytes(&self, doc: &PdfDoc) -> Vec<u8> {
        let mut out = Vec::new();
        for stream in self.contents(doc) {
            if let Some(data) = doc.stream_data(stream) {
                out.extend_from_slice(&data);
                out.push(b'\n');
            }
        }
        out
    }

    pub fn annotations<'a>(&'a self, doc: &'a PdfDoc) -> Vec<&'a Dict> {
        self.dict
            .get("Annots")
            .map(|a| doc.resolve(a))
            .and_then(Object::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| doc.resolve(item).as_dict())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Collects pages in document order.
pub fn collect_pages(doc: &PdfDoc) -> Vec<PageInfo> {
    let mut out = Vec::new();
    let Some(root) = doc.catalog().and_then(|c| c.get("Pages")) else {
        return out;
    };
    let mut visited = HashSet::new();
    walk(doc, root, Inherited::default(), &mut visited, &mut out);
    out
}

pub fn page_count(doc: &PdfDoc) -> usize {
    collect_pages(doc).len()
}

/// Replaces the page's `/Resources` with a direct copy, resolving its `/Font`
/// and `/XObject` subdictionaries so edits never reach a shared object.
pub(crate) fn own_resources<'a>(doc: &'a mut PdfDoc, page: &PageInfo) -> Option<&'a mut Dict> {
    let key = page.object?;
    let current = doc
        .get(key.0, key.1)
        .and_then(Object::as_dict)
        .and_then(|d| d.get("Resources"))
        .or(page.resources.as_ref());
    let mut resources = current
        .and_then(|r| doc.resolve(r).as_dict())
        .cloned()
        .unwrap_or_default();
    for sub in ["Font", "XObject"] {
        if let Some(entry) = resources.get(sub) {
            let direct = doc.resolve(entry).as_dict().cloned().unwrap_or_default();
            resources.insert(sub.to_string(), Object::Dictionary(direct));
        }
    }
    let dict = doc.dict_mut(key)?;
    dict.insert("Resources".to_string(), Object::Dictionary(resources));
    dict.get_mut("Resources").and_then(Object::as_dict_mut)
}

/// Subdictionary `category` of a resource dictionary, created when missing.
pub(crate) fn resource_entry<'a>(resources: &'a mut Dict, category: &str) -> Option<&'a mut Dict> {
    let slot = resources
        .entry(category.to_string())
        .or_insert_with(|| Object::Dictionary(Dict::new()));
    if !matches!(slot, Object::Dictionary(_)) {
        *slot = Object::Dictionary(Dict::new());
    }
    slot.as_dict_mut()
}

/// First `prefix{n}` key not yet used in `dict`.
pub(crate) fn unused_name(dict: &Dict, prefix: &str) -> String {
    (0..)
        .map(|n| format!("{prefix}{n}"))
        .find(|candidate| !dict.contains_key(candidate))
        .unwrap_or_else(|| prefix.to_string())
}

/// Wraps the existing content in `q`/`Q` and appends `overlay` as a new
/// compressed stream, so overlay drawing starts from the default graphics state.
pub(crate) fn append_content(doc: &mut PdfDoc, page: &PageInfo, overlay: &[u8]) -> Option<()> {
    let key = page.object?;
    let existing: Vec<Object> = match doc
        .get(key.0, key.1)
        .and_then(Object::as_dict)
        .and_then(|d| d.get("Contents"))
    {
        Some(contents) => match doc.resolve(contents) {
            Object::Array(items) => items.clone(),
            Object::Null => Vec::new(),
            _ => vec![contents.clone()],
        },
        None => Vec::new(),
    };

    let prefix = doc.add_object(Object::Stream {
        dict: Dict::new(),
        data: b"q\n".to_vec(),
    });
    let mut body = b"Q\n".to_vec();
    body.extend_from_slice(overlay);
    let mut suffix_dict = Dict::new();
    suffix_dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    let suffix = doc.add_object(Object::Stream {
        dict: suffix_dict,
        data: flate_encode(&body),
    });

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(prefix);
    contents.extend(existing);
    contents.push(suffix);
    doc.dict_mut(key)?
        .insert("Contents".to_string(), Object::Array(contents));
    Some(())
}

#[derive(Clone, Default)]
struct Inherited {
    resources: Option<Object>,
    media_box: Option<RectF>,
    crop_box: Option<RectF>,
    rotate: Option<i32>,
}

fn walk(
    doc: &PdfDoc,
    node: &Object,
    inherited: Inherited,
    visited: &mut HashSet<ObjRef>,
    out: &mut Vec<PageInfo>,
) {
    let object = node.as_reference();
    if let Some(key) = object
        && !visited.insert(key)
    {
        return;
    }
    let Some(dict) = doc.resolve(node).as_dict() else {
        return;
    };

    let own_resources = dict.get("Resources").cloned();
    let here = Inherited {
        resources: own_resources.clone().or_else(|| inherited.resources.clone()),
        media_box: dict
            .get("MediaBox")
            .and_then(|b| RectF::from_array(doc.resolve(b)))
            .or(inherited.media_box),
        crop_box: dict
            .get("CropBox")
            .and_then(|b| RectF::from_array(doc.resolve(b)))
            .or(inherited.crop_box),
        rotate: dict
            .get("Rotate")
            .and_then(|r| doc.resolve(r).as_i64())
            .map(normalize_rotation)
            .or(inherited.rotate),
    };

    let is_page = dict.get("Type").and_then(|t| t.as_name()) == Some("Page")
        || (dict.get("Kids").is_none() && dict.contains_key("Contents"));
    if is_page {
        out.push(PageInfo {
            object,
            media_box: here.media_box.unwrap_or(US_LETTER),
            crop_box: here.crop_box,
            rotate: here.rotate.unwrap_or(0),
            resources_inherited: own_resources.is_none() && here.resources.is_some(),
            resources: here.resources,
            dict: dict.clone(),
        });
        return;
    }
    let Some(kids) = dict.get("Kids").and_then(|k| doc.resolve(k).as_array()) else {
        return;
    };
    for kid in kids {
        walk(doc, kid, here.clone(), visited, out);
    }
}

fn normalize_rotation(raw: i64) -> i32 {
    match raw.rem_euclid(360) {
        90 => 90,
        180 => 180,
        270 => 270,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::tokenizer::Lexer;

    fn doc(input: &[u8]) -> PdfDoc {
        Parser::new(Lexer::new(input)).parse().expect("parse")
    }

    #[test]
    fn pages_inherit_media_box_and_resources() {
        let doc = doc(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
            2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /MediaBox [0 0 200 300] \
                /Resources << /Font << >> >> >> endobj\n\
            3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n\
            4 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Rotate -90 \
                /Resources << >> >> endobj\n\
            trailer << /Root 1 0 R >>");
        let pages = collect_pages(&doc);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].object, Some((3, 0)));
        assert_eq!(pages[0].height(), 300.0);
        assert!(pages[0].resources_inherited);
        assert_eq!(pages[1].width(), 612.0);
        assert_eq!(pages[1].rotate, 270);
        assert!(!pages[1].resources_inherited);
    }

    #[test]
    fn cyclic_kids_do_not_loop() {
        let doc = doc(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
            2 0 obj << /Type /Pages /Kids [2 0 R 3 0 R] >> endobj\n\
            3 0 obj << /Type /Page >> endobj\n\
            trailer << /Root 1 0 R >>");
        assert_eq!(page_count(&doc), 1);
    }
    #[test]
    fn owned_resources_are_unshared() {
        let mut doc = doc(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
            2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Resources 5 0 R >> endobj\n\
            3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n\
            4 0 obj << /Type /Page /Parent 2 0 R >> endobj\n\
            5 0 obj << /Font 6 0 R >> endobj\n\
            6 0 obj << /F1 7 0 R >> endobj\n\
            trailer << /Root 1 0 R >>");
        let pages = collect_pages(&doc);
        let resources = own_resources(&mut doc, &pages[0]).expect("resources");
        resource_entry(resources, "Font")
            .expect("fonts")
            .insert("Extra".into(), Object::Null);
        let fonts = doc.get(6, 0).and_then(Object::as_dict).expect("shared fonts");
        assert!(!fonts.contains_key("Extra"));
        let again = collect_pages(&doc);
        assert!(!again[0].resources_inherited);
        assert!(again[1].resources_inherited);
    }

    #[test]
    fn appended_content_is_bracketed() {
        let mut doc = doc(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
            2 0 obj << /Type /Pages /Kids [3 0 R] >> endobj\n\
            3 0 obj << /Type /Page /Parent 2 0 R /Contents 4 0 R >> endobj\n\
            4 0 obj << /Length 8 >>\nstream\n1 0 0 RG\nendstream\nendobj\n\
            trailer << /Root 1 0 R >>");
        let pages = collect_pages(&doc);
        append_content(&mut doc, &pages[0], b"BT ET\n").expect("append");
        let page = &collect_pages(&doc)[0];
        let text = String::from_utf8(page.content_bytes(&doc)).expect("utf8");
        assert_eq!(text, "q\n\n1 0 0 RG\nQ\nBT ET\n\n");
    }

    #[test]
    fn unused_names_skip_taken_keys() {
        let mut dict = Dict::new();
        dict.insert("Fm0".into(), Object::Null);
        assert_eq!(unused_name(&dict, "Fm"), "Fm1");
    }
}
