use std::collections::HashSet;

use tracing::debug;

use crate::content::{ANNOT_HIDDEN, ANNOT_NO_VIEW, ContentTokenizer, appearance_placement};
use crate::error::EngineError;
use crate::fonts::{helvetica_font_dict, helvetica_text_width, winansi_encode};
use crate::geometry::RectF;
use crate::model::{Dict, ObjRef, Object, decode_text_string, encode_text_string};
use crate::pages::{append_content, collect_pages, own_resources, resource_entry, unused_name};
use crate::parser::{PdfDoc, flate_encode};
use crate::writer::{format_number, write_object};

const MAX_FIELD_DEPTH: usize = 32;
const MIN_FONT_SIZE: f64 = 4.0;
const MAX_AUTO_FONT_SIZE: f64 = 12.0;
const TEXT_PADDING: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Button,
    Choice,
    Signature,
}

impl FieldKind {
    fn from_type(ft: Option<&str>) -> Option<Self> {
        match ft {
            Some("Tx") => Some(FieldKind::Text),
            Some("Btn") => Some(FieldKind::Button),
            Some("Ch") => Some(FieldKind::Choice),
            Some("Sig") => Some(FieldKind::Signature),
            _ => None,
        }
    }
}

/// A terminal form field with its fully qualified name and widget annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    /// `None` when no `/FT` is set on the field or any ancestor.
    pub kind: Option<FieldKind>,
    pub object: ObjRef,
    pub widgets: Vec<ObjRef>,
    pub value: String,
    pub default_appearance: Option<String>,
}

impl FormField {
    /// Text fields, plus untyped fields which viewers also treat as text.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, Some(FieldKind::Text) | None)
    }
}

#[derive(Clone, Default)]
struct InheritedField {
    name: String,
    field_type: Option<String>,
    default_appearance: Option<String>,
    value: Option<Object>,
}

/// Walks `/AcroForm /Fields` depth first, in document order.
pub fn enumerate_fields(doc: &PdfDoc) -> Vec<FormField> {
    let mut out = Vec::new();
    let Some(acroform) = doc
        .catalog()
        .and_then(|c| c.get("AcroForm"))
        .and_then(|a| doc.resolve(a).as_dict())
    else {
        return out;
    };
    let Some(fields) = acroform.get("Fields").and_then(|f| doc.resolve(f).as_array()) else {
        return out;
    };
    let root = InheritedField {
        default_appearance: acroform
            .get("DA")
            .and_then(|da| doc.resolve(da).as_bytes())
            .map(decode_text_string),
        ..InheritedField::default()
    };
    let mut visited = HashSet::new();
    for field in fields {
        if let Some(key) = field.as_reference() {
            walk_field(doc, key, &root, 0, &mut visited, &mut out);
        }
    }
    out
}

fn walk_field(
    doc: &PdfDoc,
    key: ObjRef,
    parent: &InheritedField,
    depth: usize,
    visited: &mut HashSet<ObjRef>,
    out: &mut Vec<FormField>,
) {
    if depth > MAX_FIELD_DEPTH || !visited.insert(key) {
        return;
    }
    let Some(dict) = doc.get(key.0, key.1).and_then(Object::as_dict) else {
        return;
    };

    let partial = dict
        .get("T")
        .and_then(|t| doc.resolve(t).as_bytes())
        .map(decode_text_string);
    let name = match (&partial, parent.name.is_empty()) {
        (Some(part), true) => part.clone(),
        (Some(part), false) => format!("{}.{}", parent.name, part),
        (None, _) => parent.name.clone(),
    };
    let here = InheritedField {
        name,
        field_type: dict
            .get("FT")
            .and_then(|ft| ft.as_name())
            .map(str::to_string)
            .or_else(|| parent.field_type.clone()),
        default_appearance: dict
            .get("DA")
            .and_then(|da| doc.resolve(da).as_bytes())
            .map(decode_text_string)
            .or_else(|| parent.default_appearance.clone()),
        value: dict
            .get("V")
            .map(|v| doc.resolve(v).clone())
            .or_else(|| parent.value.clone()),
    };

    let kids: Vec<ObjRef> = dict
        .get("Kids")
        .and_then(|k| doc.resolve(k).as_array())
        .map(|items| items.iter().filter_map(Object::as_reference).collect())
        .unwrap_or_default();
    let (child_fields, widgets): (Vec<ObjRef>, Vec<ObjRef>) = kids.into_iter().partition(|kid| {
        doc.get(kid.0, kid.1)
            .and_then(Object::as_dict)
            .is_some_and(|d| d.contains_key("T"))
    });

    if !child_fields.is_empty() {
        for child in child_fields {
            walk_field(doc, child, &here, depth + 1, visited, out);
        }
        return;
    }
    if here.name.is_empty() {
        debug!(object = key.0, "form field without a name skipped");
        return;
    }
    let widgets = if widgets.is_empty() && dict.contains_key("Rect") {
        vec![key]
    } else {
        widgets
    };
    let value = match &here.value {
        Some(Object::String(bytes)) => decode_text_string(bytes),
        Some(Object::Name(name)) => name.clone(),
        _ => String::new(),
    };
    out.push(FormField {
        name: here.name,
        kind: FieldKind::from_type(here.field_type.as_deref()),
        object: key,
        widgets,
        value,
        default_appearance: here.default_appearance,
    });
}

/// Writes field values together with generated Helvetica appearances.
pub struct FieldWriter<'d> {
    doc: &'d mut PdfDoc,
    font: Option<Object>,
}

impl<'d> FieldWriter<'d> {
    pub fn new(doc: &'d mut PdfDoc) -> Self {
        Self { doc, font: None }
    }

    fn font(&mut self) -> Object {
        if let Some(font) = &self.font {
            return font.clone();
        }
        let font = self.doc.add_object(helvetica_font_dict());
        self.font = Some(font.clone());
        font
    }

    /// Sets `/V` and replaces the normal appearance of every widget.
    pub fn set_text_value(&mut self, field: &FormField, value: &str) -> Result<(), EngineError> {
        let dict = self.doc.dict_mut(field.object).ok_or_else(|| {
            EngineError::OutputBuild(format!("field {:?} has no dictionary", field.name))
        })?;
        dict.insert("V".to_string(), Object::String(encode_text_string(value)));

        let requested = field
            .default_appearance
            .as_deref()
            .and_then(font_size_from_da)
            .unwrap_or(0.0);
        for widget in &field.widgets {
            let Some(rect) = self
                .doc
                .get(widget.0, widget.1)
                .and_then(Object::as_dict)
                .and_then(|w| w.get("Rect"))
                .and_then(|r| RectF::from_array(self.doc.resolve(r)))
            else {
                debug!(field = %field.name, widget = widget.0, "widget without /Rect skipped");
                continue;
            };
            let stream = self.appearance_stream(rect, value, requested);
            let appearance = self.doc.add_object(stream);
            let mut ap = Dict::new();
            ap.insert("N".to_string(), appearance);
            if let Some(widget) = self.doc.dict_mut(*widget) {
                widget.insert("AP".to_string(), Object::Dictionary(ap));
            }
        }
        Ok(())
    }

    fn appearance_stream(&mut self, rect: RectF, value: &str, requested: f64) -> Object {
        let (width, height) = (rect.width(), rect.height());
        let mut content = b"/Tx BMC\n".to_vec();
        if !value.is_empty() {
            let size = fit_font_size(value, requested, width, height);
            let baseline = ((height - size) / 2.0 + size * 0.22).max(0.0);
            content.extend_from_slice(
                format!(
                    "q\nBT\n/Helv {} Tf\n0 g\n{} {} Td\n",
                    format_number(size),
                    format_number(TEXT_PADDING),
                    format_number(baseline)
                )
                .as_bytes(),
            );
            write_object(&Object::String(winansi_encode(value)), &mut content);
            content.extend_from_slice(b" Tj\nET\nQ\n");
        }
        content.extend_from_slice(b"EMC\n");

        let mut fonts = Dict::new();
        fonts.insert("Helv".to_string(), self.font());
        let mut resources = Dict::new();
        resources.insert("Font".to_string(), Object::Dictionary(fonts));

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Form"));
        dict.insert(
            "BBox".to_string(),
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width),
                Object::Real(height),
            ]),
        );
        dict.insert("Resources".to_string(), Object::Dictionary(resources));
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        Object::Stream {
            dict,
            data: flate_encode(&content),
        }
    }

    /// Asks viewers to regenerate appearances and registers `/Helv` in the form's resources.
    pub fn mark_need_appearances(&mut self) {
        let font = self.font();
        let Some(acroform) = acroform_mut(self.doc) else {
            return;
        };
        acroform.insert("NeedAppearances".to_string(), Object::Boolean(true));
        let dr = acroform
            .entry("DR".to_string())
            .or_insert_with(|| Object::Dictionary(Dict::new()));
        if let Some(dr) = dr.as_dict_mut()
            && let Some(fonts) = resource_entry(dr, "Font")
        {
            fonts.entry("Helv".to_string()).or_insert(font);
        }
    }
}

fn acroform_mut(doc: &mut PdfDoc) -> Option<&mut Dict> {
    match doc.catalog()?.get("AcroForm")?.as_reference() {
        Some(key) => doc.dict_mut(key),
        None => doc.catalog_mut()?.get_mut("AcroForm")?.as_dict_mut(),
    }
}

fn font_size_from_da(da: &str) -> Option<f64> {
    let mut tokens = ContentTokenizer::new(da.as_bytes());
    let mut operands = Vec::new();
    let mut size = None;
    while let Some(op) = tokens.next_op_into(&mut operands) {
        if op == "Tf" {
            size = operands.get(1).and_then(Object::as_f64);
        }
    }
    size.filter(|s| *s > 0.0)
}

/// Explicit sizes are kept unless the text overflows; auto size follows the widget height.
fn fit_font_size(value: &str, requested: f64, width: f64, height: f64) -> f64 {
    let mut size = if requested > 0.0 {
        requested
    } else {
        (height * 0.65).clamp(MIN_FONT_SIZE, MAX_AUTO_FONT_SIZE)
    };
    let available = width - 2.0 * TEXT_PADDING;
    let text_width = helvetica_text_width(value, size);
    if available > 0.0 && text_width > available {
        size = (size * available / text_width).max(MIN_FONT_SIZE);
    }
    size
}

/// Draws every visible widget appearance into its page's content, then removes
/// the widgets and the `/AcroForm` entry. Returns the number of widgets drawn.
pub fn flatten(doc: &mut PdfDoc) -> Result<usize, EngineError> {
    let mut drawn = 0;
    for page in collect_pages(doc) {
        let Some(page_key) = page.object else {
            continue;
        };
        let annots: Vec<Object> = match doc
            .get(page_key.0, page_key.1)
            .and_then(Object::as_dict)
            .and_then(|d| d.get("Annots"))
            .map(|a| doc.resolve(a))
        {
            Some(Object::Array(items)) => items.clone(),
            _ => continue,
        };

        let mut keep = Vec::new();
        let mut forms = Vec::new();
        for annot in annots {
            let (is_widget, form) = match doc.resolve(&annot).as_dict() {
                Some(dict) if dict.get("Subtype").and_then(|s| s.as_name()) == Some("Widget") => {
                    let flags = dict.get("F").and_then(Object::as_i64).unwrap_or(0);
                    let form = if flags & (ANNOT_HIDDEN | ANNOT_NO_VIEW) != 0 {
                        None
                    } else {
                        appearance_placement(doc, dict)
                            .map(|(stream, placement)| (as_form_xobject(stream, dict), placement))
                    };
                    (true, form)
                }
                Some(_) => (false, None),
                None => continue,
            };
            if !is_widget {
                keep.push(annot);
            }
            forms.extend(form);
        }

        let refs: Vec<Object> = forms
            .iter()
            .map(|(form, _)| doc.add_object(form.clone()))
            .collect();
        let mut content = Vec::new();
        if !refs.is_empty() {
            let resources = own_resources(doc, &page).ok_or_else(|| {
                EngineError::OutputBuild(format!("page object {} is not editable", page_key.0))
            })?;
            let xobjects = resource_entry(resources, "XObject").ok_or_else(|| {
                EngineError::OutputBuild("page /XObject resources are not a dictionary".into())
            })?;
            for (form_ref, (_, placement)) in refs.into_iter().zip(&forms) {
                let name = unused_name(xobjects, "Flat");
                xobjects.insert(name.clone(), form_ref);
                let [a, b, c, d, e, f] = placement.to_array().map(format_number);
                content.extend_from_slice(
                    format!("q {a} {b} {c} {d} {e} {f} cm /{name} Do Q\n").as_bytes(),
                );
                drawn += 1;
            }
            append_content(doc, &page, &content).ok_or_else(|| {
                EngineError::OutputBuild(format!("page object {} has no dictionary", page_key.0))
            })?;
        }

        if let Some(dict) = doc.dict_mut(page_key) {
            if keep.is_empty() {
                dict.remove("Annots");
            } else {
                dict.insert("Annots".to_string(), Object::Array(keep));
            }
        }
    }
    if let Some(catalog) = doc.catalog_mut() {
        catalog.remove("AcroForm");
    }
    debug!(drawn, "flattened form widgets");
    Ok(drawn)
}

/// Copy of an appearance stream ready to be drawn with `Do`: its `/Matrix`
/// is dropped because the placement matrix already includes it.
fn as_form_xobject(stream: &Object, annot: &Dict) -> Object {
    let mut form = stream.clone();
    if let Object::Stream { dict, .. } = &mut form {
        dict.remove("Matrix");
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Form"));
        if !dict.contains_key("BBox")
            && let Some(rect) = annot.get("Rect")
        {
            dict.insert("BBox".to_string(), rect.clone());
        }
    }
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ExtractOptions, extract_runs};
    use crate::parser::Parser;
    use crate::tokenizer::Lexer;

    const FORM: &[u8] = b"%PDF-1.7\n\
        1 0 obj << /Type /Catalog /Pages 2 0 R \
            /AcroForm << /Fields [5 0 R 7 0 R] /DA (/Helv 0 Tf 0 g) >> >> endobj\n\
        2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n\
        3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
            /Resources << /Font << /F1 9 0 R >> >> /Annots [6 0 R 8 0 R 10 0 R] >> endobj\n\
        4 0 obj << /Length 36 >>\nstream\nBT /F1 12 Tf 72 720 Td (Label) Tj ET\nendstream\nendobj\n\
        5 0 obj << /T (applicant) /FT /Tx /Kids [6 0 R] >> endobj\n\
        6 0 obj << /T (firstName) /Parent 5 0 R /Subtype /Widget \
            /Rect [100 600 300 620] /P 3 0 R >> endobj\n\
        7 0 obj << /T (dob) /FT /Tx /DA (/Helv 9 Tf 0 g) /V (old) /Kids [8 0 R] >> endobj\n\
        8 0 obj << /Parent 7 0 R /Subtype /Widget /Rect [100 560 200 580] /P 3 0 R >> endobj\n\
        9 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n\
        10 0 obj << /Subtype /Link /Rect [0 0 10 10] >> endobj\n\
        trailer << /Root 1 0 R >>";

    fn form() -> PdfDoc {
        Parser::new(Lexer::new(FORM)).parse().expect("parse")
    }

    #[test]
    fn fields_get_qualified_names_and_widgets() {
        let fields = enumerate_fields(&form());
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["applicant.firstName", "dob"]);
        assert_eq!(fields[0].widgets, vec![(6, 0)]);
        assert_eq!(fields[0].kind, Some(FieldKind::Text));
        assert_eq!(fields[1].widgets, vec![(8, 0)]);
        assert_eq!(fields[1].value, "old");
        assert_eq!(fields[1].default_appearance.as_deref(), Some("/Helv 9 Tf 0 g"));
    }

    #[test]
    fn filled_and_flattened_values_become_page_text() {
        let mut doc = form();
        let fields = enumerate_fields(&doc);
        let mut writer = FieldWriter::new(&mut doc);
        writer.set_text_value(&fields[0], "Ada").expect("set");
        writer.set_text_value(&fields[1], "05/02/1990").expect("set");
        assert_eq!(flatten(&mut doc).expect("flatten"), 2);

        assert!(doc.catalog().expect("catalog").get("AcroForm").is_none());
        let runs = extract_runs(&doc, ExtractOptions { include_annotations: true });
        let texts: Vec<&str> = runs[0].iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts.iter().filter(|t| **t == "Ada").count(), 1);
        assert_eq!(texts.iter().filter(|t| **t == "05/02/1990").count(), 1);
        assert!(texts.contains(&"Label"));

        let ada = runs[0].iter().find(|r| r.text == "Ada").expect("Ada run");
        assert!(ada.x > 100.0 && ada.x < 110.0);
        assert!(ada.y > 600.0 && ada.y < 620.0);
    }

    #[test]
    fn non_widget_annotations_survive_flattening() {
        let mut doc = form();
        flatten(&mut doc).expect("flatten");
        let page = &collect_pages(&doc)[0];
        let annots = page.annotations(&doc);
        assert_eq!(annots.len(), 1);
        assert_eq!(annots[0].get("Subtype").and_then(|s| s.as_name()), Some("Link"));
    }

    #[test]
    fn need_appearances_is_set_when_not_flattening() {
        let mut doc = form();
        FieldWriter::new(&mut doc).mark_need_appearances();
        let acroform = doc
            .catalog()
            .and_then(|c| c.get("AcroForm"))
            .and_then(Object::as_dict)
            .expect("acroform");
        assert_eq!(acroform.get("NeedAppearances"), Some(&Object::Boolean(true)));
    }

    #[test]
    fn long_values_shrink_to_fit() {
        let long = "A very long value that cannot fit in a narrow widget";
        let size = fit_font_size(long, 10.0, 100.0, 20.0);
        assert!(size < 10.0);
        assert!(helvetica_text_width(long, size) <= 96.5 || size == MIN_FONT_SIZE);
        assert_eq!(fit_font_size("ok", 0.0, 200.0, 20.0), 12.0);
        assert_eq!(font_size_from_da("/Helv 0 Tf 0 g"), None);
    }
}
