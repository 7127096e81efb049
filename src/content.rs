use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::fonts::{FontMap, FontMetrics, build_font_map};
use crate::geometry::{Matrix, RectF, map_bbox_to_rect};
use crate::model::{Dict, Object};
use crate::pages::{PageInfo, collect_pages};
use crate::parser::PdfDoc;
use crate::tokenizer::{Lexer, Token};

const MAX_FORM_DEPTH: usize = 12;

/// Annotation flag bits that keep a widget off the rendered page.
pub(crate) const ANNOT_HIDDEN: i64 = 1 << 1;
pub(crate) const ANNOT_NO_VIEW: i64 = 1 << 5;

/// Glyphs painted by one text-showing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub page_index: usize,
    /// Baseline origin relative to the lower-left corner of the MediaBox.
    pub x: f64,
    pub y: f64,
    /// Horizontal distance covered by the operator, never negative.
    pub width: f64,
    /// Glyph height in page space.
    pub font_size: f64,
    pub char_count: usize,
}

impl TextRun {
    /// Approximate ink box, from the descender to a cap height above the baseline.
    pub fn bounds(&self) -> RectF {
        RectF::new(
            self.x,
            self.y - self.font_size * 0.25,
            self.x + self.width.max(self.font_size * 0.5),
            self.y + self.font_size * 0.8,
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Also interpret annotation appearance streams (filled field values).
    pub include_annotations: bool,
}

/// Runs for every page, indexed by zero-based page number.
pub fn extract_runs(doc: &PdfDoc, options: ExtractOptions) -> Vec<Vec<TextRun>> {
    collect_pages(doc)
        .iter()
        .enumerate()
        .map(|(index, page)| extract_page_runs(doc, page, index, options))
        .collect()
}

pub fn extract_page_runs(
    doc: &PdfDoc,
    page: &PageInfo,
    page_index: usize,
    options: ExtractOptions,
) -> Vec<TextRun> {
    let mut interp = Interpreter::new(doc, page_index, page.media_box);
    let content = page.content_bytes(doc);
    interp.run(&content, page.resources_dict(doc), Matrix::identity(), 0);

    if options.include_annotations {
        for annot in page.annotations(doc) {
            let flags = annot.get("F").and_then(|f| f.as_i64()).unwrap_or(0);
            if flags & (ANNOT_HIDDEN | ANNOT_NO_VIEW) != 0 {
                continue;
            }
            let Some((stream, placement)) = appearance_placement(doc, annot) else {
                continue;
            };
            let Some(bytes) = doc.stream_data(stream) else {
                continue;
            };
            let resources = stream
                .as_dict()
                .and_then(|d| d.get("Resources"))
                .and_then(|r| doc.resolve(r).as_dict());
            interp.run(&bytes, resources, placement, 1);
        }
    }
    interp.runs
}

/// Normal appearance stream of an annotation, honouring `/AS` for state dictionaries.
pub(crate) fn normal_appearance<'a>(doc: &'a PdfDoc, annot: &'a Dict) -> Option<&'a Object> {
    let normal = annot
        .get("AP")
        .and_then(|ap| doc.resolve(ap).as_dict())?
        .get("N")
        .map(|n| doc.resolve(n))?;
    match normal {
        Object::Stream { .. } => Some(normal),
        Object::Dictionary(states) => {
            let state = annot.get("AS").and_then(|s| s.as_name())?;
            match states.get(state).map(|s| doc.resolve(s)) {
                Some(stream @ Object::Stream { .. }) => Some(stream),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Appearance stream plus the matrix that places it on the page: the form
/// matrix followed by the fit of its transformed BBox onto the annotation Rect.
pub(crate) fn appearance_placement<'a>(
    doc: &'a PdfDoc,
    annot: &'a Dict,
) -> Option<(&'a Object, Matrix)> {
    let rect = annot.get("Rect").and_then(|r| RectF::from_array(doc.resolve(r)))?;
    let stream = normal_appearance(doc, annot)?;
    let dict = stream.as_dict()?;
    let form_matrix = dict
        .get("Matrix")
        .and_then(|m| doc.resolve(m).as_array())
        .and_then(Matrix::from_operands)
        .unwrap_or_default();
    let bbox = dict
        .get("BBox")
        .and_then(|b| RectF::from_array(doc.resolve(b)))
        .unwrap_or(rect)
        .transform(form_matrix);
    Some((stream, map_bbox_to_rect(bbox, rect).multiply(form_matrix)))
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Arc<FontMetrics>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horiz_scaling: f64,
    leading: f64,
    rise: f64,
    text_matrix: Matrix,
    line_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horiz_scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            text_matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
        }
    }
}

impl TextState {
    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = self.line_matrix.multiply(Matrix::translate(tx, ty));
        self.text_matrix = self.line_matrix;
    }

    /// Text rendering matrix at the current text position.
    fn rendering_matrix(&self, ctm: Matrix) -> Matrix {
        ctm.multiply(self.text_matrix.multiply(Matrix {
            a: self.font_size * self.horiz_scaling / 100.0,
            b: 0.0,
            c: 0.0,
            d: self.font_size,
            e: 0.0,
            f: self.rise,
        }))
    }
}

/// One element of a show-text operand: glyph bytes or a `TJ` adjustment.
enum ShowItem<'a> {
    Glyphs(&'a [u8]),
    Kern(f64),
}

struct Interpreter<'d> {
    doc: &'d PdfDoc,
    page_index: usize,
    origin: (f64, f64),
    fallback_font: Arc<FontMetrics>,
    font_cache: HashMap<usize, Arc<FontMap>>,
    runs: Vec<TextRun>,
}

impl<'d> Interpreter<'d> {
    fn new(doc: &'d PdfDoc, page_index: usize, media_box: RectF) -> Self {
        Self {
            doc,
            page_index,
            origin: (media_box.min_x, media_box.min_y),
            fallback_font: Arc::new(FontMetrics::helvetica()),
            font_cache: HashMap::new(),
            runs: Vec::new(),
        }
    }

    fn fonts_for(&mut self, resources: Option<&'d Dict>) -> Arc<FontMap> {
        let key = resources.map_or(0usize, |r| r as *const Dict as usize);
        let doc = self.doc;
        self.font_cache
            .entry(key)
            .or_insert_with(|| Arc::new(build_font_map(doc, resources)))
            .clone()
    }

    fn run(&mut self, content: &[u8], resources: Option<&'d Dict>, ctm: Matrix, depth: usize) {
        if depth > MAX_FORM_DEPTH {
            debug!(depth, "form XObject nesting too deep");
            return;
        }
        let doc = self.doc;
        let fonts = self.fonts_for(resources);
        let xobjects = resources
            .and_then(|r| r.get("XObject"))
            .and_then(|x| doc.resolve(x).as_dict());

        let mut ctm = ctm;
        let mut ts = TextState::default();
        let mut saved: Vec<(Matrix, TextState)> = Vec::new();
        let mut tokens = ContentTokenizer::new(content);
        let mut operands: Vec<Object> = Vec::with_capacity(8);

        while let Some(op) = tokens.next_op_into(&mut operands) {
            match op.as_str() {
                "q" => saved.push((ctm, ts.clone())),
                "Q" => {
                    if let Some((m, state)) = saved.pop() {
                        ctm = m;
                        ts = state;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&operands) {
                        ctm = ctm.multiply(m);
                    }
                }
                "BT" => {
                    ts.text_matrix = Matrix::identity();
                    ts.line_matrix = Matrix::identity();
                }
                "Tf" => {
                    if let (Some(name), Some(size)) = (
                        operands.first().and_then(|n| n.as_name()),
                        operands.get(1).and_then(|s| s.as_f64()),
                    ) {
                        ts.font = Some(match fonts.get(name) {
                            Some(font) => font.clone(),
                            None => {
                                debug!(
                                    font = name,
                                    "unknown font resource, using Helvetica metrics"
                                );
                                self.fallback_font.clone()
                            }
                        });
                        ts.font_size = size;
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(&operands) {
                        ts.text_matrix = m;
                        ts.line_matrix = m;
                    }
                }
                "Td" => {
                    if let [tx, ty] = operands.as_slice() {
                        ts.next_line(num(tx), num(ty));
                    }
                }
                "TD" => {
                    if let [tx, ty] = operands.as_slice() {
                        ts.leading = -num(ty);
                        ts.next_line(num(tx), num(ty));
                    }
                }
                "T*" => ts.next_line(0.0, -ts.leading),
                "TL" => ts.leading = first_num(&operands).unwrap_or(ts.leading),
                "Tc" => ts.char_spacing = first_num(&operands).unwrap_or(ts.char_spacing),
                "Tw" => ts.word_spacing = first_num(&operands).unwrap_or(ts.word_spacing),
                "Tz" => ts.horiz_scaling = first_num(&operands).unwrap_or(ts.horiz_scaling),
                "Ts" => ts.rise = first_num(&operands).unwrap_or(ts.rise),
                "Tj" => {
                    if let Some(Object::String(bytes)) = operands.first() {
                        self.show(&mut ts, ctm, &[ShowItem::Glyphs(bytes)]);
                    }
                }
                "'" => {
                    ts.next_line(0.0, -ts.leading);
                    if let Some(Object::String(bytes)) = operands.first() {
                        self.show(&mut ts, ctm, &[ShowItem::Glyphs(bytes)]);
                    }
                }
                "\"" => {
                    if let [aw, ac, Object::String(bytes)] = operands.as_slice() {
                        ts.word_spacing = num(aw);
                        ts.char_spacing = num(ac);
                        ts.next_line(0.0, -ts.leading);
                        self.show(&mut ts, ctm, &[ShowItem::Glyphs(bytes)]);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let items: Vec<ShowItem<'_>> = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes) => Some(ShowItem::Glyphs(bytes)),
                                Object::Integer(_) | Object::Real(_) => {
                                    Some(ShowItem::Kern(num(item)))
                                }
                                _ => None,
                            })
                            .collect();
                        self.show(&mut ts, ctm, &items);
                    }
                }
                "Do" => {
                    let Some(name) = operands.first().and_then(|n| n.as_name()) else {
                        continue;
                    };
                    let Some(xobj) = xobjects.and_then(|x| x.get(name)).map(|x| doc.resolve(x))
                    else {
                        continue;
                    };
                    let Object::Stream { dict, .. } = xobj else {
                        continue;
                    };
                    if dict.get("Subtype").and_then(|s| s.as_name()) != Some("Form") {
                        continue;
                    }
                    let form_matrix = dict
                        .get("Matrix")
                        .and_then(|m| doc.resolve(m).as_array())
                        .and_then(Matrix::from_operands)
                        .unwrap_or_default();
                    let form_resources = dict
                        .get("Resources")
                        .and_then(|r| doc.resolve(r).as_dict())
                        .or(resources);
                    if let Some(bytes) = doc.stream_data(xobj) {
                        self.run(&bytes, form_resources, ctm.multiply(form_matrix), depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    /// Advances the text matrix across `items` and records them as one run.
    fn show(&mut self, ts: &mut TextState, ctm: Matrix, items: &[ShowItem<'_>]) {
        let font = ts.font.clone().unwrap_or_else(|| self.fallback_font.clone());
        let start = ts.rendering_matrix(ctm);
        let mut text = String::new();
        let scale = ts.horiz_scaling / 100.0;

        for item in items {
            match item {
                ShowItem::Glyphs(bytes) => {
                    for glyph in font.decode(bytes) {
                        let mut advance = glyph.width * ts.font_size + ts.char_spacing;
                        if glyph.is_word_space {
                            advance += ts.word_spacing;
                        }
                        ts.text_matrix.advance(advance * scale);
                        text.push_str(&glyph.text);
                    }
                }
                ShowItem::Kern(kern) => {
                    let adjust = kern / 1000.0 * ts.font_size * scale;
                    ts.text_matrix = ts.text_matrix.multiply(Matrix::translate(-adjust, 0.0));
                }
            }
        }

        if text.is_empty() {
            return;
        }
        let end = ts.rendering_matrix(ctm);
        let (x0, y0) = start.apply(0.0, 0.0);
        let (x1, _) = end.apply(0.0, 0.0);
        self.runs.push(TextRun {
            char_count: text.chars().count(),
            text,
            page_index: self.page_index,
            x: x0 - self.origin.0,
            y: y0 - self.origin.1,
            width: (x1 - x0).max(0.0),
            font_size: start.c.hypot(start.d),
        });
    }
}

fn num(obj: &Object) -> f64 {
    obj.as_f64().unwrap_or(0.0)
}

fn first_num(operands: &[Object]) -> Option<f64> {
    operands.first().and_then(|v| v.as_f64())
}

/// Splits a content stream into operators and their operands.
pub(crate) struct ContentTokenizer<'a> {
    lexer: Lexer<'a>,
}

impl<'a> ContentTokenizer<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
        }
    }

    pub(crate) fn next_op_into(&mut self, operands: &mut Vec<Object>) -> Option<String> {
        operands.clear();
        while let Some(token) = self.lexer.next_token() {
            match token {
                Token::Keyword(op) if op == "BI" => {
                    self.skip_inline_image();
                    operands.clear();
                }
                Token::Keyword(op) => return Some(op),
                other => {
                    if let Some(obj) = self.object_from(other) {
                        operands.push(obj);
                    }
                }
            }
        }
        None
    }

    fn object_from(&mut self, token: Token) -> Option<Object> {
        match token {
            Token::Null => Some(Object::Null),
            Token::Boolean(v) => Some(Object::Boolean(v)),
            Token::Integer(v) => Some(Object::Integer(v)),
            Token::Real(v) => Some(Object::Real(v)),
            Token::String(v) | Token::HexString(v) => Some(Object::String(v)),
            Token::Name(v) => Some(Object::Name(v)),
            Token::ArrayStart => {
                let mut items = Vec::new();
                while let Some(next) = self.lexer.next_token() {
                    if next == Token::ArrayEnd {
                        break;
                    }
                    items.extend(self.object_from(next));
                }
                Some(Object::Array(items))
            }
            Token::DictStart => {
                let mut dict = Dict::new();
                let mut key: Option<String> = None;
                while let Some(next) = self.lexer.next_token() {
                    if next == Token::DictEnd {
                        break;
                    }
                    match (key.take(), next) {
                        (None, Token::Name(name)) => key = Some(name),
                        (Some(k), value) => {
                            if let Some(obj) = self.object_from(value) {
                                dict.insert(k, obj);
                            }
                        }
                        (None, _) => {}
                    }
                }
                Some(Object::Dictionary(dict))
            }
            _ => None,
        }
    }

    fn skip_inline_image(&mut self) {
        while let Some(token) = self.lexer.next_token() {
            if matches!(&token, Token::Keyword(op) if op == "ID") {
                self.lexer.skip_inline_image_data();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn runs_for(content: &str, resources: &str) -> Vec<TextRun> {
        let pdf = format!(
            "1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
             2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n\
             3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents 4 0 R {resources} >> endobj\n\
             4 0 obj << /Length {} >>\nstream\n{content}\nendstream\nendobj\n\
             5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n\
             trailer << /Root 1 0 R >>",
            content.len()
        );
        let doc = Parser::new(Lexer::new(pdf.as_bytes())).parse().expect("parse");
        extract_runs(&doc, ExtractOptions::default()).remove(0)
    }

    const HELV: &str = "/Resources << /Font << /F1 5 0 R >> >>";

    #[test]
    fn tj_produces_one_run_with_helvetica_width() {
        let runs = runs_for("BT /F1 10 Tf 72 700 Td (AA) Tj ET", HELV);
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.text, "AA");
        assert_eq!((run.x, run.y), (72.0, 700.0));
        assert!((run.width - 13.34).abs() < 1e-6);
        assert!((run.font_size - 10.0).abs() < 1e-9);
        assert_eq!(run.char_count, 2);
    }

    #[test]
    fn tj_array_kerning_is_part_of_one_run() {
        let runs = runs_for("BT /F1 10 Tf 0 0 Td [(A) -1000 (A)] TJ ET", HELV);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "AA");
        assert!((runs[0].width - (13.34 + 10.0)).abs() < 1e-6);
    }

    #[test]
    fn ctm_scales_font_size_and_position() {
        let runs = runs_for("q 2 0 0 2 10 20 cm BT /F1 6 Tf 5 5 Td (x) Tj ET Q", HELV);
        assert_eq!((runs[0].x, runs[0].y), (20.0, 30.0));
        assert!((runs[0].font_size - 12.0).abs() < 1e-9);
    }

    #[test]
    fn leading_moves_following_lines() {
        let runs = runs_for("BT /F1 10 Tf 14 TL 50 500 Td (a) Tj T* (b) Tj (c) ' ET", HELV);
        let ys: Vec<f64> = runs.iter().map(|r| r.y).collect();
        assert_eq!(ys, vec![500.0, 486.0, 472.0]);
    }

    #[test]
    fn missing_font_falls_back_to_helvetica() {
        let runs = runs_for("BT /Nope 10 Tf (AA) Tj ET", "");
        assert!((runs[0].width - 13.34).abs() < 1e-6);
    }

    #[test]
    fn inline_images_are_skipped() {
        let runs = runs_for("BI /W 1 /H 1 /BPC 8 /CS /G ID \u{1} EI BT /F1 10 Tf (z) Tj ET", HELV);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "z");
    }
}
