use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::model::{Dict, Object};
use crate::parser::PdfDoc;
use crate::tokenizer::{Lexer, Token};

/// Font resources keyed by their resource name (`/F1`).
pub type FontMap = HashMap<String, Arc<FontMetrics>>;

/// Helvetica advance widths for codes 32..=126, in 1/1000 em.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 222, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Times-Roman advance widths for codes 32..=126.
const TIMES_ASCII: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, 500, 500, 500,
    500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, 921, 722, 667, 667, 722, 611,
    556, 722, 722, 333, 389, 722, 611, 889, 722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722,
    722, 611, 333, 278, 333, 469, 500, 333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500,
    278, 778, 500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SingleByteEncoding {
    WinAnsi,
    MacRoman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base14Family {
    Helvetica,
    Times,
    Courier,
    Symbolic,
}

#[derive(Debug, Clone)]
struct CodeSpace {
    start: u32,
    end: u32,
    len: usize,
}

/// Parsed `begin*char` / `begin*range` sections of a CMap stream.
#[derive(Debug, Clone, Default)]
struct CMapTable {
    codespaces: Vec<CodeSpace>,
    singles: HashMap<u32, Vec<u8>>,
    ranges: Vec<(u32, u32, Vec<u8>)>,
    cid_singles: HashMap<u32, u32>,
    cid_ranges: Vec<(u32, u32, u32)>,
}

impl CMapTable {
    fn next_code(&self, bytes: &[u8], at: usize) -> (u32, usize) {
        for len in 1..=4 {
            if at + len > bytes.len() {
                break;
            }
            let code = be_u32(&bytes[at..at + len]);
            if self
                .codespaces
                .iter()
                .any(|r| r.len == len && (r.start..=r.end).contains(&code))
            {
                return (code, len);
            }
        }
        (u32::from(bytes[at]), 1)
    }

    fn unicode(&self, code: u32) -> Option<String> {
        if let Some(dst) = self.singles.get(&code) {
            return utf16be(dst);
        }
        let (start, _, dst) = self
            .ranges
            .iter()
            .find(|(start, end, _)| (*start..=*end).contains(&code))?;
        // Range targets increment the final UTF-16 unit.
        let mut units: Vec<u16> = dst
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let last = units.last_mut()?;
        *last = last.wrapping_add((code - start) as u16);
        String::from_utf16(&units).ok()
    }

    fn cid(&self, code: u32) -> u32 {
        if let Some(cid) = self.cid_singles.get(&code) {
            return *cid;
        }
        if let Some(dst) = self.singles.get(&code) {
            return be_u32(dst);
        }
        for (start, end, base) in &self.cid_ranges {
            if (*start..=*end).contains(&code) {
                return base + (code - start);
            }
        }
        for (start, end, dst) in &self.ranges {
            if (*start..=*end).contains(&code) {
                return be_u32(dst) + (code - start);
            }
        }
        code
    }
}

/// One decoded glyph of a show-text string.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    /// Horizontal displacement in text space for a font size of 1.
    pub width: f64,
    /// Single-byte code 32, which receives word spacing.
    pub is_word_space: bool,
}

#[derive(Debug, Clone)]
pub struct FontMetrics {
    first_char: i64,
    widths: Vec<f64>,
    units_to_text: f64,
    pub ascent: f64,
    pub descent: f64,
    to_unicode: Option<CMapTable>,
    /// Present for composite (Type0) fonts.
    cid_encoding: Option<CMapTable>,
    single_byte: SingleByteEncoding,
    overrides: HashMap<u32, char>,
    cid_widths: Vec<(u32, u32, f64)>,
    cid_default_width: f64,
}

impl FontMetrics {
    /// Metrics used when a page selects a font the resources do not define.
    pub fn helvetica() -> Self {
        base14_metrics(Base14Family::Helvetica)
    }

    pub fn is_composite(&self) -> bool {
        self.cid_encoding.is_some()
    }

    fn simple_width(&self, code: u32) -> f64 {
        let idx = i64::from(code) - self.first_char;
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.widths.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    fn cid_width(&self, cid: u32) -> f64 {
        self.cid_widths
            .iter()
            .find(|(start, end, _)| (*start..=*end).contains(&cid))
            .map(|(_, _, w)| *w)
            .unwrap_or(self.cid_default_width)
    }

    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let mut out = Vec::with_capacity(bytes.len());
        let mut at = 0;
        while at < bytes.len() {
            let (code, len) = match (&self.cid_encoding, &self.to_unicode) {
                (Some(enc), _) => enc.next_code(bytes, at),
                (None, Some(cmap)) if !cmap.codespaces.is_empty() => cmap.next_code(bytes, at),
                _ => (u32::from(bytes[at]), 1),
            };
            at += len;

            let width = match &self.cid_encoding {
                Some(enc) => self.cid_width(enc.cid(code)) * 0.001,
                None => self.simple_width(code) * self.units_to_text,
            };
            let text = self
                .to_unicode
                .as_ref()
                .and_then(|cmap| cmap.unicode(code))
                .map(|s| s.replace('\u{FFFD}', ""))
                .or_else(|| self.single_byte_char(code).map(String::from))
                .unwrap_or_default();
            out.push(Glyph {
                text,
                width,
                is_word_space: len == 1 && code == 32,
            });
        }
        out
    }

    fn single_byte_char(&self, code: u32) -> Option<char> {
        if self.is_composite() {
            return None;
        }
        if let Some(ch) = self.overrides.get(&code) {
            return Some(*ch);
        }
        let table = match self.single_byte {
            SingleByteEncoding::WinAnsi => &WIN_ANSI,
            SingleByteEncoding::MacRoman => &MAC_ROMAN,
        };
        let mapped = *table.get(usize::try_from(code).ok()?)?;
        if mapped == 0 {
            return None;
        }
        char::from_u32(u32::from(mapped))
    }
}

fn base14_metrics(family: Base14Family) -> FontMetrics {
    let mut widths = vec![0.0; 256];
    let (ascent, descent) = match family {
        Base14Family::Helvetica | Base14Family::Times => {
            let (table, fallback) = if family == Base14Family::Helvetica {
                (&HELVETICA_ASCII, 556.0)
            } else {
                (&TIMES_ASCII, 500.0)
            };
            for (i, w) in table.iter().enumerate() {
                widths[32 + i] = f64::from(*w);
            }
            widths.iter_mut().skip(128).for_each(|w| *w = fallback);
            if family == Base14Family::Helvetica {
                (718.0, -207.0)
            } else {
                (683.0, -217.0)
            }
        }
        Base14Family::Courier => {
            widths.iter_mut().skip(32).for_each(|w| *w = 600.0);
            (629.0, -157.0)
        }
        Base14Family::Symbolic => {
            widths.iter_mut().skip(32).for_each(|w| *w = 500.0);
            (700.0, -200.0)
        }
    };
    FontMetrics {
        first_char: 0,
        widths,
        units_to_text: 0.001,
        ascent,
        descent,
        to_unicode: None,
        cid_encoding: None,
        single_byte: SingleByteEncoding::WinAnsi,
        overrides: HashMap::new(),
        cid_widths: Vec::new(),
        cid_default_width: 1000.0,
    }
}

fn base14_family(base_font: &str) -> Option<Base14Family> {
    let name = match base_font.split_once('+') {
        Some((prefix, rest))
            if prefix.len() == 6 && prefix.bytes().all(|b| b.is_ascii_uppercase()) =>
        {
            rest
        }
        _ => base_font,
    };
    let norm: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if norm.starts_with("helvetica") || norm.starts_with("arial") {
        Some(Base14Family::Helvetica)
    } else if norm.starts_with("times") {
        Some(Base14Family::Times)
    } else if norm.starts_with("courier") {
        Some(Base14Family::Courier)
    } else if norm.starts_with("symbol") || norm.contains("dingbats") {
        Some(Base14Family::Symbolic)
    } else {
        None
    }
}

/// Builds metrics for every font in a resource dictionary's `/Font` entry.
pub fn build_font_map(doc: &PdfDoc, resources: Option<&Dict>) -> FontMap {
    let mut out = FontMap::new();
    let Some(fonts) = resources
        .and_then(|r| r.get("Font"))
        .and_then(|f| doc.resolve(f).as_dict())
    else {
        return out;
    };
    for (name, font) in fonts {
        match doc.resolve(font).as_dict() {
            Some(dict) => {
                out.insert(name.clone(), Arc::new(font_metrics(doc, dict)));
            }
            None => debug!(font = %name, "font resource is not a dictionary"),
        }
    }
    out
}

fn font_metrics(doc: &PdfDoc, dict: &Dict) -> FontMetrics {
    let base_font = dict.get("BaseFont").and_then(|v| v.as_name()).unwrap_or("");
    let family = base14_family(base_font);
    let mut metrics = base14_metrics(family.unwrap_or(Base14Family::Helvetica));

    let subtype = dict.get("Subtype").and_then(|v| v.as_name());
    let descriptor_source = if subtype == Some("Type0") {
        let descendant = dict
            .get("DescendantFonts")
            .map(|v| doc.resolve(v))
            .and_then(Object::as_array)
            .and_then(|arr| arr.first())
            .and_then(|first| doc.resolve(first).as_dict());
        metrics.cid_encoding = Some(match dict.get("Encoding").map(|e| doc.resolve(e)) {
            Some(stream @ Object::Stream { .. }) => doc
                .stream_data(stream)
                .map(|data| parse_cmap(&data))
                .unwrap_or_else(identity_cmap),
            _ => identity_cmap(),
        });
        if let Some(desc) = descendant {
            metrics.cid_default_width = desc
                .get("DW")
                .and_then(|v| doc.resolve(v).as_f64())
                .unwrap_or(1000.0);
            if let Some(w) = desc.get("W").and_then(|v| doc.resolve(v).as_array()) {
                metrics.cid_widths = parse_cid_widths(doc, w);
            }
        }
        descendant.unwrap_or(dict)
    } else {
        if let Some(enc) = dict.get("Encoding") {
            let (base, overrides) = parse_simple_encoding(doc, enc);
            metrics.single_byte = base;
            metrics.overrides = overrides;
        }
        dict
    };

    metrics.to_unicode = dict
        .get("ToUnicode")
        .and_then(|v| doc.stream_data(v))
        .map(|data| parse_cmap(&data));

    let descriptor = descriptor_source
        .get("FontDescriptor")
        .and_then(|v| doc.resolve(v).as_dict());
    if let Some(desc) = descriptor {
        if let Some(a) = desc.get("Ascent").and_then(|v| v.as_f64()).filter(|a| *a != 0.0) {
            metrics.ascent = a;
        }
        if let Some(d) = desc.get("Descent").and_then(|v| v.as_f64()).filter(|d| *d != 0.0) {
            metrics.descent = d;
        }
    }

    if subtype == Some("Type0") {
        return metrics;
    }

    let widths: Vec<f64> = dict
        .get("Widths")
        .and_then(|v| doc.resolve(v).as_array())
        .map(|arr| arr.iter().map(|w| doc.resolve(w).as_f64().unwrap_or(0.0)).collect())
        .unwrap_or_default();
    if subtype == Some("Type3") {
        metrics.units_to_text = dict
            .get("FontMatrix")
            .and_then(|v| doc.resolve(v).as_array())
            .and_then(|m| m.first())
            .and_then(|a| a.as_f64())
            .unwrap_or(0.001);
    }
    if widths.iter().any(|w| *w > 0.0) {
        metrics.first_char = dict.get("FirstChar").and_then(|v| v.as_i64()).unwrap_or(0);
        metrics.widths = widths;
    } else if family.is_none()
        && let Some((widths, units, ascent, descent)) = embedded_truetype_metrics(doc, descriptor)
    {
        metrics.first_char = 0;
        metrics.widths = widths;
        metrics.units_to_text = units;
        metrics.ascent = ascent;
        metrics.descent = descent;
    }
    metrics
}

/// Reads WinAnsi-indexed advances from an embedded `FontFile2`.
fn embedded_truetype_metrics(
    doc: &PdfDoc,
    descriptor: Option<&Dict>,
) -> Option<(Vec<f64>, f64, f64, f64)> {
    let file = descriptor?.get("FontFile2")?;
    let data = doc.stream_data(file)?;
    let face = ttf_parser::Face::parse(&data, 0).ok()?;
    let units_per_em = f64::from(face.units_per_em());
    if units_per_em == 0.0 {
        return None;
    }
    let mut widths = vec![0.0; 256];
    for (code, unicode) in WIN_ANSI.iter().enumerate() {
        let Some(ch) = char::from_u32(u32::from(*unicode)).filter(|_| *unicode != 0) else {
            continue;
        };
        if let Some(advance) = face.glyph_index(ch).and_then(|gid| face.glyph_hor_advance(gid)) {
            widths[code] = f64::from(advance);
        }
    }
    // Scale font units into the 1/1000 space the ascent fields use.
    let per_mille = 1000.0 / units_per_em;
    Some((
        widths,
        1.0 / units_per_em,
        f64::from(face.ascender()) * per_mille,
        f64::from(face.descender()) * per_mille,
    ))
}

fn parse_cid_widths(doc: &PdfDoc, arr: &[Object]) -> Vec<(u32, u32, f64)> {
    let items: Vec<&Object> = arr.iter().map(|v| doc.resolve(v)).collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < items.len() {
        let Some(start) = items[i].as_i64().and_then(|v| u32::try_from(v).ok()) else {
            i += 1;
            continue;
        };
        match items.get(i + 1) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = doc.resolve(w).as_f64() {
                        let cid = start + offset as u32;
                        out.push((cid, cid, w));
                    }
                }
                i += 2;
            }
            Some(end) if end.as_i64().is_some() => {
                let end = end.as_i64().and_then(|v| u32::try_from(v).ok()).unwrap_or(start);
                if let Some(w) = items.get(i + 2).and_then(|w| w.as_f64()) {
                    out.push((start, end, w));
                }
                i += 3;
            }
            _ => i += 1,
        }
    }
    out
}

fn parse_simple_encoding(doc: &PdfDoc, obj: &Object) -> (SingleByteEncoding, HashMap<u32, char>) {
    match doc.resolve(obj) {
        Object::Name(name) => (encoding_from_name(name), HashMap::new()),
        Object::Dictionary(dict) => {
            let base = dict
                .get("BaseEncoding")
                .and_then(|b| doc.resolve(b).as_name())
                .map(encoding_from_name)
                .unwrap_or(SingleByteEncoding::WinAnsi);
            let mut overrides = HashMap::new();
            let mut next: Option<u32> = None;
            let diffs = dict
                .get("Differences")
                .and_then(|d| doc.resolve(d).as_array())
                .unwrap_or(&[]);
            for entry in diffs {
                match doc.resolve(entry) {
                    Object::Integer(code) => next = u32::try_from(*code).ok(),
                    Object::Name(glyph) => {
                        if let Some(code) = next {
                            if let Some(ch) = glyph_name_char(glyph) {
                                overrides.insert(code, ch);
                            }
                            next = Some(code + 1);
                        }
                    }
                    _ => {}
                }
            }
            (base, overrides)
        }
        _ => (SingleByteEncoding::WinAnsi, HashMap::new()),
    }
}

fn encoding_from_name(name: &str) -> SingleByteEncoding {
    match name {
        "MacRomanEncoding" => SingleByteEncoding::MacRoman,
        _ => SingleByteEncoding::WinAnsi,
    }
}

/// Resolves the glyph names templates commonly remap: braces, underscores, spaces and `uniXXXX`.
fn glyph_name_char(name: &str) -> Option<char> {
    let named = match name {
        "space" | "nbspace" | "nonbreakingspace" => ' ',
        "braceleft" => '{',
        "braceright" => '}',
        "underscore" => '_',
        "period" => '.',
        "hyphen" => '-',
        "colon" => ':',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => {
            if let Some(hex) = name.strip_prefix("uni").filter(|h| h.len() == 4) {
                return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
            }
            let mut chars = name.chars();
            return match (chars.next(), chars.next()) {
                (Some(ch), None) if ch.is_ascii_alphabetic() => Some(ch),
                _ => None,
            };
        }
    };
    Some(named)
}

fn identity_cmap() -> CMapTable {
    CMapTable {
        codespaces: vec![CodeSpace {
            start: 0,
            end: 0xFFFF,
            len: 2,
        }],
        ..CMapTable::default()
    }
}

/// Parses a CMap program, either a ToUnicode map or a CID encoding.
fn parse_cmap(data: &[u8]) -> CMapTable {
    let mut table = CMapTable::default();
    let tokens: Vec<Token> = Lexer::new(data).collect();
    let mut i = 0;
    while i < tokens.len() {
        let Token::Keyword(kw) = &tokens[i] else {
            i += 1;
            continue;
        };
        let section_end = match kw.as_str() {
            "begincodespacerange" => "endcodespacerange",
            "beginbfchar" => "endbfchar",
            "beginbfrange" => "endbfrange",
            "begincidchar" => "endcidchar",
            "begincidrange" => "endcidrange",
            _ => {
                i += 1;
                continue;
            }
        };
        let begin = kw.clone();
        i += 1;
        let start = i;
        while i < tokens.len() && !matches!(&tokens[i], Token::Keyword(k) if k == section_end) {
            i += 1;
        }
        read_cmap_section(&mut table, &begin, &tokens[start..i]);
        i += 1;
    }
    table
}

fn read_cmap_section(table: &mut CMapTable, begin: &str, body: &[Token]) {
    let mut i = 0;
    while i < body.len() {
        match begin {
            "begincodespacerange" => {
                if let (Some(Token::HexString(lo)), Some(Token::HexString(hi))) =
                    (body.get(i), body.get(i + 1))
                    && !lo.is_empty()
                    && lo.len() == hi.len()
                {
                    table.codespaces.push(CodeSpace {
                        start: be_u32(lo),
                        end: be_u32(hi),
                        len: lo.len(),
                    });
                }
                i += 2;
            }
            "beginbfchar" => {
                if let (Some(Token::HexString(src)), Some(Token::HexString(dst))) =
                    (body.get(i), body.get(i + 1))
                {
                    table.singles.insert(be_u32(src), dst.clone());
                }
                i += 2;
            }
            "begincidchar" => {
                if let (Some(Token::HexString(src)), Some(Token::Integer(cid))) =
                    (body.get(i), body.get(i + 1))
                {
                    table.cid_singles.insert(be_u32(src), *cid as u32);
                }
                i += 2;
            }
            "begincidrange" => {
                if let (
                    Some(Token::HexString(lo)),
                    Some(Token::HexString(hi)),
                    Some(Token::Integer(cid)),
                ) = (body.get(i), body.get(i + 1), body.get(i + 2))
                {
                    table.cid_ranges.push((be_u32(lo), be_u32(hi), *cid as u32));
                }
                i += 3;
            }
            _ => {
                let (Some(Token::HexString(lo)), Some(Token::HexString(hi))) =
                    (body.get(i), body.get(i + 1))
                else {
                    i += 1;
                    continue;
                };
                let (lo, hi) = (be_u32(lo), be_u32(hi));
                match body.get(i + 2) {
                    Some(Token::HexString(dst)) => {
                        table.ranges.push((lo, hi, dst.clone()));
                        i += 3;
                    }
                    Some(Token::ArrayStart) => {
                        let mut j = i + 3;
                        let mut code = lo;
                        while let Some(Token::HexString(dst)) = body.get(j) {
                            if code <= hi {
                                table.singles.insert(code, dst.clone());
                            }
                            code += 1;
                            j += 1;
                        }
                        i = j + 1;
                    }
                    _ => i += 2,
                }
            }
        }
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn utf16be(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Font dictionary for the standard Helvetica with WinAnsi encoding, used for generated text.
pub(crate) fn helvetica_font_dict() -> Object {
    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("Font"));
    dict.insert("Subtype".to_string(), Object::name("Type1"));
    dict.insert("BaseFont".to_string(), Object::name("Helvetica"));
    dict.insert("Encoding".to_string(), Object::name("WinAnsiEncoding"));
    Object::Dictionary(dict)
}

/// Encodes text for a WinAnsi simple font; unmappable characters become `?`.
pub fn winansi_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| {
            let unicode = ch as u32;
            if (0x20..0x7F).contains(&unicode) || (0xA0..=0xFF).contains(&unicode) {
                return unicode as u8;
            }
            WIN_ANSI
                .iter()
                .position(|&mapped| mapped != 0 && u32::from(mapped) == unicode)
                .map(|code| code as u8)
                .unwrap_or(b'?')
        })
        .collect()
}

/// Advance width of `text` set in Helvetica at `font_size`.
pub fn helvetica_text_width(text: &str, font_size: f64) -> f64 {
    let units: f64 = winansi_encode(text)
        .into_iter()
        .map(|code| match code {
            32..=126 => f64::from(HELVETICA_ASCII[usize::from(code - 32)]),
            0..=31 => 0.0,
            _ => 556.0,
        })
        .sum();
    units * font_size / 1000.0
}

const WIN_ANSI: [u16; 256] = [
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x0060, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x20AC, 0x0000, 0x201A, 0x0192,
    0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0x0000, 0x017D, 0x0000,
    0x0000, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC, 0x2122, 0x0161, 0x203A,
    0x0153, 0x0000, 0x017E, 0x0178, 0x00A0, 0x00A1, 0x00A2, 0x00A3, 0x00A4, 0x00A5, 0x00A6, 0x00A7,
    0x00A8, 0x00A9, 0x00AA, 0x00AB, 0x00AC, 0x00AD, 0x00AE, 0x00AF, 0x00B0, 0x00B1, 0x00B2, 0x00B3,
    0x00B4, 0x00B5, 0x00B6, 0x00B7, 0x00B8, 0x00B9, 0x00BA, 0x00BB, 0x00BC, 0x00BD, 0x00BE, 0x00BF,
    0x00C0, 0x00C1, 0x00C2, 0x00C3, 0x00C4, 0x00C5, 0x00C6, 0x00C7, 0x00C8, 0x00C9, 0x00CA, 0x00CB,
    0x00CC, 0x00CD, 0x00CE, 0x00CF, 0x00D0, 0x00D1, 0x00D2, 0x00D3, 0x00D4, 0x00D5, 0x00D6, 0x00D7,
    0x00D8, 0x00D9, 0x00DA, 0x00DB, 0x00DC, 0x00DD, 0x00DE, 0x00DF, 0x00E0, 0x00E1, 0x00E2, 0x00E3,
    0x00E4, 0x00E5, 0x00E6, 0x00E7, 0x00E8, 0x00E9, 0x00EA, 0x00EB, 0x00EC, 0x00ED, 0x00EE, 0x00EF,
    0x00F0, 0x00F1, 0x00F2, 0x00F3, 0x00F4, 0x00F5, 0x00F6, 0x00F7, 0x00F8, 0x00F9, 0x00FA, 0x00FB,
    0x00FC, 0x00FD, 0x00FE, 0x00FF,
];

const MAC_ROMAN: [u16; 256] = [
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x0060, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x00C4, 0x00C5, 0x00C7, 0x00C9,
    0x00D1, 0x00D6, 0x00DC, 0x00E1, 0x00E0, 0x00E2, 0x00E4, 0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8,
    0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF, 0x00F1, 0x00F3, 0x00F2, 0x00F4, 0x00F6, 0x00F5,
    0x00FA, 0x00F9, 0x00FB, 0x00FC, 0x2020, 0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF,
    0x00AE, 0x00A9, 0x2122, 0x00B4, 0x00A8, 0x2260, 0x00C6, 0x00D8, 0x221E, 0x00B1, 0x2264, 0x2265,
    0x00A5, 0x00B5, 0x2202, 0x2211, 0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8,
    0x00BF, 0x00A1, 0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB, 0x00BB, 0x2026, 0x00A0, 0x00C0,
    0x00C3, 0x00D5, 0x0152, 0x0153, 0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA,
    0x00FF, 0x0178, 0x2044, 0x20AC, 0x2039, 0x203A, 0xFB01, 0xFB02, 0x2021, 0x00B7, 0x201A, 0x201E,
    0x2030, 0x00C2, 0x00CA, 0x00C1, 0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC, 0x00D3, 0x00D4,
    0xF8FF, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC, 0x00AF, 0x02D8, 0x02D9, 0x02DA,
    0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(font: &FontMetrics, bytes: &[u8]) -> String {
        font.decode(bytes).into_iter().map(|g| g.text).collect()
    }

    #[test]
    fn helvetica_widths_match_afm() {
        let font = FontMetrics::helvetica();
        let glyphs = font.decode(b"A ");
        assert!((glyphs[0].width - 0.667).abs() < 1e-9);
        assert!(glyphs[1].is_word_space);
        assert!((helvetica_text_width("AA", 10.0) - 13.34).abs() < 1e-9);
    }

    #[test]
    fn tounicode_bfrange_increments_last_unit() {
        let cmap = parse_cmap(
            b"1 begincodespacerange <00> <FF> endcodespacerange\n\
              1 beginbfchar <01> <007B> endbfchar\n\
              1 beginbfrange <10> <12> <0061> endbfrange\n\
              1 beginbfrange <20> <21> [<0078> <007D>] endbfrange",
        );
        let mut font = FontMetrics::helvetica();
        font.to_unicode = Some(cmap);
        assert_eq!(texts(&font, &[0x01, 0x10, 0x12, 0x20, 0x21]), "{acx}");
    }

    #[test]
    fn identity_h_reads_two_byte_codes() {
        let mut font = FontMetrics::helvetica();
        font.cid_encoding = Some(identity_cmap());
        font.cid_widths = vec![(3, 3, 250.0)];
        font.cid_default_width = 1000.0;
        let glyphs = font.decode(&[0x00, 0x03, 0x00, 0x04]);
        assert_eq!(glyphs.len(), 2);
        assert!((glyphs[0].width - 0.25).abs() < 1e-9);
        assert!((glyphs[1].width - 1.0).abs() < 1e-9);
    }

    #[test]
    fn differences_override_base_encoding() {
        let mut dict = Dict::new();
        dict.insert(
            "Differences".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::name("braceleft"),
                Object::name("braceright"),
                Object::name("uni00E9"),
            ]),
        );
        let (base, overrides) =
            parse_simple_encoding(&PdfDoc::default(), &Object::Dictionary(dict));
        assert_eq!(base, SingleByteEncoding::WinAnsi);
        assert_eq!(overrides.get(&1), Some(&'{'));
        assert_eq!(overrides.get(&2), Some(&'}'));
        assert_eq!(overrides.get(&3), Some(&'é'));
    }

    #[test]
    fn winansi_encoding_replaces_unmappable() {
        assert_eq!(winansi_encode("é€"), vec![0xE9, 0x80]);
        assert_eq!(winansi_encode("Ł"), b"?".to_vec());
    }

    #[test]
    fn subset_prefix_is_ignored_for_base14() {
        assert_eq!(base14_family("ABCDEF+Helvetica-Bold"), Some(Base14Family::Helvetica));
        assert_eq!(base14_family("Times-Roman"), Some(Base14Family::Times));
        assert_eq!(base14_family("Garamond"), None);
    }
}
