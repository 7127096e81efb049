use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};

use thiserror::Error;
use tracing::{debug, warn};

use crate::crypt::{CryptError, CryptMethod, SecurityHandler};
use crate::model::{Dict, ObjRef, Object};
use crate::tokenizer::{Lexer, Token, is_delim, is_whitespace};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid password for encrypted PDF")]
    InvalidPassword,
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),
    #[error("malformed encryption data: {0}")]
    MalformedEncryption(String),
}

impl From<CryptError> for ParseError {
    fn from(err: CryptError) -> Self {
        match err {
            CryptError::InvalidPassword => ParseError::InvalidPassword,
            CryptError::Unsupported(msg) => ParseError::UnsupportedEncryption(msg),
            CryptError::Malformed(msg) => ParseError::MalformedEncryption(msg),
        }
    }
}

/// How the document's `/Encrypt` entry was handled at load time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SecurityState {
    #[default]
    Unencrypted,
    Decrypted,
    /// Encryption metadata was left in place and the objects kept as stored.
    Ignored(String),
}

#[derive(Debug, Clone, Default)]
pub struct PdfDoc {
    pub objects: HashMap<ObjRef, Object>,
    pub trailer: Option<Object>,
    pub security: SecurityState,
}

impl PdfDoc {
    pub fn get(&self, obj_num: u32, gen_num: u16) -> Option<&Object> {
        self.objects.get(&(obj_num, gen_num))
    }

    pub fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        let mut current = obj;
        // Reference chains are legal but rare; cap them so cycles cannot hang.
        for _ in 0..8 {
            match current {
                Object::Reference { obj_num, gen_num } => {
                    match self.objects.get(&(*obj_num, *gen_num)) {
                        Some(next) => current = next,
                        None => return &Object::Null,
                    }
                }
                _ => return current,
            }
        }
        current
    }

    pub fn trailer_dict(&self) -> Option<&Dict> {
        self.trailer.as_ref().and_then(|t| t.as_dict())
    }

    pub fn catalog_ref(&self) -> Option<ObjRef> {
        self.trailer_dict()?.get("Root")?.as_reference()
    }

    pub fn catalog(&self) -> Option<&Dict> {
        let root = self.trailer_dict()?.get("Root")?;
        self.resolve(root).as_dict()
    }

    pub fn catalog_mut(&mut self) -> Option<&mut Dict> {
        let key = self.catalog_ref()?;
        self.objects.get_mut(&key)?.as_dict_mut()
    }

    pub fn dict_mut(&mut self, key: ObjRef) -> Option<&mut Dict> {
        self.objects.get_mut(&key)?.as_dict_mut()
    }

    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().map(|(num, _)| *num).max().unwrap_or(0)
    }

    /// Stores `obj` under a fresh object number and returns a reference to it.
    pub fn add_object(&mut self, obj: Object) -> Object {
        let key = (self.max_object_number() + 1, 0);
        self.objects.insert(key, obj);
        Object::reference(key)
    }

    /// Returns decoded stream bytes, following references and a leading `FlateDecode` filter.
    pub fn stream_data(&self, obj: &Object) -> Option<Vec<u8>> {
        match self.resolve(obj) {
            Object::Stream { dict, data } => {
                let filter = dict.get("Filter").map(|f| self.resolve(f));
                let first = match filter {
                    Some(Object::Name(name)) => Some(name.as_str()),
                    Some(Object::Array(items)) => {
                        items.first().and_then(|f| self.resolve(f).as_name())
                    }
                    _ => None,
                };
                match first {
                    Some("FlateDecode") | Some("Fl") => Some(flate_decode(data)),
                    _ => Some(data.clone()),
                }
            }
            _ => None,
        }
    }

    fn expand_object_streams(&mut self) {
        let mut containers: Vec<ObjRef> = self
            .objects
            .iter()
            .filter(|(_, obj)| {
                matches!(obj, Object::Stream { dict, .. }
                    if dict.get("Type").and_then(|v| v.as_name()) == Some("ObjStm"))
            })
            .map(|(key, _)| *key)
            .collect();
        containers.sort_unstable();

        let mut found: HashMap<ObjRef, Object> = HashMap::new();
        for key in containers {
            let Some(Object::Stream { dict, .. }) = self.objects.get(&key) else {
                continue;
            };
            let count = dict.get("N").and_then(|v| v.as_i64()).unwrap_or(0).max(0) as usize;
            let first = dict.get("First").and_then(|v| v.as_i64()).unwrap_or(0).max(0) as usize;
            let Some(body) = self.objects.get(&key).and_then(|s| self.stream_data(s)) else {
                continue;
            };
            if count == 0 || first == 0 || body.len() < first {
                continue;
            }

            let mut header = Lexer::new(&body[..first]);
            for _ in 0..count {
                let (Some(Token::Integer(num)), Some(Token::Integer(offset))) =
                    (header.next_token(), header.next_token())
                else {
                    break;
                };
                let member = (num as u32, 0);
                let pos = first + offset.max(0) as usize;
                // Directly parsed objects supersede stale object stream copies.
                if pos >= body.len()
                    || self.objects.contains_key(&member)
                    || found.contains_key(&member)
                {
                    continue;
                }
                if let Some(obj) = parse_object_at(&body, pos) {
                    found.insert(member, obj);
                }
            }
        }
        debug!(count = found.len(), "expanded object stream members");
        self.objects.extend(found);
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: VecDeque<Token>,
    length_cache: HashMap<ObjRef, Option<usize>>,
    header_index: Option<HashMap<ObjRef, Vec<usize>>>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            lookahead: VecDeque::new(),
            length_cache: HashMap::new(),
            header_index: None,
        }
    }

    pub fn parse(self) -> Result<PdfDoc, ParseError> {
        self.parse_with_password(None)
    }

    /// Parses and decrypts; `None` tries the empty user password.
    pub fn parse_with_password(mut self, password: Option<&[u8]>) -> Result<PdfDoc, ParseError> {
        let mut doc = self.parse_objects();
        if let Some(handler) = security_handler(&doc)? {
            let file_key = handler.authenticate(password.unwrap_or(b""))?;
            decrypt_document(&mut doc, &handler, &file_key)?;
            doc.security = SecurityState::Decrypted;
        }
        doc.expand_object_streams();
        Ok(doc)
    }

    /// Parses without ever failing on encryption: a document that cannot be
    /// opened with the empty password keeps its objects exactly as stored.
    pub fn parse_permissive(mut self) -> PdfDoc {
        let mut doc = self.parse_objects();
        let attempt = security_handler(&doc).and_then(|handler| {
            let Some(handler) = handler else {
                return Ok(None);
            };
            let file_key = handler.authenticate(b"")?;
            let mut decrypted = doc.objects.clone();
            decrypt_objects(&mut decrypted, &handler, &file_key)?;
            Ok(Some(decrypted))
        });
        match attempt {
            Ok(Some(objects)) => {
                doc.objects = objects;
                doc.security = SecurityState::Decrypted;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "ignoring document encryption");
                doc.security = SecurityState::Ignored(err.to_string());
            }
        }
        doc.expand_object_streams();
        doc
    }

    fn parse_objects(&mut self) -> PdfDoc {
        let mut objects: HashMap<ObjRef, Object> = HashMap::new();
        let mut trailer: Option<Object> = None;
        let mut xref_stream_trailer: Option<Object> = None;

        while let Some(token) = self.next_token() {
            match token {
                Token::Integer(num) => {
                    let is_header = matches!(self.peek(1), Some(Token::Integer(_)))
                        && matches!(self.peek(2), Some(Token::Keyword(kw)) if kw == "obj");
                    if !is_header {
                        continue;
                    }
                    let Some(Token::Integer(generation)) = self.next_token() else {
                        continue;
                    };
                    self.next_token();
                    let Some(obj) = self.parse_indirect_body(&objects) else {
                        continue;
                    };
                    if let Object::Stream { dict, .. } = &obj
                        && dict.get("Type").and_then(|v| v.as_name()) == Some("XRef")
                    {
                        xref_stream_trailer = Some(Object::Dictionary(dict.clone()));
                    }
                    objects.insert((num as u32, generation as u16), obj);
                }
                Token::Keyword(kw) if kw == "trailer" => {
                    if let Some(obj) = self.parse_object(&objects) {
                        trailer = Some(merge_trailers(trailer.take(), obj));
                    }
                }
                _ => {}
            }
        }

        PdfDoc {
            objects,
            trailer: trailer.or(xref_stream_trailer),
            security: SecurityState::Unencrypted,
        }
    }

    fn parse_indirect_body(&mut self, objects: &HashMap<ObjRef, Object>) -> Option<Object> {
        let obj = self.parse_object(objects)?;
        while let Some(token) = self.next_token() {
            if matches!(&token, Token::Keyword(kw) if kw == "endobj") {
                break;
            }
            // A following object header means endobj is missing; leave it for the outer loop.
            if matches!(&token, Token::Integer(_))
                && matches!(self.peek(2), Some(Token::Keyword(kw)) if kw == "obj")
            {
                self.lookahead.push_front(token);
                break;
            }
        }
        Some(obj)
    }

    pub(crate) fn parse_object(&mut self, objects: &HashMap<ObjRef, Object>) -> Option<Object> {
        match self.next_token()? {
            Token::Null => Some(Object::Null),
            Token::Boolean(v) => Some(Object::Boolean(v)),
            Token::Integer(v) => Some(self.integer_or_reference(v)),
            Token::Real(v) => Some(Object::Real(v)),
            Token::String(v) | Token::HexString(v) => Some(Object::String(v)),
            Token::Name(v) => Some(Object::Name(v)),
            Token::ArrayStart => Some(Object::Array(self.parse_array(objects))),
            Token::DictStart => Some(self.parse_dict_or_stream(objects)),
            _ => None,
        }
    }

    fn integer_or_reference(&mut self, first: i64) -> Object {
        let is_ref = matches!(self.peek(1), Some(Token::Integer(_)))
            && matches!(self.peek(2), Some(Token::Keyword(kw)) if kw == "R");
        if !is_ref {
            return Object::Integer(first);
        }
        let generation = match self.next_token() {
            Some(Token::Integer(v)) => v,
            _ => 0,
        };
        self.next_token();
        Object::Reference {
            obj_num: first as u32,
            gen_num: generation as u16,
        }
    }

    fn parse_array(&mut self, objects: &HashMap<ObjRef, Object>) -> Vec<Object> {
        let mut items = Vec::new();
        loop {
            match self.peek(1) {
                None => break,
                Some(Token::ArrayEnd) => {
                    self.next_token();
                    break;
                }
                Some(_) => match self.parse_object(objects) {
                    Some(obj) => items.push(obj),
                    None => continue,
                },
            }
        }
        items
    }

    fn parse_dict_or_stream(&mut self, objects: &HashMap<ObjRef, Object>) -> Object {
        let mut dict = Dict::new();
        loop {
            match self.peek(1) {
                None => break,
                Some(Token::DictEnd) => {
                    self.next_token();
                    break;
                }
                Some(Token::Name(_)) => {
                    let Some(Token::Name(key)) = self.next_token() else {
                        break;
                    };
                    match self.parse_object(objects) {
                        Some(value) => {
                            dict.insert(key, value);
                        }
                        None => break,
                    }
                }
                Some(_) => {
                    self.next_token();
                }
            }
        }

        if !matches!(self.peek(1), Some(Token::Keyword(kw)) if kw == "stream") {
            return Object::Dictionary(dict);
        }
        self.next_token();
        // The lookahead buffer is empty here: peek(1) was the stream keyword itself.
        let data = self.read_stream_body(&dict, objects);
        if matches!(self.peek(1), Some(Token::Keyword(kw)) if kw == "endstream") {
            self.next_token();
        }
        Object::Stream { dict, data }
    }

    fn read_stream_body(&mut self, dict: &Dict, objects: &HashMap<ObjRef, Object>) -> Vec<u8> {
        let start = self.lexer.position();
        let Some(length) = self.stream_length(dict, objects) else {
            return self.lexer.consume_stream_until_endstream().to_vec();
        };
        let data = self.lexer.consume_stream(length);
        if self.keyword_follows(b"endstream") {
            return data.to_vec();
        }
        // The declared length is wrong. Rescan for endstream unless the object
        // plainly ends first.
        let near_endstream = self.keyword_offset_within(b"endstream", 256);
        let near_endobj = self.keyword_offset_within(b"endobj", 256);
        let rescan = match (near_endstream, near_endobj) {
            (Some(s), Some(o)) => s <= o,
            (None, Some(_)) => false,
            _ => true,
        };
        if rescan && !self.keyword_follows(b"endobj") {
            self.lexer.set_position(start);
            return self.lexer.consume_stream_until_endstream().to_vec();
        }
        data.to_vec()
    }

    fn keyword_follows(&self, keyword: &[u8]) -> bool {
        let input = self.lexer.input();
        let mut at = self.lexer.position();
        while at < input.len() && is_whitespace(input[at]) {
            at += 1;
        }
        input[at..].starts_with(keyword)
    }

    fn keyword_offset_within(&self, keyword: &[u8], window: usize) -> Option<usize> {
        let input = self.lexer.input();
        let start = self.lexer.position().min(input.len());
        let end = start.saturating_add(window).min(input.len());
        memchr::memmem::find_iter(&input[start..end], keyword).find(|&rel| {
            let at = start + rel;
            let before = at == 0 || is_boundary(input[at - 1]);
            let after = at + keyword.len();
            before && (after >= input.len() || is_boundary(input[after]))
        })
    }

    fn stream_length(&mut self, dict: &Dict, objects: &HashMap<ObjRef, Object>) -> Option<usize> {
        match dict.get("Length")? {
            Object::Integer(v) => positive(*v),
            Object::Reference { obj_num, gen_num } => {
                let key = (*obj_num, *gen_num);
                match objects.get(&key) {
                    Some(Object::Integer(v)) => positive(*v),
                    Some(_) => None,
                    None => self.forward_length(key),
                }
            }
            _ => None,
        }
    }

    /// Resolves a `/Length N G R` whose target object appears later in the file.
    fn forward_length(&mut self, key: ObjRef) -> Option<usize> {
        if let Some(cached) = self.length_cache.get(&key) {
            return *cached;
        }
        let input = self.lexer.input();
        let index = self
            .header_index
            .get_or_insert_with(|| scan_object_headers(input));
        let cursor = self.lexer.position();
        let resolved = index.get(&key).and_then(|offsets| {
            let after = offsets.iter().filter(|&&o| o > cursor);
            let before = offsets.iter().filter(|&&o| o <= cursor);
            after
                .chain(before)
                .find_map(|&offset| integer_object_at(input, offset, key))
        });
        self.length_cache.insert(key, resolved);
        resolved
    }

    fn next_token(&mut self) -> Option<Token> {
        self.lookahead
            .pop_front()
            .or_else(|| self.lexer.next_token())
    }

    fn peek(&mut self, n: usize) -> Option<&Token> {
        while self.lookahead.len() < n {
            let token = self.lexer.next_token()?;
            self.lookahead.push_back(token);
        }
        self.lookahead.get(n - 1)
    }
}

/// Loads template bytes leniently, failing only when no page tree can be found.
pub fn load_permissive(bytes: &[u8]) -> Result<PdfDoc, String> {
    if bytes.is_empty() {
        return Err("empty document".to_string());
    }
    let doc = Parser::new(Lexer::new(bytes)).parse_permissive();
    if doc.objects.is_empty() {
        return Err("no PDF objects found".to_string());
    }
    let catalog = doc.catalog().ok_or("trailer has no resolvable /Root")?;
    let pages = catalog
        .get("Pages")
        .map(|p| doc.resolve(p))
        .and_then(Object::as_dict)
        .ok_or("catalog has no /Pages tree")?;
    if pages.get("Kids").is_none() && pages.get("Type").and_then(|t| t.as_name()) != Some("Page") {
        return Err("page tree has no kids".to_string());
    }
    Ok(doc)
}

/// Incremental updates append trailers; keys from later trailers win.
fn merge_trailers(previous: Option<Object>, next: Object) -> Object {
    match (previous, next) {
        (Some(Object::Dictionary(mut old)), Object::Dictionary(new)) => {
            old.extend(new);
            Object::Dictionary(old)
        }
        (_, next) => next,
    }
}

fn security_handler(doc: &PdfDoc) -> Result<Option<SecurityHandler>, CryptError> {
    let Some(trailer) = doc.trailer_dict() else {
        return Ok(None);
    };
    let Some(encrypt) = trailer.get("Encrypt") else {
        return Ok(None);
    };
    let dict = doc
        .resolve(encrypt)
        .as_dict()
        .ok_or_else(|| CryptError::Malformed("/Encrypt is not a dictionary".to_string()))?;
    let file_id = trailer
        .get("ID")
        .map(|id| doc.resolve(id))
        .and_then(Object::as_array)
        .and_then(|ids| ids.first())
        .and_then(|first| doc.resolve(first).as_bytes())
        .map(<[u8]>::to_vec)
        .unwrap_or_default();
    SecurityHandler::from_dict(dict, encrypt.as_reference(), file_id).map(Some)
}

fn decrypt_document(
    doc: &mut PdfDoc,
    handler: &SecurityHandler,
    file_key: &[u8],
) -> Result<(), CryptError> {
    decrypt_objects(&mut doc.objects, handler, file_key)
}

fn decrypt_objects(
    objects: &mut HashMap<ObjRef, Object>,
    handler: &SecurityHandler,
    file_key: &[u8],
) -> Result<(), CryptError> {
    for (key, obj) in objects.iter_mut() {
        if handler.encrypt_ref() == Some(*key) {
            continue;
        }
        decrypt_value(obj, *key, handler, file_key)?;
    }
    Ok(())
}

fn decrypt_value(
    obj: &mut Object,
    key: ObjRef,
    handler: &SecurityHandler,
    file_key: &[u8],
) -> Result<(), CryptError> {
    match obj {
        Object::String(bytes) => {
            let method = handler.string_method();
            match handler.decrypt(method, file_key, key, bytes) {
                Ok(plain) => *bytes = plain,
                // Incremental updates sometimes carry clear-text strings.
                Err(CryptError::Malformed(_)) if method == CryptMethod::AesV2 => {}
                Err(err) => return Err(err),
            }
        }
        Object::Array(items) => {
            for item in items {
                decrypt_value(item, key, handler, file_key)?;
            }
        }
        Object::Dictionary(dict) => {
            for value in dict.values_mut() {
                decrypt_value(value, key, handler, file_key)?;
            }
        }
        Object::Stream { dict, data } => {
            for value in dict.values_mut() {
                decrypt_value(value, key, handler, file_key)?;
            }
            let kind = dict.get("Type").and_then(|t| t.as_name());
            let skip = handler.stream_method() == CryptMethod::Identity
                || kind == Some("XRef")
                || (kind == Some("Metadata") && !handler.encrypt_metadata());
            if !skip {
                let method = handler.stream_method();
                match handler.decrypt(method, file_key, key, data) {
                    Ok(plain) => *data = plain,
                    Err(CryptError::Malformed(_)) if method == CryptMethod::AesV2 => {}
                    Err(err) => return Err(err),
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_object_at(data: &[u8], offset: usize) -> Option<Object> {
    let mut lexer = Lexer::new(data);
    lexer.set_position(offset);
    Parser::new(lexer).parse_object(&HashMap::new())
}

/// Indexes every `N G obj` header by object id.
fn scan_object_headers(input: &[u8]) -> HashMap<ObjRef, Vec<usize>> {
    let mut out: HashMap<ObjRef, Vec<usize>> = HashMap::new();
    for marker in memchr::memmem::find_iter(input, b" obj") {
        let after = marker + 4;
        if after < input.len() && !is_boundary(input[after]) {
            continue;
        }
        let Some((generation, gen_start)) = digits_before(input, marker) else {
            continue;
        };
        if gen_start == 0 || !is_whitespace(input[gen_start - 1]) {
            continue;
        }
        let mut num_end = gen_start - 1;
        while num_end > 0 && is_whitespace(input[num_end - 1]) {
            num_end -= 1;
        }
        let Some((num, num_start)) = digits_before(input, num_end) else {
            continue;
        };
        if num_start > 0 && !is_boundary(input[num_start - 1]) {
            continue;
        }
        let (Ok(num), Ok(generation)) = (u32::try_from(num), u16::try_from(generation)) else {
            continue;
        };
        out.entry((num, generation)).or_default().push(num_start);
    }
    out
}

/// Parses the decimal digits that end right before `end`.
fn digits_before(input: &[u8], end: usize) -> Option<(u64, usize)> {
    let mut start = end;
    while start > 0 && input[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end || end - start > 10 {
        return None;
    }
    let text = std::str::from_utf8(&input[start..end]).ok()?;
    Some((text.parse().ok()?, start))
}

fn integer_object_at(input: &[u8], offset: usize, key: ObjRef) -> Option<usize> {
    let mut lexer = Lexer::new(&input[offset..]);
    let expect = [
        Token::Integer(i64::from(key.0)),
        Token::Integer(i64::from(key.1)),
        Token::Keyword("obj".to_string()),
    ];
    for wanted in expect {
        if lexer.next_token()? != wanted {
            return None;
        }
    }
    let value = match lexer.next_token()? {
        Token::Integer(v) => positive(v)?,
        _ => return None,
    };
    match lexer.next_token()? {
        Token::Keyword(kw) if kw == "endobj" => Some(value),
        _ => None,
    }
}

fn positive(value: i64) -> Option<usize> {
    if value <= 0 {
        return None;
    }
    usize::try_from(value).ok()
}

fn is_boundary(byte: u8) -> bool {
    is_whitespace(byte) || is_delim(byte)
}

pub(crate) fn flate_decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    // Truncated streams still yield whatever inflated cleanly.
    let _ = decoder.read_to_end(&mut out);
    out
}

pub(crate) fn flate_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> PdfDoc {
        Parser::new(Lexer::new(input)).parse().expect("parse")
    }

    fn stream_bytes(doc: &PdfDoc, num: u32) -> Vec<u8> {
        match doc.get(num, 0) {
            Some(Object::Stream { data, .. }) => data.clone(),
            other => panic!("object {num} is not a stream: {other:?}"),
        }
    }

    #[test]
    fn later_definitions_override_earlier_ones() {
        let doc = parse(b"1 0 obj (old) endobj\n1 0 obj (new) endobj\n");
        assert_eq!(doc.get(1, 0), Some(&Object::String(b"new".to_vec())));
    }

    #[test]
    fn startxref_offset_is_not_taken_as_object_number() {
        let doc = parse(
            b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
              startxref\n123\n2 0 obj\n(ok)\nendobj\n",
        );
        assert!(doc.get(1, 0).is_some());
        assert!(doc.get(2, 0).is_some());
    }

    #[test]
    fn forward_length_reference_is_resolved() {
        let doc = parse(
            b"2 0 obj\n<< /Length 1 0 R >>\nstream\nABCDE\nendstream\nendobj\n1 0 obj\n5\nendobj\n",
        );
        assert_eq!(stream_bytes(&doc, 2), b"ABCDE");
    }

    #[test]
    fn short_length_falls_back_to_endstream_scan() {
        let doc = parse(
            b"2 0 obj\n<< /Length 3 >>\nstream\nABCDE\nendstream\nendobj\n3 0 obj\n(ok)\nendobj\n",
        );
        assert_eq!(stream_bytes(&doc, 2), b"ABCDE\n");
        assert!(doc.get(3, 0).is_some());
    }

    #[test]
    fn missing_length_reads_until_endstream() {
        let doc = parse(b"2 0 obj\n<< /Length 9 0 R >>\nstream\nABCDE\nendstream\nendobj\n");
        assert_eq!(stream_bytes(&doc, 2), b"ABCDE\n");
    }

    #[test]
    fn trailers_merge_with_later_keys_winning() {
        let doc = parse(
            b"1 0 obj << >> endobj\ntrailer\n<< /Root 1 0 R /Size 2 >>\ntrailer\n<< /Size 5 >>\n",
        );
        let trailer = doc.trailer_dict().expect("trailer");
        assert_eq!(trailer.get("Size"), Some(&Object::Integer(5)));
        assert_eq!(doc.catalog_ref(), Some((1, 0)));
    }

    #[test]
    fn object_stream_members_fill_gaps_only() {
        let body = b"3 0 4 6 (inner) (four)";
        let mut input = b"1 0 obj\n<< /Type /ObjStm /N 2 /First 8 /Length ".to_vec();
        input.extend_from_slice(body.len().to_string().as_bytes());
        input.extend_from_slice(b" >>\nstream\n");
        input.extend_from_slice(body);
        input.extend_from_slice(b"\nendstream\nendobj\n4 0 obj\n(direct)\nendobj\n");
        let doc = parse(&input);
        assert_eq!(doc.get(3, 0), Some(&Object::String(b"inner".to_vec())));
        assert_eq!(doc.get(4, 0), Some(&Object::String(b"direct".to_vec())));
    }

    #[test]
    fn flate_roundtrip() {
        let packed = flate_encode(b"BT ({firstName}) Tj ET");
        assert_eq!(flate_decode(&packed), b"BT ({firstName}) Tj ET");
    }

    #[test]
    fn permissive_load_rejects_garbage() {
        assert!(load_permissive(b"not a pdf at all").is_err());
        assert!(load_permissive(b"").is_err());
    }

    #[test]
    fn header_scan_finds_offsets() {
        let input = b"2 0 obj\n<< >>\nendobj\n1 0 obj\n5\nendobj\n";
        let index = scan_object_headers(input);
        let offsets = index.get(&(1, 0)).expect("1 0 obj indexed");
        assert_eq!(integer_object_at(input, offsets[0], (1, 0)), Some(5));
    }
}
