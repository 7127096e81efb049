#![allow(dead_code)]

use std::fmt::Write as _;

use md5::{Digest, Md5};
use rc4::consts::{U5, U10};
use rc4::{KeyInit, Rc4, StreamCipher};

use formfill::content::{ExtractOptions, TextRun, extract_runs};
use formfill::fields::FieldNameMapper;
use formfill::parser::{PdfDoc, load_permissive};
use formfill::{Datasets, Detection, EngineConfig, detect};

const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];
const FILE_ID: &[u8] = b"formfill-fixture";
const PERMISSIONS: i32 = -44;

/// Text shown with one `Tj`: text, x, baseline y (PDF space), font size.
pub type RunSpec<'a> = (&'a str, f64, f64, f64);

struct FieldSpec {
    /// `Tx` or `Btn`.
    kind: &'static str,
    name: String,
    page: usize,
    rect: [f64; 4],
    value: Option<String>,
}

enum Security {
    None,
    /// Standard handler, revision 2, 40-bit RC4, empty user and owner passwords.
    Rc4Empty,
    /// An /Encrypt dictionary no handler understands; objects stay plain.
    Unsupported,
}

/// Writes small letter-size templates with Helvetica text and optional text fields.
#[derive(Default)]
pub struct TemplateBuilder {
    pages: Vec<String>,
    fields: Vec<FieldSpec>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, runs: &[RunSpec<'_>]) -> Self {
        let mut content = String::new();
        for (text, x, y, size) in runs {
            writeln!(content, "BT /F1 {size} Tf {x} {y} Td ({}) Tj ET", escape(text))
                .expect("write");
        }
        self.pages.push(content);
        self
    }

    /// Adds a text field widget on zero-based `page`.
    pub fn text_field(mut self, page: usize, name: &str, rect: [f64; 4]) -> Self {
        self.fields.push(FieldSpec {
            kind: "Tx",
            name: name.to_string(),
            page,
            rect,
            value: None,
        });
        self
    }

    /// Adds a radio button widget (no appearance states) on zero-based `page`.
    pub fn radio_field(mut self, page: usize, name: &str, rect: [f64; 4]) -> Self {
        self.fields.push(FieldSpec {
            kind: "Btn",
            name: name.to_string(),
            page,
            rect,
            value: None,
        });
        self
    }

    pub fn text_field_with_value(
        mut self,
        page: usize,
        name: &str,
        rect: [f64; 4],
        value: &str,
    ) -> Self {
        self.fields.push(FieldSpec {
            kind: "Tx",
            name: name.to_string(),
            page,
            rect,
            value: Some(value.to_string()),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.write(Security::None)
    }

    pub fn build_rc4_encrypted(&self) -> Vec<u8> {
        self.write(Security::Rc4Empty)
    }

    pub fn build_with_unsupported_encryption(&self) -> Vec<u8> {
        self.write(Security::Unsupported)
    }

    fn write(&self, security: Security) -> Vec<u8> {
        let page_count = self.pages.len();
        let page_num = |i: usize| 4 + 2 * i as u32;
        let field_base = 4 + 2 * page_count as u32;
        let encrypt_num = field_base + self.fields.len() as u32;

        let file_key = match security {
            Security::Rc4Empty => Some(rc4_file_key()),
            _ => None,
        };
        let mut out = PdfOut::new(file_key);

        let field_refs: Vec<String> = (0..self.fields.len())
            .map(|j| format!("{} 0 R", field_base + j as u32))
            .collect();
        let acroform = if self.fields.is_empty() {
            String::new()
        } else {
            format!(" /AcroForm << /Fields [{}] >>", field_refs.join(" "))
        };
        out.object(1, format!("<< /Type /Catalog /Pages 2 0 R{acroform} >>"), None);
        let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", page_num(i))).collect();
        out.object(
            2,
            format!("<< /Type /Pages /Kids [{}] /Count {page_count} >>", kids.join(" ")),
            None,
        );
        out.object(
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica \
             /Encoding /WinAnsiEncoding >>"
                .into(),
            None,
        );

        for (i, content) in self.pages.iter().enumerate() {
            let annots: Vec<&str> = self
                .fields
                .iter()
                .zip(&field_refs)
                .filter(|(f, _)| f.page == i)
                .map(|(_, r)| r.as_str())
                .collect();
            let annots = if annots.is_empty() {
                String::new()
            } else {
                format!(" /Annots [{}]", annots.join(" "))
            };
            out.object(
                page_num(i),
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                     /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R{annots} >>",
                    page_num(i) + 1
                ),
                None,
            );
            out.object(page_num(i) + 1, String::new(), Some(content.as_bytes().to_vec()));
        }

        for (j, field) in self.fields.iter().enumerate() {
            let num = field_base + j as u32;
            let [x0, y0, x1, y1] = field.rect;
            let value = field
                .value
                .as_ref()
                .map(|v| format!(" /V {}", out.string(num, v.as_bytes())))
                .unwrap_or_default();
            let flags = if field.kind == "Btn" { " /Ff 49152" } else { "" };
            let body = format!(
                "<< /Type /Annot /Subtype /Widget /FT /{}{flags} /T {} /DA {} \
                 /Rect [{x0} {y0} {x1} {y1}] /P {} 0 R /F 4{value} >>",
                field.kind,
                out.string(num, field.name.as_bytes()),
                out.string(num, b"/Helv 0 Tf 0 g"),
                page_num(field.page),
            );
            out.object(num, body, None);
        }

        let encrypt = match security {
            Security::None => None,
            Security::Rc4Empty => {
                let (owner, user) = rc4_hashes();
                Some(format!(
                    "<< /Filter /Standard /V 1 /R 2 /Length 40 /P {PERMISSIONS} /O <{}> /U <{}> >>",
                    hex(&owner),
                    hex(&user)
                ))
            }
            Security::Unsupported => Some("<< /Filter /VendorLock /V 9 /R 9 >>".to_string()),
        };
        if let Some(body) = &encrypt {
            out.plain_object(encrypt_num, body.clone());
        }
        out.finish(encrypt.map(|_| encrypt_num))
    }
}

struct PdfOut {
    buf: Vec<u8>,
    offsets: Vec<(u32, usize)>,
    file_key: Option<[u8; 5]>,
}

impl PdfOut {
    fn new(file_key: Option<[u8; 5]>) -> Self {
        Self {
            buf: b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec(),
            offsets: Vec::new(),
            file_key,
        }
    }

    fn string(&self, num: u32, bytes: &[u8]) -> String {
        match self.file_key {
            Some(key) => {
                let mut data = bytes.to_vec();
                rc4(&object_key(&key, num), &mut data);
                format!("<{}>", hex(&data))
            }
            None => format!("({})", escape(&String::from_utf8_lossy(bytes))),
        }
    }

    fn object(&mut self, num: u32, dict: String, stream: Option<Vec<u8>>) {
        self.offsets.push((num, self.buf.len()));
        match stream {
            Some(mut data) => {
                if let Some(key) = self.file_key {
                    rc4(&object_key(&key, num), &mut data);
                }
                let header = format!("{num} 0 obj\n<< /Length {} >>\nstream\n", data.len());
                self.buf.extend_from_slice(header.as_bytes());
                self.buf.extend_from_slice(&data);
                self.buf.extend_from_slice(b"\nendstream\nendobj\n");
            }
            None => {
                self.buf
                    .extend_from_slice(format!("{num} 0 obj\n{dict}\nendobj\n").as_bytes());
            }
        }
    }

    fn plain_object(&mut self, num: u32, dict: String) {
        self.offsets.push((num, self.buf.len()));
        self.buf
            .extend_from_slice(format!("{num} 0 obj\n{dict}\nendobj\n").as_bytes());
    }

    fn finish(mut self, encrypt: Option<u32>) -> Vec<u8> {
        self.offsets.sort();
        let size = self.offsets.last().map_or(1, |(n, _)| n + 1);
        let xref = self.buf.len();
        let mut table = format!("xref\n0 {size}\n0000000000 65535 f \n");
        let mut next = 1;
        for (num, offset) in &self.offsets {
            while next < *num {
                table.push_str("0000000000 65535 f \n");
                next += 1;
            }
            writeln!(table, "{offset:010} 00000 n ").expect("write");
            next = num + 1;
        }
        let encrypt = encrypt
            .map(|n| format!(" /Encrypt {n} 0 R"))
            .unwrap_or_default();
        write!(
            table,
            "trailer\n<< /Size {size} /Root 1 0 R{encrypt} /ID [<{id}> <{id}>] >>\n\
             startxref\n{xref}\n%%EOF\n",
            id = hex(FILE_ID)
        )
        .expect("write");
        self.buf.extend_from_slice(table.as_bytes());
        self.buf
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '(' | ')' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

fn rc4(key: &[u8], data: &mut [u8]) {
    match key.len() {
        5 => Rc4::<U5>::new_from_slice(key).expect("key").apply_keystream(data),
        10 => Rc4::<U10>::new_from_slice(key).expect("key").apply_keystream(data),
        n => panic!("unexpected RC4 key length {n}"),
    }
}

fn rc4_hashes() -> ([u8; 32], [u8; 32]) {
    let mut owner = PAD;
    rc4(&md5(&PAD)[..5], &mut owner);
    let mut user = PAD;
    rc4(&rc4_file_key(), &mut user);
    (owner, user)
}

fn rc4_file_key() -> [u8; 5] {
    let mut owner = PAD;
    rc4(&md5(&PAD)[..5], &mut owner);
    let mut material = PAD.to_vec();
    material.extend_from_slice(&owner);
    material.extend_from_slice(&PERMISSIONS.to_le_bytes());
    material.extend_from_slice(FILE_ID);
    let digest = md5(&material);
    let mut key = [0u8; 5];
    key.copy_from_slice(&digest[..5]);
    key
}

fn object_key(file_key: &[u8; 5], num: u32) -> Vec<u8> {
    let mut material = file_key.to_vec();
    material.extend_from_slice(&num.to_le_bytes()[..3]);
    material.extend_from_slice(&0u16.to_le_bytes());
    md5(&material)[..10].to_vec()
}

pub fn sample_datasets() -> Datasets {
    let mut data = Datasets::default();
    for (k, v) in [
        ("firstName", "Ada"),
        ("lastName", "Lovelace"),
        ("dob", "1815-12-10"),
        ("city", "London"),
        ("placardType", "Temporary"),
        ("idType", "Passport"),
        ("gender", "F"),
    ] {
        data.subject.insert(k.into(), v.into());
    }
    for (k, v) in [("firstName", "Charles"), ("lastName", "Babbage"), ("npi", "1234567890")] {
        data.authority.insert(k.into(), v.into());
    }
    data
}

pub fn detect_with(bytes: &[u8], config: &EngineConfig, datasets: &Datasets) -> Detection {
    let mapper = FieldNameMapper::new(&config.fields);
    detect(bytes, config, &mapper, datasets).expect("detection should succeed")
}

pub fn detect_default(bytes: &[u8], datasets: &Datasets) -> Detection {
    detect_with(bytes, &EngineConfig::default(), datasets)
}

pub fn load(bytes: &[u8]) -> PdfDoc {
    load_permissive(bytes).expect("document should load")
}

/// Runs of every page, including filled widget appearances.
pub fn page_runs(bytes: &[u8]) -> Vec<Vec<TextRun>> {
    extract_runs(
        &load(bytes),
        ExtractOptions {
            include_annotations: true,
        },
    )
}

pub fn all_text(bytes: &[u8]) -> Vec<String> {
    page_runs(bytes)
        .into_iter()
        .flatten()
        .map(|run| run.text)
        .collect()
}
