use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::Write as _;

use md5::{Digest, Md5};
use tracing::debug;

use crate::error::EngineError;
use crate::model::{ObjRef, Object};
use crate::parser::{PdfDoc, SecurityState};

/// Serializes every object reachable from the trailer with a classic xref table.
///
/// Object numbers are preserved; numbers with no reachable object become
/// free entries.
pub fn write_document(doc: &PdfDoc) -> Result<Vec<u8>, EngineError> {
    let trailer = doc
        .trailer_dict()
        .ok_or_else(|| EngineError::OutputBuild("document has no trailer".into()))?;
    let root = trailer
        .get("Root")
        .and_then(Object::as_reference)
        .ok_or_else(|| EngineError::OutputBuild("trailer has no /Root reference".into()))?;
    let info = trailer.get("Info").and_then(Object::as_reference);
    let encrypt = match doc.security {
        SecurityState::Ignored(_) => trailer.get("Encrypt").cloned(),
        _ => None,
    };

    let mut starts = vec![root];
    starts.extend(info);
    starts.extend(encrypt.as_ref().and_then(Object::as_reference));
    let reachable = reachable_objects(doc, &starts);
    debug!(
        reachable = reachable.len(),
        total = doc.objects.len(),
        "serializing document"
    );

    let mut out: Vec<u8> = Vec::with_capacity(64 * 1024);
    out.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets: BTreeMap<u32, (usize, u16)> = BTreeMap::new();
    for (key, obj) in &reachable {
        offsets.insert(key.0, (out.len(), key.1));
        out.extend_from_slice(format!("{} {} obj\n", key.0, key.1).as_bytes());
        write_object(obj, &mut out);
        out.extend_from_slice(b"\nendobj\n");
    }

    let size = offsets.keys().next_back().map_or(1, |max| max + 1);
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for num in 1..size {
        match offsets.get(&num) {
            Some((offset, generation)) => {
                out.extend_from_slice(format!("{offset:010} {generation:05} n \n").as_bytes())
            }
            None => out.extend_from_slice(b"0000000000 65535 f \n"),
        }
    }

    let mut trailer_out = format!(
        "trailer\n<< /Size {size} /Root {} {} R",
        root.0, root.1
    );
    if let Some((num, generation)) = info.filter(|key| offsets.contains_key(&key.0)) {
        let _ = write!(trailer_out, " /Info {num} {generation} R");
    }
    let mut tail = Vec::new();
    if let Some(encrypt) = &encrypt {
        tail.extend_from_slice(b" /Encrypt ");
        write_object(encrypt, &mut tail);
    }
    tail.extend_from_slice(b" /ID ");
    match trailer.get("ID").map(|id| doc.resolve(id)) {
        Some(id @ Object::Array(_)) => write_object(id, &mut tail),
        _ => {
            let digest = Md5::digest(&out);
            let id = Object::String(digest.to_vec());
            write_object(&Object::Array(vec![id.clone(), id]), &mut tail);
        }
    }
    out.extend_from_slice(trailer_out.as_bytes());
    out.extend_from_slice(&tail);
    out.extend_from_slice(format!(" >>\nstartxref\n{xref_start}\n%%EOF\n").as_bytes());
    Ok(out)
}

fn reachable_objects<'a>(doc: &'a PdfDoc, starts: &[ObjRef]) -> Vec<(ObjRef, &'a Object)> {
    let mut seen: HashSet<ObjRef> = HashSet::new();
    let mut queue: VecDeque<ObjRef> = starts.iter().copied().collect();
    let mut out = Vec::new();
    while let Some(key) = queue.pop_front() {
        if !seen.insert(key) {
            continue;
        }
        let Some(obj) = doc.objects.get(&key) else {
            continue;
        };
        out.push((key, obj));
        collect_references(obj, &mut queue);
    }
    out.sort_by_key(|(key, _)| *key);
    // Two generations of one number cannot both sit in the table; keep the newest.
    out.dedup_by(|later, earlier| {
        if later.0.0 == earlier.0.0 {
            *earlier = *later;
            true
        } else {
            false
        }
    });
    out
}

fn collect_references(obj: &Object, queue: &mut VecDeque<ObjRef>) {
    match obj {
        Object::Reference { obj_num, gen_num } => queue.push_back((*obj_num, *gen_num)),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, queue)),
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            dict.values().for_each(|value| collect_references(value, queue))
        }
        _ => {}
    }
}

pub(crate) fn write_object(obj: &Object, out: &mut Vec<u8>) {
    match obj {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(v) => out.extend_from_slice(if *v { b"true" } else { b"false" }),
        Object::Integer(v) => out.extend_from_slice(v.to_string().as_bytes()),
        Object::Real(v) => out.extend_from_slice(format_number(*v).as_bytes()),
        Object::String(bytes) => write_string(bytes, out),
        Object::Name(name) => {
            out.push(b'/');
            out.extend_from_slice(escape_name(name).as_bytes());
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(item, out);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dict(dict.iter(), None, out),
        Object::Stream { dict, data } => {
            let length = Object::Integer(data.len() as i64);
            write_dict(
                dict.iter().filter(|(key, _)| key.as_str() != "Length"),
                Some(&length),
                out,
            );
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference { obj_num, gen_num } => {
            out.extend_from_slice(format!("{obj_num} {gen_num} R").as_bytes())
        }
    }
}

fn write_dict<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Object)>,
    length: Option<&Object>,
    out: &mut Vec<u8>,
) {
    // Sorted keys keep output byte-stable across runs.
    let mut entries: Vec<(&String, &Object)> = entries.collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    out.extend_from_slice(b"<<");
    for (key, value) in entries {
        out.extend_from_slice(b" /");
        out.extend_from_slice(escape_name(key).as_bytes());
        out.push(b' ');
        write_object(value, out);
    }
    if let Some(length) = length {
        out.extend_from_slice(b" /Length ");
        write_object(length, out);
    }
    out.extend_from_slice(b" >>");
}

fn write_string(bytes: &[u8], out: &mut Vec<u8>) {
    let has_control = bytes
        .iter()
        .any(|&b| b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t'));
    if has_control {
        out.push(b'<');
        for b in bytes {
            out.extend_from_slice(format!("{b:02X}").as_bytes());
        }
        out.push(b'>');
        return;
    }
    out.push(b'(');
    for &b in bytes {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_graphic() && !b"#/()<>[]{}%".contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "#{b:02X}");
        }
    }
    out
}

/// Compact decimal form for content streams: at most four fraction digits, no trailing zeros.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let text = format!("{value:.4}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
