mod common;

use formfill::detect::open_template;
use formfill::model::Object;
use formfill::pages::page_count;
use formfill::writer::write_document;
use formfill::{DetectionMode, EngineError};

use crate::common::{TemplateBuilder, all_text, detect_default, load, sample_datasets};

/// Appends an update section that replaces object 5 (the first page's content stream).
fn with_incremental_content(mut bytes: Vec<u8>, content: &str) -> Vec<u8> {
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let prev: usize = text
        .rsplit("startxref")
        .next()
        .and_then(|tail| tail.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .expect("fixture has startxref");
    let offset = bytes.len();
    bytes.extend_from_slice(
        format!(
            "5 0 obj\n<< /Length {} >>\nstream\n{content}\nendstream\nendobj\n",
            content.len()
        )
        .as_bytes(),
    );
    let xref = bytes.len();
    bytes.extend_from_slice(
        format!(
            "xref\n0 1\n0000000000 65535 f \n5 1\n{offset:010} 00000 n \n\
             trailer\n<< /Size 6 /Root 1 0 R /Prev {prev} >>\nstartxref\n{xref}\n%%EOF\n"
        )
        .as_bytes(),
    );
    bytes
}

#[test]
fn incremental_updates_replace_earlier_objects() {
    let base = TemplateBuilder::new()
        .page(&[("{firstName}", 72.0, 700.0, 10.0)])
        .build();
    let updated = with_incremental_content(base, "BT /F1 10 Tf 72 700 Td ({lastName}) Tj ET");

    let detection = detect_default(&updated, &sample_datasets());
    let DetectionMode::Inert(result) = detection.mode else {
        panic!("expected inert mode");
    };
    let keys: Vec<&str> = result.fields.iter().map(|f| f.data_key.as_str()).collect();
    assert_eq!(keys, ["lastName"]);
}

#[test]
fn documents_without_pages_are_rejected() {
    let empty = TemplateBuilder::new().build();
    let err = open_template(&empty).unwrap_err();
    assert!(matches!(err, EngineError::TemplateLoad(_)), "{err}");

    for bytes in [&b""[..], b"%PDF-1.7\n%%EOF\n"] {
        assert!(matches!(open_template(bytes), Err(EngineError::TemplateLoad(_))));
    }
}

#[test]
fn rewritten_documents_keep_only_reachable_objects() {
    let bytes = TemplateBuilder::new()
        .page(&[("Hello", 72.0, 700.0, 10.0)])
        .page(&[("World", 72.0, 700.0, 10.0)])
        .build();
    let mut doc = load(&bytes);
    let orphan = doc.add_object(Object::String(b"orphan-marker".to_vec()));
    let orphan_num = orphan.as_reference().expect("reference").0;

    let written = write_document(&doc).expect("write");
    assert!(written.starts_with(b"%PDF-1.7\n"));
    assert!(
        !written.windows(b"orphan-marker".len()).any(|w| w == b"orphan-marker"),
        "unreachable objects are not written"
    );

    let reparsed = load(&written);
    assert_eq!(page_count(&reparsed), 2);
    assert!(reparsed.get(orphan_num, 0).is_none());
    assert_eq!(all_text(&written), ["Hello", "World"]);
}
