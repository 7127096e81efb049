mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use formfill::session::prepare_template;
use formfill::{
    DetectionMode, EngineConfig, EngineError, FileTemplateSource, LoadOutcome, SessionState,
    StaticTemplateSource,
};

use crate::common::{TemplateBuilder, all_text, load, sample_datasets};

fn inert_template() -> Vec<u8> {
    TemplateBuilder::new()
        .page(&[
            ("Name: {firstName}", 72.0, 700.0, 10.0),
            ("{radio_placard_type_1}", 72.0, 600.0, 10.0),
            ("{radio_placard_type_2}", 150.0, 600.0, 10.0),
        ])
        .page(&[
            ("{lastName}", 72.0, 700.0, 10.0),
            ("{radio_placard_type_1}", 72.0, 600.0, 10.0),
        ])
        .build()
}

fn session() -> SessionState {
    SessionState::new(EngineConfig::default(), sample_datasets())
}

fn selected(session: &SessionState, group: &str) -> Vec<(usize, String)> {
    session
        .radios()
        .iter()
        .filter(|o| o.group == group && o.selected)
        .map(|o| (o.page, o.option.clone()))
        .collect()
}

#[test]
fn edits_flow_into_the_output() {
    let mut session = session();
    session.load(inert_template()).expect("load");
    let key = session.fields()[0].unique_key.clone();
    session.set_field_value(&key, "Grace").expect("known key");

    let built = session
        .build_output_on(NaiveDate::from_ymd_opt(2024, 7, 4).expect("date"))
        .expect("build");
    assert_eq!(built.file_name, "Ada_Lovelace_Document_07-04-2024");
    let text = all_text(&built.bytes);
    assert!(text.iter().any(|t| t == "Grace"), "{text:?}");
    assert!(text.iter().any(|t| t == "Lovelace"), "{text:?}");
    assert!(!text.iter().any(|t| t == "Ada"), "{text:?}");

    // Building does not consume the session.
    assert_eq!(session.fields()[0].current_value, "Grace");
    assert!(session.build_output().is_ok());
}

#[test]
fn unknown_keys_and_options_are_rejected() {
    let mut session = session();
    session.load(inert_template()).expect("load");
    let err = session.set_field_value("nope@1:0:0", "x").unwrap_err();
    assert!(matches!(err, EngineError::UnknownField(_)), "{err}");

    let before = selected(&session, "placard_type");
    let err = session.toggle_radio("placard_type", "9").unwrap_err();
    assert!(matches!(err, EngineError::UnknownOption { .. }), "{err}");
    assert_eq!(selected(&session, "placard_type"), before);
}

#[test]
fn toggling_keeps_groups_exclusive_across_pages() {
    let mut session = session();
    session.load(inert_template()).expect("load");
    assert_eq!(selected(&session, "placard_type"), [(1, "2".to_string())]);

    session.toggle_radio("placard_type", "1").expect("toggle");
    assert_eq!(
        selected(&session, "placard_type"),
        [(1, "1".to_string()), (2, "1".to_string())]
    );
    session.toggle_radio("placard_type", "1").expect("toggle again");
    assert_eq!(selected(&session, "placard_type").len(), 2);
}

#[test]
fn page_navigation_is_clamped() {
    let mut session = session();
    session.load(inert_template()).expect("load");
    assert_eq!(session.page_count(), 2);
    assert_eq!(session.previous_page(), 0);
    assert_eq!(session.next_page(), 1);
    assert_eq!(session.next_page(), 1);
    assert_eq!(session.set_current_page(40), 1);

    let img = session.render_preview(0.5).expect("preview");
    assert_eq!((img.width(), img.height()), (306, 396));
}

#[test]
fn a_failed_load_leaves_nothing_behind() {
    let mut session = session();
    session.load(inert_template()).expect("load");
    assert!(session.is_loaded());
    let err = session.load(b"%PDF-1.4 broken".to_vec()).unwrap_err();
    assert!(matches!(err, EngineError::TemplateLoad(_)), "{err}");
    assert!(!session.is_loaded());
    assert!(session.fields().is_empty());
    assert_eq!(session.page_count(), 0);
}

#[test]
fn interactive_values_can_be_edited_by_name() {
    let bytes = TemplateBuilder::new()
        .page(&[("First name:", 72.0, 700.0, 10.0)])
        .text_field(0, "firstName", [140.0, 695.0, 300.0, 712.0])
        .text_field(0, "internalCode", [140.0, 645.0, 300.0, 662.0])
        .build();
    let mut session = session();
    session.load(bytes).expect("load");
    assert!(matches!(session.mode(), Some(DetectionMode::Interactive(_))));
    session.set_field_value("internalCode", "Z-9").expect("unmatched fields are editable");
    assert!(session.toggle_radio("placard_type", "1").is_err());

    let built = session.build_output().expect("build");
    let text = all_text(&built.bytes);
    assert!(text.iter().any(|t| t == "Ada"), "{text:?}");
    assert!(text.iter().any(|t| t == "Z-9"), "{text:?}");
    assert!(load(&built.bytes).catalog().expect("catalog").get("AcroForm").is_none());
}

#[tokio::test]
async fn stale_loads_do_not_replace_newer_ones() {
    let first = TemplateBuilder::new().page(&[("{firstName}", 72.0, 700.0, 10.0)]).build();
    let second = TemplateBuilder::new()
        .page(&[("{lastName}", 72.0, 700.0, 10.0)])
        .page(&[("{city}", 72.0, 700.0, 10.0)])
        .build();
    let source = StaticTemplateSource::new()
        .with_template("first.pdf", first)
        .with_template("second.pdf", second);

    let mut session = session();
    let config = Arc::new(session.config().clone());
    let old_ticket = session.begin_load();
    let new_ticket = session.begin_load();

    let newer = prepare_template(&source, "second.pdf", config.clone(), sample_datasets()).await;
    assert_eq!(session.complete_load(new_ticket, newer).expect("apply"), LoadOutcome::Applied);

    let older = prepare_template(&source, "first.pdf", config, sample_datasets()).await;
    assert_eq!(session.complete_load(old_ticket, older).expect("drop"), LoadOutcome::Stale);

    assert_eq!(session.page_count(), 2);
    assert_eq!(session.fields()[0].data_key, "lastName");
}

#[tokio::test]
async fn file_sources_load_from_disk_and_report_missing_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("form.pdf"), inert_template()).expect("write fixture");
    let source = FileTemplateSource::new(dir.path());

    let mut session = session();
    let outcome = session.load_from(&source, "form.pdf").await.expect("load");
    assert_eq!(outcome, LoadOutcome::Applied);
    let built = session.build_output_async().await.expect("build");
    assert!(built.bytes.starts_with(b"%PDF-"));
    let img = session.render_preview_async(1.0).await.expect("preview");
    assert_eq!(img.width(), 612);

    let err = session.load_from(&source, "missing.pdf").await.unwrap_err();
    assert!(matches!(err, EngineError::Fetch { .. }), "{err}");
    assert!(!session.is_loaded());
}
