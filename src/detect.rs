use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::acroform::{FormField, enumerate_fields};
use crate::config::EngineConfig;
use crate::content::{ExtractOptions, extract_page_runs};
use crate::error::EngineError;
use crate::fields::{Datasets, FieldMapping, FieldNameMapper, ValueResolver};
use crate::offsets::OffsetCorrector;
use crate::pages::collect_pages;
use crate::parser::{PdfDoc, load_permissive};
use crate::scan::{ScanResult, TokenScanner};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveField {
    /// Fully qualified field name.
    pub name: String,
    pub current_value: String,
    /// `None` for names the mapper does not know; those are written empty.
    pub mapping: Option<FieldMapping>,
}

/// How a template will be filled, decided once per load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "detected", rename_all = "lowercase")]
pub enum DetectionMode {
    Interactive(Vec<InteractiveField>),
    Inert(ScanResult),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub mode: DetectionMode,
    pub page_count: usize,
}

/// Parses template bytes, failing when no page can be found.
pub fn open_template(bytes: &[u8]) -> Result<PdfDoc, EngineError> {
    let doc = load_permissive(bytes).map_err(EngineError::TemplateLoad)?;
    if collect_pages(&doc).is_empty() {
        return Err(EngineError::TemplateLoad("document has no pages".into()));
    }
    Ok(doc)
}

/// Classifies the template and resolves initial values for whichever mode applies.
pub fn detect(
    bytes: &[u8],
    config: &EngineConfig,
    mapper: &FieldNameMapper,
    datasets: &Datasets,
) -> Result<Detection, EngineError> {
    let doc = open_template(bytes)?;
    let pages = collect_pages(&doc);
    let resolver = ValueResolver::new(datasets);

    let form_fields = enumerate_fields(&doc);
    let matched = form_fields
        .iter()
        .filter(|f| mapper.lookup_field(&f.name).is_some())
        .count();
    let fields = interactive_fields(form_fields, mapper, &resolver);
    let mode = if matched > 0 {
        info!(fields = fields.len(), matched, "interactive template");
        DetectionMode::Interactive(fields)
    } else {
        if !fields.is_empty() {
            debug!(fields = fields.len(), "no form field name is mappable, scanning tokens");
        }
        let page_runs: Vec<_> = pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                let runs = extract_page_runs(&doc, page, index, ExtractOptions::default());
                (runs, page.height())
            })
            .collect();
        let mut result = TokenScanner::new(config, mapper, resolver).scan(&page_runs);
        OffsetCorrector::new(&config.offsets).apply(&mut result, datasets);
        info!(
            fields = result.fields.len(),
            radios = result.radios.len(),
            pages = pages.len(),
            "inert template"
        );
        DetectionMode::Inert(result)
    };
    Ok(Detection {
        mode,
        page_count: pages.len(),
    })
}

/// Editable values for the text fields; other kinds count for detection but keep their state.
fn interactive_fields(
    form_fields: Vec<FormField>,
    mapper: &FieldNameMapper,
    resolver: &ValueResolver<'_>,
) -> Vec<InteractiveField> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for field in form_fields {
        if !field.is_text() {
            debug!(field = %field.name, kind = ?field.kind, "non-text form field skipped");
            continue;
        }
        if !seen.insert(field.name.clone()) {
            continue;
        }
        let mapping = mapper.lookup_field(&field.name).cloned();
        if mapping.is_none() {
            debug!(field = %field.name, "unmatched form field");
        }
        out.push(InteractiveField {
            current_value: mapping
                .as_ref()
                .map(|m| resolver.resolve_mapping(m))
                .unwrap_or_default(),
            name: field.name,
            mapping,
        });
    }
    out
}
