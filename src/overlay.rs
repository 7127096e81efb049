use std::collections::HashMap;

use tracing::{debug, info};

use crate::acroform::{FieldWriter, enumerate_fields, flatten};
use crate::config::{EngineConfig, Layout, MarkShape};
use crate::detect::{DetectionMode, InteractiveField, open_template};
use crate::error::EngineError;
use crate::fonts::{helvetica_font_dict, helvetica_text_width, winansi_encode};
use crate::model::Object;
use crate::pages::{
    PageInfo, append_content, collect_pages, own_resources, resource_entry, unused_name,
};
use crate::parser::PdfDoc;
use crate::radio::DetectedRadioOption;
use crate::scan::{DetectedField, ScanResult};
use crate::writer::{format_number, write_document, write_object};

/// Control-point distance for a quarter circle drawn with one cubic Bezier.
const KAPPA: f64 = 0.552_284_749_8;

/// Builds the filled document from a fresh parse of `template`.
pub fn build_output(
    template: &[u8],
    mode: &DetectionMode,
    config: &EngineConfig,
) -> Result<Vec<u8>, EngineError> {
    let mut doc = open_template(template)
        .map_err(|err| EngineError::OutputBuild(format!("template re-parse failed: {err}")))?;
    match mode {
        DetectionMode::Interactive(fields) => fill_interactive(&mut doc, fields, &config.layout)?,
        DetectionMode::Inert(result) => draw_overlay(&mut doc, result, &config.layout)?,
    }
    let bytes = write_document(&doc)?;
    info!(bytes = bytes.len(), "output document built");
    Ok(bytes)
}

pub(crate) fn fill_interactive(
    doc: &mut PdfDoc,
    fields: &[InteractiveField],
    layout: &Layout,
) -> Result<(), EngineError> {
    // Unmatched fields start empty, so writing every current value blanks them.
    let values: HashMap<&str, &str> = fields
        .iter()
        .map(|f| (f.name.as_str(), f.current_value.as_str()))
        .collect();
    let form_fields = enumerate_fields(doc);
    let mut writer = FieldWriter::new(doc);
    for field in form_fields.iter().filter(|f| f.is_text()) {
        let value = values.get(field.name.as_str()).copied().unwrap_or("");
        writer.set_text_value(field, value)?;
    }
    if layout.flatten {
        let drawn = flatten(doc)?;
        debug!(drawn, "form flattened");
    } else {
        writer.mark_need_appearances();
    }
    Ok(())
}

fn draw_overlay(doc: &mut PdfDoc, result: &ScanResult, layout: &Layout) -> Result<(), EngineError> {
    let pages = collect_pages(doc);
    let mut font = None;
    for (index, page) in pages.iter().enumerate() {
        let number = index + 1;
        let fields: Vec<&DetectedField> = result
            .fields
            .iter()
            .filter(|f| f.page == number && !f.current_value.trim().is_empty())
            .collect();
        let marks: Vec<&DetectedRadioOption> = result
            .radios
            .iter()
            .filter(|o| o.page == number && o.selected)
            .collect();
        if fields.is_empty() && marks.is_empty() {
            continue;
        }

        let font_ref = font
            .get_or_insert_with(|| doc.add_object(helvetica_font_dict()))
            .clone();
        let font_name = {
            let resources = own_resources(doc, page).ok_or_else(|| not_editable(page))?;
            let fonts = resource_entry(resources, "Font").ok_or_else(|| not_editable(page))?;
            let name = unused_name(fonts, "FfHelv");
            fonts.insert(name.clone(), font_ref);
            name
        };

        let mut content = b"q\n".to_vec();
        for field in &fields {
            draw_field(&mut content, page, field, &font_name, layout);
        }
        for mark in &marks {
            draw_mark(&mut content, page, mark, layout);
        }
        content.extend_from_slice(b"Q\n");
        append_content(doc, page, &content).ok_or_else(|| not_editable(page))?;
        debug!(page = number, fields = fields.len(), marks = marks.len(), "page overlay drawn");
    }
    Ok(())
}

fn not_editable(page: &PageInfo) -> EngineError {
    match page.object {
        Some((num, _)) => EngineError::OutputBuild(format!("page object {num} is not editable")),
        None => EngineError::OutputBuild("page dictionary is not an indirect object".into()),
    }
}

/// Converts a top-down point to PDF user space for `page`.
fn to_pdf(page: &PageInfo, x: f64, y: f64) -> (f64, f64) {
    (page.media_box.min_x + x, page.media_box.min_y + page.height() - y)
}

fn draw_field(
    out: &mut Vec<u8>,
    page: &PageInfo,
    field: &DetectedField,
    font: &str,
    layout: &Layout,
) {
    let value = field.current_value.trim();
    let base = if field.font_size_hint > 0.0 {
        field.font_size_hint
    } else {
        layout.font_size
    };
    let width = helvetica_text_width(value, base);
    let size = if width > field.width_hint && width > 0.0 {
        (base * field.width_hint / width).max(layout.min_font_size)
    } else {
        base
    };
    let (x, baseline) = to_pdf(page, field.x, field.y);

    if layout.mask_tokens && field.token_width > 0.0 {
        push_ops(
            out,
            &format!(
                "1 g {} {} {} {} re f",
                num(x - 0.5),
                num(baseline - base * 0.25),
                num(field.token_width + 1.0),
                num(base * 1.05)
            ),
        );
    }
    push_ops(
        out,
        &format!(
            "BT /{font} {} Tf 0 g {} {} Td",
            num(size),
            num(x),
            num(baseline + layout.baseline_nudge)
        ),
    );
    let mut shown = Vec::new();
    write_object(&Object::String(winansi_encode(value)), &mut shown);
    out.extend_from_slice(&shown);
    out.extend_from_slice(b" Tj ET\n");
}

fn draw_mark(out: &mut Vec<u8>, page: &PageInfo, mark: &DetectedRadioOption, layout: &Layout) {
    let base = if mark.font_size_hint > 0.0 {
        mark.font_size_hint
    } else {
        layout.font_size
    };
    let r = base * layout.mark_scale;
    let (cx, cy) = to_pdf(page, mark.x, mark.y);
    match layout.mark_shape {
        MarkShape::Square => push_ops(
            out,
            &format!("0 g {} {} {} {} re f", num(cx - r), num(cy - r), num(2.0 * r), num(2.0 * r)),
        ),
        MarkShape::Circle => {
            let k = KAPPA * r;
            push_ops(out, &format!("0 g {} {} m", num(cx + r), num(cy)));
            let quarters = [
                (cx + r, cy + k, cx + k, cy + r, cx, cy + r),
                (cx - k, cy + r, cx - r, cy + k, cx - r, cy),
                (cx - r, cy - k, cx - k, cy - r, cx, cy - r),
                (cx + k, cy - r, cx + r, cy - k, cx + r, cy),
            ];
            for (x1, y1, x2, y2, x3, y3) in quarters {
                let coords = [x1, y1, x2, y2, x3, y3].map(num).join(" ");
                push_ops(out, &format!("{coords} c"));
            }
            push_ops(out, "f");
        }
    }
}

fn push_ops(out: &mut Vec<u8>, ops: &str) {
    out.extend_from_slice(ops.as_bytes());
    out.push(b'\n');
}

fn num(value: f64) -> String {
    format_number(value)
}
