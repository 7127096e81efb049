use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::content::TextRun;
use crate::fields::{DataSource, FieldNameMapper, ValueResolver};
use crate::fonts::helvetica_text_width;
use crate::radio::{self, CENTRE_RISE, DetectedRadioOption, RadioCollector};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid regex"));

/// A value slot found at a `{token}` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedField {
    pub token: String,
    /// Token, page, line and character offset; identical bytes give identical keys.
    pub unique_key: String,
    pub source: DataSource,
    pub data_key: String,
    /// Left edge of the token; `y` is its baseline, top-down.
    pub x: f64,
    pub y: f64,
    pub width_hint: f64,
    pub token_width: f64,
    pub font_size_hint: f64,
    /// 1-based.
    pub page: usize,
    pub current_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanResult {
    pub fields: Vec<DetectedField>,
    pub radios: Vec<DetectedRadioOption>,
}

/// Runs sharing a baseline, ordered left to right.
#[derive(Debug, Clone)]
pub struct Line<'r> {
    pub baseline: f64,
    pub runs: Vec<&'r TextRun>,
}

impl Line<'_> {
    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

/// A run joins the first line whose first run lies within `tolerance` of its
/// baseline. Lines come back top to bottom.
pub fn cluster_lines(runs: &[TextRun], tolerance: f64) -> Vec<Line<'_>> {
    let mut lines: Vec<Line<'_>> = Vec::new();
    for run in runs {
        match lines
            .iter_mut()
            .find(|line| (line.baseline - run.y).abs() <= tolerance)
        {
            Some(line) => line.runs.push(run),
            None => lines.push(Line {
                baseline: run.y,
                runs: vec![run],
            }),
        }
    }
    for line in &mut lines {
        line.runs.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines.sort_by(|a, b| b.baseline.total_cmp(&a.baseline));
    lines
}

/// Position of one placeholder within a line.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHit {
    pub token: String,
    pub inner: String,
    pub char_offset: usize,
    pub x: f64,
    /// Baseline, top-down.
    pub y: f64,
    pub width: f64,
    pub font_size: f64,
}

/// Finds every placeholder in `line` and interpolates its position inside the
/// run that holds its first character. Tokens with no such run are dropped.
pub fn scan_line(line: &Line<'_>, page_height: f64) -> Vec<TokenHit> {
    let text = line.text();
    let mut hits = Vec::new();
    for caps in TOKEN.captures_iter(&text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let start = text[..whole.start()].chars().count();
        let len = whole.as_str().chars().count();
        let Some((run, x)) = locate(line, start) else {
            debug!(token = whole.as_str(), "token position could not be computed");
            continue;
        };
        let width = match locate(line, start + len - 1) {
            Some((last, last_x)) => {
                let glyph = last.width / last.char_count as f64;
                (last_x + glyph - x).max(0.0)
            }
            None => helvetica_text_width(whole.as_str(), run.font_size),
        };
        hits.push(TokenHit {
            token: whole.as_str().to_string(),
            inner: inner.as_str().to_string(),
            char_offset: start,
            x,
            y: page_height - run.y,
            width,
            font_size: run.font_size,
        });
    }
    hits
}

/// Run holding line character `offset` and the interpolated x of that character.
fn locate<'r>(line: &Line<'r>, offset: usize) -> Option<(&'r TextRun, f64)> {
    let mut consumed = 0;
    for run in &line.runs {
        if run.char_count == 0 {
            continue;
        }
        if offset < consumed + run.char_count {
            let within = (offset - consumed) as f64;
            return Some((run, run.x + within / run.char_count as f64 * run.width));
        }
        consumed += run.char_count;
    }
    None
}

/// Turns page text runs into positioned fields and choice options.
pub struct TokenScanner<'a> {
    config: &'a EngineConfig,
    mapper: &'a FieldNameMapper,
    resolver: ValueResolver<'a>,
}

impl<'a> TokenScanner<'a> {
    pub fn new(
        config: &'a EngineConfig,
        mapper: &'a FieldNameMapper,
        resolver: ValueResolver<'a>,
    ) -> Self {
        Self {
            config,
            mapper,
            resolver,
        }
    }

    /// `pages` holds each page's runs with its MediaBox height.
    pub fn scan(&self, pages: &[(Vec<TextRun>, f64)]) -> ScanResult {
        let mut fields = Vec::new();
        let mut radios = RadioCollector::default();
        for (index, (runs, height)) in pages.iter().enumerate() {
            let page = index + 1;
            self.scan_page(runs, page, *height, &mut fields, &mut radios);
            radios.extend(radio::implicit_options(runs, page, *height, self.config));
        }
        let mut radios = radios.into_options();
        radio::preselect(&mut radios, &self.config.choice_bindings, &self.resolver);
        debug!(fields = fields.len(), radios = radios.len(), "token scan finished");
        ScanResult { fields, radios }
    }

    fn scan_page(
        &self,
        runs: &[TextRun],
        page: usize,
        page_height: f64,
        fields: &mut Vec<DetectedField>,
        radios: &mut RadioCollector,
    ) {
        let layout = &self.config.layout;
        for (line_index, line) in cluster_lines(runs, self.config.thresholds.line_tolerance)
            .iter()
            .enumerate()
        {
            let first_field = fields.len();
            for hit in scan_line(line, page_height) {
                if let Some((group, option)) = radio::parse_explicit(&hit.inner, self.config) {
                    radios.push(DetectedRadioOption {
                        token: hit.token,
                        group,
                        option,
                        x: hit.x + hit.width / 2.0,
                        y: hit.y - hit.font_size * CENTRE_RISE,
                        page,
                        font_size_hint: hit.font_size,
                        selected: false,
                    });
                    continue;
                }
                let Some(mapping) = self.mapper.lookup_token(&hit.token) else {
                    debug!(token = %hit.token, page, "unmapped token ignored");
                    continue;
                };
                fields.push(DetectedField {
                    unique_key: format!(
                        "{}@{}:{}:{}",
                        hit.inner, page, line_index, hit.char_offset
                    ),
                    current_value: self.resolver.resolve_mapping(mapping),
                    source: mapping.source,
                    data_key: mapping.data_key.clone(),
                    token: hit.token,
                    x: hit.x,
                    y: hit.y,
                    width_hint: layout.default_width,
                    token_width: hit.width,
                    font_size_hint: hit.font_size,
                    page,
                });
            }
            if fields.len() - first_field >= 2 {
                for field in &mut fields[first_field..] {
                    field.width_hint = layout.packed_width;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Datasets;
    use pretty_assertions::assert_eq;

    fn run(text: &str, x: f64, y: f64, width: f64) -> TextRun {
        TextRun {
            text: text.to_string(),
            page_index: 0,
            x,
            y,
            width,
            font_size: 10.0,
            char_count: text.chars().count(),
        }
    }

    fn scan(pages: &[(Vec<TextRun>, f64)], data: &Datasets) -> ScanResult {
        let config = EngineConfig::default();
        let mapper = FieldNameMapper::new(&config.fields);
        TokenScanner::new(&config, &mapper, ValueResolver::new(data)).scan(pages)
    }

    #[test]
    fn runs_cluster_by_baseline_and_sort_by_x() {
        let runs = vec![
            run("world", 150.0, 701.0, 30.0),
            run("below", 100.0, 650.0, 30.0),
            run("hello ", 100.0, 700.0, 40.0),
            run("drift", 200.0, 704.5, 30.0),
        ];
        let lines = cluster_lines(&runs, 3.0);
        let texts: Vec<String> = lines.iter().map(Line::text).collect();
        assert_eq!(texts, ["drift", "hello world", "below"]);
    }

    #[test]
    fn token_position_is_interpolated_within_its_run() {
        let runs = vec![run("ABC{x}DEF", 100.0, 692.0, 90.0)];
        let lines = cluster_lines(&runs, 3.0);
        let hits = scan_line(&lines[0], 792.0);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].x - 130.0).abs() < 1e-9);
        assert!((hits[0].width - 30.0).abs() < 1e-9);
        assert_eq!(hits[0].y, 100.0);
    }

    #[test]
    fn tokens_spanning_runs_start_in_the_right_run() {
        let runs = vec![
            run("Name: ", 50.0, 700.0, 30.0),
            run("{first", 80.0, 700.0, 30.0),
            run("Name}", 110.0, 700.0, 25.0),
        ];
        let lines = cluster_lines(&runs, 3.0);
        let hits = scan_line(&lines[0], 792.0);
        assert_eq!(hits[0].token, "{firstName}");
        assert_eq!(hits[0].char_offset, 6);
        assert!((hits[0].x - 80.0).abs() < 1e-9);
        assert!((hits[0].width - 55.0).abs() < 1e-9);
    }

    #[test]
    fn packed_lines_get_narrow_widths() {
        let pages = vec![(
            vec![
                run("{firstName} {lastName}", 72.0, 700.0, 200.0),
                run("{dob}", 72.0, 650.0, 30.0),
            ],
            792.0,
        )];
        let result = scan(&pages, &Datasets::default());
        let widths: Vec<(&str, f64)> = result
            .fields
            .iter()
            .map(|f| (f.token.as_str(), f.width_hint))
            .collect();
        assert_eq!(widths, [("{firstName}", 150.0), ("{lastName}", 150.0), ("{dob}", 200.0)]);
    }

    #[test]
    fn unknown_tokens_are_skipped_and_values_resolved() {
        let mut data = Datasets::default();
        data.subject.insert("dob".into(), "1990-05-02".into());
        let pages = vec![(vec![run("{totallyUnknownField} {dob}", 72.0, 700.0, 200.0)], 792.0)];
        let result = scan(&pages, &data);
        assert_eq!(result.fields.len(), 1);
        assert_eq!(result.fields[0].current_value, "05/02/1990");
        assert_eq!(result.fields[0].page, 1);
        assert_eq!(result.fields[0].width_hint, 200.0);
    }

    #[test]
    fn explicit_radios_go_to_the_option_list() {
        let mut data = Datasets::default();
        data.subject.insert("placardType".into(), "Temporary".into());
        let pages = vec![(
            vec![
                run("{radio_id_1} Permanent", 72.0, 700.0, 110.0),
                run("{radio_id_2} Temporary", 72.0, 680.0, 110.0),
                run("{radio_id_2} Temporary", 72.0, 680.0, 110.0),
            ],
            792.0,
        )];
        let result = scan(&pages, &data);
        assert!(result.fields.is_empty());
        assert_eq!(result.radios.len(), 2);
        assert!(result.radios.iter().all(|r| r.group == "placard_type"));
        let selected: Vec<&str> = result
            .radios
            .iter()
            .filter(|r| r.selected)
            .map(|r| r.option.as_str())
            .collect();
        assert_eq!(selected, ["2"]);
    }

    #[test]
    fn rescanning_is_deterministic() {
        let pages = vec![(
            vec![run("{firstName}", 72.0, 700.0, 60.0), run("{lastName}", 200.0, 701.0, 60.0)],
            792.0,
        )];
        let first = scan(&pages, &Datasets::default());
        let second = scan(&pages, &Datasets::default());
        assert_eq!(first, second);
        assert_ne!(first.fields[0].unique_key, first.fields[1].unique_key);
    }
}
