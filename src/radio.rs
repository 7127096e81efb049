use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::{ChoiceBinding, EngineConfig};
use crate::content::TextRun;
use crate::fields::{ValueResolver, normalize_key};
use crate::geometry::RTree;

/// Vertical distance from a baseline to the visual centre of lowercase glyphs,
/// as a fraction of the font size.
pub(crate) const CENTRE_RISE: f64 = 0.35;

static EXPLICIT_IN_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)radio_[A-Za-z0-9]+_[A-Za-z0-9]+").expect("valid regex")
});
static RADIO_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bradio\b").expect("valid regex"));
static ID_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^A-Za-z0-9])id[.\s_:-]\s*(\d+)").expect("valid regex")
});

/// One mark position of a mutually exclusive choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedRadioOption {
    pub token: String,
    pub group: String,
    pub option: String,
    /// Centre of the marker, top-down page space.
    pub x: f64,
    pub y: f64,
    /// 1-based.
    pub page: usize,
    pub font_size_hint: f64,
    pub selected: bool,
}

/// Splits the body of a `radio_<group>_<option>` token at its last underscore.
///
/// `id` groups with a numeric option are moved to their configured range group.
pub fn parse_explicit(inner: &str, config: &EngineConfig) -> Option<(String, String)> {
    let rest = inner.strip_prefix("radio_")?;
    let (group, option) = rest.rsplit_once('_')?;
    if group.is_empty() || option.is_empty() {
        return None;
    }
    Some((semantic_group(group, option, config), option.to_string()))
}

fn semantic_group(group: &str, option: &str, config: &EngineConfig) -> String {
    if group.eq_ignore_ascii_case("id")
        && let Ok(number) = option.parse::<u32>()
        && let Some(mapped) = config.group_for_number(number)
    {
        return mapped.to_string();
    }
    group.to_string()
}

/// Pairs bare "radio" marker runs with the nearest run carrying an `id N` fragment.
pub fn implicit_options(
    runs: &[TextRun],
    page: usize,
    page_height: f64,
    config: &EngineConfig,
) -> Vec<DetectedRadioOption> {
    let markers: Vec<usize> = runs
        .iter()
        .enumerate()
        .filter(|(_, run)| {
            RADIO_MARKER.is_match(&run.text) && !EXPLICIT_IN_RUN.is_match(&run.text)
        })
        .map(|(i, _)| i)
        .collect();
    if markers.is_empty() {
        return Vec::new();
    }

    let gap_x = config.thresholds.radio_gap_x;
    let gap_y = config.thresholds.radio_gap_y;
    let tree = RTree::build(runs.iter().map(TextRun::bounds).collect(), 8);
    let mut out = Vec::new();
    for marker_index in markers {
        let marker = &runs[marker_index];
        let area = marker.bounds();
        let nearest = tree
            .search(&area.expand(gap_x, gap_y))
            .into_iter()
            .filter(|&i| i != marker_index)
            .filter_map(|i| {
                let (gx, gy) = area.gap_to(tree.rect(i)?);
                if gx > gap_x || gy > gap_y {
                    return None;
                }
                let number = ID_NUMBER.captures(&runs[i].text)?.get(1)?.as_str().to_string();
                Some((gx + gy, i, number))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let Some((_, _, number)) = nearest else {
            debug!(page, text = %marker.text, "radio marker without a nearby id fragment");
            continue;
        };
        let group = semantic_group("id", &number, config);
        out.push(DetectedRadioOption {
            token: marker.text.trim().to_string(),
            group,
            option: number,
            x: marker.x + marker.width / 2.0,
            y: page_height - marker.y - marker.font_size * CENTRE_RISE,
            page,
            font_size_hint: marker.font_size,
            selected: false,
        });
    }
    out
}

/// Collects options while keeping the first record of each (page, group, option).
#[derive(Debug, Default)]
pub struct RadioCollector {
    seen: HashSet<(usize, String, String)>,
    options: Vec<DetectedRadioOption>,
}

impl RadioCollector {
    pub fn push(&mut self, option: DetectedRadioOption) -> bool {
        let key = (option.page, option.group.clone(), option.option.clone());
        if !self.seen.insert(key) {
            return false;
        }
        self.options.push(option);
        true
    }

    pub fn extend(&mut self, options: impl IntoIterator<Item = DetectedRadioOption>) {
        for option in options {
            self.push(option);
        }
    }

    pub fn into_options(self) -> Vec<DetectedRadioOption> {
        self.options
    }
}

/// Marks options chosen by the datasets. Groups are decided independently.
pub fn preselect(
    options: &mut [DetectedRadioOption],
    bindings: &[ChoiceBinding],
    resolver: &ValueResolver<'_>,
) {
    for binding in bindings {
        let value = normalize_key(&resolver.resolve(binding.source, &binding.data_key));
        if value.is_empty() {
            continue;
        }
        let wanted = binding
            .values
            .get(&value)
            .map(|option| normalize_key(option))
            .unwrap_or(value);
        let mut matched = false;
        for option in options.iter_mut().filter(|o| o.group == binding.group) {
            option.selected = normalize_key(&option.option) == wanted;
            matched |= option.selected;
        }
        if !matched {
            debug!(group = %binding.group, "no option matches the bound value");
        }
    }
}

/// Selects `option` in `group` and clears every sibling, on every page.
/// Leaves the group untouched and returns false when the option does not exist.
pub fn toggle(options: &mut [DetectedRadioOption], group: &str, option: &str) -> bool {
    if !options.iter().any(|o| o.group == group && o.option == option) {
        return false;
    }
    for record in options.iter_mut().filter(|o| o.group == group) {
        record.selected = record.option == option;
    }
    true
}
