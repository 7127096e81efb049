use std::collections::HashMap;

use tracing::debug;

use crate::config::OffsetEntry;
use crate::fields::{Datasets, normalize_key};
use crate::scan::ScanResult;

/// Fixed per-authority nudge for templates whose typesetting is slightly off.
#[derive(Debug, Clone, Default)]
pub struct OffsetCorrector {
    table: HashMap<String, (f64, f64)>,
}

impl OffsetCorrector {
    pub fn new(entries: &[OffsetEntry]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|entry| (normalize_key(&entry.party), (entry.dx, entry.dy)))
                .collect(),
        }
    }

    pub fn lookup(&self, last_name: &str) -> (f64, f64) {
        self.table
            .get(&normalize_key(last_name))
            .copied()
            .unwrap_or((0.0, 0.0))
    }

    /// Shifts every field and option; positive `dy` moves down the page.
    pub fn apply(&self, result: &mut ScanResult, datasets: &Datasets) {
        let last_name = datasets.authority.get("lastName").map_or("", String::as_str);
        let (dx, dy) = self.lookup(last_name);
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        debug!(party = last_name, dx, dy, "applying offset correction");
        for field in &mut result.fields {
            field.x += dx;
            field.y += dy;
        }
        for option in &mut result.radios {
            option.x += dx;
            option.y += dy;
        }
    }
}
