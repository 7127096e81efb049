use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LogicalField;

/// Which dataset a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Subject,
    Authority,
    Meta,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FieldMapping {
    pub source: DataSource,
    pub data_key: String,
}

/// Lowercases and drops everything that is not a letter or digit.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lookup tables from field names and placeholder tokens to dataset keys.
///
/// Both tables are built from the same logical field list so a name and
/// its `{token}` spelling always resolve to the same value.
#[derive(Debug, Clone, Default)]
pub struct FieldNameMapper {
    by_name: HashMap<String, FieldMapping>,
    by_token: HashMap<String, FieldMapping>,
}

impl FieldNameMapper {
    pub fn new(fields: &[LogicalField]) -> Self {
        let mut mapper = Self::default();
        for field in fields {
            let mapping = FieldMapping {
                source: field.source,
                data_key: field.key.clone(),
            };
            for alias in &field.aliases {
                let key = normalize_key(alias);
                if key.is_empty() {
                    continue;
                }
                if let Some(existing) = mapper.by_name.get(&key) {
                    if existing != &mapping {
                        debug!(alias = %alias, "duplicate field alias ignored");
                    }
                    continue;
                }
                mapper.by_name.insert(key, mapping.clone());
            }
            for token in &field.tokens {
                mapper
                    .by_token
                    .entry(token.clone())
                    .or_insert_with(|| mapping.clone());
            }
        }
        mapper
    }

    pub fn lookup_name(&self, name: &str) -> Option<&FieldMapping> {
        self.by_name.get(&normalize_key(name))
    }

    /// Matches a literal `{token}`, then its normalized interior as a field name.
    pub fn lookup_token(&self, token: &str) -> Option<&FieldMapping> {
        if let Some(mapping) = self.by_token.get(token) {
            return Some(mapping);
        }
        let inner = token
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(token);
        self.lookup_name(inner)
    }

    /// Tries the fully qualified name, the terminal part, then the terminal
    /// part without a trailing `[n]` index.
    pub fn lookup_field(&self, qualified: &str) -> Option<&FieldMapping> {
        if let Some(mapping) = self.lookup_name(qualified) {
            return Some(mapping);
        }
        let partial = qualified.rsplit('.').next().unwrap_or(qualified);
        if let Some(mapping) = self.lookup_name(partial) {
            return Some(mapping);
        }
        let trimmed = match partial.rfind('[') {
            Some(open) if partial.ends_with(']') => &partial[..open],
            _ => return None,
        };
        self.lookup_name(trimmed)
    }
}

/// The three flat records a template is filled from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Datasets {
    pub subject: BTreeMap<String, String>,
    pub authority: BTreeMap<String, String>,
    pub meta: BTreeMap<String, String>,
}

impl Datasets {
    pub fn get(&self, source: DataSource) -> &BTreeMap<String, String> {
        match source {
            DataSource::Subject => &self.subject,
            DataSource::Authority => &self.authority,
            DataSource::Meta => &self.meta,
        }
    }

    /// Fills `meta.date` with `today` unless the caller supplied one.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.meta
            .entry("date".to_string())
            .or_insert_with(|| today.format("%m/%d/%Y").to_string());
        self
    }
}

/// Resolves dataset values and applies per-key display formatting.
#[derive(Debug, Clone, Copy)]
pub struct ValueResolver<'a> {
    datasets: &'a Datasets,
}

impl<'a> ValueResolver<'a> {
    pub fn new(datasets: &'a Datasets) -> Self {
        Self { datasets }
    }

    pub fn resolve(&self, source: DataSource, key: &str) -> String {
        let record = self.datasets.get(source);
        let raw = match record.get(key) {
            Some(value) => value.trim().to_string(),
            None if key == "fullName" => {
                let parts: Vec<&str> = ["firstName", "lastName"]
                    .iter()
                    .filter_map(|k| record.get(*k))
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .collect();
                parts.join(" ")
            }
            None => String::new(),
        };
        format_value(key, raw)
    }

    pub fn resolve_mapping(&self, mapping: &FieldMapping) -> String {
        self.resolve(mapping.source, &mapping.data_key)
    }
}

fn format_value(key: &str, value: String) -> String {
    match key {
        "dob" => match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
            Ok(date) => date.format("%m/%d/%Y").to_string(),
            Err(_) => value,
        },
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::collections::HashSet;

    fn mapper() -> FieldNameMapper {
        FieldNameMapper::new(&EngineConfig::default().fields)
    }

    fn datasets() -> Datasets {
        let mut d = Datasets::default();
        d.subject.insert("firstName".into(), "Ada".into());
        d.subject.insert("lastName".into(), "Lovelace".into());
        d.subject.insert("dob".into(), "1990-05-02".into());
        d.authority.insert("lastName".into(), "Babbage".into());
        d
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize_key("Date of Birth"), "dateofbirth");
        assert_eq!(normalize_key("first_name[0]"), "firstname0");
    }

    #[test]
    fn default_aliases_do_not_collide() {
        let mut seen = HashSet::new();
        for field in EngineConfig::default().fields {
            for alias in &field.aliases {
                assert!(seen.insert(normalize_key(alias)), "duplicate alias {alias}");
            }
        }
    }

    #[test]
    fn names_and_tokens_agree() {
        let m = mapper();
        let by_name = m.lookup_name("Date-Of-Birth").cloned();
        assert_eq!(m.lookup_token("{dob}").cloned(), by_name);
        assert_eq!(m.lookup_token("{dateOfBirth}").cloned(), by_name);
        assert_eq!(m.lookup_token("{birth_date}").cloned(), by_name);
        assert!(m.lookup_token("{totallyUnknownField}").is_none());
    }

    #[test]
    fn field_lookup_falls_back_to_partial_names() {
        let m = mapper();
        let dob = m.lookup_name("dob").cloned();
        assert_eq!(m.lookup_field("form1.page1.DOB").cloned(), dob);
        assert_eq!(m.lookup_field("form1.dob[0]").cloned(), dob);
        assert!(m.lookup_field("form1.signature[0]").is_none());
    }

    #[test]
    fn dob_is_reformatted() {
        let d = datasets();
        let r = ValueResolver::new(&d);
        assert_eq!(r.resolve(DataSource::Subject, "dob"), "05/02/1990");
        let mut odd = d.clone();
        odd.subject.insert("dob".into(), "May 2 1990".into());
        assert_eq!(ValueResolver::new(&odd).resolve(DataSource::Subject, "dob"), "May 2 1990");
    }

    #[test]
    fn missing_keys_are_empty_and_full_name_is_derived() {
        let d = datasets();
        let r = ValueResolver::new(&d);
        assert_eq!(r.resolve(DataSource::Subject, "email"), "");
        assert_eq!(r.resolve(DataSource::Subject, "fullName"), "Ada Lovelace");
        assert_eq!(r.resolve(DataSource::Authority, "fullName"), "Babbage");
    }

    #[test]
    fn today_fills_only_missing_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        let d = Datasets::default().with_today(today);
        assert_eq!(d.meta.get("date").map(String::as_str), Some("03/09/2024"));
        let mut preset = Datasets::default();
        preset.meta.insert("date".into(), "given".into());
        assert_eq!(preset.with_today(today).meta["date"], "given");
    }
}
