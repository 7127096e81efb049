use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fields::DataSource;

/// Static tables and tunables for detection and output.
///
/// Every section falls back to its default, so a TOML file only needs the
/// parts it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub layout: Layout,
    pub fields: Vec<LogicalField>,
    pub range_groups: Vec<RangeGroup>,
    pub choice_bindings: Vec<ChoiceBinding>,
    pub offsets: Vec<OffsetEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Maximum baseline distance for a run to join a line.
    pub line_tolerance: f64,
    /// Box around a bare "radio" marker searched for an "id N" fragment.
    pub radio_gap_x: f64,
    pub radio_gap_y: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            line_tolerance: 3.0,
            radio_gap_x: 60.0,
            radio_gap_y: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarkShape {
    #[default]
    Circle,
    Square,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Layout {
    pub default_width: f64,
    /// Width of every field on a line holding two or more fields.
    pub packed_width: f64,
    /// Upward shift applied to overlay text baselines.
    pub baseline_nudge: f64,
    /// Used when the token's own glyph height is unknown.
    pub font_size: f64,
    pub min_font_size: f64,
    pub mark_shape: MarkShape,
    /// Marker radius as a fraction of the choice token's font size.
    pub mark_scale: f64,
    pub mask_tokens: bool,
    pub flatten: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            default_width: 200.0,
            packed_width: 150.0,
            baseline_nudge: 1.0,
            font_size: 10.0,
            min_font_size: 6.0,
            mark_shape: MarkShape::Circle,
            mark_scale: 0.35,
            mask_tokens: true,
            flatten: true,
        }
    }
}

/// One piece of data a template can ask for, with every spelling it may use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogicalField {
    pub source: DataSource,
    pub key: String,
    /// Field-name variants; compared after normalization.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Literal `{token}` placeholders.
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Numeric choice ids `start..=end` that belong to `group`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeGroup {
    pub group: String,
    pub start: u32,
    pub end: u32,
}

/// Dataset value that pre-selects an option in a choice group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceBinding {
    pub group: String,
    pub source: DataSource,
    pub data_key: String,
    /// Normalized dataset value to option.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OffsetEntry {
    /// Issuing authority last name, normalized on lookup.
    pub party: String,
    pub dx: f64,
    pub dy: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            layout: Layout::default(),
            fields: default_fields(),
            range_groups: vec![
                range("placard_type", 1, 3),
                range("id_type", 4, 6),
                range("condition", 7, 14),
            ],
            choice_bindings: vec![
                binding(
                    "placard_type",
                    "placardType",
                    &[("permanent", "1"), ("temporary", "2"), ("travel", "3")],
                ),
                binding(
                    "id_type",
                    "idType",
                    &[
                        ("driverslicense", "4"),
                        ("stateid", "5"),
                        ("identificationcard", "5"),
                        ("passport", "6"),
                    ],
                ),
                binding("condition", "condition", &[]),
                binding("gender", "gender", &[("m", "male"), ("f", "female")]),
            ],
            offsets: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;
        if t.line_tolerance < 0.0 || t.radio_gap_x < 0.0 || t.radio_gap_y < 0.0 {
            return Err(EngineError::Config("thresholds must not be negative".into()));
        }
        if let Some(bad) = self.range_groups.iter().find(|r| r.start > r.end) {
            return Err(EngineError::Config(format!(
                "range group {:?} starts after it ends",
                bad.group
            )));
        }
        if self.layout.min_font_size <= 0.0 || self.layout.font_size <= 0.0 {
            return Err(EngineError::Config("font sizes must be positive".into()));
        }
        Ok(())
    }

    /// Semantic group for a numeric choice id, if any range covers it.
    pub fn group_for_number(&self, number: u32) -> Option<&str> {
        self.range_groups
            .iter()
            .find(|r| (r.start..=r.end).contains(&number))
            .map(|r| r.group.as_str())
    }
}

fn range(group: &str, start: u32, end: u32) -> RangeGroup {
    RangeGroup {
        group: group.to_string(),
        start,
        end,
    }
}

fn binding(group: &str, data_key: &str, values: &[(&str, &str)]) -> ChoiceBinding {
    ChoiceBinding {
        group: group.to_string(),
        source: DataSource::Subject,
        data_key: data_key.to_string(),
        values: values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn field(source: DataSource, key: &str, aliases: &[&str], tokens: &[&str]) -> LogicalField {
    LogicalField {
        source,
        key: key.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        tokens: tokens.iter().map(|t| t.to_string()).collect(),
    }
}

fn default_fields() -> Vec<LogicalField> {
    use DataSource::{Authority, Meta, Subject};
    vec![
        field(
            Subject,
            "firstName",
            &[
                "firstName",
                "first name",
                "fname",
                "givenName",
                "patientFirstName",
                "applicantFirstName",
            ],
            &["{firstName}"],
        ),
        field(
            Subject,
            "lastName",
            &[
                "lastName",
                "last name",
                "lname",
                "surname",
                "familyName",
                "patientLastName",
                "applicantLastName",
            ],
            &["{lastName}"],
        ),
        field(
            Subject,
            "fullName",
            &["fullName", "name", "patientName", "applicantName"],
            &["{fullName}", "{name}"],
        ),
        field(
            Subject,
            "dob",
            &["dob", "dateOfBirth", "birthDate", "birthday", "patientDob"],
            &["{dob}", "{dateOfBirth}"],
        ),
        field(
            Subject,
            "address",
            &["address", "streetAddress", "street", "addressLine1", "patientAddress"],
            &["{address}"],
        ),
        field(Subject, "city", &["city", "patientCity"], &["{city}"]),
        field(Subject, "state", &["state", "patientState"], &["{state}"]),
        field(
            Subject,
            "zip",
            &["zip", "zipCode", "postalCode", "patientZip"],
            &["{zip}"],
        ),
        field(
            Subject,
            "phone",
            &["phone", "phoneNumber", "telephone", "cellPhone", "patientPhone"],
            &["{phone}"],
        ),
        field(Subject, "email", &["email", "emailAddress"], &["{email}"]),
        field(
            Subject,
            "driversLicense",
            &["driversLicense", "driversLicenseNumber", "dlNumber", "idNumber", "stateIdNumber"],
            &["{driversLicense}", "{idNumber}"],
        ),
        field(Subject, "gender", &["gender", "sex"], &["{gender}"]),
        field(
            Authority,
            "firstName",
            &["doctorFirstName", "physicianFirstName", "providerFirstName"],
            &["{doctorFirstName}"],
        ),
        field(
            Authority,
            "lastName",
            &["doctorLastName", "physicianLastName", "providerLastName"],
            &["{doctorLastName}"],
        ),
        field(
            Authority,
            "fullName",
            &["doctorName", "physicianName", "providerName", "doctorFullName"],
            &["{doctorName}"],
        ),
        field(
            Authority,
            "licenseNumber",
            &["licenseNumber", "medicalLicense", "doctorLicense", "doctorLicenseNumber"],
            &["{licenseNumber}"],
        ),
        field(Authority, "npi", &["npi", "npiNumber", "doctorNpi"], &["{npi}"]),
        field(
            Authority,
            "phone",
            &["doctorPhone", "physicianPhone", "clinicPhone", "officePhone"],
            &["{doctorPhone}"],
        ),
        field(
            Authority,
            "address",
            &["doctorAddress", "clinicAddress", "officeAddress"],
            &["{doctorAddress}"],
        ),
        field(Authority, "city", &["doctorCity", "clinicCity"], &["{doctorCity}"]),
        field(Authority, "state", &["doctorState", "clinicState"], &["{doctorState}"]),
        field(Authority, "zip", &["doctorZip", "clinicZip"], &["{doctorZip}"]),
        field(
            Authority,
            "specialty",
            &["specialty", "doctorSpecialty"],
            &["{specialty}"],
        ),
        field(
            Meta,
            "date",
            &["date", "todaysDate", "currentDate", "dateSigned", "signatureDate"],
            &["{date}", "{today}"],
        ),
    ]
}
