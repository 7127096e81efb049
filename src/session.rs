use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::detect::{Detection, DetectionMode, InteractiveField, detect};
use crate::error::EngineError;
use crate::fields::{Datasets, FieldNameMapper};
use crate::overlay::build_output;
use crate::preview::render_page;
use crate::radio::{self, DetectedRadioOption};
use crate::scan::DetectedField;

/// Byte-fetch capability supplied by the host.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError>;
}

/// Reads templates from disk; relative urls resolve against `root`.
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    root: PathBuf,
}

impl FileTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(url);
        tokio::fs::read(&path).await.map_err(|err| EngineError::Fetch {
            url: url.to_string(),
            reason: format!("{}: {err}", path.display()),
        })
    }
}

/// In-memory templates keyed by url.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateSource {
    templates: HashMap<String, Arc<[u8]>>,
}

impl StaticTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.templates.insert(url.into(), bytes.into());
        self
    }
}

#[async_trait]
impl TemplateSource for StaticTemplateSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        self.templates
            .get(url)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| EngineError::Fetch {
                url: url.to_string(),
                reason: "no such template".into(),
            })
    }
}

/// A finished output document.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Template bytes with their detection, ready to be applied to a session.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    bytes: Arc<[u8]>,
    detection: Detection,
}

impl PreparedTemplate {
    pub fn detection(&self) -> &Detection {
        &self.detection
    }
}

/// Runs detection synchronously.
pub fn prepare(
    bytes: Arc<[u8]>,
    config: &EngineConfig,
    mapper: &FieldNameMapper,
    datasets: &Datasets,
) -> Result<PreparedTemplate, EngineError> {
    let detection = detect(&bytes, config, mapper, datasets)?;
    Ok(PreparedTemplate { bytes, detection })
}

/// Fetches and prepares a template off the async runtime without touching any session.
pub async fn prepare_template(
    source: &dyn TemplateSource,
    url: &str,
    config: Arc<EngineConfig>,
    datasets: Datasets,
) -> Result<PreparedTemplate, EngineError> {
    let bytes: Arc<[u8]> = source.fetch(url).await?.into();
    debug!(url, bytes = bytes.len(), "template fetched");
    tokio::task::spawn_blocking(move || {
        let mapper = FieldNameMapper::new(&config.fields);
        prepare(bytes, &config, &mapper, &datasets)
    })
    .await?
}

/// Identifies one load attempt; only the newest ticket may apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load started after this ticket was issued; the result was dropped.
    Stale,
}

#[derive(Debug, Clone)]
struct Loaded {
    bytes: Arc<[u8]>,
    mode: DetectionMode,
    page_count: usize,
    current_page: usize,
}

/// The editable view of one loaded template.
#[derive(Debug)]
pub struct SessionState {
    config: Arc<EngineConfig>,
    mapper: Arc<FieldNameMapper>,
    datasets: Datasets,
    generation: u64,
    loaded: Option<Loaded>,
}

impl SessionState {
    pub fn new(config: EngineConfig, datasets: Datasets) -> Self {
        let mapper = FieldNameMapper::new(&config.fields);
        Self {
            config: Arc::new(config),
            mapper: Arc::new(mapper),
            datasets,
            generation: 0,
            loaded: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    /// Discards the current template and detects `bytes` synchronously.
    pub fn load(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<(), EngineError> {
        let ticket = self.begin_load();
        let result = prepare(bytes.into(), &self.config, &self.mapper, &self.datasets);
        self.complete_load(ticket, result).map(|_| ())
    }

    /// Starts a load: every earlier ticket becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Applies a prepared template if `ticket` is still the newest one.
    ///
    /// A failed current load clears the session and returns the error.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<PreparedTemplate, EngineError>,
    ) -> Result<LoadOutcome, EngineError> {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale load"
            );
            return Ok(LoadOutcome::Stale);
        }
        self.loaded = None;
        let prepared = result?;
        info!(
            generation = self.generation,
            pages = prepared.detection.page_count,
            "template loaded"
        );
        self.loaded = Some(Loaded {
            bytes: prepared.bytes,
            mode: prepared.detection.mode,
            page_count: prepared.detection.page_count,
            current_page: 0,
        });
        Ok(LoadOutcome::Applied)
    }

    /// Fetches, prepares and applies a template.
    pub async fn load_from(
        &mut self,
        source: &dyn TemplateSource,
        url: &str,
    ) -> Result<LoadOutcome, EngineError> {
        let ticket = self.begin_load();
        let result =
            prepare_template(source, url, self.config.clone(), self.datasets.clone()).await;
        self.complete_load(ticket, result)
    }

    fn loaded(&self) -> Result<&Loaded, EngineError> {
        self.loaded.as_ref().ok_or(EngineError::NotLoaded)
    }

    fn loaded_mut(&mut self) -> Result<&mut Loaded, EngineError> {
        self.loaded.as_mut().ok_or(EngineError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn mode(&self) -> Option<&DetectionMode> {
        self.loaded.as_ref().map(|l| &l.mode)
    }

    pub fn fields(&self) -> &[DetectedField] {
        match self.mode() {
            Some(DetectionMode::Inert(result)) => &result.fields,
            _ => &[],
        }
    }

    pub fn radios(&self) -> &[DetectedRadioOption] {
        match self.mode() {
            Some(DetectionMode::Inert(result)) => &result.radios,
            _ => &[],
        }
    }

    pub fn interactive_fields(&self) -> &[InteractiveField] {
        match self.mode() {
            Some(DetectionMode::Interactive(fields)) => fields,
            _ => &[],
        }
    }

    /// `key` is a field's unique key for inert templates and its name for interactive ones.
    pub fn set_field_value(
        &mut self,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), EngineError> {
        let loaded = self.loaded_mut()?;
        let slot = match &mut loaded.mode {
            DetectionMode::Inert(result) => result
                .fields
                .iter_mut()
                .find(|f| f.unique_key == key)
                .map(|f| &mut f.current_value),
            DetectionMode::Interactive(fields) => fields
                .iter_mut()
                .find(|f| f.name == key)
                .map(|f| &mut f.current_value),
        };
        let slot = slot.ok_or_else(|| EngineError::UnknownField(key.to_string()))?;
        *slot = value.into();
        Ok(())
    }

    /// Selects `option` and clears the rest of `group`.
    pub fn toggle_radio(&mut self, group: &str, option: &str) -> Result<(), EngineError> {
        let loaded = self.loaded_mut()?;
        let found = match &mut loaded.mode {
            DetectionMode::Inert(result) => radio::toggle(&mut result.radios, group, option),
            DetectionMode::Interactive(_) => false,
        };
        if !found {
            return Err(EngineError::UnknownOption {
                group: group.to_string(),
                option: option.to_string(),
            });
        }
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.page_count)
    }

    /// Zero-based.
    pub fn current_page(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.current_page)
    }

    /// Moves to `index`, clamped to the document; returns the page now shown.
    pub fn set_current_page(&mut self, index: usize) -> usize {
        match self.loaded.as_mut() {
            Some(loaded) => {
                loaded.current_page = index.min(loaded.page_count.saturating_sub(1));
                loaded.current_page
            }
            None => 0,
        }
    }

    pub fn next_page(&mut self) -> usize {
        self.set_current_page(self.current_page() + 1)
    }

    pub fn previous_page(&mut self) -> usize {
        self.set_current_page(self.current_page().saturating_sub(1))
    }

    pub fn build_output(&self) -> Result<BuiltDocument, EngineError> {
        self.build_output_on(Local::now().date_naive())
    }

    /// Builds the output with the file name dated `today`. The session is left as it was.
    pub fn build_output_on(&self, today: NaiveDate) -> Result<BuiltDocument, EngineError> {
        let loaded = self.loaded()?;
        let bytes = build_output(&loaded.bytes, &loaded.mode, &self.config).inspect_err(|err| {
            warn!(error = %err, "output build failed");
        })?;
        Ok(BuiltDocument {
            bytes,
            file_name: suggested_file_name(&self.datasets, today),
        })
    }

    pub async fn build_output_async(&self) -> Result<BuiltDocument, EngineError> {
        let loaded = self.loaded()?;
        let (bytes, mode) = (loaded.bytes.clone(), loaded.mode.clone());
        let config = self.config.clone();
        let output =
            tokio::task::spawn_blocking(move || build_output(&bytes, &mode, &config)).await??;
        Ok(BuiltDocument {
            bytes: output,
            file_name: suggested_file_name(&self.datasets, Local::now().date_naive()),
        })
    }

    /// Rasterizes the current page from its own parse of the template.
    pub fn render_preview(&self, scale: f64) -> Result<RgbaImage, EngineError> {
        let loaded = self.loaded()?;
        render_page(&loaded.bytes, &loaded.mode, &self.config, loaded.current_page, scale)
    }

    pub async fn render_preview_async(&self, scale: f64) -> Result<RgbaImage, EngineError> {
        let loaded = self.loaded()?;
        let (bytes, mode, config, page) = (
            loaded.bytes.clone(),
            loaded.mode.clone(),
            self.config.clone(),
            loaded.current_page,
        );
        tokio::task::spawn_blocking(move || render_page(&bytes, &mode, &config, page, scale)).await?
    }
}

/// `FirstName_LastName_Document_MM-DD-YYYY`; names keep only alphanumerics and `-`.
pub fn suggested_file_name(datasets: &Datasets, today: NaiveDate) -> String {
    let mut parts: Vec<String> = ["firstName", "lastName"]
        .iter()
        .filter_map(|key| datasets.subject.get(*key))
        .map(|name| {
            name.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
        })
        .filter(|name| !name.is_empty())
        .collect();
    parts.push("Document".to_string());
    parts.push(today.format("%m-%d-%Y").to_string());
    parts.join("_")
}
