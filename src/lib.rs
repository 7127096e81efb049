pub mod acroform;
pub mod config;
pub mod content;
mod crypt;
pub mod detect;
pub mod error;
pub mod fields;
pub mod fonts;
pub mod geometry;
pub mod model;
pub mod offsets;
pub mod overlay;
pub mod pages;
pub mod parser;
pub mod preview;
pub mod radio;
pub mod scan;
pub mod session;
pub mod tokenizer;
pub mod writer;

pub use config::EngineConfig;
pub use detect::{Detection, DetectionMode, InteractiveField, detect};
pub use error::EngineError;
pub use fields::{DataSource, Datasets, FieldNameMapper};
pub use radio::DetectedRadioOption;
pub use scan::{DetectedField, ScanResult};
pub use session::{
    BuiltDocument, FileTemplateSource, LoadOutcome, LoadTicket, SessionState, StaticTemplateSource,
    TemplateSource,
};
