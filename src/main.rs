use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use formfill::preview::encode_png;
use formfill::{Datasets, EngineConfig, FileTemplateSource, SessionState};

#[derive(Debug, Parser)]
#[command(
    name = "formfill",
    version,
    about = "Fill PDF templates from subject and authority records"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a filled copy of a template.
    Fill {
        #[command(flatten)]
        input: Input,
        /// Output path; defaults to the suggested file name in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Override a field value, as `key=value` (unique key or form field name).
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
        /// Select a choice option, as `group=option`.
        #[arg(long = "select", value_name = "GROUP=OPTION")]
        selects: Vec<String>,
    },
    /// Print the detected fields and choice options as JSON.
    Inspect {
        #[command(flatten)]
        input: Input,
    },
    /// Render one page with its current values to a PNG.
    Preview {
        #[command(flatten)]
        input: Input,
        /// One-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Args)]
struct Input {
    template: PathBuf,
    /// JSON object with `subject`, `authority` and optional `meta` records.
    #[arg(long)]
    data: Option<PathBuf>,
    /// TOML file overriding the built-in tables and layout.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("formfill=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Fill {
            input,
            out,
            sets,
            selects,
        } => {
            let mut session = open_session(&input).await?;
            for pair in &sets {
                let (key, value) = split_pair(pair)?;
                session.set_field_value(key, value)?;
            }
            for pair in &selects {
                let (group, option) = split_pair(pair)?;
                session.toggle_radio(group, option)?;
            }
            let built = session.build_output_async().await?;
            let path = out.unwrap_or_else(|| PathBuf::from(&built.file_name));
            tokio::fs::write(&path, &built.bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), bytes = built.bytes.len(), "filled document written");
        }
        Command::Inspect { input } => {
            let session = open_session(&input).await?;
            let mode = session.mode().context("template was not loaded")?;
            println!("{}", serde_json::to_string_pretty(mode)?);
        }
        Command::Preview {
            input,
            page,
            scale,
            out,
        } => {
            let mut session = open_session(&input).await?;
            if page == 0 || page > session.page_count() {
                bail!("page {page} is outside 1..={}", session.page_count());
            }
            session.set_current_page(page - 1);
            let img = session.render_preview_async(scale).await?;
            tokio::fs::write(&out, encode_png(&img)?)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
        }
    }
    Ok(())
}

async fn open_session(input: &Input) -> Result<SessionState> {
    let config = match &input.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let datasets = match &input.data {
        Some(path) => read_datasets(path).await?,
        None => Datasets::default(),
    };
    let mut session = SessionState::new(config, datasets.with_today(Local::now().date_naive()));
    let source = FileTemplateSource::new(".");
    let url = input.template.to_string_lossy();
    session
        .load_from(&source, &url)
        .await
        .with_context(|| format!("loading template {url}"))?;
    Ok(session)
}

async fn read_datasets(path: &Path) -> Result<Datasets> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got {pair:?}"))
}
