use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{HighlightRect, LayoutProvider, Raster, RecognizedPage};
use image::Rgba;
use pdf_engine::default_engine;
use scanlight_core::{
    Document, LayoutCache, PipelineConfig, Progress, ProgressCallback, Workspace,
};
use scanlight_recognizer::HttpRecognizer;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HIGHLIGHT_FILL: [u8; 3] = [255, 214, 0];
const HIGHLIGHT_ALPHA: f32 = 0.4;

#[derive(Debug, Parser)]
#[command(name = "scanlight")]
#[command(about = "Recognize scanned PDFs and highlight search hits")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Run every page through a recognition service.
    Recognize {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Recognition service URL.
        #[arg(long)]
        endpoint: Option<String>,
        /// Language hint passed to the service.
        #[arg(long)]
        language: Option<String>,
        /// Environment variable holding the service API key.
        #[arg(long, value_name = "VAR")]
        api_key_env: Option<String>,
        /// Pipeline configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Write recognized pages here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Search recognized pages produced by `recognize`.
    Search {
        /// Recognized pages JSON.
        #[arg(long, value_name = "FILE")]
        pages: PathBuf,
        #[arg(value_name = "QUERY")]
        query: String,
        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compute highlight rectangles for a query on one page.
    Highlight {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Render scale; defaults to the configured display scale.
        #[arg(long)]
        scale: Option<f32>,
        /// Pipeline configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Write the page with highlights drawn as PNG.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
}

#[derive(Debug, Serialize)]
struct HighlightOutput<'a> {
    page: u32,
    query: &'a str,
    width_px: u32,
    height_px: u32,
    rects: Vec<HighlightRect>,
}

/// Accepted shapes of a recognized pages file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PagesFile {
    Document(Document),
    Pages(Vec<RecognizedPage>),
}

impl PagesFile {
    fn into_pages(self) -> Vec<RecognizedPage> {
        match self {
            PagesFile::Document(document) => document.pages().to_vec(),
            PagesFile::Pages(pages) => pages,
        }
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Recognize { file, endpoint, language, api_key_env, config, output } => {
            let config = load_config(config.as_deref())?;
            let config = apply_overrides(config, endpoint, language, api_key_env);
            run_recognize(&file, config, output.as_deref())
        }
        Commands::Search { pages, query, json } => run_search(&pages, &query, json),
        Commands::Highlight { file, query, page, scale, config, output } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(scale) = scale {
                config = config.with_display_scale(scale);
            }
            config.validate()?;
            run_highlight(&file, &query, page, &config, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_overrides(
    mut config: PipelineConfig,
    endpoint: Option<String>,
    language: Option<String>,
    api_key_env: Option<String>,
) -> PipelineConfig {
    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(language) = language {
        config = config.with_language(language);
    }
    if let Some(var) = api_key_env {
        config = config.with_api_key_env(var);
    }
    config
}

fn run_info(file: &Path) -> Result<()> {
    let bytes = read_pdf(file)?;

    let mut engine = default_engine();
    let opened = engine.open_document(bytes).context("failed to open PDF")?;

    let payload = InfoOutput { path: file.display().to_string(), page_count: opened.total_pages };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    engine.close_document(opened.handle)?;

    Ok(())
}

fn run_recognize(file: &Path, config: PipelineConfig, output: Option<&Path>) -> Result<()> {
    config.validate()?;
    let endpoint = config
        .endpoint
        .clone()
        .context("no recognition endpoint; pass --endpoint or set it in --config")?;

    let mut recognizer = HttpRecognizer::new(endpoint);
    if let Some(var) = &config.api_key_env {
        recognizer = recognizer.with_api_key_from_env(var);
    }

    let bytes = read_pdf(file)?;
    let progress: ProgressCallback = Arc::new(|p: Progress| {
        eprintln!("{} ({:.0}%)", p.message(), p.fraction() * 100.0)
    });
    let mut workspace =
        Workspace::new(default_engine(), recognizer, config).with_progress(progress);

    workspace.select_document(bytes).context("failed to open PDF")?;
    let outcome = workspace.process();

    match (workspace.document(), output) {
        (Some(document), Some(output)) => write_json(output, document)?,
        (Some(document), None) if outcome.is_ok() => {
            println!("{}", serde_json::to_string_pretty(document)?);
        }
        _ => {}
    }

    outcome?;
    eprintln!("Recognition complete");
    Ok(())
}

fn run_search(pages: &Path, query: &str, json: bool) -> Result<()> {
    let raw = fs::read(pages).with_context(|| format!("failed to read {}", pages.display()))?;
    let pages_file: PagesFile = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a recognized pages file", pages.display()))?;

    let result = scanlight_core::search(query, &pages_file.into_pages());

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !result.message.is_empty() {
        println!("{}", result.message);
    }

    Ok(())
}

fn run_highlight(
    file: &Path,
    query: &str,
    page: u32,
    config: &PipelineConfig,
    output: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let bytes = read_pdf(file)?;
    let mut engine = default_engine();
    let opened = engine.open_document(bytes).context("failed to open PDF")?;

    let layout = engine
        .page_layout(opened.handle, page, config.display_scale)
        .with_context(|| format!("failed to lay out page {page}"))?;
    let mut raster = engine
        .render_page(opened.handle, &layout)
        .with_context(|| format!("failed to render page {page}"))?;

    let (width_px, height_px) = (layout.viewport.width_px, layout.viewport.height_px);
    let mut layouts = LayoutCache::new();
    layouts.insert(layout);
    let rects = layouts.highlights_for(page, query)?;
    log::info!("page {page}: {} highlight rects for {:?}", rects.len(), query.trim());

    if let Some(output) = output {
        draw_highlights(&mut raster, &rects);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        raster
            .save(output)
            .with_context(|| format!("failed to write image to {}", output.display()))?;
    }

    let payload = HighlightOutput { page, query: query.trim(), width_px, height_px, rects };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    engine.close_document(opened.handle)?;

    Ok(())
}

/// Blend highlight fill into the raster, clipped to its bounds
fn draw_highlights(raster: &mut Raster, rects: &[HighlightRect]) {
    let (width, height) = raster.dimensions();

    for rect in rects {
        let x0 = rect.x.max(0.0).floor() as u32;
        let y0 = rect.y.max(0.0).floor() as u32;
        let x1 = ((rect.x + rect.width).ceil().max(0.0) as u32).min(width);
        let y1 = ((rect.y + rect.height).ceil().max(0.0) as u32).min(height);

        for y in y0..y1 {
            for x in x0..x1 {
                let Rgba([r, g, b, a]) = *raster.get_pixel(x, y);
                let blend = |base: u8, fill: u8| {
                    (base as f32 * (1.0 - HIGHLIGHT_ALPHA) + fill as f32 * HIGHLIGHT_ALPHA).round()
                        as u8
                };
                raster.put_pixel(
                    x,
                    y,
                    Rgba([
                        blend(r, HIGHLIGHT_FILL[0]),
                        blend(g, HIGHLIGHT_FILL[1]),
                        blend(b, HIGHLIGHT_FILL[2]),
                        a,
                    ]),
                );
            }
        }
    }
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    ensure_pdf_exists(path)?;
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_highlights_tints_only_inside_rect() {
        let mut raster = Raster::from_pixel(10, 10, Rgba([255, 255, 255, 255]));

        draw_highlights(&mut raster, &[HighlightRect { x: 2.0, y: 3.0, width: 4.0, height: 2.0 }]);

        assert_eq!(raster.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(raster.get_pixel(2, 3), &Rgba([255, 239, 153, 255]));
        assert_eq!(raster.get_pixel(5, 4), &Rgba([255, 239, 153, 255]));
        assert_eq!(raster.get_pixel(6, 4), &Rgba([255, 255, 255, 255]));
        assert_eq!(raster.get_pixel(2, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn draw_highlights_clips_to_raster() {
        let mut raster = Raster::from_pixel(4, 4, Rgba([0, 0, 0, 255]));

        draw_highlights(
            &mut raster,
            &[HighlightRect { x: -5.0, y: 2.0, width: 100.0, height: 100.0 }],
        );

        assert_eq!(raster.get_pixel(3, 3), &Rgba([102, 86, 0, 255]));
        assert_eq!(raster.get_pixel(0, 1), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn flags_override_config_file_values() {
        let config = PipelineConfig::new().with_endpoint("http://file").with_language("fra");

        let config = apply_overrides(config, Some("http://flag".into()), None, Some("KEY".into()));

        assert_eq!(config.endpoint.as_deref(), Some("http://flag"));
        assert_eq!(config.language.as_deref(), Some("fra"));
        assert_eq!(config.api_key_env.as_deref(), Some("KEY"));
    }

    #[test]
    fn pages_file_accepts_document_or_array() {
        let array = r#"[{"page_number":1,"text":"a"},{"page_number":2,"text":"b"}]"#;
        let pages: PagesFile = serde_json::from_str(array).unwrap();
        assert_eq!(pages.into_pages().len(), 2);

        let document = r#"{"total_pages":3,"pages":[{"page_number":1,"text":"a"}],
            "status":{"state":"incomplete","failed_page":2,"reason":"down"}}"#;
        let pages: PagesFile = serde_json::from_str(document).unwrap();
        assert_eq!(pages.into_pages(), vec![RecognizedPage::new(1, "a")]);
    }
}
