use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};
use tryon_contracts::{GarmentCategory, HistoryRecord, HistoryStore};
use tryon_engine::config::resolve_api_base;
use tryon_engine::{
    classify_result_image, EncodedImage, ImageNormalizer, ImageSlot, ImageSource,
    ProgressUpdate, RemoteImageFetcher, TryOnConfig, TryOnEngine, TryOnError,
};

#[derive(Debug, Parser)]
#[command(name = "tryon", version, about = "Virtual try-on client")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Backend base URL. Overrides API_BASE_URL and --origin.
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Origin the front end is served from; picks the backend.
    #[arg(long, global = true)]
    origin: Option<String>,
    #[arg(long, global = true)]
    max_image_size: Option<u32>,
    /// Fraction in (0, 1].
    #[arg(long, global = true)]
    jpeg_quality: Option<f32>,
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[arg(long, global = true, default_value = ".tryon")]
    data_dir: PathBuf,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(long, global = true)]
    history: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a person and a garment image and save the composite.
    Run(RunArgs),
    /// Bound and re-encode one image the way uploads are prepared.
    Normalize(NormalizeArgs),
    /// Pull a remote image through the backend's image proxy.
    Fetch(FetchArgs),
    /// List saved try-ons, newest first.
    History(HistoryArgs),
    /// List garment categories.
    Categories,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long, required_unless_present = "person_url", conflicts_with = "person_url")]
    person: Option<PathBuf>,
    #[arg(long)]
    person_url: Option<String>,
    #[arg(long, required_unless_present = "garment_url", conflicts_with = "garment_url")]
    garment: Option<PathBuf>,
    #[arg(long)]
    garment_url: Option<String>,
    #[arg(long, default_value_t = GarmentCategory::Auto)]
    category: GarmentCategory,
    /// Where to write the result image.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Save without appending to the history file.
    #[arg(long)]
    no_history: bool,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct FetchArgs {
    #[arg(long)]
    url: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing();
    let config = resolve_config(&cli.global);
    match cli.command {
        Command::Run(args) => run_try_on(&cli.global, config, args),
        Command::Normalize(args) => run_normalize(&config, args),
        Command::Fetch(args) => run_fetch(&config, args),
        Command::History(args) => run_history(&config, args),
        Command::Categories => {
            for category in GarmentCategory::ALL {
                println!("{:<10} {}", category.as_str(), category.hint());
            }
            Ok(0)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}

/// Environment first, then flags.
fn resolve_config(global: &GlobalArgs) -> TryOnConfig {
    let mut config = TryOnConfig::from_env();
    apply_overrides(&mut config, global);
    config
}

fn apply_overrides(config: &mut TryOnConfig, global: &GlobalArgs) {
    if let Some(base) = global
        .api_base
        .as_deref()
        .map(|value| value.trim().trim_end_matches('/'))
        .filter(|value| !value.is_empty())
    {
        config.api_base_url = base.to_string();
    } else if let Some(origin) = global.origin.as_deref() {
        config.api_base_url = resolve_api_base(origin);
    }
    if let Some(size) = global.max_image_size {
        config.set_max_image_size(size);
    }
    if let Some(quality) = global.jpeg_quality {
        config.set_jpeg_quality(quality);
    }
    if let Some(timeout_ms) = global.timeout_ms {
        config.set_request_timeout_ms(timeout_ms);
    }
    config.history_path = global
        .history
        .clone()
        .or_else(|| config.history_path.take())
        .or_else(|| Some(global.data_dir.join("history.json")));
}

fn run_try_on(global: &GlobalArgs, mut config: TryOnConfig, args: RunArgs) -> Result<i32> {
    if args.no_history {
        config.history_path = None;
    }
    let events_path = global
        .events
        .clone()
        .unwrap_or_else(|| global.data_dir.join("events.jsonl"));
    let mut engine = TryOnEngine::new(
        config,
        &events_path,
        Arc::new(|update: ProgressUpdate| eprintln!("{}", progress_line(update))),
    )?;

    for (slot, path, url) in [
        (ImageSlot::Person, args.person.as_deref(), args.person_url.as_deref()),
        (ImageSlot::Garment, args.garment.as_deref(), args.garment_url.as_deref()),
    ] {
        match select_input(&mut engine, slot, path, url) {
            Ok(image) => println!(
                "{slot}: {}x{} ({} bytes)",
                image.width(),
                image.height(),
                image.len()
            ),
            Err(err) => return Ok(notify(&err)),
        }
    }
    engine.set_category(args.category);
    println!("category: {} ({})", args.category, args.category.hint());

    let result = match engine.try_on() {
        Ok(result) => result,
        Err(err) => return Ok(notify(&err)),
    };
    println!("result: {result}");

    match args.out {
        Some(out) => {
            let saved = engine.save_result(&out)?;
            println!("saved: {} ({} bytes)", saved.path.display(), saved.bytes);
            if let Some(history) = engine.history() {
                println!(
                    "history: {} ({} entries)",
                    history.path().display(),
                    history.len()
                );
            }
        }
        None if result.is_remote() => println!("{}", result.as_str()),
        None => println!("pass --out <path> to save the inline result"),
    }
    println!("events: {}", engine.events_path().display());
    Ok(0)
}

fn select_input(
    engine: &mut TryOnEngine,
    slot: ImageSlot,
    path: Option<&Path>,
    url: Option<&str>,
) -> std::result::Result<EncodedImage, TryOnError> {
    match (path, url) {
        (Some(path), _) => engine.select_image(slot, ImageSource::File(path)),
        (None, Some(url)) => engine.select_image_url(slot, url),
        (None, None) => Err(TryOnError::MissingInput(slot)),
    }
}

fn run_normalize(config: &TryOnConfig, args: NormalizeArgs) -> Result<i32> {
    let normalizer = ImageNormalizer::new(config.max_image_size, config.jpeg_quality)?;
    match normalizer.normalize(ImageSource::File(&args.input)) {
        Ok(image) => write_image(&args.out, &image).map(|()| 0),
        Err(err) => Ok(notify(&err)),
    }
}

fn run_fetch(config: &TryOnConfig, args: FetchArgs) -> Result<i32> {
    let normalizer = ImageNormalizer::new(config.max_image_size, config.jpeg_quality)?;
    let fetcher = RemoteImageFetcher::new(config.fetch_image_endpoint());
    let fetched = fetcher
        .fetch_remote_image(&args.url)
        .and_then(|raw| normalizer.normalize(ImageSource::Bytes(&raw)));
    match fetched {
        Ok(image) => write_image(&args.out, &image).map(|()| 0),
        Err(err) => Ok(notify(&err)),
    }
}

fn run_history(config: &TryOnConfig, args: HistoryArgs) -> Result<i32> {
    let Some(path) = config.history_path.as_deref() else {
        return Ok(0);
    };
    let history = HistoryStore::load(path);
    if history.is_empty() {
        println!("no saved try-ons in {}", path.display());
        return Ok(0);
    }
    for record in history.records().iter().take(args.limit) {
        println!("{}", history_line(record));
    }
    Ok(0)
}

fn write_image(out: &Path, image: &EncodedImage) -> Result<()> {
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(out, image.bytes()).with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "{}: {}x{} {} ({} bytes, sha256 {})",
        out.display(),
        image.width(),
        image.height(),
        image.mime_type(),
        image.len(),
        image.fingerprint()
    );
    Ok(())
}

/// Prints the user-facing text for `err` and returns the exit code.
fn notify(err: &TryOnError) -> i32 {
    tracing::debug!(kind = err.kind(), error = %err, "request failed");
    if err.is_user_facing() {
        eprintln!("{}", err.user_message());
    }
    1
}

fn progress_line(update: ProgressUpdate) -> String {
    format!("[{:>3}%] {}", update.percent, update.label)
}

fn history_line(record: &HistoryRecord) -> String {
    let when = chrono::DateTime::from_timestamp_millis(record.timestamp)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| record.timestamp.to_string());
    let result = classify_result_image(Some(&record.result_image))
        .map(|result| result.to_string())
        .unwrap_or_else(|_| "(no result)".to_string());
    format!("{}  {when}  {:<9}  {result}", record.id, record.category)
}
