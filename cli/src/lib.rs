//! fontflow CLI: run the upload service, inspect fonts, convert them to WOFF2

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use serde::Serialize;

use fontflow_core::discovery::{FontDiscovery, PathDiscovery};
use fontflow_core::output::{write_json_pretty, write_ndjson};
use fontflow_core::{detect_and_validate, ensure_woff2, FontFormat, FontMetadata};

pub mod server;

use server::ServerConfig;

/// CLI entrypoint for fontflow.
#[derive(Debug, Parser)]
#[command(
    name = "fontflow",
    about = "Font upload service and WOFF2 conversion toolkit"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP upload service
    Serve(ServeArgs),
    /// Detect fonts under the given paths and print their metadata
    Inspect(InspectArgs),
    /// Write a WOFF2 rendition of a font file
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "FONTFLOW_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory holding stored objects and the record file
    #[arg(
        long = "data-dir",
        env = "FONTFLOW_DATA_DIR",
        default_value = "fontflow-data",
        value_hint = ValueHint::DirPath
    )]
    data_dir: PathBuf,

    /// Base URL that signed object links start with (defaults to http://<bind>)
    #[arg(long = "public-url", env = "FONTFLOW_PUBLIC_URL", value_hint = ValueHint::Url)]
    public_url: Option<String>,

    /// Secret used to sign object URLs
    #[arg(long = "signing-secret", env = "FONTFLOW_SIGNING_SECRET", hide_env_values = true)]
    signing_secret: String,

    /// Lifetime of signed URLs, in seconds
    #[arg(long = "url-ttl", env = "FONTFLOW_URL_TTL", default_value_t = 3600)]
    url_ttl: u64,

    /// Largest accepted upload body, in bytes
    #[arg(
        long = "max-upload-bytes",
        env = "FONTFLOW_MAX_UPLOAD_BYTES",
        default_value_t = server::DEFAULT_MAX_UPLOAD_BYTES
    )]
    max_upload_bytes: usize,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Files or directories to inspect
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    paths: Vec<PathBuf>,

    /// Follow symlinks while walking paths
    #[arg(long = "follow-symlinks", action = ArgAction::SetTrue)]
    follow_symlinks: bool,

    /// Emit a single JSON array
    #[arg(long = "json", action = ArgAction::SetTrue, conflicts_with = "ndjson")]
    json: bool,

    /// Emit newline-delimited JSON
    #[arg(long = "ndjson", action = ArgAction::SetTrue)]
    ndjson: bool,

    /// Control colorized output (auto|always|never)
    #[arg(long = "color", default_value_t = ColorChoice::Auto, value_enum)]
    color: ColorChoice,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// Font file to convert
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output path (defaults to the input with a .woff2 extension)
    #[arg(short = 'o', long = "output", value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// One inspected file, as printed by `fontflow inspect`.
#[derive(Debug, Clone, Serialize)]
struct InspectReport {
    path: PathBuf,
    format: FontFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<FontMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Parse CLI args and execute the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Inspect(args) => run_inspect(args),
        Command::Convert(args) => run_convert(args),
    }
}

fn init_logging() {
    // a second init (tests, embedding) is harmless
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let config = server_config(args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(server::serve(config))
}

fn server_config(args: ServeArgs) -> Result<ServerConfig> {
    if args.signing_secret.trim().is_empty() {
        bail!("--signing-secret must not be empty");
    }
    if args.url_ttl == 0 {
        bail!("--url-ttl must be at least 1 second");
    }
    let public_url = args
        .public_url
        .unwrap_or_else(|| format!("http://{}", args.bind));

    Ok(ServerConfig {
        bind: args.bind,
        data_dir: args.data_dir,
        public_url,
        signing_secret: args.signing_secret,
        url_ttl: Duration::from_secs(args.url_ttl),
        max_upload_bytes: args.max_upload_bytes,
    })
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let reports = inspect_paths(&args.paths, args.follow_symlinks)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let use_color = match args.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => handle.is_terminal(),
    };

    if args.ndjson {
        write_ndjson(&reports, &mut handle)?;
    } else if args.json {
        write_json_pretty(&reports, &mut handle)?;
    } else {
        write_plain(&reports, &mut handle, use_color)?;
    }

    Ok(())
}

fn inspect_paths(paths: &[PathBuf], follow_symlinks: bool) -> Result<Vec<InspectReport>> {
    let files = PathDiscovery::new(paths.iter().cloned())
        .follow_symlinks(follow_symlinks)
        .discover()?;

    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        let bytes =
            fs::read(&file.path).with_context(|| format!("reading {}", file.path.display()))?;
        let report = match detect_and_validate(&bytes) {
            Ok(info) => InspectReport {
                path: file.path,
                format: info.format,
                metadata: Some(info.metadata),
                error: None,
            },
            Err(err) => {
                log::warn!("{}: {err}", file.path.display());
                InspectReport {
                    path: file.path,
                    format: file.format,
                    metadata: None,
                    error: Some(err.to_string()),
                }
            }
        };
        reports.push(report);
    }
    Ok(reports)
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let output = match args.output {
        Some(path) => path,
        None => default_output(&args.input)?,
    };

    let bytes = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let info = detect_and_validate(&bytes)
        .with_context(|| format!("validating {}", args.input.display()))?;
    let woff2 = ensure_woff2(&bytes, info.format)
        .ok_or_else(|| anyhow!("could not produce WOFF2 from {}", args.input.display()))?;

    fs::write(&output, &woff2).with_context(|| format!("writing {}", output.display()))?;
    log::info!(
        "{} ({}, {} bytes) -> {} ({} bytes)",
        args.input.display(),
        info.format,
        bytes.len(),
        output.display(),
        woff2.len()
    );
    Ok(())
}

fn default_output(input: &Path) -> Result<PathBuf> {
    let output = input.with_extension("woff2");
    if output == input {
        return Err(anyhow!(
            "{} already has a .woff2 extension; pass --output",
            input.display()
        ));
    }
    Ok(output)
}

fn write_plain(reports: &[InspectReport], mut w: impl Write, color: bool) -> Result<()> {
    let path_width = reports
        .iter()
        .map(|r| r.path.display().to_string().len())
        .max()
        .unwrap_or(0)
        .clamp(0, 120);

    for report in reports {
        let path = format!("{:<path_width$}", report.path.display());
        let rendered_path = apply_color(&path, color, AnsiColor::Cyan);
        let format = apply_color(&format!("{:<5}", report.format), color, AnsiColor::Green);
        let details = match (&report.metadata, &report.error) {
            (Some(meta), _) => apply_color(
                &format!("{} {} ({})", meta.family, meta.style, meta.weight),
                color,
                AnsiColor::Yellow,
            ),
            (None, Some(err)) => apply_color(err, color, AnsiColor::Red),
            (None, None) => String::new(),
        };
        writeln!(w, "{rendered_path}  {format}  {details}")?;
    }

    Ok(())
}

#[derive(Copy, Clone)]
enum AnsiColor {
    Cyan,
    Yellow,
    Green,
    Red,
}

fn apply_color(text: &str, color: bool, code: AnsiColor) -> String {
    if !color {
        return text.to_string();
    }

    let code_str = match code {
        AnsiColor::Cyan => "36",
        AnsiColor::Yellow => "33",
        AnsiColor::Green => "32",
        AnsiColor::Red => "31",
    };

    format!("\u{1b}[{}m{}\u{1b}[0m", code_str, text)
}
