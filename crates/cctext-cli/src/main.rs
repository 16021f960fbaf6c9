use anyhow::{Context, Result};
use cctext_core::Extractor;
use cctext_local::diagnose::run_diagnostics;
use cctext_local::report::JsonLines;
use cctext_local::{
    archive_name, open_archive, BlockExtractor, CharsetResolver, Html2TextExtractor,
    PipelineConfig, ResponsePipeline, RunOutputs, StatsFile, DEFAULT_BUFFER_SIZE,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cctext")]
#[command(about = "Extract plain text from HTML responses in WARC archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract visible text from every HTML/XHTML response (one block per line).
    Extract(ExtractCmd),
    /// Compare charset strategies for every HTML/XHTML response (csv).
    Diagnose(DiagnoseCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// WARC file, plain or gzip. `-` reads stdin.
    #[arg(long, env = "CCTEXT_INPUT", default_value = "-")]
    input: PathBuf,
    /// Archive name recorded in fault entries (default: the input's file name).
    #[arg(long, env = "CCTEXT_ARCHIVE_NAME")]
    archive_name: Option<String>,
    #[arg(long, env = "CCTEXT_BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    /// Visible prose blocks.
    Blocks,
    /// Rendered text via html2text.
    Html2text,
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, env = "CCTEXT_ENGINE", value_enum, default_value = "blocks")]
    engine: Engine,
    /// Render width for the html2text engine.
    #[arg(long, env = "CCTEXT_WIDTH", default_value_t = 100)]
    width: usize,
    /// Extracted text (default: stdout).
    #[arg(long, env = "CCTEXT_OUT")]
    out: Option<PathBuf>,
    /// Stats JSON, rewritten periodically and at the end of the run.
    #[arg(long, env = "CCTEXT_STATS_OUT")]
    stats_out: Option<PathBuf>,
    /// Per-record faults (jsonl).
    #[arg(long, env = "CCTEXT_ERRORS_OUT")]
    errors_out: Option<PathBuf>,
    /// Per-URL charset and declared languages (jsonl).
    #[arg(long, env = "CCTEXT_URL_INFO_OUT")]
    url_info_out: Option<PathBuf>,
    /// Seconds between stats rewrites; 0 writes only at the end.
    #[arg(long, env = "CCTEXT_STATS_FLUSH_SECS", default_value_t = 60)]
    stats_flush_secs: u64,
}

#[derive(clap::Args, Debug)]
struct DiagnoseCmd {
    #[command(flatten)]
    input: InputArgs,
    /// CSV output (default: stdout).
    #[arg(long, env = "CCTEXT_OUT")]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json (default) or text.
    #[arg(long, default_value = "json")]
    output: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CCTEXT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create(path: &Path) -> Result<Box<dyn Write>> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) => create(p),
        None => Ok(Box::new(BufWriter::new(std::io::stdout().lock()))),
    }
}

fn jsonl(sink: &mut Option<Box<dyn Write>>) -> JsonLines<&mut dyn Write> {
    match sink.as_mut() {
        Some(w) => JsonLines::new(w.as_mut()),
        None => JsonLines::discard(),
    }
}

fn extract(args: ExtractCmd) -> Result<()> {
    let resolver = CharsetResolver::standard()?;
    let extractor: Box<dyn Extractor> = match args.engine {
        Engine::Blocks => Box::new(BlockExtractor),
        Engine::Html2text => Box::new(Html2TextExtractor { width: args.width }),
    };
    let config = PipelineConfig {
        archive_name: args
            .input
            .archive_name
            .clone()
            .unwrap_or_else(|| archive_name(&args.input.input)),
        stats_flush_every: (args.stats_flush_secs > 0)
            .then(|| Duration::from_secs(args.stats_flush_secs)),
    };
    let reader = open_archive(&args.input.input, args.input.buffer_size)?;

    let mut text = output(args.out.as_deref())?;
    let mut faults = args.errors_out.as_deref().map(create).transpose()?;
    let mut url_info = args.url_info_out.as_deref().map(create).transpose()?;
    let mut outputs = RunOutputs {
        text: text.as_mut(),
        faults: jsonl(&mut faults),
        url_info: jsonl(&mut url_info),
        stats_file: args
            .stats_out
            .as_ref()
            .map(|p| StatsFile::new(p, config.stats_flush_every)),
    };

    let mut pipeline = ResponsePipeline::new(&resolver, extractor.as_ref(), config);
    let summary = pipeline
        .run(reader, &mut outputs)
        .context("archive could not be read to the end")?;
    tracing::info!(
        failed = summary.failed,
        extracted = summary.extracted,
        "extract finished"
    );
    Ok(())
}

fn diagnose(args: DiagnoseCmd) -> Result<()> {
    let resolver = CharsetResolver::standard()?;
    let reader = open_archive(&args.input.input, args.input.buffer_size)?;
    let mut out = output(args.out.as_deref())?;
    let summary = run_diagnostics(&resolver, reader, out.as_mut())
        .context("archive could not be read to the end")?;
    tracing::info!(rows = summary.rows, failed = summary.failed, "diagnose finished");
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract(args) => extract(args)?,
        Commands::Diagnose(args) => diagnose(args)?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "cctext",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("cctext {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
