//! API Refs CLI
//!
//! Command-line interface for dereferencing and bundling `$ref` documents.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use api_refs::{
    bundle, dereference, BundleOptions, DefaultFetcher, DereferenceOptions, PathKey, RefHooks,
};
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "api-refs")]
#[command(about = "Dereference and bundle $ref links in API documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log resolution progress to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every $ref with the content it points to
    Dereference {
        /// Source: file path or URL, optionally with a #/pointer
        source: String,

        #[command(flatten)]
        output: OutputArgs,

        /// Walk reused content again so every node is reported
        #[arg(long)]
        full_crawl: bool,

        /// Keep circular refs as back-references (printed as local $refs)
        #[arg(long)]
        circular: bool,
    },

    /// Produce one self-contained document with local $refs only
    Bundle {
        /// Source: file path or URL, optionally with a #/pointer
        source: String,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Output file (stdout if not specified)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Drop content next to $ref instead of merging it
    #[arg(long)]
    ignore_sibling: bool,

    /// Crawl sibling subtrees concurrently
    #[arg(long)]
    parallel: bool,

    /// Fail if any $ref could not be resolved
    #[arg(long)]
    strict: bool,

    /// Print unresolved refs as JSON on stderr
    #[arg(long)]
    report_json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

/// One `$ref` problem reported during a run.
#[derive(Debug, Serialize)]
struct Problem {
    path: String,
    message: String,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    unresolved: Vec<Problem>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Dereference {
            source,
            output,
            full_crawl,
            circular,
        } => run_dereference(&source, &output, full_crawl, circular),
        Commands::Bundle { source, output } => run_bundle(&source, &output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "api_refs=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Error hook that records every problem in a shared report.
fn collect_errors(report: &Arc<Mutex<Report>>) -> RefHooks {
    let sink = Arc::clone(report);
    RefHooks::new().on_error(move |message: &str, path: &[PathKey]| {
        let path = api_refs::path_to_pointer(path).to_fragment();
        sink.lock().unresolved.push(Problem {
            path,
            message: message.to_string(),
        });
    })
}

fn run_dereference(
    source: &str,
    args: &OutputArgs,
    full_crawl: bool,
    circular: bool,
) -> Result<(), u8> {
    let report = Arc::new(Mutex::new(Report::default()));
    let options = DereferenceOptions::new()
        .ignore_sibling(args.ignore_sibling)
        .parallel_crawl(args.parallel)
        .full_crawl(full_crawl)
        .enable_circular(circular)
        .hooks(collect_errors(&report));

    let fetcher = DefaultFetcher::new(".");
    let result = dereference(source, &fetcher, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_output(&result.to_value_lossy(), args)?;
    let report = report.lock();
    finish(&report, args)
}

fn run_bundle(source: &str, args: &OutputArgs) -> Result<(), u8> {
    let report = Arc::new(Mutex::new(Report::default()));
    let options = BundleOptions::new()
        .ignore_sibling(args.ignore_sibling)
        .parallel_crawl(args.parallel)
        .hooks(collect_errors(&report));

    let fetcher = DefaultFetcher::new(".");
    let result = bundle(source, &fetcher, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_output(&result, args)?;
    let report = report.lock();
    finish(&report, args)
}

fn write_output(value: &Value, args: &OutputArgs) -> Result<(), u8> {
    let rendered = match args.format {
        Format::Json if args.pretty => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        Format::Json => serde_json::to_string(value).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match &args.output {
        Some(path) => std::fs::write(path, &rendered).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        }),
        None => {
            println!("{}", rendered.trim_end());
            Ok(())
        }
    }
}

fn finish(report: &Report, args: &OutputArgs) -> Result<(), u8> {
    if args.report_json {
        match serde_json::to_string(report) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("Error serializing report: {}", e),
        }
    } else {
        for problem in &report.unresolved {
            eprintln!("warning: {} (at {})", problem.message, problem.path);
        }
    }

    if args.strict && !report.unresolved.is_empty() {
        eprintln!("Error: {} unresolved $ref(s)", report.unresolved.len());
        return Err(1);
    }
    Ok(())
}
