//! slide-deid - Remove patient identifiers from whole-slide images.
//!
//! This binary parses the command line, expands directories into slide lists
//! and prints per-file reports.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slide_deid::{
    batch::{collect_slides, run_batch, BatchReport},
    config::{Cli, Command, InspectConfig, OutputFormat, RunConfig},
    deid::{inspect_path, SlideSummary},
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Run(config) => run(config),
        Command::Inspect(config) => inspect(config),
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so that reports on stdout stay machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "slide_deid=debug"
    } else {
        "slide_deid=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Run Command
// =============================================================================

fn run(config: RunConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut slides = Vec::new();
    for path in &config.paths {
        match collect_slides(path) {
            Ok(found) if found.is_empty() => {
                info!("No .svs files found in {}", path.display());
            }
            Ok(found) => slides.extend(found),
            Err(e) => {
                error!("Cannot read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    if slides.is_empty() {
        error!("Nothing to do");
        return ExitCode::FAILURE;
    }

    info!(
        "Processing {} slide(s){}{}",
        slides.len(),
        if config.in_place { ", in place" } else { "" },
        if config.dry_run { ", dry run" } else { "" }
    );

    let report = run_batch(&slides, &config.batch_options());

    match config.format {
        OutputFormat::Text => print_batch_text(&report),
        OutputFormat::Json => {
            if let Err(code) = print_json(&report) {
                return code;
            }
        }
    }

    if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_batch_text(report: &BatchReport) {
    for file in &report.files {
        match (&file.report, &file.error) {
            (Some(deid), _) => {
                let output = file
                    .output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("✓ {} -> {}", file.source.display(), output);
                println!("    vendor:    {}", deid.vendor);
                println!("    redacted:  {:?}", deid.redacted_directories);
                println!("    unlinked:  {:?}", deid.removed_directories);
                match deid.applied {
                    Some(summary) => println!(
                        "    written:   {} bytes in {} patch(es), {} already in place",
                        summary.bytes_written, summary.patches_written, summary.patches_unchanged
                    ),
                    None => println!(
                        "    planned:   {} bytes in {} patch(es) (dry run)",
                        deid.planned_bytes, deid.planned_patches
                    ),
                }
                if let Some(digest) = &deid.digest_after {
                    println!("    pyramid:   {}", digest);
                }
            }
            (None, Some(err)) => println!("✗ {}: {}", file.source.display(), err),
            (None, None) => println!("? {}", file.source.display()),
        }
    }
    println!();
    println!("{} succeeded, {} failed", report.succeeded, report.failed);
}

// =============================================================================
// Inspect Command
// =============================================================================

fn inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.verbose);

    let (summary, digest) = match inspect_path(&config.path, config.digest) {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to inspect {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match config.format {
        OutputFormat::Text => print_summary_text(&summary, digest.as_deref()),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "summary": summary,
                "pyramid_digest": digest,
            });
            if let Err(code) = print_json(&json) {
                return code;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_summary_text(summary: &SlideSummary, digest: Option<&str>) {
    println!("{}", summary.file);
    println!(
        "  {} bytes, {}, {:?}",
        summary.size,
        if summary.bigtiff { "BigTIFF" } else { "TIFF" },
        summary.byte_order
    );
    println!("  vendor: {}", summary.vendor);
    if let Some(meta) = &summary.metadata {
        if let Some(mag) = meta.magnification {
            println!("  magnification: {}x", mag);
        }
        if let Some(mpp) = meta.mpp {
            println!("  mpp: {}", mpp);
        }
    }
    println!();
    for dir in &summary.directories {
        println!(
            "  [{}] @{} {:?}{} {}x{} payload {} bytes in {} range(s)",
            dir.index,
            dir.offset,
            dir.kind,
            if dir.tiled { " tiled" } else { "" },
            dir.width.unwrap_or(0),
            dir.height.unwrap_or(0),
            dir.payload_bytes,
            dir.payload_ranges
        );
        if let Some(description) = &dir.description {
            println!("      {}", description);
        }
    }
    if let Some(digest) = digest {
        println!();
        println!("  pyramid digest: {}", digest);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ExitCode> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}
