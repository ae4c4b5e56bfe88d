//! Command-line configuration for slide-deid.
//!
//! Two subcommands:
//! - `run`: de-identify one or more slides (files or directories of `.svs`)
//! - `inspect`: print the directory structure and vendor of a slide
//!
//! # Environment Variables
//!
//! - `SLIDE_DEID_REPLACEMENT` - Token written over the identifier (default: MDACC)
//! - `SLIDE_DEID_IN_PLACE` - Patch the given files instead of staged copies
//! - `RUST_LOG` - Overrides the log filter

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::batch::BatchOptions;
use crate::deid::{DeidOptions, DEFAULT_REPLACEMENT};
use crate::format::svs::FIELD_SEPARATOR;

// =============================================================================
// CLI Arguments
// =============================================================================

/// slide-deid - Remove patient identifiers from whole-slide images in place.
///
/// Redacts the identifying field of the SVS ImageDescription and unlinks the
/// label and macro images, without rewriting or resizing the file.
#[derive(Parser, Debug, Clone)]
#[command(name = "slide-deid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// De-identify slides
    Run(RunConfig),

    /// Show how a slide would be classified and what it contains
    Inspect(InspectConfig),
}

/// Output rendering for reports.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

// =============================================================================
// Run
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RunConfig {
    /// Slide files or directories containing .svs files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Token written in place of the identifier.
    ///
    /// Must be ASCII, non-empty and free of '|'. It may not be longer than
    /// the identifier it replaces.
    #[arg(long, default_value = DEFAULT_REPLACEMENT, env = "SLIDE_DEID_REPLACEMENT")]
    pub replacement: String,

    /// Patch the given files directly.
    ///
    /// Without this flag each slide is first copied to
    /// `<dir>/DeidentifiedImages/<timestamp>.svs` and the copy is patched.
    #[arg(long, default_value_t = false, env = "SLIDE_DEID_IN_PLACE")]
    pub in_place: bool,

    /// Plan and report without writing anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Skip the post-apply re-parse and check.
    #[arg(long, default_value_t = false)]
    pub no_verify: bool,

    /// Hash the pyramid payload before and after and require a match.
    #[arg(long, default_value_t = false)]
    pub digest: bool,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RunConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.replacement.is_empty() {
            return Err("Replacement token must not be empty".to_string());
        }

        if !self.replacement.is_ascii() {
            return Err("Replacement token must be ASCII".to_string());
        }

        if self.replacement.as_bytes().contains(&FIELD_SEPARATOR) {
            return Err("Replacement token must not contain '|'".to_string());
        }

        if self.replacement.as_bytes().contains(&0) {
            return Err("Replacement token must not contain NUL".to_string());
        }

        Ok(())
    }

    /// Per-slide options derived from the flags.
    pub fn deid_options(&self) -> DeidOptions {
        DeidOptions::default()
            .with_replacement(self.replacement.clone())
            .with_dry_run(self.dry_run)
            .with_verify(!self.no_verify)
            .with_digest(self.digest)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            deid: self.deid_options(),
            in_place: self.in_place,
        }
    }
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Slide file to inspect.
    pub path: PathBuf,

    /// Also compute the pyramid payload digest.
    #[arg(long, default_value_t = false)]
    pub digest: bool,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
