//! Sable semantic analyzer CLI
//!
//! Consumes a serialized syntax tree (the parsing collaborator's JSON
//! output), runs the analysis pipeline and reports diagnostics either
//! human-readable or as JSON for tooling.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use sable_lang::ast::Program;
use sable_lang::utils::Severity;

/// Sable semantic analyzer
#[derive(Parser, Debug)]
#[command(name = "sablec")]
#[command(version = "0.1.0")]
#[command(about = "Sable semantic analyzer - checks a parsed compilation unit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a serialized syntax tree and report diagnostics
    Check {
        /// Serialized Program (JSON), as produced by the parser
        input: PathBuf,

        /// Emit the diagnostics list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print version information
    Version,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { input, json } => check_file(&input, json),
        Commands::Version => {
            println!("sablec 0.1.0");
            println!("Sable semantic analyzer");
            println!("License: Apache-2.0");
            Ok(())
        }
    }
}

fn check_file(input: &Path, json: bool) -> Result<()> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let program: Program =
        serde_json::from_str(&source).context("input is not a serialized Sable tree")?;

    let analysis = sable_lang::analyze(&program)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis.diagnostics)?);
    } else {
        for diag in &analysis.diagnostics {
            let severity = match diag.severity() {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            let span = diag.span();
            eprintln!(
                "{}[{}]: {} ({}:{}..{})",
                severity,
                diag.code(),
                diag,
                span.file_id,
                span.start,
                span.end
            );
        }
        eprintln!("{} diagnostic(s)", analysis.diagnostics.len());
    }

    if analysis.has_errors() {
        process::exit(1);
    }
    Ok(())
}
