use super::{read_patches, read_value, write_output};
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use folio_model::{apply_all_json, document_from_json};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Starting value (JSON; empty file or `null` for none)
    pub value: PathBuf,

    /// Patch log (JSON array or one patch per line)
    pub patches: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also check the result against the document schema
    #[arg(long)]
    pub strict: bool,
}

pub fn apply(args: ApplyArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let value = read_value(&args.value)?;
    let patches = read_patches(&args.patches)?;
    debug!(patches = patches.len(), "replaying patch log");

    let outcome = apply_all_json(value, &patches);

    for failure in &outcome.failures {
        eprintln!(
            "  {} patch #{} ({} {}): {}",
            "✗".red(),
            failure.index,
            failure.patch.name(),
            failure.patch.path(),
            failure.error
        );
    }

    if args.strict {
        if let Some(value) = &outcome.value {
            document_from_json(value.clone(), &config.editor.schema())?;
        }
    }

    write_output(args.output.as_deref(), &config.to_json_string(&outcome.value)?)?;

    let applied = patches.len() - outcome.failures.len();
    eprintln!(
        "{} {} of {} patches applied",
        if outcome.failures.is_empty() { "✓".green() } else { "⚠️".yellow() },
        applied,
        patches.len()
    );
    Ok(())
}
