use super::{read_patches, write_output};
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct CompactArgs {
    /// Patch log (JSON array or one patch per line)
    pub patches: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn compact(args: CompactArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let patches = read_patches(&args.patches)?;
    let compacted = folio_model::compact(&patches);

    write_output(args.output.as_deref(), &config.to_json_string(&compacted)?)?;
    eprintln!("{} {} → {} patches", "✓".green(), patches.len(), compacted.len());
    Ok(())
}
