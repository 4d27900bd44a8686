use super::{read_value, write_output};
use crate::config::Config;
use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::validate_value;
use folio_model::{apply_all_json, KeyGenerator, Patch};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Value to check (JSON)
    pub value: PathBuf,

    /// Apply the fixes and print the healed value
    #[arg(long)]
    pub fix: bool,

    /// Where `--fix` writes the healed value (stdout by default)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn validate(args: ValidateArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let Some(value) = read_value(&args.value)? else {
        println!("{} no value", "✓".green());
        return Ok(());
    };

    let mut keys = KeyGenerator::new("folio-cli");
    keys.reserve_in(&value);
    let resolutions = validate_value(&value, &config.editor.schema(), &mut keys);
    if resolutions.is_empty() {
        eprintln!("{} {} is valid", "✓".green(), args.value.display());
        if args.fix {
            write_output(args.output.as_deref(), &config.to_json_string(&value)?)?;
        }
        return Ok(());
    }

    for resolution in &resolutions {
        eprintln!("  {} {} ({})", "•".yellow(), resolution.description, resolution.action);
    }

    if !args.fix {
        bail!("{} problem(s) found; rerun with --fix to heal", resolutions.len());
    }

    let patches: Vec<Patch> = resolutions.iter().flat_map(|r| r.patches.iter().cloned()).collect();
    let outcome = apply_all_json(Some(value), &patches);
    if !outcome.failures.is_empty() {
        bail!("{} fix patch(es) could not be applied", outcome.failures.len());
    }
    write_output(args.output.as_deref(), &config.to_json_string(&outcome.value)?)?;
    eprintln!("{} applied {} fix(es)", "✓".green(), resolutions.len());
    Ok(())
}
