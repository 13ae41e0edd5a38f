//! Validate command - Statically validate Terraform files in a directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};
use walkdir::WalkDir;

use infragen_core::ConfigFile;
use infragen_validator::{FileValidator, StaticAnalyzer};

use super::CliError;

#[derive(Args)]
pub struct ValidateArgs {
    /// Directory holding the .tf files
    dir: PathBuf,

    /// Where to write static_validator/analysis_results.txt (defaults to DIR)
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

pub async fn execute(args: ValidateArgs) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(CliError::InvalidArgument(format!("not a directory: {}", args.dir.display())).into());
    }
    info!("Validating Terraform in {}", args.dir.display());

    let files = collect_files(&args.dir)?;
    if files.is_empty() {
        println!("⚠️  No .tf files found in {}", args.dir.display());
        return Ok(());
    }

    let report_dir = args.report_dir.as_deref().unwrap_or(&args.dir);
    std::fs::create_dir_all(report_dir)?;
    let analyzer = StaticAnalyzer::default();
    let result = match analyzer.analyze(&files, report_dir) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("⚠️  {e}");
            e.into_partial_result()
        }
    };

    println!("🔍 Checked {} file(s)", files.len());
    for diagnostic in result.errors() {
        println!("   ❌ {diagnostic}");
    }
    for diagnostic in result.advisories() {
        println!("   ⚠️  {diagnostic}");
    }

    if result.passed {
        println!("✅ Static validation passed");
        Ok(())
    } else {
        Err(CliError::ValidationFailed {
            errors: result.errors().count(),
        }
        .into())
    }
}

/// Collect `*.tf` files under `dir`, named by their path relative to it.
fn collect_files(dir: &Path) -> Result<Vec<ConfigFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "tf") {
            continue;
        }
        let name = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        debug!(file = %name, "Collected");
        files.push(ConfigFile::new("local", name, content));
    }
    Ok(files)
}
