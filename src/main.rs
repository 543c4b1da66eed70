//! relocate: move Java symbols between packages without breaking the build.
//!
//! Orders a contract's schemas so dependencies migrate first, locates each
//! symbol's declaration, and rewrites every usage before deleting the old file.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Commands, Editor, RewriteArgs, ScanArgs};
use colored::Colorize;
use dialoguer::Confirm;
use relocate::descriptor::DescriptorUpdate;
use relocate::migration::{self, MigrationOutcome, MigrationRequest};
use relocate::scanner::ScanOptions;
use relocate::tools::{NativeTools, SedTools, TextTools};
use relocate::{contract, locator};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    match args.command {
        Commands::Order { contract, json } => cmd_order(contract, json),
        Commands::Locate {
            symbols,
            scan,
            prefer,
            json,
        } => cmd_locate(&symbols, &scan, prefer, json),
        Commands::Migrate {
            symbol,
            path,
            from,
            to,
            scan,
            rewrite,
        } => cmd_migrate(MigrationRequest::new(symbol, path, from, to), &scan, &rewrite),
        Commands::Batch {
            contract,
            to,
            prefer,
            interactive,
            dry_run,
            scan,
            rewrite,
        } => cmd_batch(&contract, &to, prefer, interactive, dry_run, &scan, &rewrite),
    }
}

fn cmd_order(contract: Option<PathBuf>, json_output: bool) -> Result<()> {
    let contract = match contract {
        Some(path) => path,
        None => {
            log::warn!("No contract given. Using {}.", cli::DEFAULT_CONTRACT);
            PathBuf::from(shellexpand::tilde(cli::DEFAULT_CONTRACT).as_ref())
        }
    };

    let plan = contract::sort_symbols(&contract)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", plan.order.join(","));
    }
    Ok(())
}

fn cmd_locate(
    symbols: &[String],
    scan: &ScanArgs,
    prefer: Vec<PathBuf>,
    json_output: bool,
) -> Result<()> {
    let options = scan_options(scan)?;
    let preferences = preferences(&scan.root, prefer);
    let table = locator::make_table(symbols, &scan.root, &preferences, &options)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    if table.is_empty() {
        println!("{} No symbols located", "info:".blue().bold());
        return Ok(());
    }
    for row in &table {
        println!(
            "  {} {} {}",
            row.symbol.bold(),
            row.package.green(),
            row.path.display().to_string().dimmed()
        );
    }
    let missing = symbols.len() - table.len();
    if missing > 0 {
        println!(
            "\n{} {} symbol(s) not located; see warnings above",
            "hint:".cyan().bold(),
            missing
        );
    }
    Ok(())
}

fn cmd_migrate(request: MigrationRequest, scan: &ScanArgs, rewrite: &RewriteArgs) -> Result<()> {
    let tools = text_tools(scan, rewrite)?;
    let descriptor = descriptor_update(rewrite)?;

    let outcome = migration::migrate(&request, &scan.root, descriptor.as_ref(), tools.as_ref())?;
    print_outcome(&request, &outcome);
    Ok(())
}

fn cmd_batch(
    contract_path: &Path,
    new_package: &str,
    prefer: Vec<PathBuf>,
    interactive: bool,
    dry_run: bool,
    scan: &ScanArgs,
    rewrite: &RewriteArgs,
) -> Result<()> {
    let plan = contract::sort_symbols(contract_path)?;
    for edge in &plan.broken {
        println!(
            "{} ignored `{}` -> `{}` to break a cycle",
            "warn:".yellow().bold(),
            edge.dependent,
            edge.dependency
        );
    }

    let options = scan_options(scan)?;
    let preferences = preferences(&scan.root, prefer);
    let table = locator::make_table(plan.order.as_slice(), &scan.root, &preferences, &options)?;

    if dry_run {
        for row in plan.order.iter().filter_map(|n| table.iter().find(|r| &r.symbol == n)) {
            println!(
                "{} {}.{} -> {}.{}",
                "Would migrate:".yellow().bold(),
                row.package.red(),
                row.symbol,
                new_package.green(),
                row.symbol
            );
        }
        println!("\n{} Drop --dry-run to apply changes", "hint:".cyan().bold());
        return Ok(());
    }

    let tools = text_tools(scan, rewrite)?;
    let descriptor = descriptor_update(rewrite)?;

    let report = migration::migrate_batch(
        &plan,
        &table,
        new_package,
        &scan.root,
        descriptor.as_ref(),
        tools.as_ref(),
        |request| {
            if !interactive {
                return Ok(true);
            }
            Confirm::new()
                .with_prompt(format!("Migrate {} to {}?", request.old_fqn(), request.new_fqn()))
                .default(true)
                .interact()
                .context("Failed to read confirmation")
        },
    )?;

    println!(
        "\n{} {} migrated, {} already done, {} not declared locally, {} declined, {} failed",
        "Summary:".bold(),
        report.migrated.len(),
        report.skipped.len(),
        report.not_local.len(),
        report.declined.len(),
        report.failed.len()
    );
    for (name, error) in &report.failed {
        println!("  {} {} {}", "failed:".red().bold(), name, error.dimmed());
    }
    Ok(())
}

fn scan_options(scan: &ScanArgs) -> Result<ScanOptions> {
    ScanOptions::new(&scan.exclude, scan.no_default_excludes)
}

/// Resolves preferred directories against the root and appends the root itself
/// as the catch-all last choice.
fn preferences(root: &Path, prefer: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut preferences: Vec<PathBuf> = prefer
        .into_iter()
        .map(|p| if p.is_absolute() { p } else { root.join(p) })
        .collect();
    preferences.push(root.to_path_buf());
    preferences
}

fn text_tools(scan: &ScanArgs, rewrite: &RewriteArgs) -> Result<Box<dyn TextTools>> {
    let options = scan_options(scan)?;
    let tools: Box<dyn TextTools> = match rewrite.editor {
        Editor::Native => Box::new(NativeTools::new(options)),
        Editor::Sed => {
            let sed = SedTools::detect(options)?;
            log::debug!("Using `{}` for substitutions.", sed.executable());
            Box::new(sed)
        }
    };
    Ok(tools)
}

fn descriptor_update(rewrite: &RewriteArgs) -> Result<Option<DescriptorUpdate>> {
    let Some(path) = &rewrite.dependency_file else {
        return Ok(None);
    };
    let fragment = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dependency file {}", path.display()))?;
    Ok(Some(DescriptorUpdate::new(fragment.trim_end()).with_anchor(&rewrite.anchor)))
}

fn print_outcome(request: &MigrationRequest, outcome: &MigrationOutcome) {
    match outcome {
        MigrationOutcome::Skipped => println!(
            "{} `{}` is already migrated",
            "info:".blue().bold(),
            request.symbol
        ),
        MigrationOutcome::Migrated {
            direct,
            cascade,
            descriptors_updated,
        } => {
            println!(
                "{} {} -> {}",
                "Migrated:".green().bold(),
                request.old_fqn().red(),
                request.new_fqn().green()
            );
            println!(
                "  direct: {} substitutions in {} files",
                direct.substitutions, direct.files_modified
            );
            println!(
                "  scoped: {} substitutions in {} files, {} imports added",
                cascade.substitutions, cascade.files_modified, cascade.imports_added
            );
            for descriptor in descriptors_updated {
                println!("  {} {}", "updated:".yellow().bold(), descriptor.display());
            }
        }
    }
}
