//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Each subcommand corresponds to a distinct operation: ordering a contract's
//! symbols, locating declarations, migrating one symbol, or migrating a whole
//! contract in order.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Contract used by `order` when none is given.
pub const DEFAULT_CONTRACT: &str = "~/Projects/scaffold/src/main/resources/contract.yaml";

/// Relocate Java symbols between packages and plan the migration order.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Print debug logs (same as RUST_LOG=debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command that walks a source tree.
#[derive(Debug, Clone, ClapArgs)]
pub struct ScanArgs {
    /// Repository root to search and rewrite.
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Glob patterns for directories/files to exclude (e.g., "target", "*Test.java").
    /// By default, entries starting with `.` are excluded.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Disable default exclusion of `.` prefixed entries.
    #[arg(long)]
    pub no_default_excludes: bool,
}

/// Flags controlling how files are rewritten.
#[derive(Debug, Clone, ClapArgs)]
pub struct RewriteArgs {
    /// File holding the dependency fragment to ensure in edited modules' pom.xml.
    /// Without it, descriptors are left alone.
    #[arg(long)]
    pub dependency_file: Option<PathBuf>,

    /// Tag after which the dependency fragment is inserted.
    #[arg(long, default_value = "<dependencies>")]
    pub anchor: String,

    /// Substitution backend for rewriting.
    #[arg(long, value_enum, default_value_t = Editor::Native)]
    pub editor: Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Editor {
    /// In-process regex substitution.
    Native,
    /// GNU sed (`sed` on Linux, `gsed` on macOS).
    Sed,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print a contract's schemas in migration order, dependencies first.
    Order {
        /// Contract YAML file. Defaults to ~/Projects/scaffold/src/main/resources/contract.yaml.
        contract: Option<PathBuf>,

        /// Emit JSON (order plus broken cycle edges) instead of a comma-separated line.
        #[arg(long)]
        json: bool,
    },

    /// Locate the declaration file and package of each symbol.
    Locate {
        /// Symbols to locate.
        #[arg(required = true)]
        symbols: Vec<String>,

        #[command(flatten)]
        scan: ScanArgs,

        /// Preferred directories, most preferred first, used when a symbol has
        /// several declaration files. The root is always appended last.
        #[arg(short, long)]
        prefer: Vec<PathBuf>,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Migrate one symbol to a new package.
    Migrate {
        /// Simple name of the symbol, e.g. `Lorem`.
        symbol: String,

        /// Declaration file, relative to the root.
        #[arg(long)]
        path: PathBuf,

        /// Current package, e.g. `com.example.main`.
        #[arg(long)]
        from: String,

        /// Destination package.
        #[arg(long)]
        to: String,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },

    /// Migrate every locally declared schema of a contract, in dependency order.
    Batch {
        /// Contract YAML file.
        contract: PathBuf,

        /// Destination package for every symbol.
        #[arg(long)]
        to: String,

        /// Preferred directories for ambiguous declarations, most preferred first.
        #[arg(short, long)]
        prefer: Vec<PathBuf>,

        /// Confirm each symbol before migrating it.
        #[arg(short, long)]
        interactive: bool,

        /// Only print what would be migrated.
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        rewrite: RewriteArgs,
    },
}
