//! relocate library for moving Java symbols between packages.
//!
//! This library provides programmatic access to the relocation workflow. The
//! core workflow involves three phases:
//!
//! 1. **Planning**: Build a dependency graph from a contract and order it so
//!    referenced symbols migrate before the symbols referencing them
//! 2. **Locating**: Find each symbol's declaration file and package
//! 3. **Rewriting**: Replace every usage with the new qualified name, then
//!    delete the old declaration
//!
//! # Example
//!
//! ```no_run
//! use relocate::{contract, locator, migration, scanner::ScanOptions, tools::NativeTools};
//! use std::path::{Path, PathBuf};
//!
//! let plan = contract::sort_symbols(Path::new("contract.yaml")).unwrap();
//!
//! let root = PathBuf::from("./service");
//! let options = ScanOptions::default();
//! let preferences = [root.clone()];
//! let table = locator::make_table(plan.order.as_slice(), &root, &preferences, &options).unwrap();
//!
//! let tools = NativeTools::new(options);
//! let report = migration::migrate_batch(
//!     &plan,
//!     &table,
//!     "org.example.models",
//!     &root,
//!     None,
//!     &tools,
//!     |_| Ok(true),
//! )
//! .unwrap();
//!
//! println!("Migrated {} symbols", report.migrated.len());
//! ```

pub mod contract;
pub mod descriptor;
pub mod locator;
pub mod migration;
pub mod planner;
pub mod rewriter;
pub mod scanner;
pub mod tools;

// Re-export commonly used types at crate root
pub use locator::SymbolRow;
pub use migration::{MigrationOutcome, MigrationRequest};
pub use planner::{DependencyGraph, MigrationPlan};
pub use rewriter::{RewriteSummary, UsagePattern};
