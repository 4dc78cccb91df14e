//! Source text, diagnostics and configuration shared by the Kiln crates.
//!
//! This crate is responsible for:
//! - Holding the in-memory source text of a compilation together with its
//!   virtual file name and a line table for `file:line:col` rendering
//! - Collecting compiler diagnostics (errors, warnings, notes) with spans
//! - Rendering diagnostics as plain text or as rich `miette` reports
//! - Loading the Kiln configuration (`kiln.toml`)

mod config;
mod diagnostic;
mod error;
mod file;

pub use config::{ClassNames, CompileDefaults, KilnConfig, OptLevel, DEFAULT_FILE_NAME};
pub use diagnostic::{Diagnostic, Diagnostics, Report, Severity};
pub use error::ConfigError;
pub use file::SourceFile;

pub use miette::SourceSpan;
