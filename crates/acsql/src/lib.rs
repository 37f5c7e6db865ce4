//! acsql compiles a small SQL-like filter language into minimized boolean
//! expressions and document-store queries.
//!
//! ## Crate layout
//! - `core`: the engine (parser, normalizer, minimizer, store compiler,
//!   pagination planner, metrics).
//! - `config`: TOML configuration for the store compiler.
//! - `error`: the public error taxonomy.
//!
//! The `prelude` module carries the vocabulary most callers need.

pub use acsql_core as core;

pub mod config;
pub mod error;

mod compiler;

#[cfg(test)]
mod tests;

pub use compiler::{
    Compiler, bookmark, bookmark_filter, covers, minimize, paginate, parse, union_diff,
};
pub use acsql_core::expr::stringify;
pub use config::CompilerConfig;
pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{Compiler, CompilerConfig, Error, ErrorKind};
    pub use acsql_core::prelude::*;
}
