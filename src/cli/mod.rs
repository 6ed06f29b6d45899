//! CLI module for logweave
//!
//! Provides command-line interface for:
//! - create: Build a microindex from NDJSON records
//! - lookup: Exact or closest key lookup
//! - range: Records within a key range
//! - section: Dump one level of an index
//! - merge: Combine indexes into one

mod args;
mod commands;
mod io;

pub use args::{Cli, Command, OrderArg};
pub use commands::{create, lookup, merge, range, run_command, section};

use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Environment variable holding the default log filter
pub const LOG_ENV: &str = "LOGWEAVE_LOG";

/// Parse the command line, install logging and run the command
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level.as_deref());
    if cli.debug {
        std::env::set_var("RUST_BACKTRACE", "1");
    } else {
        std::panic::set_hook(Box::new(|info| {
            eprintln!("{}", info);
        }));
    }
    run_command(cli)
}

/// Log to stderr, filtered by `level` when given, else by LOGWEAVE_LOG,
/// else at warn
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l).ok(),
        None => EnvFilter::try_from_env(LOG_ENV).ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
