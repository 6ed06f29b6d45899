//! logweave CLI entry point
//!
//! Parses arguments and dispatches via `cli::run`, printing any error to
//! stderr and exiting with status 1.

use logweave::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("logweave: {}", e);
        std::process::exit(1);
    }
}
