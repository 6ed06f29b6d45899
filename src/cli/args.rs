//! CLI argument definitions using clap
//!
//! Commands:
//! - logweave create -o <out> -k <key>.. [input]
//! - logweave lookup -k <value>.. [--closest] <index>
//! - logweave range [--lo <value>].. [--hi <value>].. <index>
//! - logweave section [-s <level>] <index>
//! - logweave merge -o <out> --value <field> [--combine <fn>] <index>..

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::value::Order;

/// logweave - build, search and merge microindex files
#[derive(Parser, Debug)]
#[command(name = "logweave")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./logweave.json")]
    pub config: PathBuf,

    /// Print a backtrace when the program panics
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log filter, overriding LOGWEAVE_LOG (e.g. "debug" or "logweave=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write records as NDJSON instead of the text syntax
    #[arg(short = 'j', long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a microindex from NDJSON records
    Create {
        /// Output index file
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Key fields, in precedence order (dotted paths allowed); repeat
        /// the flag or separate with commas
        #[arg(short = 'k', long = "key", required = true, value_delimiter = ',')]
        keys: Vec<String>,

        /// Minimum frame size in bytes (defaults to the configured value)
        #[arg(short = 'f', long = "frame-thresh")]
        frame_thresh: Option<usize>,

        /// Key order (defaults to the configured value)
        #[arg(long, value_enum)]
        order: Option<OrderArg>,

        /// Sort the input by key before indexing
        #[arg(long)]
        sort: bool,

        /// NDJSON input file, or "-" for stdin
        #[arg(default_value = "-")]
        input: String,
    },

    /// Look up records by key
    Lookup {
        /// Key values, in key order, one per flag; fewer values than keys
        /// match a prefix
        #[arg(short = 'k', long = "key", required = true)]
        keys: Vec<String>,

        /// Return the closest record at or after the key when there is no match
        #[arg(long)]
        closest: bool,

        /// Index file
        index: PathBuf,
    },

    /// Print the records with keys in [lo, hi)
    Range {
        /// Inclusive lower bound, one key value per flag
        #[arg(long)]
        lo: Vec<String>,

        /// Exclusive upper bound, one key value per flag
        #[arg(long)]
        hi: Vec<String>,

        /// Index file
        index: PathBuf,
    },

    /// Print one section of an index; level 0 is the base records
    Section {
        #[arg(short = 's', long = "level", default_value_t = 0)]
        level: usize,

        /// Index file
        index: PathBuf,
    },

    /// Merge indexes with the same keys, combining the values of equal keys
    Merge {
        /// Output index file
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Field holding the value to combine
        #[arg(long)]
        value: String,

        /// Combine function: first, last, concat or sum
        #[arg(long, default_value = "last")]
        combine: String,

        /// Input index files, earliest first
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for Order {
    fn from(o: OrderArg) -> Self {
        match o {
            OrderArg::Asc => Order::Asc,
            OrderArg::Desc => Order::Desc,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "logweave", "-j", "create", "-o", "out.zng", "-k", "ts,id", "--order", "desc", "in.json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Create { keys, order, input, sort, .. } => {
                assert_eq!(keys, vec!["ts", "id"]);
                assert_eq!(order, Some(OrderArg::Desc));
                assert_eq!(input, "in.json");
                assert!(!sort);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_merge_requires_inputs() {
        assert!(Cli::try_parse_from(["logweave", "merge", "-o", "x", "--value", "n"]).is_err());
        let cli = Cli::try_parse_from(["logweave", "merge", "-o", "x", "--value", "n", "a", "b"]).unwrap();
        match cli.command {
            Command::Merge { inputs, combine, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(combine, "last");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
