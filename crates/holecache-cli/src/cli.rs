//! # CLI Structure and Argument Parsing
//!
//! ```bash
//! # Newest holes, reading the forum and capturing as it goes
//! holecache holes --limit 20
//!
//! # The same listing replayed from disk
//! holecache --offline holes --order last-created
//!
//! # Floors of one hole, continuing where the last read stopped
//! holecache floors 4312 --resume
//!
//! # Inspect navigation state and configuration
//! holecache session --hole 4312
//! holecache config
//! ```
//!
//! Global options (`--offline`, `--json`, `--user`, `-v`, `-q`) apply to every subcommand.

use clap::{Parser, Subcommand, ValueEnum};
use holecache_core::{EntityKind, SortOrder};

/// Offline-capable forum reader
#[derive(Parser, Clone, Debug)]
#[command(name = "holecache")]
#[command(version)]
#[command(about = "Read forum holes and floors, keeping a local copy of everything read")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Read retained content only, never the network
    #[arg(long, global = true)]
    pub offline: bool,

    /// Print one JSON document per line instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Account namespace to read and capture under (defaults to config `user_id`)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List holes
    Holes {
        /// Listing order (defaults to config `sort_order`)
        #[arg(long, value_enum)]
        order: Option<OrderArg>,

        /// Only holes of this division
        #[arg(long, value_name = "ID")]
        division: Option<u64>,

        /// Continue after the last hole of the previous remote listing
        #[arg(long)]
        resume: bool,

        /// Maximum number of holes to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List the floors of one hole
    Floors {
        /// Hole identifier
        hole: u64,

        /// Newest floor first (defaults to the hole's remembered direction)
        #[arg(long, conflicts_with = "oldest_first")]
        newest_first: bool,

        /// Oldest floor first
        #[arg(long)]
        oldest_first: bool,

        /// Continue from the offset reached by the previous remote read
        #[arg(long, conflicts_with = "offset")]
        resume: bool,

        /// Skip this many floors
        #[arg(long)]
        offset: Option<u64>,

        /// Maximum number of floors to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show navigation state
    Session {
        /// Show the state of one hole instead of the listing state
        #[arg(long, value_name = "ID")]
        hole: Option<u64>,
    },

    /// Show the effective configuration
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },

    /// Rebuild range indices from the documents on disk
    Reindex {
        /// Collection to rebuild (both when omitted)
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderArg {
    LastReplied,
    LastCreated,
}

impl From<OrderArg> for SortOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::LastReplied => Self::LastReplied,
            OrderArg::LastCreated => Self::LastCreated,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Holes,
    Floors,
}

impl From<KindArg> for EntityKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Holes => Self::Hole,
            KindArg::Floors => Self::Floor,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["holecache", "holes", "--offline", "--json", "-n", "5"])
            .unwrap();

        assert!(cli.offline);
        assert!(cli.json);
        match cli.command {
            Commands::Holes { limit, resume, .. } => {
                assert_eq!(limit, Some(5));
                assert!(!resume);
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_floor_direction_flags_conflict() {
        let result = Cli::try_parse_from([
            "holecache",
            "floors",
            "7",
            "--newest-first",
            "--oldest-first",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_order_values() {
        let cli = Cli::try_parse_from(["holecache", "holes", "--order", "last-created"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Holes {
                order: Some(OrderArg::LastCreated),
                ..
            }
        ));
    }
}
