//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Scriptura - inspect and migrate dramatized scripture book scripts
#[derive(Parser, Debug)]
#[command(name = "scriptura")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the blocks covering a verse
    ///
    /// Examples:
    ///   scriptura verse MRK.json 1 4
    ///   scriptura verse MRK.json 1 4 --json
    Verse {
        /// Serialized book (JSON)
        book: PathBuf,

        /// Chapter number
        chapter: u32,

        /// Verse number
        verse: u32,
    },

    /// List multi-block quote chains and the characters they are assigned to
    Chains {
        /// Serialized book (JSON)
        book: PathBuf,
    },

    /// Replay user decisions from a previous parse onto a new one
    ///
    /// Without --out the updated book is not written; only the report
    /// is shown.
    Replay {
        /// Previous parse carrying the user's splits, alignments and
        /// confirmed assignments
        source: PathBuf,

        /// New parse of the same book
        target: PathBuf,

        /// Where to write the updated target book
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Configuration file (scriptura.toml)
        #[arg(short, long, env = "SCRIPTURA_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_verse() {
        let cli = Cli::parse_from(["scriptura", "verse", "MRK.json", "1", "4"]);
        assert_eq!(
            cli.command,
            Some(Commands::Verse {
                book: PathBuf::from("MRK.json"),
                chapter: 1,
                verse: 4,
            })
        );
        assert!(!cli.json);
    }

    #[test]
    fn parse_replay_with_options() {
        let cli = Cli::parse_from([
            "scriptura", "replay", "old.json", "new.json", "--out", "merged.json", "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Some(Commands::Replay { out, .. }) => assert_eq!(out, Some(PathBuf::from("merged.json"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_verbose_after_subcommand() {
        let cli = Cli::parse_from(["scriptura", "chains", "MRK.json", "-v"]);
        assert!(cli.verbose);
    }
}
