//! Command-line interface definitions for Subreddit Harvest.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Each subcommand runs one pipeline stage and reads its input from
//! the checkpoint the previous stage wrote.

use crate::cleaning::{DEFAULT_DEDUP_COLUMN, DEFAULT_LENGTH_COLUMN};
use crate::storage::TableKind;
use crate::utils::is_subreddit_name;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Subreddit Harvest application.
///
/// # Examples
///
/// ```sh
/// # Collect at least 500 posts from r/worldnews
/// subreddit_harvest scrape worldnews
///
/// # Pull article text for the scoped table
/// subreddit_harvest enrich worldnews
///
/// # Dedup every table on disk and annotate article lengths
/// subreddit_harvest clean worldnews
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for checkpoints (overrides the config file)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Collect posts from the archive and write the raw and scoped checkpoints
    Scrape {
        /// Subreddit name, without the `r/` prefix
        #[arg(value_parser = parse_subreddit)]
        subreddit: String,

        /// Minimum number of non-removed posts to collect (best in multiples of 100)
        #[arg(short, long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(1..))]
        num: u32,
    },

    /// Fetch article text for every scoped row and write the full table
    Enrich {
        #[arg(value_parser = parse_subreddit)]
        subreddit: String,

        /// Build the scoped view from the raw JSON checkpoint instead of the scoped CSV
        #[arg(long)]
        from_json: bool,
    },

    /// Deduplicate loaded tables and annotate text lengths, writing *_clean.csv copies
    Clean {
        #[arg(value_parser = parse_subreddit)]
        subreddit: String,

        /// Tables to load; missing checkpoints are skipped
        #[arg(short, long, value_enum, num_args = 1.., default_values_t = TableKind::ALL)]
        scope: Vec<TableKind>,

        /// Column whose duplicates are dropped
        #[arg(long, default_value = DEFAULT_DEDUP_COLUMN)]
        dedup_column: String,

        /// Column measured for length and word count on the full table
        #[arg(long, default_value = DEFAULT_LENGTH_COLUMN)]
        length_column: String,

        /// Skip deduplication
        #[arg(long)]
        no_dedup: bool,

        /// Skip length annotation
        #[arg(long)]
        no_lengths: bool,
    },

    /// Bonus
    Doge,
}

fn parse_subreddit(s: &str) -> Result<String, String> {
    if is_subreddit_name(s) {
        Ok(s.to_string())
    } else {
        Err("expected letters, digits or underscores only".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_defaults() {
        let cli = Cli::parse_from(["subreddit_harvest", "scrape", "worldnews"]);
        assert_eq!(
            cli.command,
            Command::Scrape {
                subreddit: "worldnews".to_string(),
                num: 500
            }
        );
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_scrape_rejects_zero() {
        assert!(Cli::try_parse_from(["subreddit_harvest", "scrape", "news", "-n", "0"]).is_err());
    }

    #[test]
    fn test_subreddit_must_be_a_plain_name() {
        for bad in ["../x", "a/b", ".."] {
            assert!(Cli::try_parse_from(["subreddit_harvest", "scrape", bad]).is_err());
            assert!(Cli::try_parse_from(["subreddit_harvest", "clean", bad]).is_err());
        }
        assert!(Cli::try_parse_from(["subreddit_harvest", "enrich", "world_news"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "subreddit_harvest",
            "enrich",
            "news",
            "--from-json",
            "-d",
            "/tmp/data",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
        assert_eq!(
            cli.command,
            Command::Enrich {
                subreddit: "news".to_string(),
                from_json: true
            }
        );
    }

    #[test]
    fn test_clean_scopes() {
        let cli = Cli::parse_from(["subreddit_harvest", "clean", "news"]);
        match cli.command {
            Command::Clean {
                scope,
                dedup_column,
                length_column,
                ..
            } => {
                assert_eq!(scope, TableKind::ALL.to_vec());
                assert_eq!(dedup_column, "title");
                assert_eq!(length_column, "article_text");
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from([
            "subreddit_harvest",
            "clean",
            "news",
            "--scope",
            "full",
            "filtered",
        ]);
        match cli.command {
            Command::Clean { scope, .. } => assert_eq!(scope, vec![TableKind::Full, TableKind::Scope]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
